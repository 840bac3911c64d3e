pub mod config;
pub mod enrich;
pub mod export;
pub mod extract;
pub mod fetch;
pub mod geocode;
pub mod patch;
pub mod pipeline;
pub mod record;
pub mod render;
pub mod text;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::{Config, Overrides};
pub use extract::ExtractionError;
pub use patch::OverrideMap;
pub use pipeline::{Outcome, Pipeline, ReviewItem};
pub use record::{Coordinate, Lookup, Reason, Record};

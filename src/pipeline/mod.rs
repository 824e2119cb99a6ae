// Integration pipeline: core processing and in-process storage

pub mod processing;
pub mod storage;

pub use processing::integration::{IntegrationEngine, IntegrationStats};
pub use processing::resolver::{CoordinateResolver, LocationIndex};

pub mod config;
pub mod constants;
pub mod error;
pub mod logging;

// Data loading and the integration pipeline
pub mod io;
pub mod pipeline;

// Layered boundaries for application and infrastructure
pub mod app;
pub mod infra;

// Domain data shapes shared across layers
pub mod domain;

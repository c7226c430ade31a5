pub mod analysis;
pub mod config;
pub mod constants;
pub mod domain;
pub mod error;
pub mod logging;
pub mod observability;
pub mod pipeline;

// Application boundary and its filesystem adapters
pub mod app;
pub mod gateway;

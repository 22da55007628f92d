pub mod api;
pub mod bundler;
pub mod chain;
pub mod commands;
pub mod config;
pub mod errors;
pub mod models;
pub mod portfolio;
pub mod pump_instruction_builders;
pub mod wallet;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_support;

pub use bundler::{BundleOrchestrator, LaunchRequest, OrchestratorConfig, SellRequest, Seller};
pub use errors::{BundlerError, Result};

pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;

#[cfg(feature = "lambda")]
pub use config::lambda::LambdaConfig;

pub use adapters::storage::LocalModelStorage;
pub use config::toml_config::WorkerConfig;
pub use core::{handler::JobHandler, worker::QueueWorker};
pub use utils::error::{Result, WorkerError};

pub mod download;
pub mod handler;
pub mod models;
pub mod payload;
pub mod provision;
pub mod readiness;
pub mod webui;
pub mod worker;

pub use crate::domain::model::{Job, ModelFileInfo, ModelType, ProvisionReport};
pub use crate::domain::ports::{JobExecutor, ModelStorage};
pub use crate::utils::error::Result;

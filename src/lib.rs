pub mod api;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod dispatch;
pub mod error;
pub mod jobs;
pub mod lease;
pub mod remediation;
pub mod repository;
pub mod resource_status;
pub mod state_machine;
pub mod upstream;

pub use error::{JobManagerError, UpstreamError};

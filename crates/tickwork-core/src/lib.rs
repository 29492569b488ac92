//! `tickwork-core`: configuration, shared types and errors for the tickwork
//! agent scheduler.

pub mod config;
pub mod error;
pub mod runtime;
pub mod types;

pub use config::{DaemonConfig, DescriptorFile, TickworkConfig};
pub use error::{Result, TickworkError};
pub use types::{AgentConfiguration, AgentConfigurationBuilder, AgentState, CRON_TYPE, TIMER_TYPE};

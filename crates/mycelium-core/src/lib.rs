pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::{ConfigManager, LoggingConfig, SameKindPolicy, Settings, SyncConfig};
pub use error::*;
pub use traits::*;
pub use types::*;

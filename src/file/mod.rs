pub mod config;
pub mod session;

pub use config::{AppConfig, ConfigPlugin, SyncSettings};
pub use session::{ChannelConfig, SessionFile};

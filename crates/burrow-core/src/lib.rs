pub mod config;
pub mod error;
pub mod metrics;
pub mod status;

pub use config::BurrowConfig;
pub use error::{BurrowError, Result};
pub use status::{ClientState, ConnectionStatus, StatusSource, TunnelInfo};

pub mod config_manager;
pub mod error;
pub mod logging;

pub use config_manager::*;
pub use error::*;
pub use logging::{init_tracing, LogFormat};

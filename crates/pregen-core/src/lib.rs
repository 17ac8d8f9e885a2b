pub mod config;
pub mod error;
pub mod types;

pub use config::PregenConfig;
pub use error::{CoreError, Result};
pub use types::{Category, HandlerKey, Mode};

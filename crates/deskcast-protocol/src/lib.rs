pub mod config;
pub mod control;
pub mod error;
pub mod stream;

pub use config::Config;
pub use error::{DeskcastError, Result};

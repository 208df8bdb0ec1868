pub mod config;
pub mod contention;
pub mod error;
pub mod heap;
pub mod metrics;
pub mod pool;
pub mod shutdown;

pub use config::{Config, Mode};
pub use error::{Error, Result};

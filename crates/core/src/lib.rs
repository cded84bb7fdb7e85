pub mod config;
pub mod error;
pub mod order;

pub use config::Config;
pub use error::*;
pub use order::*;

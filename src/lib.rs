pub mod config;
pub mod error;
pub mod irc;
pub mod supervisor;

pub use error::{Error, Result};

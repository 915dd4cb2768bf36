pub mod commands;
pub mod db;
pub mod engine;
pub mod error;

pub use error::{Error, Result};

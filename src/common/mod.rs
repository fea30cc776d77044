//! Common utilities and types shared across replikv

pub mod config;
pub mod error;
pub mod utils;

pub use config::Config;
pub use error::{Error, ReadFailure, Result};
pub use utils::{encode_segment, parse_duration, with_deadline};

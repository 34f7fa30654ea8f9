mod config;
mod errors;
mod extract;
mod metadata;

pub use crate::config::ExtractConfig;
pub use crate::errors::ExtractError;
pub use crate::extract::*;
pub use crate::metadata::*;

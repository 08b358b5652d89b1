#![allow(clippy::cargo_common_metadata)]

pub mod case;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod report;
pub mod transcript;

#[cfg(feature = "test-utils")]
pub mod test_utils;

pub use endpoint::Endpoint;
pub use error::{CommandError, ObtestError, Result};

pub mod config;
pub mod error;
pub mod fs;
pub mod location;
pub mod logging;
pub mod s3;
pub mod savepoints;

pub use error::{Error, ErrorKind, ListFailure, Result};
pub use savepoints::SavepointLocator;

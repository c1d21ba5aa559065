//! Database initialization and domain models

pub mod init;
pub mod models;

pub use init::*;
pub use models::*;

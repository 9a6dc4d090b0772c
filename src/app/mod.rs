//! Application configuration and wiring

pub mod config;
pub mod init;
pub mod loader;

pub use init::{init_app, App};
pub use loader::load_config;

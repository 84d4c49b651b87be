pub mod config;
pub mod daemon;
pub mod fs;
pub mod passwd;
pub mod reconcile;

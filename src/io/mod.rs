pub mod clickup;
pub mod config;
pub mod store;

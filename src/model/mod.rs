pub mod client;
pub mod step;
pub mod history;
pub mod config;

pub use client::*;
pub use step::*;
pub use history::*;
pub use config::*;

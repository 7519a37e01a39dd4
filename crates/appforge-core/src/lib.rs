pub mod config;
pub mod credentials;
pub mod db;
pub mod error;
pub mod gateway;
pub mod io;
pub mod orchestrator;
pub mod packager;
pub mod paths;
pub mod pipeline;
pub mod recipe;
pub mod tenant;
pub mod types;

pub use error::{ForgeError, Result};

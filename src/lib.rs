pub mod batch;
pub mod config;
pub mod db;
pub mod error;
pub mod pipeline;
pub mod providers;
pub mod queue;
pub mod server;
pub mod utils;

pub use error::ForgeError;

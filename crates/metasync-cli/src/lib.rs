//! Metasync runner - refresh cycles from a catalog snapshot into a sled
//! repository.

pub mod config;
pub mod error;
pub mod runner;

pub use config::{Args, RunConfig};
pub use error::Error;
pub use runner::{Runner, SyncTask};

pub mod cni;
pub mod config;
pub mod error;
pub mod fs;
pub mod kubeconfig;

pub use error::{Error, Result};

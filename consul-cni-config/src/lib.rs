pub mod config;
pub mod error;
pub mod merge;

pub use config::{ConfigFormat, ManagedEntry, NetworkConfigList, PluginConfig};
pub use error::Error;
pub use merge::merge;

/// Name and binary of the chained plugin
pub const PLUGIN_NAME: &str = "consul-cni";

/// Plugin type used when the entry is wrapped for multus
pub const MULTUS_TYPE: &str = "multus";

pub type Result<T, E = Error> = std::result::Result<T, E>;

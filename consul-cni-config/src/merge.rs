use crate::{ManagedEntry, NetworkConfigList, Result};

/// Inserts `entry` at the end of the plugin chain, dropping any previous
/// rendering of it first. Everything else in `config` is left as is.
///
/// Chained plugins run after the plugin that created the sandbox network, so
/// the managed entry always goes last. Merging the same entry twice gives
/// the same list as merging it once.
pub fn merge(mut config: NetworkConfigList, entry: &ManagedEntry) -> Result<NetworkConfigList> {
    let plugin = entry.to_plugin(config.cni_version.as_deref())?;
    config.plugins.retain(|p| !entry.matches(p));
    config.plugins.push(plugin);
    Ok(config)
}

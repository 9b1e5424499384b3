use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use consul_cni_config::{ConfigFormat, ManagedEntry, NetworkConfigList, PLUGIN_NAME, merge};
use tracing::{debug, info, warn};

use crate::config::InstallArgs;
use crate::fs::write_atomic;
use crate::kubeconfig::{KubeconfigFields, ServiceAccount, write_kubeconfig};
use crate::{Error, Result};

const CONF_MODE: u32 = 0o644;
const BIN_MODE: u32 = 0o755;

/// A file in the configuration directory that may hold the node's network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFile {
    pub path: PathBuf,
    pub format: ConfigFormat,
}

/// The configuration kubelet would use for pod networking.
#[derive(Debug, Clone)]
pub struct LocatedConfig {
    pub path: PathBuf,
    pub format: ConfigFormat,
    pub config: NetworkConfigList,
}

impl LocatedConfig {
    /// Where the updated list is written. A single plugin file turns into a
    /// list once the plugin is chained, so it gets a `.conflist` extension.
    pub fn destination(&self) -> PathBuf {
        match self.format {
            ConfigFormat::ConfList => self.path.clone(),
            ConfigFormat::Conf => self.path.with_extension("conflist"),
        }
    }
}

/// Runs a complete install: kubeconfig, plugin binary, then the network
/// config so the chain is only extended once the plugin can run.
pub fn install(args: &InstallArgs) -> Result<()> {
    let entry = args.managed_entry();
    entry.validate()?;
    let net_dir = args.mounted_net_dir();

    let account = ServiceAccount::load(&args.service_account_dir)?;
    let fields = KubeconfigFields::new(args, account);
    write_kubeconfig(net_dir.join(&args.kubeconfig), &fields)?;

    install_binary(&args.bin_source_dir, args.mounted_bin_dir())?;
    install_config(&net_dir, &entry)?;
    Ok(())
}

/// Adds `entry` to the primary network config in `cni_conf_dir` and returns
/// the path that was written.
///
/// A `.conf` source is never converted over an existing `.conflist` of the
/// same stem; that file belongs to another network and the run fails instead.
pub fn install_config(cni_conf_dir: impl AsRef<Path>, entry: &ManagedEntry) -> Result<PathBuf> {
    let located = locate(cni_conf_dir)?;
    let dest = located.destination();
    if dest != located.path && fs::symlink_metadata(&dest).is_ok() {
        return Err(Error::Configuration(format!(
            "cannot convert {} to {}: destination already exists",
            located.path.display(),
            dest.display()
        )));
    }

    let merged = merge(located.config, entry)?;
    let rendered = merged.render()?;
    write_atomic(&dest, &rendered, CONF_MODE)?;
    info!(path = %dest.display(), "wrote cni configuration");

    // kubelet would keep picking the single plugin file since it sorts first
    if dest != located.path {
        fs::remove_file(&located.path)?;
        info!(path = %located.path.display(), "removed replaced cni configuration");
    }
    Ok(dest)
}

/// Lists the network configuration files in `cni_conf_dir` in the order
/// kubelet considers them.
pub fn candidates(cni_conf_dir: impl AsRef<Path>) -> Result<Vec<CandidateFile>> {
    let dir = cni_conf_dir.as_ref();
    let entries = fs::read_dir(dir).map_err(|e| match e.kind() {
        ErrorKind::NotFound => Error::NotFound(format!("{} does not exist", dir.display())),
        _ => e.into(),
    })?;

    let mut files: Vec<_> = entries
        .filter_map(|f| {
            let Ok(f) = f else { return None };
            let path = f.path();
            if !path.is_file() {
                return None;
            }
            let format = ConfigFormat::from_path(&path)?;
            Some(CandidateFile { path, format })
        })
        .collect();

    files.sort_by(|a, b| a.path.file_name().cmp(&b.path.file_name()));
    Ok(files)
}

// Mirrors kubelet: the first file that parses and has plugins wins, anything
// broken along the way is skipped.
pub fn locate(cni_conf_dir: impl AsRef<Path>) -> Result<LocatedConfig> {
    let dir = cni_conf_dir.as_ref();
    for candidate in candidates(dir)? {
        debug!(path = %candidate.path.display(), format = ?candidate.format, "checking cni configuration");
        let config = match load(&candidate) {
            Ok(config) => config,
            Err(e) => {
                warn!(%e, path = %candidate.path.display(), "skipping cni configuration");
                continue;
            }
        };
        if config.plugins.is_empty() {
            warn!(path = %candidate.path.display(), "cni configuration has no plugins, skipping");
            continue;
        }

        info!(path = %candidate.path.display(), "using cni configuration");
        return Ok(LocatedConfig {
            path: candidate.path,
            format: candidate.format,
            config,
        });
    }

    Err(Error::NotFound(format!(
        "no valid network configuration found in {}",
        dir.display()
    )))
}

fn load(candidate: &CandidateFile) -> Result<NetworkConfigList> {
    let bytes = fs::read(&candidate.path)?;
    Ok(NetworkConfigList::from_slice(candidate.format, &bytes)?)
}

/// Copies the plugin binary into the CNI bin directory. The copy is renamed
/// into place so a plugin being executed is never truncated.
pub fn install_binary(src_dir: impl AsRef<Path>, dst_dir: impl AsRef<Path>) -> Result<PathBuf> {
    info!("copying plugin to cni bin");
    let src = src_dir.as_ref().join(PLUGIN_NAME);
    if !src.is_file() {
        return Err(Error::NotFound(format!(
            "source cni binary {} does not exist",
            src.display()
        )));
    }
    let dst_dir = dst_dir.as_ref();
    if !dst_dir.is_dir() {
        return Err(Error::NotFound(format!(
            "destination directory {} does not exist",
            dst_dir.display()
        )));
    }

    let bin = fs::read(&src)?;
    let path = write_atomic(dst_dir.join(PLUGIN_NAME), &bin, BIN_MODE)?;
    info!(path = %path.display(), "installed cni plugin binary");
    Ok(path)
}

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use consul_cni_config::{ManagedEntry, PLUGIN_NAME};

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Subcommand, Debug)]
pub enum Commands {
    /// Install the consul-cni plugin on this node
    Install(InstallArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct InstallArgs {
    /// CNI Bin directory on the host
    #[arg(long, env = "CNI_BIN_DIR", default_value = "/opt/cni/bin")]
    pub cni_bin_dir: PathBuf,

    /// CNI configuration directory on the host
    #[arg(long, env = "CNI_NET_DIR", default_value = "/etc/cni/net.d")]
    pub cni_net_dir: PathBuf,

    /// Directory the plugin binary is copied from
    #[arg(long, env = "CNI_BIN_SOURCE_DIR", default_value = "/bin")]
    pub bin_source_dir: PathBuf,

    /// File name of the kubeconfig written to the CNI configuration directory
    #[arg(long, env = "CNI_KUBECONFIG", default_value = "ZZZZ-consul-cni-kubeconfig")]
    pub kubeconfig: String,

    /// Install the plugin as a multus delegate
    #[arg(long, env = "CNI_MULTUS", default_value_t = false)]
    pub multus: bool,

    /// Log level of the installer, also passed on to the plugin
    #[arg(long, env = "LOG_LEVEL", value_enum, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,

    /// Log as JSON
    #[arg(long, env = "LOG_JSON", default_value_t = false)]
    pub log_json: bool,

    /// Where the host filesystem is mounted when running in a container
    #[arg(long, env = "HOST_MOUNT_PREFIX")]
    pub host_mount_prefix: Option<PathBuf>,

    /// Mounted service account used to build the plugin kubeconfig
    #[arg(
        long,
        env = "SERVICE_ACCOUNT_DIR",
        default_value = "/var/run/secrets/kubernetes.io/serviceaccount"
    )]
    pub service_account_dir: PathBuf,

    #[arg(long, env = "KUBERNETES_SERVICE_PROTOCOL", default_value = "https")]
    pub kubernetes_service_protocol: String,

    #[arg(long, env = "KUBERNETES_SERVICE_HOST")]
    pub kubernetes_service_host: String,

    #[arg(long, env = "KUBERNETES_SERVICE_PORT")]
    pub kubernetes_service_port: String,

    /// Re-run the install every N seconds until terminated
    #[arg(
        long,
        env = "RECONCILE_INTERVAL_SECONDS",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub reconcile_interval: Option<u64>,
}

impl InstallArgs {
    /// The plugin entry as it should appear in the node's network config.
    /// Directories are the host paths, not the mounted ones.
    pub fn managed_entry(&self) -> ManagedEntry {
        ManagedEntry {
            name: PLUGIN_NAME.into(),
            plugin_type: PLUGIN_NAME.into(),
            cni_bin_dir: self.cni_bin_dir.to_string_lossy().into_owned(),
            cni_net_dir: self.cni_net_dir.to_string_lossy().into_owned(),
            kubeconfig: self.kubeconfig.clone(),
            log_level: self.log_level.as_str().into(),
            multus: self.multus,
        }
    }

    pub fn mounted_net_dir(&self) -> PathBuf {
        self.mounted(&self.cni_net_dir)
    }

    pub fn mounted_bin_dir(&self) -> PathBuf {
        self.mounted(&self.cni_bin_dir)
    }

    pub fn interval(&self) -> Option<Duration> {
        self.reconcile_interval.map(Duration::from_secs)
    }

    fn mounted(&self, path: &Path) -> PathBuf {
        match &self.host_mount_prefix {
            // joining an absolute path would discard the prefix
            Some(prefix) => prefix.join(path.strip_prefix("/").unwrap_or(path)),
            None => path.to_path_buf(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{Error, MULTUS_TYPE, Result};

/// On-disk flavour of a CNI network configuration file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigFormat {
    /// A single plugin configuration (`.conf`, `.json`)
    Conf,
    /// A list of chained plugin configurations (`.conflist`)
    ConfList,
}

impl ConfigFormat {
    /// Returns `None` for files that are not network configurations.
    pub fn from_path(path: impl AsRef<Path>) -> Option<Self> {
        match path.as_ref().extension()?.to_str()? {
            "conflist" => Some(ConfigFormat::ConfList),
            "conf" | "json" => Some(ConfigFormat::Conf),
            _ => None,
        }
    }
}

/// https://www.cni.dev/docs/spec/#configuration-format
///
/// Only the header fields are typed. Anything else at the top level is kept
/// in `extra` so node specific settings survive a rewrite.
///
/// Deserialized from a plain object; `#[serde(flatten)]` buffers values on
/// the way in and would lose the exact text of numbers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Map<String, Value>")]
pub struct NetworkConfigList {
    /// Written back exactly as read, including an empty string
    #[serde(rename = "cniVersion", skip_serializing_if = "Option::is_none")]
    pub cni_version: Option<String>,

    /// Name of the network, must not be altered
    pub name: String,

    /// Chained plugins, invoked in order
    pub plugins: Vec<PluginConfig>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl NetworkConfigList {
    pub fn from_slice(format: ConfigFormat, bytes: &[u8]) -> Result<Self> {
        match format {
            ConfigFormat::Conf => Self::from_conf(bytes),
            ConfigFormat::ConfList => Self::from_conflist(bytes),
        }
    }

    pub fn from_conflist(bytes: &[u8]) -> Result<Self> {
        let doc: Map<String, Value> =
            serde_json::from_slice(bytes).map_err(|e| Error::Malformed(e.to_string()))?;
        Self::try_from(doc)
    }

    /// Parses a single plugin configuration and wraps it into a one element
    /// list. The whole document becomes the plugin entry.
    pub fn from_conf(bytes: &[u8]) -> Result<Self> {
        let conf: Map<String, Value> =
            serde_json::from_slice(bytes).map_err(|e| Error::Malformed(e.to_string()))?;

        // also catches a conflist that was saved with a .conf extension
        let has_type = conf
            .get("type")
            .and_then(Value::as_str)
            .is_some_and(|t| !t.is_empty());
        if !has_type {
            return Err(Error::Malformed(
                "no 'type'; perhaps this is a .conflist?".into(),
            ));
        }

        let field = |key: &str| conf.get(key).and_then(Value::as_str).map(str::to_owned);
        Ok(Self {
            cni_version: field("cniVersion"),
            name: field("name").unwrap_or_default(),
            plugins: vec![PluginConfig(conf)],
            extra: Map::new(),
        })
    }

    /// Pretty printed JSON with a trailing newline.
    pub fn render(&self) -> Result<Vec<u8>> {
        let mut out = serde_json::to_vec_pretty(self)?;
        out.push(b'\n');
        Ok(out)
    }
}

impl TryFrom<Map<String, Value>> for NetworkConfigList {
    type Error = Error;

    fn try_from(mut doc: Map<String, Value>) -> Result<Self> {
        // shift, not swap, so the remaining keys keep their order
        let cni_version = match doc.shift_remove("cniVersion") {
            None => None,
            Some(Value::String(version)) => Some(version),
            Some(_) => return Err(Error::Malformed("'cniVersion' must be a string".into())),
        };
        let name = match doc.shift_remove("name") {
            Some(Value::String(name)) => name,
            Some(_) => return Err(Error::Malformed("'name' must be a string".into())),
            None => return Err(Error::Malformed("missing field 'name'".into())),
        };
        let plugins = match doc.shift_remove("plugins") {
            Some(Value::Array(plugins)) => plugins
                .into_iter()
                .map(|plugin| match plugin {
                    Value::Object(plugin) => Ok(PluginConfig(plugin)),
                    _ => Err(Error::Malformed("plugin entries must be objects".into())),
                })
                .collect::<Result<Vec<_>>>()?,
            Some(_) => return Err(Error::Malformed("'plugins' must be an array".into())),
            None => return Err(Error::Malformed("missing field 'plugins'".into())),
        };
        Ok(Self {
            cni_version,
            name,
            plugins,
            extra: doc,
        })
    }
}

/// https://www.cni.dev/docs/spec/#plugin-configuration-objects
///
/// Kept as the raw object so foreign entries are written back exactly as
/// they were read.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PluginConfig(pub Map<String, Value>);

impl PluginConfig {
    /// Matches the name of the CNI plugin binary on disk.
    pub fn plugin_type(&self) -> Option<&str> {
        self.0.get("type").and_then(Value::as_str)
    }

    pub fn name(&self) -> Option<&str> {
        self.0.get("name").and_then(Value::as_str)
    }
}

/// The plugin entry owned by the installer. Rebuilt from the install
/// configuration on every run and always written as a whole.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ManagedEntry {
    pub name: String,

    #[serde(rename = "type")]
    pub plugin_type: String,

    /// Location of the plugin binaries on the host
    pub cni_bin_dir: String,

    /// Location of the network configuration on the host
    pub cni_net_dir: String,

    /// File name of the kubeconfig inside `cni_net_dir`
    pub kubeconfig: String,

    pub log_level: String,

    /// Render as a multus delegate instead of a chain entry
    #[serde(skip)]
    pub multus: bool,
}

impl ManagedEntry {
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("name", &self.name),
            ("type", &self.plugin_type),
            ("kubeconfig", &self.kubeconfig),
            ("log_level", &self.log_level),
        ];
        for (key, value) in required {
            if value.trim().is_empty() {
                return Err(Error::Configuration(format!("{key} must be specified")));
            }
        }
        Ok(())
    }

    /// Whether `plugin` is a rendering of this entry, in either mode.
    pub fn matches(&self, plugin: &PluginConfig) -> bool {
        plugin.plugin_type() == Some(self.plugin_type.as_str())
            || plugin.name() == Some(self.name.as_str())
    }

    /// Renders the entry for insertion into a list with `cni_version`.
    pub fn to_plugin(&self, cni_version: Option<&str>) -> Result<PluginConfig> {
        let Value::Object(entry) = serde_json::to_value(self)? else {
            return Err(Error::Configuration(
                "plugin entry did not serialize to an object".into(),
            ));
        };
        if !self.multus {
            return Ok(PluginConfig(entry));
        }

        // multus delegates are complete network configurations
        let mut delegate = Map::new();
        if let Some(version) = cni_version {
            delegate.insert("cniVersion".into(), Value::String(version.into()));
        }
        delegate.extend(entry);

        let mut wrapper = Map::new();
        wrapper.insert("name".into(), Value::String(self.name.clone()));
        wrapper.insert("type".into(), Value::String(MULTUS_TYPE.into()));
        wrapper.insert(
            "delegates".into(),
            Value::Array(vec![Value::Object(delegate)]),
        );
        Ok(PluginConfig(wrapper))
    }
}

use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::net::Ipv6Addr;
use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Serialize;
use tracing::info;

use crate::config::InstallArgs;
use crate::fs::write_atomic;
use crate::{Error, Result};

const CLUSTER_NAME: &str = "local";
const USER_NAME: &str = "consul-cni";
const CONTEXT_NAME: &str = "consul-cni-context";
const HEADER: &str = "# Kubeconfig file for consul CNI plugin.\n";

/// Only readable by root, the plugin runs as root
const KUBECONFIG_MODE: u32 = 0o600;

/// Credentials from the service account mounted into the installer pod.
pub struct ServiceAccount {
    pub token: String,
    pub ca_data: Vec<u8>,
}

impl ServiceAccount {
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let token = read(&dir.join("token"))?;
        let token = String::from_utf8(token)
            .map_err(|_| Error::Configuration("service account token is not utf-8".into()))?
            .trim()
            .to_owned();
        let ca_data = read(&dir.join("ca.crt"))?;
        Ok(Self { token, ca_data })
    }
}

impl fmt::Debug for ServiceAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccount")
            .field("token", &"<redacted>")
            .field("ca_data", &format_args!("{} bytes", self.ca_data.len()))
            .finish()
    }
}

fn read(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => Error::NotFound(format!("{} does not exist", path.display())),
        _ => e.into(),
    })
}

pub struct KubeconfigFields {
    pub protocol: String,
    pub host: String,
    pub port: String,
    pub ca_data: Vec<u8>,
    pub token: String,
}

impl KubeconfigFields {
    pub fn new(args: &InstallArgs, account: ServiceAccount) -> Self {
        Self {
            protocol: args.kubernetes_service_protocol.clone(),
            host: args.kubernetes_service_host.clone(),
            port: args.kubernetes_service_port.clone(),
            ca_data: account.ca_data,
            token: account.token,
        }
    }

    fn server(&self) -> String {
        if self.host.parse::<Ipv6Addr>().is_ok() {
            format!("{}://[{}]:{}", self.protocol, self.host, self.port)
        } else {
            format!("{}://{}:{}", self.protocol, self.host, self.port)
        }
    }

    fn validate(&self) -> Result<()> {
        let required = [
            ("kubernetes service protocol", &self.protocol),
            ("kubernetes service host", &self.host),
            ("kubernetes service port", &self.port),
            ("service account token", &self.token),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(Error::Configuration(format!("{field} must not be empty")));
            }
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct Kubeconfig<'a> {
    #[serde(rename = "apiVersion")]
    api_version: &'static str,
    kind: &'static str,
    clusters: Vec<Named<ClusterEntry>>,
    users: Vec<Named<UserEntry<'a>>>,
    contexts: Vec<Named<ContextEntry>>,
    #[serde(rename = "current-context")]
    current_context: &'static str,
}

#[derive(Serialize)]
struct Named<T> {
    name: &'static str,
    #[serde(flatten)]
    entry: T,
}

#[derive(Serialize)]
struct ClusterEntry {
    cluster: Cluster,
}

#[derive(Serialize)]
struct Cluster {
    server: String,
    #[serde(rename = "certificate-authority-data")]
    certificate_authority_data: String,
}

#[derive(Serialize)]
struct UserEntry<'a> {
    user: User<'a>,
}

#[derive(Serialize)]
struct User<'a> {
    token: &'a str,
}

#[derive(Serialize)]
struct ContextEntry {
    context: Context,
}

#[derive(Serialize)]
struct Context {
    cluster: &'static str,
    user: &'static str,
}

/// Renders a kubeconfig for the plugin. Regenerated on every install so the
/// latest token always wins.
pub fn render_kubeconfig(fields: &KubeconfigFields) -> Result<String> {
    fields.validate()?;

    let kubeconfig = Kubeconfig {
        api_version: "v1",
        kind: "Config",
        clusters: vec![Named {
            name: CLUSTER_NAME,
            entry: ClusterEntry {
                cluster: Cluster {
                    server: fields.server(),
                    certificate_authority_data: STANDARD.encode(&fields.ca_data),
                },
            },
        }],
        users: vec![Named {
            name: USER_NAME,
            entry: UserEntry {
                user: User {
                    token: &fields.token,
                },
            },
        }],
        contexts: vec![Named {
            name: CONTEXT_NAME,
            entry: ContextEntry {
                context: Context {
                    cluster: CLUSTER_NAME,
                    user: USER_NAME,
                },
            },
        }],
        current_context: CONTEXT_NAME,
    };

    let mut out = String::from(HEADER);
    out.push_str(&serde_yaml::to_string(&kubeconfig)?);
    Ok(out)
}

pub fn write_kubeconfig(dest: impl AsRef<Path>, fields: &KubeconfigFields) -> Result<PathBuf> {
    let rendered = render_kubeconfig(fields)?;
    let path = write_atomic(dest, rendered.as_bytes(), KUBECONFIG_MODE)?;
    info!(path = %path.display(), "wrote kubeconfig");
    Ok(path)
}

#[cfg(test)]
mod test {
    use serde_yaml::Value;

    use super::*;

    fn fields(host: &str) -> KubeconfigFields {
        KubeconfigFields {
            protocol: "https".into(),
            host: host.into(),
            port: "443".into(),
            ca_data: b"-----BEGIN CERTIFICATE-----\nMIIB\n-----END CERTIFICATE-----\n".to_vec(),
            token: "eyJhbGciOiJSUzI1NiJ9.payload.sig".into(),
        }
    }

    fn lookup<'a>(doc: &'a Value, path: &[&str]) -> &'a Value {
        path.iter().fold(doc, |v, key| match key.parse::<usize>() {
            Ok(idx) => &v[idx],
            Err(_) => &v[*key],
        })
    }

    #[test]
    fn renders_cluster_user_and_context() -> Result<()> {
        let rendered = render_kubeconfig(&fields("10.96.0.1"))?;
        assert!(rendered.starts_with("# Kubeconfig file for consul CNI plugin.\n"));

        let doc: Value = serde_yaml::from_str(&rendered)?;
        assert_eq!(doc["apiVersion"], Value::from("v1"));
        assert_eq!(doc["kind"], Value::from("Config"));
        assert_eq!(
            lookup(&doc, &["clusters", "0", "cluster", "server"]),
            &Value::from("https://10.96.0.1:443")
        );
        assert_eq!(
            lookup(&doc, &["clusters", "0", "cluster", "certificate-authority-data"]),
            &Value::from(STANDARD.encode(fields("x").ca_data))
        );
        assert_eq!(
            lookup(&doc, &["users", "0", "user", "token"]),
            &Value::from("eyJhbGciOiJSUzI1NiJ9.payload.sig")
        );
        assert_eq!(
            lookup(&doc, &["contexts", "0", "context", "cluster"]),
            &Value::from("local")
        );
        assert_eq!(doc["current-context"], Value::from("consul-cni-context"));
        Ok(())
    }

    #[test]
    fn ipv6_host_is_bracketed() -> Result<()> {
        let doc: Value = serde_yaml::from_str(&render_kubeconfig(&fields("fd00:10:96::1"))?)?;
        assert_eq!(
            lookup(&doc, &["clusters", "0", "cluster", "server"]),
            &Value::from("https://[fd00:10:96::1]:443")
        );

        let doc: Value =
            serde_yaml::from_str(&render_kubeconfig(&fields("kubernetes.default.svc"))?)?;
        assert_eq!(
            lookup(&doc, &["clusters", "0", "cluster", "server"]),
            &Value::from("https://kubernetes.default.svc:443")
        );
        Ok(())
    }

    #[test]
    fn missing_fields_are_rejected() {
        let mut f = fields("");
        assert!(matches!(render_kubeconfig(&f), Err(Error::Configuration(_))));

        f = fields("10.96.0.1");
        f.token = String::new();
        assert!(matches!(render_kubeconfig(&f), Err(Error::Configuration(_))));

        f = fields("10.96.0.1");
        f.port = String::new();
        assert!(matches!(render_kubeconfig(&f), Err(Error::Configuration(_))));
    }

    #[test]
    fn service_account_is_loaded_and_trimmed() -> Result<()> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join("token"), "abc.def.ghi\n")?;
        fs::write(dir.path().join("ca.crt"), "ca-bytes")?;

        let account = ServiceAccount::load(dir.path())?;
        assert_eq!(account.token, "abc.def.ghi");
        assert_eq!(account.ca_data, b"ca-bytes");
        assert!(!format!("{account:?}").contains("abc.def.ghi"));
        Ok(())
    }

    #[test]
    fn missing_service_account_is_not_found() -> Result<()> {
        let dir = tempfile::tempdir()?;
        assert!(matches!(
            ServiceAccount::load(dir.path()),
            Err(Error::NotFound(_))
        ));
        Ok(())
    }

    #[test]
    fn kubeconfig_is_overwritten_with_restricted_mode() -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir()?;
        let dest = dir.path().join("ZZZZ-consul-cni-kubeconfig");
        fs::write(&dest, "stale")?;

        write_kubeconfig(&dest, &fields("10.96.0.1"))?;

        let written = fs::read_to_string(&dest)?;
        assert!(written.contains("eyJhbGciOiJSUzI1NiJ9.payload.sig"));
        let mode = fs::metadata(&dest)?.permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
        Ok(())
    }
}

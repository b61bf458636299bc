//! Per-environment configuration.
//!
//! Each environment is one YAML file, `<root>/<env>.yml`. String scalars
//! anywhere in the document may be encrypted (see [`crate::vault`]); they
//! are opened in memory when a key is supplied to [`ConfigLoader::load`].

use crate::error::{Error, Result};
use crate::vault::{self, VaultKey};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// File extension of environment files.
pub const CONFIG_EXTENSION: &str = "yml";

/// Authentication scheme used against the CMP.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthType {
    /// User/password exchanged for a token and a per-session signing key.
    #[default]
    Keyauth,
    /// JWT assertion signed with an RSA key, exchanged for a bearer token.
    Oauth2,
}

impl fmt::Display for AuthType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Keyauth => write!(f, "keyauth"),
            Self::Oauth2 => write!(f, "oauth2"),
        }
    }
}

/// The `cmp` section of an environment file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CmpConfig {
    /// Single endpoint serving every subsystem.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Per-subsystem endpoints (`auth`, `resource`, `service`, `ssh`, ...).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub endpoints: BTreeMap<String, String>,
    #[serde(default)]
    pub authtype: AuthType,
    pub user: String,
    /// Password (keyauth).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pwd: Option<String>,
    /// RSA private key, PEM text or path to a PEM file (oauth2).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    /// JWT issuer for oauth2; defaults to the user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_proxy: Option<String>,
    /// Default HTTP timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

impl CmpConfig {
    /// Build the endpoint map described by this section.
    pub fn endpoint_map(&self) -> EndpointMap {
        if self.endpoints.is_empty() {
            EndpointMap::Single(self.endpoint.clone().unwrap_or_default())
        } else {
            EndpointMap::PerSubsystem(self.endpoints.clone())
        }
    }
}

/// Mapping from subsystem name to base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointMap {
    /// One endpoint drives everything.
    Single(String),
    /// Each subsystem has its own base URL.
    PerSubsystem(BTreeMap<String, String>),
}

impl EndpointMap {
    /// Resolve the base URL for a subsystem.
    ///
    /// Fails when the subsystem has no (or an empty) URL.
    pub fn resolve(&self, subsystem: &str) -> std::result::Result<&str, String> {
        let url = match self {
            Self::Single(url) => url.as_str(),
            Self::PerSubsystem(map) => map.get(subsystem).map(String::as_str).unwrap_or(""),
        };
        let url = url.trim_end_matches('/');
        if url.is_empty() {
            Err(format!("no endpoint configured for subsystem '{subsystem}'"))
        } else {
            Ok(url)
        }
    }

    /// Whether a per-subsystem map is in use.
    pub fn is_per_subsystem(&self) -> bool {
        matches!(self, Self::PerSubsystem(_))
    }
}

/// A fully loaded environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    /// Environment name (the file stem); not part of the document.
    #[serde(skip)]
    pub name: String,
    pub cmp: CmpConfig,
    /// `orchestrators.<kind>.<label>` blocks.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub orchestrators: BTreeMap<String, BTreeMap<String, Value>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub ldap: BTreeMap<String, Value>,
    /// `consoles.<env>.<label>` blocks.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub consoles: BTreeMap<String, BTreeMap<String, Value>>,
}

impl EnvironmentConfig {
    /// Look up `orchestrators.<kind>.<label>`.
    pub fn get_orchestrator(&self, kind: &str, label: &str) -> Result<&Value> {
        self.orchestrators
            .get(kind)
            .and_then(|by_label| by_label.get(label))
            .ok_or_else(|| Error::ConfigInvalid {
                env: self.name.clone(),
                reason: format!("orchestrator {kind}.{label} is not defined"),
            })
    }
}

/// Loads environment files from a configuration root.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    root: PathBuf,
}

impl ConfigLoader {
    /// Create a loader over a configuration root directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Configuration root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of an environment file.
    pub fn path_for(&self, env: &str) -> PathBuf {
        self.root.join(format!("{env}.{CONFIG_EXTENSION}"))
    }

    /// List available environments, sorted by name.
    pub fn list(&self) -> Result<Vec<String>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&self.root).map_err(|e| Error::io(&self.root, e))?;
        let mut envs: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.is_file()
                    && path.extension().and_then(|e| e.to_str()) == Some(CONFIG_EXTENSION)
            })
            .filter_map(|path| path.file_stem().and_then(|s| s.to_str()).map(String::from))
            .collect();
        envs.sort();
        Ok(envs)
    }

    /// Load and (optionally) decrypt an environment.
    pub fn load(&self, env: &str, key: Option<&str>) -> Result<EnvironmentConfig> {
        let path = self.path_for(env);
        if !path.exists() {
            return Err(Error::ConfigNotFound { path });
        }

        let content = fs::read_to_string(&path).map_err(|e| Error::io(&path, e))?;
        let mut doc: serde_yaml::Value =
            serde_yaml::from_str(&content).map_err(|source| Error::Yaml {
                path: path.clone(),
                source,
            })?;

        match key {
            Some(key) => {
                let key = VaultKey::derive(key);
                decrypt_tree(&mut doc, &key, "")?;
            }
            None => {
                if contains_ciphertext(&doc) {
                    log::warn!("{} holds encrypted values but no key was given", path.display());
                }
            }
        }

        stringify_credentials(&mut doc);
        validate(env, &doc)?;

        let mut config: EnvironmentConfig =
            serde_yaml::from_value(doc).map_err(|e| Error::ConfigInvalid {
                env: env.to_string(),
                reason: e.to_string(),
            })?;
        config.name = env.to_string();

        log::debug!("Loaded environment {} from {}", env, path.display());
        Ok(config)
    }
}

/// Read numeric or boolean credentials (`pwd: 123456`) as text.
fn stringify_credentials(doc: &mut serde_yaml::Value) {
    let Some(cmp) = doc.get_mut("cmp").and_then(serde_yaml::Value::as_mapping_mut) else {
        return;
    };
    for key in ["user", "pwd", "secret", "client_id"] {
        let Some(value) = cmp.get_mut(key) else {
            continue;
        };
        let text = match value {
            serde_yaml::Value::Number(n) => n.to_string(),
            serde_yaml::Value::Bool(b) => b.to_string(),
            _ => continue,
        };
        *value = serde_yaml::Value::String(text);
    }
}

/// Check required keys before typed deserialization, for clearer errors.
fn validate(env: &str, doc: &serde_yaml::Value) -> Result<()> {
    let invalid = |reason: &str| Error::ConfigInvalid {
        env: env.to_string(),
        reason: reason.to_string(),
    };

    let cmp = doc
        .get("cmp")
        .filter(|c| c.is_mapping())
        .ok_or_else(|| invalid("missing 'cmp' section"))?;

    let user = cmp.get("user").and_then(serde_yaml::Value::as_str).unwrap_or("");
    if user.trim().is_empty() {
        return Err(invalid("missing 'cmp.user'"));
    }

    let has = |k: &str| {
        cmp.get(k)
            .and_then(serde_yaml::Value::as_str)
            .is_some_and(|v| !v.is_empty())
    };
    let authtype = cmp
        .get("authtype")
        .and_then(serde_yaml::Value::as_str)
        .unwrap_or("keyauth");
    let credential_ok = match authtype {
        "keyauth" => has("pwd"),
        "oauth2" => has("secret"),
        other => return Err(invalid(&format!("unknown authtype '{other}'"))),
    };
    if !credential_ok {
        return Err(invalid(&format!(
            "no credential for authtype {authtype} (expected cmp.{})",
            if authtype == "oauth2" { "secret" } else { "pwd" }
        )));
    }

    if !has("endpoint") && cmp.get("endpoints").is_none_or(|e| !e.is_mapping()) {
        return Err(invalid("missing 'cmp.endpoint' or 'cmp.endpoints'"));
    }

    Ok(())
}

fn decrypt_tree(value: &mut serde_yaml::Value, key: &VaultKey, at: &str) -> Result<()> {
    match value {
        serde_yaml::Value::String(s) if vault::is_encrypted(s) => {
            *s = vault::decrypt(key, s).map_err(|reason| Error::ConfigDecrypt {
                field: at.to_string(),
                reason,
            })?;
        }
        serde_yaml::Value::Mapping(map) => {
            for (k, v) in map.iter_mut() {
                let name = k.as_str().map(str::to_string).unwrap_or_else(|| format!("{k:?}"));
                let child = if at.is_empty() {
                    name
                } else {
                    format!("{at}.{name}")
                };
                decrypt_tree(v, key, &child)?;
            }
        }
        serde_yaml::Value::Sequence(items) => {
            for (i, item) in items.iter_mut().enumerate() {
                decrypt_tree(item, key, &format!("{at}[{i}]"))?;
            }
        }
        _ => {}
    }
    Ok(())
}

fn contains_ciphertext(value: &serde_yaml::Value) -> bool {
    match value {
        serde_yaml::Value::String(s) => vault::is_encrypted(s),
        serde_yaml::Value::Mapping(map) => map.values().any(contains_ciphertext),
        serde_yaml::Value::Sequence(items) => items.iter().any(contains_ciphertext),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const DEV: &str = r"
cmp:
  endpoint: https://cmp.dev.local/
  authtype: keyauth
  user: admin@local
  pwd: changeme
  catalog: default
orchestrators:
  openstack:
    site01:
      proto: https
      hosts: [10.0.0.1, 10.0.0.2]
      port: 5000
      user: admin
      pwd: os-secret
";

    fn write_env(dir: &TempDir, env: &str, content: &str) {
        fs::write(dir.path().join(format!("{env}.yml")), content).unwrap();
    }

    #[test]
    fn test_load_valid_env() {
        let dir = TempDir::new().unwrap();
        write_env(&dir, "dev", DEV);

        let config = ConfigLoader::new(dir.path()).load("dev", None).unwrap();
        assert_eq!(config.name, "dev");
        assert_eq!(config.cmp.user, "admin@local");
        assert_eq!(config.cmp.pwd.as_deref(), Some("changeme"));
        assert_eq!(config.cmp.authtype, AuthType::Keyauth);
        assert_eq!(
            config.cmp.endpoint_map().resolve("auth").unwrap(),
            "https://cmp.dev.local"
        );
    }

    #[test]
    fn test_required_fields_survive_round_trip() {
        let dir = TempDir::new().unwrap();
        write_env(&dir, "dev", DEV);
        let loader = ConfigLoader::new(dir.path());
        let first = loader.load("dev", None).unwrap();

        write_env(&dir, "copy", &serde_yaml::to_string(&first).unwrap());
        let mut second = loader.load("copy", None).unwrap();
        second.name = first.name.clone();

        assert_eq!(first, second);
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = ConfigLoader::new(dir.path()).load("nope", None).unwrap_err();
        assert!(matches!(err, Error::ConfigNotFound { .. }));
    }

    #[test]
    fn test_missing_user_is_invalid() {
        let dir = TempDir::new().unwrap();
        write_env(&dir, "bad", "cmp:\n  endpoint: http://x\n  pwd: p\n");
        let err = ConfigLoader::new(dir.path()).load("bad", None).unwrap_err();
        match err {
            Error::ConfigInvalid { reason, .. } => assert!(reason.contains("cmp.user")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_cmp_is_invalid() {
        let dir = TempDir::new().unwrap();
        write_env(&dir, "bad", "ldap:\n  main: {}\n");
        let err = ConfigLoader::new(dir.path()).load("bad", None).unwrap_err();
        assert!(matches!(err, Error::ConfigInvalid { .. }));
    }

    #[test]
    fn test_missing_credential_is_invalid() {
        let dir = TempDir::new().unwrap();
        write_env(&dir, "bad", "cmp:\n  endpoint: http://x\n  user: u\n");
        assert!(matches!(
            ConfigLoader::new(dir.path()).load("bad", None),
            Err(Error::ConfigInvalid { .. })
        ));

        write_env(
            &dir,
            "oauth",
            "cmp:\n  endpoint: http://x\n  user: u\n  authtype: oauth2\n  pwd: p\n",
        );
        assert!(matches!(
            ConfigLoader::new(dir.path()).load("oauth", None),
            Err(Error::ConfigInvalid { .. })
        ));
    }

    #[test]
    fn test_numeric_password_is_text() {
        let dir = TempDir::new().unwrap();
        write_env(&dir, "num", "cmp:\n  endpoint: http://x\n  user: u\n  pwd: 123456\n");
        let config = ConfigLoader::new(dir.path()).load("num", None).unwrap();
        assert_eq!(config.cmp.pwd.as_deref(), Some("123456"));
    }

    #[test]
    fn test_missing_endpoint_is_invalid() {
        let dir = TempDir::new().unwrap();
        write_env(&dir, "bad", "cmp:\n  user: u\n  pwd: p\n");
        match ConfigLoader::new(dir.path()).load("bad", None).unwrap_err() {
            Error::ConfigInvalid { reason, .. } => assert!(reason.contains("cmp.endpoint")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_decrypts_fields_with_key() {
        let dir = TempDir::new().unwrap();
        let key = VaultKey::derive("k3y");
        let sealed = vault::encrypt(&key, "hidden").unwrap();
        write_env(
            &dir,
            "enc",
            &format!("cmp:\n  endpoint: http://x\n  user: u\n  pwd: \"{sealed}\"\n"),
        );

        let config = ConfigLoader::new(dir.path()).load("enc", Some("k3y")).unwrap();
        assert_eq!(config.cmp.pwd.as_deref(), Some("hidden"));
    }

    #[test]
    fn test_decrypt_error_names_field() {
        let dir = TempDir::new().unwrap();
        let sealed = vault::encrypt(&VaultKey::derive("right"), "hidden").unwrap();
        write_env(
            &dir,
            "enc",
            &format!("cmp:\n  endpoint: http://x\n  user: u\n  pwd: \"{sealed}\"\n"),
        );

        let err = ConfigLoader::new(dir.path())
            .load("enc", Some("wrong"))
            .unwrap_err();
        match err {
            Error::ConfigDecrypt { field, .. } => assert_eq!(field, "cmp.pwd"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_list_envs() {
        let dir = TempDir::new().unwrap();
        write_env(&dir, "prod", DEV);
        write_env(&dir, "dev", DEV);
        fs::write(dir.path().join("notes.txt"), "x").unwrap();

        let envs = ConfigLoader::new(dir.path()).list().unwrap();
        assert_eq!(envs, vec!["dev".to_string(), "prod".to_string()]);
    }

    #[test]
    fn test_get_orchestrator() {
        let dir = TempDir::new().unwrap();
        write_env(&dir, "dev", DEV);
        let config = ConfigLoader::new(dir.path()).load("dev", None).unwrap();

        let site = config.get_orchestrator("openstack", "site01").unwrap();
        assert_eq!(site["port"], 5000);
        assert!(config.get_orchestrator("openstack", "missing").is_err());
        assert!(config.get_orchestrator("vsphere", "site01").is_err());
    }

    #[test]
    fn test_endpoint_map_per_subsystem() {
        let mut endpoints = BTreeMap::new();
        endpoints.insert("auth".to_string(), "https://auth.local/".to_string());
        endpoints.insert("resource".to_string(), String::new());
        let map = EndpointMap::PerSubsystem(endpoints);

        assert_eq!(map.resolve("auth").unwrap(), "https://auth.local");
        assert!(map.resolve("resource").is_err());
        assert!(map.resolve("service").is_err());
        assert!(map.is_per_subsystem());
    }
}

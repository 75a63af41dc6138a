use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use toml::Value;

use crate::error::{Error, Result};

/// Looked up in the working directory when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "savepoint.toml";

fn default_aws_bin() -> String {
    "aws".into()
}

fn default_timeout_secs() -> u64 {
    60
}

/// `[s3]` table. Every `*_env` field names an environment variable that is
/// consulted when the matching literal is empty.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct S3Config {
    pub aws_bin: String,
    pub timeout_secs: u64,
    pub paginate: bool,
    pub profile: Option<String>,
    pub profile_env: Option<String>,
    pub region: Option<String>,
    pub region_env: Option<String>,
    pub endpoint_url: Option<String>,
    pub endpoint_url_env: Option<String>,
    pub aws_access_key_id_env: Option<String>,
    pub aws_secret_access_key_env: Option<String>,
    pub aws_session_token_env: Option<String>,
    pub aws_shared_credentials_file_env: Option<String>,
    pub aws_config_file_env: Option<String>,
    pub aws_ca_bundle_env: Option<String>,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            aws_bin: default_aws_bin(),
            timeout_secs: default_timeout_secs(),
            paginate: false,
            profile: None,
            profile_env: None,
            region: None,
            region_env: None,
            endpoint_url: None,
            endpoint_url_env: None,
            aws_access_key_id_env: None,
            aws_secret_access_key_env: None,
            aws_session_token_env: None,
            aws_shared_credentials_file_env: None,
            aws_config_file_env: None,
            aws_ca_bundle_env: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    pub s3: S3Config,
}

#[derive(Debug, Clone)]
pub struct ConfigDoc {
    pub path: Option<PathBuf>,
    pub value: Value,
}

impl ConfigDoc {
    pub fn empty() -> Self {
        Self {
            path: None,
            value: Value::Table(Default::default()),
        }
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let value: Value = toml::from_str(raw)?;
        Ok(Self { path: None, value })
    }

    pub fn settings(&self) -> Result<Settings> {
        let settings: Settings = self
            .value
            .clone()
            .try_into()
            .map_err(|e| Error::config(format!("invalid config{}: {e}", self.origin())))?;
        if settings.s3.aws_bin.trim().is_empty() {
            return Err(Error::config(format!(
                "s3.aws_bin is empty{}",
                self.origin()
            )));
        }
        if settings.s3.timeout_secs == 0 {
            return Err(Error::config(format!(
                "s3.timeout_secs must be greater than zero{}",
                self.origin()
            )));
        }
        Ok(settings)
    }

    fn origin(&self) -> String {
        self.path
            .as_ref()
            .map(|p| format!(" in {}", p.display()))
            .unwrap_or_default()
    }
}

fn merge_values(base: &mut Value, child: Value) {
    match (base, child) {
        (Value::Table(base_tbl), Value::Table(child_tbl)) => {
            for (k, v) in child_tbl {
                match base_tbl.get_mut(&k) {
                    Some(existing) => merge_values(existing, v),
                    None => {
                        base_tbl.insert(k, v);
                    }
                }
            }
        }
        (base_slot, child_val) => {
            *base_slot = child_val;
        }
    }
}

fn resolve_ref_path(from_file: &Path, reference: &str) -> PathBuf {
    let p = PathBuf::from(reference);
    if p.is_absolute() {
        p
    } else {
        from_file.parent().unwrap_or_else(|| Path::new(".")).join(p)
    }
}

fn load_value_inner(path: &Path, stack: &mut HashSet<PathBuf>) -> Result<Value> {
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    if !stack.insert(canonical.clone()) {
        return Err(Error::config(format!(
            "config extends cycle detected at {}",
            canonical.display()
        )));
    }

    let data = fs::read_to_string(path)
        .map_err(|e| Error::config(format!("failed to read config {}: {e}", path.display())))?;
    let mut value: Value = toml::from_str(&data)
        .map_err(|e| Error::config(format!("TOML parse error in {}: {e}", path.display())))?;

    let mut out = Value::Table(Default::default());
    if let Some(ext) = value.get("extends").and_then(Value::as_str) {
        let base_path = resolve_ref_path(path, ext);
        out = load_value_inner(&base_path, stack)?;
    }
    if let Some(tbl) = value.as_table_mut() {
        tbl.remove("extends");
    }

    merge_values(&mut out, value);

    stack.remove(&canonical);
    Ok(out)
}

pub fn load(path: &Path) -> Result<ConfigDoc> {
    let mut stack = HashSet::<PathBuf>::new();
    let value = load_value_inner(path, &mut stack)?;
    Ok(ConfigDoc {
        path: Some(path.to_path_buf()),
        value,
    })
}

/// An explicit path must exist; otherwise [`DEFAULT_CONFIG_FILE`] is used
/// when present and built-in defaults when not.
pub fn discover(explicit: Option<&Path>) -> Result<ConfigDoc> {
    if let Some(path) = explicit {
        return load(path);
    }
    let fallback = Path::new(DEFAULT_CONFIG_FILE);
    if fallback.is_file() {
        return load(fallback);
    }
    Ok(ConfigDoc::empty())
}

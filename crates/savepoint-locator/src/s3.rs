use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;

use crate::config::S3Config;
use crate::error::{Error, ListFailure, Result};

const MAX_DETAIL_CHARS: usize = 2048;

/// One object returned by a bucket listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectEntry {
    pub key: String,
    pub last_modified: DateTime<Utc>,
}

impl ObjectEntry {
    pub fn new(key: impl Into<String>, last_modified: DateTime<Utc>) -> Self {
        Self {
            key: key.into(),
            last_modified,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListError {
    pub cause: ListFailure,
    pub detail: String,
}

impl ListError {
    pub fn new(cause: ListFailure, detail: impl Into<String>) -> Self {
        Self {
            cause,
            detail: detail.into(),
        }
    }
}

pub trait ObjectStore {
    fn list_objects(
        &self,
        bucket: &str,
        prefix: Option<&str>,
    ) -> std::result::Result<Vec<ObjectEntry>, ListError>;
}

/// Produces a ready client from configuration. Errors here are
/// configuration errors.
pub trait StoreLoader {
    type Store: ObjectStore;

    fn load(&self) -> Result<Self::Store>;
}

#[derive(Debug, Clone)]
pub struct S3Resolved {
    pub aws_bin: PathBuf,
    pub timeout: Duration,
    pub paginate: bool,
    pub profile: Option<String>,
    pub region: Option<String>,
    pub endpoint_url: Option<String>,
    pub command_env: BTreeMap<String, String>,
}

fn resolve_env_ref(env_key: Option<&str>) -> Option<String> {
    env_key
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|k| std::env::var(k).ok())
        .map(|v| v.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn resolve_string_field(literal: Option<&str>, env_key: Option<&str>) -> Option<String> {
    let direct = literal
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToOwned::to_owned);
    direct.or_else(|| resolve_env_ref(env_key))
}

fn find_executable(bin: &str) -> Option<PathBuf> {
    let candidate = Path::new(bin);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(bin))
        .find(|p| p.is_file())
}

pub fn resolve_s3_config(cfg: &S3Config) -> Result<S3Resolved> {
    let bin = cfg.aws_bin.trim();
    if bin.is_empty() {
        return Err(Error::config("s3.aws_bin is empty"));
    }
    let aws_bin = find_executable(bin)
        .ok_or_else(|| Error::config(format!("unable to load SDK config: '{bin}' not found")))?;
    if cfg.timeout_secs == 0 {
        return Err(Error::config("s3.timeout_secs must be greater than zero"));
    }

    // Unset fields fall through to the CLI's own AWS_PROFILE / AWS_REGION /
    // AWS_ENDPOINT_URL handling, which the child inherits.
    let profile = resolve_string_field(cfg.profile.as_deref(), cfg.profile_env.as_deref());
    let region = resolve_string_field(cfg.region.as_deref(), cfg.region_env.as_deref());
    let endpoint_url =
        resolve_string_field(cfg.endpoint_url.as_deref(), cfg.endpoint_url_env.as_deref());

    let mut command_env = BTreeMap::<String, String>::new();
    for (dst, src) in [
        ("AWS_ACCESS_KEY_ID", cfg.aws_access_key_id_env.as_deref()),
        (
            "AWS_SECRET_ACCESS_KEY",
            cfg.aws_secret_access_key_env.as_deref(),
        ),
        ("AWS_SESSION_TOKEN", cfg.aws_session_token_env.as_deref()),
        (
            "AWS_SHARED_CREDENTIALS_FILE",
            cfg.aws_shared_credentials_file_env.as_deref(),
        ),
        ("AWS_CONFIG_FILE", cfg.aws_config_file_env.as_deref()),
        ("AWS_CA_BUNDLE", cfg.aws_ca_bundle_env.as_deref()),
    ] {
        if let Some(v) = resolve_env_ref(src) {
            command_env.insert(dst.to_string(), v);
        }
    }

    Ok(S3Resolved {
        aws_bin,
        timeout: Duration::from_secs(cfg.timeout_secs),
        paginate: cfg.paginate,
        profile,
        region,
        endpoint_url,
        command_env,
    })
}

/// Loads an [`AwsCliStore`] from `[s3]` settings.
#[derive(Debug, Clone, Default)]
pub struct AwsCliLoader {
    cfg: S3Config,
}

impl AwsCliLoader {
    pub fn new(cfg: S3Config) -> Self {
        Self { cfg }
    }
}

impl StoreLoader for AwsCliLoader {
    type Store = AwsCliStore;

    fn load(&self) -> Result<AwsCliStore> {
        Ok(AwsCliStore {
            cfg: resolve_s3_config(&self.cfg)?,
        })
    }
}

/// Lists objects by running `aws s3api list-objects-v2`.
#[derive(Debug, Clone)]
pub struct AwsCliStore {
    cfg: S3Resolved,
}

impl AwsCliStore {
    pub fn resolved(&self) -> &S3Resolved {
        &self.cfg
    }

    fn list_command(&self, bucket: &str, prefix: Option<&str>) -> Command {
        let mut cmd = Command::new(&self.cfg.aws_bin);
        if let Some(profile) = self.cfg.profile.as_deref() {
            cmd.arg("--profile").arg(profile);
        }
        if let Some(region) = self.cfg.region.as_deref() {
            cmd.arg("--region").arg(region);
        }
        if let Some(endpoint) = self.cfg.endpoint_url.as_deref() {
            cmd.arg("--endpoint-url").arg(endpoint);
        }
        for (k, v) in &self.cfg.command_env {
            cmd.env(k, v);
        }
        cmd.arg("s3api")
            .arg("list-objects-v2")
            .arg("--bucket")
            .arg(bucket);
        if let Some(prefix) = prefix {
            cmd.arg("--prefix").arg(prefix);
        }
        if !self.cfg.paginate {
            cmd.arg("--no-paginate");
        }
        cmd.arg("--output").arg("json");
        cmd
    }
}

impl ObjectStore for AwsCliStore {
    fn list_objects(
        &self,
        bucket: &str,
        prefix: Option<&str>,
    ) -> std::result::Result<Vec<ObjectEntry>, ListError> {
        let mut cmd = self.list_command(bucket, prefix);
        debug!(bucket, prefix, paginate = self.cfg.paginate, "listing objects");
        let out = run_with_timeout(&mut cmd, self.cfg.timeout)
            .map_err(|e| ListError::new(ListFailure::Request, e))?;
        if !out.status.success() {
            let msg = command_summary(&out);
            return Err(ListError::new(classify_failure(&msg), msg));
        }
        parse_listing(&out.stdout).map_err(|e| ListError::new(ListFailure::Request, e))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListObjectsOutput {
    #[serde(default)]
    contents: Vec<ListedObject>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListedObject {
    key: String,
    last_modified: DateTime<Utc>,
}

/// Parses `list-objects-v2 --output json`. An empty bucket prints nothing
/// at all rather than an empty document.
pub fn parse_listing(stdout: &[u8]) -> std::result::Result<Vec<ObjectEntry>, String> {
    let body = String::from_utf8_lossy(stdout);
    if body.trim().is_empty() {
        return Ok(Vec::new());
    }
    let doc: ListObjectsOutput = serde_json::from_str(&body)
        .map_err(|e| format!("S3 list JSON parse failed: {e}"))?;
    Ok(doc
        .contents
        .into_iter()
        .map(|o| ObjectEntry::new(o.key, o.last_modified))
        .collect())
}

pub fn classify_failure(msg: &str) -> ListFailure {
    let m = msg.to_ascii_lowercase();
    if m.contains("nosuchbucket") || m.contains("bucket does not exist") {
        ListFailure::NoSuchBucket
    } else {
        ListFailure::Request
    }
}

struct Output {
    status: ExitStatus,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

fn command_summary(out: &Output) -> String {
    let stderr = String::from_utf8_lossy(&out.stderr).trim().to_string();
    let stdout = String::from_utf8_lossy(&out.stdout).trim().to_string();
    if !stderr.is_empty() {
        return sanitize_detail(&stderr);
    }
    if !stdout.is_empty() {
        return sanitize_detail(&stdout);
    }
    format!("status {}", out.status)
}

enum Escape {
    Start,
    Csi,
    Osc,
    OscEsc,
    String,
    StringEsc,
}

/// Collapses CLI output onto one line: control characters and ANSI escape
/// sequences (CSI, OSC and the ST-terminated kinds) are dropped and the
/// result is capped.
pub fn sanitize_detail(input: &str) -> String {
    let mut out = String::with_capacity(input.len().min(MAX_DETAIL_CHARS));
    let mut esc: Option<Escape> = None;
    let mut count = 0usize;
    for c in input.chars() {
        if let Some(mode) = esc.take() {
            esc = match mode {
                Escape::Start => match c {
                    '[' => Some(Escape::Csi),
                    ']' => Some(Escape::Osc),
                    'P' | 'X' | '^' | '_' => Some(Escape::String),
                    _ => None,
                },
                Escape::Csi if ('@'..='~').contains(&c) => None,
                Escape::Csi => Some(Escape::Csi),
                Escape::Osc => match c {
                    '\x07' => None,
                    '\x1b' => Some(Escape::OscEsc),
                    _ => Some(Escape::Osc),
                },
                Escape::OscEsc => match c {
                    '\\' => None,
                    '\x1b' => Some(Escape::OscEsc),
                    _ => Some(Escape::Osc),
                },
                Escape::String => match c {
                    '\x1b' => Some(Escape::StringEsc),
                    _ => Some(Escape::String),
                },
                Escape::StringEsc => match c {
                    '\\' => None,
                    '\x1b' => Some(Escape::StringEsc),
                    _ => Some(Escape::String),
                },
            };
            continue;
        }
        match c {
            '\x1b' => esc = Some(Escape::Start),
            '\n' | '\r' | '\t' => {
                if !out.ends_with(' ') {
                    out.push(' ');
                    count += 1;
                }
            }
            c if c.is_control() => {}
            c => {
                out.push(c);
                count += 1;
            }
        }
        if count >= MAX_DETAIL_CHARS {
            out.push_str(" ...[truncated]");
            break;
        }
    }
    out.trim().to_string()
}

fn read_pipe<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut p) = pipe {
            let _ = p.read_to_end(&mut buf);
        }
        buf
    })
}

fn wait_deadline(child: &mut Child, timeout: Duration) -> std::result::Result<ExitStatus, String> {
    let started = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) => {}
            Err(e) => return Err(format!("wait failed: {e}")),
        }
        if started.elapsed() >= timeout {
            let _ = child.kill();
            let _ = child.wait();
            return Err(format!("timed out after {}s", timeout.as_secs()));
        }
        thread::sleep(Duration::from_millis(20));
    }
}

fn run_with_timeout(cmd: &mut Command, timeout: Duration) -> std::result::Result<Output, String> {
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| format!("failed to run command {:?}: {e}", cmd))?;

    let stdout = read_pipe(child.stdout.take());
    let stderr = read_pipe(child.stderr.take());
    let status = wait_deadline(&mut child, timeout)?;

    Ok(Output {
        status,
        stdout: stdout.join().unwrap_or_default(),
        stderr: stderr.join().unwrap_or_default(),
    })
}

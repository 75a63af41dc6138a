use percent_encoding::{AsciiSet, CONTROLS, percent_decode_str, utf8_percent_encode};
use url::Url;

use crate::error::{Error, ErrorKind, Result};

/// Schemes routed to object storage. Matching is exact; the URL parser has
/// already lowercased the scheme at this point.
pub const OBJECT_STORE_SCHEMES: &[&str] = &["s3", "s3a", "s3p"];

// Bytes escaped when a key becomes a URL path. `%` is included so keys that
// already contain escapes survive a decode unchanged.
const KEY_ESCAPE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

/// A bucket/prefix address on object storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectLocation {
    pub scheme: String,
    pub bucket: String,
    pub port: Option<u16>,
    pub path: String,
}

impl ObjectLocation {
    fn from_url(url: &Url) -> Self {
        Self {
            scheme: url.scheme().to_string(),
            bucket: url.host_str().unwrap_or_default().to_string(),
            port: url.port(),
            path: decode_path(url.path()),
        }
    }

    /// Listing prefix; `None` when the location has no path at all.
    pub fn prefix(&self) -> Option<&str> {
        if self.path.is_empty() {
            return None;
        }
        Some(self.path.trim_start_matches('/'))
    }

    /// Same scheme and bucket, path replaced by `key`.
    pub fn with_key(&self, key: &str) -> Result<String> {
        if self.bucket.is_empty() {
            return Err(Error::new(
                ErrorKind::InvalidLocation,
                format!("{}:// location has no bucket", self.scheme),
            ));
        }
        let base = match self.port {
            Some(port) => format!("{}://{}:{}", self.scheme, self.bucket, port),
            None => format!("{}://{}", self.scheme, self.bucket),
        };
        let mut url = Url::parse(&base)
            .map_err(|e| Error::msg(format!("failed to rebuild location {base}: {e}")))?;
        let escaped = utf8_percent_encode(key, KEY_ESCAPE).to_string();
        if escaped.starts_with('/') {
            url.set_path(&escaped);
        } else {
            url.set_path(&format!("/{escaped}"));
        }
        Ok(url.to_string())
    }
}

/// Which backend a location string belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    ObjectStore(ObjectLocation),
    Local(String),
}

impl Backend {
    pub fn name(&self) -> &'static str {
        match self {
            Backend::ObjectStore(_) => "object-store",
            Backend::Local(_) => "local",
        }
    }
}

/// Strings that fail to parse, have no scheme, or carry any scheme outside
/// [`OBJECT_STORE_SCHEMES`] are local paths, kept verbatim.
pub fn classify(location: &str) -> Backend {
    match Url::parse(location) {
        Ok(url) if OBJECT_STORE_SCHEMES.contains(&url.scheme()) => {
            Backend::ObjectStore(ObjectLocation::from_url(&url))
        }
        _ => Backend::Local(location.to_string()),
    }
}

fn decode_path(raw: &str) -> String {
    percent_decode_str(raw).decode_utf8_lossy().into_owned()
}

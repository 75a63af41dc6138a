use std::fmt;

/// Why an object-storage listing failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListFailure {
    NoSuchBucket,
    Request,
}

impl fmt::Display for ListFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListFailure::NoSuchBucket => write!(f, "no such bucket"),
            ListFailure::Request => write!(f, "request failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Client configuration or the config file could not be loaded.
    Config,
    /// The object-storage listing request failed.
    Listing(ListFailure),
    /// A local directory was listed fine but holds nothing.
    EmptyDirectory { dir: String },
    /// Metadata of one local entry could not be read.
    Stat { path: String },
    /// The local directory itself could not be listed.
    DirectoryListing { dir: String },
    /// An object-storage location without a bucket.
    InvalidLocation,
    Other,
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    msg: String,
    source: Option<std::io::Error>,
}

impl Error {
    pub fn msg<M: Into<String>>(msg: M) -> Self {
        Self::new(ErrorKind::Other, msg)
    }

    pub fn new<M: Into<String>>(kind: ErrorKind, msg: M) -> Self {
        Self {
            kind,
            msg: msg.into(),
            source: None,
        }
    }

    /// Surfaces an io error as-is: its own text, reachable via `source()`.
    pub fn io(kind: ErrorKind, err: std::io::Error) -> Self {
        Self {
            kind,
            msg: err.to_string(),
            source: Some(err),
        }
    }

    pub fn config<M: Into<String>>(msg: M) -> Self {
        Self::new(ErrorKind::Config, msg)
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn list_failure(&self) -> Option<ListFailure> {
        match self.kind {
            ErrorKind::Listing(cause) => Some(cause),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.msg)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::io(ErrorKind::Other, err)
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

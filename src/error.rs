use thiserror::Error;

pub type Result<T> = std::result::Result<T, FeedError>;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Persistence failed: {0}")]
    Persistence(String),
    #[error("Remote call failed: {0}")]
    Remote(String),
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Unknown feed item: {0}")]
    UnknownItem(String),
    #[error("Scroll host not ready")]
    NotReady,
}

/// How a resource load failure should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadErrorKind {
    /// Network blip or timeout; retry the same locator.
    Transient,
    /// The signed locator expired or was rejected; drop it and refetch.
    ExpiredLocator,
}

/// Error reported by the host decoder when a resource fails to load.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadError {
    pub code: Option<i32>,
    pub domain: Option<String>,
    pub message: String,
}

impl LoadError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            domain: None,
            message: message.into(),
        }
    }

    pub fn with_code(mut self, code: i32) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    /// Categorizes the error from its code, domain and message.
    ///
    /// Decoders report authorization failures inconsistently, so the message
    /// and domain are searched as well as the numeric code.
    pub fn classify(&self) -> LoadErrorKind {
        if matches!(self.code, Some(401) | Some(403) | Some(410)) {
            return LoadErrorKind::ExpiredLocator;
        }

        const EXPIRED_MARKERS: [&str; 8] = [
            "expired",
            "forbidden",
            "unauthorized",
            "access denied",
            "signature",
            "401",
            "403",
            "410",
        ];

        let message = self.message.to_lowercase();
        let domain = self.domain.as_deref().unwrap_or_default().to_lowercase();

        if EXPIRED_MARKERS
            .iter()
            .any(|marker| message.contains(marker) || domain.contains(marker))
        {
            LoadErrorKind::ExpiredLocator
        } else {
            LoadErrorKind::Transient
        }
    }
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.code, &self.domain) {
            (Some(code), Some(domain)) => write!(f, "{} ({} {})", self.message, domain, code),
            (Some(code), None) => write!(f, "{} ({})", self.message, code),
            (None, Some(domain)) => write!(f, "{} ({})", self.message, domain),
            (None, None) => write!(f, "{}", self.message),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// io error
    #[error("io error {0}")]
    IoError(#[from] std::io::Error),

    #[error("Connect timeout")]
    ConnectTimeout(#[from] tokio::time::error::Elapsed),

    /// anyhow error
    #[error("anyhow error {0}")]
    AnyhowError(#[from] anyhow::Error),

    #[error("{0}")]
    Message(String),

    #[error("Invalid uri {0}")]
    UriParseError(#[from] http::uri::InvalidUri),

    #[error("Request body is empty")]
    EmptyRequest,

    #[error("Resolve dns address error {0}")]
    ResolveDnsError(#[from] trust_dns_resolver::error::ResolveError),

    #[error("Websocket error {0}")]
    WebsocketError(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Invalid uuid {0}")]
    UuidError(#[from] uuid::Error),

    #[error("Invalid regex {0}")]
    RegexError(#[from] regex::Error),

    #[error("Parse config file error {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// configuration errors always name the offending field
    #[error("invalid configuration field `{field}`: {reason}")]
    Config { field: String, reason: String },

    #[error("No rule matched for {0}")]
    NoRuleMatched(String),

    #[error("Protocol error {0}")]
    Protocol(String),

    #[error("Malformed frame {0}")]
    MalformedFrame(String),

    #[error("Checksum mismatch, expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    #[error("Crypto error {0}")]
    Crypto(String),

    #[error("Socks5 request parse error {0}")]
    Socks5ParseError(String),

    #[error("Adapter is closed")]
    AdapterClosed,
}

impl Error {
    pub fn config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Config {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Decode failures that end a single connection but say nothing about the
    /// health of the process.
    pub fn is_decode_failure(&self) -> bool {
        matches!(self, Error::ChecksumMismatch { .. } | Error::MalformedFrame(_))
    }
}

impl From<String> for Error {
    fn from(value: String) -> Self {
        Error::Message(value)
    }
}

impl From<&str> for Error {
    fn from(value: &str) -> Self {
        Error::Message(value.to_string())
    }
}

#[cfg(test)]
mod test {
    use super::Error;

    #[test]
    fn test_config_error_names_field() {
        let e = Error::config("rules[2].adapter", "unknown adapter id");
        assert_eq!(
            e.to_string(),
            "invalid configuration field `rules[2].adapter`: unknown adapter id"
        );
    }

    #[test]
    fn test_decode_failure() {
        assert!(Error::ChecksumMismatch { expected: 1, actual: 2 }.is_decode_failure());
        assert!(Error::MalformedFrame("short".to_string()).is_decode_failure());
        assert!(!Error::AdapterClosed.is_decode_failure());
        assert!(!Error::Protocol("upstream proxy refused connect with 403".to_string()).is_decode_failure());
    }
}

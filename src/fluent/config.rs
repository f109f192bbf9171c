//! Configuration consumed by [`FluentSink`](super::FluentSink).

use std::{collections::BTreeMap, time::Duration};

use thiserror::Error;

use super::transport::FluentTransport;

/// Default timeout for establishing a connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default write timeout applied to each send.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(1);

/// Errors raised while validating sink configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid sink configuration: {0}")]
    InvalidConfig(String),
}

macro_rules! ensure_positive {
    ($is_zero:expr, $field:expr) => {{
        if $is_zero {
            Err(ConfigError::InvalidConfig(format!(
                "{} must be greater than zero",
                $field
            )))
        } else {
            Ok(())
        }
    }};
}

/// Everything a [`FluentSink`](super::FluentSink) needs to reach a collector
/// and shape its records.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FluentSinkConfig {
    pub transport: FluentTransport,
    /// Fluent tag attached to every message.
    pub tag: String,
    /// Value of the record's `stream` field, e.g. `"stdout"`.
    pub stream: String,
    /// Extra record attributes. A key shared with `log` or `stream`
    /// overrides that field.
    pub extra: BTreeMap<String, String>,
    pub connect_timeout: Duration,
    pub write_timeout: Duration,
    /// Upper bound on one encoded message. `None` sends lines of any length.
    pub max_frame_size: Option<usize>,
}

impl FluentSinkConfig {
    pub fn new(
        transport: FluentTransport,
        tag: impl Into<String>,
        stream: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            tag: tag.into(),
            stream: stream.into(),
            extra: BTreeMap::new(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            max_frame_size: None,
        }
    }

    pub fn with_extra(mut self, extra: BTreeMap<String, String>) -> Self {
        self.extra = extra;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Reject messages whose encoding exceeds `size` bytes.
    pub fn with_max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = Some(size);
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tag.is_empty() {
            return Err(ConfigError::InvalidConfig("tag must not be empty".into()));
        }
        ensure_positive!(self.connect_timeout.is_zero(), "connect_timeout")?;
        ensure_positive!(self.write_timeout.is_zero(), "write_timeout")?;
        ensure_positive!(self.max_frame_size == Some(0), "max_frame_size")?;
        match &self.transport {
            FluentTransport::Tcp(tcp) => {
                if tcp.host.is_empty() {
                    return Err(ConfigError::InvalidConfig("host must not be empty".into()));
                }
                ensure_positive!(tcp.port == 0, "port")?;
                if let Some(tls) = &tcp.tls
                    && tls.domain.is_empty()
                {
                    return Err(ConfigError::InvalidConfig(
                        "tls domain must not be empty".into(),
                    ));
                }
            }
            FluentTransport::Unix(unix) => {
                if unix.path.as_os_str().is_empty() {
                    return Err(ConfigError::InvalidConfig(
                        "socket path must not be empty".into(),
                    ));
                }
            }
        }
        Ok(())
    }
}

//! [`Sink`] implementation speaking the Fluent Forward protocol.

use std::{fmt, io::Write};

use chrono::Utc;
use log::debug;

use super::{
    config::{ConfigError, FluentSinkConfig},
    message::encode_message,
    transport::{ActiveConnection, connect_transport},
};
use crate::sink::{Sink, SinkError};

/// Sends each line as one Fluent Forward message.
///
/// Not connected until [`Sink::connect`] succeeds.
pub struct FluentSink {
    config: FluentSinkConfig,
    connection: Option<ActiveConnection>,
}

impl FluentSink {
    pub fn new(config: FluentSinkConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            connection: None,
        })
    }

    pub fn config(&self) -> &FluentSinkConfig {
        &self.config
    }

    fn open(&self) -> Result<ActiveConnection, SinkError> {
        let transport = &self.config.transport;
        let connect_error = |source| SinkError::Connect {
            target: transport.to_string(),
            source,
        };
        let connection =
            connect_transport(transport, self.config.connect_timeout).map_err(connect_error)?;
        connection
            .set_write_timeout(self.config.write_timeout)
            .map_err(connect_error)?;
        Ok(connection)
    }
}

impl Sink for FluentSink {
    fn connect(&mut self) -> Result<(), SinkError> {
        if let Some(mut stale) = self.connection.take() {
            let _ = stale.shutdown();
        }
        let connection = self.open()?;
        debug!("connected to {}", self.config.transport);
        self.connection = Some(connection);
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), SinkError> {
        match self.connection.take() {
            Some(mut connection) => connection.shutdown().map_err(SinkError::from),
            None => Ok(()),
        }
    }

    fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    fn send(&mut self, line: &str) -> Result<(), SinkError> {
        let Some(connection) = self.connection.as_mut() else {
            return Err(SinkError::NotConnected);
        };
        let frame = encode_message(&self.config, line, Utc::now().timestamp())?;
        connection.write_all(&frame)?;
        connection.flush()?;
        Ok(())
    }
}

impl fmt::Debug for FluentSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FluentSink")
            .field("transport", &self.config.transport.to_string())
            .field("tag", &self.config.tag)
            .field("stream", &self.config.stream)
            .field("connected", &self.is_connected())
            .finish()
    }
}

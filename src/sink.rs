//! The remote destination consumed by the delivery loop.

use std::io;

use thiserror::Error;

/// Errors reported by [`Sink`] implementations.
#[derive(Debug, Error)]
pub enum SinkError {
    /// `send` was called without an established connection.
    #[error("sink is not connected")]
    NotConnected,
    /// The connection could not be established.
    #[error("failed to connect to {target}: {source}")]
    Connect {
        target: String,
        #[source]
        source: io::Error,
    },
    /// The line could not be encoded for the wire.
    #[error("failed to encode record: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    /// The encoded record exceeds the configured frame limit.
    #[error("encoded record is {size} bytes; limit is {limit}")]
    FrameTooLarge { size: usize, limit: usize },
    /// Transport failure while writing or closing.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl SinkError {
    /// Whether the error says something about the connection.
    ///
    /// `false` for errors the line itself causes: encoding it again over a
    /// fresh connection fails the same way.
    pub fn is_connection_fault(&self) -> bool {
        !matches!(self, Self::Encode(_) | Self::FrameTooLarge { .. })
    }
}

/// A log destination that requires a connection.
///
/// The delivery loop owns its sink exclusively, so methods take `&mut self`
/// and implementations need no internal locking.
pub trait Sink: Send {
    /// Establish the connection, replacing any existing one.
    fn connect(&mut self) -> Result<(), SinkError>;

    /// Release the connection. Must return `Ok(())` when already disconnected.
    fn disconnect(&mut self) -> Result<(), SinkError>;

    /// Whether a connection is currently held.
    fn is_connected(&self) -> bool;

    /// Transmit one line. An error for which
    /// [`SinkError::is_connection_fault`] holds means the connection should
    /// be treated as broken.
    fn send(&mut self, line: &str) -> Result<(), SinkError>;
}

impl<S: Sink + ?Sized> Sink for Box<S> {
    fn connect(&mut self) -> Result<(), SinkError> {
        (**self).connect()
    }

    fn disconnect(&mut self) -> Result<(), SinkError> {
        (**self).disconnect()
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn send(&mut self, line: &str) -> Result<(), SinkError> {
        (**self).send(line)
    }
}

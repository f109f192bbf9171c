//! Fluent Forward protocol sink.
//!
//! [`FluentSink`] encodes every relayed line as a Fluent Forward *Message
//! mode* entry and writes it to a collector such as fluent-bit or fluentd
//! over TCP, TLS, or a Unix domain socket. Connection management beyond a
//! single connect is left to the delivery loop's retry policy.

pub mod address;
mod config;
mod message;
mod sink;
mod transport;


pub use address::{AddressError, parse_address, parse_extra_attrs};
pub use config::{ConfigError, DEFAULT_CONNECT_TIMEOUT, DEFAULT_WRITE_TIMEOUT, FluentSinkConfig};
pub use message::encode_message;
pub use sink::FluentSink;
pub use transport::{FluentTransport, TcpTransport, TlsOptions, UnixTransport};

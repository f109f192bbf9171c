//! Transports a Fluent collector can be reached over, and the connection
//! they yield.

use std::{
    fmt,
    io::{self, Write},
    net::{Shutdown, TcpStream, ToSocketAddrs},
    path::PathBuf,
    time::Duration,
};

use native_tls::{TlsConnector, TlsStream};

#[cfg(unix)]
use std::os::unix::net::UnixStream;

/// Where a Fluent collector listens.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FluentTransport {
    /// TCP, optionally wrapped in TLS.
    Tcp(TcpTransport),
    /// A Unix domain stream socket.
    Unix(UnixTransport),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TcpTransport {
    pub host: String,
    pub port: u16,
    /// Present for `tls://` addresses.
    pub tls: Option<TlsOptions>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnixTransport {
    pub path: PathBuf,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TlsOptions {
    /// Name checked against the collector's certificate.
    pub domain: String,
    /// Accept any certificate and host name.
    pub insecure_skip_verify: bool,
}

impl FluentTransport {
    /// Disable certificate checks if this is a TLS transport.
    pub fn with_insecure_tls(mut self, insecure: bool) -> Self {
        if let Self::Tcp(TcpTransport { tls: Some(tls), .. }) = &mut self {
            tls.insecure_skip_verify = insecure;
        }
        self
    }
}

impl fmt::Display for FluentTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp(tcp) => {
                let scheme = if tcp.tls.is_some() { "tls" } else { "tcp" };
                if tcp.host.contains(':') {
                    write!(f, "{scheme}://[{}]:{}", tcp.host, tcp.port)
                } else {
                    write!(f, "{scheme}://{}:{}", tcp.host, tcp.port)
                }
            }
            Self::Unix(unix) => write!(f, "unix://{}", unix.path.display()),
        }
    }
}

/// Established connection to a collector.
///
/// Writes go straight to the socket (or TLS session); callers flush after
/// each message.
pub enum ActiveConnection {
    PlainTcp(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl ActiveConnection {
    fn writer(&mut self) -> &mut dyn Write {
        match self {
            Self::PlainTcp(stream) => stream,
            Self::Tls(stream) => stream.as_mut(),
            #[cfg(unix)]
            Self::Unix(stream) => stream,
        }
    }

    /// Bound how long a single write may block.
    pub fn set_write_timeout(&self, timeout: Duration) -> io::Result<()> {
        match self {
            Self::PlainTcp(stream) => stream.set_write_timeout(Some(timeout)),
            Self::Tls(stream) => stream.get_ref().set_write_timeout(Some(timeout)),
            #[cfg(unix)]
            Self::Unix(stream) => stream.set_write_timeout(Some(timeout)),
        }
    }

    /// Close both directions. A peer that already went away is not an error.
    pub fn shutdown(&mut self) -> io::Result<()> {
        let result = match self {
            Self::PlainTcp(stream) => stream.shutdown(Shutdown::Both),
            Self::Tls(stream) => stream
                .shutdown()
                .and_then(|()| stream.get_ref().shutdown(Shutdown::Both)),
            #[cfg(unix)]
            Self::Unix(stream) => stream.shutdown(Shutdown::Both),
        };
        match result {
            Err(err) if err.kind() == io::ErrorKind::NotConnected => Ok(()),
            other => other,
        }
    }
}

impl Write for ActiveConnection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer().write(buf)
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.writer().write_all(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer().flush()
    }
}

/// Try each resolved address in turn; the last failure is reported.
fn connect_tcp(tcp: &TcpTransport, timeout: Duration) -> io::Result<TcpStream> {
    let mut last_err = None;
    for addr in (tcp.host.as_str(), tcp.port).to_socket_addrs()? {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => {
                stream.set_nodelay(true)?;
                return Ok(stream);
            }
            Err(err) => last_err = Some(err),
        }
    }
    Err(last_err.unwrap_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("{}:{} did not resolve to any address", tcp.host, tcp.port),
        )
    }))
}

/// Run the TLS handshake over `stream`, bounded by `timeout` in each
/// direction.
fn connect_tls(
    stream: TcpStream,
    tls: &TlsOptions,
    timeout: Duration,
) -> io::Result<TlsStream<TcpStream>> {
    let mut builder = TlsConnector::builder();
    if tls.insecure_skip_verify {
        builder
            .danger_accept_invalid_certs(true)
            .danger_accept_invalid_hostnames(true);
    }
    let connector = builder.build().map_err(io::Error::other)?;
    stream.set_read_timeout(Some(timeout))?;
    stream.set_write_timeout(Some(timeout))?;
    let session = connector
        .connect(&tls.domain, stream)
        .map_err(io::Error::other)?;
    session.get_ref().set_read_timeout(None)?;
    Ok(session)
}

#[cfg(unix)]
fn connect_unix(unix: &UnixTransport) -> io::Result<ActiveConnection> {
    UnixStream::connect(&unix.path).map(ActiveConnection::Unix)
}

#[cfg(not(unix))]
fn connect_unix(_unix: &UnixTransport) -> io::Result<ActiveConnection> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "unix domain sockets are not supported on this platform",
    ))
}

/// Open a connection to `transport`.
///
/// `connect_timeout` bounds the TCP connect and the TLS handshake. Unix
/// sockets connect without a timeout.
pub fn connect_transport(
    transport: &FluentTransport,
    connect_timeout: Duration,
) -> io::Result<ActiveConnection> {
    match transport {
        FluentTransport::Tcp(tcp) => {
            let stream = connect_tcp(tcp, connect_timeout)?;
            Ok(match &tcp.tls {
                Some(tls) => {
                    ActiveConnection::Tls(Box::new(connect_tls(stream, tls, connect_timeout)?))
                }
                None => ActiveConnection::PlainTcp(stream),
            })
        }
        FluentTransport::Unix(unix) => connect_unix(unix),
    }
}

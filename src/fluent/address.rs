//! Parsing of collector addresses and extra record attributes.

use std::{collections::BTreeMap, path::PathBuf};

use thiserror::Error;

use super::transport::{FluentTransport, TcpTransport, TlsOptions, UnixTransport};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("address is empty")]
    Empty,
    #[error("unsupported network '{0}'; expected tcp, tls or unix")]
    UnsupportedScheme(String),
    #[error("missing host in '{0}'")]
    MissingHost(String),
    #[error("missing port in '{0}'")]
    MissingPort(String),
    #[error("invalid port in '{0}'")]
    InvalidPort(String),
    #[error("unterminated '[' in '{0}'")]
    UnclosedBracket(String),
    #[error("missing socket path")]
    MissingPath,
}

/// Parse `[scheme://]addr` into a transport. A missing scheme means `tcp`.
pub fn parse_address(location: &str) -> Result<FluentTransport, AddressError> {
    let location = location.trim();
    if location.is_empty() {
        return Err(AddressError::Empty);
    }
    let (scheme, addr) = location.split_once("://").unwrap_or(("tcp", location));
    match scheme.to_ascii_lowercase().as_str() {
        "tcp" => {
            let (host, port) = split_host_port(addr)?;
            Ok(FluentTransport::Tcp(TcpTransport { host, port, tls: None }))
        }
        "tls" => {
            let (host, port) = split_host_port(addr)?;
            let tls = TlsOptions {
                domain: host.clone(),
                insecure_skip_verify: false,
            };
            Ok(FluentTransport::Tcp(TcpTransport {
                host,
                port,
                tls: Some(tls),
            }))
        }
        "unix" => {
            if addr.is_empty() {
                return Err(AddressError::MissingPath);
            }
            Ok(FluentTransport::Unix(UnixTransport {
                path: PathBuf::from(addr),
            }))
        }
        other => Err(AddressError::UnsupportedScheme(other.to_owned())),
    }
}

fn split_host_port(addr: &str) -> Result<(String, u16), AddressError> {
    let (host, port) = if let Some(rest) = addr.strip_prefix('[') {
        let (host, tail) = rest
            .split_once(']')
            .ok_or_else(|| AddressError::UnclosedBracket(addr.to_owned()))?;
        let port = tail
            .strip_prefix(':')
            .ok_or_else(|| AddressError::MissingPort(addr.to_owned()))?;
        (host, port)
    } else {
        addr.rsplit_once(':')
            .ok_or_else(|| AddressError::MissingPort(addr.to_owned()))?
    };
    if host.is_empty() {
        return Err(AddressError::MissingHost(addr.to_owned()));
    }
    if port.is_empty() {
        return Err(AddressError::MissingPort(addr.to_owned()));
    }
    let port = port
        .parse::<u16>()
        .ok()
        .filter(|port| *port != 0)
        .ok_or_else(|| AddressError::InvalidPort(addr.to_owned()))?;
    Ok((host.to_owned(), port))
}

/// Parse `k1=v1,k2=v2` into a map. Malformed entries are skipped.
pub fn parse_extra_attrs(input: &str) -> BTreeMap<String, String> {
    input
        .split(',')
        .filter_map(|entry| {
            let mut parts = entry.trim().split('=');
            match (parts.next(), parts.next(), parts.next()) {
                (Some(key), Some(value), None) => {
                    Some((key.trim().to_owned(), value.trim().to_owned()))
                }
                _ => None,
            }
        })
        .collect()
}

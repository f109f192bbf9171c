//! Fluent Forward message encoding.
//!
//! Each line becomes one *Message mode* entry: a MessagePack array of
//! `[tag, time, record]`. MessagePack values are self-delimiting, so entries
//! are written back to back without a length prefix.

use std::collections::BTreeMap;

use rmp_serde::Serializer;
use serde::Serialize;

use super::config::FluentSinkConfig;
use crate::sink::SinkError;

#[derive(Serialize)]
struct ForwardMessage<'a> {
    tag: &'a str,
    time: i64,
    record: BTreeMap<&'a str, &'a str>,
}

/// Build the record map for `line`. Extra attributes win over the built-in
/// `log` and `stream` fields.
pub fn build_record<'a>(config: &'a FluentSinkConfig, line: &'a str) -> BTreeMap<&'a str, &'a str> {
    let mut record = BTreeMap::new();
    record.insert("log", line);
    record.insert("stream", config.stream.as_str());
    for (key, value) in &config.extra {
        record.insert(key.as_str(), value.as_str());
    }
    record
}

/// Encode `line` as a Message mode entry stamped with `time` (seconds since
/// the Unix epoch).
pub fn encode_message(
    config: &FluentSinkConfig,
    line: &str,
    time: i64,
) -> Result<Vec<u8>, SinkError> {
    let message = ForwardMessage {
        tag: &config.tag,
        time,
        record: build_record(config, line),
    };
    let mut buf = Vec::with_capacity(line.len() + 64);
    // The default struct encoding is a positional array.
    message.serialize(&mut Serializer::new(&mut buf))?;
    if let Some(limit) = config.max_frame_size
        && buf.len() > limit
    {
        return Err(SinkError::FrameTooLarge {
            size: buf.len(),
            limit,
        });
    }
    Ok(buf)
}

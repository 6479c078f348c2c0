//! Detection enrichment
//!
//! Each detection gets its events attached as a JSON string. The encoding
//! matches what the downstream tables already hold from the Python
//! connector: `", "` / `": "` separators and ASCII-only output.

use serde::Serialize;
use serde_json::ser::Formatter;
use serde_json::Value;
use std::io;
use tracing::info;

use crate::errors::Result;
use crate::models::{Detection, EventsByDetection};

/// Set `events` on every detection from the UUID-keyed event map.
///
/// Detections without an entry get `"[]"`. Order and count are preserved.
pub fn add_events_to_detections(
    detections: &mut [Detection],
    detection_events: &EventsByDetection,
) -> Result<()> {
    info!("Start enriching detections with events.");
    for detection in detections.iter_mut() {
        let events = detection_events
            .get(&detection.uuid)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        detection.events = Some(encode_events(events)?);
    }
    info!(count = detections.len(), "Finished enriching detections with events.");
    Ok(())
}

fn encode_events(events: &[Value]) -> Result<String> {
    let mut buf = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, SpacedAsciiFormatter);
    events.serialize(&mut ser)?;
    // The formatter only emits ASCII
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Compact JSON with spaced separators and `\uXXXX` escapes for non-ASCII
struct SpacedAsciiFormatter;

impl Formatter for SpacedAsciiFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }

    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if fragment.bytes().all(is_plain_ascii) {
            return writer.write_all(fragment.as_bytes());
        }
        let mut units = [0u16; 2];
        for ch in fragment.chars() {
            if ch.is_ascii() && is_plain_ascii(ch as u8) {
                writer.write_all(&[ch as u8])?;
            } else {
                for unit in ch.encode_utf16(&mut units) {
                    write!(writer, "\\u{:04x}", unit)?;
                }
            }
        }
        Ok(())
    }
}

/// DEL is ASCII but still escaped, like every other non-printable
fn is_plain_ascii(byte: u8) -> bool {
    byte.is_ascii() && byte != 0x7f
}

//! FT message envelope
//!
//! Records on the concept topic carry a small text envelope:
//!
//! ```text
//! FTMSG/1.0
//! Message-Id: 5e0ad5e5-c3d4-387d-9875-ec15501808e5
//! Message-Type: organisations
//!
//! {"uuid": "..."}
//! ```
//!
//! Lines are CRLF separated in production; bare LF is accepted as well.

use std::collections::HashMap;

use ci_common::Message;

use crate::{QueueError, Result};

const ENVELOPE_PREFIX: &str = "FTMSG/";

/// Split a raw record into headers and body
pub fn parse_envelope(raw: &str) -> Result<Message> {
    let (head, body) = split_head(raw)
        .ok_or_else(|| QueueError::Envelope("missing blank line after headers".to_string()))?;

    let mut lines = head.lines();
    match lines.next() {
        Some(first) if first.starts_with(ENVELOPE_PREFIX) => {}
        Some(first) => {
            return Err(QueueError::Envelope(format!("unexpected preamble '{}'", first)));
        }
        None => return Err(QueueError::Envelope("empty record".to_string())),
    }

    let mut headers = HashMap::new();
    for line in lines {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| QueueError::Envelope(format!("invalid header line '{}'", line)))?;
        headers.insert(name.trim().to_string(), value.trim().to_string());
    }

    Ok(Message::new(headers, body.to_string()))
}

fn split_head(raw: &str) -> Option<(&str, &str)> {
    let crlf = raw.find("\r\n\r\n").map(|i| (i, 4));
    let lf = raw.find("\n\n").map(|i| (i, 2));

    let (idx, sep) = match (crlf, lf) {
        (Some(a), Some(b)) => if a.0 <= b.0 { a } else { b },
        (Some(a), None) => a,
        (None, Some(b)) => b,
        (None, None) => return None,
    };

    Some((&raw[..idx], &raw[idx + sep..]))
}

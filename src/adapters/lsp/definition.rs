//! Interpretation of definition and diagnostic responses.

use std::path::Path;

use serde_json::Value;

use crate::domain::models::{Position, RequestOutcome, ResolvedLocation, ResponsePayload};

/// Classify a `textDocument/definition` result.
///
/// Accepts `Location`, `Location[]` and `LocationLink[]`. Entries of any
/// other shape are ignored.
pub fn classify_definition(result: &Value) -> RequestOutcome {
    let items: Vec<&Value> = match result {
        Value::Null => return RequestOutcome::NotFound,
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    };
    if items.is_empty() {
        return RequestOutcome::NotFound;
    }

    let locations: Vec<ResolvedLocation> = items.into_iter().filter_map(parse_location).collect();
    if locations.is_empty() {
        return RequestOutcome::InvalidResponse {
            found: 0,
            detail: "unrecognized definition result shape".to_string(),
        };
    }

    if locations.iter().any(|l| l.valid) {
        RequestOutcome::Valid {
            payload: ResponsePayload::Locations { locations },
        }
    } else {
        RequestOutcome::InvalidResponse {
            found: locations.len(),
            detail: format!(
                "none of {} locations has a file:// URI with a non-negative range",
                locations.len()
            ),
        }
    }
}

/// Classify a `textDocument/diagnostic` (pull diagnostics) result.
pub fn classify_diagnostics(result: &Value) -> RequestOutcome {
    match result {
        Value::Null => RequestOutcome::NotFound,
        Value::Object(report) => match (report.get("kind"), report.get("items")) {
            (_, Some(Value::Array(items))) => RequestOutcome::Valid {
                payload: ResponsePayload::Diagnostics { items: items.len() },
            },
            (Some(Value::String(kind)), None) if kind == "unchanged" => RequestOutcome::Valid {
                payload: ResponsePayload::Diagnostics { items: 0 },
            },
            _ => RequestOutcome::InvalidResponse {
                found: 0,
                detail: "diagnostic report without items".to_string(),
            },
        },
        _ => RequestOutcome::InvalidResponse {
            found: 0,
            detail: "unexpected diagnostic result type".to_string(),
        },
    }
}

fn parse_location(item: &Value) -> Option<ResolvedLocation> {
    let (uri, range) = if let (Some(uri), Some(range)) = (item.get("targetUri"), item.get("targetRange")) {
        (uri, range)
    } else {
        (item.get("uri")?, item.get("range")?)
    };
    let uri = uri.as_str()?.to_string();

    let start_line = range.pointer("/start/line")?.as_i64()?;
    let start_char = range.pointer("/start/character")?.as_i64()?;
    let end_line = range.pointer("/end/line")?.as_i64()?;
    let end_char = range.pointer("/end/character")?.as_i64()?;

    let coords_ok = [start_line, start_char, end_line, end_char]
        .iter()
        .all(|c| *c >= 0);
    let valid = coords_ok && is_file_uri(&uri);

    Some(ResolvedLocation {
        uri,
        start: Position::new(clamp(start_line), clamp(start_char)),
        end: Position::new(clamp(end_line), clamp(end_char)),
        valid,
    })
}

fn clamp(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}

fn is_file_uri(uri: &str) -> bool {
    uri.strip_prefix("file://").is_some_and(|rest| !rest.is_empty())
}

/// Build a `file://` URI for an absolute path, percent-encoding reserved bytes.
pub fn path_to_uri(path: &Path) -> String {
    let raw = path.to_string_lossy().replace('\\', "/");
    let mut out = String::with_capacity(raw.len() + 8);
    out.push_str("file://");
    if !raw.starts_with('/') {
        out.push('/');
    }
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' | b':' => {
                out.push(byte as char);
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

//! `multipart/mixed` codec for the Gmail batch endpoint
//!
//! A batch request bundles one `application/http` part per sub-request. The
//! response mirrors it: each part embeds a full HTTP response (status line,
//! headers, JSON body).

use anyhow::{Context, Result, bail};

/// One sub-response from a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchPart {
    /// `Content-ID` of the part, when present
    pub content_id: Option<String>,
    pub status: u16,
    pub body: String,
}

impl BatchPart {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Encode GET sub-requests for `paths` into a batch body using `boundary`
pub fn encode_request(boundary: &str, paths: &[String]) -> String {
    let mut body = String::new();
    for (index, path) in paths.iter().enumerate() {
        body.push_str(&format!("--{}\r\n", boundary));
        body.push_str("Content-Type: application/http\r\n");
        body.push_str(&format!("Content-ID: <item-{}>\r\n", index));
        body.push_str("\r\n");
        body.push_str(&format!("GET {}\r\n", path));
        body.push_str("\r\n");
    }
    body.push_str(&format!("--{}--\r\n", boundary));
    body
}

/// Pull the `boundary` parameter out of a `multipart/mixed` content type
pub fn boundary_from_content_type(content_type: &str) -> Option<&str> {
    content_type.split(';').find_map(|param| {
        let (key, value) = param.trim().split_once('=')?;
        if key.trim().eq_ignore_ascii_case("boundary") {
            Some(value.trim().trim_matches('"'))
        } else {
            None
        }
    })
}

/// Decode a batch response body into its sub-responses, in body order
pub fn decode_response(boundary: &str, body: &str) -> Result<Vec<BatchPart>> {
    let delimiter = format!("--{}", boundary);
    let mut parts = Vec::new();

    // First segment is the preamble; a segment starting with "--" is the close
    for segment in body.split(delimiter.as_str()).skip(1) {
        if segment.starts_with("--") {
            break;
        }
        let segment = segment.trim_start_matches(['\r', '\n']);
        if segment.trim().is_empty() {
            continue;
        }
        parts.push(decode_part(segment)?);
    }

    Ok(parts)
}

fn decode_part(segment: &str) -> Result<BatchPart> {
    let (outer_headers, http) =
        split_head(segment).context("Batch part is missing its header block")?;

    let content_id = outer_headers.lines().find_map(|line| {
        let (name, value) = line.split_once(':')?;
        name.trim()
            .eq_ignore_ascii_case("content-id")
            .then(|| value.trim().to_string())
    });

    let http = http.trim_start_matches(['\r', '\n']);
    let (head, body) = split_head(http).unwrap_or((http, ""));
    let status_line = head.lines().next().unwrap_or_default();
    let status = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse::<u16>().ok())
        .with_context(|| format!("Malformed status line in batch part: {:?}", status_line))?;

    Ok(BatchPart {
        content_id,
        status,
        body: body.trim_end_matches(['\r', '\n']).to_string(),
    })
}

/// Split at the first blank line, accepting CRLF or bare LF
fn split_head(text: &str) -> Option<(&str, &str)> {
    let crlf = text.find("\r\n\r\n").map(|i| (i, 4));
    let lf = text.find("\n\n").map(|i| (i, 2));
    let (at, len) = match (crlf, lf) {
        (Some(a), Some(b)) => {
            if a.0 <= b.0 {
                a
            } else {
                b
            }
        }
        (Some(a), None) => a,
        (None, Some(b)) => b,
        (None, None) => return None,
    };
    Some((&text[..at], &text[at + len..]))
}

/// Fail on the first non-2xx sub-response
pub fn ensure_success(parts: &[BatchPart]) -> Result<()> {
    if let Some(failed) = parts.iter().find(|p| !p.is_success()) {
        bail!(
            "Batch sub-request {} failed with status {}: {}",
            failed.content_id.as_deref().unwrap_or("<unknown>"),
            failed.status,
            failed.body
        );
    }
    Ok(())
}

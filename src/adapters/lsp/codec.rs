//! Content-Length framing for JSON-RPC messages over stdio.

use serde_json::Value;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound on a single message body.
const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed header line: {0}")]
    InvalidHeader(String),

    #[error("Message without Content-Length header")]
    MissingContentLength,

    #[error("Message body of {0} bytes exceeds limit")]
    TooLarge(usize),

    #[error("Stream ended inside a message")]
    UnexpectedEof,

    #[error("Invalid JSON body: {0}")]
    Json(#[from] serde_json::Error),
}

/// Serialize `message` and write it with a Content-Length header.
pub async fn write_message<W>(writer: &mut W, message: &Value) -> Result<(), CodecError>
where
    W: AsyncWrite + Unpin,
{
    let body = serde_json::to_vec(message)?;
    let header = format!("Content-Length: {}\r\n\r\n", body.len());
    writer.write_all(header.as_bytes()).await?;
    writer.write_all(&body).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one framed message. Returns `Ok(None)` on a clean end of stream.
pub async fn read_message<R>(reader: &mut R) -> Result<Option<Value>, CodecError>
where
    R: AsyncBufRead + Unpin,
{
    let mut content_length: Option<usize> = None;
    let mut saw_header = false;
    let mut line = String::new();

    loop {
        line.clear();
        let n = reader.read_line(&mut line).await?;
        if n == 0 {
            return if saw_header {
                Err(CodecError::UnexpectedEof)
            } else {
                Ok(None)
            };
        }

        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.is_empty() {
            if saw_header {
                break;
            }
            continue;
        }
        saw_header = true;

        let (name, value) = trimmed
            .split_once(':')
            .ok_or_else(|| CodecError::InvalidHeader(trimmed.to_string()))?;
        if name.trim().eq_ignore_ascii_case("content-length") {
            let len = value
                .trim()
                .parse::<usize>()
                .map_err(|_| CodecError::InvalidHeader(trimmed.to_string()))?;
            content_length = Some(len);
        }
    }

    let len = content_length.ok_or(CodecError::MissingContentLength)?;
    if len > MAX_BODY_BYTES {
        return Err(CodecError::TooLarge(len));
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            CodecError::UnexpectedEof
        } else {
            CodecError::Io(e)
        }
    })?;

    Ok(Some(serde_json::from_slice(&body)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::BufReader;

    #[tokio::test]
    async fn written_message_reads_back() {
        let mut buf = Vec::new();
        let msg = json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}});
        write_message(&mut buf, &msg).await.unwrap();

        let text = String::from_utf8(buf.clone()).unwrap();
        assert!(text.starts_with("Content-Length: "));

        let mut reader = BufReader::new(buf.as_slice());
        let decoded = read_message(&mut reader).await.unwrap();
        assert_eq!(decoded, Some(msg));
        assert!(read_message(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn extra_headers_and_case_are_tolerated() {
        let body = r#"{"id":7,"result":null}"#;
        let raw = format!(
            "content-length: {}\r\nContent-Type: application/vscode-jsonrpc; charset=utf-8\r\n\r\n{body}",
            body.len()
        );
        let mut reader = BufReader::new(raw.as_bytes());
        let decoded = read_message(&mut reader).await.unwrap().unwrap();
        assert_eq!(decoded["id"], 7);
    }

    #[tokio::test]
    async fn missing_content_length_is_an_error() {
        let raw = "Content-Type: text/plain\r\n\r\n{}";
        let mut reader = BufReader::new(raw.as_bytes());
        assert!(matches!(
            read_message(&mut reader).await,
            Err(CodecError::MissingContentLength)
        ));
    }

    #[tokio::test]
    async fn truncated_body_is_unexpected_eof() {
        let raw = "Content-Length: 50\r\n\r\n{\"id\":1}";
        let mut reader = BufReader::new(raw.as_bytes());
        assert!(matches!(
            read_message(&mut reader).await,
            Err(CodecError::UnexpectedEof)
        ));
    }
}

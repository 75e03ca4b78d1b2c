//! Minimal HTTP/1.1 codec for the engine API.
//!
//! The head is read one byte at a time so a `101 Switching Protocols`
//! response leaves the stream positioned exactly at the first raw
//! process byte. Nothing is buffered past the header terminator.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use console_core::EngineError;

/// Largest accepted response head, as a corruption guard.
const MAX_HEAD_BYTES: usize = 64 * 1024;

/// An outgoing request.
pub struct Request<'a> {
    pub method: &'a str,
    /// Path including any query string.
    pub path: &'a str,
    /// Value for the `Host` header.
    pub host: &'a str,
    /// JSON body, if any.
    pub body: Option<&'a [u8]>,
    /// Ask the server to hand the connection over as a raw stream.
    pub upgrade: bool,
}

/// Write a request, including its body, and flush.
///
/// # Errors
/// Returns any underlying write error.
pub async fn write_request<W: AsyncWrite + Unpin>(
    writer: &mut W,
    req: &Request<'_>,
) -> std::io::Result<()> {
    let mut head = format!(
        "{} {} HTTP/1.1\r\nHost: {}\r\n",
        req.method, req.path, req.host
    );
    if req.upgrade {
        head.push_str("Connection: Upgrade\r\nUpgrade: tcp\r\n");
    } else {
        head.push_str("Connection: close\r\n");
    }
    match req.body {
        Some(body) => {
            head.push_str("Content-Type: application/json\r\n");
            head.push_str(&format!("Content-Length: {}\r\n", body.len()));
        }
        None => head.push_str("Content-Length: 0\r\n"),
    }
    head.push_str("\r\n");

    writer.write_all(head.as_bytes()).await?;
    if let Some(body) = req.body {
        writer.write_all(body).await?;
    }
    writer.flush().await
}

/// Parsed response head.
#[derive(Debug)]
pub struct Head {
    pub status: u16,
    headers: Vec<(String, String)>,
}

impl Head {
    /// Case-insensitive header lookup.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Read the status line and headers.
///
/// # Errors
/// Returns `Protocol` on a malformed head and `Io` on stream errors.
pub async fn read_head<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Head, EngineError> {
    let mut raw = Vec::new();
    while !raw.ends_with(b"\r\n\r\n") {
        if raw.len() >= MAX_HEAD_BYTES {
            return Err(EngineError::Protocol("response head too large".to_string()));
        }
        raw.push(reader.read_u8().await?);
    }

    let text = std::str::from_utf8(&raw)
        .map_err(|_| EngineError::Protocol("non-utf8 response head".to_string()))?;
    let mut lines = text.split("\r\n");
    let status_line = lines
        .next()
        .ok_or_else(|| EngineError::Protocol("empty response head".to_string()))?;

    let mut parts = status_line.splitn(3, ' ');
    let version = parts.next().unwrap_or_default();
    if !version.starts_with("HTTP/1.") {
        return Err(EngineError::Protocol(format!(
            "unexpected status line {status_line:?}"
        )));
    }
    let status = parts
        .next()
        .and_then(|s| s.parse::<u16>().ok())
        .ok_or_else(|| EngineError::Protocol(format!("unexpected status line {status_line:?}")))?;

    let mut headers = Vec::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| EngineError::Protocol(format!("malformed header {line:?}")))?;
        headers.push((name.trim().to_string(), value.trim().to_string()));
    }

    Ok(Head { status, headers })
}

/// Read the response body according to the head's framing.
///
/// Supports `Content-Length`, `Transfer-Encoding: chunked`, and
/// read-to-end for `Connection: close` responses.
///
/// # Errors
/// Returns `Protocol` on malformed chunk framing and `Io` on stream
/// errors.
pub async fn read_body<R: AsyncRead + Unpin>(
    reader: &mut R,
    head: &Head,
) -> Result<Vec<u8>, EngineError> {
    if head
        .header("transfer-encoding")
        .is_some_and(|v| v.eq_ignore_ascii_case("chunked"))
    {
        return read_chunked(reader).await;
    }
    if let Some(len) = head.header("content-length") {
        let len: usize = len
            .parse()
            .map_err(|_| EngineError::Protocol(format!("bad content-length {len:?}")))?;
        let mut body = vec![0u8; len];
        reader.read_exact(&mut body).await?;
        return Ok(body);
    }
    let mut body = Vec::new();
    reader.read_to_end(&mut body).await?;
    Ok(body)
}

async fn read_chunked<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>, EngineError> {
    let mut body = Vec::new();
    loop {
        let line = read_line(reader).await?;
        let size_str = line.split(';').next().unwrap_or_default().trim();
        let size = usize::from_str_radix(size_str, 16)
            .map_err(|_| EngineError::Protocol(format!("bad chunk size {line:?}")))?;
        if size == 0 {
            // Trailer terminator.
            read_line(reader).await?;
            return Ok(body);
        }
        let start = body.len();
        body.resize(start + size, 0);
        reader.read_exact(&mut body[start..]).await?;
        let sep = read_line(reader).await?;
        if !sep.is_empty() {
            return Err(EngineError::Protocol("missing chunk terminator".to_string()));
        }
    }
}

async fn read_line<R: AsyncRead + Unpin>(reader: &mut R) -> Result<String, EngineError> {
    let mut line = Vec::new();
    loop {
        let byte = reader.read_u8().await?;
        if byte == b'\n' {
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            return String::from_utf8(line)
                .map_err(|_| EngineError::Protocol("non-utf8 chunk header".to_string()));
        }
        if line.len() >= MAX_HEAD_BYTES {
            return Err(EngineError::Protocol("chunk header too large".to_string()));
        }
        line.push(byte);
    }
}

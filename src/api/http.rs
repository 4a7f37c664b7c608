//! HTTP/1.1 over tokio sockets: read one request, dispatch, write one response

use crate::api::{handle_request, AppState, Response};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{timeout, Duration};
use tracing::{debug, error, warn};

/// Largest request accepted, headers included
pub const MAX_REQUEST_BYTES: usize = 1_000_000;
const READ_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: String,
    pub path: String,
    /// Lower-cased header names
    pub headers: HashMap<String, String>,
    pub body: String,
}

/// Accept connections forever, one task per connection
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> std::io::Result<()> {
    loop {
        let (stream, addr) = listener.accept().await?;
        debug!("New connection from: {}", addr);
        tokio::spawn(handle_connection(stream, state.clone()));
    }
}

fn extract_content_length(head: &str) -> Option<usize> {
    head.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        if key.trim().eq_ignore_ascii_case("content-length") {
            value.trim().parse().ok()
        } else {
            None
        }
    })
}

fn find_header_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(4).position(|w| w == b"\r\n\r\n").map(|pos| pos + 4)
}

/// Parse a complete request. Returns None for a malformed request line.
pub fn parse_request(raw: &[u8]) -> Option<Request> {
    let header_end = find_header_end(raw).unwrap_or(raw.len());
    let head = std::str::from_utf8(&raw[..header_end]).ok()?;

    let mut lines = head.lines();
    let mut parts = lines.next()?.split_whitespace();
    let method = parts.next()?.to_uppercase();
    let path = parts.next()?.to_string();

    let headers = lines
        .take_while(|line| !line.is_empty())
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_lowercase(), v.trim().to_string()))
        .collect::<HashMap<_, _>>();

    let body_bytes = &raw[header_end.min(raw.len())..];
    let body_len = extract_content_length(head).unwrap_or(body_bytes.len()).min(body_bytes.len());
    let body = String::from_utf8_lossy(&body_bytes[..body_len]).into_owned();

    Some(Request {
        method,
        path,
        headers,
        body,
    })
}

async fn read_request(stream: &mut TcpStream) -> std::io::Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 8192];

    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..n]);

        if let Some(header_end) = find_header_end(&buffer) {
            let head = String::from_utf8_lossy(&buffer[..header_end]);
            let expected = extract_content_length(&head).unwrap_or(0);
            if buffer.len() >= header_end + expected {
                break;
            }
        }
        if buffer.len() > MAX_REQUEST_BYTES {
            break;
        }
    }
    Ok(buffer)
}

fn status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        409 => "Conflict",
        413 => "Payload Too Large",
        422 => "Unprocessable Entity",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}

pub fn create_response(response: &Response, cors_origin: Option<&str>) -> String {
    let cors = match cors_origin {
        Some(origin) => format!(
            "Access-Control-Allow-Origin: {}\r\n\
             Access-Control-Allow-Methods: GET, POST, PUT, DELETE, OPTIONS\r\n\
             Access-Control-Allow-Headers: Content-Type, Authorization\r\n",
            origin
        ),
        None => String::new(),
    };
    format!(
        "HTTP/1.1 {} {}\r\n\
         Content-Type: {}\r\n\
         {}\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {}",
        response.status,
        status_text(response.status),
        response.content_type,
        cors,
        response.body.len(),
        response.body
    )
}

pub async fn handle_connection(mut stream: TcpStream, state: Arc<AppState>) {
    let raw = match timeout(READ_TIMEOUT, read_request(&mut stream)).await {
        Ok(Ok(raw)) => raw,
        Ok(Err(e)) => {
            error!("Failed to read from stream: {}", e);
            return;
        }
        Err(_) => {
            warn!("Request read timeout");
            return;
        }
    };
    if raw.is_empty() {
        return;
    }

    let (response, origin) = if raw.len() > MAX_REQUEST_BYTES {
        (Response::error(413, "Request too large"), None)
    } else {
        match parse_request(&raw) {
            Some(request) => {
                debug!("Request: {} {}", request.method, request.path);
                let origin = state
                    .settings
                    .allowed_origin(request.headers.get("origin").map(String::as_str));
                let response = handle_request(&state, &request.method, &request.path, &request.body).await;
                (response, origin)
            }
            None => (Response::error(400, "Malformed request"), None),
        }
    };

    if let Err(e) = stream.write_all(create_response(&response, origin.as_deref()).as_bytes()).await {
        error!("Failed to write response: {}", e);
    }
    let _ = stream.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_request() {
        let raw = b"POST /api/v1/pipeline HTTP/1.1\r\nHost: x\r\nContent-Type: application/json\r\nContent-Length: 2\r\n\r\n{}";
        let request = parse_request(raw).unwrap();
        assert_eq!(request.method, "POST");
        assert_eq!(request.path, "/api/v1/pipeline");
        assert_eq!(request.headers["content-type"], "application/json");
        assert_eq!(request.body, "{}");
    }

    #[test]
    fn test_parse_request_without_body() {
        let request = parse_request(b"GET /health HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(request.method, "GET");
        assert!(request.body.is_empty());
        assert!(parse_request(b"\r\n\r\n").is_none());
    }

    #[test]
    fn test_create_response() {
        let response = Response::error(404, "missing");
        let text = create_response(&response, Some("http://localhost:3000"));
        assert!(text.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(text.contains("Access-Control-Allow-Origin: http://localhost:3000\r\n"));
        assert!(text.ends_with("\r\n\r\n{\"detail\":\"missing\"}"));

        let text = create_response(&Response::empty(200), None);
        assert!(!text.contains("Access-Control"));
        assert!(text.contains("Content-Length: 0\r\n"));
    }
}

use std::net::SocketAddr;

use anyhow::{Context, Result, anyhow};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(header, _)| header.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn body_str(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }
}

/// Raw HTTP/1.1 client so tests control the Host header byte-for-byte.
pub async fn send_request(
    addr: SocketAddr,
    method: &str,
    host: &str,
    path_and_query: &str,
    extra_headers: &[(&str, &str)],
    body: &[u8],
) -> Result<HttpResponse> {
    let mut stream = TcpStream::connect(addr)
        .await
        .with_context(|| format!("failed to connect to proxy at {addr}"))?;

    let mut request = format!(
        "{method} {path_and_query} HTTP/1.1\r\nHost: {host}\r\nContent-Length: {}\r\nConnection: close\r\n",
        body.len()
    );
    for (name, value) in extra_headers {
        request.push_str(&format!("{name}: {value}\r\n"));
    }
    request.push_str("\r\n");

    stream.write_all(request.as_bytes()).await?;
    stream.write_all(body).await?;

    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await?;
    parse_response(&raw)
}

pub async fn get(
    addr: SocketAddr,
    host: &str,
    path_and_query: &str,
) -> Result<HttpResponse> {
    send_request(addr, "GET", host, path_and_query, &[], b"").await
}

/// Build the proxy query string for a target URL and TTL expression.
pub fn proxy_path(url: &str, ttl: &str) -> String {
    if ttl.is_empty() {
        format!("/?url={}", percent_encode(url))
    } else {
        format!("/?url={}&ttl={}", percent_encode(url), ttl)
    }
}

fn percent_encode(raw: &str) -> String {
    let mut encoded = String::with_capacity(raw.len() * 3);
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                encoded.push(byte as char);
            }
            _ => encoded.push_str(&format!("%{byte:02X}")),
        }
    }
    encoded
}

fn parse_response(raw: &[u8]) -> Result<HttpResponse> {
    let header_end = raw
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .ok_or_else(|| anyhow!("response missing header terminator"))?;
    let head = std::str::from_utf8(&raw[..header_end]).context("response head is not UTF-8")?;
    let mut lines = head.split("\r\n");

    let status_line = lines.next().ok_or_else(|| anyhow!("empty response"))?;
    let status: u16 = status_line
        .split_whitespace()
        .nth(1)
        .ok_or_else(|| anyhow!("malformed status line '{status_line}'"))?
        .parse()
        .context("malformed status code")?;

    let mut headers = Vec::new();
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }
    }

    Ok(HttpResponse {
        status,
        headers,
        body: raw[header_end + 4..].to_vec(),
    })
}

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::Result;
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Minimal scripted HTTP upstream: replies with a canned byte sequence,
/// counts requests, and keeps the head of the most recent one.
pub struct MockUpstream {
    addr: SocketAddr,
    hits: Arc<AtomicUsize>,
    last_request: Arc<Mutex<String>>,
    handle: JoinHandle<()>,
}

impl MockUpstream {
    pub async fn http_response(response: impl Into<Vec<u8>>) -> Result<Self> {
        Self::spawn(response.into(), None).await
    }

    pub async fn http_ok(body: &str) -> Result<Self> {
        Self::with_headers(200, "OK", &[], body.as_bytes()).await
    }

    pub async fn with_headers(
        status: u16,
        reason: &str,
        extra_headers: &[(&str, &str)],
        body: &[u8],
    ) -> Result<Self> {
        let mut response = format!(
            "HTTP/1.1 {status} {reason}\r\nContent-Length: {}\r\nConnection: close\r\n",
            body.len()
        )
        .into_bytes();
        for (name, value) in extra_headers {
            response.extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
        }
        response.extend_from_slice(b"\r\n");
        response.extend_from_slice(body);
        Self::spawn(response, None).await
    }

    pub async fn slow(body: &str, delay: Duration) -> Result<Self> {
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        );
        Self::spawn(response.into_bytes(), Some(delay)).await
    }

    async fn spawn(response: Vec<u8>, delay: Option<Duration>) -> Result<Self> {
        let response = Arc::new(response);
        let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
        let addr = listener.local_addr()?;
        let hits = Arc::new(AtomicUsize::new(0));
        let last_request = Arc::new(Mutex::new(String::new()));
        let hits_clone = hits.clone();
        let last_clone = last_request.clone();
        let handle = tokio::spawn(async move {
            loop {
                let (mut stream, _) = match listener.accept().await {
                    Ok(conn) => conn,
                    Err(_) => break,
                };
                hits_clone.fetch_add(1, Ordering::SeqCst);
                let response = response.clone();
                let last = last_clone.clone();
                tokio::spawn(async move {
                    let head = read_request(&mut stream).await;
                    *last.lock() = head;
                    if let Some(delay) = delay {
                        tokio::time::sleep(delay).await;
                    }
                    let _ = stream.write_all(&response).await;
                    let _ = stream.shutdown().await;
                });
            }
        });
        Ok(Self {
            addr,
            hits,
            last_request,
            handle,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> String {
        self.last_request.lock().clone()
    }
}

impl Drop for MockUpstream {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Read the request head plus as much of the body as Content-Length names.
async fn read_request(stream: &mut tokio::net::TcpStream) -> String {
    let mut buf = [0u8; 8192];
    let mut data = Vec::new();
    let mut header_end = None;
    loop {
        match stream.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                data.extend_from_slice(&buf[..n]);
                if header_end.is_none() {
                    header_end = data.windows(4).position(|w| w == b"\r\n\r\n").map(|p| p + 4);
                }
                if let Some(end) = header_end {
                    let head = String::from_utf8_lossy(&data[..end]).to_ascii_lowercase();
                    let content_length = head
                        .lines()
                        .find_map(|line| line.strip_prefix("content-length:"))
                        .and_then(|value| value.trim().parse::<usize>().ok())
                        .unwrap_or(0);
                    if data.len() >= end + content_length {
                        break;
                    }
                }
            }
            Err(_) => break,
        }
    }
    String::from_utf8_lossy(&data).to_string()
}

use std::time::{Duration, Instant};

use anyhow::Context;
use bytes::Bytes;
use http::{StatusCode, header};
use tracing::info;

use crate::error::ProxyError;
use crate::proxy::headers;
use crate::proxy::request::RequestDescriptor;

const MAX_REDIRECTS: usize = 5;

/// An upstream reply, fully buffered, headers exactly as received. A non-2xx
/// status is not an error at this layer.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

/// Process-wide HTTP client for upstream fetches. Constructed once at
/// startup and shared; the inner reqwest client pools connections.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    client: reqwest::Client,
    timeout_secs: u64,
    max_body_size: usize,
}

impl UpstreamClient {
    pub fn new(timeout: Duration, max_body_size: usize) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()
            .context("failed to build upstream HTTP client")?;
        Ok(Self {
            client,
            timeout_secs: timeout.as_secs(),
            max_body_size,
        })
    }

    /// Send the sanitized request and read the response in full. The
    /// configured timeout spans connect through last byte.
    pub async fn fetch(
        &self,
        request: &RequestDescriptor,
    ) -> Result<UpstreamResponse, ProxyError> {
        let outbound = headers::sanitize_request_headers(&request.headers);
        let started = Instant::now();
        info!(
            method = %request.method,
            url = %request.target_url,
            "upstream request started"
        );

        let mut builder = self
            .client
            .request(request.method.clone(), request.target_url.clone())
            .headers(outbound)
            .header(header::ACCEPT_ENCODING, "identity");
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let response = builder.send().await.map_err(|err| self.classify(err))?;
        let status = response.status();

        if let Some(length) = response.content_length()
            && length > self.max_body_size as u64
        {
            return Err(ProxyError::UpstreamPayloadTooLarge(self.max_body_size));
        }

        let resp_headers = headers::headermap_to_vec(response.headers());
        let body = response.bytes().await.map_err(|err| self.classify(err))?;
        if body.len() > self.max_body_size {
            return Err(ProxyError::UpstreamPayloadTooLarge(self.max_body_size));
        }

        info!(
            status = status.as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "upstream response received"
        );
        Ok(UpstreamResponse {
            status,
            headers: resp_headers,
            body,
        })
    }

    fn classify(&self, err: reqwest::Error) -> ProxyError {
        if err.is_timeout() {
            ProxyError::UpstreamTimeout(self.timeout_secs)
        } else {
            ProxyError::UpstreamUnreachable(describe(&err))
        }
    }
}

/// Flatten the cause chain so DNS / TLS / connect detail survives the
/// reqwest wrapper's terse top-level message.
fn describe(err: &reqwest::Error) -> String {
    let mut message = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

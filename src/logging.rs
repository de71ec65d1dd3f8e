use std::time::Duration;

use anyhow::{Result, anyhow};
use http::StatusCode;
use time::OffsetDateTime;
use tracing_subscriber::{EnvFilter, fmt};

use crate::cli::LogFormat;

const DEFAULT_FILTER: &str = "info";

pub fn init_logger(format: LogFormat) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    match format {
        LogFormat::Json => fmt::fmt()
            .with_env_filter(filter)
            .json()
            // Correlation fields ride on the request span.
            .with_current_span(true)
            .with_span_list(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .try_init()
            .map_err(|err| anyhow!(err))?,
        LogFormat::Text => fmt::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .try_init()
            .map_err(|err| anyhow!(err))?,
    }

    Ok(())
}

/// Millisecond-precision UTC timestamp in ISO-8601 form.
pub fn utc_timestamp() -> String {
    let now = OffsetDateTime::now_utc();
    let (year, month, day) = now.to_calendar_date();
    let (hour, minute, second) = now.to_hms();
    let millisecond = now.millisecond();
    let month_number: u8 = month.into();
    format!(
        "{year:04}-{month:02}-{day:02}T{hour:02}:{minute:02}:{second:02}.{millisecond:03}Z",
        month = month_number
    )
}

/// One record per emitted reply, correlating the request with its cache
/// outcome. Bodies and Authorization values never appear here.
#[derive(Debug, Clone)]
pub struct RequestLogEvent {
    pub correlation_id: String,
    pub tenant: String,
    pub method: String,
    pub target: String,
    pub fingerprint: String,
    pub cache_status: String,
    pub status: u16,
    pub elapsed_ms: u128,
}

#[derive(Debug)]
pub struct RequestLogBuilder {
    event: RequestLogEvent,
}

impl RequestLogBuilder {
    pub fn new(correlation_id: impl Into<String>) -> Self {
        Self {
            event: RequestLogEvent {
                correlation_id: correlation_id.into(),
                tenant: String::new(),
                method: String::new(),
                target: String::new(),
                fingerprint: String::new(),
                cache_status: String::from("NONE"),
                status: 0,
                elapsed_ms: 0,
            },
        }
    }

    pub fn tenant(mut self, tenant: impl Into<String>) -> Self {
        self.event.tenant = tenant.into();
        self
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.event.method = method.into();
        self
    }

    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.event.target = target.into();
        self
    }

    pub fn fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.event.fingerprint = fingerprint.into();
        self
    }

    pub fn cache_status(mut self, cache_status: impl Into<String>) -> Self {
        self.event.cache_status = cache_status.into();
        self
    }

    pub fn status(mut self, status: StatusCode) -> Self {
        self.event.status = status.as_u16();
        self
    }

    pub fn elapsed(mut self, elapsed: Duration) -> Self {
        self.event.elapsed_ms = elapsed.as_millis();
        self
    }

    pub fn build(self) -> RequestLogEvent {
        self.event
    }

    pub fn log(self) {
        log_reply(self.build());
    }
}

pub fn log_reply(event: RequestLogEvent) {
    let RequestLogEvent {
        correlation_id,
        tenant,
        method,
        target,
        fingerprint,
        cache_status,
        status,
        elapsed_ms,
    } = event;

    let ts = utc_timestamp();

    tracing::info!(
        target = "request_log",
        ts,
        correlation_id,
        tenant,
        method,
        url = target,
        fingerprint,
        cache_status,
        status,
        elapsed_ms,
        "reply emitted"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_is_iso8601_utc() {
        let ts = utc_timestamp();
        assert_eq!(ts.len(), 24, "unexpected timestamp shape: {ts}");
        assert!(ts.ends_with('Z'));
        assert_eq!(&ts[4..5], "-");
        assert_eq!(&ts[10..11], "T");
    }

    #[test]
    fn builder_collects_fields() {
        let event = RequestLogBuilder::new("abc-123")
            .tenant("t1")
            .method("GET")
            .target("https://example.test/")
            .fingerprint("deadbeef")
            .cache_status("HIT")
            .status(StatusCode::OK)
            .elapsed(Duration::from_millis(12))
            .build();
        assert_eq!(event.correlation_id, "abc-123");
        assert_eq!(event.tenant, "t1");
        assert_eq!(event.cache_status, "HIT");
        assert_eq!(event.status, 200);
        assert_eq!(event.elapsed_ms, 12);
    }
}

//! Transport executor: one HTTP call in, one result row out.
//!
//! Failures never escape this module. Each failure kind maps to a synthetic
//! status so that the result table stays rectangular.

use std::error::Error as StdError;
use std::time::{Duration, Instant};

use apfaas_core::{RequestRecord, RequestResult};
use reqwest::header::{HeaderMap, LOCATION};
use reqwest::redirect::Policy;
use reqwest::{Client, Method, StatusCode, Url};
use tracing::error;
use uuid::Uuid;

use crate::progress::ProgressReporter;

/// Redirect hops followed before the last response is taken as final.
const MAX_REDIRECTS: usize = 10;

/// Per-call transport settings shared by a partition.
#[derive(Debug, Clone)]
pub struct TransportOptions {
    /// Headers captured from successful responses
    pub response_headers: Vec<String>,
    /// Header holding the correlation identifier
    pub correlation_header: String,
    /// Total timeout per call; `None` is unbounded
    pub timeout: Option<Duration>,
}

/// Classified transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Timeout exceeded
    Timeout,
    /// Malformed or invalid response
    Response,
    /// Transport could not be established or maintained
    Connection,
    /// Body corrupted or truncated
    Payload,
    /// Anything else
    Other,
}

impl FailureKind {
    /// Status written to the result row. A response failure keeps the
    /// response's own status when one is known.
    pub fn synthetic_status(self, response_status: Option<u16>) -> u16 {
        match self {
            FailureKind::Timeout => 503,
            FailureKind::Response => response_status.unwrap_or(502),
            FailureKind::Connection => 500,
            FailureKind::Payload => 501,
            FailureKind::Other => 502,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::Timeout => "TimeoutError",
            FailureKind::Response => "ResponseError",
            FailureKind::Connection => "ConnectionError",
            FailureKind::Payload => "PayloadError",
            FailureKind::Other => "Exception",
        }
    }
}

#[derive(Debug)]
struct Failure {
    kind: FailureKind,
    status: Option<u16>,
    message: String,
}

impl Failure {
    fn other(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Other,
            status: None,
            message: message.into(),
        }
    }

    fn from_reqwest(err: reqwest::Error) -> Self {
        let status = err.status().map(|status| status.as_u16());
        let kind = if err.is_timeout() {
            FailureKind::Timeout
        } else if err.is_connect() {
            FailureKind::Connection
        } else if status.is_some() {
            FailureKind::Response
        } else if err.is_body() || err.is_decode() {
            FailureKind::Payload
        } else if err.is_request() {
            request_failure_kind(&err)
        } else {
            FailureKind::Other
        };

        Self {
            kind,
            status,
            message: err.to_string(),
        }
    }
}

/// A request error is a connection failure unless hyper rejected what the
/// server sent.
fn request_failure_kind(err: &(dyn StdError + 'static)) -> FailureKind {
    let mut source = err.source();
    while let Some(cause) = source {
        if let Some(hyper_err) = cause.downcast_ref::<hyper::Error>() {
            return if hyper_err.is_parse() {
                FailureKind::Response
            } else {
                FailureKind::Connection
            };
        }
        if cause.downcast_ref::<std::io::Error>().is_some() {
            return FailureKind::Connection;
        }
        source = cause.source();
    }
    FailureKind::Connection
}

/// Successful exchange, before it is turned into a row.
struct Exchange {
    status: u16,
    response_id: Option<String>,
    body: String,
    headers: Vec<(String, Option<String>)>,
}

/// Timing captured around the exchange.
#[derive(Default)]
struct Timing {
    request_time: f64,
    response_time: f64,
}

/// Perform exactly one HTTP call for `record` and classify its outcome.
pub async fn execute(
    record: &RequestRecord,
    options: &TransportOptions,
    progress: &dyn ProgressReporter,
) -> RequestResult {
    let request_id = Uuid::new_v4().to_string();
    let mut timing = Timing::default();

    let result = match exchange(record, options, &mut timing).await {
        Ok(exchange) => RequestResult {
            record: record.clone(),
            request_id,
            response_id: exchange.response_id,
            status: exchange.status,
            response_body: exchange.body,
            request_time: timing.request_time,
            response_time: timing.response_time,
            headers: exchange.headers,
        },
        Err(failure) => {
            error!(
                failure = failure.kind.as_str(),
                request_id = %request_id,
                "({}) {}: {}",
                failure.kind.as_str(),
                request_id,
                failure.message
            );
            RequestResult {
                record: record.clone(),
                request_id,
                response_id: None,
                status: failure.kind.synthetic_status(failure.status),
                response_body: failure.message,
                request_time: timing.request_time,
                response_time: timing.response_time,
                headers: null_headers(options),
            }
        }
    };

    progress.advance(&record.label());
    result
}

/// Fresh client per call: no connection pool or cookies shared across requests.
fn build_client(options: &TransportOptions) -> Result<Client, Failure> {
    let mut builder = Client::builder().redirect(Policy::none());
    if let Some(timeout) = options.timeout {
        builder = builder.timeout(timeout);
    }
    builder
        .build()
        .map_err(|e| Failure::other(format!("failed to build HTTP client: {}", e)))
}

async fn exchange(
    record: &RequestRecord,
    options: &TransportOptions,
    timing: &mut Timing,
) -> Result<Exchange, Failure> {
    let client = build_client(options)?;
    let mut method = Method::from_bytes(record.method.to_uppercase().as_bytes())
        .map_err(|e| Failure::other(format!("invalid method `{}`: {}", record.method, e)))?;
    let mut url = Url::parse(&record.url())
        .map_err(|e| Failure::other(format!("invalid url `{}`: {}", record.url(), e)))?;
    let mut body = record.body.clone();

    timing.request_time = chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0;
    let started = Instant::now();

    let mut first_hop: Option<HeaderMap> = None;
    let mut hops = 0;
    let response = loop {
        let mut request = client.request(method.clone(), url.clone());
        if let Some(body) = &body {
            request = request.json(body);
        }
        let response = request.send().await.map_err(Failure::from_reqwest)?;

        let status = response.status();
        let next = if status.is_redirection() && hops < MAX_REDIRECTS {
            response
                .headers()
                .get(LOCATION)
                .and_then(|location| location.to_str().ok())
                .and_then(|location| url.join(location).ok())
        } else {
            None
        };

        match next {
            Some(next) => {
                if first_hop.is_none() {
                    first_hop = Some(response.headers().clone());
                }
                let downgrade = status == StatusCode::SEE_OTHER
                    || ((status == StatusCode::MOVED_PERMANENTLY || status == StatusCode::FOUND)
                        && method != Method::GET
                        && method != Method::HEAD);
                if downgrade {
                    method = Method::GET;
                    body = None;
                }
                url = next;
                hops += 1;
            }
            None => break response,
        }
    };
    timing.response_time = started.elapsed().as_secs_f64();

    let status = response.status().as_u16();

    if let Some(hop_headers) = first_hop {
        let final_url = response.url().to_string();
        response.bytes().await.map_err(Failure::from_reqwest)?;
        let response_id = if status == 200 {
            Some(correlation_id(&hop_headers, options)?)
        } else {
            None
        };
        return Ok(Exchange {
            status,
            response_id,
            body: format!("Redirect to {}", final_url),
            headers: capture_headers(&hop_headers, options),
        });
    }

    if status == 200 {
        let headers = response.headers().clone();
        let response_id = correlation_id(&headers, options)?;
        let body = response.text().await.map_err(Failure::from_reqwest)?;
        return Ok(Exchange {
            status,
            response_id: Some(response_id),
            body,
            headers: capture_headers(&headers, options),
        });
    }

    let body = response.text().await.map_err(Failure::from_reqwest)?;
    Ok(Exchange {
        status,
        response_id: None,
        body,
        headers: null_headers(options),
    })
}

fn correlation_id(headers: &HeaderMap, options: &TransportOptions) -> Result<String, Failure> {
    headers
        .get(options.correlation_header.as_str())
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .ok_or_else(|| {
            Failure::other(format!(
                "response is missing the `{}` header",
                options.correlation_header
            ))
        })
}

fn capture_headers(headers: &HeaderMap, options: &TransportOptions) -> Vec<(String, Option<String>)> {
    options
        .response_headers
        .iter()
        .map(|name| {
            let value = headers
                .get(name.as_str())
                .and_then(|value| value.to_str().ok())
                .map(str::to_string);
            (name.clone(), value)
        })
        .collect()
}

fn null_headers(options: &TransportOptions) -> Vec<(String, Option<String>)> {
    options
        .response_headers
        .iter()
        .map(|name| (name.clone(), None))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthetic_statuses() {
        assert_eq!(FailureKind::Timeout.synthetic_status(None), 503);
        assert_eq!(FailureKind::Connection.synthetic_status(None), 500);
        assert_eq!(FailureKind::Payload.synthetic_status(None), 501);
        assert_eq!(FailureKind::Other.synthetic_status(Some(404)), 502);
        assert_eq!(FailureKind::Response.synthetic_status(Some(400)), 400);
        assert_eq!(FailureKind::Response.synthetic_status(None), 502);
    }

    #[test]
    fn test_header_capture_is_case_insensitive() {
        let mut headers = HeaderMap::new();
        headers.insert("X-Cache", "HIT".parse().unwrap());
        headers.insert("response-id", "abc".parse().unwrap());

        let options = TransportOptions {
            response_headers: vec!["x-cache".to_string(), "x-missing".to_string()],
            correlation_header: "Response-Id".to_string(),
            timeout: None,
        };

        assert_eq!(
            capture_headers(&headers, &options),
            vec![
                ("x-cache".to_string(), Some("HIT".to_string())),
                ("x-missing".to_string(), None),
            ]
        );
        assert_eq!(correlation_id(&headers, &options).unwrap(), "abc");
    }
}

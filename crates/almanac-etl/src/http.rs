//! Shared HTTP plumbing: client construction and response classification.

use std::time::Duration;

use reqwest::header::{HeaderMap, CONTENT_TYPE, RETRY_AFTER};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;

use crate::error::{HarvestError, HarvestResult};

/// Marker the Wikidata query service puts in the body of a 500 when a query
/// hit its server-side time limit. Treated as "query too large".
const SPARQL_TIMEOUT_MARKER: &str = "java.util.concurrent.TimeoutException";

/// Longest body excerpt carried in an error message.
const BODY_EXCERPT_LEN: usize = 200;

/// Build a client with the project user agent and a request timeout.
pub(crate) fn build_client(user_agent: &str, timeout: Duration) -> HarvestResult<Client> {
    Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .build()
        .map_err(HarvestError::from)
}

/// Send a request and turn transport failures and non-success statuses into
/// [`HarvestError`]s.
pub(crate) async fn send(source_name: &str, request: RequestBuilder) -> HarvestResult<Response> {
    let response = request
        .send()
        .await
        .map_err(|e| transport_error(source_name, &e))?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = parse_retry_after(response.headers());
    let body = response.text().await.unwrap_or_default();
    Err(status_error(source_name, status, retry_after, &body))
}

/// Read a JSON body, rejecting non-JSON content types before parsing.
pub(crate) async fn read_json<T: DeserializeOwned>(
    source_name: &str,
    response: Response,
) -> HarvestResult<T> {
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    if !is_json_content_type(&content_type) {
        return Err(HarvestError::UnexpectedContentType {
            source_name: source_name.to_string(),
            content_type,
        });
    }

    let body = response
        .text()
        .await
        .map_err(|e| transport_error(source_name, &e))?;

    parse_json(source_name, &body)
}

/// Parse a JSON body, reporting failures as [`HarvestError::Malformed`].
pub(crate) fn parse_json<T: DeserializeOwned>(source_name: &str, body: &str) -> HarvestResult<T> {
    serde_json::from_str(body).map_err(|e| HarvestError::Malformed {
        source_name: source_name.to_string(),
        message: e.to_string(),
    })
}

fn is_json_content_type(content_type: &str) -> bool {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    mime == "application/json" || (mime.starts_with("application/") && mime.ends_with("+json"))
}

fn transport_error(source_name: &str, error: &reqwest::Error) -> HarvestError {
    if error.is_decode() {
        return HarvestError::Malformed {
            source_name: source_name.to_string(),
            message: error.to_string(),
        };
    }

    HarvestError::Unavailable {
        source_name: source_name.to_string(),
        message: error.to_string(),
        status: error.status().map(|s| s.as_u16()),
    }
}

/// Map a non-success status to the error taxonomy.
pub(crate) fn status_error(
    source_name: &str,
    status: StatusCode,
    retry_after: Option<Duration>,
    body: &str,
) -> HarvestError {
    let source_name = source_name.to_string();
    let code = status.as_u16();

    match code {
        429 => HarvestError::RateLimited {
            source_name,
            retry_after,
        },
        400 | 413 | 414 | 431 => HarvestError::QueryRejected {
            source_name,
            message: excerpt(body, status),
            status: Some(code),
        },
        500..=599 if body.contains(SPARQL_TIMEOUT_MARKER) => HarvestError::QueryRejected {
            source_name,
            message: "query timed out on the server".to_string(),
            status: Some(code),
        },
        408 | 500..=599 => HarvestError::Unavailable {
            source_name,
            message: excerpt(body, status),
            status: Some(code),
        },
        _ => HarvestError::Status {
            source_name,
            status: code,
        },
    }
}

/// `Retry-After` in its delay-seconds form. HTTP-date values are ignored.
pub(crate) fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn excerpt(body: &str, status: StatusCode) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return status.to_string();
    }
    let cut: String = trimmed.chars().take(BODY_EXCERPT_LEN).collect();
    format!("{status}: {cut}")
}

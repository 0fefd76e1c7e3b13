//! HTTP probe implementation.

use std::time::Instant;

use super::{format_response_time, ProbeConfig, ProbeError, ProbeOutcome, UNAVAILABLE_STATUS};

/// Build the client shared by every probe of a run.
pub fn build_client() -> Result<reqwest::Client, ProbeError> {
    Ok(reqwest::Client::builder().build()?)
}

/// Run an HTTP probe against the configured URL.
pub async fn run_http_probe(client: &reqwest::Client, config: &ProbeConfig) -> ProbeOutcome {
    let start = Instant::now();

    let response = match client.get(&config.url).timeout(config.timeout).send().await {
        Ok(response) => response,
        Err(e) => {
            let response_time = format_response_time(start.elapsed());
            tracing::debug!("Probe of {} got no response: {}", config.url, e);
            return ProbeOutcome {
                status: UNAVAILABLE_STATUS,
                description: e.to_string(),
                response_time,
                body: String::new(),
            };
        }
    };

    let response_time = format_response_time(start.elapsed());
    let status = response.status();
    let description = status.canonical_reason().unwrap_or_default().to_string();

    // A broken body still counts as a response
    let body = match read_body(response, config.max_body_bytes).await {
        Ok(text) => text,
        Err(e) => {
            tracing::debug!("Failed to read body from {}: {}", config.url, e);
            String::new()
        }
    };

    ProbeOutcome {
        status: status.as_u16(),
        description,
        response_time,
        body,
    }
}

/// Read the body, stopping once `limit` bytes have arrived.
async fn read_body(
    mut response: reqwest::Response,
    limit: Option<usize>,
) -> Result<String, reqwest::Error> {
    let Some(limit) = limit else {
        return response.text().await;
    };

    let mut buf = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        let room = limit - buf.len();
        if chunk.len() >= room {
            buf.extend_from_slice(&chunk[..room]);
            break;
        }
        buf.extend_from_slice(&chunk);
    }

    // Drop a character cut in half by the limit
    if let Err(e) = std::str::from_utf8(&buf) {
        if e.error_len().is_none() {
            buf.truncate(e.valid_up_to());
        }
    }
    Ok(cap_body(
        String::from_utf8_lossy(&buf).into_owned(),
        Some(limit),
    ))
}

/// Truncate `body` to at most `limit` bytes without splitting a character.
fn cap_body(mut body: String, limit: Option<usize>) -> String {
    let Some(limit) = limit else {
        return body;
    };
    if body.len() <= limit {
        return body;
    }
    let mut end = limit;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    body.truncate(end);
    body
}

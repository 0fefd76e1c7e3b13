//! JSON webhook channel.

use reqwest::header::{HeaderValue, CONTENT_TYPE};
use serde::Serialize;

use super::NotifyError;

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    text: &'a str,
}

/// Posts `{"text": ...}` messages to a webhook URL.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    url: String,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            url: url.into(),
            client,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Send `text` to the webhook. Any non-2xx answer is a failure.
    pub async fn send(&self, text: &str) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .json(&WebhookPayload { text })
            .send()
            .await
            .map_err(|e| NotifyError::Webhook(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Webhook(format!(
                "webhook request failed with status: {}",
                status
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::State, http::HeaderMap, http::StatusCode, routing::post, Json, Router};
    use std::sync::{Arc, Mutex};

    type Received = Arc<Mutex<Vec<(Option<String>, serde_json::Value)>>>;

    async fn serve(status: StatusCode) -> (String, Received) {
        let received: Received = Arc::default();
        let router = Router::new()
            .route(
                "/hook",
                post(
                    move |State(received): State<Received>,
                          headers: HeaderMap,
                          Json(body): Json<serde_json::Value>| async move {
                        let content_type = headers
                            .get("content-type")
                            .and_then(|v| v.to_str().ok())
                            .map(str::to_string);
                        received.lock().unwrap().push((content_type, body));
                        status
                    },
                ),
            )
            .with_state(received.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        (format!("http://{}/hook", addr), received)
    }

    #[tokio::test]
    async fn test_webhook_posts_text_payload() {
        let (url, received) = serve(StatusCode::OK).await;
        let notifier = WebhookNotifier::new(url, reqwest::Client::new());

        notifier.send("# Service api is down").await.unwrap();

        let received = received.lock().unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].0.as_deref(), Some("application/json"));
        assert_eq!(received[0].1, serde_json::json!({"text": "# Service api is down"}));
    }

    #[tokio::test]
    async fn test_webhook_error_status_fails() {
        let (url, _) = serve(StatusCode::BAD_GATEWAY).await;
        let notifier = WebhookNotifier::new(url, reqwest::Client::new());

        let err = notifier.send("hello").await.unwrap_err();
        assert!(matches!(err, NotifyError::Webhook(ref m) if m.contains("502")));
    }

    #[tokio::test]
    async fn test_webhook_unreachable_fails() {
        let notifier = WebhookNotifier::new("not a url", reqwest::Client::new());
        assert!(matches!(
            notifier.send("hello").await,
            Err(NotifyError::Webhook(_))
        ));
    }
}

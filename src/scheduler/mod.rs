//! Scheduler module running health check cycles.
//!
//! One cycle loads the previous result, probes the URL, applies the
//! threshold rule, notifies on a crossing edge and writes the new result
//! back. Cycles run back to back on a fixed interval, never overlapping.

use chrono::Utc;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::Instrument;

use crate::config::{ConfigError, MonitorConfig};
use crate::db::{CheckResult, DbError, Store};
use crate::notify::{
    MessageTemplate, NatsPublisher, Notifier, NotifyError, TemplateError, WebhookNotifier,
};
use crate::probe::{build_client, run_http_probe, ProbeConfig, ProbeError};
use crate::threshold::{evaluate, Thresholds, SUCCESS_STATUS};

const REQUEST_ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const REQUEST_ID_LEN: usize = 12;

/// Errors from setting up or running a health check.
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("store error: {0}")]
    Store(#[from] DbError),
    #[error("failed to send notification(s): {0}")]
    Notify(#[from] NotifyError),
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("{0}")]
    Probe(#[from] ProbeError),
    #[error("invalid notification template: {0}")]
    Template(#[from] TemplateError),
}

/// The outcome of one completed cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub result: CheckResult,
    pub notified: bool,
}

/// Everything needed to check one URL.
pub struct Monitor {
    name: String,
    probe: ProbeConfig,
    thresholds: Thresholds,
    client: reqwest::Client,
    store: Store,
    notifier: Notifier,
}

impl Monitor {
    pub fn new(
        name: impl Into<String>,
        probe: ProbeConfig,
        thresholds: Thresholds,
        client: reqwest::Client,
        store: Store,
        notifier: Notifier,
    ) -> Self {
        Self {
            name: name.into(),
            probe,
            thresholds,
            client,
            store,
            notifier,
        }
    }

    /// Build a monitor from validated configuration.
    ///
    /// Opens the store and creates its table, loads the templates and
    /// connects the notification channels. Any failure here means no check
    /// should run.
    pub async fn from_config(cfg: &MonitorConfig) -> Result<Self, MonitorError> {
        cfg.validate()?;

        let store = Store::open(&cfg.db_path, &cfg.table_name)?;
        store.ensure_collection()?;
        tracing::info!(
            "Using table {} in database {}",
            store.table(),
            cfg.db_path.display()
        );

        let client = build_client()?;
        let notifier = build_notifier(cfg, &client).await?;
        if !notifier.has_channels() {
            tracing::warn!("No notification channels configured");
        }

        Ok(Self::new(
            cfg.display_name(),
            cfg.probe_config()?,
            cfg.thresholds(),
            client,
            store,
            notifier,
        ))
    }

    pub fn url(&self) -> &str {
        &self.probe.url
    }

    /// Run one health check cycle.
    ///
    /// The new result is stored even when sending the notification fails;
    /// the notification error is returned afterwards.
    pub async fn run_cycle(&self) -> Result<CycleReport, MonitorError> {
        let prior = self.store.get(self.url())?;

        let now = Utc::now();
        let outcome = run_http_probe(&self.client, &self.probe).await;
        let eval = evaluate(&prior, outcome, self.thresholds, &self.name, self.url(), now);

        let notify_result = if eval.should_notify {
            tracing::info!(
                "Service {} {}, sending notification",
                eval.result.name,
                eval.result.change_description
            );
            Some(self.notifier.notify(&eval.result).await)
        } else {
            None
        };

        self.store.put(&eval.result)?;

        if let Some(Err(e)) = notify_result {
            return Err(e.into());
        }

        Ok(CycleReport {
            result: eval.result,
            notified: eval.should_notify,
        })
    }
}

async fn build_notifier(
    cfg: &MonitorConfig,
    client: &reqwest::Client,
) -> Result<Notifier, MonitorError> {
    let mut notifier = Notifier::with_default_templates()?;
    if let Some(path) = &cfg.markdown_template {
        notifier = notifier.with_markdown_template(MessageTemplate::from_file(path)?);
    }
    if let Some(path) = &cfg.plain_template {
        notifier = notifier.with_plain_template(MessageTemplate::from_file(path)?);
    }
    notifier.check_templates()?;

    if let Some(url) = cfg.webhook_url.as_deref().filter(|u| !u.is_empty()) {
        notifier = notifier.with_webhook(WebhookNotifier::new(url, client.clone()));
    }

    if !cfg.topics.is_empty() {
        let publisher = NatsPublisher::connect(&cfg.nats_url).await?;
        tracing::info!(
            "Publishing notifications to {} topic(s) on {}",
            cfg.topics.len(),
            cfg.nats_url
        );
        notifier = notifier.with_topics(Arc::new(publisher), cfg.topics.clone());
    }

    Ok(notifier)
}

/// A short random id tying together the log lines of one cycle.
pub fn new_request_id() -> String {
    let mut rng = rand::thread_rng();
    (0..REQUEST_ID_LEN)
        .map(|_| REQUEST_ID_ALPHABET[rng.gen_range(0..REQUEST_ID_ALPHABET.len())] as char)
        .collect()
}

/// Run cycles every `interval` until `count` cycles have run (0 = forever)
/// or the process is interrupted. Returns the number of cycles run.
///
/// The first cycle starts immediately. Cycle errors are logged and the
/// schedule carries on.
pub async fn run_schedule(monitor: &Monitor, interval: Duration, count: u64) -> u64 {
    let mut remaining = (count > 0).then_some(count);
    let mut ran = 0u64;

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        if remaining == Some(0) {
            break;
        }

        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("Interrupted, stopping health checks");
                break;
            }
            _ = ticker.tick() => {
                run_logged_cycle(monitor).await;
                ran += 1;
                remaining = remaining.map(|r| r - 1);
            }
        }
    }

    ran
}

async fn run_logged_cycle(monitor: &Monitor) {
    let span = tracing::info_span!(
        "health_check",
        request_id = %new_request_id(),
        url = %monitor.url()
    );

    async {
        tracing::info!("running health check");
        match monitor.run_cycle().await {
            Ok(report) if report.result.status != SUCCESS_STATUS => {
                tracing::warn!(
                    status = report.result.status,
                    failures = report.result.failure_count,
                    "health check failed"
                );
            }
            Ok(report) => {
                tracing::info!(
                    successes = report.result.success_count,
                    response_time = %report.result.response_time,
                    "health check succeeded"
                );
            }
            Err(e) => {
                tracing::error!("{}", e);
            }
        }
    }
    .instrument(span)
    .await
}

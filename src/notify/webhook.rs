//! Webhook progress sink: rate-limited HTTP POST to a chat destination.
//!
//! Supports Discord, Slack, and Teams payload shapes plus a generic JSON
//! fallback, selected by `template`. The URL may reference an environment
//! variable with `${VAR_NAME}` syntax, substituted at construction time so
//! a webhook secret never needs to live in the config file itself. A
//! `notify_stages` allow-list (matched against the spec's `LOADING,
//! SECURITY, CHUNKING, CONTEXT, EMBEDDING, INDEXING, COMPLETE, ERROR`
//! names) and a minimum inter-notification interval keep a busy pipeline
//! from flooding the destination.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::json;

use crate::config::WebhookNotifierConfig;

use super::{Notifier, ProgressEvent, Stage};

/// Posts progress events to a configured webhook URL, dropping events
/// that arrive faster than `min_interval` apart (rate limiting) and
/// swallowing delivery failures — a broken webhook must never fail
/// ingestion.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
    template: String,
    notify_stages: Option<Vec<String>>,
    min_interval: Duration,
    last_sent: Arc<Mutex<Option<Instant>>>,
}

impl WebhookNotifier {
    #[must_use]
    pub fn from_config(config: &WebhookNotifierConfig) -> Self {
        let url = config
            .url
            .as_deref()
            .map(substitute_env_vars)
            .unwrap_or_default();

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            url,
            template: config.template.clone(),
            notify_stages: config.notify_stages.clone(),
            min_interval: Duration::from_secs_f64(config.min_interval_secs),
            last_sent: Arc::new(Mutex::new(None)),
        }
    }

    fn should_send(&self, event: &ProgressEvent) -> bool {
        if let Some(stages) = &self.notify_stages {
            if !stages.iter().any(|s| s.eq_ignore_ascii_case(event.stage.as_str())) {
                return false;
            }
        }

        let mut last_sent = self.last_sent.lock();
        let now = Instant::now();
        let allowed = match *last_sent {
            Some(previous) => now.duration_since(previous) >= self.min_interval,
            None => true,
        };
        if allowed {
            *last_sent = Some(now);
        }
        allowed
    }

    fn render_message(event: &ProgressEvent) -> String {
        match event.stage {
            Stage::Complete => format!("Finished: {}", event.message),
            Stage::Error => format!(
                "Failed: {} ({})",
                event.message,
                event.error.as_deref().unwrap_or("unknown error")
            ),
            _ if event.total > 0 => {
                format!("[{}] {} ({}/{})", event.stage, event.message, event.current, event.total)
            }
            _ => format!("[{}] {}", event.stage, event.message),
        }
    }

    fn render_payload(&self, event: &ProgressEvent) -> serde_json::Value {
        let message = Self::render_message(event);
        match self.template.as_str() {
            "discord" => json!({ "content": message }),
            "slack" => json!({ "text": message }),
            "teams" => json!({ "text": message, "type": "MessageCard" }),
            _ => json!({
                "message": message,
                "stage": event.stage.as_str(),
                "current": event.current,
                "total": event.total,
                "file_path": event.file_path,
                "error": event.error,
            }),
        }
    }
}

/// Replaces every `${VAR_NAME}` occurrence with the matching environment
/// variable, leaving it untouched if the variable is unset.
fn substitute_env_vars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let var_name = &after[..end];
                if let Ok(value) = std::env::var(var_name) {
                    out.push_str(&value);
                } else {
                    out.push_str(&rest[start..start + 2 + end + 1]);
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    out
}

#[async_trait::async_trait]
impl Notifier for WebhookNotifier {
    /// Rate-limit/allow-list decisions happen synchronously so ordering of
    /// "did this event pass the filter" stays deterministic, but the POST
    /// itself runs on a detached `tokio::spawn`ed task (§5: "the pipeline
    /// itself never blocks on a sink") — a slow or hanging webhook
    /// destination must never add latency to indexing or retrieval.
    async fn notify(&self, event: ProgressEvent) {
        if self.url.is_empty() || !self.should_send(&event) {
            return;
        }

        let payload = self.render_payload(&event);
        let client = self.client.clone();
        let url = self.url.clone();
        tokio::spawn(async move {
            if let Err(e) = client.post(&url).json(&payload).send().await {
                tracing::warn!(error = %e, "webhook delivery failed");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_known_env_var() {
        std::env::set_var("VEXRAG_TEST_WEBHOOK_TOKEN", "secret123");
        let result = substitute_env_vars("https://example.com/hooks/${VEXRAG_TEST_WEBHOOK_TOKEN}");
        assert_eq!(result, "https://example.com/hooks/secret123");
        std::env::remove_var("VEXRAG_TEST_WEBHOOK_TOKEN");
    }

    #[test]
    fn leaves_unset_var_reference_untouched() {
        let result = substitute_env_vars("https://example.com/${VEXRAG_DOES_NOT_EXIST}");
        assert_eq!(result, "https://example.com/${VEXRAG_DOES_NOT_EXIST}");
    }

    #[test]
    fn discord_template_uses_content_field() {
        let config = WebhookNotifierConfig {
            enabled: true,
            url: Some("https://discord.example/hook".to_string()),
            template: "discord".to_string(),
            notify_stages: None,
            min_interval_secs: 0.0,
            timeout_secs: 5,
        };
        let notifier = WebhookNotifier::from_config(&config);
        let payload = notifier.render_payload(&ProgressEvent::new(Stage::Loading, "indexing a.md", 0, 1));
        assert!(payload.get("content").is_some());
    }

    #[test]
    fn rate_limiting_blocks_rapid_repeat_sends() {
        let config = WebhookNotifierConfig {
            enabled: true,
            url: Some("https://example.com/hook".to_string()),
            template: "generic".to_string(),
            notify_stages: None,
            min_interval_secs: 60.0,
            timeout_secs: 5,
        };
        let notifier = WebhookNotifier::from_config(&config);
        let event = ProgressEvent::new(Stage::Loading, "indexing a.md", 0, 1);
        assert!(notifier.should_send(&event));
        assert!(!notifier.should_send(&event));
    }

    #[test]
    fn notify_stages_filter_restricts_delivery() {
        let config = WebhookNotifierConfig {
            enabled: true,
            url: Some("https://example.com/hook".to_string()),
            template: "generic".to_string(),
            notify_stages: Some(vec!["ERROR".to_string()]),
            min_interval_secs: 0.0,
            timeout_secs: 5,
        };
        let notifier = WebhookNotifier::from_config(&config);
        let started = ProgressEvent::new(Stage::Loading, "indexing a.md", 0, 1);
        let failed = ProgressEvent::new(Stage::Error, "boom", 0, 0).with_error("boom");
        assert!(!notifier.should_send(&started));
        assert!(notifier.should_send(&failed));
    }
}

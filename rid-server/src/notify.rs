//! Webhook notification dispatch for detection events.
//!
//! Fire-and-forget HTTP POST of merged detections as JSON.

use std::time::Duration;

use log::warn;
use serde_json::Value;

use rid_core::DetectionRecord;

/// Dispatches detection events to a webhook URL via HTTP POST.
#[derive(Clone)]
pub struct WebhookDispatcher {
    url: String,
    client: reqwest::Client,
}

impl WebhookDispatcher {
    pub fn new(url: &str) -> Self {
        WebhookDispatcher {
            url: url.to_string(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(5))
                .build()
                .unwrap_or_default(),
        }
    }

    /// Fire-and-forget POST of a detection event as JSON.
    pub fn notify_tagged(&self, record: &DetectionRecord, event: &str) {
        let payload = event_payload(record, event);
        let client = self.client.clone();
        let url = self.url.clone();

        tokio::spawn(async move {
            if let Err(e) = client.post(&url).json(&payload).send().await {
                warn!("webhook POST failed: {e}");
            }
        });
    }
}

/// Record fields plus an `event` tag naming the classification.
pub fn event_payload(record: &DetectionRecord, event: &str) -> Value {
    let mut payload = serde_json::to_value(record).unwrap_or(Value::Null);
    if let Value::Object(ref mut obj) = payload {
        obj.insert("event".into(), Value::String(event.to_string()));
    }
    payload
}

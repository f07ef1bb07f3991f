//! Delivery of `rekognition.face_recognised` events.
//!
//! Every accepted match becomes one event. The [`EventDispatcher`] hands each
//! event to all configured buses; a failing bus is logged and counted but never
//! changes the cycle result.

use crate::config::EventSettings;
use anyhow::{Context, Result};
use async_trait::async_trait;
use common::faces::{FaceRecognisedEvent, ProcessingResult, EVENT_FACE_RECOGNISED};
use rumqttc::{AsyncClient, MqttOptions, QoS};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use telemetry::metrics::FACE_EVENTS_FIRED;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Sink for face recognition events
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn fire(&self, event_type: &str, event: &FaceRecognisedEvent) -> Result<()>;

    fn bus_type(&self) -> &'static str;
}

/// Writes each event as a structured log line
pub struct LogEventBus;

#[async_trait]
impl EventBus for LogEventBus {
    async fn fire(&self, event_type: &str, event: &FaceRecognisedEvent) -> Result<()> {
        info!(
            event_type = %event_type,
            entity_id = %event.entity_id,
            external_image_id = %event.external_image_id,
            similarity = event.similarity,
            timestamp = %event.timestamp,
            "Face recognised"
        );
        Ok(())
    }

    fn bus_type(&self) -> &'static str {
        "log"
    }
}

/// Event as kept in the in-memory history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedEvent {
    pub event_type: String,
    pub data: FaceRecognisedEvent,
}

/// Bounded in-memory history, newest last
pub struct MemoryEventBus {
    capacity: usize,
    events: Mutex<VecDeque<RecordedEvent>>,
}

impl MemoryEventBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            events: Mutex::new(VecDeque::new()),
        }
    }

    /// Up to `limit` most recent events, oldest first
    pub fn recent(&self, limit: usize) -> Vec<RecordedEvent> {
        let events = self.events.lock().unwrap_or_else(|e| e.into_inner());
        let skip = events.len().saturating_sub(limit);
        events.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl EventBus for MemoryEventBus {
    async fn fire(&self, event_type: &str, event: &FaceRecognisedEvent) -> Result<()> {
        let mut events = self.events.lock().unwrap_or_else(|e| e.into_inner());
        if events.len() == self.capacity {
            events.pop_front();
        }
        events.push_back(RecordedEvent {
            event_type: event_type.to_string(),
            data: event.clone(),
        });
        Ok(())
    }

    fn bus_type(&self) -> &'static str {
        "memory"
    }
}

/// POSTs the event payload as JSON. `{event_type}` in the URL is replaced with
/// the event name, so `http://ha:8123/api/events/{event_type}` fires a native
/// Home Assistant event.
pub struct WebhookEventBus {
    client: reqwest::Client,
    url_template: String,
    token: Option<String>,
}

impl WebhookEventBus {
    pub fn new(url_template: impl Into<String>, token: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build webhook HTTP client")?;

        Ok(Self {
            client,
            url_template: url_template.into(),
            token,
        })
    }

    fn render_url(&self, event_type: &str) -> String {
        self.url_template.replace("{event_type}", event_type)
    }
}

#[async_trait]
impl EventBus for WebhookEventBus {
    async fn fire(&self, event_type: &str, event: &FaceRecognisedEvent) -> Result<()> {
        let url = self.render_url(event_type);

        let mut request = self.client.post(&url).json(event);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;

        if !response.status().is_success() {
            anyhow::bail!("Webhook request failed with status: {}", response.status());
        }

        info!(
            url = %url,
            status = %response.status(),
            "Webhook event delivered"
        );

        Ok(())
    }

    fn bus_type(&self) -> &'static str {
        "webhook"
    }
}

/// Publishes the JSON payload on `{prefix}/{event_type}`
pub struct MqttEventBus {
    client: AsyncClient,
    topic_prefix: String,
}

impl MqttEventBus {
    /// Connect to `mqtt://host[:port]`. The event loop runs on its own task for
    /// the lifetime of the process.
    pub fn connect(settings: &EventSettings, broker: &str) -> Result<Self> {
        let broker_url = url::Url::parse(broker).context("Invalid MQTT broker URL")?;
        let host = broker_url.host_str().context("Invalid broker host")?;
        let port = broker_url.port().unwrap_or(1883);

        let client_id = format!("face-service-{}", Uuid::new_v4());
        let mut mqtt_options = MqttOptions::new(client_id, host, port);

        if let (Some(username), Some(password)) = (&settings.mqtt_username, &settings.mqtt_password)
        {
            mqtt_options.set_credentials(username, password);
        }

        mqtt_options.set_keep_alive(Duration::from_secs(30));

        let (client, mut eventloop) = AsyncClient::new(mqtt_options, 10);

        tokio::spawn(async move {
            loop {
                if let Err(e) = eventloop.poll().await {
                    error!("MQTT eventloop error: {}", e);
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
            }
        });

        Ok(Self {
            client,
            topic_prefix: settings.mqtt_topic_prefix.trim_end_matches('/').to_string(),
        })
    }

    fn topic(&self, event_type: &str) -> String {
        format!("{}/{}", self.topic_prefix, event_type)
    }
}

#[async_trait]
impl EventBus for MqttEventBus {
    async fn fire(&self, event_type: &str, event: &FaceRecognisedEvent) -> Result<()> {
        let topic = self.topic(event_type);
        let payload = serde_json::to_string(event)?;

        self.client
            .publish(topic.clone(), QoS::AtLeastOnce, false, payload)
            .await?;

        info!(topic = %topic, "MQTT event published");

        Ok(())
    }

    fn bus_type(&self) -> &'static str {
        "mqtt"
    }
}

/// Fans every event out to all registered buses
#[derive(Clone, Default)]
pub struct EventDispatcher {
    buses: Vec<Arc<dyn EventBus>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bus(mut self, bus: Arc<dyn EventBus>) -> Self {
        self.buses.push(bus);
        self
    }

    /// Log bus plus whatever external sinks are configured
    pub fn from_settings(settings: &EventSettings, memory: Arc<MemoryEventBus>) -> Result<Self> {
        let mut dispatcher = Self::new()
            .with_bus(Arc::new(LogEventBus))
            .with_bus(memory);

        if let Some(url) = &settings.webhook_url {
            dispatcher = dispatcher.with_bus(Arc::new(WebhookEventBus::new(
                url.clone(),
                settings.webhook_token.clone(),
            )?));
            info!(url = %url, "Webhook event bus enabled");
        }

        if let Some(broker) = &settings.mqtt_broker {
            dispatcher = dispatcher.with_bus(Arc::new(MqttEventBus::connect(settings, broker)?));
            info!(broker = %broker, "MQTT event bus enabled");
        }

        Ok(dispatcher)
    }

    pub fn bus_types(&self) -> Vec<&'static str> {
        self.buses.iter().map(|b| b.bus_type()).collect()
    }

    /// Deliver one event to every bus
    pub async fn dispatch(&self, event_type: &str, event: &FaceRecognisedEvent) {
        for bus in &self.buses {
            match bus.fire(event_type, event).await {
                Ok(()) => {
                    FACE_EVENTS_FIRED
                        .with_label_values(&[bus.bus_type(), "success"])
                        .inc();
                }
                Err(e) => {
                    warn!(
                        bus = bus.bus_type(),
                        entity_id = %event.entity_id,
                        error = %e,
                        "Failed to deliver face event"
                    );
                    FACE_EVENTS_FIRED
                        .with_label_values(&[bus.bus_type(), "failure"])
                        .inc();
                }
            }
        }
    }

    /// One event per match, in match order, all sharing the cycle timestamp.
    /// Returns the number of events emitted; zero when nothing matched.
    pub async fn emit_matches(&self, entity_id: &str, result: &ProcessingResult) -> usize {
        let Some(timestamp) = result.timestamp.as_deref() else {
            return 0;
        };

        for face in &result.matches {
            let event = FaceRecognisedEvent::from_match(face, entity_id, timestamp);
            self.dispatch(EVENT_FACE_RECOGNISED, &event).await;
        }

        result.matches.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::faces::FaceMatch;

    struct FailingBus;

    #[async_trait]
    impl EventBus for FailingBus {
        async fn fire(&self, _event_type: &str, _event: &FaceRecognisedEvent) -> Result<()> {
            anyhow::bail!("bus down")
        }

        fn bus_type(&self) -> &'static str {
            "failing"
        }
    }

    fn result_with(labels: &[(&str, f64)]) -> ProcessingResult {
        ProcessingResult::from_matches(
            labels
                .iter()
                .map(|(label, similarity)| FaceMatch::new(*label, None, *similarity, None))
                .collect(),
            "2024-05-01T10:00:00+02:00",
        )
    }

    #[tokio::test]
    async fn test_emit_one_event_per_match() {
        let memory = Arc::new(MemoryEventBus::new(10));
        let dispatcher = EventDispatcher::new().with_bus(memory.clone());

        let fired = dispatcher
            .emit_matches(
                "image_processing.front_door",
                &result_with(&[("alice", 95.2), ("bob", 91.0)]),
            )
            .await;

        assert_eq!(fired, 2);
        let events = memory.recent(10);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, EVENT_FACE_RECOGNISED);
        assert_eq!(events[0].data.external_image_id, "alice");
        assert_eq!(events[1].data.external_image_id, "bob");
        assert_eq!(events[0].data.timestamp, events[1].data.timestamp);
        assert_eq!(events[1].data.entity_id, "image_processing.front_door");
    }

    #[tokio::test]
    async fn test_no_events_without_matches() {
        let memory = Arc::new(MemoryEventBus::new(10));
        let dispatcher = EventDispatcher::new().with_bus(memory.clone());

        let fired = dispatcher
            .emit_matches("image_processing.front_door", &ProcessingResult::empty())
            .await;

        assert_eq!(fired, 0);
        assert!(memory.is_empty());
    }

    #[tokio::test]
    async fn test_failing_bus_does_not_block_others() {
        let memory = Arc::new(MemoryEventBus::new(10));
        let dispatcher = EventDispatcher::new()
            .with_bus(Arc::new(FailingBus))
            .with_bus(memory.clone());

        let fired = dispatcher
            .emit_matches("image_processing.porch", &result_with(&[("carol", 99.0)]))
            .await;

        assert_eq!(fired, 1);
        assert_eq!(memory.len(), 1);
    }

    #[tokio::test]
    async fn test_memory_bus_is_bounded() {
        let memory = MemoryEventBus::new(2);
        let result = result_with(&[("a", 95.0), ("b", 95.0), ("c", 95.0)]);
        for face in &result.matches {
            let event = FaceRecognisedEvent::from_match(face, "image_processing.x", "t");
            memory.fire(EVENT_FACE_RECOGNISED, &event).await.unwrap();
        }

        let events = memory.recent(10);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].data.external_image_id, "b");
        assert_eq!(memory.recent(1)[0].data.external_image_id, "c");
    }

    #[test]
    fn test_webhook_url_template() {
        let bus = WebhookEventBus::new("http://ha.local:8123/api/events/{event_type}", None).unwrap();
        assert_eq!(
            bus.render_url(EVENT_FACE_RECOGNISED),
            "http://ha.local:8123/api/events/rekognition.face_recognised"
        );
    }
}

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rdkafka::producer::{FutureProducer, FutureRecord};
use serde::{Deserialize, Serialize};
use shared::Clock;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Hands a rendered notification to whatever delivers it.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<()>;
}

/// Maps a user id to the address a notification is delivered to.
#[async_trait]
pub trait RecipientResolver: Send + Sync {
    async fn resolve(&self, user_id: i64) -> Result<String>;
}

/// Renders addresses from a template with a `{user_id}` placeholder, e.g. `user:{user_id}`.
#[derive(Debug, Clone)]
pub struct TemplateRecipientResolver {
    template: String,
}

impl TemplateRecipientResolver {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }
}

#[async_trait]
impl RecipientResolver for TemplateRecipientResolver {
    async fn resolve(&self, user_id: i64) -> Result<String> {
        Ok(self.template.replace("{user_id}", &user_id.to_string()))
    }
}

/// Message published for the delivery service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRequest {
    pub id: Uuid,
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub requested_at: DateTime<Utc>,
}

pub struct KafkaDispatcher {
    producer: FutureProducer,
    topic: String,
    clock: Arc<dyn Clock>,
}

impl KafkaDispatcher {
    pub fn new(producer: FutureProducer, topic: String, clock: Arc<dyn Clock>) -> Self {
        Self {
            producer,
            topic,
            clock,
        }
    }
}

impl NotificationRequest {
    pub fn new(recipient: &str, subject: &str, body: &str, requested_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            recipient: recipient.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
            requested_at,
        }
    }
}

#[async_trait]
impl NotificationDispatcher for KafkaDispatcher {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<()> {
        let request = NotificationRequest::new(recipient, subject, body, self.clock.now());

        let json = serde_json::to_string(&request)?;
        let record = FutureRecord::to(&self.topic)
            .payload(&json)
            .key(recipient);

        self.producer
            .send(record, Duration::from_secs(5))
            .await
            .map_err(|(e, _)| anyhow::anyhow!("Failed to publish notification: {}", e))?;

        Ok(())
    }
}

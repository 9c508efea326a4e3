//! In-memory reminder store for local runs and tests. Nothing survives a restart.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use shared::*;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::repository::{ReminderFilter, ReminderMutation, ReminderRepository};

#[derive(Clone, Default)]
pub struct MemoryReminderRepository {
    reminders: Arc<RwLock<HashMap<Uuid, Reminder>>>,
}

impl MemoryReminderRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReminderRepository for MemoryReminderRepository {
    async fn insert(&self, reminder: &Reminder) -> Result<(), ServiceError> {
        let mut reminders = self.reminders.write().await;
        if reminders.contains_key(&reminder.id) {
            return Err(ServiceError::Database(format!(
                "Duplicate reminder id: {}",
                reminder.id
            )));
        }
        reminders.insert(reminder.id, reminder.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Reminder>, ServiceError> {
        let reminders = self.reminders.read().await;
        Ok(reminders.get(&id).cloned())
    }

    async fn update(
        &self,
        id: Uuid,
        mutation: ReminderMutation,
    ) -> Result<Reminder, ServiceError> {
        let mut reminders = self.reminders.write().await;
        let stored = reminders
            .get_mut(&id)
            .ok_or_else(|| ServiceError::not_found("Reminder", id))?;

        let mut reminder = stored.clone();
        mutation(&mut reminder)?;
        *stored = reminder.clone();
        Ok(reminder)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, ServiceError> {
        let mut reminders = self.reminders.write().await;
        Ok(reminders.remove(&id).is_some())
    }

    async fn list(
        &self,
        filter: ReminderFilter,
        page: PageRequest,
    ) -> Result<Page<Reminder>, ServiceError> {
        let reminders = self.reminders.read().await;
        let mut matching: Vec<&Reminder> =
            reminders.values().filter(|r| filter.matches(r)).collect();
        matching.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        if page.sort_dir == SortDirection::Desc {
            matching.reverse();
        }

        let total = matching.len() as u64;
        let content = matching
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit() as usize)
            .cloned()
            .collect();
        Ok(Page::new(content, page, total))
    }

    async fn find_due(&self, at: NaiveDateTime) -> Result<Vec<Reminder>, ServiceError> {
        let reminders = self.reminders.read().await;
        Ok(reminders.values().filter(|r| r.is_due(at)).cloned().collect())
    }

    async fn count(&self) -> Result<u64, ServiceError> {
        Ok(self.reminders.read().await.len() as u64)
    }

    async fn count_active(&self) -> Result<u64, ServiceError> {
        let reminders = self.reminders.read().await;
        Ok(reminders.values().filter(|r| r.is_active).count() as u64)
    }
}

use shared::*;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

use crate::repository::{ReminderFilter, ReminderRepository};

#[derive(Clone)]
pub struct ReminderService {
    repo: Arc<dyn ReminderRepository>,
    clock: Arc<dyn Clock>,
    timeout: Duration,
}

impl ReminderService {
    pub fn new(
        repo: Arc<dyn ReminderRepository>,
        clock: Arc<dyn Clock>,
        timeout: Duration,
    ) -> Self {
        Self {
            repo,
            clock,
            timeout,
        }
    }

    pub async fn create_reminder(
        &self,
        request: ReminderRequest,
    ) -> Result<Reminder, ServiceError> {
        let reminder = Reminder::create(request, self.clock.now())?;
        bounded(self.timeout, self.repo.insert(&reminder)).await?;

        info!(
            "Reminder {} created for user {} ({} slots)",
            reminder.id,
            reminder.user_id,
            reminder.reminder_times.len()
        );
        Ok(reminder)
    }

    pub async fn get_reminder(&self, id: Uuid) -> Result<Reminder, ServiceError> {
        bounded(self.timeout, self.repo.find_by_id(id))
            .await?
            .ok_or_else(|| ServiceError::not_found("Reminder", id))
    }

    pub async fn list_reminders(
        &self,
        filter: ReminderFilter,
        page: PageRequest,
    ) -> Result<Page<Reminder>, ServiceError> {
        bounded(self.timeout, self.repo.list(filter, page)).await
    }

    pub async fn update_reminder(
        &self,
        id: Uuid,
        request: ReminderRequest,
    ) -> Result<Reminder, ServiceError> {
        request.validate()?;
        let now = self.clock.now();
        bounded(
            self.timeout,
            self.repo.update(
                id,
                Box::new(move |reminder: &mut Reminder| reminder.apply_update(request, now)),
            ),
        )
        .await
    }

    pub async fn delete_reminder(&self, id: Uuid) -> Result<(), ServiceError> {
        if !bounded(self.timeout, self.repo.delete(id)).await? {
            return Err(ServiceError::not_found("Reminder", id));
        }
        info!("Reminder {} deleted", id);
        Ok(())
    }

    pub async fn activate_reminder(&self, id: Uuid) -> Result<Reminder, ServiceError> {
        self.set_active(id, true).await
    }

    pub async fn deactivate_reminder(&self, id: Uuid) -> Result<Reminder, ServiceError> {
        self.set_active(id, false).await
    }

    async fn set_active(&self, id: Uuid, active: bool) -> Result<Reminder, ServiceError> {
        let now = self.clock.now();
        let reminder = bounded(
            self.timeout,
            self.repo.update(
                id,
                Box::new(move |reminder: &mut Reminder| reminder.set_active(active, now)),
            ),
        )
        .await?;

        info!("Reminder {} active={}", id, active);
        Ok(reminder)
    }
}

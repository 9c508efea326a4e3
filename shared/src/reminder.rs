use chrono::{DateTime, NaiveDateTime, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::ServiceError;

pub const DEFAULT_INSTRUCTION: &str = "As prescribed";
pub const DEFAULT_NOTES: &str = "N/A";

/// Drops seconds and sub-seconds so values compare at minute granularity.
pub fn truncate_to_minute(time: NaiveTime) -> NaiveTime {
    NaiveTime::from_hms_opt(time.hour(), time.minute(), 0).unwrap_or(time)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reminder {
    pub id: Uuid,
    pub user_id: i64,
    pub medicine_id: i64,
    pub medicine_name: String,
    pub dosage: Option<String>,
    pub frequency: Option<String>,
    pub start_date: NaiveDateTime,
    pub end_date: Option<NaiveDateTime>,
    pub reminder_times: BTreeSet<NaiveTime>,
    pub is_active: bool,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Create/update payload. On update `user_id` and `medicine_id` are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct ReminderRequest {
    pub user_id: i64,
    pub medicine_id: i64,
    pub medicine_name: String,
    pub dosage: Option<String>,
    pub frequency: Option<String>,
    pub start_date: NaiveDateTime,
    pub end_date: Option<NaiveDateTime>,
    pub reminder_times: Vec<NaiveTime>,
    pub notes: Option<String>,
}

impl ReminderRequest {
    pub fn validate(&self) -> Result<(), ServiceError> {
        if self.medicine_name.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "Medicine name is required".to_string(),
            ));
        }
        if self.reminder_times.is_empty() {
            return Err(ServiceError::ValidationError(
                "Reminder times cannot be empty".to_string(),
            ));
        }
        if let Some(end_date) = self.end_date {
            if end_date < self.start_date {
                return Err(ServiceError::ValidationError(
                    "End date cannot be before start date".to_string(),
                ));
            }
        }
        Ok(())
    }

    fn slots(&self) -> BTreeSet<NaiveTime> {
        self.reminder_times
            .iter()
            .copied()
            .map(truncate_to_minute)
            .collect()
    }
}

impl Reminder {
    pub fn create(request: ReminderRequest, now: DateTime<Utc>) -> Result<Self, ServiceError> {
        request.validate()?;
        let reminder_times = request.slots();

        Ok(Self {
            id: Uuid::new_v4(),
            user_id: request.user_id,
            medicine_id: request.medicine_id,
            medicine_name: request.medicine_name,
            dosage: request.dosage,
            frequency: request.frequency,
            start_date: request.start_date,
            end_date: request.end_date,
            reminder_times,
            is_active: true,
            notes: request.notes,
            created_at: now,
            updated_at: now,
        })
    }

    /// Replaces the mutable fields; ownership and target medicine stay fixed.
    pub fn apply_update(
        &mut self,
        request: ReminderRequest,
        now: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        request.validate()?;
        self.reminder_times = request.slots();
        self.medicine_name = request.medicine_name;
        self.dosage = request.dosage;
        self.frequency = request.frequency;
        self.start_date = request.start_date;
        self.end_date = request.end_date;
        self.notes = request.notes;
        self.updated_at = now;
        Ok(())
    }

    pub fn set_active(&mut self, active: bool, now: DateTime<Utc>) -> Result<(), ServiceError> {
        if active && self.reminder_times.is_empty() {
            return Err(ServiceError::ValidationError(
                "Cannot activate a reminder without reminder times".to_string(),
            ));
        }
        self.is_active = active;
        self.updated_at = now;
        Ok(())
    }

    pub fn within_window(&self, at: NaiveDateTime) -> bool {
        self.start_date <= at && self.end_date.map_or(true, |end| at <= end)
    }

    /// `at` is a local wall-clock instant; only its minute of day is compared to the slots.
    pub fn is_due(&self, at: NaiveDateTime) -> bool {
        self.is_active
            && self.within_window(at)
            && self.reminder_times.contains(&truncate_to_minute(at.time()))
    }

    pub fn notification_subject(&self) -> String {
        format!("Medicine Reminder - {}", self.medicine_name)
    }

    pub fn notification_body(&self) -> String {
        format!(
            "Dear User,\n\n\
             This is a reminder to take your medicine:\n\n\
             Medicine: {}\n\
             Dosage: {}\n\
             Frequency: {}\n\
             Notes: {}\n\n\
             Please take your medicine as prescribed.\n\n\
             Best regards,\n\
             PharmaGo Team",
            self.medicine_name,
            self.dosage.as_deref().unwrap_or(DEFAULT_INSTRUCTION),
            self.frequency.as_deref().unwrap_or(DEFAULT_INSTRUCTION),
            self.notes.as_deref().unwrap_or(DEFAULT_NOTES),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderStatistics {
    pub total_reminders: u64,
    pub active_reminders: u64,
}

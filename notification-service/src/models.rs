use chrono::{DateTime, NaiveDateTime, NaiveTime, Utc};
use diesel::prelude::*;
use shared::*;
use uuid::Uuid;

#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = crate::schema::reminders)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[diesel(treat_none_as_null = true)]
pub struct ReminderRow {
    pub id: Uuid,
    pub user_id: i64,
    pub medicine_id: i64,
    pub medicine_name: String,
    pub dosage: Option<String>,
    pub frequency: Option<String>,
    pub start_date: NaiveDateTime,
    pub end_date: Option<NaiveDateTime>,
    pub is_active: bool,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = crate::schema::reminder_times)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ReminderTimeRow {
    pub reminder_id: Uuid,
    pub reminder_time: NaiveTime,
}

impl ReminderRow {
    pub fn from_reminder(reminder: &Reminder) -> Self {
        Self {
            id: reminder.id,
            user_id: reminder.user_id,
            medicine_id: reminder.medicine_id,
            medicine_name: reminder.medicine_name.clone(),
            dosage: reminder.dosage.clone(),
            frequency: reminder.frequency.clone(),
            start_date: reminder.start_date,
            end_date: reminder.end_date,
            is_active: reminder.is_active,
            notes: reminder.notes.clone(),
            created_at: reminder.created_at,
            updated_at: reminder.updated_at,
        }
    }

    pub fn into_reminder(self, times: impl IntoIterator<Item = NaiveTime>) -> Reminder {
        Reminder {
            id: self.id,
            user_id: self.user_id,
            medicine_id: self.medicine_id,
            medicine_name: self.medicine_name,
            dosage: self.dosage,
            frequency: self.frequency,
            start_date: self.start_date,
            end_date: self.end_date,
            reminder_times: times.into_iter().collect(),
            is_active: self.is_active,
            notes: self.notes,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

impl ReminderTimeRow {
    pub fn from_reminder(reminder: &Reminder) -> Vec<Self> {
        reminder
            .reminder_times
            .iter()
            .map(|&reminder_time| Self {
                reminder_id: reminder.id,
                reminder_time,
            })
            .collect()
    }
}

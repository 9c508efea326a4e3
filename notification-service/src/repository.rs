use async_trait::async_trait;
use chrono::{NaiveDateTime, NaiveTime};
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel_async::{pooled_connection::bb8::Pool, AsyncConnection, AsyncPgConnection, RunQueryDsl};
use serde::Deserialize;
use shared::*;
use std::collections::HashMap;
use std::fmt::Display;
use uuid::Uuid;

use crate::models::*;
use crate::schema::*;

pub type DbPool = Pool<AsyncPgConnection>;

/// A change applied to a loaded reminder before it is written back.
pub type ReminderMutation = Box<dyn FnOnce(&mut Reminder) -> Result<(), ServiceError> + Send>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct ReminderFilter {
    pub user_id: Option<i64>,
    pub active: Option<bool>,
}

impl ReminderFilter {
    pub fn matches(&self, reminder: &Reminder) -> bool {
        self.user_id.map_or(true, |user_id| reminder.user_id == user_id)
            && self.active.map_or(true, |active| reminder.is_active == active)
    }
}

#[async_trait]
pub trait ReminderRepository: Send + Sync {
    /// Stores the reminder together with its reminder times.
    async fn insert(&self, reminder: &Reminder) -> Result<(), ServiceError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Reminder>, ServiceError>;

    /// Loads, mutates and writes back one reminder atomically.
    ///
    /// Nothing is written when the mutation fails. Fails with `NotFound` for unknown ids.
    async fn update(&self, id: Uuid, mutation: ReminderMutation)
        -> Result<Reminder, ServiceError>;

    /// Returns whether a reminder was removed.
    async fn delete(&self, id: Uuid) -> Result<bool, ServiceError>;

    async fn list(
        &self,
        filter: ReminderFilter,
        page: PageRequest,
    ) -> Result<Page<Reminder>, ServiceError>;

    /// Active reminders whose validity window contains `at` and which fire at `at`'s minute.
    async fn find_due(&self, at: NaiveDateTime) -> Result<Vec<Reminder>, ServiceError>;

    async fn count(&self) -> Result<u64, ServiceError>;

    async fn count_active(&self) -> Result<u64, ServiceError>;
}

fn pool_error(e: impl Display) -> ServiceError {
    ServiceError::Database(format!("Connection pool error: {}", e))
}

fn filtered(filter: &ReminderFilter) -> reminders::BoxedQuery<'static, Pg> {
    let mut query = reminders::table.into_boxed();
    if let Some(user_id) = filter.user_id {
        query = query.filter(reminders::user_id.eq(user_id));
    }
    if let Some(active) = filter.active {
        query = query.filter(reminders::is_active.eq(active));
    }
    query
}

async fn with_times(
    conn: &mut AsyncPgConnection,
    rows: Vec<ReminderRow>,
) -> Result<Vec<Reminder>, ServiceError> {
    let ids: Vec<Uuid> = rows.iter().map(|row| row.id).collect();
    let time_rows = reminder_times::table
        .filter(reminder_times::reminder_id.eq_any(&ids))
        .select(ReminderTimeRow::as_select())
        .load(conn)
        .await?;

    let mut times: HashMap<Uuid, Vec<NaiveTime>> = HashMap::new();
    for row in time_rows {
        times.entry(row.reminder_id).or_default().push(row.reminder_time);
    }

    Ok(rows
        .into_iter()
        .map(|row| {
            let slots = times.remove(&row.id).unwrap_or_default();
            row.into_reminder(slots)
        })
        .collect())
}

pub struct PgReminderRepository {
    pool: DbPool,
}

impl PgReminderRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReminderRepository for PgReminderRepository {
    async fn insert(&self, reminder: &Reminder) -> Result<(), ServiceError> {
        let mut conn = self.pool.get().await.map_err(pool_error)?;

        let row = ReminderRow::from_reminder(reminder);
        let time_rows = ReminderTimeRow::from_reminder(reminder);
        conn.transaction::<_, ServiceError, _>(|conn| {
            Box::pin(async move {
                diesel::insert_into(reminders::table)
                    .values(&row)
                    .execute(conn)
                    .await?;

                diesel::insert_into(reminder_times::table)
                    .values(&time_rows)
                    .execute(conn)
                    .await?;

                Ok(())
            })
        })
        .await
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Reminder>, ServiceError> {
        let mut conn = self.pool.get().await.map_err(pool_error)?;

        let row = reminders::table
            .find(id)
            .select(ReminderRow::as_select())
            .first(&mut conn)
            .await
            .optional()?;

        match row {
            Some(row) => Ok(with_times(&mut conn, vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn update(
        &self,
        id: Uuid,
        mutation: ReminderMutation,
    ) -> Result<Reminder, ServiceError> {
        let mut conn = self.pool.get().await.map_err(pool_error)?;

        conn.transaction::<_, ServiceError, _>(|conn| {
            Box::pin(async move {
                let row = reminders::table
                    .find(id)
                    .select(ReminderRow::as_select())
                    .for_update()
                    .first(conn)
                    .await
                    .optional()?
                    .ok_or_else(|| ServiceError::not_found("Reminder", id))?;

                let mut reminder = with_times(conn, vec![row])
                    .await?
                    .pop()
                    .ok_or_else(|| ServiceError::not_found("Reminder", id))?;
                mutation(&mut reminder)?;

                diesel::update(reminders::table.find(id))
                    .set(&ReminderRow::from_reminder(&reminder))
                    .execute(conn)
                    .await?;

                diesel::delete(reminder_times::table.filter(reminder_times::reminder_id.eq(id)))
                    .execute(conn)
                    .await?;

                diesel::insert_into(reminder_times::table)
                    .values(&ReminderTimeRow::from_reminder(&reminder))
                    .execute(conn)
                    .await?;

                Ok(reminder)
            })
        })
        .await
    }

    async fn delete(&self, id: Uuid) -> Result<bool, ServiceError> {
        let mut conn = self.pool.get().await.map_err(pool_error)?;

        // reminder_times rows go with it through ON DELETE CASCADE
        let deleted = diesel::delete(reminders::table.find(id))
            .execute(&mut conn)
            .await?;

        Ok(deleted > 0)
    }

    async fn list(
        &self,
        filter: ReminderFilter,
        page: PageRequest,
    ) -> Result<Page<Reminder>, ServiceError> {
        let mut conn = self.pool.get().await.map_err(pool_error)?;

        let total: i64 = filtered(&filter).count().get_result(&mut conn).await?;

        let query = match page.sort_dir {
            SortDirection::Asc => filtered(&filter).order(reminders::created_at.asc()),
            SortDirection::Desc => filtered(&filter).order(reminders::created_at.desc()),
        };
        let rows = query
            .select(ReminderRow::as_select())
            .limit(page.limit())
            .offset(page.offset())
            .load(&mut conn)
            .await?;

        let reminders = with_times(&mut conn, rows).await?;
        Ok(Page::new(reminders, page, total as u64))
    }

    async fn find_due(&self, at: NaiveDateTime) -> Result<Vec<Reminder>, ServiceError> {
        let mut conn = self.pool.get().await.map_err(pool_error)?;

        let slot = truncate_to_minute(at.time());
        let rows = reminders::table
            .inner_join(reminder_times::table)
            .filter(reminders::is_active.eq(true))
            .filter(reminder_times::reminder_time.eq(slot))
            .filter(reminders::start_date.le(at))
            .filter(reminders::end_date.is_null().or(reminders::end_date.ge(at)))
            .select(ReminderRow::as_select())
            .load(&mut conn)
            .await?;

        with_times(&mut conn, rows).await
    }

    async fn count(&self) -> Result<u64, ServiceError> {
        let mut conn = self.pool.get().await.map_err(pool_error)?;

        let total: i64 = reminders::table.count().get_result(&mut conn).await?;
        Ok(total as u64)
    }

    async fn count_active(&self) -> Result<u64, ServiceError> {
        let mut conn = self.pool.get().await.map_err(pool_error)?;

        let active: i64 = reminders::table
            .filter(reminders::is_active.eq(true))
            .count()
            .get_result(&mut conn)
            .await?;
        Ok(active as u64)
    }
}

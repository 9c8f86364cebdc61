//! Versioned reminder records on sqlite.
//!
//! Every reminder lives in a version chain: edits retire the current row and
//! insert a successor pointing at the chain root, while the recurrence
//! advance path mutates the same row in place. Deletion is always logical.
//! All mutating operations run inside one transaction per reminder, and the
//! `last_fired_at` guard in `get_due` keeps overlapping poll ticks from
//! delivering the same occurrence twice.

use std::path::Path;

use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use diesel_async::pooled_connection::bb8::{Pool, PooledConnection};
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::sync_connection_wrapper::SyncConnectionWrapper;
use diesel_async::{AsyncConnection, RunQueryDsl};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use serde::Serialize;

use crate::error::{RemembotError, Result};
use crate::recurrence::{self, Recurrence};

mod schema;
use schema::reminders;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

type SqliteAsyncConn = SyncConnectionWrapper<SqliteConnection>;
type SqlitePool = Pool<SqliteAsyncConn>;
type SqlitePooledConn<'a> = PooledConnection<'a, SqliteAsyncConn>;

/// What `create` needs; everything else (version chain bookkeeping, flags,
/// timestamps) is assigned by the store.
#[derive(Debug, Clone)]
pub struct NewReminder {
    pub owner: String,
    pub task_text: String,
    pub due_at: i64,
    pub original_context: Option<String>,
    pub recurrence: Option<Recurrence>,
}

/// One row selected by `get_due`, carrying just what the delivery loop needs.
#[derive(Debug, Clone, Serialize)]
pub struct DueReminder {
    pub id: i32,
    pub owner: String,
    pub task_text: String,
    pub original_context: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReminderSummary {
    pub id: i32,
    pub task_text: String,
    pub due_at: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReminderDetail {
    pub task_text: String,
    pub due_at: i64,
    pub original_context: Option<String>,
}

#[derive(Insertable)]
#[diesel(table_name = reminders)]
struct NewReminderRow<'a> {
    owner: &'a str,
    task_text: &'a str,
    original_context: Option<&'a str>,
    due_at: i64,
    notified: bool,
    deleted: bool,
    deleted_at: Option<i64>,
    is_current_version: bool,
    version: i32,
    original_id: Option<i32>,
    recurrence_kind: Option<&'a str>,
    recurrence_interval: Option<i32>,
    days_of_week: Option<String>,
    recurrence_end_at: Option<i64>,
    last_fired_at: Option<i64>,
    created_at: i64,
    modified_at: i64,
}

pub struct ReminderStore {
    pool: SqlitePool,
}

impl ReminderStore {
    pub async fn new(sqlite_path: impl AsRef<str>) -> Result<Self> {
        let sqlite_path = sqlite_path.as_ref();
        ensure_parent_dir(sqlite_path)?;
        run_migrations(sqlite_path).await?;

        let manager = AsyncDieselConnectionManager::<SqliteAsyncConn>::new(sqlite_path);
        let pool: SqlitePool = Pool::builder()
            .build(manager)
            .await
            .map_err(|e| RemembotError::Database(e.to_string()))?;
        Ok(Self { pool })
    }

    /// Inserts a fresh chain root (`version = 1`, current, pending).
    pub async fn create(&self, reminder: &NewReminder, now: i64) -> Result<i32> {
        let row = NewReminderRow {
            owner: &reminder.owner,
            task_text: &reminder.task_text,
            original_context: reminder.original_context.as_deref(),
            due_at: reminder.due_at,
            notified: false,
            deleted: false,
            deleted_at: None,
            is_current_version: true,
            version: 1,
            original_id: None,
            recurrence_kind: reminder.recurrence.as_ref().map(|r| r.kind.as_str()),
            recurrence_interval: reminder.recurrence.as_ref().map(|r| r.interval as i32),
            days_of_week: reminder
                .recurrence
                .as_ref()
                .and_then(|r| r.days_of_week.as_ref())
                .map(|days| join_days(days)),
            recurrence_end_at: reminder.recurrence.as_ref().and_then(|r| r.end_at),
            last_fired_at: None,
            created_at: now,
            modified_at: now,
        };

        let mut conn = self.conn().await?;
        let owner = reminder.owner.clone();
        conn.transaction::<i32, RemembotError, _>(|conn| {
            async move {
                diesel::insert_into(reminders::table)
                    .values(&row)
                    .execute(conn)
                    .await?;
                let id = reminders::table
                    .filter(reminders::owner.eq(&owner))
                    .order(reminders::id.desc())
                    .select(reminders::id)
                    .first::<i32>(conn)
                    .await?;
                Ok(id)
            }
            .scope_boxed()
        })
        .await
    }

    /// Due rows in ascending `due_at` order. A non-recurring reminder is due
    /// while pending and past its instant; a recurring one is due when its
    /// next occurrence has arrived and has not been fired yet
    /// (`last_fired_at < due_at` once the row has ever fired).
    pub async fn get_due(&self, now: i64) -> Result<Vec<DueReminder>> {
        let mut conn = self.conn().await?;

        let oneshot_due = reminders::recurrence_kind
            .is_null()
            .and(reminders::notified.eq(false))
            .and(reminders::due_at.le(now));
        let recurring_due = reminders::recurrence_kind
            .is_not_null()
            .and(reminders::due_at.le(now))
            .and(
                reminders::last_fired_at
                    .is_null()
                    .or(reminders::last_fired_at.lt(reminders::due_at.nullable())),
            );

        let rows: Vec<(i32, String, String, Option<String>)> = reminders::table
            .filter(reminders::deleted.eq(false))
            .filter(reminders::is_current_version.eq(true))
            .filter(oneshot_due.or(recurring_due))
            .order(reminders::due_at.asc())
            .select((
                reminders::id,
                reminders::owner,
                reminders::task_text,
                reminders::original_context,
            ))
            .load(&mut conn)
            .await
            .map_err(|e| RemembotError::Database(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|(id, owner, task_text, original_context)| DueReminder {
                id,
                owner,
                task_text,
                original_context,
            })
            .collect())
    }

    /// Terminal delivery mark for non-recurring reminders.
    pub async fn mark_delivered(&self, ids: &[i32], now: i64) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn().await?;
        let updated = diesel::update(reminders::table.filter(reminders::id.eq_any(ids)))
            .set((reminders::notified.eq(true), reminders::modified_at.eq(now)))
            .execute(&mut conn)
            .await
            .map_err(|e| RemembotError::Database(e.to_string()))?;
        Ok(updated)
    }

    /// Moves a recurring reminder to its next occurrence in place, or
    /// retires the series when the next occurrence would pass `end_at`.
    /// Returns whether the reminder advanced. `last_fired_at` is bumped in
    /// the same transaction as `due_at` so an overlapping poll tick can no
    /// longer select this occurrence.
    pub async fn advance_or_retire(
        &self,
        id: i32,
        recurrence: &Recurrence,
        now: i64,
    ) -> Result<bool> {
        let kind = recurrence.kind;
        let interval = recurrence.interval;
        let end_at = recurrence.end_at;

        let mut conn = self.conn().await?;
        conn.transaction::<bool, RemembotError, _>(|conn| {
            async move {
                let due_at = reminders::table
                    .filter(reminders::id.eq(id))
                    .filter(reminders::deleted.eq(false))
                    .select(reminders::due_at)
                    .first::<i64>(conn)
                    .await
                    .optional()?;
                let Some(due_at) = due_at else {
                    return Ok(false);
                };

                let next = recurrence::advance(due_at, kind, interval);
                if end_at.map(|end| next > end).unwrap_or(false) {
                    diesel::update(reminders::table.filter(reminders::id.eq(id)))
                        .set((
                            reminders::notified.eq(true),
                            reminders::last_fired_at.eq(Some(now)),
                            reminders::modified_at.eq(now),
                        ))
                        .execute(conn)
                        .await?;
                    return Ok(false);
                }

                diesel::update(reminders::table.filter(reminders::id.eq(id)))
                    .set((
                        reminders::due_at.eq(next),
                        reminders::notified.eq(false),
                        reminders::last_fired_at.eq(Some(now)),
                        reminders::modified_at.eq(now),
                    ))
                    .execute(conn)
                    .await?;
                Ok(true)
            }
            .scope_boxed()
        })
        .await
    }

    /// Version-chain edit: the current row is retired and a successor is
    /// inserted with `version + 1`, carrying the recurrence settings forward
    /// unchanged. Both steps commit as one transaction. Returns false when
    /// no current, non-deleted row matches `(id, owner)`.
    pub async fn edit(
        &self,
        id: i32,
        owner: &str,
        new_task_text: &str,
        new_due_at: i64,
        new_context: Option<&str>,
        now: i64,
    ) -> Result<bool> {
        let mut conn = self.conn().await?;
        conn.transaction::<bool, RemembotError, _>(|conn| {
            async move {
                let existing = reminders::table
                    .filter(reminders::id.eq(id))
                    .filter(reminders::owner.eq(owner))
                    .filter(reminders::deleted.eq(false))
                    .filter(reminders::is_current_version.eq(true))
                    .select((
                        reminders::version,
                        reminders::original_id,
                        reminders::recurrence_kind,
                        reminders::recurrence_interval,
                        reminders::days_of_week,
                        reminders::recurrence_end_at,
                    ))
                    .first::<(
                        i32,
                        Option<i32>,
                        Option<String>,
                        Option<i32>,
                        Option<String>,
                        Option<i64>,
                    )>(conn)
                    .await
                    .optional()?;

                let Some((version, original_id, kind, interval, days, end_at)) = existing else {
                    return Ok(false);
                };

                diesel::update(reminders::table.filter(reminders::id.eq(id)))
                    .set((
                        reminders::is_current_version.eq(false),
                        reminders::modified_at.eq(now),
                    ))
                    .execute(conn)
                    .await?;

                let successor = NewReminderRow {
                    owner,
                    task_text: new_task_text,
                    original_context: new_context,
                    due_at: new_due_at,
                    notified: false,
                    deleted: false,
                    deleted_at: None,
                    is_current_version: true,
                    version: version + 1,
                    original_id: Some(original_id.unwrap_or(id)),
                    recurrence_kind: kind.as_deref(),
                    recurrence_interval: interval,
                    days_of_week: days,
                    recurrence_end_at: end_at,
                    last_fired_at: None,
                    created_at: now,
                    modified_at: now,
                };
                diesel::insert_into(reminders::table)
                    .values(&successor)
                    .execute(conn)
                    .await?;
                Ok(true)
            }
            .scope_boxed()
        })
        .await
    }

    /// Logical removal of the current version. `deleted` is monotonic; rows
    /// are never physically erased.
    pub async fn soft_delete(&self, id: i32, owner: &str, now: i64) -> Result<bool> {
        let mut conn = self.conn().await?;
        let updated = diesel::update(
            reminders::table
                .filter(reminders::id.eq(id))
                .filter(reminders::owner.eq(owner))
                .filter(reminders::deleted.eq(false))
                .filter(reminders::is_current_version.eq(true)),
        )
        .set((
            reminders::deleted.eq(true),
            reminders::deleted_at.eq(Some(now)),
            reminders::modified_at.eq(now),
        ))
        .execute(&mut conn)
        .await
        .map_err(|e| RemembotError::Database(e.to_string()))?;
        Ok(updated > 0)
    }

    pub async fn soft_delete_all_pending(&self, owner: &str, now: i64) -> Result<usize> {
        let mut conn = self.conn().await?;
        let updated = diesel::update(
            reminders::table
                .filter(reminders::owner.eq(owner))
                .filter(reminders::deleted.eq(false))
                .filter(reminders::is_current_version.eq(true))
                .filter(reminders::notified.eq(false)),
        )
        .set((
            reminders::deleted.eq(true),
            reminders::deleted_at.eq(Some(now)),
            reminders::modified_at.eq(now),
        ))
        .execute(&mut conn)
        .await
        .map_err(|e| RemembotError::Database(e.to_string()))?;
        Ok(updated)
    }

    pub async fn count_active(&self, owner: &str) -> Result<i64> {
        let mut conn = self.conn().await?;
        reminders::table
            .filter(reminders::owner.eq(owner))
            .filter(reminders::deleted.eq(false))
            .filter(reminders::is_current_version.eq(true))
            .count()
            .get_result(&mut conn)
            .await
            .map_err(|e| RemembotError::Database(e.to_string()))
    }

    /// Creation-rate probe for the admission policy. Counts every insert in
    /// the window, deleted rows included; edits count too since each inserts
    /// a row.
    pub async fn count_created_since(
        &self,
        owner: &str,
        window_secs: i64,
        now: i64,
    ) -> Result<i64> {
        let mut conn = self.conn().await?;
        reminders::table
            .filter(reminders::owner.eq(owner))
            .filter(reminders::created_at.ge(now - window_secs))
            .count()
            .get_result(&mut conn)
            .await
            .map_err(|e| RemembotError::Database(e.to_string()))
    }

    /// Current reminders due within `(now, now + horizon]`. Non-recurring
    /// rows must still be pending and in the future; recurring rows qualify
    /// whenever their next occurrence falls inside the horizon.
    pub async fn list_upcoming(
        &self,
        owner: &str,
        horizon_secs: i64,
        now: i64,
    ) -> Result<Vec<ReminderSummary>> {
        let mut conn = self.conn().await?;
        let end = now + horizon_secs;

        let oneshot_upcoming = reminders::recurrence_kind
            .is_null()
            .and(reminders::notified.eq(false))
            .and(reminders::due_at.gt(now))
            .and(reminders::due_at.le(end));
        let recurring_upcoming = reminders::recurrence_kind
            .is_not_null()
            .and(reminders::due_at.le(end));

        let rows: Vec<(i32, String, i64)> = reminders::table
            .filter(reminders::owner.eq(owner))
            .filter(reminders::deleted.eq(false))
            .filter(reminders::is_current_version.eq(true))
            .filter(oneshot_upcoming.or(recurring_upcoming))
            .order(reminders::due_at.asc())
            .select((reminders::id, reminders::task_text, reminders::due_at))
            .load(&mut conn)
            .await
            .map_err(|e| RemembotError::Database(e.to_string()))?;

        Ok(rows.into_iter().map(summary_from).collect())
    }

    /// Non-recurring, still-pending reminders whose instant has already
    /// passed, most recent first.
    pub async fn list_overdue(&self, owner: &str, now: i64) -> Result<Vec<ReminderSummary>> {
        let mut conn = self.conn().await?;
        let rows: Vec<(i32, String, i64)> = reminders::table
            .filter(reminders::owner.eq(owner))
            .filter(reminders::deleted.eq(false))
            .filter(reminders::is_current_version.eq(true))
            .filter(reminders::recurrence_kind.is_null())
            .filter(reminders::notified.eq(false))
            .filter(reminders::due_at.le(now))
            .order(reminders::due_at.desc())
            .select((reminders::id, reminders::task_text, reminders::due_at))
            .load(&mut conn)
            .await
            .map_err(|e| RemembotError::Database(e.to_string()))?;
        Ok(rows.into_iter().map(summary_from).collect())
    }

    /// Single pending reminder lookup, owner-scoped. Used by the edit
    /// conversation flow to show the current text/time before changing it.
    pub async fn get_reminder(&self, id: i32, owner: &str) -> Result<Option<ReminderDetail>> {
        let mut conn = self.conn().await?;
        let row: Option<(String, i64, Option<String>)> = reminders::table
            .filter(reminders::id.eq(id))
            .filter(reminders::owner.eq(owner))
            .filter(reminders::deleted.eq(false))
            .filter(reminders::notified.eq(false))
            .select((
                reminders::task_text,
                reminders::due_at,
                reminders::original_context,
            ))
            .first(&mut conn)
            .await
            .optional()
            .map_err(|e| RemembotError::Database(e.to_string()))?;
        Ok(row.map(|(task_text, due_at, original_context)| ReminderDetail {
            task_text,
            due_at,
            original_context,
        }))
    }

    /// Recurrence snapshot for the delivery loop; `None` for non-recurring
    /// or deleted rows.
    pub async fn recurrence_of(&self, id: i32) -> Result<Option<Recurrence>> {
        let mut conn = self.conn().await?;
        let row: Option<(Option<String>, Option<i32>, Option<String>, Option<i64>)> =
            reminders::table
                .filter(reminders::id.eq(id))
                .filter(reminders::deleted.eq(false))
                .filter(reminders::recurrence_kind.is_not_null())
                .select((
                    reminders::recurrence_kind,
                    reminders::recurrence_interval,
                    reminders::days_of_week,
                    reminders::recurrence_end_at,
                ))
                .first(&mut conn)
                .await
                .optional()
                .map_err(|e| RemembotError::Database(e.to_string()))?;

        let Some((kind, interval, days, end_at)) = row else {
            return Ok(None);
        };
        let Some(kind) = kind else {
            return Ok(None);
        };

        Ok(Some(Recurrence {
            kind: kind.parse()?,
            interval: interval.unwrap_or(1).max(1) as u32,
            days_of_week: days.map(|raw| parse_days(&raw)),
            end_at,
        }))
    }

    async fn conn(&self) -> Result<SqlitePooledConn<'_>> {
        self.pool
            .get()
            .await
            .map_err(|e| RemembotError::Database(e.to_string()))
    }
}

fn summary_from((id, task_text, due_at): (i32, String, i64)) -> ReminderSummary {
    ReminderSummary {
        id,
        task_text,
        due_at,
    }
}

fn join_days(days: &[u8]) -> String {
    days.iter()
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

fn parse_days(raw: &str) -> Vec<u8> {
    raw.split(',')
        .filter_map(|part| part.trim().parse::<u8>().ok())
        .collect()
}

fn ensure_parent_dir(path: &str) -> Result<()> {
    let path = Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| RemembotError::Runtime(e.to_string()))?;
    }
    Ok(())
}

async fn run_migrations(database_url: &str) -> Result<()> {
    let database_url = database_url.to_string();
    tokio::task::spawn_blocking(move || {
        let mut conn = SqliteConnection::establish(&database_url)
            .map_err(|e| RemembotError::Database(e.to_string()))?;
        diesel::connection::SimpleConnection::batch_execute(
            &mut conn,
            "PRAGMA busy_timeout = 5000",
        )
        .map_err(|e| RemembotError::Database(e.to_string()))?;
        conn.run_pending_migrations(MIGRATIONS)
            .map_err(|e| RemembotError::Database(e.to_string()))?;
        Ok::<_, RemembotError>(())
    })
    .await
    .map_err(|e| RemembotError::Runtime(e.to_string()))??;
    Ok(())
}

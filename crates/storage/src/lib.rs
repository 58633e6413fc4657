use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite, Transaction,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use shared::domain::{
    AttendanceStatus, CatalogId, CatalogKind, EventId, EventStatus, FeedbackId, FriendStatus,
    GeoPoint, GrantKind, Rank, Step, UserId,
};

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredUser {
    pub user_id: UserId,
    pub rank: Rank,
    pub step: Step,
    pub previous_step: Step,
    pub first_name: Option<String>,
    pub middle_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub rating: i64,
}

impl StoredUser {
    /// Moves to `step`, remembering the step being left.
    pub fn set_step(&mut self, step: Step) {
        if self.step != step {
            self.previous_step = self.step;
            self.step = step;
        }
    }

    pub fn full_name(&self) -> String {
        let parts: Vec<&str> = [&self.first_name, &self.middle_name, &self.last_name]
            .into_iter()
            .filter_map(|part| part.as_deref())
            .filter(|part| !part.is_empty())
            .collect();
        if parts.is_empty() {
            format!("user {}", self.user_id)
        } else {
            parts.join(" ")
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredEvent {
    pub event_id: EventId,
    pub name: String,
    pub description: Option<String>,
    pub date: Option<NaiveDateTime>,
    pub location: Option<GeoPoint>,
    pub status: EventStatus,
    pub created_by: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCode {
    pub code: String,
    pub event_id: EventId,
    pub user_id: UserId,
}

#[derive(Debug, Clone)]
pub struct StoredFeedback {
    pub feedback_id: FeedbackId,
    pub event_id: EventId,
    pub user_id: UserId,
    pub text: String,
}

/// A directed friend row seen from its owner, joined with the reverse row.
#[derive(Debug, Clone)]
pub struct StoredFriend {
    pub friend: StoredUser,
    pub outgoing: FriendStatus,
    pub incoming: Option<FriendStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredGrant {
    pub granter_id: UserId,
    pub recipient_id: UserId,
    pub kind: GrantKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub id: CatalogId,
    pub kind: CatalogKind,
    pub name: String,
}

/// Describes a many-to-many edge table between a subject row and a catalog row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Junction {
    pub table: &'static str,
    pub subject_column: &'static str,
    pub target_column: &'static str,
    pub catalog: CatalogKind,
}

pub const USER_INTERESTS: Junction = Junction {
    table: "user_interests",
    subject_column: "user_id",
    target_column: "interest_id",
    catalog: CatalogKind::Interest,
};

pub const USER_GROUPS: Junction = Junction {
    table: "user_groups",
    subject_column: "user_id",
    target_column: "group_id",
    catalog: CatalogKind::Group,
};

pub const USER_ACHIEVEMENTS: Junction = Junction {
    table: "user_achievements",
    subject_column: "user_id",
    target_column: "achievement_id",
    catalog: CatalogKind::Achievement,
};

pub const EVENT_INTERESTS: Junction = Junction {
    table: "event_interests",
    subject_column: "event_id",
    target_column: "interest_id",
    catalog: CatalogKind::Interest,
};

pub const EVENT_GROUPS: Junction = Junction {
    table: "event_groups",
    subject_column: "event_id",
    target_column: "group_id",
    catalog: CatalogKind::Group,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationOp {
    Attach,
    Detach,
}

const USER_COLUMNS: &str = "u.id, u.rank, u.step, u.previous_step, u.first_name, u.middle_name, \
     u.last_name, u.phone, u.email, u.rating";

const EVENT_COLUMNS: &str =
    "e.id, e.name, e.description, e.date, e.lat, e.lng, e.status, e.created_by";

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    /// Opens the unit of work for one inbound event. Dropping the session
    /// without calling [`Session::commit`] rolls everything back.
    pub async fn begin(&self) -> Result<Session> {
        let tx = self
            .pool
            .begin()
            .await
            .context("failed to open storage transaction")?;
        Ok(Session { tx })
    }
}

pub struct Session {
    tx: Transaction<'static, Sqlite>,
}

impl Session {
    pub async fn commit(self) -> Result<()> {
        self.tx.commit().await.context("failed to commit session")?;
        Ok(())
    }

    pub async fn savepoint(&mut self, name: &str) -> Result<()> {
        sqlx::query(&format!("SAVEPOINT {name}"))
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    pub async fn rollback_to(&mut self, name: &str) -> Result<()> {
        sqlx::query(&format!("ROLLBACK TO SAVEPOINT {name}"))
            .execute(&mut *self.tx)
            .await?;
        self.release(name).await
    }

    pub async fn release(&mut self, name: &str) -> Result<()> {
        sqlx::query(&format!("RELEASE SAVEPOINT {name}"))
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    pub async fn find_user(&mut self, user_id: UserId) -> Result<Option<StoredUser>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users u WHERE u.id = ?"))
            .bind(user_id.0)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(user_from_row).transpose()
    }

    pub async fn insert_user(&mut self, user_id: UserId, rank: Rank, step: Step) -> Result<StoredUser> {
        sqlx::query("INSERT INTO users (id, rank, step) VALUES (?, ?, ?)")
            .bind(user_id.0)
            .bind(rank.as_str())
            .bind(step.as_str())
            .execute(&mut *self.tx)
            .await?;
        self.find_user(user_id)
            .await?
            .context("inserted user row is missing")
    }

    /// Persists the actor-owned columns. Rank and rating are only changed by
    /// their dedicated operations so a stale actor copy cannot overwrite them.
    pub async fn save_user_profile(&mut self, user: &StoredUser) -> Result<()> {
        sqlx::query(
            "UPDATE users
             SET step = ?, previous_step = ?, first_name = ?, middle_name = ?, last_name = ?, phone = ?, email = ?
             WHERE id = ?",
        )
        .bind(user.step.as_str())
        .bind(user.previous_step.as_str())
        .bind(user.first_name.as_deref())
        .bind(user.middle_name.as_deref())
        .bind(user.last_name.as_deref())
        .bind(user.phone.as_deref())
        .bind(user.email.as_deref())
        .bind(user.user_id.0)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    pub async fn set_rank(&mut self, user_id: UserId, rank: Rank) -> Result<bool> {
        let result = sqlx::query("UPDATE users SET rank = ? WHERE id = ?")
            .bind(rank.as_str())
            .bind(user_id.0)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn add_rating(&mut self, user_id: UserId, delta: i64) -> Result<bool> {
        let result = sqlx::query("UPDATE users SET rating = rating + ? WHERE id = ?")
            .bind(delta)
            .bind(user_id.0)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn list_users(&mut self) -> Result<Vec<StoredUser>> {
        let rows = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users u ORDER BY u.id"))
            .fetch_all(&mut *self.tx)
            .await?;
        rows.iter().map(user_from_row).collect()
    }

    pub async fn insert_event(&mut self, name: &str, creator: UserId) -> Result<EventId> {
        let rec = sqlx::query(
            "INSERT INTO events (name, status, created_by) VALUES (?, ?, ?) RETURNING id",
        )
        .bind(name)
        .bind(EventStatus::Unfinished.as_str())
        .bind(creator.0)
        .fetch_one(&mut *self.tx)
        .await?;
        let event_id = EventId(rec.get::<i64, _>(0));
        self.insert_attendee(event_id, creator).await?;
        Ok(event_id)
    }

    pub async fn find_event(&mut self, event_id: EventId) -> Result<Option<StoredEvent>> {
        let row = sqlx::query(&format!("SELECT {EVENT_COLUMNS} FROM events e WHERE e.id = ?"))
            .bind(event_id.0)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(event_from_row).transpose()
    }

    pub async fn save_event(&mut self, event: &StoredEvent) -> Result<()> {
        sqlx::query(
            "UPDATE events SET name = ?, description = ?, date = ?, lat = ?, lng = ? WHERE id = ?",
        )
        .bind(&event.name)
        .bind(event.description.as_deref())
        .bind(event.date)
        .bind(event.location.map(|p| p.latitude))
        .bind(event.location.map(|p| p.longitude))
        .bind(event.event_id.0)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    /// One-way UNFINISHED -> FINISHED. Returns false when the event was not
    /// unfinished (or does not exist).
    pub async fn mark_event_finished(&mut self, event_id: EventId) -> Result<bool> {
        let result = sqlx::query("UPDATE events SET status = ? WHERE id = ? AND status = ?")
            .bind(EventStatus::Finished.as_str())
            .bind(event_id.0)
            .bind(EventStatus::Unfinished.as_str())
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn events_for_user(
        &mut self,
        user_id: UserId,
        include_finished: bool,
    ) -> Result<Vec<StoredEvent>> {
        let rows = sqlx::query(&format!(
            "SELECT {EVENT_COLUMNS}
             FROM events e
             INNER JOIN event_users eu ON eu.event_id = e.id
             WHERE eu.user_id = ? AND (? OR e.status = ?)
             ORDER BY e.id"
        ))
        .bind(user_id.0)
        .bind(include_finished)
        .bind(EventStatus::Unfinished.as_str())
        .fetch_all(&mut *self.tx)
        .await?;
        rows.iter().map(event_from_row).collect()
    }

    /// Unfinished events the user has not joined yet.
    pub async fn events_open_to(&mut self, user_id: UserId) -> Result<Vec<StoredEvent>> {
        let rows = sqlx::query(&format!(
            "SELECT {EVENT_COLUMNS}
             FROM events e
             WHERE e.status = ?
               AND NOT EXISTS (SELECT 1 FROM event_users eu WHERE eu.event_id = e.id AND eu.user_id = ?)
             ORDER BY e.date IS NULL, e.date, e.id"
        ))
        .bind(EventStatus::Unfinished.as_str())
        .bind(user_id.0)
        .fetch_all(&mut *self.tx)
        .await?;
        rows.iter().map(event_from_row).collect()
    }

    pub async fn attendance(
        &mut self,
        event_id: EventId,
        user_id: UserId,
    ) -> Result<Option<AttendanceStatus>> {
        let row = sqlx::query("SELECT attendance FROM event_users WHERE event_id = ? AND user_id = ?")
            .bind(event_id.0)
            .bind(user_id.0)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(|r| -> Result<AttendanceStatus> { Ok(r.get::<String, _>(0).parse()?) })
            .transpose()
    }

    pub async fn insert_attendee(&mut self, event_id: EventId, user_id: UserId) -> Result<()> {
        sqlx::query("INSERT INTO event_users (event_id, user_id, attendance) VALUES (?, ?, ?)")
            .bind(event_id.0)
            .bind(user_id.0)
            .bind(AttendanceStatus::NotArrived.as_str())
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    pub async fn set_attendance(
        &mut self,
        event_id: EventId,
        user_id: UserId,
        status: AttendanceStatus,
    ) -> Result<bool> {
        let result =
            sqlx::query("UPDATE event_users SET attendance = ? WHERE event_id = ? AND user_id = ?")
                .bind(status.as_str())
                .bind(event_id.0)
                .bind(user_id.0)
                .execute(&mut *self.tx)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn attendees_with_status(
        &mut self,
        event_id: EventId,
        status: AttendanceStatus,
    ) -> Result<Vec<StoredUser>> {
        let rows = sqlx::query(&format!(
            "SELECT {USER_COLUMNS}
             FROM users u
             INNER JOIN event_users eu ON eu.user_id = u.id
             WHERE eu.event_id = ? AND eu.attendance = ?
             ORDER BY u.id"
        ))
        .bind(event_id.0)
        .bind(status.as_str())
        .fetch_all(&mut *self.tx)
        .await?;
        rows.iter().map(user_from_row).collect()
    }

    /// Whether `visitor` arrived at any event created by `organizer`.
    pub async fn visited_event_of(&mut self, visitor: UserId, organizer: UserId) -> Result<bool> {
        let visited: bool = sqlx::query_scalar(
            "SELECT EXISTS (
                 SELECT 1 FROM events e
                 INNER JOIN event_users eu ON eu.event_id = e.id
                 WHERE e.created_by = ? AND eu.user_id = ? AND eu.attendance = ?
             )",
        )
        .bind(organizer.0)
        .bind(visitor.0)
        .bind(AttendanceStatus::Arrived.as_str())
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(visited)
    }

    /// Returns false when the user already holds a lock.
    pub async fn insert_editor_lock(&mut self, user_id: UserId, event_id: EventId) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO event_editors (user_id, event_id) VALUES (?, ?) ON CONFLICT(user_id) DO NOTHING",
        )
        .bind(user_id.0)
        .bind(event_id.0)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn find_editor_lock(&mut self, user_id: UserId) -> Result<Option<EventId>> {
        let row = sqlx::query("SELECT event_id FROM event_editors WHERE user_id = ?")
            .bind(user_id.0)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row.map(|r| EventId(r.get::<i64, _>(0))))
    }

    pub async fn delete_editor_lock(&mut self, user_id: UserId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM event_editors WHERE user_id = ?")
            .bind(user_id.0)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn code_exists(&mut self, code: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM event_codes WHERE code = ?")
            .bind(code)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(count > 0)
    }

    /// Binds `code` to the (event, user) pair, replacing any earlier code of the pair.
    pub async fn replace_code(&mut self, event_id: EventId, user_id: UserId, code: &str) -> Result<()> {
        sqlx::query("DELETE FROM event_codes WHERE event_id = ? AND user_id = ?")
            .bind(event_id.0)
            .bind(user_id.0)
            .execute(&mut *self.tx)
            .await?;
        sqlx::query("INSERT INTO event_codes (code, event_id, user_id) VALUES (?, ?, ?)")
            .bind(code)
            .bind(event_id.0)
            .bind(user_id.0)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    pub async fn find_code(&mut self, code: &str) -> Result<Option<StoredCode>> {
        let row = sqlx::query("SELECT code, event_id, user_id FROM event_codes WHERE code = ?")
            .bind(code)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row.map(|r| StoredCode {
            code: r.get::<String, _>(0),
            event_id: EventId(r.get::<i64, _>(1)),
            user_id: UserId(r.get::<i64, _>(2)),
        }))
    }

    pub async fn delete_code(&mut self, code: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM event_codes WHERE code = ?")
            .bind(code)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn active_codes(&mut self) -> Result<Vec<String>> {
        let codes: Vec<String> = sqlx::query_scalar("SELECT code FROM event_codes ORDER BY code")
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(codes)
    }

    pub async fn insert_feedback(
        &mut self,
        event_id: EventId,
        user_id: UserId,
        text: &str,
    ) -> Result<FeedbackId> {
        let rec = sqlx::query(
            "INSERT INTO event_feedbacks (event_id, user_id, text) VALUES (?, ?, ?) RETURNING id",
        )
        .bind(event_id.0)
        .bind(user_id.0)
        .bind(text)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(FeedbackId(rec.get::<i64, _>(0)))
    }

    pub async fn has_feedback(&mut self, event_id: EventId, user_id: UserId) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM event_feedbacks WHERE event_id = ? AND user_id = ?",
        )
        .bind(event_id.0)
        .bind(user_id.0)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(count > 0)
    }

    pub async fn feedbacks_for_event(&mut self, event_id: EventId) -> Result<Vec<StoredFeedback>> {
        let rows = sqlx::query(
            "SELECT id, event_id, user_id, text FROM event_feedbacks WHERE event_id = ? ORDER BY id",
        )
        .bind(event_id.0)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| StoredFeedback {
                feedback_id: FeedbackId(r.get::<i64, _>(0)),
                event_id: EventId(r.get::<i64, _>(1)),
                user_id: UserId(r.get::<i64, _>(2)),
                text: r.get::<String, _>(3),
            })
            .collect())
    }

    pub async fn friend_edge(
        &mut self,
        user_id: UserId,
        friend_id: UserId,
    ) -> Result<Option<FriendStatus>> {
        let row = sqlx::query("SELECT status FROM user_friends WHERE user_id = ? AND friend_id = ?")
            .bind(user_id.0)
            .bind(friend_id.0)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(|r| -> Result<FriendStatus> { Ok(r.get::<String, _>(0).parse()?) })
            .transpose()
    }

    pub async fn insert_friend_edge(
        &mut self,
        user_id: UserId,
        friend_id: UserId,
        status: FriendStatus,
    ) -> Result<()> {
        sqlx::query("INSERT INTO user_friends (user_id, friend_id, status) VALUES (?, ?, ?)")
            .bind(user_id.0)
            .bind(friend_id.0)
            .bind(status.as_str())
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    pub async fn set_friend_status(
        &mut self,
        user_id: UserId,
        friend_id: UserId,
        status: FriendStatus,
    ) -> Result<bool> {
        let result =
            sqlx::query("UPDATE user_friends SET status = ? WHERE user_id = ? AND friend_id = ?")
                .bind(status.as_str())
                .bind(user_id.0)
                .bind(friend_id.0)
                .execute(&mut *self.tx)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_friend_edge(&mut self, user_id: UserId, friend_id: UserId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM user_friends WHERE user_id = ? AND friend_id = ?")
            .bind(user_id.0)
            .bind(friend_id.0)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn friend_rows(&mut self, user_id: UserId) -> Result<Vec<StoredFriend>> {
        let rows = sqlx::query(&format!(
            "SELECT {USER_COLUMNS}, f.status AS outgoing, r.status AS incoming
             FROM user_friends f
             INNER JOIN users u ON u.id = f.friend_id
             LEFT JOIN user_friends r ON r.user_id = f.friend_id AND r.friend_id = f.user_id
             WHERE f.user_id = ?
             ORDER BY u.id"
        ))
        .bind(user_id.0)
        .fetch_all(&mut *self.tx)
        .await?;
        rows.iter()
            .map(|r| -> Result<StoredFriend> {
                Ok(StoredFriend {
                    friend: user_from_row(r)?,
                    outgoing: r.get::<String, _>("outgoing").parse()?,
                    incoming: r
                        .get::<Option<String>, _>("incoming")
                        .map(|s| s.parse::<FriendStatus>())
                        .transpose()?,
                })
            })
            .collect()
    }

    /// Number of directed rows between the two users, in either direction.
    pub async fn count_friend_edges(&mut self, a: UserId, b: UserId) -> Result<i64> {
        let count = sqlx::query_scalar(
            "SELECT COUNT(*) FROM user_friends
             WHERE (user_id = ?1 AND friend_id = ?2) OR (user_id = ?2 AND friend_id = ?1)",
        )
        .bind(a.0)
        .bind(b.0)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(count)
    }

    /// Stores the granter's outstanding grant, overwriting an earlier one.
    pub async fn upsert_pending_grant(
        &mut self,
        granter_id: UserId,
        recipient_id: UserId,
        kind: GrantKind,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO pending_grants (granter_id, recipient_id, kind) VALUES (?, ?, ?)
             ON CONFLICT(granter_id) DO UPDATE SET recipient_id = excluded.recipient_id, kind = excluded.kind",
        )
        .bind(granter_id.0)
        .bind(recipient_id.0)
        .bind(kind.as_str())
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    pub async fn find_pending_grant(&mut self, granter_id: UserId) -> Result<Option<StoredGrant>> {
        let row = sqlx::query(
            "SELECT granter_id, recipient_id, kind FROM pending_grants WHERE granter_id = ?",
        )
        .bind(granter_id.0)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(|r| -> Result<StoredGrant> {
            Ok(StoredGrant {
                granter_id: UserId(r.get::<i64, _>(0)),
                recipient_id: UserId(r.get::<i64, _>(1)),
                kind: r.get::<String, _>(2).parse()?,
            })
        })
        .transpose()
    }

    pub async fn delete_pending_grant(&mut self, granter_id: UserId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM pending_grants WHERE granter_id = ?")
            .bind(granter_id.0)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn catalog_by_name(
        &mut self,
        kind: CatalogKind,
        name: &str,
    ) -> Result<Option<CatalogEntry>> {
        let row = sqlx::query(&format!("SELECT id, name FROM {} WHERE name = ?", kind.table()))
            .bind(name)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row.map(|r| catalog_from_row(kind, &r)))
    }

    pub async fn catalog_by_id(
        &mut self,
        kind: CatalogKind,
        id: CatalogId,
    ) -> Result<Option<CatalogEntry>> {
        let row = sqlx::query(&format!("SELECT id, name FROM {} WHERE id = ?", kind.table()))
            .bind(id.0)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row.map(|r| catalog_from_row(kind, &r)))
    }

    pub async fn insert_catalog(&mut self, kind: CatalogKind, name: &str) -> Result<CatalogId> {
        let rec = sqlx::query(&format!(
            "INSERT INTO {} (name) VALUES (?) RETURNING id",
            kind.table()
        ))
        .bind(name)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(CatalogId(rec.get::<i64, _>(0)))
    }

    pub async fn delete_catalog(&mut self, kind: CatalogKind, id: CatalogId) -> Result<bool> {
        let result = sqlx::query(&format!("DELETE FROM {} WHERE id = ?", kind.table()))
            .bind(id.0)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn list_catalog(&mut self, kind: CatalogKind) -> Result<Vec<CatalogEntry>> {
        let rows = sqlx::query(&format!("SELECT id, name FROM {} ORDER BY name", kind.table()))
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(rows.iter().map(|r| catalog_from_row(kind, r)).collect())
    }

    pub async fn related(&mut self, junction: Junction, subject: i64) -> Result<Vec<CatalogEntry>> {
        self.relation_candidates(junction, subject, RelationOp::Detach)
            .await
    }

    /// Catalog rows an attach (unrelated rows) or detach (related rows) may target.
    pub async fn relation_candidates(
        &mut self,
        junction: Junction,
        subject: i64,
        op: RelationOp,
    ) -> Result<Vec<CatalogEntry>> {
        let Junction {
            table,
            subject_column,
            target_column,
            catalog,
        } = junction;
        let sql = match op {
            RelationOp::Attach => format!(
                "SELECT c.id, c.name FROM {catalog_table} c
                 WHERE c.id NOT IN (SELECT {target_column} FROM {table} WHERE {subject_column} = ?)
                 ORDER BY c.name",
                catalog_table = catalog.table()
            ),
            RelationOp::Detach => format!(
                "SELECT c.id, c.name FROM {catalog_table} c
                 INNER JOIN {table} j ON j.{target_column} = c.id
                 WHERE j.{subject_column} = ?
                 ORDER BY c.name",
                catalog_table = catalog.table()
            ),
        };
        let rows = sqlx::query(&sql)
            .bind(subject)
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(rows.iter().map(|r| catalog_from_row(catalog, r)).collect())
    }

    pub async fn has_relation(
        &mut self,
        junction: Junction,
        subject: i64,
        target: CatalogId,
    ) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM {} WHERE {} = ? AND {} = ?",
            junction.table, junction.subject_column, junction.target_column
        ))
        .bind(subject)
        .bind(target.0)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(count > 0)
    }

    pub async fn insert_relation(
        &mut self,
        junction: Junction,
        subject: i64,
        target: CatalogId,
    ) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO {} ({}, {}) VALUES (?, ?)",
            junction.table, junction.subject_column, junction.target_column
        ))
        .bind(subject)
        .bind(target.0)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    pub async fn delete_relation(
        &mut self,
        junction: Junction,
        subject: i64,
        target: CatalogId,
    ) -> Result<bool> {
        let result = sqlx::query(&format!(
            "DELETE FROM {} WHERE {} = ? AND {} = ?",
            junction.table, junction.subject_column, junction.target_column
        ))
        .bind(subject)
        .bind(target.0)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

fn user_from_row(r: &SqliteRow) -> Result<StoredUser> {
    Ok(StoredUser {
        user_id: UserId(r.get::<i64, _>(0)),
        rank: r.get::<String, _>(1).parse()?,
        step: r.get::<String, _>(2).parse()?,
        previous_step: r.get::<String, _>(3).parse()?,
        first_name: r.get::<Option<String>, _>(4),
        middle_name: r.get::<Option<String>, _>(5),
        last_name: r.get::<Option<String>, _>(6),
        phone: r.get::<Option<String>, _>(7),
        email: r.get::<Option<String>, _>(8),
        rating: r.get::<i64, _>(9),
    })
}

fn event_from_row(r: &SqliteRow) -> Result<StoredEvent> {
    let location = match (r.get::<Option<f64>, _>(4), r.get::<Option<f64>, _>(5)) {
        (Some(latitude), Some(longitude)) => Some(GeoPoint {
            latitude,
            longitude,
        }),
        _ => None,
    };
    Ok(StoredEvent {
        event_id: EventId(r.get::<i64, _>(0)),
        name: r.get::<String, _>(1),
        description: r.get::<Option<String>, _>(2),
        date: r.get::<Option<NaiveDateTime>, _>(3),
        location,
        status: r.get::<String, _>(6).parse()?,
        created_by: UserId(r.get::<i64, _>(7)),
    })
}

fn catalog_from_row(kind: CatalogKind, r: &SqliteRow) -> CatalogEntry {
    CatalogEntry {
        id: CatalogId(r.get::<i64, _>(0)),
        kind,
        name: r.get::<String, _>(1),
    }
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url == "sqlite::memory:" || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;

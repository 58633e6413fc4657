use chrono::NaiveDateTime;
use shared::{
    domain::{AttendanceStatus, EventId, EventStatus, GeoPoint, Rank, UserId},
    protocol::{Button, CallbackData, Outbound},
};
use storage::{StoredEvent, StoredUser};
use tracing::info;

use crate::{non_empty, BotError, BotResult, Controller};

const DATE_FORMATS: &[&str] = &["%Y-%m-%d %H:%M", "%d.%m.%Y %H:%M"];

pub fn parse_event_date(raw: &str) -> BotResult<NaiveDateTime> {
    let raw = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .ok_or_else(|| {
            BotError::validation(format!(
                "'{raw}' is not a date, use the form 2026-05-30 18:00"
            ))
        })
}

impl Controller {
    /// Creates an unfinished event whose only attendee is its creator.
    pub async fn create_event(&mut self, name: &str, creator: UserId) -> BotResult<StoredEvent> {
        let name = non_empty(name, "event name")?;
        let event_id = self.session.insert_event(&name, creator).await?;
        info!(event_id = event_id.0, creator = creator.0, "event created");
        self.event(event_id).await
    }

    pub async fn event(&mut self, event_id: EventId) -> BotResult<StoredEvent> {
        self.session
            .find_event(event_id)
            .await?
            .ok_or_else(|| BotError::not_found(format!("event {event_id}")))
    }

    /// Like [`Controller::event`], but a finished event is a validation error.
    pub async fn open_event(&mut self, event_id: EventId) -> BotResult<StoredEvent> {
        let event = self.event(event_id).await?;
        if event.status == EventStatus::Finished {
            return Err(BotError::validation(format!(
                "event '{}' has already finished",
                event.name
            )));
        }
        Ok(event)
    }

    pub async fn rename_event(&mut self, event_id: EventId, name: &str) -> BotResult<StoredEvent> {
        let name = non_empty(name, "event name")?;
        self.update_event(event_id, |event| event.name = name).await
    }

    pub async fn describe_event(
        &mut self,
        event_id: EventId,
        description: &str,
    ) -> BotResult<StoredEvent> {
        let description = non_empty(description, "description")?;
        self.update_event(event_id, |event| event.description = Some(description))
            .await
    }

    pub async fn schedule_event(
        &mut self,
        event_id: EventId,
        date: NaiveDateTime,
    ) -> BotResult<StoredEvent> {
        self.update_event(event_id, |event| event.date = Some(date))
            .await
    }

    pub async fn locate_event(
        &mut self,
        event_id: EventId,
        location: GeoPoint,
    ) -> BotResult<StoredEvent> {
        self.update_event(event_id, |event| event.location = Some(location))
            .await
    }

    async fn update_event(
        &mut self,
        event_id: EventId,
        apply: impl FnOnce(&mut StoredEvent),
    ) -> BotResult<StoredEvent> {
        let mut event = self.open_event(event_id).await?;
        apply(&mut event);
        self.session.save_event(&event).await?;
        Ok(event)
    }

    /// Organizers see their finished events too; everyone else only open ones.
    pub async fn events_for(&mut self, user: &StoredUser) -> BotResult<Vec<StoredEvent>> {
        let include_finished = user.rank == Rank::Organizer;
        Ok(self
            .session
            .events_for_user(user.user_id, include_finished)
            .await?)
    }

    pub async fn open_events(&mut self, user_id: UserId) -> BotResult<Vec<StoredEvent>> {
        Ok(self.session.events_open_to(user_id).await?)
    }

    pub async fn join_event(&mut self, event_id: EventId, user_id: UserId) -> BotResult<StoredEvent> {
        let event = self.open_event(event_id).await?;
        if self.session.attendance(event_id, user_id).await?.is_some() {
            return Err(BotError::already_exists(format!(
                "registration for '{}'",
                event.name
            )));
        }
        self.session.insert_attendee(event_id, user_id).await?;
        info!(event_id = event_id.0, user_id = user_id.0, "joined event");
        Ok(event)
    }

    pub async fn attendance(
        &mut self,
        event_id: EventId,
        user_id: UserId,
    ) -> BotResult<AttendanceStatus> {
        self.session
            .attendance(event_id, user_id)
            .await?
            .ok_or_else(|| BotError::not_found(format!("registration for event {event_id}")))
    }

    /// UNFINISHED -> FINISHED, returning one notification per arrived attendee.
    /// Delivery happens after commit, so a failed delivery never undoes the
    /// status change.
    pub async fn finish_event(&mut self, event_id: EventId) -> BotResult<Vec<Outbound>> {
        let event = self.event(event_id).await?;
        if !self.session.mark_event_finished(event_id).await? {
            return Err(BotError::validation(format!(
                "event '{}' has already finished",
                event.name
            )));
        }

        let arrived = self
            .session
            .attendees_with_status(event_id, AttendanceStatus::Arrived)
            .await?;
        info!(
            event_id = event_id.0,
            notified = arrived.len(),
            "event finished"
        );
        Ok(arrived
            .into_iter()
            .map(|user| {
                Outbound::text(
                    user.user_id,
                    format!(
                        "'{}' has finished. Thank you for coming! Tell us how it went.",
                        event.name
                    ),
                )
                .with_row(vec![Button::new(
                    "Leave feedback",
                    CallbackData::encode("feedback", event_id),
                )])
            })
            .collect())
    }

    pub async fn visited_users(&mut self, event_id: EventId) -> BotResult<Vec<StoredUser>> {
        Ok(self
            .session
            .attendees_with_status(event_id, AttendanceStatus::Arrived)
            .await?)
    }

    /// Loads an event and rejects anyone but the organizer who created it.
    pub async fn owned_event(
        &mut self,
        event_id: EventId,
        organizer: UserId,
        action: &str,
    ) -> BotResult<StoredEvent> {
        let event = self.event(event_id).await?;
        if event.created_by != organizer {
            return Err(BotError::validation(format!(
                "only the organizer of '{}' can {action}",
                event.name
            )));
        }
        Ok(event)
    }

    /// Arrived attendees holding the plain USER rank.
    pub async fn count_visited(&mut self, event_id: EventId) -> BotResult<usize> {
        Ok(self
            .visited_users(event_id)
            .await?
            .iter()
            .filter(|user| user.rank == Rank::User)
            .count())
    }

    pub async fn acquire_editor_lock(&mut self, user_id: UserId, event_id: EventId) -> BotResult<()> {
        if !self.session.insert_editor_lock(user_id, event_id).await? {
            return Err(BotError::already_exists("an unfinished edit"));
        }
        Ok(())
    }

    pub async fn edited_event(&mut self, user_id: UserId) -> BotResult<StoredEvent> {
        let event_id = self
            .session
            .find_editor_lock(user_id)
            .await?
            .ok_or_else(|| BotError::not_found("event being edited"))?;
        self.event(event_id).await
    }

    pub async fn release_editor_lock(&mut self, user_id: UserId) -> BotResult<bool> {
        Ok(self.session.delete_editor_lock(user_id).await?)
    }
}

//! Inline-button callbacks available to an idle actor.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use controller::{BotError, BotResult, CatalogOp, RATING_RANGE};
use shared::{
    domain::{CatalogId, CatalogKind, EventId, GrantKind, Rank, Step, UserId},
    protocol::{CallbackData, Outbound, PhotoPayload},
};
use storage::{
    Junction, RelationOp, StoredUser, EVENT_GROUPS, EVENT_INTERESTS, USER_GROUPS, USER_INTERESTS,
};
use tracing::info;

use crate::{
    commands::menu_reply,
    router::{Handler, HandlerContext, RegistrationError, Router},
    steps::{catalog_step, prompt},
    views,
};

const ATTENDEES: &[Rank] = &[Rank::User, Rank::Moder];
const CHECKERS: &[Rank] = &[Rank::Moder, Rank::Organizer];
const ORGANIZERS: &[Rank] = &[Rank::Organizer];

fn is_action(data: &CallbackData, action: &str) -> bool {
    data.action == action
}

fn event_arg(data: &CallbackData) -> BotResult<EventId> {
    data.id()
        .map(EventId)
        .ok_or_else(|| BotError::validation("this button is malformed"))
}

fn user_arg(data: &CallbackData) -> BotResult<UserId> {
    data.id()
        .map(UserId)
        .ok_or_else(|| BotError::validation("this button is malformed"))
}

fn op_verb(op: RelationOp) -> &'static str {
    match op {
        RelationOp::Attach => "add",
        RelationOp::Detach => "remove",
    }
}

struct JoinCallback;

#[async_trait]
impl Handler<CallbackData> for JoinCallback {
    fn name(&self) -> &'static str {
        "join_event"
    }

    fn matches(&self, actor: &StoredUser, data: &CallbackData) -> bool {
        ATTENDEES.contains(&actor.rank) && is_action(data, "join")
    }

    async fn execute(
        &self,
        ctx: &mut HandlerContext,
        actor: &mut StoredUser,
        data: &CallbackData,
    ) -> BotResult<Vec<Outbound>> {
        let event = ctx
            .controller
            .join_event(event_arg(data)?, actor.user_id)
            .await?;
        Ok(vec![Outbound::text(
            actor.user_id,
            format!("You are registered for '{}'. It is listed under My events.", event.name),
        )])
    }
}

struct CodeCallback;

#[async_trait]
impl Handler<CallbackData> for CodeCallback {
    fn name(&self) -> &'static str {
        "entry_code"
    }

    fn matches(&self, actor: &StoredUser, data: &CallbackData) -> bool {
        ATTENDEES.contains(&actor.rank) && is_action(data, "code")
    }

    async fn execute(
        &self,
        ctx: &mut HandlerContext,
        actor: &mut StoredUser,
        data: &CallbackData,
    ) -> BotResult<Vec<Outbound>> {
        let event_id = event_arg(data)?;
        let event = ctx.controller.event(event_id).await?;
        let issued = ctx.controller.issue_code(event_id, actor.user_id).await?;
        Ok(vec![Outbound::text(
            actor.user_id,
            format!(
                "Entry code for '{}': {}\nShow it to a moderator at the entrance.",
                event.name, issued.code
            ),
        )
        .with_photo(PhotoPayload {
            mime_type: issued.qr.mime_type,
            image_b64: STANDARD.encode(&issued.qr.bytes),
        })])
    }
}

/// Moderator or organizer starts checking attendees in at an event they attend.
struct VerifyCallback;

#[async_trait]
impl Handler<CallbackData> for VerifyCallback {
    fn name(&self) -> &'static str {
        "verify_attendance"
    }

    fn matches(&self, actor: &StoredUser, data: &CallbackData) -> bool {
        CHECKERS.contains(&actor.rank) && is_action(data, "verify")
    }

    async fn execute(
        &self,
        ctx: &mut HandlerContext,
        actor: &mut StoredUser,
        data: &CallbackData,
    ) -> BotResult<Vec<Outbound>> {
        let event_id = event_arg(data)?;
        let event = ctx.controller.open_event(event_id).await?;
        ctx.controller.attendance(event_id, actor.user_id).await?;
        ctx.controller
            .acquire_editor_lock(actor.user_id, event_id)
            .await?;
        actor.set_step(Step::AttendanceCode);
        Ok(vec![prompt(
            actor,
            format!(
                "Checking in to '{}'. Send the attendee's entry code or a photo of its QR code.",
                event.name
            ),
        )])
    }
}

struct EditEventCallback;

#[async_trait]
impl Handler<CallbackData> for EditEventCallback {
    fn name(&self) -> &'static str {
        "edit_event"
    }

    fn matches(&self, actor: &StoredUser, data: &CallbackData) -> bool {
        ORGANIZERS.contains(&actor.rank) && is_action(data, "edit")
    }

    async fn execute(
        &self,
        ctx: &mut HandlerContext,
        actor: &mut StoredUser,
        data: &CallbackData,
    ) -> BotResult<Vec<Outbound>> {
        let event_id = event_arg(data)?;
        let (step, question) = match data.sub.as_deref() {
            Some("name") => (Step::EventEditName, "Send the new name"),
            Some("description") => (Step::EventDescription, "Send the description"),
            Some("date") => (Step::EventDate, "Send the date, for example 2026-05-30 18:00"),
            Some("location") => (Step::EventLocation, "Send the location"),
            _ => return Err(BotError::validation("this button is malformed")),
        };
        let event = ctx.controller.open_event(event_id).await?;
        if event.created_by != actor.user_id {
            return Err(BotError::validation(format!(
                "only the organizer of '{}' can edit it",
                event.name
            )));
        }
        ctx.controller
            .acquire_editor_lock(actor.user_id, event_id)
            .await?;
        actor.set_step(step);
        Ok(vec![prompt(actor, format!("'{}': {question}", event.name))])
    }
}

/// Attach or detach an interest/group on an event. Without a target id the
/// reply lists the candidates as buttons.
struct EventTagCallback {
    action: &'static str,
    junction: Junction,
    op: RelationOp,
}

#[async_trait]
impl Handler<CallbackData> for EventTagCallback {
    fn name(&self) -> &'static str {
        self.action
    }

    fn matches(&self, actor: &StoredUser, data: &CallbackData) -> bool {
        ORGANIZERS.contains(&actor.rank) && is_action(data, self.action)
    }

    async fn execute(
        &self,
        ctx: &mut HandlerContext,
        actor: &mut StoredUser,
        data: &CallbackData,
    ) -> BotResult<Vec<Outbound>> {
        let event = ctx.controller.open_event(event_arg(data)?).await?;
        let subject = event.event_id.0;
        let kind = self.junction.catalog;

        let Some(target) = data.sub_id() else {
            let candidates = ctx
                .controller
                .relation_candidates(self.junction, subject, self.op)
                .await?;
            if candidates.is_empty() {
                return Ok(vec![Outbound::text(
                    actor.user_id,
                    format!("No {kind} to {} for '{}'", op_verb(self.op), event.name),
                )]);
            }
            let mut reply = Outbound::text(
                actor.user_id,
                format!("Choose the {kind} to {} for '{}'", op_verb(self.op), event.name),
            );
            reply.buttons = views::choice_rows(&candidates, |entry| {
                CallbackData::encode_sub(self.action, subject, entry.id)
            });
            return Ok(vec![reply]);
        };

        let entry = ctx
            .controller
            .apply_relation(self.junction, subject, CatalogId(target), self.op)
            .await?;
        let verb = match self.op {
            RelationOp::Attach => "added to",
            RelationOp::Detach => "removed from",
        };
        Ok(vec![Outbound::text(
            actor.user_id,
            format!("{kind} '{}' {verb} '{}'", entry.name, event.name),
        )])
    }
}

/// Attach or detach an interest/group on the actor's own profile.
struct ProfileTagCallback {
    action: &'static str,
    junction: Junction,
    op: RelationOp,
}

#[async_trait]
impl Handler<CallbackData> for ProfileTagCallback {
    fn name(&self) -> &'static str {
        self.action
    }

    fn matches(&self, _actor: &StoredUser, data: &CallbackData) -> bool {
        is_action(data, self.action)
    }

    async fn execute(
        &self,
        ctx: &mut HandlerContext,
        actor: &mut StoredUser,
        data: &CallbackData,
    ) -> BotResult<Vec<Outbound>> {
        let subject = actor.user_id.0;
        let kind = self.junction.catalog;

        let Some(target) = data.id() else {
            let candidates = ctx
                .controller
                .relation_candidates(self.junction, subject, self.op)
                .await?;
            if candidates.is_empty() {
                return Ok(vec![Outbound::text(
                    actor.user_id,
                    format!("No {kind} to {}", op_verb(self.op)),
                )]);
            }
            let mut reply = Outbound::text(
                actor.user_id,
                format!("Choose the {kind} to {}", op_verb(self.op)),
            );
            reply.buttons = views::choice_rows(&candidates, |entry| {
                CallbackData::encode(self.action, entry.id)
            });
            return Ok(vec![reply]);
        };

        let entry = ctx
            .controller
            .apply_relation(self.junction, subject, CatalogId(target), self.op)
            .await?;
        let verb = match self.op {
            RelationOp::Attach => "added to",
            RelationOp::Detach => "removed from",
        };
        Ok(vec![Outbound::text(
            actor.user_id,
            format!("{kind} '{}' {verb} your profile", entry.name),
        )])
    }
}

struct FinishCallback;

#[async_trait]
impl Handler<CallbackData> for FinishCallback {
    fn name(&self) -> &'static str {
        "finish_event"
    }

    fn matches(&self, actor: &StoredUser, data: &CallbackData) -> bool {
        ORGANIZERS.contains(&actor.rank) && is_action(data, "finish")
    }

    async fn execute(
        &self,
        ctx: &mut HandlerContext,
        actor: &mut StoredUser,
        data: &CallbackData,
    ) -> BotResult<Vec<Outbound>> {
        let event_id = event_arg(data)?;
        let event = ctx
            .controller
            .owned_event(event_id, actor.user_id, "finish it")
            .await?;
        let notifications = ctx.controller.finish_event(event_id).await?;
        let notified = notifications.len();
        ctx.notifications.extend(notifications);
        Ok(vec![Outbound::text(
            actor.user_id,
            format!("'{}' is finished. Visitors notified: {notified}", event.name),
        )])
    }
}

struct StatsCallback;

#[async_trait]
impl Handler<CallbackData> for StatsCallback {
    fn name(&self) -> &'static str {
        "event_statistics"
    }

    fn matches(&self, actor: &StoredUser, data: &CallbackData) -> bool {
        ORGANIZERS.contains(&actor.rank) && is_action(data, "stats")
    }

    async fn execute(
        &self,
        ctx: &mut HandlerContext,
        actor: &mut StoredUser,
        data: &CallbackData,
    ) -> BotResult<Vec<Outbound>> {
        let event_id = event_arg(data)?;
        ctx.controller
            .owned_event(event_id, actor.user_id, "see its statistics")
            .await?;
        let report = ctx.controller.feedback_statistics(event_id).await?;
        let visitors = ctx.controller.visited_users(event_id).await?;
        Ok(vec![views::statistics_reply(actor, &report, &visitors)])
    }
}

struct FeedbackCallback;

#[async_trait]
impl Handler<CallbackData> for FeedbackCallback {
    fn name(&self) -> &'static str {
        "leave_feedback"
    }

    fn matches(&self, actor: &StoredUser, data: &CallbackData) -> bool {
        ATTENDEES.contains(&actor.rank) && is_action(data, "feedback")
    }

    async fn execute(
        &self,
        ctx: &mut HandlerContext,
        actor: &mut StoredUser,
        data: &CallbackData,
    ) -> BotResult<Vec<Outbound>> {
        let event = ctx
            .controller
            .begin_feedback(actor.user_id, event_arg(data)?)
            .await?;
        actor.set_step(Step::EventFeedback);
        Ok(vec![prompt(actor, format!("How was '{}'?", event.name))])
    }
}

/// Phase one of a rating or achievement grant.
struct GrantCallback {
    action: &'static str,
    kind: GrantKind,
    step: Step,
}

#[async_trait]
impl Handler<CallbackData> for GrantCallback {
    fn name(&self) -> &'static str {
        self.action
    }

    fn matches(&self, actor: &StoredUser, data: &CallbackData) -> bool {
        ORGANIZERS.contains(&actor.rank) && is_action(data, self.action)
    }

    async fn execute(
        &self,
        ctx: &mut HandlerContext,
        actor: &mut StoredUser,
        data: &CallbackData,
    ) -> BotResult<Vec<Outbound>> {
        let recipient = ctx
            .controller
            .begin_grant(actor.user_id, user_arg(data)?, self.kind)
            .await?;
        let question = match self.kind {
            GrantKind::Rating => format!(
                "How many rating points for {}? Send a number from {} to {}.",
                recipient.full_name(),
                RATING_RANGE.start(),
                RATING_RANGE.end()
            ),
            GrantKind::Achievement => {
                let achievements = ctx.controller.list_catalog(CatalogKind::Achievement).await?;
                format!(
                    "Which achievement for {}? Available: {}",
                    recipient.full_name(),
                    views::names(&achievements)
                )
            }
        };
        actor.set_step(self.step);
        Ok(vec![prompt(actor, question)])
    }
}

#[derive(Debug, Clone, Copy)]
enum FriendAnswer {
    Accept,
    Decline,
    Delete,
}

struct FriendCallback {
    action: &'static str,
    answer: FriendAnswer,
}

#[async_trait]
impl Handler<CallbackData> for FriendCallback {
    fn name(&self) -> &'static str {
        self.action
    }

    fn matches(&self, _actor: &StoredUser, data: &CallbackData) -> bool {
        is_action(data, self.action)
    }

    async fn execute(
        &self,
        ctx: &mut HandlerContext,
        actor: &mut StoredUser,
        data: &CallbackData,
    ) -> BotResult<Vec<Outbound>> {
        let other = user_arg(data)?;
        let text = match self.answer {
            FriendAnswer::Accept => {
                let friend = ctx.controller.accept_friend(actor.user_id, other).await?;
                ctx.notify(Outbound::text(
                    other,
                    format!("{} accepted your friend request", actor.full_name()),
                ));
                format!("You and {} are friends now", friend.full_name())
            }
            FriendAnswer::Decline => {
                let requester = ctx.controller.decline_friend(actor.user_id, other).await?;
                format!("Request from {} declined", requester.full_name())
            }
            FriendAnswer::Delete => {
                let friend = ctx.controller.delete_friend(actor.user_id, other).await?;
                format!("{} removed from your friends", friend.full_name())
            }
        };
        Ok(vec![Outbound::text(actor.user_id, text)])
    }
}

/// Single-field profile edit; reuses the registration inputs.
struct ProfileEditCallback;

#[async_trait]
impl Handler<CallbackData> for ProfileEditCallback {
    fn name(&self) -> &'static str {
        "profile_edit"
    }

    fn matches(&self, _actor: &StoredUser, data: &CallbackData) -> bool {
        is_action(data, "profile-edit")
    }

    async fn execute(
        &self,
        _ctx: &mut HandlerContext,
        actor: &mut StoredUser,
        data: &CallbackData,
    ) -> BotResult<Vec<Outbound>> {
        let (step, question) = match data.arg.as_deref() {
            Some("first") => (Step::EditFirstName, "Send your first name"),
            Some("middle") => (Step::EditMiddleName, "Send your middle name"),
            Some("last") => (Step::EditLastName, "Send your last name"),
            Some("phone") => (Step::EditPhone, "Send your phone number"),
            Some("email") => (Step::EditEmail, "Send your e-mail"),
            _ => return Err(BotError::validation("this button is malformed")),
        };
        actor.set_step(step);
        Ok(vec![prompt(actor, question)])
    }
}

struct CatalogEditCallback {
    action: &'static str,
    op: CatalogOp,
}

#[async_trait]
impl Handler<CallbackData> for CatalogEditCallback {
    fn name(&self) -> &'static str {
        self.action
    }

    fn matches(&self, actor: &StoredUser, data: &CallbackData) -> bool {
        actor.rank == Rank::Admin && is_action(data, self.action)
    }

    async fn execute(
        &self,
        _ctx: &mut HandlerContext,
        actor: &mut StoredUser,
        data: &CallbackData,
    ) -> BotResult<Vec<Outbound>> {
        let kind: CatalogKind = data
            .arg
            .as_deref()
            .and_then(|arg| arg.parse().ok())
            .ok_or_else(|| BotError::validation("this button is malformed"))?;
        let verb = match self.op {
            CatalogOp::Create => "add",
            CatalogOp::Remove => "remove",
        };
        actor.set_step(catalog_step(kind, self.op));
        Ok(vec![prompt(
            actor,
            format!("Send the name of the {kind} to {verb}"),
        )])
    }
}

struct UnknownCallback;

#[async_trait]
impl Handler<CallbackData> for UnknownCallback {
    fn name(&self) -> &'static str {
        "unknown_callback"
    }

    fn matches(&self, _actor: &StoredUser, _data: &CallbackData) -> bool {
        true
    }

    async fn execute(
        &self,
        _ctx: &mut HandlerContext,
        actor: &mut StoredUser,
        data: &CallbackData,
    ) -> BotResult<Vec<Outbound>> {
        info!(
            user_id = actor.user_id.0,
            action = %data.action,
            "unhandled callback"
        );
        Ok(vec![menu_reply(actor, "This button is no longer available")])
    }

    fn is_fallback(&self) -> bool {
        true
    }
}

pub fn router() -> Result<Router<CallbackData>, RegistrationError> {
    Router::new(
        "callbacks",
        vec![
            Box::new(JoinCallback),
            Box::new(CodeCallback),
            Box::new(VerifyCallback),
            Box::new(EditEventCallback),
            Box::new(EventTagCallback {
                action: "event-interest-add",
                junction: EVENT_INTERESTS,
                op: RelationOp::Attach,
            }),
            Box::new(EventTagCallback {
                action: "event-interest-remove",
                junction: EVENT_INTERESTS,
                op: RelationOp::Detach,
            }),
            Box::new(EventTagCallback {
                action: "event-group-add",
                junction: EVENT_GROUPS,
                op: RelationOp::Attach,
            }),
            Box::new(EventTagCallback {
                action: "event-group-remove",
                junction: EVENT_GROUPS,
                op: RelationOp::Detach,
            }),
            Box::new(ProfileTagCallback {
                action: "interest-add",
                junction: USER_INTERESTS,
                op: RelationOp::Attach,
            }),
            Box::new(ProfileTagCallback {
                action: "interest-remove",
                junction: USER_INTERESTS,
                op: RelationOp::Detach,
            }),
            Box::new(ProfileTagCallback {
                action: "group-add",
                junction: USER_GROUPS,
                op: RelationOp::Attach,
            }),
            Box::new(ProfileTagCallback {
                action: "group-remove",
                junction: USER_GROUPS,
                op: RelationOp::Detach,
            }),
            Box::new(FinishCallback),
            Box::new(StatsCallback),
            Box::new(FeedbackCallback),
            Box::new(GrantCallback {
                action: "rate",
                kind: GrantKind::Rating,
                step: Step::RatingAmount,
            }),
            Box::new(GrantCallback {
                action: "award",
                kind: GrantKind::Achievement,
                step: Step::AchievementChoice,
            }),
            Box::new(FriendCallback {
                action: "friend-accept",
                answer: FriendAnswer::Accept,
            }),
            Box::new(FriendCallback {
                action: "friend-decline",
                answer: FriendAnswer::Decline,
            }),
            Box::new(FriendCallback {
                action: "friend-delete",
                answer: FriendAnswer::Delete,
            }),
            Box::new(ProfileEditCallback),
            Box::new(CatalogEditCallback {
                action: "catalog-add",
                op: CatalogOp::Create,
            }),
            Box::new(CatalogEditCallback {
                action: "catalog-remove",
                op: CatalogOp::Remove,
            }),
            Box::new(UnknownCallback),
        ],
    )
}

//! Guided-input handlers, one per step of every multi-turn flow.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use controller::{
    parse_event_date, validate_email, validate_name, validate_phone, BotError, BotResult,
    CatalogOp,
};
use shared::{
    domain::{CatalogKind, Rank, Step, UserId},
    protocol::{Button, CallbackData, Menu, Outbound, Payload},
};
use storage::StoredUser;

use crate::{
    commands::menu_reply,
    router::{HandlerContext, RegistrationError, Router},
    steps::{catalog_step, DataInput, PendingStep, StepInput, Transition},
    views,
};

fn text(payload: &Payload) -> BotResult<&str> {
    payload
        .as_text()
        .ok_or_else(|| BotError::validation("please send a text message"))
}

fn parse_number(raw: &str) -> BotResult<i64> {
    let raw = raw.trim();
    raw.parse()
        .map_err(|_| BotError::validation(format!("'{raw}' is not a number")))
}

#[derive(Debug, Clone, Copy)]
enum ProfileField {
    FirstName,
    MiddleName,
    LastName,
    Phone,
    Email,
}

/// Registration field; the edit step reaches the same input and returns to idle.
struct ProfileFieldInput {
    field: ProfileField,
    transition: Transition,
}

#[async_trait]
impl DataInput for ProfileFieldInput {
    fn name(&self) -> &'static str {
        match self.field {
            ProfileField::FirstName => "first_name",
            ProfileField::MiddleName => "middle_name",
            ProfileField::LastName => "last_name",
            ProfileField::Phone => "phone",
            ProfileField::Email => "email",
        }
    }

    fn transition(&self) -> Transition {
        self.transition
    }

    async fn apply(
        &self,
        _ctx: &mut HandlerContext,
        actor: &mut StoredUser,
        payload: &Payload,
    ) -> BotResult<Vec<Outbound>> {
        let raw = text(payload)?;
        match self.field {
            ProfileField::FirstName => actor.first_name = Some(validate_name(raw)?),
            ProfileField::MiddleName => actor.middle_name = Some(validate_name(raw)?),
            ProfileField::LastName => actor.last_name = Some(validate_name(raw)?),
            ProfileField::Phone => actor.phone = Some(validate_phone(raw)?),
            ProfileField::Email => actor.email = Some(validate_email(raw)?),
        }

        let reply = match actor.step {
            Step::MiddleName => Outbound::text(actor.user_id, "Now send your middle name"),
            Step::LastName => Outbound::text(actor.user_id, "Now send your last name"),
            Step::Phone => Outbound::text(
                actor.user_id,
                format!(
                    "Nice to meet you, {}! Please send your phone number",
                    actor.full_name()
                ),
            ),
            Step::Email => Outbound::text(actor.user_id, "Last step: send your e-mail"),
            _ if actor.previous_step == Step::Email => {
                menu_reply(actor, "You are registered. Welcome!")
            }
            _ => menu_reply(actor, "Profile updated"),
        };
        Ok(vec![reply])
    }
}

/// Promotes a user by id. Only holders of one of `from` may be appointed, so
/// the flow never demotes anyone.
struct AppointInput {
    name: &'static str,
    rank: Rank,
    from: &'static [Rank],
    title: &'static str,
    transition: Transition,
}

#[async_trait]
impl DataInput for AppointInput {
    fn name(&self) -> &'static str {
        self.name
    }

    fn transition(&self) -> Transition {
        self.transition
    }

    async fn apply(
        &self,
        ctx: &mut HandlerContext,
        actor: &mut StoredUser,
        payload: &Payload,
    ) -> BotResult<Vec<Outbound>> {
        let target = UserId(parse_number(text(payload)?)?);
        if target == actor.user_id {
            return Err(BotError::validation("you cannot change your own rank"));
        }
        let current = ctx.controller.user(target).await?;
        if !self.from.contains(&current.rank) {
            return Err(BotError::validation(format!(
                "{} is {} and cannot become {}",
                current.full_name(),
                current.rank,
                self.title
            )));
        }
        let user = ctx.controller.appoint(target, self.rank).await?;
        ctx.notify(
            Outbound::text(target, format!("You are now {}", self.title))
                .with_menu(Menu::Main(self.rank)),
        );
        Ok(vec![menu_reply(
            actor,
            format!("{} is now {}", user.full_name(), self.title),
        )])
    }
}

struct EventNameInput;

#[async_trait]
impl DataInput for EventNameInput {
    fn name(&self) -> &'static str {
        "event_name"
    }

    fn transition(&self) -> Transition {
        Transition::new(Step::EventName, Step::None)
    }

    async fn apply(
        &self,
        ctx: &mut HandlerContext,
        actor: &mut StoredUser,
        payload: &Payload,
    ) -> BotResult<Vec<Outbound>> {
        let event = ctx
            .controller
            .create_event(text(payload)?, actor.user_id)
            .await?;
        Ok(vec![menu_reply(
            actor,
            format!(
                "Event '{}' created. Open it under My events to set the date, description and location.",
                event.name
            ),
        )])
    }
}

#[derive(Debug, Clone, Copy)]
enum EventField {
    Name,
    Description,
    Date,
    Location,
}

/// Edits one field of the event held by the actor's editor lock, then
/// releases the lock.
struct EventFieldInput {
    field: EventField,
    transition: Transition,
}

#[async_trait]
impl DataInput for EventFieldInput {
    fn name(&self) -> &'static str {
        match self.field {
            EventField::Name => "event_edit_name",
            EventField::Description => "event_description",
            EventField::Date => "event_date",
            EventField::Location => "event_location",
        }
    }

    fn transition(&self) -> Transition {
        self.transition
    }

    fn accepts(&self, payload: &Payload) -> bool {
        match self.field {
            EventField::Location => matches!(payload, Payload::Location { .. }),
            _ => matches!(payload, Payload::Text { .. }),
        }
    }

    async fn apply(
        &self,
        ctx: &mut HandlerContext,
        actor: &mut StoredUser,
        payload: &Payload,
    ) -> BotResult<Vec<Outbound>> {
        let event_id = ctx.controller.edited_event(actor.user_id).await?.event_id;
        let event = match (self.field, payload) {
            (EventField::Name, _) => ctx.controller.rename_event(event_id, text(payload)?).await?,
            (EventField::Description, _) => {
                ctx.controller
                    .describe_event(event_id, text(payload)?)
                    .await?
            }
            (EventField::Date, _) => {
                let date = parse_event_date(text(payload)?)?;
                ctx.controller.schedule_event(event_id, date).await?
            }
            (EventField::Location, Payload::Location { point }) => {
                ctx.controller.locate_event(event_id, *point).await?
            }
            (EventField::Location, _) => {
                return Err(BotError::validation("please send a location"))
            }
        };
        ctx.controller.release_editor_lock(actor.user_id).await?;

        let mut reply = views::event_reply(actor, &event).with_menu(Menu::Main(actor.rank));
        reply.text = format!("Saved.\n{}", reply.text);
        Ok(vec![reply])
    }
}

/// Check-in by plain code text or by a photo of the QR code.
struct AttendanceCodeInput {
    photo: bool,
}

#[async_trait]
impl DataInput for AttendanceCodeInput {
    fn name(&self) -> &'static str {
        if self.photo {
            "attendance_code_photo"
        } else {
            "attendance_code"
        }
    }

    fn transition(&self) -> Transition {
        Transition::new(Step::AttendanceCode, Step::None)
    }

    fn accepts(&self, payload: &Payload) -> bool {
        if self.photo {
            matches!(payload, Payload::Photo { .. })
        } else {
            matches!(payload, Payload::Text { .. })
        }
    }

    async fn apply(
        &self,
        ctx: &mut HandlerContext,
        actor: &mut StoredUser,
        payload: &Payload,
    ) -> BotResult<Vec<Outbound>> {
        let code = match payload {
            Payload::Photo { image_b64 } => {
                let image = STANDARD
                    .decode(image_b64.trim())
                    .map_err(|_| BotError::CodecFailure)?;
                ctx.controller.decode_code_photo(&image)?
            }
            _ => text(payload)?.to_string(),
        };
        let redemption = ctx.controller.redeem_code(actor.user_id, &code).await?;
        ctx.notify(Outbound::text(
            redemption.attendee.user_id,
            format!("Welcome to '{}'! Your arrival is confirmed.", redemption.event.name),
        ));
        Ok(vec![menu_reply(
            actor,
            format!(
                "{} checked in to '{}'",
                redemption.attendee.full_name(),
                redemption.event.name
            ),
        )])
    }
}

struct FeedbackInput;

#[async_trait]
impl DataInput for FeedbackInput {
    fn name(&self) -> &'static str {
        "event_feedback"
    }

    fn transition(&self) -> Transition {
        Transition::new(Step::EventFeedback, Step::None)
    }

    async fn apply(
        &self,
        ctx: &mut HandlerContext,
        actor: &mut StoredUser,
        payload: &Payload,
    ) -> BotResult<Vec<Outbound>> {
        let event = ctx
            .controller
            .add_feedback(actor.user_id, text(payload)?)
            .await?;
        Ok(vec![menu_reply(
            actor,
            format!("Thank you for your feedback on '{}'!", event.name),
        )])
    }
}

struct FriendIdInput;

#[async_trait]
impl DataInput for FriendIdInput {
    fn name(&self) -> &'static str {
        "friend_id"
    }

    fn transition(&self) -> Transition {
        Transition::new(Step::FriendId, Step::None)
    }

    async fn apply(
        &self,
        ctx: &mut HandlerContext,
        actor: &mut StoredUser,
        payload: &Payload,
    ) -> BotResult<Vec<Outbound>> {
        let target = UserId(parse_number(text(payload)?)?);
        let friend = ctx.controller.add_friend(actor.user_id, target).await?;
        ctx.notify(
            Outbound::text(
                target,
                format!("{} wants to be your friend", actor.full_name()),
            )
            .with_row(vec![
                Button::new("Accept", CallbackData::encode("friend-accept", actor.user_id)),
                Button::new("Decline", CallbackData::encode("friend-decline", actor.user_id)),
            ]),
        );
        Ok(vec![menu_reply(
            actor,
            format!("Friend request sent to {}", friend.full_name()),
        )])
    }
}

struct RatingAmountInput;

#[async_trait]
impl DataInput for RatingAmountInput {
    fn name(&self) -> &'static str {
        "rating_amount"
    }

    fn transition(&self) -> Transition {
        Transition::new(Step::RatingAmount, Step::None)
    }

    async fn apply(
        &self,
        ctx: &mut HandlerContext,
        actor: &mut StoredUser,
        payload: &Payload,
    ) -> BotResult<Vec<Outbound>> {
        let amount = parse_number(text(payload)?)?;
        let recipient = ctx.controller.complete_rating(actor.user_id, amount).await?;
        ctx.notify(Outbound::text(
            recipient.user_id,
            format!("You received {amount} rating points. Your rating is {}", recipient.rating),
        ));
        Ok(vec![menu_reply(
            actor,
            format!("{} received {amount} rating points", recipient.full_name()),
        )])
    }
}

struct AchievementChoiceInput;

#[async_trait]
impl DataInput for AchievementChoiceInput {
    fn name(&self) -> &'static str {
        "achievement_choice"
    }

    fn transition(&self) -> Transition {
        Transition::new(Step::AchievementChoice, Step::None)
    }

    async fn apply(
        &self,
        ctx: &mut HandlerContext,
        actor: &mut StoredUser,
        payload: &Payload,
    ) -> BotResult<Vec<Outbound>> {
        let name = text(payload)?.trim();
        let recipient = ctx
            .controller
            .complete_achievement(actor.user_id, name)
            .await?;
        ctx.notify(Outbound::text(
            recipient.user_id,
            format!("You received the achievement '{name}'"),
        ));
        Ok(vec![menu_reply(
            actor,
            format!("{} received '{name}'", recipient.full_name()),
        )])
    }
}

struct CatalogNameInput {
    kind: CatalogKind,
    op: CatalogOp,
}

#[async_trait]
impl DataInput for CatalogNameInput {
    fn name(&self) -> &'static str {
        match (self.kind, self.op) {
            (CatalogKind::Interest, CatalogOp::Create) => "add_interest",
            (CatalogKind::Interest, CatalogOp::Remove) => "remove_interest",
            (CatalogKind::Group, CatalogOp::Create) => "add_group",
            (CatalogKind::Group, CatalogOp::Remove) => "remove_group",
            (CatalogKind::Achievement, CatalogOp::Create) => "add_achievement",
            (CatalogKind::Achievement, CatalogOp::Remove) => "remove_achievement",
        }
    }

    fn transition(&self) -> Transition {
        Transition::new(catalog_step(self.kind, self.op), Step::None)
    }

    async fn apply(
        &self,
        ctx: &mut HandlerContext,
        actor: &mut StoredUser,
        payload: &Payload,
    ) -> BotResult<Vec<Outbound>> {
        let entry = ctx
            .controller
            .manage_catalog(self.kind, text(payload)?, self.op)
            .await?;
        let done = match self.op {
            CatalogOp::Create => "added",
            CatalogOp::Remove => "removed",
        };
        Ok(vec![menu_reply(
            actor,
            format!("{} '{}' {done}", self.kind, entry.name),
        )])
    }
}

fn profile_field(field: ProfileField, from: Step, edit: Step, to: Step) -> StepInput<ProfileFieldInput> {
    StepInput(ProfileFieldInput {
        field,
        transition: Transition::with_edit(from, edit, to),
    })
}

fn event_field(field: EventField, from: Step) -> StepInput<EventFieldInput> {
    StepInput(EventFieldInput {
        field,
        transition: Transition::new(from, Step::None),
    })
}

fn catalog_name(kind: CatalogKind, op: CatalogOp) -> StepInput<CatalogNameInput> {
    StepInput(CatalogNameInput { kind, op })
}

pub fn router() -> Result<Router<Payload>, RegistrationError> {
    use ProfileField::*;

    Router::new(
        "inputs",
        vec![
            Box::new(profile_field(FirstName, Step::FirstName, Step::EditFirstName, Step::MiddleName)),
            Box::new(profile_field(MiddleName, Step::MiddleName, Step::EditMiddleName, Step::LastName)),
            Box::new(profile_field(LastName, Step::LastName, Step::EditLastName, Step::Phone)),
            Box::new(profile_field(Phone, Step::Phone, Step::EditPhone, Step::Email)),
            Box::new(profile_field(Email, Step::Email, Step::EditEmail, Step::None)),
            Box::new(StepInput(AppointInput {
                name: "appoint_organizer",
                rank: Rank::Organizer,
                from: &[Rank::User, Rank::Moder],
                title: "an organizer",
                transition: Transition::new(Step::NewOrganizerId, Step::None),
            })),
            Box::new(StepInput(AppointInput {
                name: "appoint_moder",
                rank: Rank::Moder,
                from: &[Rank::User],
                title: "a moderator",
                transition: Transition::new(Step::NewModerId, Step::None),
            })),
            Box::new(StepInput(EventNameInput)),
            Box::new(event_field(EventField::Name, Step::EventEditName)),
            Box::new(event_field(EventField::Description, Step::EventDescription)),
            Box::new(event_field(EventField::Date, Step::EventDate)),
            Box::new(event_field(EventField::Location, Step::EventLocation)),
            Box::new(StepInput(AttendanceCodeInput { photo: false })),
            Box::new(StepInput(AttendanceCodeInput { photo: true })),
            Box::new(StepInput(FeedbackInput)),
            Box::new(StepInput(FriendIdInput)),
            Box::new(StepInput(RatingAmountInput)),
            Box::new(StepInput(AchievementChoiceInput)),
            Box::new(catalog_name(CatalogKind::Interest, CatalogOp::Create)),
            Box::new(catalog_name(CatalogKind::Interest, CatalogOp::Remove)),
            Box::new(catalog_name(CatalogKind::Group, CatalogOp::Create)),
            Box::new(catalog_name(CatalogKind::Group, CatalogOp::Remove)),
            Box::new(catalog_name(CatalogKind::Achievement, CatalogOp::Create)),
            Box::new(catalog_name(CatalogKind::Achievement, CatalogOp::Remove)),
            Box::new(PendingStep),
        ],
    )
}

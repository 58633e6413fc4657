use async_trait::async_trait;
use controller::{BotError, BotResult, CatalogOp};
use shared::{
    domain::{CatalogKind, Step},
    protocol::{Menu, Outbound, Payload},
};
use storage::StoredUser;
use tracing::{debug, warn};

use crate::router::{Handler, HandlerContext};

pub const CANCEL_KEYWORD: &str = "cancel";

const SAVEPOINT: &str = "step_input";

pub fn is_cancel_keyword(payload: &Payload) -> bool {
    payload
        .as_text()
        .is_some_and(|text| text.trim().eq_ignore_ascii_case(CANCEL_KEYWORD))
}

/// Edge of the step machine owned by one input handler.
///
/// `alt_from` is the single-field edit entry point into the same input; taking
/// it always returns the actor to [`Step::None`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: Step,
    pub alt_from: Option<Step>,
    pub to: Step,
}

impl Transition {
    pub const fn new(from: Step, to: Step) -> Self {
        Self {
            from,
            alt_from: None,
            to,
        }
    }

    pub const fn with_edit(from: Step, alt_from: Step, to: Step) -> Self {
        Self {
            from,
            alt_from: Some(alt_from),
            to,
        }
    }

    pub fn accepts(&self, step: Step) -> bool {
        step == self.from || Some(step) == self.alt_from
    }

    pub fn next(&self, current: Step) -> Step {
        if Some(current) == self.alt_from {
            Step::None
        } else {
            self.to
        }
    }
}

/// Step that waits for a catalog entry name.
pub fn catalog_step(kind: CatalogKind, op: CatalogOp) -> Step {
    match (kind, op) {
        (CatalogKind::Interest, CatalogOp::Create) => Step::AddInterestName,
        (CatalogKind::Interest, CatalogOp::Remove) => Step::RemoveInterestName,
        (CatalogKind::Group, CatalogOp::Create) => Step::AddGroupName,
        (CatalogKind::Group, CatalogOp::Remove) => Step::RemoveGroupName,
        (CatalogKind::Achievement, CatalogOp::Create) => Step::AddAchievementName,
        (CatalogKind::Achievement, CatalogOp::Remove) => Step::RemoveAchievementName,
    }
}

/// Body of a guided-input handler. The step has already advanced when
/// `apply` runs; an error puts the actor back where it was.
#[async_trait]
pub trait DataInput: Send + Sync {
    fn name(&self) -> &'static str;

    fn transition(&self) -> Transition;

    fn accepts(&self, payload: &Payload) -> bool {
        matches!(payload, Payload::Text { .. })
    }

    async fn apply(
        &self,
        ctx: &mut HandlerContext,
        actor: &mut StoredUser,
        payload: &Payload,
    ) -> BotResult<Vec<Outbound>>;
}

/// Runs a [`DataInput`] inside a savepoint, so "success advances, failure
/// retries" holds for both the actor row and everything the body touched.
pub struct StepInput<I>(pub I);

#[async_trait]
impl<I: DataInput> Handler<Payload> for StepInput<I> {
    fn name(&self) -> &'static str {
        self.0.name()
    }

    fn matches(&self, actor: &StoredUser, payload: &Payload) -> bool {
        self.0.transition().accepts(actor.step) && self.0.accepts(payload)
    }

    async fn execute(
        &self,
        ctx: &mut HandlerContext,
        actor: &mut StoredUser,
        payload: &Payload,
    ) -> BotResult<Vec<Outbound>> {
        let snapshot = actor.clone();
        let pending = ctx.notifications.len();
        actor.set_step(self.0.transition().next(snapshot.step));

        ctx.controller.savepoint(SAVEPOINT).await?;
        match self.0.apply(ctx, actor, payload).await {
            Ok(replies) => {
                ctx.controller.release(SAVEPOINT).await?;
                Ok(replies)
            }
            Err(error) if error.is_recoverable() => {
                ctx.controller.rollback_to(SAVEPOINT).await?;
                ctx.notifications.truncate(pending);
                *actor = snapshot;
                debug!(
                    input = self.0.name(),
                    user_id = actor.user_id.0,
                    error = %error,
                    "input rejected, step kept"
                );
                Ok(vec![retry_prompt(actor, &error)])
            }
            Err(error) => {
                warn!(input = self.0.name(), error = %error, "input failed");
                Err(error)
            }
        }
    }
}

fn retry_prompt(actor: &StoredUser, error: &BotError) -> Outbound {
    let text = if actor.step.is_cancelable() {
        format!("{error}. Try again or send '{CANCEL_KEYWORD}'.")
    } else {
        format!("{error}. Try again.")
    };
    Outbound::text(actor.user_id, text)
}

/// Input-router fallback: anything the current step cannot consume.
pub struct PendingStep;

#[async_trait]
impl Handler<Payload> for PendingStep {
    fn name(&self) -> &'static str {
        "pending_step"
    }

    fn matches(&self, _actor: &StoredUser, _payload: &Payload) -> bool {
        true
    }

    async fn execute(
        &self,
        _ctx: &mut HandlerContext,
        actor: &mut StoredUser,
        _payload: &Payload,
    ) -> BotResult<Vec<Outbound>> {
        let text = if actor.step.is_cancelable() {
            format!("Please finish the current action first, or send '{CANCEL_KEYWORD}'.")
        } else {
            "Please finish the current action first.".to_string()
        };
        Ok(vec![Outbound::text(actor.user_id, text)])
    }

    fn is_fallback(&self) -> bool {
        true
    }
}

/// Prompt that keeps the cancel keyboard visible while a flow is open.
pub fn prompt(actor: &StoredUser, text: impl Into<String>) -> Outbound {
    Outbound::text(actor.user_id, text).with_menu(Menu::Cancel)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edit_entry_returns_to_idle() {
        let transition = Transition::with_edit(Step::FirstName, Step::EditFirstName, Step::MiddleName);
        assert!(transition.accepts(Step::FirstName));
        assert!(transition.accepts(Step::EditFirstName));
        assert!(!transition.accepts(Step::MiddleName));
        assert_eq!(transition.next(Step::FirstName), Step::MiddleName);
        assert_eq!(transition.next(Step::EditFirstName), Step::None);
    }

    #[test]
    fn cancel_keyword_is_trimmed_and_case_insensitive() {
        assert!(is_cancel_keyword(&Payload::text("  Cancel ")));
        assert!(!is_cancel_keyword(&Payload::text("cancel it")));
        assert!(!is_cancel_keyword(&Payload::callback("cancel")));
    }
}

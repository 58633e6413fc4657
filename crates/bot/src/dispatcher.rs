use std::{collections::HashSet, sync::Arc};

use async_trait::async_trait;
use controller::{BotError, ControllerContext};
use shared::{
    domain::{Rank, Step, UserId},
    protocol::{CallbackData, InboundEvent, Menu, Outbound, Payload},
};
use storage::StoredUser;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::{
    callbacks,
    commands::{self, menu_reply},
    inputs,
    router::{HandlerContext, RegistrationError, Router},
    steps::{is_cancel_keyword, prompt, CANCEL_KEYWORD},
};

pub const START_COMMAND: &str = "/start";

const ALREADY_REGISTERED: &str = "You are already registered";

/// Delivers messages addressed to users other than the current actor.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: Outbound) -> anyhow::Result<()>;
}

/// Used when no transport is wired up; every delivery fails and is logged.
pub struct MissingNotifier;

#[async_trait]
impl Notifier for MissingNotifier {
    async fn notify(&self, message: Outbound) -> anyhow::Result<()> {
        anyhow::bail!("no notifier configured, dropping message for {}", message.chat_id)
    }
}

#[derive(Debug, Clone, Default)]
pub struct BotConfig {
    /// Users registered with [`Rank::Admin`] on `/start`.
    pub admin_ids: HashSet<UserId>,
}

/// Entry point for inbound events: one transaction per event, routed by the
/// actor's step and payload kind. Events are handled one at a time.
pub struct Dispatcher {
    context: ControllerContext,
    turn: Mutex<()>,
    commands: Router<str>,
    callbacks: Router<CallbackData>,
    inputs: Router<Payload>,
    config: BotConfig,
    notifier: Arc<dyn Notifier>,
}

enum Outcome {
    Done(Vec<Outbound>),
    Rejected(BotError),
}

impl Dispatcher {
    pub fn new(
        context: ControllerContext,
        config: BotConfig,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, RegistrationError> {
        Ok(Self {
            context,
            turn: Mutex::new(()),
            commands: commands::router()?,
            callbacks: callbacks::router()?,
            inputs: inputs::router()?,
            config,
            notifier,
        })
    }

    pub fn context(&self) -> &ControllerContext {
        &self.context
    }

    /// Handles one event and returns the replies for its actor. Messages for
    /// other users go through the notifier once the event has committed.
    /// The next event is not started until this one is delivered.
    pub async fn handle(&self, event: InboundEvent) -> anyhow::Result<Vec<Outbound>> {
        let _turn = self.turn.lock().await;
        let actor_id = event.actor_id;
        debug!(user_id = actor_id.0, kind = event.payload.kind(), "handling event");
        match self.process(&event).await {
            Ok(Outcome::Done(replies)) => Ok(replies),
            Ok(Outcome::Rejected(err)) => {
                info!(user_id = actor_id.0, error = %err, "event rejected");
                Ok(vec![Outbound::text(actor_id, capitalize(&err.to_string()))])
            }
            Err(err) => {
                error!(user_id = actor_id.0, error = %err, "event failed");
                Ok(vec![Outbound::text(
                    actor_id,
                    "Something went wrong, please try again later",
                )])
            }
        }
    }

    async fn process(&self, event: &InboundEvent) -> Result<Outcome, BotError> {
        let mut ctx = HandlerContext::new(self.context.open().await?);
        let known = ctx.controller.find_user(event.actor_id).await?;

        let is_start = event
            .payload
            .as_text()
            .is_some_and(|text| text.trim() == START_COMMAND);
        let (actor, result) = match (known, is_start) {
            (Some(actor), true) => {
                let reply = if actor.step.is_idle() {
                    menu_reply(&actor, ALREADY_REGISTERED)
                } else if actor.step.is_cancelable() {
                    prompt(
                        &actor,
                        format!("{ALREADY_REGISTERED}. Finish the current action or send '{CANCEL_KEYWORD}'."),
                    )
                } else {
                    Outbound::text(
                        actor.user_id,
                        format!("{ALREADY_REGISTERED}. Finish the current action first."),
                    )
                };
                (actor, Ok(vec![reply]))
            }
            (None, true) => {
                let mut actor = self.register(&mut ctx, event).await?;
                let reply = greeting(&actor, event.display_name.as_deref());
                actor.set_step(Step::FirstName);
                (actor, Ok(vec![reply]))
            }
            (None, false) => {
                return Ok(Outcome::Done(vec![Outbound::text(
                    event.actor_id,
                    format!("Please send {START_COMMAND} to register"),
                )]))
            }
            (Some(mut actor), false) => {
                let result = self.route(&mut ctx, &mut actor, &event.payload).await;
                (actor, result)
            }
        };

        let replies = match result {
            Ok(replies) => replies,
            Err(err) if err.is_recoverable() => return Ok(Outcome::Rejected(err)),
            Err(err) => return Err(err),
        };

        ctx.controller.save_profile(&actor).await?;
        let HandlerContext {
            controller,
            notifications,
        } = ctx;
        controller.commit().await?;

        for message in notifications {
            let chat_id = message.chat_id;
            if let Err(err) = self.notifier.notify(message).await {
                warn!(chat_id = chat_id.0, error = %err, "notification not delivered");
            }
        }
        Ok(Outcome::Done(replies))
    }

    async fn register(
        &self,
        ctx: &mut HandlerContext,
        event: &InboundEvent,
    ) -> Result<StoredUser, BotError> {
        let rank = if self.config.admin_ids.contains(&event.actor_id) {
            Rank::Admin
        } else {
            Rank::User
        };
        ctx.controller.register_user(event.actor_id, rank).await
    }

    async fn route(
        &self,
        ctx: &mut HandlerContext,
        actor: &mut StoredUser,
        payload: &Payload,
    ) -> Result<Vec<Outbound>, BotError> {
        if !actor.step.is_idle() {
            if actor.step.is_cancelable() && is_cancel_keyword(payload) {
                actor.set_step(Step::None);
                ctx.controller.release_flow_locks(actor.user_id).await?;
                return Ok(vec![menu_reply(actor, "Cancelled")]);
            }
            return self.inputs.dispatch(ctx, actor, payload).await;
        }

        match payload {
            Payload::Text { text } => self.commands.dispatch(ctx, actor, text.as_str()).await,
            Payload::Callback { data } => {
                self.callbacks
                    .dispatch(ctx, actor, &CallbackData::parse(data))
                    .await
            }
            Payload::Photo { .. } | Payload::Location { .. } => {
                self.commands.dispatch(ctx, actor, "").await
            }
        }
    }
}

fn greeting(actor: &StoredUser, display_name: Option<&str>) -> Outbound {
    let hello = match display_name.map(str::trim).filter(|name| !name.is_empty()) {
        Some(name) => format!("Hello, {name}!"),
        None => "Hello!".to_string(),
    };
    Outbound::text(
        actor.user_id,
        format!("{hello} Let's get you registered. Please send your first name"),
    )
    .with_menu(Menu::Remove)
}

fn capitalize(message: &str) -> String {
    let mut chars = message.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
#[path = "tests/dispatcher_tests.rs"]
mod tests;

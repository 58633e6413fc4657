use async_trait::async_trait;
use controller::{BotResult, Controller};
use shared::protocol::Outbound;
use storage::StoredUser;
use thiserror::Error;
use tracing::debug;

/// Per-event state handed to every handler.
pub struct HandlerContext {
    pub controller: Controller,
    /// Messages for other users, delivered only after the event commits.
    pub notifications: Vec<Outbound>,
}

impl HandlerContext {
    pub fn new(controller: Controller) -> Self {
        Self {
            controller,
            notifications: Vec::new(),
        }
    }

    pub fn notify(&mut self, message: Outbound) {
        self.notifications.push(message);
    }
}

/// One entry of an ordered router: a predicate plus the action it guards.
#[async_trait]
pub trait Handler<P: ?Sized + Sync>: Send + Sync {
    fn name(&self) -> &'static str;

    /// Must be a pure function of the actor's rank and step and the payload.
    fn matches(&self, actor: &StoredUser, payload: &P) -> bool;

    async fn execute(
        &self,
        ctx: &mut HandlerContext,
        actor: &mut StoredUser,
        payload: &P,
    ) -> BotResult<Vec<Outbound>>;

    /// The catch-all entry. Exactly one per router, registered last.
    fn is_fallback(&self) -> bool {
        false
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("router '{router}' has no fallback handler registered last")]
    MissingFallback { router: &'static str },
    #[error("router '{router}' registers fallback '{handler}' before other handlers")]
    MisplacedFallback {
        router: &'static str,
        handler: &'static str,
    },
}

/// Scans handlers in registration order and picks the first match.
pub struct Router<P: ?Sized + Sync> {
    name: &'static str,
    handlers: Vec<Box<dyn Handler<P>>>,
    fallback: Box<dyn Handler<P>>,
}

impl<P: ?Sized + Sync> Router<P> {
    /// Refuses any ordering where a fallback could shadow a later handler.
    pub fn new(
        name: &'static str,
        mut handlers: Vec<Box<dyn Handler<P>>>,
    ) -> Result<Self, RegistrationError> {
        let fallback = match handlers.pop() {
            Some(last) if last.is_fallback() => last,
            _ => return Err(RegistrationError::MissingFallback { router: name }),
        };
        if let Some(early) = handlers.iter().find(|h| h.is_fallback()) {
            return Err(RegistrationError::MisplacedFallback {
                router: name,
                handler: early.name(),
            });
        }
        Ok(Self {
            name,
            handlers,
            fallback,
        })
    }

    pub fn resolve(&self, actor: &StoredUser, payload: &P) -> &dyn Handler<P> {
        self.handlers
            .iter()
            .find(|handler| handler.matches(actor, payload))
            .unwrap_or(&self.fallback)
            .as_ref()
    }

    pub async fn dispatch(
        &self,
        ctx: &mut HandlerContext,
        actor: &mut StoredUser,
        payload: &P,
    ) -> BotResult<Vec<Outbound>> {
        let handler = self.resolve(actor, payload);
        debug!(
            router = self.name,
            handler = handler.name(),
            user_id = actor.user_id.0,
            step = %actor.step,
            "routing event"
        );
        handler.execute(ctx, actor, payload).await
    }

    pub fn handler_names(&self) -> Vec<&'static str> {
        self.handlers
            .iter()
            .chain(std::iter::once(&self.fallback))
            .map(|handler| handler.name())
            .collect()
    }
}

#[cfg(test)]
#[path = "tests/router_tests.rs"]
mod tests;

//! Conversation layer: routes inbound chat events to controller operations.

pub mod callbacks;
pub mod commands;
pub mod dispatcher;
pub mod inputs;
pub mod router;
pub mod steps;
pub mod views;

pub use dispatcher::{BotConfig, Dispatcher, MissingNotifier, Notifier, START_COMMAND};
pub use router::{Handler, HandlerContext, RegistrationError, Router};

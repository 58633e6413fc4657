use std::sync::Arc;

use codecs::{
    MissingQrDecoder, MissingSentimentModel, QrDecoder, QrEncoder, SentimentModel, SvgQrEncoder,
};
use storage::{Session, Storage};

mod catalog;
mod codes;
pub mod error;
mod events;
mod feedback;
mod friends;
mod grants;
mod users;

pub use catalog::CatalogOp;
pub use codes::{IssuedCode, Redemption, CODE_ALPHABET, CODE_LENGTH};
pub use error::{BotError, BotResult};
pub use events::parse_event_date;
pub use feedback::FeedbackReport;
pub use friends::FriendLists;
pub use grants::RATING_RANGE;
pub use users::{validate_email, validate_name, validate_phone, Profile};

/// External services the business operations call out to.
#[derive(Clone)]
pub struct Codecs {
    pub qr_encoder: Arc<dyn QrEncoder>,
    pub qr_decoder: Arc<dyn QrDecoder>,
    pub sentiment: Arc<dyn SentimentModel>,
}

impl Default for Codecs {
    fn default() -> Self {
        Self {
            qr_encoder: Arc::new(SvgQrEncoder::default()),
            qr_decoder: Arc::new(MissingQrDecoder),
            sentiment: Arc::new(MissingSentimentModel),
        }
    }
}

#[derive(Clone)]
pub struct ControllerContext {
    pub storage: Storage,
    pub codecs: Codecs,
}

impl ControllerContext {
    pub fn new(storage: Storage, codecs: Codecs) -> Self {
        Self { storage, codecs }
    }

    /// Opens the controller for a single inbound event.
    pub async fn open(&self) -> BotResult<Controller> {
        let session = self.storage.begin().await?;
        Ok(Controller {
            session,
            codecs: self.codecs.clone(),
        })
    }
}

/// Business façade bound to one storage transaction. Nothing it does is
/// visible to other events until [`Controller::commit`]; dropping it rolls back.
pub struct Controller {
    session: Session,
    codecs: Codecs,
}

impl Controller {
    pub async fn commit(self) -> BotResult<()> {
        self.session.commit().await?;
        Ok(())
    }

    pub fn session(&mut self) -> &mut Session {
        &mut self.session
    }

    pub async fn savepoint(&mut self, name: &str) -> BotResult<()> {
        self.session.savepoint(name).await?;
        Ok(())
    }

    pub async fn rollback_to(&mut self, name: &str) -> BotResult<()> {
        self.session.rollback_to(name).await?;
        Ok(())
    }

    pub async fn release(&mut self, name: &str) -> BotResult<()> {
        self.session.release(name).await?;
        Ok(())
    }
}

fn non_empty(value: &str, what: &str) -> BotResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(BotError::validation(format!("{what} must not be empty")));
    }
    if trimmed.chars().count() > 255 {
        return Err(BotError::validation(format!(
            "{what} must be at most 255 characters"
        )));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;

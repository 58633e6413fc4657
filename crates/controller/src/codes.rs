use codecs::EncodedImage;
use rand::Rng;
use shared::domain::{AttendanceStatus, EventId, UserId};
use storage::{StoredEvent, StoredUser};
use tracing::{info, warn};

use crate::{BotError, BotResult, Controller};

pub const CODE_LENGTH: usize = 8;
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

#[derive(Debug, Clone)]
pub struct IssuedCode {
    pub code: String,
    pub qr: EncodedImage,
}

#[derive(Debug, Clone)]
pub struct Redemption {
    pub event: StoredEvent,
    pub attendee: StoredUser,
}

fn random_code() -> String {
    let mut rng = rand::thread_rng();
    (0..CODE_LENGTH)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

fn normalize_code(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

impl Controller {
    /// Draws candidates until one is free among the active codes.
    pub async fn generate_code(&mut self) -> BotResult<String> {
        loop {
            let candidate = random_code();
            if !self.session.code_exists(&candidate).await? {
                return Ok(candidate);
            }
        }
    }

    /// Binds a fresh code to the (event, attendee) pair, replacing any earlier
    /// code for the same pair.
    pub async fn issue_code(&mut self, event_id: EventId, user_id: UserId) -> BotResult<IssuedCode> {
        self.open_event(event_id).await?;
        if self.attendance(event_id, user_id).await? == AttendanceStatus::Arrived {
            return Err(BotError::validation("your arrival is already confirmed"));
        }

        let code = self.generate_code().await?;
        self.session.replace_code(event_id, user_id, &code).await?;
        let qr = self.codecs.qr_encoder.encode(&code)?;
        info!(event_id = event_id.0, user_id = user_id.0, "attendance code issued");
        Ok(IssuedCode { code, qr })
    }

    /// Recovers the code text embedded in a photo.
    pub fn decode_code_photo(&self, image: &[u8]) -> BotResult<String> {
        match self.codecs.qr_decoder.decode(image) {
            Ok(Some(text)) if !text.trim().is_empty() => Ok(normalize_code(&text)),
            Ok(_) => Err(BotError::CodecFailure),
            Err(error) => {
                warn!(error = %error, "QR decode failed");
                Err(BotError::CodecFailure)
            }
        }
    }

    /// Marks the code's attendee as arrived and consumes the code. A spent or
    /// unknown code is NotFound.
    pub async fn redeem_code(&mut self, redeemer: UserId, raw: &str) -> BotResult<Redemption> {
        let code = normalize_code(raw);
        let stored = self
            .session
            .find_code(&code)
            .await?
            .ok_or_else(|| BotError::not_found(format!("code {code}")))?;

        let locked = self.session.find_editor_lock(redeemer).await?;
        if let Some(locked_event) = locked {
            if locked_event != stored.event_id {
                return Err(BotError::validation(
                    "this code belongs to a different event",
                ));
            }
        }

        self.session
            .set_attendance(stored.event_id, stored.user_id, AttendanceStatus::Arrived)
            .await?;
        self.session.delete_code(&code).await?;
        if locked.is_some() {
            self.session.delete_editor_lock(redeemer).await?;
        }

        info!(
            event_id = stored.event_id.0,
            user_id = stored.user_id.0,
            redeemer = redeemer.0,
            "attendance confirmed"
        );
        Ok(Redemption {
            event: self.event(stored.event_id).await?,
            attendee: self.user(stored.user_id).await?,
        })
    }
}

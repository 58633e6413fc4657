use shared::domain::{CatalogKind, GrantKind, UserId};
use storage::{StoredGrant, StoredUser, USER_ACHIEVEMENTS};
use tracing::info;

use crate::{BotError, BotResult, Controller};

pub const RATING_RANGE: std::ops::RangeInclusive<i64> = 1..=100;

impl Controller {
    /// Phase one of a rating or achievement grant. A granter holds at most one
    /// pending grant; starting another replaces it. The recipient must have
    /// arrived at one of the granter's events.
    pub async fn begin_grant(
        &mut self,
        granter: UserId,
        recipient: UserId,
        kind: GrantKind,
    ) -> BotResult<StoredUser> {
        if granter == recipient {
            return Err(BotError::validation("you cannot reward yourself"));
        }
        let user = self.user(recipient).await?;
        if !self.session.visited_event_of(recipient, granter).await? {
            return Err(BotError::validation(format!(
                "{} has not visited any of your events",
                user.full_name()
            )));
        }
        self.session
            .upsert_pending_grant(granter, recipient, kind)
            .await?;
        Ok(user)
    }

    pub async fn complete_rating(&mut self, granter: UserId, amount: i64) -> BotResult<StoredUser> {
        if !RATING_RANGE.contains(&amount) {
            return Err(BotError::validation(format!(
                "rating must be between {} and {}",
                RATING_RANGE.start(),
                RATING_RANGE.end()
            )));
        }
        let grant = self.pending_grant(granter, GrantKind::Rating).await?;
        self.session.add_rating(grant.recipient_id, amount).await?;
        self.session.delete_pending_grant(granter).await?;
        info!(
            granter = granter.0,
            recipient = grant.recipient_id.0,
            amount,
            "rating granted"
        );
        self.user(grant.recipient_id).await
    }

    pub async fn complete_achievement(&mut self, granter: UserId, name: &str) -> BotResult<StoredUser> {
        let grant = self.pending_grant(granter, GrantKind::Achievement).await?;
        let name = name.trim();
        let achievement = self
            .session
            .catalog_by_name(CatalogKind::Achievement, name)
            .await?
            .ok_or_else(|| BotError::not_found(format!("achievement '{name}'")))?;

        let recipient = grant.recipient_id.0;
        if self
            .session
            .has_relation(USER_ACHIEVEMENTS, recipient, achievement.id)
            .await?
        {
            return Err(BotError::already_exists(format!(
                "achievement '{}' for this user",
                achievement.name
            )));
        }
        self.session
            .insert_relation(USER_ACHIEVEMENTS, recipient, achievement.id)
            .await?;
        self.session.delete_pending_grant(granter).await?;
        info!(
            granter = granter.0,
            recipient,
            achievement = %achievement.name,
            "achievement granted"
        );
        self.user(grant.recipient_id).await
    }

    /// Drops whatever a cancelled or abandoned flow left behind.
    pub async fn release_flow_locks(&mut self, user_id: UserId) -> BotResult<()> {
        let lock = self.session.delete_editor_lock(user_id).await?;
        let grant = self.session.delete_pending_grant(user_id).await?;
        if lock || grant {
            info!(user_id = user_id.0, lock, grant, "released flow locks");
        }
        Ok(())
    }

    async fn pending_grant(&mut self, granter: UserId, kind: GrantKind) -> BotResult<StoredGrant> {
        let grant = self
            .session
            .find_pending_grant(granter)
            .await?
            .ok_or_else(|| BotError::not_found("pending grant"))?;
        if grant.kind != kind {
            return Err(BotError::validation(format!(
                "the pending grant is a {} grant",
                grant.kind
            )));
        }
        Ok(grant)
    }
}

use shared::domain::{Rank, Step, UserId};
use storage::{CatalogEntry, StoredUser, USER_ACHIEVEMENTS, USER_GROUPS, USER_INTERESTS};
use tracing::info;

use crate::{BotError, BotResult, Controller};

#[derive(Debug, Clone)]
pub struct Profile {
    pub user: StoredUser,
    pub interests: Vec<CatalogEntry>,
    pub groups: Vec<CatalogEntry>,
    pub achievements: Vec<CatalogEntry>,
}

impl Controller {
    /// First contact: creates the user and starts registration.
    pub async fn register_user(&mut self, user_id: UserId, rank: Rank) -> BotResult<StoredUser> {
        if self.session.find_user(user_id).await?.is_some() {
            return Err(BotError::already_exists(format!("user {user_id}")));
        }
        let user = self
            .session
            .insert_user(user_id, rank, Step::FirstName)
            .await?;
        info!(user_id = user_id.0, rank = %rank, "registered user");
        Ok(user)
    }

    pub async fn find_user(&mut self, user_id: UserId) -> BotResult<Option<StoredUser>> {
        Ok(self.session.find_user(user_id).await?)
    }

    pub async fn user(&mut self, user_id: UserId) -> BotResult<StoredUser> {
        self.session
            .find_user(user_id)
            .await?
            .ok_or_else(|| BotError::not_found(format!("user with id {user_id}")))
    }

    pub async fn save_profile(&mut self, user: &StoredUser) -> BotResult<()> {
        self.session.save_user_profile(user).await?;
        Ok(())
    }

    pub async fn appoint(&mut self, target: UserId, rank: Rank) -> BotResult<StoredUser> {
        if !self.session.set_rank(target, rank).await? {
            return Err(BotError::not_found(format!("user with id {target}")));
        }
        info!(user_id = target.0, rank = %rank, "rank changed");
        self.user(target).await
    }

    pub async fn profile(&mut self, user_id: UserId) -> BotResult<Profile> {
        let user = self.user(user_id).await?;
        let interests = self.session.related(USER_INTERESTS, user_id.0).await?;
        let groups = self.session.related(USER_GROUPS, user_id.0).await?;
        let achievements = self.session.related(USER_ACHIEVEMENTS, user_id.0).await?;
        Ok(Profile {
            user,
            interests,
            groups,
            achievements,
        })
    }

    pub async fn list_users(&mut self) -> BotResult<Vec<StoredUser>> {
        Ok(self.session.list_users().await?)
    }
}

pub fn validate_name(raw: &str) -> BotResult<String> {
    crate::non_empty(raw, "name")
}

pub fn validate_phone(raw: &str) -> BotResult<String> {
    let phone = raw.trim();
    let digits = phone.chars().filter(char::is_ascii_digit).count();
    let allowed = phone
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '(' | ')' | ' '));
    if !allowed || digits < 5 {
        return Err(BotError::validation(format!(
            "'{phone}' does not look like a phone number"
        )));
    }
    Ok(phone.to_string())
}

pub fn validate_email(raw: &str) -> BotResult<String> {
    let email = raw.trim();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() && !email.contains(' ') => {
            Ok(email.to_string())
        }
        _ => Err(BotError::validation(format!(
            "'{email}' does not look like an e-mail address"
        ))),
    }
}

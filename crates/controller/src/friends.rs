use shared::domain::{FriendStatus, UserId};
use storage::StoredUser;
use tracing::info;

use crate::{BotError, BotResult, Controller};

/// A user's friend rows split by who has to act next.
#[derive(Debug, Clone, Default)]
pub struct FriendLists {
    pub friends: Vec<StoredUser>,
    /// Requests waiting for this user's answer.
    pub incoming: Vec<StoredUser>,
    /// Requests this user sent that the other side has not answered.
    pub outgoing: Vec<StoredUser>,
}

impl Controller {
    /// Creates both directed rows: the requester's ACCEPTED, the target's WAITING.
    pub async fn add_friend(&mut self, user_id: UserId, target: UserId) -> BotResult<StoredUser> {
        if user_id == target {
            return Err(BotError::validation("you cannot add yourself as a friend"));
        }
        let friend = self.user(target).await?;
        if self.session.count_friend_edges(user_id, target).await? > 0 {
            return Err(BotError::already_exists(format!(
                "friendship with {}",
                friend.full_name()
            )));
        }

        self.session
            .insert_friend_edge(user_id, target, FriendStatus::Accepted)
            .await?;
        self.session
            .insert_friend_edge(target, user_id, FriendStatus::Waiting)
            .await?;
        info!(user_id = user_id.0, target = target.0, "friend request sent");
        Ok(friend)
    }

    pub async fn accept_friend(&mut self, user_id: UserId, requester: UserId) -> BotResult<StoredUser> {
        self.waiting_request(user_id, requester).await?;
        self.session
            .set_friend_status(user_id, requester, FriendStatus::Accepted)
            .await?;
        info!(user_id = user_id.0, requester = requester.0, "friend request accepted");
        self.user(requester).await
    }

    /// Declining removes both rows so the pair can start over.
    pub async fn decline_friend(&mut self, user_id: UserId, requester: UserId) -> BotResult<StoredUser> {
        self.waiting_request(user_id, requester).await?;
        self.delete_pair(user_id, requester).await?;
        info!(user_id = user_id.0, requester = requester.0, "friend request declined");
        self.user(requester).await
    }

    pub async fn delete_friend(&mut self, user_id: UserId, friend_id: UserId) -> BotResult<StoredUser> {
        let own = self.session.friend_edge(user_id, friend_id).await?;
        let theirs = self.session.friend_edge(friend_id, user_id).await?;
        if own != Some(FriendStatus::Accepted) || theirs != Some(FriendStatus::Accepted) {
            return Err(BotError::not_found(format!("friend {friend_id}")));
        }
        self.delete_pair(user_id, friend_id).await?;
        info!(user_id = user_id.0, friend_id = friend_id.0, "friend removed");
        self.user(friend_id).await
    }

    pub async fn friends(&mut self, user_id: UserId) -> BotResult<FriendLists> {
        let mut lists = FriendLists::default();
        for row in self.session.friend_rows(user_id).await? {
            match (row.outgoing, row.incoming) {
                (FriendStatus::Accepted, Some(FriendStatus::Accepted)) => {
                    lists.friends.push(row.friend)
                }
                (FriendStatus::Waiting, _) => lists.incoming.push(row.friend),
                (FriendStatus::Accepted, _) => lists.outgoing.push(row.friend),
            }
        }
        Ok(lists)
    }

    async fn waiting_request(&mut self, user_id: UserId, requester: UserId) -> BotResult<()> {
        match self.session.friend_edge(user_id, requester).await? {
            Some(FriendStatus::Waiting) => Ok(()),
            _ => Err(BotError::not_found(format!(
                "friend request from {requester}"
            ))),
        }
    }

    async fn delete_pair(&mut self, a: UserId, b: UserId) -> BotResult<()> {
        self.session.delete_friend_edge(a, b).await?;
        self.session.delete_friend_edge(b, a).await?;
        Ok(())
    }
}

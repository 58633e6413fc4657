use codecs::SentimentSummary;
use shared::domain::{AttendanceStatus, EventId, EventStatus, UserId};
use storage::{StoredEvent, StoredFeedback};
use tracing::{info, warn};

use crate::{non_empty, BotError, BotResult, Controller};

#[derive(Debug, Clone)]
pub struct FeedbackReport {
    pub event: StoredEvent,
    pub feedbacks: Vec<StoredFeedback>,
    pub visited: usize,
    /// None when there is nothing to classify or the model is unavailable.
    pub sentiment: Option<SentimentSummary>,
}

impl Controller {
    /// Checks that the user may review the event and locks it for the
    /// feedback text that follows.
    pub async fn begin_feedback(&mut self, user_id: UserId, event_id: EventId) -> BotResult<StoredEvent> {
        let event = self.reviewable_event(user_id, event_id).await?;
        self.acquire_editor_lock(user_id, event_id).await?;
        Ok(event)
    }

    /// Stores feedback for the event the user opened with a feedback button.
    pub async fn add_feedback(&mut self, user_id: UserId, text: &str) -> BotResult<StoredEvent> {
        let text = non_empty(text, "feedback")?;
        let locked = self.edited_event(user_id).await?;
        let event = self.reviewable_event(user_id, locked.event_id).await?;

        self.session
            .insert_feedback(event.event_id, user_id, &text)
            .await?;
        self.session.delete_editor_lock(user_id).await?;
        info!(event_id = event.event_id.0, user_id = user_id.0, "feedback stored");
        Ok(event)
    }

    async fn reviewable_event(&mut self, user_id: UserId, event_id: EventId) -> BotResult<StoredEvent> {
        let event = self.event(event_id).await?;
        if event.status != EventStatus::Finished {
            return Err(BotError::validation(format!(
                "'{}' has not finished yet",
                event.name
            )));
        }
        if self.attendance(event_id, user_id).await? != AttendanceStatus::Arrived {
            return Err(BotError::validation(format!(
                "only visitors of '{}' can leave feedback",
                event.name
            )));
        }
        if self.session.has_feedback(event_id, user_id).await? {
            return Err(BotError::already_exists(format!(
                "your feedback for '{}'",
                event.name
            )));
        }
        Ok(event)
    }

    pub async fn feedback_statistics(&mut self, event_id: EventId) -> BotResult<FeedbackReport> {
        let event = self.event(event_id).await?;
        let feedbacks = self.session.feedbacks_for_event(event_id).await?;
        let visited = self.count_visited(event_id).await?;

        let sentiment = if feedbacks.is_empty() {
            None
        } else {
            let texts: Vec<String> = feedbacks.iter().map(|f| f.text.clone()).collect();
            match self.codecs.sentiment.classify(&texts) {
                Ok(scores) => Some(codecs::summarize(&scores)),
                Err(error) => {
                    warn!(event_id = event_id.0, error = %error, "sentiment analysis skipped");
                    None
                }
            }
        };

        Ok(FeedbackReport {
            event,
            feedbacks,
            visited,
            sentiment,
        })
    }
}

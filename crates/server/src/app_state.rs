use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use bot::{BotConfig, Dispatcher, Notifier};
use controller::ControllerContext;
use shared::protocol::Outbound;
use tokio::sync::broadcast;

const NOTIFICATION_BUFFER: usize = 256;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) dispatcher: Arc<Dispatcher>,
    pub(crate) notifications: broadcast::Sender<Outbound>,
}

impl AppState {
    pub(crate) fn new(context: ControllerContext, config: BotConfig) -> anyhow::Result<Self> {
        let (notifications, _) = broadcast::channel(NOTIFICATION_BUFFER);
        let notifier = Arc::new(BroadcastNotifier {
            sender: notifications.clone(),
        });
        let dispatcher = Dispatcher::new(context, config, notifier)?;
        Ok(Self {
            dispatcher: Arc::new(dispatcher),
            notifications,
        })
    }
}

/// Hands committed notifications to every `/ws` subscriber.
struct BroadcastNotifier {
    sender: broadcast::Sender<Outbound>,
}

#[async_trait]
impl Notifier for BroadcastNotifier {
    async fn notify(&self, message: Outbound) -> anyhow::Result<()> {
        self.sender
            .send(message)
            .map_err(|_| anyhow!("no transport is subscribed to notifications"))?;
        Ok(())
    }
}

use std::sync::Mutex;

use controller::Codecs;
use shared::domain::{AttendanceStatus, CatalogKind, EventId};
use storage::Storage;

use super::*;

const ADMIN: UserId = UserId(1);
const ORGANIZER: UserId = UserId(2);
const ATTENDEE: UserId = UserId(3);

#[derive(Default)]
struct Recorder {
    sent: Mutex<Vec<Outbound>>,
}

#[async_trait]
impl Notifier for Recorder {
    async fn notify(&self, message: Outbound) -> anyhow::Result<()> {
        self.sent.lock().expect("recorder").push(message);
        Ok(())
    }
}

struct Harness {
    dispatcher: Dispatcher,
    recorder: Arc<Recorder>,
}

async fn harness_with(notifier: Option<Arc<dyn Notifier>>) -> Harness {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let recorder = Arc::new(Recorder::default());
    let recording: Arc<dyn Notifier> = recorder.clone();
    let config = BotConfig {
        admin_ids: HashSet::from([ADMIN]),
    };
    let dispatcher = Dispatcher::new(
        ControllerContext::new(storage, Codecs::default()),
        config,
        notifier.unwrap_or(recording),
    )
    .expect("dispatcher");
    Harness {
        dispatcher,
        recorder,
    }
}

async fn harness() -> Harness {
    harness_with(None).await
}

impl Harness {
    async fn send(&self, actor: UserId, payload: Payload) -> Vec<Outbound> {
        self.dispatcher
            .handle(InboundEvent {
                actor_id: actor,
                display_name: None,
                payload,
            })
            .await
            .expect("handle")
    }

    async fn say(&self, actor: UserId, text: &str) -> String {
        let replies = self.send(actor, Payload::text(text)).await;
        replies
            .iter()
            .map(|reply| reply.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    async fn press(&self, actor: UserId, data: &str) -> Vec<Outbound> {
        self.send(actor, Payload::callback(data)).await
    }

    async fn register(&self, actor: UserId, first_name: &str) {
        self.say(actor, START_COMMAND).await;
        for value in [first_name, "Ivanovna", "Petrova", "+7 (900) 123-45-67", "ann@example.com"] {
            self.say(actor, value).await;
        }
    }

    async fn user(&self, user_id: UserId) -> StoredUser {
        let mut controller = self.dispatcher.context().open().await.expect("open");
        controller.user(user_id).await.expect("user")
    }

    fn notifications(&self) -> Vec<Outbound> {
        self.recorder.sent.lock().expect("recorder").clone()
    }

    async fn entry_code(&self, event_id: EventId) -> String {
        let replies = self.press(ATTENDEE, &format!("code_{event_id}")).await;
        assert!(replies[0].photo.is_some());
        replies[0]
            .text
            .split(": ")
            .nth(1)
            .and_then(|rest| rest.lines().next())
            .expect("code in reply")
            .to_string()
    }

    /// Admin, one organizer with an event, and one attendee who joined it.
    async fn with_event(&self) -> EventId {
        self.register(ADMIN, "Root").await;
        self.register(ORGANIZER, "Olga").await;
        self.register(ATTENDEE, "Ann").await;

        self.say(ADMIN, "Add organizer").await;
        self.say(ADMIN, &ORGANIZER.to_string()).await;
        self.say(ORGANIZER, "Add event").await;
        self.say(ORGANIZER, "Meetup").await;

        let organizer = self.user(ORGANIZER).await;
        let mut controller = self.dispatcher.context().open().await.expect("open");
        let event_id = controller.events_for(&organizer).await.expect("events")[0].event_id;
        drop(controller);

        self.press(ATTENDEE, &format!("join_{event_id}")).await;
        event_id
    }
}

#[tokio::test]
async fn start_twice_keeps_the_first_registration() {
    let harness = harness().await;
    let replies = harness
        .dispatcher
        .handle(InboundEvent {
            actor_id: ATTENDEE,
            display_name: Some("Ann".into()),
            payload: Payload::text("/start"),
        })
        .await
        .expect("handle");
    assert!(replies[0].text.starts_with("Hello, Ann!"));
    assert_eq!(harness.user(ATTENDEE).await.step, Step::FirstName);

    let again = harness.say(ATTENDEE, "/start").await;
    assert_eq!(
        again,
        "You are already registered. Finish the current action first."
    );
    let attendee = harness.user(ATTENDEE).await;
    assert_eq!(attendee.rank, Rank::User);
    assert_eq!(attendee.step, Step::FirstName);
}

#[tokio::test]
async fn start_mid_flow_keeps_the_cancel_keyboard() {
    let harness = harness().await;
    harness.register(ORGANIZER, "Olga").await;
    let idle = harness.send(ORGANIZER, Payload::text("/start")).await;
    assert_eq!(idle[0].text, "You are already registered");
    assert_eq!(idle[0].menu, Some(Menu::Main(Rank::User)));

    harness.press(ORGANIZER, "profile-edit_first").await;
    let step = harness.user(ORGANIZER).await.step;
    assert!(step.is_cancelable() && !step.is_idle(), "{step:?}");

    let replies = harness.send(ORGANIZER, Payload::text("/start")).await;
    assert_eq!(replies[0].menu, Some(Menu::Cancel));
    assert!(replies[0].text.ends_with("send 'cancel'."), "{}", replies[0].text);
    assert_eq!(harness.user(ORGANIZER).await.step, step);
}

#[tokio::test]
async fn unknown_actor_is_asked_to_register() {
    let harness = harness().await;
    let reply = harness.say(UserId(99), "My events").await;
    assert_eq!(reply, "Please send /start to register");

    let mut controller = harness.dispatcher.context().open().await.expect("open");
    assert!(controller.find_user(UserId(99)).await.expect("find").is_none());
}

#[tokio::test]
async fn registration_walks_every_field_and_cannot_be_cancelled() {
    let harness = harness().await;
    harness.say(ADMIN, "/start").await;
    for value in ["Root", "Admin", "User"] {
        harness.say(ADMIN, value).await;
    }
    assert_eq!(harness.user(ADMIN).await.step, Step::Phone);

    let reply = harness.say(ADMIN, "cancel").await;
    assert!(reply.ends_with("Try again."), "{reply}");
    assert_eq!(harness.user(ADMIN).await.step, Step::Phone);

    harness.say(ADMIN, "+1 555 0100").await;
    let done = harness.say(ADMIN, "root@example.com").await;
    assert_eq!(done, "You are registered. Welcome!");

    let admin = harness.user(ADMIN).await;
    assert_eq!(admin.rank, Rank::Admin);
    assert_eq!(admin.step, Step::None);
    assert_eq!(admin.full_name(), "Root Admin User");
    assert_eq!(admin.phone.as_deref(), Some("+1 555 0100"));
}

#[tokio::test]
async fn duplicate_catalog_entry_keeps_the_step_until_cancel() {
    let harness = harness().await;
    harness.register(ADMIN, "Root").await;

    let listing = harness.send(ADMIN, Payload::text("Interests")).await;
    assert_eq!(listing[0].buttons[0][0].data, "catalog-add_interest");

    harness.press(ADMIN, "catalog-add_interest").await;
    assert_eq!(harness.user(ADMIN).await.step, Step::AddInterestName);
    assert_eq!(harness.say(ADMIN, "Chess").await, "interest 'Chess' added");
    assert_eq!(harness.user(ADMIN).await.step, Step::None);

    harness.press(ADMIN, "catalog-add_interest").await;
    let reply = harness.say(ADMIN, "Chess").await;
    assert!(reply.contains("interest 'Chess' already exists"), "{reply}");
    assert!(reply.ends_with("send 'cancel'."), "{reply}");
    assert_eq!(harness.user(ADMIN).await.step, Step::AddInterestName);

    assert_eq!(harness.say(ADMIN, "Cancel").await, "Cancelled");
    assert_eq!(harness.user(ADMIN).await.step, Step::None);

    let mut controller = harness.dispatcher.context().open().await.expect("open");
    let interests = controller
        .list_catalog(CatalogKind::Interest)
        .await
        .expect("catalog");
    assert_eq!(interests.len(), 1);
}

#[tokio::test]
async fn entry_code_checks_the_attendee_in() {
    let harness = harness().await;
    let event_id = harness.with_event().await;

    let code = harness.entry_code(event_id).await;
    assert_eq!(code.len(), controller::CODE_LENGTH);

    harness.press(ORGANIZER, &format!("verify_{event_id}")).await;
    assert_eq!(harness.user(ORGANIZER).await.step, Step::AttendanceCode);

    let wrong = harness.say(ORGANIZER, "ZZZZ0000").await;
    assert!(wrong.contains("Try again"), "{wrong}");
    assert_eq!(harness.user(ORGANIZER).await.step, Step::AttendanceCode);

    let reply = harness.say(ORGANIZER, &code.to_lowercase()).await;
    assert!(reply.contains("checked in to 'Meetup'"), "{reply}");
    assert_eq!(harness.user(ORGANIZER).await.step, Step::None);

    let mut controller = harness.dispatcher.context().open().await.expect("open");
    assert_eq!(
        controller
            .attendance(event_id, ATTENDEE)
            .await
            .expect("attendance"),
        AttendanceStatus::Arrived
    );
    drop(controller);

    let welcome = harness
        .notifications()
        .into_iter()
        .find(|message| message.chat_id == ATTENDEE)
        .expect("attendee notified");
    assert!(welcome.text.contains("Welcome to 'Meetup'"));
}

#[tokio::test]
async fn cancel_releases_the_editor_lock() {
    let harness = harness().await;
    let event_id = harness.with_event().await;

    harness
        .press(ORGANIZER, &format!("edit_{event_id}_description"))
        .await;
    assert_eq!(harness.user(ORGANIZER).await.step, Step::EventDescription);

    assert_eq!(harness.say(ORGANIZER, "cancel").await, "Cancelled");
    assert_eq!(harness.user(ORGANIZER).await.step, Step::None);

    let mut controller = harness.dispatcher.context().open().await.expect("open");
    assert!(matches!(
        controller.edited_event(ORGANIZER).await,
        Err(BotError::NotFound(_))
    ));
    assert_eq!(
        controller.event(event_id).await.expect("event").description,
        None
    );
}

#[tokio::test]
async fn guided_flow_swallows_callbacks() {
    let harness = harness().await;
    let event_id = harness.with_event().await;

    harness.say(ORGANIZER, "Add event").await;
    let replies = harness.press(ORGANIZER, &format!("finish_{event_id}")).await;
    assert_eq!(
        replies[0].text,
        "Please finish the current action first, or send 'cancel'."
    );

    let mut controller = harness.dispatcher.context().open().await.expect("open");
    assert!(controller.open_event(event_id).await.is_ok());
}

#[tokio::test]
async fn finishing_notifies_attendees_after_commit() {
    let harness = harness().await;
    let event_id = harness.with_event().await;
    let code = harness.entry_code(event_id).await;
    harness.press(ORGANIZER, &format!("verify_{event_id}")).await;
    harness.say(ORGANIZER, &code).await;

    let before = harness.notifications().len();
    harness.press(ORGANIZER, &format!("finish_{event_id}")).await;
    let sent = harness.notifications();
    let feedback_prompt = sent[before..]
        .iter()
        .find(|message| message.chat_id == ATTENDEE)
        .expect("feedback prompt");
    assert_eq!(
        feedback_prompt.buttons[0][0].data,
        format!("feedback_{event_id}")
    );

    harness.press(ATTENDEE, &format!("feedback_{event_id}")).await;
    let thanks = harness.say(ATTENDEE, "great evening").await;
    assert_eq!(thanks, "Thank you for your feedback on 'Meetup'!");
}

#[tokio::test]
async fn failed_delivery_does_not_undo_the_event() {
    let harness = harness_with(Some(Arc::new(MissingNotifier))).await;
    harness.register(ADMIN, "Root").await;
    harness.register(ORGANIZER, "Olga").await;

    harness.say(ADMIN, "Add organizer").await;
    let reply = harness.say(ADMIN, "2").await;
    assert!(reply.ends_with("is now an organizer"), "{reply}");
    assert_eq!(harness.user(ORGANIZER).await.rank, Rank::Organizer);
    assert!(harness.notifications().is_empty());
}

#[tokio::test]
async fn statistics_and_grants_stay_with_the_events_organizer() {
    let harness = harness().await;
    let event_id = harness.with_event().await;
    let code = harness.entry_code(event_id).await;
    harness.press(ORGANIZER, &format!("verify_{event_id}")).await;
    harness.say(ORGANIZER, &code).await;

    let rival = UserId(4);
    harness.register(rival, "Rita").await;
    harness.say(ADMIN, "Add organizer").await;
    harness.say(ADMIN, &rival.to_string()).await;
    assert_eq!(harness.user(rival).await.rank, Rank::Organizer);

    let stats = harness.press(rival, &format!("stats_{event_id}")).await;
    assert_eq!(stats.len(), 1);
    assert_eq!(
        stats[0].text,
        "Only the organizer of 'Meetup' can see its statistics"
    );
    assert!(stats[0].buttons.is_empty());

    let grant = harness.press(rival, &format!("rate_{ATTENDEE}")).await;
    assert!(grant[0].text.contains("has not visited any of your events"), "{}", grant[0].text);
    assert_eq!(harness.user(rival).await.step, Step::None);

    let own = harness.press(ORGANIZER, &format!("stats_{event_id}")).await;
    assert!(own[0].text.starts_with("Meetup"), "{}", own[0].text);
    harness.press(ORGANIZER, &format!("rate_{ATTENDEE}")).await;
    assert_eq!(harness.user(ORGANIZER).await.step, Step::RatingAmount);
}

#[tokio::test]
async fn appointments_never_demote() {
    let harness = harness().await;
    let _ = harness.with_event().await;

    harness.say(ORGANIZER, "Add moderator").await;
    let reply = harness.say(ORGANIZER, &ADMIN.to_string()).await;
    assert!(reply.contains("cannot become a moderator"), "{reply}");
    assert_eq!(harness.user(ADMIN).await.rank, Rank::Admin);
    assert_eq!(harness.user(ORGANIZER).await.step, Step::NewModerId);

    let reply = harness.say(ORGANIZER, &ATTENDEE.to_string()).await;
    assert!(reply.ends_with("is now a moderator"), "{reply}");
    assert_eq!(harness.user(ATTENDEE).await.rank, Rank::Moder);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_events_are_handled_one_at_a_time() {
    let suffix = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    let temp_root = std::env::temp_dir().join(format!("meetup_bot_dispatch_test_{suffix}"));
    let database_url = format!(
        "sqlite://{}",
        temp_root.join("bot.db").to_string_lossy().replace('\\', "/")
    );
    let storage = Storage::new(&database_url).await.expect("db");
    let dispatcher = Arc::new(
        Dispatcher::new(
            ControllerContext::new(storage, Codecs::default()),
            BotConfig::default(),
            Arc::new(Recorder::default()),
        )
        .expect("dispatcher"),
    );

    let tasks: Vec<_> = (100..120)
        .map(|id| {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move {
                dispatcher
                    .handle(InboundEvent {
                        actor_id: UserId(id),
                        display_name: None,
                        payload: Payload::text(START_COMMAND),
                    })
                    .await
                    .expect("handle")
            })
        })
        .collect();
    for task in tasks {
        let replies = task.await.expect("task");
        assert!(
            replies[0].text.contains("Let's get you registered"),
            "{}",
            replies[0].text
        );
    }

    let mut controller = dispatcher.context().open().await.expect("open");
    assert_eq!(controller.list_users().await.expect("users").len(), 20);
    drop(controller);
    drop(dispatcher);
    std::fs::remove_dir_all(temp_root).expect("cleanup");
}

//! Text commands available to an idle actor.

use async_trait::async_trait;
use controller::BotResult;
use shared::{
    domain::{CatalogKind, Rank, Step},
    protocol::{Button, CallbackData, Menu, Outbound},
};
use storage::StoredUser;

use crate::{
    router::{Handler, HandlerContext, RegistrationError, Router},
    steps::{prompt, CANCEL_KEYWORD},
    views,
};

pub mod labels {
    pub const MENU: &str = "/menu";
    pub const ID: &str = "/id";
    pub const MY_EVENTS: &str = "My events";
    pub const ALL_EVENTS: &str = "All events";
    pub const PROFILE: &str = "My profile";
    pub const FRIENDS: &str = "Friends";
    pub const ADD_FRIEND: &str = "Add friend";
    pub const ADD_ORGANIZER: &str = "Add organizer";
    pub const ADD_MODER: &str = "Add moderator";
    pub const ADD_EVENT: &str = "Add event";
}

const ALL_RANKS: &[Rank] = Rank::ALL;
const ATTENDING_RANKS: &[Rank] = &[Rank::User, Rank::Moder, Rank::Organizer];

/// Reply-keyboard labels for each rank's main menu.
pub fn main_menu(rank: Rank) -> Vec<&'static str> {
    use labels::*;
    match rank {
        Rank::User | Rank::Moder => vec![ALL_EVENTS, MY_EVENTS, PROFILE, FRIENDS, ADD_FRIEND],
        Rank::Organizer => vec![ADD_EVENT, MY_EVENTS, ADD_MODER, PROFILE, FRIENDS, ADD_FRIEND],
        Rank::Admin => vec![
            ADD_ORGANIZER,
            CatalogKind::Interest.plural_label(),
            CatalogKind::Group.plural_label(),
            CatalogKind::Achievement.plural_label(),
            PROFILE,
            FRIENDS,
            ADD_FRIEND,
        ],
    }
}

fn is_label(text: &str, label: &str) -> bool {
    text.trim().eq_ignore_ascii_case(label)
}

pub fn menu_reply(actor: &StoredUser, text: impl Into<String>) -> Outbound {
    Outbound::text(actor.user_id, text).with_menu(Menu::Main(actor.rank))
}

struct MenuCommand;

#[async_trait]
impl Handler<str> for MenuCommand {
    fn name(&self) -> &'static str {
        "menu"
    }

    fn matches(&self, _actor: &StoredUser, text: &str) -> bool {
        is_label(text, labels::MENU)
    }

    async fn execute(
        &self,
        _ctx: &mut HandlerContext,
        actor: &mut StoredUser,
        _text: &str,
    ) -> BotResult<Vec<Outbound>> {
        Ok(vec![menu_reply(actor, "Main menu")])
    }
}

struct IdCommand;

#[async_trait]
impl Handler<str> for IdCommand {
    fn name(&self) -> &'static str {
        "id"
    }

    fn matches(&self, _actor: &StoredUser, text: &str) -> bool {
        is_label(text, labels::ID)
    }

    async fn execute(
        &self,
        _ctx: &mut HandlerContext,
        actor: &mut StoredUser,
        _text: &str,
    ) -> BotResult<Vec<Outbound>> {
        Ok(vec![Outbound::text(
            actor.user_id,
            format!("Your id: {}", actor.user_id),
        )])
    }
}

struct MyEventsCommand;

#[async_trait]
impl Handler<str> for MyEventsCommand {
    fn name(&self) -> &'static str {
        "my_events"
    }

    fn matches(&self, actor: &StoredUser, text: &str) -> bool {
        ATTENDING_RANKS.contains(&actor.rank) && is_label(text, labels::MY_EVENTS)
    }

    async fn execute(
        &self,
        ctx: &mut HandlerContext,
        actor: &mut StoredUser,
        _text: &str,
    ) -> BotResult<Vec<Outbound>> {
        let events = ctx.controller.events_for(actor).await?;
        if events.is_empty() {
            return Ok(vec![Outbound::text(actor.user_id, "You have no events yet")]);
        }
        Ok(events
            .iter()
            .map(|event| views::event_reply(actor, event))
            .collect())
    }
}

struct AllEventsCommand;

#[async_trait]
impl Handler<str> for AllEventsCommand {
    fn name(&self) -> &'static str {
        "all_events"
    }

    fn matches(&self, actor: &StoredUser, text: &str) -> bool {
        matches!(actor.rank, Rank::User | Rank::Moder) && is_label(text, labels::ALL_EVENTS)
    }

    async fn execute(
        &self,
        ctx: &mut HandlerContext,
        actor: &mut StoredUser,
        _text: &str,
    ) -> BotResult<Vec<Outbound>> {
        let events = ctx.controller.open_events(actor.user_id).await?;
        if events.is_empty() {
            return Ok(vec![Outbound::text(
                actor.user_id,
                "There are no open events right now",
            )]);
        }
        Ok(events
            .iter()
            .map(|event| {
                Outbound::text(actor.user_id, views::event_card(event, actor.rank))
                    .with_location(event.location)
                    .with_row(vec![Button::new(
                        "Join",
                        CallbackData::encode("join", event.event_id),
                    )])
            })
            .collect())
    }
}

struct ProfileCommand;

#[async_trait]
impl Handler<str> for ProfileCommand {
    fn name(&self) -> &'static str {
        "profile"
    }

    fn matches(&self, _actor: &StoredUser, text: &str) -> bool {
        is_label(text, labels::PROFILE)
    }

    async fn execute(
        &self,
        ctx: &mut HandlerContext,
        actor: &mut StoredUser,
        _text: &str,
    ) -> BotResult<Vec<Outbound>> {
        let profile = ctx.controller.profile(actor.user_id).await?;
        let mut reply = Outbound::text(actor.user_id, views::profile_card(&profile));
        reply.buttons = views::profile_buttons();
        Ok(vec![reply])
    }
}

struct FriendsCommand;

#[async_trait]
impl Handler<str> for FriendsCommand {
    fn name(&self) -> &'static str {
        "friends"
    }

    fn matches(&self, _actor: &StoredUser, text: &str) -> bool {
        is_label(text, labels::FRIENDS)
    }

    async fn execute(
        &self,
        ctx: &mut HandlerContext,
        actor: &mut StoredUser,
        _text: &str,
    ) -> BotResult<Vec<Outbound>> {
        let lists = ctx.controller.friends(actor.user_id).await?;
        if lists.friends.is_empty() && lists.incoming.is_empty() && lists.outgoing.is_empty() {
            return Ok(vec![Outbound::text(actor.user_id, "You have no friends yet")]);
        }

        let mut replies = Vec::new();
        for friend in &lists.friends {
            replies.push(
                Outbound::text(
                    actor.user_id,
                    format!("{} (rating {})", friend.full_name(), friend.rating),
                )
                .with_row(vec![Button::new(
                    "Remove",
                    CallbackData::encode("friend-delete", friend.user_id),
                )]),
            );
        }
        for requester in &lists.incoming {
            replies.push(
                Outbound::text(
                    actor.user_id,
                    format!("{} wants to be your friend", requester.full_name()),
                )
                .with_row(vec![
                    Button::new("Accept", CallbackData::encode("friend-accept", requester.user_id)),
                    Button::new("Decline", CallbackData::encode("friend-decline", requester.user_id)),
                ]),
            );
        }
        if !lists.outgoing.is_empty() {
            let waiting: Vec<String> = lists.outgoing.iter().map(StoredUser::full_name).collect();
            replies.push(Outbound::text(
                actor.user_id,
                format!("Waiting for an answer from: {}", waiting.join(", ")),
            ));
        }
        Ok(replies)
    }
}

/// Opens a guided flow: move the actor to `step` and ask for the first value.
struct PromptCommand {
    name: &'static str,
    label: &'static str,
    ranks: &'static [Rank],
    step: Step,
    prompt: &'static str,
}

#[async_trait]
impl Handler<str> for PromptCommand {
    fn name(&self) -> &'static str {
        self.name
    }

    fn matches(&self, actor: &StoredUser, text: &str) -> bool {
        self.ranks.contains(&actor.rank) && is_label(text, self.label)
    }

    async fn execute(
        &self,
        _ctx: &mut HandlerContext,
        actor: &mut StoredUser,
        _text: &str,
    ) -> BotResult<Vec<Outbound>> {
        actor.set_step(self.step);
        Ok(vec![prompt(actor, self.prompt)])
    }
}

struct CatalogCommand {
    kind: CatalogKind,
}

#[async_trait]
impl Handler<str> for CatalogCommand {
    fn name(&self) -> &'static str {
        match self.kind {
            CatalogKind::Interest => "catalog_interests",
            CatalogKind::Group => "catalog_groups",
            CatalogKind::Achievement => "catalog_achievements",
        }
    }

    fn matches(&self, actor: &StoredUser, text: &str) -> bool {
        actor.rank == Rank::Admin && is_label(text, self.kind.plural_label())
    }

    async fn execute(
        &self,
        ctx: &mut HandlerContext,
        actor: &mut StoredUser,
        _text: &str,
    ) -> BotResult<Vec<Outbound>> {
        let entries = ctx.controller.list_catalog(self.kind).await?;
        let mut row = vec![Button::new(
            "Add",
            CallbackData::encode("catalog-add", self.kind),
        )];
        if !entries.is_empty() {
            row.push(Button::new(
                "Remove",
                CallbackData::encode("catalog-remove", self.kind),
            ));
        }
        Ok(vec![Outbound::text(
            actor.user_id,
            format!("{}: {}", self.kind.plural_label(), views::names(&entries)),
        )
        .with_row(row)])
    }
}

/// Idle cancel: drops a lock or grant an abandoned flow left behind.
struct CancelCommand;

#[async_trait]
impl Handler<str> for CancelCommand {
    fn name(&self) -> &'static str {
        "cancel"
    }

    fn matches(&self, _actor: &StoredUser, text: &str) -> bool {
        is_label(text, CANCEL_KEYWORD)
    }

    async fn execute(
        &self,
        ctx: &mut HandlerContext,
        actor: &mut StoredUser,
        _text: &str,
    ) -> BotResult<Vec<Outbound>> {
        ctx.controller.release_flow_locks(actor.user_id).await?;
        Ok(vec![menu_reply(actor, "Nothing is in progress")])
    }
}

struct UnknownCommand;

#[async_trait]
impl Handler<str> for UnknownCommand {
    fn name(&self) -> &'static str {
        "unknown_command"
    }

    fn matches(&self, _actor: &StoredUser, _text: &str) -> bool {
        true
    }

    async fn execute(
        &self,
        _ctx: &mut HandlerContext,
        actor: &mut StoredUser,
        _text: &str,
    ) -> BotResult<Vec<Outbound>> {
        Ok(vec![menu_reply(actor, "Unknown command")])
    }

    fn is_fallback(&self) -> bool {
        true
    }
}

pub fn router() -> Result<Router<str>, RegistrationError> {
    Router::new(
        "commands",
        vec![
            Box::new(MenuCommand),
            Box::new(IdCommand),
            Box::new(MyEventsCommand),
            Box::new(AllEventsCommand),
            Box::new(ProfileCommand),
            Box::new(FriendsCommand),
            Box::new(PromptCommand {
                name: "add_friend",
                label: labels::ADD_FRIEND,
                ranks: ALL_RANKS,
                step: Step::FriendId,
                prompt: "Send the id of the user you want to befriend",
            }),
            Box::new(CatalogCommand {
                kind: CatalogKind::Interest,
            }),
            Box::new(CatalogCommand {
                kind: CatalogKind::Group,
            }),
            Box::new(CatalogCommand {
                kind: CatalogKind::Achievement,
            }),
            Box::new(PromptCommand {
                name: "add_organizer",
                label: labels::ADD_ORGANIZER,
                ranks: &[Rank::Admin],
                step: Step::NewOrganizerId,
                prompt: "Send the id of the new organizer",
            }),
            Box::new(PromptCommand {
                name: "add_moder",
                label: labels::ADD_MODER,
                ranks: &[Rank::Organizer],
                step: Step::NewModerId,
                prompt: "Send the id of the new moderator",
            }),
            Box::new(PromptCommand {
                name: "add_event",
                label: labels::ADD_EVENT,
                ranks: &[Rank::Organizer],
                step: Step::EventName,
                prompt: "Send the name of the new event",
            }),
            Box::new(CancelCommand),
            Box::new(UnknownCommand),
        ],
    )
}

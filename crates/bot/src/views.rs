//! Reply text and inline buttons shared by several handlers.

use controller::{FeedbackReport, Profile};
use shared::{
    domain::{EventStatus, Rank},
    protocol::{Button, CallbackData, Outbound},
};
use storage::{CatalogEntry, StoredEvent, StoredUser};

pub fn event_card(event: &StoredEvent, rank: Rank) -> String {
    let mut text = format!("{}\n", event.name);
    if rank != Rank::User {
        text.push_str(&format!("  id: {}\n", event.event_id));
    }
    text.push_str(&format!(
        "  description: {}\n",
        event.description.as_deref().unwrap_or("none")
    ));
    match event.date {
        Some(date) => text.push_str(&format!("  date: {}", date.format("%Y-%m-%d %H:%M"))),
        None => text.push_str("  date: not scheduled"),
    }
    if event.status == EventStatus::Finished {
        text.push_str("\n  finished");
    }
    text
}

/// Inline keyboard for an event the actor takes part in.
pub fn event_buttons(event: &StoredEvent, rank: Rank) -> Vec<Vec<Button>> {
    let id = event.event_id;
    let code = || Button::new("Entry code", CallbackData::encode("code", id));
    let verify = || Button::new("Check in", CallbackData::encode("verify", id));
    match (event.status, rank) {
        (EventStatus::Unfinished, Rank::User) => vec![vec![code()]],
        (EventStatus::Unfinished, Rank::Moder) => vec![vec![code(), verify()]],
        (EventStatus::Unfinished, Rank::Organizer) => vec![
            vec![
                Button::new("Name", CallbackData::encode_sub("edit", id, "name")),
                Button::new("Description", CallbackData::encode_sub("edit", id, "description")),
            ],
            vec![
                Button::new("Date", CallbackData::encode_sub("edit", id, "date")),
                Button::new("Location", CallbackData::encode_sub("edit", id, "location")),
            ],
            vec![
                Button::new("+ interest", CallbackData::encode("event-interest-add", id)),
                Button::new("- interest", CallbackData::encode("event-interest-remove", id)),
            ],
            vec![
                Button::new("+ group", CallbackData::encode("event-group-add", id)),
                Button::new("- group", CallbackData::encode("event-group-remove", id)),
            ],
            vec![verify(), Button::new("Finish", CallbackData::encode("finish", id))],
        ],
        (EventStatus::Finished, Rank::Organizer) => {
            vec![vec![Button::new("Statistics", CallbackData::encode("stats", id))]]
        }
        (EventStatus::Finished, Rank::User | Rank::Moder) => {
            vec![vec![Button::new("Leave feedback", CallbackData::encode("feedback", id))]]
        }
        _ => Vec::new(),
    }
}

pub fn event_reply(actor: &StoredUser, event: &StoredEvent) -> Outbound {
    let mut reply = Outbound::text(actor.user_id, event_card(event, actor.rank))
        .with_location(event.location);
    reply.buttons = event_buttons(event, actor.rank);
    reply
}

pub fn names(entries: &[CatalogEntry]) -> String {
    if entries.is_empty() {
        "none".to_string()
    } else {
        entries
            .iter()
            .map(|entry| entry.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

pub fn profile_card(profile: &Profile) -> String {
    let user = &profile.user;
    format!(
        "{}\n  phone: {}\n  e-mail: {}\n  rating: {}\n  groups: {}\n  interests: {}\n  achievements: {}",
        user.full_name(),
        user.phone.as_deref().unwrap_or("-"),
        user.email.as_deref().unwrap_or("-"),
        user.rating,
        names(&profile.groups),
        names(&profile.interests),
        names(&profile.achievements),
    )
}

pub fn profile_buttons() -> Vec<Vec<Button>> {
    vec![
        vec![
            Button::new("First name", CallbackData::encode("profile-edit", "first")),
            Button::new("Middle name", CallbackData::encode("profile-edit", "middle")),
            Button::new("Last name", CallbackData::encode("profile-edit", "last")),
        ],
        vec![
            Button::new("Phone", CallbackData::encode("profile-edit", "phone")),
            Button::new("E-mail", CallbackData::encode("profile-edit", "email")),
        ],
        vec![
            Button::new("+ interest", "interest-add"),
            Button::new("- interest", "interest-remove"),
        ],
        vec![
            Button::new("+ group", "group-add"),
            Button::new("- group", "group-remove"),
        ],
    ]
}

/// One button per catalog entry; `encode` builds its callback token.
pub fn choice_rows(entries: &[CatalogEntry], encode: impl Fn(&CatalogEntry) -> String) -> Vec<Vec<Button>> {
    entries
        .iter()
        .map(|entry| vec![Button::new(entry.name.clone(), encode(entry))])
        .collect()
}

pub fn statistics_reply(actor: &StoredUser, report: &FeedbackReport, visitors: &[StoredUser]) -> Outbound {
    let mut text = format!(
        "{}\n  visitors: {}\n  feedback: {}",
        report.event.name,
        report.visited,
        report.feedbacks.len()
    );
    if let Some(summary) = report.sentiment {
        let percent = |value: Option<f64>| {
            value.map_or_else(|| "-".to_string(), |v| format!("{:.0}%", v * 100.0))
        };
        text.push_str(&format!(
            "\n  mood: positive {}, neutral {}, negative {}",
            percent(summary.positive),
            percent(summary.neutral),
            percent(summary.negative)
        ));
    }
    for feedback in &report.feedbacks {
        text.push_str(&format!("\n- {}", feedback.text));
    }

    let mut reply = Outbound::text(actor.user_id, text);
    for visitor in visitors.iter().filter(|v| v.user_id != actor.user_id) {
        reply = reply.with_row(vec![
            Button::new(
                format!("Rate {}", visitor.full_name()),
                CallbackData::encode("rate", visitor.user_id),
            ),
            Button::new("Award", CallbackData::encode("award", visitor.user_id)),
        ]);
    }
    reply
}

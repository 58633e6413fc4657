use serde::{Deserialize, Serialize};

use crate::domain::{GeoPoint, Rank, UserId};

/// One update delivered by the chat transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundEvent {
    pub actor_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub payload: Payload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Payload {
    Text { text: String },
    Callback { data: String },
    Photo { image_b64: String },
    Location { point: GeoPoint },
}

impl Payload {
    pub fn text(value: impl Into<String>) -> Self {
        Payload::Text { text: value.into() }
    }

    pub fn callback(data: impl Into<String>) -> Self {
        Payload::Callback { data: data.into() }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text { text } => Some(text.as_str()),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Text { .. } => "text",
            Payload::Callback { .. } => "callback",
            Payload::Photo { .. } => "photo",
            Payload::Location { .. } => "location",
        }
    }
}

/// Button token of the form `<action>`, `<action>_<arg>` or `<action>_<arg>_<sub>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackData {
    pub action: String,
    pub arg: Option<String>,
    pub sub: Option<String>,
}

impl CallbackData {
    pub fn parse(raw: &str) -> Self {
        let mut parts = raw.trim().splitn(3, '_');
        let action = parts.next().unwrap_or_default().to_string();
        let arg = parts.next().filter(|p| !p.is_empty()).map(str::to_string);
        let sub = parts.next().filter(|p| !p.is_empty()).map(str::to_string);
        Self { action, arg, sub }
    }

    pub fn id(&self) -> Option<i64> {
        self.arg.as_deref().and_then(|arg| arg.parse().ok())
    }

    pub fn sub_id(&self) -> Option<i64> {
        self.sub.as_deref().and_then(|sub| sub.parse().ok())
    }

    pub fn encode(action: &str, arg: impl ToString) -> String {
        format!("{action}_{}", arg.to_string())
    }

    pub fn encode_sub(action: &str, arg: impl ToString, sub: impl ToString) -> String {
        format!("{action}_{}_{}", arg.to_string(), sub.to_string())
    }
}

/// Which reply keyboard the transport should render below a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "rank", rename_all = "snake_case")]
pub enum Menu {
    Main(Rank),
    Cancel,
    Remove,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Button {
    pub label: String,
    pub data: String,
}

impl Button {
    pub fn new(label: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            data: data.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhotoPayload {
    pub mime_type: String,
    pub image_b64: String,
}

/// A single message to deliver to `chat_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outbound {
    pub chat_id: UserId,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub menu: Option<Menu>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub buttons: Vec<Vec<Button>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo: Option<PhotoPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoPoint>,
}

impl Outbound {
    pub fn text(chat_id: UserId, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            text: text.into(),
            menu: None,
            buttons: Vec::new(),
            photo: None,
            location: None,
        }
    }

    pub fn with_menu(mut self, menu: Menu) -> Self {
        self.menu = Some(menu);
        self
    }

    pub fn with_row(mut self, row: Vec<Button>) -> Self {
        if !row.is_empty() {
            self.buttons.push(row);
        }
        self
    }

    pub fn with_photo(mut self, photo: PhotoPayload) -> Self {
        self.photo = Some(photo);
        self
    }

    pub fn with_location(mut self, location: Option<GeoPoint>) -> Self {
        self.location = location;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_three_part_callback_tokens() {
        let data = CallbackData::parse("edit_42_description");
        assert_eq!(data.action, "edit");
        assert_eq!(data.id(), Some(42));
        assert_eq!(data.sub.as_deref(), Some("description"));
    }

    #[test]
    fn hyphenated_actions_stay_whole() {
        let data = CallbackData::parse("event-interest-add_7_3");
        assert_eq!(data.action, "event-interest-add");
        assert_eq!(data.id(), Some(7));
        assert_eq!(data.sub_id(), Some(3));
    }

    #[test]
    fn non_numeric_arg_has_no_id() {
        let data = CallbackData::parse("catalog-add_interest");
        assert_eq!(data.id(), None);
        assert_eq!(data.arg.as_deref(), Some("interest"));
        assert_eq!(CallbackData::parse("").action, "");
    }

    #[test]
    fn inbound_event_uses_tagged_payloads() {
        let raw = r#"{"actor_id":5,"payload":{"type":"text","payload":{"text":"/start"}}}"#;
        let event: InboundEvent = serde_json::from_str(raw).expect("json");
        assert_eq!(event.actor_id, UserId(5));
        assert_eq!(event.payload.as_text(), Some("/start"));
    }
}

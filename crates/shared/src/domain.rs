use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(UserId);
id_newtype!(EventId);
id_newtype!(CatalogId);
id_newtype!(FeedbackId);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {} '{}'", self.kind, self.value)
    }
}

impl std::error::Error for UnknownVariant {}

/// Declares a plain enum stored as a lowercase text column.
macro_rules! stored_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value {
                    $($text => Ok($name::$variant),)+
                    _ => Err(UnknownVariant {
                        kind: stringify!($name),
                        value: value.to_string(),
                    }),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

stored_enum!(
    /// Role tier gating which handlers an actor may reach. Tiers are not a
    /// strict hierarchy: each handler lists the ranks it accepts.
    Rank {
        User => "user",
        Moder => "moder",
        Organizer => "organizer",
        Admin => "admin",
    }
);

stored_enum!(
    /// Position of an actor inside a guided multi-turn flow.
    Step {
        None => "none",
        FirstName => "first_name",
        MiddleName => "middle_name",
        LastName => "last_name",
        Phone => "phone",
        Email => "email",
        EditFirstName => "edit_first_name",
        EditMiddleName => "edit_middle_name",
        EditLastName => "edit_last_name",
        EditPhone => "edit_phone",
        EditEmail => "edit_email",
        NewOrganizerId => "new_organizer_id",
        NewModerId => "new_moder_id",
        EventName => "event_name",
        EventEditName => "event_edit_name",
        EventDescription => "event_description",
        EventDate => "event_date",
        EventLocation => "event_location",
        AttendanceCode => "attendance_code",
        EventFeedback => "event_feedback",
        FriendId => "friend_id",
        RatingAmount => "rating_amount",
        AchievementChoice => "achievement_choice",
        AddInterestName => "add_interest_name",
        RemoveInterestName => "remove_interest_name",
        AddGroupName => "add_group_name",
        RemoveGroupName => "remove_group_name",
        AddAchievementName => "add_achievement_name",
        RemoveAchievementName => "remove_achievement_name",
    }
);

impl Step {
    pub fn is_idle(self) -> bool {
        self == Step::None
    }

    /// Registration must run to completion; every other flow may be aborted.
    pub fn is_cancelable(self) -> bool {
        !matches!(
            self,
            Step::None
                | Step::FirstName
                | Step::MiddleName
                | Step::LastName
                | Step::Phone
                | Step::Email
        )
    }
}

impl Default for Step {
    fn default() -> Self {
        Step::None
    }
}

stored_enum!(EventStatus {
    Unfinished => "unfinished",
    Finished => "finished",
});

stored_enum!(AttendanceStatus {
    NotArrived => "not_arrived",
    Arrived => "arrived",
});

stored_enum!(FriendStatus {
    Waiting => "waiting",
    Accepted => "accepted",
});

stored_enum!(GrantKind {
    Rating => "rating",
    Achievement => "achievement",
});

stored_enum!(
    /// Admin-managed named rows referenced by many-to-many edges.
    CatalogKind {
        Interest => "interest",
        Group => "group",
        Achievement => "achievement",
    }
);

impl CatalogKind {
    pub fn table(self) -> &'static str {
        match self {
            CatalogKind::Interest => "interests",
            CatalogKind::Group => "local_groups",
            CatalogKind::Achievement => "achievements",
        }
    }

    pub fn plural_label(self) -> &'static str {
        match self {
            CatalogKind::Interest => "Interests",
            CatalogKind::Group => "Groups",
            CatalogKind::Achievement => "Achievements",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

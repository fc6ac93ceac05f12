//! The fixed set of canonical survey fields.
//!
//! Every survey export, whatever its column wording, is read through these
//! nineteen fields. Each field carries a [`FieldKind`] that decides how raw
//! cells are parsed during normalization.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::MappingError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalField {
    Date,
    Grade,
    Class,
    Team,
    AnonId,
    YoutubeMin,
    StreamingMin,
    SnsMin,
    MessengerMin,
    VideoMeetingMin,
    MobileDataMb,
    CommuteMode,
    CommuteKm,
    LunchType,
    DeliveryUsed,
    PetBottles,
    DisposableCups,
    RecycleBags,
    DigitalCleanupMin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Date,
    /// Free text kept as-is; `lowercase` fields feed coefficient lookups.
    Categorical { lowercase: bool },
    Numeric,
}

impl CanonicalField {
    pub const ALL: [CanonicalField; 19] = [
        CanonicalField::Date,
        CanonicalField::Grade,
        CanonicalField::Class,
        CanonicalField::Team,
        CanonicalField::AnonId,
        CanonicalField::YoutubeMin,
        CanonicalField::StreamingMin,
        CanonicalField::SnsMin,
        CanonicalField::MessengerMin,
        CanonicalField::VideoMeetingMin,
        CanonicalField::MobileDataMb,
        CanonicalField::CommuteMode,
        CanonicalField::CommuteKm,
        CanonicalField::LunchType,
        CanonicalField::DeliveryUsed,
        CanonicalField::PetBottles,
        CanonicalField::DisposableCups,
        CanonicalField::RecycleBags,
        CanonicalField::DigitalCleanupMin,
    ];

    pub fn name(self) -> &'static str {
        match self {
            CanonicalField::Date => "date",
            CanonicalField::Grade => "grade",
            CanonicalField::Class => "class",
            CanonicalField::Team => "team",
            CanonicalField::AnonId => "anon_id",
            CanonicalField::YoutubeMin => "youtube_min",
            CanonicalField::StreamingMin => "streaming_min",
            CanonicalField::SnsMin => "sns_min",
            CanonicalField::MessengerMin => "messenger_min",
            CanonicalField::VideoMeetingMin => "video_meeting_min",
            CanonicalField::MobileDataMb => "mobile_data_mb",
            CanonicalField::CommuteMode => "commute_mode",
            CanonicalField::CommuteKm => "commute_km",
            CanonicalField::LunchType => "lunch_type",
            CanonicalField::DeliveryUsed => "delivery_used",
            CanonicalField::PetBottles => "pet_bottles",
            CanonicalField::DisposableCups => "disposable_cups",
            CanonicalField::RecycleBags => "recycle_bags",
            CanonicalField::DigitalCleanupMin => "digital_cleanup_min",
        }
    }

    pub fn kind(self) -> FieldKind {
        match self {
            CanonicalField::Date => FieldKind::Date,
            CanonicalField::Grade
            | CanonicalField::Class
            | CanonicalField::Team
            | CanonicalField::AnonId => FieldKind::Categorical { lowercase: false },
            CanonicalField::CommuteMode
            | CanonicalField::LunchType
            | CanonicalField::DeliveryUsed => FieldKind::Categorical { lowercase: true },
            _ => FieldKind::Numeric,
        }
    }
}

impl fmt::Display for CanonicalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CanonicalField {
    type Err = MappingError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let wanted = value.trim();
        CanonicalField::ALL
            .into_iter()
            .find(|field| field.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| MappingError::UnknownField(wanted.to_string()))
    }
}

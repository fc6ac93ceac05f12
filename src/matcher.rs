//! Keyword matching of free-text survey headers onto canonical fields.
//!
//! Survey forms are authored by hand, so column labels are whatever question
//! text the form author typed ("하루 유튜브 시청 시간(분)", "Commute distance (km)").
//! Each canonical field owns an ordered keyword list; the first column, in the
//! export's own column order, whose label contains any keyword wins.
//! Single-character keywords ("반", "팀") only match as a whole word, so "반"
//! finds "반" or "몇 반" but not "일반" or "반찬".

use std::collections::BTreeMap;

use log::debug;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::{fields::CanonicalField, mapping::FieldMapping};

pub const DEFAULT_KEYWORD_VERSION: &str = "keywords-v3";

/// Versioned keyword lists, one per canonical field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordTable {
    pub version: String,
    pub fields: BTreeMap<CanonicalField, Vec<String>>,
}

impl Default for KeywordTable {
    fn default() -> Self {
        use CanonicalField::*;
        let entries: [(CanonicalField, &[&str]); 19] = [
            (Date, &["타임스탬프", "timestamp", "날짜", "일자", "date"]),
            (Grade, &["학년", "grade"]),
            (Class, &["학급", "반", "class"]),
            (Team, &["모둠", "팀명", "팀", "team", "group"]),
            (AnonId, &["익명", "닉네임", "학번", "anon", "student id"]),
            (YoutubeMin, &["유튜브", "youtube"]),
            (StreamingMin, &["스트리밍", "넷플릭스", "streaming", "netflix"]),
            (SnsMin, &["sns", "인스타", "틱톡", "instagram", "tiktok"]),
            (MessengerMin, &["메신저", "카톡", "카카오톡", "messenger", "kakao"]),
            (VideoMeetingMin, &["화상", "줌", "zoom", "video meeting", "video_meeting"]),
            (MobileDataMb, &["데이터", "mobile data", "mobile_data", "data"]),
            (
                CommuteMode,
                &[
                    "통학 수단",
                    "통학수단",
                    "교통수단",
                    "이동 수단",
                    "commute mode",
                    "commute_mode",
                    "transport",
                ],
            ),
            (CommuteKm, &["통학 거리", "통학거리", "거리", "km", "distance"]),
            (LunchType, &["점심", "급식", "식단", "lunch", "meal"]),
            (DeliveryUsed, &["배달", "delivery"]),
            (PetBottles, &["페트", "생수", "pet", "bottle"]),
            (DisposableCups, &["일회용 컵", "일회용컵", "종이컵", "컵", "cup"]),
            (RecycleBags, &["분리수거", "재활용", "recycle"]),
            (DigitalCleanupMin, &["디지털 청소", "디지털 정리", "cleanup", "clean-up"]),
        ];
        let fields = entries
            .into_iter()
            .map(|(field, words)| (field, words.iter().map(|w| w.to_string()).collect()))
            .collect();
        Self {
            version: DEFAULT_KEYWORD_VERSION.to_string(),
            fields,
        }
    }
}

impl KeywordTable {
    pub fn keywords(&self, field: CanonicalField) -> &[String] {
        self.fields.get(&field).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Returns the first label containing any keyword, compared case-insensitively.
/// A one-character keyword must stand as its own word in the label.
pub fn match_column<'a, S, K>(labels: &'a [S], keywords: &[K]) -> Option<&'a str>
where
    S: AsRef<str>,
    K: AsRef<str>,
{
    let pattern = keyword_pattern(keywords)?;
    labels
        .iter()
        .find(|label| pattern.is_match(label.as_ref()))
        .map(|label| label.as_ref())
}

fn keyword_pattern<K: AsRef<str>>(keywords: &[K]) -> Option<Regex> {
    let alternation = keywords
        .iter()
        .map(|k| k.as_ref().trim())
        .filter(|k| !k.is_empty())
        .map(|k| {
            if k.chars().count() == 1 {
                format!(r"\b{}\b", regex::escape(k))
            } else {
                regex::escape(k)
            }
        })
        .collect::<Vec<_>>();
    if alternation.is_empty() {
        return None;
    }
    RegexBuilder::new(&alternation.join("|"))
        .case_insensitive(true)
        .build()
        .ok()
}

/// Runs [`match_column`] once per canonical field against the header row.
pub fn guess_mapping<S: AsRef<str>>(labels: &[S], table: &KeywordTable) -> FieldMapping {
    let mut mapping = FieldMapping::unmapped();
    for field in CanonicalField::ALL {
        let found = match_column(labels, table.keywords(field));
        debug!("Keyword match for '{field}': {found:?}");
        mapping.set(field, found.map(str::to_string));
    }
    mapping
}

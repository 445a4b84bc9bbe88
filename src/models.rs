//! Data models for scraped golf rounds.
//!
//! - [`RoundRecord`]: one played round as extracted from a score detail page
//! - [`HoleStat`]: a numeric per-hole value or the "no data" sentinel
//! - [`HoleMark`]: a textual per-hole value or the "no data" sentinel
//!
//! Field names match the JSON files written by earlier versions of the tool,
//! so existing score files keep loading.

use chrono::NaiveDate;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Token written for a hole that has no recorded value.
pub const NO_DATA: &str = "ー";

/// Tokens read as the "no data" sentinel. The site renders a long-vowel mark;
/// hand-edited files sometimes carry an ASCII or full-width dash instead.
const NO_DATA_TOKENS: [&str; 4] = [NO_DATA, "-", "－", "—"];

/// Number of holes in a round; per-hole sequences never exceed this.
pub const HOLES_PER_ROUND: usize = 18;

fn is_no_data(token: &str) -> bool {
    NO_DATA_TOKENS.contains(&token)
}

/// A numeric per-hole value (strokes, putts, par, yards, penalty counts).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoleStat {
    Count(i32),
    NoData,
}

impl HoleStat {
    /// Permissive parse of a table cell.
    ///
    /// Returns `None` when the text is neither the sentinel nor a number, so
    /// the caller can record the event before falling back to [`HoleStat::NoData`].
    ///
    /// ```ignore
    /// assert_eq!(HoleStat::from_cell(" 5 "), Some(HoleStat::Count(5)));
    /// assert_eq!(HoleStat::from_cell("ー"), Some(HoleStat::NoData));
    /// assert_eq!(HoleStat::from_cell("３８０y"), Some(HoleStat::Count(380)));
    /// assert_eq!(HoleStat::from_cell("abc"), None);
    /// ```
    pub fn from_cell(raw: &str) -> Option<HoleStat> {
        let text: String = raw
            .trim()
            .chars()
            .map(|c| match c {
                '０'..='９' => char::from_u32(c as u32 - '０' as u32 + '0' as u32).unwrap_or(c),
                '＋' => '+',
                _ => c,
            })
            .collect();
        if is_no_data(&text) {
            return Some(HoleStat::NoData);
        }
        let text = text.strip_prefix('+').unwrap_or(&text);
        if let Ok(n) = text.parse::<i32>() {
            return Some(HoleStat::Count(n));
        }
        // Leading digits with a unit suffix, e.g. "380y".
        let digits: String = text.chars().take_while(|c| c.is_ascii_digit()).collect();
        if digits.is_empty() {
            return None;
        }
        digits.parse().ok().map(HoleStat::Count)
    }

    pub fn value(self) -> Option<i32> {
        match self {
            HoleStat::Count(n) => Some(n),
            HoleStat::NoData => None,
        }
    }
}

impl fmt::Display for HoleStat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HoleStat::Count(n) => write!(f, "{n}"),
            HoleStat::NoData => f.write_str(NO_DATA),
        }
    }
}

impl Serialize for HoleStat {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

struct HoleStatVisitor;

impl Visitor<'_> for HoleStatVisitor {
    type Value = HoleStat;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a per-hole number as string or integer")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<HoleStat, E> {
        // Older files may hold blanks or stray text; those read as no data.
        Ok(HoleStat::from_cell(v).unwrap_or(HoleStat::NoData))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<HoleStat, E> {
        i32::try_from(v)
            .map(HoleStat::Count)
            .map_err(|_| E::custom(format!("hole value {v} out of range")))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<HoleStat, E> {
        i32::try_from(v)
            .map(HoleStat::Count)
            .map_err(|_| E::custom(format!("hole value {v} out of range")))
    }

    fn visit_unit<E: de::Error>(self) -> Result<HoleStat, E> {
        Ok(HoleStat::NoData)
    }
}

impl<'de> Deserialize<'de> for HoleStat {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(HoleStatVisitor)
    }
}

/// A textual per-hole value (tee-shot result, fairway-keep and one-on classes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HoleMark {
    Mark(String),
    NoData,
}

impl HoleMark {
    pub fn from_text(raw: &str) -> HoleMark {
        let text = raw.trim();
        if text.is_empty() || is_no_data(text) {
            HoleMark::NoData
        } else {
            HoleMark::Mark(text.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            HoleMark::Mark(s) => s,
            HoleMark::NoData => NO_DATA,
        }
    }
}

impl Serialize for HoleMark {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for HoleMark {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(HoleMark::from_text(&s))
    }
}

/// One played round of golf.
///
/// Every per-hole sequence is optional: a missing table row on the page, or a
/// missing key in an older file, yields an empty sequence.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RoundRecord {
    /// Year as shown on the page (`YYYY`).
    pub year: String,
    /// Month as shown on the page (`MM`).
    pub month: String,
    /// Day as shown on the page (`DD`).
    pub day: String,

    pub golf_place_name: String,
    pub course_former_half: String,
    pub course_latter_half: String,
    #[serde(default)]
    pub prefecture: String,

    #[serde(default)]
    pub weather: String,
    #[serde(default)]
    pub wind: String,
    #[serde(default)]
    pub green: String,
    #[serde(default)]
    pub tee: String,

    #[serde(default)]
    pub hall_scores: Vec<HoleStat>,
    #[serde(default)]
    pub putt_scores: Vec<HoleStat>,

    #[serde(default)]
    pub teeshots: Vec<HoleMark>,
    #[serde(default)]
    pub fairway_keeps: Vec<HoleMark>,
    #[serde(default)]
    pub oneons: Vec<HoleMark>,

    #[serde(default)]
    pub obs: Vec<HoleStat>,
    #[serde(default)]
    pub bunkers: Vec<HoleStat>,
    #[serde(default)]
    pub penaltys: Vec<HoleStat>,

    #[serde(default)]
    pub par_scores: Vec<HoleStat>,
    #[serde(default)]
    pub yard_scores: Vec<HoleStat>,

    #[serde(default)]
    pub accompany_member_names: Vec<String>,
    /// Index-aligned with `accompany_member_names`.
    #[serde(default)]
    pub accompany_member_scores: Vec<Vec<HoleStat>>,
}

impl RoundRecord {
    /// A record with only the date and course fields set.
    pub fn new(
        year: impl Into<String>,
        month: impl Into<String>,
        day: impl Into<String>,
        golf_place_name: impl Into<String>,
    ) -> Self {
        RoundRecord {
            year: year.into(),
            month: month.into(),
            day: day.into(),
            golf_place_name: golf_place_name.into(),
            course_former_half: String::new(),
            course_latter_half: String::new(),
            prefecture: String::new(),
            weather: String::new(),
            wind: String::new(),
            green: String::new(),
            tee: String::new(),
            hall_scores: Vec::new(),
            putt_scores: Vec::new(),
            teeshots: Vec::new(),
            fairway_keeps: Vec::new(),
            oneons: Vec::new(),
            obs: Vec::new(),
            bunkers: Vec::new(),
            penaltys: Vec::new(),
            par_scores: Vec::new(),
            yard_scores: Vec::new(),
            accompany_member_names: Vec::new(),
            accompany_member_scores: Vec::new(),
        }
    }

    /// Numeric year, if the year text is an integer.
    pub fn year_number(&self) -> Option<i32> {
        self.year.trim().parse().ok()
    }

    /// Calendar date, if all three parts parse into a valid date.
    pub fn date(&self) -> Option<NaiveDate> {
        let y = self.year_number()?;
        let m = self.month.trim().parse().ok()?;
        let d = self.day.trim().parse().ok()?;
        NaiveDate::from_ymd_opt(y, m, d)
    }

    /// Set companions, padding or truncating the score list so that index `i`
    /// of both sequences always describes the same companion.
    pub fn set_companions(&mut self, names: Vec<String>, mut scores: Vec<Vec<HoleStat>>) {
        scores.resize_with(names.len(), Vec::new);
        self.accompany_member_names = names;
        self.accompany_member_scores = scores;
    }
}

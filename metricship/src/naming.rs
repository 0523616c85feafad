//! Destination (index) naming with calendar rotation.
//!
//! The destination for a batch is `prefix-suffix`, where the suffix depends on
//! the configured [`RotationFrequency`] and the local date at ship time. Two
//! documents buffered across a rotation boundary and shipped together land in
//! the single destination computed when the batch is shipped.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Local, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// How often the destination name rolls over.
///
/// Deserializes case-insensitively through [`FromStr`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum RotationFrequency {
    /// One destination per day: `prefix-YYYY.MM.DD`.
    #[default]
    Daily,
    /// One destination per ISO week: `prefix-GGGG.Www`.
    Weekly,
    /// One destination per month: `prefix-YYYY.MM`.
    Monthly,
    /// One destination per year: `prefix-YYYY`.
    Yearly,
    /// A single destination, the bare prefix.
    Never,
}

impl RotationFrequency {
    /// All variants, in rotation-period order.
    pub const ALL: [Self; 5] = [
        Self::Daily,
        Self::Weekly,
        Self::Monthly,
        Self::Yearly,
        Self::Never,
    ];

    /// Returns the period suffix for `date`, or `None` for [`RotationFrequency::Never`].
    pub fn suffix(self, date: NaiveDate) -> Option<String> {
        match self {
            Self::Daily => Some(date.format("%Y.%m.%d").to_string()),
            Self::Weekly => {
                let week = date.iso_week();
                Some(format!("{}.W{:02}", week.year(), week.week()))
            }
            Self::Monthly => Some(date.format("%Y.%m").to_string()),
            Self::Yearly => Some(date.format("%Y").to_string()),
            Self::Never => None,
        }
    }

    /// Lowercase name, as accepted by [`FromStr`].
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
            Self::Never => "never",
        }
    }
}

impl fmt::Display for RotationFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RotationFrequency {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|freq| freq.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ConfigError::UnknownRotation {
                value: s.to_string(),
            })
    }
}

impl TryFrom<String> for RotationFrequency {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Computes destination names from a prefix and rotation frequency.
///
/// Naming is pure and side-effect free, so concurrent ship calls can share a
/// single namer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationNamer {
    prefix: String,
    rotation: RotationFrequency,
}

impl DestinationNamer {
    /// Creates a namer for `prefix` rotating at `rotation`.
    pub fn new(prefix: impl Into<String>, rotation: RotationFrequency) -> Self {
        Self {
            prefix: prefix.into(),
            rotation,
        }
    }

    /// The configured prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// The configured rotation frequency.
    pub fn rotation(&self) -> RotationFrequency {
        self.rotation
    }

    /// Destination name for the given local date.
    pub fn name_for(&self, date: NaiveDate) -> String {
        match self.rotation.suffix(date) {
            Some(suffix) => format!("{}-{suffix}", self.prefix),
            None => self.prefix.clone(),
        }
    }

    /// Destination name for the current local date.
    pub fn name_now(&self) -> String {
        self.name_for(Local::now().date_naive())
    }
}

//! Sorting types for list queries.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    /// Ascending order.
    #[default]
    #[serde(alias = "asc")]
    Ascending,
    /// Descending order.
    #[serde(alias = "desc")]
    Descending,
}

impl SortDirection {
    /// Whether this direction reverses the natural order.
    pub fn is_descending(self) -> bool {
        matches!(self, Self::Descending)
    }

    /// Return the opposite direction.
    pub fn reverse(self) -> Self {
        match self {
            Self::Ascending => Self::Descending,
            Self::Descending => Self::Ascending,
        }
    }

    /// Return the short keyword for this direction.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ascending => "asc",
            Self::Descending => "desc",
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortDirection {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "asc" | "ascending" => Ok(Self::Ascending),
            "desc" | "descending" => Ok(Self::Descending),
            other => Err(AppError::configuration(format!(
                "Unknown sort direction '{other}'"
            ))),
        }
    }
}

/// A single ordering criterion: a field name and a direction.
///
/// The field name is resolved against the entity's field table when the
/// query is built, never when it executes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderingCriterion {
    /// Field name, matched case-insensitively.
    pub field: String,
    /// Sort direction.
    #[serde(default)]
    pub direction: SortDirection,
}

impl OrderingCriterion {
    /// Create a new ordering criterion.
    pub fn new(field: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            field: field.into(),
            direction,
        }
    }

    /// Create an ascending criterion on the given field.
    pub fn asc(field: impl Into<String>) -> Self {
        Self::new(field, SortDirection::Ascending)
    }

    /// Create a descending criterion on the given field.
    pub fn desc(field: impl Into<String>) -> Self {
        Self::new(field, SortDirection::Descending)
    }
}

impl FromStr for OrderingCriterion {
    type Err = AppError;

    /// Parse `field` or `field:direction`, e.g. `title:desc`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (field, direction) = match s.split_once(':') {
            Some((field, dir)) => (field.trim(), dir.parse()?),
            None => (s.trim(), SortDirection::Ascending),
        };
        if field.is_empty() {
            return Err(AppError::configuration("Ordering criterion has an empty field"));
        }
        Ok(Self::new(field, direction))
    }
}

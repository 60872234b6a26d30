//! Action types recorded by the host application.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The kind of billable operation a usage record describes.
///
/// The three named variants have dedicated counters in the daily
/// aggregates. Anything else is stored verbatim and only counts toward
/// the daily total.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ActionType {
    /// A sample file was loaded.
    LoadSample,
    /// Processed data was exported.
    ExportData,
    /// Metabolites were split out of a sample.
    SplitMetabolites,
    /// Any other host-defined action.
    Other(String),
}

impl ActionType {
    /// Returns the stable wire/storage name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::LoadSample => "load_sample",
            Self::ExportData => "export_data",
            Self::SplitMetabolites => "split_metabolites",
            Self::Other(name) => name,
        }
    }
}

impl From<&str> for ActionType {
    fn from(s: &str) -> Self {
        match s {
            "load_sample" => Self::LoadSample,
            "export_data" => Self::ExportData,
            "split_metabolites" => Self::SplitMetabolites,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for ActionType {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<ActionType> for String {
    fn from(action: ActionType) -> Self {
        action.as_str().to_string()
    }
}

impl FromStr for ActionType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s))
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

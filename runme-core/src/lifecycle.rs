//! Lifecycle identity setting

use crate::error::LifecycleParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which entities receive a permanent identity when a document is saved.
///
/// The setting only controls creation. Identities already present in a
/// document are kept under every value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleSetting {
    /// No new identities anywhere
    None,
    /// Document identity only
    Doc,
    /// Cell identities only
    Cell,
    /// Document and cell identities
    #[default]
    All,
}

impl LifecycleSetting {
    pub const VALUES: [LifecycleSetting; 4] = [
        LifecycleSetting::None,
        LifecycleSetting::Doc,
        LifecycleSetting::Cell,
        LifecycleSetting::All,
    ];

    pub fn creates_document_identity(&self) -> bool {
        matches!(self, LifecycleSetting::Doc | LifecycleSetting::All)
    }

    pub fn creates_cell_identity(&self) -> bool {
        matches!(self, LifecycleSetting::Cell | LifecycleSetting::All)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleSetting::None => "None",
            LifecycleSetting::Doc => "Doc",
            LifecycleSetting::Cell => "Cell",
            LifecycleSetting::All => "All",
        }
    }

    /// Numeric code used by the editor configuration.
    pub fn code(&self) -> u8 {
        match self {
            LifecycleSetting::None => 0,
            LifecycleSetting::All => 1,
            LifecycleSetting::Doc => 2,
            LifecycleSetting::Cell => 3,
        }
    }

    pub fn from_code(code: u8) -> Result<Self, LifecycleParseError> {
        match code {
            0 => Ok(LifecycleSetting::None),
            1 => Ok(LifecycleSetting::All),
            2 => Ok(LifecycleSetting::Doc),
            3 => Ok(LifecycleSetting::Cell),
            other => Err(LifecycleParseError(other.to_string())),
        }
    }
}

impl fmt::Display for LifecycleSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LifecycleSetting {
    type Err = LifecycleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(code) = trimmed.parse::<u8>() {
            return Self::from_code(code).map_err(|_| LifecycleParseError(s.to_string()));
        }
        match trimmed.to_lowercase().as_str() {
            "none" => Ok(LifecycleSetting::None),
            "doc" | "document" => Ok(LifecycleSetting::Doc),
            "cell" => Ok(LifecycleSetting::Cell),
            "all" => Ok(LifecycleSetting::All),
            _ => Err(LifecycleParseError(s.to_string())),
        }
    }
}

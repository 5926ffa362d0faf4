use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Which side is the source of truth for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Remote → local tree.
    Import,
    /// Local tree → remote.
    Export,
}

impl Direction {
    pub fn reverse(self) -> Self {
        match self {
            Direction::Import => Direction::Export,
            Direction::Export => Direction::Import,
        }
    }

    /// Label of the source side, used in diff headers.
    pub fn source_label(self) -> &'static str {
        match self {
            Direction::Import => "remote",
            Direction::Export => "local",
        }
    }

    pub fn destination_label(self) -> &'static str {
        self.reverse().source_label()
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Import => write!(f, "import"),
            Direction::Export => write!(f, "export"),
        }
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "import" => Ok(Direction::Import),
            "export" => Ok(Direction::Export),
            other => Err(format!("unknown direction '{other}'; expected: import, export")),
        }
    }
}

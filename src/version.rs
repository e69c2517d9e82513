//! Protocol versions and version gating of optional properties.

use std::fmt;
use std::str::FromStr;

use crate::error::{Result, SpoolError};

/// Server schema versions, ordered oldest to newest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum ExchangeVersion {
    Exchange2007Sp1,
    Exchange2010,
    Exchange2010Sp1,
    #[default]
    Exchange2010Sp2,
    Exchange2013,
    Exchange2013Sp1,
}

impl ExchangeVersion {
    /// All versions in ascending order.
    pub const ALL: [ExchangeVersion; 6] = [
        Self::Exchange2007Sp1,
        Self::Exchange2010,
        Self::Exchange2010Sp1,
        Self::Exchange2010Sp2,
        Self::Exchange2013,
        Self::Exchange2013Sp1,
    ];

    /// Schema spelling, e.g. `Exchange2010_SP2`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Exchange2007Sp1 => "Exchange2007_SP1",
            Self::Exchange2010 => "Exchange2010",
            Self::Exchange2010Sp1 => "Exchange2010_SP1",
            Self::Exchange2010Sp2 => "Exchange2010_SP2",
            Self::Exchange2013 => "Exchange2013",
            Self::Exchange2013Sp1 => "Exchange2013_SP1",
        }
    }
}

impl fmt::Display for ExchangeVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExchangeVersion {
    type Err = SpoolError;

    /// Accepts the schema spelling, case-insensitively.
    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|v| v.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| SpoolError::Validation(format!("Unknown server version: {s}")))
    }
}

/// Fail when `actual` is older than the version that introduced `property`.
pub fn validate_property_version(
    actual: ExchangeVersion,
    required: ExchangeVersion,
    property: &'static str,
) -> Result<()> {
    if actual < required {
        return Err(SpoolError::UnsupportedVersion {
            property,
            required,
            actual,
        });
    }
    Ok(())
}

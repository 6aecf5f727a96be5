//! Inheritance modes and check levels.
//!
//! [`Mode`] is a signature's relationship to inheritance; the derived sets
//! below drive the override checker's mode-legality switch. [`CheckLevel`]
//! decides when the installed validator actually validates.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A signature's relationship to inheritance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Standard,
    Abstract,
    Overridable,
    Override,
    OverridableOverride,
    /// Synthesised for callables that never had a declaration.
    Untyped,
}

impl Mode {
    /// Modes whose callables may legally be overridden.
    pub const OVERRIDABLE: [Mode; 5] = [
        Mode::Override,
        Mode::Overridable,
        Mode::OverridableOverride,
        Mode::Untyped,
        Mode::Abstract,
    ];

    /// Modes that declare an override.
    pub const OVERRIDE: [Mode; 2] = [Mode::Override, Mode::OverridableOverride];

    /// Modes that do not declare an override.
    pub const NON_OVERRIDE: [Mode; 3] = [Mode::Standard, Mode::Abstract, Mode::Overridable];

    pub fn is_overridable(self) -> bool {
        Self::OVERRIDABLE.contains(&self)
    }

    pub fn is_override(self) -> bool {
        Self::OVERRIDE.contains(&self)
    }

    pub fn is_non_override(self) -> bool {
        Self::NON_OVERRIDE.contains(&self)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Standard => "standard",
            Mode::Abstract => "abstract",
            Mode::Overridable => "overridable",
            Mode::Override => "override",
            Mode::OverridableOverride => "overridable_override",
            Mode::Untyped => "untyped",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// When the installed validator performs checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckLevel {
    Always,
    /// Only while the runtime's "check in tests" flag is set.
    Tests,
    Never,
}

impl CheckLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            CheckLevel::Always => "always",
            CheckLevel::Tests => "tests",
            CheckLevel::Never => "never",
        }
    }

    /// Whether a signature at this level is enforced given the current value
    /// of the tests flag.
    pub fn is_enforced(self, check_tests: bool) -> bool {
        match self {
            CheckLevel::Always => true,
            CheckLevel::Tests => check_tests,
            CheckLevel::Never => false,
        }
    }
}

impl fmt::Display for CheckLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CheckLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "always" => Ok(CheckLevel::Always),
            "tests" => Ok(CheckLevel::Tests),
            "never" => Ok(CheckLevel::Never),
            other => Err(format!(
                "Invalid `checked` level '{}'. Use one of: always, tests, never.",
                other
            )),
        }
    }
}

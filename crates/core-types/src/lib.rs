use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use uuid::Uuid;

/// Raised when a mode name coming from config or the CLI is unknown.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown {kind} '{value}'")]
pub struct ParseModeError {
    pub kind: &'static str,
    pub value: String,
}

/// Stable identifier of a post on the host page.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct PostId(pub String);

impl PostId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Synthesises a fresh id for posts the site gives no identifier to.
    pub fn generated(prefix: &str) -> Self {
        Self(format!("{prefix}-{}", Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PostId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Which transform is applied to a post's text.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde-full", serde(rename_all = "lowercase"))]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum RewriteMode {
    #[default]
    Tldr,
    Debuzzword,
    Brainrot,
}

impl RewriteMode {
    pub const ALL: [RewriteMode; 3] = [
        RewriteMode::Tldr,
        RewriteMode::Debuzzword,
        RewriteMode::Brainrot,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RewriteMode::Tldr => "tldr",
            RewriteMode::Debuzzword => "debuzzword",
            RewriteMode::Brainrot => "brainrot",
        }
    }

    /// Human facing name, also used as the idle button label.
    pub fn label(self) -> &'static str {
        match self {
            RewriteMode::Tldr => "TL;DR",
            RewriteMode::Debuzzword => "De-buzzword",
            RewriteMode::Brainrot => "Brain Rot",
        }
    }
}

impl fmt::Display for RewriteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RewriteMode {
    type Err = ParseModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RewriteMode::ALL
            .into_iter()
            .find(|mode| mode.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseModeError {
                kind: "rewrite mode",
                value: s.to_string(),
            })
    }
}

/// Whether rewrites are triggered per post by the user or applied to every post.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde-full", serde(rename_all = "lowercase"))]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum BehaviorMode {
    #[default]
    Manual,
    Auto,
}

impl BehaviorMode {
    pub fn as_str(self) -> &'static str {
        match self {
            BehaviorMode::Manual => "manual",
            BehaviorMode::Auto => "auto",
        }
    }
}

impl fmt::Display for BehaviorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BehaviorMode {
    type Err = ParseModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "manual" => Ok(BehaviorMode::Manual),
            "auto" => Ok(BehaviorMode::Auto),
            _ => Err(ParseModeError {
                kind: "behavior mode",
                value: s.to_string(),
            }),
        }
    }
}

/// Extension-wide settings owned by the background collaborator.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde-full", serde(default))]
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ExtensionState {
    pub enabled: bool,
    pub rewrite_mode: RewriteMode,
    pub behavior_mode: BehaviorMode,
    pub model_loaded: bool,
    pub is_initializing: bool,
}

impl ExtensionState {
    pub fn activity(&self) -> Activity {
        if !self.enabled || !self.model_loaded {
            return Activity::Inactive;
        }
        match self.behavior_mode {
            BehaviorMode::Manual => Activity::Manual,
            BehaviorMode::Auto => Activity::Auto,
        }
    }
}

/// Operating state of the content pipeline derived from [`ExtensionState`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Activity {
    Inactive,
    Manual,
    Auto,
}

impl Activity {
    pub fn is_active(self) -> bool {
        !matches!(self, Activity::Inactive)
    }

    pub fn behavior(self) -> Option<BehaviorMode> {
        match self {
            Activity::Inactive => None,
            Activity::Manual => Some(BehaviorMode::Manual),
            Activity::Auto => Some(BehaviorMode::Auto),
        }
    }
}

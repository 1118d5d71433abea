// Anti-spam domain models - data structures for repeated-message detection.
//
// These are pure domain types with no Discord dependencies.
// The Discord layer will convert these to Discord-specific actions.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;

/// Errors produced when validating a [`DetectionConfig`] at startup.
///
/// The detector never re-validates its configuration per call; an invalid
/// config must be rejected before the detector is constructed.
#[derive(Debug, Error)]
pub enum DetectionConfigError {
    #[error("similarity_threshold must be within 0.0..=1.0, got {0}")]
    SimilarityOutOfRange(f64),

    #[error("repeat_threshold must be at least 1")]
    ZeroRepeatThreshold,

    #[error("window_seconds must be positive, got {0}")]
    NonPositiveWindow(f64),

    #[error("history_capacity ({capacity}) must not be smaller than repeat_threshold ({threshold})")]
    CapacityBelowThreshold { capacity: usize, threshold: usize },
}

/// Which punitive action the detector is configured to request.
///
/// The detector itself never performs the action - it only labels the
/// trigger outcome. Enforcement is the Discord layer's job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Ban the author from the guild
    Ban,
    /// Apply a timed communication disable
    Timeout,
    /// Only log the flood, take no member action
    FlagOnly,
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionKind::Ban => write!(f, "ban"),
            ActionKind::Timeout => write!(f, "timeout"),
            ActionKind::FlagOnly => write!(f, "flag-only"),
        }
    }
}

/// A fully-resolved action carried by a trigger outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FloodAction {
    /// Ban the author
    Ban,
    /// Disable communication for the given duration
    Timeout { duration: Duration },
    /// Log only
    FlagOnly,
}

/// What `observe` decided about a single message.
#[derive(Debug, Clone, PartialEq)]
pub enum DetectionOutcome {
    /// Message is fine (or was ignored entirely)
    NoAction,
    /// Author is flooding - the caller should enforce the carried action
    Trigger(FloodTrigger),
}

impl DetectionOutcome {
    /// Convenience accessor for tests and callers that only care about
    /// whether enforcement is needed.
    pub fn is_trigger(&self) -> bool {
        matches!(self, DetectionOutcome::Trigger(_))
    }
}

/// Details of a detected flood, for enforcement and logging.
///
/// Carries the window/threshold parameters so the log line can show what
/// the author tripped, without the logger reaching back into the config.
#[derive(Debug, Clone, PartialEq)]
pub struct FloodTrigger {
    /// The configured action to apply
    pub action: FloodAction,
    /// Channel the triggering message was sent in
    pub channel_id: u64,
    /// The triggering text, truncated for display (ellipsis when cut)
    pub matched_text: String,
    /// How many buffered messages matched the triggering text
    pub similar_count: usize,
    pub window_seconds: f64,
    pub repeat_threshold: usize,
    pub similarity_threshold: f64,
}

/// Configuration for the repeated-message detector.
///
/// Fixed at process start; the only runtime mutation is the per-guild
/// enable/disable toggle, which lives in the detector, not here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Look-back horizon for similarity comparisons, in seconds
    pub window_seconds: f64,
    /// Minimum count of similar messages within the window to trigger
    pub repeat_threshold: usize,
    /// Minimum similarity ratio (0.0-1.0) for two texts to count as "the same"
    pub similarity_threshold: f64,
    /// Which action to request on a trigger
    pub action: ActionKind,
    /// Duration applied when `action` is timeout, in seconds
    pub timeout_duration_secs: u64,
    /// Minimum spacing between triggered actions for the same author, in seconds
    pub action_cooldown_seconds: f64,
    /// Hard cap on buffered messages per author, independent of the window.
    /// Must be comfortably larger than `repeat_threshold`: a fast typist can
    /// fill the cap before the window elapses, silently dropping older
    /// same-window messages.
    pub history_capacity: usize,
    /// Role IDs whose holders bypass detection entirely
    pub exempt_roles: HashSet<u64>,
    /// Channel IDs (and thread parents) where detection is skipped
    pub exempt_channels: HashSet<u64>,
    /// Moderation-log channel for trigger embeds (None = no log)
    pub log_channel_id: Option<u64>,
    /// Whether a guild is considered enabled the first time a message
    /// arrives for it, before any explicit toggle
    pub enabled_by_default: bool,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            window_seconds: 15.0,         // look at the last 15 seconds
            repeat_threshold: 5,          // 5 similar messages...
            similarity_threshold: 0.92,   // ...that are near-identical
            action: ActionKind::Ban,
            timeout_duration_secs: 60 * 60, // 1 hour if action = timeout
            action_cooldown_seconds: 30.0, // avoid double actions on the same flood
            history_capacity: 50,
            exempt_roles: HashSet::new(),
            exempt_channels: HashSet::new(),
            log_channel_id: None,
            enabled_by_default: true,
        }
    }
}

impl DetectionConfig {
    /// Validate the configuration once, before the detector is built.
    pub fn validate(&self) -> Result<(), DetectionConfigError> {
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(DetectionConfigError::SimilarityOutOfRange(
                self.similarity_threshold,
            ));
        }
        if self.repeat_threshold == 0 {
            return Err(DetectionConfigError::ZeroRepeatThreshold);
        }
        if self.window_seconds <= 0.0 {
            return Err(DetectionConfigError::NonPositiveWindow(self.window_seconds));
        }
        if self.history_capacity < self.repeat_threshold {
            return Err(DetectionConfigError::CapacityBelowThreshold {
                capacity: self.history_capacity,
                threshold: self.repeat_threshold,
            });
        }
        Ok(())
    }

    /// Resolve the configured action kind into a concrete [`FloodAction`].
    pub fn resolved_action(&self) -> FloodAction {
        match self.action {
            ActionKind::Ban => FloodAction::Ban,
            ActionKind::Timeout => FloodAction::Timeout {
                duration: Duration::from_secs(self.timeout_duration_secs),
            },
            ActionKind::FlagOnly => FloodAction::FlagOnly,
        }
    }
}

// Discord layer - commands and event handlers.

#[path = "antispam/mod.rs"]
pub mod antispam;

use crate::core::antispam::RepeatMessageDetector;
use std::sync::Arc;
use std::time::Instant;

/// Type alias for our bot's error type, shared by every command.
pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;

/// Data that's shared across all commands and event handlers.
pub struct Data {
    pub detector: Arc<RepeatMessageDetector>,
    /// Process clock origin. Message timestamps handed to the detector are
    /// seconds elapsed since this instant, so they are monotonic and never
    /// affected by wall-clock adjustments.
    pub started_at: Instant,
}

impl Data {
    /// Seconds elapsed since process start, the detector's time base.
    pub fn now_seconds(&self) -> f64 {
        self.started_at.elapsed().as_secs_f64()
    }
}

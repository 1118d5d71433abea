// Repeated-message detector - core business logic for flood detection.
//
// This detector handles:
// - Per-author rolling message history (capacity + time window)
// - Fuzzy similarity counting across the whole window
// - Cooldown gating so one flood produces one action
// - Per-guild enable/disable (lazy default-on, in-memory only)
//
// NO Discord dependencies here - just pure domain logic. The detector
// performs no I/O, never blocks and cannot fail: `observe` is a total
// function over its inputs and internal rolling state. Enforcement and
// exemption policy belong to the caller.

use super::antispam_models::{DetectionConfig, DetectionOutcome, FloodTrigger};
use dashmap::DashMap;
use std::collections::VecDeque;

/// Maximum characters of matched text carried in a trigger outcome.
const MATCHED_TEXT_MAX_CHARS: usize = 256;

/// A composite key for per-author state.
/// We need both guild_id AND user_id since users can be in multiple guilds.
#[derive(Hash, Eq, PartialEq, Clone, Copy, Debug)]
struct AuthorKey {
    guild_id: u64,
    user_id: u64,
}

/// Detects authors flooding near-duplicate content.
///
/// All state is in-memory and sharded per `(guild, user)` key via DashMap,
/// so observations for different authors never contend. The gateway
/// delivers a single author's messages serially, which preserves the
/// non-decreasing timestamp order of each buffer.
pub struct RepeatMessageDetector {
    config: DetectionConfig,
    /// Maps (guild_id, user_id) -> rolling (timestamp, text) history
    buffers: DashMap<AuthorKey, VecDeque<(f64, String)>>,
    /// Maps (guild_id, user_id) -> timestamp after which the author may
    /// trigger an action again
    cooldowns: DashMap<AuthorKey, f64>,
    /// Per-guild enable flag. Populated lazily on first observed message;
    /// intentionally never persisted (restart re-derives the default).
    enabled_guilds: DashMap<u64, bool>,
}

impl RepeatMessageDetector {
    /// Create a detector from a validated configuration.
    pub fn new(config: DetectionConfig) -> Self {
        Self {
            config,
            buffers: DashMap::new(),
            cooldowns: DashMap::new(),
            enabled_guilds: DashMap::new(),
        }
    }

    /// The configuration this detector was built with.
    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    /// Whether detection is active for a guild right now.
    pub fn is_enabled(&self, guild_id: u64) -> bool {
        self.enabled_guilds
            .get(&guild_id)
            .map(|entry| *entry)
            .unwrap_or(self.config.enabled_by_default)
    }

    /// Toggle detection for a guild. Held in memory for the process
    /// lifetime only.
    pub fn set_enabled(&self, guild_id: u64, enabled: bool) {
        self.enabled_guilds.insert(guild_id, enabled);
    }

    /// Observe one inbound message and decide whether the author is
    /// flooding.
    ///
    /// The caller supplies the exemption verdict and the timestamp
    /// (monotonic-ish seconds), which keeps the detector testable without
    /// real time. Empty or whitespace-only text is ignored outright.
    ///
    /// A trigger outcome carries the configured action but does NOT apply
    /// it - enforcement needs platform permission calls that live in the
    /// Discord layer.
    pub fn observe(
        &self,
        guild_id: u64,
        user_id: u64,
        channel_id: u64,
        is_exempt: bool,
        timestamp: f64,
        text: &str,
    ) -> DetectionOutcome {
        // Lazy default-on: the first message seen for a guild decides its
        // initial enabled state unless an admin toggled it already.
        let enabled = *self
            .enabled_guilds
            .entry(guild_id)
            .or_insert(self.config.enabled_by_default);
        if !enabled || is_exempt {
            return DetectionOutcome::NoAction;
        }

        if text.trim().is_empty() {
            return DetectionOutcome::NoAction;
        }

        let key = AuthorKey { guild_id, user_id };
        let similar_count = {
            let mut buffer = self
                .buffers
                .entry(key)
                .or_insert_with(|| VecDeque::with_capacity(self.config.history_capacity));

            // Capacity cap first (bounds memory regardless of message rate),
            // then window pruning (governs detection semantics). These are
            // independent eviction mechanisms.
            if buffer.len() >= self.config.history_capacity {
                buffer.pop_front();
            }
            buffer.push_back((timestamp, text.to_string()));

            while let Some((oldest, _)) = buffer.front() {
                if timestamp - oldest > self.config.window_seconds {
                    buffer.pop_front();
                } else {
                    break;
                }
            }

            // Compare against every buffered message (including the current
            // one), not just the previous: this catches A,B,A,B,A patterns
            // at the cost of O(window) comparisons.
            buffer
                .iter()
                .filter(|(_, buffered)| {
                    strsim::normalized_levenshtein(buffered, text)
                        >= self.config.similarity_threshold
                })
                .count()
        };

        if similar_count < self.config.repeat_threshold {
            return DetectionOutcome::NoAction;
        }

        // One outstanding cooldown slot per author: a second burst within
        // the window is fully suppressed, log side effects included.
        let mut unlock_at = self.cooldowns.entry(key).or_insert(f64::NEG_INFINITY);
        if *unlock_at > timestamp {
            return DetectionOutcome::NoAction;
        }
        *unlock_at = timestamp + self.config.action_cooldown_seconds;

        DetectionOutcome::Trigger(FloodTrigger {
            action: self.config.resolved_action(),
            channel_id,
            matched_text: truncate_for_display(text),
            similar_count,
            window_seconds: self.config.window_seconds,
            repeat_threshold: self.config.repeat_threshold,
            similarity_threshold: self.config.similarity_threshold,
        })
    }
}

/// Truncate text to a display-safe length, on a char boundary, with an
/// ellipsis marker when anything was cut.
fn truncate_for_display(text: &str) -> String {
    let mut chars = text.chars();
    let mut truncated: String = chars.by_ref().take(MATCHED_TEXT_MAX_CHARS).collect();
    if chars.next().is_some() {
        truncated.push('…');
    }
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::antispam::{ActionKind, FloodAction};

    const GUILD: u64 = 100;
    const USER: u64 = 200;
    const CHANNEL: u64 = 300;

    fn detector(config: DetectionConfig) -> RepeatMessageDetector {
        config.validate().unwrap();
        RepeatMessageDetector::new(config)
    }

    fn observe(
        d: &RepeatMessageDetector,
        timestamp: f64,
        text: &str,
    ) -> DetectionOutcome {
        d.observe(GUILD, USER, CHANNEL, false, timestamp, text)
    }

    #[test]
    fn below_threshold_never_triggers() {
        let d = detector(DetectionConfig::default());

        // Four identical messages - one short of the default threshold of 5.
        for t in 0..4 {
            let outcome = observe(&d, t as f64, "hello world");
            assert_eq!(outcome, DetectionOutcome::NoAction, "message at t={}", t);
        }
    }

    #[test]
    fn threshold_message_triggers_exactly_once() {
        // The scenario from the defaults: window 15s, threshold 5,
        // similarity 0.92, cooldown 30s.
        let d = detector(DetectionConfig::default());

        for t in 0..4 {
            assert_eq!(observe(&d, t as f64, "hello world"), DetectionOutcome::NoAction);
        }

        // Fifth identical message trips the detector.
        let outcome = observe(&d, 4.0, "hello world");
        let trigger = match outcome {
            DetectionOutcome::Trigger(t) => t,
            DetectionOutcome::NoAction => panic!("fifth message should trigger"),
        };
        assert_eq!(trigger.similar_count, 5);
        assert_eq!(trigger.matched_text, "hello world");
        assert_eq!(trigger.channel_id, CHANNEL);
        assert_eq!(trigger.window_seconds, 15.0);
        assert_eq!(trigger.repeat_threshold, 5);
        assert_eq!(trigger.action, FloodAction::Ban);

        // Flood continues: cooldown (until t=34) suppresses everything.
        assert_eq!(observe(&d, 5.0, "hello world"), DetectionOutcome::NoAction);
        assert_eq!(observe(&d, 10.0, "hello world"), DetectionOutcome::NoAction);

        // At t=31 the cooldown has lapsed but every earlier qualifying
        // entry has also aged out of the 15s window, so counting restarts.
        assert_eq!(observe(&d, 31.0, "hello world"), DetectionOutcome::NoAction);
    }

    #[test]
    fn qualifying_burst_after_cooldown_triggers_again() {
        let config = DetectionConfig {
            window_seconds: 60.0,
            repeat_threshold: 5,
            action_cooldown_seconds: 2.0,
            ..Default::default()
        };
        let d = detector(config);

        for t in 0..4 {
            assert!(!observe(&d, t as f64, "spam spam spam").is_trigger());
        }
        assert!(observe(&d, 4.0, "spam spam spam").is_trigger());

        // Inside the 2s cooldown: suppressed even though the count holds.
        assert!(!observe(&d, 5.0, "spam spam spam").is_trigger());

        // Cooldown expired at t=6, window still holds the burst.
        assert!(observe(&d, 7.0, "spam spam spam").is_trigger());
    }

    #[test]
    fn messages_outside_window_do_not_count() {
        let d = detector(DetectionConfig::default());

        // Four identical messages at t=0..3, then four more after the
        // first group has aged past the 15s window.
        for t in 0..4 {
            assert!(!observe(&d, t as f64, "old news").is_trigger());
        }
        for t in 20..24 {
            assert!(
                !observe(&d, t as f64, "old news").is_trigger(),
                "stale entries must not count at t={}",
                t
            );
        }

        // Fifth message of the fresh group completes the count.
        assert!(observe(&d, 24.0, "old news").is_trigger());
    }

    #[test]
    fn capacity_evicts_oldest_regardless_of_window() {
        let config = DetectionConfig {
            window_seconds: 1_000.0,
            repeat_threshold: 4,
            history_capacity: 4,
            ..Default::default()
        };
        let d = detector(config);

        // One "spam", then four fillers push it out of the capped buffer.
        assert!(!observe(&d, 0.0, "spam").is_trigger());
        for (i, filler) in ["alpha", "bravo", "charlie", "delta"].iter().enumerate() {
            assert!(!observe(&d, 1.0 + i as f64, filler).is_trigger());
        }

        // The early "spam" is gone, so the count rebuilds from scratch.
        assert!(!observe(&d, 5.0, "spam").is_trigger());
        assert!(!observe(&d, 6.0, "spam").is_trigger());
        assert!(!observe(&d, 7.0, "spam").is_trigger());

        // Fourth consecutive "spam" fills the whole buffer and triggers.
        assert!(observe(&d, 8.0, "spam").is_trigger());
    }

    #[test]
    fn exempt_messages_are_never_recorded() {
        let d = detector(DetectionConfig::default());

        // A pile of identical exempt messages: nothing recorded, no action.
        for t in 0..10 {
            let outcome = d.observe(GUILD, USER, CHANNEL, true, t as f64, "hello world");
            assert_eq!(outcome, DetectionOutcome::NoAction);
        }

        // If the exempt messages had been buffered, the very first
        // non-exempt duplicate would trigger. It must not.
        for t in 10..14 {
            assert!(!observe(&d, t as f64, "hello world").is_trigger());
        }
        assert!(observe(&d, 14.0, "hello world").is_trigger());
    }

    #[test]
    fn empty_and_whitespace_text_is_ignored() {
        let d = detector(DetectionConfig::default());

        for t in 0..10 {
            assert_eq!(observe(&d, t as f64, ""), DetectionOutcome::NoAction);
        }
        for t in 10..20 {
            assert_eq!(observe(&d, t as f64, "  \n\t "), DetectionOutcome::NoAction);
        }
    }

    #[test]
    fn disabled_guild_records_nothing() {
        let d = detector(DetectionConfig::default());
        d.set_enabled(GUILD, false);

        for t in 0..10 {
            assert_eq!(observe(&d, t as f64, "hello world"), DetectionOutcome::NoAction);
        }

        // Re-enable: history is empty, counting starts from one.
        d.set_enabled(GUILD, true);
        for t in 10..14 {
            assert!(!observe(&d, t as f64, "hello world").is_trigger());
        }
        assert!(observe(&d, 14.0, "hello world").is_trigger());
    }

    #[test]
    fn lazy_default_enable_policy() {
        let d = detector(DetectionConfig::default());
        assert!(d.is_enabled(GUILD));

        let opt_in = detector(DetectionConfig {
            enabled_by_default: false,
            ..Default::default()
        });
        assert!(!opt_in.is_enabled(GUILD));

        // With default-off, flooding does nothing until an admin opts in.
        for t in 0..10 {
            assert_eq!(
                opt_in.observe(GUILD, USER, CHANNEL, false, t as f64, "hello world"),
                DetectionOutcome::NoAction
            );
        }
        opt_in.set_enabled(GUILD, true);
        assert!(opt_in.is_enabled(GUILD));
    }

    #[test]
    fn toggle_survives_further_messages() {
        // The lazy default must not overwrite an explicit opt-out.
        let d = detector(DetectionConfig::default());
        d.set_enabled(GUILD, false);

        for t in 0..20 {
            assert_eq!(observe(&d, t as f64, "hello world"), DetectionOutcome::NoAction);
        }
        assert!(!d.is_enabled(GUILD));
    }

    #[test]
    fn alternating_pattern_is_detected() {
        let config = DetectionConfig {
            repeat_threshold: 3,
            ..Default::default()
        };
        let d = detector(config);

        // A,B,A,B,A - similarity runs against the whole buffer, so the
        // third A counts all three A's despite the interleaved B's.
        assert!(!observe(&d, 0.0, "buy my coins").is_trigger());
        assert!(!observe(&d, 1.0, "unrelated chatter").is_trigger());
        assert!(!observe(&d, 2.0, "buy my coins").is_trigger());
        assert!(!observe(&d, 3.0, "unrelated chatter").is_trigger());
        assert!(observe(&d, 4.0, "buy my coins").is_trigger());
    }

    #[test]
    fn near_duplicates_count_as_similar() {
        let config = DetectionConfig {
            repeat_threshold: 3,
            ..Default::default()
        };
        let d = detector(config);

        // One trailing character of difference across 13 chars keeps the
        // normalized ratio above the 0.92 threshold.
        assert!(!observe(&d, 0.0, "hello world!!").is_trigger());
        assert!(!observe(&d, 1.0, "hello world!!").is_trigger());
        assert!(observe(&d, 2.0, "hello world!.").is_trigger());
    }

    #[test]
    fn dissimilar_messages_never_trigger() {
        let d = detector(DetectionConfig::default());

        let lines = [
            "good morning everyone",
            "anyone up for a raid tonight?",
            "the market reset an hour ago",
            "brb grabbing coffee",
            "patch notes look wild",
            "who broke the test server again",
        ];
        for (t, line) in lines.iter().enumerate() {
            assert_eq!(observe(&d, t as f64, line), DetectionOutcome::NoAction);
        }
    }

    #[test]
    fn matched_text_is_truncated_on_char_boundaries() {
        let config = DetectionConfig {
            repeat_threshold: 1,
            ..Default::default()
        };
        let d = detector(config);

        // Multi-byte chars: naive byte truncation would panic or split.
        let long = "é".repeat(300);
        let trigger = match observe(&d, 0.0, &long) {
            DetectionOutcome::Trigger(t) => t,
            DetectionOutcome::NoAction => panic!("threshold 1 should trigger immediately"),
        };
        assert_eq!(trigger.matched_text.chars().count(), 257);
        assert!(trigger.matched_text.ends_with('…'));

        // Short text passes through untouched.
        let short = match d.observe(GUILD, USER + 1, CHANNEL, false, 0.0, "short") {
            DetectionOutcome::Trigger(t) => t,
            DetectionOutcome::NoAction => panic!("threshold 1 should trigger immediately"),
        };
        assert_eq!(short.matched_text, "short");
    }

    #[test]
    fn authors_and_guilds_are_independent() {
        let d = detector(DetectionConfig::default());

        // Two authors and a second guild interleave the same text; no
        // single key ever reaches the threshold.
        for t in 0..4 {
            assert!(!d
                .observe(GUILD, USER, CHANNEL, false, t as f64, "hello world")
                .is_trigger());
            assert!(!d
                .observe(GUILD, USER + 1, CHANNEL, false, t as f64, "hello world")
                .is_trigger());
            assert!(!d
                .observe(GUILD + 1, USER, CHANNEL, false, t as f64, "hello world")
                .is_trigger());
        }

        // Each key triggers on its own fifth message.
        assert!(d
            .observe(GUILD, USER, CHANNEL, false, 4.0, "hello world")
            .is_trigger());
        assert!(d
            .observe(GUILD, USER + 1, CHANNEL, false, 4.0, "hello world")
            .is_trigger());
        assert!(d
            .observe(GUILD + 1, USER, CHANNEL, false, 4.0, "hello world")
            .is_trigger());
    }

    #[test]
    fn timeout_config_flows_into_trigger() {
        let config = DetectionConfig {
            action: ActionKind::Timeout,
            timeout_duration_secs: 900,
            repeat_threshold: 2,
            ..Default::default()
        };
        let d = detector(config);

        assert!(!observe(&d, 0.0, "repeat me").is_trigger());
        let trigger = match observe(&d, 1.0, "repeat me") {
            DetectionOutcome::Trigger(t) => t,
            DetectionOutcome::NoAction => panic!("second message should trigger"),
        };
        assert_eq!(
            trigger.action,
            FloodAction::Timeout {
                duration: std::time::Duration::from_secs(900)
            }
        );
    }
}

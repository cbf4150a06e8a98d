use rand::Rng;
use serde::Serialize;

use funnel_core::config::SocialProofConfig;

/// Countdown below which the badge is flagged urgent.
const URGENT_MS: u64 = 60_000;

/// "N claimed in the last hour" badge shown on the unlock modal, with an
/// offer-window countdown.
#[derive(Debug, Clone)]
pub struct SocialProofBadge {
    count: u32,
    window_ms: u64,
    auto_reset: bool,
    ends_at_ms: u64,
    stopped: bool,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BadgeView {
    pub count: u32,
    pub remaining_ms: u64,
    /// `mm:ss`
    pub clock: String,
    pub urgent: bool,
    /// True on the poll where the window ran out.
    pub expired_now: bool,
}

impl SocialProofBadge {
    pub fn new<R: Rng + ?Sized>(config: &SocialProofConfig, rng: &mut R, now_ms: u64) -> Self {
        let lo = config.min.min(config.max);
        let hi = config.min.max(config.max);
        let count = rng.gen_range(lo..=hi).clamp(lo, hi);

        Self {
            count,
            window_ms: config.window_ms,
            auto_reset: config.auto_reset,
            ends_at_ms: now_ms + config.window_ms,
            stopped: false,
            label: "claimed in the last hour".to_string(),
        }
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn remaining_ms(&self, now_ms: u64) -> u64 {
        if self.stopped {
            return 0;
        }
        self.ends_at_ms.saturating_sub(now_ms)
    }

    /// Samples the countdown. When the window runs out it either restarts
    /// (`auto_reset`) or stops at zero for good.
    pub fn poll(&mut self, now_ms: u64) -> BadgeView {
        let mut remaining = self.remaining_ms(now_ms);
        let mut expired_now = false;

        if remaining == 0 && !self.stopped {
            expired_now = true;
            if self.auto_reset {
                self.ends_at_ms = now_ms + self.window_ms;
                remaining = self.window_ms;
            } else {
                self.stopped = true;
            }
        }

        BadgeView {
            count: self.count,
            remaining_ms: remaining,
            clock: format_clock(remaining),
            urgent: remaining <= URGENT_MS,
            expired_now,
        }
    }
}

fn format_clock(ms: u64) -> String {
    format!("{:02}:{:02}", ms / 60_000, (ms % 60_000) / 1000)
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    fn config(auto_reset: bool) -> SocialProofConfig {
        SocialProofConfig {
            min: 200,
            max: 450,
            window_ms: 15 * 60_000,
            auto_reset,
        }
    }

    #[test]
    fn test_count_within_bounds() {
        for seed in 0..50 {
            let badge = SocialProofBadge::new(&config(false), &mut StdRng::seed_from_u64(seed), 0);
            assert!((200..=450).contains(&badge.count()));
        }
    }

    #[test]
    fn test_reversed_bounds() {
        let cfg = SocialProofConfig {
            min: 400,
            max: 100,
            ..config(false)
        };
        let badge = SocialProofBadge::new(&cfg, &mut StdRng::seed_from_u64(1), 0);
        assert!((100..=400).contains(&badge.count()));
    }

    #[test]
    fn test_countdown_and_urgency() {
        let mut badge = SocialProofBadge::new(&config(false), &mut StdRng::seed_from_u64(3), 1000);

        let view = badge.poll(1000);
        assert_eq!(view.clock, "15:00");
        assert!(!view.urgent);

        let view = badge.poll(1000 + 14 * 60_000 + 1000);
        assert_eq!(view.clock, "00:59");
        assert!(view.urgent);
        assert!(!view.expired_now);
    }

    #[test]
    fn test_expiry_stops_without_reset() {
        let mut badge = SocialProofBadge::new(&config(false), &mut StdRng::seed_from_u64(3), 0);
        let view = badge.poll(15 * 60_000);
        assert!(view.expired_now);
        assert_eq!(view.clock, "00:00");

        let view = badge.poll(20 * 60_000);
        assert!(!view.expired_now);
        assert_eq!(view.remaining_ms, 0);
    }

    #[test]
    fn test_expiry_restarts_with_reset() {
        let mut badge = SocialProofBadge::new(&config(true), &mut StdRng::seed_from_u64(3), 0);
        let view = badge.poll(15 * 60_000);
        assert!(view.expired_now);
        assert_eq!(view.clock, "15:00");

        let view = badge.poll(16 * 60_000);
        assert_eq!(view.clock, "14:00");
    }
}

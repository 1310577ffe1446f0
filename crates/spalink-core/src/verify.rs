// ── Verification policy ──
//
// Classifies every (property, desired value) pair into one of two
// closed timing profiles. This is the single place per-mode timing
// quirks live; the executor never special-cases individual modes.
//
// DYNAMIC exists because animation modes keep mutating their reported
// fields: polling too soon reads the previous state, polling the
// intensity at all reads mid-cycle garbage. The dynamic profile waits
// longer before the first poll, spaces retries wider, and compares
// only the categorical mode.

use std::time::Duration;

use crate::model::{PropertyKey, PropertyValue, Volatility};

/// Timing budget for one send-and-verify cycle.
///
/// Immutable and derived purely from classification -- never
/// per-instance state. Total verification ceiling is
/// `initial_wait + max_retries * retry_interval`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerificationProfile {
    pub volatility: Volatility,
    /// Wait after the write before the first poll.
    pub initial_wait: Duration,
    /// Additional polls after the first before giving up.
    pub max_retries: u32,
    /// Wait between polls.
    pub retry_interval: Duration,
}

impl VerificationProfile {
    /// Upper bound on time spent waiting within one cycle.
    pub fn ceiling(&self) -> Duration {
        self.initial_wait + self.retry_interval * self.max_retries
    }
}

/// Discrete, instantly-settling properties. The cloud propagates a
/// settled write within a few seconds.
pub const STATIC_PROFILE: VerificationProfile = VerificationProfile {
    volatility: Volatility::Static,
    initial_wait: Duration::from_secs(5),
    max_retries: 3,
    retry_interval: Duration::from_secs(2),
};

/// Animation modes. The cloud is much slower to reflect these, and
/// under-sampling an oscillating readback produces false mismatches.
pub const DYNAMIC_PROFILE: VerificationProfile = VerificationProfile {
    volatility: Volatility::Dynamic,
    initial_wait: Duration::from_secs(20),
    max_retries: 3,
    retry_interval: Duration::from_secs(5),
};

/// Classify a pending write into its timing profile.
pub fn classify(key: &PropertyKey, desired: &PropertyValue) -> VerificationProfile {
    match (key, desired) {
        (PropertyKey::LightSetting { .. }, PropertyValue::Light(setting)) => {
            match setting.mode.volatility() {
                Volatility::Static => STATIC_PROFILE,
                Volatility::Dynamic => DYNAMIC_PROFILE,
            }
        }
        // Color patches land on an already-animating zone.
        (PropertyKey::LightColor { .. }, _) => DYNAMIC_PROFILE,
        _ => STATIC_PROFILE,
    }
}

/// Temperature readback jitters by rounding; treat within half a degree
/// as equal.
const TEMPERATURE_TOLERANCE: f64 = 0.5;

/// Channel rounding slack for color readback.
const COLOR_TOLERANCE: u8 = 5;

/// Does an observed value satisfy the desired one, at the comparison
/// depth the volatility class allows?
pub fn matches(desired: &PropertyValue, observed: &PropertyValue, volatility: Volatility) -> bool {
    match (desired, observed) {
        (PropertyValue::Light(want), PropertyValue::Light(got)) => match volatility {
            // Full comparison: categorical mode and numeric intensity.
            Volatility::Static => want.mode == got.mode && want.intensity == got.intensity,
            // Mode only -- intensity oscillates during animation.
            Volatility::Dynamic => want.mode == got.mode,
        },
        (PropertyValue::Color(want), PropertyValue::Color(got)) => {
            want.approx_eq(got, COLOR_TOLERANCE)
        }
        (PropertyValue::Temperature(want), PropertyValue::Temperature(got)) => {
            (want - got).abs() < TEMPERATURE_TOLERANCE
        }
        (want, got) => want == got,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ColorRgb, LightMode, LightSetting};

    #[test]
    fn static_mode_gets_static_profile() {
        let profile = classify(
            &PropertyKey::LightSetting { zone: 1 },
            &PropertyValue::Light(LightSetting::new(LightMode::Red, 50)),
        );
        assert_eq!(profile, STATIC_PROFILE);
    }

    #[test]
    fn animation_mode_gets_dynamic_profile() {
        let profile = classify(
            &PropertyKey::LightSetting { zone: 1 },
            &PropertyValue::Light(LightSetting::new(LightMode::ColorWheel, 50)),
        );
        assert_eq!(profile, DYNAMIC_PROFILE);
    }

    #[test]
    fn dynamic_ceiling_strictly_exceeds_static() {
        assert!(DYNAMIC_PROFILE.ceiling() > STATIC_PROFILE.ceiling());
    }

    #[test]
    fn static_comparison_checks_both_fields() {
        // RED @ 50 requested, gateway reports intensity 0 -> mismatch.
        let want = PropertyValue::Light(LightSetting::new(LightMode::Red, 50));
        let got = PropertyValue::Light(LightSetting::new(LightMode::Red, 0));
        assert!(!matches(&want, &got, Volatility::Static));

        let got = PropertyValue::Light(LightSetting::new(LightMode::Red, 50));
        assert!(matches(&want, &got, Volatility::Static));
    }

    #[test]
    fn dynamic_comparison_ignores_intensity() {
        // COLOR_WHEEL requested, gateway reports intensity 0 -> match,
        // the zero is animation noise.
        let want = PropertyValue::Light(LightSetting::new(LightMode::ColorWheel, 50));
        let got = PropertyValue::Light(LightSetting::new(LightMode::ColorWheel, 0));
        assert!(matches(&want, &got, Volatility::Dynamic));

        let got = PropertyValue::Light(LightSetting::new(LightMode::Blue, 0));
        assert!(!matches(&want, &got, Volatility::Dynamic));
    }

    #[test]
    fn temperature_compares_with_tolerance() {
        let want = PropertyValue::Temperature(38.0);
        assert!(matches(
            &want,
            &PropertyValue::Temperature(38.4),
            Volatility::Static
        ));
        assert!(!matches(
            &want,
            &PropertyValue::Temperature(38.6),
            Volatility::Static
        ));
    }

    #[test]
    fn color_compares_with_channel_slack() {
        let want = PropertyValue::Color(ColorRgb::new(255, 0, 0));
        let got = PropertyValue::Color(ColorRgb::new(251, 4, 0));
        assert!(matches(&want, &got, Volatility::Dynamic));
    }
}

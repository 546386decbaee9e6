use serde::Serialize;
use thiserror::Error;

const MIN_PERCENT: u8 = 0;
const MAX_PERCENT: u8 = 100;

const SPEED_PERCENT_PER_STEP: f64 = 14.2857;
const LEVEL_PERCENT_PER_STEP: f64 = 6.25;
const HUE_MIN_KELVIN: f64 = 2200.0;
const HUE_KELVIN_PER_PERCENT: f64 = 28.0;

/// Errors returned by percent validation.
#[derive(Debug, Error, Clone, Copy, Eq, PartialEq)]
pub enum PercentError {
    /// The percent value was outside the accepted range.
    #[error("percent {value} is out of range ({min}..={max})")]
    OutOfRange { value: i64, min: u8, max: u8 },
}

/// Validated percentage in the inclusive range `0..=100`.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize)]
#[serde(transparent)]
pub struct Percent(u8);

impl Percent {
    /// Fully off.
    pub const MIN: Self = Self(MIN_PERCENT);
    /// Fully on.
    pub const MAX: Self = Self(MAX_PERCENT);

    /// Creates a validated percentage.
    ///
    /// # Errors
    ///
    /// Returns an error when `value` is outside `0..=100`.
    ///
    /// ```
    /// use baf::Percent;
    ///
    /// let value = Percent::new(42)?;
    /// assert_eq!(42, value.value());
    /// # Ok::<(), baf::PercentError>(())
    /// ```
    pub fn new(value: i64) -> Result<Self, PercentError> {
        u8::try_from(value)
            .ok()
            .filter(|value| (MIN_PERCENT..=MAX_PERCENT).contains(value))
            .map(Self)
            .ok_or(PercentError::OutOfRange {
                value,
                min: MIN_PERCENT,
                max: MAX_PERCENT,
            })
    }

    /// Creates a percentage, saturating into `0..=100`.
    #[must_use]
    pub fn saturating(value: f64) -> Self {
        let clamped = value.round().clamp(f64::from(MIN_PERCENT), f64::from(MAX_PERCENT));
        // Clamped above, so the cast cannot truncate.
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let value = clamped as u8;
        Self(value)
    }

    /// Returns the underlying percentage.
    #[must_use]
    pub fn value(self) -> u8 {
        self.0
    }
}

impl std::fmt::Display for Percent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}%", self.0)
    }
}

/// Native value range used by the fan for a scaled channel.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum NativeScale {
    /// Fan speed steps `0..=7`.
    Speed,
    /// Light level steps `0..=16`.
    Level,
    /// Colour temperature in kelvin, `2200..=5000`.
    Hue,
}

impl NativeScale {
    /// Converts a native fan value to a percentage.
    ///
    /// Results outside `0..=100` saturate.
    ///
    /// ```
    /// use baf::NativeScale;
    ///
    /// assert_eq!(100, NativeScale::Speed.to_percent(7).value());
    /// assert_eq!(50, NativeScale::Level.to_percent(8).value());
    /// assert_eq!(0, NativeScale::Hue.to_percent(2200).value());
    /// ```
    #[must_use]
    pub fn to_percent(self, native: i64) -> Percent {
        #[allow(clippy::cast_precision_loss)]
        let native = native as f64;
        let percent = match self {
            Self::Speed => native * SPEED_PERCENT_PER_STEP,
            Self::Level => native * LEVEL_PERCENT_PER_STEP,
            Self::Hue => (native - HUE_MIN_KELVIN) / HUE_KELVIN_PER_PERCENT,
        };
        Percent::saturating(percent)
    }

    /// Converts a percentage to the fan's native value.
    ///
    /// ```
    /// use baf::{NativeScale, Percent};
    ///
    /// let half = Percent::new(50)?;
    /// assert_eq!(4, NativeScale::Speed.to_native(half));
    /// assert_eq!(3600, NativeScale::Hue.to_native(half));
    /// # Ok::<(), baf::PercentError>(())
    /// ```
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn to_native(self, percent: Percent) -> i64 {
        let percent = f64::from(percent.value());
        let native = match self {
            Self::Speed => percent / SPEED_PERCENT_PER_STEP,
            Self::Level => percent / LEVEL_PERCENT_PER_STEP,
            Self::Hue => percent * HUE_KELVIN_PER_PERCENT + HUE_MIN_KELVIN,
        };
        native.round() as i64
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(0)]
    #[case(50)]
    #[case(100)]
    fn percent_accepts_range(#[case] value: i64) {
        let percent = Percent::new(value).expect("valid percent should construct");
        assert_eq!(value, i64::from(percent.value()));
    }

    #[rstest]
    #[case(-1)]
    #[case(101)]
    #[case(1000)]
    fn percent_rejects_out_of_range(#[case] value: i64) {
        assert_matches!(
            Percent::new(value),
            Err(PercentError::OutOfRange { value: rejected, .. }) if rejected == value
        );
    }

    #[rstest]
    #[case(NativeScale::Speed, 0, 0)]
    #[case(NativeScale::Speed, 1, 14)]
    #[case(NativeScale::Speed, 3, 43)]
    #[case(NativeScale::Speed, 7, 100)]
    #[case(NativeScale::Level, 1, 6)]
    #[case(NativeScale::Level, 16, 100)]
    #[case(NativeScale::Hue, 2200, 0)]
    #[case(NativeScale::Hue, 2700, 18)]
    #[case(NativeScale::Hue, 5000, 100)]
    fn native_values_scale_to_percent(
        #[case] scale: NativeScale,
        #[case] native: i64,
        #[case] expected: u8,
    ) {
        assert_eq!(expected, scale.to_percent(native).value());
    }

    #[rstest]
    #[case(NativeScale::Speed, 100, 7)]
    #[case(NativeScale::Speed, 14, 1)]
    #[case(NativeScale::Speed, 0, 0)]
    #[case(NativeScale::Level, 100, 16)]
    #[case(NativeScale::Level, 25, 4)]
    #[case(NativeScale::Hue, 100, 5000)]
    #[case(NativeScale::Hue, 0, 2200)]
    fn percent_scales_to_native(
        #[case] scale: NativeScale,
        #[case] percent: i64,
        #[case] expected: i64,
    ) {
        let percent = Percent::new(percent).expect("test percent should be valid");
        assert_eq!(expected, scale.to_native(percent));
    }

    #[rstest]
    #[case(NativeScale::Speed, 7)]
    #[case(NativeScale::Level, 16)]
    fn every_native_step_survives_a_percent_round_trip(
        #[case] scale: NativeScale,
        #[case] max_native: i64,
    ) {
        for native in 0..=max_native {
            assert_eq!(native, scale.to_native(scale.to_percent(native)), "native {native}");
        }
    }

    #[rstest]
    #[case(NativeScale::Speed, 8)]
    #[case(NativeScale::Level, 40)]
    #[case(NativeScale::Hue, 9000)]
    fn out_of_range_native_values_saturate_high(#[case] scale: NativeScale, #[case] native: i64) {
        assert_eq!(Percent::MAX, scale.to_percent(native));
    }

    #[rstest]
    #[case(NativeScale::Speed, -3)]
    #[case(NativeScale::Hue, 1000)]
    fn out_of_range_native_values_saturate_low(#[case] scale: NativeScale, #[case] native: i64) {
        assert_eq!(Percent::MIN, scale.to_percent(native));
    }
}

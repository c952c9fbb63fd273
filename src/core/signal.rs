//! Signal strength to meter level conversion
//! Purely a display aid: ranking always uses the raw dBm value.

use crate::core::bluetooth::constants::{SIGNAL_BARS, SIGNAL_STRONG_DBM, SIGNAL_WEAK_DBM};

const FULL_BAR: char = '◉';
const EMPTY_BAR: char = '○';

/// Maps an RSSI in dBm onto a level in `0..=5` (0 = weakest).
///
/// The input is clamped to [-100, -60] and mapped linearly onto five equal
/// buckets, rounding to the nearest level with ties going to the even level.
pub fn classify(rssi: i16) -> u8 {
    let clamped = rssi.clamp(SIGNAL_WEAK_DBM, SIGNAL_STRONG_DBM);
    let span = f64::from(SIGNAL_STRONG_DBM - SIGNAL_WEAK_DBM);
    // Scale before dividing so bucket midpoints stay exact.
    let scaled = f64::from((clamped - SIGNAL_WEAK_DBM) * i16::from(SIGNAL_BARS));
    (scaled / span).round_ties_even() as u8
}

/// Renders a level as a five-glyph meter, e.g. `◉◉◉○○`.
pub fn bars(level: u8) -> String {
    let filled = level.min(SIGNAL_BARS) as usize;
    let mut meter = String::with_capacity(SIGNAL_BARS as usize * FULL_BAR.len_utf8());
    meter.extend(std::iter::repeat_n(FULL_BAR, filled));
    meter.extend(std::iter::repeat_n(EMPTY_BAR, SIGNAL_BARS as usize - filled));
    meter
}

/// Meter plus raw value, e.g. `◉◉◉○○ -75 dBm`.
pub fn describe(rssi: i16) -> String {
    format!("{} {} dBm", bars(classify(rssi)), rssi)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_are_clamped() {
        assert_eq!(classify(-60), 5);
        assert_eq!(classify(-100), 0);
        assert_eq!(classify(-55), classify(-60));
        assert_eq!(classify(-105), classify(-100));
        assert_eq!(classify(0), 5);
        assert_eq!(classify(i16::MIN), 0);
    }

    #[test]
    fn classify_is_monotonic() {
        let mut previous = classify(-130);
        for rssi in -129..=10 {
            let level = classify(rssi);
            assert!(level >= previous, "level dropped at {rssi} dBm");
            assert!(level <= 5);
            previous = level;
        }
    }

    #[test]
    fn midpoints_round_to_even() {
        // (-80 + 100) / 8 = 2.5
        assert_eq!(classify(-80), 2);
        // (-72 + 100) / 8 = 3.5
        assert_eq!(classify(-72), 4);
        assert_eq!(classify(-76), 3);
    }

    #[test]
    fn meter_rendering() {
        assert_eq!(bars(0), "○○○○○");
        assert_eq!(bars(3), "◉◉◉○○");
        assert_eq!(bars(9), "◉◉◉◉◉");
        assert_eq!(describe(-60), "◉◉◉◉◉ -60 dBm");
    }
}

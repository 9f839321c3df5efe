//! Power and heart-rate zone classification.
//!
//! Power zones follow the Coggan 7-zone model as fractions of FTP; heart-rate
//! zones are the 5-zone model as fractions of max HR.
//!
//! Each zone carries a nominal inclusive range (used for labels and for
//! matching workout targets). Classification of a live reading uses
//! contiguous half-open ranges `[lower, next.lower)` so that every
//! non-negative fraction lands in exactly one zone.

use serde::{Deserialize, Serialize};

/// Separator between the lower and upper bound of a range label
pub const RANGE_SEPARATOR: &str = "–";

/// Shown when a reading is missing
pub const MISSING_VALUE: &str = "—";

/// Common surface of the zone tables
pub trait Zone: Copy + PartialEq {
    /// 1-based zone number
    fn number(&self) -> u8;

    /// Compact name, e.g. `Z3`
    fn short_name(&self) -> String {
        format!("Z{}", self.number())
    }
}

/// Render an ordered zone list as `Z3` or `Z2–Z4`
pub fn zone_span_label<Z: Zone>(zones: &[Z]) -> Option<String> {
    let first = zones.first()?;
    let last = zones.last()?;
    if first == last {
        Some(first.short_name())
    } else {
        Some(format!(
            "{}{}{}",
            first.short_name(),
            RANGE_SEPARATOR,
            last.short_name()
        ))
    }
}

fn rounded_bound(threshold: i32, fraction: f64) -> i32 {
    (f64::from(threshold) * fraction).round() as i32
}

fn range_label(threshold: i32, lower: f64, upper: Option<f64>, unit: &str) -> String {
    let low = rounded_bound(threshold, lower);
    match upper {
        Some(upper) => format!(
            "{}{}{} {}",
            low,
            RANGE_SEPARATOR,
            rounded_bound(threshold, upper),
            unit
        ),
        None => format!("{}+ {}", low, unit),
    }
}

/// Coggan power zones
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PowerZone {
    Recovery,
    Endurance,
    Tempo,
    Threshold,
    Vo2Max,
    Anaerobic,
    Neuromuscular,
}

impl PowerZone {
    pub const ALL: [PowerZone; 7] = [
        PowerZone::Recovery,
        PowerZone::Endurance,
        PowerZone::Tempo,
        PowerZone::Threshold,
        PowerZone::Vo2Max,
        PowerZone::Anaerobic,
        PowerZone::Neuromuscular,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            PowerZone::Recovery => "Recovery",
            PowerZone::Endurance => "Endurance",
            PowerZone::Tempo => "Tempo",
            PowerZone::Threshold => "Threshold",
            PowerZone::Vo2Max => "VO₂ Max",
            PowerZone::Anaerobic => "Anaerobic",
            PowerZone::Neuromuscular => "Neuromuscular",
        }
    }

    /// Nominal range as fraction of FTP; the top zone is unbounded
    pub fn range(&self) -> (f64, Option<f64>) {
        match self {
            PowerZone::Recovery => (0.0, Some(0.55)),
            PowerZone::Endurance => (0.56, Some(0.75)),
            PowerZone::Tempo => (0.76, Some(0.90)),
            PowerZone::Threshold => (0.91, Some(1.05)),
            PowerZone::Vo2Max => (1.06, Some(1.20)),
            PowerZone::Anaerobic => (1.21, Some(1.50)),
            PowerZone::Neuromuscular => (1.51, None),
        }
    }

    fn next(&self) -> Option<PowerZone> {
        Self::ALL.get(self.number() as usize).copied()
    }

    /// Half-open classification range `[lower, next.lower)`
    pub fn contains(&self, fraction: f64) -> bool {
        let (lower, _) = self.range();
        let lower = if *self == PowerZone::Recovery { 0.0 } else { lower };
        match self.next() {
            Some(next) => fraction >= lower && fraction < next.range().0,
            None => fraction >= lower,
        }
    }

    /// Whether the closed target range `[lo, hi]` touches the nominal range
    pub fn overlaps(&self, lo: f64, hi: f64) -> bool {
        let (lower, upper) = self.range();
        hi >= lower && upper.map_or(true, |upper| lo <= upper)
    }

    /// Zone for an absolute power reading, `None` without a reading or a
    /// positive FTP
    pub fn zone_for(watts: Option<i32>, ftp: i32) -> Option<PowerZone> {
        let watts = watts?;
        if ftp <= 0 {
            return None;
        }
        let fraction = (f64::from(watts) / f64::from(ftp)).max(0.0);
        Self::ALL.iter().copied().find(|zone| zone.contains(fraction))
    }

    /// `152–180 W`, or `378+ W` for the unbounded top zone
    pub fn watt_range_label(&self, ftp: i32) -> String {
        let (lower, upper) = self.range();
        range_label(ftp, lower, upper, "W")
    }

    pub fn zone_name_label(watts: Option<i32>, ftp: Option<i32>) -> String {
        if watts.is_none() {
            return MISSING_VALUE.to_string();
        }
        match ftp {
            Some(ftp) if ftp > 0 => Self::zone_for(watts, ftp)
                .map(|zone| zone.short_name())
                .unwrap_or_else(|| MISSING_VALUE.to_string()),
            _ => "Set FTP".to_string(),
        }
    }
}

impl Zone for PowerZone {
    fn number(&self) -> u8 {
        match self {
            PowerZone::Recovery => 1,
            PowerZone::Endurance => 2,
            PowerZone::Tempo => 3,
            PowerZone::Threshold => 4,
            PowerZone::Vo2Max => 5,
            PowerZone::Anaerobic => 6,
            PowerZone::Neuromuscular => 7,
        }
    }
}

/// Five-zone heart rate model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HeartRateZone {
    Zone1,
    Zone2,
    Zone3,
    Zone4,
    Zone5,
}

impl HeartRateZone {
    pub const ALL: [HeartRateZone; 5] = [
        HeartRateZone::Zone1,
        HeartRateZone::Zone2,
        HeartRateZone::Zone3,
        HeartRateZone::Zone4,
        HeartRateZone::Zone5,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            HeartRateZone::Zone1 => "Very Light",
            HeartRateZone::Zone2 => "Light",
            HeartRateZone::Zone3 => "Moderate",
            HeartRateZone::Zone4 => "Hard",
            HeartRateZone::Zone5 => "Maximum",
        }
    }

    /// Nominal range as fraction of max HR
    pub fn range(&self) -> (f64, f64) {
        match self {
            HeartRateZone::Zone1 => (0.50, 0.60),
            HeartRateZone::Zone2 => (0.60, 0.70),
            HeartRateZone::Zone3 => (0.70, 0.80),
            HeartRateZone::Zone4 => (0.80, 0.90),
            HeartRateZone::Zone5 => (0.90, 1.00),
        }
    }

    /// Z1 absorbs everything below its nominal floor and Z5 everything above
    /// max HR.
    pub fn contains(&self, fraction: f64) -> bool {
        let (lower, upper) = self.range();
        match self {
            HeartRateZone::Zone1 => fraction < upper,
            HeartRateZone::Zone5 => fraction >= lower,
            _ => fraction >= lower && fraction < upper,
        }
    }

    pub fn zone_for(bpm: Option<i32>, max_hr: i32) -> Option<HeartRateZone> {
        let bpm = bpm?;
        if max_hr <= 0 {
            return None;
        }
        let fraction = f64::from(bpm) / f64::from(max_hr);
        Self::ALL.iter().copied().find(|zone| zone.contains(fraction))
    }

    /// `126–144 bpm`
    pub fn bpm_range_label(&self, max_hr: i32) -> String {
        let (lower, upper) = self.range();
        range_label(max_hr, lower, Some(upper), "bpm")
    }

    pub fn zone_name_label(bpm: Option<i32>, max_hr: Option<i32>) -> String {
        if bpm.is_none() {
            return MISSING_VALUE.to_string();
        }
        match max_hr {
            Some(max_hr) if max_hr > 0 => Self::zone_for(bpm, max_hr)
                .map(|zone| zone.short_name())
                .unwrap_or_else(|| MISSING_VALUE.to_string()),
            _ => "Set max HR".to_string(),
        }
    }
}

impl Zone for HeartRateZone {
    fn number(&self) -> u8 {
        match self {
            HeartRateZone::Zone1 => 1,
            HeartRateZone::Zone2 => 2,
            HeartRateZone::Zone3 => 3,
            HeartRateZone::Zone4 => 4,
            HeartRateZone::Zone5 => 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_power_zone_detection() {
        // 200 W at 250 FTP = 0.8
        assert_eq!(PowerZone::zone_for(Some(200), 250), Some(PowerZone::Tempo));
        assert_eq!(PowerZone::zone_for(Some(250), 250), Some(PowerZone::Threshold));
        assert_eq!(PowerZone::zone_for(Some(0), 250), Some(PowerZone::Recovery));
        assert_eq!(PowerZone::zone_for(Some(1000), 250), Some(PowerZone::Neuromuscular));
    }

    #[test]
    fn test_power_zone_gap_between_nominal_ranges() {
        // 0.555 sits between Recovery's 0.55 and Endurance's 0.56
        assert_eq!(PowerZone::zone_for(Some(111), 200), Some(PowerZone::Recovery));
        assert_eq!(PowerZone::zone_for(Some(112), 200), Some(PowerZone::Endurance));
    }

    #[test]
    fn test_missing_threshold_or_reading() {
        assert_eq!(PowerZone::zone_for(None, 250), None);
        assert_eq!(PowerZone::zone_for(Some(200), 0), None);
        assert_eq!(PowerZone::zone_for(Some(200), -100), None);
        assert_eq!(HeartRateZone::zone_for(None, 180), None);
        assert_eq!(HeartRateZone::zone_for(Some(120), 0), None);
    }

    #[test]
    fn test_heart_rate_zone_detection() {
        assert_eq!(HeartRateZone::zone_for(Some(108), 180), Some(HeartRateZone::Zone2));
        assert_eq!(HeartRateZone::zone_for(Some(126), 180), Some(HeartRateZone::Zone3));
        assert_eq!(HeartRateZone::zone_for(Some(180), 180), Some(HeartRateZone::Zone5));
        assert_eq!(HeartRateZone::zone_for(Some(60), 180), Some(HeartRateZone::Zone1));
    }

    #[test]
    fn test_range_labels() {
        assert_eq!(PowerZone::Tempo.watt_range_label(200), "152–180 W");
        assert_eq!(PowerZone::Neuromuscular.watt_range_label(250), "378+ W");
        assert_eq!(HeartRateZone::Zone3.bpm_range_label(180), "126–144 bpm");
    }

    #[test]
    fn test_zone_span_label() {
        assert_eq!(zone_span_label(&[PowerZone::Tempo]), Some("Z3".to_string()));
        assert_eq!(
            zone_span_label(&[PowerZone::Endurance, PowerZone::Tempo, PowerZone::Threshold]),
            Some("Z2–Z4".to_string())
        );
        assert_eq!(zone_span_label::<PowerZone>(&[]), None);
    }

    #[test]
    fn test_zone_name_labels() {
        assert_eq!(HeartRateZone::zone_name_label(None, Some(180)), MISSING_VALUE);
        assert_eq!(HeartRateZone::zone_name_label(Some(120), None), "Set max HR");
        assert_eq!(HeartRateZone::zone_name_label(Some(108), Some(180)), "Z2");
        assert_eq!(PowerZone::zone_name_label(Some(200), Some(0)), "Set FTP");
        assert_eq!(PowerZone::zone_name_label(Some(200), Some(250)), "Z3");
    }

    proptest! {
        #[test]
        fn test_power_zones_partition(fraction in 0.0f64..5.0) {
            let matching = PowerZone::ALL.iter().filter(|z| z.contains(fraction)).count();
            prop_assert_eq!(matching, 1);
        }

        #[test]
        fn test_power_zone_always_found(watts in -100i32..3000, ftp in 1i32..600) {
            prop_assert!(PowerZone::zone_for(Some(watts), ftp).is_some());
        }

        #[test]
        fn test_heart_rate_zones_partition(fraction in 0.0f64..1.5) {
            let matching = HeartRateZone::ALL.iter().filter(|z| z.contains(fraction)).count();
            prop_assert_eq!(matching, 1);
        }
    }
}

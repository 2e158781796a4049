//! Power-zone lookup table.

use barpath_common::error::{BarpathError, BarpathResult};
use barpath_motion_model::PowerZone;
use serde::{Deserialize, Serialize};

/// One row: mean velocities at or above `min_mps` map to `zone`, until the
/// next row's threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PowerZoneBand {
    pub zone: PowerZone,
    pub min_mps: f64,
}

/// Ascending threshold table. Fixed for the duration of one analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerZoneTable {
    bands: Vec<PowerZoneBand>,
}

impl Default for PowerZoneTable {
    /// Common velocity-based-training bands.
    fn default() -> Self {
        let band = |zone, min_mps| PowerZoneBand { zone, min_mps };
        Self {
            bands: vec![
                band(PowerZone::AbsoluteStrength, 0.0),
                band(PowerZone::AcceleratingStrength, 0.5),
                band(PowerZone::StrengthSpeed, 0.75),
                band(PowerZone::SpeedStrength, 1.0),
                band(PowerZone::StartingStrength, 1.3),
            ],
        }
    }
}

impl PowerZoneTable {
    /// Build and validate a table.
    pub fn new(bands: Vec<PowerZoneBand>) -> BarpathResult<Self> {
        let table = Self { bands };
        table.validate()?;
        Ok(table)
    }

    /// The table must start at 0 m/s and strictly increase.
    pub fn validate(&self) -> BarpathResult<()> {
        let first = self
            .bands
            .first()
            .ok_or_else(|| BarpathError::config("power zone table is empty"))?;
        if first.min_mps != 0.0 {
            return Err(BarpathError::config(format!(
                "first power zone must start at 0 m/s, starts at {}",
                first.min_mps
            )));
        }
        for pair in self.bands.windows(2) {
            if !(pair[1].min_mps.is_finite() && pair[1].min_mps > pair[0].min_mps) {
                return Err(BarpathError::config(format!(
                    "power zone thresholds must strictly increase ({} then {})",
                    pair[0].min_mps, pair[1].min_mps
                )));
            }
        }
        Ok(())
    }

    pub fn bands(&self) -> &[PowerZoneBand] {
        &self.bands
    }

    /// Zone for a mean velocity. Negative or non-finite input maps to the
    /// slowest zone.
    pub fn classify(&self, mean_mps: f64) -> PowerZone {
        let fallback = self
            .bands
            .first()
            .map(|b| b.zone)
            .unwrap_or(PowerZone::AbsoluteStrength);
        if !mean_mps.is_finite() {
            return fallback;
        }
        self.bands
            .iter()
            .rev()
            .find(|b| mean_mps >= b.min_mps)
            .map(|b| b.zone)
            .unwrap_or(fallback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_classification() {
        let table = PowerZoneTable::default();
        assert_eq!(table.classify(0.3), PowerZone::AbsoluteStrength);
        assert_eq!(table.classify(0.45), PowerZone::AbsoluteStrength);
        assert_eq!(table.classify(0.5), PowerZone::AcceleratingStrength);
        assert_eq!(table.classify(0.8), PowerZone::StrengthSpeed);
        assert_eq!(table.classify(1.1), PowerZone::SpeedStrength);
        assert_eq!(table.classify(2.0), PowerZone::StartingStrength);
        assert_eq!(table.classify(-1.0), PowerZone::AbsoluteStrength);
        assert_eq!(table.classify(f64::NAN), PowerZone::AbsoluteStrength);
    }

    #[test]
    fn test_custom_three_zone_table() {
        let table = PowerZoneTable::new(vec![
            PowerZoneBand {
                zone: PowerZone::AbsoluteStrength,
                min_mps: 0.0,
            },
            PowerZoneBand {
                zone: PowerZone::StrengthSpeed,
                min_mps: 0.5,
            },
            PowerZoneBand {
                zone: PowerZone::SpeedStrength,
                min_mps: 1.0,
            },
        ])
        .unwrap();
        assert_eq!(table.classify(0.7), PowerZone::StrengthSpeed);
    }

    #[test]
    fn test_invalid_tables_rejected() {
        assert!(PowerZoneTable::new(Vec::new()).is_err());
        let unordered = vec![
            PowerZoneBand {
                zone: PowerZone::AbsoluteStrength,
                min_mps: 0.0,
            },
            PowerZoneBand {
                zone: PowerZone::SpeedStrength,
                min_mps: 1.0,
            },
            PowerZoneBand {
                zone: PowerZone::StrengthSpeed,
                min_mps: 0.8,
            },
        ];
        assert!(PowerZoneTable::new(unordered).is_err());
    }

    #[test]
    fn test_table_deserializes() {
        let json = r#"{ "bands": [ { "zone": "absolute_strength", "min_mps": 0.0 },
                                   { "zone": "speed_strength", "min_mps": 1.0 } ] }"#;
        let table: PowerZoneTable = serde_json::from_str(json).unwrap();
        table.validate().unwrap();
        assert_eq!(table.classify(1.5), PowerZone::SpeedStrength);
    }
}

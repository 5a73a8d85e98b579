/// Calibration engine
///
/// Maps an archetype and a calibration iteration count to the filter
/// parameters the rendering layer applies on top of a portrait:
/// - brightness, contrast and saturation multipliers
/// - an archetype-specific extra channel (sepia for `Classic`)
///
/// Every curve is linear in the iteration count and deliberately unclamped.
/// A calibration session only runs a handful of iterations, so the values
/// stay in a sensible range; clamping for display is left to the caller.
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CalibrationError;

/// Family of filter-curve coefficients
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Archetype {
    /// Warm look with a sepia tint
    Classic,
    /// High-contrast, slightly desaturated fashion look
    Editorial,
    /// Subtle, organic enhancement
    #[default]
    Natural,
}

impl Archetype {
    /// All archetypes, in the order the calibration UI lists them
    pub const ALL: [Archetype; 3] = [Archetype::Classic, Archetype::Editorial, Archetype::Natural];

    pub fn as_str(&self) -> &'static str {
        match self {
            Archetype::Classic => "classic",
            Archetype::Editorial => "editorial",
            Archetype::Natural => "natural",
        }
    }

    /// Coefficients for this archetype's curves
    fn curve(&self) -> Curve {
        match self {
            Archetype::Classic => Curve {
                contrast_slope: 0.02,
                saturation_base: 1.0,
                saturation_slope: 0.05,
                sepia_slope: Some(0.05),
            },
            Archetype::Editorial => Curve {
                contrast_slope: 0.04,
                saturation_base: 0.9,
                saturation_slope: 0.02,
                sepia_slope: None,
            },
            Archetype::Natural => Curve {
                contrast_slope: 0.02,
                saturation_base: 1.0,
                saturation_slope: 0.05,
                sepia_slope: None,
            },
        }
    }
}

impl fmt::Display for Archetype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Archetype {
    type Err = CalibrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "classic" => Ok(Archetype::Classic),
            "editorial" => Ok(Archetype::Editorial),
            "natural" => Ok(Archetype::Natural),
            other => Err(CalibrationError::UnknownArchetype(other.to_string())),
        }
    }
}

/// Linear coefficients shared by every archetype except where noted
struct Curve {
    contrast_slope: f64,
    saturation_base: f64,
    saturation_slope: f64,
    sepia_slope: Option<f64>,
}

/// Brightness grows at the same rate for every archetype
const BRIGHTNESS_SLOPE: f64 = 0.03;

/// Numeric adjustments derived from (archetype, iteration count)
///
/// These are multipliers around 1.0 (identity) except `sepia`, which is an
/// amount starting at 0.0. `sepia` is `None` for archetypes without a tint.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct FilterParameters {
    pub brightness: f64,
    pub contrast: f64,
    pub saturation: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sepia: Option<f64>,
}

impl FilterParameters {
    /// Sepia amount, treating "no tint channel" as zero
    pub fn sepia_amount(&self) -> f64 {
        self.sepia.unwrap_or(0.0)
    }
}

/// Compute the filter parameters for an archetype at a given iteration count
///
/// Pure and deterministic: identical inputs always give bit-identical output,
/// so the rendering layer can re-derive parameters on every frame.
pub fn compute_filter_parameters(archetype: Archetype, iteration_count: u32) -> FilterParameters {
    let n = f64::from(iteration_count);
    let curve = archetype.curve();

    FilterParameters {
        brightness: 1.0 + BRIGHTNESS_SLOPE * n,
        contrast: 1.0 + curve.contrast_slope * n,
        saturation: curve.saturation_base + curve.saturation_slope * n,
        sepia: curve.sepia_slope.map(|slope| slope * n),
    }
}

/// Same as [`compute_filter_parameters`] for untyped input (CLI arguments,
/// foreign records). Rejects unknown archetypes and negative counts.
pub fn compute_from_raw(
    archetype: &str,
    iteration_count: i64,
) -> Result<FilterParameters, CalibrationError> {
    let archetype = archetype.parse::<Archetype>()?;
    let iteration_count = u32::try_from(iteration_count)
        .map_err(|_| CalibrationError::InvalidIterationCount(iteration_count))?;

    Ok(compute_filter_parameters(archetype, iteration_count))
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-12;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < EPS
    }

    #[test]
    fn test_zero_iterations_is_identity_except_editorial_saturation() {
        for archetype in Archetype::ALL {
            let params = compute_filter_parameters(archetype, 0);
            assert_eq!(params.brightness, 1.0);
            assert_eq!(params.contrast, 1.0);
            assert_eq!(params.sepia_amount(), 0.0);
        }

        assert_eq!(compute_filter_parameters(Archetype::Classic, 0).saturation, 1.0);
        assert_eq!(compute_filter_parameters(Archetype::Natural, 0).saturation, 1.0);
        assert_eq!(compute_filter_parameters(Archetype::Editorial, 0).saturation, 0.9);
    }

    #[test]
    fn test_classic_curve() {
        let params = compute_filter_parameters(Archetype::Classic, 4);
        assert!(approx(params.brightness, 1.12));
        assert!(approx(params.contrast, 1.08));
        assert!(approx(params.saturation, 1.2));
        assert!(approx(params.sepia.unwrap(), 0.2));
    }

    #[test]
    fn test_editorial_curve() {
        let params = compute_filter_parameters(Archetype::Editorial, 3);
        assert!(approx(params.brightness, 1.09));
        assert!(approx(params.contrast, 1.12));
        assert!(approx(params.saturation, 0.96));
        assert_eq!(params.sepia, None);
    }

    #[test]
    fn test_natural_has_no_tint() {
        let params = compute_filter_parameters(Archetype::Natural, 5);
        assert!(approx(params.brightness, 1.15));
        assert!(approx(params.contrast, 1.1));
        assert!(approx(params.saturation, 1.25));
        assert_eq!(params.sepia, None);
    }

    #[test]
    fn test_deterministic() {
        for archetype in Archetype::ALL {
            for n in [0, 1, 3, 17, 1_000] {
                let a = compute_filter_parameters(archetype, n);
                let b = compute_filter_parameters(archetype, n);
                assert_eq!(a.brightness.to_bits(), b.brightness.to_bits());
                assert_eq!(a.contrast.to_bits(), b.contrast.to_bits());
                assert_eq!(a.saturation.to_bits(), b.saturation.to_bits());
                assert_eq!(a.sepia.map(f64::to_bits), b.sepia.map(f64::to_bits));
            }
        }
    }

    #[test]
    fn test_monotonic_in_iteration_count() {
        for archetype in Archetype::ALL {
            let mut prev = compute_filter_parameters(archetype, 0);
            for n in 1..50 {
                let next = compute_filter_parameters(archetype, n);
                assert!(next.brightness >= prev.brightness);
                assert!(next.contrast >= prev.contrast);
                assert!(next.saturation >= prev.saturation);
                assert!(next.sepia_amount() >= prev.sepia_amount());
                prev = next;
            }
        }
    }

    #[test]
    fn test_large_counts_are_not_clamped() {
        let params = compute_filter_parameters(Archetype::Natural, 100);
        assert!(approx(params.brightness, 4.0));
        assert!(approx(params.saturation, 6.0));
    }

    #[test]
    fn test_raw_input_validation() {
        assert!(matches!(
            compute_from_raw("classic", -1),
            Err(CalibrationError::InvalidIterationCount(-1))
        ));
        assert!(matches!(
            compute_from_raw("vintage", 2),
            Err(CalibrationError::UnknownArchetype(name)) if name == "vintage"
        ));
        assert_eq!(
            compute_from_raw("editorial", 3).unwrap(),
            compute_filter_parameters(Archetype::Editorial, 3)
        );
    }

    #[test]
    fn test_archetype_serialization() {
        let json = serde_json::to_string(&Archetype::Editorial).unwrap();
        assert_eq!(json, "\"editorial\"");
        assert_eq!("natural".parse::<Archetype>().unwrap(), Archetype::default());
    }
}

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// Tolerances and switches for reconciling layers. Distances are in meters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Fill points keep indexed gaps along long edges below this, and it's the neighborhood
    /// radius for line snapping.
    pub max_segment_length: f64,
    /// Points closer than this are the same point. Also the minimum spacing between vertices.
    pub point_snap_distance: f64,
    /// How far a vertex may be projected onto a line.
    pub max_snap_distance: f64,
    /// The last resort projection radius, used before dropping a feature.
    pub emergency_snap_distance: f64,
    pub use_linear_referencing: bool,
    /// Check consistency after every mutation. Slow.
    pub perform_self_testing: bool,
    /// The first, very tight, endpoint snapping pass.
    pub tight_endpoint_snap_distance: f64,
    /// Degrees. Extend-and-snap rejects candidates that bend the extrapolation more than this.
    pub extend_snap_max_angle: f64,
    /// Gaps between pieces of the same RLID shorter than this get closed.
    pub gap_join_distance: f64,
    pub short_segment_length: f64,
    pub short_stub_length: f64,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            max_segment_length: 50.0,
            point_snap_distance: 0.1,
            max_snap_distance: 2.0,
            emergency_snap_distance: 5.0,
            use_linear_referencing: true,
            perform_self_testing: false,
            tight_endpoint_snap_distance: 0.001,
            extend_snap_max_angle: 1.0,
            gap_join_distance: 1.0,
            short_segment_length: 8.0,
            short_stub_length: 2.0,
        }
    }
}

impl Config {
    /// Missing fields take their defaults.
    pub fn from_json(raw: &str) -> Result<Config> {
        let cfg: Config = serde_json::from_str(raw).context("parsing config")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("max_segment_length", self.max_segment_length),
            ("point_snap_distance", self.point_snap_distance),
            ("max_snap_distance", self.max_snap_distance),
            ("emergency_snap_distance", self.emergency_snap_distance),
            ("tight_endpoint_snap_distance", self.tight_endpoint_snap_distance),
            ("extend_snap_max_angle", self.extend_snap_max_angle),
            ("gap_join_distance", self.gap_join_distance),
            ("short_segment_length", self.short_segment_length),
            ("short_stub_length", self.short_stub_length),
        ] {
            if !(value > 0.0) {
                bail!("{} must be positive, not {}", name, value);
            }
        }
        if self.point_snap_distance >= self.max_snap_distance {
            bail!(
                "point_snap_distance {} must be below max_snap_distance {}",
                self.point_snap_distance,
                self.max_snap_distance
            );
        }
        if self.max_snap_distance > self.emergency_snap_distance {
            bail!(
                "max_snap_distance {} can't exceed emergency_snap_distance {}",
                self.max_snap_distance,
                self.emergency_snap_distance
            );
        }
        if !self.use_linear_referencing {
            bail!("reference geometry needs use_linear_referencing");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_uses_defaults() {
        let cfg = Config::from_json(r#"{"max_snap_distance": 3.0}"#).unwrap();
        assert_eq!(cfg.max_snap_distance, 3.0);
        assert_eq!(cfg.point_snap_distance, 0.1);
        assert_eq!(cfg.emergency_snap_distance, 5.0);
    }

    #[test]
    fn rejects_inconsistent_tolerances() {
        assert!(Config::from_json(r#"{"max_snap_distance": 6.0}"#).is_err());
        assert!(Config::from_json(r#"{"point_snap_distance": 2.0}"#).is_err());
        assert!(Config::from_json(r#"{"gap_join_distance": 0.0}"#).is_err());
        assert!(Config::from_json(r#"{"use_linear_referencing": false}"#).is_err());
        assert!(Config::from_json("not json").is_err());
        assert!(Config::default().validate().is_ok());
    }
}

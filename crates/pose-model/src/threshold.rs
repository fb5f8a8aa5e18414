//! Confidence threshold policy.
//!
//! A keypoint is *visible* when its coordinates and effective score
//! (reported score, or 1 when absent) are finite and the score is at least
//! the threshold. The renderer draws exactly the visible keypoints and the
//! recording session exports exactly the visible keypoints, so both consume
//! one [`ScoreThreshold`] through [`ScoreThreshold::visible`].

use serde::{Deserialize, Serialize};

use posecap_common::error::{PosecapError, PosecapResult};

use crate::keypoint::Keypoint;

/// Minimum effective score for a keypoint to be drawn and exported.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct ScoreThreshold(f64);

impl ScoreThreshold {
    /// No filtering: every keypoint passes.
    pub const NONE: Self = Self(0.0);

    /// Create a threshold. Must be finite and within `[0, 1]`.
    pub fn new(value: f64) -> PosecapResult<Self> {
        if !value.is_finite() || !(0.0..=1.0).contains(&value) {
            return Err(PosecapError::config(format!(
                "Score threshold must be within [0, 1], got {value}"
            )));
        }
        Ok(Self(value))
    }

    pub fn value(self) -> f64 {
        self.0
    }

    pub fn passes_score(self, score: f64) -> bool {
        score >= self.0
    }

    /// Whether a keypoint's score clears this threshold.
    pub fn passes(self, keypoint: &Keypoint) -> bool {
        self.passes_score(keypoint.effective_score())
    }

    /// Whether a keypoint is drawn and exported: finite values and a passing score.
    pub fn visible(self, keypoint: &Keypoint) -> bool {
        keypoint.x.is_finite()
            && keypoint.y.is_finite()
            && keypoint.effective_score().is_finite()
            && self.passes(keypoint)
    }

    /// Whether an edge between two keypoints is drawn.
    pub fn visible_pair(self, a: &Keypoint, b: &Keypoint) -> bool {
        self.visible(a) && self.visible(b)
    }
}

impl Default for ScoreThreshold {
    fn default() -> Self {
        Self::NONE
    }
}

impl TryFrom<f64> for ScoreThreshold {
    type Error = PosecapError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ScoreThreshold> for f64 {
    fn from(value: ScoreThreshold) -> Self {
        value.0
    }
}

impl std::fmt::Display for ScoreThreshold {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn default_threshold_passes_everything() {
        let t = ScoreThreshold::default();
        assert!(t.passes(&Keypoint::new(0.0, 0.0, Some(0.0))));
        assert!(t.passes(&Keypoint::new(0.0, 0.0, None)));
    }

    #[test]
    fn boundary_score_passes() {
        let t = ScoreThreshold::new(0.5).unwrap();
        assert!(t.passes(&Keypoint::new(0.0, 0.0, Some(0.5))));
        assert!(!t.passes(&Keypoint::new(0.0, 0.0, Some(0.4999))));
    }

    #[test]
    fn absent_score_passes_maximal_threshold() {
        let t = ScoreThreshold::new(1.0).unwrap();
        assert!(t.passes(&Keypoint::new(0.0, 0.0, None)));
        assert!(!t.passes(&Keypoint::new(0.0, 0.0, Some(0.99))));
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(ScoreThreshold::new(-0.1).is_err());
        assert!(ScoreThreshold::new(1.1).is_err());
        assert!(ScoreThreshold::new(f64::NAN).is_err());
        assert!(serde_json::from_str::<ScoreThreshold>("2.0").is_err());
        assert_eq!(
            serde_json::from_str::<ScoreThreshold>("0.25").unwrap().value(),
            0.25
        );
    }

    #[test]
    fn non_finite_keypoints_are_never_visible() {
        let t = ScoreThreshold::NONE;
        assert!(!t.visible(&Keypoint::new(f64::NAN, 1.0, Some(0.9))));
        assert!(!t.visible(&Keypoint::new(1.0, f64::INFINITY, None)));
        assert!(!t.visible(&Keypoint::new(1.0, 1.0, Some(f64::INFINITY))));
        // An infinite score still clears the raw score check.
        assert!(t.passes(&Keypoint::new(1.0, 1.0, Some(f64::INFINITY))));
        assert!(t.visible(&Keypoint::new(1.0, 1.0, Some(0.0))));
    }

    proptest! {
        #[test]
        fn pair_visibility_requires_both_endpoints(
            t in 0.0f64..=1.0,
            a in proptest::option::of(0.0f64..=1.0),
            b in proptest::option::of(0.0f64..=1.0),
        ) {
            let threshold = ScoreThreshold::new(t).unwrap();
            let ka = Keypoint::new(1.0, 2.0, a);
            let kb = Keypoint::new(3.0, 4.0, b);
            prop_assert_eq!(
                threshold.visible_pair(&ka, &kb),
                threshold.visible(&ka) && threshold.visible(&kb)
            );
            prop_assert_eq!(threshold.visible(&ka), a.unwrap_or(1.0) >= t);
        }
    }
}

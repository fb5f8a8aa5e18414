//! Keypoint and pose types as produced by a pose detector.
//!
//! Pose logs are stored as JSONL, one detector invocation per line:
//!
//! ```text
//! {"t_ms": 100.0, "poses": [{"keypoints": [{"x": 10, "y": 20, "score": 0.9}, ...]}]}
//! ```

use serde::{Deserialize, Serialize};

use posecap_common::error::{PosecapError, PosecapResult};

/// A labeled 2-D point with an optional confidence score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    pub x: f64,
    pub y: f64,

    /// Detector confidence. Absent means fully confident.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,

    /// Landmark name as reported by the detector, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Keypoint {
    pub fn new(x: f64, y: f64, score: Option<f64>) -> Self {
        Self {
            x,
            y,
            score,
            name: None,
        }
    }

    /// Score used for thresholding: the reported score, or `1.0` when absent.
    pub fn effective_score(&self) -> f64 {
        self.score.unwrap_or(1.0)
    }
}

/// One detected body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    /// Keypoints in canonical schema order. `None` when the detector found nothing.
    #[serde(default)]
    pub keypoints: Option<Vec<Keypoint>>,

    /// Overall pose confidence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

impl Pose {
    pub fn new(keypoints: Vec<Keypoint>) -> Self {
        Self {
            keypoints: Some(keypoints),
            score: None,
        }
    }

    /// Keypoints if present and non-empty.
    pub fn detected_keypoints(&self) -> Option<&[Keypoint]> {
        self.keypoints.as_deref().filter(|kps| !kps.is_empty())
    }
}

/// All poses reported by one detector invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PoseFrame {
    /// Detector timestamp in milliseconds, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t_ms: Option<f64>,

    #[serde(default)]
    pub poses: Vec<Pose>,
}

/// Parse a JSONL pose log. Blank lines and `#` comment lines are skipped.
pub fn parse_pose_log(content: &str) -> PosecapResult<Vec<PoseFrame>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| {
            let trimmed = line.trim();
            !trimmed.is_empty() && !trimmed.starts_with('#')
        })
        .map(|(idx, line)| {
            serde_json::from_str::<PoseFrame>(line).map_err(|e| {
                PosecapError::Other(anyhow::anyhow!("Pose log line {}: {e}", idx + 1))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_score_is_fully_confident() {
        let kp: Keypoint = serde_json::from_str(r#"{"x": 1.0, "y": 2.0}"#).unwrap();
        assert_eq!(kp.score, None);
        assert_eq!(kp.effective_score(), 1.0);
    }

    #[test]
    fn empty_and_absent_keypoints_are_not_detections() {
        assert!(Pose::default().detected_keypoints().is_none());
        assert!(Pose::new(vec![]).detected_keypoints().is_none());
        assert_eq!(
            Pose::new(vec![Keypoint::new(0.0, 0.0, None)])
                .detected_keypoints()
                .map(<[Keypoint]>::len),
            Some(1)
        );
    }

    #[test]
    fn parses_pose_log_lines() {
        let log = "# recorded by test\n\
                   {\"t_ms\": 100.0, \"poses\": [{\"keypoints\": [{\"x\": 10, \"y\": 20, \"score\": 0.9}]}]}\n\
                   \n\
                   {\"t_ms\": 250.0, \"poses\": []}\n";
        let frames = parse_pose_log(log).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].t_ms, Some(100.0));
        assert_eq!(frames[0].poses[0].keypoints.as_ref().unwrap()[0].x, 10.0);
        assert!(frames[1].poses.is_empty());
    }

    #[test]
    fn reports_bad_line_number() {
        let err = parse_pose_log("{\"poses\": []}\nnot json").unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }
}

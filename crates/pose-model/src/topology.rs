//! Keypoint topology: body-side partition and skeletal edges per model.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use posecap_common::error::{PosecapError, PosecapResult};

/// Supported pose model identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoseModel {
    MoveNet,
    PoseNet,
    /// 33-point layout. Recognized, but not covered by the canonical schema.
    BlazePose,
}

impl FromStr for PoseModel {
    type Err = PosecapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "movenet" => Ok(Self::MoveNet),
            "posenet" => Ok(Self::PoseNet),
            "blazepose" => Ok(Self::BlazePose),
            other => Err(PosecapError::config(format!("Unknown pose model: {other}"))),
        }
    }
}

impl std::fmt::Display for PoseModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::MoveNet => "MoveNet",
            Self::PoseNet => "PoseNet",
            Self::BlazePose => "BlazePose",
        };
        f.write_str(name)
    }
}

/// Keypoint indices grouped by body side.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeypointSides {
    pub left: Vec<usize>,
    pub middle: Vec<usize>,
    pub right: Vec<usize>,
}

/// Read-only classification service for a model's keypoint layout.
pub trait TopologyProvider: Send + Sync {
    /// Partition of keypoint indices into left/middle/right groups.
    fn sides(&self, model: PoseModel) -> PosecapResult<KeypointSides>;

    /// Index pairs forming skeleton edges.
    fn adjacent_pairs(&self, model: PoseModel) -> PosecapResult<Vec<(usize, usize)>>;
}

const COCO_LEFT: [usize; 8] = [1, 3, 5, 7, 9, 11, 13, 15];
const COCO_MIDDLE: [usize; 1] = [0];
const COCO_RIGHT: [usize; 8] = [2, 4, 6, 8, 10, 12, 14, 16];

const COCO_PAIRS: [(usize, usize); 16] = [
    (0, 1),
    (0, 2),
    (1, 3),
    (2, 4),
    (5, 6),
    (5, 7),
    (5, 11),
    (6, 8),
    (6, 12),
    (7, 9),
    (8, 10),
    (11, 12),
    (11, 13),
    (12, 14),
    (13, 15),
    (14, 16),
];

/// Topology for models emitting the 17-point COCO layout.
#[derive(Debug, Clone, Copy, Default)]
pub struct CocoTopology;

impl CocoTopology {
    fn ensure_coco(model: PoseModel) -> PosecapResult<()> {
        match model {
            PoseModel::MoveNet | PoseModel::PoseNet => Ok(()),
            PoseModel::BlazePose => Err(PosecapError::unsupported(format!(
                "{model} uses a 33-point layout; only 17-point COCO models are supported"
            ))),
        }
    }
}

impl TopologyProvider for CocoTopology {
    fn sides(&self, model: PoseModel) -> PosecapResult<KeypointSides> {
        Self::ensure_coco(model)?;
        Ok(KeypointSides {
            left: COCO_LEFT.to_vec(),
            middle: COCO_MIDDLE.to_vec(),
            right: COCO_RIGHT.to_vec(),
        })
    }

    fn adjacent_pairs(&self, model: PoseModel) -> PosecapResult<Vec<(usize, usize)>> {
        Self::ensure_coco(model)?;
        Ok(COCO_PAIRS.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::COCO17_KEYPOINTS;

    #[test]
    fn sides_partition_all_coco_indices() {
        let sides = CocoTopology.sides(PoseModel::MoveNet).unwrap();
        let mut all: Vec<usize> = sides
            .left
            .iter()
            .chain(&sides.middle)
            .chain(&sides.right)
            .copied()
            .collect();
        all.sort_unstable();
        assert_eq!(all, (0..17).collect::<Vec<_>>());

        for i in &sides.left {
            assert!(COCO17_KEYPOINTS[*i].starts_with("left_"));
        }
        for i in &sides.right {
            assert!(COCO17_KEYPOINTS[*i].starts_with("right_"));
        }
    }

    #[test]
    fn pairs_stay_within_schema() {
        let pairs = CocoTopology.adjacent_pairs(PoseModel::PoseNet).unwrap();
        assert_eq!(pairs.len(), 16);
        assert!(pairs.iter().all(|&(a, b)| a < 17 && b < 17 && a != b));
    }

    #[test]
    fn blazepose_is_unsupported() {
        let err = CocoTopology.sides(PoseModel::BlazePose).unwrap_err();
        assert!(matches!(err, PosecapError::Unsupported { .. }));
    }

    #[test]
    fn parses_model_names() {
        assert_eq!("MoveNet".parse::<PoseModel>().unwrap(), PoseModel::MoveNet);
        assert_eq!(" posenet ".parse::<PoseModel>().unwrap(), PoseModel::PoseNet);
        assert!("yolo".parse::<PoseModel>().is_err());
    }
}

//! The canonical keypoint schema.
//!
//! Column order in the export follows schema order, so the schema is an
//! explicit value rather than an assumption about array positions.

use std::borrow::Cow;

use posecap_common::error::{PosecapError, PosecapResult};

use crate::keypoint::Pose;

/// The 17 COCO body landmarks in detector output order.
pub const COCO17_KEYPOINTS: [&str; 17] = [
    "nose",
    "left_eye",
    "right_eye",
    "left_ear",
    "right_ear",
    "left_shoulder",
    "right_shoulder",
    "left_elbow",
    "right_elbow",
    "left_wrist",
    "right_wrist",
    "left_hip",
    "right_hip",
    "left_knee",
    "right_knee",
    "left_ankle",
    "right_ankle",
];

/// Name of the leading export column.
pub const TIMESTAMP_COLUMN: &str = "timestamp";

/// An ordered list of keypoint names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeypointSchema {
    names: Vec<Cow<'static, str>>,
}

impl KeypointSchema {
    /// The canonical 17-point body schema.
    pub fn coco17() -> Self {
        Self {
            names: COCO17_KEYPOINTS.iter().map(|n| Cow::Borrowed(*n)).collect(),
        }
    }

    /// Build a schema from custom names. Names must be unique and non-empty.
    pub fn from_names<I, S>(names: I) -> PosecapResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        if names.is_empty() {
            return Err(PosecapError::schema("Keypoint schema has no names"));
        }
        for (i, name) in names.iter().enumerate() {
            if name.is_empty() || name.contains(',') {
                return Err(PosecapError::schema(format!(
                    "Invalid keypoint name {name:?} at index {i}"
                )));
            }
            if names[..i].contains(name) {
                return Err(PosecapError::schema(format!(
                    "Duplicate keypoint name {name:?}"
                )));
            }
        }
        Ok(Self {
            names: names.into_iter().map(Cow::Owned).collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(|n| n.as_ref())
    }

    /// Number of comma-separated fields in every export line.
    pub fn field_count(&self) -> usize {
        1 + 3 * self.names.len()
    }

    /// The export header line (without trailing newline).
    pub fn header(&self) -> String {
        let mut header = String::from(TIMESTAMP_COLUMN);
        for name in self.names() {
            header.push_str(&format!(",{name}_x,{name}_y,{name}_score"));
        }
        header
    }

    /// Check that a pose's keypoints line up with this schema.
    pub fn validate(&self, pose: &Pose) -> PosecapResult<()> {
        let count = pose.keypoints.as_ref().map_or(0, Vec::len);
        if count != self.len() {
            return Err(PosecapError::schema(format!(
                "Pose has {count} keypoints, schema expects {}",
                self.len()
            )));
        }
        Ok(())
    }
}

impl Default for KeypointSchema {
    fn default() -> Self {
        Self::coco17()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keypoint::Keypoint;

    #[test]
    fn coco17_header_matches_export_layout() {
        let header = KeypointSchema::coco17().header();
        assert!(header.starts_with("timestamp,nose_x,nose_y,nose_score,left_eye_x,"));
        assert!(header.ends_with(",right_ankle_x,right_ankle_y,right_ankle_score"));
        assert_eq!(header.split(',').count(), 52);
    }

    #[test]
    fn validate_rejects_count_mismatch() {
        let schema = KeypointSchema::coco17();
        let pose = Pose::new(vec![Keypoint::new(0.0, 0.0, None); 5]);
        let err = schema.validate(&pose).unwrap_err();
        assert!(err.to_string().contains("5 keypoints"));

        let pose = Pose::new(vec![Keypoint::new(0.0, 0.0, None); 17]);
        schema.validate(&pose).unwrap();
    }

    #[test]
    fn custom_schema_rejects_duplicates() {
        assert!(KeypointSchema::from_names(["a", "b", "a"]).is_err());
        assert!(KeypointSchema::from_names(["a,b"]).is_err());
        let schema = KeypointSchema::from_names(["head", "tail"]).unwrap();
        assert_eq!(schema.header(), "timestamp,head_x,head_y,head_score,tail_x,tail_y,tail_score");
    }
}

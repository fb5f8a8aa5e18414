//! Keypoint row construction.
//!
//! A row is one export line: the elapsed-time field followed by an
//! `x,y,score` triplet per schema keypoint. Keypoints below the threshold
//! (or with non-finite values) become three empty fields, so every row has
//! the same width no matter how many keypoints were visible.

use std::fmt::Write as _;

use posecap_common::clock::format_timestamp_secs;
use posecap_pose_model::{Keypoint, ScoreThreshold};

/// Build one row. `keypoints` must already be validated against the schema.
pub fn build_row(elapsed_secs: f64, keypoints: &[Keypoint], threshold: ScoreThreshold) -> String {
    let mut row = format_timestamp_secs(elapsed_secs);
    for kp in keypoints {
        row.push(',');
        push_triplet(&mut row, kp, threshold);
    }
    row
}

fn push_triplet(row: &mut String, kp: &Keypoint, threshold: ScoreThreshold) {
    if threshold.visible(kp) {
        // Writing into a String cannot fail.
        let _ = write!(row, "{},{},{}", kp.x, kp.y, kp.effective_score());
    } else {
        row.push_str(",,");
    }
}

/// Parse the leading timestamp of a row.
pub fn row_timestamp_secs(row: &str) -> Option<f64> {
    row.split(',').next()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn frame_with(first: Keypoint, second: Keypoint) -> Vec<Keypoint> {
        let mut kps = vec![Keypoint::new(0.0, 0.0, Some(0.0)); 17];
        kps[0] = first;
        kps[1] = second;
        kps
    }

    #[test]
    fn formats_visible_and_filtered_keypoints() {
        let kps = frame_with(
            Keypoint::new(10.0, 20.0, Some(0.9)),
            Keypoint::new(5.0, 5.0, Some(0.1)),
        );
        let row = build_row(0.1, &kps, ScoreThreshold::new(0.5).unwrap());
        let expected = format!("0.100,10,20,0.9{}", ",,,".repeat(16));
        assert_eq!(row, expected);
    }

    #[test]
    fn missing_score_exports_as_one() {
        let row = build_row(1.0, &[Keypoint::new(1.5, 2.25, None)], ScoreThreshold::NONE);
        assert_eq!(row, "1.000,1.5,2.25,1");
    }

    #[test]
    fn non_finite_values_become_empty_fields() {
        let row = build_row(
            0.0,
            &[
                Keypoint::new(f64::NAN, 1.0, Some(0.9)),
                Keypoint::new(1.0, 2.0, Some(f64::INFINITY)),
            ],
            ScoreThreshold::NONE,
        );
        assert_eq!(row, "0.000,,,,,,");
        assert!(!row.contains("NaN"));
    }

    #[test]
    fn reads_back_timestamp() {
        assert_eq!(row_timestamp_secs("0.250,1,2,3"), Some(0.25));
        assert_eq!(row_timestamp_secs(""), None);
    }

    fn arb_keypoint() -> impl Strategy<Value = Keypoint> {
        (
            -1000.0f64..1000.0,
            -1000.0f64..1000.0,
            proptest::option::of(0.0f64..=1.0),
        )
            .prop_map(|(x, y, score)| Keypoint::new(x, y, score))
    }

    proptest! {
        #[test]
        fn row_width_is_fixed(
            elapsed in 0.0f64..10_000.0,
            kps in proptest::collection::vec(arb_keypoint(), 17),
            t in 0.0f64..=1.0,
        ) {
            let row = build_row(elapsed, &kps, ScoreThreshold::new(t).unwrap());
            let schema = posecap_pose_model::KeypointSchema::coco17();
            prop_assert_eq!(row.split(',').count(), schema.field_count());
        }

        #[test]
        fn fields_follow_threshold(
            kps in proptest::collection::vec(arb_keypoint(), 17),
            t in 0.0f64..=1.0,
        ) {
            let threshold = ScoreThreshold::new(t).unwrap();
            let row = build_row(0.0, &kps, threshold);
            let fields: Vec<&str> = row.split(',').collect();
            for (i, kp) in kps.iter().enumerate() {
                let triplet = &fields[1 + 3 * i..4 + 3 * i];
                if kp.effective_score() < t {
                    prop_assert_eq!(triplet, &["", "", ""][..]);
                } else {
                    prop_assert_eq!(triplet[0].parse::<f64>().unwrap(), kp.x);
                    prop_assert_eq!(triplet[1].parse::<f64>().unwrap(), kp.y);
                    prop_assert_eq!(triplet[2].parse::<f64>().unwrap(), kp.effective_score());
                }
            }
        }
    }
}

//! Print the keypoint export header.

use posecap_pose_model::KeypointSchema;

pub fn run() -> anyhow::Result<()> {
    println!("{}", KeypointSchema::coco17().header());
    Ok(())
}

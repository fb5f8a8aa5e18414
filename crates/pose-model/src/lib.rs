//! Posecap Pose Model
//!
//! Defines the data contracts shared by the renderer and the recording session:
//! - **Keypoints and poses:** per-frame detector output, read-only to the core
//! - **Schema:** the canonical, ordered 17-point body-landmark layout
//! - **Threshold:** the single confidence policy that decides both what is
//!   drawn and what is exported
//! - **Topology:** left/middle/right partition and skeletal edges per model

pub mod keypoint;
pub mod schema;
pub mod threshold;
pub mod topology;

pub use keypoint::*;
pub use schema::*;
pub use threshold::*;
pub use topology::*;

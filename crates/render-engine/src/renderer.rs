//! Frame renderer: video frame plus keypoint/skeleton overlay.
//!
//! The renderer holds no per-frame state. It applies the same
//! [`ScoreThreshold`] the recording session uses, so a keypoint is drawn
//! exactly when its coordinates are exported.

use posecap_common::config::StyleConfig;
use posecap_common::error::PosecapResult;
use posecap_pose_model::{Keypoint, KeypointSides, Pose, PoseModel, ScoreThreshold, TopologyProvider};

use crate::frame::{Frame, Rgba};
use crate::surface::DrawingSurface;

/// Static overlay styling.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderStyle {
    pub line_width: f64,
    pub point_radius: f64,
    /// Middle-group keypoints, keypoint outlines, and skeleton edges.
    pub middle_color: Rgba,
    pub left_color: Rgba,
    pub right_color: Rgba,
}

impl RenderStyle {
    pub fn from_config(config: &StyleConfig) -> PosecapResult<Self> {
        config.validate()?;
        Ok(Self {
            line_width: config.line_width,
            point_radius: config.point_radius,
            middle_color: config.middle_color.parse()?,
            left_color: config.left_color.parse()?,
            right_color: config.right_color.parse()?,
        })
    }
}

impl Default for RenderStyle {
    fn default() -> Self {
        Self {
            line_width: 2.0,
            point_radius: 4.0,
            middle_color: Rgba::WHITE,
            left_color: Rgba::rgb(0, 128, 0),
            right_color: Rgba::rgb(255, 165, 0),
        }
    }
}

/// What was drawn for one pose.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrawStats {
    pub keypoints: usize,
    pub edges: usize,
}

impl std::ops::AddAssign for DrawStats {
    fn add_assign(&mut self, rhs: Self) {
        self.keypoints += rhs.keypoints;
        self.edges += rhs.edges;
    }
}

/// Draws video frames and pose overlays onto a [`DrawingSurface`].
#[derive(Debug, Clone)]
pub struct FrameRenderer {
    model: PoseModel,
    sides: KeypointSides,
    pairs: Vec<(usize, usize)>,
    style: RenderStyle,
}

impl FrameRenderer {
    /// Resolve the model's topology once; fails if the provider does not know the model.
    pub fn new(
        topology: &dyn TopologyProvider,
        model: PoseModel,
        style: RenderStyle,
    ) -> PosecapResult<Self> {
        Ok(Self {
            model,
            sides: topology.sides(model)?,
            pairs: topology.adjacent_pairs(model)?,
            style,
        })
    }

    pub fn model(&self) -> PoseModel {
        self.model
    }

    pub fn style(&self) -> &RenderStyle {
        &self.style
    }

    /// Clear the surface and draw the raw video frame, if any.
    pub fn draw_video_frame(&self, surface: &mut dyn DrawingSurface, video: Option<&Frame>) {
        surface.clear();
        if let Some(video) = video {
            surface.draw_image(video);
        }
    }

    /// Draw one pose. Poses without keypoints draw nothing.
    pub fn draw_pose(
        &self,
        surface: &mut dyn DrawingSurface,
        pose: &Pose,
        threshold: ScoreThreshold,
    ) -> DrawStats {
        let Some(keypoints) = pose.detected_keypoints() else {
            return DrawStats::default();
        };
        DrawStats {
            keypoints: self.draw_keypoints(surface, keypoints, threshold),
            edges: self.draw_skeleton(surface, keypoints, threshold),
        }
    }

    fn draw_keypoints(
        &self,
        surface: &mut dyn DrawingSurface,
        keypoints: &[Keypoint],
        threshold: ScoreThreshold,
    ) -> usize {
        let groups = [
            (&self.sides.middle, self.style.middle_color),
            (&self.sides.left, self.style.left_color),
            (&self.sides.right, self.style.right_color),
        ];

        let mut drawn = 0;
        for (indices, fill) in groups {
            for &i in indices {
                let Some(kp) = keypoints.get(i) else {
                    tracing::debug!(index = i, len = keypoints.len(), "Keypoint missing from pose");
                    continue;
                };
                if !threshold.visible(kp) {
                    continue;
                }
                surface.fill_circle(kp.x, kp.y, self.style.point_radius, fill);
                surface.stroke_circle(
                    kp.x,
                    kp.y,
                    self.style.point_radius,
                    self.style.line_width,
                    self.style.middle_color,
                );
                drawn += 1;
            }
        }
        drawn
    }

    fn draw_skeleton(
        &self,
        surface: &mut dyn DrawingSurface,
        keypoints: &[Keypoint],
        threshold: ScoreThreshold,
    ) -> usize {
        let mut drawn = 0;
        for &(i, j) in &self.pairs {
            let (Some(a), Some(b)) = (keypoints.get(i), keypoints.get(j)) else {
                tracing::debug!(from = i, to = j, len = keypoints.len(), "Edge endpoint missing from pose");
                continue;
            };
            if threshold.visible_pair(a, b) {
                surface.stroke_line(
                    (a.x, a.y),
                    (b.x, b.y),
                    self.style.line_width,
                    self.style.middle_color,
                );
                drawn += 1;
            }
        }
        drawn
    }
}

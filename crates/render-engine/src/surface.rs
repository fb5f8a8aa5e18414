//! Drawing surfaces.

use crate::frame::{Frame, Rgba};

/// A persistent 2-D drawing target.
///
/// Coordinates are in surface pixels; shapes falling partly or fully outside
/// the surface are clipped.
pub trait DrawingSurface: Send {
    fn size(&self) -> (u32, u32);

    /// Reset every pixel to transparent black.
    fn clear(&mut self);

    /// Copy a video frame onto the surface at the origin, clipped to the surface.
    fn draw_image(&mut self, image: &Frame);

    fn fill_circle(&mut self, cx: f64, cy: f64, radius: f64, color: Rgba);

    /// Outline a circle with the given stroke width.
    fn stroke_circle(&mut self, cx: f64, cy: f64, radius: f64, width: f64, color: Rgba);

    fn stroke_line(&mut self, from: (f64, f64), to: (f64, f64), width: f64, color: Rgba);

    /// Copy of the current surface contents.
    fn snapshot(&self) -> Frame;
}

/// An in-memory RGBA surface.
#[derive(Debug, Clone)]
pub struct RasterSurface {
    frame: Frame,
}

impl RasterSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            frame: Frame::filled(width, height, Rgba::TRANSPARENT),
        }
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    /// Paint every pixel whose center lies in the rectangle and satisfies `inside`.
    fn paint_where(
        &mut self,
        (min_x, min_y, max_x, max_y): (f64, f64, f64, f64),
        color: Rgba,
        inside: impl Fn(f64, f64) -> bool,
    ) {
        let (w, h) = (self.frame.width(), self.frame.height());
        if w == 0 || h == 0 || !(min_x.is_finite() && min_y.is_finite()) {
            return;
        }
        if !(max_x.is_finite() && max_y.is_finite()) {
            return;
        }
        let x0 = min_x.floor().max(0.0) as u32;
        let y0 = min_y.floor().max(0.0) as u32;
        let x1 = (max_x.ceil().max(0.0) as u32).min(w - 1);
        let y1 = (max_y.ceil().max(0.0) as u32).min(h - 1);
        if x0 > x1 || y0 > y1 {
            return;
        }
        for y in y0..=y1 {
            for x in x0..=x1 {
                if inside(x as f64 + 0.5, y as f64 + 0.5) {
                    self.frame.set_pixel(x, y, color);
                }
            }
        }
    }
}

impl DrawingSurface for RasterSurface {
    fn size(&self) -> (u32, u32) {
        (self.frame.width(), self.frame.height())
    }

    fn clear(&mut self) {
        let (w, h) = self.size();
        self.frame = Frame::filled(w, h, Rgba::TRANSPARENT);
    }

    fn draw_image(&mut self, image: &Frame) {
        let w = image.width().min(self.frame.width());
        let h = image.height().min(self.frame.height());
        for y in 0..h {
            for x in 0..w {
                if let Some(px) = image.pixel(x, y) {
                    self.frame.set_pixel(x, y, px);
                }
            }
        }
    }

    fn fill_circle(&mut self, cx: f64, cy: f64, radius: f64, color: Rgba) {
        let r2 = radius * radius;
        self.paint_where(
            (cx - radius, cy - radius, cx + radius, cy + radius),
            color,
            |x, y| (x - cx).powi(2) + (y - cy).powi(2) <= r2,
        );
    }

    fn stroke_circle(&mut self, cx: f64, cy: f64, radius: f64, width: f64, color: Rgba) {
        let half = width / 2.0;
        let outer = radius + half;
        let inner = (radius - half).max(0.0);
        self.paint_where(
            (cx - outer, cy - outer, cx + outer, cy + outer),
            color,
            |x, y| {
                let d = ((x - cx).powi(2) + (y - cy).powi(2)).sqrt();
                d >= inner && d <= outer
            },
        );
    }

    fn stroke_line(&mut self, from: (f64, f64), to: (f64, f64), width: f64, color: Rgba) {
        let half = (width / 2.0).max(0.5);
        let bounds = (
            from.0.min(to.0) - half,
            from.1.min(to.1) - half,
            from.0.max(to.0) + half,
            from.1.max(to.1) + half,
        );
        self.paint_where(bounds, color, |x, y| {
            distance_to_segment((x, y), from, to) <= half
        });
    }

    fn snapshot(&self) -> Frame {
        self.frame.clone()
    }
}

fn distance_to_segment(p: (f64, f64), a: (f64, f64), b: (f64, f64)) -> f64 {
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let len2 = dx * dx + dy * dy;
    let t = if len2 == 0.0 {
        0.0
    } else {
        (((p.0 - a.0) * dx + (p.1 - a.1) * dy) / len2).clamp(0.0, 1.0)
    };
    let (qx, qy) = (a.0 + t * dx, a.1 + t * dy);
    ((p.0 - qx).powi(2) + (p.1 - qy).powi(2)).sqrt()
}

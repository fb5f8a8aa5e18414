//! Posecap Render Engine
//!
//! Draws the current video frame and the detected poses onto a persistent
//! drawing surface. The rendered surface is what the capture sink encodes.
//!
//! # Pipeline Architecture
//!
//! ```text
//! video frame ──┐
//!               ├── clear + blit
//! poses ────────┘        │
//!                        ├── keypoints (middle / left / right colors)
//! topology ──────────────┘        │
//!                                 ├── skeleton edges
//! threshold ──────────────────────┘        │
//!                                          ▼
//!                                   DrawingSurface ──► snapshot() ──► capture sink
//! ```

pub mod frame;
pub mod renderer;
pub mod surface;

pub use frame::*;
pub use renderer::*;
pub use surface::*;

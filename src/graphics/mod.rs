//! Value types that cross the producer surface
//!
//! Pixel formats, usage bits, rectangles, fences and the small closed sets of
//! identifiers (client APIs, scaling modes, query keys) a producer client
//! passes in. None of these carry behavior of their own; the slot table and
//! the broker interpret them.

pub mod api;
pub mod fence;
pub mod format;
pub mod geometry;
pub mod presentation;

pub use api::{ClientApi, QueryKey, ScalingMode};
pub use fence::Fence;
pub use format::{usage, PixelFormat};
pub use geometry::Rect;
pub use presentation::PresentationBuffer;

//! Sample and annotation model for labelaug.
//!
//! This module defines the typed in-memory form of one augmentation input:
//! an RGB raster plus an ordered list of instances (boxes, polygons or
//! keypoint skeletons), together with the YOLO text codec and the
//! polygon ↔ mask bridge.
//!
//! # Design Principles
//!
//! 1. **Type Safety**: marker types keep pixel and normalized coordinates
//!    apart, and instances are a tagged enum with named fields instead of
//!    positional number lists.
//!
//! 2. **Canonical Boxes**: boxes are stored as XYXY corners; the YOLO
//!    center/size form only exists at the codec boundary.
//!
//! 3. **Stable Slots**: keypoint slot `i` always denotes skeleton point `i`.
//!
//! # Example
//!
//! ```
//! use labelaug::ir::{io_yolo, BoxAnnotation, Instance};
//!
//! let instances: Vec<Instance> = vec![BoxAnnotation::from_cxcywh(0u32, 0.5, 0.5, 0.4, 0.4).into()];
//! let text = io_yolo::encode(&instances);
//! assert_eq!(text, "0 0.500000 0.500000 0.400000 0.400000\n");
//! ```

mod bbox;
mod coord;
mod ids;
pub mod io_yolo;
pub mod mask;
mod model;

pub use bbox::BBoxXYXY;
pub use coord::{Coord, Normalized, Pixel};
pub use ids::ClassId;
pub use mask::Mask;
pub use model::{
    BoxAnnotation, Instance, Keypoint, KeypointsAnnotation, LabelKind, PolygonAnnotation, Sample,
    Skeleton, Visibility, COCO_KEYPOINT_NAMES,
};

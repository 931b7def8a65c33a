//! Sample and annotation model.
//!
//! A [`Sample`] is one decoded image plus the ordered list of labeled
//! [`Instance`]s found in its label file. Instance order is the only link
//! between an input instance and its transformed counterpart, so every
//! stage keeps the list ordered.

use image::RgbImage;
use serde::{Deserialize, Serialize};

use super::bbox::BBoxXYXY;
use super::coord::{Coord, Normalized};
use super::ids::ClassId;

/// Which of the three YOLO label layouts a dataset uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum LabelKind {
    /// `class cx cy w h` per line.
    #[value(alias = "bbox", alias = "detect")]
    Box,
    /// `class x1 y1 ... xn yn` per line.
    #[value(alias = "seg", alias = "segment")]
    Polygon,
    /// `class cx cy w h x1 y1 v1 ...`, exactly one line per file.
    #[value(alias = "pose")]
    Keypoints,
}

impl LabelKind {
    /// Short human-readable name used in reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            LabelKind::Box => "box",
            LabelKind::Polygon => "polygon",
            LabelKind::Keypoints => "keypoints",
        }
    }
}

/// Per-keypoint visibility flag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Visibility {
    /// Not labeled.
    #[default]
    Absent = 0,
    /// Labeled but occluded.
    Occluded = 1,
    /// Labeled and visible.
    Visible = 2,
}

impl Visibility {
    /// Parses the integer flag written in label files.
    pub fn from_flag(flag: u8) -> Option<Self> {
        match flag {
            0 => Some(Visibility::Absent),
            1 => Some(Visibility::Occluded),
            2 => Some(Visibility::Visible),
            _ => None,
        }
    }

    /// The integer flag written in label files.
    #[inline]
    pub fn flag(&self) -> u8 {
        *self as u8
    }

    #[inline]
    pub fn is_labeled(&self) -> bool {
        *self != Visibility::Absent
    }
}

/// One keypoint slot.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct Keypoint {
    pub position: Coord<Normalized>,
    pub visibility: Visibility,
}

impl Keypoint {
    pub fn new(x: f64, y: f64, visibility: Visibility) -> Self {
        Self {
            position: Coord::new(x, y),
            visibility,
        }
    }

    /// The placeholder written for a slot that has no usable point.
    pub fn placeholder() -> Self {
        Self::default()
    }
}

/// An axis-aligned box instance.
#[derive(Clone, Debug, PartialEq)]
pub struct BoxAnnotation {
    pub class_id: ClassId,
    pub bbox: BBoxXYXY<Normalized>,
}

impl BoxAnnotation {
    pub fn new(class_id: impl Into<ClassId>, bbox: BBoxXYXY<Normalized>) -> Self {
        Self {
            class_id: class_id.into(),
            bbox,
        }
    }

    /// Builds a box from the YOLO center/size tuple.
    pub fn from_cxcywh(class_id: impl Into<ClassId>, cx: f64, cy: f64, w: f64, h: f64) -> Self {
        Self::new(class_id, BBoxXYXY::from_cxcywh(cx, cy, w, h))
    }
}

/// A segmentation polygon instance.
#[derive(Clone, Debug, PartialEq)]
pub struct PolygonAnnotation {
    pub class_id: ClassId,
    pub vertices: Vec<Coord<Normalized>>,
}

impl PolygonAnnotation {
    /// Minimum vertex count for a polygon to describe an area.
    pub const MIN_VERTICES: usize = 3;

    pub fn new(class_id: impl Into<ClassId>, vertices: Vec<Coord<Normalized>>) -> Self {
        Self {
            class_id: class_id.into(),
            vertices,
        }
    }

    /// Convenience constructor from `(x, y)` pairs.
    pub fn from_points(class_id: impl Into<ClassId>, points: &[(f64, f64)]) -> Self {
        Self::new(
            class_id,
            points.iter().map(|&(x, y)| Coord::new(x, y)).collect(),
        )
    }
}

/// A pose instance: an enclosing box plus positional keypoint slots.
#[derive(Clone, Debug, PartialEq)]
pub struct KeypointsAnnotation {
    pub class_id: ClassId,
    pub bbox: BBoxXYXY<Normalized>,
    /// Slot `i` always denotes skeleton point `i`.
    pub keypoints: Vec<Keypoint>,
}

impl KeypointsAnnotation {
    pub fn new(
        class_id: impl Into<ClassId>,
        bbox: BBoxXYXY<Normalized>,
        keypoints: Vec<Keypoint>,
    ) -> Self {
        Self {
            class_id: class_id.into(),
            bbox,
            keypoints,
        }
    }
}

/// One labeled object.
#[derive(Clone, Debug, PartialEq)]
pub enum Instance {
    Box(BoxAnnotation),
    Polygon(PolygonAnnotation),
    Keypoints(KeypointsAnnotation),
}

impl Instance {
    pub fn class_id(&self) -> ClassId {
        match self {
            Instance::Box(b) => b.class_id,
            Instance::Polygon(p) => p.class_id,
            Instance::Keypoints(k) => k.class_id,
        }
    }

    /// The label layout this instance is written in.
    pub fn kind(&self) -> LabelKind {
        match self {
            Instance::Box(_) => LabelKind::Box,
            Instance::Polygon(_) => LabelKind::Polygon,
            Instance::Keypoints(_) => LabelKind::Keypoints,
        }
    }
}

impl From<BoxAnnotation> for Instance {
    fn from(value: BoxAnnotation) -> Self {
        Instance::Box(value)
    }
}

impl From<PolygonAnnotation> for Instance {
    fn from(value: PolygonAnnotation) -> Self {
        Instance::Polygon(value)
    }
}

impl From<KeypointsAnnotation> for Instance {
    fn from(value: KeypointsAnnotation) -> Self {
        Instance::Keypoints(value)
    }
}

/// An image raster and its instances.
///
/// Samples are never mutated after construction; every augmentation
/// variant starts from the same untransformed sample.
#[derive(Clone, Debug)]
pub struct Sample {
    pub image: RgbImage,
    pub instances: Vec<Instance>,
}

impl Sample {
    pub fn new(image: RgbImage, instances: Vec<Instance>) -> Self {
        Self { image, instances }
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Channel count of the working raster.
    #[inline]
    pub fn channels(&self) -> u8 {
        3
    }
}

/// Names of the 17 COCO person keypoints, in slot order.
pub const COCO_KEYPOINT_NAMES: [&str; 17] = [
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

/// The fixed slot layout of keypoint instances.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Skeleton {
    names: Vec<String>,
}

impl Skeleton {
    /// The 17-point COCO person skeleton.
    pub fn coco17() -> Self {
        Self {
            names: COCO_KEYPOINT_NAMES.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// A skeleton with `slots` points; COCO names are reused for 17 slots.
    pub fn with_slots(slots: usize) -> Self {
        if slots == COCO_KEYPOINT_NAMES.len() {
            return Self::coco17();
        }
        Self {
            names: (0..slots).map(|i| format!("kp{}", i)).collect(),
        }
    }

    /// Number of slots.
    #[inline]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn name(&self, slot: usize) -> Option<&str> {
        self.names.get(slot).map(String::as_str)
    }
}

impl Default for Skeleton {
    fn default() -> Self {
        Self::coco17()
    }
}

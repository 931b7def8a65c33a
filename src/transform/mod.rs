//! Transform pipeline.
//!
//! A [`TransformSet`] is one fixed realization of a [`TransformSpec`]: an
//! ordered list of [`Operation`]s whose random parameters have already been
//! drawn. Applying it moves the raster and the whole annotation payload in
//! lockstep:
//!
//! - boxes travel as their four corners,
//! - keypoints travel as `(slot, position)` pairs so slot identity survives
//!   reordering and removal,
//! - polygons travel either as vertex lists or through the mask bridge,
//!   selected by [`PolygonPath`].
//!
//! Application is atomic. Every step works on fresh values and any failure
//! returns `Err` before the caller sees a partial result.

mod geometric;
mod photometric;
mod spec;

use std::fmt;

use image::{GrayImage, RgbImage};
use serde::{Deserialize, Serialize};

use crate::error::LabelaugError;
use crate::ir::{mask, Coord, Instance, Mask, Pixel, PolygonAnnotation, Sample};

pub use geometric::{Crop, GridDistortion, HorizontalFlip, Rotate90, VerticalFlip, Warp};
pub use photometric::{
    BrightnessContrast, GaussianBlur, GaussianNoise, HueSaturationValue, ToGray,
};
pub use spec::{default_transform_sets, OperationSpec, ParamRange, StepSpec, TransformSpec};

/// One concrete, fully parameterized image operation.
///
/// Photometric operations only implement [`Operation::apply_image`]; the
/// defaults leave masks and coordinates untouched.
pub trait Operation: fmt::Debug + Send + Sync {
    /// Short name used in logs and error messages.
    fn name(&self) -> &str;

    /// Raster size after this operation for an input of the given size.
    fn output_size(&self, width: u32, height: u32) -> (u32, u32) {
        (width, height)
    }

    fn apply_image(&self, image: &RgbImage) -> Result<RgbImage, LabelaugError>;

    /// Transform a class mask. Implementations must not blend class values.
    fn apply_mask(&self, mask: &GrayImage) -> Result<GrayImage, LabelaugError> {
        Ok(mask.clone())
    }

    /// Map a point given in continuous pixel coordinates of a
    /// `width` x `height` input.
    fn map_point(
        &self,
        point: Coord<Pixel>,
        _width: u32,
        _height: u32,
    ) -> Result<Coord<Pixel>, LabelaugError> {
        Ok(point)
    }

    /// Whether keypoints that fall outside the output frame stop being
    /// tracked after this operation.
    fn drops_points_outside(&self) -> bool {
        false
    }
}

/// How polygons are carried through geometric operations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum PolygonPath {
    /// Rasterize, transform the mask with the image, trace contours back.
    #[default]
    Mask,
    /// Map vertices directly and clip them to the frame.
    Coordinates,
}

/// A box instance in flight.
#[derive(Clone, Debug, PartialEq)]
pub struct TrackedBox {
    /// Index into the source sample's instances.
    pub instance: usize,
    pub corners: [Coord<Pixel>; 4],
}

/// A labeled keypoint in flight.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrackedPoint {
    pub slot: usize,
    pub position: Coord<Pixel>,
}

/// A keypoint instance in flight.
#[derive(Clone, Debug, PartialEq)]
pub struct TrackedKeypoints {
    pub instance: usize,
    pub bbox_corners: [Coord<Pixel>; 4],
    pub points: Vec<TrackedPoint>,
}

/// A polygon in flight on the coordinate path.
#[derive(Clone, Debug, PartialEq)]
pub struct TrackedPolygon {
    pub instance: usize,
    pub vertices: Vec<Coord<Pixel>>,
}

/// Polygons in flight; the representation never changes mid-pipeline.
#[derive(Clone, Debug, PartialEq)]
pub enum PolygonPayload {
    Coordinates(Vec<TrackedPolygon>),
    Mask(Mask),
}

impl PolygonPayload {
    /// True when nothing needs to move with the raster.
    fn is_empty(&self) -> bool {
        match self {
            PolygonPayload::Coordinates(polys) => polys.is_empty(),
            PolygonPayload::Mask(_) => false,
        }
    }
}

/// All annotations of one sample, in pipeline representation.
#[derive(Clone, Debug, PartialEq)]
pub struct Payload {
    pub boxes: Vec<TrackedBox>,
    pub keypoints: Vec<TrackedKeypoints>,
    pub polygons: PolygonPayload,
}

impl Payload {
    /// Lift the instances of `sample` into pixel space.
    ///
    /// Keypoints whose visibility is `Absent` are not tracked.
    pub fn from_sample(sample: &Sample, path: PolygonPath) -> Result<Self, LabelaugError> {
        let (w, h) = (sample.width() as f64, sample.height() as f64);
        let mut boxes = Vec::new();
        let mut keypoints = Vec::new();
        let mut polygons = Vec::new();

        for (index, instance) in sample.instances.iter().enumerate() {
            match instance {
                Instance::Box(b) => boxes.push(TrackedBox {
                    instance: index,
                    corners: b.bbox.to_pixel(w, h).corners(),
                }),
                Instance::Keypoints(k) => keypoints.push(TrackedKeypoints {
                    instance: index,
                    bbox_corners: k.bbox.to_pixel(w, h).corners(),
                    points: k
                        .keypoints
                        .iter()
                        .enumerate()
                        .filter(|(_, kp)| kp.visibility.is_labeled())
                        .map(|(slot, kp)| TrackedPoint {
                            slot,
                            position: kp.position.to_pixel(w, h),
                        })
                        .collect(),
                }),
                Instance::Polygon(p) => polygons.push((index, p)),
            }
        }

        let polygons = match path {
            PolygonPath::Mask if !polygons.is_empty() => {
                let annotations: Vec<PolygonAnnotation> =
                    polygons.iter().map(|(_, p)| (*p).clone()).collect();
                PolygonPayload::Mask(mask::rasterize(
                    &annotations,
                    sample.width(),
                    sample.height(),
                )?)
            }
            _ => PolygonPayload::Coordinates(
                polygons
                    .into_iter()
                    .map(|(index, p)| TrackedPolygon {
                        instance: index,
                        vertices: p.vertices.iter().map(|v| v.to_pixel(w, h)).collect(),
                    })
                    .collect(),
            ),
        };

        Ok(Self {
            boxes,
            keypoints,
            polygons,
        })
    }

    fn has_coordinates(&self) -> bool {
        !self.boxes.is_empty() || !self.keypoints.is_empty() || !self.polygons.is_empty()
    }
}

/// The result of applying a transform set to a sample.
#[derive(Clone, Debug)]
pub struct Transformed {
    pub image: RgbImage,
    pub payload: Payload,
    /// Names of the operations that ran, in order.
    pub applied: Vec<String>,
}

impl Transformed {
    #[inline]
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// A realized, named sequence of operations.
#[derive(Debug)]
pub struct TransformSet {
    name: String,
    operations: Vec<Box<dyn Operation>>,
}

impl TransformSet {
    pub fn new(name: impl Into<String>, operations: Vec<Box<dyn Operation>>) -> Self {
        Self {
            name: name.into(),
            operations,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn operations(&self) -> &[Box<dyn Operation>] {
        &self.operations
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Apply every operation to the raster and payload of `sample`.
    ///
    /// The sample itself is left untouched.
    pub fn apply(&self, sample: &Sample, path: PolygonPath) -> Result<Transformed, LabelaugError> {
        let mut payload = Payload::from_sample(sample, path)?;
        let mut image = sample.image.clone();
        let mut applied = Vec::with_capacity(self.operations.len());

        for op in &self.operations {
            let (w, h) = image.dimensions();
            let (out_w, out_h) = op.output_size(w, h);
            if out_w == 0 || out_h == 0 {
                return Err(LabelaugError::transform(
                    op.name(),
                    format!("empty output for {}x{} input", w, h),
                ));
            }

            let next = op.apply_image(&image)?;
            if next.dimensions() != (out_w, out_h) {
                return Err(LabelaugError::transform(
                    op.name(),
                    format!(
                        "produced {}x{} image, expected {}x{}",
                        next.width(),
                        next.height(),
                        out_w,
                        out_h
                    ),
                ));
            }

            if payload.has_coordinates() {
                move_payload(op.as_ref(), &mut payload, (w, h), (out_w, out_h))?;
            }
            image = next;
            applied.push(op.name().to_string());
        }

        Ok(Transformed {
            image,
            payload,
            applied,
        })
    }
}

fn move_payload(
    op: &dyn Operation,
    payload: &mut Payload,
    (w, h): (u32, u32),
    (out_w, out_h): (u32, u32),
) -> Result<(), LabelaugError> {
    let map = |p: Coord<Pixel>| -> Result<Coord<Pixel>, LabelaugError> {
        let q = op.map_point(p, w, h)?;
        if q.is_finite() {
            Ok(q)
        } else {
            Err(LabelaugError::transform(
                op.name(),
                "mapped a coordinate to a non-finite value",
            ))
        }
    };

    for tracked in &mut payload.boxes {
        for corner in &mut tracked.corners {
            *corner = map(*corner)?;
        }
    }

    for tracked in &mut payload.keypoints {
        for corner in &mut tracked.bbox_corners {
            *corner = map(*corner)?;
        }
        for point in &mut tracked.points {
            point.position = map(point.position)?;
        }
        if op.drops_points_outside() {
            tracked
                .points
                .retain(|p| inside_frame(p.position, out_w, out_h));
        }
    }

    match &mut payload.polygons {
        PolygonPayload::Coordinates(polys) => {
            for poly in polys {
                for v in &mut poly.vertices {
                    *v = map(*v)?;
                }
            }
        }
        PolygonPayload::Mask(current) => {
            let moved = op.apply_mask(current.as_image())?;
            if moved.dimensions() != (out_w, out_h) {
                return Err(LabelaugError::transform(
                    op.name(),
                    format!(
                        "produced {}x{} mask, expected {}x{}",
                        moved.width(),
                        moved.height(),
                        out_w,
                        out_h
                    ),
                ));
            }
            *current = Mask::from_image(moved);
        }
    }

    Ok(())
}

/// Whether `p` lies within the closed frame `[0, width] x [0, height]`.
pub fn inside_frame(p: Coord<Pixel>, width: u32, height: u32) -> bool {
    p.x >= 0.0 && p.y >= 0.0 && p.x <= width as f64 && p.y <= height as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BBoxXYXY, BoxAnnotation, Keypoint, KeypointsAnnotation, Visibility};

    #[derive(Debug)]
    struct Failing;

    impl Operation for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn apply_image(&self, _image: &RgbImage) -> Result<RgbImage, LabelaugError> {
            Err(LabelaugError::transform("failing", "always fails"))
        }
    }

    #[derive(Debug)]
    struct WrongSize;

    impl Operation for WrongSize {
        fn name(&self) -> &str {
            "wrong_size"
        }

        fn apply_image(&self, _image: &RgbImage) -> Result<RgbImage, LabelaugError> {
            Ok(RgbImage::new(1, 1))
        }
    }

    fn box_sample() -> Sample {
        Sample::new(
            RgbImage::new(100, 50),
            vec![BoxAnnotation::from_cxcywh(0u32, 0.25, 0.5, 0.2, 0.4).into()],
        )
    }

    #[test]
    fn empty_set_is_identity() {
        let sample = box_sample();
        let out = TransformSet::new("noop", vec![])
            .apply(&sample, PolygonPath::Mask)
            .expect("apply");
        assert_eq!(out.image.dimensions(), (100, 50));
        assert_eq!(out.payload.boxes.len(), 1);
        assert_eq!(
            out.payload.boxes[0].corners,
            BBoxXYXY::<Pixel>::from_xyxy(15.0, 15.0, 35.0, 35.0).corners()
        );
        assert!(out.applied.is_empty());
    }

    #[test]
    fn failure_aborts_whole_set() {
        let sample = box_sample();
        let set = TransformSet::new(
            "broken",
            vec![Box::new(HorizontalFlip), Box::new(Failing)],
        );
        let err = set.apply(&sample, PolygonPath::Mask).unwrap_err();
        assert!(matches!(err, LabelaugError::Transform { .. }));
    }

    #[test]
    fn size_mismatch_is_a_transform_error() {
        let set = TransformSet::new("bad", vec![Box::new(WrongSize)]);
        let err = set.apply(&box_sample(), PolygonPath::Mask).unwrap_err();
        assert!(err.to_string().contains("expected 100x50"));
    }

    #[test]
    fn photometric_ops_keep_coordinates() {
        let sample = box_sample();
        let set = TransformSet::new("gray", vec![Box::new(ToGray)]);
        let out = set.apply(&sample, PolygonPath::Mask).expect("apply");
        let before = Payload::from_sample(&sample, PolygonPath::Mask).expect("payload");
        assert_eq!(out.payload, before);
        assert_eq!(out.applied, vec!["to_gray".to_string()]);
    }

    #[test]
    fn absent_keypoints_are_not_tracked() {
        let sample = Sample::new(
            RgbImage::new(10, 10),
            vec![KeypointsAnnotation::new(
                0u32,
                BBoxXYXY::from_cxcywh(0.5, 0.5, 0.5, 0.5),
                vec![
                    Keypoint::new(0.4, 0.4, Visibility::Visible),
                    Keypoint::placeholder(),
                    Keypoint::new(0.6, 0.6, Visibility::Occluded),
                ],
            )
            .into()],
        );
        let payload = Payload::from_sample(&sample, PolygonPath::Mask).expect("payload");
        let slots: Vec<usize> = payload.keypoints[0].points.iter().map(|p| p.slot).collect();
        assert_eq!(slots, vec![0, 2]);
    }

    #[test]
    fn polygons_use_requested_path() {
        let sample = Sample::new(
            RgbImage::new(16, 16),
            vec![PolygonAnnotation::from_points(1u32, &[(0.1, 0.1), (0.9, 0.1), (0.5, 0.9)]).into()],
        );
        let masked = Payload::from_sample(&sample, PolygonPath::Mask).expect("payload");
        assert!(matches!(masked.polygons, PolygonPayload::Mask(_)));
        let coords = Payload::from_sample(&sample, PolygonPath::Coordinates).expect("payload");
        match coords.polygons {
            PolygonPayload::Coordinates(polys) => assert_eq!(polys[0].vertices.len(), 3),
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn crop_stops_tracking_points_outside() {
        let sample = Sample::new(
            RgbImage::new(100, 100),
            vec![KeypointsAnnotation::new(
                0u32,
                BBoxXYXY::from_cxcywh(0.5, 0.5, 0.8, 0.8),
                vec![
                    Keypoint::new(0.2, 0.2, Visibility::Visible),
                    Keypoint::new(0.8, 0.8, Visibility::Visible),
                ],
            )
            .into()],
        );
        let set = TransformSet::new("crop", vec![Box::new(Crop::new(0, 0, 50, 50, None))]);
        let out = set.apply(&sample, PolygonPath::Mask).expect("apply");
        let slots: Vec<usize> = out.payload.keypoints[0]
            .points
            .iter()
            .map(|p| p.slot)
            .collect();
        assert_eq!(slots, vec![0]);
        assert_eq!(out.image.dimensions(), (50, 50));
    }
}

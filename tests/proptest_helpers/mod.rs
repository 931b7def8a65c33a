#![allow(dead_code)]

use std::f64::consts::TAU;

use labelaug::ir::{
    BBoxXYXY, BoxAnnotation, Instance, Keypoint, KeypointsAnnotation, PolygonAnnotation,
    Visibility,
};
use labelaug::transform::{OperationSpec, ParamRange, StepSpec, TransformSpec};
use proptest::prelude::*;
use proptest::strategy::BoxedStrategy;
use proptest::test_runner::{Config as ProptestConfig, FileFailurePersistence};

/// Six decimal places on the wire: half a unit in the last place, plus slack.
pub const EPS_LABEL_TEXT: f64 = 1e-6;

pub fn proptest_config() -> ProptestConfig {
    let cases = std::env::var("PROPTEST_CASES")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(64);

    let mut config = ProptestConfig::with_failure_persistence(FileFailurePersistence::WithSource(
        "proptest-regressions",
    ));
    config.cases = cases;
    config.max_shrink_iters = 1024;
    config
}

pub fn arb_class_id() -> impl Strategy<Value = u32> {
    0u32..20
}

/// A box with positive area inside the unit square.
pub fn arb_box() -> BoxedStrategy<BoxAnnotation> {
    (arb_class_id(), 0.0f64..0.9, 0.0f64..0.9, 0.01f64..0.5, 0.01f64..0.5)
        .prop_map(|(class_id, x0, y0, w, h)| {
            let bbox = BBoxXYXY::from_xyxy(x0, y0, (x0 + w).min(1.0), (y0 + h).min(1.0));
            BoxAnnotation::new(class_id, bbox)
        })
        .boxed()
}

/// An arbitrary (possibly self-intersecting) polygon in the unit square.
pub fn arb_polygon() -> BoxedStrategy<PolygonAnnotation> {
    (
        arb_class_id(),
        prop::collection::vec((0.0f64..=1.0, 0.0f64..=1.0), 3..10),
    )
        .prop_map(|(class_id, points)| PolygonAnnotation::from_points(class_id, &points))
        .boxed()
}

/// A convex regular polygon at least `min_radius_px` in pixel radius that
/// fits inside a `width` x `height` frame with a one-pixel margin.
pub fn arb_regular_polygon(
    width: u32,
    height: u32,
    min_radius_px: f64,
) -> BoxedStrategy<PolygonAnnotation> {
    let (w, h) = (width as f64, height as f64);
    let max_radius = (w.min(h) / 2.0 - 2.0).max(min_radius_px);
    (
        0u32..250,
        3usize..9,
        min_radius_px..=max_radius,
        0.0f64..TAU,
        0.0f64..=1.0,
        0.0f64..=1.0,
    )
        .prop_map(move |(class_id, sides, radius, phase, fx, fy)| {
            let cx = 1.0 + radius + fx * (w - 2.0 - 2.0 * radius).max(0.0);
            let cy = 1.0 + radius + fy * (h - 2.0 - 2.0 * radius).max(0.0);
            let points: Vec<(f64, f64)> = (0..sides)
                .map(|i| {
                    let angle = phase + TAU * i as f64 / sides as f64;
                    (
                        (cx + radius * angle.cos()) / w,
                        (cy + radius * angle.sin()) / h,
                    )
                })
                .collect();
            PolygonAnnotation::from_points(class_id, &points)
        })
        .boxed()
}

pub fn arb_visibility() -> impl Strategy<Value = Visibility> {
    prop_oneof![
        Just(Visibility::Absent),
        Just(Visibility::Occluded),
        Just(Visibility::Visible),
    ]
}

/// One keypoint instance with exactly `slots` slots. Labeled points lie in
/// the unit square; absent ones carry the placeholder position.
pub fn arb_keypoints(slots: usize) -> BoxedStrategy<KeypointsAnnotation> {
    (
        arb_class_id(),
        prop::collection::vec((0.0f64..=1.0, 0.0f64..=1.0, arb_visibility()), slots),
    )
        .prop_map(|(class_id, raw)| {
            let keypoints: Vec<Keypoint> = raw
                .into_iter()
                .map(|(x, y, v)| match v {
                    Visibility::Absent => Keypoint::placeholder(),
                    v => Keypoint::new(x, y, v),
                })
                .collect();
            KeypointsAnnotation::new(class_id, BBoxXYXY::from_xyxy(0.1, 0.1, 0.9, 0.9), keypoints)
        })
        .boxed()
}

pub fn arb_box_instances(max: usize) -> BoxedStrategy<Vec<Instance>> {
    prop::collection::vec(arb_box().prop_map(Instance::from), 0..=max).boxed()
}

pub fn arb_polygon_instances(max: usize) -> BoxedStrategy<Vec<Instance>> {
    prop::collection::vec(arb_polygon().prop_map(Instance::from), 0..=max).boxed()
}

/// Geometric operations with moderate parameters.
pub fn arb_geometric_op() -> BoxedStrategy<OperationSpec> {
    prop_oneof![
        Just(OperationSpec::HorizontalFlip),
        Just(OperationSpec::VerticalFlip),
        Just(OperationSpec::Rotate90),
        (-30.0f64..30.0, 0.8f64..1.2, -0.2f64..0.2).prop_map(|(rotate, scale, translate)| {
            OperationSpec::Affine {
                rotate: ParamRange::fixed(rotate),
                scale: ParamRange::fixed(scale),
                translate: ParamRange::fixed(translate),
                shear: ParamRange::default(),
            }
        }),
        (0.0f64..45.0).prop_map(|limit| OperationSpec::Rotate { limit }),
        (0.5f64..=1.0).prop_map(|s| OperationSpec::RandomCrop {
            scale: ParamRange::fixed(s),
            resize: None,
        }),
        Just(OperationSpec::Perspective {
            scale: ParamRange(0.0, 0.1),
        }),
        (1u32..=8, 0.0f64..0.5).prop_map(|(num_steps, limit)| OperationSpec::GridDistortion {
            num_steps,
            distort: ParamRange::symmetric(limit),
        }),
    ]
    .boxed()
}

/// A transform set of one to four geometric operations, each always applied.
pub fn arb_geometric_set() -> BoxedStrategy<TransformSpec> {
    prop::collection::vec(arb_geometric_op(), 1..=4)
        .prop_map(|ops| {
            TransformSpec::new(
                "random",
                ops.into_iter().map(StepSpec::always).collect(),
            )
        })
        .boxed()
}

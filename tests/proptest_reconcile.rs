use image::RgbImage;
use labelaug::ir::{Instance, Sample, Visibility};
use labelaug::reconcile::{reconcile, ReconcileOptions};
use labelaug::transform::{OperationSpec, ParamRange, PolygonPath, StepSpec, TransformSpec};
use labelaug::LabelaugError;
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

mod proptest_helpers;

const WIDTH: u32 = 64;
const HEIGHT: u32 = 48;
const SLOTS: usize = 17;

/// A pure translation by `t` of the frame size on both axes.
fn translation(t: f64) -> TransformSpec {
    TransformSpec::new(
        "shift",
        vec![StepSpec::always(OperationSpec::Affine {
            rotate: ParamRange::default(),
            scale: ParamRange::fixed(1.0),
            translate: ParamRange::fixed(t),
            shear: ParamRange::default(),
        })],
    )
}

proptest! {
    #![proptest_config(proptest_helpers::proptest_config())]

    #[test]
    fn keypoint_slots_survive_any_geometric_set(
        keypoints in proptest_helpers::arb_keypoints(SLOTS),
        spec in proptest_helpers::arb_geometric_set(),
        seed in any::<u64>(),
    ) {
        let sample = Sample::new(RgbImage::new(WIDTH, HEIGHT), vec![keypoints.clone().into()]);
        let mut rng = StdRng::seed_from_u64(seed);
        let set = spec.realize(&mut rng, WIDTH, HEIGHT).expect("realize");
        let moved = set.apply(&sample, PolygonPath::Mask).expect("apply");

        let options = ReconcileOptions { min_visibility: 0.3, keypoint_slots: SLOTS };
        let reconciled = match reconcile(&sample, &moved, &options) {
            Ok(reconciled) => reconciled,
            Err(LabelaugError::KeypointInstanceLost { .. }) => return Ok(()),
            Err(err) => return Err(TestCaseError::fail(err.to_string())),
        };

        prop_assert_eq!(reconciled.instances.len(), 1);
        let Instance::Keypoints(out) = &reconciled.instances[0] else {
            return Err(TestCaseError::fail("expected a keypoint instance"));
        };
        prop_assert_eq!(out.keypoints.len(), SLOTS);
        prop_assert_eq!(out.class_id, keypoints.class_id);
        for (before, after) in keypoints.keypoints.iter().zip(&out.keypoints) {
            prop_assert!(after.position.is_in_unit_square(), "{:?}", after);
            if before.visibility == Visibility::Absent {
                prop_assert_eq!(after.visibility, Visibility::Absent);
            } else {
                prop_assert!(
                    after.visibility == before.visibility || after.visibility == Visibility::Absent,
                    "{:?} became {:?}", before.visibility, after.visibility
                );
            }
        }
    }

    #[test]
    fn lossless_geometry_keeps_every_box(
        instances in proptest_helpers::arb_box_instances(8),
        turns_op in prop_oneof![
            Just(OperationSpec::HorizontalFlip),
            Just(OperationSpec::VerticalFlip),
            Just(OperationSpec::Rotate90),
        ],
        seed in any::<u64>(),
    ) {
        let sample = Sample::new(RgbImage::new(WIDTH, HEIGHT), instances.clone());
        let spec = TransformSpec::new("lossless", vec![StepSpec::always(turns_op)]);
        let mut rng = StdRng::seed_from_u64(seed);
        let set = spec.realize(&mut rng, WIDTH, HEIGHT).expect("realize");
        let moved = set.apply(&sample, PolygonPath::Mask).expect("apply");
        let reconciled = reconcile(&sample, &moved, &ReconcileOptions::default()).expect("reconcile");

        prop_assert_eq!(reconciled.instances.len(), instances.len());
        prop_assert_eq!(reconciled.summary.boxes_dropped, 0);
        for (before, after) in instances.iter().zip(&reconciled.instances) {
            prop_assert_eq!(before.class_id(), after.class_id());
        }
    }

    #[test]
    fn translated_box_follows_visible_fraction(
        x0 in 0.0f64..0.8,
        y0 in 0.0f64..0.8,
        bw in 0.05f64..0.2,
        bh in 0.05f64..0.2,
        t in -0.9f64..0.9,
        min_visibility in 0.05f64..0.95,
    ) {
        let (w, h) = (WIDTH as f64, HEIGHT as f64);
        let (x1, y1) = (x0 + bw, y0 + bh);

        // Expected visible fraction, computed directly in pixels. Warps run
        // in f32, hence the loose tolerances below.
        let shifted = [(x0 + t) * w, (y0 + t) * h, (x1 + t) * w, (y1 + t) * h];
        let clipped = [
            shifted[0].clamp(0.0, w),
            shifted[1].clamp(0.0, h),
            shifted[2].clamp(0.0, w),
            shifted[3].clamp(0.0, h),
        ];
        let visible = (clipped[2] - clipped[0]).max(0.0) * (clipped[3] - clipped[1]).max(0.0);
        let fraction = visible / ((shifted[2] - shifted[0]) * (shifted[3] - shifted[1]));
        prop_assume!((fraction - min_visibility).abs() > 1e-4);

        let bbox = labelaug::ir::BBoxXYXY::from_xyxy(x0, y0, x1, y1);
        let sample = Sample::new(
            RgbImage::new(WIDTH, HEIGHT),
            vec![labelaug::ir::BoxAnnotation::new(0u32, bbox).into()],
        );
        let mut rng = StdRng::seed_from_u64(0);
        let set = translation(t).realize(&mut rng, WIDTH, HEIGHT).expect("realize");
        let moved = set.apply(&sample, PolygonPath::Mask).expect("apply");
        let options = ReconcileOptions { min_visibility, keypoint_slots: SLOTS };
        let reconciled = reconcile(&sample, &moved, &options).expect("reconcile");

        if fraction >= min_visibility {
            prop_assert_eq!(reconciled.instances.len(), 1);
            let Instance::Box(out) = &reconciled.instances[0] else {
                return Err(TestCaseError::fail("expected a box"));
            };
            prop_assert!((out.bbox.xmin() - clipped[0] / w).abs() < 1e-5);
            prop_assert!((out.bbox.ymin() - clipped[1] / h).abs() < 1e-5);
            prop_assert!((out.bbox.xmax() - clipped[2] / w).abs() < 1e-5);
            prop_assert!((out.bbox.ymax() - clipped[3] / h).abs() < 1e-5);
        } else {
            prop_assert!(reconciled.instances.is_empty());
            prop_assert_eq!(reconciled.summary.boxes_dropped, 1);
        }
    }
}

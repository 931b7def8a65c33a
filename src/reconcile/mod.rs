//! Post-transform reconciliation.
//!
//! Turns a [`Transformed`] payload back into label instances that satisfy
//! the per-variant invariants:
//!
//! - a box is kept only while its visible fraction reaches the threshold,
//! - a keypoint instance always has exactly `keypoint_slots` slots, and a
//!   point that left the frame is hidden (visibility can only go down),
//! - a polygon is kept only with at least three vertices.
//!
//! Output order follows the source instances; polygons traced back out of
//! a mask come last, in ascending class order.

mod report;

pub use report::LossSummary;

use log::debug;

use crate::error::LabelaugError;
use crate::ir::{
    mask, BBoxXYXY, BoxAnnotation, Coord, Instance, Keypoint, KeypointsAnnotation, Mask,
    Normalized, Pixel, PolygonAnnotation, Sample, Visibility,
};
use crate::transform::{PolygonPayload, TrackedKeypoints, Transformed};

/// Tolerance for points that sit on the frame edge up to rounding.
const EDGE_EPS: f64 = 1e-9;

/// Knobs that shape reconciliation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ReconcileOptions {
    /// Minimum visible area fraction for a box to survive.
    pub min_visibility: f64,
    /// Number of slots every keypoint instance is rebuilt to.
    pub keypoint_slots: usize,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            min_visibility: 0.3,
            keypoint_slots: 17,
        }
    }
}

/// The label side of one finished variant.
#[derive(Clone, Debug)]
pub struct Reconciled {
    pub instances: Vec<Instance>,
    /// The transformed class mask when polygons went through the mask path.
    pub mask: Option<Mask>,
    pub summary: LossSummary,
}

/// Rebuild the instances of `source` from its transformed payload.
///
/// Fails only when a keypoint instance has no area left in the frame,
/// since keypoint labels must carry exactly one instance.
pub fn reconcile(
    source: &Sample,
    transformed: &Transformed,
    options: &ReconcileOptions,
) -> Result<Reconciled, LabelaugError> {
    let (w, h) = (transformed.width() as f64, transformed.height() as f64);
    let payload = &transformed.payload;
    let mut summary = LossSummary::default();
    let mut ordered: Vec<(usize, Instance)> = Vec::new();

    for tracked in &payload.boxes {
        summary.boxes_in += 1;
        let Some(Instance::Box(original)) = source.instances.get(tracked.instance) else {
            continue;
        };
        match reconcile_box(&tracked.corners, w, h, options.min_visibility) {
            Some(bbox) => ordered.push((
                tracked.instance,
                BoxAnnotation::new(original.class_id, bbox).into(),
            )),
            None => {
                summary.boxes_dropped += 1;
                debug!(
                    "dropped box #{} of class {}: below visibility {}",
                    tracked.instance, original.class_id, options.min_visibility
                );
            }
        }
    }

    for tracked in &payload.keypoints {
        let Some(Instance::Keypoints(original)) = source.instances.get(tracked.instance) else {
            continue;
        };
        let rebuilt = reconcile_keypoints(original, tracked, w, h, options, &mut summary)?;
        ordered.push((tracked.instance, rebuilt.into()));
    }

    let mut traced = Vec::new();
    let mask = match &payload.polygons {
        PolygonPayload::Coordinates(polys) => {
            for tracked in polys {
                summary.polygons_in += 1;
                let Some(Instance::Polygon(original)) = source.instances.get(tracked.instance)
                else {
                    continue;
                };
                match clip_polygon(&tracked.vertices, w, h) {
                    Some(vertices) => {
                        summary.polygons_out += 1;
                        ordered.push((
                            tracked.instance,
                            PolygonAnnotation::new(original.class_id, vertices).into(),
                        ));
                    }
                    None => debug!(
                        "dropped polygon #{} of class {}: fewer than {} vertices in frame",
                        tracked.instance,
                        original.class_id,
                        PolygonAnnotation::MIN_VERTICES
                    ),
                }
            }
            None
        }
        PolygonPayload::Mask(moved) => {
            summary.polygons_in += source
                .instances
                .iter()
                .filter(|i| matches!(i, Instance::Polygon(_)))
                .count();
            traced = mask::vectorize(moved);
            summary.polygons_out += traced.len();
            Some(moved.clone())
        }
    };

    ordered.sort_by_key(|(index, _)| *index);
    let mut instances: Vec<Instance> = ordered.into_iter().map(|(_, i)| i).collect();
    instances.extend(traced.into_iter().map(Instance::from));

    Ok(Reconciled {
        instances,
        mask,
        summary,
    })
}

/// Envelope, clip and threshold one box.
///
/// The visible fraction is the clipped area over the area of the
/// transformed, unclipped envelope.
fn reconcile_box(
    corners: &[Coord<Pixel>; 4],
    width: f64,
    height: f64,
    min_visibility: f64,
) -> Option<BBoxXYXY<Normalized>> {
    let moved = BBoxXYXY::envelope(corners)?;
    let full = moved.area();
    if full <= 0.0 {
        return None;
    }
    let clipped = moved.clip(0.0, 0.0, width, height);
    if !clipped.has_area() {
        return None;
    }
    if clipped.area() / full < min_visibility {
        return None;
    }
    Some(clipped.to_normalized(width, height))
}

fn reconcile_keypoints(
    original: &KeypointsAnnotation,
    tracked: &TrackedKeypoints,
    width: f64,
    height: f64,
    options: &ReconcileOptions,
    summary: &mut LossSummary,
) -> Result<KeypointsAnnotation, LabelaugError> {
    let lost = || LabelaugError::KeypointInstanceLost {
        class_id: original.class_id.as_u32(),
    };
    let bbox = BBoxXYXY::envelope(&tracked.bbox_corners)
        .map(|b| b.clip(0.0, 0.0, width, height))
        .filter(|b| b.has_area())
        .ok_or_else(lost)?
        .to_normalized(width, height);

    let mut slots = vec![Keypoint::placeholder(); options.keypoint_slots];
    let mut filled = vec![false; options.keypoint_slots];
    for point in &tracked.points {
        let before = original.keypoints.get(point.slot);
        let (Some(slot), Some(before)) = (slots.get_mut(point.slot), before) else {
            continue;
        };
        let position = point.position.to_normalized(width, height);
        filled[point.slot] = true;
        if in_unit_square(position) {
            *slot = Keypoint {
                position: position.clamped(),
                visibility: before.visibility,
            };
        } else {
            *slot = Keypoint {
                position: position.clamped(),
                visibility: Visibility::Absent,
            };
            summary.keypoints_hidden += 1;
            debug!(
                "hid keypoint slot {} of class {}: left the frame",
                point.slot, original.class_id
            );
        }
    }
    summary.keypoint_placeholders += filled.iter().filter(|f| !**f).count();

    Ok(KeypointsAnnotation::new(original.class_id, bbox, slots))
}

fn in_unit_square(p: Coord<Normalized>) -> bool {
    (-EDGE_EPS..=1.0 + EDGE_EPS).contains(&p.x) && (-EDGE_EPS..=1.0 + EDGE_EPS).contains(&p.y)
}

/// Clip a ring to the frame (Sutherland-Hodgman) and normalize it.
///
/// `None` when fewer than three distinct vertices or no area remain.
fn clip_polygon(vertices: &[Coord<Pixel>], width: f64, height: f64) -> Option<Vec<Coord<Normalized>>> {
    let edges = [
        (Edge::Left, 0.0),
        (Edge::Right, width),
        (Edge::Top, 0.0),
        (Edge::Bottom, height),
    ];

    let mut ring: Vec<Coord<Pixel>> = vertices.to_vec();
    for (edge, limit) in edges {
        if ring.is_empty() {
            break;
        }
        let mut out = Vec::with_capacity(ring.len() + 4);
        for i in 0..ring.len() {
            let cur = ring[i];
            let prev = ring[(i + ring.len() - 1) % ring.len()];
            let (cur_in, prev_in) = (edge.inside(cur, limit), edge.inside(prev, limit));
            if cur_in {
                if !prev_in {
                    out.push(edge.intersect(prev, cur, limit));
                }
                out.push(cur);
            } else if prev_in {
                out.push(edge.intersect(prev, cur, limit));
            }
        }
        ring = out;
    }

    ring.dedup_by(|a, b| (a.x - b.x).abs() < EDGE_EPS && (a.y - b.y).abs() < EDGE_EPS);
    while ring.len() > 1 {
        let (first, last) = (ring[0], ring[ring.len() - 1]);
        if (first.x - last.x).abs() < EDGE_EPS && (first.y - last.y).abs() < EDGE_EPS {
            ring.pop();
        } else {
            break;
        }
    }
    if ring.len() < PolygonAnnotation::MIN_VERTICES || shoelace_area(&ring) <= EDGE_EPS {
        return None;
    }

    Some(
        ring.into_iter()
            .map(|p| p.to_normalized(width, height).clamped())
            .collect(),
    )
}

#[derive(Clone, Copy)]
enum Edge {
    Left,
    Right,
    Top,
    Bottom,
}

impl Edge {
    fn inside(self, p: Coord<Pixel>, limit: f64) -> bool {
        match self {
            Edge::Left => p.x >= limit,
            Edge::Right => p.x <= limit,
            Edge::Top => p.y >= limit,
            Edge::Bottom => p.y <= limit,
        }
    }

    fn intersect(self, a: Coord<Pixel>, b: Coord<Pixel>, limit: f64) -> Coord<Pixel> {
        match self {
            Edge::Left | Edge::Right => {
                let t = (limit - a.x) / (b.x - a.x);
                Coord::new(limit, a.y + t * (b.y - a.y))
            }
            Edge::Top | Edge::Bottom => {
                let t = (limit - a.y) / (b.y - a.y);
                Coord::new(a.x + t * (b.x - a.x), limit)
            }
        }
    }
}

fn shoelace_area(ring: &[Coord<Pixel>]) -> f64 {
    let n = ring.len();
    let twice: f64 = (0..n)
        .map(|i| {
            let (a, b) = (ring[i], ring[(i + 1) % n]);
            a.x * b.y - b.x * a.y
        })
        .sum();
    twice.abs() / 2.0
}

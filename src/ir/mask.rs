//! Polygon ↔ raster mask bridge.
//!
//! Pixel-domain transforms (warps, crops, distortions) cannot move vector
//! polygons directly, so polygons are painted into a class mask, the mask is
//! transformed together with the image, and contours are traced back out.
//!
//! Mask pixel value is `class_id + 1`; `0` is background. When polygons
//! overlap, the later polygon in list order wins.

use std::collections::BTreeSet;

use image::{GrayImage, Luma};
use imageproc::contours::{find_contours, BorderType};
use imageproc::drawing::{draw_line_segment_mut, draw_polygon_mut};
use imageproc::point::Point;

use super::model::PolygonAnnotation;
use super::{ClassId, Coord, Normalized};
use crate::error::LabelaugError;

/// Vertices further than this many image sizes outside the frame are pinned.
const FAR_OUTSIDE_FACTOR: f64 = 16.0;

/// A single-channel class mask.
#[derive(Clone, Debug, PartialEq)]
pub struct Mask {
    raster: GrayImage,
}

impl Mask {
    /// An all-background mask.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            raster: GrayImage::new(width, height),
        }
    }

    pub fn from_image(raster: GrayImage) -> Self {
        Self { raster }
    }

    pub fn as_image(&self) -> &GrayImage {
        &self.raster
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.raster.width()
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.raster.height()
    }

    /// Distinct non-background values, ascending.
    pub fn class_values(&self) -> Vec<u8> {
        let values: BTreeSet<u8> = self
            .raster
            .pixels()
            .map(|p| p.0[0])
            .filter(|&v| v != 0)
            .collect();
        values.into_iter().collect()
    }
}

/// Paint `polygons` into a new `width` x `height` mask.
///
/// Fails when a class id cannot be represented in an 8-bit mask.
pub fn rasterize(
    polygons: &[PolygonAnnotation],
    width: u32,
    height: u32,
) -> Result<Mask, LabelaugError> {
    let mut mask = Mask::new(width, height);
    for polygon in polygons {
        let value = polygon
            .class_id
            .mask_value()
            .ok_or(LabelaugError::MaskClassOutOfRange {
                class_id: polygon.class_id.as_u32(),
                max: ClassId::MAX_MASKABLE,
            })?;
        paint_polygon(&mut mask.raster, &polygon.vertices, Luma([value]));
    }
    Ok(mask)
}

/// Trace one polygon per connected component of every class in `mask`.
///
/// Only external borders are traced; holes are not represented. Contours
/// with fewer than three points after collinear compression are dropped.
pub fn vectorize(mask: &Mask) -> Vec<PolygonAnnotation> {
    let (width, height) = (mask.width() as f64, mask.height() as f64);
    let mut polygons = Vec::new();

    for value in mask.class_values() {
        let Some(class_id) = ClassId::from_mask_value(value) else {
            continue;
        };
        let binary = GrayImage::from_fn(mask.width(), mask.height(), |x, y| {
            if mask.raster.get_pixel(x, y).0[0] == value {
                Luma([255])
            } else {
                Luma([0])
            }
        });

        for contour in find_contours::<i32>(&binary) {
            if contour.border_type != BorderType::Outer || contour.parent.is_some() {
                continue;
            }
            let points = compress_chain(&contour.points);
            if points.len() < PolygonAnnotation::MIN_VERTICES {
                continue;
            }
            let vertices = points
                .iter()
                .map(|p| Coord::new(p.x as f64 / width, p.y as f64 / height))
                .collect();
            polygons.push(PolygonAnnotation::new(class_id, vertices));
        }
    }

    polygons
}

fn paint_polygon(canvas: &mut GrayImage, vertices: &[Coord<Normalized>], color: Luma<u8>) {
    let (w, h) = (canvas.width() as f64, canvas.height() as f64);
    let mut points: Vec<Point<i32>> = Vec::with_capacity(vertices.len());
    for v in vertices {
        let x = (v.x * w)
            .floor()
            .clamp(-FAR_OUTSIDE_FACTOR * w, (FAR_OUTSIDE_FACTOR + 1.0) * w);
        let y = (v.y * h)
            .floor()
            .clamp(-FAR_OUTSIDE_FACTOR * h, (FAR_OUTSIDE_FACTOR + 1.0) * h);
        let p = Point::new(x as i32, y as i32);
        if points.last() != Some(&p) {
            points.push(p);
        }
    }
    // imageproc expects an open ring.
    while points.len() > 1 && points.first() == points.last() {
        points.pop();
    }

    match points.len() {
        0 => {}
        1 => {
            let p = points[0];
            let inside = p.x >= 0
                && p.y >= 0
                && (p.x as u32) < canvas.width()
                && (p.y as u32) < canvas.height();
            if inside {
                canvas.put_pixel(p.x as u32, p.y as u32, color);
            }
        }
        2 => draw_line_segment_mut(
            canvas,
            (points[0].x as f32, points[0].y as f32),
            (points[1].x as f32, points[1].y as f32),
            color,
        ),
        _ => draw_polygon_mut(canvas, &points, color),
    }
}

/// Keep only the points where the chain changes direction.
fn compress_chain(points: &[Point<i32>]) -> Vec<Point<i32>> {
    let n = points.len();
    if n < 3 {
        return points.to_vec();
    }

    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        let prev = points[(i + n - 1) % n];
        let cur = points[i];
        let next = points[(i + 1) % n];
        let incoming = (cur.x - prev.x, cur.y - prev.y);
        let outgoing = (next.x - cur.x, next.y - cur.y);
        if incoming != outgoing {
            out.push(cur);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(class_id: u32, x0: f64, y0: f64, x1: f64, y1: f64) -> PolygonAnnotation {
        PolygonAnnotation::from_points(class_id, &[(x0, y0), (x1, y0), (x1, y1), (x0, y1)])
    }

    #[test]
    fn rasterize_paints_class_plus_one() {
        let mask = rasterize(&[square(2, 0.25, 0.25, 0.75, 0.75)], 32, 32).expect("rasterize");
        assert_eq!(mask.as_image().get_pixel(16, 16).0[0], 3);
        assert_eq!(mask.as_image().get_pixel(1, 1).0[0], 0);
        assert_eq!(mask.class_values(), vec![3]);
    }

    #[test]
    fn later_polygon_wins_overlap() {
        let mask = rasterize(
            &[
                square(0, 0.1, 0.1, 0.6, 0.6),
                square(1, 0.4, 0.4, 0.9, 0.9),
            ],
            40,
            40,
        )
        .expect("rasterize");
        // (20, 20) lies in both squares.
        assert_eq!(mask.as_image().get_pixel(20, 20).0[0], 2);
        assert_eq!(mask.as_image().get_pixel(8, 8).0[0], 1);
    }

    #[test]
    fn rasterize_rejects_unmaskable_class() {
        let err = rasterize(&[square(255, 0.1, 0.1, 0.5, 0.5)], 8, 8).unwrap_err();
        assert!(matches!(
            err,
            LabelaugError::MaskClassOutOfRange { class_id: 255, .. }
        ));
    }

    #[test]
    fn square_vectorizes_to_one_polygon() {
        let mask = rasterize(&[square(4, 0.25, 0.25, 0.75, 0.75)], 64, 64).expect("rasterize");
        let polys = vectorize(&mask);
        assert_eq!(polys.len(), 1);
        assert_eq!(polys[0].class_id, ClassId(4));
        assert_eq!(polys[0].vertices.len(), 4);
        for v in &polys[0].vertices {
            assert!(v.x >= 0.2 && v.x <= 0.8, "x out of range: {:?}", v);
            assert!(v.y >= 0.2 && v.y <= 0.8, "y out of range: {:?}", v);
        }
    }

    #[test]
    fn separate_components_give_separate_polygons() {
        let mut raster = GrayImage::new(20, 20);
        for y in 2..6 {
            for x in 2..6 {
                raster.put_pixel(x, y, Luma([1]));
                raster.put_pixel(x + 10, y + 10, Luma([1]));
            }
        }
        let polys = vectorize(&Mask::from_image(raster));
        assert_eq!(polys.len(), 2);
        assert!(polys.iter().all(|p| p.class_id == ClassId(0)));
    }

    #[test]
    fn thin_line_contours_are_dropped() {
        let mut raster = GrayImage::new(20, 20);
        for x in 3..15 {
            raster.put_pixel(x, 7, Luma([5]));
        }
        raster.put_pixel(18, 18, Luma([5]));
        assert!(vectorize(&Mask::from_image(raster)).is_empty());
    }

    #[test]
    fn holes_are_not_represented() {
        let mut raster = GrayImage::new(20, 20);
        for y in 2..18 {
            for x in 2..18 {
                if !(6..14).contains(&x) || !(6..14).contains(&y) {
                    raster.put_pixel(x, y, Luma([1]));
                }
            }
        }
        let polys = vectorize(&Mask::from_image(raster));
        assert_eq!(polys.len(), 1);
    }

    #[test]
    fn compress_chain_keeps_corners() {
        let ring: Vec<Point<i32>> = vec![
            Point::new(0, 0),
            Point::new(1, 0),
            Point::new(2, 0),
            Point::new(2, 1),
            Point::new(2, 2),
            Point::new(1, 2),
            Point::new(0, 2),
            Point::new(0, 1),
        ];
        let out = compress_chain(&ring);
        assert_eq!(
            out,
            vec![
                Point::new(0, 0),
                Point::new(2, 0),
                Point::new(2, 2),
                Point::new(0, 2)
            ]
        );
    }

    #[test]
    fn degenerate_polygons_do_not_panic() {
        let closed = PolygonAnnotation::from_points(
            0u32,
            &[(0.5, 0.5), (0.5, 0.5), (0.5, 0.5)],
        );
        let line = PolygonAnnotation::from_points(0u32, &[(0.1, 0.1), (0.9, 0.1), (0.1, 0.1)]);
        let far = PolygonAnnotation::from_points(0u32, &[(-1e12, 0.0), (1e12, 0.0), (0.0, 1e12)]);
        let mask = rasterize(&[closed, line, far], 16, 16).expect("rasterize");
        assert_eq!(mask.width(), 16);
    }
}

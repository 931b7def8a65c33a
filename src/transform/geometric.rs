//! Operations that move pixels, and with them every coordinate.

use image::imageops::{self, FilterType};
use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::geometric_transformations::{warp, warp_with, Interpolation, Projection};

use super::Operation;
use crate::error::LabelaugError;
use crate::ir::{Coord, Pixel};

/// Mirror left to right.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HorizontalFlip;

impl Operation for HorizontalFlip {
    fn name(&self) -> &str {
        "horizontal_flip"
    }

    fn apply_image(&self, image: &RgbImage) -> Result<RgbImage, LabelaugError> {
        Ok(imageops::flip_horizontal(image))
    }

    fn apply_mask(&self, mask: &GrayImage) -> Result<GrayImage, LabelaugError> {
        Ok(imageops::flip_horizontal(mask))
    }

    fn map_point(
        &self,
        p: Coord<Pixel>,
        width: u32,
        _height: u32,
    ) -> Result<Coord<Pixel>, LabelaugError> {
        Ok(Coord::new(width as f64 - p.x, p.y))
    }
}

/// Mirror top to bottom.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VerticalFlip;

impl Operation for VerticalFlip {
    fn name(&self) -> &str {
        "vertical_flip"
    }

    fn apply_image(&self, image: &RgbImage) -> Result<RgbImage, LabelaugError> {
        Ok(imageops::flip_vertical(image))
    }

    fn apply_mask(&self, mask: &GrayImage) -> Result<GrayImage, LabelaugError> {
        Ok(imageops::flip_vertical(mask))
    }

    fn map_point(
        &self,
        p: Coord<Pixel>,
        _width: u32,
        height: u32,
    ) -> Result<Coord<Pixel>, LabelaugError> {
        Ok(Coord::new(p.x, height as f64 - p.y))
    }
}

/// Rotate clockwise by a whole number of quarter turns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rotate90 {
    turns: u8,
}

impl Rotate90 {
    pub fn new(turns: u8) -> Self {
        Self { turns: turns % 4 }
    }

    pub fn turns(&self) -> u8 {
        self.turns
    }
}

impl Operation for Rotate90 {
    fn name(&self) -> &str {
        "rotate90"
    }

    fn output_size(&self, width: u32, height: u32) -> (u32, u32) {
        if self.turns % 2 == 1 {
            (height, width)
        } else {
            (width, height)
        }
    }

    fn apply_image(&self, image: &RgbImage) -> Result<RgbImage, LabelaugError> {
        Ok(match self.turns {
            1 => imageops::rotate90(image),
            2 => imageops::rotate180(image),
            3 => imageops::rotate270(image),
            _ => image.clone(),
        })
    }

    fn apply_mask(&self, mask: &GrayImage) -> Result<GrayImage, LabelaugError> {
        Ok(match self.turns {
            1 => imageops::rotate90(mask),
            2 => imageops::rotate180(mask),
            3 => imageops::rotate270(mask),
            _ => mask.clone(),
        })
    }

    fn map_point(
        &self,
        p: Coord<Pixel>,
        width: u32,
        height: u32,
    ) -> Result<Coord<Pixel>, LabelaugError> {
        let (w, h) = (width as f64, height as f64);
        Ok(match self.turns {
            1 => Coord::new(h - p.y, p.x),
            2 => Coord::new(w - p.x, h - p.y),
            3 => Coord::new(p.y, w - p.x),
            _ => p,
        })
    }
}

/// imageproc puts pixel centers on integers; [`Pixel`] coordinates put
/// them at `i + 0.5`.
#[inline]
fn to_grid(p: Coord<Pixel>) -> (f32, f32) {
    ((p.x - 0.5) as f32, (p.y - 0.5) as f32)
}

#[inline]
fn from_grid((x, y): (f32, f32)) -> Coord<Pixel> {
    Coord::new(x as f64 + 0.5, y as f64 + 0.5)
}

/// A size-preserving projective warp: affine jitter, free rotation,
/// perspective distortion.
///
/// The same [`Projection`] drives the raster warp and the coordinate
/// mapping. Uncovered output pixels are filled with black (image) or
/// background (mask). Masks are resampled with nearest neighbour so class
/// values never blend.
#[derive(Clone, Copy, Debug)]
pub struct Warp {
    name: &'static str,
    projection: Projection,
}

impl Warp {
    /// `projection` maps input to output positions on imageproc's pixel grid.
    pub fn new(name: &'static str, projection: Projection) -> Self {
        Self { name, projection }
    }

    /// Rotation by `degrees`, scaling by `scale`, shearing by `shear`
    /// degrees along x and translation by a fraction of the frame, all
    /// about the image center.
    pub fn affine(
        width: u32,
        height: u32,
        degrees: f64,
        scale: f64,
        translate: (f64, f64),
        shear: f64,
    ) -> Result<Self, LabelaugError> {
        let (w, h) = (width as f32, height as f32);
        let (cx, cy) = (w / 2.0 - 0.5, h / 2.0 - 0.5);
        let k = (shear as f32).to_radians().tan();
        let shearing = Projection::from_matrix([1.0, k, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0])
            .ok_or_else(|| {
                LabelaugError::transform("affine", format!("shear {} is singular", shear))
            })?;
        let projection = Projection::translate(-cx, -cy)
            .and_then(Projection::scale(scale as f32, scale as f32))
            .and_then(shearing)
            .and_then(Projection::rotate((degrees as f32).to_radians()))
            .and_then(Projection::translate(
                cx + translate.0 as f32 * w,
                cy + translate.1 as f32 * h,
            ));
        Ok(Self::new("affine", projection))
    }

    /// Stretch the quadrilateral `corners` (top-left, top-right,
    /// bottom-right, bottom-left) over the whole frame.
    pub fn perspective(
        width: u32,
        height: u32,
        corners: [(f64, f64); 4],
    ) -> Result<Self, LabelaugError> {
        if !is_convex_quad(&corners) {
            return Err(LabelaugError::transform(
                "perspective",
                "corners do not form a convex quadrilateral",
            ));
        }
        let (w, h) = (width as f64, height as f64);
        let frame = [(0.0, 0.0), (w, 0.0), (w, h), (0.0, h)];
        let on_grid = |(x, y): (f64, f64)| to_grid(Coord::new(x, y));
        let projection = Projection::from_control_points(corners.map(on_grid), frame.map(on_grid))
            .ok_or_else(|| {
                LabelaugError::transform("perspective", "degenerate corner configuration")
            })?;
        Ok(Self::new("perspective", projection))
    }
}

/// Every turn along the outline has the same orientation and none is flat.
fn is_convex_quad(corners: &[(f64, f64); 4]) -> bool {
    let turns: Vec<f64> = (0..4)
        .map(|i| {
            let (ax, ay) = corners[i];
            let (bx, by) = corners[(i + 1) % 4];
            let (cx, cy) = corners[(i + 2) % 4];
            (bx - ax) * (cy - by) - (by - ay) * (cx - bx)
        })
        .collect();
    turns.iter().all(|t| t.is_finite())
        && (turns.iter().all(|&t| t > 1e-9) || turns.iter().all(|&t| t < -1e-9))
}

impl Operation for Warp {
    fn name(&self) -> &str {
        self.name
    }

    fn apply_image(&self, image: &RgbImage) -> Result<RgbImage, LabelaugError> {
        Ok(warp(image, &self.projection, Interpolation::Bilinear, Rgb([0, 0, 0])))
    }

    fn apply_mask(&self, mask: &GrayImage) -> Result<GrayImage, LabelaugError> {
        Ok(warp(mask, &self.projection, Interpolation::Nearest, Luma([0])))
    }

    fn map_point(
        &self,
        p: Coord<Pixel>,
        _width: u32,
        _height: u32,
    ) -> Result<Coord<Pixel>, LabelaugError> {
        let q = from_grid(self.projection * to_grid(p));
        if q.is_finite() {
            Ok(q)
        } else {
            Err(LabelaugError::transform(self.name, "point mapped to infinity"))
        }
    }
}

/// A monotone piecewise-linear remapping of `[0, length]` onto itself.
///
/// Output knots are evenly spaced; the source knots are the running sum of
/// the per-cell stretch factors, scaled so the last knot is `length` again.
#[derive(Clone, Debug, PartialEq)]
struct AxisGrid {
    output: Vec<f64>,
    source: Vec<f64>,
}

impl AxisGrid {
    fn new(length: u32, stretch: &[f64]) -> Result<Self, LabelaugError> {
        if length == 0 || stretch.is_empty() {
            return Err(LabelaugError::transform(
                "grid_distortion",
                "grid needs a non-empty axis and at least one cell",
            ));
        }
        if let Some(bad) = stretch.iter().find(|f| !f.is_finite() || **f <= 0.0) {
            return Err(LabelaugError::transform(
                "grid_distortion",
                format!("cell stretch must be positive, got {}", bad),
            ));
        }

        let length = length as f64;
        let cells = stretch.len() as f64;
        let total: f64 = stretch.iter().sum();
        let output = (0..=stretch.len())
            .map(|i| length * i as f64 / cells)
            .collect();
        let mut source = Vec::with_capacity(stretch.len() + 1);
        let mut running = 0.0;
        source.push(0.0);
        for factor in stretch {
            running += factor;
            source.push(length * running / total);
        }
        Ok(Self { output, source })
    }

    fn length(&self) -> f64 {
        self.output.last().copied().unwrap_or(0.0)
    }

    fn to_source(&self, x: f64) -> f64 {
        interpolate(&self.output, &self.source, x)
    }

    fn to_output(&self, x: f64) -> f64 {
        interpolate(&self.source, &self.output, x)
    }
}

/// Piecewise-linear interpolation through `(from[i], to[i])`, continued
/// along the end segments outside `[from[0], from[last]]`.
fn interpolate(from: &[f64], to: &[f64], x: f64) -> f64 {
    if from.len() < 2 {
        return x;
    }
    let last = from.len() - 1;
    let segment = from[1..last].partition_point(|&knot| knot <= x);
    let (x0, x1) = (from[segment], from[segment + 1]);
    let (y0, y1) = (to[segment], to[segment + 1]);
    y0 + (x - x0) * (y1 - y0) / (x1 - x0)
}

/// Stretches and squeezes grid cells independently along each axis.
///
/// Straight lines do not stay straight, so polygons are best carried on the
/// mask path through this operation.
#[derive(Clone, Debug, PartialEq)]
pub struct GridDistortion {
    columns: AxisGrid,
    rows: AxisGrid,
}

impl GridDistortion {
    /// `column_stretch[i]` scales the i-th grid column of a `width` x
    /// `height` frame, `row_stretch` the rows. Factors must be positive.
    pub fn new(
        width: u32,
        height: u32,
        column_stretch: &[f64],
        row_stretch: &[f64],
    ) -> Result<Self, LabelaugError> {
        Ok(Self {
            columns: AxisGrid::new(width, column_stretch)?,
            rows: AxisGrid::new(height, row_stretch)?,
        })
    }

    fn check_size(&self, width: u32, height: u32) -> Result<(), LabelaugError> {
        if (width as f64, height as f64) == (self.columns.length(), self.rows.length()) {
            Ok(())
        } else {
            Err(LabelaugError::transform(
                "grid_distortion",
                format!(
                    "grid built for {}x{}, got a {}x{} image",
                    self.columns.length(),
                    self.rows.length(),
                    width,
                    height
                ),
            ))
        }
    }

    /// Source position sampled by output pixel `(x, y)` on imageproc's grid.
    fn source_on_grid(&self, x: f32, y: f32) -> (f32, f32) {
        to_grid(Coord::new(
            self.columns.to_source(x as f64 + 0.5),
            self.rows.to_source(y as f64 + 0.5),
        ))
    }
}

impl Operation for GridDistortion {
    fn name(&self) -> &str {
        "grid_distortion"
    }

    fn apply_image(&self, image: &RgbImage) -> Result<RgbImage, LabelaugError> {
        self.check_size(image.width(), image.height())?;
        Ok(warp_with(
            image,
            |x, y| self.source_on_grid(x, y),
            Interpolation::Bilinear,
            Rgb([0, 0, 0]),
        ))
    }

    fn apply_mask(&self, mask: &GrayImage) -> Result<GrayImage, LabelaugError> {
        self.check_size(mask.width(), mask.height())?;
        Ok(warp_with(
            mask,
            |x, y| self.source_on_grid(x, y),
            Interpolation::Nearest,
            Luma([0]),
        ))
    }

    fn map_point(
        &self,
        p: Coord<Pixel>,
        _width: u32,
        _height: u32,
    ) -> Result<Coord<Pixel>, LabelaugError> {
        Ok(Coord::new(
            self.columns.to_output(p.x),
            self.rows.to_output(p.y),
        ))
    }
}

/// Cut out a rectangle, optionally resizing it to a fixed size.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Crop {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
    resize: Option<(u32, u32)>,
}

impl Crop {
    pub fn new(x: u32, y: u32, width: u32, height: u32, resize: Option<(u32, u32)>) -> Self {
        Self {
            x,
            y,
            width,
            height,
            resize,
        }
    }

    fn check_bounds(&self, width: u32, height: u32) -> Result<(), LabelaugError> {
        let fits = self.width > 0
            && self.height > 0
            && self.x.checked_add(self.width).is_some_and(|r| r <= width)
            && self.y.checked_add(self.height).is_some_and(|b| b <= height);
        if fits {
            Ok(())
        } else {
            Err(LabelaugError::transform(
                "random_crop",
                format!(
                    "window {}x{}+{}+{} does not fit a {}x{} image",
                    self.width, self.height, self.x, self.y, width, height
                ),
            ))
        }
    }
}

impl Operation for Crop {
    fn name(&self) -> &str {
        "random_crop"
    }

    fn output_size(&self, _width: u32, _height: u32) -> (u32, u32) {
        self.resize.unwrap_or((self.width, self.height))
    }

    fn apply_image(&self, image: &RgbImage) -> Result<RgbImage, LabelaugError> {
        self.check_bounds(image.width(), image.height())?;
        let cropped = imageops::crop_imm(image, self.x, self.y, self.width, self.height).to_image();
        Ok(match self.resize {
            Some((w, h)) => imageops::resize(&cropped, w, h, FilterType::Triangle),
            None => cropped,
        })
    }

    fn apply_mask(&self, mask: &GrayImage) -> Result<GrayImage, LabelaugError> {
        self.check_bounds(mask.width(), mask.height())?;
        let cropped = imageops::crop_imm(mask, self.x, self.y, self.width, self.height).to_image();
        Ok(match self.resize {
            Some((w, h)) => imageops::resize(&cropped, w, h, FilterType::Nearest),
            None => cropped,
        })
    }

    fn map_point(
        &self,
        p: Coord<Pixel>,
        _width: u32,
        _height: u32,
    ) -> Result<Coord<Pixel>, LabelaugError> {
        let (out_w, out_h) = self.output_size(self.width, self.height);
        let sx = out_w as f64 / self.width as f64;
        let sy = out_h as f64 / self.height as f64;
        Ok(Coord::new(
            (p.x - self.x as f64) * sx,
            (p.y - self.y as f64) * sy,
        ))
    }

    fn drops_points_outside(&self) -> bool {
        true
    }
}

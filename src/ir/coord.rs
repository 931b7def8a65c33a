//! Typed 2D points using PhantomData for compile-time safety.
//!
//! Label files store normalized coordinates, while transform primitives
//! work in pixels. The marker types keep the two from being mixed.

use std::fmt;
use std::marker::PhantomData;

/// Marker type for pixel coordinates (absolute values).
///
/// (0, 0) is the top-left corner of the top-left pixel; a point at
/// (width, height) sits on the far corner of the raster.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pixel {}

/// Marker type for normalized coordinates (0.0 to 1.0 inside the image).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub enum Normalized {}

impl fmt::Debug for Pixel {
    fn fmt(&self, _: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {}
    }
}

impl fmt::Debug for Normalized {
    fn fmt(&self, _: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {}
    }
}

/// A 2D coordinate with a type-level marker for the coordinate space.
#[derive(Clone, Copy, PartialEq)]
pub struct Coord<TSpace> {
    pub x: f64,
    pub y: f64,
    _space: PhantomData<TSpace>,
}

impl<TSpace> Coord<TSpace> {
    /// Creates a new coordinate with the given x and y values.
    #[inline]
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            _space: PhantomData,
        }
    }

    /// Returns true if both coordinates are finite (not NaN or infinite).
    #[inline]
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl Coord<Normalized> {
    /// Scales to pixel space for an image of the given size.
    #[inline]
    pub fn to_pixel(self, width: f64, height: f64) -> Coord<Pixel> {
        Coord::new(self.x * width, self.y * height)
    }

    /// True when the point lies inside the unit square, edges included.
    #[inline]
    pub fn is_in_unit_square(&self) -> bool {
        (0.0..=1.0).contains(&self.x) && (0.0..=1.0).contains(&self.y)
    }

    /// Clamps both components to [0, 1].
    #[inline]
    pub fn clamped(self) -> Self {
        Coord::new(self.x.clamp(0.0, 1.0), self.y.clamp(0.0, 1.0))
    }
}

impl Coord<Pixel> {
    /// Divides by the image size.
    #[inline]
    pub fn to_normalized(self, width: f64, height: f64) -> Coord<Normalized> {
        Coord::new(self.x / width, self.y / height)
    }
}

impl<TSpace> fmt::Debug for Coord<TSpace> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coord")
            .field("x", &self.x)
            .field("y", &self.y)
            .finish()
    }
}

impl<TSpace> Default for Coord<TSpace> {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_normalized_conversion_is_reversible() {
        let p: Coord<Normalized> = Coord::new(0.25, 0.5);
        let px = p.to_pixel(640.0, 480.0);
        assert_eq!((px.x, px.y), (160.0, 240.0));

        let back = px.to_normalized(640.0, 480.0);
        assert_eq!(back, p);
    }

    #[test]
    fn unit_square_check_includes_edges() {
        assert!(Coord::<Normalized>::new(0.0, 1.0).is_in_unit_square());
        assert!(!Coord::<Normalized>::new(-0.01, 0.5).is_in_unit_square());
        assert!(!Coord::<Normalized>::new(0.5, 1.2).is_in_unit_square());
    }

    #[test]
    fn clamped_pins_components() {
        let c = Coord::<Normalized>::new(-0.3, 1.7).clamped();
        assert_eq!((c.x, c.y), (0.0, 1.0));
    }

    #[test]
    fn is_finite_rejects_nan() {
        assert!(!Coord::<Pixel>::new(f64::NAN, 0.0).is_finite());
        assert!(Coord::<Pixel>::new(3.0, 4.0).is_finite());
    }
}

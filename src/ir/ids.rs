//! Newtype for class labels.
//!
//! YOLO label files identify classes by a zero-based integer. Wrapping it
//! keeps class ids from being confused with slot indices or mask values.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A zero-based class (category) id as written in YOLO label files.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassId(pub u32);

impl ClassId {
    /// Largest class id that still fits in an 8-bit mask (value = id + 1).
    pub const MAX_MASKABLE: u32 = u8::MAX as u32 - 1;

    /// Creates a new ClassId.
    #[inline]
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the underlying value.
    #[inline]
    pub fn as_u32(&self) -> u32 {
        self.0
    }

    /// Pixel value used for this class in a segmentation mask.
    ///
    /// Returns `None` when the id does not fit in an 8-bit mask.
    #[inline]
    pub fn mask_value(&self) -> Option<u8> {
        u8::try_from(self.0).ok().and_then(|v| v.checked_add(1))
    }

    /// Inverse of [`ClassId::mask_value`]; `0` is background.
    #[inline]
    pub fn from_mask_value(value: u8) -> Option<Self> {
        value.checked_sub(1).map(|id| Self(id as u32))
    }
}

impl From<u32> for ClassId {
    fn from(id: u32) -> Self {
        ClassId::new(id)
    }
}

impl fmt::Debug for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClassId({})", self.0)
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

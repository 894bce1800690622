// SPDX-License-Identifier: MPL-2.0
//! Ring buffer capacity domain type.
//!
//! This module provides a type-safe wrapper for the number of frame slots
//! in a [`MediaBuffer`](super::MediaBuffer).

use crate::config::{DEFAULT_VIDEO_BUFFER_FRAMES, MAX_BUFFER_FRAMES, MIN_BUFFER_FRAMES};

/// Number of frame slots in a ring buffer.
///
/// This newtype enforces validity at the type level, ensuring the value
/// is always within the valid range (1–256 frames).
///
/// # Example
///
/// ```
/// use video_sync::video_player::BufferCapacity;
///
/// let capacity = BufferCapacity::new(4);
/// assert_eq!(capacity.value(), 4);
///
/// // Values outside range are clamped
/// let too_high = BufferCapacity::new(1000);
/// assert_eq!(too_high.value(), 256);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferCapacity(usize);

impl BufferCapacity {
    /// Creates a new capacity, clamping to valid range.
    #[must_use]
    pub fn new(value: usize) -> Self {
        Self(value.clamp(MIN_BUFFER_FRAMES, MAX_BUFFER_FRAMES))
    }

    /// Returns the number of slots.
    #[must_use]
    pub fn value(self) -> usize {
        self.0
    }
}

impl Default for BufferCapacity {
    fn default() -> Self {
        Self(DEFAULT_VIDEO_BUFFER_FRAMES)
    }
}

// SPDX-License-Identifier: MPL-2.0
//! Decoded frame storage used by the ring buffer slots.

/// Maximum number of planes a video slot keeps (Y, U, V).
pub const MAX_PLANES: usize = 3;

/// One decoded unit: up to three planar pixel buffers for video, or a single
/// sample buffer for audio, plus its presentation timestamp.
///
/// Slots are reused for the lifetime of the ring buffer: storing a new frame
/// overwrites the plane contents in place and keeps their allocations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaFrame {
    planes: [Vec<u8>; MAX_PLANES],
    plane_count: usize,

    /// Presentation timestamp in seconds.
    pub pts_secs: f64,
}

impl MediaFrame {
    /// Creates a frame from up to [`MAX_PLANES`] planes. Extra planes are ignored.
    #[must_use]
    pub fn new(planes: &[&[u8]], pts_secs: f64) -> Self {
        let mut frame = Self::default();
        frame.store_planar(planes.iter().copied(), pts_secs);
        frame
    }

    /// First plane (luma for video, all samples for audio).
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.planes[0]
    }

    /// Returns plane `index`, or an empty slice if the frame has fewer planes.
    #[must_use]
    pub fn plane(&self, index: usize) -> &[u8] {
        if index < self.plane_count {
            &self.planes[index]
        } else {
            &[]
        }
    }

    /// Number of planes in use.
    #[must_use]
    pub fn plane_count(&self) -> usize {
        self.plane_count
    }

    /// Iterates over the planes in use.
    pub fn planes(&self) -> impl Iterator<Item = &[u8]> {
        self.planes[..self.plane_count].iter().map(Vec::as_slice)
    }

    /// Returns the total size in bytes across all planes.
    #[must_use]
    pub fn size_bytes(&self) -> usize {
        self.planes().map(<[u8]>::len).sum()
    }

    /// Copies each source plane into its own slot plane.
    pub(crate) fn store_planar<'a>(&mut self, planes: impl Iterator<Item = &'a [u8]>, pts_secs: f64) {
        self.plane_count = 0;
        for (dst, src) in self.planes.iter_mut().zip(planes) {
            dst.clear();
            dst.extend_from_slice(src);
            self.plane_count += 1;
        }
        for unused in &mut self.planes[self.plane_count..] {
            unused.clear();
        }
        self.pts_secs = pts_secs;
    }

    /// Concatenates all source planes into the first slot plane.
    ///
    /// Planar audio is stored channel after channel in a single buffer.
    pub(crate) fn store_packed<'a>(&mut self, planes: impl Iterator<Item = &'a [u8]>, pts_secs: f64) {
        let [first, rest @ ..] = &mut self.planes;
        first.clear();
        for src in planes {
            first.extend_from_slice(src);
        }
        for unused in rest {
            unused.clear();
        }
        self.plane_count = 1;
        self.pts_secs = pts_secs;
    }
}

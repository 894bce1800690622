// SPDX-License-Identifier: MPL-2.0
//! Centralized default values for all configuration constants.
//!
//! This module serves as the single source of truth for default values
//! used across the pipeline. Constants are organized by category.
//!
//! # Categories
//!
//! - **Ring Buffers**: Frame slot counts for the video and audio buffers
//! - **Synchronization**: Drift thresholds for delay/skip/resync decisions
//! - **Worker Timing**: Bounded waits used by the decode thread

use std::time::Duration;

// ==========================================================================
// Ring Buffer Defaults
// ==========================================================================

/// Default number of decoded video frames buffered ahead of the renderer.
pub const DEFAULT_VIDEO_BUFFER_FRAMES: usize = 10;

/// Default number of decoded audio frames buffered ahead of the audio callback.
pub const DEFAULT_AUDIO_BUFFER_FRAMES: usize = 32;

/// Minimum ring buffer size in frames.
pub const MIN_BUFFER_FRAMES: usize = 1;

/// Maximum ring buffer size in frames.
pub const MAX_BUFFER_FRAMES: usize = 256;

// ==========================================================================
// Synchronization Defaults
// ==========================================================================

/// Drift (seconds) above which a video frame is delayed or skipped.
pub const DEFAULT_SYNC_THRESHOLD_SECS: f64 = 0.05; // 50ms

/// Drift (seconds) above which the pipeline resyncs by seeking instead.
pub const DEFAULT_NOSYNC_THRESHOLD_SECS: f64 = 5.0;

// ==========================================================================
// Worker Timing Defaults
// ==========================================================================

/// Bounded wait while a ring buffer is full. Seek and quit requests are
/// observed at least this often.
pub const PUT_RETRY_TIMEOUT: Duration = Duration::from_millis(10);

/// Sleep between polls while the stream is finished and not looping.
pub const IDLE_SLEEP: Duration = Duration::from_millis(10);

/// Frame rate reported when nothing usable is known about the stream.
pub const FALLBACK_FPS: f64 = 30.0;

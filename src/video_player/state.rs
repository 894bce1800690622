// SPDX-License-Identifier: MPL-2.0
//! Session state shared by the decode thread and the frame consumers.
//!
//! Every field is independently meaningful and polled from hot loops, so the
//! state is a bag of atomics rather than a lock-protected struct. The decode
//! thread writes the stream clocks; consumers write the master clock and the
//! delivery flags; lifecycle and seek flags are touched by both.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicU8, Ordering};

use crate::config::{FALLBACK_FPS, SyncThresholds};

use super::backend::{SeekDirection, StreamParams};
use super::buffer_capacity::BufferCapacity;
use super::media_buffer::MediaBuffer;
use super::time_units::{micros_to_pts, pts_to_micros};

/// Source of the master clock that video frames are aligned against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MasterSync {
    /// Video timestamps drive the clock; frames are never delayed or skipped.
    Video,
    /// The last delivered audio frame drives the clock.
    Audio,
    /// The caller supplies the clock on every video pull.
    #[default]
    External,
}

impl MasterSync {
    fn to_u8(self) -> u8 {
        match self {
            MasterSync::Video => 0,
            MasterSync::Audio => 1,
            MasterSync::External => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => MasterSync::Video,
            1 => MasterSync::Audio,
            _ => MasterSync::External,
        }
    }
}

/// `f64` seconds stored as raw bits for lock-free access.
#[derive(Debug, Default)]
pub struct AtomicSeconds(AtomicU64);

impl AtomicSeconds {
    #[must_use]
    pub fn new(secs: f64) -> Self {
        Self(AtomicU64::new(secs.to_bits()))
    }

    pub fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Acquire))
    }

    pub fn store(&self, secs: f64) {
        self.0.store(secs.to_bits(), Ordering::Release);
    }
}

/// A seek waiting to be executed by the decode thread.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeekRequest {
    pub target_secs: f64,
    pub direction: SeekDirection,
}

/// Immutable facts about the opened streams.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamInfo {
    pub video: StreamParams,
    pub audio: Option<StreamParams>,
}

impl StreamInfo {
    /// Frame rate: guessed rate, else the stream's real rate, else 30.
    #[must_use]
    pub fn fps(&self) -> f64 {
        self.video
            .guessed_frame_rate
            .and_then(|rate| rate.as_rate())
            .or_else(|| {
                log::debug!("Could not guess frame rate, using real frame rate");
                self.video.real_frame_rate.and_then(|rate| rate.as_rate())
            })
            .unwrap_or(FALLBACK_FPS)
    }
}

/// State of one loaded media session.
#[derive(Debug)]
pub struct StreamState {
    pub(crate) info: StreamInfo,
    pub(crate) thresholds: SyncThresholds,

    pub(crate) video_frames: MediaBuffer,
    pub(crate) audio_frames: Option<MediaBuffer>,

    master_sync: AtomicU8,
    video_clock: AtomicSeconds,
    audio_clock: AtomicSeconds,
    master_clock: AtomicSeconds,
    last_frame_pts: AtomicSeconds,

    seek_pending: AtomicBool,
    seek_target_us: AtomicI64,
    seek_backward: AtomicBool,

    pub(crate) delay_next_frame: AtomicBool,
    pub(crate) skip_next_frame: AtomicBool,

    open: AtomicBool,
    quit: AtomicBool,
    finished: AtomicBool,
    paused: AtomicBool,
    looping: AtomicBool,
}

impl StreamState {
    pub(crate) fn new(
        info: StreamInfo,
        thresholds: SyncThresholds,
        video_capacity: BufferCapacity,
        audio_capacity: BufferCapacity,
    ) -> Self {
        let audio_frames = info.audio.as_ref().map(|_| MediaBuffer::new(audio_capacity));
        Self {
            info,
            thresholds,
            video_frames: MediaBuffer::new(video_capacity),
            audio_frames,
            master_sync: AtomicU8::new(MasterSync::default().to_u8()),
            video_clock: AtomicSeconds::default(),
            audio_clock: AtomicSeconds::default(),
            master_clock: AtomicSeconds::default(),
            last_frame_pts: AtomicSeconds::default(),
            seek_pending: AtomicBool::new(false),
            seek_target_us: AtomicI64::new(0),
            seek_backward: AtomicBool::new(false),
            delay_next_frame: AtomicBool::new(false),
            skip_next_frame: AtomicBool::new(false),
            open: AtomicBool::new(true),
            quit: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            looping: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn info(&self) -> &StreamInfo {
        &self.info
    }

    #[must_use]
    pub fn thresholds(&self) -> SyncThresholds {
        self.thresholds
    }

    #[must_use]
    pub fn video_frames(&self) -> &MediaBuffer {
        &self.video_frames
    }

    #[must_use]
    pub fn audio_frames(&self) -> Option<&MediaBuffer> {
        self.audio_frames.as_ref()
    }

    // ----- clocks -----

    #[must_use]
    pub fn master_sync(&self) -> MasterSync {
        MasterSync::from_u8(self.master_sync.load(Ordering::Acquire))
    }

    pub fn set_master_sync(&self, mode: MasterSync) {
        self.master_sync.store(mode.to_u8(), Ordering::Release);
    }

    #[must_use]
    pub fn video_clock(&self) -> f64 {
        self.video_clock.load()
    }

    pub(crate) fn set_video_clock(&self, secs: f64) {
        self.video_clock.store(secs);
    }

    #[must_use]
    pub fn audio_clock(&self) -> f64 {
        self.audio_clock.load()
    }

    pub(crate) fn set_audio_clock(&self, secs: f64) {
        self.audio_clock.store(secs);
    }

    #[must_use]
    pub fn master_clock(&self) -> f64 {
        self.master_clock.load()
    }

    pub(crate) fn set_master_clock(&self, secs: f64) {
        self.master_clock.store(secs);
    }

    #[must_use]
    pub fn last_frame_pts(&self) -> f64 {
        self.last_frame_pts.load()
    }

    pub(crate) fn set_last_frame_pts(&self, secs: f64) {
        self.last_frame_pts.store(secs);
    }

    // ----- seek request -----

    #[must_use]
    pub fn seek_pending(&self) -> bool {
        self.seek_pending.load(Ordering::Acquire)
    }

    /// The seek the decode thread has yet to execute, if any.
    #[must_use]
    pub fn pending_seek(&self) -> Option<SeekRequest> {
        if !self.seek_pending() {
            return None;
        }
        Some(SeekRequest {
            target_secs: micros_to_pts(self.seek_target_us.load(Ordering::Acquire)),
            direction: if self.seek_backward.load(Ordering::Acquire) {
                SeekDirection::Backward
            } else {
                SeekDirection::Forward
            },
        })
    }

    /// Records a seek for the decode thread.
    ///
    /// Ignored while another seek is pending. Returns whether the request was
    /// recorded.
    pub fn request_seek(&self, target_secs: f64, direction: SeekDirection) -> bool {
        if self.seek_pending() {
            return false;
        }
        self.finished.store(false, Ordering::Release);
        self.seek_target_us
            .store(pts_to_micros(target_secs), Ordering::Release);
        self.seek_backward
            .store(direction == SeekDirection::Backward, Ordering::Release);
        self.delay_next_frame.store(false, Ordering::Release);
        self.skip_next_frame.store(false, Ordering::Release);
        // Publish last so the worker sees a complete request.
        self.seek_pending.store(true, Ordering::Release);
        self.wake_producers();
        true
    }

    pub(crate) fn seek_target_micros(&self) -> i64 {
        self.seek_target_us.load(Ordering::Acquire)
    }

    pub(crate) fn complete_seek(&self) {
        self.seek_pending.store(false, Ordering::Release);
    }

    // ----- lifecycle flags -----

    /// False once the session has been stopped.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn quit_requested(&self) -> bool {
        self.quit.load(Ordering::Acquire)
    }

    pub(crate) fn request_quit(&self) {
        self.quit.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    pub(crate) fn set_finished(&self, finished: bool) {
        self.finished.store(finished, Ordering::Release);
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::Release);
    }

    #[must_use]
    pub fn is_looping(&self) -> bool {
        self.looping.load(Ordering::Acquire)
    }

    pub fn set_looping(&self, looping: bool) {
        self.looping.store(looping, Ordering::Release);
    }

    /// Wakes the decode thread if it is parked on a full buffer.
    pub(crate) fn wake_producers(&self) {
        self.video_frames.notify();
        if let Some(audio) = &self.audio_frames {
            audio.notify();
        }
    }

    /// Marks the session as shutting down and wakes the decode thread.
    pub(crate) fn shutdown(&self) {
        self.quit.store(true, Ordering::Release);
        self.finished.store(true, Ordering::Release);
        // Twice: the worker may re-enter its wait between the two signals.
        self.wake_producers();
        self.wake_producers();
    }

    /// Clears the shutdown flags before a decode thread is (re)spawned.
    pub(crate) fn rearm(&self) {
        self.quit.store(false, Ordering::Release);
        self.finished.store(false, Ordering::Release);
    }

    /// Returns every field to its load-time default and marks the session closed.
    pub(crate) fn close(&self) {
        self.open.store(false, Ordering::Release);
        self.video_frames.flush();
        if let Some(audio) = &self.audio_frames {
            audio.flush();
        }
        self.video_clock.store(0.0);
        self.audio_clock.store(0.0);
        self.master_clock.store(0.0);
        self.last_frame_pts.store(0.0);
        self.seek_pending.store(false, Ordering::Release);
        self.seek_target_us.store(0, Ordering::Release);
        self.delay_next_frame.store(false, Ordering::Release);
        self.skip_next_frame.store(false, Ordering::Release);
        self.paused.store(false, Ordering::Release);
    }
}

// SPDX-License-Identifier: MPL-2.0
//! Pull-side frame delivery and audio/video synchronization.
//!
//! The presentation driver pulls frames; the decode thread never pushes them.
//! Each video pull compares the next buffered frame's timestamp against the
//! master clock and decides whether to show it, hold it back one cycle, drop
//! frames to catch up, or resynchronize by seeking.
//!
//! # Master clock
//!
//! | Mode       | Master clock source                  | Drift correction |
//! |------------|--------------------------------------|------------------|
//! | `Video`    | pts of the delivered video frame     | none             |
//! | `Audio`    | pts of the delivered audio frame     | video only       |
//! | `External` | clock passed to `get_video_frame`    | video only       |
//!
//! Audio is never delayed or dropped here: audio glitches are far more
//! noticeable than a frame of video drift.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::config::SyncThresholds;

use super::backend::SeekDirection;
use super::media_buffer::FrameGuard;
use super::state::{MasterSync, SeekRequest, StreamState};

/// What to do with the next buffered video frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SyncAction {
    /// Within tolerance, display it.
    Display,

    /// Video is ahead: display it, then hold back one cycle.
    Delay,

    /// Video is behind: display it, then drop one frame on the next pull.
    Skip,

    /// Drift is too large to correct gradually; seek to the master clock.
    Resync(SeekDirection),
}

/// Classifies `drift` (frame pts minus master clock, in seconds).
///
/// # Examples
///
/// ```
/// use video_sync::config::SyncThresholds;
/// use video_sync::video_player::{calculate_sync_action, SeekDirection, SyncAction};
///
/// let thresholds = SyncThresholds::default();
/// assert_eq!(calculate_sync_action(0.01, thresholds), SyncAction::Display);
/// assert_eq!(calculate_sync_action(0.2, thresholds), SyncAction::Delay);
/// assert_eq!(calculate_sync_action(-0.2, thresholds), SyncAction::Skip);
/// assert_eq!(
///     calculate_sync_action(-60.0, thresholds),
///     SyncAction::Resync(SeekDirection::Forward)
/// );
/// ```
#[must_use]
pub fn calculate_sync_action(drift: f64, thresholds: SyncThresholds) -> SyncAction {
    if drift.abs() > thresholds.nosync_secs() {
        // Frames ahead of the clock mean the clock jumped back.
        let direction = if drift > 0.0 {
            SeekDirection::Backward
        } else {
            SeekDirection::Forward
        };
        SyncAction::Resync(direction)
    } else if drift > thresholds.sync_secs() {
        SyncAction::Delay
    } else if drift < -thresholds.sync_secs() {
        SyncAction::Skip
    } else {
        SyncAction::Display
    }
}

/// Next video frame for a consumer whose external clock reads `external_clock`.
///
/// The frame stays in the buffer until [`acknowledge_video`] runs.
pub(crate) fn next_video_frame(state: &StreamState, external_clock: f64) -> Option<FrameGuard<'_>> {
    if !state.is_open() || state.is_paused() {
        return None;
    }
    if state.seek_pending() {
        state.wake_producers();
        return None;
    }
    if state.delay_next_frame.swap(false, Ordering::AcqRel) {
        return None;
    }

    let buffer = &state.video_frames;
    let mut frame = buffer.get()?;

    if state.skip_next_frame.swap(false, Ordering::AcqRel) {
        // Drop the late frame and look at its successor.
        state.set_last_frame_pts(frame.pts_secs);
        drop(frame);
        buffer.got();
        frame = buffer.get()?;
    }

    let pts = frame.pts_secs;
    state.set_last_frame_pts(pts);

    let mode = state.master_sync();
    if mode == MasterSync::Video {
        state.set_master_clock(pts);
        return Some(frame);
    }
    if mode == MasterSync::External {
        state.set_master_clock(external_clock);
    }

    let master_clock = state.master_clock();
    match calculate_sync_action(pts - master_clock, state.thresholds()) {
        SyncAction::Display => {}
        SyncAction::Delay => {
            state.delay_next_frame.store(true, Ordering::Release);
            state.skip_next_frame.store(false, Ordering::Release);
        }
        SyncAction::Skip => {
            state.skip_next_frame.store(true, Ordering::Release);
            state.delay_next_frame.store(false, Ordering::Release);
        }
        SyncAction::Resync(direction) => {
            drop(frame);
            log::debug!(
                "Video drifted {:.3}s from master clock, seeking to {master_clock:.3}s",
                pts - master_clock
            );
            state.request_seek(master_clock, direction);
            return None;
        }
    }
    Some(frame)
}

pub(crate) fn acknowledge_video(state: &StreamState) {
    state.video_frames.got();
}

/// Next audio frame. Audio is delivered unconditionally; in audio-master
/// mode it also advances the master clock.
pub(crate) fn next_audio_frame(state: &StreamState) -> Option<FrameGuard<'_>> {
    if !state.is_open() || state.is_paused() || state.seek_pending() {
        return None;
    }
    let frame = state.audio_frames.as_ref()?.get()?;
    if state.master_sync() == MasterSync::Audio {
        state.set_master_clock(frame.pts_secs);
    }
    Some(frame)
}

pub(crate) fn acknowledge_audio(state: &StreamState) {
    if let Some(buffer) = &state.audio_frames {
        buffer.got();
    }
}

/// Cloneable consumer-side handle to a loaded session.
///
/// Render and audio threads each hold a clone; they pull from different
/// buffers and never contend with each other. A handle outlives `stop()`
/// safely: once the session is closed every pull returns `None`.
#[derive(Debug, Clone)]
pub struct PlaybackHandle {
    state: Arc<StreamState>,
}

impl PlaybackHandle {
    pub(crate) fn new(state: Arc<StreamState>) -> Self {
        Self { state }
    }

    /// Session state, for introspection.
    #[must_use]
    pub fn state(&self) -> &StreamState {
        &self.state
    }

    /// Next video frame to present, or `None` if nothing should be shown this
    /// cycle. `external_clock` is only consulted in [`MasterSync::External`] mode.
    ///
    /// Keep the guard short-lived: the decode thread cannot refill that slot
    /// while it is held.
    pub fn get_video_frame(&self, external_clock: f64) -> Option<FrameGuard<'_>> {
        next_video_frame(&self.state, external_clock)
    }

    /// Releases the frame returned by the last [`get_video_frame`](Self::get_video_frame).
    pub fn got_video_frame(&self) {
        acknowledge_video(&self.state);
    }

    /// Next audio frame (all channels concatenated).
    ///
    /// The clock argument is accepted for symmetry with video and ignored:
    /// audio is never corrected.
    pub fn get_audio_frame(&self, _external_clock: f64) -> Option<FrameGuard<'_>> {
        next_audio_frame(&self.state)
    }

    pub fn got_audio_frame(&self) {
        acknowledge_audio(&self.state);
    }

    /// Asks the decode thread to reposition to `target_secs`.
    ///
    /// Returns `false` if another seek is still pending.
    pub fn seek(&self, target_secs: f64, direction: SeekDirection) -> bool {
        log::debug!("Seek requested to {target_secs:.3}s ({direction:?})");
        self.state.request_seek(target_secs, direction)
    }

    #[must_use]
    pub fn pending_seek(&self) -> Option<SeekRequest> {
        self.state.pending_seek()
    }

    pub fn set_paused(&self, paused: bool) {
        self.state.set_paused(paused);
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.state.is_paused()
    }

    pub fn set_looping(&self, looping: bool) {
        self.state.set_looping(looping);
    }

    #[must_use]
    pub fn is_looping(&self) -> bool {
        self.state.is_looping()
    }

    pub fn set_master_sync(&self, mode: MasterSync) {
        self.state.set_master_sync(mode);
    }

    #[must_use]
    pub fn master_sync(&self) -> MasterSync {
        self.state.master_sync()
    }

    #[must_use]
    pub fn master_clock(&self) -> f64 {
        self.state.master_clock()
    }

    #[must_use]
    pub fn video_clock(&self) -> f64 {
        self.state.video_clock()
    }

    #[must_use]
    pub fn audio_clock(&self) -> f64 {
        self.state.audio_clock()
    }

    #[must_use]
    pub fn last_frame_pts(&self) -> f64 {
        self.state.last_frame_pts()
    }

    /// True once the source is exhausted (or the decode thread has exited).
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.state.is_finished()
    }
}

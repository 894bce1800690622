// SPDX-License-Identifier: MPL-2.0
//! Background decode thread.
//!
//! The worker owns the packet source and codec contexts exclusively and runs
//! a small state machine:
//!
//! ```text
//!   ┌──────────► CheckSeek ──► CheckFinished ──(finished)──► idle ──┐
//!   │                               │                               │
//!   │                           ReadPacket ──(clean end)──► EndOfStream
//!   │                          /    │     \                         │
//!   │               DecodeVideo     │      DecodeAudio              │
//!   └───────────────────┴───────────┴───────────┴───────────────────┘
//!
//!   quit flag or fatal error at any point ──► Shutdown
//! ```
//!
//! Every state is an interruption point: a pending seek or a quit request is
//! observed within one [`PUT_RETRY_TIMEOUT`] even while the worker is parked
//! on a full buffer.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::config::{IDLE_SLEEP, PUT_RETRY_TIMEOUT};
use crate::error::{Error, Result, VideoError};

use super::backend::{
    CodecError, FrameDecoder, FrameTiming, MediaBackend, MediaKind, PacketSource, ReadError,
    SeekDirection, StreamParams,
};
use super::frame::MediaFrame;
use super::media_buffer::MediaBuffer;
use super::state::{StreamInfo, StreamState};
use super::time_units::TimeBase;

/// Name of the decode thread, visible in debuggers and profilers.
pub const DECODE_THREAD_NAME: &str = "video-decode";

/// One open codec bound to its container stream.
pub(crate) struct StreamDecoder<C> {
    index: usize,
    time_base: TimeBase,
    codec: C,
}

impl<C> StreamDecoder<C> {
    fn new(params: &StreamParams, codec: C) -> Self {
        Self {
            index: params.index,
            time_base: params.time_base,
            codec,
        }
    }

    /// Returns `(frame pts, new stream clock)`.
    ///
    /// The frame keeps its best-effort timestamp, or the running clock when
    /// the codec has none; the clock then advances by the repeat hint.
    fn resolve_pts(&self, timing: FrameTiming, clock: f64) -> (f64, f64) {
        let pts = timing
            .best_effort_timestamp
            .map_or(clock, |ts| self.time_base.to_secs(ts));
        let extra = 0.5 * self.time_base.as_secs() * f64::from(timing.repeat_pict);
        (pts, pts + extra)
    }
}

/// Demux and codec resources of one loaded file.
///
/// Moved into the decode thread on start and handed back when the thread
/// exits cleanly, so a restart does not reopen the file.
pub(crate) struct DecodeSession<B: MediaBackend> {
    source: B::Source,
    video: StreamDecoder<B::Codec>,
    audio: Option<StreamDecoder<B::Codec>>,
}

impl<B: MediaBackend> DecodeSession<B> {
    /// Opens `uri`, picks the first video stream and, if wanted, the first
    /// audio stream, and opens a codec for each.
    pub(crate) fn open(backend: &B, uri: &str, audio_enabled: bool) -> Result<(Self, StreamInfo)> {
        let source = backend.open(uri)?;

        let video_params = source
            .streams()
            .iter()
            .find(|stream| stream.kind == MediaKind::Video)
            .cloned()
            .ok_or(VideoError::NoVideoStream)?;
        let video_codec = backend.open_codec(&source, &video_params)?;

        let audio_params = if audio_enabled {
            source
                .streams()
                .iter()
                .find(|stream| stream.kind == MediaKind::Audio)
                .cloned()
        } else {
            None
        };
        let audio = match &audio_params {
            Some(params) => Some(StreamDecoder::new(params, backend.open_codec(&source, params)?)),
            None => None,
        };

        let session = Self {
            video: StreamDecoder::new(&video_params, video_codec),
            audio,
            source,
        };
        let info = StreamInfo {
            video: video_params,
            audio: audio_params,
        };
        Ok((session, info))
    }

    /// Repositions the source on every open stream.
    ///
    /// Fails only if the video stream could not be moved. Once video has
    /// moved the seek counts as done, so an audio failure is only logged.
    fn seek(&mut self, target_us: i64, direction: SeekDirection) -> Result<()> {
        let video_target = self.video.time_base.from_micros(target_us);
        self.source.seek(self.video.index, video_target, direction)?;
        if let Some(audio) = &self.audio {
            let audio_target = audio.time_base.from_micros(target_us);
            if let Err(err) = self.source.seek(audio.index, audio_target, direction) {
                log::warn!("Audio stream did not follow seek: {err}");
            }
        }
        Ok(())
    }

    fn flush_codecs(&mut self) {
        self.video.codec.flush();
        if let Some(audio) = &mut self.audio {
            audio.codec.flush();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkerState {
    CheckSeek,
    CheckFinished,
    ReadPacket,
    DecodeVideo,
    DecodeAudio,
    EndOfStream,
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Track {
    Video,
    Audio,
}

impl Track {
    fn clock(self, state: &StreamState) -> f64 {
        match self {
            Track::Video => state.video_clock(),
            Track::Audio => state.audio_clock(),
        }
    }

    fn set_clock(self, state: &StreamState, secs: f64) {
        match self {
            Track::Video => state.set_video_clock(secs),
            Track::Audio => state.set_audio_clock(secs),
        }
    }

    fn buffer(self, state: &StreamState) -> Option<&MediaBuffer> {
        match self {
            Track::Video => Some(&state.video_frames),
            Track::Audio => state.audio_frames.as_ref(),
        }
    }

    fn store<'a>(self, frame: &mut MediaFrame, planes: impl Iterator<Item = &'a [u8]>, pts: f64) {
        match self {
            Track::Video => frame.store_planar(planes, pts),
            Track::Audio => frame.store_packed(planes, pts),
        }
    }
}

struct DecodeWorker<B: MediaBackend> {
    session: DecodeSession<B>,
    state: Arc<StreamState>,
    packet: Option<B::Packet>,
    fatal: bool,
}

impl<B: MediaBackend> DecodeWorker<B> {
    fn new(session: DecodeSession<B>, state: Arc<StreamState>) -> Self {
        Self {
            session,
            state,
            packet: None,
            fatal: false,
        }
    }

    /// Runs until quit or a fatal error. Returns the resources on a clean quit.
    fn run(mut self) -> Option<DecodeSession<B>> {
        let mut step = WorkerState::CheckSeek;
        while step != WorkerState::Shutdown {
            step = match step {
                WorkerState::CheckSeek => self.check_seek(),
                WorkerState::CheckFinished => self.check_finished(),
                WorkerState::ReadPacket => self.read_packet(),
                WorkerState::DecodeVideo => self.decode(Track::Video),
                WorkerState::DecodeAudio => self.decode(Track::Audio),
                WorkerState::EndOfStream => self.end_of_stream(),
                WorkerState::Shutdown => WorkerState::Shutdown,
            };
        }
        self.shutdown()
    }

    fn check_seek(&mut self) -> WorkerState {
        if self.state.quit_requested() {
            return WorkerState::Shutdown;
        }
        let Some(request) = self.state.pending_seek() else {
            return WorkerState::CheckFinished;
        };

        match self
            .session
            .seek(self.state.seek_target_micros(), request.direction)
        {
            Ok(()) => {
                self.packet = None;
                self.session.flush_codecs();
                self.state.video_frames.flush();
                if let Some(audio) = &self.state.audio_frames {
                    audio.flush();
                }
                self.state.set_video_clock(request.target_secs);
                self.state.set_audio_clock(request.target_secs);
                log::debug!("Seeked to {:.3}s", request.target_secs);
            }
            Err(err) => {
                log::warn!(
                    "Seek to {:.3}s failed, continuing from current position: {err}",
                    request.target_secs
                );
            }
        }
        self.state.complete_seek();
        WorkerState::CheckFinished
    }

    fn check_finished(&mut self) -> WorkerState {
        if !self.state.is_finished() {
            return WorkerState::ReadPacket;
        }
        // Restart only once the tail has been shown; the seek flushes the buffers.
        if self.state.is_looping()
            && self.state.video_frames.is_empty()
            && self.state.request_seek(0.0, SeekDirection::Backward)
        {
            log::debug!("End of stream reached, looping to start");
        }
        thread::sleep(IDLE_SLEEP);
        WorkerState::CheckSeek
    }

    fn read_packet(&mut self) -> WorkerState {
        match self.session.source.read_packet() {
            Ok(packet) => {
                let index = self.session.source.packet_stream(&packet);
                if index == self.session.video.index {
                    self.packet = Some(packet);
                    WorkerState::DecodeVideo
                } else if self.session.audio.as_ref().is_some_and(|a| a.index == index) {
                    self.packet = Some(packet);
                    WorkerState::DecodeAudio
                } else {
                    WorkerState::CheckSeek
                }
            }
            Err(ReadError::EndOfStream) => WorkerState::EndOfStream,
            Err(ReadError::Io(msg)) => {
                log::error!("Error reading packet: {msg}");
                self.fatal = true;
                WorkerState::Shutdown
            }
        }
    }

    fn decode(&mut self, track: Track) -> WorkerState {
        let Some(packet) = self.packet.take() else {
            return WorkerState::CheckSeek;
        };
        let stream = match track {
            Track::Video => Some(&mut self.session.video),
            Track::Audio => self.session.audio.as_mut(),
        };
        let Some(stream) = stream else {
            return WorkerState::CheckSeek;
        };

        match drain_packet(&self.state, track, stream, &packet) {
            Ok(()) => WorkerState::CheckSeek,
            Err(err) => {
                log::error!("Stopping decode thread: {err}");
                self.fatal = true;
                WorkerState::Shutdown
            }
        }
    }

    fn end_of_stream(&mut self) -> WorkerState {
        if !self.state.is_finished() {
            log::debug!("End of stream at {:.3}s", self.state.video_clock());
        }
        self.state.set_finished(true);
        WorkerState::CheckSeek
    }

    fn shutdown(self) -> Option<DecodeSession<B>> {
        self.state.request_quit();
        self.state.set_finished(true);
        if self.fatal {
            // Dropping the session here releases codec and demux handles.
            None
        } else {
            Some(self.session)
        }
    }
}

/// Feeds one packet and stores every frame the codec emits for it.
fn drain_packet<C: FrameDecoder>(
    state: &StreamState,
    track: Track,
    stream: &mut StreamDecoder<C>,
    packet: &C::Packet,
) -> std::result::Result<(), VideoError> {
    if send_packet(stream, packet)? {
        return receive_frames(state, track, stream).map(|_| ());
    }

    // Codec output is full: drain it, then offer the packet once more.
    if !receive_frames(state, track, stream)? || state.quit_requested() {
        return Ok(());
    }
    if !send_packet(stream, packet)? {
        log::debug!("Codec still busy, dropping {track:?} packet");
        return Ok(());
    }
    receive_frames(state, track, stream).map(|_| ())
}

/// Returns `false` if the codec refused the packet until output is drained.
fn send_packet<C: FrameDecoder>(
    stream: &mut StreamDecoder<C>,
    packet: &C::Packet,
) -> std::result::Result<bool, VideoError> {
    match stream.codec.send_packet(packet) {
        Ok(()) => Ok(true),
        Err(CodecError::NeedsInput) => Ok(false),
        Err(CodecError::EndOfStream) => Err(VideoError::DecodingFailed(
            "codec rejected packet after end of stream".to_string(),
        )),
        Err(CodecError::Fatal(msg)) => Err(VideoError::DecodingFailed(msg)),
    }
}

/// Stores every frame the codec has ready.
///
/// Returns `false` if a seek or quit cut the drain short.
fn receive_frames<C: FrameDecoder>(
    state: &StreamState,
    track: Track,
    stream: &mut StreamDecoder<C>,
) -> std::result::Result<bool, VideoError> {
    while !state.quit_requested() {
        let timing = match stream.codec.receive_frame() {
            Ok(timing) => timing,
            Err(CodecError::NeedsInput) => break,
            Err(CodecError::EndOfStream) => {
                return Err(VideoError::DecodingFailed(
                    "codec signalled end of stream".to_string(),
                ))
            }
            Err(CodecError::Fatal(msg)) => return Err(VideoError::DecodingFailed(msg)),
        };

        let (pts, clock) = stream.resolve_pts(timing, track.clock(state));
        track.set_clock(state, clock);

        let Some(buffer) = track.buffer(state) else {
            continue;
        };
        let codec = &stream.codec;
        let stored = put_blocking(state, buffer, |frame| {
            let planes = (0..codec.plane_count()).map(|i| codec.plane(i));
            track.store(frame, planes, pts);
        });
        if !stored {
            // Seek or quit pending; the rest of this packet is stale.
            return Ok(false);
        }
    }
    Ok(true)
}

/// Retries `put` until it succeeds, parking on the buffer between attempts.
///
/// Returns `false` if a quit or seek request interrupted the wait.
fn put_blocking(state: &StreamState, buffer: &MediaBuffer, mut fill: impl FnMut(&mut MediaFrame)) -> bool {
    let mut guard = buffer.lock();
    while !buffer.put_with(&mut fill) {
        buffer.wait_for_space(&mut guard, PUT_RETRY_TIMEOUT);
        if state.quit_requested() || state.seek_pending() {
            return false;
        }
    }
    true
}

/// Raises the calling thread's scheduling priority where permitted.
#[cfg(unix)]
fn raise_priority() {
    // SAFETY: plain syscall with scalar arguments; `0` targets the calling thread.
    let result = unsafe { libc::setpriority(libc::PRIO_PROCESS, 0, -10) };
    if result == 0 {
        log::debug!("Decode thread priority raised");
    } else {
        log::warn!(
            "Could not raise decode thread priority: {}",
            std::io::Error::last_os_error()
        );
    }
}

#[cfg(not(unix))]
fn raise_priority() {}

/// Spawns the decode thread for `session`.
pub(crate) fn spawn<B: MediaBackend>(
    session: DecodeSession<B>,
    state: Arc<StreamState>,
) -> Result<JoinHandle<Option<DecodeSession<B>>>> {
    thread::Builder::new()
        .name(DECODE_THREAD_NAME.to_string())
        .spawn(move || {
            raise_priority();
            DecodeWorker::new(session, state).run()
        })
        .map_err(|err| Error::Io(format!("Could not start decode thread: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncThresholds;
    use crate::test_utils::{assert_abs_diff_eq, assert_relative_eq, F64_EPSILON};
    use crate::testing::{ScriptedBackend, ScriptedFrame};
    use crate::video_player::buffer_capacity::BufferCapacity;
    use std::time::{Duration, Instant};

    fn open(backend: &ScriptedBackend, capacity: usize) -> (DecodeSession<ScriptedBackend>, Arc<StreamState>) {
        let (session, info) =
            DecodeSession::open(backend, "scripted", true).expect("scripted open");
        let state = StreamState::new(
            info,
            SyncThresholds::default(),
            BufferCapacity::new(capacity),
            BufferCapacity::new(capacity),
        );
        (session, Arc::new(state))
    }

    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        false
    }

    fn drain_video(state: &StreamState) -> Vec<f64> {
        let mut seen = Vec::new();
        while let Some(pts) = state.video_frames.get().map(|f| f.pts_secs) {
            seen.push(pts);
            state.video_frames.got();
        }
        seen
    }

    #[test]
    fn resolve_pts_prefers_best_effort_and_adds_repeat() {
        let stream = StreamDecoder {
            index: 0,
            time_base: TimeBase::new(1, 10),
            codec: (),
        };
        let (pts, clock) = stream.resolve_pts(
            FrameTiming {
                best_effort_timestamp: Some(20),
                repeat_pict: 1,
            },
            0.0,
        );
        assert_abs_diff_eq!(pts, 2.0, epsilon = F64_EPSILON);
        assert_relative_eq!(clock, 2.05, epsilon = F64_EPSILON);

        let (pts, clock) = stream.resolve_pts(
            FrameTiming {
                best_effort_timestamp: None,
                repeat_pict: 0,
            },
            3.5,
        );
        assert_eq!(pts, 3.5);
        assert_eq!(clock, 3.5);
    }

    #[test]
    fn open_without_video_stream_fails() {
        let backend = ScriptedBackend::new().with_audio(4, 48_000, 2, 1024);
        let err = DecodeSession::open(&backend, "scripted", true).err();
        assert!(matches!(
            err,
            Some(Error::Video(VideoError::NoVideoStream))
        ));
    }

    #[test]
    fn open_skips_audio_when_disabled() {
        let backend = ScriptedBackend::video_only(4, 25).with_audio(4, 48_000, 2, 1024);
        let (session, info) =
            DecodeSession::open(&backend, "scripted", false).expect("scripted open");
        assert!(session.audio.is_none());
        assert!(info.audio.is_none());
    }

    #[test]
    fn worker_fills_buffer_and_stops_on_quit() {
        let backend = ScriptedBackend::video_only(10, 25);
        let (session, state) = open(&backend, 4);
        let handle = spawn(session, Arc::clone(&state)).expect("spawn");

        assert!(wait_until(|| state.video_frames.len() == 4));
        // Full buffer: the worker is parked, not dropping frames.
        thread::sleep(Duration::from_millis(30));
        assert_eq!(state.video_frames.len(), 4);

        state.shutdown();
        let resources = handle.join().expect("worker panicked");
        assert!(resources.is_some());
        assert!(state.is_finished());
    }

    #[test]
    fn worker_marks_finished_at_end_without_quitting() {
        let backend = ScriptedBackend::video_only(3, 25);
        let (session, state) = open(&backend, 8);
        let handle = spawn(session, Arc::clone(&state)).expect("spawn");

        assert!(wait_until(|| state.is_finished()));
        assert!(!state.quit_requested());
        assert_eq!(drain_video(&state), vec![0.0, 0.04, 0.08]);

        state.shutdown();
        assert!(handle.join().expect("worker panicked").is_some());
    }

    #[test]
    fn seek_flushes_buffers_and_repositions() {
        let backend = ScriptedBackend::video_only(250, 25);
        let (session, state) = open(&backend, 4);
        let handle = spawn(session, Arc::clone(&state)).expect("spawn");

        assert!(wait_until(|| state.video_frames.len() == 4));
        assert!(state.request_seek(5.0, SeekDirection::Forward));
        assert!(wait_until(|| !state.seek_pending() && state.video_frames.len() == 4));

        let first = state.video_frames.get().map(|f| f.pts_secs);
        assert!(first.is_some_and(|pts| pts >= 5.0 - 1e-9), "got {first:?}");
        assert_eq!(backend.seeks().len(), 1);

        state.shutdown();
        handle.join().expect("worker panicked");
    }

    #[test]
    fn failed_seek_is_logged_and_cleared() {
        let backend = ScriptedBackend::video_only(20, 25).with_failing_seeks();
        let (session, state) = open(&backend, 4);
        let handle = spawn(session, Arc::clone(&state)).expect("spawn");

        assert!(wait_until(|| state.video_frames.len() == 4));
        assert!(state.request_seek(0.4, SeekDirection::Forward));
        assert!(wait_until(|| !state.seek_pending()));

        // Buffered frames survive a failed seek.
        assert_eq!(state.video_frames.get().map(|f| f.pts_secs), Some(0.0));
        assert!(!state.quit_requested());

        state.shutdown();
        handle.join().expect("worker panicked");
    }

    #[test]
    fn audio_seek_failure_still_commits_video_seek() {
        let backend = ScriptedBackend::video_only(250, 25)
            .with_audio(300, 48_000, 2, 1024)
            .with_failing_seek_on(1);
        let (session, state) = open(&backend, 4);
        let handle = spawn(session, Arc::clone(&state)).expect("spawn");

        let audio = state.audio_frames.as_ref().expect("audio buffer");
        // Audio frames are shorter, so its buffer fills first.
        assert!(wait_until(|| audio.len() == 4));
        assert!(state.request_seek(5.0, SeekDirection::Forward));
        assert!(wait_until(|| {
            !state.seek_pending() && audio.len() == 4 && !state.video_frames.is_empty()
        }));

        let video_pts = state.video_frames.get().map(|f| f.pts_secs);
        assert!(video_pts.is_some_and(|pts| pts >= 5.0 - 1e-9), "video {video_pts:?}");
        let audio_pts = audio.get().map(|f| f.pts_secs);
        assert!(audio_pts.is_some_and(|pts| pts >= 5.0 - 1e-9), "audio {audio_pts:?}");
        assert!(state.video_clock() >= 5.0 - 1e-9);
        assert!(state.audio_clock() >= 5.0 - 1e-9);
        assert!(!state.quit_requested());

        let seeks = backend.seeks();
        assert_eq!(seeks.len(), 2);
        assert_eq!((seeks[0].stream, seeks[1].stream), (0, 1));

        state.shutdown();
        assert!(handle.join().expect("worker panicked").is_some());
    }

    #[test]
    fn io_error_is_fatal() {
        let backend = ScriptedBackend::video_only(10, 25).with_read_error_at(2);
        let (session, state) = open(&backend, 8);
        let handle = spawn(session, Arc::clone(&state)).expect("spawn");

        let resources = handle.join().expect("worker panicked");
        assert!(resources.is_none());
        assert!(state.quit_requested());
        assert!(state.is_finished());
        assert_eq!(drain_video(&state), vec![0.0, 0.04]);
    }

    #[test]
    fn corrupt_frame_is_fatal() {
        let backend = ScriptedBackend::video_only(10, 25).with_codec_error(
            MediaKind::Video,
            3,
            CodecError::Fatal("invalid data".to_string()),
        );
        let (session, state) = open(&backend, 8);
        let handle = spawn(session, Arc::clone(&state)).expect("spawn");

        assert!(handle.join().expect("worker panicked").is_none());
        assert!(state.quit_requested());
        assert_eq!(drain_video(&state), vec![0.0, 0.04, 0.08]);
    }

    #[test]
    fn corrupt_audio_frame_is_fatal() {
        let backend = ScriptedBackend::video_only(10, 25)
            .with_audio(10, 1000, 1, 40)
            .with_codec_error(
                MediaKind::Audio,
                3,
                CodecError::Fatal("invalid data".to_string()),
            );
        let (session, state) = open(&backend, 16);
        let handle = spawn(session, Arc::clone(&state)).expect("spawn");

        assert!(handle.join().expect("worker panicked").is_none());
        assert!(state.quit_requested());
        assert!(state.is_finished());

        let audio = state.audio_frames.as_ref().expect("audio buffer");
        let mut delivered = Vec::new();
        while let Some(pts) = audio.get().map(|f| f.pts_secs) {
            delivered.push(pts);
            audio.got();
        }
        assert_eq!(delivered, vec![0.0, 0.04, 0.08]);
    }

    #[test]
    fn busy_codec_gets_packet_again_after_drain() {
        let backend =
            ScriptedBackend::video_only(4, 25).with_busy_codec_at(MediaKind::Video, 2);
        let (session, state) = open(&backend, 8);
        let handle = spawn(session, Arc::clone(&state)).expect("spawn");

        assert!(wait_until(|| state.is_finished()));
        assert!(!state.quit_requested());
        assert_eq!(drain_video(&state), vec![0.0, 0.04, 0.08, 0.12]);

        state.shutdown();
        handle.join().expect("worker panicked");
    }

    #[test]
    fn codec_needing_input_is_not_an_error() {
        let backend = ScriptedBackend::video_only(4, 25).with_codec_error(
            MediaKind::Video,
            1,
            CodecError::NeedsInput,
        );
        let (session, state) = open(&backend, 8);
        let handle = spawn(session, Arc::clone(&state)).expect("spawn");

        assert!(wait_until(|| state.is_finished()));
        assert!(!state.quit_requested());
        assert_eq!(drain_video(&state), vec![0.0, 0.08, 0.12]);

        state.shutdown();
        handle.join().expect("worker panicked");
    }

    #[test]
    fn missing_timestamps_fall_back_to_clock() {
        let frames = vec![
            ScriptedFrame::video(Some(10), 4),
            ScriptedFrame::video(None, 4),
        ];
        let backend = ScriptedBackend::new().with_video(TimeBase::new(1, 10), frames);
        let (session, state) = open(&backend, 4);
        let handle = spawn(session, Arc::clone(&state)).expect("spawn");

        assert!(wait_until(|| state.is_finished()));
        assert_eq!(drain_video(&state), vec![1.0, 1.0]);

        state.shutdown();
        handle.join().expect("worker panicked");
    }

    #[test]
    fn audio_planes_are_packed() {
        let backend = ScriptedBackend::video_only(2, 25).with_audio(2, 48_000, 2, 4);
        let (session, state) = open(&backend, 4);
        let handle = spawn(session, Arc::clone(&state)).expect("spawn");

        assert!(wait_until(|| state.is_finished()));
        let audio = state.audio_frames.as_ref().expect("audio buffer");
        {
            let frame = audio.get().expect("audio frame");
            assert_eq!(frame.plane_count(), 1);
            assert_eq!(frame.data().len(), 2 * 4 * 2);
        }
        assert_eq!(state.video_frames.get().map(|f| f.plane_count()), Some(3));

        state.shutdown();
        handle.join().expect("worker panicked");
    }

    #[test]
    fn looping_restarts_from_the_beginning() {
        let backend = ScriptedBackend::video_only(3, 25);
        let (session, state) = open(&backend, 2);
        state.set_looping(true);
        let handle = spawn(session, Arc::clone(&state)).expect("spawn");

        let mut seen = Vec::new();
        assert!(wait_until(|| {
            seen.extend(drain_video(&state));
            seen.len() >= 7
        }));
        assert_eq!(&seen[..7], &[0.0, 0.04, 0.08, 0.0, 0.04, 0.08, 0.0]);
        assert!(backend
            .seeks()
            .iter()
            .all(|seek| seek.direction == SeekDirection::Backward && seek.target_ts == 0));

        state.shutdown();
        handle.join().expect("worker panicked");
    }
}

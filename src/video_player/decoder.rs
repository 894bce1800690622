// SPDX-License-Identifier: MPL-2.0
//! Session owner: load, start, stop, and the presentation-driver API.
//!
//! [`VideoDecoder`] opens a file through a [`MediaBackend`], spawns the decode
//! thread and forwards frame pulls to the session. For pulls from several
//! threads, hand each one a [`PlaybackHandle`] from [`VideoDecoder::handle`].

use std::sync::Arc;
use std::thread::JoinHandle;

use crate::config::{PipelineConfig, FALLBACK_FPS};
use crate::error::{Result, VideoError};

use super::backend::{MediaBackend, SeekDirection, StreamParams};
use super::media_buffer::FrameGuard;
use super::state::{MasterSync, StreamState};
use super::sync::{self, PlaybackHandle};
use super::worker::{self, DecodeSession};

type WorkerHandle<B> = JoinHandle<Option<DecodeSession<B>>>;

/// Decoder for one media file at a time.
///
/// Lifecycle: [`load`](Self::load) → [`start`](Self::start) → pull frames →
/// [`stop`](Self::stop). `load` may be called again afterwards; dropping the
/// decoder stops it.
pub struct VideoDecoder<B: MediaBackend> {
    backend: B,
    config: PipelineConfig,
    audio_enabled: bool,
    session: Option<Arc<StreamState>>,
    resources: Option<DecodeSession<B>>,
    worker: Option<WorkerHandle<B>>,
}

impl<B: MediaBackend> VideoDecoder<B> {
    #[must_use]
    pub fn new(backend: B, config: PipelineConfig) -> Self {
        let audio_enabled = config.audio_enabled.unwrap_or(true);
        Self {
            backend,
            config,
            audio_enabled,
            session: None,
            resources: None,
            worker: None,
        }
    }

    /// Whether the next [`load`](Self::load) opens the audio stream.
    /// Has no effect on an already loaded file.
    pub fn enable_audio(&mut self, enabled: bool) {
        self.audio_enabled = enabled;
    }

    #[must_use]
    pub fn audio_enabled(&self) -> bool {
        self.audio_enabled
    }

    /// Opens `uri` and prepares a new session. Stops any running session first.
    ///
    /// # Errors
    ///
    /// Fails if the source cannot be opened, has no video stream, a codec
    /// cannot be opened, or the configured thresholds are invalid. No thread
    /// is started in any case.
    pub fn load(&mut self, uri: &str) -> Result<()> {
        self.stop();

        let thresholds = self.config.thresholds()?;
        let (resources, info) = DecodeSession::open(&self.backend, uri, self.audio_enabled)?;
        let state = StreamState::new(
            info,
            thresholds,
            self.config.video_capacity(),
            self.config.audio_capacity(),
        );
        if let Some(mode) = self.config.master_sync {
            state.set_master_sync(mode);
        }
        state.set_looping(self.config.loop_playback.unwrap_or(false));

        let video = &state.info().video;
        log::info!(
            "Loaded {uri}: {}x{} @ {:.2} fps, audio {}",
            video.width,
            video.height,
            state.info().fps(),
            state
                .info()
                .audio
                .as_ref()
                .map_or_else(|| "off".to_string(), |a| format!("{} Hz x{}", a.sample_rate, a.channels)),
        );

        self.session = Some(Arc::new(state));
        self.resources = Some(resources);
        Ok(())
    }

    /// Spawns the decode thread, restarting it if it is already running.
    ///
    /// # Errors
    ///
    /// [`VideoError::NotLoaded`] if nothing is loaded or a fatal decode error
    /// released the session's resources; an I/O error if the thread cannot be
    /// spawned (the session is stopped in that case).
    pub fn start(&mut self) -> Result<()> {
        let state = self.session.clone().ok_or(VideoError::NotLoaded)?;

        if let Some(resources) = self.halt_worker() {
            self.resources = Some(resources);
        }
        let resources = self.resources.take().ok_or(VideoError::NotLoaded)?;

        state.rearm();
        match worker::spawn(resources, state) {
            Ok(handle) => {
                self.worker = Some(handle);
                log::info!("Decode thread started");
                Ok(())
            }
            Err(err) => {
                log::error!("{err}");
                self.stop();
                Err(err)
            }
        }
    }

    /// Stops the decode thread, releases the file and resets the session.
    ///
    /// Idempotent. Outstanding [`PlaybackHandle`]s see a closed session.
    pub fn stop(&mut self) {
        drop(self.halt_worker());
        self.resources = None;
        if let Some(state) = self.session.take() {
            state.shutdown();
            state.close();
            log::info!("Decoder stopped");
        }
    }

    /// Signals the worker to quit and joins it.
    fn halt_worker(&mut self) -> Option<DecodeSession<B>> {
        let handle = self.worker.take()?;
        if let Some(state) = &self.session {
            state.shutdown();
        }
        match handle.join() {
            Ok(resources) => resources,
            Err(_) => {
                log::error!("Decode thread panicked");
                None
            }
        }
    }

    /// True between a successful `load` and `stop`.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.session.is_some()
    }

    /// True while a decode thread exists and has not exited.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Consumer handle for other threads, if a file is loaded.
    #[must_use]
    pub fn handle(&self) -> Option<PlaybackHandle> {
        self.session.clone().map(PlaybackHandle::new)
    }

    /// Current session state, if a file is loaded.
    #[must_use]
    pub fn session(&self) -> Option<&StreamState> {
        self.session.as_deref()
    }

    // ----- frame delivery -----

    /// See [`PlaybackHandle::get_video_frame`].
    pub fn get_video_frame(&self, external_clock: f64) -> Option<FrameGuard<'_>> {
        sync::next_video_frame(self.session.as_deref()?, external_clock)
    }

    pub fn got_video_frame(&self) {
        if let Some(state) = &self.session {
            sync::acknowledge_video(state);
        }
    }

    /// See [`PlaybackHandle::get_audio_frame`].
    pub fn get_audio_frame(&self, _external_clock: f64) -> Option<FrameGuard<'_>> {
        sync::next_audio_frame(self.session.as_deref()?)
    }

    pub fn got_audio_frame(&self) {
        if let Some(state) = &self.session {
            sync::acknowledge_audio(state);
        }
    }

    /// Requests a seek. Returns `false` if nothing is loaded or a seek is
    /// already pending.
    pub fn seek(&self, target_secs: f64, direction: SeekDirection) -> bool {
        self.session
            .as_ref()
            .is_some_and(|state| state.request_seek(target_secs, direction))
    }

    // ----- transport toggles -----

    pub fn set_paused(&self, paused: bool) {
        if let Some(state) = &self.session {
            state.set_paused(paused);
        }
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.session.as_ref().is_some_and(|state| state.is_paused())
    }

    /// Sets looping for the loaded file and for subsequent loads.
    pub fn set_looping(&mut self, looping: bool) {
        self.config.loop_playback = Some(looping);
        if let Some(state) = &self.session {
            state.set_looping(looping);
        }
    }

    #[must_use]
    pub fn is_looping(&self) -> bool {
        match &self.session {
            Some(state) => state.is_looping(),
            None => self.config.loop_playback.unwrap_or(false),
        }
    }

    /// Sets the master clock source for the loaded file and subsequent loads.
    pub fn set_master_sync(&mut self, mode: MasterSync) {
        self.config.master_sync = Some(mode);
        if let Some(state) = &self.session {
            state.set_master_sync(mode);
        }
    }

    #[must_use]
    pub fn master_sync(&self) -> MasterSync {
        match &self.session {
            Some(state) => state.master_sync(),
            None => self.config.master_sync.unwrap_or_default(),
        }
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.session.as_ref().is_some_and(|state| state.is_finished())
    }

    // ----- stream properties (zero when nothing is loaded) -----

    #[must_use]
    pub fn width(&self) -> u32 {
        self.session.as_ref().map_or(0, |s| s.info().video.width)
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.session.as_ref().map_or(0, |s| s.info().video.height)
    }

    /// Frame rate of the video stream, 30 if nothing is loaded.
    #[must_use]
    pub fn fps(&self) -> f64 {
        self.session
            .as_ref()
            .map_or(FALLBACK_FPS, |s| s.info().fps())
    }

    #[must_use]
    pub fn audio_sample_rate(&self) -> u32 {
        self.audio_param(|a| a.sample_rate)
    }

    #[must_use]
    pub fn audio_channel_count(&self) -> u16 {
        self.audio_param(|a| a.channels)
    }

    /// Samples per channel in one decoded audio frame.
    #[must_use]
    pub fn audio_samples_per_channel(&self) -> u32 {
        self.audio_param(|a| a.samples_per_channel)
    }

    fn audio_param<T: Default>(&self, f: impl FnOnce(&StreamParams) -> T) -> T {
        self.session
            .as_ref()
            .and_then(|s| s.info().audio.as_ref().map(f))
            .unwrap_or_default()
    }

    // ----- clocks -----

    #[must_use]
    pub fn master_clock(&self) -> f64 {
        self.session.as_ref().map_or(0.0, |s| s.master_clock())
    }

    #[must_use]
    pub fn video_clock(&self) -> f64 {
        self.session.as_ref().map_or(0.0, |s| s.video_clock())
    }

    #[must_use]
    pub fn audio_clock(&self) -> f64 {
        self.session.as_ref().map_or(0.0, |s| s.audio_clock())
    }

    #[must_use]
    pub fn last_frame_pts(&self) -> f64 {
        self.session.as_ref().map_or(0.0, |s| s.last_frame_pts())
    }
}

impl<B: MediaBackend> Drop for VideoDecoder<B> {
    fn drop(&mut self) {
        self.stop();
    }
}

impl<B: MediaBackend> std::fmt::Debug for VideoDecoder<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoDecoder")
            .field("audio_enabled", &self.audio_enabled)
            .field("loaded", &self.is_loaded())
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::testing::ScriptedBackend;
    use std::thread;
    use std::time::{Duration, Instant};

    fn new_decoder(backend: ScriptedBackend) -> VideoDecoder<ScriptedBackend> {
        VideoDecoder::new(backend, PipelineConfig::default())
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

    #[test]
    fn accessors_are_neutral_before_load() {
        let decoder = new_decoder(ScriptedBackend::video_only(1, 25));
        assert_eq!(decoder.width(), 0);
        assert_eq!(decoder.height(), 0);
        assert_eq!(decoder.fps(), FALLBACK_FPS);
        assert_eq!(decoder.audio_sample_rate(), 0);
        assert_eq!(decoder.audio_channel_count(), 0);
        assert!(decoder.get_video_frame(0.0).is_none());
        assert!(!decoder.seek(1.0, SeekDirection::Forward));
    }

    #[test]
    fn start_before_load_is_not_loaded() {
        let mut decoder = new_decoder(ScriptedBackend::video_only(1, 25));
        assert!(matches!(
            decoder.start(),
            Err(Error::Video(VideoError::NotLoaded))
        ));
    }

    #[test]
    fn load_reports_stream_properties() {
        let backend = ScriptedBackend::video_only(4, 24).with_audio(4, 44_100, 2, 1024);
        let mut decoder = new_decoder(backend);
        decoder.load("scripted").expect("load");

        assert_eq!(decoder.width(), 16);
        assert_eq!(decoder.height(), 16);
        assert_eq!(decoder.fps(), 24.0);
        assert_eq!(decoder.audio_sample_rate(), 44_100);
        assert_eq!(decoder.audio_channel_count(), 2);
        assert_eq!(decoder.audio_samples_per_channel(), 1024);
        assert!(!decoder.is_running());
    }

    #[test]
    fn disabled_audio_is_not_opened() {
        let backend = ScriptedBackend::video_only(4, 24).with_audio(4, 44_100, 2, 1024);
        let mut decoder = new_decoder(backend);
        decoder.enable_audio(false);
        decoder.load("scripted").expect("load");

        assert_eq!(decoder.audio_sample_rate(), 0);
        assert!(decoder.session().is_some_and(|s| s.audio_frames().is_none()));
    }

    #[test]
    fn load_failures_are_reported() {
        let mut decoder = new_decoder(
            ScriptedBackend::video_only(1, 25).with_open_error(VideoError::IoError("gone".into())),
        );
        assert!(decoder.load("missing").is_err());
        assert!(!decoder.is_loaded());

        let mut decoder = decoder_without_video();
        assert!(matches!(
            decoder.load("scripted"),
            Err(Error::Video(VideoError::NoVideoStream))
        ));

        let mut decoder = new_decoder(
            ScriptedBackend::video_only(1, 25)
                .with_codec_open_error(VideoError::UnsupportedCodec("vp9".into())),
        );
        assert!(decoder.load("scripted").is_err());
    }

    fn decoder_without_video() -> VideoDecoder<ScriptedBackend> {
        new_decoder(ScriptedBackend::new().with_audio(2, 48_000, 1, 256))
    }

    #[test]
    fn invalid_thresholds_fail_load() {
        let config = PipelineConfig {
            sync_threshold_secs: Some(2.0),
            nosync_threshold_secs: Some(1.0),
            ..PipelineConfig::default()
        };
        let mut decoder = VideoDecoder::new(ScriptedBackend::video_only(1, 25), config);
        assert!(matches!(decoder.load("scripted"), Err(Error::Config(_))));
    }

    #[test]
    fn start_stop_resets_state() {
        let mut decoder = new_decoder(ScriptedBackend::video_only(30, 25));
        decoder.load("scripted").expect("load");
        decoder.start().expect("start");
        let handle = decoder.handle().expect("handle");

        assert!(wait_until(|| handle.get_video_frame(0.0).is_some()));
        decoder.stop();

        assert!(!decoder.is_loaded());
        assert!(!decoder.is_running());
        assert!(!handle.state().is_open());
        assert!(handle.get_video_frame(0.0).is_none());
        assert_eq!(decoder.master_clock(), 0.0);

        // Stop is idempotent and the decoder is reusable.
        decoder.stop();
        decoder.load("scripted").expect("reload");
        decoder.start().expect("restart");
        assert!(wait_until(|| decoder.get_video_frame(0.0).is_some()));
    }

    #[test]
    fn start_twice_restarts_without_losing_position() {
        let mut decoder = new_decoder(ScriptedBackend::video_only(30, 25));
        decoder.load("scripted").expect("load");
        decoder.start().expect("start");
        assert!(wait_until(|| decoder.get_video_frame(0.0).is_some()));
        decoder.got_video_frame();

        decoder.start().expect("restart");
        assert!(decoder.is_running());
        assert!(wait_until(|| decoder
            .get_video_frame(0.04)
            .is_some_and(|f| f.pts_secs == 0.04)));
    }

    #[test]
    fn fatal_error_requires_reload() {
        let mut decoder = new_decoder(ScriptedBackend::video_only(10, 25).with_read_error_at(0));
        decoder.load("scripted").expect("load");
        decoder.start().expect("start");

        assert!(wait_until(|| !decoder.is_running()));
        assert!(decoder.is_finished());
        assert!(matches!(
            decoder.start(),
            Err(Error::Video(VideoError::NotLoaded))
        ));
    }

    #[test]
    fn config_applies_on_load() {
        let config = PipelineConfig {
            master_sync: Some(MasterSync::Video),
            loop_playback: Some(true),
            video_buffer_frames: Some(3),
            ..PipelineConfig::default()
        };
        let mut decoder = VideoDecoder::new(ScriptedBackend::video_only(1, 25), config);
        decoder.load("scripted").expect("load");

        assert_eq!(decoder.master_sync(), MasterSync::Video);
        assert!(decoder.is_looping());
        assert_eq!(
            decoder.session().map(|s| s.video_frames().capacity()),
            Some(3)
        );
    }
}

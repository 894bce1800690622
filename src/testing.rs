// SPDX-License-Identifier: MPL-2.0
//! In-memory media backend for exercising the pipeline without FFmpeg.
//!
//! A [`ScriptedBackend`] describes a container as a list of streams, each
//! with a fixed list of frames. Packets are produced one per frame in
//! presentation order across streams; the codec emits exactly the frame its
//! packet carries. Failures (open, read, seek, codec) can be injected, and
//! the backend records every seek and counts every packet read so tests can
//! observe the decode thread from outside.
//!
//! # Examples
//!
//! ```
//! use video_sync::config::PipelineConfig;
//! use video_sync::testing::ScriptedBackend;
//! use video_sync::video_player::VideoDecoder;
//!
//! let mut decoder = VideoDecoder::new(ScriptedBackend::video_only(10, 25), PipelineConfig::default());
//! decoder.load("scripted").unwrap();
//! assert_eq!(decoder.fps(), 25.0);
//! ```

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::{Result, VideoError};
use crate::video_player::{
    CodecError, FrameDecoder, FrameTiming, MediaBackend, MediaKind, PacketSource, ReadError,
    SeekDirection, StreamParams, TimeBase,
};

/// Bytes per sample of scripted audio (signed 16-bit).
pub const AUDIO_SAMPLE_BYTES: usize = 2;

/// Tolerance when matching seek targets against frame timestamps.
const EPSILON: f64 = 1e-9;

/// One frame of a scripted stream.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptedFrame {
    /// Timestamp in the stream's time base; `None` simulates a codec that
    /// cannot guess one.
    pub timestamp: Option<i64>,
    pub repeat_pict: i32,
    pub planes: Vec<Vec<u8>>,
}

impl ScriptedFrame {
    /// A 4:2:0 video frame whose luma plane is `luma_size` bytes.
    #[must_use]
    pub fn video(timestamp: Option<i64>, luma_size: usize) -> Self {
        let fill = timestamp.map_or(0, |ts| ts.rem_euclid(256) as u8);
        Self {
            timestamp,
            repeat_pict: 0,
            planes: vec![
                vec![fill; luma_size],
                vec![fill; luma_size / 4],
                vec![fill; luma_size / 4],
            ],
        }
    }

    /// A planar audio frame with one plane per channel.
    #[must_use]
    pub fn audio(timestamp: i64, channels: u16, samples_per_channel: u32) -> Self {
        let plane_len = samples_per_channel as usize * AUDIO_SAMPLE_BYTES;
        Self {
            timestamp: Some(timestamp),
            repeat_pict: 0,
            planes: (0..channels).map(|ch| vec![ch as u8; plane_len]).collect(),
        }
    }

    #[must_use]
    pub fn with_repeat_pict(mut self, repeat_pict: i32) -> Self {
        self.repeat_pict = repeat_pict;
        self
    }
}

/// A seek the decode thread issued against the packet source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeekRecord {
    pub stream: usize,
    pub target_ts: i64,
    pub direction: SeekDirection,
}

#[derive(Debug, Clone)]
struct ScriptedStream {
    params: StreamParams,
    frames: Arc<[ScriptedFrame]>,
}

#[derive(Debug, Clone)]
struct CodecFault {
    kind: MediaKind,
    frame: usize,
    error: CodecError,
}

#[derive(Debug, Default)]
struct Recorder {
    seeks: Mutex<Vec<SeekRecord>>,
    packets_read: AtomicUsize,
}

/// Scripted container and codec factory.
#[derive(Debug, Clone, Default)]
pub struct ScriptedBackend {
    streams: Vec<ScriptedStream>,
    open_error: Option<VideoError>,
    codec_open_error: Option<VideoError>,
    read_error_at: Option<usize>,
    failing_seeks: bool,
    failing_seek_stream: Option<usize>,
    codec_fault: Option<CodecFault>,
    busy_codec: Option<(MediaKind, usize)>,
    recorder: Arc<Recorder>,
}

impl ScriptedBackend {
    /// A container with no streams at all.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// `frame_count` video frames at `fps`, 16x16, timestamps `0..frame_count`
    /// in a `1/fps` time base.
    #[must_use]
    pub fn video_only(frame_count: usize, fps: i32) -> Self {
        let frames = (0..frame_count)
            .map(|i| ScriptedFrame::video(Some(i as i64), 16 * 16))
            .collect();
        let mut backend = Self::new().with_video(TimeBase::new(1, fps), frames);
        if let Some(stream) = backend.streams.last_mut() {
            stream.params.guessed_frame_rate = Some(TimeBase::new(fps, 1));
        }
        backend
    }

    /// Adds a 16x16 video stream with explicit frames.
    #[must_use]
    pub fn with_video(mut self, time_base: TimeBase, frames: Vec<ScriptedFrame>) -> Self {
        let index = self.streams.len();
        self.streams.push(ScriptedStream {
            params: StreamParams::video(index, time_base, 16, 16),
            frames: frames.into(),
        });
        self
    }

    /// Adds an audio stream of `frame_count` frames of `samples_per_channel`
    /// samples, timestamped in a `1/sample_rate` time base.
    #[must_use]
    pub fn with_audio(
        mut self,
        frame_count: usize,
        sample_rate: u32,
        channels: u16,
        samples_per_channel: u32,
    ) -> Self {
        let index = self.streams.len();
        let frames = (0..frame_count)
            .map(|i| {
                let ts = i as i64 * i64::from(samples_per_channel);
                ScriptedFrame::audio(ts, channels, samples_per_channel)
            })
            .collect();
        let time_base = TimeBase::new(1, i32::try_from(sample_rate).unwrap_or(i32::MAX));
        self.streams.push(ScriptedStream {
            params: StreamParams::audio(index, time_base, sample_rate, channels, samples_per_channel),
            frames,
        });
        self
    }

    /// Adds a stream the pipeline does not decode (subtitles, data).
    #[must_use]
    pub fn with_other_stream(mut self, frames: Vec<ScriptedFrame>) -> Self {
        let index = self.streams.len();
        let mut params = StreamParams::video(index, TimeBase::new(1, 1000), 0, 0);
        params.kind = MediaKind::Other;
        self.streams.push(ScriptedStream {
            params,
            frames: frames.into(),
        });
        self
    }

    /// Makes `open` fail with `error`.
    #[must_use]
    pub fn with_open_error(mut self, error: VideoError) -> Self {
        self.open_error = Some(error);
        self
    }

    /// Makes every `open_codec` fail with `error`.
    #[must_use]
    pub fn with_codec_open_error(mut self, error: VideoError) -> Self {
        self.codec_open_error = Some(error);
        self
    }

    /// The read with zero-based sequence number `read` reports an I/O error.
    #[must_use]
    pub fn with_read_error_at(mut self, read: usize) -> Self {
        self.read_error_at = Some(read);
        self
    }

    /// Every seek fails.
    #[must_use]
    pub fn with_failing_seeks(mut self) -> Self {
        self.failing_seeks = true;
        self
    }

    /// Only seeks on stream `stream` fail; the others still reposition.
    #[must_use]
    pub fn with_failing_seek_on(mut self, stream: usize) -> Self {
        self.failing_seek_stream = Some(stream);
        self
    }

    /// The first attempt to send the packet of frame `frame` of the first
    /// `kind` stream is refused with [`CodecError::NeedsInput`], as a codec
    /// with a full output queue would.
    #[must_use]
    pub fn with_busy_codec_at(mut self, kind: MediaKind, frame: usize) -> Self {
        self.busy_codec = Some((kind, frame));
        self
    }

    /// Receiving frame `frame` of the first `kind` stream yields `error`
    /// instead (the frame is consumed).
    #[must_use]
    pub fn with_codec_error(mut self, kind: MediaKind, frame: usize, error: CodecError) -> Self {
        self.codec_fault = Some(CodecFault { kind, frame, error });
        self
    }

    /// Seeks issued so far, across every source this backend opened.
    #[must_use]
    pub fn seeks(&self) -> Vec<SeekRecord> {
        self.recorder.seeks.lock().clone()
    }

    /// Packets read so far, including failed reads.
    #[must_use]
    pub fn packets_read(&self) -> usize {
        self.recorder.packets_read.load(Ordering::Acquire)
    }
}

/// Packet of a scripted source: a reference to one frame of one stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptedPacket {
    pub stream: usize,
    pub frame: usize,
}

#[derive(Debug, Clone, Copy)]
struct PacketEntry {
    packet: ScriptedPacket,
    pts_secs: f64,
}

/// Packet source produced by [`ScriptedBackend::open`].
#[derive(Debug)]
pub struct ScriptedSource {
    params: Vec<StreamParams>,
    packets: Vec<PacketEntry>,
    cursor: usize,
    reads: usize,
    read_error_at: Option<usize>,
    failing_seeks: bool,
    failing_seek_stream: Option<usize>,
    recorder: Arc<Recorder>,
}

impl ScriptedSource {
    fn new(backend: &ScriptedBackend) -> Self {
        let mut packets: Vec<PacketEntry> = backend
            .streams
            .iter()
            .flat_map(|stream| {
                let params = &stream.params;
                let mut clock = 0.0;
                stream.frames.iter().enumerate().map(move |(frame, data)| {
                    if let Some(ts) = data.timestamp {
                        clock = params.time_base.to_secs(ts);
                    }
                    PacketEntry {
                        packet: ScriptedPacket {
                            stream: params.index,
                            frame,
                        },
                        pts_secs: clock,
                    }
                })
            })
            .collect();
        packets.sort_by(|a, b| a.pts_secs.total_cmp(&b.pts_secs));

        Self {
            params: backend.streams.iter().map(|s| s.params.clone()).collect(),
            packets,
            cursor: 0,
            reads: 0,
            read_error_at: backend.read_error_at,
            failing_seeks: backend.failing_seeks,
            failing_seek_stream: backend.failing_seek_stream,
            recorder: Arc::clone(&backend.recorder),
        }
    }
}

impl PacketSource for ScriptedSource {
    type Packet = ScriptedPacket;

    fn streams(&self) -> &[StreamParams] {
        &self.params
    }

    fn read_packet(&mut self) -> std::result::Result<ScriptedPacket, ReadError> {
        let read = self.reads;
        self.reads += 1;
        self.recorder.packets_read.fetch_add(1, Ordering::AcqRel);

        if self.read_error_at == Some(read) {
            return Err(ReadError::Io("scripted read failure".to_string()));
        }
        let entry = self.packets.get(self.cursor).ok_or(ReadError::EndOfStream)?;
        self.cursor += 1;
        Ok(entry.packet)
    }

    fn packet_stream(&self, packet: &ScriptedPacket) -> usize {
        packet.stream
    }

    fn seek(&mut self, stream: usize, target_ts: i64, direction: SeekDirection) -> Result<()> {
        self.recorder.seeks.lock().push(SeekRecord {
            stream,
            target_ts,
            direction,
        });
        if self.failing_seeks || self.failing_seek_stream == Some(stream) {
            return Err(VideoError::SeekFailed("scripted seek failure".to_string()).into());
        }
        let params = self
            .params
            .get(stream)
            .ok_or_else(|| VideoError::SeekFailed(format!("no stream {stream}")))?;
        let target = params.time_base.to_secs(target_ts);

        self.cursor = match direction {
            SeekDirection::Forward => self
                .packets
                .iter()
                .position(|e| e.packet.stream == stream && e.pts_secs >= target - EPSILON)
                .unwrap_or(self.packets.len()),
            SeekDirection::Backward => self
                .packets
                .iter()
                .rposition(|e| e.packet.stream == stream && e.pts_secs <= target + EPSILON)
                .unwrap_or(0),
        };
        Ok(())
    }
}

/// Codec produced by [`ScriptedBackend::open_codec`].
#[derive(Debug)]
pub struct ScriptedCodec {
    stream: usize,
    frames: Arc<[ScriptedFrame]>,
    pending: VecDeque<usize>,
    current: Option<usize>,
    fault: Option<(usize, CodecError)>,
    busy_frame: Option<usize>,
}

impl FrameDecoder for ScriptedCodec {
    type Packet = ScriptedPacket;

    fn send_packet(&mut self, packet: &ScriptedPacket) -> std::result::Result<(), CodecError> {
        if packet.stream != self.stream {
            return Err(CodecError::Fatal(format!(
                "packet of stream {} sent to codec of stream {}",
                packet.stream, self.stream
            )));
        }
        if self.busy_frame == Some(packet.frame) {
            self.busy_frame = None;
            return Err(CodecError::NeedsInput);
        }
        self.pending.push_back(packet.frame);
        Ok(())
    }

    fn receive_frame(&mut self) -> std::result::Result<FrameTiming, CodecError> {
        let frame = self.pending.pop_front().ok_or(CodecError::NeedsInput)?;
        if let Some((fault_frame, error)) = &self.fault {
            if *fault_frame == frame {
                return Err(error.clone());
            }
        }
        let data = &self.frames[frame];
        self.current = Some(frame);
        Ok(FrameTiming {
            best_effort_timestamp: data.timestamp,
            repeat_pict: data.repeat_pict,
        })
    }

    fn plane_count(&self) -> usize {
        self.current.map_or(0, |frame| self.frames[frame].planes.len())
    }

    fn plane(&self, index: usize) -> &[u8] {
        self.current
            .and_then(|frame| self.frames[frame].planes.get(index))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn flush(&mut self) {
        self.pending.clear();
        self.current = None;
    }
}

impl MediaBackend for ScriptedBackend {
    type Packet = ScriptedPacket;
    type Source = ScriptedSource;
    type Codec = ScriptedCodec;

    fn open(&self, uri: &str) -> Result<ScriptedSource> {
        if let Some(error) = &self.open_error {
            return Err(error.clone().into());
        }
        log::debug!("Opening scripted source {uri}");
        Ok(ScriptedSource::new(self))
    }

    fn open_codec(&self, _source: &ScriptedSource, stream: &StreamParams) -> Result<ScriptedCodec> {
        if let Some(error) = &self.codec_open_error {
            return Err(error.clone().into());
        }
        let scripted = self
            .streams
            .get(stream.index)
            .ok_or_else(|| VideoError::DecodingFailed(format!("no stream {}", stream.index)))?;
        let first_of_kind = self
            .streams
            .iter()
            .position(|s| s.params.kind == stream.kind);
        let fault = self
            .codec_fault
            .as_ref()
            .filter(|fault| fault.kind == stream.kind && first_of_kind == Some(stream.index))
            .map(|fault| (fault.frame, fault.error.clone()));
        let is_first = first_of_kind == Some(stream.index);
        let busy_frame = self
            .busy_codec
            .filter(|(kind, _)| *kind == stream.kind && is_first)
            .map(|(_, frame)| frame);

        Ok(ScriptedCodec {
            stream: stream.index,
            frames: Arc::clone(&scripted.frames),
            pending: VecDeque::new(),
            current: None,
            fault,
            busy_frame,
        })
    }
}

// SPDX-License-Identifier: MPL-2.0
//! Demuxer and codec seams consumed by the decode worker.
//!
//! The pipeline never touches container formats or bitstreams itself: a
//! [`MediaBackend`] opens a [`PacketSource`] for a URI and a [`FrameDecoder`]
//! per stream. The FFmpeg implementation lives behind the `ffmpeg` feature;
//! tests drive the pipeline through the in-memory backend in
//! [`crate::testing`].

use crate::error::Result;

use super::time_units::TimeBase;

/// Kind of elementary stream inside a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    Audio,
    Other,
}

/// Direction hint for repositioning the packet source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SeekDirection {
    /// Land on the nearest sync point at or after the target.
    #[default]
    Forward,
    /// Land on the nearest sync point at or before the target.
    Backward,
}

/// Per-stream codec parameters reported by the packet source.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamParams {
    pub index: usize,
    pub kind: MediaKind,
    pub time_base: TimeBase,
    /// Frame rate guessed from container and codec hints.
    pub guessed_frame_rate: Option<TimeBase>,
    /// Lowest frame rate that represents all timestamps exactly.
    pub real_frame_rate: Option<TimeBase>,
    pub width: u32,
    pub height: u32,
    pub sample_rate: u32,
    pub channels: u16,
    /// Samples per channel in one decoded audio frame (0 if variable).
    pub samples_per_channel: u32,
}

impl StreamParams {
    /// Video stream parameters with everything audio-related zeroed.
    #[must_use]
    pub fn video(index: usize, time_base: TimeBase, width: u32, height: u32) -> Self {
        Self {
            index,
            kind: MediaKind::Video,
            time_base,
            guessed_frame_rate: None,
            real_frame_rate: None,
            width,
            height,
            sample_rate: 0,
            channels: 0,
            samples_per_channel: 0,
        }
    }

    /// Audio stream parameters with everything video-related zeroed.
    #[must_use]
    pub fn audio(
        index: usize,
        time_base: TimeBase,
        sample_rate: u32,
        channels: u16,
        samples_per_channel: u32,
    ) -> Self {
        Self {
            index,
            kind: MediaKind::Audio,
            time_base,
            guessed_frame_rate: None,
            real_frame_rate: None,
            width: 0,
            height: 0,
            sample_rate,
            channels,
            samples_per_channel,
        }
    }
}

/// Why the packet source produced no packet.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadError {
    /// The source ended cleanly.
    EndOfStream,
    /// The underlying I/O failed; the session cannot continue.
    Io(String),
}

/// Outcome of a codec call that did not produce a frame.
#[derive(Debug, Clone, PartialEq)]
pub enum CodecError {
    /// The codec needs more input before it can emit another frame.
    NeedsInput,
    /// The codec itself signalled end of stream.
    EndOfStream,
    /// Corrupt or unsupported bitstream.
    Fatal(String),
}

/// Timing information of the frame a [`FrameDecoder`] currently holds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameTiming {
    /// Best-effort timestamp in the stream time base, if the codec has one.
    pub best_effort_timestamp: Option<i64>,
    /// Extra display duration in half-frame units (interlace/repeat hint).
    pub repeat_pict: i32,
}

/// Compressed packet producer (container demuxer).
pub trait PacketSource: Send {
    type Packet: Send;

    /// Streams found in the container, in container order.
    fn streams(&self) -> &[StreamParams];

    /// Reads the next packet from any stream.
    fn read_packet(&mut self) -> std::result::Result<Self::Packet, ReadError>;

    /// Index of the stream a packet belongs to.
    fn packet_stream(&self, packet: &Self::Packet) -> usize;

    /// Repositions `stream` to `target_ts`, expressed in that stream's time base.
    fn seek(&mut self, stream: usize, target_ts: i64, direction: SeekDirection) -> Result<()>;
}

/// Codec context for one stream.
pub trait FrameDecoder: Send {
    type Packet;

    /// Feeds one compressed packet. [`CodecError::NeedsInput`] here means the
    /// codec must be drained first and is not an error.
    fn send_packet(&mut self, packet: &Self::Packet) -> std::result::Result<(), CodecError>;

    /// Decodes the next frame into the codec's internal frame.
    fn receive_frame(&mut self) -> std::result::Result<FrameTiming, CodecError>;

    /// Number of data planes of the frame returned by the last `receive_frame`.
    fn plane_count(&self) -> usize;

    /// Bytes of plane `index` of the current frame.
    fn plane(&self, index: usize) -> &[u8];

    /// Drops any internally buffered frames (after a seek).
    fn flush(&mut self);
}

/// Factory for sources and codecs.
pub trait MediaBackend: Send + 'static {
    type Packet: Send;
    type Source: PacketSource<Packet = Self::Packet> + 'static;
    type Codec: FrameDecoder<Packet = Self::Packet> + 'static;

    /// Opens the container at `uri` and probes its streams.
    fn open(&self, uri: &str) -> Result<Self::Source>;

    /// Opens a codec context for `stream`.
    fn open_codec(&self, source: &Self::Source, stream: &StreamParams) -> Result<Self::Codec>;
}

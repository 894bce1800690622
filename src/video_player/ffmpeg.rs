// SPDX-License-Identifier: MPL-2.0
//! FFmpeg implementation of the media backend.
//!
//! Frames are passed through in the codec's native layout: planar video keeps
//! its (up to three) planes with their line padding, audio keeps one plane per
//! channel for planar sample formats or a single interleaved plane.

use std::path::Path;
use std::sync::Once;

use ffmpeg_next::codec::context::Context as CodecContext;
use ffmpeg_next::{decoder, ffi, format, frame, media, Packet, Rational};

use crate::error::{Error, Result, VideoError};

use super::backend::{
    CodecError, FrameDecoder, FrameTiming, MediaBackend, MediaKind, PacketSource, ReadError,
    SeekDirection, StreamParams,
};
use super::frame::MAX_PLANES;
use super::time_units::TimeBase;

/// Static flag to ensure FFmpeg is initialized only once.
static FFMPEG_INIT: Once = Once::new();

/// Initialize FFmpeg with appropriate log level.
///
/// Safe to call multiple times. Sets the FFmpeg log level to ERROR so
/// container warnings do not flood stderr.
pub fn init_ffmpeg() -> Result<()> {
    let mut init_result: Result<()> = Ok(());

    FFMPEG_INIT.call_once(|| {
        if let Err(e) = ffmpeg_next::init() {
            init_result = Err(Error::Io(format!("FFmpeg initialization failed: {e}")));
            return;
        }

        // SAFETY: av_log_set_level is thread-safe and only affects logging
        unsafe {
            ffi::av_log_set_level(ffi::AV_LOG_ERROR);
        }
    });

    init_result
}

fn time_base(rational: Rational) -> TimeBase {
    TimeBase::new(rational.numerator(), rational.denominator())
}

fn rate(rational: Rational) -> Option<TimeBase> {
    let rate = time_base(rational);
    rate.as_rate().map(|_| rate)
}

fn backend_error(context: &str, err: &ffmpeg_next::Error) -> Error {
    VideoError::from_message(&format!("{context}: {err}")).into()
}

/// Backend that demuxes and decodes with libavformat/libavcodec.
#[derive(Debug, Clone, Copy, Default)]
pub struct FfmpegBackend;

impl FfmpegBackend {
    /// Initializes FFmpeg and returns the backend.
    pub fn new() -> Result<Self> {
        init_ffmpeg()?;
        Ok(Self)
    }
}

/// Compressed packet read from the container.
pub struct FfmpegPacket(Packet);

// SAFETY: a packet owns its buffer and is only ever moved between threads,
// never shared.
unsafe impl Send for FfmpegPacket {}

/// Demuxer over an opened input.
pub struct FfmpegSource {
    input: format::context::Input,
    streams: Vec<StreamParams>,
}

// SAFETY: the format context is owned by exactly one thread at a time; it is
// moved into the decode thread and never aliased.
unsafe impl Send for FfmpegSource {}

impl FfmpegSource {
    fn probe(input: &format::context::Input) -> Vec<StreamParams> {
        input
            .streams()
            .map(|stream| {
                let kind = match stream.parameters().medium() {
                    media::Type::Video => MediaKind::Video,
                    media::Type::Audio => MediaKind::Audio,
                    _ => MediaKind::Other,
                };
                let tb = time_base(stream.time_base());

                // SAFETY: codec parameters stay valid for as long as the input.
                let (width, height, sample_rate, channels, frame_size) = unsafe {
                    let par = &*stream.parameters().as_ptr();
                    (
                        par.width,
                        par.height,
                        par.sample_rate,
                        par.ch_layout.nb_channels,
                        par.frame_size,
                    )
                };
                let to_u32 = |value: i32| u32::try_from(value).unwrap_or(0);

                let mut params = match kind {
                    MediaKind::Audio => StreamParams::audio(
                        stream.index(),
                        tb,
                        to_u32(sample_rate),
                        u16::try_from(channels).unwrap_or(0),
                        to_u32(frame_size),
                    ),
                    _ => StreamParams::video(stream.index(), tb, to_u32(width), to_u32(height)),
                };
                params.kind = kind;
                params.guessed_frame_rate = rate(stream.avg_frame_rate());
                params.real_frame_rate = rate(stream.rate());
                params
            })
            .collect()
    }
}

impl PacketSource for FfmpegSource {
    type Packet = FfmpegPacket;

    fn streams(&self) -> &[StreamParams] {
        &self.streams
    }

    fn read_packet(&mut self) -> std::result::Result<FfmpegPacket, ReadError> {
        let mut packet = Packet::empty();
        match packet.read(&mut self.input) {
            Ok(()) => Ok(FfmpegPacket(packet)),
            Err(ffmpeg_next::Error::Eof) => Err(ReadError::EndOfStream),
            Err(err) => Err(ReadError::Io(err.to_string())),
        }
    }

    fn packet_stream(&self, packet: &FfmpegPacket) -> usize {
        packet.0.stream()
    }

    fn seek(&mut self, stream: usize, target_ts: i64, direction: SeekDirection) -> Result<()> {
        let index = i32::try_from(stream)
            .map_err(|_| VideoError::SeekFailed(format!("invalid stream index {stream}")))?;
        let flags = match direction {
            SeekDirection::Forward => 0,
            SeekDirection::Backward => ffi::AVSEEK_FLAG_BACKWARD as i32,
        };
        // SAFETY: the context is exclusively borrowed for the duration of the call.
        let ret = unsafe { ffi::av_seek_frame(self.input.as_mut_ptr(), index, target_ts, flags) };
        if ret < 0 {
            return Err(VideoError::SeekFailed(ffmpeg_next::Error::from(ret).to_string()).into());
        }
        Ok(())
    }
}

enum Opened {
    Video(decoder::Video, frame::Video),
    Audio(decoder::Audio, frame::Audio),
}

/// Codec context plus the frame it decodes into.
pub struct FfmpegCodec {
    opened: Opened,
}

// SAFETY: codec contexts and frames are owned by the decode thread alone.
unsafe impl Send for FfmpegCodec {}

fn codec_error(err: ffmpeg_next::Error) -> CodecError {
    match err {
        ffmpeg_next::Error::Other { errno } if errno == ffmpeg_next::error::EAGAIN => CodecError::NeedsInput,
        ffmpeg_next::Error::Eof => CodecError::EndOfStream,
        other => CodecError::Fatal(other.to_string()),
    }
}

impl FfmpegCodec {
    fn decoder(&mut self) -> &mut decoder::Opened {
        match &mut self.opened {
            Opened::Video(decoder, _) => decoder,
            Opened::Audio(decoder, _) => decoder,
        }
    }

    fn frame(&self) -> &frame::Frame {
        match &self.opened {
            Opened::Video(_, frame) => frame,
            Opened::Audio(_, frame) => frame,
        }
    }

    /// Sample bytes per audio plane; linesize may include padding.
    fn audio_plane_len(frame: &frame::Audio) -> usize {
        let bytes = frame.samples() * frame.format().bytes();
        if frame.is_planar() {
            bytes
        } else {
            // SAFETY: reading a plain field of a valid frame.
            let channels = unsafe { (*frame.as_ptr()).ch_layout.nb_channels };
            bytes * usize::try_from(channels).unwrap_or(1)
        }
    }
}

impl FrameDecoder for FfmpegCodec {
    type Packet = FfmpegPacket;

    fn send_packet(&mut self, packet: &FfmpegPacket) -> std::result::Result<(), CodecError> {
        self.decoder().send_packet(&packet.0).map_err(codec_error)
    }

    fn receive_frame(&mut self) -> std::result::Result<FrameTiming, CodecError> {
        let received = match &mut self.opened {
            Opened::Video(decoder, frame) => decoder.receive_frame(frame),
            Opened::Audio(decoder, frame) => decoder.receive_frame(frame),
        };
        received.map_err(codec_error)?;

        let frame = self.frame();
        // SAFETY: reading a plain field of the frame just filled by the codec.
        let repeat_pict = unsafe { (*frame.as_ptr()).repeat_pict };
        Ok(FrameTiming {
            best_effort_timestamp: frame.timestamp(),
            repeat_pict,
        })
    }

    fn plane_count(&self) -> usize {
        let planes = match &self.opened {
            Opened::Video(_, frame) => frame.planes(),
            Opened::Audio(_, frame) => frame.planes(),
        };
        planes.min(MAX_PLANES)
    }

    fn plane(&self, index: usize) -> &[u8] {
        match &self.opened {
            Opened::Video(_, frame) => frame.data(index),
            Opened::Audio(_, frame) => {
                let data = frame.data(index);
                &data[..Self::audio_plane_len(frame).min(data.len())]
            }
        }
    }

    fn flush(&mut self) {
        self.decoder().flush();
    }
}

impl MediaBackend for FfmpegBackend {
    type Packet = FfmpegPacket;
    type Source = FfmpegSource;
    type Codec = FfmpegCodec;

    fn open(&self, uri: &str) -> Result<FfmpegSource> {
        init_ffmpeg()?;
        let input = format::input(Path::new(uri))
            .map_err(|e| backend_error("Failed to open video file", &e))?;
        let streams = FfmpegSource::probe(&input);
        Ok(FfmpegSource { input, streams })
    }

    fn open_codec(&self, source: &FfmpegSource, params: &StreamParams) -> Result<FfmpegCodec> {
        let stream = source
            .input
            .stream(params.index)
            .ok_or(VideoError::NoVideoStream)?;
        let context = CodecContext::from_parameters(stream.parameters())
            .map_err(|e| backend_error("Failed to create codec context", &e))?;

        let opened = match params.kind {
            MediaKind::Video => Opened::Video(
                context
                    .decoder()
                    .video()
                    .map_err(|e| backend_error("Failed to create video decoder", &e))?,
                frame::Video::empty(),
            ),
            MediaKind::Audio => Opened::Audio(
                context
                    .decoder()
                    .audio()
                    .map_err(|e| backend_error("Failed to create audio decoder", &e))?,
                frame::Audio::empty(),
            ),
            MediaKind::Other => {
                return Err(VideoError::UnsupportedCodec(format!("stream {}", params.index)).into())
            }
        };
        Ok(FfmpegCodec { opened })
    }
}

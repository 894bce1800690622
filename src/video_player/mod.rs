// SPDX-License-Identifier: MPL-2.0
//! Media decode-and-sync pipeline.
//!
//! A background decode thread fills bounded ring buffers with decoded frames;
//! the presentation driver pulls them through [`VideoDecoder`] or a
//! [`PlaybackHandle`], which keep video aligned with the chosen master clock.
//! Demuxing and decoding go through the [`MediaBackend`] traits; FFmpeg is
//! available behind the `ffmpeg` feature.

mod backend;
mod buffer_capacity;
mod decoder;
#[cfg(feature = "ffmpeg")]
pub mod ffmpeg;
mod frame;
pub mod media_buffer;
mod state;
mod sync;
pub mod time_units;
mod worker;

pub use backend::{
    CodecError, FrameDecoder, FrameTiming, MediaBackend, MediaKind, PacketSource, ReadError,
    SeekDirection, StreamParams,
};
pub use buffer_capacity::BufferCapacity;
pub use decoder::VideoDecoder;
#[cfg(feature = "ffmpeg")]
pub use ffmpeg::{init_ffmpeg, FfmpegBackend};
pub use frame::{MediaFrame, MAX_PLANES};
pub use media_buffer::{FrameGuard, MediaBuffer};
pub use state::{AtomicSeconds, MasterSync, SeekRequest, StreamInfo, StreamState};
pub use sync::{calculate_sync_action, PlaybackHandle, SyncAction};
pub use time_units::TimeBase;
pub use worker::DECODE_THREAD_NAME;

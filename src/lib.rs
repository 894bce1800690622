// SPDX-License-Identifier: MPL-2.0
//! `video_sync` is a media decode-and-synchronization pipeline.
//!
//! A dedicated thread demuxes and decodes audio/video into bounded ring
//! buffers, and a pull-based API delivers frames to a render thread and an
//! audio callback while keeping video aligned with a video, audio or
//! externally supplied master clock.

#![doc(html_root_url = "https://docs.rs/video_sync/0.3.0")]

pub mod config;
pub mod error;
pub mod testing;
pub mod video_player;

#[cfg(test)]
mod test_utils;

// SPDX-License-Identifier: MPL-2.0
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("I/O Error: {0}")]
    Io(String),
    #[error("Config Error: {0}")]
    Config(String),
    #[error("Video Error: {0}")]
    Video(#[from] VideoError),
}

/// Specific error types for decode pipeline failures.
///
/// Setup failures are returned from `VideoDecoder::load`; runtime failures on
/// the decode thread are logged and reflected in the session flags instead.
#[derive(Debug, Clone, Error)]
pub enum VideoError {
    /// Container could be opened but contains no video stream
    #[error("No video stream found")]
    NoVideoStream,

    /// Codec is not supported by the backend
    #[error("Unsupported video codec: {0}")]
    UnsupportedCodec(String),

    /// File appears corrupted or has invalid data
    #[error("Video file is corrupted")]
    CorruptedFile,

    /// Decoding failed (codec context or bitstream)
    #[error("Decoding failed: {0}")]
    DecodingFailed(String),

    /// Repositioning the packet source failed
    #[error("Seek failed: {0}")]
    SeekFailed(String),

    /// An operation needs a loaded session
    #[error("No media loaded")]
    NotLoaded,

    /// I/O error (file not found, permission denied, read failure)
    #[error("I/O error: {0}")]
    IoError(String),

    /// Generic error with raw message
    #[error("{0}")]
    Other(String),
}

impl VideoError {
    /// Returns true when the error leaves the session unusable until the next load.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, VideoError::SeekFailed(_) | VideoError::NotLoaded)
    }

    /// Attempts to parse a raw error message into a specific `VideoError` type.
    /// This is used to categorize errors coming out of the backend.
    pub fn from_message(msg: &str) -> Self {
        let msg_lower = msg.to_lowercase();

        // Check codec/decoder errors first (they might contain "not found")
        if msg_lower.contains("codec") || msg_lower.contains("decoder") {
            if let Some(codec) = Self::extract_codec_name(&msg_lower) {
                return VideoError::UnsupportedCodec(codec);
            } else if msg_lower.contains("not found") || msg_lower.contains("unsupported") {
                return VideoError::DecodingFailed(msg.to_string());
            }
        }

        if msg_lower.contains("no such file")
            || (msg_lower.contains("not found") && !msg_lower.contains("decoder"))
            || msg_lower.contains("permission denied")
            || msg_lower.contains("i/o error")
        {
            return VideoError::IoError(msg.to_string());
        }

        if msg_lower.contains("no video stream") || msg_lower.contains("no video track") {
            return VideoError::NoVideoStream;
        }

        if msg_lower.contains("seek") {
            return VideoError::SeekFailed(msg.to_string());
        }

        if msg_lower.contains("corrupt")
            || msg_lower.contains("invalid")
            || msg_lower.contains("malformed")
        {
            return VideoError::CorruptedFile;
        }

        if msg_lower.contains("packet")
            || msg_lower.contains("decode")
            || msg_lower.contains("unsupported")
        {
            return VideoError::DecodingFailed(msg.to_string());
        }

        VideoError::Other(msg.to_string())
    }

    /// Tries to extract a codec name from an error message.
    fn extract_codec_name(msg: &str) -> Option<String> {
        let codecs = [
            "h264", "hevc", "h265", "vp8", "vp9", "av1", "mpeg4", "mpeg2", "aac", "opus",
        ];
        for codec in codecs {
            if msg.contains(codec) {
                return Some(codec.to_uppercase());
            }
        }
        None
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(err: toml::ser::Error) -> Self {
        Error::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_formats_io_error() {
        let err = Error::Io("disk failure".to_string());
        assert_eq!(format!("{}", err), "I/O Error: disk failure");
    }

    #[test]
    fn from_io_error_produces_io_variant() {
        let io_error = std::io::Error::other("boom");
        let err: Error = io_error.into();
        match err {
            Error::Io(message) => assert!(message.contains("boom")),
            _ => panic!("expected Io variant"),
        }
    }

    #[test]
    fn config_error_formats_properly() {
        let err = Error::Config("bad field".into());
        assert_eq!(format!("{}", err), "Config Error: bad field");
    }

    #[test]
    fn video_error_wraps_into_error() {
        let err: Error = VideoError::NoVideoStream.into();
        assert_eq!(format!("{}", err), "Video Error: No video stream found");
    }

    #[test]
    fn video_error_from_message_io() {
        let err = VideoError::from_message("No such file or directory");
        assert!(matches!(err, VideoError::IoError(_)));
    }

    #[test]
    fn video_error_from_message_no_stream() {
        let err = VideoError::from_message("No video stream found in file");
        assert!(matches!(err, VideoError::NoVideoStream));
    }

    #[test]
    fn video_error_from_message_codec() {
        let err = VideoError::from_message("Decoder h264 not found");
        assert!(matches!(err, VideoError::UnsupportedCodec(codec) if codec == "H264"));
    }

    #[test]
    fn video_error_from_message_seek() {
        let err = VideoError::from_message("Seek to 12.0 rejected by demuxer");
        assert!(matches!(err, VideoError::SeekFailed(_)));
    }

    #[test]
    fn video_error_from_message_corrupted() {
        let err = VideoError::from_message("File is corrupt or invalid");
        assert!(matches!(err, VideoError::CorruptedFile));
    }

    #[test]
    fn video_error_from_message_decoding() {
        let err = VideoError::from_message("Packet send failed: error");
        assert!(matches!(err, VideoError::DecodingFailed(_)));
    }

    #[test]
    fn seek_failures_are_not_fatal() {
        assert!(!VideoError::SeekFailed("x".into()).is_fatal());
        assert!(VideoError::CorruptedFile.is_fatal());
        assert!(VideoError::DecodingFailed("x".into()).is_fatal());
    }
}

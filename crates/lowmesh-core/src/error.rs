//! Error types for the lowmesh-core crate.

use core::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    TooShort { min: usize, actual: usize },
    TooLarge { max: usize, actual: usize },
    InvalidFrameType(u8),
    InvalidDispatch(u8),
    InvalidVersion(u8),
    MissingMic,
    InvalidFragmentSize(u16),
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::TooShort { min, actual } => {
                write!(f, "frame too short: need at least {min} bytes, got {actual}")
            }
            FrameError::TooLarge { max, actual } => {
                write!(f, "frame too large: at most {max} bytes, got {actual}")
            }
            FrameError::InvalidFrameType(v) => write!(f, "invalid frame type: {v}"),
            FrameError::InvalidDispatch(v) => write!(f, "invalid dispatch: {v:#04x}"),
            FrameError::InvalidVersion(v) => write!(f, "unsupported datagram version: {v}"),
            FrameError::MissingMic => write!(f, "secured frame is missing its MIC"),
            FrameError::InvalidFragmentSize(v) => write!(f, "invalid fragment size: {v}"),
        }
    }
}

impl std::error::Error for FrameError {}

use std::fmt;

/// Errors returned by [`crate::beacon::BeaconCodec`] when a received frame
/// cannot be interpreted as a beacon of the expected kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecError {
    /// Frame shorter than the wire size of the beacon it claims to be.
    Truncated { expected: usize, got: usize },
    /// First payload byte did not match any known dispatch marker.
    UnknownDispatchMarker(u8),
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::Truncated { expected, got } => {
                write!(f, "truncated beacon frame: expected {expected} bytes, got {got}")
            }
            CodecError::UnknownDispatchMarker(b) => {
                write!(f, "unknown dispatch marker byte 0x{b:02x}")
            }
        }
    }
}

impl std::error::Error for CodecError {}

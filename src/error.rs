use core::fmt;

/// Framing and payload codec failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameError {
    /// Payload does not fit the length field or the payload bound
    PayloadTooLarge { len: usize },
    /// Destination slice is shorter than the encoded frame
    BufferTooSmall { needed: usize, available: usize },
    /// The codec could not serialize the snapshot
    Encode,
    /// The payload did not decode into a snapshot
    Decode,
    /// Input does not start with the frame marker
    BadMarker,
    /// Not enough bytes yet for a whole frame
    Incomplete,
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PayloadTooLarge { len } => write!(f, "payload of {} bytes is too large", len),
            Self::BufferTooSmall { needed, available } => {
                write!(f, "frame needs {} bytes, buffer has {}", needed, available)
            }
            Self::Encode => f.write_str("snapshot encoding failed"),
            Self::Decode => f.write_str("payload decoding failed"),
            Self::BadMarker => f.write_str("missing frame marker"),
            Self::Incomplete => f.write_str("incomplete frame"),
        }
    }
}

pub type Result<T> = core::result::Result<T, FrameError>;

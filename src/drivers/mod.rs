pub mod bno08x;
pub mod gps;
pub mod spl06;

use core::fmt;

/// Driver failure, generic over the bus error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E> {
    /// Bus transaction failed
    Bus(E),
    /// The device never produced the expected response
    NotResponding,
    /// Identity register did not match the driver
    BadChipId(u8),
    /// A ready bit stayed clear past the wait budget
    Timeout,
}

impl<E: fmt::Debug> fmt::Display for Error<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Bus(e) => write!(f, "bus error: {:?}", e),
            Error::NotResponding => f.write_str("device not responding"),
            Error::BadChipId(id) => write!(f, "unexpected chip id 0x{:02x}", id),
            Error::Timeout => f.write_str("timed out waiting for device"),
        }
    }
}

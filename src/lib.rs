#![cfg_attr(not(test), no_std)]

#[macro_use]
mod macros;

pub mod assembler;
pub mod clamp;
pub mod config;
pub mod drivers;
pub mod error;
pub mod frame;
pub mod inertial;
pub mod pipeline;
pub mod sensors;
pub mod state;
pub mod transmit;

pub use assembler::SnapshotAssembler;
pub use error::FrameError;
pub use frame::{Frame, FrameDecoder, FrameEncoder};
pub use inertial::InertialPoller;
pub use pipeline::{CycleReport, Pipeline};
pub use sensors::{ChannelReader, Clock, InertialSensor, Transport};
pub use state::{Quaternion, Snapshot, StatusFlags, Vector3};
pub use transmit::{BufferedTransport, TransmitGate, TransmitOutcome};

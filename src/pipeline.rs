use crate::assembler::SnapshotAssembler;
use crate::frame::FrameEncoder;
use crate::inertial::{InertialDiagnostics, InertialPoller, InertialPollerState, PollReport};
use crate::sensors::{BaroSample, ChannelReader, Clock, GnssFix, InertialSensor, RawVoltage, Transport};
use crate::state::StatusFlags;
use crate::transmit::{TransmitGate, TransmitOutcome};

/// Result of one acquisition cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CycleReport {
    pub timestamp_ms: u32,
    pub flags: StatusFlags,
    pub inertial: PollReport,
    /// `None` when the snapshot could not be encoded.
    pub outcome: Option<TransmitOutcome>,
}

/// Owns every collaborator and runs acquire, merge, frame, transmit in that
/// order, once per call to [`Pipeline::run_cycle`].
pub struct Pipeline<C, B, G, V, S, T> {
    clock: C,
    assembler: SnapshotAssembler<B, G, V>,
    inertial: InertialPoller<S>,
    encoder: FrameEncoder,
    gate: TransmitGate,
    transport: T,
    cycles: u32,
}

impl<C, B, G, V, S, T> Pipeline<C, B, G, V, S, T>
where
    C: Clock,
    B: ChannelReader<Sample = BaroSample>,
    G: ChannelReader<Sample = GnssFix>,
    V: ChannelReader<Sample = RawVoltage>,
    S: InertialSensor,
    T: Transport,
{
    pub fn new(
        clock: C,
        assembler: SnapshotAssembler<B, G, V>,
        inertial: InertialPoller<S>,
        transport: T,
    ) -> Self {
        Self {
            clock,
            assembler,
            inertial,
            encoder: FrameEncoder::new(),
            gate: TransmitGate::new(),
            transport,
            cycles: 0,
        }
    }

    /// Bring the IMU up and arm its reports. A failed bring-up is not fatal;
    /// the reset policy keeps retrying from the first cycle on.
    pub fn begin(&mut self) -> bool {
        self.inertial.begin(&self.clock)
    }

    pub fn run_cycle(&mut self) -> CycleReport {
        let (snapshot, flags, inertial) = self.assembler.assemble(&self.clock, &mut self.inertial);
        self.cycles = self.cycles.wrapping_add(1);

        let outcome = match self.encoder.encode(&snapshot) {
            Ok(frame) => Some(self.gate.transmit(&mut self.transport, &frame)),
            Err(_) => None,
        };

        CycleReport {
            timestamp_ms: snapshot.timestamp as u32,
            flags,
            inertial,
            outcome,
        }
    }

    pub fn cycles(&self) -> u32 {
        self.cycles
    }

    pub fn inertial_state(&self) -> InertialPollerState {
        self.inertial.state()
    }

    pub fn inertial_diagnostics(&self) -> &InertialDiagnostics {
        self.inertial.diagnostics()
    }

    pub fn gate(&self) -> &TransmitGate {
        &self.gate
    }

    pub fn encoder(&self) -> &FrameEncoder {
        &self.encoder
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn assembler_mut(&mut self) -> &mut SnapshotAssembler<B, G, V> {
        &mut self.assembler
    }

    pub fn sensor_mut(&mut self) -> &mut S {
        self.inertial.sensor_mut()
    }
}

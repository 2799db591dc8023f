use crate::clamp::{clamp_quaternion, clamp_vector};
use crate::config::{
    ACCEL_REPORT_INTERVAL_US, GYRO_REPORT_INTERVAL_US, IMU_MAX_ATTEMPTS, IMU_READ_BUDGET_MS,
    IMU_RESET_INTERVAL_MS, MAG_REPORT_INTERVAL_US, MAX_ACCEL_VALUE, MAX_GYRO_VALUE,
    MAX_MAG_VALUE, MAX_QUAT_VALUE, ROTATION_REPORT_INTERVAL_US,
};
use crate::sensors::{Clock, EventKind, InertialEvent, InertialSensor};
use crate::state::{Snapshot, StatusFlags};

// ── Tunables ─────────────────────────────────────────────────────────────────

/// Budgets for one polling pass. Defaults come from `config`.
#[derive(Debug, Clone, Copy)]
pub struct PollerConfig {
    pub read_budget_ms: u32,
    pub max_attempts: u32,
    pub reset_interval_ms: u32,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            read_budget_ms: IMU_READ_BUDGET_MS,
            max_attempts: IMU_MAX_ATTEMPTS,
            reset_interval_ms: IMU_RESET_INTERVAL_MS,
        }
    }
}

const fn report_interval_us(kind: EventKind) -> u32 {
    match kind {
        EventKind::Acceleration => ACCEL_REPORT_INTERVAL_US,
        EventKind::Gyro => GYRO_REPORT_INTERVAL_US,
        EventKind::Rotation => ROTATION_REPORT_INTERVAL_US,
        EventKind::MagneticField => MAG_REPORT_INTERVAL_US,
    }
}

const fn status_bit(kind: EventKind) -> StatusFlags {
    match kind {
        EventKind::Acceleration => StatusFlags::ACCEL_OK,
        EventKind::Gyro => StatusFlags::GYRO_OK,
        EventKind::Rotation => StatusFlags::ROTATION_OK,
        EventKind::MagneticField => StatusFlags::MAG_OK,
    }
}

// ── State ─────────────────────────────────────────────────────────────────────

/// The only pipeline state that outlives a cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InertialPollerState {
    pub last_reset_time: u32,
    /// Cycles in a row in which the sensor produced nothing at all.
    pub consecutive_non_responsive_count: u32,
}

/// Cumulative counters. Diagnostic only, never framed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InertialDiagnostics {
    /// Latched once any sample had to be clamped.
    pub bad_sample_observed: bool,
    /// Clamped samples per [`EventKind::index`].
    pub clamped: [u32; 4],
    pub events: u32,
    pub non_responsive_polls: u32,
    pub reset_attempts: u32,
    pub reset_failures: u32,
    pub device_resets: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ResetOutcome {
    NotNeeded,
    CoolingDown,
    Succeeded,
    Failed,
}

/// What one polling pass saw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PollReport {
    pub observed: StatusFlags,
    pub attempts: u32,
    pub non_responsive: u32,
    pub reset: ResetOutcome,
}

// ── Poller ────────────────────────────────────────────────────────────────────

/// Bounded-retry drain of an event-driven IMU.
///
/// Each cycle it pulls events until all four kinds were seen, the time
/// budget ran out, or the attempt ceiling was hit. A cycle with no event at
/// all, past the reset interval, reinitializes the device.
pub struct InertialPoller<S> {
    sensor: S,
    config: PollerConfig,
    state: InertialPollerState,
    diagnostics: InertialDiagnostics,
}

impl<S: InertialSensor> InertialPoller<S> {
    pub fn new(sensor: S) -> Self {
        Self::with_config(sensor, PollerConfig::default())
    }

    pub fn with_config(sensor: S, config: PollerConfig) -> Self {
        Self {
            sensor,
            config,
            state: InertialPollerState::default(),
            diagnostics: InertialDiagnostics::default(),
        }
    }

    /// First bring-up. Starts the reset cooldown whether or not the device
    /// answered, so a dead sensor is retried one interval later.
    pub fn begin(&mut self, clock: &impl Clock) -> bool {
        self.state.last_reset_time = clock.now_ms();
        let ok = self.sensor.initialize();
        if ok {
            self.subscribe_all();
            info!("IMU initialized");
        } else {
            error!("IMU did not answer at startup");
        }
        ok
    }

    pub fn state(&self) -> InertialPollerState {
        self.state
    }

    pub fn diagnostics(&self) -> &InertialDiagnostics {
        &self.diagnostics
    }

    pub fn sensor_mut(&mut self) -> &mut S {
        &mut self.sensor
    }

    /// One polling pass, merged into `snapshot`. Returns the channel bits for
    /// the kinds actually observed; unobserved fields keep their sentinel.
    pub fn poll(&mut self, clock: &impl Clock, snapshot: &mut Snapshot) -> PollReport {
        if self.sensor.was_reset() {
            warn!("IMU reported a self-reset, re-arming reports");
            self.diagnostics.device_resets = self.diagnostics.device_resets.wrapping_add(1);
            self.subscribe_all();
        }

        let start = clock.now_ms();
        let mut observed = StatusFlags::empty();
        let mut attempts = 0u32;
        let mut non_responsive = 0u32;

        while !observed.contains(StatusFlags::INERTIAL)
            && clock.now_ms().wrapping_sub(start) < self.config.read_budget_ms
            && attempts < self.config.max_attempts
        {
            attempts += 1;
            match self.sensor.next_event() {
                Some(event) => {
                    self.diagnostics.events = self.diagnostics.events.wrapping_add(1);
                    observed.insert(self.merge(event, snapshot));
                }
                None => non_responsive += 1,
            }
        }

        self.diagnostics.non_responsive_polls = self
            .diagnostics
            .non_responsive_polls
            .wrapping_add(non_responsive);

        let reset = if observed.is_empty() && non_responsive > 0 {
            if self.state.consecutive_non_responsive_count == 0 {
                warn!("IMU silent for a whole cycle ({} polls)", attempts);
            }
            self.state.consecutive_non_responsive_count =
                self.state.consecutive_non_responsive_count.saturating_add(1);
            self.try_reset(clock)
        } else {
            if self.state.consecutive_non_responsive_count > 0 && !observed.is_empty() {
                info!(
                    "IMU responsive again after {} silent cycles",
                    self.state.consecutive_non_responsive_count
                );
                self.state.consecutive_non_responsive_count = 0;
            }
            ResetOutcome::NotNeeded
        };

        PollReport {
            observed,
            attempts,
            non_responsive,
            reset,
        }
    }

    /// Clamp, write into the snapshot, report the kind's status bit.
    /// Later events of the same kind overwrite earlier ones.
    fn merge(&mut self, event: InertialEvent, snapshot: &mut Snapshot) -> StatusFlags {
        let kind = event.kind();
        let clamped = match event {
            InertialEvent::Acceleration(v) => {
                let c = clamp_vector(v, MAX_ACCEL_VALUE);
                snapshot.set_accel(c.value);
                c.clamped
            }
            InertialEvent::Gyro(v) => {
                let c = clamp_vector(v, MAX_GYRO_VALUE);
                snapshot.set_gyro(c.value);
                c.clamped
            }
            InertialEvent::MagneticField(v) => {
                let c = clamp_vector(v, MAX_MAG_VALUE);
                snapshot.set_mag(c.value);
                c.clamped
            }
            InertialEvent::Rotation(q) => {
                let c = clamp_quaternion(q, MAX_QUAT_VALUE);
                snapshot.set_quat(c.value);
                c.clamped
            }
        };

        if clamped {
            debug!("implausible {} sample clamped", kind.name());
            self.diagnostics.bad_sample_observed = true;
            let n = &mut self.diagnostics.clamped[kind.index()];
            *n = n.wrapping_add(1);
        }

        status_bit(kind)
    }

    fn try_reset(&mut self, clock: &impl Clock) -> ResetOutcome {
        let now = clock.now_ms();
        if now.wrapping_sub(self.state.last_reset_time) < self.config.reset_interval_ms {
            return ResetOutcome::CoolingDown;
        }

        warn!(
            "IMU unresponsive for {} cycles, reinitializing",
            self.state.consecutive_non_responsive_count
        );
        self.diagnostics.reset_attempts = self.diagnostics.reset_attempts.wrapping_add(1);

        if self.sensor.initialize() {
            self.subscribe_all();
            self.state.last_reset_time = now;
            info!("IMU reset succeeded");
            ResetOutcome::Succeeded
        } else {
            // Cooldown untouched: the next eligible cycle tries again.
            self.diagnostics.reset_failures = self.diagnostics.reset_failures.wrapping_add(1);
            error!("IMU reset failed");
            ResetOutcome::Failed
        }
    }

    fn subscribe_all(&mut self) {
        for kind in EventKind::ALL {
            if !self.sensor.subscribe(kind, report_interval_us(kind)) {
                warn!("IMU rejected {} report subscription", kind.name());
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::SENTINEL;
    use crate::state::{Quaternion, Vector3};
    use core::cell::Cell;
    use std::collections::VecDeque;
    use std::vec::Vec;

    /// Clock that moves forward by `step` ms every time it is read.
    pub struct StepClock {
        now: Cell<u32>,
        step: u32,
    }

    impl StepClock {
        pub fn new(start: u32, step: u32) -> Self {
            Self {
                now: Cell::new(start),
                step,
            }
        }

        pub fn advance(&self, ms: u32) {
            self.now.set(self.now.get().wrapping_add(ms));
        }
    }

    impl Clock for StepClock {
        fn now_ms(&self) -> u32 {
            let t = self.now.get();
            self.now.set(t.wrapping_add(self.step));
            t
        }
    }

    /// Sensor that replays a script of per-cycle event queues.
    #[derive(Default)]
    pub struct ScriptedImu {
        pub pending: VecDeque<InertialEvent>,
        pub init_ok: bool,
        pub init_calls: u32,
        pub subscriptions: Vec<(EventKind, u32)>,
        pub reset_flag: bool,
        pub polls: u32,
    }

    impl ScriptedImu {
        pub fn healthy() -> Self {
            Self {
                init_ok: true,
                ..Default::default()
            }
        }

        pub fn queue(&mut self, events: &[InertialEvent]) {
            self.pending.extend(events.iter().copied());
        }
    }

    impl InertialSensor for ScriptedImu {
        fn initialize(&mut self) -> bool {
            self.init_calls += 1;
            self.init_ok
        }

        fn subscribe(&mut self, kind: EventKind, interval_us: u32) -> bool {
            self.subscriptions.push((kind, interval_us));
            true
        }

        fn was_reset(&mut self) -> bool {
            core::mem::take(&mut self.reset_flag)
        }

        fn next_event(&mut self) -> Option<InertialEvent> {
            self.polls += 1;
            self.pending.pop_front()
        }
    }

    fn accel(x: f32) -> InertialEvent {
        InertialEvent::Acceleration(Vector3::new(x, 0.0, 0.0))
    }

    fn full_set() -> [InertialEvent; 4] {
        [
            accel(1.0),
            InertialEvent::Gyro(Vector3::new(0.1, 0.2, 0.3)),
            InertialEvent::Rotation(Quaternion::new(1.0, 0.0, 0.0, 0.0)),
            InertialEvent::MagneticField(Vector3::new(20.0, -5.0, 40.0)),
        ]
    }

    fn started(imu: ScriptedImu, clock: &StepClock) -> InertialPoller<ScriptedImu> {
        let mut poller = InertialPoller::new(imu);
        assert!(poller.begin(clock));
        poller
    }

    #[test]
    fn begin_arms_all_four_reports() {
        let clock = StepClock::new(0, 0);
        let poller = started(ScriptedImu::healthy(), &clock);
        let subs = &poller.sensor.subscriptions;
        assert_eq!(subs.len(), 4);
        assert!(subs.contains(&(EventKind::MagneticField, MAG_REPORT_INTERVAL_US)));
        assert!(subs.contains(&(EventKind::Rotation, ROTATION_REPORT_INTERVAL_US)));
    }

    #[test]
    fn stops_as_soon_as_all_kinds_are_seen() {
        let clock = StepClock::new(0, 1);
        let mut poller = started(ScriptedImu::healthy(), &clock);
        poller.sensor.queue(&full_set());
        poller.sensor.queue(&[accel(9.0)]);

        let mut snap = Snapshot::new(0);
        let report = poller.poll(&clock, &mut snap);

        assert_eq!(report.observed, StatusFlags::INERTIAL);
        assert_eq!(report.attempts, 4);
        assert_eq!(report.reset, ResetOutcome::NotNeeded);
        assert_eq!(snap.accel_x, 1.0);
        assert_eq!(snap.mag_z, 40.0);
        assert_eq!(poller.sensor.pending.len(), 1);
    }

    #[test]
    fn last_event_of_a_kind_wins() {
        let clock = StepClock::new(0, 0);
        let mut poller = started(ScriptedImu::healthy(), &clock);
        poller.sensor.queue(&[accel(1.0), accel(2.0), accel(3.0)]);

        let mut snap = Snapshot::new(0);
        let report = poller.poll(&clock, &mut snap);

        assert_eq!(report.observed, StatusFlags::ACCEL_OK);
        assert_eq!(snap.accel_x, 3.0);
        assert_eq!(snap.gyro_x, SENTINEL);
        assert_eq!(snap.quat_w, SENTINEL);
    }

    #[test]
    fn attempt_ceiling_bounds_a_silent_cycle() {
        let clock = StepClock::new(0, 0);
        let mut poller = started(ScriptedImu::healthy(), &clock);
        let polls_before = poller.sensor.polls;

        let mut snap = Snapshot::new(0);
        let report = poller.poll(&clock, &mut snap);

        assert!(report.observed.is_empty());
        assert_eq!(report.attempts, IMU_MAX_ATTEMPTS);
        assert_eq!(poller.sensor.polls - polls_before, IMU_MAX_ATTEMPTS);
        assert_eq!(report.non_responsive, IMU_MAX_ATTEMPTS);
    }

    #[test]
    fn time_budget_bounds_a_silent_cycle() {
        // 10 ms per clock read: the budget expires long before 40 attempts.
        let clock = StepClock::new(0, 10);
        let mut poller = started(ScriptedImu::healthy(), &clock);

        let mut snap = Snapshot::new(0);
        let report = poller.poll(&clock, &mut snap);

        assert!(report.attempts < IMU_MAX_ATTEMPTS);
        assert!(report.attempts <= IMU_READ_BUDGET_MS / 10);
    }

    #[test]
    fn clamped_sample_is_delivered_and_latched() {
        let clock = StepClock::new(0, 0);
        let mut poller = started(ScriptedImu::healthy(), &clock);
        poller.sensor.queue(&[accel(500.0)]);

        let mut snap = Snapshot::new(0);
        let report = poller.poll(&clock, &mut snap);

        assert!(report.observed.contains(StatusFlags::ACCEL_OK));
        assert_eq!((snap.accel_x, snap.accel_y, snap.accel_z), (300.0, 0.0, 0.0));
        assert!(poller.diagnostics().bad_sample_observed);
        assert_eq!(poller.diagnostics().clamped[EventKind::Acceleration.index()], 1);
    }

    #[test]
    fn partial_data_never_triggers_a_reset() {
        let clock = StepClock::new(0, 0);
        let mut poller = started(ScriptedImu::healthy(), &clock);

        for _ in 0..3 {
            clock.advance(IMU_RESET_INTERVAL_MS * 2);
            poller.sensor.queue(&[accel(0.5)]);
            let mut snap = Snapshot::new(0);
            let report = poller.poll(&clock, &mut snap);
            assert_eq!(report.observed, StatusFlags::ACCEL_OK);
            assert!(report.non_responsive > 0);
            assert_eq!(report.reset, ResetOutcome::NotNeeded);
        }

        assert_eq!(poller.sensor.init_calls, 1);
        assert_eq!(poller.diagnostics().reset_attempts, 0);
    }

    #[test]
    fn silent_sensor_is_reset_once_per_interval() {
        let clock = StepClock::new(0, 0);
        let mut poller = started(ScriptedImu::healthy(), &clock);

        // 100 ms cycles across 3.5 reset intervals.
        let cycles = (IMU_RESET_INTERVAL_MS * 7 / 2) / 100;
        let mut resets = Vec::new();
        for _ in 0..cycles {
            clock.advance(100);
            let mut snap = Snapshot::new(0);
            let report = poller.poll(&clock, &mut snap);
            if report.reset == ResetOutcome::Succeeded {
                resets.push(poller.state().last_reset_time);
            }
        }

        assert_eq!(resets.len(), 3);
        for pair in resets.windows(2) {
            assert!(pair[1] - pair[0] >= IMU_RESET_INTERVAL_MS);
        }
        assert_eq!(poller.sensor.init_calls, 1 + 3);
        assert_eq!(poller.sensor.subscriptions.len(), 4 * 4);
    }

    #[test]
    fn failed_reset_keeps_cooldown_and_retries() {
        let clock = StepClock::new(0, 0);
        let mut poller = started(ScriptedImu::healthy(), &clock);
        poller.sensor.init_ok = false;

        clock.advance(IMU_RESET_INTERVAL_MS);
        let mut snap = Snapshot::new(0);
        assert_eq!(poller.poll(&clock, &mut snap).reset, ResetOutcome::Failed);
        assert_eq!(poller.state().last_reset_time, 0);

        clock.advance(100);
        poller.sensor.init_ok = true;
        assert_eq!(poller.poll(&clock, &mut snap).reset, ResetOutcome::Succeeded);
        assert_eq!(poller.diagnostics().reset_failures, 1);
        assert_eq!(poller.diagnostics().reset_attempts, 2);
    }

    #[test]
    fn device_reset_rearms_without_cooldown() {
        let clock = StepClock::new(0, 0);
        let mut poller = started(ScriptedImu::healthy(), &clock);
        poller.sensor.reset_flag = true;
        poller.sensor.queue(&full_set());

        let mut snap = Snapshot::new(0);
        let report = poller.poll(&clock, &mut snap);

        assert_eq!(poller.sensor.subscriptions.len(), 8);
        assert_eq!(poller.diagnostics().device_resets, 1);
        assert_eq!(report.observed, StatusFlags::INERTIAL);
        assert_eq!(poller.sensor.init_calls, 1);
    }

    #[test]
    fn silent_count_tracks_consecutive_empty_cycles() {
        let clock = StepClock::new(0, 0);
        let mut poller = started(ScriptedImu::healthy(), &clock);
        let mut snap = Snapshot::new(0);

        poller.poll(&clock, &mut snap);
        poller.poll(&clock, &mut snap);
        assert_eq!(poller.state().consecutive_non_responsive_count, 2);

        poller.sensor.queue(&[accel(1.0)]);
        poller.poll(&clock, &mut snap);
        assert_eq!(poller.state().consecutive_non_responsive_count, 0);
    }
}

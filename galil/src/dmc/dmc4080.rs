//! Galil DMC-4080 Motion Controller Driver
//!
//! Typed access to the handful of DMC commands needed to exercise a stepper
//! axis on the bench:
//!
//! - **Stepper moves**: [`run_stepper_move`](Dmc4080::run_stepper_move) configures
//!   the axis as a stepper, runs a relative move and waits for completion
//! - **Motor off**: [`disable`](Dmc4080::disable)
//! - **Switch monitoring**: [`tell_switches`](Dmc4080::tell_switches),
//!   [`poll_switches`](Dmc4080::poll_switches)
//!
//! # Example
//!
//! ```no_run
//! use galil::dmc::{Axis, Dmc4080, StepperProfile};
//!
//! let mut dmc = Dmc4080::connect_ip("192.168.0.40")?;
//!
//! let status = dmc.tell_switches(Axis::A)?;
//! println!("home={} fwd={}", status.home_active(), status.forward_limit_active());
//!
//! dmc.run_stepper_move(Axis::A, &StepperProfile::default())?;
//! dmc.disable(Axis::A)?;
//! dmc.close();
//! # Ok::<(), galil::dmc::DmcError>(())
//! ```

use std::net::ToSocketAddrs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use super::axis::Axis;
use super::protocol::{default_port_addr, DmcDevice, DmcResult};
use super::stepper::{stop_command, MotorType, StepperProfile};
use super::switches::SwitchStatus;

/// Extra time allowed on top of the estimated move duration before `MC`
/// is considered to have timed out.
const MOTION_COMPLETE_MARGIN: Duration = Duration::from_secs(5);

/// Granularity of the sleep between switch polls.
const POLL_SLICE: Duration = Duration::from_millis(50);

/// One `TS` reading taken while polling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwitchReading {
    Status(SwitchStatus),
    /// The controller answered with something that is not a status byte.
    Invalid(String),
}

/// Summary of a completed stepper move.
#[derive(Debug, Clone, PartialEq)]
pub struct MoveReport {
    pub axis: Axis,
    pub counts: i64,
    pub speed_counts: i64,
    pub accel_counts: i64,
    pub elapsed: Duration,
}

/// High-level driver for the Galil DMC-4080.
pub struct Dmc4080 {
    device: DmcDevice,
}

impl Dmc4080 {
    /// Connect to a DMC-4080 at the given address.
    pub fn connect<A: ToSocketAddrs>(addr: A) -> DmcResult<Self> {
        Ok(Self::from_device(DmcDevice::connect(addr)?))
    }

    /// Connect to a DMC-4080 at the given IP using the default port (23).
    pub fn connect_ip(ip: &str) -> DmcResult<Self> {
        Self::connect(default_port_addr(ip))
    }

    /// Connect with an explicit read/write timeout.
    pub fn connect_with_timeout<A: ToSocketAddrs>(addr: A, timeout: Duration) -> DmcResult<Self> {
        Ok(Self::from_device(DmcDevice::connect_with_timeout(
            addr, timeout,
        )?))
    }

    pub fn from_device(device: DmcDevice) -> Self {
        Self { device }
    }

    /// Access the underlying device for raw commands.
    pub fn device(&mut self) -> &mut DmcDevice {
        &mut self.device
    }

    fn execute(&mut self, command: &str) -> DmcResult<()> {
        self.device.command(command).map(|_| ())
    }

    // ==================== Axis Primitives ====================

    /// Stop any motion on the axis (`ST`).
    pub fn stop(&mut self, axis: Axis) -> DmcResult<()> {
        self.execute(&stop_command(axis))
    }

    /// Configure the axis motor type (`MT`).
    pub fn set_motor_type(&mut self, axis: Axis, motor_type: MotorType) -> DmcResult<()> {
        self.execute(&format!("MT{axis}={};", motor_type.code()))
    }

    /// Configure stepper pulse smoothing (`KS`).
    pub fn set_smoothing(&mut self, axis: Axis, smoothing: f64) -> DmcResult<()> {
        self.execute(&format!("KS{axis}={smoothing};"))
    }

    /// Servo here (`SH`): energize the axis at its current position.
    pub fn servo_here(&mut self, axis: Axis) -> DmcResult<()> {
        self.execute(&format!("SH {axis};"))
    }

    /// Slew speed in counts/s (`SP`).
    pub fn set_speed(&mut self, axis: Axis, counts_per_sec: i64) -> DmcResult<()> {
        self.execute(&format!("SP{axis}={counts_per_sec};"))
    }

    /// Acceleration in counts/s² (`AC`).
    pub fn set_acceleration(&mut self, axis: Axis, counts_per_sec2: i64) -> DmcResult<()> {
        self.execute(&format!("AC{axis}={counts_per_sec2}"))
    }

    /// Deceleration in counts/s² (`DC`).
    pub fn set_deceleration(&mut self, axis: Axis, counts_per_sec2: i64) -> DmcResult<()> {
        self.execute(&format!("DC{axis}={counts_per_sec2}"))
    }

    /// Relative move distance in counts (`PR`). Takes effect on [`begin`](Self::begin).
    pub fn position_relative(&mut self, axis: Axis, counts: i64) -> DmcResult<()> {
        self.execute(&format!("PR{axis}={counts};"))
    }

    /// Begin motion (`BG`).
    pub fn begin(&mut self, axis: Axis) -> DmcResult<()> {
        self.execute(&format!("BG {axis};"))
    }

    /// Block until the axis finishes its move (`MC`).
    ///
    /// The controller withholds its prompt until motion completes, so the
    /// read timeout is raised to `timeout` for this one command and restored
    /// afterwards.
    pub fn motion_complete(&mut self, axis: Axis, timeout: Duration) -> DmcResult<()> {
        let previous = self.device.timeout();
        self.device.set_timeout(timeout)?;
        let result = self.execute(&format!("MC {axis};"));
        self.device.set_timeout(previous)?;
        result
    }

    /// Motor off (`MO`).
    pub fn motor_off(&mut self, axis: Axis) -> DmcResult<()> {
        self.execute(&format!("MO {axis};"))
    }

    /// Query the switch status byte (`TS`).
    pub fn tell_switches(&mut self, axis: Axis) -> DmcResult<SwitchStatus> {
        let response = self.device.command(&format!("TS {axis}"))?;
        SwitchStatus::parse(&response)
    }

    // ==================== Operations ====================

    /// Run a relative stepper move and wait for it to finish.
    ///
    /// Stops the axis, configures it as a stepper (`MT`, `KS`), energizes it
    /// (`SH`), loads the speed/accel/decel profile, begins the move and
    /// waits on `MC`. See [`StepperProfile::commands`] for the exact sequence.
    pub fn run_stepper_move(
        &mut self,
        axis: Axis,
        profile: &StepperProfile,
    ) -> DmcResult<MoveReport> {
        profile.validate()?;

        let counts = profile.counts();
        let speed_counts = profile.speed_counts();
        let accel_counts = profile.accel_counts();

        info!(
            "--- Move Axis {axis}: {}° ({counts} steps with speed {speed_counts} and accel {accel_counts}) ---",
            profile.degrees
        );

        let start = Instant::now();

        self.stop(axis)?;
        self.set_motor_type(axis, profile.motor_type())?;
        self.set_smoothing(axis, profile.smoothing)?;
        self.servo_here(axis)?;

        self.set_speed(axis, speed_counts)?;
        self.set_acceleration(axis, accel_counts)?;
        self.set_deceleration(axis, accel_counts)?;

        self.position_relative(axis, counts)?;
        self.begin(axis)?;

        let wait =
            (profile.estimated_duration() + MOTION_COMPLETE_MARGIN).max(self.device.timeout());
        debug!("Waiting up to {wait:?} for motion complete");
        self.motion_complete(axis, wait)?;

        let elapsed = start.elapsed();
        info!("Move complete on axis {axis} in {elapsed:.2?}");

        Ok(MoveReport {
            axis,
            counts,
            speed_counts,
            accel_counts,
            elapsed,
        })
    }

    /// Turn the axis motor off.
    pub fn disable(&mut self, axis: Axis) -> DmcResult<()> {
        info!("Disabling stepper motor on axis {axis}...");
        self.motor_off(axis)
    }

    /// Take one `TS` reading, keeping unparsable responses instead of
    /// failing on them.
    pub fn read_switches(&mut self, axis: Axis) -> DmcResult<SwitchReading> {
        let response = self.device.command(&format!("TS {axis}"))?;
        Ok(match SwitchStatus::parse(&response) {
            Ok(status) => SwitchReading::Status(status),
            Err(e) => {
                debug!("Unparsable TS response {response:?}: {e}");
                SwitchReading::Invalid(response)
            }
        })
    }

    /// Poll `TS` every `interval` until `stop` is set.
    ///
    /// Every reading, valid or not, goes to `on_reading`. Transport errors
    /// end polling and are returned.
    pub fn poll_switches<F>(
        &mut self,
        axis: Axis,
        interval: Duration,
        stop: &AtomicBool,
        mut on_reading: F,
    ) -> DmcResult<()>
    where
        F: FnMut(SwitchReading),
    {
        info!("Monitoring switches on axis {axis} every {interval:?}");

        while !stop.load(Ordering::Relaxed) {
            let reading = self.read_switches(axis)?;
            on_reading(reading);
            sleep_unless_stopped(interval, stop);
        }

        info!("Switch monitoring stopped");
        Ok(())
    }

    /// Close the connection.
    pub fn close(self) {
        self.device.close();
    }
}

fn sleep_unless_stopped(duration: Duration, stop: &AtomicBool) {
    let deadline = Instant::now() + duration;
    loop {
        if stop.load(Ordering::Relaxed) {
            return;
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return;
        }
        std::thread::sleep(remaining.min(POLL_SLICE));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sleep_returns_immediately_when_stopped() {
        let stop = AtomicBool::new(true);
        let start = Instant::now();
        sleep_unless_stopped(Duration::from_secs(10), &stop);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_sleep_waits_full_interval() {
        let stop = AtomicBool::new(false);
        let start = Instant::now();
        sleep_unless_stopped(Duration::from_millis(120), &stop);
        assert!(start.elapsed() >= Duration::from_millis(120));
    }
}

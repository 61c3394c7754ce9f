//! Stepper motion profiles.
//!
//! Converts a move expressed in degrees into DMC step counts and the
//! command sequence that configures and runs it. The DMC drives steppers
//! open-loop with step/direction pulses, so all distances, speeds and
//! accelerations on the wire are in (micro)steps.

use std::time::Duration;

use super::axis::Axis;
use super::protocol::{DmcError, DmcResult};

/// Full steps per revolution of a 1.8° stepper.
pub const FULL_STEPS_PER_REV: f64 = 200.0;

pub const DEFAULT_DEGREES: f64 = 720.0;
pub const DEFAULT_MICROSTEPS: u32 = 1;
pub const DEFAULT_SPEED_DEG: f64 = 180.0;
pub const DEFAULT_ACCEL_DEG: f64 = 360.0;
pub const DEFAULT_SMOOTHING: f64 = 2.0;

/// Valid range of the `KS` step smoothing parameter.
pub const SMOOTHING_RANGE: std::ops::RangeInclusive<f64> = 0.5..=128.0;

/// Stepper pulse polarity, configured with `MT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotorType {
    /// Step pulses active high (`MT -2`)
    ActiveHighStepper,
    /// Step pulses active low (`MT 2`)
    ActiveLowStepper,
}

impl MotorType {
    /// Value written with `MT`.
    pub fn code(self) -> i32 {
        match self {
            MotorType::ActiveHighStepper => -2,
            MotorType::ActiveLowStepper => 2,
        }
    }
}

/// A relative stepper move and the motion parameters used to run it.
#[derive(Debug, Clone, PartialEq)]
pub struct StepperProfile {
    /// Distance to move in degrees (signed)
    pub degrees: f64,
    /// Microstepping divisor of the drive (1, 2, 4, 16, ...)
    pub microsteps: u32,
    /// Slew speed in degrees/s
    pub speed_deg: f64,
    /// Acceleration and deceleration in degrees/s²
    pub accel_deg: f64,
    /// Step pulse polarity
    pub active_high: bool,
    /// `KS` smoothing, 0.5 to 128
    pub smoothing: f64,
}

impl Default for StepperProfile {
    fn default() -> Self {
        Self {
            degrees: DEFAULT_DEGREES,
            microsteps: DEFAULT_MICROSTEPS,
            speed_deg: DEFAULT_SPEED_DEG,
            accel_deg: DEFAULT_ACCEL_DEG,
            active_high: true,
            smoothing: DEFAULT_SMOOTHING,
        }
    }
}

impl StepperProfile {
    /// Check every field is in range and the rates survive conversion to
    /// whole counts.
    pub fn validate(&self) -> DmcResult<()> {
        if !self.degrees.is_finite() {
            return Err(invalid(format!("degrees must be finite, got {}", self.degrees)));
        }
        if self.microsteps == 0 {
            return Err(invalid("microsteps must be at least 1".to_string()));
        }
        if !(self.speed_deg.is_finite() && self.speed_deg > 0.0) {
            return Err(invalid(format!("speed must be positive, got {}", self.speed_deg)));
        }
        if !(self.accel_deg.is_finite() && self.accel_deg > 0.0) {
            return Err(invalid(format!(
                "acceleration must be positive, got {}",
                self.accel_deg
            )));
        }
        if !SMOOTHING_RANGE.contains(&self.smoothing) {
            return Err(invalid(format!(
                "smoothing must be within {}..={}, got {}",
                SMOOTHING_RANGE.start(),
                SMOOTHING_RANGE.end(),
                self.smoothing
            )));
        }
        if i32::try_from(self.counts()).is_err() {
            return Err(invalid(format!(
                "move of {} deg is {} steps, outside the controller's 32-bit range",
                self.degrees,
                self.counts()
            )));
        }
        for (name, counts) in [
            ("speed", self.speed_counts()),
            ("acceleration", self.accel_counts()),
        ] {
            if counts <= 0 {
                return Err(invalid(format!("{name} is below one step per second")));
            }
            if i32::try_from(counts).is_err() {
                return Err(invalid(format!(
                    "{name} of {counts} steps is outside the controller's 32-bit range"
                )));
            }
        }
        Ok(())
    }

    pub fn steps_per_degree(&self) -> f64 {
        FULL_STEPS_PER_REV * f64::from(self.microsteps) / 360.0
    }

    /// Relative distance in steps, truncated toward zero.
    pub fn counts(&self) -> i64 {
        (self.degrees * self.steps_per_degree()) as i64
    }

    /// Slew speed in steps/s, truncated.
    pub fn speed_counts(&self) -> i64 {
        (self.speed_deg * self.steps_per_degree()) as i64
    }

    /// Acceleration in steps/s², truncated. Also used for deceleration.
    pub fn accel_counts(&self) -> i64 {
        (self.accel_deg * self.steps_per_degree()) as i64
    }

    pub fn motor_type(&self) -> MotorType {
        if self.active_high {
            MotorType::ActiveHighStepper
        } else {
            MotorType::ActiveLowStepper
        }
    }

    /// The full command sequence for this move, in the order
    /// [`Dmc4080::run_stepper_move`](super::Dmc4080::run_stepper_move) sends it:
    /// stop, configure, energize, set profile, move, wait.
    pub fn commands(&self, axis: Axis) -> Vec<String> {
        vec![
            stop_command(axis),
            format!("MT{axis}={};", self.motor_type().code()),
            format!("KS{axis}={};", self.smoothing),
            format!("SH {axis};"),
            format!("SP{axis}={};", self.speed_counts()),
            format!("AC{axis}={}", self.accel_counts()),
            format!("DC{axis}={}", self.accel_counts()),
            format!("PR{axis}={};", self.counts()),
            format!("BG {axis};"),
            format!("MC {axis};"),
        ]
    }

    /// Time the controller needs to complete the move, assuming a
    /// trapezoidal profile (triangular if the slew speed is never reached).
    pub fn estimated_duration(&self) -> Duration {
        let distance = self.counts().unsigned_abs() as f64;
        let speed = self.speed_counts() as f64;
        let accel = self.accel_counts() as f64;

        if distance == 0.0 || speed <= 0.0 || accel <= 0.0 {
            return Duration::ZERO;
        }

        // Distance covered ramping up plus ramping down
        let ramp_distance = speed * speed / accel;
        let secs = if ramp_distance >= distance {
            2.0 * (distance / accel).sqrt()
        } else {
            2.0 * speed / accel + (distance - ramp_distance) / speed
        };
        Duration::from_secs_f64(secs)
    }
}

pub(crate) fn stop_command(axis: Axis) -> String {
    format!("ST {axis};")
}

fn invalid(message: String) -> DmcError {
    DmcError::InvalidProfile(message)
}

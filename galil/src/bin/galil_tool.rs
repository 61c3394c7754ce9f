//! Command-line utility for a Galil DMC-4080 motion controller.
//!
//! Runs one of three operations against a single axis:
//! - `switch`: poll home/limit switch states until Ctrl+C
//! - `stepper`: run a preset relative stepper move and wait for completion
//! - `disable`: turn the axis motor off

use std::net::IpAddr;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, ValueEnum};
use galil::dmc::{
    stepper, switches, Axis, Dmc4080, StepperProfile, SwitchReading, DEFAULT_PORT,
};
use tracing::{error, info, warn};

/// Default read/write timeout in milliseconds
const DEFAULT_TIMEOUT_MS: u64 = 1000;

/// Default switch polling interval in milliseconds
const DEFAULT_INTERVAL_MS: u64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Poll home/limit switches until interrupted
    Switch,
    /// Run a preset stepper move
    Stepper,
    /// Turn the motor off
    Disable,
}

/// Galil DMC Controller Utility
#[derive(Parser, Debug)]
#[command(name = "galil_tool")]
#[command(about = "Galil DMC Controller Utility")]
#[command(version)]
struct Args {
    /// IP address of the Galil controller
    #[arg(short, long)]
    address: IpAddr,

    /// Operation mode
    #[arg(value_enum)]
    mode: Mode,

    /// Axis identifier
    #[arg(value_enum)]
    axis: Axis,

    /// Controller TCP port
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Read/write timeout in milliseconds
    #[arg(
        long,
        default_value_t = DEFAULT_TIMEOUT_MS,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    timeout_ms: u64,

    /// Switch polling interval in milliseconds
    #[arg(
        long,
        default_value_t = DEFAULT_INTERVAL_MS,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    interval_ms: u64,

    #[command(flatten)]
    profile: ProfileArgs,
}

/// Stepper move parameters (stepper mode only)
#[derive(clap::Args, Debug)]
struct ProfileArgs {
    /// Distance to move in degrees
    #[arg(long, default_value_t = stepper::DEFAULT_DEGREES, allow_hyphen_values = true)]
    degrees: f64,

    /// Microstepping divisor of the drive
    #[arg(long, default_value_t = stepper::DEFAULT_MICROSTEPS)]
    microsteps: u32,

    /// Speed in degrees/s
    #[arg(long, default_value_t = stepper::DEFAULT_SPEED_DEG)]
    speed: f64,

    /// Acceleration and deceleration in degrees/s²
    #[arg(long, default_value_t = stepper::DEFAULT_ACCEL_DEG)]
    accel: f64,

    /// Step pulses are active low (MT 2) instead of active high (MT -2)
    #[arg(long)]
    active_low: bool,

    /// KS step smoothing (0.5 to 128)
    #[arg(long, default_value_t = stepper::DEFAULT_SMOOTHING)]
    smoothing: f64,
}

impl From<ProfileArgs> for StepperProfile {
    fn from(args: ProfileArgs) -> Self {
        Self {
            degrees: args.degrees,
            microsteps: args.microsteps,
            speed_deg: args.speed,
            accel_deg: args.accel,
            active_high: !args.active_low,
            smoothing: args.smoothing,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("An error occurred: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let timeout = Duration::from_millis(args.timeout_ms);

    let dmc = Dmc4080::connect_with_timeout((args.address, args.port), timeout)
        .with_context(|| format!("Failed to connect to {}:{}", args.address, args.port))?;

    match args.mode {
        Mode::Switch => {
            cmd_switch(dmc, args.axis, Duration::from_millis(args.interval_ms)).await
        }
        Mode::Stepper => cmd_stepper(dmc, args.axis, args.profile.into()),
        Mode::Disable => cmd_disable(dmc, args.axis),
    }
}

// ==================== Switch Command ====================

async fn cmd_switch(mut dmc: Dmc4080, axis: Axis, interval: Duration) -> Result<()> {
    println!();
    println!("--- Monitoring Axis {axis} Switches (Press Ctrl+C to Stop) ---");
    println!("{}", switches::table_header());
    println!("{}", "-".repeat(switches::TABLE_RULE_WIDTH));

    let stop = Arc::new(AtomicBool::new(false));

    let signal_stop = Arc::clone(&stop);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => signal_stop.store(true, Ordering::Relaxed),
            Err(e) => warn!("Failed to listen for Ctrl+C: {e}"),
        }
    });

    // Socket I/O blocks, so polling runs off the async runtime
    let worker_stop = Arc::clone(&stop);
    let (dmc, result) = tokio::task::spawn_blocking(move || {
        let result = dmc.poll_switches(axis, interval, &worker_stop, |reading| match reading {
            SwitchReading::Status(status) => {
                let now = Local::now().format("%H:%M:%S").to_string();
                println!("{}", status.table_row(&now));
            }
            SwitchReading::Invalid(response) => println!("Invalid Response: {response}"),
        });
        (dmc, result)
    })
    .await?;

    if stop.load(Ordering::Relaxed) {
        println!();
        println!("--- Monitoring Stopped ---");
    }

    dmc.close();
    result?;
    Ok(())
}

// ==================== Stepper Command ====================

fn cmd_stepper(mut dmc: Dmc4080, axis: Axis, profile: StepperProfile) -> Result<()> {
    let report = dmc
        .run_stepper_move(axis, &profile)
        .with_context(|| format!("Stepper move on axis {axis} failed"))?;

    info!(
        "Cycle complete on axis {}: {} steps in {:.2?}",
        report.axis, report.counts, report.elapsed
    );

    dmc.close();
    Ok(())
}

// ==================== Disable Command ====================

fn cmd_disable(mut dmc: Dmc4080, axis: Axis) -> Result<()> {
    dmc.disable(axis)
        .with_context(|| format!("Failed to disable axis {axis}"))?;

    dmc.close();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_positional_mode_and_axis() {
        let args =
            Args::try_parse_from(["galil_tool", "-a", "192.168.0.40", "switch", "B"]).unwrap();
        assert_eq!(args.address.to_string(), "192.168.0.40");
        assert_eq!(args.mode, Mode::Switch);
        assert_eq!(args.axis, Axis::B);
        assert_eq!(args.port, DEFAULT_PORT);
        assert_eq!(args.timeout_ms, DEFAULT_TIMEOUT_MS);
    }

    #[test]
    fn test_address_is_required() {
        assert!(Args::try_parse_from(["galil_tool", "stepper", "A"]).is_err());
    }

    #[test]
    fn test_rejects_bad_address_mode_and_axis() {
        let rejected = [
            ["galil_tool", "-a", "not-an-ip", "stepper", "A"],
            ["galil_tool", "-a", "10.0.0.1", "home", "A"],
            ["galil_tool", "-a", "10.0.0.1", "disable", "J"],
        ];
        for argv in rejected {
            assert!(Args::try_parse_from(argv).is_err(), "{argv:?} should be rejected");
        }
    }

    #[test]
    fn test_default_profile_matches_library_default() {
        let args =
            Args::try_parse_from(["galil_tool", "-a", "10.0.0.1", "stepper", "A"]).unwrap();
        assert_eq!(StepperProfile::from(args.profile), StepperProfile::default());
    }

    #[test]
    fn test_profile_overrides() {
        let args = Args::try_parse_from([
            "galil_tool",
            "--address",
            "10.0.0.1",
            "stepper",
            "H",
            "--degrees",
            "-90",
            "--microsteps",
            "16",
            "--active-low",
        ])
        .unwrap();

        let profile = StepperProfile::from(args.profile);
        assert_eq!(profile.degrees, -90.0);
        assert_eq!(profile.microsteps, 16);
        assert!(!profile.active_high);
    }

    #[test]
    fn test_zero_timeout_rejected() {
        assert!(Args::try_parse_from([
            "galil_tool",
            "-a",
            "10.0.0.1",
            "switch",
            "A",
            "--timeout-ms",
            "0"
        ])
        .is_err());
    }
}

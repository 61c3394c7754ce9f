//! Driver and bench utility for Galil DMC motion controllers.
//!
//! The [`dmc`] module talks to a DMC-4080 over its Ethernet (TCP) interface:
//! - [`dmc::DmcDevice`] - raw ASCII command framing
//! - [`dmc::Dmc4080`] - typed axis operations (stepper moves, motor off, switch polling)
//!
//! The `galil_tool` binary wraps these for use from the command line.

pub mod dmc;

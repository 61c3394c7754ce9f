mod axis;
mod dmc4080;
mod protocol;
pub mod stepper;
pub mod switches;

pub use axis::Axis;
pub use dmc4080::{Dmc4080, MoveReport, SwitchReading};
pub use protocol::{DmcDevice, DmcError, DmcResult, DEFAULT_PORT, DEFAULT_TIMEOUT};
pub use stepper::{MotorType, StepperProfile};
pub use switches::{SwitchFlags, SwitchStatus};

//! `TS` (tell switches) status decoding.
//!
//! `TS <axis>` returns one status byte per axis. The switch inputs are
//! pulled up, so a set bit means the input is high (inactive) and a clear
//! bit means the switch is engaged.

use bitflags::bitflags;

use super::protocol::{DmcDevice, DmcError, DmcResult};

/// Width of the dashed rule under [`table_header`].
pub const TABLE_RULE_WIDTH: usize = 65;

bitflags! {
    /// Raw `TS` status bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SwitchFlags: u8 {
        /// Home input high (inactive)
        const HOME = 1 << 1;
        /// Reverse limit input high (inactive)
        const REVERSE_LIMIT = 1 << 2;
        /// Forward limit input high (inactive)
        const FORWARD_LIMIT = 1 << 3;
        /// Motor off
        const MOTOR_OFF = 1 << 5;
        /// Position error exceeds the error limit
        const ERROR_EXCEEDED = 1 << 6;
        /// Axis in motion
        const IN_MOTION = 1 << 7;
    }
}

/// Decoded switch status of one axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchStatus {
    flags: SwitchFlags,
}

impl SwitchStatus {
    pub fn from_raw(raw: u8) -> Self {
        Self {
            flags: SwitchFlags::from_bits_retain(raw),
        }
    }

    /// Parse a `TS` response such as `46` or `46.0000`.
    ///
    /// # Errors
    ///
    /// [`DmcError::ParseError`] if the response is not a number or does not
    /// fit in a status byte.
    pub fn parse(response: &str) -> DmcResult<Self> {
        let value = DmcDevice::parse_integer(response)?;
        u8::try_from(value)
            .map(Self::from_raw)
            .map_err(|_| DmcError::ParseError(format!("Switch status out of range: {value}")))
    }

    pub fn raw(&self) -> u8 {
        self.flags.bits()
    }

    pub fn flags(&self) -> SwitchFlags {
        self.flags
    }

    /// Status byte as 8 binary digits, MSB first.
    pub fn binary(&self) -> String {
        format!("{:08b}", self.raw())
    }

    pub fn home_active(&self) -> bool {
        !self.flags.contains(SwitchFlags::HOME)
    }

    pub fn forward_limit_active(&self) -> bool {
        !self.flags.contains(SwitchFlags::FORWARD_LIMIT)
    }

    pub fn reverse_limit_active(&self) -> bool {
        !self.flags.contains(SwitchFlags::REVERSE_LIMIT)
    }

    pub fn motor_off(&self) -> bool {
        self.flags.contains(SwitchFlags::MOTOR_OFF)
    }

    pub fn error_exceeded(&self) -> bool {
        self.flags.contains(SwitchFlags::ERROR_EXCEEDED)
    }

    pub fn in_motion(&self) -> bool {
        self.flags.contains(SwitchFlags::IN_MOTION)
    }

    /// One row of the monitoring table, aligned with [`table_header`].
    pub fn table_row(&self, time: &str) -> String {
        format!(
            "{:<10} | {:<10}({:<2})  | {:<6} {:<10} {:<10}",
            time,
            self.binary(),
            self.raw(),
            on_off(self.home_active()),
            on_off(self.forward_limit_active()),
            on_off(self.reverse_limit_active()),
        )
    }
}

/// Column header of the monitoring table.
pub fn table_header() -> String {
    format!(
        "{:<10} | {:<10}({:<2}) | {:<6} {:<10} {:<10}",
        "Time", "Binary", "Raw", "Home", "Fwd Limit", "Rev Limit"
    )
}

fn on_off(active: bool) -> &'static str {
    if active {
        "ON"
    } else {
        "OFF"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cells(row: &str) -> Vec<String> {
        row.split('|').map(|c| c.trim().to_string()).collect()
    }

    #[test]
    fn test_all_switches_inactive() {
        // 0b0000_1110: home, reverse and forward inputs all high
        let status = SwitchStatus::from_raw(14);
        assert!(!status.home_active());
        assert!(!status.forward_limit_active());
        assert!(!status.reverse_limit_active());
        assert_eq!(status.binary(), "00001110");
    }

    #[test]
    fn test_each_switch_bit() {
        let home_hit = SwitchStatus::from_raw(0b1100);
        assert!(home_hit.home_active());
        assert!(!home_hit.reverse_limit_active());
        assert!(!home_hit.forward_limit_active());

        let rev_hit = SwitchStatus::from_raw(0b1010);
        assert!(rev_hit.reverse_limit_active());
        assert!(!rev_hit.home_active());

        let fwd_hit = SwitchStatus::from_raw(0b0110);
        assert!(fwd_hit.forward_limit_active());
        assert!(!fwd_hit.reverse_limit_active());
    }

    #[test]
    fn test_status_flags() {
        let status = SwitchStatus::from_raw(0b1010_1110);
        assert!(status.in_motion());
        assert!(status.motor_off());
        assert!(!status.error_exceeded());
        assert_eq!(status.raw(), 0b1010_1110);
    }

    #[test]
    fn test_unnamed_bits_are_retained() {
        let status = SwitchStatus::from_raw(0b0001_0001);
        assert_eq!(status.raw(), 0b0001_0001);
        assert_eq!(status.binary(), "00010001");
    }

    #[test]
    fn test_parse_fixed_point_response() {
        let status = SwitchStatus::parse("46.0000").unwrap();
        assert_eq!(status.raw(), 46);
        assert!(status.motor_off());
    }

    #[test]
    fn test_parse_rejects_invalid() {
        assert!(SwitchStatus::parse("").is_err());
        assert!(SwitchStatus::parse("garbage").is_err());
        assert!(SwitchStatus::parse("256").is_err());
        assert!(SwitchStatus::parse("-1").is_err());
    }

    #[test]
    fn test_table_row_columns() {
        let row = SwitchStatus::from_raw(0b0110).table_row("12:34:56");
        assert_eq!(
            cells(&row),
            vec!["12:34:56", "00000110  (6 )", "OFF    ON         OFF"]
        );
    }

    #[test]
    fn test_table_row_aligns_with_header() {
        let header = table_header();
        let row = SwitchStatus::from_raw(14).table_row("12:34:56");

        assert_eq!(header.find('|'), row.find('|'));
        assert!(header.starts_with("Time       | Binary    (Raw) | Home"));
        assert!(row.starts_with("12:34:56   | 00001110  (14)  | OFF"));
    }
}

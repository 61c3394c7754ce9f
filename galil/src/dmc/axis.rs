use clap::ValueEnum;

/// DMC-4080 axis identifiers.
///
/// The DMC-4080 addresses up to 8 axes by letter, A through H.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, strum::EnumIter, strum::Display,
)]
pub enum Axis {
    #[value(name = "A")]
    A,
    #[value(name = "B")]
    B,
    #[value(name = "C")]
    C,
    #[value(name = "D")]
    D,
    #[value(name = "E")]
    E,
    #[value(name = "F")]
    F,
    #[value(name = "G")]
    G,
    #[value(name = "H")]
    H,
}

impl Axis {
    /// Axis letter as used in DMC commands.
    pub fn as_char(self) -> char {
        match self {
            Axis::A => 'A',
            Axis::B => 'B',
            Axis::C => 'C',
            Axis::D => 'D',
            Axis::E => 'E',
            Axis::F => 'F',
            Axis::G => 'G',
            Axis::H => 'H',
        }
    }

    /// Zero-based axis index (A = 0).
    pub fn index(self) -> usize {
        self as usize
    }
}

impl std::str::FromStr for Axis {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A" => Ok(Axis::A),
            "B" => Ok(Axis::B),
            "C" => Ok(Axis::C),
            "D" => Ok(Axis::D),
            "E" => Ok(Axis::E),
            "F" => Ok(Axis::F),
            "G" => Ok(Axis::G),
            "H" => Ok(Axis::H),
            _ => Err(format!("Invalid axis: {s}, expected A-H")),
        }
    }
}

use std::{fmt::Display, ops::Deref, str::FromStr};

use anyhow::anyhow;

/// Non-negative percentage. Timer progress may go past 100% (an overdue timer), volume may not.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Percentage(f64);

impl Display for Percentage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}%", self.0)
    }
}

impl Percentage {
    pub fn new_opt(value: f64) -> Option<Percentage> {
        if value < 0. || value.is_nan() {
            None
        } else {
            Some(Percentage(value))
        }
    }

    /// Converts into a 0-1 fraction, capped at 1. Used for audio volume.
    pub fn as_unit(&self) -> f32 {
        (self.0 / 100.).min(1.) as f32
    }
}

impl FromStr for Percentage {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().trim_end_matches('%');
        let v = s.parse::<f64>()?;
        Percentage::new_opt(v).ok_or_else(|| anyhow!("Can't parse {s} into percentage"))
    }
}

impl Deref for Percentage {
    type Target = f64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Share of `whole` covered by `value`. A zero `whole` counts as fully covered.
pub fn seconds_percentage(value: u64, whole: u64) -> Percentage {
    if whole == 0 {
        return Percentage(100.);
    }
    Percentage(value as f64 / whole as f64 * 100.)
}

#[cfg(test)]
mod tests {
    use super::{seconds_percentage, Percentage};

    #[test]
    fn parses_with_and_without_sign() {
        assert_eq!(*"80%".parse::<Percentage>().unwrap(), 80.);
        assert_eq!(*"35".parse::<Percentage>().unwrap(), 35.);
        assert!("-3%".parse::<Percentage>().is_err());
        assert!("loud".parse::<Percentage>().is_err());
    }

    #[test]
    fn unit_is_capped() {
        assert_eq!("50%".parse::<Percentage>().unwrap().as_unit(), 0.5);
        assert_eq!("250%".parse::<Percentage>().unwrap().as_unit(), 1.0);
    }

    #[test]
    fn progress_of_zero_total_is_full() {
        assert_eq!(*seconds_percentage(48, 60), 80.);
        assert_eq!(*seconds_percentage(0, 0), 100.);
    }
}

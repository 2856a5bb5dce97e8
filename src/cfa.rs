use std::fmt;
use std::str::FromStr;

use crate::error::{DevelopError, Result};
use crate::orientation::{shift_phases, Orientation};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CfaColor {
    Red = 0,
    Green = 1,
    Blue = 2,
}

impl CfaColor {
    pub fn channel(self) -> usize {
        self as usize
    }

    fn letter(self) -> char {
        match self {
            CfaColor::Red => 'R',
            CfaColor::Green => 'G',
            CfaColor::Blue => 'B',
        }
    }
}

/// 2×2 Bayer layouts, named by their row-major letters from the top-left pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CfaPattern {
    Rggb,
    Bggr,
    Grbg,
    Gbrg,
}

impl CfaPattern {
    pub fn from_label(label: &str) -> Result<Self> {
        match label.trim() {
            "RGGB" => Ok(CfaPattern::Rggb),
            "BGGR" => Ok(CfaPattern::Bggr),
            "GRBG" => Ok(CfaPattern::Grbg),
            "GBRG" => Ok(CfaPattern::Gbrg),
            other => Err(DevelopError::UnknownCfaPattern(other.to_string())),
        }
    }

    /// TIFF/EP `CFAPattern` bytes, `0 = red, 1 = green, 2 = blue`.
    pub fn from_cfa_bytes(bytes: &[u8]) -> Result<Self> {
        let label: String = bytes
            .iter()
            .map(|b| match b {
                0 => 'R',
                1 => 'G',
                2 => 'B',
                _ => '?',
            })
            .collect();
        Self::from_label(&label)
    }

    pub fn label(&self) -> &'static str {
        match self {
            CfaPattern::Rggb => "RGGB",
            CfaPattern::Bggr => "BGGR",
            CfaPattern::Grbg => "GRBG",
            CfaPattern::Gbrg => "GBRG",
        }
    }

    /// Position `(ox, oy)` of the red sample inside the 2×2 tile.
    pub fn red_offset(&self) -> (usize, usize) {
        match self {
            CfaPattern::Rggb => (0, 0),
            CfaPattern::Grbg => (1, 0),
            CfaPattern::Gbrg => (0, 1),
            CfaPattern::Bggr => (1, 1),
        }
    }

    #[inline]
    pub fn color_at(&self, x: usize, y: usize) -> CfaColor {
        let (ox, oy) = self.red_offset();
        match ((x % 2 == ox), (y % 2 == oy)) {
            (true, true) => CfaColor::Red,
            (false, false) => CfaColor::Blue,
            _ => CfaColor::Green,
        }
    }

    pub fn phases(&self) -> [CfaColor; 4] {
        [self.color_at(0, 0), self.color_at(1, 0), self.color_at(0, 1), self.color_at(1, 1)]
    }

    fn from_phases(phases: [CfaColor; 4]) -> Result<Self> {
        let label: String = phases.iter().map(|c| c.letter()).collect();
        Self::from_label(&label)
    }

    /// Pattern seen by a crop starting at `(dx, dy)`.
    pub fn shift(self, dx: usize, dy: usize) -> Self {
        Self::from_phases(shift_phases(self.phases(), dx, dy)).unwrap_or(self)
    }

    pub fn oriented(self, orientation: Orientation, width: usize, height: usize) -> Self {
        let label = orientation.rotate_pattern_label(self.label(), width, height);
        Self::from_label(&label).unwrap_or(self)
    }
}

impl FromStr for CfaPattern {
    type Err = DevelopError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_label(s)
    }
}

impl fmt::Display for CfaPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels() {
        for label in ["RGGB", "BGGR", "GRBG", "GBRG"] {
            let pattern: CfaPattern = label.parse().unwrap();
            assert_eq!(pattern.label(), label);
            let letters: String = pattern.phases().iter().map(|c| c.letter()).collect();
            assert_eq!(letters, label);
        }
        assert!(matches!(
            CfaPattern::from_label("RGBG"),
            Err(DevelopError::UnknownCfaPattern(_))
        ));
    }

    #[test]
    fn test_cfa_bytes() {
        assert_eq!(CfaPattern::from_cfa_bytes(&[1, 0, 2, 1]).unwrap(), CfaPattern::Grbg);
        assert!(CfaPattern::from_cfa_bytes(&[0, 1, 1, 3]).is_err());
    }

    #[test]
    fn test_color_at() {
        let p = CfaPattern::Gbrg;
        assert_eq!(p.color_at(0, 0), CfaColor::Green);
        assert_eq!(p.color_at(1, 0), CfaColor::Blue);
        assert_eq!(p.color_at(0, 1), CfaColor::Red);
        assert_eq!(p.color_at(3, 3), CfaColor::Green);
    }

    #[test]
    fn test_shift_and_orient() {
        assert_eq!(CfaPattern::Rggb.shift(1, 0), CfaPattern::Grbg);
        assert_eq!(CfaPattern::Rggb.shift(0, 1), CfaPattern::Gbrg);
        assert_eq!(CfaPattern::Rggb.oriented(Orientation::Rotate180, 6, 4), CfaPattern::Bggr);
        assert_eq!(CfaPattern::Rggb.oriented(Orientation::Unsupported(6), 6, 4), CfaPattern::Rggb);
    }
}

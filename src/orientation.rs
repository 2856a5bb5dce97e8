//! EXIF/TIFF orientation as a single value object.
//!
//! Every structure that is addressed in sensor coordinates (the sample
//! buffer, the CFA label, per-phase black levels, gain map bounds) is moved
//! into output coordinates through the same [`Orientation`], so they cannot
//! drift apart.

use ndarray::{s, ArrayView2};

/// Half-open rectangle `[top, bottom) × [left, right)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub top: usize,
    pub left: usize,
    pub bottom: usize,
    pub right: usize,
}

impl Rect {
    pub fn width(&self) -> usize {
        self.right.saturating_sub(self.left)
    }

    pub fn height(&self) -> usize {
        self.bottom.saturating_sub(self.top)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Orientation {
    /// Code 1.
    #[default]
    Normal,
    /// Code 3.
    Rotate180,
    /// Any other code. Data passes through untransformed.
    Unsupported(u32),
}

impl Orientation {
    pub fn from_code(code: u32) -> Self {
        match code {
            1 => Orientation::Normal,
            3 => Orientation::Rotate180,
            other => Orientation::Unsupported(other),
        }
    }

    pub fn code(&self) -> u32 {
        match self {
            Orientation::Normal => 1,
            Orientation::Rotate180 => 3,
            Orientation::Unsupported(code) => *code,
        }
    }

    fn rotates(&self) -> bool {
        matches!(self, Orientation::Rotate180)
    }

    pub fn rotate_point(&self, x: usize, y: usize, width: usize, height: usize) -> (usize, usize) {
        if self.rotates() {
            (width - 1 - x, height - 1 - y)
        } else {
            (x, y)
        }
    }

    pub fn rotate_rect(&self, rect: Rect, width: usize, height: usize) -> Rect {
        if !self.rotates() {
            return rect;
        }
        Rect {
            top: height - rect.bottom,
            left: width - rect.right,
            bottom: height - rect.top,
            right: width - rect.left,
        }
    }

    /// Re-phases a 2×2 repeat pattern stored row-major as `[p00, p01, p10, p11]`
    /// for an image of `width × height`.
    pub fn rotate_phases<T: Copy>(&self, phases: [T; 4], width: usize, height: usize) -> [T; 4] {
        if !self.rotates() {
            return phases;
        }
        let mut rotated = phases;
        for py in 0..2 {
            for px in 0..2 {
                let old_py = (height + 1 + py) % 2;
                let old_px = (width + 1 + px) % 2;
                rotated[py * 2 + px] = phases[old_py * 2 + old_px];
            }
        }
        rotated
    }

    /// Same as [`Orientation::rotate_phases`] for a four letter CFA label such as `"RGGB"`.
    pub fn rotate_pattern_label(&self, label: &str, width: usize, height: usize) -> String {
        let chars: Vec<char> = label.chars().collect();
        if chars.len() != 4 {
            return label.to_string();
        }
        let phases = [chars[0], chars[1], chars[2], chars[3]];
        self.rotate_phases(phases, width, height).iter().collect()
    }

    /// Applies the orientation to a row-major `(height, width)` view without copying.
    pub fn apply_view<'a, T>(&self, view: ArrayView2<'a, T>) -> ArrayView2<'a, T> {
        if self.rotates() {
            view.slice_move(s![..;-1, ..;-1])
        } else {
            view
        }
    }
}

/// Moves the origin of a 2×2 repeat pattern by `(dx, dy)` pixels.
pub fn shift_phases<T: Copy>(phases: [T; 4], dx: usize, dy: usize) -> [T; 4] {
    let mut shifted = phases;
    for py in 0..2 {
        for px in 0..2 {
            shifted[py * 2 + px] = phases[((py + dy) % 2) * 2 + (px + dx) % 2];
        }
    }
    shifted
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_from_code() {
        assert_eq!(Orientation::from_code(1), Orientation::Normal);
        assert_eq!(Orientation::from_code(3), Orientation::Rotate180);
        assert_eq!(Orientation::from_code(6), Orientation::Unsupported(6));
        assert_eq!(Orientation::from_code(6).code(), 6);
        assert_eq!(Orientation::default(), Orientation::Normal);
        assert_eq!(Orientation::default(), Orientation::from_code(1));
    }

    #[test]
    fn test_rotate_point() {
        let o = Orientation::Rotate180;
        assert_eq!(o.rotate_point(0, 0, 4, 3), (3, 2));
        assert_eq!(o.rotate_point(1, 2, 4, 3), (2, 0));
        assert_eq!(Orientation::Unsupported(6).rotate_point(1, 2, 4, 3), (1, 2));
    }

    #[test]
    fn test_rotate_rect() {
        let rect = Rect { top: 1, left: 2, bottom: 3, right: 6 };
        let rotated = Orientation::Rotate180.rotate_rect(rect, 10, 8);
        assert_eq!(rotated, Rect { top: 5, left: 4, bottom: 7, right: 8 });
        assert_eq!(rotated.width(), rect.width());
        assert_eq!(Orientation::Rotate180.rotate_rect(rotated, 10, 8), rect);
    }

    #[test]
    fn test_rotate_pattern_label_even() {
        let o = Orientation::Rotate180;
        assert_eq!(o.rotate_pattern_label("RGGB", 8, 8), "BGGR");
        assert_eq!(o.rotate_pattern_label("GRBG", 8, 8), "GBRG");
        assert_eq!(Orientation::Normal.rotate_pattern_label("RGGB", 8, 8), "RGGB");
    }

    #[test]
    fn test_rotate_pattern_label_odd() {
        // odd height: the last row becomes the first and keeps its phase
        assert_eq!(Orientation::Rotate180.rotate_pattern_label("RGGB", 4, 3), "GRBG");
        assert_eq!(Orientation::Rotate180.rotate_pattern_label("RGGB", 3, 3), "RGGB");
    }

    #[test]
    fn test_shift_phases() {
        assert_eq!(shift_phases(['R', 'G', 'G', 'B'], 1, 0), ['G', 'R', 'B', 'G']);
        assert_eq!(shift_phases(['R', 'G', 'G', 'B'], 1, 1), ['B', 'G', 'G', 'R']);
        assert_eq!(shift_phases(['R', 'G', 'G', 'B'], 2, 4), ['R', 'G', 'G', 'B']);
    }

    #[test]
    fn test_apply_view() {
        let data = array![[1, 2, 3], [4, 5, 6]];
        let rotated = Orientation::Rotate180.apply_view(data.view());
        assert_eq!(rotated, array![[6, 5, 4], [3, 2, 1]]);
        let untouched = Orientation::Unsupported(8).apply_view(data.view());
        assert_eq!(untouched, data);
    }
}

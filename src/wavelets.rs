//! À-trous (stationary) wavelet decomposition with the B3 spline kernel and
//! soft-threshold denoising of the detail layers.

use convolve_image::kernel::SeparableKernel;
use ndarray::{s, Array2, ArrayView2, Zip};

use crate::extract::Mosaic;

pub const DEFAULT_SCALES: usize = 4;

#[derive(Copy, Clone)]
pub(crate) struct B3SplineKernel(SeparableKernel<5>);

impl B3SplineKernel {
    pub(crate) fn new() -> Self {
        Self(SeparableKernel::new([
            1. / 16.,
            1. / 4.,
            3. / 8.,
            1. / 4.,
            1. / 16.,
        ]))
    }
}

impl From<B3SplineKernel> for SeparableKernel<5> {
    fn from(value: B3SplineKernel) -> Self {
        value.0
    }
}

/// Symmetric (half-sample) border reflection.
#[inline]
fn mirror(pos: isize, len: usize) -> usize {
    let period = 2 * len as isize;
    let p = pos.rem_euclid(period);
    if p >= len as isize {
        (period - 1 - p) as usize
    } else {
        p as usize
    }
}

pub trait Convolution {
    /// Separable convolution with the kernel taps `stride` samples apart.
    fn convolve<const KERNEL_SIZE: usize>(&self, kernel: SeparableKernel<KERNEL_SIZE>, stride: usize) -> Array2<f32>;
}

fn convolve_axis(src: ArrayView2<f32>, values: &[f32], stride: usize, along_rows: bool) -> Array2<f32> {
    let side = values.len() as isize / 2;
    let (rows, cols) = src.dim();
    let mut out = Array2::<f32>::zeros(src.raw_dim());
    Zip::indexed(&mut out).par_for_each(|(i, j), o| {
        *o = values.iter().enumerate().fold(0.0, |acc, (k, value)| {
            let distance = (k as isize - side) * stride as isize;
            let sample = if along_rows {
                src[[mirror(i as isize + distance, rows), j]]
            } else {
                src[[i, mirror(j as isize + distance, cols)]]
            };
            acc + sample * value
        });
    });
    out
}

impl Convolution for ArrayView2<'_, f32> {
    fn convolve<const KERNEL_SIZE: usize>(&self, kernel: SeparableKernel<KERNEL_SIZE>, stride: usize) -> Array2<f32> {
        let values = kernel.values();
        let first = convolve_axis(self.view(), &values[..], stride, true);
        convolve_axis(first.view(), &values[..], stride, false)
    }
}

impl Convolution for Array2<f32> {
    fn convolve<const KERNEL_SIZE: usize>(&self, kernel: SeparableKernel<KERNEL_SIZE>, stride: usize) -> Array2<f32> {
        self.view().convolve(kernel, stride)
    }
}

/// Splits `plane` into `scales` detail layers (finest first) and a residual.
pub fn atrous_decompose(plane: ArrayView2<f32>, scales: usize) -> (Vec<Array2<f32>>, Array2<f32>) {
    let kernel: SeparableKernel<5> = B3SplineKernel::new().into();
    let mut current = plane.to_owned();
    let mut details = Vec::with_capacity(scales);
    for scale in 0..scales {
        let smooth = current.convolve(kernel, 1 << scale);
        details.push(&current - &smooth);
        current = smooth;
    }
    (details, current)
}

pub fn soft_threshold(coefficient: f32, threshold: f32) -> f32 {
    if coefficient > threshold {
        coefficient - threshold
    } else if coefficient < -threshold {
        coefficient + threshold
    } else {
        0.0
    }
}

/// Robust noise estimate: median of the absolute coefficients over 0.6745.
pub fn estimate_sigma(layer: &Array2<f32>) -> f32 {
    let mut abs_coeffs: Vec<f32> = layer.iter().map(|c| c.abs()).collect();
    if abs_coeffs.is_empty() {
        return 0.0;
    }
    abs_coeffs.sort_by(|a, b| a.total_cmp(b));
    let n = abs_coeffs.len();
    let median = if n % 2 == 0 {
        (abs_coeffs[n / 2 - 1] + abs_coeffs[n / 2]) / 2.0
    } else {
        abs_coeffs[n / 2]
    };
    median / 0.6745
}

pub fn denoise_plane(plane: ArrayView2<f32>, noise_threshold: f32, scales: usize) -> Array2<f32> {
    let (details, residual) = atrous_decompose(plane, scales);
    details.into_iter().fold(residual, |mut acc, mut detail| {
        let threshold = noise_threshold * estimate_sigma(&detail);
        detail.par_mapv_inplace(|c| soft_threshold(c, threshold));
        acc += &detail;
        acc
    })
}

/// Denoises each of the four Bayer phases as its own half-resolution plane.
pub fn denoise_mosaic(mosaic: &mut Mosaic, noise_threshold: f32) {
    for (px, py) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
        let denoised = {
            let phase = mosaic.data.slice(s![px..;2, py..;2]);
            if phase.is_empty() {
                continue;
            }
            denoise_plane(phase, noise_threshold, DEFAULT_SCALES)
        };
        mosaic.data.slice_mut(s![px..;2, py..;2]).assign(&denoised);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfa::CfaPattern;

    #[test]
    fn test_mirror() {
        assert_eq!(mirror(-1, 5), 0);
        assert_eq!(mirror(-2, 5), 1);
        assert_eq!(mirror(5, 5), 4);
        assert_eq!(mirror(6, 5), 3);
        assert_eq!(mirror(17, 2), 1);
        assert_eq!(mirror(3, 1), 0);
    }

    #[test]
    fn test_soft_threshold() {
        assert_eq!(soft_threshold(3.0, 1.0), 2.0);
        assert_eq!(soft_threshold(-3.0, 1.0), -2.0);
        assert_eq!(soft_threshold(0.5, 1.0), 0.0);
    }

    #[test]
    fn test_estimate_sigma() {
        let layer = Array2::from_shape_vec((2, 2), vec![-1.0, 2.0, 3.0, -4.0]).unwrap();
        assert!((estimate_sigma(&layer) - 2.5 / 0.6745).abs() < 1e-5);
    }

    #[test]
    fn test_decomposition_recomposes_exactly() {
        let plane = Array2::from_shape_fn((9, 7), |(i, j)| ((i * 13 + j * 7) % 11) as f32);
        let (details, residual) = atrous_decompose(plane.view(), 3);
        assert_eq!(details.len(), 3);
        let rebuilt = details.iter().fold(residual, |acc, d| acc + d);
        for (a, b) in rebuilt.iter().zip(plane.iter()) {
            assert!((a - b).abs() < 1e-4);
        }
    }

    #[test]
    fn test_flat_mosaic_is_unchanged() {
        let mut mosaic = Mosaic::new(Array2::from_elem((10, 8), 0.4), CfaPattern::Rggb);
        denoise_mosaic(&mut mosaic, 1.0);
        assert!(mosaic.data.iter().all(|v| (v - 0.4).abs() < 1e-5));
    }

    #[test]
    fn test_phases_stay_separate() {
        // a constant per phase must survive even though neighbours differ
        let data = Array2::from_shape_fn((12, 12), |(x, y)| ((y % 2) * 2 + x % 2) as f32);
        let mut mosaic = Mosaic::new(data.clone(), CfaPattern::Rggb);
        denoise_mosaic(&mut mosaic, 3.0);
        for (a, b) in mosaic.data.iter().zip(data.iter()) {
            assert!((a - b).abs() < 1e-5);
        }
    }
}

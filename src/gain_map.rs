//! DNG `GainMap` opcodes (OpcodeList id 9).

use ndarray::{Array3, Zip};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{DevelopError, Result};
use crate::extract::Mosaic;
use crate::orientation::{Orientation, Rect};

pub const GAIN_MAP_OPCODE: u32 = 9;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GainMapMode {
    #[default]
    Multiply,
    Add,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GainMap {
    pub top: usize,
    pub left: usize,
    /// Exclusive.
    pub bottom: usize,
    /// Exclusive.
    pub right: usize,
    pub plane: u32,
    pub planes: u32,
    pub row_pitch: usize,
    pub col_pitch: usize,
    pub spacing_v: f64,
    pub spacing_h: f64,
    pub origin_v: f64,
    pub origin_h: f64,
    /// Shape `(points_v, points_h, map_planes)`.
    pub samples: Array3<f32>,
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take<const N: usize>(&mut self) -> Result<[u8; N]> {
        let end = self.pos + N;
        let bytes = self.data.get(self.pos..end).ok_or_else(|| {
            DevelopError::MalformedOpcodeList(format!(
                "needed {} bytes at offset {}, only {} available",
                N,
                self.pos,
                self.data.len()
            ))
        })?;
        self.pos = end;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    fn u32(&mut self) -> Result<u32> {
        self.take::<4>().map(u32::from_be_bytes)
    }

    fn f32(&mut self) -> Result<f32> {
        self.take::<4>().map(f32::from_be_bytes)
    }

    fn f64(&mut self) -> Result<f64> {
        self.take::<8>().map(f64::from_be_bytes)
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn skip(&mut self, len: usize) -> Result<()> {
        if len > self.remaining() {
            return Err(DevelopError::MalformedOpcodeList(format!(
                "opcode body of {} bytes runs past the end of the list",
                len
            )));
        }
        self.pos += len;
        Ok(())
    }
}

/// Parses a big-endian opcode list and returns its gain maps in order.
pub fn parse_opcode_list(bytes: &[u8]) -> Result<Vec<GainMap>> {
    let mut reader = Reader { data: bytes, pos: 0 };
    let count = reader.u32()?;
    let mut maps = vec![];

    for _ in 0..count {
        let id = reader.u32()?;
        let _version = reader.u32()?;
        let _flags = reader.u32()?;
        let len = reader.u32()? as usize;
        let body_start = reader.pos;

        if id != GAIN_MAP_OPCODE {
            warn!("opcode {} is not supported, skipping", id);
            reader.skip(len)?;
            continue;
        }

        let map = parse_gain_map(&mut reader)?;
        if reader.pos - body_start > len {
            return Err(DevelopError::MalformedOpcodeList(format!(
                "gain map body is {} bytes but declares {}",
                reader.pos - body_start,
                len
            )));
        }
        reader.pos = body_start + len;
        maps.push(map);
    }

    debug!("parsed {} gain maps", maps.len());
    Ok(maps)
}

fn parse_gain_map(reader: &mut Reader) -> Result<GainMap> {
    let top = reader.u32()? as usize;
    let left = reader.u32()? as usize;
    let bottom = reader.u32()? as usize;
    let right = reader.u32()? as usize;
    let plane = reader.u32()?;
    let planes = reader.u32()?;
    let row_pitch = reader.u32()? as usize;
    let col_pitch = reader.u32()? as usize;
    let points_v = reader.u32()? as usize;
    let points_h = reader.u32()? as usize;
    let spacing_v = reader.f64()?;
    let spacing_h = reader.f64()?;
    let origin_v = reader.f64()?;
    let origin_h = reader.f64()?;
    let map_planes = reader.u32()? as usize;

    if points_v == 0 || points_h == 0 || map_planes == 0 || row_pitch == 0 || col_pitch == 0 {
        return Err(DevelopError::MalformedOpcodeList(format!(
            "degenerate gain map: {}x{} points, {} planes, pitch {}x{}",
            points_v, points_h, map_planes, row_pitch, col_pitch
        )));
    }

    let count = points_v
        .checked_mul(points_h)
        .and_then(|n| n.checked_mul(map_planes))
        .filter(|n| n.checked_mul(4).map_or(false, |bytes| bytes <= reader.remaining()))
        .ok_or_else(|| {
            DevelopError::MalformedOpcodeList(format!(
                "{}x{}x{} gain map samples do not fit in the {} remaining bytes",
                points_v,
                points_h,
                map_planes,
                reader.remaining()
            ))
        })?;
    let mut samples = Vec::with_capacity(count);
    for _ in 0..count {
        samples.push(reader.f32()?);
    }
    let samples = Array3::from_shape_vec((points_v, points_h, map_planes), samples)
        .map_err(|e| DevelopError::MalformedOpcodeList(e.to_string()))?;

    Ok(GainMap {
        top,
        left,
        bottom,
        right,
        plane,
        planes,
        row_pitch,
        col_pitch,
        spacing_v,
        spacing_h,
        origin_v,
        origin_h,
        samples,
    })
}

impl GainMap {
    pub fn points_v(&self) -> usize {
        self.samples.dim().0
    }

    pub fn points_h(&self) -> usize {
        self.samples.dim().1
    }

    /// Maps the geometry onto a mosaic of `width × height` that was rotated
    /// by `orientation`.
    pub fn oriented(&self, orientation: Orientation, width: usize, height: usize) -> GainMap {
        if orientation != Orientation::Rotate180 {
            return self.clone();
        }
        let bottom = self.bottom.min(height);
        let right = self.right.min(width);
        if bottom <= self.top || right <= self.left {
            return self.clone();
        }

        // mirror around the last sampled row/column so the pitch grid stays on the same photosites
        let last_row = self.top + (bottom - 1 - self.top) / self.row_pitch * self.row_pitch;
        let last_col = self.left + (right - 1 - self.left) / self.col_pitch * self.col_pitch;
        let bounds = orientation.rotate_rect(
            Rect {
                top: self.top,
                left: self.left,
                bottom: last_row + 1,
                right: last_col + 1,
            },
            width,
            height,
        );

        let mut samples = self.samples.clone();
        samples.invert_axis(ndarray::Axis(0));
        samples.invert_axis(ndarray::Axis(1));

        GainMap {
            top: bounds.top,
            left: bounds.left,
            bottom: height - self.top,
            right: width - self.left,
            origin_v: 1.0 - (self.origin_v + (self.points_v() - 1) as f64 * self.spacing_v),
            origin_h: 1.0 - (self.origin_h + (self.points_h() - 1) as f64 * self.spacing_h),
            samples: samples.as_standard_layout().to_owned(),
            ..self.clone()
        }
    }

    /// Bilinear sample of plane `plane` at normalised image coordinates.
    pub fn sample(&self, fx: f64, fy: f64, plane: usize) -> f32 {
        let (points_v, points_h, map_planes) = self.samples.dim();
        let plane = plane.min(map_planes - 1);
        let grid = |f: f64, origin: f64, spacing: f64, points: usize| {
            if spacing > 0.0 {
                ((f - origin) / spacing).clamp(0.0, (points - 1) as f64)
            } else {
                0.0
            }
        };
        let u = grid(fx, self.origin_h, self.spacing_h, points_h);
        let v = grid(fy, self.origin_v, self.spacing_v, points_v);

        let u0 = u.floor() as usize;
        let v0 = v.floor() as usize;
        let u1 = (u0 + 1).min(points_h - 1);
        let v1 = (v0 + 1).min(points_v - 1);
        let du = (u - u0 as f64) as f32;
        let dv = (v - v0 as f64) as f32;

        let s = &self.samples;
        let top = s[[v0, u0, plane]] * (1.0 - du) + s[[v0, u1, plane]] * du;
        let bottom = s[[v1, u0, plane]] * (1.0 - du) + s[[v1, u1, plane]] * du;
        top * (1.0 - dv) + bottom * dv
    }

    pub fn apply(&self, mosaic: &mut Mosaic, percent: f32, mode: GainMapMode) {
        let (width, height) = mosaic.data.dim();
        let bottom = self.bottom.min(height);
        let right = self.right.min(width);
        let (top, left) = (self.top, self.left);
        let (row_pitch, col_pitch) = (self.row_pitch, self.col_pitch);

        Zip::indexed(&mut mosaic.data).par_for_each(|(x, y), p| {
            if y < top || y >= bottom || x < left || x >= right {
                return;
            }
            if (y - top) % row_pitch != 0 || (x - left) % col_pitch != 0 {
                return;
            }
            let s = self.sample(x as f64 / width as f64, y as f64 / height as f64, 0);
            match mode {
                GainMapMode::Multiply => *p *= (s - 1.0) * percent + 1.0,
                GainMapMode::Add => *p += s * percent,
            }
        });
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::cfa::CfaPattern;
    use ndarray::Array2;

    pub(crate) struct MapSpec {
        pub bounds: [u32; 4],
        pub pitch: u32,
        pub points: (u32, u32),
        pub spacing: (f64, f64),
        pub origin: (f64, f64),
        pub samples: Vec<f32>,
    }

    pub(crate) fn encode_gain_map(map_spec: &MapSpec) -> Vec<u8> {
        let mut body = vec![];
        for v in map_spec.bounds {
            body.extend(v.to_be_bytes());
        }
        for v in [0u32, 1, map_spec.pitch, map_spec.pitch, map_spec.points.0, map_spec.points.1] {
            body.extend(v.to_be_bytes());
        }
        for v in [map_spec.spacing.0, map_spec.spacing.1, map_spec.origin.0, map_spec.origin.1] {
            body.extend(v.to_be_bytes());
        }
        body.extend(1u32.to_be_bytes());
        for s in &map_spec.samples {
            body.extend(s.to_be_bytes());
        }

        let mut out = vec![];
        for v in [GAIN_MAP_OPCODE, 0x01030000, 0, body.len() as u32] {
            out.extend(v.to_be_bytes());
        }
        out.extend(body);
        out
    }

    pub(crate) fn opcode_list(records: &[Vec<u8>]) -> Vec<u8> {
        let mut out = (records.len() as u32).to_be_bytes().to_vec();
        for record in records {
            out.extend(record);
        }
        out
    }

    fn smooth_map(width: u32, height: u32) -> MapSpec {
        MapSpec {
            bounds: [0, 0, height, width],
            pitch: 1,
            points: (3, 3),
            spacing: (0.5, 0.5),
            origin: (0.0, 0.0),
            samples: vec![1.0, 1.05, 1.1, 1.02, 1.07, 1.12, 1.04, 1.09, 1.14],
        }
    }

    fn other_opcode() -> Vec<u8> {
        let mut out = vec![];
        for v in [1u32, 0, 0, 8] {
            out.extend(v.to_be_bytes());
        }
        out.extend([0u8; 8]);
        out
    }

    #[test]
    fn test_parse_skips_other_opcodes() {
        let bytes = opcode_list(&[other_opcode(), encode_gain_map(&smooth_map(8, 8))]);
        let maps = parse_opcode_list(&bytes).unwrap();
        assert_eq!(maps.len(), 1);
        let map = &maps[0];
        assert_eq!((map.bottom, map.right), (8, 8));
        assert_eq!(map.samples.dim(), (3, 3, 1));
        assert_eq!(map.samples[[1, 2, 0]], 1.12);
        assert_eq!(map.spacing_h, 0.5);
    }

    #[test]
    fn test_truncated_list() {
        let mut bytes = opcode_list(&[encode_gain_map(&smooth_map(8, 8))]);
        bytes.truncate(bytes.len() - 3);
        assert!(matches!(
            parse_opcode_list(&bytes),
            Err(DevelopError::MalformedOpcodeList(_))
        ));
        assert!(parse_opcode_list(&[0, 0]).is_err());
    }

    #[test]
    fn test_oversized_point_grid() {
        for points in [(0x10000, 0x10000), (u32::MAX, u32::MAX)] {
            let map_spec = MapSpec {
                points,
                ..smooth_map(8, 8)
            };
            let bytes = opcode_list(&[encode_gain_map(&map_spec)]);
            assert!(matches!(
                parse_opcode_list(&bytes),
                Err(DevelopError::MalformedOpcodeList(_))
            ));
        }
    }

    #[test]
    fn test_zero_percent_is_identity() {
        let bytes = opcode_list(&[encode_gain_map(&smooth_map(8, 8))]);
        let map = &parse_opcode_list(&bytes).unwrap()[0];
        let data = Array2::from_shape_fn((8, 8), |(x, y)| (x + y) as f32 / 16.0);

        for mode in [GainMapMode::Multiply, GainMapMode::Add] {
            let mut mosaic = Mosaic::new(data.clone(), CfaPattern::Rggb);
            map.apply(&mut mosaic, 0.0, mode);
            assert_eq!(mosaic.data, data);
        }
    }

    #[test]
    fn test_full_percent_multiplies() {
        let bytes = opcode_list(&[encode_gain_map(&smooth_map(8, 8))]);
        let map = &parse_opcode_list(&bytes).unwrap()[0];
        let mut mosaic = Mosaic::new(Array2::from_elem((8, 8), 0.5), CfaPattern::Rggb);
        map.apply(&mut mosaic, 1.0, GainMapMode::Multiply);
        assert_eq!(mosaic.data[[0, 0]], 0.5);
        // x = 4 of 8 is u = 1, the middle column of the top row
        assert!((mosaic.data[[4, 0]] - 0.525).abs() < 1e-6);
    }

    #[test]
    fn test_pitch_limits_touched_pixels() {
        let mut map_spec = smooth_map(8, 8);
        map_spec.bounds = [1, 0, 8, 8];
        map_spec.pitch = 2;
        map_spec.samples = vec![2.0; 9];
        let map = &parse_opcode_list(&opcode_list(&[encode_gain_map(&map_spec)])).unwrap()[0];
        let mut mosaic = Mosaic::new(Array2::from_elem((8, 8), 1.0), CfaPattern::Rggb);
        map.apply(&mut mosaic, 1.0, GainMapMode::Multiply);
        assert_eq!(mosaic.data[[0, 0]], 1.0);
        assert_eq!(mosaic.data[[0, 1]], 2.0);
        assert_eq!(mosaic.data[[1, 1]], 1.0);
        assert_eq!(mosaic.data[[2, 3]], 2.0);
    }

    #[test]
    fn test_rotated_map_targets_same_photosites() {
        let (w, h) = (64usize, 48usize);
        let map = &parse_opcode_list(&opcode_list(&[encode_gain_map(&smooth_map(w as u32, h as u32))])).unwrap()[0];
        let rotated_map = map.oriented(Orientation::Rotate180, w, h);

        let mut straight = Mosaic::new(Array2::from_elem((w, h), 1.0), CfaPattern::Rggb);
        map.apply(&mut straight, 1.0, GainMapMode::Multiply);
        let mut rotated = Mosaic::new(Array2::from_elem((w, h), 1.0), CfaPattern::Bggr);
        rotated_map.apply(&mut rotated, 1.0, GainMapMode::Multiply);

        for x in 0..w {
            for y in 0..h {
                let a = straight.data[[x, y]];
                let b = rotated.data[[w - 1 - x, h - 1 - y]];
                assert!((a - b).abs() < 1e-2, "({}, {}): {} vs {}", x, y, a, b);
            }
        }
    }

    #[test]
    fn test_rotated_bounds_follow_last_sample() {
        let mut map_spec = smooth_map(8, 8);
        map_spec.bounds = [1, 1, 8, 8];
        map_spec.pitch = 2;
        let map = &parse_opcode_list(&opcode_list(&[encode_gain_map(&map_spec)])).unwrap()[0];
        let rotated = map.oriented(Orientation::Rotate180, 8, 8);
        // last sampled row is 7, so the rotated grid starts on row 0
        assert_eq!((rotated.top, rotated.left), (0, 0));
        assert_eq!((rotated.bottom, rotated.right), (7, 7));
        assert_eq!(rotated.samples[[0, 0, 0]], 1.14);
    }
}

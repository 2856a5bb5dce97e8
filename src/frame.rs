use crate::cfa::CfaPattern;
use crate::error::{DevelopError, Result};
use crate::orientation::{Orientation, Rect};
use crate::tags::Tags;

/// One single-channel CFA capture as handed over by the container reader.
#[derive(Debug, Clone)]
pub struct RawFrame<'a> {
    pub width: usize,
    pub height: usize,
    pub bits_per_sample: u32,
    pub cfa: CfaPattern,
    pub orientation: Orientation,
    pub active_area: Option<Rect>,
    /// Row-major, `width * height` samples.
    pub data: &'a [u16],
}

impl<'a> RawFrame<'a> {
    pub fn from_tags(tags: &Tags, data: &'a [u16]) -> Result<Self> {
        let width = tags.required_u32("ImageWidth")? as usize;
        let height = tags.required_u32("ImageLength")? as usize;
        let bits_per_sample = tags.u32("BitsPerSample")?.unwrap_or(16);

        let samples_per_pixel = tags.u32("SamplesPerPixel")?.unwrap_or(1);
        if samples_per_pixel != 1 {
            return Err(DevelopError::UnsupportedSamplesPerPixel(samples_per_pixel));
        }

        if data.len() != width * height {
            return Err(DevelopError::BufferSize {
                width,
                height,
                actual: data.len(),
            });
        }

        let orientation = Orientation::from_code(tags.u32("Orientation")?.unwrap_or(1));

        Ok(Self {
            width,
            height,
            bits_per_sample,
            cfa: cfa_pattern(tags)?,
            orientation,
            active_area: active_area(tags)?,
            data,
        })
    }

    /// Active area, or the full frame when none is tagged.
    pub fn crop_rect(&self) -> Rect {
        self.active_area.unwrap_or(Rect {
            top: 0,
            left: 0,
            bottom: self.height,
            right: self.width,
        })
    }
}

fn cfa_pattern(tags: &Tags) -> Result<CfaPattern> {
    if let Some(label) = tags.text("CFAPattern") {
        return CfaPattern::from_label(label);
    }
    let codes = tags
        .f64s("CFAPattern")?
        .ok_or(DevelopError::MissingField("CFAPattern"))?;
    let bytes: Vec<u8> = codes.iter().map(|c| c.clamp(0.0, 255.0) as u8).collect();
    CfaPattern::from_cfa_bytes(&bytes)
}

fn active_area(tags: &Tags) -> Result<Option<Rect>> {
    let Some(values) = tags.f64s("ActiveArea")? else {
        return Ok(None);
    };
    if values.len() != 4 || values.iter().any(|v| *v < 0.0 || v.fract() != 0.0) {
        return Err(DevelopError::InvalidField {
            field: "ActiveArea",
            reason: format!("expected four unsigned integers, got {:?}", values),
        });
    }
    Ok(Some(Rect {
        top: values[0] as usize,
        left: values[1] as usize,
        bottom: values[2] as usize,
        right: values[3] as usize,
    }))
}

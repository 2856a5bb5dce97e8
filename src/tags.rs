//! Field name → typed value dictionary handed over by the container reader.
//!
//! The names follow the DNG/TIFF tag names (`ImageWidth`, `ColorMatrix1`,
//! `OpcodeList2`, ...). Readers are lenient about numeric representation:
//! a rational stored as float and an integer stored as a one-element list
//! are both accepted wherever a number is expected.

use std::collections::HashMap;

use nalgebra::{Matrix3, Vector3};

use crate::error::{DevelopError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum TagValue {
    Int(i64),
    Float(f64),
    Ints(Vec<i64>),
    Floats(Vec<f64>),
    Text(String),
    Bytes(Vec<u8>),
}

impl TagValue {
    fn numbers(&self) -> Option<Vec<f64>> {
        match self {
            TagValue::Int(v) => Some(vec![*v as f64]),
            TagValue::Float(v) => Some(vec![*v]),
            TagValue::Ints(v) => Some(v.iter().map(|x| *x as f64).collect()),
            TagValue::Floats(v) => Some(v.clone()),
            TagValue::Bytes(v) => Some(v.iter().map(|x| *x as f64).collect()),
            TagValue::Text(_) => None,
        }
    }
}

impl From<i64> for TagValue {
    fn from(value: i64) -> Self {
        TagValue::Int(value)
    }
}

impl From<i32> for TagValue {
    fn from(value: i32) -> Self {
        TagValue::Int(value as i64)
    }
}

impl From<u32> for TagValue {
    fn from(value: u32) -> Self {
        TagValue::Int(value as i64)
    }
}

impl From<u16> for TagValue {
    fn from(value: u16) -> Self {
        TagValue::Int(value as i64)
    }
}

impl From<usize> for TagValue {
    fn from(value: usize) -> Self {
        TagValue::Int(value as i64)
    }
}

impl From<f64> for TagValue {
    fn from(value: f64) -> Self {
        TagValue::Float(value)
    }
}

impl From<f32> for TagValue {
    fn from(value: f32) -> Self {
        TagValue::Float(value as f64)
    }
}

impl From<Vec<i64>> for TagValue {
    fn from(value: Vec<i64>) -> Self {
        TagValue::Ints(value)
    }
}

impl From<Vec<u32>> for TagValue {
    fn from(value: Vec<u32>) -> Self {
        TagValue::Ints(value.into_iter().map(i64::from).collect())
    }
}

impl From<Vec<u16>> for TagValue {
    fn from(value: Vec<u16>) -> Self {
        TagValue::Ints(value.into_iter().map(i64::from).collect())
    }
}

impl From<Vec<f64>> for TagValue {
    fn from(value: Vec<f64>) -> Self {
        TagValue::Floats(value)
    }
}

impl From<Vec<f32>> for TagValue {
    fn from(value: Vec<f32>) -> Self {
        TagValue::Floats(value.into_iter().map(f64::from).collect())
    }
}

impl From<Vec<u8>> for TagValue {
    fn from(value: Vec<u8>) -> Self {
        TagValue::Bytes(value)
    }
}

impl From<&str> for TagValue {
    fn from(value: &str) -> Self {
        TagValue::Text(value.to_string())
    }
}

impl From<String> for TagValue {
    fn from(value: String) -> Self {
        TagValue::Text(value)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Tags {
    fields: HashMap<String, TagValue>,
}

impl Tags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: impl Into<TagValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: &str, value: impl Into<TagValue>) {
        self.fields.insert(name.to_string(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&TagValue> {
        self.fields.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        match self.fields.get(name) {
            Some(TagValue::Text(text)) => Some(text.as_str()),
            _ => None,
        }
    }

    pub fn bytes(&self, name: &'static str) -> Result<Option<&[u8]>> {
        match self.fields.get(name) {
            None => Ok(None),
            Some(TagValue::Bytes(bytes)) => Ok(Some(bytes.as_slice())),
            Some(other) => Err(invalid(name, format!("expected bytes, got {:?}", other))),
        }
    }

    pub fn f64s(&self, name: &'static str) -> Result<Option<Vec<f64>>> {
        match self.fields.get(name) {
            None => Ok(None),
            Some(value) => value
                .numbers()
                .map(Some)
                .ok_or_else(|| invalid(name, format!("expected numbers, got {:?}", value))),
        }
    }

    pub fn f64(&self, name: &'static str) -> Result<Option<f64>> {
        match self.f64s(name)? {
            None => Ok(None),
            Some(values) => values
                .first()
                .copied()
                .map(Some)
                .ok_or_else(|| invalid(name, "empty list".to_string())),
        }
    }

    pub fn u32(&self, name: &'static str) -> Result<Option<u32>> {
        match self.f64(name)? {
            None => Ok(None),
            Some(value) if value >= 0.0 && value <= u32::MAX as f64 && value.fract() == 0.0 => {
                Ok(Some(value as u32))
            }
            Some(value) => Err(invalid(name, format!("{} is not an unsigned integer", value))),
        }
    }

    pub fn required_u32(&self, name: &'static str) -> Result<u32> {
        self.u32(name)?.ok_or(DevelopError::MissingField(name))
    }

    /// A 3×3 matrix stored row-major as nine numbers.
    pub fn matrix3(&self, name: &'static str) -> Result<Option<Matrix3<f64>>> {
        match self.f64s(name)? {
            None => Ok(None),
            Some(values) if values.len() == 9 => Ok(Some(Matrix3::from_row_slice(&values))),
            Some(values) => Err(invalid(name, format!("expected 9 values, got {}", values.len()))),
        }
    }

    pub fn vector3(&self, name: &'static str) -> Result<Option<Vector3<f64>>> {
        match self.f64s(name)? {
            None => Ok(None),
            Some(values) if values.len() == 3 => Ok(Some(Vector3::from_row_slice(&values))),
            Some(values) => Err(invalid(name, format!("expected 3 values, got {}", values.len()))),
        }
    }
}

fn invalid(field: &'static str, reason: String) -> DevelopError {
    DevelopError::InvalidField { field, reason }
}

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DevelopError {
    #[error("unsupported BlackLevelRepeatDim {rows}x{cols}, expected 1x1 or 2x2")]
    UnsupportedBlackLevelRepeatDim { rows: u32, cols: u32 },

    #[error("unsupported SamplesPerPixel {0}, only single channel CFA data is handled")]
    UnsupportedSamplesPerPixel(u32),

    #[error("unrecognized CFA pattern {0:?}")]
    UnknownCfaPattern(String),

    #[error("color matrix must be 3x3, got {rows}x{cols}")]
    InvalidColorMatrix { rows: usize, cols: usize },

    #[error("WhiteLevel is not numeric: {0}")]
    NonNumericWhiteLevel(String),

    #[error("black level {black} is above white level {white}")]
    BlackAboveWhite { black: f32, white: f32 },

    #[error("missing required field {0}")]
    MissingField(&'static str),

    #[error("field {field} has an unexpected value: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("active area {top},{left},{bottom},{right} does not fit a {width}x{height} frame")]
    InvalidActiveArea {
        top: usize,
        left: usize,
        bottom: usize,
        right: usize,
        width: usize,
        height: usize,
    },

    #[error("buffer holds {actual} samples, expected {width}x{height}")]
    BufferSize { width: usize, height: usize, actual: usize },

    #[error("malformed opcode list: {0}")]
    MalformedOpcodeList(String),

    #[error("invalid pipeline option {name}: {reason}")]
    InvalidOption { name: &'static str, reason: String },

    #[error("lookup table is empty")]
    EmptyLut,

    #[error("failed to parse configuration: {0}")]
    Config(#[from] toml::de::Error),

    #[error("numeric error: {0}")]
    Numeric(String),

    #[error("failed to decode raw file: {0}")]
    Decode(String),

    #[error("failed to encode output image: {0}")]
    Encode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification of a [`DevelopError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The input or configuration cannot be processed at all.
    FatalConfig,
    /// A computation hit a degenerate denominator or singular matrix.
    Numeric,
    /// Reading or writing files outside the core.
    Io,
}

impl DevelopError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DevelopError::Numeric(_) => ErrorKind::Numeric,
            DevelopError::Decode(_) | DevelopError::Encode(_) | DevelopError::Io(_) => ErrorKind::Io,
            _ => ErrorKind::FatalConfig,
        }
    }
}

pub type Result<T> = std::result::Result<T, DevelopError>;

//! RAW development: CFA extraction, sensor calibration, demosaicing and
//! colour rendering of single-channel Bayer captures.

pub mod cfa;
pub mod color_matrix;
pub mod config;
pub mod demosaic;
pub mod error;
pub mod extract;
pub mod frame;
pub mod gain_map;
pub mod imops;
pub mod levels;
pub mod logger;
pub mod lut;
pub mod normalize;
pub mod orientation;
pub mod parallel;
pub mod pipeline;
pub mod pixels;
pub mod raw_denoise;
pub mod rawler_source;
pub mod tags;
pub mod wavelets;

pub use config::PipelineOptions;
pub use error::{DevelopError, ErrorKind, Result};
pub use pipeline::develop;
pub use pixels::DevelopedImage;
pub use tags::{TagValue, Tags};

use std::process::ExitCode;
use std::time::Instant;

use clap::Parser as Clap_parser;
use rawdev::{logger, pipeline::develop, rawler_source, DevelopError, DevelopedImage, PipelineOptions, Result};
use tracing::{error, info};

#[derive(Clap_parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// raw file to develop
    #[arg(name = "input path", value_name = "input_path")]
    input_path: String,

    /// output image, format taken from the extension
    #[arg(short, name = "output path", default_value = "result.jpg", value_name = "output_path")]
    output_path: String,

    /// TOML pipeline options, defaults when omitted
    #[arg(short, name = "config path", value_name = "config_path")]
    config_path: Option<String>,
}

fn to_rgb_image(image: &DevelopedImage) -> Result<image::RgbImage> {
    let (width, height) = (image.width() as u32, image.height() as u32);
    image::RgbImage::from_vec(width, height, image.to_rgb8())
        .ok_or_else(|| DevelopError::Encode(format!("buffer does not fit {}x{}", width, height)))
}

fn run(args: &Args) -> Result<()> {
    let options = match &args.config_path {
        Some(path) => PipelineOptions::from_file(path)?,
        None => PipelineOptions::default(),
    };

    let decode = Instant::now();
    let (tags, data) = rawler_source::decode_file(&args.input_path)?;
    info!("decode file: {:.2?}", decode.elapsed());

    let now = Instant::now();
    let developed = develop(&tags, &data, &options)?;
    info!("pixel pipeline time: {:.2?}", now.elapsed());

    let now = Instant::now();
    to_rgb_image(&developed)?
        .save(&args.output_path)
        .map_err(|e| DevelopError::Encode(e.to_string()))?;
    info!("{} save: {:.2?}", args.output_path, now.elapsed());
    info!("total time: {:.2?}", decode.elapsed());
    Ok(())
}

fn main() -> ExitCode {
    logger::init();
    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{} ({:?})", e, e.kind());
            ExitCode::FAILURE
        }
    }
}

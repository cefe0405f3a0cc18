use argh::FromArgs;
use std::path::{Path, PathBuf};

use image::{DynamicImage, ExtendedColorType};
use repict::{
    image::{Image, ImageSize},
    imgproc::{
        filter::{kernels::DEFAULT_SIGMA, BorderPolicy, Kernel},
        pipeline::{FilterConfig, FilterOp, FilterPipeline},
    },
};

const DEFAULT_OUT_FILE: &str = "out/output.png";

#[derive(FromArgs)]
/// Apply a filter to an image file
struct Args {
    /// the image to read
    #[argh(positional)]
    input: PathBuf,

    /// the filter to apply: def, gauss, average, bw or kernel
    #[argh(option, short = 'f')]
    function: String,

    /// the file to write, its extension selects the format
    #[argh(option, short = 'o', default = "PathBuf::from(DEFAULT_OUT_FILE)")]
    output: PathBuf,

    /// print progress information
    #[argh(switch, short = 'v')]
    verbose: bool,

    /// the odd kernel size for the gauss and average filters
    #[argh(option)]
    size: Option<usize>,

    /// the sigma for the gauss filter
    #[argh(option)]
    sigma: Option<f32>,

    /// how many times the blur is applied
    #[argh(option, default = "1")]
    passes: usize,

    /// reduce the output to a single gray channel
    #[argh(switch)]
    gray: bool,

    /// the text file holding the weights for the kernel filter
    #[argh(option)]
    kernel: Option<PathBuf>,

    /// write a constant to the border pixels instead of averaging the in-bounds ones
    #[argh(switch)]
    trash_border: bool,
}

/// Build the filter request from the command line arguments.
fn parse_filter(args: &Args) -> Result<FilterOp, Box<dyn std::error::Error>> {
    let keep_channels = !args.gray;

    let op = match args.function.as_str() {
        "def" => FilterOp::Identity,
        "gauss" => FilterOp::Gaussian {
            sigma: args.sigma.unwrap_or(DEFAULT_SIGMA),
            size: args.size,
            passes: args.passes,
            keep_channels,
        },
        "average" => FilterOp::Average {
            size: args.size.ok_or("the average filter requires --size")?,
            passes: args.passes,
            keep_channels,
        },
        "bw" => FilterOp::Bw { keep_channels },
        "kernel" => {
            let path = args
                .kernel
                .as_ref()
                .ok_or("the kernel filter requires --kernel <file>")?;
            FilterOp::Kernel(std::fs::read_to_string(path)?.parse::<Kernel>()?)
        }
        other => return Err(format!("no such function: {}", other).into()),
    };

    Ok(op)
}

/// Decode an image file into an 8-bit buffer with 1 to 4 channels.
fn read_image(path: &Path) -> Result<Image, Box<dyn std::error::Error>> {
    let decoded = image::open(path)?;
    let size = ImageSize {
        width: decoded.width() as usize,
        height: decoded.height() as usize,
    };

    let (channels, data) = match decoded {
        DynamicImage::ImageLuma8(buf) => (1, buf.into_raw()),
        DynamicImage::ImageLumaA8(buf) => (2, buf.into_raw()),
        DynamicImage::ImageRgb8(buf) => (3, buf.into_raw()),
        DynamicImage::ImageRgba8(buf) => (4, buf.into_raw()),
        other if other.color().has_alpha() => (4, other.into_rgba8().into_raw()),
        other => (3, other.into_rgb8().into_raw()),
    };

    Ok(Image::new(size, channels, data)?)
}

/// Convert an image size to the dimensions accepted by the encoders.
fn encoded_size(size: ImageSize) -> Result<(u32, u32), Box<dyn std::error::Error>> {
    let too_large = || format!("{} is too large to encode", size);
    let width = u32::try_from(size.width).map_err(|_| too_large())?;
    let height = u32::try_from(size.height).map_err(|_| too_large())?;
    Ok((width, height))
}

/// Encode an image to a file, creating the parent directory if needed.
fn write_image(path: &Path, image: &Image) -> Result<(), Box<dyn std::error::Error>> {
    let color = match image.num_channels() {
        1 => ExtendedColorType::L8,
        2 => ExtendedColorType::La8,
        3 => ExtendedColorType::Rgb8,
        4 => ExtendedColorType::Rgba8,
        n => return Err(format!("cannot encode an image with {} channels", n).into()),
    };
    let (width, height) = encoded_size(image.size())?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    image::save_buffer(
        path,
        image.as_slice(),
        width,
        height,
        color,
    )?;

    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Args = argh::from_env();

    let level = if args.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Warn
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    let op = parse_filter(&args)?;

    let image = read_image(&args.input)?;
    log::debug!(
        "decoded {}: {} with {} channels",
        args.input.display(),
        image.size(),
        image.num_channels()
    );

    let border_policy = if args.trash_border {
        BorderPolicy::Trash
    } else {
        BorderPolicy::Clamp
    };
    let mut pipeline =
        FilterPipeline::with_config(FilterConfig::new().with_border_policy(border_policy));
    pipeline.set_image(image);

    log::debug!("applying {} ({:?})", op.name(), border_policy);
    if let Err(err) = pipeline.apply(&op) {
        log::error!("{} failed: {}", op.name(), err);
        return Err(err.into());
    }

    let result = pipeline.take_result()?;
    write_image(&args.output, &result)?;
    log::info!(
        "wrote {} with {} channels",
        args.output.display(),
        result.num_channels()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(function: &str) -> Args {
        Args {
            input: PathBuf::from("in.png"),
            function: function.to_string(),
            output: PathBuf::from(DEFAULT_OUT_FILE),
            verbose: false,
            size: None,
            sigma: None,
            passes: 1,
            gray: false,
            kernel: None,
            trash_border: false,
        }
    }

    #[test]
    fn test_parse_filter_names() -> Result<(), Box<dyn std::error::Error>> {
        for name in ["def", "gauss", "bw"] {
            assert_eq!(parse_filter(&args(name))?.name(), name);
        }

        let mut average = args("average");
        average.size = Some(5);
        average.gray = true;
        assert_eq!(
            parse_filter(&average)?,
            FilterOp::Average {
                size: 5,
                passes: 1,
                keep_channels: false,
            }
        );
        Ok(())
    }

    #[test]
    fn test_parse_filter_errors() {
        assert!(parse_filter(&args("resize")).is_err());
        assert!(parse_filter(&args("average")).is_err());
        assert!(parse_filter(&args("kernel")).is_err());
    }

    #[test]
    fn test_kernel_file() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("kernel.txt");
        std::fs::write(&path, "1 2 1\n2 4 2\n1 2 1\n")?;

        let mut kernel = args("kernel");
        kernel.kernel = Some(path);
        match parse_filter(&kernel)? {
            FilterOp::Kernel(k) => assert_eq!(k.sum(), 16.0),
            op => panic!("unexpected filter {}", op.name()),
        }
        Ok(())
    }

    #[test]
    fn test_encoded_size() -> Result<(), Box<dyn std::error::Error>> {
        assert_eq!(encoded_size([640, 480].into())?, (640, 480));

        let too_wide = ImageSize {
            width: (u32::MAX as usize).saturating_add(1),
            height: 1,
        };
        if usize::BITS > u32::BITS {
            assert!(encoded_size(too_wide).is_err());
        }
        Ok(())
    }

    #[test]
    fn test_write_and_read_gray_png() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("nested").join("gray.png");

        let image = Image::new([3, 2].into(), 1, vec![0, 50, 100, 150, 200, 250])?;
        write_image(&path, &image)?;

        let decoded = read_image(&path)?;
        assert_eq!(decoded, image);
        Ok(())
    }
}

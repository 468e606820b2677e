#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::uninlined_format_args, clippy::doc_markdown, clippy::ptr_arg)]

use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{error, info};

use pixio::{ImageCache, ImageInput, ImageOutput, OpenMode};

/// pixio CLI tools
#[derive(Parser)]
#[command(name = "pixio")]
#[command(about = "pixio CLI tools - inspect image metadata and convert between formats")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode (only errors)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print an image's spec as JSON
    Info {
        /// Image file to inspect
        file: PathBuf,
        /// Read through the shared cache instead of a direct stream
        #[arg(long)]
        cached: bool,
    },
    /// Decode an image and re-encode it in the format of the output
    /// file's extension
    Convert {
        /// Input image file
        input: PathBuf,
        /// Output image file
        output: PathBuf,
    },
    /// Print shared-cache statistics after touching the given files
    Stats {
        /// Image files to load
        files: Vec<PathBuf>,
        /// Detail level
        #[arg(short, long, default_value = "2")]
        level: i32,
    },
}

fn main() {
    let args = Args::parse();

    let level = if args.quiet {
        log::LevelFilter::Error
    } else if args.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();

    if let Err(e) = run(args.command) {
        error!("{e:#}");
        process::exit(1);
    }
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Info { file, cached } => info_command(&file, cached),
        Commands::Convert { input, output } => convert_command(&input, &output),
        Commands::Stats { files, level } => stats_command(&files, level),
    }
}

fn info_command(file: &PathBuf, cached: bool) -> Result<()> {
    let spec = if cached {
        let cache = ImageCache::create(true);
        let name = file.display().to_string();
        let spec = cache
            .get_imagespec_named(&name, None, 0, 0, false)
            .with_context(|| format!("reading {} through the cache", file.display()))?;
        ImageCache::destroy(cache, false);
        spec
    } else {
        let mut input =
            ImageInput::open(file, None).with_context(|| format!("opening {}", file.display()))?;
        let spec = input.spec().clone();
        input.close()?;
        spec
    };
    println!("{}", spec.to_json()?);
    Ok(())
}

fn convert_command(input_path: &PathBuf, output_path: &PathBuf) -> Result<()> {
    let mut input = ImageInput::open(input_path, None)
        .with_context(|| format!("opening {}", input_path.display()))?;
    let spec = input.spec().clone();
    info!(
        "{}: {}x{} ch={} {} ({})",
        input_path.display(),
        spec.width,
        spec.height,
        spec.nchannels,
        spec.format,
        input.format_name()
    );

    let nbytes = usize::try_from(spec.image_bytes(false))
        .ok()
        .filter(|_| spec.size_safe())
        .context("image too large to convert in one buffer")?;
    let mut pixels = vec![0u8; nbytes];
    input
        .read_image(spec.format, &mut pixels, None)
        .with_context(|| format!("reading {}", input_path.display()))?;
    input.close()?;

    let mut output = ImageOutput::create(output_path, None)
        .with_context(|| format!("resolving a writer for {}", output_path.display()))?;
    output
        .open(output_path, &spec, OpenMode::Create)
        .with_context(|| format!("opening {} for writing", output_path.display()))?;
    output.write_image(
        spec.format,
        &pixels,
        pixio::AUTO_STRIDE,
        pixio::AUTO_STRIDE,
        pixio::AUTO_STRIDE,
        None,
    )?;
    output.close()?;
    info!("wrote {} ({})", output_path.display(), output.format_name());
    Ok(())
}

fn stats_command(files: &[PathBuf], level: i32) -> Result<()> {
    let cache = ImageCache::create(true);
    let mut perthread = cache.create_perthread_info();
    for file in files {
        let name = file.display().to_string();
        let handle = cache.get_image_handle(&name, Some(&mut perthread));
        match cache.get_imagespec(&handle, 0, 0, false) {
            Ok(spec) => {
                info!("{name}: {}x{} ch={}", spec.width, spec.height, spec.nchannels);
            }
            Err(e) => error!("{name}: {e}"),
        }
    }
    cache.destroy_perthread_info(perthread);
    print!("{}", cache.getstats(level));
    ImageCache::destroy(cache, false);
    Ok(())
}

//! This is the main entry point for the FAT image build tool.
//!
//! The program reads a JSON manifest describing the files to include, builds
//! the requested FAT12/16/32 image entirely in memory and writes it to the
//! output path. Flags given on the command line override their manifest
//! counterparts.

use clap::Parser;
use log::{error, info};
use std::fs::{self, File};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use mkfat::manifest::Manifest;
use mkfat::{FATType, FileSource, ImageError, ImageSpec, build_image};

#[derive(Parser, Debug)]
#[command(name = "mkfat")]
#[command(about = "Create a FAT filesystem image from a JSON description.")]
struct Cli {
    /// JSON file describing the files to include; read from stdin when omitted
    #[arg(short, long)]
    manifest: Option<PathBuf>,

    /// Base path to find source files
    #[arg(short, long)]
    base: PathBuf,

    /// Output path for the generated FAT image
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Size of the image in MB
    #[arg(short = 's', long)]
    size_mb: Option<u64>,

    /// Set the volume label
    #[arg(short, long)]
    label: Option<String>,

    /// Set the FAT type
    #[arg(long, value_enum, ignore_case = true)]
    variant: Option<VariantArg>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Quiet output
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, clap::ValueEnum)]
enum VariantArg {
    Fat12,
    Fat16,
    Fat32,
}

impl VariantArg {
    fn fat_type(self) -> FATType {
        match self {
            VariantArg::Fat12 => FATType::FAT12,
            VariantArg::Fat16 => FATType::FAT16,
            VariantArg::Fat32 => FATType::FAT32,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    stderrlog::new()
        .module(module_path!())
        .verbosity(if cli.verbose { 3 } else { 2 })
        .quiet(cli.quiet)
        .init()
        .unwrap();

    match run(&cli) {
        Ok(()) => {
            if !cli.quiet {
                println!("Done.");
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), ImageError> {
    let manifest = load_manifest(cli)?;
    let args = manifest.build_args();

    let fat_type = match (cli.variant, args.and_then(|args| args.variant.as_deref())) {
        (Some(variant), _) => variant.fat_type(),
        (None, Some(name)) => name.parse::<FATType>().map_err(invalid_input)?,
        (None, None) => FATType::FAT16,
    };
    let size_mb = cli
        .size_mb
        .or(args.and_then(|args| args.size_mb))
        .unwrap_or(16);
    let label = cli
        .label
        .clone()
        .or_else(|| args.and_then(|args| args.label.clone()))
        .unwrap_or_else(|| String::from("FATFS"));
    let output = match (&cli.output, &manifest.out) {
        (Some(path), _) => path.clone(),
        (None, Some(out)) => cli.base.join(out),
        (None, None) => {
            return Err(invalid_input(
                "no output path: pass --output or set `out` in the manifest",
            ));
        }
    };

    let mut files = Vec::new();
    for entry in manifest.files() {
        let source = entry.source()?;
        let target = entry.target()?;
        info!("Adding file: {source} -> {target}");
        let bytes = fs::read(cli.base.join(source))?;
        files.push(FileSource {
            target: target.to_string(),
            bytes,
        });
    }
    let dirs: Vec<String> = manifest.directories().map(str::to_string).collect();
    for dir in &dirs {
        info!("Creating directory: {dir}");
    }

    info!("Generating {fat_type} image: {}", output.display());
    let spec = ImageSpec {
        fat_type,
        size_bytes: size_mb * 1024 * 1024,
        label,
    };
    let image = build_image(&spec, &files, &dirs)?;

    fs::write(&output, &image)?;
    info!("Wrote {} bytes to {}", image.len(), output.display());
    Ok(())
}

fn load_manifest(cli: &Cli) -> Result<Manifest, ImageError> {
    match &cli.manifest {
        Some(path) => {
            info!("Reading manifest: {}", path.display());
            Manifest::from_reader(File::open(path)?)
        }
        None => {
            info!("Reading manifest from stdin");
            Manifest::from_reader(io::stdin().lock())
        }
    }
}

fn invalid_input<E>(message: E) -> ImageError
where
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    ImageError::IOError(io::Error::new(io::ErrorKind::InvalidInput, message))
}

use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time;

use clap::{Parser, Subcommand, ValueEnum};
use log::{error, info};

use imcconv::io::{
    ChannelTiffEmitter, ImagingFormat, ImagingReader, McdReaderBuilder, OmeTiffEmitter,
    TextEncoding, DEFAULT_COMPRESSION,
};
use imcconv::prelude::*;
use imcconv::Raster;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Read imaging mass cytometry .mcd/.txt files and export their images",
    long_about = None,
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum OutputType {
    /// One multi-page OME-TIFF per image
    OmeTiff,
    /// A directory per image holding one TIFF per channel
    Channels,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the acquisitions and channels of a file
    Info {
        path: PathBuf,

        /// The text encoding of the MCD metadata footer
        #[arg(short, long, default_value = "utf-16-le")]
        encoding: TextEncoding,
    },
    /// Reshape every image of each file and write it out as TIFF
    Convert {
        /// Paths to IMC files (.txt or .mcd)
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// The directory to write to
        #[arg(short, long)]
        outdir: PathBuf,

        /// The value to assign to missing pixels. Without it, missing data is an error
        #[arg(short, long, allow_hyphen_values = true)]
        fill_missing: Option<f32>,

        /// The text encoding of the MCD metadata footer
        #[arg(short, long, default_value = "utf-16-le")]
        encoding: TextEncoding,

        /// The kinds of image to write, comma separated or given more than once
        #[arg(short = 't', long = "type", value_enum, value_delimiter = ',', default_values_t = [OutputType::OmeTiff])]
        output_types: Vec<OutputType>,

        /// Deflate compression level, 0 leaves pages uncompressed
        #[arg(short, long, default_value_t = DEFAULT_COMPRESSION, value_parser = clap::value_parser!(u8).range(0..=9))]
        compress: u8,

        /// Also write the channel summary table next to each OME-TIFF
        #[arg(short, long)]
        summary: bool,
    },
}

fn info(path: &Path, encoding: TextEncoding) -> io::Result<()> {
    let reader = McdReaderBuilder::default()
        .encoding(encoding)
        .from_path(path)?;
    println!(
        "{}: {} acquisitions holding {} bytes of data, metadata at byte {} of {}",
        path.display(),
        reader.len(),
        reader.get_index().total_bytes(),
        reader.footer_offset(),
        reader.file_length()
    );
    for entry in reader.acquisitions() {
        let record = &entry.record;
        println!(
            "Acquisition {} ({}): bytes {}..{}, {} x {}",
            entry.id(),
            record.description().unwrap_or_default(),
            record.data_start_offset,
            record.data_end_offset,
            record.data_format,
            record.value_bytes,
        );
        for name in entry.channel_names() {
            println!("\t{name}");
        }
    }
    Ok(())
}

/// The base name of the exported image, `ROI{ID}_{Description}` for container
/// acquisitions and the raster's own name otherwise
fn output_name(raster: &Raster, format: ImagingFormat) -> String {
    match (format, raster.attributes.get("ID")) {
        (ImagingFormat::MCD, Some(id)) => {
            let description = raster
                .attributes
                .get("Description")
                .map(|s| s.as_str())
                .unwrap_or_default();
            format!("ROI{id}_{description}")
        }
        _ => raster.name.clone(),
    }
}

/// The emitters selected on the command line
struct Outputs {
    ome_tiff: Option<OmeTiffEmitter>,
    channels: Option<ChannelTiffEmitter>,
}

impl Outputs {
    fn new(output_types: &[OutputType], compress: u8, summary: bool) -> Self {
        Self {
            ome_tiff: output_types
                .contains(&OutputType::OmeTiff)
                .then(|| OmeTiffEmitter::new(compress, summary)),
            channels: output_types
                .contains(&OutputType::Channels)
                .then(|| ChannelTiffEmitter::new(compress)),
        }
    }

    fn emit(&mut self, raster: &Raster, outdir: &Path, name: &str) -> io::Result<()> {
        if let Some(emitter) = self.ome_tiff.as_mut() {
            let target = outdir.join(format!("{name}.ome.tiff"));
            emitter.emit(raster, &target)?;
            info!("Wrote {} {:?} to {}", raster.name, raster.shape(), target.display());
        }
        if let Some(emitter) = self.channels.as_mut() {
            let target = outdir.join(name);
            emitter.emit(raster, &target)?;
            info!("Wrote {} channels of {} to {}", raster.channels.len(), raster.name, target.display());
        }
        Ok(())
    }

    fn written(&self) -> usize {
        self.ome_tiff.as_ref().map_or(0, |e| e.written().len())
            + self.channels.as_ref().map_or(0, |e| e.written().len())
    }
}

fn convert_file(
    path: &Path,
    outdir: &Path,
    fill_missing: Option<f32>,
    encoding: TextEncoding,
    outputs: &mut Outputs,
) -> io::Result<usize> {
    let reader = ImagingReader::builder()
        .encoding(encoding)
        .fill_missing(fill_missing)
        .from_path(path)?;
    let format = reader.as_format();
    let mut written = 0;
    for raster in reader {
        let raster = match raster {
            Ok(raster) => raster,
            Err(e) => {
                error!("Skipping an image of {}: {e}", path.display());
                continue;
            }
        };
        outputs.emit(&raster, outdir, &output_name(&raster, format))?;
        written += 1;
    }
    Ok(written)
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();
    match cli.command {
        Command::Info { path, encoding } => {
            if let Err(e) = info(&path, encoding) {
                eprintln!("{e}");
                return ExitCode::FAILURE;
            }
        }
        Command::Convert {
            paths,
            outdir,
            fill_missing,
            encoding,
            output_types,
            compress,
            summary,
        } => {
            let start = time::Instant::now();
            let mut outputs = Outputs::new(&output_types, compress, summary);
            let mut failures = 0;
            for (i, path) in paths.iter().enumerate() {
                println!("File {}/{}: {}", i + 1, paths.len(), path.display());
                match convert_file(path, &outdir, fill_missing, encoding, &mut outputs) {
                    Ok(n) => info!("Converted {n} images from {}", path.display()),
                    Err(e) => {
                        error!("Failed to convert {}: {e}", path.display());
                        failures += 1;
                    }
                }
            }
            let elapsed = time::Instant::now() - start;
            eprintln!(
                "Conversion finished: {} files written in {:0.2} seconds",
                outputs.written(),
                elapsed.as_secs_f64()
            );
            if failures > 0 {
                return ExitCode::FAILURE;
            }
        }
    }
    ExitCode::SUCCESS
}


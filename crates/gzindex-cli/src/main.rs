//! gzindex: build and use checkpoint indexes over gzip/zlib files
//!
//! Commands:
//!   index <FILE>                 - build a full index and write it to a side file
//!   cat <FILE> -o OFF -n LEN     - extract a decompressed byte range to stdout
//!   len <FILE>                   - print the uncompressed length

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use gzindex::{GzReader, ReaderOptions, DEFAULT_SPACING};

#[derive(Parser, Debug)]
#[command(
    name = "gzindex",
    version,
    about = "Random access into gzip/zlib files via a checkpoint index"
)]
struct Cli {
    /// Checkpoint interval in uncompressed bytes (minimum 32768)
    #[arg(long, env = "GZINDEX_SPACING", default_value_t = DEFAULT_SPACING)]
    spacing: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build a full checkpoint index and export it to a side file
    Index {
        /// Compressed input (gzip or zlib)
        file: PathBuf,
        /// Output path (default: <FILE>.gzidx)
        #[arg(long, short = 'o')]
        out: Option<PathBuf>,
    },

    /// Extract a decompressed byte range to stdout
    Cat {
        /// Compressed input (gzip or zlib)
        file: PathBuf,
        /// Uncompressed byte offset to start from
        #[arg(long, short = 'o', default_value_t = 0)]
        offset: u64,
        /// Number of bytes to extract (default: to end of stream)
        #[arg(long, short = 'n')]
        length: Option<u64>,
        /// Previously exported index to reuse instead of building one
        #[arg(long)]
        index: Option<PathBuf>,
    },

    /// Print the exact uncompressed length
    Len {
        /// Compressed input (gzip or zlib)
        file: PathBuf,
        /// Previously exported index to reuse instead of building one
        #[arg(long)]
        index: Option<PathBuf>,
    },
}

fn open_reader(file: &Path, spacing: u64, index: Option<&Path>) -> Result<GzReader> {
    let opts = ReaderOptions {
        spacing,
        ..Default::default()
    };
    let mut reader = GzReader::open_with_options(file, opts)
        .with_context(|| format!("opening {}", file.display()))?;
    if let Some(index_path) = index {
        let f = File::open(index_path)
            .with_context(|| format!("opening index {}", index_path.display()))?;
        reader
            .import_index(f)
            .with_context(|| format!("importing index {}", index_path.display()))?;
        tracing::debug!(index = %index_path.display(), "reusing exported index");
    }
    Ok(reader)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Index { file, out } => {
            let out = out.unwrap_or_else(|| {
                let mut p = file.clone().into_os_string();
                p.push(".gzidx");
                PathBuf::from(p)
            });

            let mut reader = open_reader(&file, cli.spacing, None)?;
            reader.build_full_index().context("building index")?;
            let total = reader.uncompressed_len()?;

            let sink = File::create(&out)
                .with_context(|| format!("creating {}", out.display()))?;
            reader.export_index(sink).context("exporting index")?;

            let points = reader
                .index()
                .read()
                .expect("index lock poisoned")
                .checkpoints()
                .len();
            tracing::info!(
                file = %file.display(),
                out = %out.display(),
                total,
                points,
                "index written"
            );
        }

        Commands::Cat {
            file,
            offset,
            length,
            index,
        } => {
            let mut reader = open_reader(&file, cli.spacing, index.as_deref())?;
            reader.seek(offset).context("seeking")?;

            let stdout = std::io::stdout();
            let mut stdout = stdout.lock();
            let mut remaining = length.unwrap_or(u64::MAX);
            let mut buf = vec![0u8; 64 * 1024];
            while remaining > 0 {
                let want = remaining.min(buf.len() as u64) as usize;
                let n = reader.read(&mut buf[..want]).context("reading")?;
                if n == 0 {
                    break;
                }
                stdout.write_all(&buf[..n]).context("writing to stdout")?;
                remaining -= n as u64;
            }
            stdout.flush()?;
        }

        Commands::Len { file, index } => {
            let mut reader = open_reader(&file, cli.spacing, index.as_deref())?;
            println!("{}", reader.uncompressed_len().context("measuring stream")?);
        }
    }

    Ok(())
}

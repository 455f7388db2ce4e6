use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Page-accurate Ogg/Opus re-framer and tonie container composer.
#[derive(Debug, Parser)]
#[command(name = "tonie-forge", version, about)]
pub struct Cli {
    /// Raise the log level one notch per occurrence (overrides `RUST_LOG`).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Exports every chapter of a tonie file to its own Ogg/Opus file.
    Export {
        /// Path to the source tonie container.
        #[arg(value_parser = existing_file)]
        input_tonie_path: PathBuf,

        /// Directory `chapter<N>.ogg` files are written into.
        output_dir: PathBuf,
    },

    /// Writes a new tonie file containing a subset or reordering of chapters.
    Skip {
        /// Path to the source tonie container.
        #[arg(value_parser = existing_file)]
        input_tonie_path: PathBuf,

        /// Destination tonie file.
        output_path: PathBuf,

        /// Comma-separated 0-based chapter indices, in output order.
        #[arg(value_delimiter = ',')]
        chapter_list: Vec<usize>,
    },

    /// Replaces all chapters of a tonie file with the given Ogg/Opus files.
    Swap {
        /// Path to the source tonie container.
        #[arg(value_parser = existing_file)]
        input_tonie_path: PathBuf,

        /// Destination tonie file.
        output_path: PathBuf,

        /// Ogg/Opus files to become the new chapters, in order.
        #[arg(required = true, value_parser = existing_file)]
        opus_paths: Vec<PathBuf>,
    },
}

fn existing_file(value: &str) -> Result<PathBuf, String> {
    let path = PathBuf::from(value);
    if !path.is_file() {
        return Err(format!("'{value}' does not exist or is not a file"));
    }
    Ok(path)
}


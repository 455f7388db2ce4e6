mod cli;
mod compose;
mod crc;
mod error;
mod ogg_page;
mod ogg_parser;
mod opus_packet;
mod repacker;
mod tonie_audio;
mod tonie_header_codec;

#[cfg(test)]
mod tests;

use std::fs::File;
use std::io::BufWriter;

use anyhow::{Context, Result};
use clap::Parser;
use tempfile::NamedTempFile;

use cli::{Cli, Command};
use compose::ComposeEngine;
use tonie_audio::TonieAudio;

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(err) = run(cli.command) {
        log::error!("{err:#}");
        std::process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();
}

fn run(command: Command) -> Result<()> {
    match command {
        Command::Export {
            input_tonie_path,
            output_dir,
        } => run_export(input_tonie_path, output_dir),
        Command::Skip {
            input_tonie_path,
            output_path,
            chapter_list,
        } => run_skip(input_tonie_path, output_path, chapter_list),
        Command::Swap {
            input_tonie_path,
            output_path,
            opus_paths,
        } => run_swap(input_tonie_path, output_path, opus_paths),
    }
}

fn run_export(input_tonie_path: std::path::PathBuf, output_dir: std::path::PathBuf) -> Result<()> {
    let mut input = File::open(&input_tonie_path)
        .with_context(|| format!("opening {}", input_tonie_path.display()))?;
    let audio = TonieAudio::parse(&mut input)
        .with_context(|| format!("parsing {}", input_tonie_path.display()))?;

    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("creating {}", output_dir.display()))?;

    for chapter in 0..audio.chapter_count() {
        let out_path = output_dir.join(format!("chapter{chapter}.ogg"));
        let mut out = BufWriter::new(
            File::create(&out_path).with_context(|| format!("creating {}", out_path.display()))?,
        );
        ComposeEngine::export_chapter(&audio, chapter, &mut out)
            .with_context(|| format!("exporting chapter {chapter}"))?;
        log::info!("wrote {}", out_path.display());
    }
    Ok(())
}

fn run_skip(
    input_tonie_path: std::path::PathBuf,
    output_path: std::path::PathBuf,
    chapter_list: Vec<usize>,
) -> Result<()> {
    let mut input = File::open(&input_tonie_path)
        .with_context(|| format!("opening {}", input_tonie_path.display()))?;
    let audio = TonieAudio::parse(&mut input)
        .with_context(|| format!("parsing {}", input_tonie_path.display()))?;

    let dir = output_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| std::path::Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir).context("creating temporary output file")?;
    ComposeEngine::skip(&audio, &chapter_list, &mut tmp).context("composing skip output")?;
    tmp.persist(&output_path)
        .with_context(|| format!("replacing {}", output_path.display()))?;
    log::info!("wrote {}", output_path.display());
    Ok(())
}

fn run_swap(
    input_tonie_path: std::path::PathBuf,
    output_path: std::path::PathBuf,
    opus_paths: Vec<std::path::PathBuf>,
) -> Result<()> {
    let mut input = File::open(&input_tonie_path)
        .with_context(|| format!("opening {}", input_tonie_path.display()))?;
    let audio = TonieAudio::parse(&mut input)
        .with_context(|| format!("parsing {}", input_tonie_path.display()))?;

    let mut opus_files = opus_paths
        .iter()
        .map(|p| File::open(p).with_context(|| format!("opening {}", p.display())))
        .collect::<Result<Vec<_>>>()?;

    let dir = output_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| std::path::Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir).context("creating temporary output file")?;
    ComposeEngine::swap(audio, &mut opus_files, &mut tmp).context("composing swap output")?;
    tmp.persist(&output_path)
        .with_context(|| format!("replacing {}", output_path.display()))?;
    log::info!("wrote {}", output_path.display());
    Ok(())
}

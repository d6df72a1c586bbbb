use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, Command, value_parser};
use docmark::{DocumentConverter, ImageMode, Settings, config};
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    Command::new("docmark")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Convert a document to markdown and print it")
        .arg(
            Arg::new("input")
                .help("Input file path")
                .required(true)
                .index(1)
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("PATH")
                .value_parser(value_parser!(PathBuf))
                .help("Write the result to a file instead of stdout"),
        )
        .arg(
            Arg::new("image-path")
                .short('i')
                .long("image-path")
                .value_name("DIR")
                .value_parser(value_parser!(PathBuf))
                .help("Directory for extracted images"),
        )
        .arg(
            Arg::new("image-mode")
                .long("image-mode")
                .value_name("MODE")
                .value_parser(["placeholder", "embedded", "referenced"])
                .help("How pictures are rendered"),
        )
        .arg(
            Arg::new("to")
                .short('t')
                .long("to")
                .value_name("FORMAT")
                .value_parser(["md", "text", "json"])
                .default_value("md")
                .help("Output rendering"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .help("Log debug output to stderr"),
        )
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let matches = cli().get_matches();
    init_logging(matches.get_flag("verbose"));

    let input = matches.get_one::<PathBuf>("input").unwrap();

    let image_mode = matches
        .get_one::<String>("image-mode")
        .map(|mode| match mode.as_str() {
            "placeholder" => ImageMode::Placeholder,
            "referenced" => ImageMode::Referenced,
            _ => ImageMode::Embedded,
        });

    let mut settings = Settings::new().context("failed to load configuration")?;
    settings.apply_cli_overrides(
        matches.get_one::<PathBuf>("image-path").cloned(),
        matches.get_one::<PathBuf>("output").cloned(),
        image_mode,
    );
    config::set_settings(settings);

    let converter = DocumentConverter::new();
    let result = converter
        .convert(input)
        .with_context(|| format!("failed to convert {}", input.display()))?;
    for warning in &result.errors {
        tracing::warn!("{}", warning);
    }
    tracing::info!(
        format = %result.input.format,
        pages = ?result.document.metadata.num_pages,
        characters = result.document.metadata.num_characters,
        latency = ?result.latency,
        "conversion finished"
    );

    let rendered = match matches.get_one::<String>("to").map(String::as_str) {
        Some("text") => result.document.export_to_text(),
        Some("json") => result.document.export_to_json()?,
        _ => result.document.export_to_markdown(),
    };

    if let Some(output_path) = &converter.settings().output_path {
        std::fs::write(output_path, &rendered)
            .with_context(|| format!("failed to write {}", output_path.display()))?;
        eprintln!("Output written to: {}", output_path.display());
    } else {
        // stdout carries UTF-8 bytes whatever the locale says
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(rendered.as_bytes())?;
        stdout.write_all(b"\n")?;
        stdout.flush()?;
    }

    Ok(())
}

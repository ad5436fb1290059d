use std::error::Error;
use std::fs;
use std::process::ExitCode;

use clap::Parser;
use log::{error, info, warn};

mod batch;
mod buf;
mod build;
mod cli;
mod config;
mod extract;
mod info;
mod rpt;
mod select;

use crate::build::{build_file, BuildOptions, BuildSpec, ObjectHeaderSource};
use crate::cli::{BuildArgs, Cli, Commands, ExtractArgs};
use crate::config::Config;
use crate::extract::{Container, ExtractOptions};
use crate::rpt::object_header::ObjectMetadata;
use crate::rpt::BODY_START;

fn extract_command(args: &ExtractArgs, config: &Config) -> Result<bool, Box<dyn Error>> {
    // Flag conflicts surface before any file is touched
    let options = ExtractOptions {
        selection: args.selection()?,
        binary: args.binary_mode()?,
        output_root: args.output.clone().unwrap_or_else(|| config.output_dir.clone()),
    };

    if args.input.is_file() {
        let stats = extract::extract_file(&args.input, &options)?;
        println!(
            "{}: {} pages, {} failed{}",
            stats.output_dir.display(),
            stats.pages_written,
            stats.pages_failed,
            stats
                .document
                .map(|d| format!(", document {}", d))
                .unwrap_or_default()
        );
        return Ok(stats.pages_failed == 0 && stats.fragments_failed == 0);
    }

    let paths = batch::collect_containers(&args.input, args.recursive, &config.extension);
    if paths.is_empty() {
        warn!(
            "no .{} files under {}",
            config.extension,
            args.input.display()
        );
    }
    let summary = batch::extract_all(&args.input, &paths, &options);
    println!(
        "{} containers, {} failed, {} pages, {} documents",
        paths.len(),
        summary.failed.len(),
        summary.pages_written(),
        summary.documents_written()
    );
    Ok(summary.failed.is_empty())
}

fn build_command(args: &BuildArgs, config: &Config) -> Result<bool, Box<dyn Error>> {
    args.validate()?;
    let sections = args.sections()?;

    let mut spec = BuildSpec::from_extracted(&args.pages_dir)?;

    if let Some(path) = &args.template {
        let mut template = fs::read(path)?;
        template.truncate(BODY_START);
        let header = rpt::header::parse(&template)?;
        spec.species_id = header.species_id;
        spec.domain_id = header.domain_id;
        spec.timestamp = Some(header.timestamp);
        spec.template = Some(template);
    }
    if let Some(species) = args.species {
        spec.species_id = species;
    }
    if let Some(domain) = args.domain {
        spec.domain_id = domain;
    }
    if let Some(timestamp) = &args.timestamp {
        spec.timestamp = Some(timestamp.clone());
    }

    if let Some(path) = &args.binary {
        let object_header = match std::mem::take(&mut spec.object_header) {
            _ if args.no_object_header => ObjectHeaderSource::None,
            // Extracted header page, keep it as it was
            ObjectHeaderSource::Text(text) => ObjectHeaderSource::Text(text),
            _ => ObjectHeaderSource::Generate(ObjectMetadata::from_path(path)?),
        };
        spec.set_binary(fs::read(path)?, object_header);
    }

    spec.sections = match &args.sections_from {
        Some(path) => {
            let buf = fs::read(path)?;
            Container::parse(&buf)?.sections
        }
        None => sections,
    };

    if spec.pages.is_empty() {
        warn!("no page files in {}", args.pages_dir.display());
    }

    let options = BuildOptions {
        level: config.compression(),
        fragments: config.fragment_policy,
    };
    let len = build_file(&spec, &options, &args.output)?;
    println!("{}: {} pages, {} bytes", args.output.display(), spec.pages.len(), len);
    Ok(true)
}

fn run(cli: &Cli) -> Result<bool, Box<dyn Error>> {
    let config = Config::load(cli.config.as_deref())?;
    info!("CONFIG: {:?}", config);

    match &cli.command {
        Commands::Extract(args) => extract_command(args, &config),
        Commands::Info { input } => {
            print!("{}", info::inspect(input)?);
            Ok(true)
        }
        Commands::Build(args) => build_command(args, &config),
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(2),
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

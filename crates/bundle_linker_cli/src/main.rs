//! CLI front-end for `bundle_linker`. Loads a config file and a serialized
//! module graph document, links them, writes output files and diagnostics,
//! and exits with the status spec.md §6 specifies. Config-loading shape
//! (`--config-path` defaulting to a JSON file read relative to the working
//! directory) mirrors `unused_bin`'s `main.rs`.

mod input_doc;

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use logger::{Logger, StdioLogger};

use bundle_linker::config::SourceMapMode;
use bundle_linker::{link, DiagnosticLog, Severity};

use input_doc::InputDocument;

const DEFAULT_CONFIG_PATH: &str = "bundle-linker.json";

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to the `LinkerConfig` JSON file. Embedded directly in the graph
    /// document's top-level `config` field; this flag exists for callers
    /// that keep config separate from the graph they're linking.
    #[arg(short, long, default_value = None)]
    config_path: Option<String>,
    /// Path to the serialized module-graph JSON document (spec.md §1's
    /// "module graph from scanning/parsing" input, produced upstream of
    /// this crate).
    #[arg(short, long)]
    graph_path: String,
}

fn load_config(config_path: Option<&str>) -> Result<Option<bundle_linker::LinkerConfig>> {
    let Some(path) = config_path else {
        return Ok(None);
    };
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading config file {path}"))?;
    let config = serde_json::from_str(&text)
        .with_context(|| format!("parsing config file {path}"))?;
    Ok(Some(config))
}

fn print_diagnostics(logger: &StdioLogger, diagnostics: &DiagnosticLog) {
    for diagnostic in diagnostics.iter() {
        let line = diagnostic.to_string();
        match diagnostic.severity {
            Severity::Error => logger.error(line),
            Severity::Warning => logger.warn(line),
        }
    }
}

fn write_outputs(outputs: &[bundle_linker::OutputFile], config: &bundle_linker::LinkerConfig) -> Result<()> {
    for output in outputs {
        let abs_path = resolve_output_path(&output.abs_path, outputs.len(), config)?;
        if let Some(parent) = abs_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating output directory {}", parent.display()))?;
        }
        fs::write(&abs_path, &output.contents)
            .with_context(|| format!("writing output file {}", abs_path.display()))?;

        if let Some(source_map_json) = &output.source_map_json {
            if config.source_map != SourceMapMode::None && config.source_map != SourceMapMode::Inline {
                let map_path = abs_path.with_extension(format!(
                    "{}.map",
                    abs_path.extension().and_then(|e| e.to_str()).unwrap_or("js")
                ));
                fs::write(&map_path, source_map_json)
                    .with_context(|| format!("writing source map {}", map_path.display()))?;
            }
        }
    }
    Ok(())
}

/// A single-entry, non-splitting link writes straight to `abs_output_file`;
/// everything else (multiple chunks, or `abs_output_dir` configured) writes
/// `chunk.name` underneath `abs_output_dir`.
fn resolve_output_path(
    chunk_name: &str,
    total_outputs: usize,
    config: &bundle_linker::LinkerConfig,
) -> Result<PathBuf> {
    if total_outputs == 1 {
        if let Some(file) = &config.abs_output_file {
            return Ok(PathBuf::from(file));
        }
    }
    let dir = config
        .abs_output_dir
        .as_deref()
        .context("abs_output_dir must be set when linking produces more than one chunk")?;
    abspath::join_abspath(dir, chunk_name)
        .with_context(|| format!("abs_output_dir {dir} is not an absolute path"))
}

fn run(args: CliArgs) -> Result<bool> {
    let graph_text = fs::read_to_string(&args.graph_path)
        .with_context(|| format!("reading graph document {}", args.graph_path))?;
    let mut doc: InputDocument = serde_json::from_str(&graph_text)
        .with_context(|| format!("parsing graph document {}", args.graph_path))?;

    if let Some(config) = load_config(args.config_path.as_deref())? {
        doc.config = config;
    } else if args.config_path.is_none() {
        let default_path = Path::new(DEFAULT_CONFIG_PATH);
        if default_path.exists() {
            doc.config = load_config(Some(DEFAULT_CONFIG_PATH))?.unwrap();
        }
    }

    let config = doc.config.clone();
    let graph = input_doc::build_graph(doc)?;
    let result = link(graph);

    let logger = StdioLogger::new();
    print_diagnostics(&logger, &result.diagnostics);

    if result.diagnostics.has_errors() {
        return Ok(false);
    }

    write_outputs(&result.outputs, &config)?;
    logger.log(format!("wrote {} output file(s)", result.outputs.len()));
    Ok(true)
}

fn main() -> ExitCode {
    let args = CliArgs::parse();
    match run(args) {
        Ok(true) => ExitCode::from(0),
        Ok(false) => ExitCode::from(1),
        Err(err) => {
            eprintln!("bundle-linker: {err:?}");
            ExitCode::from(2)
        }
    }
}

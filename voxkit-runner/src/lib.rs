//! Load pipeline documents from disk and run them
//!
//! The binary in `main.rs` is a thin clap front end over [`run_file`].

#![warn(missing_docs)]

use std::fmt::Write as _;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use voxkit_core::{
    read_pipeline, DataContainerRegistry, FilterCatalog, Pipeline, PipelineConfig, PipelineReport,
};

/// Options for one invocation
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Pipeline document to load
    pub pipeline_path: PathBuf,

    /// Stop after the preflight pass
    pub preflight_only: bool,

    /// Where to write the JSON report, if anywhere
    pub report_path: Option<PathBuf>,

    /// Pipeline configuration
    pub config: PipelineConfig,
}

/// Read and instantiate a pipeline document
pub fn load_pipeline(path: &Path, catalog: &FilterCatalog) -> Result<Pipeline> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read pipeline file {}", path.display()))?;
    let document: serde_json::Value = serde_json::from_str(&text)
        .with_context(|| format!("{} is not valid JSON", path.display()))?;
    read_pipeline(&document, catalog)
        .with_context(|| format!("failed to load pipeline from {}", path.display()))
}

/// Load the pipeline at `options.pipeline_path` and run it against an empty registry
///
/// A failing pipeline is not an error here; inspect the returned report.
pub fn run_file(
    options: &RunOptions,
    catalog: &FilterCatalog,
) -> Result<(PipelineReport, DataContainerRegistry)> {
    let mut pipeline = load_pipeline(&options.pipeline_path, catalog)?;
    pipeline.set_config(options.config.clone());
    tracing::info!(
        name = pipeline.name(),
        filters = pipeline.len(),
        preflight_only = options.preflight_only,
        "loaded pipeline"
    );

    let mut registry = DataContainerRegistry::new();
    let report = if options.preflight_only {
        pipeline.preflight(&registry)
    } else {
        pipeline.run(&mut registry)
    };

    if let Some(path) = &options.report_path {
        write_report(&report, path)?;
    }
    Ok((report, registry))
}

/// Write `report` as pretty JSON
pub fn write_report(report: &PipelineReport, path: &Path) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("failed to create report file {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), report)
        .with_context(|| format!("failed to write report to {}", path.display()))?;
    Ok(())
}

/// Human readable summary of a finished run
pub fn summarize(report: &PipelineReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "run {}: {:?}", report.run_id, report.outcome);
    for message in &report.messages {
        let _ = writeln!(out, "  {message}");
    }
    for timing in &report.timings {
        let _ = write!(
            out,
            "  [{}] {} preflight {:?}",
            timing.filter_index, timing.filter_label, timing.preflight
        );
        match timing.execute {
            Some(execute) => {
                let _ = writeln!(out, ", execute {execute:?}");
            }
            None => out.push('\n'),
        }
    }
    out
}

/// One line per registered filter: class name, group and label
pub fn describe_catalog(catalog: &FilterCatalog) -> Vec<String> {
    catalog
        .class_names()
        .into_iter()
        .filter_map(|name| {
            let meta = catalog.metadata(&name).ok()?;
            Some(format!(
                "{name:<24} {}/{}  {}",
                meta.group_name, meta.sub_group_name, meta.human_label
            ))
        })
        .collect()
}

//! Template command - render chart templates locally

use chartwright_core::{Chart, MergePolicy, ReleaseInfo, Values, parse_set_values};
use chartwright_engine::{Engine, EngineError, assembler};
use console::style;
use miette::{IntoDiagnostic, Result, WrapErr};
use std::path::{Path, PathBuf};

pub struct TemplateArgs<'a> {
    pub name: &'a str,
    pub chart_path: &'a Path,
    pub values_files: &'a [PathBuf],
    pub set_values: &'a [String],
    pub namespace: &'a str,
    pub show_only: Option<&'a str>,
    pub parallel: bool,
    pub show_values: bool,
}

pub fn run(args: &TemplateArgs<'_>) -> Result<()> {
    let chart = Chart::load(args.chart_path)
        .into_diagnostic()
        .wrap_err_with(|| format!("Failed to load chart from {}", args.chart_path.display()))?;

    tracing::debug!(
        chart = %chart.name(),
        version = %chart.metadata.version,
        subcharts = chart.subcharts.len(),
        "loaded chart"
    );

    let overrides = collect_overrides(args.values_files, args.set_values)?;

    if args.show_values {
        println!("{}", style("# User-supplied values").cyan().bold());
        let yaml = serde_yaml::to_string(overrides.inner())
            .into_diagnostic()
            .wrap_err("Failed to serialize values")?;
        println!("{}", yaml.trim_end());
        println!();
    }

    let release = ReleaseInfo::for_install(args.name, args.namespace);
    let engine = Engine::builder().parallel(args.parallel).build();

    let rendered = engine
        .render_chart(&chart, &release, &overrides)
        .map_err(into_report)?;

    match args.show_only {
        Some(filter) => {
            let selected: Vec<_> = rendered.iter().filter(|doc| doc.id.contains(filter)).collect();
            if selected.is_empty() {
                return Err(miette::miette!(
                    help = "template paths look like `<chart>/templates/<file>`",
                    "could not find template `{}` in chart",
                    filter
                ));
            }
            print!("{}", assembler::assemble(selected));
        }
        None => {
            print!("{}", rendered.assemble());
            if let Some(notes) = &rendered.notes {
                println!();
                println!("{}", style("# NOTES:").yellow().bold());
                println!("{}", notes.trim_end());
            }
        }
    }

    Ok(())
}

/// `-f` files in order, then `--set` on top
///
/// `--set` may replace any shape coming from a file. The combined overrides
/// then meet the chart defaults under the engine's strict policy.
fn collect_overrides(values_files: &[PathBuf], set_values: &[String]) -> Result<Values> {
    let mut overrides = Values::new();

    for values_file in values_files {
        let file_values = Values::from_file(values_file)
            .into_diagnostic()
            .wrap_err_with(|| format!("Failed to load values file: {}", values_file.display()))?;
        overrides
            .merge(&file_values, MergePolicy::Strict)
            .into_diagnostic()
            .wrap_err_with(|| format!("Failed to merge values file: {}", values_file.display()))?;
        tracing::debug!(file = %values_file.display(), "merged values file");
    }

    if !set_values.is_empty() {
        let set_vals = parse_set_values(set_values)
            .into_diagnostic()
            .wrap_err("Failed to parse --set values")?;
        overrides
            .merge(&set_vals, MergePolicy::OverrideWins)
            .into_diagnostic()
            .wrap_err("Failed to apply --set values")?;
        tracing::debug!(count = set_values.len(), "applied --set values");
    }

    Ok(overrides)
}

fn into_report(err: EngineError) -> miette::Report {
    match err {
        EngineError::Template(te) => miette::Report::new(te),
        other => miette::Report::new(other),
    }
}

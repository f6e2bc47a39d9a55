use std::collections::HashMap;
use std::path::Path;
use chrono::{NaiveDate, Utc};
use console::style;
use crate::analysis::{
    self, DEFAULT_GROWTH_FACTORS, DEFAULT_LATENCY_THRESHOLDS, DEFAULT_MAX_INCLUSION_SCORE, DEFAULT_THRESHOLDS,
};
use crate::cli::commands::AnalyzeArgs;
use crate::config::parser::{validate_ceiling, validate_growth_factors, validate_thresholds};
use crate::config::ToolConfig;
use crate::epss::{extract_panel, PopulationSnapshot};
use crate::errors::KevError;
use crate::pipeline::{read_dataset, Dataset};
use crate::reporting::formatter::{format_deceptive_table, format_latency_table, format_threshold_table};
use crate::reporting::{write_analysis_outputs, write_panel, AnalysisReport};
use tracing::{info, warn};

pub async fn handle_analyze(args: AnalyzeArgs, config: ToolConfig, quiet: bool) -> Result<(), KevError> {
    let thresholds = resolve_thresholds(&args, &config)?;
    let ceiling = resolve_ceiling(&args, &config)?;
    let latency_thresholds = resolve_latency_thresholds(&args, &config)?;
    let growth = resolve_growth(&args, &config)?;

    let dataset = read_dataset(Path::new(&args.input)).await?;
    if dataset.records.is_empty() {
        return Err(KevError::Config(format!("Dataset {} has no records", args.input)));
    }
    if dataset.malformed > 0 {
        warn!(malformed = dataset.malformed, "Ignored malformed dataset lines");
    }

    let population = match &args.population {
        Some(path) => Some(PopulationSnapshot::load(Path::new(path))?),
        None => None,
    };

    let catalog = catalog_dates(&dataset);
    let mut report = build_report(&args.input, dataset, population.as_ref(), &thresholds, ceiling);
    info!(
        records = report.records,
        flagged = report.deceptive_low.len(),
        "Analysis computed"
    );

    let out_dir = Path::new(&args.out_dir);
    let mut written = Vec::new();
    if let Some(snap_dir) = &args.snap_dir {
        let panel = extract_panel(&catalog, Path::new(snap_dir))?;
        if panel.is_empty() {
            warn!(snap_dir = %snap_dir, "No dataset CVE found in the weekly snapshots");
        }
        report.latency = Some(analysis::analyze_latency(&panel.rows, &latency_thresholds, &growth));
        written.push(write_panel(out_dir, &panel.rows).await?);
    }

    written.extend(write_analysis_outputs(out_dir, &report).await?);

    if args.json {
        let payload = serde_json::json!({
            "thresholds": report.thresholds,
            "deceptive_low": report.deceptive_low,
            "latency": report.latency,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else if !quiet {
        println!("{}", style("Recall by threshold").bold());
        print!("{}", format_threshold_table(&report.thresholds));
        println!();
        println!("{}", style(format!("EPSS < {} at inclusion", ceiling)).bold());
        print!("{}", format_deceptive_table(&report.deceptive_low));
        println!();
        if let Some(latency) = &report.latency {
            println!("{}", style("Days from inclusion to EPSS threshold").bold());
            print!("{}", format_latency_table(&latency.thresholds, |t| format!("EPSS >= {}", t)));
            println!();
            println!("{}", style("Days from inclusion to growth over baseline").bold());
            print!("{}", format_latency_table(&latency.growth, |g| format!("baseline x{}", g)));
            println!();
        }
        for path in &written {
            println!("  {} {}", style("wrote").green(), path.display());
        }
    }

    Ok(())
}

pub fn build_report(
    input: &str,
    dataset: Dataset,
    population: Option<&PopulationSnapshot>,
    thresholds: &[f64],
    ceiling: f64,
) -> AnalysisReport {
    let results = analysis::analyze(&dataset.records, population, thresholds);
    let flagged = analysis::detect(&dataset.records, ceiling);
    let missing_at_inclusion = dataset.records.iter().filter(|r| r.epss_at_inclusion.is_none()).count();

    AnalysisReport {
        generated_at: Utc::now(),
        dataset: input.to_string(),
        records: dataset.records.len(),
        duplicates: dataset.duplicates,
        missing_at_inclusion,
        population_size: population.map(|p| p.len()),
        population_date: population.and_then(|p| p.score_date),
        thresholds: results,
        max_inclusion_score: ceiling,
        deceptive_low: flagged,
        latency: None,
    }
}

/// CVE id -> date added, as recorded in the dataset.
pub fn catalog_dates(dataset: &Dataset) -> HashMap<String, NaiveDate> {
    dataset
        .records
        .iter()
        .map(|r| (r.cve_id().to_string(), r.entry.date_added))
        .collect()
}

fn resolve_thresholds(args: &AnalyzeArgs, config: &ToolConfig) -> Result<Vec<f64>, KevError> {
    let thresholds = args
        .thresholds
        .clone()
        .or_else(|| config.thresholds().map(<[f64]>::to_vec))
        .unwrap_or_else(|| DEFAULT_THRESHOLDS.to_vec());
    validate_thresholds(&thresholds)?;
    Ok(thresholds)
}

fn resolve_latency_thresholds(args: &AnalyzeArgs, config: &ToolConfig) -> Result<Vec<f64>, KevError> {
    let thresholds = args
        .latency_thresholds
        .clone()
        .or_else(|| config.latency_thresholds().map(<[f64]>::to_vec))
        .unwrap_or_else(|| DEFAULT_LATENCY_THRESHOLDS.to_vec());
    validate_thresholds(&thresholds)?;
    Ok(thresholds)
}

fn resolve_growth(args: &AnalyzeArgs, config: &ToolConfig) -> Result<Vec<f64>, KevError> {
    let factors = args
        .growth
        .clone()
        .or_else(|| config.growth_factors().map(<[f64]>::to_vec))
        .unwrap_or_else(|| DEFAULT_GROWTH_FACTORS.to_vec());
    validate_growth_factors(&factors)?;
    Ok(factors)
}

fn resolve_ceiling(args: &AnalyzeArgs, config: &ToolConfig) -> Result<f64, KevError> {
    let ceiling = args
        .max_inclusion_score
        .or(config.max_inclusion_score())
        .unwrap_or(DEFAULT_MAX_INCLUSION_SCORE);
    validate_ceiling(ceiling)?;
    Ok(ceiling)
}

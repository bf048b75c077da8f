//! Run many reform files against one baseline in parallel
//!
//! Prints the change in each total, per reform, for the last simulated year
//! and optionally writes every run as JSON.

use std::fs::File;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use taxsim::{BaselineConfig, PopulationInput, ReformFile, ScenarioRunner};

#[derive(Parser, Debug)]
#[command(name = "compare_reforms")]
#[command(about = "Compare several reforms against current law")]
struct Args {
    /// Reform files to compare
    #[arg(required = true)]
    reforms: Vec<PathBuf>,

    #[arg(long)]
    pit: Option<PathBuf>,
    #[arg(long)]
    pit_weights: Option<PathBuf>,
    #[arg(long)]
    cit: Option<PathBuf>,
    #[arg(long)]
    cit_panel: bool,
    #[arg(long)]
    gst: Option<PathBuf>,

    #[arg(long, default_value_t = 2017)]
    start_year: i32,
    #[arg(long, default_value_t = 2021)]
    end_year: i32,

    /// Variables to total
    #[arg(long, value_delimiter = ',', default_value = "pitax")]
    vars: Vec<String>,

    /// Write all runs to this JSON file
    #[arg(long)]
    json: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let start = Instant::now();
    let config = BaselineConfig {
        start_year: args.start_year,
        pit: args.pit.as_ref().map(|p| PopulationInput {
            data: p.clone(),
            weights: args.pit_weights.clone(),
            schema: None,
        }),
        cit: args.cit.as_ref().map(PopulationInput::new),
        gst: args.gst.as_ref().map(PopulationInput::new),
        cit_panel: args.cit_panel,
        ..BaselineConfig::default()
    };
    let runner = ScenarioRunner::new(config.build().context("failed to build baseline")?);
    println!("Loaded baseline in {:?}", start.elapsed());

    let reforms = args
        .reforms
        .iter()
        .map(|path| {
            let name = path
                .file_stem()
                .map_or_else(|| path.display().to_string(), |s| s.to_string_lossy().into_owned());
            let file = ReformFile::from_path(path)
                .with_context(|| format!("failed to read reform {}", path.display()))?;
            Ok((name, file))
        })
        .collect::<Result<Vec<(String, ReformFile)>>>()?;

    let vars: Vec<&str> = args.vars.iter().map(|s| s.as_str()).collect();
    let run_start = Instant::now();
    let results = runner.run_batch(&reforms, args.end_year, &vars);
    println!("Ran {} reforms in {:?}\n", reforms.len(), run_start.elapsed());

    println!("{:<24} {:>12} {:>20}", "Reform", "Variable", "Change");
    println!("{}", "-".repeat(58));
    let mut runs = Vec::new();
    for ((name, _), result) in reforms.iter().zip(results) {
        match result {
            Ok(run) => {
                for var in &vars {
                    if let Some(change) = run.change(args.end_year, var) {
                        println!("{:<24} {:>12} {:>20.2}", name, var, change);
                    }
                }
                runs.push(run);
            }
            Err(e) => println!("{:<24} failed: {}", name, e),
        }
    }

    if let Some(path) = &args.json {
        let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
        serde_json::to_writer_pretty(file, &runs)?;
        println!("\nRuns written to: {}", path.display());
    }
    Ok(())
}

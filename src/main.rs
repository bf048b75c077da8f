//! taxsim CLI
//!
//! Loads policy, growth factors and record files, runs the baseline (and
//! optionally one reform) year by year and prints weighted totals.

use std::fs::File;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use taxsim::scenario::simulate;
use taxsim::tables::{difference_table, distribution_table, Grouping};
use taxsim::{BaselineConfig, PopulationInput, PopulationKind, ReformFile, ScenarioRunner};

#[derive(Parser, Debug)]
#[command(name = "taxsim")]
#[command(about = "Simulate PIT, CIT and GST revenue under current law and a reform")]
struct Args {
    /// Personal income tax records (CSV)
    #[arg(long)]
    pit: Option<PathBuf>,
    #[arg(long)]
    pit_weights: Option<PathBuf>,

    /// Corporate income tax records (CSV)
    #[arg(long)]
    cit: Option<PathBuf>,
    #[arg(long)]
    cit_weights: Option<PathBuf>,
    /// Treat CIT records as a multi-year panel
    #[arg(long)]
    cit_panel: bool,

    /// Consumption records (CSV)
    #[arg(long)]
    gst: Option<PathBuf>,
    #[arg(long)]
    gst_weights: Option<PathBuf>,

    /// Policy parameter JSON (default: embedded current law)
    #[arg(long)]
    policy: Option<PathBuf>,

    /// Growth factor CSV (default: embedded table)
    #[arg(long)]
    growfactors: Option<PathBuf>,

    /// Reform file (JSON, `//` comments allowed)
    #[arg(short, long)]
    reform: Option<PathBuf>,

    /// Year the record files describe
    #[arg(long, default_value_t = 2017)]
    start_year: i32,

    /// Last year to simulate
    #[arg(long)]
    end_year: Option<i32>,

    /// Variables to total (default: pitax, citax and gst for loaded records)
    #[arg(long, value_delimiter = ',')]
    vars: Vec<String>,

    /// Write a PIT decile table for the last year to this CSV file
    #[arg(long)]
    table: Option<PathBuf>,
}

fn input(data: &Option<PathBuf>, weights: &Option<PathBuf>) -> Option<PopulationInput> {
    data.as_ref().map(|d| PopulationInput {
        data: d.clone(),
        weights: weights.clone(),
        schema: None,
    })
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = BaselineConfig {
        growfactors: args.growfactors.clone(),
        policy: args.policy.clone(),
        start_year: args.start_year,
        pit: input(&args.pit, &args.pit_weights),
        cit: input(&args.cit, &args.cit_weights),
        gst: input(&args.gst, &args.gst_weights),
        cit_panel: args.cit_panel,
        ..BaselineConfig::default()
    };
    let baseline = config.build().context("failed to build baseline")?;
    let end_year = args.end_year.unwrap_or(args.start_year);
    if end_year < args.start_year {
        bail!("end year {} is before start year {}", end_year, args.start_year);
    }

    let vars: Vec<String> = if args.vars.is_empty() {
        baseline
            .kinds()
            .map(|k| match k {
                PopulationKind::Individual => "pitax",
                PopulationKind::Corporate => "citax",
                PopulationKind::Consumption => "gst",
            })
            .map(String::from)
            .collect()
    } else {
        args.vars.clone()
    };
    let var_refs: Vec<&str> = vars.iter().map(|s| s.as_str()).collect();

    println!("taxsim v{}", env!("CARGO_PKG_VERSION"));
    println!("======================\n");

    let runner = ScenarioRunner::new(baseline);
    let reform = match &args.reform {
        Some(path) => Some(
            ReformFile::from_path(path)
                .with_context(|| format!("failed to read reform {}", path.display()))?,
        ),
        None => None,
    };

    match &reform {
        Some(file) => {
            let name = args
                .reform
                .as_ref()
                .and_then(|p| p.file_stem())
                .map_or("reform".to_string(), |s| s.to_string_lossy().into_owned());
            let run = runner.run_reform(&name, file, end_year, &var_refs)?;
            println!("{:>6} {:>12} {:>20} {:>20} {:>20}", "Year", "Variable", "Baseline", "Reform", "Change");
            println!("{}", "-".repeat(82));
            for (b, r) in run.baseline.iter().zip(&run.reform) {
                for var in &var_refs {
                    let (bv, rv) = (b.totals[*var], r.totals[*var]);
                    println!("{:>6} {:>12} {:>20.2} {:>20.2} {:>20.2}", b.year, var, bv, rv, rv - bv);
                }
            }
        }
        None => {
            let mut calc = runner.baseline().clone();
            let rows = simulate(&mut calc, end_year, &var_refs)?;
            println!("{:>6} {:>12} {:>20}", "Year", "Variable", "Total");
            println!("{}", "-".repeat(40));
            for row in &rows {
                for (var, total) in &row.totals {
                    println!("{:>6} {:>12} {:>20.2}", row.year, var, total);
                }
            }
        }
    }

    if let Some(path) = &args.table {
        let file = reform.clone().unwrap_or_default();
        let (base, refm) = runner.calculators_for_year(&file, end_year)?;
        let kind = PopulationKind::Individual;
        let table = if reform.is_some() {
            difference_table(&base, &refm, kind, "GTI", "pitax", &Grouping::WeightedDeciles)?
        } else {
            distribution_table(&base, kind, "GTI", &["GTI", "TTI", "pitax"], &Grouping::WeightedDeciles)?
        };
        let out = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
        table.write_csv(out)?;
        println!("\nDecile table written to: {}", path.display());
    }

    Ok(())
}

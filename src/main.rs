use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use ghg_inventory::cache::CachedStore;
use ghg_inventory::climate;
use ghg_inventory::config::load_config;
use ghg_inventory::hierarchy::PartitionKey;
use ghg_inventory::processor::run_batch;
use ghg_inventory::store::{co2_column, other_gas_columns, DatasetStore};

#[derive(Parser, Debug)]
#[command(name = "ghg-inventory", version, about = "Normalize CRT inventory workbooks into leveled parquet tables")]
struct Cli {
    /// TOML config file; `pipeline.toml` when omitted. `GHG__*` env vars override it.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Process every configured country folder.
    Process {
        /// Sheet to process; repeat for several. Replaces the configured list.
        #[arg(long = "sheet")]
        sheets: Vec<String>,

        /// Country folder to process; repeat for several.
        #[arg(long = "country")]
        countries: Vec<String>,
    },

    /// Print the head of one processed table.
    Show {
        country: String,

        /// Level directory name: total, sectors, subsectors, ..., memo_items.
        #[arg(long, default_value = "total")]
        level: String,

        /// Show the wide pivot for this gas (name or slug, e.g. `co2`).
        #[arg(long)]
        gas: Option<String>,

        #[arg(long, default_value_t = 10)]
        rows: usize,
    },

    /// Convert a climate-impact dataset to parquet.
    Climate {
        #[command(subcommand)]
        dataset: ClimateDataset,
    },
}

#[derive(Subcommand, Debug)]
enum ClimateDataset {
    /// EM-DAT extreme weather export (Excel).
    Weather {
        input: PathBuf,
        output: PathBuf,

        /// Disaster type to keep; repeat for several. Defaults to the climate hazards.
        #[arg(long = "hazard")]
        hazards: Vec<String>,
    },
    /// Our World in Data CO₂ dataset (CSV).
    Emissions { input: PathBuf, output: PathBuf },
    /// NASA GISS global temperature anomalies (CSV).
    Temperature {
        input: PathBuf,
        output: PathBuf,

        #[arg(long, default_value_t = 1990)]
        from: i32,

        #[arg(long, default_value_t = 2024)]
        to: i32,
    },
}

fn main() -> Result<()> {
    // Load .env file into std::env
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let mut cfg = load_config(cli.config.as_deref()).context("loading configuration")?;
    let _guard = ghg_inventory::log::init(cfg.log_dir.as_deref());

    match cli.command {
        Command::Process { sheets, countries } => {
            if !sheets.is_empty() {
                cfg.sheets = sheets;
            }
            if !countries.is_empty() {
                cfg.countries = countries;
            }
            let reports = run_batch(&cfg)
                .with_context(|| format!("reading {}", cfg.input_root.display()))?;

            let processed: usize = reports.iter().map(|r| r.processed()).sum();
            let skipped: usize = reports.iter().map(|r| r.skipped()).sum();
            info!(countries = reports.len(), processed, skipped, "batch complete");
            for report in &reports {
                println!(
                    "{:<24} processed {:>4}  skipped {:>4}  levels {:>2}  gas tables {:>3}",
                    report.country,
                    report.processed(),
                    report.skipped(),
                    report.combined.len(),
                    report.gas_tables.len()
                );
            }
        }

        Command::Show {
            country,
            level,
            gas,
            rows,
        } => {
            let Some(key) = PartitionKey::from_dir_name(&level) else {
                bail!("unknown level {level:?}");
            };
            let store = CachedStore::new(DatasetStore::new(&cfg.output_root), cfg.cache_entries);
            let frame = match &gas {
                Some(gas) => store.load_gas_level(&country, gas, key),
                None => store.load_level(&country, key),
            };
            match frame {
                Some(frame) => {
                    println!("{}", frame.head(rows));
                    if gas.is_none() {
                        println!("CO₂ column: {}", co2_column(&frame).unwrap_or("-"));
                        println!("other gases: {}", other_gas_columns(&frame).join(", "));
                    }
                }
                None => println!("data not available for {country} / {level}"),
            }
        }

        Command::Climate { dataset } => match dataset {
            ClimateDataset::Weather {
                input,
                output,
                hazards,
            } => {
                let frame = if hazards.is_empty() {
                    climate::process_extreme_weather(&input, Some(output.as_path()), climate::DEFAULT_HAZARDS)
                } else {
                    climate::process_extreme_weather(&input, Some(output.as_path()), &hazards)
                }
                .with_context(|| format!("processing {}", input.display()))?;
                println!("{} rows written to {}", frame.height(), output.display());
            }
            ClimateDataset::Emissions { input, output } => {
                let frame = climate::process_global_emissions(&input, Some(output.as_path()))
                    .with_context(|| format!("processing {}", input.display()))?;
                println!("{} rows written to {}", frame.height(), output.display());
            }
            ClimateDataset::Temperature {
                input,
                output,
                from,
                to,
            } => {
                let frame = climate::process_temperature_anomalies(&input, Some(output.as_path()), from..=to)
                    .with_context(|| format!("processing {}", input.display()))?;
                println!("{} rows written to {}", frame.height(), output.display());
            }
        },
    }

    Ok(())
}

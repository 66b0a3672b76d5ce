use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use run_scalars::config::ReportConfig;
use run_scalars::data::event_log::EventLog;
use run_scalars::data::filter::build_tidy_table;
use run_scalars::data::loader::{load_table, save_table};
use run_scalars::report::plot::plot_runs;
use run_scalars::report::summary::{format_report, summarize};

#[derive(Parser)]
#[command(name = "run-scalars")]
#[command(about = "Extract, summarize and compare scalar metrics from training event logs")]
struct Cli {
    /// JSON file overriding the default tags, metrics and plots
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Export scalars of one run directory as a tidy table
    Extract {
        /// Directory holding the run's events.out.tfevents.* files
        #[arg(long, alias = "run_dir")]
        run_dir: PathBuf,

        /// Tags to export; tags missing from the log are skipped
        #[arg(long, num_args = 1..)]
        tags: Vec<String>,

        /// Output table (.csv, .json or .parquet)
        #[arg(long, default_value = "run_scalars.csv")]
        output: PathBuf,
    },

    /// Overlay the curves of exactly three exported runs
    Plot {
        /// Exported tables, one per run
        #[arg(long, num_args = 1.., required = true)]
        csv: Vec<PathBuf>,

        /// Directory for the generated charts
        #[arg(long, alias = "out_dir", default_value = "report/plots")]
        out_dir: PathBuf,
    },

    /// Print the best value of each configured metric
    Summarize {
        /// Exported table of one run
        #[arg(long)]
        csv: PathBuf,
    },

    /// List the scalar tags available in a run directory
    Tags {
        #[arg(long, alias = "run_dir")]
        run_dir: PathBuf,
    },
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let config = ReportConfig::load_or_default(cli.config.as_deref())
        .context("loading report config")?;

    match cli.command {
        Command::Extract {
            run_dir,
            tags,
            output,
        } => {
            let tags = if tags.is_empty() {
                config.default_tags.clone()
            } else {
                tags
            };
            let log = EventLog::open(&run_dir)
                .with_context(|| format!("opening run {}", run_dir.display()))?;
            let table = build_tidy_table(&log, &tags)?;
            save_table(&table, &output)
                .with_context(|| format!("writing {}", output.display()))?;
            println!("Wrote {} rows to {}", table.len(), output.display());
        }
        Command::Plot { csv, out_dir } => {
            let written = plot_runs(&csv, &out_dir, &config).context("plotting runs")?;
            for path in written {
                println!("Saved {}", path.display());
            }
        }
        Command::Summarize { csv } => {
            let table = load_table(&csv).with_context(|| format!("reading {}", csv.display()))?;
            let entries = summarize(&table, &config.metrics);
            print!("{}", format_report(&csv.display().to_string(), &entries));
        }
        Command::Tags { run_dir } => {
            let log = EventLog::open(&run_dir)
                .with_context(|| format!("opening run {}", run_dir.display()))?;
            for tag in log.available_tags() {
                let count = log.scalars(tag).map_or(0, <[_]>::len);
                println!("{tag}\t{count}");
            }
        }
    }

    Ok(())
}

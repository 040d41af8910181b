mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use planbench_core::{Backend, Config};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, env = "PLANBENCH_LOG")]
    log_level: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the placeholders of a query template
    Params {
        template: PathBuf,
    },
    /// Print every query of a template sweep
    Expand {
        template: PathBuf,
        /// `name=start,end,step` or `name=value`; one per placeholder
        #[arg(short, long = "range")]
        ranges: Vec<String>,
    },
    /// Normalize a saved EXPLAIN ANALYZE output
    Parse {
        #[arg(short, long)]
        backend: Backend,
        #[arg(short, long = "filter")]
        filters: Vec<String>,
        plan: PathBuf,
    },
    /// Run every job of a jobs file and export the results
    Run {
        #[arg(short, long)]
        jobs: PathBuf,
        /// Single config file; replaces the layered lookup
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Directory whose `*.toml` files are merged over the standard layers
        #[arg(long, env = "PLANBENCH_CONFIG_DIR")]
        config_dir: Option<PathBuf>,
        #[arg(short, long, default_value = "results.json")]
        output: PathBuf,
        /// Also write one file per batch into this directory
        #[arg(long)]
        batches_dir: Option<PathBuf>,
        /// Print Prometheus metrics after the run
        #[arg(long)]
        metrics: bool,
    },
}

fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let args = Args::parse();

    match args.command {
        Command::Params { template } => {
            init_tracing(args.log_level.as_deref().unwrap_or("warn"), args.log_json);
            commands::params(&template)
        }
        Command::Expand { template, ranges } => {
            init_tracing(args.log_level.as_deref().unwrap_or("warn"), args.log_json);
            commands::expand(&template, &ranges)
        }
        Command::Parse { backend, filters, plan } => {
            init_tracing(args.log_level.as_deref().unwrap_or("warn"), args.log_json);
            commands::parse(backend, &filters, &plan)
        }
        Command::Run {
            jobs,
            config,
            config_dir,
            output,
            batches_dir,
            metrics,
        } => {
            let config = match config {
                Some(path) => Config::load(&path)?,
                None => Config::discover(&std::env::current_dir()?, config_dir.as_deref())?,
            };
            let level = args.log_level.as_deref().unwrap_or(&config.logging.level);
            init_tracing(level, args.log_json || config.logging.json);

            commands::run(&config, &jobs, &output, batches_dir.as_deref()).await?;
            if metrics {
                print!("{}", planbench_core::metrics::render());
            }
            Ok(())
        }
    }
}

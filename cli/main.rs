#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

use clap::{Args, CommandFactory, Parser, Subcommand};
use std::path::PathBuf;
use std::process;

use augur::config::RunConfig;
use augur::lexicon::Lexicon;
use augur::orchestrator::{Collaborators, run_locations};
use augur::report::DirectoryReportSink;
use augur::sources::{CsvDocumentSource, CsvEpiSource, StaticGazetteer};

#[derive(Parser)]
#[command(
    name = "augur",
    about = "Forecast healthcare demand from social-media sentiment",
    long_about = "Scores geotagged posts against a positivity lexicon, measures how the daily \
                 sentiment signal relates to cases and hospitalizations, forecasts both \
                 conditioned on forecast sentiment, and kriges sentiment and hospitalization \
                 risk across the region."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args)]
struct RunArgs {
    /// Run configuration TOML files, one per location
    #[arg(value_name = "CONFIG", required = true)]
    configs: Vec<PathBuf>,

    /// Documents CSV (author_id,document_id,timestamp,text,popularity_count,coordinates)
    #[arg(long, value_name = "PATH")]
    documents: PathBuf,

    /// Epidemiological CSV (date,new_cases,cumulative_hospitalizations)
    #[arg(long, value_name = "PATH")]
    epi: PathBuf,

    /// Lexicon file (word,positivity[,affect]); tab-separated when it ends in .tsv or .txt
    #[arg(long, value_name = "PATH")]
    lexicon: PathBuf,

    /// Directory receiving one report subdirectory per location
    #[arg(long, value_name = "DIR", default_value = "reports")]
    output: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline for one or more locations
    #[command(about = "Run the pipeline (outputs: <output>/<location>/)")]
    Run(RunArgs),

    /// Write a configuration file populated with defaults
    #[command(about = "Write a default run configuration (outputs: config.toml)")]
    InitConfig {
        #[arg(value_name = "PATH", default_value = "config.toml")]
        path: PathBuf,
    },

    /// Display version information
    Version,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let Cli { command } = Cli::parse();
    let result = match command {
        Some(Commands::Run(args)) => run(args),
        Some(Commands::InitConfig { path }) => init_config(path),
        Some(Commands::Version) => {
            println!("augur {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        None => {
            let _ = Cli::command().print_help();
            println!();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn init_config(path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    RunConfig::default().save(&path)?;
    println!("Wrote default configuration to '{}'.", path.display());
    Ok(())
}

fn run(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let configs = args
        .configs
        .iter()
        .map(|p| RunConfig::load(p))
        .collect::<Result<Vec<_>, _>>()?;
    let lexicon = Lexicon::load(&args.lexicon)?;
    log::info!("Loaded lexicon with {} entries.", lexicon.len());

    let documents = CsvDocumentSource::new(&args.documents);
    let epi = CsvEpiSource::new(&args.epi);
    let gazetteer = StaticGazetteer::builtin();
    let sink = DirectoryReportSink::new(&args.output);
    let collaborators = Collaborators {
        documents: &documents,
        epi: &epi,
        gazetteer: &gazetteer,
    };

    let results = run_locations(&configs, &lexicon, collaborators, &sink);
    let failed: Vec<&str> = results
        .iter()
        .filter(|(_, r)| r.is_err())
        .map(|(name, _)| name.as_str())
        .collect();
    println!(
        "{} of {} locations completed. Reports are in '{}'.",
        results.len() - failed.len(),
        results.len(),
        args.output.display()
    );
    if failed.is_empty() {
        Ok(())
    } else {
        Err(format!("runs failed for: {}", failed.join(", ")).into())
    }
}

use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;
use tracing::{error, info};

use survey_import_service::config::Config;
use survey_import_service::error::ImportError;
use survey_import_service::import::ImportCoordinator;
use survey_import_service::ingest::survey123::SurveyFeed;
use survey_import_service::logging::{ImportLog, init_logger};
use survey_import_service::pipeline::run_district;
use survey_import_service::points::PgPointDirectory;
use survey_import_service::store::PgMeasurementStore;

#[derive(Parser, Debug)]
#[command(name = "survey-import")]
#[command(about = "Import Survey123 discharge measurements into the water master data table")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Args {
    /// Configuration file
    #[arg(short, long, default_value = "survey_import.toml")]
    config: PathBuf,

    /// Import only this water district
    #[arg(short, long)]
    district: Option<String>,

    /// Roll back every district instead of committing
    #[arg(long)]
    dry_run: bool,
}

fn main() {
    let args = Args::parse();

    let config = Config::load(&args.config).unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        process::exit(1);
    });

    let log_file = config.logging.file.as_deref().map(Path::new);
    if let Err(e) = init_logger(config.logging.level, log_file, config.logging.console_timestamps) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }

    if let Err(e) = run(&args, &config) {
        error!("{}", e);
        process::exit(1);
    }
}

fn run(args: &Args, config: &Config) -> Result<(), ImportError> {
    let database_url = config.database_url()?;
    let mut directory = PgPointDirectory::connect(&database_url)?;
    let store = PgMeasurementStore::connect(&database_url)?;
    let mut coordinator = ImportCoordinator::new(store).with_dry_run(args.dry_run);
    info!(today = %coordinator.today(), dry_run = args.dry_run, "starting survey import");

    let mut log = ImportLog::new();
    for (district, survey) in &config.surveys {
        if args.district.as_ref().is_some_and(|only| only != district) {
            continue;
        }

        let outcome = config
            .host_for(survey)
            .map_err(ImportError::from)
            .and_then(|host| SurveyFeed::connect(host, survey).map_err(ImportError::from))
            .and_then(|mut feed| {
                run_district(
                    district,
                    &mut feed,
                    &mut directory,
                    &mut coordinator,
                    &config.registration_id,
                )
            });

        match outcome {
            Ok(result) => log.add_result(district, result),
            Err(e) => log.add_failure(district, e),
        }
    }
    log.finalize();
    Ok(())
}

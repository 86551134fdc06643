use std::process;

use clap::{Arg, App};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod config;
use config::PipelineConfig;

mod error;
use error::{ConfigError, Error};

mod fetch;
use fetch::Timeouts;

mod pipeline;
use pipeline::RunOptions;

fn command_usage<'a, 'b>() -> App<'a, 'b> {
    const DEFAULT_CONFIG: &str = "config/sources.toml";
    const DEFAULT_PIPELINE: &str = "usa";
    const HTTP_CONNECT_TIMEOUT: &str = "30000";
    const HTTP_RECEIVE_TIMEOUT: &str = "120000"; // the confirmed series grows by a column a day

    App::new("covid-merge")
    .author("Matthew Scheffel <mscheffel@gmail.com>")
    .about("Downloads county COVID-19 series and merges them into one wide CSV")
    .arg(
        Arg::with_name("pipeline")
            .takes_value(true)
            .possible_values(&["usa", "global", "all"])
            .default_value(DEFAULT_PIPELINE)
            .help("Which pipeline to run: `usa` (counties), `global` (counties with state names), or `all`")
    )
    .arg(
        Arg::with_name("config")
            .short("c")
            .long("config")
            .takes_value(true)
            .default_value(DEFAULT_CONFIG)
            .help("Location of the sources configuration. Built-in endpoints are used if it does not exist. Source, lookup and output paths in it are relative to the working directory.")
    )
    .arg(
        Arg::with_name("skip-download")
            .short("s")
            .long("skip-download")
            .takes_value(false)
            .help("Merge the CSV files already present in the working directory instead of downloading them")
    )
    .arg(
        Arg::with_name("http-connect-timeout")
            .long("http-connect-timeout")
            .takes_value(true)
            .default_value(HTTP_CONNECT_TIMEOUT)
            .help("HTTP connection timeout in milliseconds.")
    )
    .arg(
        Arg::with_name("http-receive-timeout")
            .long("http-receive-timeout")
            .takes_value(true)
            .default_value(HTTP_RECEIVE_TIMEOUT)
            .help("HTTP receive timeout in milliseconds.")
    )
    .arg(
        Arg::with_name("verbose")
            .short("v")
            .long("verbose")
            .takes_value(false)
            .help("Log at debug level unless RUST_LOG says otherwise")
    )
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

fn parse_timeout(matches: &clap::ArgMatches, name: &str) -> Result<u64, String> {
    let value = matches.value_of(name).unwrap_or_default();
    value.parse::<u64>().map_err(|_| format!("Invalid {} specified: '{}'", name, value))
}

fn run(matches: &clap::ArgMatches) -> Result<(), Error> {
    let config_path = matches.value_of("config").unwrap_or_default();
    let pipelines = config::load(config_path)?;

    let selected: Vec<&str> = match matches.value_of("pipeline").unwrap_or_default() {
        "all" => vec!["usa", "global"],
        name => vec![name],
    };

    let options = RunOptions {
        download: !matches.is_present("skip-download"),
        timeouts: Timeouts {
            connect: parse_timeout(matches, "http-connect-timeout").map_err(ConfigError::Invalid)?,
            read: parse_timeout(matches, "http-receive-timeout").map_err(ConfigError::Invalid)?,
        },
    };

    for name in selected {
        let current: &PipelineConfig = pipelines.get(name).ok_or_else(|| ConfigError::UnknownPipeline(name.to_owned()))?;
        let summary = pipeline::run(name, current, options)?;
        info!(pipeline = name, rows = summary.data_rows, truncated = summary.truncated, output = %current.output, "done");
    }

    Ok(())
}

fn main() {
    let matches = command_usage().get_matches();
    init_logging(matches.is_present("verbose"));

    if let Err(e) = run(&matches) {
        error!("{}", e);
        process::exit(1);
    }
}

#[test]
fn test_command_usage_defaults() {
    let matches = command_usage().get_matches_from(vec!["covid-merge"]);

    assert_eq!(matches.value_of("pipeline"), Some("usa"));
    assert_eq!(matches.value_of("config"), Some("config/sources.toml"));
    assert!(!matches.is_present("skip-download"));
    assert_eq!(parse_timeout(&matches, "http-connect-timeout"), Ok(30000));
}

#[test]
fn test_command_usage_rejects_unknown_pipeline() {
    let result = command_usage().get_matches_from_safe(vec!["covid-merge", "europe"]);
    assert!(result.is_err());
}

#[test]
fn test_invalid_timeout() {
    let matches = command_usage().get_matches_from(vec!["covid-merge", "--http-receive-timeout", "soon"]);
    assert!(parse_timeout(&matches, "http-receive-timeout").is_err());
}

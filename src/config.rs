use std::collections::HashMap;
use std::fs;

use serde::Deserialize;

use crate::error::ConfigError;

const USAFACTS_BASE_URL: &str = "https://usafactsstatic.blob.core.windows.net/public/data/covid-19";
const JHU_GLOBAL_CONFIRMED_URL: &str = "https://raw.githubusercontent.com/CSSEGISandData/COVID-19/master/csse_covid_19_data/csse_covid_19_time_series/time_series_covid19_confirmed_global.csv";

#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    Domestic, // county rows only
    Extended, // adds the state full name column, requires a lookup file
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct SourceConfig {
    pub url: String,
    pub file: String, // local path the download lands in, relative to the working directory
}

#[derive(Deserialize, Debug, Clone)]
pub struct PipelineConfig {
    pub description: String,
    pub variant: Variant,
    pub output: String,
    pub lookup: Option<String>, // abbreviation file, only read by extended pipelines
    pub confirmed: SourceConfig,
    pub deaths: SourceConfig,
    pub population: SourceConfig,
    #[serde(default)]
    pub extra: Vec<SourceConfig>, // downloaded alongside, never merged
}

fn usafacts(file: &str) -> SourceConfig {
    SourceConfig {
        url: format!("{}/{}", USAFACTS_BASE_URL, file),
        file: file.to_owned(),
    }
}

impl PipelineConfig {
    pub fn usa() -> PipelineConfig {
        PipelineConfig {
            description: "USAFacts county confirmed cases, deaths and population".to_owned(),
            variant: Variant::Domestic,
            output: "covid_all.csv".to_owned(),
            lookup: None,
            confirmed: usafacts("covid_confirmed_usafacts.csv"),
            deaths: usafacts("covid_deaths_usafacts.csv"),
            population: usafacts("covid_county_population_usafacts.csv"),
            extra: Vec::new(),
        }
    }

    pub fn global() -> PipelineConfig {
        PipelineConfig {
            description: "USAFacts county data with state names, plus the JHU global series".to_owned(),
            variant: Variant::Extended,
            output: "covid_usa.csv".to_owned(),
            lookup: Some("stateAbbreviations.csv".to_owned()),
            confirmed: usafacts("covid_confirmed_usafacts.csv"),
            deaths: usafacts("covid_deaths_usafacts.csv"),
            population: usafacts("covid_county_population_usafacts.csv"),
            extra: vec![SourceConfig {
                url: JHU_GLOBAL_CONFIRMED_URL.to_owned(),
                file: "time_series_covid19_confirmed_global.csv".to_owned(),
            }],
        }
    }

    /// Every source in download order: the three merged inputs first, then the extras.
    pub fn sources(&self) -> Vec<&SourceConfig> {
        let mut sources = vec![&self.confirmed, &self.deaths, &self.population];
        sources.extend(self.extra.iter());
        sources
    }

    pub fn validate(&self, name: &str) -> Result<(), ConfigError> {
        if self.variant == Variant::Extended && self.lookup.is_none() {
            return Err(ConfigError::MissingLookup(name.to_owned()));
        }
        Ok(())
    }
}

pub fn defaults() -> HashMap<String, PipelineConfig> {
    let mut pipelines = HashMap::new();
    pipelines.insert("usa".to_owned(), PipelineConfig::usa());
    pipelines.insert("global".to_owned(), PipelineConfig::global());
    pipelines
}

pub fn parse(text: &str) -> Result<HashMap<String, PipelineConfig>, ConfigError> {
    let pipelines: HashMap<String, PipelineConfig> = toml::from_str(text)?;
    for (name, pipeline) in &pipelines {
        pipeline.validate(name)?;
    }
    Ok(pipelines)
}

/// Reads the sources configuration, falling back to the built-in endpoints when the
/// file does not exist. A file that exists but fails to parse is an error.
pub fn load(path: &str) -> Result<HashMap<String, PipelineConfig>, ConfigError> {
    match fs::read_to_string(path) {
        Ok(text) => parse(&text),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(path, "sources configuration not found, using built-in endpoints");
            Ok(defaults())
        },
        Err(e) => Err(ConfigError::Read { path: path.to_owned(), source: e }),
    }
}

#[test]
fn test_parse_sources() {
    let text = r#"
        [usa]
        description = "counties"
        variant = "domestic"
        output = "out.csv"
        confirmed = { url = "http://localhost/c.csv", file = "c.csv" }
        deaths = { url = "http://localhost/d.csv", file = "d.csv" }
        population = { url = "http://localhost/p.csv", file = "p.csv" }

        [global]
        description = "counties with states"
        variant = "extended"
        output = "out_ext.csv"
        lookup = "abbr.csv"
        confirmed = { url = "http://localhost/c.csv", file = "c.csv" }
        deaths = { url = "http://localhost/d.csv", file = "d.csv" }
        population = { url = "http://localhost/p.csv", file = "p.csv" }
        extra = [{ url = "http://localhost/g.csv", file = "g.csv" }]
    "#;

    let pipelines = parse(text).unwrap();
    assert_eq!(pipelines["usa"].variant, Variant::Domestic);
    assert!(pipelines["usa"].extra.is_empty());
    assert_eq!(pipelines["global"].variant, Variant::Extended);
    assert_eq!(pipelines["global"].lookup.as_deref(), Some("abbr.csv"));

    let files: Vec<&str> = pipelines["global"].sources().iter().map(|s| s.file.as_str()).collect();
    assert_eq!(files, vec!["c.csv", "d.csv", "p.csv", "g.csv"]);
}

#[test]
fn test_extended_requires_lookup() {
    let text = r#"
        [global]
        description = "no lookup"
        variant = "extended"
        output = "out.csv"
        confirmed = { url = "http://localhost/c.csv", file = "c.csv" }
        deaths = { url = "http://localhost/d.csv", file = "d.csv" }
        population = { url = "http://localhost/p.csv", file = "p.csv" }
    "#;

    match parse(text) {
        Err(ConfigError::MissingLookup(name)) => assert_eq!(name, "global"),
        other => panic!("expected missing lookup error, got {:?}", other),
    }
}

#[test]
fn test_defaults_are_valid() {
    for (name, pipeline) in defaults() {
        pipeline.validate(&name).unwrap();
    }
    assert_eq!(PipelineConfig::usa().output, "covid_all.csv");
    assert_eq!(PipelineConfig::global().sources().len(), 4);
}

#[test]
fn test_shipped_config_parses() {
    let text = fs::read_to_string("config/sources.toml").unwrap();
    let pipelines = parse(&text).unwrap();
    assert_eq!(pipelines["usa"].confirmed, PipelineConfig::usa().confirmed);
    assert_eq!(pipelines["global"].variant, Variant::Extended);
    assert_eq!(pipelines["global"].lookup, PipelineConfig::global().lookup);
}

#[test]
fn test_default_lookup_is_in_working_directory() {
    let lookup = PipelineConfig::global().lookup.unwrap();

    assert_eq!(lookup, "stateAbbreviations.csv");
    assert!(std::path::Path::new(&lookup).exists());
}

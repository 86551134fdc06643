use std::fs::File;
use std::io;

use tracing::{info, warn};

pub mod lookup;
pub mod merger;

use crate::config::{PipelineConfig, Variant};
use crate::error::{ConfigError, Error, MergeError, Result};
use crate::fetch::{self, Timeouts};

use lookup::NameLookup;
use merger::RowMerger;

#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    pub download: bool,
    pub timeouts: Timeouts,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MergeSummary {
    pub data_rows: usize,
    pub truncated: bool, // a source still had rows when another ran out
}

fn csv_reader<R: io::Read>(input: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(input)
}

fn open(path: &str) -> Result<File> {
    File::open(path).map_err(|e| Error::Open { path: path.to_owned(), source: csv::Error::from(e) })
}

/// Streams the three sources in lockstep into `output`. The first aligned triple is the
/// header; every later triple is a data row. Stops as soon as any source runs out.
pub fn merge_streams<C, P, D, W>(confirmed: C, population: P, deaths: D, output: W, merger: &RowMerger) -> std::result::Result<MergeSummary, MergeError>
where
    C: io::Read,
    P: io::Read,
    D: io::Read,
    W: io::Write,
{
    let mut confirmed = csv_reader(confirmed).into_records();
    let mut population = csv_reader(population).into_records();
    let mut deaths = csv_reader(deaths).into_records();
    let mut writer = csv::WriterBuilder::new().flexible(true).from_writer(output);

    let mut summary = MergeSummary::default();
    let mut is_header = true;

    loop {
        let (c, p, d) = match (confirmed.next(), population.next(), deaths.next()) {
            (Some(c), Some(p), Some(d)) => (c?, p?, d?),
            (c, p, d) => {
                let (confirmed_left, population_left, deaths_left) = (c.is_some(), p.is_some(), d.is_some());
                // a read failure on the last step is still fatal, only a clean end is truncation
                for record in vec![c, p, d].into_iter().flatten() {
                    record?;
                }
                if confirmed_left || population_left || deaths_left {
                    warn!(
                        confirmed_left,
                        population_left,
                        deaths_left,
                        "sources differ in length, output truncated at the shortest"
                    );
                    summary.truncated = true;
                }
                break;
            },
        };

        let c: Vec<&str> = c.iter().collect();
        let p: Vec<&str> = p.iter().collect();
        let d: Vec<&str> = d.iter().collect();

        let row = merger.merge_row(&c, &p, &d, is_header)?;
        writer.write_record(&row)?;

        if is_header {
            is_header = false;
        } else {
            summary.data_rows += 1;
        }
    }

    writer.flush().map_err(csv::Error::from)?;
    Ok(summary)
}

/// Downloads (optionally), then merges one pipeline into its output file.
pub fn run(name: &str, config: &PipelineConfig, options: RunOptions) -> Result<MergeSummary> {
    config.validate(name)?;
    info!(pipeline = name, "{}", config.description);

    if options.download {
        fetch::fetch_pipeline(config, options.timeouts)?;
    } else {
        info!(pipeline = name, "skipping download, using files already present");
    }

    let names = match config.variant {
        Variant::Extended => {
            let path = config.lookup.as_ref().ok_or_else(|| ConfigError::MissingLookup(name.to_owned()))?;
            let names = NameLookup::from_path(path)?;
            info!(path = %path, states = names.len(), "loaded state names");
            Some(names)
        },
        Variant::Domestic => None,
    };

    let merger = match &names {
        Some(names) => RowMerger::extended(names),
        None => RowMerger::domestic(),
    };

    let confirmed = open(&config.confirmed.file)?;
    let population = open(&config.population.file)?;
    let deaths = open(&config.deaths.file)?;
    let output = File::create(&config.output)
        .map_err(|e| Error::Open { path: config.output.clone(), source: csv::Error::from(e) })?;

    info!(output = %config.output, "merging CSVs");
    let summary = merge_streams(confirmed, population, deaths, io::BufWriter::new(output), &merger)?;
    info!(output = %config.output, rows = summary.data_rows, "CSV processing complete");

    Ok(summary)
}

#[cfg(test)]
const CONFIRMED: &str = "countyFIPS,County Name,State,stateFIPS,1/22/20,1/23/20,1/24/20
1001,Autauga County,AL,1,5,5,8
1003,Baldwin County,AL,1,0,2,2
2013,Aleutians East Borough,AK,2,1,1,0
";

#[cfg(test)]
const POPULATION: &str = "countyFIPS,County Name,State,population
1001,Autauga County,AL,55869
1003,Baldwin County,AL,223234
2013,Aleutians East Borough,AK,3337
";

#[cfg(test)]
const DEATHS: &str = "countyFIPS,County Name,State,stateFIPS,1/22/20,1/23/20,1/24/20
1001,Autauga County,AL,1,0,0,1
1003,Baldwin County,AL,1,0,0,0
2013,Aleutians East Borough,AK,2,0,0,0
";

#[cfg(test)]
fn merge_to_string(confirmed: &str, population: &str, deaths: &str, merger: &RowMerger) -> (String, MergeSummary) {
    let mut output = Vec::new();
    let summary = merge_streams(confirmed.as_bytes(), population.as_bytes(), deaths.as_bytes(), &mut output, merger).unwrap();
    (String::from_utf8(output).unwrap(), summary)
}

#[test]
fn test_merge_streams_domestic() {
    let (output, summary) = merge_to_string(CONFIRMED, POPULATION, DEATHS, &RowMerger::domestic());

    assert_eq!(summary, MergeSummary { data_rows: 3, truncated: false });
    let lines: Vec<&str> = output.lines().collect();
    assert_eq!(lines.len(), 4);
    assert_eq!(lines[0], "countyFIPS,County Name,State,stateFIPS,population,\
        confirmed_1/22/20,confirmed_1/23/20,confirmed_1/24/20,\
        deaths_1/22/20,deaths_1/23/20,deaths_1/24/20,\
        newconfirmed_1/22/20,newconfirmed_1/23/20,newconfirmed_1/24/20,\
        newdeaths_1/22/20,newdeaths_1/23/20,newdeaths_1/24/20");
    assert_eq!(lines[1], "1001,Autauga County,AL,1,55869,5,5,8,0,0,1,5,0,3,0,0,1");
    assert_eq!(lines[3], "2013,Aleutians East Borough,AK,2,3337,1,1,0,0,0,0,1,0,-1,0,0,0");

    let header_width = lines[0].split(',').count();
    for line in &lines[1..] {
        assert_eq!(line.split(',').count(), header_width);
    }
}

#[test]
fn test_merge_streams_extended() {
    let names = NameLookup::from_rows(vec![vec!["Alabama", "AL"], vec!["Alaska", "AK"]]).unwrap();
    let (output, summary) = merge_to_string(CONFIRMED, POPULATION, DEATHS, &RowMerger::extended(&names));

    assert_eq!(summary.data_rows, 3);
    let lines: Vec<&str> = output.lines().collect();
    assert!(lines[0].starts_with("countyFIPS,County Name,State,stateFIPS,stateName,population,confirmed_1/22/20"));
    assert_eq!(lines[1], "1001,Autauga County,AL,1,Alabama,55869,5,5,8,0,0,1,5,0,3,0,0,1");
    assert!(lines[3].starts_with("2013,Aleutians East Borough,AK,2,Alaska,3337,"));
}

#[test]
fn test_merge_stops_at_shortest_source() {
    let short_population: String = POPULATION.lines().take(3).map(|l| format!("{}\n", l)).collect();
    let (output, summary) = merge_to_string(CONFIRMED, &short_population, DEATHS, &RowMerger::domestic());

    assert_eq!(summary, MergeSummary { data_rows: 2, truncated: true });
    assert_eq!(output.lines().count(), 3);
}

#[test]
fn test_merge_empty_source() {
    let (output, summary) = merge_to_string(CONFIRMED, "", DEATHS, &RowMerger::domestic());

    assert_eq!(summary.data_rows, 0);
    assert!(summary.truncated);
    assert!(output.is_empty());
}

#[test]
fn test_read_error_where_another_source_ends() {
    let mut confirmed = CONFIRMED.as_bytes().to_vec();
    let start = CONFIRMED.find("2013,Aleutians").unwrap();
    confirmed[start + "2013,".len()] = 0xff;
    let short_population: String = POPULATION.lines().take(3).map(|l| format!("{}\n", l)).collect();

    let mut output = Vec::new();
    let result = merge_streams(&confirmed[..], short_population.as_bytes(), DEATHS.as_bytes(), &mut output, &RowMerger::domestic());

    match result {
        Err(MergeError::Csv(_)) => {},
        other => panic!("expected csv error, got {:?}", other),
    }
}

#[test]
fn test_merge_is_deterministic() {
    let (first, _) = merge_to_string(CONFIRMED, POPULATION, DEATHS, &RowMerger::domestic());
    let (second, _) = merge_to_string(CONFIRMED, POPULATION, DEATHS, &RowMerger::domestic());

    assert_eq!(first, second);
}

#[test]
fn test_merge_propagates_parse_error() {
    let bad_deaths = DEATHS.replace("1003,Baldwin County,AL,1,0,0,0", "1003,Baldwin County,AL,1,0,x,0");
    let mut output = Vec::new();
    let result = merge_streams(CONFIRMED.as_bytes(), POPULATION.as_bytes(), bad_deaths.as_bytes(), &mut output, &RowMerger::domestic());

    match result {
        Err(MergeError::Parse { value, column, .. }) => {
            assert_eq!(value, "x");
            assert_eq!(column, 1);
        },
        other => panic!("expected parse error, got {:?}", other),
    }
}

#[test]
fn test_run_without_download() {
    use crate::config::SourceConfig;

    let dir = tempfile::tempdir().unwrap();
    let path = |name: &str| dir.path().join(name).to_string_lossy().into_owned();
    let source = |name: &str, body: &str| {
        std::fs::write(path(name), body).unwrap();
        SourceConfig { url: format!("http://localhost/{}", name), file: path(name) }
    };

    std::fs::write(path("abbr.csv"), "Alabama,AL\nAlaska,AK\n").unwrap();

    let config = PipelineConfig {
        description: "test".to_owned(),
        variant: Variant::Extended,
        output: path("covid_usa.csv"),
        lookup: Some(path("abbr.csv")),
        confirmed: source("confirmed.csv", CONFIRMED),
        deaths: source("deaths.csv", DEATHS),
        population: source("population.csv", POPULATION),
        extra: Vec::new(),
    };
    let options = RunOptions { download: false, timeouts: Timeouts { connect: 1000, read: 1000 } };

    let summary = run("global", &config, options).unwrap();
    assert_eq!(summary.data_rows, 3);

    let written = std::fs::read_to_string(path("covid_usa.csv")).unwrap();
    assert_eq!(written.lines().nth(2).unwrap(), "1003,Baldwin County,AL,1,Alabama,223234,0,2,2,0,0,0,0,2,0,0,0,0");
}

#[test]
fn test_run_missing_input_file() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = PipelineConfig::usa();
    config.confirmed.file = dir.path().join("absent.csv").to_string_lossy().into_owned();
    config.output = dir.path().join("out.csv").to_string_lossy().into_owned();
    let options = RunOptions { download: false, timeouts: Timeouts { connect: 1000, read: 1000 } };

    match run("usa", &config, options) {
        Err(Error::Open { path, .. }) => assert!(path.ends_with("absent.csv")),
        other => panic!("expected open error, got {:?}", other),
    }
}

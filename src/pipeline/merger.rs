use crate::error::MergeError;
use super::lookup::NameLookup;

/// Columns before the first date in confirmed and deaths rows:
/// countyFIPS, County Name, State, stateFIPS.
pub const PREFIX_COLUMNS: usize = 4;
/// Population rows are countyFIPS, County Name, State, population.
pub const POPULATION_COLUMN: usize = 3;

pub const STATE_NAME_LABEL: &str = "stateName";

pub const CONFIRMED_PREFIX: &str = "confirmed_";
pub const DEATHS_PREFIX: &str = "deaths_";
pub const NEW_CONFIRMED_PREFIX: &str = "newconfirmed_";
pub const NEW_DEATHS_PREFIX: &str = "newdeaths_";

fn require(row: &[&str], kind: &'static str, expected: usize) -> Result<(), MergeError> {
    if row.len() < expected {
        return Err(MergeError::MalformedRow { kind, expected, found: row.len() });
    }
    Ok(())
}

fn parse_cumulative(value: &str, column: usize) -> Result<i64, MergeError> {
    value.trim().parse::<i64>().map_err(|e| MergeError::Parse {
        value: value.to_owned(),
        column,
        source: e,
    })
}

/// Day-over-day differences of a cumulative series. The first entry has no previous
/// day, so it is the cumulative value itself, copied as text.
pub fn deltas(cumulative: &[&str]) -> Result<Vec<String>, MergeError> {
    let mut result = Vec::with_capacity(cumulative.len());

    for i in 0..cumulative.len() {
        if i == 0 {
            result.push(cumulative[0].to_owned());
        } else {
            let current = parse_cumulative(cumulative[i], i)?;
            let previous = parse_cumulative(cumulative[i - 1], i - 1)?;
            let delta = current
                .checked_sub(previous)
                .ok_or(MergeError::Overflow { column: i, current, previous })?;
            result.push(delta.to_string());
        }
    }

    Ok(result)
}

/// Builds one output row from an aligned triple of confirmed, population and deaths rows.
///
/// Without a [`NameLookup`] the output is the domestic layout:
/// `countyFIPS, County Name, State, stateFIPS, population`. With one, the state's full
/// name is inserted before the population column. Either way the identifying columns
/// are followed by four blocks, one entry per date: cumulative confirmed, cumulative
/// deaths, new confirmed, new deaths.
#[derive(Debug, Clone, Copy, Default)]
pub struct RowMerger<'a> {
    names: Option<&'a NameLookup>,
}

impl<'a> RowMerger<'a> {
    pub fn domestic() -> RowMerger<'a> {
        RowMerger { names: None }
    }

    pub fn extended(names: &'a NameLookup) -> RowMerger<'a> {
        RowMerger { names: Some(names) }
    }

    /// Number of columns ahead of the date blocks.
    pub fn identifying_columns(&self) -> usize {
        match self.names {
            Some(_) => PREFIX_COLUMNS + 2,
            None => PREFIX_COLUMNS + 1,
        }
    }

    pub fn merge_row(&self, confirmed: &[&str], population: &[&str], deaths: &[&str], is_header: bool) -> Result<Vec<String>, MergeError> {
        if is_header {
            self.header_row(confirmed, population)
        } else {
            self.data_row(confirmed, population, deaths)
        }
    }

    fn identifying(&self, confirmed: &[&str], population: &[&str], state_name: Option<&str>, date_count: usize) -> Vec<String> {
        let mut row = Vec::with_capacity(self.identifying_columns() + 4 * date_count);
        row.extend(confirmed[..PREFIX_COLUMNS].iter().map(|s| s.to_string()));
        if let Some(name) = state_name {
            row.push(name.to_owned());
        }
        row.push(population[POPULATION_COLUMN].to_owned());
        row
    }

    pub fn header_row(&self, confirmed: &[&str], population: &[&str]) -> Result<Vec<String>, MergeError> {
        require(confirmed, "confirmed header", PREFIX_COLUMNS + 1)?;
        require(population, "population header", POPULATION_COLUMN + 1)?;

        let state_name = self.names.map(|_| STATE_NAME_LABEL);
        let dates = &confirmed[PREFIX_COLUMNS..];

        let mut row = self.identifying(confirmed, population, state_name, dates.len());
        for prefix in &[CONFIRMED_PREFIX, DEATHS_PREFIX, NEW_CONFIRMED_PREFIX, NEW_DEATHS_PREFIX] {
            row.extend(dates.iter().map(|date| format!("{}{}", prefix, date)));
        }

        Ok(row)
    }

    pub fn data_row(&self, confirmed: &[&str], population: &[&str], deaths: &[&str]) -> Result<Vec<String>, MergeError> {
        require(confirmed, "confirmed", PREFIX_COLUMNS)?;
        require(population, "population", POPULATION_COLUMN + 1)?;

        let confirmed_cases = &confirmed[PREFIX_COLUMNS..];
        let date_count = confirmed_cases.len();
        require(deaths, "deaths", PREFIX_COLUMNS + date_count)?;
        let deaths_cases = &deaths[PREFIX_COLUMNS..PREFIX_COLUMNS + date_count];

        let state_name = match self.names {
            Some(names) => Some(names.get(confirmed[2])?),
            None => None,
        };

        let new_cases = deltas(confirmed_cases)?;
        let new_deaths = deltas(deaths_cases)?;

        let mut row = self.identifying(confirmed, population, state_name, date_count);
        row.extend(confirmed_cases.iter().map(|s| s.to_string()));
        row.extend(deaths_cases.iter().map(|s| s.to_string()));
        row.extend(new_cases);
        row.extend(new_deaths);

        Ok(row)
    }
}

#[test]
fn test_deltas() {
    assert_eq!(deltas(&["5", "5", "8"]).unwrap(), vec!["5", "0", "3"]);
    assert_eq!(deltas(&["10", "7"]).unwrap(), vec!["10", "-3"]);
    assert!(deltas(&[]).unwrap().is_empty());
}

#[test]
fn test_first_delta_is_copied_verbatim() {
    // only later columns are parsed, and index 0 only as the previous value of index 1
    assert_eq!(deltas(&["n/a"]).unwrap(), vec!["n/a"]);
    assert_eq!(deltas(&[" 4", "6 "]).unwrap(), vec![" 4", "2"]);
}

#[test]
fn test_delta_parse_error() {
    match deltas(&["1", "2", "x"]) {
        Err(MergeError::Parse { value, column, .. }) => {
            assert_eq!(value, "x");
            assert_eq!(column, 2);
        },
        other => panic!("expected parse error, got {:?}", other),
    }
}

#[test]
fn test_delta_overflow() {
    match deltas(&["-9223372036854775808", "9223372036854775807"]) {
        Err(MergeError::Overflow { column, current, previous }) => {
            assert_eq!(column, 1);
            assert_eq!(current, i64::MAX);
            assert_eq!(previous, i64::MIN);
        },
        other => panic!("expected overflow error, got {:?}", other),
    }
}

#[test]
fn test_domestic_header() {
    let merger = RowMerger::domestic();
    let confirmed = ["countyFIPS", "County Name", "State", "stateFIPS", "1/22/20", "1/23/20"];
    let population = ["countyFIPS", "County Name", "State", "population"];

    let row = merger.merge_row(&confirmed, &population, &[], true).unwrap();
    assert_eq!(row, vec![
        "countyFIPS", "County Name", "State", "stateFIPS", "population",
        "confirmed_1/22/20", "confirmed_1/23/20",
        "deaths_1/22/20", "deaths_1/23/20",
        "newconfirmed_1/22/20", "newconfirmed_1/23/20",
        "newdeaths_1/22/20", "newdeaths_1/23/20",
    ]);
    assert_eq!(row.len(), merger.identifying_columns() + 4 * 2);
}

#[test]
fn test_extended_header_uses_placeholder() {
    let names = NameLookup::default();
    let merger = RowMerger::extended(&names);
    let confirmed = ["countyFIPS", "County Name", "State", "stateFIPS", "1/22/20"];
    let population = ["countyFIPS", "County Name", "State", "population"];

    let row = merger.header_row(&confirmed, &population).unwrap();
    assert_eq!(&row[..6], &["countyFIPS", "County Name", "State", "stateFIPS", "stateName", "population"]);
    assert_eq!(row.len(), merger.identifying_columns() + 4);
}

#[test]
fn test_header_needs_a_date_column() {
    let confirmed = ["countyFIPS", "County Name", "State", "stateFIPS"];
    let population = ["countyFIPS", "County Name", "State", "population"];

    match RowMerger::domestic().header_row(&confirmed, &population) {
        Err(MergeError::MalformedRow { expected, found, .. }) => {
            assert_eq!(expected, 5);
            assert_eq!(found, 4);
        },
        other => panic!("expected malformed row, got {:?}", other),
    }
}

#[test]
fn test_domestic_data_row() {
    let merger = RowMerger::domestic();
    let confirmed = ["1001", "Autauga County", "AL", "1", "5", "5", "8"];
    let population = ["1001", "Autauga County", "AL", "55869"];
    let deaths = ["1001", "Autauga County", "AL", "1", "0", "1", "1"];

    let row = merger.merge_row(&confirmed, &population, &deaths, false).unwrap();
    assert_eq!(row, vec![
        "1001", "Autauga County", "AL", "1", "55869",
        "5", "5", "8",
        "0", "1", "1",
        "5", "0", "3",
        "0", "1", "0",
    ]);
}

#[test]
fn test_extended_data_row() {
    let names = NameLookup::from_rows(vec![vec!["Alabama", "AL"], vec!["Alaska", "AK"]]).unwrap();
    let merger = RowMerger::extended(&names);
    let confirmed = ["1001", "Autauga County", "AL", "1", "3", "2"];
    let population = ["1001", "Autauga County", "AL", "55869"];
    let deaths = ["1001", "Autauga County", "AL", "1", "1", "1"];

    let row = merger.data_row(&confirmed, &population, &deaths).unwrap();
    assert_eq!(row, vec![
        "1001", "Autauga County", "AL", "1", "Alabama", "55869",
        "3", "2",
        "1", "1",
        "3", "-1",
        "1", "0",
    ]);
    assert_eq!(row.len(), merger.identifying_columns() + 4 * 2);
}

#[test]
fn test_extended_unknown_state() {
    let names = NameLookup::from_rows(vec![vec!["Alabama", "AL"]]).unwrap();
    let merger = RowMerger::extended(&names);
    let confirmed = ["2013", "Aleutians East Borough", "AK", "2", "0"];
    let population = ["2013", "Aleutians East Borough", "AK", "3337"];
    let deaths = ["2013", "Aleutians East Borough", "AK", "2", "0"];

    match merger.data_row(&confirmed, &population, &deaths) {
        Err(MergeError::MissingKey(key)) => assert_eq!(key, "AK"),
        other => panic!("expected missing key, got {:?}", other),
    }
}

#[test]
fn test_short_deaths_row() {
    let confirmed = ["1001", "Autauga County", "AL", "1", "5", "5", "8"];
    let population = ["1001", "Autauga County", "AL", "55869"];
    let deaths = ["1001", "Autauga County", "AL", "1", "0"];

    match RowMerger::domestic().data_row(&confirmed, &population, &deaths) {
        Err(MergeError::MalformedRow { kind, expected, found }) => {
            assert_eq!(kind, "deaths");
            assert_eq!(expected, 7);
            assert_eq!(found, 5);
        },
        other => panic!("expected malformed row, got {:?}", other),
    }
}

#[test]
fn test_longer_deaths_row_is_trimmed_to_confirmed_dates() {
    let confirmed = ["1001", "Autauga County", "AL", "1", "5"];
    let population = ["1001", "Autauga County", "AL", "55869"];
    let deaths = ["1001", "Autauga County", "AL", "1", "0", "2"];

    let row = RowMerger::domestic().data_row(&confirmed, &population, &deaths).unwrap();
    assert_eq!(row, vec!["1001", "Autauga County", "AL", "1", "55869", "5", "0", "5", "0"]);
}

#[test]
fn test_short_population_row() {
    let confirmed = ["1001", "Autauga County", "AL", "1", "5"];
    let population = ["1001", "Autauga County", "AL"];
    let deaths = ["1001", "Autauga County", "AL", "1", "0"];

    match RowMerger::domestic().data_row(&confirmed, &population, &deaths) {
        Err(MergeError::MalformedRow { kind, .. }) => assert_eq!(kind, "population"),
        other => panic!("expected malformed row, got {:?}", other),
    }
}

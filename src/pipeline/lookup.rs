use std::collections::HashMap;
use std::path::Path;

use crate::error::{Error, MergeError};

/// Maps a state abbreviation ("AL") to its full name ("Alabama").
#[derive(Debug, Default, Clone, PartialEq)]
pub struct NameLookup {
    names: HashMap<String, String>,
}

impl NameLookup {
    /// Builds the lookup from `fullName, abbreviation` rows. Later rows overwrite earlier
    /// ones sharing an abbreviation; any row with fewer than two fields is rejected.
    pub fn from_rows<I, R, S>(rows: I) -> Result<NameLookup, MergeError>
    where
        I: IntoIterator<Item = R>,
        R: AsRef<[S]>,
        S: AsRef<str>,
    {
        let mut names = HashMap::new();

        for row in rows {
            let row = row.as_ref();
            if row.len() < 2 {
                return Err(MergeError::MalformedRow { kind: "abbreviation", expected: 2, found: row.len() });
            }
            names.insert(row[1].as_ref().to_owned(), row[0].as_ref().to_owned());
        }

        Ok(NameLookup { names })
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<NameLookup, Error> {
        let path = path.as_ref();
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(|e| Error::Open { path: path.display().to_string(), source: e })?;

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(MergeError::from)?;
            rows.push(record.iter().map(String::from).collect::<Vec<String>>());
        }

        Ok(NameLookup::from_rows(rows)?)
    }

    pub fn get(&self, abbreviation: &str) -> Result<&str, MergeError> {
        self.names
            .get(abbreviation)
            .map(String::as_str)
            .ok_or_else(|| MergeError::MissingKey(abbreviation.to_owned()))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }
}

#[test]
fn test_from_rows() {
    let lookup = NameLookup::from_rows(vec![vec!["Alabama", "AL"], vec!["Alaska", "AK"]]).unwrap();

    assert_eq!(lookup.len(), 2);
    assert_eq!(lookup.get("AL").unwrap(), "Alabama");
    assert_eq!(lookup.get("AK").unwrap(), "Alaska");
}

#[test]
fn test_last_duplicate_wins() {
    let lookup = NameLookup::from_rows(vec![vec!["Georgia", "GA"], vec!["Guam", "GA"]]).unwrap();

    assert_eq!(lookup.len(), 1);
    assert_eq!(lookup.get("GA").unwrap(), "Guam");
}

#[test]
fn test_short_row_is_malformed() {
    let result = NameLookup::from_rows(vec![vec!["Alabama", "AL"], vec!["Alaska"]]);

    match result {
        Err(MergeError::MalformedRow { expected, found, .. }) => {
            assert_eq!(expected, 2);
            assert_eq!(found, 1);
        },
        other => panic!("expected malformed row, got {:?}", other),
    }
}

#[test]
fn test_missing_key() {
    let lookup = NameLookup::from_rows(vec![vec!["Alabama", "AL"]]).unwrap();

    match lookup.get("ZZ") {
        Err(MergeError::MissingKey(key)) => assert_eq!(key, "ZZ"),
        other => panic!("expected missing key, got {:?}", other),
    }
}

#[test]
fn test_from_path() {
    use std::io::Write;

    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "Alabama, AL\nDistrict of Columbia,DC\n").unwrap();
    file.flush().unwrap();

    let lookup = NameLookup::from_path(file.path()).unwrap();
    assert_eq!(lookup.get("AL").unwrap(), "Alabama");
    assert_eq!(lookup.get("DC").unwrap(), "District of Columbia");
}

#[test]
fn test_shipped_abbreviations() {
    let lookup = NameLookup::from_path("stateAbbreviations.csv").unwrap();

    assert_eq!(lookup.len(), 51);
    assert_eq!(lookup.get("WY").unwrap(), "Wyoming");
}

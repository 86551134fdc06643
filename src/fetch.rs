use std::fs::File;
use std::io;

use tracing::{debug, info};

use crate::config::{PipelineConfig, SourceConfig};
use crate::error::FetchError;

pub const USER_AGENT: &str = "covid-merge/0.1";

#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    pub connect: u64, // milliseconds
    pub read: u64,
}

/// Downloads one source into its local file, replacing whatever was there.
/// Returns the number of bytes written.
pub fn fetch_source(source: &SourceConfig, timeouts: Timeouts) -> Result<u64, FetchError> {
    let response = ureq::get(&source.url)
        .set("User-Agent", USER_AGENT)
        .timeout_connect(timeouts.connect)
        .timeout_read(timeouts.read)
        .call();

    if let Some(error) = response.synthetic_error() {
        return Err(FetchError::Transport { url: source.url.clone(), message: error.to_string() });
    }

    if !response.ok() {
        return Err(FetchError::Status {
            url: source.url.clone(),
            status: response.status(),
            status_text: response.status_text().to_owned(),
        });
    }

    let io_error = |e: io::Error| FetchError::Io { file: source.file.clone(), source: e };

    let mut file = File::create(&source.file).map_err(io_error)?;
    let mut reader = response.into_reader();
    io::copy(&mut reader, &mut file).map_err(io_error)
}

/// Downloads every source of a pipeline in order. The first failure aborts the run.
pub fn fetch_pipeline(config: &PipelineConfig, timeouts: Timeouts) -> Result<(), FetchError> {
    for source in config.sources() {
        info!(file = %source.file, "downloading");
        let written = fetch_source(source, timeouts)?;
        debug!(file = %source.file, bytes = written, url = %source.url, "downloaded");
    }
    Ok(())
}

#[test]
fn test_unreachable_host_is_transport_error() {
    let dir = tempfile::tempdir().unwrap();
    let source = SourceConfig {
        // port 9 on loopback: nothing listens, the connection is refused immediately
        url: "http://127.0.0.1:9/covid_confirmed_usafacts.csv".to_owned(),
        file: dir.path().join("out.csv").to_string_lossy().into_owned(),
    };

    let timeouts = Timeouts { connect: 1000, read: 1000 };
    match fetch_source(&source, timeouts) {
        Err(FetchError::Transport { url, .. }) => assert_eq!(url, source.url),
        other => panic!("expected transport error, got {:?}", other),
    }
    assert!(!dir.path().join("out.csv").exists());
}

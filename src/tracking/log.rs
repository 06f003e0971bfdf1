use crate::error::PersistenceError;
use crate::tracking::{Event, StreamState};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Contents of the data file: per-source timeline of totals and final totals
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSummary {
    /// Source name -> whole seconds of playback -> cumulative total
    pub timeline: BTreeMap<String, BTreeMap<u64, u32>>,
    pub totals: BTreeMap<String, u32>,
}

/// Writes the per-source event log and data summary at shutdown
#[derive(Debug, Clone)]
pub struct EventLogWriter {
    event_file: PathBuf,
    data_file: PathBuf,
}

impl EventLogWriter {
    pub fn new<P: Into<PathBuf>>(event_file: P, data_file: P) -> Self {
        Self {
            event_file: event_file.into(),
            data_file: data_file.into(),
        }
    }

    pub fn event_file(&self) -> &Path {
        &self.event_file
    }

    pub fn data_file(&self) -> &Path {
        &self.data_file
    }

    /// Write every source's events, in arrival order, plus the data summary
    pub fn flush(&self, states: &[StreamState]) -> Result<(), PersistenceError> {
        let mut events: BTreeMap<String, Vec<Event>> = BTreeMap::new();
        let mut summary = DataSummary::default();

        for state in states {
            events.insert(state.name().to_string(), state.events().to_vec());

            let timeline = summary.timeline.entry(state.name().to_string()).or_default();
            for event in state.events() {
                timeline.insert(event.video_time() as u64, event.cumulative_total());
            }
            summary.totals.insert(state.name().to_string(), state.total());
        }

        write_json(&self.event_file, &events)?;
        write_json(&self.data_file, &summary)?;

        let count: usize = events.values().map(Vec::len).sum();
        info!(
            "Flushed {} events from {} sources to {}",
            count,
            states.len(),
            self.event_file.display()
        );
        Ok(())
    }

    /// Read back an event file written by `flush`
    pub fn load<P: AsRef<Path>>(path: P) -> Result<BTreeMap<String, Vec<Event>>, PersistenceError> {
        read_json(path.as_ref())
    }

    pub fn load_summary<P: AsRef<Path>>(path: P) -> Result<DataSummary, PersistenceError> {
        read_json(path.as_ref())
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), PersistenceError> {
    let write_error = |e: std::io::Error| PersistenceError::Write {
        path: path.display().to_string(),
        details: e.to_string(),
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(write_error)?;
    }

    let json = serde_json::to_vec_pretty(value)?;

    // Write next to the target and rename so readers never see a partial file
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    std::fs::write(&tmp, json).map_err(write_error)?;
    std::fs::rename(&tmp, path).map_err(write_error)?;

    debug!("Wrote {}", path.display());
    Ok(())
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, PersistenceError> {
    let read_error = |details: String| PersistenceError::Read {
        path: path.display().to_string(),
        details,
    };

    let data = std::fs::read(path).map_err(|e| read_error(e.to_string()))?;
    serde_json::from_slice(&data).map_err(|e| read_error(e.to_string()))
}

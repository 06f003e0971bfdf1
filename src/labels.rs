use crate::error::{Result, WatchError};
use std::path::Path;
use tracing::{debug, info, warn};

/// Mapping between the model's class list and the tracked label set
#[derive(Debug, Clone)]
pub struct LabelSet {
    /// Tracked label names in configured order
    tracked: Vec<String>,
    /// For each model label, the tracked index it feeds (if any)
    model_to_tracked: Vec<Option<usize>>,
    model_labels: Vec<String>,
}

impl LabelSet {
    /// Read the model label file and match it against the tracked labels
    pub fn load<P: AsRef<Path>>(model_labels_path: P, tracked: &[String]) -> Result<Self> {
        let path = model_labels_path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            WatchError::missing_resource(path.display().to_string(), e.to_string())
        })?;

        let model_labels: Vec<String> = contents
            .lines()
            .map(|line| line.trim().to_string())
            .collect();

        if model_labels.iter().all(|label| label.is_empty()) {
            return Err(WatchError::invalid_config(format!(
                "Model label file {} is empty",
                path.display()
            )));
        }

        debug!(
            "Loaded {} model labels from {}",
            model_labels.len(),
            path.display()
        );
        Self::from_model_labels(model_labels, tracked)
    }

    pub fn from_model_labels(model_labels: Vec<String>, tracked: &[String]) -> Result<Self> {
        let tracked: Vec<String> = tracked
            .iter()
            .map(|label| label.trim().to_string())
            .filter(|label| !label.is_empty())
            .collect();

        let model_to_tracked: Vec<Option<usize>> = model_labels
            .iter()
            .map(|name| tracked.iter().position(|t| t == name))
            .collect();

        let mut matched = 0;
        for (index, label) in tracked.iter().enumerate() {
            if model_to_tracked.contains(&Some(index)) {
                matched += 1;
            } else {
                warn!("Label '{}' is not present in the model label file", label);
            }
        }

        if matched == 0 {
            return Err(WatchError::invalid_config(
                "None of the tracked labels are present in the model label file",
            ));
        }

        info!("Tracking {} of {} labels", matched, tracked.len());
        Ok(Self {
            tracked,
            model_to_tracked,
            model_labels,
        })
    }

    pub fn len(&self) -> usize {
        self.tracked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracked.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.tracked
    }

    pub fn name(&self, tracked_index: usize) -> Option<&str> {
        self.tracked.get(tracked_index).map(String::as_str)
    }

    /// Tracked index for a detector class id (class 0 is background)
    pub fn tracked_index(&self, class_id: usize) -> Option<usize> {
        class_id
            .checked_sub(1)
            .and_then(|model_index| self.model_to_tracked.get(model_index).copied().flatten())
    }

    /// Model label name for a detector class id
    pub fn model_label(&self, class_id: usize) -> Option<&str> {
        class_id
            .checked_sub(1)
            .and_then(|model_index| self.model_labels.get(model_index))
            .map(String::as_str)
    }
}

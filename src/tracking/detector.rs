use crate::inference::Detection;
use crate::labels::LabelSet;
use crate::tracking::{Event, StreamState};
use chrono::{DateTime, Local};
use tracing::{debug, info};

/// A confirmed count increase for one label
#[derive(Debug, Clone, PartialEq)]
pub struct Intrusion {
    pub label_index: usize,
    pub label: String,
    /// Objects that appeared (number of events emitted)
    pub increase: u32,
    /// Newly confirmed count for the label
    pub count: u32,
    /// Source total after the increase
    pub total: u32,
}

/// Candidate-confidence debounce over raw per-label counts
#[derive(Debug, Clone)]
pub struct EventDetector {
    labels: LabelSet,
    confidence_threshold: f32,
    /// Consecutive consistent ticks needed to confirm a change
    candidate_confidence: u32,
}

impl EventDetector {
    pub fn new(labels: LabelSet, confidence_threshold: f32, candidate_confidence: u32) -> Self {
        Self {
            labels,
            confidence_threshold,
            candidate_confidence: candidate_confidence.max(1),
        }
    }

    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }

    /// Raw per-label counts for one frame
    pub fn count(&self, detections: &[Detection]) -> Vec<u32> {
        let mut counts = vec![0u32; self.labels.len()];
        for detection in self.counted(detections) {
            if let Some(index) = self.labels.tracked_index(detection.class_id) {
                counts[index] += 1;
            }
        }
        counts
    }

    /// Detections that contribute to the counts
    pub fn counted<'a>(&'a self, detections: &'a [Detection]) -> impl Iterator<Item = &'a Detection> {
        detections.iter().filter(move |detection| {
            detection.confidence > self.confidence_threshold
                && self.labels.tracked_index(detection.class_id).is_some()
        })
    }

    /// Feed one tick of raw counts into `state`
    ///
    /// A count is trusted once it has been seen on `candidate_confidence`
    /// consecutive ticks. Confirmed increases append one event per new object
    /// to the state's log and are returned; decreases only move the baseline.
    pub fn observe(
        &self,
        state: &mut StreamState,
        counts: &[u32],
        frame_index: u64,
        now: DateTime<Local>,
    ) -> Vec<Intrusion> {
        let mut intrusions = Vec::new();
        state.record_processed();

        for (i, raw) in counts.iter().copied().enumerate().take(state.label_count()) {
            state.current_count[i] = raw;

            if state.candidate_count[i] == raw {
                state.candidate_confidence[i] += 1;
            } else {
                state.candidate_confidence[i] = 1;
                state.candidate_count[i] = raw;
            }

            if state.candidate_confidence[i] < self.candidate_confidence {
                continue;
            }
            state.candidate_confidence[i] = 0;

            let previous = state.last_confirmed_count[i];
            state.last_confirmed_count[i] = raw;

            if raw <= previous {
                if raw < previous {
                    debug!(
                        "{}: {} count settled from {} to {}",
                        state.name(),
                        self.labels.name(i).unwrap_or("?"),
                        previous,
                        raw
                    );
                }
                continue;
            }

            let increase = raw - previous;
            state.cumulative_total[i] += increase;
            let total = state.total();
            let label = self.labels.name(i).unwrap_or_default().to_string();

            for _ in 0..increase {
                let event = Event::new(now, &label, total, frame_index, state.fps());
                info!(target: "intruder", "{}", event.log_line(state.name()));
                state.push_event(event);
            }

            intrusions.push(Intrusion {
                label_index: i,
                label,
                increase,
                count: raw,
                total,
            });
        }

        intrusions
    }
}

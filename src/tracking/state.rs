use crate::tracking::Event;

/// Debounce phase of one label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelPhase {
    /// The raw count agrees with the confirmed baseline
    Stable { count: u32 },
    /// A different count is being observed and has not been confirmed yet
    Candidate { count: u32, confidence: u32 },
}

/// Per-source bookkeeping, owned and mutated by the scheduler thread only
///
/// All per-label vectors share the tracked label order and keep their length
/// for the whole run.
#[derive(Debug, Clone)]
pub struct StreamState {
    source: usize,
    name: String,
    fps: f64,
    pub(crate) current_count: Vec<u32>,
    pub(crate) candidate_count: Vec<u32>,
    pub(crate) candidate_confidence: Vec<u32>,
    pub(crate) last_confirmed_count: Vec<u32>,
    pub(crate) cumulative_total: Vec<u32>,
    exhausted: bool,
    processed: u64,
    events: Vec<Event>,
}

impl StreamState {
    pub fn new(source: usize, name: &str, fps: f64, label_count: usize) -> Self {
        Self {
            source,
            name: name.to_string(),
            fps,
            current_count: vec![0; label_count],
            candidate_count: vec![0; label_count],
            candidate_confidence: vec![0; label_count],
            last_confirmed_count: vec![0; label_count],
            cumulative_total: vec![0; label_count],
            exhausted: false,
            processed: 0,
            events: Vec::new(),
        }
    }

    pub fn source(&self) -> usize {
        self.source
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    pub fn label_count(&self) -> usize {
        self.current_count.len()
    }

    pub fn current_counts(&self) -> &[u32] {
        &self.current_count
    }

    pub fn confirmed_counts(&self) -> &[u32] {
        &self.last_confirmed_count
    }

    pub fn cumulative_totals(&self) -> &[u32] {
        &self.cumulative_total
    }

    /// Cumulative total summed across all labels
    pub fn total(&self) -> u32 {
        self.cumulative_total.iter().sum()
    }

    pub fn phase(&self, label: usize) -> Option<LabelPhase> {
        let confirmed = *self.last_confirmed_count.get(label)?;
        let candidate = self.candidate_count[label];
        let confidence = self.candidate_confidence[label];

        if candidate == confirmed {
            Some(LabelPhase::Stable { count: confirmed })
        } else {
            Some(LabelPhase::Candidate {
                count: candidate,
                confidence,
            })
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn mark_exhausted(&mut self) {
        self.exhausted = true;
    }

    /// Number of results applied to this state
    pub fn processed(&self) -> u64 {
        self.processed
    }

    pub(crate) fn record_processed(&mut self) {
        self.processed += 1;
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub(crate) fn push_event(&mut self, event: Event) {
        self.events.push(event);
    }
}

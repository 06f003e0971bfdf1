use super::ShutdownTrigger;
use crate::alert::AlertDispatcher;
use crate::capture::SnapshotStore;
use crate::config::WatchConfig;
use crate::error::{Result, WatchError};
use crate::events::EventBus;
use crate::frame::Preprocessor;
use crate::inference::{create_detector, InferenceGateway, ThreadedGateway};
use crate::labels::LabelSet;
use crate::scheduler::{strategy_for, StreamScheduler};
use crate::source::FrameSource;
use crate::tracking::{EventDetector, EventLogWriter};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Fully initialised application, ready to run
pub struct WatchApp {
    pub(super) config: Arc<WatchConfig>,
    pub(super) bus: EventBus,
    pub(super) scheduler: Option<StreamScheduler>,
    pub(super) writer: EventLogWriter,
    pub(super) alerts: Option<AlertDispatcher>,
    pub(super) shutdown: ShutdownTrigger,
}

impl WatchApp {
    /// Run every fatal check, open all sources and start the detector
    ///
    /// Nothing is processed until `run`; any error here aborts the whole run.
    pub fn build(config: WatchConfig) -> Result<Self> {
        config.validate()?;
        let labels = LabelSet::load(&config.model.labels_path, &config.labels)?;

        let mut sources = Vec::with_capacity(config.sources.len());
        for (index, source_config) in config.sources.iter().enumerate() {
            let source = FrameSource::open(
                index,
                config.source_name(index),
                source_config,
                &config.scheduler,
            )
            .map_err(|e| {
                error!("Failed to open source {}: {}", index, e);
                e
            })?;
            sources.push(source);
        }

        let detector = create_detector(&config.model)?;
        info!("Inference backend '{}' ready", config.model.backend);
        let gateway = ThreadedGateway::spawn(detector)?;

        Self::assemble(config, labels, sources, Box::new(gateway))
    }

    /// Wire already opened sources and a gateway into an application
    pub fn assemble(
        config: WatchConfig,
        labels: LabelSet,
        sources: Vec<FrameSource>,
        gateway: Box<dyn InferenceGateway>,
    ) -> Result<Self> {
        let config = Arc::new(config);

        if gateway.input_shape() != config.model.input_shape {
            return Err(WatchError::invalid_config(format!(
                "model input shape {:?} does not match configured {:?}",
                gateway.input_shape(),
                config.model.input_shape
            )));
        }

        let snapshots = SnapshotStore::new(&config.output.snapshot_dir, sources.len() > 1)?;

        let alerts = if config.alert.enabled {
            Some(AlertDispatcher::from_config(&config.alert)?)
        } else {
            info!("Alerts disabled");
            None
        };

        let bus = EventBus::new(config.system.event_bus_capacity);
        let preprocessor = Preprocessor::from_config(&config.model);
        let strategy = strategy_for(&config, &preprocessor);
        let detector = EventDetector::new(
            labels,
            config.scheduler.confidence_threshold,
            config.scheduler.candidate_confidence,
        );

        let token = CancellationToken::new();
        let scheduler = StreamScheduler::new(
            sources,
            gateway,
            strategy,
            preprocessor,
            detector,
            bus.clone(),
        )
        .with_snapshots(snapshots)
        .with_read_timeout(config.scheduler.read_timeout_ms.map(Duration::from_millis))
        .with_cancellation(token.clone());

        let shutdown = ShutdownTrigger::new(token, scheduler.interrupt_handles(), bus.clone());
        let writer = EventLogWriter::new(&config.output.event_file, &config.output.data_file);

        info!(
            "Watching {} sources for {} labels ({} mode)",
            config.sources.len(),
            config.labels.len(),
            config.scheduler.mode.as_str()
        );

        Ok(Self {
            config,
            bus,
            scheduler: Some(scheduler),
            writer,
            alerts,
            shutdown,
        })
    }

    pub fn config(&self) -> &WatchConfig {
        &self.config
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.bus
    }

    /// Handle for requesting shutdown from outside the run
    pub fn shutdown_trigger(&self) -> ShutdownTrigger {
        self.shutdown.clone()
    }
}

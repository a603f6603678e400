//! Logging frame publisher used by `run`.

use std::sync::{Arc, Mutex, PoisonError};

use contracts::{Clock, ContractError, Frame, FramePublisher, SystemClock};
use observability::{record_frame_received, PublicationAggregator};
use tracing::{debug, info};

/// Logs every published frame and feeds the publication aggregator.
///
/// Logs at `info` once per second (frame index 0) and at `debug` for
/// every frame.
pub struct LogPublisher {
    clock: Arc<dyn Clock>,
    aggregator: Arc<Mutex<PublicationAggregator>>,
    frames: u64,
}

impl LogPublisher {
    pub fn new(aggregator: Arc<Mutex<PublicationAggregator>>) -> Self {
        Self::with_clock(aggregator, Arc::new(SystemClock))
    }

    pub fn with_clock(
        aggregator: Arc<Mutex<PublicationAggregator>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            clock,
            aggregator,
            frames: 0,
        }
    }
}

impl FramePublisher for LogPublisher {
    fn name(&self) -> &str {
        "log"
    }

    fn publish(&mut self, frame: &Frame, index: u32) -> Result<(), ContractError> {
        let latency_ms = (self.clock.now() - frame.timestamp).to_millis();
        self.frames += 1;

        record_frame_received(self.name(), frame, latency_ms);
        self.aggregator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .update(frame, index, latency_ms);

        debug!(
            timestamp = %frame.timestamp,
            index,
            samples = frame.len(),
            latency_ms,
            "frame received"
        );
        if index == 0 {
            info!(
                timestamp = %frame.timestamp,
                samples = frame.len(),
                latency_ms = format!("{latency_ms:.1}"),
                frames = self.frames,
                "frame received"
            );
        }

        Ok(())
    }
}

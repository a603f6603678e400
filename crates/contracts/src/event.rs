//! Concentrator notifications
//!
//! Delivered through a user supplied [`EventCallback`]. Callbacks run on the
//! thread that raised the event and must not block.

use std::fmt;
use std::sync::Arc;

use crate::Sample;

/// Out-of-band notification raised by a concentrator.
#[derive(Debug, Clone)]
pub enum ConcentratorEvent {
    /// Frame queue backlog in whole seconds beyond the one second being
    /// accumulated. Raised once per second while running.
    UnpublishedSamples { seconds: usize },

    /// An error occurred while processing; `source` names the stage.
    ProcessException { source: String, message: String },

    /// Samples rejected by one sort call (never empty).
    DiscardingSamples(Vec<Sample>),
}

impl ConcentratorEvent {
    pub fn process_exception(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ProcessException {
            source: source.into(),
            message: message.into(),
        }
    }

    /// Short event kind, used as a metric label.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnpublishedSamples { .. } => "unpublished_samples",
            Self::ProcessException { .. } => "process_exception",
            Self::DiscardingSamples(_) => "discarding_samples",
        }
    }
}

impl fmt::Display for ConcentratorEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnpublishedSamples { seconds } => {
                write!(f, "{seconds} second(s) of unpublished samples queued")
            }
            Self::ProcessException { source, message } => write!(f, "{source}: {message}"),
            Self::DiscardingSamples(samples) => write!(f, "discarding {} sample(s)", samples.len()),
        }
    }
}

/// Notification sink shared between the sorting and publishing threads.
pub type EventCallback = Arc<dyn Fn(ConcentratorEvent) + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Ticks;

    #[test]
    fn test_display() {
        let event = ConcentratorEvent::UnpublishedSamples { seconds: 2 };
        assert_eq!(event.to_string(), "2 second(s) of unpublished samples queued");
        assert_eq!(event.kind(), "unpublished_samples");

        let event = ConcentratorEvent::DiscardingSamples(vec![Sample::new(
            "PMU_A:FREQ",
            Ticks::new(1),
            60.0,
        )]);
        assert_eq!(event.to_string(), "discarding 1 sample(s)");

        let event = ConcentratorEvent::process_exception("publish", "boom");
        assert_eq!(event.to_string(), "publish: boom");
    }
}

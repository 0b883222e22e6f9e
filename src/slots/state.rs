//! Slot states and the transitions between them

use std::{fmt, sync::Arc};

use crate::{
    broker::BrokerBuffer,
    graphics::{Fence, PresentationBuffer},
};

/// State tag without payload, for comparisons and counting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotStateKind {
    Free,
    Dequeued,
    Queued,
}

impl fmt::Display for SlotStateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SlotStateKind::Free => "FREE",
            SlotStateKind::Dequeued => "DEQUEUED",
            SlotStateKind::Queued => "QUEUED",
        };
        f.write_str(name)
    }
}

/// Ownership state of a slot
#[derive(Debug, Clone, Default)]
pub enum SlotState {
    /// Owned by the broker's free pool
    #[default]
    Free,
    /// Owned by the producer. `presentation` is set once the client has
    /// requested the wrapper for this occupancy.
    Dequeued {
        presentation: Option<Arc<PresentationBuffer>>,
    },
    /// Posted to the consumer; the wrapper stays cached
    Queued {
        presentation: Arc<PresentationBuffer>,
    },
}

impl SlotState {
    pub fn kind(&self) -> SlotStateKind {
        match self {
            SlotState::Free => SlotStateKind::Free,
            SlotState::Dequeued { .. } => SlotStateKind::Dequeued,
            SlotState::Queued { .. } => SlotStateKind::Queued,
        }
    }

    pub fn presentation(&self) -> Option<&Arc<PresentationBuffer>> {
        match self {
            SlotState::Free => None,
            SlotState::Dequeued { presentation } => presentation.as_ref(),
            SlotState::Queued { presentation } => Some(presentation),
        }
    }
}

/// Events that move a slot between states
#[derive(Debug, Clone)]
pub enum SlotTransition {
    /// The broker handed this slot's buffer to the producer
    Dequeue { buffer: Arc<BrokerBuffer> },
    /// First request of the presentation wrapper in this occupancy
    Request {
        presentation: Arc<PresentationBuffer>,
    },
    /// Buffer posted to the consumer
    Queue,
    /// Buffer returned unused to the free pool
    Cancel { fence: Fence },
}

impl SlotTransition {
    pub fn name(&self) -> &'static str {
        match self {
            SlotTransition::Dequeue { .. } => "dequeue",
            SlotTransition::Request { .. } => "request",
            SlotTransition::Queue => "queue",
            SlotTransition::Cancel { .. } => "cancel",
        }
    }

    /// States this transition may start from
    pub fn allowed_from(&self) -> &'static [SlotStateKind] {
        match self {
            SlotTransition::Dequeue { .. } => &[SlotStateKind::Free, SlotStateKind::Queued],
            SlotTransition::Request { .. }
            | SlotTransition::Queue
            | SlotTransition::Cancel { .. } => &[SlotStateKind::Dequeued],
        }
    }

    /// State the slot ends up in
    pub fn target(&self) -> SlotStateKind {
        match self {
            SlotTransition::Dequeue { .. } | SlotTransition::Request { .. } => {
                SlotStateKind::Dequeued
            }
            SlotTransition::Queue => SlotStateKind::Queued,
            SlotTransition::Cancel { .. } => SlotStateKind::Free,
        }
    }
}

//! Slot records and the fixed-capacity table holding them

use std::sync::Arc;

use crate::{
    broker::BrokerBuffer,
    error::{QueueError, Result},
    graphics::{Fence, PresentationBuffer},
};

use super::state::{SlotState, SlotStateKind, SlotTransition};

/// One entry of the slot table
#[derive(Debug, Default)]
pub struct Slot {
    state: SlotState,
    /// Broker buffer last seen in this slot
    buffer: Option<Arc<BrokerBuffer>>,
    /// Set when a geometry mismatch forced a swap; consumed by dequeue
    needs_reallocation: bool,
    /// Fence handed back on the last cancel
    release_fence: Option<Fence>,
}

impl Slot {
    pub fn state(&self) -> &SlotState {
        &self.state
    }

    pub fn kind(&self) -> SlotStateKind {
        self.state.kind()
    }

    pub fn buffer(&self) -> Option<&Arc<BrokerBuffer>> {
        self.buffer.as_ref()
    }

    pub fn presentation(&self) -> Option<&Arc<PresentationBuffer>> {
        self.state.presentation()
    }

    /// Whether the wrapper was produced for the current occupancy
    pub fn request_called(&self) -> bool {
        self.state.presentation().is_some()
    }

    pub fn needs_reallocation(&self) -> bool {
        self.needs_reallocation
    }

    pub fn release_fence(&self) -> Option<&Fence> {
        self.release_fence.as_ref()
    }

    fn apply(&mut self, transition: SlotTransition) {
        self.state = match transition {
            SlotTransition::Dequeue { buffer } => {
                self.buffer = Some(buffer);
                SlotState::Dequeued { presentation: None }
            }
            SlotTransition::Request { presentation } => SlotState::Dequeued {
                presentation: Some(presentation),
            },
            SlotTransition::Queue => match std::mem::take(&mut self.state) {
                SlotState::Dequeued {
                    presentation: Some(presentation),
                } => SlotState::Queued { presentation },
                // unreachable through SlotTable::transition
                other => other,
            },
            SlotTransition::Cancel { fence } => {
                self.release_fence = Some(fence);
                SlotState::Free
            }
        };
    }

    pub(crate) fn mark_reallocating(&mut self) {
        self.needs_reallocation = true;
    }

    pub(crate) fn take_needs_reallocation(&mut self) -> bool {
        std::mem::take(&mut self.needs_reallocation)
    }

    fn view(&self, index: usize) -> SlotView {
        SlotView {
            index,
            state: self.kind(),
            buffer_id: self.buffer.as_ref().map(|b| b.id()),
            request_called: self.request_called(),
            needs_reallocation: self.needs_reallocation,
            has_release_fence: self.release_fence.is_some(),
        }
    }
}

/// Read-only snapshot of a slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotView {
    pub index: usize,
    pub state: SlotStateKind,
    pub buffer_id: Option<u64>,
    pub request_called: bool,
    pub needs_reallocation: bool,
    pub has_release_fence: bool,
}

/// Fixed-capacity table of slots
#[derive(Debug)]
pub struct SlotTable {
    slots: Vec<Slot>,
}

impl SlotTable {
    /// Create a table of `capacity` free slots
    pub fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, Slot::default);
        Self { slots }
    }

    /// Number of slots (`max_buffer_count`)
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Snapshot of a slot
    pub fn get(&self, slot: usize) -> Result<SlotView> {
        self.slot(slot).map(|s| s.view(slot))
    }

    pub fn slot(&self, slot: usize) -> Result<&Slot> {
        self.slots
            .get(slot)
            .ok_or_else(|| QueueError::out_of_range(slot, self.slots.len()))
    }

    pub(crate) fn slot_mut(&mut self, slot: usize) -> Result<&mut Slot> {
        let max = self.slots.len();
        self.slots
            .get_mut(slot)
            .ok_or_else(|| QueueError::out_of_range(slot, max))
    }

    /// Apply `transition` if the slot is in one of `expected` and the
    /// transition may start from that state.
    pub fn transition(
        &mut self,
        slot: usize,
        expected: &[SlotStateKind],
        transition: SlotTransition,
    ) -> Result<()> {
        let entry = self.slot_mut(slot)?;
        let current = entry.kind();

        if !expected.contains(&current) || !transition.allowed_from().contains(&current) {
            return Err(QueueError::invalid_state(format!(
                "invalid state transition: slot {} is {}, cannot {} into {}",
                slot,
                current,
                transition.name(),
                transition.target()
            )));
        }

        if matches!(transition, SlotTransition::Queue) && !entry.request_called() {
            return Err(QueueError::invalid_state(format!(
                "invalid state transition: slot {} was never requested",
                slot
            )));
        }

        if matches!(transition, SlotTransition::Request { .. }) && entry.request_called() {
            return Err(QueueError::invalid_state(format!(
                "invalid state transition: slot {} was already requested",
                slot
            )));
        }

        entry.apply(transition);
        Ok(())
    }

    /// Release a slot's buffer ahead of reallocation. The slot drops back to
    /// free with every derived field cleared except the reallocation mark.
    pub fn detach(&mut self, slot: usize) -> Result<Option<Arc<BrokerBuffer>>> {
        let entry = self.slot_mut(slot)?;
        entry.state = SlotState::Free;
        entry.release_fence = None;
        Ok(entry.buffer.take())
    }

    /// Number of slots currently in `state`
    pub fn count_in_state(&self, state: SlotStateKind) -> usize {
        self.slots.iter().filter(|s| s.kind() == state).count()
    }

    /// Snapshots of every slot
    pub fn views(&self) -> Vec<SlotView> {
        self.slots
            .iter()
            .enumerate()
            .map(|(index, slot)| slot.view(index))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        broker::BufferDescriptor,
        graphics::PixelFormat,
        memory::{RegionConfig, SharedMemoryRegion},
    };

    fn buffer(id: u64) -> Arc<BrokerBuffer> {
        let descriptor = BufferDescriptor::new(16, 16, PixelFormat::Rgba8888, 0).unwrap();
        let region = SharedMemoryRegion::new(RegionConfig::new(
            format!("table-{}-{}", std::process::id(), id),
            descriptor.byte_size(),
        ))
        .unwrap();
        Arc::new(BrokerBuffer::new(id, descriptor, Arc::new(region)))
    }

    fn dequeued_table(id: u64) -> (SlotTable, Arc<BrokerBuffer>) {
        let mut table = SlotTable::new(4);
        let buf = buffer(id);
        table
            .transition(
                1,
                &[SlotStateKind::Free, SlotStateKind::Queued],
                SlotTransition::Dequeue {
                    buffer: Arc::clone(&buf),
                },
            )
            .unwrap();
        (table, buf)
    }

    fn request(table: &mut SlotTable, slot: usize, buf: &BrokerBuffer) {
        let presentation = Arc::new(PresentationBuffer::from_broker_buffer(buf));
        table
            .transition(
                slot,
                &[SlotStateKind::Dequeued],
                SlotTransition::Request { presentation },
            )
            .unwrap();
    }

    #[test]
    fn test_get_out_of_range() {
        let table = SlotTable::new(4);
        assert!(matches!(
            table.get(4),
            Err(QueueError::OutOfRange { slot: 4, max: 4 })
        ));
        assert_eq!(table.get(3).unwrap().state, SlotStateKind::Free);
    }

    #[test]
    fn test_dequeue_request_queue() {
        let (mut table, buf) = dequeued_table(1);
        let view = table.get(1).unwrap();
        assert_eq!(view.state, SlotStateKind::Dequeued);
        assert_eq!(view.buffer_id, Some(1));
        assert!(!view.request_called);

        request(&mut table, 1, &buf);
        assert!(table.get(1).unwrap().request_called);

        table
            .transition(1, &[SlotStateKind::Dequeued], SlotTransition::Queue)
            .unwrap();
        let view = table.get(1).unwrap();
        assert_eq!(view.state, SlotStateKind::Queued);
        assert!(view.request_called);
        assert!(table.slot(1).unwrap().presentation().is_some());
    }

    #[test]
    fn test_queue_requires_request() {
        let (mut table, _buf) = dequeued_table(2);
        let err = table
            .transition(1, &[SlotStateKind::Dequeued], SlotTransition::Queue)
            .unwrap_err();
        assert!(matches!(err, QueueError::InvalidState { .. }));
        assert_eq!(table.get(1).unwrap().state, SlotStateKind::Dequeued);
    }

    #[test]
    fn test_second_request_keeps_first_wrapper() {
        let (mut table, buf) = dequeued_table(8);
        request(&mut table, 1, &buf);
        let first = Arc::clone(table.slot(1).unwrap().presentation().unwrap());

        let err = table
            .transition(
                1,
                &[SlotStateKind::Dequeued],
                SlotTransition::Request {
                    presentation: Arc::new(PresentationBuffer::from_broker_buffer(&buf)),
                },
            )
            .unwrap_err();
        assert!(matches!(err, QueueError::InvalidState { .. }));
        let cached = table.slot(1).unwrap().presentation().unwrap();
        assert!(Arc::ptr_eq(cached, &first));
        assert_eq!(table.get(1).unwrap().state, SlotStateKind::Dequeued);
    }

    #[test]
    fn test_cancel_clears_presentation_and_records_fence() {
        let (mut table, buf) = dequeued_table(3);
        request(&mut table, 1, &buf);

        table
            .transition(
                1,
                &[SlotStateKind::Dequeued],
                SlotTransition::Cancel {
                    fence: Fence::no_fence(),
                },
            )
            .unwrap();
        let view = table.get(1).unwrap();
        assert_eq!(view.state, SlotStateKind::Free);
        assert!(!view.request_called);
        assert!(view.has_release_fence);
        assert!(table.slot(1).unwrap().presentation().is_none());
    }

    #[test]
    fn test_illegal_transitions_are_rejected() {
        let mut table = SlotTable::new(2);
        let err = table
            .transition(
                0,
                &[SlotStateKind::Dequeued],
                SlotTransition::Cancel {
                    fence: Fence::no_fence(),
                },
            )
            .unwrap_err();
        assert!(matches!(err, QueueError::InvalidState { .. }));

        // Expected set wider than the transition's legal edges
        let err = table
            .transition(0, &[SlotStateKind::Free], SlotTransition::Queue)
            .unwrap_err();
        assert!(matches!(err, QueueError::InvalidState { .. }));
    }

    #[test]
    fn test_count_in_state() {
        let (mut table, _buf) = dequeued_table(4);
        assert_eq!(table.count_in_state(SlotStateKind::Dequeued), 1);
        assert_eq!(table.count_in_state(SlotStateKind::Free), 3);

        table
            .transition(
                0,
                &[SlotStateKind::Free],
                SlotTransition::Dequeue { buffer: buffer(5) },
            )
            .unwrap();
        assert_eq!(table.count_in_state(SlotStateKind::Dequeued), 2);
        assert_eq!(table.views().len(), 4);
    }

    #[test]
    fn test_detach_keeps_reallocation_mark() {
        let mut table = SlotTable::new(2);
        table
            .transition(
                0,
                &[SlotStateKind::Free],
                SlotTransition::Dequeue { buffer: buffer(6) },
            )
            .unwrap();
        table
            .transition(
                0,
                &[SlotStateKind::Dequeued],
                SlotTransition::Cancel {
                    fence: Fence::no_fence(),
                },
            )
            .unwrap();

        table.slot_mut(0).unwrap().mark_reallocating();
        let released = table.detach(0).unwrap();
        assert_eq!(released.map(|b| b.id()), Some(6));

        let view = table.get(0).unwrap();
        assert_eq!(view.state, SlotStateKind::Free);
        assert_eq!(view.buffer_id, None);
        assert!(!view.has_release_fence);
        assert!(view.needs_reallocation);

        assert!(table.slot_mut(0).unwrap().take_needs_reallocation());
        assert!(!table.get(0).unwrap().needs_reallocation);
    }
}

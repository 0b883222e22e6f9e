//! The slot table
//!
//! A fixed-size, index-addressed table recording which slots are free,
//! dequeued by the producer, or queued for the consumer. Slot state is a
//! closed variant with explicit transitions, so combinations such as "free
//! but still holding a presentation wrapper" cannot be represented.

pub mod state;
pub mod table;

pub use state::{SlotState, SlotStateKind, SlotTransition};
pub use table::{Slot, SlotTable, SlotView};

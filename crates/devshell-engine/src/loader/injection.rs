//! Deferred native-method wiring
//!
//! Wiring a unit may resolve references that load more types, and loading a
//! type defines its supertypes first. Units are therefore never wired while
//! a type is being defined: they are queued, and only the outermost load
//! drains the queue once every type it needed is defined.

use crate::unit::CompiledUnit;
use rustc_hash::FxHashSet;
use std::collections::VecDeque;
use std::sync::Arc;

/// Who owns the drain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InjectionState {
    /// No load is in progress; the next load owns the drain
    #[default]
    Idle,
    /// An outer load owns the drain; nested loads only enqueue
    Injecting,
}

/// FIFO of units waiting to be wired
#[derive(Debug, Default)]
pub struct InjectionQueue {
    pending: VecDeque<Arc<CompiledUnit>>,
    /// Top-level type names of units already wired
    injected: FxHashSet<String>,
}

impl InjectionQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a unit for wiring
    pub fn push(&mut self, unit: Arc<CompiledUnit>) {
        self.pending.push_back(unit);
    }

    /// Take the next unit that was not wired yet, marking it wired
    pub fn next_pending(&mut self) -> Option<Arc<CompiledUnit>> {
        while let Some(unit) = self.pending.pop_front() {
            if self.injected.insert(unit.type_name().to_string()) {
                return Some(unit);
            }
        }
        None
    }

    /// Whether a unit was wired already
    pub fn is_injected(&self, type_name: &str) -> bool {
        self.injected.contains(type_name)
    }

    /// Number of queued entries, duplicates included
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether nothing is queued
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

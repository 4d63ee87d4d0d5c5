//! Partitioning of logical work items into a bounded scheduler job array.

pub mod slurm;

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Partitioning of `total_items` work items into at most `max_slots` array
/// slots, with the wall-clock budget to request per slot.
///
/// Invariants: `items_per_slot >= 1`, `slot_count <= max(max_slots, 1)` and
/// `items_per_slot * slot_count >= total_items`.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct BatchPlan {
    total_items: u32,
    max_slots: u32,
    time_per_item: Duration,
    items_per_slot: u32,
    slot_count: u32,
    slot_time: String,
}

impl BatchPlan {
    pub fn new(total_items: u32, max_slots: u32, time_per_item: Duration) -> BatchPlan {
        let items_per_slot = total_items.div_ceil(max_slots.max(1)).max(1);
        // A plan for zero items still renders a well-formed 0-0 array range.
        let slot_count = total_items.div_ceil(items_per_slot).max(1);
        let slot_time = format_slot_time(time_per_item * items_per_slot);
        BatchPlan {
            total_items,
            max_slots,
            time_per_item,
            items_per_slot,
            slot_count,
            slot_time,
        }
    }

    pub fn total_items(&self) -> u32 {
        self.total_items
    }

    pub fn max_slots(&self) -> u32 {
        self.max_slots
    }

    pub fn time_per_item(&self) -> Duration {
        self.time_per_item
    }

    /// How many work items each array slot processes.
    pub fn items_per_slot(&self) -> u32 {
        self.items_per_slot
    }

    /// How many array slots the scheduler is asked for.
    pub fn slot_count(&self) -> u32 {
        self.slot_count
    }

    /// Wall-clock budget of one slot, formatted `HH:MM:00`.
    pub fn slot_time(&self) -> &str {
        &self.slot_time
    }

    /// Value of the scheduler's array directive, `0-<slot_count - 1>`.
    pub fn array_range(&self) -> String {
        format!("0-{}", self.slot_count - 1)
    }
}

/// Format a per-slot budget as a Slurm time string, e.g. 01:05:00.
/// Partial minutes round up, so an inexact per-item estimate can only
/// overshoot the requested time, never undershoot it.
fn format_slot_time(budget: Duration) -> String {
    let mut seconds = budget.as_secs();
    let hours = seconds / 3600;
    seconds %= 3600;
    let minutes = seconds.div_ceil(60);
    format!("{hours:02}:{minutes:02}:00")
}

// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

#[cfg(test)]
mod integration_tests;
pub mod occupancy;
pub mod scheduler;
pub mod task_queue;

pub use occupancy::{OccupancyCallback, OccupancySnapshot, SlotOccupancy};
pub use scheduler::{ActivationState, AvalancheScheduler, FinishedEvent};
pub use task_queue::{RankedTaskQueue, ScheduledTask, TaskSpec};

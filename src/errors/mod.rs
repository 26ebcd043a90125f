// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

mod graph;
mod schedule;
mod state;

pub use graph::GraphError;
pub use schedule::ScheduleError;
pub use state::StateError;

// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Contract of the conditions service.
//!
//! Condition data is externally validated per event: a condition node is
//! available for a given event when the service says its identifier is
//! valid, regardless of what this slot has produced. Condition algorithms
//! load validity intervals on demand.

use crate::slot::EventContext;

pub trait ConditionsService: Send + Sync {
    /// Is the condition object valid for this event?
    fn is_valid(&self, context: &EventContext, data_id: &str) -> bool;

    /// Validity intervals currently loaded for the identifier, as inclusive
    /// event-number ranges. Diagnostic only.
    fn valid_ranges(&self, data_id: &str) -> Vec<(u64, u64)>;
}

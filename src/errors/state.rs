// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::state::AlgState;
use std::fmt;

/// Errors that can occur while driving the per-algorithm state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    /// The algorithm index is outside the slot's state vector
    IndexOutOfBounds {
        /// The offending index
        index: usize,
        /// Number of algorithms tracked by the slot
        size: usize,
    },
    /// A transition outside the legal transition table was requested.
    /// The algorithm is forced into the ERROR state when this is reported.
    IllegalTransition {
        /// The algorithm the transition was requested for
        index: usize,
        /// State the algorithm was in
        from: AlgState,
        /// State that was requested
        to: AlgState,
    },
}

impl fmt::Display for StateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateError::IndexOutOfBounds { index, size } => {
                write!(f, "Algorithm index out of bounds ({} / {})", index, size)
            }
            StateError::IllegalTransition { index, from, to } => {
                write!(
                    f,
                    "[AlgIndex {}] Transition from {} to {} is not allowed",
                    index, from, to
                )
            }
        }
    }
}

impl std::error::Error for StateError {}

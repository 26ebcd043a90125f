// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Per-slot algorithm execution state machine.
//!
//! Every event slot tracks one state per algorithm, together with one index
//! set per state so that the scheduler can ask "which algorithms are
//! DATAREADY right now" without scanning the whole vector. The index sets
//! partition `[0..n)` at every observable moment.
//!
//! The legal transitions are:
//!
//! ```text
//! INITIAL      -> CONTROLREADY
//! CONTROLREADY -> DATAREADY
//! DATAREADY    -> SCHEDULED | RESOURCELESS
//! RESOURCELESS -> SCHEDULED
//! SCHEDULED    -> EVTACCEPTED | EVTREJECTED | ERROR
//! ```
//!
//! Requesting the state an algorithm is already in is a successful no-op;
//! this keeps the graph visitors idempotent. Any other transition forces
//! the algorithm into ERROR and reports a failure to the caller.

use crate::errors::StateError;
use std::collections::BTreeSet;
use std::fmt;
use std::ops::Index;

/// Execution states of the algorithms.
/// Must have contiguous integer values 0, 1 .. N.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AlgState {
    Initial = 0,
    ControlReady = 1,
    DataReady = 2,
    Resourceless = 3,
    Scheduled = 4,
    EvtAccepted = 5,
    EvtRejected = 6,
    Error = 7,
}

/// Number of discrete states; allows looping over all states.
pub const STATE_COUNT: usize = 8;

impl AlgState {
    /// All states in value order, for per-state iteration.
    pub const ALL: [AlgState; STATE_COUNT] = [
        AlgState::Initial,
        AlgState::ControlReady,
        AlgState::DataReady,
        AlgState::Resourceless,
        AlgState::Scheduled,
        AlgState::EvtAccepted,
        AlgState::EvtRejected,
        AlgState::Error,
    ];

    fn as_index(self) -> usize {
        self as usize
    }

    /// True for the terminal outcomes an executed algorithm can land in.
    pub fn is_executed(self) -> bool {
        matches!(self, AlgState::EvtAccepted | AlgState::EvtRejected)
    }
}

impl fmt::Display for AlgState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AlgState::Initial => "INITIAL",
            AlgState::ControlReady => "CONTROLREADY",
            AlgState::DataReady => "DATAREADY",
            AlgState::Resourceless => "RESOURCELESS",
            AlgState::Scheduled => "SCHEDULED",
            AlgState::EvtAccepted => "EVTACCEPTED",
            AlgState::EvtRejected => "EVTREJECTED",
            AlgState::Error => "ERROR",
        };
        f.write_str(name)
    }
}

/// State machine for the execution of algorithms within a single event.
///
/// Owned by an event slot; only the scheduler's activation loop mutates it,
/// so no internal synchronization is needed. Illegal transition attempts are
/// reported through `tracing` and force the offending algorithm into
/// [`AlgState::Error`], which acts as the terminal sink for violations.
#[derive(Debug, Clone)]
pub struct AlgExecStates {
    states: Vec<AlgState>,
    in_state: Vec<BTreeSet<usize>>,
}

impl AlgExecStates {
    /// Create a state vector for `n` algorithms, all in INITIAL.
    pub fn new(n: usize) -> Self {
        let mut in_state = vec![BTreeSet::new(); STATE_COUNT];
        in_state[AlgState::Initial.as_index()] = (0..n).collect();
        Self {
            states: vec![AlgState::Initial; n],
            in_state,
        }
    }

    fn legal(from: AlgState, to: AlgState) -> bool {
        use AlgState::*;
        matches!(
            (from, to),
            (Initial, ControlReady)
                | (ControlReady, DataReady)
                | (DataReady, Scheduled)
                | (DataReady, Resourceless)
                | (Resourceless, Scheduled)
                | (Scheduled, EvtAccepted)
                | (Scheduled, EvtRejected)
                | (Scheduled, Error)
        )
    }

    /// Request a transition for algorithm `i`.
    ///
    /// Cycling on the current state is a successful no-op. Anything outside
    /// the legal transition table forces the algorithm into ERROR and
    /// returns the violation.
    pub fn set(&mut self, i: usize, new_state: AlgState) -> Result<(), StateError> {
        if i >= self.states.len() {
            tracing::error!(
                index = i,
                size = self.states.len(),
                "algorithm index out of bounds"
            );
            return Err(StateError::IndexOutOfBounds {
                index: i,
                size: self.states.len(),
            });
        }

        let old_state = self.states[i];

        // Allow cycling of a single state
        if old_state == new_state {
            return Ok(());
        }

        if Self::legal(old_state, new_state) {
            self.states[i] = new_state;
            self.in_state[old_state.as_index()].remove(&i);
            self.in_state[new_state.as_index()].insert(i);
            Ok(())
        } else {
            tracing::error!(
                alg_index = i,
                from = %old_state,
                to = %new_state,
                "illegal state transition requested, forcing ERROR"
            );
            self.states[i] = AlgState::Error;
            self.in_state[old_state.as_index()].remove(&i);
            self.in_state[AlgState::Error.as_index()].insert(i);
            Err(StateError::IllegalTransition {
                index: i,
                from: old_state,
                to: new_state,
            })
        }
    }

    /// Return every algorithm to INITIAL.
    pub fn reset(&mut self) {
        let n = self.states.len();
        self.states.fill(AlgState::Initial);
        for set in &mut self.in_state {
            set.clear();
        }
        self.in_state[AlgState::Initial.as_index()] = (0..n).collect();
    }

    /// Check if at least one algorithm is in the requested state.
    pub fn contains(&self, state: AlgState) -> bool {
        !self.in_state[state.as_index()].is_empty()
    }

    /// Check if at least one algorithm is in any of the listed states.
    pub fn contains_any(&self, states: &[AlgState]) -> bool {
        states.iter().any(|s| self.contains(*s))
    }

    /// Copy of the set of algorithms currently in `state`.
    ///
    /// States change during the scheduler loop that iterates over this, so
    /// a snapshot is returned rather than a reference.
    pub fn indices_in(&self, state: AlgState) -> Vec<usize> {
        self.in_state[state.as_index()].iter().copied().collect()
    }

    /// Number of algorithms currently in `state`.
    pub fn count_in(&self, state: AlgState) -> usize {
        self.in_state[state.as_index()].len()
    }

    /// State of a single algorithm.
    pub fn get(&self, i: usize) -> AlgState {
        self.states[i]
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

impl Index<usize> for AlgExecStates {
    type Output = AlgState;

    fn index(&self, i: usize) -> &AlgState {
        &self.states[i]
    }
}

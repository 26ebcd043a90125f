// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Observability module for structured logging and tracing.
//!
//! Diagnostic messages are centralized as struct-based message types with a
//! `Display` implementation (human-readable) and a [`messages::StructuredLog`]
//! implementation (machine-readable fields + span creation). This keeps
//! magic strings out of the scheduler hot paths and gives every operational
//! event a queryable shape.

pub mod messages;

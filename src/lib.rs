// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod algorithms; // stub algorithms for tests and demos
pub mod config; // config loading + graph assembly
pub mod engine; // the scheduler
pub mod errors; // error handling
pub mod graph; // precedence rules graph + visitors
pub mod observability;
pub mod precedence; // precedence service
pub mod slot; // event slots
pub mod state; // algorithm execution states
pub mod traits; // collaborator contracts

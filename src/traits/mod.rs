// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod algorithm;
pub mod conditions;
pub mod resource_pool;
pub mod whiteboard;

pub use algorithm::{AlgOutcome, Algorithm};
pub use conditions::ConditionsService;
pub use resource_pool::{AlgHandle, AlgResourcePool, FixedAlgPool};
pub use whiteboard::{InMemoryWhiteboard, Whiteboard};

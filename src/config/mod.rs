// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

mod assembly;
mod loader;

pub use assembly::{assemble, build_options, precedence_options};
pub use loader::{
    load_and_validate_config, load_config, validate_config, Config, NodeConfig, SchedulerOptions,
};

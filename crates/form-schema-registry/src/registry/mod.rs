//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! Schema Registry facade
//!
//! This module provides the registry that callers interact with, the
//! builder that assembles it and the document pipeline it drives.

pub mod builder;
pub mod manager;
pub mod operations;
pub mod state;

// Re-export main types for convenience
pub use builder::SchemaRegistryBuilder;
pub use manager::SchemaRegistry;
pub use operations::DocumentPipeline;
pub use state::{RegistryState, RegistryStats};

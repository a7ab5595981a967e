//! shellrun-core: shared types and errors for the shellrun pipeline
//!
//! This crate provides the foundational types used by all shellrun sub-crates:
//! - Error types and Result alias
//! - Target description (architecture, OS, endianness, word size)
//! - The ambient context stack and its scoped overrides
//! - The lock serializing staged-file writes with child spawns

pub mod context;
pub mod error;
pub mod spawn;
pub mod target;

pub use context::{Context, ContextConfig, ContextGuard};
pub use error::{Result, ShellrunError};
pub use spawn::spawn_lock;
pub use target::{Arch, Endian, Os};

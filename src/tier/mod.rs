// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The two cache tiers consulted by the engine.

pub mod memory;
pub mod persistent;

pub use memory::MemoryTier;
pub use persistent::PersistentTier;

//! Conversational market analyst for nexus.
//!
//! Answers free-text queries from the current market store snapshot using
//! keyword intent classification and fixed response templates.

pub mod analyst;
pub mod error;
pub mod intent;

pub use analyst::{Archon, CONTEXT_CONFIDENCE, STILL_ANALYZING};
pub use error::{ArchonError, ArchonResult};
pub use intent::Intent;

//! Domain layer for convention analysis
//!
//! Architecture: Domain-Driven Design - pure domain models with no infrastructure concerns
//! - Diagnostics, descriptors and reports are rich types with behavior
//! - Everything here is independent of how sources are discovered or scanned

pub mod diagnostics;

//! Infrastructure layer: external collaborators behind traits
//!
//! Filesystem access and reference genome lookups.

pub mod genome;
pub mod traits;

pub use genome::{ChromosomeTable, ReferenceGenome};
pub use traits::{FileSystem, RealFileSystem};

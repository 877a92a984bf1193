//! Application layer: tree features built as visitors
//!
//! Persistence, merging, coexistence analysis and printing all drive the
//! domain traversal engine; file access goes through infrastructure traits.

pub mod analysis;
pub mod coexistence;
pub mod error;
pub mod error_ext;
pub mod merge;
pub mod persist;
pub mod print;

pub use analysis::{fraction_violations, subtree_fractions, FractionValidator};
pub use coexistence::{populate, CoexistenceTable, CoexistenceVisitor, PassSummary, Verdict};
pub use error::{ApplicationError, ApplicationResult};
pub use error_ext::IoResultExt;
pub use merge::{merge_into, ConflictKind, MergeConflict, MergeOptions, MergeReport};
pub use persist::{
    load, save, save_to_string, NodeRecord, ParentRef, TreeDocument, TreeLoader, TreeStore,
};
pub use print::{fraction_string, render_tree, to_dot, to_term_tree};

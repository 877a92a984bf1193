//! Domain layer: tree data structures and the traversal engine
//!
//! This layer is independent of external concerns (no I/O, no config loading).

pub mod arena;
pub mod error;
pub mod event;
pub mod registry;
pub mod subclone;
pub mod traverse;

pub use arena::{TreeArena, TreeNode};
pub use error::{DomainError, DomainResult};
pub use event::{EventCluster, EventKind, Extent, SomaticEvent};
pub use registry::ClusterRegistry;
pub use subclone::{NodeId, Subclone, SubcloneTree};
pub use traverse::{
    traverse, traverse_from, traverse_mut, traverse_post_order, visitor_fn, Traversal,
    TreeVisitor, TreeVisitorMut, VisitFlow,
};

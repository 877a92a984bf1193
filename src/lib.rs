//! Tumor subclone phylogeny trees.
//!
//! A [`SubcloneTree`](domain::SubcloneTree) holds subclones, each carrying a
//! shared [`EventCluster`](domain::EventCluster) and a cellular fraction.
//! Every feature (save/load, merge, coexistence, printing) is a visitor
//! driven by the traversal engine in [`domain::traverse`].

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod util;

pub use application::{ApplicationError, ApplicationResult};
pub use domain::{DomainError, DomainResult};

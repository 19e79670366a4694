//! Repository methods, implemented as `impl QcDb` blocks, and the
//! collaborator trait impls that delegate to them.

pub mod files;
pub mod gates;
pub mod jobs;
pub mod visits;

//! Domain layer types and invariants.

pub mod branches;
pub mod commit;

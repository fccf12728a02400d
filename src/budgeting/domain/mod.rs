//! Domain types for the budget accounting engine.
//!
//! Everything in this module is pure: validation, the snapshot calculator,
//! the period state machine rules, and the closing summary aggregation all
//! operate on in-memory values with no I/O.

pub mod additions;
pub mod amounts;
pub mod categories;
pub mod expenses;
pub mod periods;
pub mod snapshot;
pub mod summary;

//! Grid engine domain model.
//!
//! # Responsibility
//! - Grid topology, bingo detection and the card lifecycle guard.
//! - Plain card/item records handed to callers.
//!
//! # Invariants
//! - Everything in this module is pure; persistence lives in `repo`.

pub mod bingo;
pub mod card;
pub mod grid;
pub mod item;

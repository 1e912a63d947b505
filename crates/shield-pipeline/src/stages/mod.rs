//! One module per stage in spec.md §4.2's fixed sequence.

pub mod detect;
pub mod embed;
pub mod sanitize;
pub mod search;
pub mod sign;
pub mod verify;

//! Support code for the `parlance` binary: JSON fixture loading and
//! terminal rendering of partner replies.

pub mod fixtures;
pub mod render;

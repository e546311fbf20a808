//! Small dependency-free helpers shared by the XML reader and its tooling.

pub mod chars;
pub mod utf8;

//! The append-only memory-mapped backing stores and the file-lock /
//! growth protocol they share, per `spec.md` §4.1-§4.3.

pub mod bigendian;
pub mod dtmap;
pub mod indexmap;
pub mod terms;

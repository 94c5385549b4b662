//! Board layout services: the grid allocator, named-zone templates, and the
//! spatial index.

pub mod allocator;
pub mod spatial;
pub mod templates;

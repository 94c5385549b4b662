//! The collaborative whiteboard: authoritative per-session CRDT documents,
//! layout services (grid allocator, zone templates, spatial index), and the
//! board-summary digest the LLM sees instead of the raw object list.

pub mod digest;
pub mod doc;
pub mod layout;

pub use digest::{board_digest, compress_board_objects, BoardDigest};
pub use doc::{DocRegistry, SessionDoc};
pub use layout::allocator::{AllocatorMap, AnchorPlacement, Placement, ReserveRequest, Strategy};
pub use layout::spatial::SpatialIndex;
pub use layout::templates::{resolve_zone, ZoneRect};

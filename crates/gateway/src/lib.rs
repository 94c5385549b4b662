//! The TutorGate gateway: REST surface, chat and whiteboard WebSocket
//! endpoints, and the per-session tutoring runtime (planner, lean executor,
//! deterministic evaluator, background analyzer).

pub mod api;
pub mod auth;
pub mod runtime;
pub mod state;
pub mod ws;

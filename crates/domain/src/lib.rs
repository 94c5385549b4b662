//! Shared domain types for TutorGate.
//!
//! Everything that crosses a crate boundary lives here: the error enum,
//! chat/tool-call envelopes, learner model, canvas object specs, whiteboard
//! actions, response envelopes, the per-session tutor context, and the
//! top-level configuration.

pub mod canvas;
pub mod chat;
pub mod config;
pub mod context;
pub mod error;
pub mod learner;
pub mod objective;
pub mod quiz;
pub mod response;

//! WebSocket endpoints: the chat channel (the turn loop's home) and the
//! whiteboard delta-sync channel.

pub mod chat;
pub mod whiteboard;

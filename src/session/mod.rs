//! MCP session management (spec §3.6).
//!
//! Sessions are identified by the opaque `Mcp-Session-Id` header and carry
//! the negotiated protocol version, recorded client info, and the namespace
//! the session was bound to on creation.

mod thread;

pub use thread::{Session, SessionStore};

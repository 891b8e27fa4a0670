//! ==============================================================================
//! assistant - chat collaborator over the generative-language api
//! ==============================================================================
//!
//! the core only hands out the ai snapshot; everything here turns it into a
//! context block and talks to the external completion endpoint.
//!
//!     SensorHub::ai_snapshot ──> context::build_sensors_context
//!                                        │
//!                     ChatSession::send ─┴─> GeminiClient::generate_chat
//!
//! ==============================================================================

pub mod context;
pub mod gemini;
pub mod session;

pub use context::build_sensors_context;
pub use gemini::{ChatMessage, GeminiClient, GenerateOptions, Role};
pub use session::ChatSession;

//! Client core for the MindStash conversational assistant.
//!
//! Decodes the backend's line-oriented event stream into conversation state,
//! keeps session continuity across restarts, and fires the once-daily hidden
//! briefing turn. The embedding dashboard consumes `AssistantSignal`s to know
//! when its item caches went stale.

pub mod api;
pub mod briefing;
pub mod chat;
pub mod config;
pub mod protocol;
pub mod session;
pub mod store;

pub use api::{ApiClient, ChatBackend, SessionMessage, SessionSummary};
pub use briefing::{BriefingDelivery, BRIEFING_TRIGGER};
pub use chat::{ChatMessage, Role, ToolCallState, ToolCallStatus};
pub use config::AssistantConfig;
pub use protocol::{FrameDecoder, StreamEvent};
pub use session::{AssistantSession, AssistantSignal};
pub use store::AssistantStore;

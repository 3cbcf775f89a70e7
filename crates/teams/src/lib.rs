//! Microsoft Teams integration for the Collaborator bot.
//!
//! - **Activities** (`activity`) - Bot Framework activity model and its
//!   conversion into platform-neutral events
//! - **Events** (`events`) - dispatcher routing messages and feedback to services
//! - **Outbound** (`outbound`) - replies with AI markers, feedback buttons,
//!   citations and Adaptive Cards
//! - **Connector** (`connector`) - Bot Framework REST client with token caching
//!
//! # Architecture
//!
//! ```text
//! POST /api/messages → Activity → TeamsEvent → EventDispatcher → Handlers
//!                                                   ↓
//!                       ConversationClient ← OutboundMessage
//! ```

pub mod activity;
pub mod connector;
pub mod events;
pub mod outbound;

pub use activity::{Activity, ActivityError, ConversationReference};
pub use connector::{ConversationClient, HttpConnectorClient, TransportError};
pub use events::{EventContext, EventDispatcher, HandlerResult, TeamsEvent, TeamsEventType};
pub use outbound::{citation_card, finalize_response, OutboundMessage};

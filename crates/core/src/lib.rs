pub mod citation;
pub mod config;
pub mod domain;
pub mod errors;
pub mod time_range;

pub use citation::{deep_link, Citation};
pub use domain::action_item::{
    ActionItem, ActionItemFilter, ActionItemPriority, ActionItemStatus, NewActionItem,
};
pub use domain::context::{Member, MessageContext, TimeWindow};
pub use domain::conversation::{ConversationId, MessageRecord, MessageRole};
pub use domain::feedback::{FeedbackRecord, FeedbackSummary, Reaction};
pub use domain::inbound::{ConversationKind, InboundMessage};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use time_range::{find_time_phrase, parse_time_phrase, TimeRangeError};

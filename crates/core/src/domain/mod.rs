pub mod action_item;
pub mod context;
pub mod conversation;
pub mod feedback;
pub mod inbound;

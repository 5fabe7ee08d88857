pub mod conversation;
pub mod message;
pub mod view;

pub use conversation::{Conversation, ParticipantPair};
pub use message::{Message, MessageBody, MessagePayload, MessageType, Reaction, ReplySummary};
pub use view::{ConversationView, MessageView, PropertySummary, UserSummary};

pub mod call;
pub mod conversation;
pub mod matching;
pub mod message;
pub mod presence;

pub use call::{Call, CallStatus, CandidateSide, ConnectivityCandidate};
pub use conversation::Conversation;
pub use matching::Match;
pub use message::{DeliveryState, Message, MessagePayload, MessageStatus, MessageType};
pub use presence::{PresenceRecord, TypingIndicator};

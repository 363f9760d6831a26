pub mod call_service;
pub mod conversation_service;
pub mod match_service;
pub mod message_service;
pub mod presence_service;
pub mod profile_client;
pub mod push;

pub use call_service::CallService;
pub use conversation_service::ConversationService;
pub use match_service::MatchService;
pub use message_service::MessageService;
pub use presence_service::PresenceService;

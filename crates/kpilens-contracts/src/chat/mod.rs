mod command_registry;
mod intent_parser;
mod transcript;

pub use command_registry::CHAT_HELP_COMMANDS;
pub use intent_parser::{parse_intent, Intent};
pub use transcript::{ChatMessage, ChatRole, ChatTranscript, CHAT_HISTORY_WINDOW};

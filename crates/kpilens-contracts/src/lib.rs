pub mod chat;
pub mod events;
pub mod prompts;
pub mod report;
pub mod similarity;
pub mod validation;

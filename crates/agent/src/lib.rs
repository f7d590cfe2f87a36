pub mod classifier;
pub mod composer;
pub mod knowledge;
pub mod llm;

pub use classifier::LlmReplyClassifier;
pub use composer::{parse_subject_body, LlmEmailComposer};
pub use knowledge::knowledge_markdown;
pub use llm::{ChatMessage, ChatRequest, ChatRole, HttpLlmClient, LlmClient};

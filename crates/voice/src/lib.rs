pub mod gateway;
pub mod handoff;
pub mod poll;

pub use gateway::{
    AgentSpec, CallHandle, ConversationSnapshot, HttpVoiceGateway, KnowledgeBaseRef, VoiceError,
    VoiceGateway,
};
pub use handoff::{ChannelHandoff, HandoffError, HandoffOutcome, HandoffRunner, RecordingHandoff};
pub use poll::{PollError, TranscriptPoller};

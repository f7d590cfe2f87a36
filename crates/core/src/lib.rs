pub mod classifier;
pub mod compose;
pub mod config;
pub mod domain;
pub mod engine;
pub mod errors;
pub mod phone;
pub mod scheduler;
pub mod thread;

pub use classifier::{
    ClassifierContext, ClassifierError, EmailMessage, EmailSender, ReplyAnalysis, ReplyClassifier,
    ReplyIntent,
};
pub use compose::{ComposeError, EmailComposer, EmailDraft};
pub use domain::assignment::{AssignmentId, CreatorAssignment};
pub use domain::communication::{
    Communication, CommunicationId, CommunicationStatus, CommunicationType, Direction,
};
pub use domain::negotiation::{Negotiation, NegotiationId, NegotiationStatus};
pub use domain::party::{Brand, BrandId, Campaign, CampaignId, Creator, CreatorId};
pub use domain::voice::{
    VoiceAgent, VoiceAgentId, VoiceCallStatus, VoiceCommunication, VoiceCommunicationId,
    VoiceTranscriptMessage, VoiceTranscriptRole,
};
pub use engine::{
    EngineAction, EscalationPolicy, NegotiationEvent, NegotiationMachine, TransitionError,
    TransitionOutcome,
};
pub use errors::OrchestrationError;
pub use phone::{normalize_phone, PhoneError};
pub use scheduler::{FollowUpScheduler, SchedulerError};
pub use thread::{build_references, parse_one_mailbox, Mailbox, ThreadCodec, ThreadCodecError};

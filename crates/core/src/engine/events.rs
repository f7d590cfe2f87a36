use serde::{Deserialize, Serialize};

use crate::classifier::ReplyIntent;
use crate::domain::negotiation::NegotiationStatus;

/// The four event kinds that can reach a negotiation. Every event arrives as
/// an independent stateless invocation; the payload carries everything the
/// transition needs beyond the freshly loaded negotiation itself.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NegotiationEvent {
    /// First outbound offer dispatched for a freshly created negotiation.
    InitialSend,
    /// Classified inbound reply. `phone` is already normalized, or `None`
    /// when the classifier found no usable number.
    InboundReply { intent: ReplyIntent, phone: Option<String> },
    /// Delayed follow-up fired by the scheduler. The flags are computed from
    /// a fresh read of the communication log immediately before applying.
    ScheduledFollowUp { creator_replied: bool, follow_ups_sent: u32 },
    /// The voice transport finished a call for this negotiation.
    VoiceCallCompleted,
}

impl NegotiationEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InitialSend => "initial_send",
            Self::InboundReply { .. } => "inbound_reply",
            Self::ScheduledFollowUp { .. } => "scheduled_follow_up",
            Self::VoiceCallCompleted => "voice_call_completed",
        }
    }
}

/// Side-effect requests emitted by a transition. The engine never performs
/// I/O itself; dispatchers re-read negotiation state before acting on these.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineAction {
    /// Synthesize the next email from the transcript and send it now.
    SendReply,
    /// Record the discovered phone on the creator's assignment ledger entry.
    PersistPhone { phone: String },
    /// Hand the negotiation off to the voice channel.
    TriggerHandoff { phone: String },
    /// Arm (or re-arm) the delayed passive follow-up.
    ScheduleFollowUp,
    /// Push a reply summary to the brand's notification channel.
    NotifyBrand,
    /// Cancel any pending follow-up task for this negotiation.
    StopFollowUps,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: NegotiationStatus,
    pub to: NegotiationStatus,
    pub actions: Vec<EngineAction>,
    /// How much `escalation_count` grows when this outcome is applied.
    /// Never negative: the counter is monotonically non-decreasing.
    pub escalation_increment: u32,
}

impl TransitionOutcome {
    pub fn is_noop(&self) -> bool {
        self.from == self.to && self.actions.is_empty() && self.escalation_increment == 0
    }
}

//! The negotiation state machine. Transitions are pure: `(negotiation,
//! event) -> (next status, side-effect requests)`. Persisting the next
//! status and dispatching the requested effects is the caller's job, guarded
//! by a fresh state read, which keeps every event handler idempotent under
//! at-least-once delivery.

use thiserror::Error;

use crate::classifier::ReplyIntent;
use crate::domain::negotiation::{Negotiation, NegotiationStatus};
use crate::engine::events::{EngineAction, NegotiationEvent, TransitionOutcome};

/// Resolution of the escalation-count semantics: either a pure
/// contact-attempts counter, or a hard cap that pauses the negotiation once
/// the count reaches `max_escalations`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EscalationPolicy {
    ActivityCounter,
    HardCap { max_escalations: u32 },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("invalid transition from `{status}` on `{event}`")]
    InvalidTransition { status: &'static str, event: &'static str },
}

#[derive(Clone, Debug)]
pub struct NegotiationMachine {
    policy: EscalationPolicy,
    max_follow_ups: u32,
}

impl NegotiationMachine {
    pub fn new(policy: EscalationPolicy, max_follow_ups: u32) -> Self {
        Self { policy, max_follow_ups }
    }

    pub fn policy(&self) -> EscalationPolicy {
        self.policy
    }

    pub fn apply(
        &self,
        negotiation: &Negotiation,
        event: &NegotiationEvent,
    ) -> Result<TransitionOutcome, TransitionError> {
        let current = negotiation.status;

        match event {
            NegotiationEvent::InitialSend => {
                if current != NegotiationStatus::Initiated {
                    return Err(TransitionError::InvalidTransition {
                        status: current.as_str(),
                        event: event.kind(),
                    });
                }
                Ok(TransitionOutcome {
                    from: current,
                    to: NegotiationStatus::EmailSent,
                    actions: vec![EngineAction::ScheduleFollowUp],
                    escalation_increment: 0,
                })
            }

            NegotiationEvent::InboundReply { intent, phone } => {
                Ok(self.apply_inbound_reply(negotiation, *intent, phone.as_deref()))
            }

            NegotiationEvent::ScheduledFollowUp { creator_replied, follow_ups_sent } => {
                // Stale firings are no-ops, never errors: the creator may
                // have replied or the negotiation may have settled while the
                // task sat in the queue.
                let skip = current.is_terminal()
                    || *creator_replied
                    || *follow_ups_sent >= self.max_follow_ups;

                let actions = if skip {
                    Vec::new()
                } else {
                    vec![EngineAction::SendReply, EngineAction::ScheduleFollowUp]
                };

                Ok(TransitionOutcome {
                    from: current,
                    to: current,
                    actions,
                    escalation_increment: 0,
                })
            }

            NegotiationEvent::VoiceCallCompleted => Ok(TransitionOutcome {
                from: current,
                to: current,
                actions: Vec::new(),
                escalation_increment: 0,
            }),
        }
    }

    fn apply_inbound_reply(
        &self,
        negotiation: &Negotiation,
        intent: ReplyIntent,
        phone: Option<&str>,
    ) -> TransitionOutcome {
        let current = negotiation.status;

        if current.is_terminal() {
            // The transcript already recorded the reply; the brand still
            // hears about it, but a settled negotiation sends nothing.
            return TransitionOutcome {
                from: current,
                to: current,
                actions: vec![EngineAction::NotifyBrand],
                escalation_increment: 0,
            };
        }

        let (to, mut actions) = match intent {
            ReplyIntent::Accepted => (
                NegotiationStatus::Accepted,
                vec![EngineAction::StopFollowUps],
            ),
            ReplyIntent::Cancelled => (
                NegotiationStatus::Cancelled,
                vec![EngineAction::StopFollowUps],
            ),
            ReplyIntent::InitiateCall => match phone {
                Some(phone) => (
                    NegotiationStatus::InitiateCall,
                    vec![
                        EngineAction::PersistPhone { phone: phone.to_string() },
                        EngineAction::TriggerHandoff { phone: phone.to_string() },
                    ],
                ),
                // The classifier wants a call but produced no usable
                // number: keep the thread alive and ask again.
                None => (
                    NegotiationStatus::InitiateCall,
                    vec![EngineAction::SendReply, EngineAction::ScheduleFollowUp],
                ),
            },
            ReplyIntent::RequestPhone => (
                NegotiationStatus::RequestPhone,
                vec![EngineAction::SendReply, EngineAction::ScheduleFollowUp],
            ),
            ReplyIntent::Escalate => (
                NegotiationStatus::Escalate,
                vec![EngineAction::SendReply, EngineAction::ScheduleFollowUp],
            ),
        };

        // A terminal intent always wins over the cap; otherwise reaching the
        // cap pauses the negotiation instead of continuing the thread.
        let capped = match self.policy {
            EscalationPolicy::HardCap { max_escalations } => {
                !to.is_terminal() && negotiation.escalation_count + 1 >= max_escalations
            }
            EscalationPolicy::ActivityCounter => false,
        };

        let to = if capped {
            actions = vec![EngineAction::StopFollowUps];
            NegotiationStatus::Paused
        } else {
            to
        };

        actions.push(EngineAction::NotifyBrand);

        TransitionOutcome { from: current, to, actions, escalation_increment: 1 }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use crate::classifier::ReplyIntent;
    use crate::domain::negotiation::{Negotiation, NegotiationId, NegotiationStatus};
    use crate::domain::party::{BrandId, CampaignId, CreatorId};
    use crate::engine::events::{EngineAction, NegotiationEvent};

    use super::{EscalationPolicy, NegotiationMachine, TransitionError};

    fn negotiation(status: NegotiationStatus, escalation_count: u32) -> Negotiation {
        let now = Utc::now();
        Negotiation {
            id: NegotiationId("n-1".to_string()),
            campaign_id: CampaignId("camp-1".to_string()),
            brand_id: BrandId("brand-1".to_string()),
            creator_id: CreatorId("creator-1".to_string()),
            status,
            escalation_count,
            ai_agent_notes: String::new(),
            phone_contact_attempted: false,
            voice_call_completed: false,
            created_at: now,
            updated_at: now,
        }
    }

    fn machine() -> NegotiationMachine {
        NegotiationMachine::new(EscalationPolicy::ActivityCounter, 3)
    }

    #[test]
    fn initial_send_moves_initiated_to_email_sent_and_arms_the_follow_up() {
        let outcome = machine()
            .apply(&negotiation(NegotiationStatus::Initiated, 0), &NegotiationEvent::InitialSend)
            .expect("initiated -> email_sent");

        assert_eq!(outcome.to, NegotiationStatus::EmailSent);
        assert_eq!(outcome.actions, vec![EngineAction::ScheduleFollowUp]);
        assert_eq!(outcome.escalation_increment, 0);
    }

    #[test]
    fn initial_send_is_rejected_outside_the_initiated_state() {
        let error = machine()
            .apply(&negotiation(NegotiationStatus::EmailSent, 0), &NegotiationEvent::InitialSend)
            .expect_err("double initial send");

        assert!(matches!(error, TransitionError::InvalidTransition { .. }));
    }

    #[test]
    fn initiate_call_with_phone_persists_it_and_hands_off() {
        let outcome = machine()
            .apply(
                &negotiation(NegotiationStatus::EmailSent, 0),
                &NegotiationEvent::InboundReply {
                    intent: ReplyIntent::InitiateCall,
                    phone: Some("9876543210".to_string()),
                },
            )
            .expect("email_sent -> initiate_call");

        assert_eq!(outcome.to, NegotiationStatus::InitiateCall);
        assert_eq!(outcome.escalation_increment, 1);
        assert_eq!(
            outcome.actions,
            vec![
                EngineAction::PersistPhone { phone: "9876543210".to_string() },
                EngineAction::TriggerHandoff { phone: "9876543210".to_string() },
                EngineAction::NotifyBrand,
            ]
        );
    }

    #[test]
    fn initiate_call_without_phone_keeps_asking() {
        let outcome = machine()
            .apply(
                &negotiation(NegotiationStatus::EmailSent, 0),
                &NegotiationEvent::InboundReply {
                    intent: ReplyIntent::InitiateCall,
                    phone: None,
                },
            )
            .expect("transition");

        assert!(outcome.actions.contains(&EngineAction::SendReply));
        assert!(!outcome
            .actions
            .iter()
            .any(|action| matches!(action, EngineAction::TriggerHandoff { .. })));
    }

    #[test]
    fn request_phone_and_escalate_send_an_immediate_reply() {
        for intent in [ReplyIntent::RequestPhone, ReplyIntent::Escalate] {
            let outcome = machine()
                .apply(
                    &negotiation(NegotiationStatus::EmailSent, 0),
                    &NegotiationEvent::InboundReply { intent, phone: None },
                )
                .expect("transition");

            assert_eq!(
                outcome.actions,
                vec![
                    EngineAction::SendReply,
                    EngineAction::ScheduleFollowUp,
                    EngineAction::NotifyBrand,
                ]
            );
            assert_eq!(outcome.escalation_increment, 1);
        }
    }

    #[test]
    fn accepted_and_cancelled_stop_future_follow_ups() {
        for (intent, expected) in [
            (ReplyIntent::Accepted, NegotiationStatus::Accepted),
            (ReplyIntent::Cancelled, NegotiationStatus::Cancelled),
        ] {
            let outcome = machine()
                .apply(
                    &negotiation(NegotiationStatus::RequestPhone, 2),
                    &NegotiationEvent::InboundReply { intent, phone: None },
                )
                .expect("transition");

            assert_eq!(outcome.to, expected);
            assert_eq!(
                outcome.actions,
                vec![EngineAction::StopFollowUps, EngineAction::NotifyBrand]
            );
        }
    }

    #[test]
    fn hard_cap_pauses_the_negotiation_when_the_count_reaches_the_limit() {
        let machine = NegotiationMachine::new(EscalationPolicy::HardCap { max_escalations: 2 }, 3);
        let outcome = machine
            .apply(
                &negotiation(NegotiationStatus::Escalate, 1),
                &NegotiationEvent::InboundReply { intent: ReplyIntent::Escalate, phone: None },
            )
            .expect("transition");

        assert_eq!(outcome.to, NegotiationStatus::Paused);
        assert_eq!(outcome.actions, vec![EngineAction::StopFollowUps, EngineAction::NotifyBrand]);
    }

    #[test]
    fn hard_cap_never_overrides_a_terminal_intent() {
        let machine = NegotiationMachine::new(EscalationPolicy::HardCap { max_escalations: 2 }, 3);
        let outcome = machine
            .apply(
                &negotiation(NegotiationStatus::Escalate, 5),
                &NegotiationEvent::InboundReply { intent: ReplyIntent::Accepted, phone: None },
            )
            .expect("transition");

        assert_eq!(outcome.to, NegotiationStatus::Accepted);
    }

    #[test]
    fn replies_on_settled_negotiations_only_notify_the_brand() {
        for status in
            [NegotiationStatus::Accepted, NegotiationStatus::Cancelled, NegotiationStatus::Paused]
        {
            let outcome = machine()
                .apply(
                    &negotiation(status, 4),
                    &NegotiationEvent::InboundReply {
                        intent: ReplyIntent::RequestPhone,
                        phone: None,
                    },
                )
                .expect("transition");

            assert_eq!(outcome.to, status);
            assert_eq!(outcome.actions, vec![EngineAction::NotifyBrand]);
            assert_eq!(outcome.escalation_increment, 0);
        }
    }

    #[test]
    fn scheduled_follow_up_sends_and_rearms_when_the_thread_is_quiet() {
        let outcome = machine()
            .apply(
                &negotiation(NegotiationStatus::EmailSent, 0),
                &NegotiationEvent::ScheduledFollowUp {
                    creator_replied: false,
                    follow_ups_sent: 0,
                },
            )
            .expect("transition");

        assert_eq!(outcome.to, NegotiationStatus::EmailSent);
        assert_eq!(outcome.actions, vec![EngineAction::SendReply, EngineAction::ScheduleFollowUp]);
    }

    #[test]
    fn scheduled_follow_up_is_a_silent_noop_after_a_reply() {
        let outcome = machine()
            .apply(
                &negotiation(NegotiationStatus::EmailSent, 1),
                &NegotiationEvent::ScheduledFollowUp {
                    creator_replied: true,
                    follow_ups_sent: 0,
                },
            )
            .expect("transition");

        assert!(outcome.is_noop());
    }

    #[test]
    fn scheduled_follow_up_is_a_silent_noop_on_terminal_negotiations() {
        for status in
            [NegotiationStatus::Accepted, NegotiationStatus::Cancelled, NegotiationStatus::Paused]
        {
            let outcome = machine()
                .apply(
                    &negotiation(status, 1),
                    &NegotiationEvent::ScheduledFollowUp {
                        creator_replied: false,
                        follow_ups_sent: 0,
                    },
                )
                .expect("transition");

            assert!(outcome.is_noop());
        }
    }

    #[test]
    fn scheduled_follow_up_respects_the_passive_send_budget() {
        let outcome = machine()
            .apply(
                &negotiation(NegotiationStatus::EmailSent, 0),
                &NegotiationEvent::ScheduledFollowUp {
                    creator_replied: false,
                    follow_ups_sent: 3,
                },
            )
            .expect("transition");

        assert!(outcome.is_noop());
    }

    #[test]
    fn voice_call_completion_never_changes_status() {
        let outcome = machine()
            .apply(
                &negotiation(NegotiationStatus::InitiateCall, 2),
                &NegotiationEvent::VoiceCallCompleted,
            )
            .expect("transition");

        assert_eq!(outcome.from, outcome.to);
        assert!(outcome.actions.is_empty());
    }

    #[test]
    fn replay_is_deterministic_for_the_same_event_sequence() {
        let machine = machine();
        let events = [
            NegotiationEvent::InitialSend,
            NegotiationEvent::InboundReply { intent: ReplyIntent::RequestPhone, phone: None },
            NegotiationEvent::InboundReply {
                intent: ReplyIntent::InitiateCall,
                phone: Some("+919876543210".to_string()),
            },
        ];

        let run = || {
            let mut negotiation = negotiation(NegotiationStatus::Initiated, 0);
            let mut trace = Vec::new();
            for event in &events {
                let outcome = machine.apply(&negotiation, event).expect("transition");
                negotiation.status = outcome.to;
                negotiation.escalation_count += outcome.escalation_increment;
                trace.push(outcome);
            }
            (negotiation.status, negotiation.escalation_count, trace)
        };

        assert_eq!(run(), run());
    }
}

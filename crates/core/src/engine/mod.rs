pub mod events;
pub mod machine;

pub use events::{EngineAction, NegotiationEvent, TransitionOutcome};
pub use machine::{EscalationPolicy, NegotiationMachine, TransitionError};

pub mod notify;
pub mod transport;

pub use notify::{
    BrandNotifier, HttpBrandNotifier, NotifyError, RecordingBrandNotifier, ReplyNotification,
};
pub use transport::{
    EmailAddress, EmailTransport, FailingEmailTransport, HttpEmailTransport, OutboundEmail,
    RecordingEmailTransport, TransportError,
};

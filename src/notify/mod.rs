//! Notification delivery
//!
//! Payload shaping per webhook format, per-channel delivery with retry, and
//! fan-out routing across a rule's channels.

mod channel;
mod payload;
mod router;
mod terminal;
mod transport;

pub use channel::{AttemptSink, ChannelAdapter, DeliveryPolicy, SendOutcome};
pub use payload::{AlertPayload, NotificationKind};
pub use router::{DispatchResult, NotificationRouter};
pub use terminal::TerminalNotifier;
pub use transport::{ChannelTransport, HttpTransport};

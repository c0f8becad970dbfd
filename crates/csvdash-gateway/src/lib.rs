pub mod backoff;
pub mod binding;
pub mod channel;
pub mod lifecycle;
pub mod memory;
pub mod transport;
pub mod ws;

pub use backoff::ReconnectPolicy;
pub use binding::ChannelBinding;
pub use channel::{Channel, ChannelState, Subscription};
pub use transport::{Connector, TransportEvent, TransportLink};

//! Same-origin publish/subscribe between tabs.

mod channel;
mod message;

pub use channel::{BroadcastChannel, BroadcastHub, ListenerGuard, Subscription};
pub use message::{BroadcastMessage, LOGOUT_MODAL_SYNC};

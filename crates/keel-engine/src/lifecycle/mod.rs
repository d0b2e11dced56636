//! Host lifecycle notifications and the queue that carries them to the owner.

mod bus;
mod event;

pub use bus::{EventSender, LifecycleEventBus};
pub use event::LifecycleEvent;

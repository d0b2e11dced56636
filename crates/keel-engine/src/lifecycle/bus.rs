use crate::error::{Error, Result};

use super::LifecycleEvent;

/// Cloneable producer side of the [`LifecycleEventBus`].
///
/// Safe to use from any thread; sending never blocks.
#[derive(Debug, Clone)]
pub struct EventSender {
    sender: flume::Sender<LifecycleEvent>,
}

impl EventSender {
    /// Enqueues `event`. Fails with [`Error::Destroyed`] once the bus has
    /// delivered `Destroy`.
    pub fn send(&self, event: LifecycleEvent) -> Result<()> {
        log::trace!("enqueue {}", event.name());
        self.sender.send(event).map_err(|flume::SendError(event)| {
            log::debug!("dropping {} sent after destroy", event.name());
            Error::Destroyed
        })
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_disconnected()
    }
}

/// Multi-producer queue of [`LifecycleEvent`]s with a single draining owner.
///
/// Events are delivered in arrival order. Once `Destroy` is drained the bus
/// closes: anything queued behind it is discarded and later sends fail.
#[derive(Debug)]
pub struct LifecycleEventBus {
    sender: flume::Sender<LifecycleEvent>,
    receiver: Option<flume::Receiver<LifecycleEvent>>,
}

impl LifecycleEventBus {
    pub fn new() -> Self {
        let (sender, receiver) = flume::unbounded();
        Self {
            sender,
            receiver: Some(receiver),
        }
    }

    pub fn sender(&self) -> EventSender {
        EventSender {
            sender: self.sender.clone(),
        }
    }

    /// Number of events waiting to be drained.
    pub fn pending(&self) -> usize {
        self.receiver.as_ref().map_or(0, |r| r.len())
    }

    pub fn is_closed(&self) -> bool {
        self.receiver.is_none()
    }

    /// Takes every queued event, stopping after `Destroy`.
    pub fn drain(&mut self) -> Vec<LifecycleEvent> {
        let Some(receiver) = self.receiver.as_ref() else {
            return Vec::new();
        };

        let mut out = Vec::with_capacity(receiver.len());
        let mut destroyed = false;
        for event in receiver.try_iter() {
            destroyed = matches!(event, LifecycleEvent::Destroy);
            out.push(event);
            if destroyed {
                break;
            }
        }

        if destroyed {
            self.close();
        }
        out
    }

    /// Closes the bus without waiting for `Destroy`.
    pub fn close(&mut self) {
        let Some(receiver) = self.receiver.take() else {
            return;
        };

        let discarded: Vec<&'static str> = receiver.try_iter().map(|e| e.name()).collect();
        if !discarded.is_empty() {
            log::warn!(
                "discarded {} event(s) queued after Destroy: {:?}",
                discarded.len(),
                discarded
            );
        }
        log::debug!("lifecycle bus closed");
    }
}

impl Default for LifecycleEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::power::ThermalLevel;
    use std::thread;

    fn names(events: &[LifecycleEvent]) -> Vec<&'static str> {
        events.iter().map(LifecycleEvent::name).collect()
    }

    #[test]
    fn drains_in_arrival_order() {
        let mut bus = LifecycleEventBus::new();
        let tx = bus.sender();
        tx.send(LifecycleEvent::Paused).unwrap();
        tx.send(LifecycleEvent::LowMemory).unwrap();
        tx.send(LifecycleEvent::Resumed).unwrap();
        assert_eq!(bus.pending(), 3);

        assert_eq!(names(&bus.drain()), ["Paused", "LowMemory", "Resumed"]);
        assert_eq!(bus.pending(), 0);
        assert!(bus.drain().is_empty());
    }

    #[test]
    fn destroy_closes_the_bus() {
        let mut bus = LifecycleEventBus::new();
        let tx = bus.sender();
        tx.send(LifecycleEvent::Paused).unwrap();
        tx.send(LifecycleEvent::Destroy).unwrap();
        tx.send(LifecycleEvent::Resumed).unwrap();

        assert_eq!(names(&bus.drain()), ["Paused", "Destroy"]);
        assert!(bus.is_closed());
        assert!(tx.is_closed());
        assert_eq!(tx.send(LifecycleEvent::Resumed), Err(Error::Destroyed));
        assert!(bus.drain().is_empty());
    }

    #[test]
    fn accepts_events_from_other_threads() {
        let mut bus = LifecycleEventBus::new();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let tx = bus.sender();
                thread::spawn(move || {
                    for _ in 0..25 {
                        tx.send(LifecycleEvent::Thermal(ThermalLevel::Fair)).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(bus.drain().len(), 100);
    }
}

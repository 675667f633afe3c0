// logcore - events.rs
//
// Queued event delivery, generalised from the teacher's `TailManager`/
// `DirWatcher` pattern: a background worker owns a `Sender<T>`, the facade
// living on the caller's thread owns the `Receiver<T>` and drains it with a
// non-blocking `poll`/`drain` call. No callback is ever invoked on the
// worker thread, so facade methods never run user code while holding a
// lock (Design Notes §9, "Observer callbacks").

use std::sync::mpsc;

/// The caller-side half of an event channel: polled from the caller's
/// thread, never blocks.
pub struct EventQueue<T> {
    rx: Option<mpsc::Receiver<T>>,
}

impl<T> EventQueue<T> {
    /// Create an empty queue with no producer attached yet.
    pub fn empty() -> Self {
        Self { rx: None }
    }

    /// Create a connected producer/consumer pair. The producer is handed to
    /// the background worker; `self` keeps the consumer half.
    pub fn attach(&mut self) -> mpsc::Sender<T> {
        let (tx, rx) = mpsc::channel();
        self.rx = Some(rx);
        tx
    }

    /// Drain all currently available events without blocking.
    pub fn drain(&mut self) -> Vec<T> {
        let Some(rx) = &self.rx else {
            return Vec::new();
        };
        let mut events = Vec::new();
        loop {
            match rx.try_recv() {
                Ok(event) => events.push(event),
                Err(mpsc::TryRecvError::Empty) => break,
                Err(mpsc::TryRecvError::Disconnected) => {
                    self.rx = None;
                    break;
                }
            }
        }
        events
    }
}

impl<T> Default for EventQueue<T> {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_returns_all_sent_events() {
        let mut q: EventQueue<i32> = EventQueue::empty();
        let tx = q.attach();
        tx.send(1).unwrap();
        tx.send(2).unwrap();
        assert_eq!(q.drain(), vec![1, 2]);
        assert!(q.drain().is_empty());
    }

    #[test]
    fn disconnected_producer_yields_empty_drain() {
        let mut q: EventQueue<i32> = EventQueue::empty();
        {
            let _tx = q.attach();
        }
        assert!(q.drain().is_empty());
    }
}

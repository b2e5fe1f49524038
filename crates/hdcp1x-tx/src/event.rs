use core::sync::atomic::{AtomicU16, AtomicU32, Ordering};

use hdcp1x_hal::LinkEvents;

/// Inputs of the transmit state machine.
/// Discriminants fix the dispatch order of a drained batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Event {
    Null = 0,
    Authenticate = 1,
    Check = 2,
    Disable = 3,
    Enable = 4,
    /// Reserved. Nothing produces it and no state handles it.
    LinkDown = 5,
    PhyDown = 6,
    PhyUp = 7,
    Poll = 8,
    Timeout = 9,
}

impl Event {
    pub const ALL: [Event; 10] = [
        Event::Null,
        Event::Authenticate,
        Event::Check,
        Event::Disable,
        Event::Enable,
        Event::LinkDown,
        Event::PhyDown,
        Event::PhyUp,
        Event::Poll,
        Event::Timeout,
    ];

    const fn bit(self) -> u16 {
        1 << (self as u8)
    }

    /// A later event of this kind cancels a pending one of the returned kind.
    const fn cancels(self) -> u16 {
        match self {
            Event::Disable => Event::Enable.bit(),
            Event::PhyDown => Event::PhyUp.bit(),
            _ => 0,
        }
    }
}

/// Coalescing set of pending events, at most one outstanding per kind.
///
/// Posting only touches atomics, so any context (interrupt handlers, the
/// port and cipher callbacks) may post while the owner is polling.
#[derive(Debug, Default)]
pub struct EventInbox {
    pending: AtomicU16,
    reauth_requests: AtomicU32,
}

impl EventInbox {
    pub const fn new() -> Self {
        Self {
            pending: AtomicU16::new(0),
            reauth_requests: AtomicU32::new(0),
        }
    }

    pub fn post(&self, event: Event) {
        let cancel = event.cancels();
        let set = event.bit();
        // Closure never declines, the update always lands.
        let _ = self
            .pending
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |p| Some((p & !cancel) | set));
    }

    pub fn is_pending(&self, event: Event) -> bool {
        self.pending.load(Ordering::Acquire) & event.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.pending.load(Ordering::Acquire) == 0
    }

    /// Captures and clears the pending set in one step.
    /// Anything posted afterwards waits for the next drain.
    pub fn take(&self) -> PendingEvents {
        PendingEvents(self.pending.swap(0, Ordering::AcqRel))
    }

    pub fn clear(&self) {
        self.pending.store(0, Ordering::Release);
    }

    pub fn reauth_requests(&self) -> u32 {
        self.reauth_requests.load(Ordering::Relaxed)
    }

    pub(crate) fn reset_reauth_requests(&self) {
        self.reauth_requests.store(0, Ordering::Relaxed);
    }
}

impl LinkEvents for EventInbox {
    fn reauthenticate(&self) {
        self.reauth_requests.fetch_add(1, Ordering::Relaxed);
        self.post(Event::Authenticate);
    }

    fn check_link(&self) {
        self.post(Event::Check);
    }
}

/// A drained batch. Yields each event once, lowest identifier first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingEvents(u16);

impl Iterator for PendingEvents {
    type Item = Event;

    fn next(&mut self) -> Option<Event> {
        while self.0 != 0 {
            let index = self.0.trailing_zeros() as usize;
            self.0 &= self.0 - 1;
            if let Some(event) = Event::ALL.get(index) {
                return Some(*event);
            }
        }
        None
    }
}

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use spin::Mutex;

use hdcp1x_core::Ksv;
use hdcp1x_hal::Platform;

/// Single-shot timer the owner polls for expiry.
#[derive(Debug, Default)]
pub struct HostTimer {
    deadline: Mutex<Option<(Instant, u16)>>,
    starts: AtomicU32,
}

impl HostTimer {
    pub fn start(&self, timeout_ms: u16) {
        let at = Instant::now() + Duration::from_millis(timeout_ms as u64);
        *self.deadline.lock() = Some((at, timeout_ms));
        self.starts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stop(&self) {
        *self.deadline.lock() = None;
    }

    /// Timeout of the armed deadline, if any.
    pub fn armed_ms(&self) -> Option<u16> {
        self.deadline.lock().map(|(_, ms)| ms)
    }

    pub fn starts(&self) -> u32 {
        self.starts.load(Ordering::Relaxed)
    }

    /// Disarms and reports true once the deadline has passed.
    pub fn take_expired(&self) -> bool {
        let mut deadline = self.deadline.lock();
        let armed = *deadline;
        match armed {
            Some((at, _)) if Instant::now() >= at => {
                *deadline = None;
                true
            }
            _ => false,
        }
    }

    /// Fires an armed timer now, without waiting. False if nothing was armed.
    pub fn expire_now(&self) -> bool {
        self.deadline.lock().take().is_some()
    }
}

/// Timer, revocation list and busy-wait for a host process.
#[derive(Clone, Default)]
pub struct HostPlatform {
    timer: Arc<HostTimer>,
    revoked: Arc<Mutex<Vec<Ksv>>>,
    busy_ms: Arc<AtomicU32>,
    realtime: bool,
}

impl HostPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `busy_wait` actually sleep.
    pub fn realtime(mut self) -> Self {
        self.realtime = true;
        self
    }

    pub fn timer(&self) -> Arc<HostTimer> {
        self.timer.clone()
    }

    pub fn revoke(&self, ksv: Ksv) {
        self.revoked.lock().push(ksv);
    }

    /// Milliseconds spent in `busy_wait` so far.
    pub fn busy_waited_ms(&self) -> u32 {
        self.busy_ms.load(Ordering::Relaxed)
    }
}

impl Platform for HostPlatform {
    fn is_ksv_revoked(&self, ksv: Ksv) -> bool {
        self.revoked.lock().contains(&ksv)
    }

    fn timer_start(&mut self, timeout_ms: u16) {
        self.timer.start(timeout_ms);
    }

    fn timer_stop(&mut self) {
        self.timer.stop();
    }

    fn busy_wait(&mut self, delay_ms: u16) {
        self.busy_ms.fetch_add(delay_ms as u32, Ordering::Relaxed);
        if self.realtime {
            std::thread::sleep(Duration::from_millis(delay_ms as u64));
        }
    }
}

#![no_std]
#![forbid(unsafe_code)]
extern crate alloc;
use alloc::boxed::Box;
use alloc::sync::Arc;

use hdcp1x_core::{HdcpError, HdcpResult, Interface, RegisterMap, StreamMap};
use hdcp1x_hal::{Cipher, Platform, Port};

/// Prefixes every line with the instance label, e.g. `hdcp-tx(0) - authenticated`.
macro_rules! tx_log {
    ($level:ident, $tx:expr, $($arg:tt)+) => {
        log::$level!("hdcp-tx({}) - {}", $tx.config.device_id, format_args!($($arg)+))
    };
}

mod auth;
pub mod event;
mod info;
mod machine;
pub mod state;

pub use event::{Event, EventInbox, PendingEvents};
pub use info::TxInfo;
pub use state::{LinkFlags, State, StateId};

/// Validate-rx gives the receiver this long to produce Ro'.
pub const VALIDATE_RX_TIMEOUT_MS: u16 = 100;
/// Wait-for-ready gives a repeater this long to assemble its KSV list.
pub const WAIT_FOR_READY_TIMEOUT_MS: u16 = 5_000;
/// Lets the encryption engine settle after toggling streams.
pub const ENCRYPTION_SETTLE_MS: u16 = 5;
/// Budget of every bounded read/compare loop.
pub const MAX_ATTEMPTS: u32 = 3;
/// Used when the cipher RNG yields nothing usable. Never zero.
pub const FALLBACK_AN: u64 = 0x0351_F717_5406_A74D;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxConfig {
    pub device_id: u16,
    pub interface: Interface,
}

/// Monotonic counters, cleared each time the transmitter is enabled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TxStats {
    pub auth_passed: u32,
    pub auth_failed: u32,
    pub reauth_requested: u32,
    pub link_check_passed: u32,
    pub link_check_failed: u32,
    pub read_failures: u32,
}

/// Transmit side of one protected link.
///
/// Callers post requests, then drive everything from `poll`. All state is
/// mutated inside `poll`; the only thing shared with callbacks is the inbox.
pub struct Transmitter {
    port: Box<dyn Port>,
    cipher: Box<dyn Cipher>,
    platform: Box<dyn Platform>,
    config: TxConfig,

    inbox: Arc<EventInbox>,
    state: State,
    previous: StateId,
    flags: LinkFlags,
    encryption_map: StreamMap,
    stats: TxStats,
}

impl Transmitter {
    pub fn new(
        port: Box<dyn Port>,
        cipher: Box<dyn Cipher>,
        platform: Box<dyn Platform>,
        config: TxConfig,
    ) -> Self {
        let mut tx = Self {
            port,
            cipher,
            platform,
            config,
            inbox: Arc::new(EventInbox::new()),
            state: State::Disabled,
            previous: StateId::Disabled,
            flags: LinkFlags::default(),
            encryption_map: 0,
            stats: TxStats::default(),
        };
        tx.init();
        tx
    }

    /// Forces DISABLED through its entry action alone, dropping pending events.
    pub fn init(&mut self) {
        self.inbox.clear();
        self.state = State::Disabled;
        let _ = self.enter(State::Disabled);
    }

    /// Dispatches everything pending, then offers the current state a POLL.
    pub fn poll(&mut self) {
        self.process_pending();
        self.run(Event::Poll);
    }

    /// Dispatches the events pending right now, in identifier order. Events
    /// posted while these run wait for the next call.
    pub fn process_pending(&mut self) {
        for event in self.inbox.take() {
            self.run(event);
        }
    }

    pub fn enable(&self) {
        self.inbox.post(Event::Enable);
    }

    pub fn disable(&self) {
        self.inbox.post(Event::Disable);
    }

    pub fn reset(&self) {
        self.inbox.post(Event::Disable);
        self.inbox.post(Event::Enable);
    }

    pub fn authenticate(&self) {
        self.inbox.post(Event::Authenticate);
    }

    pub fn set_physical_state(&self, is_up: bool) {
        self.inbox.post(if is_up { Event::PhyUp } else { Event::PhyDown });
    }

    /// Called by the platform when the armed timer expires.
    pub fn handle_timeout(&self) {
        self.inbox.post(Event::Timeout);
    }

    pub fn set_lane_count(&mut self, lanes: u8) -> HdcpResult<()> {
        if lanes == 0 {
            return Err(HdcpError::InvalidParam);
        }
        self.cipher.set_lane_count(lanes)
    }

    pub fn is_in_progress(&self) -> bool {
        self.state.id().is_in_progress()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.id().is_authenticated()
    }

    /// Streams for which encryption is requested (not necessarily active).
    pub fn encryption(&self) -> StreamMap {
        self.encryption_map
    }

    /// Requests encryption on `map`. Takes effect at once when authenticated,
    /// otherwise as soon as authentication completes.
    pub fn enable_encryption(&mut self, map: StreamMap) -> HdcpResult<()> {
        self.encryption_map |= map;
        if self.is_authenticated() {
            self.enable_encryption_state();
        }
        Ok(())
    }

    pub fn disable_encryption(&mut self, map: StreamMap) -> HdcpResult<()> {
        self.cipher.disable_encryption(map)?;
        self.encryption_map &= !map;
        Ok(())
    }

    pub fn state(&self) -> StateId {
        self.state.id()
    }

    pub fn previous_state(&self) -> StateId {
        self.previous
    }

    pub fn flags(&self) -> LinkFlags {
        self.flags
    }

    pub fn stats(&self) -> TxStats {
        TxStats {
            reauth_requested: self.inbox.reauth_requests(),
            ..self.stats
        }
    }

    pub fn config(&self) -> &TxConfig {
        &self.config
    }

    /// Handle for callbacks and other contexts that need to post events.
    pub fn notifier(&self) -> Arc<EventInbox> {
        self.inbox.clone()
    }

    fn regs(&self) -> &'static RegisterMap {
        self.config.interface.registers()
    }
}

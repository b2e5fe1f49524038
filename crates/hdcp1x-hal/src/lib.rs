#![no_std]
#![forbid(unsafe_code)]

extern crate alloc;
use alloc::sync::Arc;

use hdcp1x_core::{HdcpError, HdcpResult, Ksv, RepeaterInfo, StreamMap};

/// Sink for events raised by hardware callbacks.
///
/// INVARIANT: Implementations only record the request. They may be invoked
/// from interrupt context and must never block or touch session state.
pub trait LinkEvents: Send + Sync {
    /// The receiver asked for the link to be authenticated again.
    fn reauthenticate(&self);

    /// Periodic tick (e.g. Ri update interrupt): time to re-check the link.
    fn check_link(&self);
}

/// Asynchronous operations of the cipher engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherRequest {
    /// Generate a random value, read back through `Cipher::mi`.
    Rng,
    /// Run the block computation that derives Km, Ro and Mo.
    Block,
}

/// Byte-level access to the protocol registers of the remote device.
pub trait Port: Send {
    fn enable(&mut self) -> HdcpResult<()>;
    fn disable(&mut self) -> HdcpResult<()>;

    /// Reads `buf.len()` bytes starting at `offset`.
    /// Returns: bytes read. Zero counts as a failed read.
    fn read(&mut self, offset: u32, buf: &mut [u8]) -> HdcpResult<usize>;

    fn write(&mut self, offset: u32, buf: &[u8]) -> HdcpResult<usize>;

    /// Bcaps: the receiver speaks the protocol at all.
    fn is_capable(&mut self) -> bool;

    /// Bcaps: the receiver is a repeater with its own downstream devices.
    fn is_repeater(&mut self) -> bool;

    /// Topology word. Fails with `NotReady` until the KSV list is ready.
    fn repeater_info(&mut self) -> HdcpResult<RepeaterInfo>;

    /// Where to report receiver-initiated reauthentication requests.
    fn set_reauth_notifier(&mut self, notifier: Arc<dyn LinkEvents>);
}

/// The block-cipher engine that owns the device keys.
pub trait Cipher: Send {
    fn enable(&mut self) -> HdcpResult<()>;
    fn disable(&mut self) -> HdcpResult<()>;
    fn set_lane_count(&mut self, lanes: u8) -> HdcpResult<()>;

    fn local_ksv(&self) -> Ksv;
    fn set_remote_ksv(&mut self, ksv: Ksv);

    /// Loads the B registers (x: 28 bits, y: 28 bits, z: 9 bits).
    fn set_b(&mut self, x: u32, y: u32, z: u32);

    fn request(&mut self, request: CipherRequest) -> HdcpResult<()>;

    /// Completion of the outstanding request.
    fn poll_request(&mut self) -> nb::Result<(), HdcpError>;

    /// Low 64 bits of the M register (random output after `CipherRequest::Rng`).
    fn mi(&self) -> u64;

    /// Secret Mo, valid after the block computation.
    fn mo(&self) -> u64;

    /// One-shot check value after the block computation.
    fn ro(&self) -> u16;

    /// Rolling check value.
    fn ri(&self) -> u16;

    fn active_streams(&self) -> StreamMap;
    fn enable_encryption(&mut self, map: StreamMap) -> HdcpResult<()>;
    fn disable_encryption(&mut self, map: StreamMap) -> HdcpResult<()>;

    /// Turns the Ri update interrupt on or off.
    fn set_ri_update(&mut self, enabled: bool);

    /// Where to report Ri update interrupts.
    fn set_ri_notifier(&mut self, notifier: Arc<dyn LinkEvents>);
}

/// Board services: timers and the revocation list.
pub trait Platform: Send {
    fn is_ksv_revoked(&self, ksv: Ksv) -> bool;

    /// Arms the single-shot timer. Re-arming replaces any previous deadline.
    fn timer_start(&mut self, timeout_ms: u16);
    fn timer_stop(&mut self);

    /// Bounded spin, used to let the encryption engine settle.
    fn busy_wait(&mut self, delay_ms: u16);
}

//! Host-side collaborators for the transmitter: a model receiver/repeater,
//! a model cipher and a host platform, all sharing one simulated link.
//!
//! Every handle is cheap to clone. Tests keep one clone to steer faults and
//! inspect counters while the transmitter owns the boxed trait objects.

use std::collections::BTreeMap;
use std::sync::Arc;

use spin::Mutex;

use hdcp1x_core::{Interface, Ksv, RepeaterInfo, StreamMap};
use hdcp1x_hal::{CipherRequest, LinkEvents};

mod cipher;
mod platform;
mod receiver;
pub mod session;

pub use cipher::SimCipher;
pub use platform::{HostPlatform, HostTimer};
pub use receiver::SimReceiver;

use session::Session;

/// Transmitter key used unless overridden.
pub const DEFAULT_AKSV: Ksv = Ksv::new(0x14_F761_03B7);
/// Receiver key used unless overridden.
pub const DEFAULT_BKSV: Ksv = Ksv::new(0xCD_1AF2_1E51);

/// Devices behind a repeater.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Downstream {
    pub ksvs: Vec<Ksv>,
    pub depth: u8,
    pub max_devs_exceeded: bool,
    pub max_cascade_exceeded: bool,
}

impl Downstream {
    pub fn new(ksvs: Vec<Ksv>, depth: u8) -> Self {
        Self { ksvs, depth, ..Self::default() }
    }

    pub fn info(&self) -> RepeaterInfo {
        let mut info = RepeaterInfo::from_parts(self.ksvs.len() as u8, self.depth);
        if self.max_devs_exceeded {
            info = info.with_max_devs_exceeded();
        }
        if self.max_cascade_exceeded {
            info = info.with_max_cascade_exceeded();
        }
        info
    }

    /// The KSV FIFO contents, each key least-significant byte first.
    pub fn fifo_bytes(&self) -> Vec<u8> {
        self.ksvs.iter().flat_map(|k| k.to_le_bytes()).collect()
    }
}

/// What the simulated hardware has been asked to do so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkCounters {
    pub port_enables: u32,
    pub port_disables: u32,
    pub cipher_enables: u32,
    pub cipher_disables: u32,
    pub an_writes: u32,
    pub aksv_writes: u32,
    pub ainfo_writes: u32,
    pub ri_reads: u32,
    pub vh_reads: u32,
    pub block_requests: u32,
}

pub(crate) struct ReceiverState {
    pub(crate) bksv: Ksv,
    pub(crate) capable: bool,
    pub(crate) downstream: Option<Downstream>,
    pub(crate) an: Option<u64>,
    pub(crate) session: Option<Session>,
    pub(crate) fifo_cursor: usize,
    pub(crate) info_polls: u32,
    pub(crate) reauth: Option<Arc<dyn LinkEvents>>,
}

pub(crate) struct CipherState {
    pub(crate) aksv: Ksv,
    pub(crate) enabled: bool,
    pub(crate) lanes: u8,
    pub(crate) remote: Ksv,
    pub(crate) b: (u32, u32, u32),
    pub(crate) pending: Option<(CipherRequest, u32)>,
    pub(crate) mi: u64,
    pub(crate) session: Option<Session>,
    pub(crate) active: StreamMap,
    pub(crate) ri_update: bool,
    pub(crate) ri_notifier: Option<Arc<dyn LinkEvents>>,
    pub(crate) rng_override: Option<u64>,
    pub(crate) block_latency: u32,
}

#[derive(Default)]
pub(crate) struct Faults {
    /// Register offset -> number of reads still to fail.
    pub(crate) failed_reads: BTreeMap<u32, u32>,
    pub(crate) ri_mismatches: u32,
    pub(crate) corrupt_v_word: Option<usize>,
    pub(crate) ready_after: u32,
}

pub(crate) struct LinkState {
    pub(crate) rx: ReceiverState,
    pub(crate) tx: CipherState,
    /// Link-check ticks since the last block computation.
    pub(crate) frame: u32,
    pub(crate) faults: Faults,
    pub(crate) counters: LinkCounters,
}

/// One simulated display link: the receiver end plus the local cipher.
#[derive(Clone)]
pub struct SimLink {
    interface: Interface,
    state: Arc<Mutex<LinkState>>,
}

impl SimLink {
    pub fn new(interface: Interface) -> Self {
        let state = LinkState {
            rx: ReceiverState {
                bksv: DEFAULT_BKSV,
                capable: true,
                downstream: None,
                an: None,
                session: None,
                fifo_cursor: 0,
                info_polls: 0,
                reauth: None,
            },
            tx: CipherState {
                aksv: DEFAULT_AKSV,
                enabled: false,
                lanes: 1,
                remote: Ksv::default(),
                b: (0, 0, 0),
                pending: None,
                mi: 0,
                session: None,
                active: 0,
                ri_update: false,
                ri_notifier: None,
                rng_override: None,
                block_latency: 1,
            },
            frame: 0,
            faults: Faults::default(),
            counters: LinkCounters::default(),
        };
        Self { interface, state: Arc::new(Mutex::new(state)) }
    }

    pub fn interface(&self) -> Interface { self.interface }

    pub fn receiver(&self) -> SimReceiver {
        SimReceiver::new(self.interface, self.state.clone())
    }

    pub fn cipher(&self) -> SimCipher {
        SimCipher::new(self.state.clone())
    }

    // --- Receiver setup ---

    pub fn set_bksv(&self, ksv: Ksv) { self.state.lock().rx.bksv = ksv; }
    pub fn set_aksv(&self, ksv: Ksv) { self.state.lock().tx.aksv = ksv; }
    pub fn set_capable(&self, capable: bool) { self.state.lock().rx.capable = capable; }

    /// Turns the receiver into a repeater (or back, with `None`).
    pub fn set_downstream(&self, downstream: Option<Downstream>) {
        let mut s = self.state.lock();
        s.rx.downstream = downstream;
        s.rx.fifo_cursor = 0;
        s.rx.info_polls = 0;
    }

    /// The repeater reports NotReady for this many topology polls.
    pub fn set_ready_after(&self, polls: u32) {
        let mut s = self.state.lock();
        s.faults.ready_after = polls;
        s.rx.info_polls = 0;
    }

    // --- Faults ---

    /// The next `count` reads at `offset` fail.
    pub fn fail_reads(&self, offset: u32, count: u32) {
        self.state.lock().faults.failed_reads.insert(offset, count);
    }

    /// The next `count` reads of Ro'/Ri' return a wrong value.
    pub fn mismatch_ri(&self, count: u32) { self.state.lock().faults.ri_mismatches = count; }

    /// Corrupts V'H`word` on every read until cleared.
    pub fn corrupt_v_word(&self, word: Option<usize>) { self.state.lock().faults.corrupt_v_word = word; }

    /// Forces the cipher RNG output. `Some(0)` models an RNG that yields nothing.
    pub fn set_rng(&self, value: Option<u64>) { self.state.lock().tx.rng_override = value; }

    pub fn set_block_latency(&self, polls: u32) { self.state.lock().tx.block_latency = polls; }

    // --- Stimuli ---

    /// Advances the link by one check period. With Ri updates enabled, the
    /// cipher raises its interrupt.
    pub fn frame_tick(&self) {
        let notifier = {
            let mut s = self.state.lock();
            s.frame = s.frame.wrapping_add(1);
            if s.tx.ri_update { s.tx.ri_notifier.clone() } else { None }
        };
        if let Some(n) = notifier {
            n.check_link();
        }
    }

    /// The receiver asks for authentication to be redone.
    pub fn request_reauth(&self) {
        let notifier = self.state.lock().rx.reauth.clone();
        if let Some(n) = notifier {
            log::debug!("sim-rx - requesting reauthentication");
            n.reauthenticate();
        }
    }

    // --- Inspection ---

    pub fn counters(&self) -> LinkCounters { self.state.lock().counters }
    pub fn frame(&self) -> u32 { self.state.lock().frame }
    pub fn active_streams(&self) -> StreamMap { self.state.lock().tx.active }
    pub fn cipher_enabled(&self) -> bool { self.state.lock().tx.enabled }
    pub fn ri_update_enabled(&self) -> bool { self.state.lock().tx.ri_update }
    pub fn lanes(&self) -> u8 { self.state.lock().tx.lanes }

    /// An as last written to the receiver.
    pub fn an_written(&self) -> Option<u64> { self.state.lock().rx.an }

    pub fn downstream_info(&self) -> Option<RepeaterInfo> {
        self.state.lock().rx.downstream.as_ref().map(Downstream::info)
    }

    /// Both ends hold the same session.
    pub fn sessions_agree(&self) -> bool {
        let s = self.state.lock();
        s.rx.session.is_some() && s.rx.session == s.tx.session
    }
}

#![allow(dead_code)]

use hdcp1x_core::{Interface, Ksv};
use hdcp1x_sim::{Downstream, HostPlatform, SimLink};
use hdcp1x_tx::{Event, StateId, Transmitter, TxConfig};

/// A transmitter wired to a simulated link, with handles kept for steering.
pub struct Rig {
    pub tx: Transmitter,
    pub link: SimLink,
    pub platform: HostPlatform,
}

impl Rig {
    pub fn new(interface: Interface) -> Self {
        let link = SimLink::new(interface);
        let platform = HostPlatform::new();
        let tx = Transmitter::new(
            Box::new(link.receiver()),
            Box::new(link.cipher()),
            Box::new(platform.clone()),
            TxConfig { device_id: 0, interface },
        );
        Self { tx, link, platform }
    }

    pub fn hdmi() -> Self {
        Self::new(Interface::Hdmi)
    }

    /// Link up and transmitter enabled: parked in UNAUTHENTICATED.
    pub fn enabled(interface: Interface) -> Self {
        let mut rig = Self::new(interface);
        rig.tx.set_physical_state(true);
        rig.tx.poll();
        rig.tx.enable();
        rig.tx.poll();
        assert_eq!(rig.tx.state(), StateId::Unauthenticated);
        rig
    }

    /// Enabled with a repeater in front of `devices` downstream keys.
    pub fn repeater(devices: &[u64]) -> Self {
        let rig = Self::enabled(Interface::Hdmi);
        let ksvs = devices.iter().map(|&k| Ksv::new(k)).collect();
        rig.link.set_downstream(Some(Downstream::new(ksvs, 1)));
        rig
    }

    /// One poll cycle. The Ro' wait is short, so an armed validate-rx timer
    /// fires straight away; the long wait-for-ready timer never does.
    pub fn step(&mut self) {
        if self.tx.state() == StateId::ValidateRx && self.platform.timer().expire_now() {
            self.tx.handle_timeout();
        }
        self.tx.poll();
    }

    /// Posts `event` and dispatches the inbox without the trailing POLL.
    pub fn dispatch(&mut self, event: Event) {
        self.tx.notifier().post(event);
        self.tx.process_pending();
    }

    pub fn run(&mut self, cycles: usize) {
        for _ in 0..cycles {
            self.step();
        }
    }

    /// Steps until `target` is current. False if it never got there.
    pub fn run_until(&mut self, target: StateId, max_cycles: usize) -> bool {
        for _ in 0..max_cycles {
            if self.tx.state() == target {
                return true;
            }
            self.step();
        }
        self.tx.state() == target
    }

    pub fn authenticate(&mut self) -> StateId {
        self.tx.authenticate();
        self.run(10);
        self.tx.state()
    }
}

/// A second repeater-side device key (weight 20).
pub const DOWNSTREAM_KSV: u64 = 0x0F_0F0F_0F0F;

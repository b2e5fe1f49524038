//! Authentication algorithms and the shared helpers of the entry actions.
//!
//! Each algorithm consults the collaborators and returns the state the
//! machine should move to. Returning the current state means "stay".

use alloc::sync::Arc;
use alloc::vec;

use sha1::{Digest, Sha1};
use zeroize::Zeroizing;

use hdcp1x_core::{Interface, Ksv, RegisterMap, RepeaterInfo, ALL_STREAMS};
use hdcp1x_hal::{CipherRequest, LinkEvents};

use crate::state::State;
use crate::{Transmitter, TxStats, ENCRYPTION_SETTLE_MS, FALLBACK_AN, MAX_ATTEMPTS};

/// Splits An into the cipher B registers: x = bits 0..28, y = bits 28..56,
/// z = bits 56..64 with bit 8 flagging a repeater.
pub(crate) fn split_an(an: u64, is_repeater: bool) -> (u32, u32, u32) {
    let x = (an & 0x0FFF_FFFF) as u32;
    let y = ((an >> 28) & 0x0FFF_FFFF) as u32;
    let mut z = ((an >> 56) & 0xFF) as u32;
    if is_repeater {
        z |= 1 << 8;
    }
    (x, y, z)
}

impl Transmitter {
    pub(crate) fn check_rx_capable(&mut self) -> State {
        if self.port.is_capable() {
            tx_log!(debug, self, "rx hdcp capable");
            State::ExchangeKsvs
        } else {
            tx_log!(warn, self, "rx not capable");
            State::Unauthenticated
        }
    }

    pub(crate) fn exchange_ksvs(&mut self) -> State {
        let regs = self.regs();

        let mut buf = [0u8; RegisterMap::SIZE_BKSV];
        if !self.read_remote(regs.bksv, &mut buf) {
            // Nothing re-drives this state; DISABLE or PHYDOWN gets us out.
            return State::ExchangeKsvs;
        }
        let bksv = Ksv::from_le_bytes(&buf);

        if !bksv.is_valid() {
            tx_log!(warn, self, "Bksv invalid ({})", bksv);
            return State::Unauthenticated;
        }
        if self.platform.is_ksv_revoked(bksv) {
            tx_log!(warn, self, "Bksv is revoked ({})", bksv);
            return State::Unauthenticated;
        }

        self.flags.is_repeater = self.port.is_repeater();

        let an = self.generate_an();
        let aksv = self.cipher.local_ksv();
        self.cipher.set_remote_ksv(bksv);

        let mut an_buf = [0u8; RegisterMap::SIZE_AN];
        hdcp1x_core::uint_to_le(an, &mut an_buf);
        self.write_remote(regs.an, &an_buf);
        // Aksv goes last: on DisplayPort writing it starts the receiver's computation.
        self.write_remote(regs.aksv, &aksv.to_le_bytes());

        State::Computations { an }
    }

    /// Asks the cipher RNG for An, spinning on the (short) request.
    fn generate_an(&mut self) -> u64 {
        let an = match self.cipher.request(CipherRequest::Rng) {
            Ok(()) => match nb::block!(self.cipher.poll_request()) {
                Ok(()) => self.cipher.mi(),
                Err(e) => {
                    tx_log!(warn, self, "rng request failed: {}", e);
                    0
                }
            },
            Err(e) => {
                tx_log!(warn, self, "rng unavailable: {}", e);
                0
            }
        };

        if an == 0 {
            FALLBACK_AN
        } else {
            an
        }
    }

    pub(crate) fn start_computations(&mut self, an: u64) {
        tx_log!(debug, self, "starting computations");

        let (x, y, z) = split_an(an, self.flags.is_repeater);
        self.cipher.set_b(x, y, z);

        if let Err(e) = self.cipher.request(CipherRequest::Block) {
            tx_log!(warn, self, "block request failed: {}", e);
        }
    }

    pub(crate) fn poll_for_computations(&mut self, an: u64) -> State {
        match self.cipher.poll_request() {
            Ok(()) => {
                tx_log!(debug, self, "computations complete");
                State::ValidateRx
            }
            Err(nb::Error::WouldBlock) => {
                tx_log!(debug, self, "waiting for computations");
                State::Computations { an }
            }
            Err(nb::Error::Other(e)) => {
                tx_log!(warn, self, "computations failed: {}", e);
                State::Unauthenticated
            }
        }
    }

    /// Compares Ro' with the local Ro, up to `MAX_ATTEMPTS` times.
    pub(crate) fn validate_rx(&mut self) -> State {
        let regs = self.regs();

        for attempt in 1..=MAX_ATTEMPTS {
            let mut buf = [0u8; RegisterMap::SIZE_RI];
            if !self.read_remote(regs.ri, &mut buf) {
                continue;
            }

            let remote = u16::from_le_bytes(buf);
            let local = self.cipher.ro();
            if local == remote {
                tx_log!(debug, self, "rx valid Ro/Ro' ({:04X})", local);
                return State::TestForRepeater;
            }
            tx_log!(
                warn,
                self,
                "Ro/Ro' mismatch ({:04X}/{:04X}) attempt {}",
                local,
                remote,
                attempt
            );
        }

        self.stats.auth_failed += 1;
        State::Unauthenticated
    }

    /// Compares Ri' with the local Ri, up to `MAX_ATTEMPTS` times.
    pub(crate) fn check_link_integrity(&mut self) -> State {
        let regs = self.regs();

        for _ in 0..MAX_ATTEMPTS {
            let mut buf = [0u8; RegisterMap::SIZE_RI];
            if !self.read_remote(regs.ri, &mut buf) {
                continue;
            }

            let remote = u16::from_le_bytes(buf);
            let local = self.cipher.ri();
            if local == remote {
                tx_log!(debug, self, "link check passed Ri/Ri' ({:04X})", local);
                self.stats.link_check_passed += 1;
                return State::Authenticated;
            }
            tx_log!(
                warn,
                self,
                "link check mismatch Ri/Ri' ({:04X}/{:04X})",
                local,
                remote
            );
        }

        tx_log!(warn, self, "link check failed");
        self.stats.link_check_failed += 1;
        State::DetermineRxCapable
    }

    pub(crate) fn test_for_repeater(&mut self) -> State {
        if !self.port.is_repeater() {
            self.flags.is_repeater = false;
            return State::Authenticated;
        }

        self.flags.is_repeater = true;
        let regs = self.regs();
        self.write_remote(regs.ainfo, &[0u8; RegisterMap::SIZE_AINFO]);
        tx_log!(info, self, "repeater detected");

        // Some repeaters hold back their KSV list until the link is encrypted.
        self.enable_encryption_state();
        State::WaitForReady
    }

    pub(crate) fn poll_for_wait_for_ready(&mut self) -> State {
        let info = match self.port.repeater_info() {
            Ok(info) => info,
            Err(_) => return State::WaitForReady,
        };

        if info.max_cascade_exceeded() {
            tx_log!(warn, self, "max cascade exceeded");
            State::Unauthenticated
        } else if info.max_devs_exceeded() {
            tx_log!(warn, self, "max devices exceeded");
            State::Unauthenticated
        } else if info.device_count() == 0 {
            tx_log!(info, self, "no attached devices");
            State::Authenticated
        } else {
            tx_log!(info, self, "devices attached: ksv list ready");
            State::ReadKsvList { info }
        }
    }

    pub(crate) fn read_ksv_list(&mut self, info: RepeaterInfo) -> State {
        for _ in 0..MAX_ATTEMPTS {
            if self.validate_ksv_list(info) {
                tx_log!(info, self, "ksv list validated");
                return State::Authenticated;
            }
        }

        tx_log!(warn, self, "ksv list invalid");
        State::Unauthenticated
    }

    /// One pass of the V check: SHA-1 over the KSV list, the topology word
    /// and Mo, compared word by word against V'H0..V'H4. All
    /// `RegisterMap::NUM_VH` words of the 160-bit digest are checked.
    fn validate_ksv_list(&mut self, info: RepeaterInfo) -> bool {
        let regs = self.regs();
        let mut hasher = Sha1::new();

        let mut chunk = Zeroizing::new(vec![0u8; regs.ksv_fifo_window]);
        let mut remaining = info.device_count() * Ksv::SIZE;
        while remaining > 0 {
            let n = remaining.min(regs.ksv_fifo_window);
            if !self.read_remote(regs.ksv_fifo, &mut chunk[..n]) {
                return false;
            }
            hasher.update(&chunk[..n]);
            remaining -= n;
        }

        hasher.update(info.to_le_bytes());
        let mo = Zeroizing::new(self.cipher.mo().to_le_bytes());
        hasher.update(&mo[..]);
        let digest = hasher.finalize();

        // Every word is read even after a mismatch so the receiver sees a full pass.
        let mut is_valid = true;
        for (i, word) in digest.chunks_exact(RegisterMap::SIZE_VH).enumerate() {
            let calc = u32::from_be_bytes([word[0], word[1], word[2], word[3]]);

            let mut buf = [0u8; RegisterMap::SIZE_VH];
            let read = if self.read_remote(regs.v_h(i), &mut buf) {
                u32::from_le_bytes(buf)
            } else {
                0
            };

            if calc != read {
                tx_log!(debug, self, "V'H{} mismatch ({:08X}/{:08X})", i, calc, read);
                is_valid = false;
            }
        }
        is_valid
    }

    /// Realizes the requested streams on the cipher, if it differs.
    pub(crate) fn enable_encryption_state(&mut self) {
        if self.encryption_map == 0 {
            return;
        }
        if self.cipher.active_streams() != self.encryption_map {
            self.platform.busy_wait(ENCRYPTION_SETTLE_MS);
            if let Err(e) = self.cipher.enable_encryption(self.encryption_map) {
                tx_log!(warn, self, "enable encryption failed: {}", e);
            }
        }
    }

    /// Drops all active encryption. The requested map is left alone.
    pub(crate) fn disable_encryption_state(&mut self) {
        if self.cipher.active_streams() == 0 {
            return;
        }
        if let Err(e) = self.cipher.disable_encryption(ALL_STREAMS) {
            tx_log!(warn, self, "disable encryption failed: {}", e);
        }
        // at least a frame
        self.platform.busy_wait(ENCRYPTION_SETTLE_MS);
    }

    /// Ri-update interrupts only exist on HDMI.
    pub(crate) fn set_check_link(&mut self, enabled: bool) {
        if self.config.interface != Interface::Hdmi {
            return;
        }
        if enabled {
            let sink: Arc<dyn LinkEvents> = self.inbox.clone();
            self.cipher.set_ri_notifier(sink);
        }
        self.cipher.set_ri_update(enabled);
    }

    pub(crate) fn enable_state(&mut self) {
        self.stats = TxStats::default();
        self.inbox.reset_reauth_requests();

        if let Err(e) = self.cipher.enable() {
            tx_log!(warn, self, "cipher enable failed: {}", e);
        }
        let sink: Arc<dyn LinkEvents> = self.inbox.clone();
        self.port.set_reauth_notifier(sink);
        if let Err(e) = self.port.enable() {
            tx_log!(warn, self, "port enable failed: {}", e);
        }
    }

    pub(crate) fn disable_state(&mut self) {
        if let Err(e) = self.port.disable() {
            tx_log!(warn, self, "port disable failed: {}", e);
        }
        if let Err(e) = self.cipher.disable() {
            tx_log!(warn, self, "cipher disable failed: {}", e);
        }
        self.platform.timer_stop();

        self.flags.is_repeater = false;
        self.encryption_map = 0;
    }

    /// Reads a receiver register. Failures and empty reads are counted.
    fn read_remote(&mut self, offset: u32, buf: &mut [u8]) -> bool {
        match self.port.read(offset, buf) {
            Ok(n) if n > 0 => true,
            Ok(_) => {
                tx_log!(warn, self, "empty read at {:#x}", offset);
                self.stats.read_failures += 1;
                false
            }
            Err(e) => {
                tx_log!(warn, self, "read failure at {:#x}: {}", offset, e);
                self.stats.read_failures += 1;
                false
            }
        }
    }

    fn write_remote(&mut self, offset: u32, buf: &[u8]) {
        if let Err(e) = self.port.write(offset, buf) {
            tx_log!(warn, self, "write failure at {:#x}: {}", offset, e);
        }
    }
}

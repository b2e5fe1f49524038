use std::sync::Arc;

use spin::Mutex;

use hdcp1x_core::{HdcpError, HdcpResult, Ksv, StreamMap};
use hdcp1x_hal::{Cipher, CipherRequest, LinkEvents};

use crate::session::Session;
use crate::LinkState;

/// Model of the local cipher engine. Requests complete after a configurable
/// number of polls.
pub struct SimCipher {
    state: Arc<Mutex<LinkState>>,
}

impl SimCipher {
    pub(crate) fn new(state: Arc<Mutex<LinkState>>) -> Self {
        Self { state }
    }
}

impl Cipher for SimCipher {
    fn enable(&mut self) -> HdcpResult<()> {
        let mut s = self.state.lock();
        s.counters.cipher_enables += 1;
        s.tx.enabled = true;
        Ok(())
    }

    fn disable(&mut self) -> HdcpResult<()> {
        let mut s = self.state.lock();
        s.counters.cipher_disables += 1;
        s.tx.enabled = false;
        s.tx.active = 0;
        s.tx.pending = None;
        Ok(())
    }

    fn set_lane_count(&mut self, lanes: u8) -> HdcpResult<()> {
        self.state.lock().tx.lanes = lanes;
        Ok(())
    }

    fn local_ksv(&self) -> Ksv { self.state.lock().tx.aksv }
    fn set_remote_ksv(&mut self, ksv: Ksv) { self.state.lock().tx.remote = ksv; }
    fn set_b(&mut self, x: u32, y: u32, z: u32) { self.state.lock().tx.b = (x, y, z); }

    fn request(&mut self, request: CipherRequest) -> HdcpResult<()> {
        let mut s = self.state.lock();
        if !s.tx.enabled {
            return Err(HdcpError::HalError);
        }
        // A new request abandons whatever was still outstanding.
        let latency = match request {
            CipherRequest::Rng => {
                s.tx.mi = s.tx.rng_override.unwrap_or_else(rand::random);
                0
            }
            CipherRequest::Block => {
                s.counters.block_requests += 1;
                s.tx.block_latency
            }
        };
        s.tx.pending = Some((request, latency));
        Ok(())
    }

    fn poll_request(&mut self) -> nb::Result<(), HdcpError> {
        let mut s = self.state.lock();
        let pending = s.tx.pending;
        match pending {
            None => Ok(()),
            Some((kind, 0)) => {
                s.tx.pending = None;
                if kind == CipherRequest::Block {
                    let (x, y, z) = s.tx.b;
                    let an = x as u64 | (y as u64) << 28 | ((z & 0xFF) as u64) << 56;
                    let repeater = z & (1 << 8) != 0;
                    s.tx.session = Some(Session::derive(s.tx.aksv, s.tx.remote, an, repeater));
                    s.frame = 0;
                }
                Ok(())
            }
            Some((kind, n)) => {
                s.tx.pending = Some((kind, n - 1));
                Err(nb::Error::WouldBlock)
            }
        }
    }

    fn mi(&self) -> u64 { self.state.lock().tx.mi }
    fn mo(&self) -> u64 { self.state.lock().tx.session.map_or(0, |x| x.mo) }
    fn ro(&self) -> u16 { self.state.lock().tx.session.map_or(0, |x| x.ro()) }

    fn ri(&self) -> u16 {
        let s = self.state.lock();
        s.tx.session.map_or(0, |x| x.ri(s.frame))
    }

    fn active_streams(&self) -> StreamMap { self.state.lock().tx.active }

    fn enable_encryption(&mut self, map: StreamMap) -> HdcpResult<()> {
        let mut s = self.state.lock();
        if !s.tx.enabled {
            return Err(HdcpError::HalError);
        }
        s.tx.active |= map;
        Ok(())
    }

    fn disable_encryption(&mut self, map: StreamMap) -> HdcpResult<()> {
        self.state.lock().tx.active &= !map;
        Ok(())
    }

    fn set_ri_update(&mut self, enabled: bool) { self.state.lock().tx.ri_update = enabled; }

    fn set_ri_notifier(&mut self, notifier: Arc<dyn LinkEvents>) {
        self.state.lock().tx.ri_notifier = Some(notifier);
    }
}

use std::sync::Arc;

use spin::Mutex;

use hdcp1x_core::{uint_from_le, HdcpError, HdcpResult, Interface, Ksv, RegisterMap, RepeaterInfo};
use hdcp1x_hal::{LinkEvents, Port};

use crate::session::{self, Session};
use crate::LinkState;

/// Receiver (or repeater) end of the link, seen through its registers.
pub struct SimReceiver {
    regs: &'static RegisterMap,
    state: Arc<Mutex<LinkState>>,
}

impl SimReceiver {
    pub(crate) fn new(interface: Interface, state: Arc<Mutex<LinkState>>) -> Self {
        Self { regs: interface.registers(), state }
    }

    fn read_v_word(s: &mut LinkState, index: usize) -> HdcpResult<u32> {
        s.counters.vh_reads += 1;
        let session = s.rx.session.ok_or(HdcpError::ReadFailure)?;
        let downstream = s.rx.downstream.as_ref().ok_or(HdcpError::ReadFailure)?;

        let words = session::ksv_list_digest(&downstream.ksvs, downstream.info(), session.mo);
        let mut word = words[index];
        if s.faults.corrupt_v_word == Some(index) {
            word = !word;
        }
        Ok(word)
    }

    fn read_fifo(s: &mut LinkState, buf: &mut [u8]) -> HdcpResult<usize> {
        let fifo = match s.rx.downstream.as_ref() {
            Some(d) if !d.ksvs.is_empty() => d.fifo_bytes(),
            _ => return Err(HdcpError::ReadFailure),
        };
        for b in buf.iter_mut() {
            *b = fifo[s.rx.fifo_cursor];
            s.rx.fifo_cursor = (s.rx.fifo_cursor + 1) % fifo.len();
        }
        Ok(buf.len())
    }
}

fn copy_out(src: &[u8], buf: &mut [u8]) -> usize {
    let n = src.len().min(buf.len());
    buf[..n].copy_from_slice(&src[..n]);
    n
}

impl Port for SimReceiver {
    fn enable(&mut self) -> HdcpResult<()> {
        self.state.lock().counters.port_enables += 1;
        Ok(())
    }

    fn disable(&mut self) -> HdcpResult<()> {
        self.state.lock().counters.port_disables += 1;
        Ok(())
    }

    fn read(&mut self, offset: u32, buf: &mut [u8]) -> HdcpResult<usize> {
        let regs = self.regs;
        let mut s = self.state.lock();

        if let Some(left) = s.faults.failed_reads.get_mut(&offset) {
            if *left > 0 {
                *left -= 1;
                return Err(HdcpError::ReadFailure);
            }
        }

        if offset == regs.bksv {
            Ok(copy_out(&s.rx.bksv.to_le_bytes(), buf))
        } else if offset == regs.ri {
            s.counters.ri_reads += 1;
            let frame = s.frame;
            let mut value = s.rx.session.map(|x| x.ri(frame)).unwrap_or(0);
            if s.faults.ri_mismatches > 0 {
                s.faults.ri_mismatches -= 1;
                value ^= 0xFFFF;
            }
            Ok(copy_out(&value.to_le_bytes(), buf))
        } else if offset == regs.ksv_fifo {
            Self::read_fifo(&mut s, buf)
        } else if let Some(i) = (0..RegisterMap::NUM_VH).find(|&i| regs.v_h(i) == offset) {
            let word = Self::read_v_word(&mut s, i)?;
            Ok(copy_out(&word.to_le_bytes(), buf))
        } else if offset == regs.an {
            let an = s.rx.an.unwrap_or(0);
            Ok(copy_out(&an.to_le_bytes(), buf))
        } else {
            Err(HdcpError::ReadFailure)
        }
    }

    fn write(&mut self, offset: u32, buf: &[u8]) -> HdcpResult<usize> {
        let regs = self.regs;
        let mut s = self.state.lock();

        if offset == regs.an && buf.len() == RegisterMap::SIZE_AN {
            s.counters.an_writes += 1;
            s.rx.an = Some(uint_from_le(buf));
        } else if offset == regs.aksv && buf.len() == RegisterMap::SIZE_AKSV {
            // Aksv completes the exchange: derive the receiver's session.
            s.counters.aksv_writes += 1;
            let aksv = Ksv::new(uint_from_le(buf));
            let an = s.rx.an.ok_or(HdcpError::WriteFailure)?;
            let repeater = s.rx.downstream.is_some();
            s.rx.session = Some(Session::derive(aksv, s.rx.bksv, an, repeater));
            s.rx.fifo_cursor = 0;
            s.frame = 0;
        } else if offset == regs.ainfo {
            s.counters.ainfo_writes += 1;
        } else {
            return Err(HdcpError::WriteFailure);
        }
        Ok(buf.len())
    }

    fn is_capable(&mut self) -> bool {
        self.state.lock().rx.capable
    }

    fn is_repeater(&mut self) -> bool {
        self.state.lock().rx.downstream.is_some()
    }

    fn repeater_info(&mut self) -> HdcpResult<RepeaterInfo> {
        let mut s = self.state.lock();
        let info = s.rx.downstream.as_ref().map(|d| d.info()).ok_or(HdcpError::NotReady)?;
        s.rx.info_polls += 1;
        if s.rx.info_polls <= s.faults.ready_after {
            return Err(HdcpError::NotReady);
        }
        Ok(info)
    }

    fn set_reauth_notifier(&mut self, notifier: Arc<dyn LinkEvents>) {
        self.state.lock().rx.reauth = Some(notifier);
    }
}

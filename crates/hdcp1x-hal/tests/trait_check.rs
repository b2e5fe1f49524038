use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use hdcp1x_core::{HdcpError, HdcpResult, Ksv, RepeaterInfo, StreamMap};
use hdcp1x_hal::{Cipher, CipherRequest, LinkEvents, Platform, Port};

struct Counter {
    reauth: AtomicU32,
    check: AtomicU32,
}

impl LinkEvents for Counter {
    fn reauthenticate(&self) { self.reauth.fetch_add(1, Ordering::SeqCst); }
    fn check_link(&self) { self.check.fetch_add(1, Ordering::SeqCst); }
}

struct NullPort {
    notifier: Option<Arc<dyn LinkEvents>>,
}

impl Port for NullPort {
    fn enable(&mut self) -> HdcpResult<()> { Ok(()) }
    fn disable(&mut self) -> HdcpResult<()> { Ok(()) }
    fn read(&mut self, _: u32, _: &mut [u8]) -> HdcpResult<usize> { Err(HdcpError::ReadFailure) }
    fn write(&mut self, _: u32, buf: &[u8]) -> HdcpResult<usize> { Ok(buf.len()) }
    fn is_capable(&mut self) -> bool { false }
    fn is_repeater(&mut self) -> bool { false }
    fn repeater_info(&mut self) -> HdcpResult<RepeaterInfo> { Err(HdcpError::NotReady) }
    fn set_reauth_notifier(&mut self, notifier: Arc<dyn LinkEvents>) { self.notifier = Some(notifier); }
}

struct SlowCipher {
    pending: u8,
}

impl Cipher for SlowCipher {
    fn enable(&mut self) -> HdcpResult<()> { Ok(()) }
    fn disable(&mut self) -> HdcpResult<()> { Ok(()) }
    fn set_lane_count(&mut self, _: u8) -> HdcpResult<()> { Ok(()) }
    fn local_ksv(&self) -> Ksv { Ksv::new(0) }
    fn set_remote_ksv(&mut self, _: Ksv) {}
    fn set_b(&mut self, _: u32, _: u32, _: u32) {}
    fn request(&mut self, _: CipherRequest) -> HdcpResult<()> { self.pending = 2; Ok(()) }
    fn poll_request(&mut self) -> nb::Result<(), HdcpError> {
        if self.pending == 0 { return Ok(()); }
        self.pending -= 1;
        Err(nb::Error::WouldBlock)
    }
    fn mi(&self) -> u64 { 0 }
    fn mo(&self) -> u64 { 0 }
    fn ro(&self) -> u16 { 0 }
    fn ri(&self) -> u16 { 0 }
    fn active_streams(&self) -> StreamMap { 0 }
    fn enable_encryption(&mut self, _: StreamMap) -> HdcpResult<()> { Ok(()) }
    fn disable_encryption(&mut self, _: StreamMap) -> HdcpResult<()> { Ok(()) }
    fn set_ri_update(&mut self, _: bool) {}
    fn set_ri_notifier(&mut self, _: Arc<dyn LinkEvents>) {}
}

struct NullPlatform;

impl Platform for NullPlatform {
    fn is_ksv_revoked(&self, _: Ksv) -> bool { false }
    fn timer_start(&mut self, _: u16) {}
    fn timer_stop(&mut self) {}
    fn busy_wait(&mut self, _: u16) {}
}

#[test]
fn test_trait_object_safety() {
    let mut port = NullPort { notifier: None };
    let obj: &mut dyn Port = &mut port;
    assert!(obj.read(0, &mut [0u8; 5]).is_err());
    assert_eq!(obj.repeater_info(), Err(HdcpError::NotReady));

    let _platform: Box<dyn Platform> = Box::new(NullPlatform);
}

#[test]
fn test_request_completes_through_nb() {
    let mut cipher = SlowCipher { pending: 0 };
    let obj: &mut dyn Cipher = &mut cipher;
    obj.request(CipherRequest::Rng).unwrap();

    assert!(matches!(obj.poll_request(), Err(nb::Error::WouldBlock)));
    // nb::block! spins through the remaining WouldBlock
    assert!(nb::block!(obj.poll_request()).is_ok());
}

#[test]
fn test_notifier_is_shared() {
    let sink = Arc::new(Counter { reauth: AtomicU32::new(0), check: AtomicU32::new(0) });
    let mut port = NullPort { notifier: None };
    port.set_reauth_notifier(sink.clone());

    if let Some(n) = &port.notifier {
        n.reauthenticate();
        n.check_link();
    }
    assert_eq!(sink.reauth.load(Ordering::SeqCst), 1);
    assert_eq!(sink.check.load(Ordering::SeqCst), 1);
}

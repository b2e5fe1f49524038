use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use hdcp1x_core::{HdcpError, Interface, Ksv, RegisterMap};
use hdcp1x_hal::{Cipher, CipherRequest, LinkEvents, Platform, Port};
use hdcp1x_sim::{session, Downstream, HostPlatform, SimLink, DEFAULT_AKSV, DEFAULT_BKSV};

#[derive(Default)]
struct Counter {
    reauth: AtomicU32,
    check: AtomicU32,
}

impl LinkEvents for Counter {
    fn reauthenticate(&self) { self.reauth.fetch_add(1, Ordering::SeqCst); }
    fn check_link(&self) { self.check.fetch_add(1, Ordering::SeqCst); }
}

/// Runs the exchange by hand: An then Aksv to the receiver, block on the cipher.
fn exchange(link: &SimLink, rx: &mut dyn Port, cipher: &mut dyn Cipher, an: u64, repeater: bool) {
    let regs = link.interface().registers();
    cipher.enable().unwrap();
    cipher.set_remote_ksv(DEFAULT_BKSV);
    rx.write(regs.an, &an.to_le_bytes()).unwrap();
    rx.write(regs.aksv, &DEFAULT_AKSV.to_le_bytes()).unwrap();

    let z = ((an >> 56) as u32) | if repeater { 1 << 8 } else { 0 };
    cipher.set_b((an & 0x0FFF_FFFF) as u32, ((an >> 28) & 0x0FFF_FFFF) as u32, z);
    cipher.request(CipherRequest::Block).unwrap();
    nb::block!(cipher.poll_request()).unwrap();
}

#[test]
fn test_receiver_and_cipher_agree_on_ro() {
    let link = SimLink::new(Interface::Hdmi);
    let mut rx = link.receiver();
    let mut cipher = link.cipher();
    exchange(&link, &mut rx, &mut cipher, 0x1122_3344_5566_7788, false);

    assert!(link.sessions_agree());
    let mut buf = [0u8; 2];
    rx.read(RegisterMap::HDMI.ri, &mut buf).unwrap();
    assert_eq!(u16::from_le_bytes(buf), cipher.ro());
}

#[test]
fn test_repeater_bit_mismatch_breaks_agreement() {
    let link = SimLink::new(Interface::Hdmi);
    link.set_downstream(Some(Downstream::new(vec![DEFAULT_BKSV], 1)));
    let mut rx = link.receiver();
    let mut cipher = link.cipher();
    exchange(&link, &mut rx, &mut cipher, 42, false);
    assert!(!link.sessions_agree());
}

#[test]
fn test_block_request_latency() {
    let link = SimLink::new(Interface::DisplayPort);
    link.set_block_latency(2);
    let mut cipher = link.cipher();

    assert_eq!(cipher.request(CipherRequest::Block), Err(HdcpError::HalError));
    cipher.enable().unwrap();
    cipher.request(CipherRequest::Block).unwrap();
    assert!(matches!(cipher.poll_request(), Err(nb::Error::WouldBlock)));
    assert!(matches!(cipher.poll_request(), Err(nb::Error::WouldBlock)));
    assert!(cipher.poll_request().is_ok());
}

#[test]
fn test_new_request_replaces_pending_one() {
    let link = SimLink::new(Interface::DisplayPort);
    link.set_block_latency(5);
    let mut cipher = link.cipher();
    cipher.enable().unwrap();

    cipher.request(CipherRequest::Block).unwrap();
    assert!(matches!(cipher.poll_request(), Err(nb::Error::WouldBlock)));

    // The RNG request completes at once, the old block is gone.
    cipher.request(CipherRequest::Rng).unwrap();
    assert!(cipher.poll_request().is_ok());
    assert!(cipher.poll_request().is_ok());

    cipher.request(CipherRequest::Block).unwrap();
    assert!(matches!(cipher.poll_request(), Err(nb::Error::WouldBlock)));
    assert_eq!(link.counters().block_requests, 2);
}

#[test]
fn test_v_words_match_digest() {
    let ksvs = vec![Ksv::new(0x0F_0F0F_0F0F), Ksv::new(0xF0_F0F0_F0F0)];
    let link = SimLink::new(Interface::DisplayPort);
    let downstream = Downstream::new(ksvs.clone(), 1);
    let info = downstream.info();
    link.set_downstream(Some(downstream));

    let mut rx = link.receiver();
    let mut cipher = link.cipher();
    exchange(&link, &mut rx, &mut cipher, 7, true);
    assert!(link.sessions_agree());

    let regs = &RegisterMap::DISPLAYPORT;
    let mut fifo = [0u8; 10];
    rx.read(regs.ksv_fifo, &mut fifo).unwrap();
    assert_eq!(&fifo[..5], &ksvs[0].to_le_bytes());

    let expected = session::ksv_list_digest(&ksvs, info, cipher.mo());
    for (i, word) in expected.iter().enumerate() {
        let mut buf = [0u8; 4];
        rx.read(regs.v_h(i), &mut buf).unwrap();
        assert_eq!(u32::from_le_bytes(buf), *word);
    }

    link.corrupt_v_word(Some(2));
    let mut buf = [0u8; 4];
    rx.read(regs.v_h(2), &mut buf).unwrap();
    assert_ne!(u32::from_le_bytes(buf), expected[2]);
}

#[test]
fn test_faults_are_consumed() {
    let link = SimLink::new(Interface::Hdmi);
    let mut rx = link.receiver();
    link.fail_reads(RegisterMap::HDMI.bksv, 2);

    let mut buf = [0u8; 5];
    assert_eq!(rx.read(0x00, &mut buf), Err(HdcpError::ReadFailure));
    assert_eq!(rx.read(0x00, &mut buf), Err(HdcpError::ReadFailure));
    assert_eq!(rx.read(0x00, &mut buf), Ok(5));
    assert_eq!(Ksv::from_le_bytes(&buf), DEFAULT_BKSV);
}

#[test]
fn test_ready_after_polls() {
    let link = SimLink::new(Interface::Hdmi);
    let mut rx = link.receiver();
    assert_eq!(rx.repeater_info(), Err(HdcpError::NotReady));

    link.set_downstream(Some(Downstream::new(vec![DEFAULT_BKSV], 1)));
    link.set_ready_after(2);
    assert_eq!(rx.repeater_info(), Err(HdcpError::NotReady));
    assert_eq!(rx.repeater_info(), Err(HdcpError::NotReady));
    let info = rx.repeater_info().unwrap();
    assert_eq!(info.device_count(), 1);
    assert_eq!(info.depth(), 1);
}

#[test]
fn test_notifiers() {
    let link = SimLink::new(Interface::Hdmi);
    let counter = Arc::new(Counter::default());
    let mut rx = link.receiver();
    let mut cipher = link.cipher();
    rx.set_reauth_notifier(counter.clone());
    cipher.set_ri_notifier(counter.clone());

    link.frame_tick();
    assert_eq!(counter.check.load(Ordering::SeqCst), 0);
    cipher.set_ri_update(true);
    link.frame_tick();
    assert_eq!(counter.check.load(Ordering::SeqCst), 1);
    assert_eq!(link.frame(), 2);

    link.request_reauth();
    assert_eq!(counter.reauth.load(Ordering::SeqCst), 1);
}

#[test]
fn test_host_platform() {
    let mut platform = HostPlatform::new();
    let timer = platform.timer();

    platform.timer_start(5_000);
    assert_eq!(timer.armed_ms(), Some(5_000));
    assert!(!timer.take_expired());
    platform.timer_start(100);
    assert_eq!(timer.armed_ms(), Some(100));
    assert!(timer.expire_now());
    assert!(!timer.expire_now());

    platform.timer_start(0);
    assert!(timer.take_expired());
    assert_eq!(timer.starts(), 3);

    platform.revoke(DEFAULT_BKSV);
    assert!(platform.is_ksv_revoked(DEFAULT_BKSV));
    assert!(!platform.is_ksv_revoked(DEFAULT_AKSV));

    platform.busy_wait(5);
    platform.busy_wait(5);
    assert_eq!(platform.busy_waited_ms(), 10);
}

mod common;

use common::Rig;
use hdcp1x_core::{Interface, RegisterMap};
use hdcp1x_hal::LinkEvents;
use hdcp1x_tx::{Event, StateId};

fn authenticated(interface: Interface) -> Rig {
    let mut rig = Rig::enabled(interface);
    assert_eq!(rig.authenticate(), StateId::Authenticated);
    rig
}

#[test]
fn test_ri_tick_checks_link() {
    let mut rig = authenticated(Interface::Hdmi);

    rig.link.frame_tick();
    assert!(rig.tx.notifier().is_pending(Event::Check));
    rig.tx.poll();

    assert_eq!(rig.tx.state(), StateId::Authenticated);
    assert_eq!(rig.tx.previous_state(), StateId::LinkIntegrityCheck);
    assert_eq!(rig.tx.stats().link_check_passed, 1);
    // Coming back from a link check is not a new authentication.
    assert_eq!(rig.tx.stats().auth_passed, 1);
}

#[test]
fn test_two_mismatches_then_match_passes() {
    let mut rig = authenticated(Interface::Hdmi);
    rig.link.mismatch_ri(2);

    rig.link.frame_tick();
    rig.tx.poll();
    assert_eq!(rig.tx.state(), StateId::Authenticated);
    assert_eq!(rig.tx.stats().link_check_passed, 1);
    assert_eq!(rig.tx.stats().link_check_failed, 0);
}

#[test]
fn test_three_mismatches_reauthenticate() {
    let mut rig = authenticated(Interface::Hdmi);
    let blocks = rig.link.counters().block_requests;
    rig.link.mismatch_ri(3);

    rig.link.frame_tick();
    rig.tx.poll();
    let stats = rig.tx.stats();
    assert_eq!(stats.link_check_failed, 1);
    assert_eq!(stats.link_check_passed, 0);
    // Straight back through capability and key exchange.
    assert_eq!(rig.tx.state(), StateId::Computations);
    assert_eq!(rig.link.counters().block_requests, blocks + 1);
    assert!(!rig.link.ri_update_enabled());

    rig.run(5);
    assert_eq!(rig.tx.state(), StateId::Authenticated);
    assert_eq!(rig.tx.stats().auth_passed, 2);
    assert_eq!(rig.tx.stats().link_check_failed, 1);
}

#[test]
fn test_ri_read_failures_count() {
    let mut rig = authenticated(Interface::Hdmi);
    rig.link.fail_reads(RegisterMap::HDMI.ri, 1);

    rig.link.frame_tick();
    rig.tx.poll();
    assert_eq!(rig.tx.state(), StateId::Authenticated);
    assert_eq!(rig.tx.stats().read_failures, 1);
    assert_eq!(rig.tx.stats().link_check_passed, 1);
}

#[test]
fn test_checks_keep_passing() {
    let mut rig = authenticated(Interface::Hdmi);
    for n in 1..=10 {
        rig.link.frame_tick();
        rig.tx.poll();
        assert_eq!(rig.tx.state(), StateId::Authenticated);
        assert_eq!(rig.tx.stats().link_check_passed, n);
    }
}

#[test]
fn test_encryption_survives_link_checks() {
    let mut rig = authenticated(Interface::Hdmi);
    rig.tx.enable_encryption(0x1).unwrap();

    rig.link.frame_tick();
    rig.tx.poll();
    assert_eq!(rig.link.active_streams(), 0x1);
    assert!(rig.tx.is_authenticated());
}

#[test]
fn test_display_port_check_through_notifier() {
    let mut rig = authenticated(Interface::DisplayPort);

    // No Ri interrupt on DisplayPort.
    rig.link.frame_tick();
    assert!(!rig.tx.notifier().is_pending(Event::Check));

    rig.tx.notifier().check_link();
    rig.tx.poll();
    assert_eq!(rig.tx.state(), StateId::Authenticated);
    assert_eq!(rig.tx.stats().link_check_passed, 1);
}

#[test]
fn test_check_ignored_before_authentication() {
    let mut rig = Rig::enabled(Interface::Hdmi);
    let info = rig.tx.info();
    rig.tx.notifier().post(Event::Check);
    rig.tx.poll();
    assert_eq!(rig.tx.info(), info);
}

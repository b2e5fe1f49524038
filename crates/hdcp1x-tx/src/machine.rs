//! Transition driver plus the per-state event handlers, entry and exit actions.

use crate::event::Event;
use crate::state::{State, StateId};
use crate::{Transmitter, VALIDATE_RX_TIMEOUT_MS, WAIT_FOR_READY_TIMEOUT_MS};

impl Transmitter {
    /// Runs one event to a fixed point. Entry actions may chain further
    /// transitions; the loop ends once a state keeps itself.
    pub(crate) fn run(&mut self, event: Event) {
        let mut next = self.on_event(event);

        // DISABLE abandons the active state: its exit action is skipped.
        let mut skip_exit = event == Event::Disable;

        while next != self.state {
            if !skip_exit {
                self.exit(self.state);
            }
            skip_exit = false;

            self.previous = self.state.id();
            self.state = next;
            next = self.enter(next);
        }
    }

    fn on_event(&mut self, event: Event) -> State {
        match self.state {
            State::Disabled => self.run_disabled(event),
            State::DetermineRxCapable => self.run_determine_rx_capable(event),
            State::ExchangeKsvs => self.run_exchange_ksvs(event),
            State::Computations { an } => self.run_computations(event, an),
            State::ValidateRx => self.run_validate_rx(event),
            State::TestForRepeater => self.run_test_for_repeater(event),
            State::WaitForReady => self.run_wait_for_ready(event),
            State::ReadKsvList { .. } => self.run_read_ksv_list(event),
            State::Authenticated => self.run_authenticated(event),
            State::LinkIntegrityCheck => self.run_link_integrity_check(event),
            State::Unauthenticated => self.run_unauthenticated(event),
            State::PhyDown => self.run_phy_down(event),
        }
    }

    fn run_disabled(&mut self, event: Event) -> State {
        match event {
            Event::Enable if self.flags.phy_up => State::Unauthenticated,
            Event::Enable => State::PhyDown,
            // Track the link so a later ENABLE lands in the right state.
            Event::PhyDown => {
                self.flags.phy_up = false;
                self.state
            }
            Event::PhyUp => {
                self.flags.phy_up = true;
                self.state
            }
            _ => self.state,
        }
    }

    fn run_determine_rx_capable(&mut self, event: Event) -> State {
        match event {
            Event::Disable => State::Disabled,
            Event::PhyDown => State::PhyDown,
            _ => self.state,
        }
    }

    // AUTHENTICATE and POLL are ignored here: a failed Bksv read parks the
    // machine until DISABLE or PHYDOWN.
    fn run_exchange_ksvs(&mut self, event: Event) -> State {
        match event {
            Event::Disable => State::Disabled,
            Event::PhyDown => State::PhyDown,
            _ => self.state,
        }
    }

    fn run_computations(&mut self, event: Event, an: u64) -> State {
        match event {
            Event::Authenticate => State::DetermineRxCapable,
            Event::Disable => State::Disabled,
            Event::PhyDown => State::PhyDown,
            Event::Poll => self.poll_for_computations(an),
            _ => self.state,
        }
    }

    fn run_validate_rx(&mut self, event: Event) -> State {
        match event {
            Event::Authenticate => State::DetermineRxCapable,
            Event::Disable => State::Disabled,
            Event::PhyDown => State::PhyDown,
            Event::Timeout => {
                tx_log!(debug, self, "validate-rx timeout");
                self.validate_rx()
            }
            _ => self.state,
        }
    }

    fn run_test_for_repeater(&mut self, event: Event) -> State {
        match event {
            Event::Authenticate => State::DetermineRxCapable,
            Event::Disable => State::Disabled,
            Event::PhyDown => State::PhyDown,
            Event::Poll => self.test_for_repeater(),
            _ => self.state,
        }
    }

    fn run_wait_for_ready(&mut self, event: Event) -> State {
        match event {
            Event::Authenticate => State::DetermineRxCapable,
            Event::Disable => State::Disabled,
            Event::PhyDown => State::PhyDown,
            Event::Poll => self.poll_for_wait_for_ready(),
            Event::Timeout => {
                tx_log!(debug, self, "wait-for-ready timeout");
                match self.poll_for_wait_for_ready() {
                    State::WaitForReady => State::Unauthenticated,
                    next => next,
                }
            }
            _ => self.state,
        }
    }

    fn run_read_ksv_list(&mut self, event: Event) -> State {
        match event {
            Event::Authenticate => State::DetermineRxCapable,
            Event::Disable => State::Disabled,
            Event::PhyDown => State::PhyDown,
            _ => self.state,
        }
    }

    fn run_authenticated(&mut self, event: Event) -> State {
        match event {
            Event::Authenticate => State::DetermineRxCapable,
            Event::Check => State::LinkIntegrityCheck,
            Event::Disable => State::Disabled,
            Event::PhyDown => State::PhyDown,
            _ => self.state,
        }
    }

    fn run_link_integrity_check(&mut self, event: Event) -> State {
        match event {
            Event::Authenticate => State::DetermineRxCapable,
            Event::Disable => State::Disabled,
            Event::PhyDown => State::PhyDown,
            Event::Poll => self.check_link_integrity(),
            _ => self.state,
        }
    }

    fn run_unauthenticated(&mut self, event: Event) -> State {
        match event {
            Event::Authenticate => State::DetermineRxCapable,
            Event::Disable => State::Disabled,
            Event::PhyDown => State::PhyDown,
            _ => self.state,
        }
    }

    fn run_phy_down(&mut self, event: Event) -> State {
        match event {
            Event::Disable => State::Disabled,
            Event::PhyUp => {
                // Streams still want protection: authenticate on the next cycle.
                if self.encryption_map != 0 {
                    self.inbox.post(Event::Authenticate);
                }
                State::Unauthenticated
            }
            _ => self.state,
        }
    }

    /// Entry action. Returns the state to move on to, or `state` to stay.
    pub(crate) fn enter(&mut self, state: State) -> State {
        match state {
            State::Disabled => {
                self.disable_state();
                state
            }
            State::DetermineRxCapable => {
                self.flags.phy_up = true;
                self.set_check_link(false);
                self.disable_encryption_state();
                self.check_rx_capable()
            }
            State::ExchangeKsvs => self.exchange_ksvs(),
            State::Computations { an } => {
                self.start_computations(an);
                state
            }
            State::ValidateRx => {
                self.platform.timer_start(VALIDATE_RX_TIMEOUT_MS);
                state
            }
            State::TestForRepeater => state,
            State::WaitForReady => {
                self.platform.timer_start(WAIT_FOR_READY_TIMEOUT_MS);
                state
            }
            State::ReadKsvList { info } => self.read_ksv_list(info),
            State::Authenticated => {
                self.enable_encryption_state();
                if self.previous != StateId::LinkIntegrityCheck {
                    self.stats.auth_passed += 1;
                    self.set_check_link(true);
                    tx_log!(info, self, "authenticated");
                }
                state
            }
            State::LinkIntegrityCheck => self.check_link_integrity(),
            State::Unauthenticated => {
                self.flags.is_repeater = false;
                self.flags.phy_up = true;
                self.disable_encryption_state();
                state
            }
            State::PhyDown => {
                self.flags.phy_up = false;
                self.disable_encryption_state();
                if let Err(e) = self.cipher.disable() {
                    tx_log!(warn, self, "cipher disable failed: {}", e);
                }
                state
            }
        }
    }

    // Payload-carrying states need no cleanup: leaving drops the payload.
    fn exit(&mut self, state: State) {
        match state {
            State::Disabled => self.enable_state(),
            State::ValidateRx | State::WaitForReady => self.platform.timer_stop(),
            State::PhyDown => {
                if let Err(e) = self.cipher.enable() {
                    tx_log!(warn, self, "cipher enable failed: {}", e);
                }
            }
            _ => {}
        }
    }
}

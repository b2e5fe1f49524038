use hdcp1x_core::RepeaterInfo;

/// Protocol state. Values needed only between two adjacent states ride
/// along as payload so nothing else can observe them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Disabled,
    DetermineRxCapable,
    ExchangeKsvs,
    /// `an` is the session nonce just sent to the receiver.
    Computations { an: u64 },
    ValidateRx,
    TestForRepeater,
    WaitForReady,
    /// `info` is the topology reported once the repeater became ready.
    ReadKsvList { info: RepeaterInfo },
    Authenticated,
    LinkIntegrityCheck,
    Unauthenticated,
    PhyDown,
}

impl State {
    pub fn id(&self) -> StateId {
        match self {
            State::Disabled => StateId::Disabled,
            State::DetermineRxCapable => StateId::DetermineRxCapable,
            State::ExchangeKsvs => StateId::ExchangeKsvs,
            State::Computations { .. } => StateId::Computations,
            State::ValidateRx => StateId::ValidateRx,
            State::TestForRepeater => StateId::TestForRepeater,
            State::WaitForReady => StateId::WaitForReady,
            State::ReadKsvList { .. } => StateId::ReadKsvList,
            State::Authenticated => StateId::Authenticated,
            State::LinkIntegrityCheck => StateId::LinkIntegrityCheck,
            State::Unauthenticated => StateId::Unauthenticated,
            State::PhyDown => StateId::PhyDown,
        }
    }

    /// Payload as a raw word, for diagnostics only.
    pub fn helper(&self) -> u64 {
        match self {
            State::Computations { an } => *an,
            State::ReadKsvList { info } => info.raw() as u64,
            _ => 0,
        }
    }
}

/// Payload-free state identity, used for status queries and display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateId {
    Disabled,
    DetermineRxCapable,
    ExchangeKsvs,
    Computations,
    ValidateRx,
    TestForRepeater,
    WaitForReady,
    ReadKsvList,
    Authenticated,
    LinkIntegrityCheck,
    Unauthenticated,
    PhyDown,
}

impl StateId {
    pub fn name(&self) -> &'static str {
        match self {
            StateId::Disabled => "disabled",
            StateId::DetermineRxCapable => "determine-rx-capable",
            StateId::ExchangeKsvs => "exchange-ksvs",
            StateId::Computations => "computations",
            StateId::ValidateRx => "validate-rx",
            StateId::Authenticated => "authenticated",
            StateId::LinkIntegrityCheck => "link-integrity-check",
            StateId::TestForRepeater => "test-for-repeater",
            StateId::WaitForReady => "wait-for-ready",
            StateId::ReadKsvList => "read-ksv-list",
            StateId::Unauthenticated => "unauthenticated",
            StateId::PhyDown => "physical-layer-down",
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, StateId::Authenticated | StateId::LinkIntegrityCheck)
    }

    /// Everything except the steady states counts as in progress.
    pub fn is_in_progress(&self) -> bool {
        !matches!(
            self,
            StateId::Disabled
                | StateId::Unauthenticated
                | StateId::Authenticated
                | StateId::LinkIntegrityCheck
        )
    }
}

impl core::fmt::Display for StateId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

/// Link flags. Only the state machine writes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LinkFlags {
    pub phy_up: bool,
    pub is_repeater: bool,
}

impl LinkFlags {
    pub const PHY_UP: u16 = 1 << 0;
    pub const IS_REPEATER: u16 = 1 << 1;

    pub fn bits(&self) -> u16 {
        let mut bits = 0;
        if self.phy_up { bits |= Self::PHY_UP; }
        if self.is_repeater { bits |= Self::IS_REPEATER; }
        bits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_names() {
        assert_eq!(State::Computations { an: 7 }.id().name(), "computations");
        assert_eq!(StateId::PhyDown.name(), "physical-layer-down");
        assert_eq!(StateId::DetermineRxCapable.name(), "determine-rx-capable");
    }

    #[test]
    fn test_helper_exposes_payload() {
        assert_eq!(State::Computations { an: 0xABCD }.helper(), 0xABCD);
        let info = RepeaterInfo::from_parts(2, 1);
        assert_eq!(State::ReadKsvList { info }.helper(), 0x0102);
        assert_eq!(State::ValidateRx.helper(), 0);
    }

    #[test]
    fn test_status_classes() {
        assert!(StateId::LinkIntegrityCheck.is_authenticated());
        assert!(!StateId::TestForRepeater.is_authenticated());
        assert!(StateId::PhyDown.is_in_progress());
        assert!(!StateId::Unauthenticated.is_in_progress());
    }

    #[test]
    fn test_flag_bits() {
        let flags = LinkFlags { phy_up: true, is_repeater: true };
        assert_eq!(flags.bits(), 0x0003);
        assert_eq!(LinkFlags::default().bits(), 0);
    }
}

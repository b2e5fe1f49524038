use core::fmt;

use hdcp1x_core::{Interface, StreamMap};

use crate::state::{LinkFlags, StateId};
use crate::{Transmitter, TxStats};

/// Point-in-time view of a transmitter, for status displays and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxInfo {
    pub interface: Interface,
    pub current: StateId,
    pub previous: StateId,
    /// Payload of the current state (An or topology word), zero otherwise.
    pub helper: u64,
    pub flags: LinkFlags,
    pub encryption_requested: StreamMap,
    pub encryption_active: StreamMap,
    pub stats: TxStats,
}

impl Transmitter {
    pub fn info(&self) -> TxInfo {
        TxInfo {
            interface: self.config.interface,
            current: self.state.id(),
            previous: self.previous,
            helper: self.state.helper(),
            flags: self.flags,
            encryption_requested: self.encryption_map,
            encryption_active: self.cipher.active_streams(),
            stats: self.stats(),
        }
    }
}

impl fmt::Display for TxInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Type:            {}", self.interface.name())?;
        writeln!(f, "Current State:   {}", self.current)?;
        writeln!(f, "Previous State:  {}", self.previous)?;
        writeln!(f, "State Helper:    {:016X}", self.helper)?;
        writeln!(f, "Flags:           {:04X}", self.flags.bits())?;
        writeln!(f, "Encryption Map:  {:016X}", self.encryption_requested)?;
        writeln!(f, "Active Streams:  {:016X}", self.encryption_active)?;
        writeln!(f, "Tx Stats")?;
        writeln!(f, "  Auth Passed:   {}", self.stats.auth_passed)?;
        writeln!(f, "  Auth Failed:   {}", self.stats.auth_failed)?;
        writeln!(f, "  Reauth Reqs:   {}", self.stats.reauth_requested)?;
        writeln!(f, "  Check Passed:  {}", self.stats.link_check_passed)?;
        writeln!(f, "  Check Failed:  {}", self.stats.link_check_failed)?;
        write!(f, "  Read Failures: {}", self.stats.read_failures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn test_display_names_states() {
        let info = TxInfo {
            interface: Interface::Hdmi,
            current: StateId::Authenticated,
            previous: StateId::TestForRepeater,
            helper: 0,
            flags: LinkFlags { phy_up: true, is_repeater: false },
            encryption_requested: 0x1,
            encryption_active: 0x1,
            stats: TxStats { auth_passed: 1, ..TxStats::default() },
        };
        let text = info.to_string();
        assert!(text.contains("Type:            hdmi-tx"));
        assert!(text.contains("Current State:   authenticated"));
        assert!(text.contains("Previous State:  test-for-repeater"));
        assert!(text.contains("Flags:           0001"));
        assert!(text.contains("  Auth Passed:   1"));
    }
}

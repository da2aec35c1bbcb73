//! DMTF power-state codes as reported by CIM_AssociatedPowerManagementService.

use std::fmt;

use serde::{Deserialize, Serialize};

// CIM_AssociatedPowerManagementService.PowerState value map
const DMTF_POWER_STATE_LABELS: [&str; 18] = [
    "Unknown",                           // 0
    "Other",                             // 1
    "On",                                // 2
    "Sleep - Light",                     // 3
    "Sleep - Deep",                      // 4
    "Power Cycle (Off - Soft)",          // 5
    "Off - Hard",                        // 6
    "Hibernate (Off - Soft)",            // 7
    "Off - Soft",                        // 8
    "Power Cycle (Off - Hard)",          // 9
    "Master Bus Reset",                  // 10
    "Diagnostic Interrupt (NMI)",        // 11
    "Off - Soft Graceful",               // 12
    "Off - Hard Graceful",               // 13
    "Master Bus Reset Graceful",         // 14
    "Power Cycle (Off - Soft Graceful)", // 15
    "Power Cycle (Off - Hard Graceful)", // 16
    "Diagnostic Interrupt (INIT)",       // 17
];

/// A DMTF power-state code. Unknown codes are kept as-is so that whatever the
/// controller reports can still be displayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PowerState(pub u16);

impl PowerState {
    pub const ON: PowerState = PowerState(2);
    pub const POWER_CYCLE_SOFT: PowerState = PowerState(5);
    pub const OFF_HARD: PowerState = PowerState(6);
    pub const OFF_SOFT: PowerState = PowerState(8);
    pub const MASTER_BUS_RESET: PowerState = PowerState(10);
    pub const DIAGNOSTIC_INTERRUPT_NMI: PowerState = PowerState(11);
    pub const OFF_SOFT_GRACEFUL: PowerState = PowerState(12);
    pub const OFF_HARD_GRACEFUL: PowerState = PowerState(13);

    pub fn code(self) -> u16 {
        self.0
    }

    /// Fixed DMTF label, `None` for codes outside 0-17.
    pub fn label(self) -> Option<&'static str> {
        DMTF_POWER_STATE_LABELS.get(self.0 as usize).copied()
    }
}

impl From<u16> for PowerState {
    fn from(code: u16) -> Self {
        PowerState(code)
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.label() {
            Some(label) => write!(f, "#{} ({})", self.0, label),
            None => write!(f, "#{}", self.0),
        }
    }
}

/// Render a list of states as `["#2 (On)", "#8 (Off - Soft)"]`.
pub fn describe_all(states: &[PowerState]) -> String {
    let labels: Vec<String> = states.iter().map(|s| s.to_string()).collect();
    serde_json::to_string(&labels).unwrap_or_default()
}

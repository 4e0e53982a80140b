use serde::{Deserialize, Serialize};

/// Inverter behaviour mode.
///
/// Only the first three can be requested by the planner; the force modes are
/// reported by devices but never set from here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
pub enum WorkMode {
    /// Consume own generation first, top up from the grid.
    SelfUse,

    /// Export generation above own consumption.
    FeedIn,

    /// Hold the battery as a reserve for outages.
    Backup,

    ForceCharge,
    ForceDischarge,
}

impl WorkMode {
    pub const SETTABLE: [Self; 3] = [Self::SelfUse, Self::FeedIn, Self::Backup];

    pub fn is_settable(self) -> bool {
        Self::SETTABLE.contains(&self)
    }
}

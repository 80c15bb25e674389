//! Classified kill feed events.

use std::fmt;

/// Cause of death reported by a kill feed line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeathKind {
    KilledWithWeapon,
    KilledBy,
    Killed,
    Fell,
    BledOut,
    KilledByInfected,
    Mauled,
    Beaten,
    Poisoned,
}

impl DeathKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::KilledWithWeapon => "killed_with_weapon",
            Self::KilledBy => "killed_by",
            Self::Killed => "killed",
            Self::Fell => "fell",
            Self::BledOut => "bled_out",
            Self::KilledByInfected => "killed_by_infected",
            Self::Mauled => "mauled",
            Self::Beaten => "beaten",
            Self::Poisoned => "poisoned",
        }
    }
}

impl fmt::Display for DeathKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One death parsed from a single log line.
///
/// Names are already normalized (tag prefixes stripped, trimmed).
#[derive(Debug, Clone, PartialEq)]
pub enum ClassifiedEvent {
    KilledWithWeapon {
        subject: String,
        actor: String,
        weapon: String,
        distance_m: Option<f32>,
    },
    KilledBy {
        subject: String,
        actor: String,
    },
    Killed {
        subject: String,
    },
    Fell {
        subject: String,
    },
    BledOut {
        subject: String,
    },
    KilledByInfected {
        subject: String,
    },
    Mauled {
        subject: String,
        animal: String,
    },
    Beaten {
        subject: String,
        actor: String,
        weapon: Option<String>,
    },
    Poisoned {
        subject: String,
    },
}

impl ClassifiedEvent {
    pub fn kind(&self) -> DeathKind {
        match self {
            Self::KilledWithWeapon { .. } => DeathKind::KilledWithWeapon,
            Self::KilledBy { .. } => DeathKind::KilledBy,
            Self::Killed { .. } => DeathKind::Killed,
            Self::Fell { .. } => DeathKind::Fell,
            Self::BledOut { .. } => DeathKind::BledOut,
            Self::KilledByInfected { .. } => DeathKind::KilledByInfected,
            Self::Mauled { .. } => DeathKind::Mauled,
            Self::Beaten { .. } => DeathKind::Beaten,
            Self::Poisoned { .. } => DeathKind::Poisoned,
        }
    }

    /// The character that died.
    pub fn subject(&self) -> &str {
        match self {
            Self::KilledWithWeapon { subject, .. }
            | Self::KilledBy { subject, .. }
            | Self::Killed { subject }
            | Self::Fell { subject }
            | Self::BledOut { subject }
            | Self::KilledByInfected { subject }
            | Self::Mauled { subject, .. }
            | Self::Beaten { subject, .. }
            | Self::Poisoned { subject } => subject,
        }
    }

    /// The character responsible, when it is a player or AI rather than
    /// the environment.
    pub fn actor(&self) -> Option<&str> {
        match self {
            Self::KilledWithWeapon { actor, .. }
            | Self::KilledBy { actor, .. }
            | Self::Beaten { actor, .. } => Some(actor),
            _ => None,
        }
    }

    pub fn weapon(&self) -> Option<&str> {
        match self {
            Self::KilledWithWeapon { weapon, .. } => Some(weapon),
            Self::Beaten { weapon, .. } => weapon.as_deref(),
            _ => None,
        }
    }

    pub fn distance_m(&self) -> Option<f32> {
        match self {
            Self::KilledWithWeapon { distance_m, .. } => *distance_m,
            _ => None,
        }
    }
}

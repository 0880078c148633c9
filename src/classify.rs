//! Pure outcome classification
//!
//! Maps what happened to a document (parse, repair, lookup, substitution) to
//! exactly one terminal [`Outcome`]. Nothing here touches the filesystem; the
//! organizer acts on the result.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::locator::LocateKind;

/// Result of strict parsing of the original bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParseStatus {
    WellFormed,
    Malformed,
}

/// What the repair step did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepairStatus {
    /// The document parsed on the first try
    NotNeeded,
    /// Repair was switched off in the configuration
    Disabled,
    Succeeded,
    Failed,
}

/// Terminal category of a processed file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    RepairedAndModified,
    Modified,
    UnchangedValueAbsent,
    UnchangedElementEmpty,
    Failed,
}

/// Where a file ends up once its outcome is known
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bucket {
    /// Rewritten in place
    WorkingDir,
    ValueAbsent,
    NotChanged,
}

impl Outcome {
    pub const ALL: [Outcome; 5] = [
        Outcome::RepairedAndModified,
        Outcome::Modified,
        Outcome::UnchangedValueAbsent,
        Outcome::UnchangedElementEmpty,
        Outcome::Failed,
    ];

    /// Whether the file gets a backup and new content written in place
    pub fn is_modification(self) -> bool {
        matches!(self, Outcome::Modified | Outcome::RepairedAndModified)
    }

    pub fn bucket(self) -> Bucket {
        match self {
            Outcome::Modified | Outcome::RepairedAndModified => Bucket::WorkingDir,
            Outcome::UnchangedValueAbsent => Bucket::ValueAbsent,
            Outcome::UnchangedElementEmpty | Outcome::Failed => Bucket::NotChanged,
        }
    }

    /// Status symbol for the per-file console line
    pub fn symbol(self) -> &'static str {
        match self {
            Outcome::Modified => "✓",
            Outcome::RepairedAndModified => "🔧",
            Outcome::UnchangedValueAbsent => "○",
            Outcome::UnchangedElementEmpty => "⊘",
            Outcome::Failed => "✗",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Outcome::RepairedAndModified => "repaired and modified",
            Outcome::Modified => "modified",
            Outcome::UnchangedValueAbsent => "value not found",
            Outcome::UnchangedElementEmpty => "element absent or empty",
            Outcome::Failed => "failed",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Decide the outcome for one file.
///
/// A successful repair always counts as a modification: the serialized output
/// differs from the original bytes whether or not anything was substituted.
pub fn classify(
    parse: ParseStatus,
    repair: RepairStatus,
    located: LocateKind,
    count: usize,
) -> Outcome {
    match (parse, repair) {
        (ParseStatus::Malformed, RepairStatus::Succeeded) => Outcome::RepairedAndModified,
        (ParseStatus::Malformed, _) => Outcome::Failed,
        (ParseStatus::WellFormed, _) => match located {
            LocateKind::Absent | LocateKind::EmptyOrWhitespace => Outcome::UnchangedElementEmpty,
            LocateKind::Present if count > 0 => Outcome::Modified,
            LocateKind::Present => Outcome::UnchangedValueAbsent,
        },
    }
}

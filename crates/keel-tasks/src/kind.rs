//! Task kinds

use std::fmt;

use serde::{Deserialize, Serialize};

/// Every kind of task keel dispatches
///
/// The string form is what travels on the queue and is stored in task
/// signatures, so it must stay stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskKind {
    CreateRelease,
    DeleteRelease,
    CreateProject,
    DeleteProject,
    AddReleases,
    UpgradeReleaseInProject,
    RemoveReleaseInProject,
}

impl TaskKind {
    pub const ALL: [TaskKind; 7] = [
        Self::CreateRelease,
        Self::DeleteRelease,
        Self::CreateProject,
        Self::DeleteProject,
        Self::AddReleases,
        Self::UpgradeReleaseInProject,
        Self::RemoveReleaseInProject,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateRelease => "Create-Release-Task",
            Self::DeleteRelease => "Delete-Release-Task",
            Self::CreateProject => "Create-Project-Task",
            Self::DeleteProject => "Delete-Project-Task",
            Self::AddReleases => "Add-Release-Task",
            Self::UpgradeReleaseInProject => "Upgrade-Release-Task",
            Self::RemoveReleaseInProject => "Remove-Release-Task",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

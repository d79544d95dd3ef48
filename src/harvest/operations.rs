//! Harvest operations and the inputs each one requires

use std::fmt;

/// One user-selectable harvest
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Repositories of every organization
    Repos,

    /// Commit history of every non-fork repository
    CommitHistory,

    /// Contributors of every repository
    Contributors,

    /// Repositories owned by members
    MemberRepos,

    /// Profiles of members
    MemberInfo,

    /// Repositories starred by members
    Starred,

    /// Follower and following networks of members
    Followers,

    /// Organizations members belong to
    Memberships,

    /// Organizations whose name matches an entity
    EntityOrganizations(String),
}

impl Operation {
    /// Everything `--all` runs, in execution order
    pub const STANDARD: [Operation; 8] = [
        Self::Repos,
        Self::CommitHistory,
        Self::Contributors,
        Self::MemberRepos,
        Self::MemberInfo,
        Self::Starred,
        Self::Followers,
        Self::Memberships,
    ];

    /// Needs the member list of every organization
    pub fn needs_members(&self) -> bool {
        matches!(
            self,
            Self::MemberRepos | Self::MemberInfo | Self::Starred | Self::Followers | Self::Memberships
        )
    }

    /// Needs the repository list
    pub fn needs_repos(&self) -> bool {
        matches!(self, Self::Repos | Self::CommitHistory | Self::Contributors)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Repos => "repos",
            Self::CommitHistory => "commit-history",
            Self::Contributors => "contributors",
            Self::MemberRepos => "member-repos",
            Self::MemberInfo => "member-info",
            Self::Starred => "starred",
            Self::Followers => "followers",
            Self::Memberships => "memberships",
            Self::EntityOrganizations(_) => "entity-organizations",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EntityOrganizations(entity) => write!(f, "{}({})", self.name(), entity),
            _ => f.write_str(self.name()),
        }
    }
}

/// Comma-separated operation names, as stored with each run
pub fn describe(operations: &[Operation]) -> String {
    operations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// Work unit definitions for harvest dispatch and deduplication
///
/// A work unit names one independent harvesting target. It is the key used by the
/// dedup gate and the unit of concurrent dispatch in the orchestrator.
use std::fmt;

/// What is being harvested for a work unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkKind {
    // ===== Organization scoped =====
    /// Member list of an organization
    OrgMembers,

    /// Repository list of an organization
    OrgRepos,

    // ===== Repository scoped =====
    /// Full metadata of a single repository
    Repository,

    /// Commit history of a repository
    CommitHistory,

    /// Contributors of a repository
    Contributors,

    // ===== Member scoped =====
    /// Repositories owned by a member
    MemberRepos,

    /// Profile of a member
    MemberInfo,

    /// Repositories starred by a member
    Starred,

    /// Users following a member
    Followers,

    /// Users a member follows
    Following,

    /// Organizations a member belongs to
    Memberships,

    // ===== Entity scoped =====
    /// Organizations whose name matches an entity
    EntityOrganizations,
}

impl WorkKind {
    /// Returns true if completion of this kind is recorded in the persisted store,
    /// so that later runs can skip it
    pub fn is_persisted(&self) -> bool {
        matches!(self, Self::CommitHistory | Self::EntityOrganizations)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OrgMembers => "org_members",
            Self::OrgRepos => "org_repos",
            Self::Repository => "repository",
            Self::CommitHistory => "commit_history",
            Self::Contributors => "contributors",
            Self::MemberRepos => "member_repos",
            Self::MemberInfo => "member_info",
            Self::Starred => "starred",
            Self::Followers => "followers",
            Self::Following => "following",
            Self::Memberships => "memberships",
            Self::EntityOrganizations => "entity_organizations",
        }
    }
}

impl fmt::Display for WorkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One independently dedupable harvesting target
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkUnit {
    pub kind: WorkKind,

    /// Owning organization; `None` for entity searches
    pub organization: Option<String>,

    /// Repository name, member login, entity name, or the organization itself
    pub subject: String,
}

impl WorkUnit {
    /// A unit scoped to a whole organization
    pub fn organization(kind: WorkKind, org: &str) -> Self {
        Self {
            kind,
            organization: Some(org.to_string()),
            subject: org.to_string(),
        }
    }

    /// A unit scoped to one repository of an organization
    pub fn repository(kind: WorkKind, org: &str, repo: &str) -> Self {
        Self {
            kind,
            organization: Some(org.to_string()),
            subject: repo.to_string(),
        }
    }

    /// A unit scoped to one member of an organization
    pub fn member(kind: WorkKind, org: &str, login: &str) -> Self {
        Self {
            kind,
            organization: Some(org.to_string()),
            subject: login.to_string(),
        }
    }

    /// An organization search for a named entity
    pub fn entity(name: &str) -> Self {
        Self {
            kind: WorkKind::EntityOrganizations,
            organization: None,
            subject: name.to_string(),
        }
    }

    /// The natural key of the unit, e.g. `acme/widget`
    pub fn natural_key(&self) -> String {
        match &self.organization {
            Some(org) if org != &self.subject => format!("{}/{}", org, self.subject),
            _ => self.subject.clone(),
        }
    }
}

impl fmt::Display for WorkUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.natural_key())
    }
}

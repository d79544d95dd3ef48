//! Harvest operations wired to the engine and the output sinks
//!
//! The harvester resolves targets lazily (organizations from entities, members
//! and repositories from organizations) and caches them for the rest of the run,
//! so running several operations never lists the same organization twice.

use crate::harvest::fetcher::{FetchOutcome, FetchRequest};
use crate::harvest::operations::Operation;
use crate::harvest::orchestrator::{AggregatedResult, DispatchReport, TaskOrchestrator};
use crate::model::{
    decode_records, CommitRecord, ContributorRecord, EntityOrgRecord, Enrichment, FollowerRecord,
    FollowingRecord, MemberInfoRecord, MemberRecord, MemberRepoRecord, MembershipRecord,
    RepoRecord, StarredRepoRecord, WorkKind, WorkUnit,
};
use crate::output::{DirectedGraph, FileSink};
use crate::storage::{with_storage, SharedStorage, Storage};
use crate::HarvestError;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

/// Organization login to member logins
pub type MemberMap = BTreeMap<String, Vec<String>>;

/// Work-unit sources given on the command line
#[derive(Debug, Clone, Default)]
pub struct Targets {
    pub entities: Vec<String>,
    pub organizations: Vec<String>,
    pub repositories: Vec<RepoRecord>,
}

impl Targets {
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.organizations.is_empty() && self.repositories.is_empty()
    }
}

pub struct Harvester {
    orchestrator: TaskOrchestrator,
    sink: FileSink,
    entities: Vec<String>,
    organizations: Vec<String>,
    input_repositories: Vec<RepoRecord>,
    entities_resolved: bool,
    repositories: Option<Vec<RepoRecord>>,
    members: Option<MemberMap>,
    report: DispatchReport,
}

impl Harvester {
    pub fn new(orchestrator: TaskOrchestrator, sink: FileSink, targets: Targets) -> Self {
        Self {
            orchestrator,
            sink,
            entities: targets.entities,
            organizations: targets.organizations,
            input_repositories: targets.repositories,
            entities_resolved: false,
            repositories: None,
            members: None,
            report: DispatchReport::default(),
        }
    }

    pub fn sink(&self) -> &FileSink {
        &self.sink
    }

    /// Counters of every dispatch so far
    pub fn report(&self) -> DispatchReport {
        self.report
    }

    fn storage(&self) -> &SharedStorage {
        self.orchestrator.gate().storage()
    }

    /// Runs operations in order and returns the accumulated counters
    pub async fn run(&mut self, operations: &[Operation]) -> Result<DispatchReport, HarvestError> {
        for operation in operations {
            tracing::info!("Running {}", operation);
            self.run_operation(operation).await?;
        }
        Ok(self.report)
    }

    pub async fn run_operation(&mut self, operation: &Operation) -> Result<(), HarvestError> {
        match operation {
            Operation::Repos => self.org_repositories().await,
            Operation::CommitHistory => self.commit_history().await,
            Operation::Contributors => self.contributors().await,
            Operation::MemberRepos => self.member_repositories().await,
            Operation::MemberInfo => self.member_info().await,
            Operation::Starred => self.starred_repositories().await,
            Operation::Followers => self.follower_networks().await,
            Operation::Memberships => self.membership_network().await,
            Operation::EntityOrganizations(entity) => self
                .entity_organizations(std::slice::from_ref(entity))
                .await
                .map(|_| ()),
        }
    }

    async fn dispatch(&mut self, jobs: Vec<(WorkUnit, FetchRequest)>) -> AggregatedResult {
        let result = self.orchestrator.dispatch(jobs).await;
        self.report.merge(&result.report);
        result
    }

    // ===== Target resolution =====

    /// Searches organizations for each entity and returns their logins
    ///
    /// Entities resolved by an earlier run are answered from the store.
    pub async fn entity_organizations(
        &mut self,
        entities: &[String],
    ) -> Result<Vec<String>, HarvestError> {
        let storage = Arc::clone(self.storage());
        let jobs = entities
            .iter()
            .map(|entity| {
                let storage = Arc::clone(&storage);
                let sink = self.sink.clone();
                let request = FetchRequest::new("/search/users")
                    .with_query("q", &format!("{} in:name type:org", entity))
                    .with_query("type", "User")
                    .enrich("entity", entity)
                    .with_page_transform(search_items)
                    .with_item_transform(|item| copy_field(item, "login", "github_org_name"))
                    .on_complete(move |enrichment, outcome| {
                        save_entity_organizations(&storage, &sink, enrichment, outcome)
                    });
                (WorkUnit::entity(entity), request)
            })
            .collect();

        let result = self.dispatch(jobs).await;

        let mut orgs = Vec::new();
        for outcome in &result.outcomes {
            let records: Vec<EntityOrgRecord> = decode_records(outcome.items().to_vec());
            orgs.extend(records.into_iter().map(|r| r.github_org_name));
        }
        for unit in &result.skipped {
            let stored = with_storage(self.storage(), |s| s.get_orgs_for_entity(&unit.subject))?;
            tracing::info!(
                "Using {} stored organizations for entity {}",
                stored.len(),
                unit.subject
            );
            orgs.extend(stored);
        }
        Ok(orgs)
    }

    /// Adds the organizations discovered from entities to the given ones
    async fn ensure_organizations(&mut self) -> Result<(), HarvestError> {
        if self.entities_resolved || self.entities.is_empty() {
            return Ok(());
        }
        self.entities_resolved = true;

        tracing::info!(
            "Scraping organizations that match {} entities ({} organizations given)",
            self.entities.len(),
            self.organizations.len()
        );
        let entities = self.entities.clone();
        let found = self.entity_organizations(&entities).await?;

        let mut seen: HashSet<String> = self.organizations.iter().map(|o| o.to_lowercase()).collect();
        for org in found {
            if seen.insert(org.to_lowercase()) {
                self.organizations.push(org);
            }
        }
        tracing::info!("Resolved {} organizations", self.organizations.len());
        Ok(())
    }

    /// Member logins of every organization
    pub async fn members(&mut self) -> Result<MemberMap, HarvestError> {
        if let Some(members) = &self.members {
            return Ok(members.clone());
        }
        self.ensure_organizations().await?;

        tracing::info!("Scraping members of {} organizations", self.organizations.len());
        let jobs = self
            .organizations
            .iter()
            .map(|org| {
                (
                    WorkUnit::organization(WorkKind::OrgMembers, org),
                    FetchRequest::new(format!("/orgs/{}/members", org)).enrich("organization", org),
                )
            })
            .collect();
        let result = self.dispatch(jobs).await;

        let mut members: MemberMap = self
            .organizations
            .iter()
            .map(|org| (org.clone(), Vec::new()))
            .collect();
        for record in decode_records::<MemberRecord>(result.into_items()) {
            members.entry(record.organization).or_default().push(record.login);
        }

        tracing::info!(
            "Found {} members in {} organizations",
            members.values().map(Vec::len).sum::<usize>(),
            members.len()
        );
        self.members = Some(members.clone());
        Ok(members)
    }

    /// Repositories to harvest: completed input rows, or every organization's listing
    pub async fn repositories(&mut self) -> Result<Vec<RepoRecord>, HarvestError> {
        if let Some(repos) = &self.repositories {
            return Ok(repos.clone());
        }

        let repos = if self.input_repositories.is_empty() {
            self.ensure_organizations().await?;
            self.list_org_repositories().await
        } else {
            self.complete_repositories().await
        };

        tracing::info!("{} repositories to harvest", repos.len());
        self.repositories = Some(repos.clone());
        Ok(repos)
    }

    async fn list_org_repositories(&mut self) -> Vec<RepoRecord> {
        tracing::info!("Scraping repositories from {} organizations", self.organizations.len());
        let jobs = self
            .organizations
            .iter()
            .map(|org| {
                (
                    WorkUnit::organization(WorkKind::OrgRepos, org),
                    FetchRequest::new(format!("/orgs/{}/repos", org)).enrich("organization", org),
                )
            })
            .collect();
        let result = self.dispatch(jobs).await;
        decode_records(result.into_items())
    }

    /// Fetches full metadata for repositories named in the input file
    ///
    /// A row whose lookup fails is kept as read from the file.
    async fn complete_repositories(&mut self) -> Vec<RepoRecord> {
        tracing::info!("Completing data of {} repositories", self.input_repositories.len());

        let mut seen = HashSet::new();
        let input: Vec<RepoRecord> = self
            .input_repositories
            .iter()
            .filter(|r| seen.insert(repo_key(&r.organization, &r.name)))
            .cloned()
            .collect();

        let jobs = input
            .iter()
            .map(|r| {
                (
                    WorkUnit::repository(WorkKind::Repository, &r.organization, &r.name),
                    FetchRequest::new(format!("/repos/{}/{}", r.organization, r.name))
                        .enrich("organization", &r.organization)
                        .enrich("repository", &r.name),
                )
            })
            .collect();
        let result = self.dispatch(jobs).await;

        let mut completed: HashMap<(String, String), RepoRecord> = HashMap::new();
        for outcome in result.outcomes {
            let Some(org) = outcome.unit.organization.as_deref() else {
                continue;
            };
            let key = repo_key(org, &outcome.unit.subject);
            if let Some(record) = decode_records::<RepoRecord>(outcome.items().to_vec()).pop() {
                completed.insert(key, record);
            }
        }

        input
            .into_iter()
            .map(|row| {
                completed
                    .remove(&repo_key(&row.organization, &row.name))
                    .unwrap_or(row)
            })
            .collect()
    }

    // ===== Repository operations =====

    async fn org_repositories(&mut self) -> Result<(), HarvestError> {
        let repos = self.repositories().await?;
        self.sink.write_table("org_repositories.csv", &repos)?;
        Ok(())
    }

    async fn commit_history(&mut self) -> Result<(), HarvestError> {
        let repos = self.repositories().await?;
        tracing::info!("Scraping commit history");

        let storage = Arc::clone(self.storage());
        let mut jobs = Vec::new();
        for repo in repos {
            if repo.fork {
                tracing::debug!("Skipping fork {}/{}", repo.organization, repo.name);
                continue;
            }

            let unit = WorkUnit::repository(WorkKind::CommitHistory, &repo.organization, &repo.name);
            let storage = Arc::clone(&storage);
            let sink = self.sink.clone();
            let request = FetchRequest::new(format!("/repos/{}/{}/commits", repo.organization, repo.name))
                .enrich("organization", &repo.organization)
                .enrich("repository", &repo.name)
                .with_item_transform(flatten_commit)
                .on_complete(move |_, outcome| save_commit_history(&storage, &sink, &repo, outcome));
            jobs.push((unit, request));
        }

        let result = self.dispatch(jobs).await;
        tracing::info!(
            "Commit history: {} repositories fetched, {} already harvested",
            result.report.dispatched,
            result.report.skipped
        );
        Ok(())
    }

    async fn contributors(&mut self) -> Result<(), HarvestError> {
        let repos = self.repositories().await?;
        tracing::info!("Scraping contributors");

        let jobs = repos
            .iter()
            .map(|repo| {
                (
                    WorkUnit::repository(WorkKind::Contributors, &repo.organization, &repo.name),
                    FetchRequest::new(format!(
                        "/repos/{}/{}/contributors",
                        repo.organization, repo.name
                    ))
                    .enrich("organization", &repo.organization)
                    .enrich("repository", &repo.name),
                )
            })
            .collect();
        let result = self.dispatch(jobs).await;

        let contributors: Vec<ContributorRecord> = decode_records(result.into_items());
        self.sink.write_table("contributor_list.csv", &contributors)?;

        let mut graph = DirectedGraph::new();
        for c in &contributors {
            graph.add_node(&c.repository, &[("organization", c.organization.as_str())]);
            graph.add_edge(&c.login, &c.repository, &[("organization", c.organization.as_str())]);
        }
        self.sink.write_graph("contributor_network.gexf", &graph)?;
        Ok(())
    }

    // ===== Member operations =====

    /// One request per member, enriched with the organization and `member_field`
    fn member_jobs(
        members: &MemberMap,
        kind: WorkKind,
        endpoint: &str,
        member_field: Option<&str>,
    ) -> Vec<(WorkUnit, FetchRequest)> {
        let mut jobs = Vec::new();
        for (org, logins) in members {
            for login in logins {
                let mut request = FetchRequest::new(format!("/users/{}{}", login, endpoint))
                    .enrich("organization", org);
                if let Some(field) = member_field {
                    request = request.enrich(field, login);
                }
                jobs.push((WorkUnit::member(kind, org, login), request));
            }
        }
        jobs
    }

    async fn member_repositories(&mut self) -> Result<(), HarvestError> {
        let members = self.members().await?;
        tracing::info!("Getting repositories of all members");

        let jobs = Self::member_jobs(&members, WorkKind::MemberRepos, "/repos", Some("user"));
        let result = self.dispatch(jobs).await;

        let repos: Vec<MemberRepoRecord> = decode_records(result.into_items());
        self.sink.write_table("members_repositories.csv", &repos)?;
        Ok(())
    }

    async fn member_info(&mut self) -> Result<(), HarvestError> {
        let members = self.members().await?;
        tracing::info!("Getting user information of all members");

        let jobs = Self::member_jobs(&members, WorkKind::MemberInfo, "", None);
        let result = self.dispatch(jobs).await;

        let profiles: Vec<MemberInfoRecord> = decode_records(result.into_items());
        self.sink.write_table("members_info.csv", &profiles)?;
        Ok(())
    }

    async fn starred_repositories(&mut self) -> Result<(), HarvestError> {
        let members = self.members().await?;
        tracing::info!("Getting repositories starred by members");

        let jobs = Self::member_jobs(&members, WorkKind::Starred, "/starred", Some("user"));
        let result = self.dispatch(jobs).await;

        let starred: Vec<StarredRepoRecord> = decode_records(result.into_items());
        self.sink.write_table("starred_repositories.csv", &starred)?;
        Ok(())
    }

    /// Full network of everyone following or followed by a member, and the
    /// narrow network restricted to members of the same organization
    async fn follower_networks(&mut self) -> Result<(), HarvestError> {
        let members = self.members().await?;
        tracing::info!("Generating follower networks");

        let mut jobs = Vec::new();
        for (org, logins) in &members {
            for login in logins {
                jobs.push((
                    WorkUnit::member(WorkKind::Followers, org, login),
                    FetchRequest::new(format!("/users/{}/followers", login))
                        .enrich("follows", login)
                        .enrich("original_org", org),
                ));
                jobs.push((
                    WorkUnit::member(WorkKind::Following, org, login),
                    FetchRequest::new(format!("/users/{}/following", login))
                        .enrich("followed_by", login)
                        .enrich("original_org", org),
                ));
            }
        }
        let result = self.dispatch(jobs).await;

        let mut full = DirectedGraph::new();
        let mut narrow = DirectedGraph::new();
        for (org, logins) in &members {
            for login in logins {
                full.add_node(login, &[("organization", org.as_str())]);
                narrow.add_node(login, &[("organization", org.as_str())]);
            }
        }

        let is_member = |org: &str, login: &str| {
            members
                .get(org)
                .is_some_and(|logins| logins.iter().any(|l| l == login))
        };

        for outcome in result.outcomes {
            let items = outcome.items().to_vec();
            match outcome.unit.kind {
                WorkKind::Followers => {
                    for f in decode_records::<FollowerRecord>(items) {
                        let attrs = [("organization", f.original_org.as_str())];
                        full.add_edge(&f.login, &f.follows, &attrs);
                        if is_member(&f.original_org, &f.login) {
                            narrow.add_edge(&f.login, &f.follows, &attrs);
                        }
                    }
                }
                WorkKind::Following => {
                    for f in decode_records::<FollowingRecord>(items) {
                        let attrs = [("organization", f.original_org.as_str())];
                        full.add_edge(&f.followed_by, &f.login, &attrs);
                        if is_member(&f.original_org, &f.login) {
                            narrow.add_edge(&f.followed_by, &f.login, &attrs);
                        }
                    }
                }
                _ => {}
            }
        }

        self.sink.write_graph("full-follower-network.gexf", &full)?;
        self.sink.write_graph("narrow-follower-network.gexf", &narrow)?;
        Ok(())
    }

    async fn membership_network(&mut self) -> Result<(), HarvestError> {
        let members = self.members().await?;
        tracing::info!("Generating network of memberships");

        let jobs = Self::member_jobs(&members, WorkKind::Memberships, "/orgs", Some("scraped_org_member"));
        let result = self.dispatch(jobs).await;

        let mut graph = DirectedGraph::new();
        for m in decode_records::<MembershipRecord>(result.into_items()) {
            graph.add_node(&m.scraped_org_member, &[("node_type", "user")]);
            graph.add_node(&m.login, &[("node_type", "organization")]);
            graph.add_edge(&m.scraped_org_member, &m.login, &[("organization", m.organization.as_str())]);
        }
        self.sink.write_graph("membership_network.gexf", &graph)?;
        Ok(())
    }
}

fn repo_key(org: &str, name: &str) -> (String, String) {
    (org.to_lowercase(), name.to_lowercase())
}

/// Search responses wrap their results in `items`
fn search_items(page: Value) -> Value {
    match page {
        Value::Object(mut body) => body
            .remove("items")
            .unwrap_or_else(|| Value::Array(Vec::new())),
        other => other,
    }
}

fn copy_field(mut item: Value, from: &str, to: &str) -> Value {
    if let Value::Object(map) = &mut item {
        if let Some(value) = map.get(from).cloned() {
            map.insert(to.to_string(), value);
        }
    }
    item
}

/// Lifts the author of the nested `commit` payload to top-level fields
fn flatten_commit(mut item: Value) -> Value {
    let author = item.pointer("/commit/author").cloned().unwrap_or(Value::Null);
    if let Value::Object(map) = &mut item {
        for (field, source) in [
            ("committer_name", "name"),
            ("committer_email", "email"),
            ("committed_at", "date"),
        ] {
            map.insert(
                field.to_string(),
                author.get(source).cloned().unwrap_or(Value::Null),
            );
        }
    }
    item
}

/// Writes a repository's commits and, if the history is complete, records it
/// in the store so later runs skip the repository
fn save_commit_history(
    storage: &SharedStorage,
    sink: &FileSink,
    repo: &RepoRecord,
    outcome: &FetchOutcome,
) {
    let commits: Vec<CommitRecord> = decode_records(outcome.items.clone());
    let name = format!("{}_{}_commit_history.csv", repo.organization, repo.name);
    if let Err(e) = sink.write_table(&name, &commits) {
        tracing::error!("Failed to write {}: {}", name, e);
    }

    if !outcome.is_complete() {
        tracing::warn!(
            "Commit history of {}/{} is incomplete and will be fetched again next run",
            repo.organization,
            repo.name
        );
        return;
    }

    match with_storage(storage, |s| s.record_commit_history(repo, &commits)) {
        Ok(inserted) => tracing::info!(
            "Stored {} new commits of {}/{}",
            inserted,
            repo.organization,
            repo.name
        ),
        Err(e) => tracing::error!(
            "Failed to store commit history of {}/{}: {}",
            repo.organization,
            repo.name,
            e
        ),
    }
}

fn save_entity_organizations(
    storage: &SharedStorage,
    sink: &FileSink,
    enrichment: &Enrichment,
    outcome: &FetchOutcome,
) {
    let Some(entity) = enrichment.get("entity") else {
        return;
    };
    let orgs: Vec<EntityOrgRecord> = decode_records(outcome.items.clone());

    let name = format!("{}_organizations.csv", entity);
    if let Err(e) = sink.write_table(&name, &orgs) {
        tracing::error!("Failed to write {}: {}", name, e);
    }

    if !outcome.is_complete() {
        tracing::warn!("Organization search for {} is incomplete, not storing it", entity);
        return;
    }
    if let Err(e) = with_storage(storage, |s| s.record_entity_organizations(entity, &orgs)) {
        tracing::error!("Failed to store organizations of {}: {}", entity, e);
    }
}

//! Integration tests for the harvest pipeline
//!
//! These tests run whole operations against a wiremock API and check the
//! dedup gate, the persisted store and the CSV/GEXF outputs.

use org_harvest::config::{ApiConfig, Config, CredentialEntry, HarvestConfig, OutputConfig};
use org_harvest::harvest::{build_orchestrator, FetchRequest, Harvester, Operation, Targets};
use org_harvest::model::{CommitRecord, RepoRecord, WorkKind, WorkUnit};
use org_harvest::output::FileSink;
use org_harvest::storage::{open_shared_storage, with_storage, SharedStorage, Storage, StoreTable};
use serde_json::{json, Value};
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn create_test_config(base_url: &str) -> Config {
    Config {
        api: ApiConfig {
            base_url: base_url.to_string(),
            secondary_cooldown_ms: 100,
            request_timeout_ms: 10_000,
            ..ApiConfig::default()
        },
        harvest: HarvestConfig {
            concurrency_per_credential: 2,
            task_timeout_ms: 5_000,
            run_deadline_ms: None,
        },
        output: OutputConfig {
            database_path: "unused.db".to_string(),
            data_dir: "unused".to_string(),
        },
        credentials: vec![
            CredentialEntry {
                user_name: "alice".to_string(),
                api_token: "alice-token".to_string(),
            },
            CredentialEntry {
                user_name: "bob".to_string(),
                api_token: "bob-token".to_string(),
            },
        ],
    }
}

fn create_harvester(config: &Config, storage: SharedStorage, out: &Path, targets: Targets) -> Harvester {
    let orchestrator = build_orchestrator(config, storage).unwrap();
    let sink = FileSink::in_directory(out.to_path_buf()).unwrap();
    Harvester::new(orchestrator, sink, targets)
}

fn organizations(names: &[&str]) -> Targets {
    Targets {
        organizations: names.iter().map(|n| n.to_string()).collect(),
        ..Default::default()
    }
}

fn repo_row(org: &str, name: &str) -> RepoRecord {
    RepoRecord {
        organization: org.to_string(),
        name: name.to_string(),
        full_name: None,
        stargazers_count: None,
        language: None,
        created_at: None,
        updated_at: None,
        homepage: None,
        fork: false,
        description: None,
    }
}

fn commits(shas: &[&str], author: &str) -> Value {
    Value::Array(
        shas.iter()
            .map(|sha| {
                json!({
                    "sha": sha,
                    "commit": {"author": {
                        "name": author,
                        "email": format!("{}@example.com", author.to_lowercase()),
                        "date": "2024-01-01T00:00:00Z"
                    }}
                })
            })
            .collect(),
    )
}

async fn mount_json(server: &MockServer, route: &str, body: Value) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_harvested_repository_is_not_fetched_again() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let storage = open_shared_storage(&dir.path().join("harvest.db")).unwrap();

    // acme/widget was fully harvested by an earlier run
    with_storage(&storage, |s| {
        s.record_commit_history(
            &repo_row("acme", "widget"),
            &[CommitRecord {
                sha: "old".to_string(),
                committer_name: Some("Octo".to_string()),
                committer_email: None,
                committed_at: Some("2023-01-01T00:00:00Z".to_string()),
                organization: "acme".to_string(),
                repository: "widget".to_string(),
            }],
        )
    })
    .unwrap();

    mount_json(&server, "/repos/acme/widget", json!({"name": "widget", "fork": false})).await;
    mount_json(&server, "/repos/acme/gadget", json!({"name": "gadget", "fork": false})).await;

    Mock::given(method("GET"))
        .and(path("/repos/acme/widget/commits"))
        .respond_with(ResponseTemplate::new(200).set_body_json(commits(&["w1"], "Octo")))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/gadget/commits"))
        .respond_with(ResponseTemplate::new(200).set_body_json(commits(&["g1", "g2"], "Cat")))
        .expect(1)
        .mount(&server)
        .await;

    let config = create_test_config(&server.uri());
    let targets = Targets {
        repositories: vec![repo_row("acme", "widget"), repo_row("acme", "gadget")],
        ..Default::default()
    };
    let mut harvester = create_harvester(&config, storage.clone(), dir.path(), targets);

    let report = harvester.run(&[Operation::CommitHistory]).await.unwrap();

    assert_eq!(report.skipped, 1);
    assert!(!dir.path().join("acme_widget_commit_history.csv").exists());
    assert!(dir.path().join("acme_gadget_commit_history.csv").exists());
    assert!(with_storage(&storage, |s| s.repo_exists("acme", "gadget")).unwrap());
    assert_eq!(with_storage(&storage, |s| s.count_rows(StoreTable::Commit)).unwrap(), 3);
}

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let storage = open_shared_storage(&dir.path().join("harvest.db")).unwrap();

    mount_json(
        &server,
        "/orgs/acme/repos",
        json!([
            {"name": "widget", "full_name": "acme/widget", "fork": false, "created_at": "2020-01-01T00:00:00Z"},
            {"name": "spoon", "full_name": "acme/spoon", "fork": true}
        ]),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/widget/commits"))
        .respond_with(ResponseTemplate::new(200).set_body_json(commits(&["c1", "c2"], "Octo")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/spoon/commits"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;

    let config = create_test_config(&server.uri());

    let first_out = dir.path().join("first");
    let mut first = create_harvester(&config, storage.clone(), &first_out, organizations(&["acme"]));
    let report = first.run(&[Operation::CommitHistory]).await.unwrap();
    assert!(report.is_clean());

    let content = std::fs::read_to_string(first_out.join("acme_widget_commit_history.csv")).unwrap();
    let header = content.lines().next().unwrap();
    assert_eq!(
        header,
        "sha,committer_name,committer_email,committed_at,organization,repository"
    );
    assert_eq!(content.lines().count(), 3);

    let second_out = dir.path().join("second");
    let mut second = create_harvester(&config, storage.clone(), &second_out, organizations(&["acme"]));
    let report = second.run(&[Operation::CommitHistory]).await.unwrap();
    assert_eq!(report.skipped, 1);

    assert_eq!(with_storage(&storage, |s| s.count_rows(StoreTable::Commit)).unwrap(), 2);
    assert_eq!(with_storage(&storage, |s| s.count_rows(StoreTable::User)).unwrap(), 1);
    assert_eq!(with_storage(&storage, |s| s.count_rows(StoreTable::Repo)).unwrap(), 1);
}

#[tokio::test]
async fn test_incomplete_history_is_not_recorded() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let storage = open_shared_storage(&dir.path().join("harvest.db")).unwrap();

    mount_json(&server, "/orgs/acme/repos", json!([{"name": "widget", "fork": false}])).await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/widget/commits"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"message": "Server Error"})))
        .mount(&server)
        .await;

    let config = create_test_config(&server.uri());
    let mut harvester = create_harvester(&config, storage.clone(), dir.path(), organizations(&["acme"]));
    let report = harvester.run(&[Operation::CommitHistory]).await.unwrap();

    assert_eq!(report.partial, 1);
    assert!(!report.is_clean());
    assert!(!with_storage(&storage, |s| s.repo_exists("acme", "widget")).unwrap());
}

#[tokio::test]
async fn test_gateway_error_mid_history_is_not_recorded() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let storage = open_shared_storage(&dir.path().join("harvest.db")).unwrap();

    mount_json(&server, "/orgs/acme/repos", json!([{"name": "widget", "fork": false}])).await;

    let shas: Vec<String> = (0..100).map(|i| format!("c{}", i)).collect();
    let shas: Vec<&str> = shas.iter().map(String::as_str).collect();
    Mock::given(method("GET"))
        .and(path("/repos/acme/widget/commits"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(commits(&shas, "Octo")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/widget/commits"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(502).set_body_string("<html>Bad Gateway</html>"))
        .expect(1)
        .mount(&server)
        .await;

    let config = create_test_config(&server.uri());
    let mut harvester = create_harvester(&config, storage.clone(), dir.path(), organizations(&["acme"]));
    let report = harvester.run(&[Operation::CommitHistory]).await.unwrap();

    assert_eq!(report.partial, 1);
    assert!(!report.is_clean());
    assert!(!with_storage(&storage, |s| s.repo_exists("acme", "widget")).unwrap());
    assert_eq!(with_storage(&storage, |s| s.count_rows(StoreTable::Commit)).unwrap(), 0);

    // What was collected is still written out
    let content = std::fs::read_to_string(dir.path().join("acme_widget_commit_history.csv")).unwrap();
    assert_eq!(content.lines().count(), 101);
}

#[tokio::test]
async fn test_failed_task_does_not_block_siblings() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let storage = open_shared_storage(&dir.path().join("harvest.db")).unwrap();

    mount_json(&server, "/users/fast1", json!({"login": "fast1"})).await;
    mount_json(&server, "/users/fast2", json!({"login": "fast2"})).await;
    Mock::given(method("GET"))
        .and(path("/users/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"login": "slow"}))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let mut config = create_test_config(&server.uri());
    config.harvest.task_timeout_ms = 300;
    let orchestrator = build_orchestrator(&config, storage).unwrap();

    let jobs = ["fast1", "slow", "fast2"]
        .iter()
        .map(|login| {
            (
                WorkUnit::member(WorkKind::MemberInfo, "acme", login),
                FetchRequest::new(format!("/users/{}", login)).enrich("organization", "acme"),
            )
        })
        .collect();
    let result = orchestrator.dispatch(jobs).await;

    assert_eq!(result.report.dispatched, 3);
    assert_eq!(result.report.completed, 2);
    assert_eq!(result.report.failed, 1);

    let failed: Vec<&str> = result
        .outcomes
        .iter()
        .filter(|o| o.error.is_some())
        .map(|o| o.unit.subject.as_str())
        .collect();
    assert_eq!(failed, vec!["slow"]);
    assert_eq!(result.items().count(), 2);
}

#[tokio::test]
async fn test_run_deadline_cancels_outstanding_work() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let storage = open_shared_storage(&dir.path().join("harvest.db")).unwrap();

    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"login": "late"}))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let config = create_test_config(&server.uri());
    let orchestrator = build_orchestrator(&config, storage).unwrap();
    orchestrator.arm_deadline(Duration::from_millis(200));

    let jobs = (0..3)
        .map(|i| {
            let login = format!("member{}", i);
            (
                WorkUnit::member(WorkKind::MemberInfo, "acme", &login),
                FetchRequest::new(format!("/users/{}", login)),
            )
        })
        .collect();
    let result = orchestrator.dispatch(jobs).await;

    assert_eq!(result.report.failed, 3);
    assert!(orchestrator.cancellation_token().is_cancelled());
}

#[tokio::test]
async fn test_repository_and_contributor_outputs() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let storage = open_shared_storage(&dir.path().join("harvest.db")).unwrap();

    Mock::given(method("GET"))
        .and(path("/orgs/acme/repos"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"name": "widget", "full_name": "acme/widget", "stargazers_count": 7, "language": "Rust", "fork": false},
            {"name": "gadget", "full_name": "acme/gadget", "stargazers_count": 1, "language": null, "fork": true}
        ])))
        .expect(1)
        .mount(&server)
        .await;
    mount_json(
        &server,
        "/repos/acme/widget/contributors",
        json!([{"login": "octo", "contributions": 12}, {"login": "cat", "contributions": 3}]),
    )
    .await;
    mount_json(
        &server,
        "/repos/acme/gadget/contributors",
        json!([{"login": "octo", "contributions": 1}]),
    )
    .await;

    let config = create_test_config(&server.uri());
    let mut harvester = create_harvester(&config, storage, dir.path(), organizations(&["acme"]));
    harvester
        .run(&[Operation::Repos, Operation::Contributors])
        .await
        .unwrap();

    let repos = std::fs::read_to_string(dir.path().join("org_repositories.csv")).unwrap();
    let mut lines = repos.lines();
    assert_eq!(
        lines.next().unwrap(),
        "organization,name,full_name,stargazers_count,language,created_at,updated_at,homepage,fork,description"
    );
    assert_eq!(repos.lines().count(), 3);
    assert!(repos.contains("acme,widget,acme/widget,7,Rust"));

    let contributors = std::fs::read_to_string(dir.path().join("contributor_list.csv")).unwrap();
    assert_eq!(
        contributors.lines().next().unwrap(),
        "organization,repository,login,contributions,html_url,url"
    );
    assert_eq!(contributors.lines().count(), 4);

    let gexf = std::fs::read_to_string(dir.path().join("contributor_network.gexf")).unwrap();
    assert!(gexf.contains("source=\"octo\" target=\"widget\""));
    assert!(gexf.contains("source=\"cat\" target=\"widget\""));
    assert!(gexf.contains("source=\"octo\" target=\"gadget\""));
}

#[tokio::test]
async fn test_follower_networks() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let storage = open_shared_storage(&dir.path().join("harvest.db")).unwrap();

    Mock::given(method("GET"))
        .and(path("/orgs/acme/members"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"login": "octo"}, {"login": "cat"}])))
        .expect(1)
        .mount(&server)
        .await;
    mount_json(&server, "/users/octo/followers", json!([{"login": "cat"}, {"login": "stranger"}])).await;
    mount_json(&server, "/users/octo/following", json!([])).await;
    mount_json(&server, "/users/cat/followers", json!([])).await;
    mount_json(&server, "/users/cat/following", json!([{"login": "octo"}, {"login": "celebrity"}])).await;
    mount_json(&server, "/users/octo/orgs", json!([{"login": "acme"}, {"login": "globex"}])).await;
    mount_json(&server, "/users/cat/orgs", json!([{"login": "acme"}])).await;

    let config = create_test_config(&server.uri());
    let mut harvester = create_harvester(&config, storage, dir.path(), organizations(&["acme"]));
    let report = harvester
        .run(&[Operation::Followers, Operation::Memberships])
        .await
        .unwrap();

    // Members are listed once and reused by both operations
    assert_eq!(report.dispatched, 1 + 4 + 2);

    let full = std::fs::read_to_string(dir.path().join("full-follower-network.gexf")).unwrap();
    assert!(full.contains("source=\"cat\" target=\"octo\""));
    assert!(full.contains("source=\"stranger\" target=\"octo\""));
    assert!(full.contains("source=\"cat\" target=\"celebrity\""));

    let narrow = std::fs::read_to_string(dir.path().join("narrow-follower-network.gexf")).unwrap();
    assert!(narrow.contains("source=\"cat\" target=\"octo\""));
    assert!(!narrow.contains("stranger"));
    assert!(!narrow.contains("celebrity"));

    let memberships = std::fs::read_to_string(dir.path().join("membership_network.gexf")).unwrap();
    assert!(memberships.contains("source=\"octo\" target=\"globex\""));
    assert!(memberships.contains("source=\"cat\" target=\"acme\""));
}

#[tokio::test]
async fn test_entity_search_is_recorded_and_reused() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let storage = open_shared_storage(&dir.path().join("harvest.db")).unwrap();

    Mock::given(method("GET"))
        .and(path("/search/users"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "total_count": 2,
            "items": [
                {"login": "acme-inc", "id": 1, "html_url": "https://example.com/acme-inc"},
                {"login": "acme-labs", "id": 2, "html_url": "https://example.com/acme-labs"}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let config = create_test_config(&server.uri());
    let entities = vec!["Acme".to_string()];

    let first_out = dir.path().join("first");
    let mut first = create_harvester(&config, storage.clone(), &first_out, Targets::default());
    let mut found = first.entity_organizations(&entities).await.unwrap();
    found.sort();
    assert_eq!(found, vec!["acme-inc".to_string(), "acme-labs".to_string()]);

    let csv = std::fs::read_to_string(first_out.join("Acme_organizations.csv")).unwrap();
    assert_eq!(csv.lines().next().unwrap(), "entity,github_org_name,id,html_url");
    assert!(csv.contains("Acme,acme-inc,1,https://example.com/acme-inc"));

    let second_out = dir.path().join("second");
    let mut second = create_harvester(&config, storage.clone(), &second_out, Targets::default());
    let stored = second.entity_organizations(&entities).await.unwrap();
    assert_eq!(stored, vec!["acme-inc".to_string(), "acme-labs".to_string()]);
    assert_eq!(second.report().skipped, 1);
}

#[tokio::test]
async fn test_entities_resolve_to_organization_members() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let storage = open_shared_storage(&dir.path().join("harvest.db")).unwrap();

    mount_json(
        &server,
        "/search/users",
        json!({"total_count": 1, "items": [{"login": "acme-inc", "id": 1}]}),
    )
    .await;
    mount_json(&server, "/orgs/acme-inc/members", json!([{"login": "octo"}])).await;
    mount_json(
        &server,
        "/users/octo",
        json!({"login": "octo", "name": "Octo Cat", "type": "User", "location": "Sea"}),
    )
    .await;

    let config = create_test_config(&server.uri());
    let targets = Targets {
        entities: vec!["Acme".to_string()],
        ..Default::default()
    };
    let mut harvester = create_harvester(&config, storage, dir.path(), targets);
    harvester.run(&[Operation::MemberInfo]).await.unwrap();

    let info = std::fs::read_to_string(dir.path().join("members_info.csv")).unwrap();
    let lines: Vec<&str> = info.lines().collect();
    assert_eq!(lines[0], "organization,login,name,url,type,company,blog,location");
    assert_eq!(lines[1], "acme-inc,octo,Octo Cat,,User,,,Sea");
}

#[tokio::test]
async fn test_entity_with_separator_still_gets_its_csv() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let storage = open_shared_storage(&dir.path().join("harvest.db")).unwrap();

    mount_json(
        &server,
        "/search/users",
        json!({"total_count": 1, "items": [{"login": "att-bell", "id": 7}]}),
    )
    .await;

    let config = create_test_config(&server.uri());
    let mut harvester = create_harvester(&config, storage.clone(), dir.path(), Targets::default());
    let found = harvester
        .entity_organizations(&["AT&T / Bell".to_string()])
        .await
        .unwrap();
    assert_eq!(found, vec!["att-bell".to_string()]);

    let csv = std::fs::read_to_string(dir.path().join("AT&T _ Bell_organizations.csv")).unwrap();
    assert!(csv.contains("AT&T / Bell,att-bell,7,"));
    assert!(with_storage(&storage, |s| s.entity_exists("AT&T / Bell")).unwrap());
}

#[tokio::test]
async fn test_entities_and_organizations_are_merged() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let storage = open_shared_storage(&dir.path().join("harvest.db")).unwrap();

    Mock::given(method("GET"))
        .and(path("/search/users"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "total_count": 2,
            "items": [{"login": "acme", "id": 1}, {"login": "acme-labs", "id": 2}]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/orgs/acme/members"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"login": "octo"}])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/orgs/acme-labs/members"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"login": "cat"}])))
        .expect(1)
        .mount(&server)
        .await;

    let config = create_test_config(&server.uri());
    let targets = Targets {
        entities: vec!["Acme".to_string()],
        organizations: vec!["acme".to_string()],
        ..Default::default()
    };
    let mut harvester = create_harvester(&config, storage, dir.path(), targets);
    let members = harvester.members().await.unwrap();

    assert_eq!(members.len(), 2);
    assert_eq!(members.get("acme-labs"), Some(&vec!["cat".to_string()]));
}

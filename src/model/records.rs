//! Typed records for every harvested endpoint
//!
//! The fetcher works on raw JSON items so enrichment fields and transforms can be
//! applied uniformly. Operations decode the accumulated items into these types,
//! whose serde field names double as the CSV column projection.

use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Constant metadata merged into every item of one fetch (e.g. organization name)
pub type Enrichment = BTreeMap<String, String>;

/// A member login of an organization
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MemberRecord {
    pub organization: String,
    pub login: String,
}

/// A repository, as listed for an organization or loaded from CSV input
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RepoRecord {
    pub organization: String,
    pub name: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub stargazers_count: Option<u64>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub homepage: Option<String>,
    #[serde(default, deserialize_with = "flexible_bool")]
    pub fork: bool,
    #[serde(default)]
    pub description: Option<String>,
}

/// One commit of a repository, flattened from the nested commit payload
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CommitRecord {
    pub sha: String,
    #[serde(default)]
    pub committer_name: Option<String>,
    #[serde(default)]
    pub committer_email: Option<String>,
    #[serde(default)]
    pub committed_at: Option<String>,
    pub organization: String,
    pub repository: String,
}

/// A contributor of a repository
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ContributorRecord {
    pub organization: String,
    pub repository: String,
    pub login: String,
    #[serde(default)]
    pub contributions: Option<u64>,
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

/// A repository owned by an organization member
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MemberRepoRecord {
    pub organization: String,
    pub user: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default, deserialize_with = "flexible_bool")]
    pub fork: bool,
    #[serde(default)]
    pub stargazers_count: Option<u64>,
    #[serde(default)]
    pub forks_count: Option<u64>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Profile of an organization member
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MemberInfoRecord {
    pub organization: String,
    pub login: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(rename = "type", default)]
    pub account_type: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub blog: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
}

/// A repository starred by an organization member
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StarredRepoRecord {
    pub organization: String,
    pub user: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// A user (`login`) following a member (`follows`)
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FollowerRecord {
    pub login: String,
    pub follows: String,
    pub original_org: String,
}

/// A user (`login`) followed by a member (`followed_by`)
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FollowingRecord {
    pub login: String,
    pub followed_by: String,
    pub original_org: String,
}

/// An organization (`login`) that a scraped member belongs to
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MembershipRecord {
    pub organization: String,
    pub scraped_org_member: String,
    pub login: String,
}

/// An organization found by searching for an entity name
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EntityOrgRecord {
    pub entity: String,
    pub github_org_name: String,
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub html_url: Option<String>,
}

/// Decodes raw items into typed records, dropping (and logging) malformed ones
pub fn decode_records<T: DeserializeOwned>(items: Vec<Value>) -> Vec<T> {
    let mut records = Vec::with_capacity(items.len());
    for item in items {
        match serde_json::from_value::<T>(item) {
            Ok(record) => records.push(record),
            Err(e) => {
                tracing::warn!(
                    "Dropping malformed {} item: {}",
                    std::any::type_name::<T>().rsplit("::").next().unwrap_or("record"),
                    e
                );
            }
        }
    }
    records
}

/// Accepts JSON booleans as well as the textual spellings found in CSV input
fn flexible_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Bool(bool),
        Number(i64),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(false),
        Some(Raw::Bool(b)) => Ok(b),
        Some(Raw::Number(n)) => Ok(n != 0),
        Some(Raw::Text(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" | "" => Ok(false),
            other => Err(D::Error::custom(format!("invalid boolean '{}'", other))),
        },
    }
}

//! Data model for harvesting
//!
//! # Components
//!
//! - `WorkUnit` / `WorkKind`: identify one dedupable, independently dispatched target
//! - Record types: one structured type per harvested endpoint

mod records;
mod work_unit;

pub use records::{
    decode_records, CommitRecord, ContributorRecord, EntityOrgRecord, Enrichment,
    FollowerRecord, FollowingRecord, MemberInfoRecord, MemberRecord, MemberRepoRecord,
    MembershipRecord, RepoRecord, StarredRepoRecord,
};
pub use work_unit::{WorkKind, WorkUnit};

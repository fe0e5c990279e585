use crate::schema::AttrType;
use crate::{OrgId, ResourceKind};

/// Schema-level failures: a value that does not fit its declared attribute.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("{kind}: attribute {attr} expects {expected:?}, got {got:?}")]
    AttrType { kind: ResourceKind, attr: &'static str, expected: AttrType, got: AttrType },
    #[error("{kind}: unknown attribute {attr}")]
    UnknownAttr { kind: ResourceKind, attr: String },
}

/// Cycle-fatal errors. Everything recoverable (malformed association keys,
/// aux identity misses, listener failures) is absorbed where it happens and
/// never surfaces here.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("{kind} [org {org}]: source fetch failed: {source}")]
    SourceFetch {
        kind: ResourceKind,
        org: OrgId,
        #[source]
        source: anyhow::Error,
    },
    #[error("{kind} [org {org}]: parse failed: {detail}")]
    Parse { kind: ResourceKind, org: OrgId, detail: String },
    #[error("{kind} [org {org}]: cycle timed out after {secs}s")]
    Timeout { kind: ResourceKind, org: OrgId, secs: u64 },
}

impl SyncError {
    pub fn kind(&self) -> ResourceKind {
        match self {
            SyncError::SourceFetch { kind, .. } | SyncError::Parse { kind, .. } | SyncError::Timeout { kind, .. } => *kind,
        }
    }

    pub fn org(&self) -> OrgId {
        match self {
            SyncError::SourceFetch { org, .. } | SyncError::Parse { org, .. } | SyncError::Timeout { org, .. } => *org,
        }
    }

    /// Short label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            SyncError::SourceFetch { .. } => "fetch",
            SyncError::Parse { .. } => "parse",
            SyncError::Timeout { .. } => "timeout",
        }
    }

    pub fn parse(kind: ResourceKind, org: OrgId, detail: impl std::fmt::Display) -> Self {
        SyncError::Parse { kind, org, detail: detail.to_string() }
    }
}

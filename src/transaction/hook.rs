//! The commit-time hook of reference transactions.

use std::fmt;

use async_trait::async_trait;

use crate::error::BoxError;
use crate::storage::{ObjectId, ReferenceName};

/// What a staged operation does to its reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefOperation {
    /// the reference must not exist yet
    Create { new: ObjectId },
    /// move the reference; `old` is verified when given
    Update { old: Option<ObjectId>, new: ObjectId },
    /// remove the reference; `old` is verified when given
    Delete { old: Option<ObjectId> },
}

/// A single staged reference change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefUpdate {
    pub name: ReferenceName,
    pub operation: RefOperation,
}

impl RefUpdate {
    /// Value the reference holds after the batch commits, `None` when deleted.
    pub fn new_value(&self) -> Option<ObjectId> {
        match self.operation {
            RefOperation::Create { new } | RefOperation::Update { new, .. } => Some(new),
            RefOperation::Delete { .. } => None,
        }
    }

    /// Encode as an `update-ref -z --stdin` command.
    pub(crate) fn encode(&self, out: &mut Vec<u8>) {
        let hex = |oid: Option<ObjectId>| oid.map(|oid| oid.to_string()).unwrap_or_default();

        let command = match self.operation {
            RefOperation::Create { new } => format!("create {}\0{}\0", self.name, new),
            RefOperation::Update { old, new } => {
                format!("update {}\0{}\0{}\0", self.name, new, hex(old))
            }
            RefOperation::Delete { old } => format!("delete {}\0{}\0", self.name, hex(old)),
        };
        out.extend_from_slice(command.as_bytes());
    }
}

impl fmt::Display for RefUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.operation {
            RefOperation::Create { new } => write!(f, "create {} {}", self.name, new.short()),
            RefOperation::Update { new, .. } => write!(f, "update {} {}", self.name, new.short()),
            RefOperation::Delete { .. } => write!(f, "delete {}", self.name),
        }
    }
}

/// Called once per committed batch, after every reference has been locked
/// and verified but before any of them is written.
///
/// Returning an error aborts the batch. Replication layers use this to vote
/// on the update with their peers.
#[async_trait]
pub trait TransactionHook: Send + Sync {
    async fn vote(&self, updates: &[RefUpdate]) -> Result<(), BoxError>;
}

/// Hook that accepts every batch.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHook;

#[async_trait]
impl TransactionHook for NoopHook {
    async fn vote(&self, _updates: &[RefUpdate]) -> Result<(), BoxError> {
        Ok(())
    }
}

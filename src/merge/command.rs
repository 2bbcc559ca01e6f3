//! Merge requests.

use std::path::PathBuf;

use chrono::{DateTime, FixedOffset, Utc};

use crate::merge::error::MergeError;
use crate::storage::Identity;

/// Everything needed to merge `theirs` into `ours`.
///
/// Fields left at their defaults count as missing; see [`MergeCommand::validate`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeCommand {
    /// path of the repository to merge in
    pub repository: PathBuf,
    pub author_name: String,
    pub author_mail: String,
    /// defaults to the time of the merge
    pub author_date: Option<DateTime<FixedOffset>>,
    pub committer_name: String,
    pub committer_mail: String,
    pub committer_date: Option<DateTime<FixedOffset>>,
    pub message: String,
    /// revision merged into; first parent of the result
    pub ours: String,
    pub theirs: String,
    /// record only `ours` as parent, keeping the changes of `theirs`
    pub squash: bool,
}

impl MergeCommand {
    /// Check that every required field is present.
    ///
    /// Checks run in a fixed order and the first missing field is reported.
    /// Committer fields are only required once any of them is set.
    pub fn validate(&self) -> Result<(), MergeError> {
        let required = [
            ("repository", self.repository.as_os_str().is_empty()),
            ("author name", self.author_name.is_empty()),
            ("author mail", self.author_mail.is_empty()),
            ("message", self.message.is_empty()),
            ("ours", self.ours.is_empty()),
            ("theirs", self.theirs.is_empty()),
        ];
        if let Some(&(field, _)) = required.iter().find(|(_, missing)| *missing) {
            return Err(MergeError::InvalidParameters(field));
        }

        if self.has_committer() {
            let committer = [
                ("committer name", self.committer_name.is_empty()),
                ("committer mail", self.committer_mail.is_empty()),
                ("committer date", self.committer_date.is_none()),
            ];
            if let Some(&(field, _)) = committer.iter().find(|(_, missing)| *missing) {
                return Err(MergeError::InvalidParameters(field));
            }
        }

        Ok(())
    }

    fn has_committer(&self) -> bool {
        !self.committer_name.is_empty()
            || !self.committer_mail.is_empty()
            || self.committer_date.is_some()
    }

    pub(crate) fn author(&self) -> Identity {
        let when = self.author_date.unwrap_or_else(|| Utc::now().fixed_offset());
        Identity::new(&self.author_name, &self.author_mail, when)
    }

    /// `None` means the author also commits.
    pub(crate) fn committer(&self) -> Option<Identity> {
        match (self.has_committer(), self.committer_date) {
            (true, Some(when)) => Some(Identity::new(&self.committer_name, &self.committer_mail, when)),
            _ => None,
        }
    }
}

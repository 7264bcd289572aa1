//! Desired ownership and permissions for a converged tree

use serde::Deserialize;
use symclone_fs::{EXECUTE_BITS, EntryMetadata};

use crate::compare::ExpectedMetadata;
use crate::mode::ModeSpec;
use crate::principal::Principal;
use crate::Result;

/// Metadata requested by the caller, before account names are resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct MetadataRequest {
    #[serde(default)]
    pub mode: Option<ModeSpec>,
    #[serde(default)]
    pub owner: Option<Principal>,
    #[serde(default)]
    pub group: Option<Principal>,
}

impl MetadataRequest {
    /// Look up owner and group once so the engine only deals in raw ids.
    pub fn resolve(&self) -> Result<DesiredMetadata> {
        Ok(DesiredMetadata {
            mode: self.mode.clone(),
            uid: self.owner.as_ref().map(Principal::resolve_user).transpose()?,
            gid: self.group.as_ref().map(Principal::resolve_group).transpose()?,
        })
    }
}

/// Mode, owner and group to enforce on every non-symlink entry.
///
/// A `None` field leaves that attribute alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DesiredMetadata {
    pub mode: Option<ModeSpec>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
}

impl DesiredMetadata {
    /// Nothing to enforce.
    pub fn unchanged() -> Self {
        Self::default()
    }

    pub fn with_mode(mut self, mode: ModeSpec) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn with_owner(mut self, uid: u32) -> Self {
        self.uid = Some(uid);
        self
    }

    pub fn with_group(mut self, gid: u32) -> Self {
        self.gid = Some(gid);
        self
    }

    /// Whether any attribute is requested.
    pub fn is_set(&self) -> bool {
        self.mode.is_some() || self.uid.is_some() || self.gid.is_some()
    }

    /// Permission bits an entry with `current` metadata should end up with,
    /// or `None` when no mode is requested. Regular files never receive
    /// execute bits.
    pub fn target_mode(&self, current: &EntryMetadata) -> Option<u32> {
        self.mode.as_ref().map(|mode| {
            let bits = mode.resolve(current.mode, current.is_dir());
            if current.is_file() {
                bits & !EXECUTE_BITS
            } else {
                bits
            }
        })
    }

    /// Metadata an entry with `current` metadata carries once the request is
    /// enforced on it.
    pub fn predict(&self, current: &EntryMetadata) -> ExpectedMetadata {
        ExpectedMetadata {
            kind: current.kind,
            mode: self.target_mode(current).unwrap_or(current.mode),
            uid: self.uid.unwrap_or(current.uid),
            gid: self.gid.unwrap_or(current.gid),
        }
    }
}

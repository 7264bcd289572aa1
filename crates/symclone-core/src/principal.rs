//! Owner and group values as accepted at the boundary
//!
//! Users and groups arrive either as names or as numeric ids. They are kept
//! as a tagged value until [`Principal::resolve_user`] /
//! [`Principal::resolve_group`] turns them into raw ids once, before any
//! filesystem work starts.

use std::fmt;
use std::str::FromStr;

use nix::unistd::{Gid, Group, Uid, User};
use serde::Deserialize;

use crate::{Error, Result};

/// A user or group given by name or by numeric id.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "PrincipalRepr")]
pub enum Principal {
    Named(String),
    Numeric(u32),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PrincipalRepr {
    Numeric(u32),
    Text(String),
}

impl From<PrincipalRepr> for Principal {
    fn from(repr: PrincipalRepr) -> Self {
        match repr {
            PrincipalRepr::Numeric(id) => Self::Numeric(id),
            PrincipalRepr::Text(text) => Self::from(text.as_str()),
        }
    }
}

impl From<&str> for Principal {
    /// All-digit strings are ids, anything else is a name.
    fn from(value: &str) -> Self {
        match value.parse::<u32>() {
            Ok(id) if value.bytes().all(|b| b.is_ascii_digit()) => Self::Numeric(id),
            _ => Self::Named(value.to_string()),
        }
    }
}

impl FromStr for Principal {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self::from(s))
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => write!(f, "{}", name),
            Self::Numeric(id) => write!(f, "{}", id),
        }
    }
}

impl Principal {
    /// Resolve to a uid using the system account database.
    pub fn resolve_user(&self) -> Result<u32> {
        match self {
            Self::Numeric(id) => Ok(*id),
            Self::Named(name) => match User::from_name(name) {
                Ok(Some(user)) => Ok(user.uid.as_raw()),
                Ok(None) => Err(Error::UnknownUser { name: name.clone() }),
                Err(source) => Err(Error::AccountLookup {
                    name: name.clone(),
                    source,
                }),
            },
        }
    }

    /// Resolve to a gid using the system group database.
    pub fn resolve_group(&self) -> Result<u32> {
        match self {
            Self::Numeric(id) => Ok(*id),
            Self::Named(name) => match Group::from_name(name) {
                Ok(Some(group)) => Ok(group.gid.as_raw()),
                Ok(None) => Err(Error::UnknownGroup { name: name.clone() }),
                Err(source) => Err(Error::AccountLookup {
                    name: name.clone(),
                    source,
                }),
            },
        }
    }
}

/// Name of the account owning `uid`, if it has one.
pub fn user_name(uid: u32) -> Option<String> {
    User::from_uid(Uid::from_raw(uid))
        .ok()
        .flatten()
        .map(|user| user.name)
}

/// Name of the group with `gid`, if it has one.
pub fn group_name(gid: u32) -> Option<String> {
    Group::from_gid(Gid::from_raw(gid))
        .ok()
        .flatten()
        .map(|group| group.name)
}

//! Profiles and role resolution.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::backend::Backend;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Admin,
    Regular,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "Admin",
            Role::Regular => "Regular",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "regular" => Ok(Role::Regular),
            other => Err(Error::InvalidArgument(format!(
                "invalid role '{other}': expected Admin or Regular"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    #[serde(default)]
    pub first_name: Option<String>,
    pub role: Role,
    #[serde(default)]
    pub department: Option<String>,
}

impl Profile {
    /// Name used in greetings and report rows.
    pub fn display_name(&self) -> &str {
        self.first_name.as_deref().unwrap_or("User")
    }
}

/// Looks up the profile for an identity. No caching: each call is one lookup.
#[derive(Clone)]
pub struct ProfileResolver {
    backend: Arc<dyn Backend>,
}

impl ProfileResolver {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    pub async fn resolve_profile(&self, user_id: Uuid) -> Result<Profile> {
        match self.backend.select_profile(user_id).await {
            Ok(Some(profile)) => {
                debug!(user = %user_id, role = %profile.role, "profile resolved");
                Ok(profile)
            }
            Ok(None) => Err(Error::not_found("profile", user_id)),
            Err(err) => {
                warn!(user = %user_id, error = %err, "profile lookup failed");
                Err(match err {
                    Error::NotFound { .. } => err,
                    other => Error::RemoteFailure(other.to_string()),
                })
            }
        }
    }
}

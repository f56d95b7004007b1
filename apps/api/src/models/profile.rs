use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::UnknownVariant;
use crate::identity::Principal;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProfileStatus {
    #[default]
    #[serde(rename = "Active Contributor")]
    ActiveContributor,
    #[serde(rename = "Open to Work")]
    OpenToWork,
    #[serde(rename = "On Sabbatical")]
    OnSabbatical,
}

impl ProfileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProfileStatus::ActiveContributor => "Active Contributor",
            ProfileStatus::OpenToWork => "Open to Work",
            ProfileStatus::OnSabbatical => "On Sabbatical",
        }
    }
}

impl FromStr for ProfileStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Active Contributor" => Ok(ProfileStatus::ActiveContributor),
            "Open to Work" => Ok(ProfileStatus::OpenToWork),
            "On Sabbatical" => Ok(ProfileStatus::OnSabbatical),
            other => Err(UnknownVariant::new("profile status", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserProfile {
    pub display_name: String,
    pub email: String,
    pub role: String,
    pub bio: String,
    pub status: ProfileStatus,
    #[serde(rename = "photoURL", skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for UserProfile {
    fn default() -> Self {
        Self {
            display_name: String::new(),
            email: String::new(),
            role: "Professional".to_string(),
            bio: "Building impactful solutions.".to_string(),
            status: ProfileStatus::ActiveContributor,
            photo_url: None,
            updated_at: None,
        }
    }
}

impl UserProfile {
    /// Profile shown before the user ever saved one.
    pub fn initial_for(principal: &Principal) -> Self {
        Self {
            display_name: principal.display_name.clone().unwrap_or_default(),
            email: principal.email.clone().unwrap_or_default(),
            ..Self::default()
        }
    }

    /// Merges `patch`; the email always tracks the principal.
    pub fn apply(&mut self, patch: &ProfilePatch, principal: &Principal, now: DateTime<Utc>) {
        if let Some(name) = &patch.display_name {
            self.display_name = name.clone();
        }
        if let Some(role) = &patch.role {
            self.role = role.clone();
        }
        if let Some(bio) = &patch.bio {
            self.bio = bio.clone();
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(photo) = &patch.photo_url {
            self.photo_url = Some(photo.clone());
        }
        self.email = principal.email.clone().unwrap_or_default();
        self.updated_at = Some(now);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfilePatch {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub status: Option<ProfileStatus>,
    #[serde(default, rename = "photoURL")]
    pub photo_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct ProfileRow {
    pub owner_id: String,
    pub display_name: String,
    pub email: String,
    pub role: String,
    pub bio: String,
    pub status: String,
    pub photo_url: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl ProfileRow {
    pub fn from_profile(owner_id: &str, profile: &UserProfile) -> Self {
        Self {
            owner_id: owner_id.to_string(),
            display_name: profile.display_name.clone(),
            email: profile.email.clone(),
            role: profile.role.clone(),
            bio: profile.bio.clone(),
            status: profile.status.as_str().to_string(),
            photo_url: profile.photo_url.clone(),
            updated_at: profile.updated_at,
        }
    }
}

impl From<ProfileRow> for UserProfile {
    fn from(row: ProfileRow) -> Self {
        let status = row.status.parse().unwrap_or_else(|e: UnknownVariant| {
            tracing::warn!("{e}; falling back to default status");
            ProfileStatus::default()
        });
        Self {
            display_name: row.display_name,
            email: row.email,
            role: row.role,
            bio: row.bio,
            status,
            photo_url: row.photo_url,
            updated_at: row.updated_at,
        }
    }
}

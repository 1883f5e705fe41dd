//! Group (stokvel) read model.

use std::collections::BTreeSet;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A settings string that names no known variant.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{value:?} is not a valid {kind}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

/// How often members contribute or receive a payout.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Frequency {
    Monthly,
    #[serde(rename = "Bi-weekly")]
    BiWeekly,
    Weekly,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Monthly => "Monthly",
            Frequency::BiWeekly => "Bi-weekly",
            Frequency::Weekly => "Weekly",
        }
    }

}

impl FromStr for Frequency {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Monthly" => Ok(Frequency::Monthly),
            "Bi-weekly" => Ok(Frequency::BiWeekly),
            "Weekly" => Ok(Frequency::Weekly),
            _ => Err(UnknownVariant {
                kind: "frequency",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Visibility {
    Public,
    Private,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "Public",
            Visibility::Private => "Private",
        }
    }

}

impl FromStr for Visibility {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Public" => Ok(Visibility::Public),
            "Private" => Ok(Visibility::Private),
            _ => Err(UnknownVariant {
                kind: "visibility",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestState {
    Waiting,
    Accepted,
    Rejected,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    pub request_id: String,
    pub user_id: String,
    pub username: Option<String>,
    pub state: RequestState,
    pub requested_at: DateTime<Utc>,
}

/// Current state of a group, derived entirely from its events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub group_id: String,
    pub admin_id: Option<String>,
    pub name: Option<String>,
    pub min_contribution: Option<f64>,
    pub balance: Option<f64>,
    #[serde(default)]
    pub max_members: u32,
    pub description: Option<String>,
    pub profile_image: Option<String>,
    pub visibility: Option<String>,
    pub contribution_frequency: Option<String>,
    pub contribution_date: Option<DateTime<Utc>>,
    pub payout_frequency: Option<String>,
    pub payout_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub member_ids: BTreeSet<String>,
    #[serde(default)]
    pub requests: Vec<JoinRequest>,
    pub created_at: Option<DateTime<Utc>>,
}

impl Group {
    pub fn is_member(&self, user_id: &str) -> bool {
        self.member_ids.contains(user_id)
    }

    /// Member or the group's admin.
    pub fn involves(&self, user_id: &str) -> bool {
        self.is_member(user_id) || self.admin_id.as_deref() == Some(user_id)
    }

    pub fn is_full(&self) -> bool {
        self.member_ids.len() >= self.max_members as usize
    }

    pub fn is_public(&self) -> bool {
        self.visibility.as_deref() == Some(Visibility::Public.as_str())
    }

    /// Add a member. Capacity grows to fit if the set outgrows `max_members`.
    pub fn add_member(&mut self, user_id: &str) {
        self.member_ids.insert(user_id.to_string());
        let count = u32::try_from(self.member_ids.len()).unwrap_or(u32::MAX);
        self.max_members = self.max_members.max(count);
    }

    pub fn waiting_request(&self, request_id: &str) -> Option<&JoinRequest> {
        self.requests
            .iter()
            .find(|r| r.request_id == request_id && r.state == RequestState::Waiting)
    }

    pub fn has_waiting_request_from(&self, user_id: &str) -> bool {
        self.requests
            .iter()
            .any(|r| r.user_id == user_id && r.state == RequestState::Waiting)
    }

    pub(crate) fn set_request_state(&mut self, request_id: Option<&str>, user_id: &str, state: RequestState) {
        let target = self.requests.iter_mut().find(|r| {
            r.state == RequestState::Waiting
                && match request_id {
                    Some(id) => r.request_id == id,
                    None => r.user_id == user_id,
                }
        });
        if let Some(request) = target {
            request.state = state;
        }
    }
}

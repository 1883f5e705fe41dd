//! Domain events and the append-only event log.
//!
//! Events are persisted schema-less (`event_type` + JSON `data`) and decoded
//! into [`DomainEvent`] when folded. Types this build does not know decode to
//! [`DomainEvent::Unknown`] so older projectors keep working against newer logs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

mod log;
pub mod memory;
pub mod sqlite;

pub use log::{EventLog, IdFields};
pub use memory::MemoryEventLog;
pub use sqlite::SqliteEventLog;

pub const GROUP_CREATED: &str = "GroupCreated";
pub const GROUP_UPDATED: &str = "GroupUpdated";
pub const MEMBER_ADDED: &str = "MemberAdded";
/// Older group-service builds emitted this name for a member join.
pub const USER_JOINED_GROUP: &str = "UserJoinedGroup";
pub const JOIN_REQUEST_CREATED: &str = "JoinRequestCreated";
pub const JOIN_REQUEST_ACCEPTED: &str = "JoinRequestAccepted";
pub const JOIN_REQUEST_REJECTED: &str = "JoinRequestRejected";
pub const USER_REGISTERED: &str = "UserRegistered";
pub const USER_UPDATED: &str = "UserUpdated";

/// A persisted event. Immutable once appended.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Store-assigned, strictly increasing. Breaks timestamp ties.
    pub sequence: i64,
    pub event_type: String,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn decode(&self) -> Result<DomainEvent, serde_json::Error> {
        DomainEvent::decode(&self.event_type, &self.data)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberEntry {
    pub user_id: String,
    pub role: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupCreated {
    pub group_id: String,
    pub admin_id: Option<String>,
    pub name: Option<String>,
    #[serde(alias = "contributionAmount")]
    pub min_contribution: Option<f64>,
    pub balance: Option<f64>,
    #[serde(alias = "numberOfMembers")]
    pub max_members: Option<u32>,
    pub description: Option<String>,
    pub profile_image: Option<String>,
    pub visibility: Option<String>,
    #[serde(alias = "contributionType")]
    pub contribution_frequency: Option<String>,
    pub contribution_date: Option<String>,
    pub payout_frequency: Option<String>,
    pub payout_date: Option<String>,
    #[serde(default)]
    pub member_ids: Vec<String>,
    /// Richer member list written by some producers; merged with `member_ids`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<MemberEntry>,
}

/// Partial update; only present fields change.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupUpdated {
    pub group_id: String,
    pub name: Option<String>,
    pub max_members: Option<u32>,
    pub description: Option<String>,
    pub profile_image: Option<String>,
    pub visibility: Option<String>,
    pub contribution_frequency: Option<String>,
    pub contribution_date: Option<String>,
    pub payout_frequency: Option<String>,
    pub payout_date: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberAdded {
    pub group_id: String,
    pub user_id: String,
    pub username: Option<String>,
    pub role: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequestCreated {
    pub group_id: String,
    pub user_id: String,
    pub request_id: String,
    pub username: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequestAccepted {
    pub group_id: String,
    pub request_id: String,
    pub user_id: String,
    pub processed_by: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequestRejected {
    pub group_id: String,
    pub user_id: String,
    pub request_id: Option<String>,
    #[serde(alias = "rejectedBy")]
    pub processed_by: Option<String>,
    pub reason: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRegistered {
    pub user_id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    #[serde(alias = "idNumber")]
    pub sa_id: Option<String>,
    #[serde(alias = "contactNumber", alias = "phoneNumber")]
    pub mobile_number: Option<String>,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email_verified: Option<bool>,
}

/// Partial profile update from the identity-provider sync.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserUpdated {
    pub user_id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    #[serde(alias = "idNumber")]
    pub sa_id: Option<String>,
    #[serde(alias = "contactNumber", alias = "phoneNumber")]
    pub mobile_number: Option<String>,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email_verified: Option<bool>,
}

/// Typed view of an event payload.
#[derive(Clone, Debug, PartialEq)]
pub enum DomainEvent {
    GroupCreated(GroupCreated),
    GroupUpdated(GroupUpdated),
    MemberAdded(MemberAdded),
    JoinRequestCreated(JoinRequestCreated),
    JoinRequestAccepted(JoinRequestAccepted),
    JoinRequestRejected(JoinRequestRejected),
    UserRegistered(UserRegistered),
    UserUpdated(UserUpdated),
    Unknown { event_type: String },
}

impl DomainEvent {
    /// Decode a stored payload. Fails only when a known type carries a payload
    /// that does not fit its shape.
    pub fn decode(event_type: &str, data: &Value) -> Result<Self, serde_json::Error> {
        let event = match event_type {
            GROUP_CREATED => DomainEvent::GroupCreated(GroupCreated::deserialize(data)?),
            GROUP_UPDATED => DomainEvent::GroupUpdated(GroupUpdated::deserialize(data)?),
            MEMBER_ADDED | USER_JOINED_GROUP => {
                DomainEvent::MemberAdded(MemberAdded::deserialize(data)?)
            }
            JOIN_REQUEST_CREATED => {
                DomainEvent::JoinRequestCreated(JoinRequestCreated::deserialize(data)?)
            }
            JOIN_REQUEST_ACCEPTED => {
                DomainEvent::JoinRequestAccepted(JoinRequestAccepted::deserialize(data)?)
            }
            JOIN_REQUEST_REJECTED => {
                DomainEvent::JoinRequestRejected(JoinRequestRejected::deserialize(data)?)
            }
            USER_REGISTERED => DomainEvent::UserRegistered(UserRegistered::deserialize(data)?),
            USER_UPDATED => DomainEvent::UserUpdated(UserUpdated::deserialize(data)?),
            other => DomainEvent::Unknown {
                event_type: other.to_string(),
            },
        };
        Ok(event)
    }

    pub fn event_type(&self) -> &str {
        match self {
            DomainEvent::GroupCreated(_) => GROUP_CREATED,
            DomainEvent::GroupUpdated(_) => GROUP_UPDATED,
            DomainEvent::MemberAdded(_) => MEMBER_ADDED,
            DomainEvent::JoinRequestCreated(_) => JOIN_REQUEST_CREATED,
            DomainEvent::JoinRequestAccepted(_) => JOIN_REQUEST_ACCEPTED,
            DomainEvent::JoinRequestRejected(_) => JOIN_REQUEST_REJECTED,
            DomainEvent::UserRegistered(_) => USER_REGISTERED,
            DomainEvent::UserUpdated(_) => USER_UPDATED,
            DomainEvent::Unknown { event_type } => event_type,
        }
    }

    /// Id of the aggregate this event belongs to: `groupId` for group events,
    /// `userId` for user events.
    pub fn aggregate_id(&self) -> Option<&str> {
        match self {
            DomainEvent::GroupCreated(e) => Some(&e.group_id),
            DomainEvent::GroupUpdated(e) => Some(&e.group_id),
            DomainEvent::MemberAdded(e) => Some(&e.group_id),
            DomainEvent::JoinRequestCreated(e) => Some(&e.group_id),
            DomainEvent::JoinRequestAccepted(e) => Some(&e.group_id),
            DomainEvent::JoinRequestRejected(e) => Some(&e.group_id),
            DomainEvent::UserRegistered(e) => Some(&e.user_id),
            DomainEvent::UserUpdated(e) => Some(&e.user_id),
            DomainEvent::Unknown { .. } => None,
        }
    }

    /// Payload as written to the log.
    pub fn to_data(&self) -> Result<Value, serde_json::Error> {
        match self {
            DomainEvent::GroupCreated(e) => serde_json::to_value(e),
            DomainEvent::GroupUpdated(e) => serde_json::to_value(e),
            DomainEvent::MemberAdded(e) => serde_json::to_value(e),
            DomainEvent::JoinRequestCreated(e) => serde_json::to_value(e),
            DomainEvent::JoinRequestAccepted(e) => serde_json::to_value(e),
            DomainEvent::JoinRequestRejected(e) => serde_json::to_value(e),
            DomainEvent::UserRegistered(e) => serde_json::to_value(e),
            DomainEvent::UserUpdated(e) => serde_json::to_value(e),
            DomainEvent::Unknown { .. } => Ok(Value::Object(Default::default())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_group_created_with_defaults() {
        let event = DomainEvent::decode(
            GROUP_CREATED,
            &json!({"groupId": "g1", "adminId": "a1", "maxMembers": 5}),
        )
        .unwrap();
        let DomainEvent::GroupCreated(created) = event else {
            panic!("expected GroupCreated");
        };
        assert_eq!(created.group_id, "g1");
        assert_eq!(created.max_members, Some(5));
        assert!(created.member_ids.is_empty());
        assert_eq!(created.profile_image, None);
    }

    #[test]
    fn accepts_legacy_field_names() {
        let event = DomainEvent::decode(
            GROUP_CREATED,
            &json!({
                "groupId": "g1",
                "contributionAmount": 250.0,
                "numberOfMembers": 8,
                "contributionType": "monthly"
            }),
        )
        .unwrap();
        let DomainEvent::GroupCreated(created) = event else {
            panic!("expected GroupCreated");
        };
        assert_eq!(created.min_contribution, Some(250.0));
        assert_eq!(created.max_members, Some(8));
        assert_eq!(created.contribution_frequency.as_deref(), Some("monthly"));

        let joined = DomainEvent::decode(USER_JOINED_GROUP, &json!({"groupId": "g1", "userId": "u1"})).unwrap();
        assert_eq!(joined.event_type(), MEMBER_ADDED);

        let user = DomainEvent::decode(
            USER_REGISTERED,
            &json!({"userId": "u1", "idNumber": "9001015009087", "contactNumber": "0821234567"}),
        )
        .unwrap();
        let DomainEvent::UserRegistered(registered) = user else {
            panic!("expected UserRegistered");
        };
        assert_eq!(registered.sa_id.as_deref(), Some("9001015009087"));
        assert_eq!(registered.mobile_number.as_deref(), Some("0821234567"));
    }

    #[test]
    fn unknown_types_decode_without_error() {
        let event = DomainEvent::decode("SomethingUnrecognized", &json!({"whatever": [1, 2]})).unwrap();
        assert_eq!(
            event,
            DomainEvent::Unknown {
                event_type: "SomethingUnrecognized".to_string()
            }
        );
        assert_eq!(event.aggregate_id(), None);
    }

    #[test]
    fn malformed_known_payload_is_an_error() {
        assert!(DomainEvent::decode(MEMBER_ADDED, &json!({"groupId": "g1"})).is_err());
    }

    #[test]
    fn aggregate_id_follows_event_kind() {
        let added = DomainEvent::MemberAdded(MemberAdded {
            group_id: "g1".to_string(),
            user_id: "u1".to_string(),
            username: None,
            role: None,
        });
        assert_eq!(added.aggregate_id(), Some("g1"));

        let updated = DomainEvent::UserUpdated(UserUpdated {
            user_id: "u1".to_string(),
            ..Default::default()
        });
        assert_eq!(updated.aggregate_id(), Some("u1"));
    }

    #[test]
    fn payload_keeps_camel_case_keys() {
        let data = DomainEvent::MemberAdded(MemberAdded {
            group_id: "g1".to_string(),
            user_id: "u2".to_string(),
            username: None,
            role: Some("member".to_string()),
        })
        .to_data()
        .unwrap();
        assert_eq!(data["groupId"], "g1");
        assert_eq!(data["userId"], "u2");
    }
}

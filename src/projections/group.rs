use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use super::{GroupReadModel, Projection, SnapshotStore};
use crate::error::StoreError;
use crate::events::{
    DomainEvent, EventLog, GroupCreated, GroupUpdated, IdFields, JOIN_REQUEST_REJECTED,
};
use crate::models::{Group, JoinRequest, RequestState};
use crate::utils::date;

pub struct GroupProjection;

impl Projection for GroupProjection {
    const KIND: &'static str = "group";

    type Snapshot = Group;

    fn id_fields() -> IdFields {
        IdFields::group()
    }

    fn apply(state: Option<Group>, event: &DomainEvent, timestamp: DateTime<Utc>) -> Option<Group> {
        match event {
            DomainEvent::GroupCreated(created) => Some(group_from_created(created, timestamp)),
            DomainEvent::GroupUpdated(updated) => {
                incremental(state, event, |group| apply_update(group, updated))
            }
            DomainEvent::MemberAdded(added) => {
                incremental(state, event, |group| group.add_member(&added.user_id))
            }
            DomainEvent::JoinRequestCreated(request) => incremental(state, event, |group| {
                if !group.requests.iter().any(|r| r.request_id == request.request_id) {
                    group.requests.push(JoinRequest {
                        request_id: request.request_id.clone(),
                        user_id: request.user_id.clone(),
                        username: request.username.clone(),
                        state: RequestState::Waiting,
                        requested_at: timestamp,
                    });
                }
            }),
            DomainEvent::JoinRequestAccepted(accepted) => incremental(state, event, |group| {
                group.set_request_state(
                    Some(&accepted.request_id),
                    &accepted.user_id,
                    RequestState::Accepted,
                );
                group.add_member(&accepted.user_id);
            }),
            DomainEvent::JoinRequestRejected(rejected) => incremental(state, event, |group| {
                group.set_request_state(
                    rejected.request_id.as_deref(),
                    &rejected.user_id,
                    RequestState::Rejected,
                );
            }),
            DomainEvent::UserRegistered(_)
            | DomainEvent::UserUpdated(_)
            | DomainEvent::Unknown { .. } => state,
        }
    }
}

fn incremental(
    state: Option<Group>,
    event: &DomainEvent,
    apply: impl FnOnce(&mut Group),
) -> Option<Group> {
    match state {
        Some(mut group) => {
            apply(&mut group);
            Some(group)
        }
        None => {
            tracing::warn!(
                event_type = event.event_type(),
                group_id = ?event.aggregate_id(),
                "Event precedes GroupCreated, skipping"
            );
            None
        }
    }
}

fn group_from_created(created: &GroupCreated, timestamp: DateTime<Utc>) -> Group {
    let member_ids: BTreeSet<String> = created
        .member_ids
        .iter()
        .cloned()
        .chain(created.members.iter().map(|m| m.user_id.clone()))
        .collect();

    Group {
        group_id: created.group_id.clone(),
        admin_id: created.admin_id.clone(),
        name: created.name.clone(),
        min_contribution: created.min_contribution,
        balance: created.balance,
        max_members: created.max_members.unwrap_or(0),
        description: created.description.clone(),
        profile_image: created.profile_image.clone(),
        visibility: created.visibility.clone(),
        contribution_frequency: created.contribution_frequency.clone(),
        contribution_date: date::parse_lenient(created.contribution_date.as_deref()),
        payout_frequency: created.payout_frequency.clone(),
        payout_date: date::parse_lenient(created.payout_date.as_deref()),
        member_ids,
        requests: vec![],
        created_at: Some(timestamp),
    }
}

fn apply_update(group: &mut Group, updated: &GroupUpdated) {
    if let Some(name) = &updated.name {
        group.name = Some(name.clone());
    }
    if let Some(max_members) = updated.max_members {
        let count = u32::try_from(group.member_ids.len()).unwrap_or(u32::MAX);
        group.max_members = max_members.max(count);
    }
    if let Some(description) = &updated.description {
        group.description = Some(description.clone());
    }
    if let Some(profile_image) = &updated.profile_image {
        group.profile_image = Some(profile_image.clone());
    }
    if let Some(visibility) = &updated.visibility {
        group.visibility = Some(visibility.clone());
    }
    if let Some(frequency) = &updated.contribution_frequency {
        group.contribution_frequency = Some(frequency.clone());
    }
    if updated.contribution_date.is_some() {
        group.contribution_date = date::parse_lenient(updated.contribution_date.as_deref());
    }
    if let Some(frequency) = &updated.payout_frequency {
        group.payout_frequency = Some(frequency.clone());
    }
    if updated.payout_date.is_some() {
        group.payout_date = date::parse_lenient(updated.payout_date.as_deref());
    }
}

impl<L, S> GroupReadModel<L, S>
where
    L: EventLog,
    S: SnapshotStore,
{
    /// Groups `user_id` belongs to, either as a member or as the admin.
    pub async fn get_by_member_or_owner(&self, user_id: &str) -> Result<Vec<Group>, StoreError> {
        let groups = self.get_all().await?;
        Ok(groups.into_iter().filter(|g| g.involves(user_id)).collect())
    }
}

/// How many times `user_id` has been turned down by `group_id`.
pub async fn rejection_count<L: EventLog>(
    events: &L,
    group_id: &str,
    user_id: &str,
) -> Result<usize, StoreError> {
    let rejections = events
        .get_events_by_type(&IdFields::group(), group_id, JOIN_REQUEST_REJECTED)
        .await?;
    Ok(rejections
        .iter()
        .filter(|e| e.data.get("userId").and_then(|v| v.as_str()) == Some(user_id))
        .count())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Event, GROUP_CREATED, MEMBER_ADDED};
    use crate::projections::fold;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};

    fn event(sequence: i64, ts_ms: i64, event_type: &str, data: Value) -> Event {
        Event {
            sequence,
            event_type: event_type.to_string(),
            data,
            timestamp: date::from_millis(ts_ms),
        }
    }

    fn members(group: &Group) -> Vec<&str> {
        group.member_ids.iter().map(String::as_str).collect()
    }

    #[test]
    fn empty_history_folds_to_nothing() {
        assert_eq!(fold::<GroupProjection>(&[]), None);
    }

    #[test]
    fn later_creation_replaces_state_wholesale() {
        let events = vec![
            event(1, 1_000, GROUP_CREATED, json!({"groupId": "g1", "name": "first", "description": "kept?"})),
            event(2, 2_000, GROUP_CREATED, json!({"groupId": "g1", "name": "second"})),
        ];
        let group = fold::<GroupProjection>(&events).unwrap();
        assert_eq!(group.name.as_deref(), Some("second"));
        assert_eq!(group.description, None);
    }

    #[test]
    fn creation_defaults_optional_fields() {
        let events = vec![event(1, 1_000, GROUP_CREATED, json!({"groupId": "g1", "maxMembers": 4}))];
        let group = fold::<GroupProjection>(&events).unwrap();
        assert_eq!(group.profile_image, None);
        assert_eq!(group.contribution_date, None);
        assert_eq!(group.payout_date, None);
        assert!(group.member_ids.is_empty());
        assert_eq!(group.created_at, Some(date::from_millis(1_000)));
    }

    #[test]
    fn duplicate_member_added_is_deduplicated() {
        let events = vec![
            event(1, 1_000, GROUP_CREATED, json!({"groupId": "g1", "maxMembers": 5, "memberIds": []})),
            event(2, 2_000, MEMBER_ADDED, json!({"groupId": "g1", "userId": "u1"})),
            event(3, 3_000, MEMBER_ADDED, json!({"groupId": "g1", "userId": "u1"})),
        ];
        let group = fold::<GroupProjection>(&events).unwrap();
        assert_eq!(members(&group), vec!["u1"]);
    }

    #[test]
    fn capacity_expands_to_fit_members() {
        let events = vec![
            event(1, 1_000, GROUP_CREATED, json!({"groupId": "g1", "maxMembers": 2})),
            event(2, 2_000, MEMBER_ADDED, json!({"groupId": "g1", "userId": "u1"})),
            event(3, 3_000, MEMBER_ADDED, json!({"groupId": "g1", "userId": "u2"})),
            event(4, 4_000, MEMBER_ADDED, json!({"groupId": "g1", "userId": "u3"})),
        ];
        let group = fold::<GroupProjection>(&events).unwrap();
        assert!(group.max_members >= 3);
        assert_eq!(group.member_ids.len(), 3);
    }

    #[test]
    fn member_added_before_creation_is_skipped() {
        let events = vec![
            event(1, 1_000, MEMBER_ADDED, json!({"groupId": "g1", "userId": "early"})),
            event(2, 2_000, GROUP_CREATED, json!({"groupId": "g1", "maxMembers": 3, "memberIds": ["u1"]})),
        ];
        let group = fold::<GroupProjection>(&events).unwrap();
        assert_eq!(members(&group), vec!["u1"]);

        let only_incremental = vec![event(1, 1_000, MEMBER_ADDED, json!({"groupId": "g1", "userId": "u1"}))];
        assert_eq!(fold::<GroupProjection>(&only_incremental), None);
    }

    #[test]
    fn unknown_and_undecodable_events_are_no_ops() {
        let base = vec![
            event(1, 1_000, GROUP_CREATED, json!({"groupId": "g1", "maxMembers": 3, "memberIds": ["u1"]})),
            event(2, 2_000, MEMBER_ADDED, json!({"groupId": "g1", "userId": "u2"})),
        ];
        let mut noisy = base.clone();
        noisy.push(event(3, 3_000, "SomethingUnrecognized", json!({"groupId": "g1", "x": 1})));
        noisy.push(event(4, 4_000, MEMBER_ADDED, json!({"groupId": "g1"})));

        assert_eq!(fold::<GroupProjection>(&noisy), fold::<GroupProjection>(&base));
    }

    #[test]
    fn equal_timestamps_fall_back_to_insertion_order() {
        let created_a = event(1, 1_000, GROUP_CREATED, json!({"groupId": "g1", "name": "a"}));
        let created_b = event(2, 1_000, GROUP_CREATED, json!({"groupId": "g1", "name": "b"}));

        let in_order = fold::<GroupProjection>(&[created_a.clone(), created_b.clone()]).unwrap();
        let shuffled = fold::<GroupProjection>(&[created_b, created_a]).unwrap();
        assert_eq!(in_order, shuffled);
        assert_eq!(in_order.name.as_deref(), Some("b"));
    }

    #[test]
    fn reordering_across_timestamps_may_change_result() {
        let first = fold::<GroupProjection>(&[
            event(1, 1_000, GROUP_CREATED, json!({"groupId": "g1", "name": "a"})),
            event(2, 2_000, GROUP_CREATED, json!({"groupId": "g1", "name": "b"})),
        ])
        .unwrap();
        let swapped = fold::<GroupProjection>(&[
            event(1, 2_000, GROUP_CREATED, json!({"groupId": "g1", "name": "a"})),
            event(2, 1_000, GROUP_CREATED, json!({"groupId": "g1", "name": "b"})),
        ])
        .unwrap();
        assert_ne!(first.name, swapped.name);
    }

    #[test]
    fn join_request_lifecycle() {
        let events = vec![
            event(1, 1_000, GROUP_CREATED, json!({"groupId": "g1", "adminId": "a", "maxMembers": 3, "memberIds": ["a"], "visibility": "Public"})),
            event(2, 2_000, "JoinRequestCreated", json!({"groupId": "g1", "userId": "u1", "requestId": "r1"})),
            event(3, 3_000, "JoinRequestCreated", json!({"groupId": "g1", "userId": "u2", "requestId": "r2"})),
            event(4, 4_000, "JoinRequestAccepted", json!({"groupId": "g1", "userId": "u1", "requestId": "r1", "processedBy": "a"})),
            event(5, 5_000, "JoinRequestRejected", json!({"groupId": "g1", "userId": "u2", "requestId": "r2"})),
        ];
        let group = fold::<GroupProjection>(&events).unwrap();
        assert_eq!(members(&group), vec!["a", "u1"]);
        let states: Vec<RequestState> = group.requests.iter().map(|r| r.state).collect();
        assert_eq!(states, vec![RequestState::Accepted, RequestState::Rejected]);
        assert!(group.waiting_request("r1").is_none());
    }

    #[test]
    fn group_updated_patches_present_fields() {
        let events = vec![
            event(1, 1_000, GROUP_CREATED, json!({"groupId": "g1", "name": "old", "description": "d", "maxMembers": 2, "memberIds": ["a", "b"]})),
            event(2, 2_000, "GroupUpdated", json!({"groupId": "g1", "name": "new", "maxMembers": 1, "payoutDate": "2024-07-01"})),
        ];
        let group = fold::<GroupProjection>(&events).unwrap();
        assert_eq!(group.name.as_deref(), Some("new"));
        assert_eq!(group.description.as_deref(), Some("d"));
        assert_eq!(group.max_members, 2);
        assert!(group.payout_date.is_some());
    }

    #[test]
    fn legacy_member_list_is_merged() {
        let events = vec![event(
            1,
            1_000,
            GROUP_CREATED,
            json!({
                "groupId": "g1",
                "memberIds": ["a"],
                "members": [{"userId": "b", "role": "member"}, {"userId": "a", "role": "founder"}]
            }),
        )];
        let group = fold::<GroupProjection>(&events).unwrap();
        assert_eq!(members(&group), vec!["a", "b"]);
    }
}

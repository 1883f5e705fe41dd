use std::collections::BTreeSet;

use serde::Deserialize;

use super::{check_frequency, check_visibility, require_text};
use crate::error::CommandError;
use crate::events::{
    DomainEvent, Event, EventLog, GroupCreated, GroupUpdated, JoinRequestAccepted,
    JoinRequestCreated, JoinRequestRejected, MemberAdded,
};
use crate::models::ids::{new_id, require_id};
use crate::models::Group;
use crate::projections::{GroupReadModel, SnapshotStore};
use crate::utils::date;

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGroupRequest {
    /// Generated when absent.
    pub group_id: Option<String>,
    pub admin_id: String,
    pub name: String,
    pub min_contribution: f64,
    pub max_members: u32,
    pub description: Option<String>,
    pub profile_image: Option<String>,
    pub visibility: String,
    pub contribution_frequency: String,
    pub contribution_date: Option<String>,
    pub payout_frequency: String,
    pub payout_date: Option<String>,
    /// Founding members besides the admin.
    #[serde(default)]
    pub member_ids: Vec<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateGroupRequest {
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

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinAction {
    Accept,
    Reject,
}

impl JoinAction {
    pub fn parse(value: &str) -> Result<Self, CommandError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "accept" => Ok(JoinAction::Accept),
            "reject" => Ok(JoinAction::Reject),
            other => Err(CommandError::validation(format!(
                "action must be accept or reject (got {:?})",
                other
            ))),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessJoinRequest {
    pub group_id: String,
    pub request_id: String,
    pub action: JoinAction,
    /// User processing the request; must be the group admin.
    pub admin_id: String,
    pub reason: Option<String>,
}

/// Group command handlers over an event log and the group read model.
pub struct GroupCommands<L, S> {
    events: L,
    groups: GroupReadModel<L, S>,
}

impl<L, S> GroupCommands<L, S>
where
    L: EventLog + Clone,
    S: SnapshotStore,
{
    pub fn new(events: L, store: S) -> Self {
        Self {
            groups: GroupReadModel::new(events.clone(), store),
            events,
        }
    }

    pub fn read_model(&self) -> &GroupReadModel<L, S> {
        &self.groups
    }

    async fn load(&self, group_id: &str) -> Result<Group, CommandError> {
        self.groups
            .get_by_aggregate_id(group_id)
            .await?
            .ok_or_else(|| CommandError::NotFound {
                kind: "group",
                id: group_id.to_string(),
            })
    }

    async fn record(&self, group_id: &str, event: DomainEvent) -> Result<Event, CommandError> {
        let appended = self.events.append(&event).await?;
        self.groups.rebuild_state(group_id).await?;
        Ok(appended)
    }

    pub async fn create_group(&self, req: CreateGroupRequest) -> Result<Event, CommandError> {
        let group_id = req.group_id.clone().unwrap_or_else(new_id);
        require_id(&group_id, "groupId").map_err(CommandError::Validation)?;
        require_id(&req.admin_id, "adminId").map_err(CommandError::Validation)?;
        require_text(&req.name, "name")?;
        check_frequency(&req.contribution_frequency, "contributionFrequency")?;
        check_frequency(&req.payout_frequency, "payoutFrequency")?;
        check_visibility(&req.visibility)?;
        check_date(req.contribution_date.as_deref(), "contributionDate")?;
        check_date(req.payout_date.as_deref(), "payoutDate")?;

        if req.min_contribution.is_nan() || req.min_contribution <= 0.0 {
            return Err(CommandError::validation("minContribution must be greater than 0"));
        }
        if req.max_members == 0 {
            return Err(CommandError::validation("maxMembers must be greater than 0"));
        }
        if req.member_ids.len() >= req.max_members as usize {
            return Err(CommandError::validation(
                "initial members must be fewer than maxMembers",
            ));
        }
        if self.groups.get_by_aggregate_id(&group_id).await?.is_some() {
            return Err(CommandError::conflict(format!("group {} already exists", group_id)));
        }

        let mut member_ids: BTreeSet<String> = req
            .member_ids
            .iter()
            .filter(|id| !id.trim().is_empty())
            .cloned()
            .collect();
        member_ids.insert(req.admin_id.clone());

        let event = DomainEvent::GroupCreated(GroupCreated {
            group_id: group_id.clone(),
            admin_id: Some(req.admin_id.clone()),
            name: Some(req.name.trim().to_string()),
            min_contribution: Some(req.min_contribution),
            balance: Some(req.min_contribution),
            max_members: Some(req.max_members),
            description: req.description,
            profile_image: req.profile_image,
            visibility: Some(req.visibility),
            contribution_frequency: Some(req.contribution_frequency),
            contribution_date: req.contribution_date,
            payout_frequency: Some(req.payout_frequency),
            payout_date: req.payout_date,
            member_ids: member_ids.into_iter().collect(),
            members: vec![],
        });

        let appended = self.record(&group_id, event).await?;
        tracing::info!(group_id = %group_id, admin_id = %req.admin_id, "Group created");
        Ok(appended)
    }

    pub async fn join_group(
        &self,
        group_id: &str,
        user_id: &str,
        username: Option<String>,
    ) -> Result<Event, CommandError> {
        require_id(user_id, "userId").map_err(CommandError::Validation)?;
        let group = self.load(group_id).await?;
        if group.is_member(user_id) {
            return Err(CommandError::conflict(format!(
                "user {} is already a member of group {}",
                user_id, group_id
            )));
        }
        if group.is_full() {
            return Err(CommandError::conflict(format!("group {} is full", group_id)));
        }

        let event = DomainEvent::MemberAdded(MemberAdded {
            group_id: group_id.to_string(),
            user_id: user_id.to_string(),
            username,
            role: Some("member".to_string()),
        });
        let appended = self.record(group_id, event).await?;
        tracing::info!(group_id, user_id, "Member joined group");
        Ok(appended)
    }

    pub async fn update_group(&self, req: UpdateGroupRequest) -> Result<Event, CommandError> {
        let group = self.load(&req.group_id).await?;

        if let Some(name) = &req.name {
            require_text(name, "name")?;
        }
        if let Some(frequency) = &req.contribution_frequency {
            check_frequency(frequency, "contributionFrequency")?;
        }
        if let Some(frequency) = &req.payout_frequency {
            check_frequency(frequency, "payoutFrequency")?;
        }
        if let Some(visibility) = &req.visibility {
            check_visibility(visibility)?;
        }
        check_date(req.contribution_date.as_deref(), "contributionDate")?;
        check_date(req.payout_date.as_deref(), "payoutDate")?;
        if let Some(max_members) = req.max_members {
            if max_members == 0 {
                return Err(CommandError::validation("maxMembers must be greater than 0"));
            }
            if (max_members as usize) < group.member_ids.len() {
                return Err(CommandError::validation(format!(
                    "maxMembers cannot be below the current member count ({})",
                    group.member_ids.len()
                )));
            }
        }

        let group_id = req.group_id.clone();
        let event = DomainEvent::GroupUpdated(GroupUpdated {
            group_id: req.group_id,
            name: req.name.map(|n| n.trim().to_string()),
            max_members: req.max_members,
            description: req.description,
            profile_image: req.profile_image,
            visibility: req.visibility,
            contribution_frequency: req.contribution_frequency,
            contribution_date: req.contribution_date,
            payout_frequency: req.payout_frequency,
            payout_date: req.payout_date,
        });
        let appended = self.record(&group_id, event).await?;
        tracing::info!(group_id = %group_id, "Group updated");
        Ok(appended)
    }

    pub async fn request_to_join(
        &self,
        group_id: &str,
        user_id: &str,
        username: Option<String>,
    ) -> Result<Event, CommandError> {
        require_id(user_id, "userId").map_err(CommandError::Validation)?;
        let group = self.load(group_id).await?;
        if !group.is_public() {
            return Err(CommandError::validation(format!(
                "group {} is private and does not accept join requests",
                group_id
            )));
        }
        if group.is_member(user_id) {
            return Err(CommandError::conflict(format!(
                "user {} is already a member of group {}",
                user_id, group_id
            )));
        }
        if group.has_waiting_request_from(user_id) {
            return Err(CommandError::conflict(format!(
                "user {} already has a pending request for group {}",
                user_id, group_id
            )));
        }

        let request_id = new_id();
        let event = DomainEvent::JoinRequestCreated(JoinRequestCreated {
            group_id: group_id.to_string(),
            user_id: user_id.to_string(),
            request_id: request_id.clone(),
            username,
        });
        let appended = self.record(group_id, event).await?;
        tracing::info!(group_id, user_id, request_id = %request_id, "Join request created");
        Ok(appended)
    }

    pub async fn process_join_request(&self, req: ProcessJoinRequest) -> Result<Event, CommandError> {
        let group = self.load(&req.group_id).await?;
        if group.admin_id.as_deref() != Some(req.admin_id.as_str()) {
            return Err(CommandError::validation(
                "only the group admin can process join requests",
            ));
        }

        let Some(request) = group.requests.iter().find(|r| r.request_id == req.request_id) else {
            return Err(CommandError::NotFound {
                kind: "join request",
                id: req.request_id.clone(),
            });
        };
        if group.waiting_request(&req.request_id).is_none() {
            return Err(CommandError::conflict(format!(
                "join request {} was already processed",
                req.request_id
            )));
        }
        let user_id = request.user_id.clone();

        let event = match req.action {
            JoinAction::Accept => {
                if group.is_full() {
                    return Err(CommandError::conflict(format!("group {} is full", req.group_id)));
                }
                DomainEvent::JoinRequestAccepted(JoinRequestAccepted {
                    group_id: req.group_id.clone(),
                    request_id: req.request_id.clone(),
                    user_id: user_id.clone(),
                    processed_by: Some(req.admin_id.clone()),
                })
            }
            JoinAction::Reject => DomainEvent::JoinRequestRejected(JoinRequestRejected {
                group_id: req.group_id.clone(),
                user_id: user_id.clone(),
                request_id: Some(req.request_id.clone()),
                processed_by: Some(req.admin_id.clone()),
                reason: req.reason.clone(),
            }),
        };

        let appended = self.record(&req.group_id, event).await?;
        tracing::info!(
            group_id = %req.group_id,
            request_id = %req.request_id,
            user_id = %user_id,
            action = ?req.action,
            "Join request processed"
        );
        Ok(appended)
    }
}

fn check_date(value: Option<&str>, name: &str) -> Result<(), CommandError> {
    match value {
        Some(raw) if date::parse_lenient(Some(raw)).is_none() => Err(CommandError::validation(
            format!("{} is not a valid date: {:?}", name, raw),
        )),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::MemoryEventLog;
    use crate::models::RequestState;
    use crate::projections::MemorySnapshotStore;

    fn commands() -> GroupCommands<MemoryEventLog, MemorySnapshotStore> {
        GroupCommands::new(MemoryEventLog::new(), MemorySnapshotStore::new())
    }

    fn savers(max_members: u32) -> CreateGroupRequest {
        CreateGroupRequest {
            group_id: Some("g1".to_string()),
            admin_id: "admin".to_string(),
            name: "Savers".to_string(),
            min_contribution: 500.0,
            max_members,
            visibility: "Public".to_string(),
            contribution_frequency: "Monthly".to_string(),
            payout_frequency: "Monthly".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn create_includes_admin_and_sets_balance() {
        let cmds = commands();
        cmds.create_group(savers(3)).await.unwrap();

        let group = cmds.read_model().get_by_aggregate_id("g1").await.unwrap().unwrap();
        assert!(group.is_member("admin"));
        assert_eq!(group.balance, Some(500.0));
        assert_eq!(group.max_members, 3);
    }

    #[tokio::test]
    async fn create_rejects_bad_input() {
        let cmds = commands();

        let mut req = savers(3);
        req.payout_frequency = "Daily".to_string();
        assert!(matches!(cmds.create_group(req).await, Err(CommandError::Validation(_))));

        let mut req = savers(2);
        req.member_ids = vec!["a".to_string(), "b".to_string()];
        assert!(matches!(cmds.create_group(req).await, Err(CommandError::Validation(_))));

        let mut req = savers(3);
        req.min_contribution = 0.0;
        assert!(matches!(cmds.create_group(req).await, Err(CommandError::Validation(_))));

        assert!(cmds.events.is_empty().unwrap());
    }

    #[tokio::test]
    async fn duplicate_create_is_a_conflict() {
        let cmds = commands();
        cmds.create_group(savers(3)).await.unwrap();
        assert!(matches!(cmds.create_group(savers(3)).await, Err(CommandError::Conflict(_))));
    }

    #[tokio::test]
    async fn join_checks_membership_and_capacity() {
        let cmds = commands();
        cmds.create_group(savers(2)).await.unwrap();

        cmds.join_group("g1", "u1", None).await.unwrap();
        assert!(matches!(
            cmds.join_group("g1", "u1", None).await,
            Err(CommandError::Conflict(_))
        ));
        assert!(matches!(
            cmds.join_group("g1", "u2", None).await,
            Err(CommandError::Conflict(_))
        ));
        assert!(matches!(
            cmds.join_group("missing", "u2", None).await,
            Err(CommandError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn accepted_request_adds_member() {
        let cmds = commands();
        cmds.create_group(savers(3)).await.unwrap();

        let created = cmds.request_to_join("g1", "u1", Some("thandi".to_string())).await.unwrap();
        let request_id = created.data["requestId"].as_str().unwrap().to_string();
        assert!(matches!(
            cmds.request_to_join("g1", "u1", None).await,
            Err(CommandError::Conflict(_))
        ));

        let not_admin = ProcessJoinRequest {
            group_id: "g1".to_string(),
            request_id: request_id.clone(),
            action: JoinAction::Accept,
            admin_id: "u1".to_string(),
            reason: None,
        };
        assert!(cmds.process_join_request(not_admin.clone()).await.is_err());

        let by_admin = ProcessJoinRequest {
            admin_id: "admin".to_string(),
            ..not_admin
        };
        cmds.process_join_request(by_admin.clone()).await.unwrap();

        let group = cmds.read_model().get_by_aggregate_id("g1").await.unwrap().unwrap();
        assert!(group.is_member("u1"));
        assert_eq!(group.requests[0].state, RequestState::Accepted);
        assert!(matches!(
            cmds.process_join_request(by_admin).await,
            Err(CommandError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn private_groups_refuse_requests() {
        let cmds = commands();
        let mut req = savers(3);
        req.visibility = "Private".to_string();
        cmds.create_group(req).await.unwrap();
        assert!(matches!(
            cmds.request_to_join("g1", "u1", None).await,
            Err(CommandError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn update_cannot_shrink_below_members() {
        let cmds = commands();
        let mut req = savers(4);
        req.member_ids = vec!["u1".to_string(), "u2".to_string()];
        cmds.create_group(req).await.unwrap();

        let shrink = UpdateGroupRequest {
            group_id: "g1".to_string(),
            max_members: Some(2),
            ..Default::default()
        };
        assert!(matches!(cmds.update_group(shrink).await, Err(CommandError::Validation(_))));

        let rename = UpdateGroupRequest {
            group_id: "g1".to_string(),
            name: Some("Stokvel".to_string()),
            max_members: Some(3),
            ..Default::default()
        };
        cmds.update_group(rename).await.unwrap();
        let group = cmds.read_model().get_by_aggregate_id("g1").await.unwrap().unwrap();
        assert_eq!(group.name.as_deref(), Some("Stokvel"));
        assert_eq!(group.max_members, 3);
    }

    #[test]
    fn parses_actions() {
        assert_eq!(JoinAction::parse("Accept").unwrap(), JoinAction::Accept);
        assert_eq!(JoinAction::parse("reject").unwrap(), JoinAction::Reject);
        assert!(JoinAction::parse("maybe").is_err());
    }
}

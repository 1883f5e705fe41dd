use serde::Deserialize;

use super::require_text;
use crate::error::CommandError;
use crate::events::{DomainEvent, Event, EventLog, UserRegistered, UserUpdated};
use crate::models::ids::require_id;
use crate::models::user::full_name;
use crate::projections::{SnapshotStore, UserReadModel};

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterUserRequest {
    pub user_id: String,
    pub name: String,
    pub email: String,
    #[serde(alias = "idNumber")]
    pub sa_id: String,
    pub mobile_number: Option<String>,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// Profile pushed by the identity provider on register/login/update.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncUserRequest {
    #[serde(alias = "keycloakId")]
    pub user_id: String,
    pub email: String,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email_verified: Option<bool>,
    pub phone_number: Option<String>,
    pub id_number: Option<String>,
}

pub struct UserCommands<L, S> {
    events: L,
    users: UserReadModel<L, S>,
}

impl<L, S> UserCommands<L, S>
where
    L: EventLog + Clone,
    S: SnapshotStore,
{
    pub fn new(events: L, store: S) -> Self {
        Self {
            users: UserReadModel::new(events.clone(), store),
            events,
        }
    }

    pub fn read_model(&self) -> &UserReadModel<L, S> {
        &self.users
    }

    async fn record(&self, user_id: &str, event: DomainEvent) -> Result<Event, CommandError> {
        let appended = self.events.append(&event).await?;
        self.users.rebuild_state(user_id).await?;
        Ok(appended)
    }

    pub async fn register_user(&self, req: RegisterUserRequest) -> Result<Event, CommandError> {
        require_id(&req.user_id, "userId").map_err(CommandError::Validation)?;
        require_text(&req.name, "name")?;
        check_email(&req.email)?;
        check_sa_id(&req.sa_id)?;

        if self.users.get_by_aggregate_id(&req.user_id).await?.is_some() {
            return Err(CommandError::conflict(format!(
                "user {} is already registered",
                req.user_id
            )));
        }

        let user_id = req.user_id.clone();
        let event = DomainEvent::UserRegistered(UserRegistered {
            user_id: req.user_id,
            name: Some(req.name.trim().to_string()),
            email: Some(req.email.trim().to_string()),
            sa_id: Some(req.sa_id),
            mobile_number: req.mobile_number,
            username: req.username,
            first_name: req.first_name,
            last_name: req.last_name,
            email_verified: None,
        });
        let appended = self.record(&user_id, event).await?;
        tracing::info!(user_id = %user_id, "User registered");
        Ok(appended)
    }

    /// Register the user on first sight, otherwise patch the profile.
    pub async fn sync_user(&self, req: SyncUserRequest) -> Result<Event, CommandError> {
        require_id(&req.user_id, "userId").map_err(CommandError::Validation)?;
        check_email(&req.email)?;
        if let Some(id_number) = &req.id_number {
            check_sa_id(id_number)?;
        }

        let user_id = req.user_id.clone();
        let exists = self.users.get_by_aggregate_id(&user_id).await?.is_some();
        let name = full_name(req.first_name.as_deref(), req.last_name.as_deref());
        let name = Some(name).filter(|n| !n.is_empty()).or_else(|| req.username.clone());

        let event = if exists {
            DomainEvent::UserUpdated(UserUpdated {
                user_id: req.user_id,
                name,
                email: Some(req.email),
                sa_id: req.id_number,
                mobile_number: req.phone_number,
                username: req.username,
                first_name: req.first_name,
                last_name: req.last_name,
                email_verified: req.email_verified,
            })
        } else {
            DomainEvent::UserRegistered(UserRegistered {
                user_id: req.user_id,
                name,
                email: Some(req.email),
                sa_id: req.id_number,
                mobile_number: req.phone_number,
                username: req.username,
                first_name: req.first_name,
                last_name: req.last_name,
                email_verified: req.email_verified,
            })
        };

        let appended = self.record(&user_id, event).await?;
        tracing::info!(user_id = %user_id, created = !exists, "User synced");
        Ok(appended)
    }
}

fn check_email(email: &str) -> Result<(), CommandError> {
    require_text(email, "email")?;
    if !email.contains('@') {
        return Err(CommandError::validation(format!("email is not valid: {:?}", email)));
    }
    Ok(())
}

/// South African ID numbers are exactly 13 digits.
fn check_sa_id(sa_id: &str) -> Result<(), CommandError> {
    if sa_id.len() == 13 && sa_id.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(CommandError::validation("SA ID must be exactly 13 digits"))
    }
}

use chrono::{DateTime, Utc};

use super::Projection;
use crate::events::{DomainEvent, IdFields, UserRegistered, UserUpdated};
use crate::models::user::{full_name, DEFAULT_TIER};
use crate::models::User;

pub struct UserProjection;

impl Projection for UserProjection {
    const KIND: &'static str = "user";

    type Snapshot = User;

    fn id_fields() -> IdFields {
        IdFields::user()
    }

    fn apply(state: Option<User>, event: &DomainEvent, timestamp: DateTime<Utc>) -> Option<User> {
        match event {
            DomainEvent::UserRegistered(registered) => Some(user_from_registered(registered, timestamp)),
            DomainEvent::UserUpdated(updated) => match state {
                Some(mut user) => {
                    apply_update(&mut user, updated, timestamp);
                    Some(user)
                }
                None => {
                    tracing::warn!(user_id = %updated.user_id, "UserUpdated precedes UserRegistered, skipping");
                    None
                }
            },
            _ => state,
        }
    }
}

fn user_from_registered(registered: &UserRegistered, timestamp: DateTime<Utc>) -> User {
    let name = registered
        .name
        .clone()
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| {
            full_name(registered.first_name.as_deref(), registered.last_name.as_deref())
        });

    User {
        user_id: registered.user_id.clone(),
        name,
        email: registered.email.clone().unwrap_or_default(),
        sa_id: registered.sa_id.clone(),
        mobile_number: registered.mobile_number.clone(),
        username: registered.username.clone(),
        first_name: registered.first_name.clone(),
        last_name: registered.last_name.clone(),
        email_verified: registered.email_verified.unwrap_or(false),
        tier: DEFAULT_TIER.to_string(),
        created_at: timestamp,
        updated_at: timestamp,
    }
}

fn apply_update(user: &mut User, updated: &UserUpdated, timestamp: DateTime<Utc>) {
    if let Some(email) = &updated.email {
        user.email = email.clone();
    }
    if let Some(sa_id) = &updated.sa_id {
        user.sa_id = Some(sa_id.clone());
    }
    if let Some(mobile) = &updated.mobile_number {
        user.mobile_number = Some(mobile.clone());
    }
    if let Some(username) = &updated.username {
        user.username = Some(username.clone());
    }
    if let Some(first) = &updated.first_name {
        user.first_name = Some(first.clone());
    }
    if let Some(last) = &updated.last_name {
        user.last_name = Some(last.clone());
    }
    if let Some(verified) = updated.email_verified {
        user.email_verified = verified;
    }
    match &updated.name {
        Some(name) if !name.trim().is_empty() => user.name = name.clone(),
        _ if updated.first_name.is_some() || updated.last_name.is_some() => {
            user.name = full_name(user.first_name.as_deref(), user.last_name.as_deref());
        }
        _ => {}
    }
    user.updated_at = timestamp;
}

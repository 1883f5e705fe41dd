//! Command handlers: validate against the current read model, append one event,
//! then rebuild the affected aggregate.

pub mod group;
pub mod user;

pub use group::{
    CreateGroupRequest, GroupCommands, JoinAction, ProcessJoinRequest, UpdateGroupRequest,
};
pub use user::{RegisterUserRequest, SyncUserRequest, UserCommands};

use crate::error::CommandError;
use crate::models::{Frequency, Visibility};

pub(crate) fn require_text(value: &str, name: &str) -> Result<(), CommandError> {
    if value.trim().is_empty() {
        return Err(CommandError::validation(format!("{} is required", name)));
    }
    Ok(())
}

pub(crate) fn check_frequency(value: &str, name: &str) -> Result<(), CommandError> {
    value.parse::<Frequency>().map(|_| ()).map_err(|e| {
        CommandError::validation(format!(
            "{}: {}; expected Monthly, Bi-weekly or Weekly",
            name, e
        ))
    })
}

pub(crate) fn check_visibility(value: &str) -> Result<(), CommandError> {
    value.parse::<Visibility>().map(|_| ()).map_err(|e| {
        CommandError::validation(format!("{}; expected Private or Public", e))
    })
}

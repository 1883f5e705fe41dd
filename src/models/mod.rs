//! Read-model types and id helpers.

pub mod group;
pub mod ids;
pub mod user;

pub use group::{Frequency, Group, JoinRequest, RequestState, UnknownVariant, Visibility};
pub use user::User;

pub mod project;
pub mod task;
pub mod user;

use serde::{Deserialize, Deserializer};

pub use project::{Application, ApplicationStatus, Member, Participant, Project, Role};
pub use task::{
    CreateTaskRequest, Priority, Task, TaskChanges, TaskField, TaskStatus, UpdateTaskRequest,
};
pub use user::{ActorIdentity, User};

/// Distinguishes an absent JSON field (`None`) from an explicit `null`
/// (`Some(None)`), so a PATCH can clear optional fields.
pub(crate) fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A conversation container scoped to a user inside a project.
///
/// The store owns this record exclusively; `last_viewed_turn_id` is a
/// best-effort cursor advanced by `GetPaginatedTurns` and never required for
/// correctness of any other read path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    pub id: Uuid,
    pub project_id: Uuid,
    pub owner_id: Uuid,
    pub title: Option<String>,
    pub last_viewed_turn_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    /// Soft-delete tombstone. Queries ignore chats where this is set.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Chat {
    pub fn new(project_id: Uuid, owner_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            project_id,
            owner_id,
            title: None,
            last_viewed_turn_id: None,
            created_at: Utc::now(),
            deleted_at: None,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

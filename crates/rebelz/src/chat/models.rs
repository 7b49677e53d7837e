//! Chat domain types.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::protocol::{Envelope, MessageData, MessageRole};

/// How a group is governed. Managed groups are created by staff and their
/// managing user cannot be removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum GroupKind {
    UserCreated,
    AdminManaged,
    InstructorManaged,
}

impl GroupKind {
    pub fn is_managed(self) -> bool {
        !matches!(self, GroupKind::UserCreated)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ChatGroup {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub group_type: GroupKind,
    pub is_public: bool,
    pub created_by: String,
    pub created_at: String,
}

/// Group row joined with its member count, for listings.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct GroupSummary {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub group_type: GroupKind,
    pub is_public: bool,
    pub created_by: String,
    pub created_at: String,
    pub member_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ChatMessage {
    pub id: i64,
    pub group_id: i64,
    pub sender_id: String,
    pub content: String,
    pub kind: String,
    pub created_at: String,
}

impl ChatMessage {
    /// Wire view of a persisted message. The id sequence assigned by the
    /// database is the group's ordering, so it rides along on the envelope.
    pub fn to_envelope(&self) -> Envelope {
        Envelope::Message(MessageData {
            role: MessageRole::User,
            content: self.content.clone(),
            id: Some(self.id),
            group_id: Some(self.group_id),
            sender_id: Some(self.sender_id.clone()),
            kind: Some(self.kind.clone()),
            created_at: Some(self.created_at.clone()),
        })
    }
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("group not found")]
    GroupNotFound,
    #[error("not a member of this group")]
    NotAMember,
    #[error("group admin privileges required")]
    NotGroupAdmin,
    #[error("message content must not be empty")]
    EmptyContent,
    #[error("user is already a member of this group")]
    AlreadyMember,
    #[error("the managing user of a managed group cannot be removed")]
    CannotRemoveManager,
    #[error("only user-created groups can be deleted")]
    CannotDeleteManaged,
    #[error("only the group creator can delete the group")]
    NotGroupCreator,
    #[error("cannot join a private group without an invitation")]
    NotPublic,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

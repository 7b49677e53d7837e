//! Group chat pipeline.
//!
//! `submit` is the single write path for group messages, shared by the REST
//! endpoint and the WebSocket inbound path. It validates membership, persists
//! the message and fans it out to live connections.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::ws::ChatHub;

use super::models::{ChatError, ChatGroup, ChatMessage, GroupKind, GroupSummary};
use super::repository::ChatRepository;

pub struct ChatService {
    repo: ChatRepository,
    hub: Arc<ChatHub>,
    // One lock per group, held across insert + broadcast so the broadcast
    // order always matches the persisted id order.
    group_locks: DashMap<i64, Arc<Mutex<()>>>,
}

impl ChatService {
    pub fn new(repo: ChatRepository, hub: Arc<ChatHub>) -> Arc<Self> {
        Arc::new(Self {
            repo,
            hub,
            group_locks: DashMap::new(),
        })
    }

    fn group_lock(&self, group_id: i64) -> Arc<Mutex<()>> {
        self.group_locks
            .entry(group_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Persist a message and broadcast it to the group's live connections.
    ///
    /// Non-members are rejected before anything is written. The returned
    /// message carries the database-assigned id; the broadcast envelope is
    /// built from the same row, so stream consumers see storage order.
    pub async fn submit(
        &self,
        group_id: i64,
        sender_id: &str,
        content: &str,
        kind: &str,
    ) -> Result<ChatMessage, ChatError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ChatError::EmptyContent);
        }
        if self.repo.get_group(group_id).await?.is_none() {
            return Err(ChatError::GroupNotFound);
        }
        if !self.repo.is_member(group_id, sender_id).await? {
            return Err(ChatError::NotAMember);
        }

        let lock = self.group_lock(group_id);
        let _guard = lock.lock().await;
        let message = self.repo.insert_message(group_id, sender_id, content, kind).await?;
        self.hub.broadcast(group_id, &message.to_envelope());
        Ok(message)
    }

    /// Create a user-created group. The creator becomes its in-group admin.
    pub async fn create_group(
        &self,
        name: &str,
        description: &str,
        is_public: bool,
        creator_id: &str,
    ) -> Result<ChatGroup, ChatError> {
        let group = self
            .repo
            .insert_group(name, description, GroupKind::UserCreated, is_public, creator_id)
            .await?;
        self.repo.add_member(group.id, creator_id, true).await?;
        Ok(group)
    }

    /// Create a managed group on behalf of a staff member. The creator is
    /// the managing user; initial members join as regular members.
    pub async fn create_managed_group(
        &self,
        name: &str,
        description: &str,
        kind: GroupKind,
        is_public: bool,
        creator_id: &str,
        initial_members: &[String],
    ) -> Result<ChatGroup, ChatError> {
        let group = self
            .repo
            .insert_group(name, description, kind, is_public, creator_id)
            .await?;
        self.repo.add_member(group.id, creator_id, true).await?;
        for member in initial_members {
            if member != creator_id {
                self.repo.add_member(group.id, member, false).await?;
            }
        }
        Ok(group)
    }

    /// Delete a user-created group. Creator only; memberships and messages
    /// cascade away and live connections are dropped.
    pub async fn delete_group(&self, group_id: i64, actor_id: &str) -> Result<(), ChatError> {
        let group = self
            .repo
            .get_group(group_id)
            .await?
            .ok_or(ChatError::GroupNotFound)?;
        if group.group_type.is_managed() {
            return Err(ChatError::CannotDeleteManaged);
        }
        if group.created_by != actor_id {
            return Err(ChatError::NotGroupCreator);
        }

        self.repo.delete_group(group_id).await?;
        self.group_locks.remove(&group_id);
        self.hub.drop_group(group_id);
        Ok(())
    }

    /// Self-service join of a public group.
    pub async fn join_public_group(&self, group_id: i64, user_id: &str) -> Result<(), ChatError> {
        let group = self
            .repo
            .get_group(group_id)
            .await?
            .ok_or(ChatError::GroupNotFound)?;
        if !group.is_public {
            return Err(ChatError::NotPublic);
        }
        if !self.repo.add_member(group_id, user_id, false).await? {
            return Err(ChatError::AlreadyMember);
        }
        Ok(())
    }

    pub async fn list_groups(&self, user_id: &str) -> Result<Vec<GroupSummary>, ChatError> {
        Ok(self.repo.list_groups_for_user(user_id).await?)
    }

    pub async fn search_public_groups(&self, query: &str) -> Result<Vec<GroupSummary>, ChatError> {
        Ok(self.repo.search_public_groups(query).await?)
    }

    /// Add a member. Only in-group admins may add.
    pub async fn add_member(
        &self,
        group_id: i64,
        actor_id: &str,
        user_id: &str,
    ) -> Result<(), ChatError> {
        if self.repo.get_group(group_id).await?.is_none() {
            return Err(ChatError::GroupNotFound);
        }
        if !self.repo.is_group_admin(group_id, actor_id).await? {
            return Err(ChatError::NotGroupAdmin);
        }
        if !self.repo.add_member(group_id, user_id, false).await? {
            return Err(ChatError::AlreadyMember);
        }
        Ok(())
    }

    /// Remove a member. In-group admins may remove anyone except the
    /// managing user of a managed group; any member may remove themselves.
    pub async fn remove_member(
        &self,
        group_id: i64,
        actor_id: &str,
        user_id: &str,
    ) -> Result<(), ChatError> {
        let group = self
            .repo
            .get_group(group_id)
            .await?
            .ok_or(ChatError::GroupNotFound)?;
        if actor_id != user_id && !self.repo.is_group_admin(group_id, actor_id).await? {
            return Err(ChatError::NotGroupAdmin);
        }
        if group.group_type.is_managed() && user_id == group.created_by {
            return Err(ChatError::CannotRemoveManager);
        }
        if !self.repo.remove_member(group_id, user_id).await? {
            return Err(ChatError::NotAMember);
        }
        Ok(())
    }

    /// Membership-gated message history, oldest first.
    pub async fn history(
        &self,
        group_id: i64,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<ChatMessage>, ChatError> {
        if self.repo.get_group(group_id).await?.is_none() {
            return Err(ChatError::GroupNotFound);
        }
        if !self.repo.is_member(group_id, user_id).await? {
            return Err(ChatError::NotAMember);
        }
        Ok(self.repo.list_messages(group_id, limit).await?)
    }

    /// Membership check for the socket upgrade gate.
    pub async fn is_member(&self, group_id: i64, user_id: &str) -> Result<bool, ChatError> {
        Ok(self.repo.is_member(group_id, user_id).await?)
    }

    pub fn hub(&self) -> &Arc<ChatHub> {
        &self.hub
    }
}

use async_trait::async_trait;
use thiserror::Error;

use tripchat_types::api::{Page, PageRequest};
use tripchat_types::models::{
    ChatGroup, ChatMessage, GroupMember, GroupPatch, NewGroup, NewMessage, Reaction, ReadCursor,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store error: {0}")]
    Internal(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode;

        match &err {
            rusqlite::Error::QueryReturnedNoRows => Self::NotFound("no rows".into()),
            rusqlite::Error::SqliteFailure(e, _) => match e.code {
                ErrorCode::ConstraintViolation => Self::Conflict(err.to_string()),
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => {
                    Self::Unavailable(err.to_string())
                }
                _ => Self::Internal(err.to_string()),
            },
            _ => Self::Internal(err.to_string()),
        }
    }
}

/// One open transaction on the store.
///
/// Nothing is visible to other readers until [`StoreTx::commit`]. Dropping the
/// transaction without committing rolls it back.
#[async_trait]
pub trait StoreTx: Send {
    async fn create_group(&mut self, group: &NewGroup) -> Result<ChatGroup, StoreError>;
    async fn get_group(&mut self, id: &str) -> Result<ChatGroup, StoreError>;
    async fn update_group(&mut self, id: &str, patch: &GroupPatch)
    -> Result<ChatGroup, StoreError>;
    /// Soft-delete the group and its messages; hard-delete members,
    /// reactions and read cursors.
    async fn delete_group(&mut self, id: &str) -> Result<(), StoreError>;

    /// Returns `true` if the row was inserted, `false` if it already existed.
    async fn add_member(&mut self, group_id: &str, user_id: &str) -> Result<bool, StoreError>;
    /// Returns `true` if a row was removed. Also drops the user's read cursor.
    async fn remove_member(&mut self, group_id: &str, user_id: &str)
    -> Result<bool, StoreError>;

    async fn create_message(&mut self, message: &NewMessage) -> Result<ChatMessage, StoreError>;
    async fn get_message(&mut self, id: &str) -> Result<ChatMessage, StoreError>;
    async fn update_message(&mut self, id: &str, content: &str)
    -> Result<ChatMessage, StoreError>;
    async fn delete_message(&mut self, id: &str) -> Result<ChatMessage, StoreError>;

    async fn add_reaction(
        &mut self,
        message_id: &str,
        user_id: &str,
        symbol: &str,
    ) -> Result<bool, StoreError>;
    async fn remove_reaction(
        &mut self,
        message_id: &str,
        user_id: &str,
        symbol: &str,
    ) -> Result<bool, StoreError>;

    /// Upsert the cursor. Fails with `Conflict` if the message belongs to
    /// another group.
    async fn update_last_read(
        &mut self,
        group_id: &str,
        user_id: &str,
        message_id: &str,
    ) -> Result<ReadCursor, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

/// Read access plus single-operation writes, each in its own transaction.
#[async_trait]
pub trait ChatStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError>;

    async fn get_group(&self, id: &str) -> Result<ChatGroup, StoreError>;
    /// Ordered by `created_at DESC, id DESC`; soft-deleted groups excluded.
    async fn list_groups_by_trip(
        &self,
        trip_id: &str,
        page: PageRequest,
    ) -> Result<Page<ChatGroup>, StoreError>;
    async fn list_members(&self, group_id: &str) -> Result<Vec<GroupMember>, StoreError>;
    async fn get_message(&self, id: &str) -> Result<ChatMessage, StoreError>;
    /// Ordered by `created_at DESC, id DESC`; soft-deleted messages excluded.
    async fn list_messages(
        &self,
        group_id: &str,
        page: PageRequest,
    ) -> Result<Page<ChatMessage>, StoreError>;
    async fn list_reactions(&self, message_ids: &[String]) -> Result<Vec<Reaction>, StoreError>;
    async fn get_read_cursor(
        &self,
        group_id: &str,
        user_id: &str,
    ) -> Result<Option<ReadCursor>, StoreError>;
    /// Live messages in the group newer than `after_message_id` (all when `None`).
    async fn count_unread(
        &self,
        group_id: &str,
        after_message_id: Option<&str>,
    ) -> Result<u64, StoreError>;

    async fn create_group(&self, group: &NewGroup) -> Result<ChatGroup, StoreError> {
        let mut tx = self.begin().await?;
        let created = tx.create_group(group).await?;
        tx.commit().await?;
        Ok(created)
    }

    async fn update_group(&self, id: &str, patch: &GroupPatch) -> Result<ChatGroup, StoreError> {
        let mut tx = self.begin().await?;
        let updated = tx.update_group(id, patch).await?;
        tx.commit().await?;
        Ok(updated)
    }

    async fn delete_group(&self, id: &str) -> Result<(), StoreError> {
        let mut tx = self.begin().await?;
        tx.delete_group(id).await?;
        tx.commit().await
    }

    async fn add_member(&self, group_id: &str, user_id: &str) -> Result<bool, StoreError> {
        let mut tx = self.begin().await?;
        let added = tx.add_member(group_id, user_id).await?;
        tx.commit().await?;
        Ok(added)
    }

    async fn remove_member(&self, group_id: &str, user_id: &str) -> Result<bool, StoreError> {
        let mut tx = self.begin().await?;
        let removed = tx.remove_member(group_id, user_id).await?;
        tx.commit().await?;
        Ok(removed)
    }

    async fn create_message(&self, message: &NewMessage) -> Result<ChatMessage, StoreError> {
        let mut tx = self.begin().await?;
        let created = tx.create_message(message).await?;
        tx.commit().await?;
        Ok(created)
    }

    async fn update_message(&self, id: &str, content: &str) -> Result<ChatMessage, StoreError> {
        let mut tx = self.begin().await?;
        let updated = tx.update_message(id, content).await?;
        tx.commit().await?;
        Ok(updated)
    }

    async fn delete_message(&self, id: &str) -> Result<ChatMessage, StoreError> {
        let mut tx = self.begin().await?;
        let deleted = tx.delete_message(id).await?;
        tx.commit().await?;
        Ok(deleted)
    }

    async fn add_reaction(
        &self,
        message_id: &str,
        user_id: &str,
        symbol: &str,
    ) -> Result<bool, StoreError> {
        let mut tx = self.begin().await?;
        let added = tx.add_reaction(message_id, user_id, symbol).await?;
        tx.commit().await?;
        Ok(added)
    }

    async fn remove_reaction(
        &self,
        message_id: &str,
        user_id: &str,
        symbol: &str,
    ) -> Result<bool, StoreError> {
        let mut tx = self.begin().await?;
        let removed = tx.remove_reaction(message_id, user_id, symbol).await?;
        tx.commit().await?;
        Ok(removed)
    }

    async fn update_last_read(
        &self,
        group_id: &str,
        user_id: &str,
        message_id: &str,
    ) -> Result<ReadCursor, StoreError> {
        let mut tx = self.begin().await?;
        let cursor = tx.update_last_read(group_id, user_id, message_id).await?;
        tx.commit().await?;
        Ok(cursor)
    }
}

use std::sync::Arc;

use async_trait::async_trait;
use rusqlite::Connection;
use tokio::sync::OwnedMutexGuard;
use tracing::{error, warn};

use tripchat_types::api::{Page, PageRequest};
use tripchat_types::models::{
    ChatGroup, ChatMessage, GroupMember, GroupPatch, NewGroup, NewMessage, Reaction, ReadCursor,
};

use crate::Database;
use crate::queries;
use crate::store::{ChatStore, StoreError, StoreTx};

/// [`ChatStore`] backed by SQLite. Cheap to clone.
#[derive(Clone)]
pub struct SqliteStore {
    db: Arc<Database>,
}

impl SqliteStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Run a read off the async runtime.
    async fn read<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || db.with_reader(f))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                StoreError::Internal(format!("read task failed: {e}"))
            })?
    }
}

#[async_trait]
impl ChatStore for SqliteStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        let conn = self.db.lock_writer().await;
        let writer = WriterGuard::begin(conn)?;
        Ok(Box::new(SqliteTx {
            writer: Some(writer),
        }))
    }

    async fn get_group(&self, id: &str) -> Result<ChatGroup, StoreError> {
        let id = id.to_string();
        self.read(move |conn| queries::get_group(conn, &id)).await
    }

    async fn list_groups_by_trip(
        &self,
        trip_id: &str,
        page: PageRequest,
    ) -> Result<Page<ChatGroup>, StoreError> {
        let trip_id = trip_id.to_string();
        self.read(move |conn| queries::list_groups_by_trip(conn, &trip_id, page))
            .await
    }

    async fn list_members(&self, group_id: &str) -> Result<Vec<GroupMember>, StoreError> {
        let group_id = group_id.to_string();
        self.read(move |conn| queries::list_members(conn, &group_id)).await
    }

    async fn get_message(&self, id: &str) -> Result<ChatMessage, StoreError> {
        let id = id.to_string();
        self.read(move |conn| queries::get_message(conn, &id)).await
    }

    async fn list_messages(
        &self,
        group_id: &str,
        page: PageRequest,
    ) -> Result<Page<ChatMessage>, StoreError> {
        let group_id = group_id.to_string();
        self.read(move |conn| queries::list_messages(conn, &group_id, page))
            .await
    }

    async fn list_reactions(&self, message_ids: &[String]) -> Result<Vec<Reaction>, StoreError> {
        let message_ids = message_ids.to_vec();
        self.read(move |conn| queries::list_reactions(conn, &message_ids))
            .await
    }

    async fn get_read_cursor(
        &self,
        group_id: &str,
        user_id: &str,
    ) -> Result<Option<ReadCursor>, StoreError> {
        let (group_id, user_id) = (group_id.to_string(), user_id.to_string());
        self.read(move |conn| queries::get_read_cursor(conn, &group_id, &user_id))
            .await
    }

    async fn count_unread(
        &self,
        group_id: &str,
        after_message_id: Option<&str>,
    ) -> Result<u64, StoreError> {
        let group_id = group_id.to_string();
        let after = after_message_id.map(str::to_string);
        self.read(move |conn| queries::count_unread(conn, &group_id, after.as_deref()))
            .await
    }
}

/// Exclusive hold on the writer connection with an open `BEGIN IMMEDIATE`.
/// Rolls back on drop unless finished.
struct WriterGuard {
    conn: OwnedMutexGuard<Connection>,
    open: bool,
}

impl WriterGuard {
    fn begin(conn: OwnedMutexGuard<Connection>) -> Result<Self, StoreError> {
        conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(Self { conn, open: true })
    }

    /// On failure the transaction stays open and is rolled back by `Drop`.
    fn finish(&mut self, sql: &str) -> Result<(), StoreError> {
        self.conn.execute_batch(sql)?;
        self.open = false;
        Ok(())
    }
}

impl Drop for WriterGuard {
    fn drop(&mut self) {
        if self.open && !self.conn.is_autocommit() {
            if let Err(e) = self.conn.execute_batch("ROLLBACK") {
                warn!("rollback of abandoned transaction failed: {}", e);
            }
        }
    }
}

pub struct SqliteTx {
    writer: Option<WriterGuard>,
}

impl SqliteTx {
    /// Run `f` on the transaction's connection off the async runtime. If the
    /// calling future is dropped mid-flight the guard is dropped with the
    /// blocking task's output, which rolls the transaction back.
    async fn run<F, T>(&mut self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let writer = self
            .writer
            .take()
            .ok_or_else(|| StoreError::Internal("transaction already finished".into()))?;

        let (writer, result) = tokio::task::spawn_blocking(move || {
            let result = f(&*writer.conn);
            (writer, result)
        })
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StoreError::Internal(format!("transaction task failed: {e}"))
        })?;

        self.writer = Some(writer);
        result
    }

    async fn finish(mut self: Box<Self>, sql: &'static str) -> Result<(), StoreError> {
        let mut writer = self
            .writer
            .take()
            .ok_or_else(|| StoreError::Internal("transaction already finished".into()))?;

        tokio::task::spawn_blocking(move || writer.finish(sql))
            .await
            .map_err(|e| StoreError::Internal(format!("transaction task failed: {e}")))?
    }
}

#[async_trait]
impl StoreTx for SqliteTx {
    async fn create_group(&mut self, group: &NewGroup) -> Result<ChatGroup, StoreError> {
        let group = group.clone();
        self.run(move |conn| queries::insert_group(conn, &group)).await
    }

    async fn get_group(&mut self, id: &str) -> Result<ChatGroup, StoreError> {
        let id = id.to_string();
        self.run(move |conn| queries::get_group(conn, &id)).await
    }

    async fn update_group(
        &mut self,
        id: &str,
        patch: &GroupPatch,
    ) -> Result<ChatGroup, StoreError> {
        let (id, patch) = (id.to_string(), patch.clone());
        self.run(move |conn| queries::update_group(conn, &id, &patch))
            .await
    }

    async fn delete_group(&mut self, id: &str) -> Result<(), StoreError> {
        let id = id.to_string();
        self.run(move |conn| queries::soft_delete_group(conn, &id)).await
    }

    async fn add_member(&mut self, group_id: &str, user_id: &str) -> Result<bool, StoreError> {
        let (group_id, user_id) = (group_id.to_string(), user_id.to_string());
        self.run(move |conn| queries::insert_member(conn, &group_id, &user_id))
            .await
    }

    async fn remove_member(
        &mut self,
        group_id: &str,
        user_id: &str,
    ) -> Result<bool, StoreError> {
        let (group_id, user_id) = (group_id.to_string(), user_id.to_string());
        self.run(move |conn| queries::delete_member(conn, &group_id, &user_id))
            .await
    }

    async fn create_message(&mut self, message: &NewMessage) -> Result<ChatMessage, StoreError> {
        let message = message.clone();
        self.run(move |conn| queries::insert_message(conn, &message))
            .await
    }

    async fn get_message(&mut self, id: &str) -> Result<ChatMessage, StoreError> {
        let id = id.to_string();
        self.run(move |conn| queries::get_message(conn, &id)).await
    }

    async fn update_message(
        &mut self,
        id: &str,
        content: &str,
    ) -> Result<ChatMessage, StoreError> {
        let (id, content) = (id.to_string(), content.to_string());
        self.run(move |conn| queries::update_message(conn, &id, &content))
            .await
    }

    async fn delete_message(&mut self, id: &str) -> Result<ChatMessage, StoreError> {
        let id = id.to_string();
        self.run(move |conn| queries::soft_delete_message(conn, &id))
            .await
    }

    async fn add_reaction(
        &mut self,
        message_id: &str,
        user_id: &str,
        symbol: &str,
    ) -> Result<bool, StoreError> {
        let (message_id, user_id, symbol) =
            (message_id.to_string(), user_id.to_string(), symbol.to_string());
        self.run(move |conn| queries::insert_reaction(conn, &message_id, &user_id, &symbol))
            .await
    }

    async fn remove_reaction(
        &mut self,
        message_id: &str,
        user_id: &str,
        symbol: &str,
    ) -> Result<bool, StoreError> {
        let (message_id, user_id, symbol) =
            (message_id.to_string(), user_id.to_string(), symbol.to_string());
        self.run(move |conn| queries::delete_reaction(conn, &message_id, &user_id, &symbol))
            .await
    }

    async fn update_last_read(
        &mut self,
        group_id: &str,
        user_id: &str,
        message_id: &str,
    ) -> Result<ReadCursor, StoreError> {
        let (group_id, user_id, message_id) =
            (group_id.to_string(), user_id.to_string(), message_id.to_string());
        self.run(move |conn| queries::upsert_last_read(conn, &group_id, &user_id, &message_id))
            .await
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.finish("COMMIT").await
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.finish("ROLLBACK").await
    }
}

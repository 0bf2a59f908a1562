//! Database row types. These map directly to SQLite rows and are converted
//! into the shared `tripchat-types` models at the store boundary.

use tripchat_types::models::{ChatGroup, ChatMessage, GroupMember, Reaction, ReadCursor};

use crate::store::StoreError;
use crate::timefmt;

pub struct GroupRow {
    pub id: String,
    pub trip_id: String,
    pub name: String,
    pub description: Option<String>,
    pub created_by: String,
    pub created_at: String,
    pub updated_at: String,
    pub deleted_at: Option<String>,
}

impl GroupRow {
    pub const COLUMNS: &'static str =
        "id, trip_id, name, description, created_by, created_at, updated_at, deleted_at";

    pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            trip_id: row.get(1)?,
            name: row.get(2)?,
            description: row.get(3)?,
            created_by: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
            deleted_at: row.get(7)?,
        })
    }
}

impl TryFrom<GroupRow> for ChatGroup {
    type Error = StoreError;

    fn try_from(row: GroupRow) -> Result<Self, Self::Error> {
        Ok(ChatGroup {
            created_at: timefmt::parse(&row.created_at)?,
            updated_at: timefmt::parse(&row.updated_at)?,
            deleted_at: timefmt::parse_opt(row.deleted_at)?,
            id: row.id,
            trip_id: row.trip_id,
            name: row.name,
            description: row.description,
            created_by: row.created_by,
        })
    }
}

pub struct MemberRow {
    pub group_id: String,
    pub user_id: String,
    pub joined_at: String,
}

impl TryFrom<MemberRow> for GroupMember {
    type Error = StoreError;

    fn try_from(row: MemberRow) -> Result<Self, Self::Error> {
        Ok(GroupMember {
            joined_at: timefmt::parse(&row.joined_at)?,
            group_id: row.group_id,
            user_id: row.user_id,
        })
    }
}

pub struct MessageRow {
    pub id: String,
    pub group_id: String,
    pub trip_id: String,
    pub user_id: String,
    pub content: String,
    pub content_type: String,
    pub created_at: String,
    pub updated_at: String,
    pub deleted_at: Option<String>,
}

impl MessageRow {
    pub const COLUMNS: &'static str =
        "id, group_id, trip_id, user_id, content, content_type, created_at, updated_at, deleted_at";

    pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            group_id: row.get(1)?,
            trip_id: row.get(2)?,
            user_id: row.get(3)?,
            content: row.get(4)?,
            content_type: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
            deleted_at: row.get(8)?,
        })
    }
}

impl TryFrom<MessageRow> for ChatMessage {
    type Error = StoreError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        Ok(ChatMessage {
            content_type: row.content_type.parse().map_err(StoreError::Internal)?,
            created_at: timefmt::parse(&row.created_at)?,
            updated_at: timefmt::parse(&row.updated_at)?,
            deleted_at: timefmt::parse_opt(row.deleted_at)?,
            id: row.id,
            group_id: row.group_id,
            trip_id: row.trip_id,
            user_id: row.user_id,
            content: row.content,
        })
    }
}

pub struct ReactionRow {
    pub message_id: String,
    pub user_id: String,
    pub reaction: String,
    pub created_at: String,
}

impl TryFrom<ReactionRow> for Reaction {
    type Error = StoreError;

    fn try_from(row: ReactionRow) -> Result<Self, Self::Error> {
        Ok(Reaction {
            created_at: timefmt::parse(&row.created_at)?,
            message_id: row.message_id,
            user_id: row.user_id,
            symbol: row.reaction,
        })
    }
}

pub struct LastReadRow {
    pub group_id: String,
    pub user_id: String,
    pub last_read_message_id: Option<String>,
    pub updated_at: String,
}

impl TryFrom<LastReadRow> for ReadCursor {
    type Error = StoreError;

    fn try_from(row: LastReadRow) -> Result<Self, Self::Error> {
        Ok(ReadCursor {
            updated_at: timefmt::parse(&row.updated_at)?,
            group_id: row.group_id,
            user_id: row.user_id,
            last_read_message_id: row.last_read_message_id,
        })
    }
}

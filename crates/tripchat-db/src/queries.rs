//! Synchronous SQL for the chat tables. Every function takes a borrowed
//! connection so it can run on a reader or inside the writer's transaction.

use rusqlite::{Connection, OptionalExtension, params};
use uuid::Uuid;

use tripchat_types::api::{Page, PageRequest};
use tripchat_types::models::{
    ChatGroup, ChatMessage, GroupMember, GroupPatch, NewGroup, NewMessage, Reaction, ReadCursor,
};

use crate::models::{GroupRow, LastReadRow, MemberRow, MessageRow, ReactionRow};
use crate::store::StoreError;
use crate::timefmt;

/// Longest accepted reaction symbol, in bytes.
pub const MAX_SYMBOL_LEN: usize = 64;

fn require(value: &str, what: &str) -> Result<(), StoreError> {
    if value.trim().is_empty() {
        return Err(StoreError::InvalidArgument(format!("{what} must not be empty")));
    }
    Ok(())
}

// -- Groups --

pub fn insert_group(conn: &Connection, group: &NewGroup) -> Result<ChatGroup, StoreError> {
    require(&group.trip_id, "trip_id")?;
    require(&group.created_by, "created_by")?;
    require(&group.name, "name")?;

    let id = Uuid::new_v4().to_string();
    let now = timefmt::now();
    let stamp = timefmt::format(now);

    conn.execute(
        "INSERT INTO chat_groups (id, trip_id, name, description, created_by, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
        params![
            id,
            group.trip_id,
            group.name.trim(),
            group.description,
            group.created_by,
            stamp
        ],
    )?;

    Ok(ChatGroup {
        id,
        trip_id: group.trip_id.clone(),
        name: group.name.trim().to_string(),
        description: group.description.clone(),
        created_by: group.created_by.clone(),
        created_at: now,
        updated_at: now,
        deleted_at: None,
    })
}

pub fn get_group(conn: &Connection, id: &str) -> Result<ChatGroup, StoreError> {
    let sql = format!(
        "SELECT {} FROM chat_groups WHERE id = ?1 AND deleted_at IS NULL",
        GroupRow::COLUMNS
    );
    conn.query_row(&sql, [id], GroupRow::from_row)
        .optional()?
        .ok_or_else(|| StoreError::NotFound(format!("chat group {id}")))?
        .try_into()
}

pub fn update_group(
    conn: &Connection,
    id: &str,
    patch: &GroupPatch,
) -> Result<ChatGroup, StoreError> {
    if let Some(name) = &patch.name {
        require(name, "name")?;
    }

    let current = get_group(conn, id)?;
    if patch.is_empty() {
        return Ok(current);
    }

    let updated_at = timefmt::after(current.updated_at);
    conn.execute(
        "UPDATE chat_groups
         SET name = COALESCE(?1, name),
             description = COALESCE(?2, description),
             updated_at = ?3
         WHERE id = ?4 AND deleted_at IS NULL",
        params![
            patch.name.as_deref().map(str::trim),
            patch.description,
            timefmt::format(updated_at),
            id
        ],
    )?;

    get_group(conn, id)
}

pub fn soft_delete_group(conn: &Connection, id: &str) -> Result<(), StoreError> {
    get_group(conn, id)?;
    let stamp = timefmt::format(timefmt::now());

    conn.execute(
        "DELETE FROM chat_reactions
         WHERE message_id IN (SELECT id FROM chat_messages WHERE group_id = ?1)",
        [id],
    )?;
    conn.execute("DELETE FROM chat_last_read WHERE group_id = ?1", [id])?;
    conn.execute("DELETE FROM chat_group_members WHERE group_id = ?1", [id])?;
    conn.execute(
        "UPDATE chat_messages SET deleted_at = ?1 WHERE group_id = ?2 AND deleted_at IS NULL",
        params![stamp, id],
    )?;
    conn.execute(
        "UPDATE chat_groups SET deleted_at = ?1 WHERE id = ?2 AND deleted_at IS NULL",
        params![stamp, id],
    )?;
    Ok(())
}

pub fn list_groups_by_trip(
    conn: &Connection,
    trip_id: &str,
    page: PageRequest,
) -> Result<Page<ChatGroup>, StoreError> {
    let limit = page.effective_limit();
    let total: i64 = conn.query_row(
        "SELECT COUNT(*) FROM chat_groups WHERE trip_id = ?1 AND deleted_at IS NULL",
        [trip_id],
        |r| r.get(0),
    )?;

    let sql = format!(
        "SELECT {} FROM chat_groups
         WHERE trip_id = ?1 AND deleted_at IS NULL
         ORDER BY created_at DESC, id DESC
         LIMIT ?2 OFFSET ?3",
        GroupRow::COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![trip_id, limit, offset_param(page.offset)], GroupRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Page {
        items: rows.into_iter().map(ChatGroup::try_from).collect::<Result<_, _>>()?,
        total: total.max(0) as u64,
        limit,
        offset: page.offset,
    })
}

// -- Members --

pub fn insert_member(conn: &Connection, group_id: &str, user_id: &str) -> Result<bool, StoreError> {
    require(user_id, "user_id")?;
    get_group(conn, group_id)?;

    let changed = conn.execute(
        "INSERT INTO chat_group_members (group_id, user_id, joined_at)
         VALUES (?1, ?2, ?3)
         ON CONFLICT (group_id, user_id) DO NOTHING",
        params![group_id, user_id, timefmt::format(timefmt::now())],
    )?;
    Ok(changed == 1)
}

pub fn delete_member(conn: &Connection, group_id: &str, user_id: &str) -> Result<bool, StoreError> {
    get_group(conn, group_id)?;

    let removed = conn.execute(
        "DELETE FROM chat_group_members WHERE group_id = ?1 AND user_id = ?2",
        [group_id, user_id],
    )?;
    conn.execute(
        "DELETE FROM chat_last_read WHERE group_id = ?1 AND user_id = ?2",
        [group_id, user_id],
    )?;
    Ok(removed == 1)
}

pub fn list_members(conn: &Connection, group_id: &str) -> Result<Vec<GroupMember>, StoreError> {
    get_group(conn, group_id)?;

    let mut stmt = conn.prepare(
        "SELECT group_id, user_id, joined_at FROM chat_group_members
         WHERE group_id = ?1
         ORDER BY joined_at, user_id",
    )?;
    let rows = stmt
        .query_map([group_id], |row| {
            Ok(MemberRow {
                group_id: row.get(0)?,
                user_id: row.get(1)?,
                joined_at: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter().map(GroupMember::try_from).collect()
}

// -- Messages --

pub fn insert_message(conn: &Connection, message: &NewMessage) -> Result<ChatMessage, StoreError> {
    require(&message.user_id, "user_id")?;
    require(&message.content, "content")?;
    let group = get_group(conn, &message.group_id)?;

    // Strictly increasing per group, so list order equals insertion order.
    let last: Option<String> = conn.query_row(
        "SELECT MAX(created_at) FROM chat_messages WHERE group_id = ?1",
        [&message.group_id],
        |r| r.get(0),
    )?;
    let created_at = match timefmt::parse_opt(last)? {
        Some(prev) => timefmt::after(prev),
        None => timefmt::now(),
    };
    let stamp = timefmt::format(created_at);
    let id = Uuid::new_v4().to_string();

    conn.execute(
        "INSERT INTO chat_messages
            (id, group_id, trip_id, user_id, content, content_type, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
        params![
            id,
            message.group_id,
            group.trip_id,
            message.user_id,
            message.content,
            message.content_type.as_str(),
            stamp
        ],
    )?;

    get_message(conn, &id)
}

fn get_message_any(conn: &Connection, id: &str) -> Result<Option<ChatMessage>, StoreError> {
    let sql = format!("SELECT {} FROM chat_messages WHERE id = ?1", MessageRow::COLUMNS);
    conn.query_row(&sql, [id], MessageRow::from_row)
        .optional()?
        .map(ChatMessage::try_from)
        .transpose()
}

pub fn get_message(conn: &Connection, id: &str) -> Result<ChatMessage, StoreError> {
    match get_message_any(conn, id)? {
        Some(message) if message.deleted_at.is_none() => Ok(message),
        _ => Err(StoreError::NotFound(format!("chat message {id}"))),
    }
}

pub fn update_message(conn: &Connection, id: &str, content: &str) -> Result<ChatMessage, StoreError> {
    require(content, "content")?;
    let current = get_message(conn, id)?;

    let updated_at = timefmt::after(current.updated_at.max(current.created_at));
    conn.execute(
        "UPDATE chat_messages SET content = ?1, updated_at = ?2
         WHERE id = ?3 AND deleted_at IS NULL",
        params![content, timefmt::format(updated_at), id],
    )?;

    get_message(conn, id)
}

pub fn soft_delete_message(conn: &Connection, id: &str) -> Result<ChatMessage, StoreError> {
    let mut message = get_message(conn, id)?;
    let now = timefmt::now();

    conn.execute("DELETE FROM chat_reactions WHERE message_id = ?1", [id])?;
    conn.execute(
        "UPDATE chat_messages SET deleted_at = ?1 WHERE id = ?2 AND deleted_at IS NULL",
        params![timefmt::format(now), id],
    )?;

    message.deleted_at = Some(now);
    Ok(message)
}

pub fn list_messages(
    conn: &Connection,
    group_id: &str,
    page: PageRequest,
) -> Result<Page<ChatMessage>, StoreError> {
    get_group(conn, group_id)?;

    let limit = page.effective_limit();
    let total: i64 = conn.query_row(
        "SELECT COUNT(*) FROM chat_messages WHERE group_id = ?1 AND deleted_at IS NULL",
        [group_id],
        |r| r.get(0),
    )?;

    let sql = format!(
        "SELECT {} FROM chat_messages
         WHERE group_id = ?1 AND deleted_at IS NULL
         ORDER BY created_at DESC, id DESC
         LIMIT ?2 OFFSET ?3",
        MessageRow::COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![group_id, limit, offset_param(page.offset)], MessageRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Page {
        items: rows.into_iter().map(ChatMessage::try_from).collect::<Result<_, _>>()?,
        total: total.max(0) as u64,
        limit,
        offset: page.offset,
    })
}

// -- Reactions --

fn validate_symbol(symbol: &str) -> Result<(), StoreError> {
    require(symbol, "reaction")?;
    if symbol.len() > MAX_SYMBOL_LEN {
        return Err(StoreError::InvalidArgument(format!(
            "reaction longer than {MAX_SYMBOL_LEN} bytes"
        )));
    }
    Ok(())
}

pub fn insert_reaction(
    conn: &Connection,
    message_id: &str,
    user_id: &str,
    symbol: &str,
) -> Result<bool, StoreError> {
    validate_symbol(symbol)?;
    get_message(conn, message_id)?;

    let changed = conn.execute(
        "INSERT INTO chat_reactions (message_id, user_id, reaction, created_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT (message_id, user_id, reaction) DO NOTHING",
        params![message_id, user_id, symbol, timefmt::format(timefmt::now())],
    )?;
    Ok(changed == 1)
}

pub fn delete_reaction(
    conn: &Connection,
    message_id: &str,
    user_id: &str,
    symbol: &str,
) -> Result<bool, StoreError> {
    validate_symbol(symbol)?;
    get_message(conn, message_id)?;

    let removed = conn.execute(
        "DELETE FROM chat_reactions WHERE message_id = ?1 AND user_id = ?2 AND reaction = ?3",
        [message_id, user_id, symbol],
    )?;
    Ok(removed == 1)
}

/// Batch-fetch reactions for a set of message IDs.
pub fn list_reactions(conn: &Connection, message_ids: &[String]) -> Result<Vec<Reaction>, StoreError> {
    if message_ids.is_empty() {
        return Ok(vec![]);
    }

    let placeholders: Vec<String> = (1..=message_ids.len()).map(|i| format!("?{i}")).collect();
    let sql = format!(
        "SELECT message_id, user_id, reaction, created_at FROM chat_reactions
         WHERE message_id IN ({})
         ORDER BY created_at, user_id, reaction",
        placeholders.join(", ")
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(message_ids.iter()), |row| {
            Ok(ReactionRow {
                message_id: row.get(0)?,
                user_id: row.get(1)?,
                reaction: row.get(2)?,
                created_at: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter().map(Reaction::try_from).collect()
}

// -- Read cursors --

pub fn upsert_last_read(
    conn: &Connection,
    group_id: &str,
    user_id: &str,
    message_id: &str,
) -> Result<ReadCursor, StoreError> {
    require(user_id, "user_id")?;
    get_group(conn, group_id)?;
    let message = get_message(conn, message_id)?;
    if message.group_id != group_id {
        return Err(StoreError::Conflict(format!(
            "message {message_id} does not belong to group {group_id}"
        )));
    }

    let stamp = timefmt::format(timefmt::now());
    conn.execute(
        "INSERT INTO chat_last_read (group_id, user_id, last_read_message_id, updated_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT (group_id, user_id) DO UPDATE
         SET last_read_message_id = excluded.last_read_message_id,
             updated_at = excluded.updated_at",
        params![group_id, user_id, message_id, stamp],
    )?;

    get_read_cursor(conn, group_id, user_id)?
        .ok_or_else(|| StoreError::Internal("read cursor vanished after upsert".into()))
}

pub fn get_read_cursor(
    conn: &Connection,
    group_id: &str,
    user_id: &str,
) -> Result<Option<ReadCursor>, StoreError> {
    conn.query_row(
        "SELECT group_id, user_id, last_read_message_id, updated_at FROM chat_last_read
         WHERE group_id = ?1 AND user_id = ?2",
        [group_id, user_id],
        |row| {
            Ok(LastReadRow {
                group_id: row.get(0)?,
                user_id: row.get(1)?,
                last_read_message_id: row.get(2)?,
                updated_at: row.get(3)?,
            })
        },
    )
    .optional()?
    .map(ReadCursor::try_from)
    .transpose()
}

pub fn count_unread(
    conn: &Connection,
    group_id: &str,
    after_message_id: Option<&str>,
) -> Result<u64, StoreError> {
    get_group(conn, group_id)?;

    // The cursor may point at a message deleted since; its position still counts.
    let anchor = match after_message_id {
        Some(id) => get_message_any(conn, id)?,
        None => None,
    };

    let count: i64 = match anchor {
        Some(anchor) => conn.query_row(
            "SELECT COUNT(*) FROM chat_messages
             WHERE group_id = ?1 AND deleted_at IS NULL
               AND (created_at > ?2 OR (created_at = ?2 AND id > ?3))",
            params![group_id, timefmt::format(anchor.created_at), anchor.id],
            |r| r.get(0),
        )?,
        None => conn.query_row(
            "SELECT COUNT(*) FROM chat_messages WHERE group_id = ?1 AND deleted_at IS NULL",
            [group_id],
            |r| r.get(0),
        )?,
    };
    Ok(count.max(0) as u64)
}

fn offset_param(offset: u64) -> i64 {
    i64::try_from(offset).unwrap_or(i64::MAX)
}

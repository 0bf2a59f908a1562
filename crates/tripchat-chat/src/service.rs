use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use tripchat_db::queries::MAX_SYMBOL_LEN;
use tripchat_db::{ChatStore, StoreTx};
use tripchat_gateway::{EventPublisher, PublishError};
use tripchat_types::api::{Page, PageRequest};
use tripchat_types::events::{
    ChatEvent, ChatEventPayload, GroupRef, LastReadPayload, MemberPayload, MessagePayload,
    MessageRef, ReactionPayload,
};
use tripchat_types::models::{
    ChatGroup, ChatMessage, ContentType, GroupMember, GroupPatch, MessageView, NewGroup,
    NewMessage, Reaction, ReactionGroup, ReadCursor, ReadState, TripRole, UserProfile,
};

use crate::context::RequestContext;
use crate::error::ChatError;
use crate::policy;
use crate::profiles::ProfileLookup;
use crate::sequencer::{GroupSequencer, GroupTurn};
use crate::trips::TripDirectory;

/// Upper bound on handing one event to the publisher.
pub const DEFAULT_EMIT_TIMEOUT: Duration = Duration::from_millis(500);

pub struct ChatService {
    store: Arc<dyn ChatStore>,
    trips: Arc<dyn TripDirectory>,
    publisher: Arc<dyn EventPublisher>,
    profiles: Option<Arc<dyn ProfileLookup>>,
    sequencer: GroupSequencer,
    emit_timeout: Duration,
}

fn actor_of(ctx: &RequestContext) -> Result<&str, ChatError> {
    let user_id = ctx.user_id();
    if user_id.trim().is_empty() {
        return Err(ChatError::Unauthorized("no user in request context".into()));
    }
    Ok(user_id)
}

fn require(value: &str, what: &str) -> Result<(), ChatError> {
    if value.trim().is_empty() {
        return Err(ChatError::invalid(format!("{what} must not be empty")));
    }
    Ok(())
}

fn require_symbol(symbol: &str) -> Result<(), ChatError> {
    require(symbol, "reaction")?;
    if symbol.len() > MAX_SYMBOL_LEN {
        return Err(ChatError::invalid(format!(
            "reaction longer than {MAX_SYMBOL_LEN} bytes"
        )));
    }
    Ok(())
}

type BuildPayload = Box<dyn FnOnce(Option<UserProfile>) -> ChatEventPayload + Send>;

/// Event to publish once a transaction has committed.
struct Emission {
    trip_id: String,
    actor: String,
    /// User whose profile decorates the payload.
    subject: Option<String>,
    build: BuildPayload,
}

impl Emission {
    fn new(trip_id: &str, actor: &str, payload: ChatEventPayload) -> Self {
        Self {
            trip_id: trip_id.to_string(),
            actor: actor.to_string(),
            subject: None,
            build: Box::new(move |_| payload),
        }
    }

    fn profiled(
        trip_id: &str,
        actor: &str,
        subject: &str,
        build: impl FnOnce(Option<UserProfile>) -> ChatEventPayload + Send + 'static,
    ) -> Self {
        Self {
            trip_id: trip_id.to_string(),
            actor: actor.to_string(),
            subject: Some(subject.to_string()),
            build: Box::new(build),
        }
    }
}

async fn lookup_profile(
    profiles: Option<&dyn ProfileLookup>,
    user_id: &str,
    timeout: Duration,
) -> Option<UserProfile> {
    let profiles = profiles?;
    match tokio::time::timeout(timeout, profiles.profile(user_id)).await {
        Ok(Ok(profile)) => profile,
        Ok(Err(e)) => {
            warn!(user_id, "profile lookup failed: {}", e);
            None
        }
        Err(_) => {
            warn!(user_id, "profile lookup timed out");
            None
        }
    }
}

/// Encode the event, hand it to the publisher and log the outcome.
async fn publish(
    publisher: &dyn EventPublisher,
    timeout: Duration,
    emission: Emission,
    user: Option<UserProfile>,
) {
    let payload = (emission.build)(user);
    let event_type = payload.event_type();
    let event = match ChatEvent::new(
        Uuid::new_v4().to_string(),
        &emission.trip_id,
        &emission.actor,
        &payload,
    ) {
        Ok(event) => event,
        Err(e) => {
            error!(
                trip_id = %emission.trip_id,
                event_type = event_type.as_str(),
                "failed to encode chat event: {}",
                e
            );
            return;
        }
    };

    match deliver(publisher, timeout, &event).await {
        Ok(()) => debug!(
            trip_id = %event.trip_id,
            event_id = %event.id,
            event_type = event.event_type.as_str(),
            "chat event emitted"
        ),
        Err(e) => error!(
            trip_id = %event.trip_id,
            event_id = %event.id,
            event_type = event.event_type.as_str(),
            "failed to publish chat event: {}",
            e
        ),
    }
}

async fn deliver(
    publisher: &dyn EventPublisher,
    timeout: Duration,
    event: &ChatEvent,
) -> Result<(), PublishError> {
    tokio::time::timeout(timeout, publisher.publish(&event.trip_id, event))
        .await
        .unwrap_or(Err(PublishError::Timeout))
}

impl ChatService {
    pub fn new(
        store: Arc<dyn ChatStore>,
        trips: Arc<dyn TripDirectory>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            store,
            trips,
            publisher,
            profiles: None,
            sequencer: GroupSequencer::new(),
            emit_timeout: DEFAULT_EMIT_TIMEOUT,
        }
    }

    pub fn with_profiles(mut self, profiles: Arc<dyn ProfileLookup>) -> Self {
        self.profiles = Some(profiles);
        self
    }

    pub fn with_emit_timeout(mut self, timeout: Duration) -> Self {
        self.emit_timeout = timeout;
        self
    }

    // -- Groups --

    pub async fn create_group(
        &self,
        ctx: &RequestContext,
        trip_id: &str,
        name: &str,
        description: Option<&str>,
    ) -> Result<ChatGroup, ChatError> {
        let actor = actor_of(ctx)?;
        require(trip_id, "trip_id")?;
        require(name, "name")?;

        let role = self.role(ctx, trip_id, actor).await?;
        if !policy::can_create_group(role) {
            return Err(ChatError::forbidden("only trip owners and admins can create groups"));
        }

        let new_group = NewGroup {
            trip_id: trip_id.to_string(),
            name: name.trim().to_string(),
            description: description.map(str::to_string),
            created_by: actor.to_string(),
        };
        let (tx, turn, group) = ctx
            .run(async {
                let mut tx = self.store.begin().await?;
                let group = tx.create_group(&new_group).await?;
                tx.add_member(&group.id, actor).await?;
                // Uncontended: nobody else knows the id before commit.
                let turn = self.sequencer.acquire(&group.id).await;
                Ok::<_, ChatError>((tx, turn, group))
            })
            .await?;
        let emission = Emission::new(trip_id, actor, ChatEventPayload::GroupCreated(group.clone()));
        self.settle(tx, turn, Some(emission)).await?;

        info!(trip_id, group_id = %group.id, user_id = actor, "chat group created");
        Ok(group)
    }

    pub async fn get_group(
        &self,
        ctx: &RequestContext,
        group_id: &str,
    ) -> Result<ChatGroup, ChatError> {
        let (group, _) = self.group_access(ctx, group_id).await?;
        Ok(group)
    }

    pub async fn update_group(
        &self,
        ctx: &RequestContext,
        group_id: &str,
        patch: &GroupPatch,
    ) -> Result<ChatGroup, ChatError> {
        let actor = actor_of(ctx)?;
        if let Some(name) = &patch.name {
            require(name, "name")?;
        }

        let (group, role) = self.group_access(ctx, group_id).await?;
        if !policy::can_update_group(role) {
            return Err(ChatError::forbidden("only trip owners and admins can update groups"));
        }
        if patch.is_empty() {
            return Ok(group);
        }

        let turn = self.turn(ctx, &group.id).await?;
        let (tx, updated) = ctx
            .run(async {
                let mut tx = self.store.begin().await?;
                let updated = tx.update_group(&group.id, patch).await?;
                Ok::<_, ChatError>((tx, updated))
            })
            .await?;
        let payload = ChatEventPayload::GroupUpdated(updated.clone());
        self.settle(tx, turn, Some(Emission::new(&group.trip_id, actor, payload)))
            .await?;

        info!(group_id = %group.id, user_id = actor, "chat group updated");
        Ok(updated)
    }

    pub async fn delete_group(&self, ctx: &RequestContext, group_id: &str) -> Result<(), ChatError> {
        let actor = actor_of(ctx)?;
        let (group, role) = self.group_access(ctx, group_id).await?;
        if !policy::can_manage_group(role, group.created_by == actor) {
            return Err(ChatError::forbidden("not allowed to delete this group"));
        }

        let turn = self.turn(ctx, &group.id).await?;
        let tx = ctx
            .run(async {
                let mut tx = self.store.begin().await?;
                tx.delete_group(&group.id).await?;
                Ok::<_, ChatError>(tx)
            })
            .await?;
        let payload = ChatEventPayload::GroupDeleted(GroupRef {
            group_id: group.id.clone(),
        });
        self.settle(tx, turn, Some(Emission::new(&group.trip_id, actor, payload)))
            .await?;

        info!(group_id = %group.id, user_id = actor, "chat group deleted");
        Ok(())
    }

    pub async fn list_trip_groups(
        &self,
        ctx: &RequestContext,
        trip_id: &str,
        page: PageRequest,
    ) -> Result<Page<ChatGroup>, ChatError> {
        let actor = actor_of(ctx)?;
        require(trip_id, "trip_id")?;

        let role = self.role(ctx, trip_id, actor).await?;
        if !policy::can_read_group(role) {
            return Err(ChatError::forbidden("not a member of this trip"));
        }
        ctx.run(async { Ok(self.store.list_groups_by_trip(trip_id, page).await?) })
            .await
    }

    // -- Members --

    /// Returns `true` if the target was not already a member.
    pub async fn add_member(
        &self,
        ctx: &RequestContext,
        group_id: &str,
        target_user_id: &str,
    ) -> Result<bool, ChatError> {
        let actor = actor_of(ctx)?;
        require(target_user_id, "user_id")?;

        let (group, role) = self.group_access(ctx, group_id).await?;
        if !policy::can_manage_group(role, group.created_by == actor) {
            return Err(ChatError::forbidden("not allowed to add members to this group"));
        }
        let target_role = self.role(ctx, &group.trip_id, target_user_id).await?;
        if !target_role.is_member() {
            return Err(ChatError::invalid(format!(
                "user {target_user_id} is not a member of the trip"
            )));
        }

        let turn = self.turn(ctx, &group.id).await?;
        let (tx, added) = ctx
            .run(async {
                let mut tx = self.store.begin().await?;
                let added = tx.add_member(&group.id, target_user_id).await?;
                Ok::<_, ChatError>((tx, added))
            })
            .await?;
        let emission = added.then(|| {
            let (group_id, user_id) = (group.id.clone(), target_user_id.to_string());
            Emission::profiled(&group.trip_id, actor, target_user_id, move |user| {
                ChatEventPayload::MemberAdded(MemberPayload {
                    group_id,
                    user_id,
                    user,
                })
            })
        });
        self.settle(tx, turn, emission).await?;

        if added {
            info!(group_id = %group.id, user_id = target_user_id, actor, "member added");
        }
        Ok(added)
    }

    /// Returns `true` if the target was a member. Drops the target's read
    /// cursor for the group.
    pub async fn remove_member(
        &self,
        ctx: &RequestContext,
        group_id: &str,
        target_user_id: &str,
    ) -> Result<bool, ChatError> {
        let actor = actor_of(ctx)?;
        require(target_user_id, "user_id")?;

        let (group, role) = self.group_access(ctx, group_id).await?;
        if !policy::can_remove_member(role, group.created_by == actor, actor == target_user_id) {
            return Err(ChatError::forbidden("not allowed to remove members from this group"));
        }

        let turn = self.turn(ctx, &group.id).await?;
        let (tx, removed) = ctx
            .run(async {
                let mut tx = self.store.begin().await?;
                let removed = tx.remove_member(&group.id, target_user_id).await?;
                Ok::<_, ChatError>((tx, removed))
            })
            .await?;
        let emission = removed.then(|| {
            let (group_id, user_id) = (group.id.clone(), target_user_id.to_string());
            Emission::profiled(&group.trip_id, actor, target_user_id, move |user| {
                ChatEventPayload::MemberRemoved(MemberPayload {
                    group_id,
                    user_id,
                    user,
                })
            })
        });
        self.settle(tx, turn, emission).await?;

        if removed {
            info!(group_id = %group.id, user_id = target_user_id, actor, "member removed");
        }
        Ok(removed)
    }

    pub async fn list_members(
        &self,
        ctx: &RequestContext,
        group_id: &str,
    ) -> Result<Vec<GroupMember>, ChatError> {
        let (group, _) = self.group_access(ctx, group_id).await?;
        ctx.run(async { Ok(self.store.list_members(&group.id).await?) })
            .await
    }

    // -- Messages --

    pub async fn post_message(
        &self,
        ctx: &RequestContext,
        group_id: &str,
        content: &str,
    ) -> Result<MessageView, ChatError> {
        let actor = actor_of(ctx)?;
        require(content, "content")?;

        let (group, role) = self.group_access(ctx, group_id).await?;
        if !policy::can_post(role) {
            return Err(ChatError::forbidden("not allowed to post in this group"));
        }

        let new_message = NewMessage {
            group_id: group.id.clone(),
            user_id: actor.to_string(),
            content: content.to_string(),
            content_type: ContentType::Text,
        };
        let turn = self.turn(ctx, &group.id).await?;
        let (tx, message) = ctx
            .run(async {
                let mut tx = self.store.begin().await?;
                let message = tx.create_message(&new_message).await?;
                Ok::<_, ChatError>((tx, message))
            })
            .await?;
        let created = message.clone();
        let emission = Emission::profiled(&message.trip_id, actor, actor, move |user| {
            ChatEventPayload::MessageCreated(MessagePayload {
                message: created,
                user,
            })
        });
        let user = self.settle(tx, turn, Some(emission)).await?;

        debug!(group_id = %group.id, message_id = %message.id, user_id = actor, "message posted");
        Ok(MessageView {
            message,
            user,
            reactions: Vec::new(),
        })
    }

    pub async fn get_message(
        &self,
        ctx: &RequestContext,
        message_id: &str,
    ) -> Result<MessageView, ChatError> {
        let (message, _) = self.message_access(ctx, message_id).await?;
        let mut views = ctx.run(self.decorate(vec![message])).await?;
        views
            .pop()
            .ok_or_else(|| ChatError::Internal("message view missing".into()))
    }

    /// Author, or a trip owner/admin, may edit.
    pub async fn update_message(
        &self,
        ctx: &RequestContext,
        message_id: &str,
        content: &str,
    ) -> Result<MessageView, ChatError> {
        let actor = actor_of(ctx)?;
        require(content, "content")?;

        let (message, role) = self.message_access(ctx, message_id).await?;
        if !policy::can_modify_message(role, message.user_id == actor) {
            return Err(ChatError::forbidden("only the author or a trip admin can edit this message"));
        }

        let turn = self.turn(ctx, &message.group_id).await?;
        let (tx, updated) = ctx
            .run(async {
                let mut tx = self.store.begin().await?;
                let updated = tx.update_message(&message.id, content).await?;
                Ok::<_, ChatError>((tx, updated))
            })
            .await?;
        let edited = updated.clone();
        let emission = Emission::profiled(&updated.trip_id, actor, &updated.user_id, move |user| {
            ChatEventPayload::MessageUpdated(MessagePayload {
                message: edited,
                user,
            })
        });
        self.settle(tx, turn, Some(emission)).await?;

        debug!(message_id = %updated.id, user_id = actor, "message edited");

        let mut views = self.decorate(vec![updated]).await?;
        views
            .pop()
            .ok_or_else(|| ChatError::Internal("message view missing".into()))
    }

    /// Author, or a trip owner/admin, may delete.
    pub async fn delete_message(
        &self,
        ctx: &RequestContext,
        message_id: &str,
    ) -> Result<(), ChatError> {
        let actor = actor_of(ctx)?;
        let (message, role) = self.message_access(ctx, message_id).await?;
        if !policy::can_modify_message(role, message.user_id == actor) {
            return Err(ChatError::forbidden(
                "only the author or a trip admin can delete this message",
            ));
        }

        let turn = self.turn(ctx, &message.group_id).await?;
        let tx = ctx
            .run(async {
                let mut tx = self.store.begin().await?;
                tx.delete_message(&message.id).await?;
                Ok::<_, ChatError>(tx)
            })
            .await?;
        let payload = ChatEventPayload::MessageDeleted(MessageRef {
            message_id: message.id.clone(),
            group_id: message.group_id.clone(),
        });
        self.settle(tx, turn, Some(Emission::new(&message.trip_id, actor, payload)))
            .await?;

        debug!(message_id = %message.id, user_id = actor, "message deleted");
        Ok(())
    }

    /// Newest first, each message with its author and folded reactions.
    pub async fn list_messages(
        &self,
        ctx: &RequestContext,
        group_id: &str,
        page: PageRequest,
    ) -> Result<Page<MessageView>, ChatError> {
        let (group, _) = self.group_access(ctx, group_id).await?;
        let Page {
            items,
            total,
            limit,
            offset,
        } = ctx
            .run(async { Ok(self.store.list_messages(&group.id, page).await?) })
            .await?;

        let items = ctx.run(self.decorate(items)).await?;
        Ok(Page {
            items,
            total,
            limit,
            offset,
        })
    }

    // -- Reactions --

    /// Returns `true` if the reaction was new.
    pub async fn add_reaction(
        &self,
        ctx: &RequestContext,
        message_id: &str,
        symbol: &str,
    ) -> Result<bool, ChatError> {
        let actor = actor_of(ctx)?;
        require_symbol(symbol)?;

        let (message, _) = self.message_access(ctx, message_id).await?;
        let turn = self.turn(ctx, &message.group_id).await?;
        let (tx, added) = ctx
            .run(async {
                let mut tx = self.store.begin().await?;
                let added = tx.add_reaction(&message.id, actor, symbol).await?;
                Ok::<_, ChatError>((tx, added))
            })
            .await?;
        let emission = added.then(|| {
            let payload = ChatEventPayload::ReactionAdded(ReactionPayload {
                message_id: message.id.clone(),
                reaction: symbol.to_string(),
            });
            Emission::new(&message.trip_id, actor, payload)
        });
        self.settle(tx, turn, emission).await?;
        Ok(added)
    }

    /// Returns `true` if a reaction was removed.
    pub async fn remove_reaction(
        &self,
        ctx: &RequestContext,
        message_id: &str,
        symbol: &str,
    ) -> Result<bool, ChatError> {
        let actor = actor_of(ctx)?;
        require_symbol(symbol)?;

        let (message, _) = self.message_access(ctx, message_id).await?;
        let turn = self.turn(ctx, &message.group_id).await?;
        let (tx, removed) = ctx
            .run(async {
                let mut tx = self.store.begin().await?;
                let removed = tx.remove_reaction(&message.id, actor, symbol).await?;
                Ok::<_, ChatError>((tx, removed))
            })
            .await?;
        let emission = removed.then(|| {
            let payload = ChatEventPayload::ReactionRemoved(ReactionPayload {
                message_id: message.id.clone(),
                reaction: symbol.to_string(),
            });
            Emission::new(&message.trip_id, actor, payload)
        });
        self.settle(tx, turn, emission).await?;
        Ok(removed)
    }

    pub async fn list_reactions(
        &self,
        ctx: &RequestContext,
        message_id: &str,
    ) -> Result<Vec<Reaction>, ChatError> {
        let (message, _) = self.message_access(ctx, message_id).await?;
        ctx.run(async { Ok(self.store.list_reactions(&[message.id.clone()]).await?) })
            .await
    }

    // -- Read cursors --

    /// Move the caller's cursor. The message must belong to the group.
    pub async fn update_last_read(
        &self,
        ctx: &RequestContext,
        group_id: &str,
        message_id: &str,
    ) -> Result<ReadCursor, ChatError> {
        let actor = actor_of(ctx)?;
        require(message_id, "message_id")?;

        let (group, _) = self.group_access(ctx, group_id).await?;
        let turn = self.turn(ctx, &group.id).await?;
        let (tx, cursor) = ctx
            .run(async {
                let mut tx = self.store.begin().await?;
                let cursor = tx.update_last_read(&group.id, actor, message_id).await?;
                Ok::<_, ChatError>((tx, cursor))
            })
            .await?;
        let payload = ChatEventPayload::LastReadUpdated(LastReadPayload {
            group_id: group.id.clone(),
            message_id: message_id.to_string(),
        });
        self.settle(tx, turn, Some(Emission::new(&group.trip_id, actor, payload)))
            .await?;
        Ok(cursor)
    }

    /// The caller's cursor and the number of live messages newer than it.
    pub async fn get_read_state(
        &self,
        ctx: &RequestContext,
        group_id: &str,
    ) -> Result<ReadState, ChatError> {
        let actor = actor_of(ctx)?;
        let (group, _) = self.group_access(ctx, group_id).await?;

        ctx.run(async {
            let cursor = self.store.get_read_cursor(&group.id, actor).await?;
            let after = cursor.as_ref().and_then(|c| c.last_read_message_id.as_deref());
            let unread_count = self.store.count_unread(&group.id, after).await?;
            Ok(ReadState {
                cursor,
                unread_count,
            })
        })
        .await
    }

    // -- Internals --

    async fn role(
        &self,
        ctx: &RequestContext,
        trip_id: &str,
        user_id: &str,
    ) -> Result<TripRole, ChatError> {
        ctx.run(async { Ok(self.trips.role_of(trip_id, user_id).await?) })
            .await
    }

    /// Load a live group and require the actor to hold a role on its trip.
    async fn group_access(
        &self,
        ctx: &RequestContext,
        group_id: &str,
    ) -> Result<(ChatGroup, TripRole), ChatError> {
        let actor = actor_of(ctx)?;
        require(group_id, "group_id")?;

        let group = ctx
            .run(async { Ok(self.store.get_group(group_id).await?) })
            .await?;
        let role = self.role(ctx, &group.trip_id, actor).await?;
        if !policy::can_read_group(role) {
            return Err(ChatError::forbidden("not a member of this trip"));
        }
        Ok((group, role))
    }

    /// Load a live message and require the actor to hold a role on its trip.
    async fn message_access(
        &self,
        ctx: &RequestContext,
        message_id: &str,
    ) -> Result<(ChatMessage, TripRole), ChatError> {
        let actor = actor_of(ctx)?;
        require(message_id, "message_id")?;

        let message = ctx
            .run(async { Ok(self.store.get_message(message_id).await?) })
            .await?;
        let role = self.role(ctx, &message.trip_id, actor).await?;
        if !policy::can_read_group(role) {
            return Err(ChatError::forbidden("not a member of this trip"));
        }
        Ok((message, role))
    }

    async fn turn(&self, ctx: &RequestContext, group_id: &str) -> Result<GroupTurn, ChatError> {
        ctx.run(async { Ok(self.sequencer.acquire(group_id).await) })
            .await
    }

    /// Attach folded reactions and author profiles. Not bound to the request
    /// context so it can run after a commit.
    async fn decorate(&self, messages: Vec<ChatMessage>) -> Result<Vec<MessageView>, ChatError> {
        if messages.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<String> = messages.iter().map(|m| m.id.clone()).collect();
        let reactions = self.store.list_reactions(&ids).await?;
        let mut by_message: HashMap<String, Vec<Reaction>> = HashMap::new();
        for reaction in reactions {
            by_message
                .entry(reaction.message_id.clone())
                .or_default()
                .push(reaction);
        }

        let mut authors: HashMap<String, Option<UserProfile>> = HashMap::new();
        if self.profiles.is_some() {
            for message in &messages {
                if !authors.contains_key(&message.user_id) {
                    let profile = lookup_profile(
                        self.profiles.as_deref(),
                        &message.user_id,
                        self.emit_timeout,
                    )
                    .await;
                    authors.insert(message.user_id.clone(), profile);
                }
            }
        }

        Ok(messages
            .into_iter()
            .map(|message| MessageView {
                reactions: by_message
                    .get(&message.id)
                    .map(|rows| ReactionGroup::fold(rows))
                    .unwrap_or_default(),
                user: authors.get(&message.user_id).cloned().flatten(),
                message,
            })
            .collect())
    }

    /// Commit `tx`, then publish `emission`, on a task of their own.
    ///
    /// A caller that goes away mid-commit does not stop the task, so a
    /// committed mutation still gets its event. The group's turn is released
    /// once the publisher has returned. Yields the decorating profile.
    async fn settle(
        &self,
        tx: Box<dyn StoreTx>,
        turn: GroupTurn,
        emission: Option<Emission>,
    ) -> Result<Option<UserProfile>, ChatError> {
        let publisher = self.publisher.clone();
        let profiles = self.profiles.clone();
        let timeout = self.emit_timeout;

        let task = tokio::spawn(async move {
            tx.commit().await?;
            let Some(mut emission) = emission else {
                return Ok(None);
            };
            let user = match emission.subject.take() {
                Some(user_id) => lookup_profile(profiles.as_deref(), &user_id, timeout).await,
                None => None,
            };
            publish(publisher.as_ref(), timeout, emission, user.clone()).await;
            drop(turn);
            Ok::<_, ChatError>(user)
        });

        task.await
            .map_err(|e| ChatError::Internal(format!("commit task failed: {e}")))?
    }
}

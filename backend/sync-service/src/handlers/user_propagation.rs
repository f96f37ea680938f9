//! Fans identity changes out to every collection holding a denormalized copy.
//!
//! Each write is best-effort: a failing collection is logged and the remaining ones are
//! still attempted. Re-applying the same values is a no-op, so redelivery is safe.

use async_trait::async_trait;
use event_schema::{DomainEvent, EventKind, IdentityDeleted, IdentityUpdated};
use tracing::{error, info};

use super::{EventHandler, HandlerContext};
use crate::error::SyncError;
use crate::store::Collection;

/// Where an identity is embedded: the collection, the field holding the user id and the
/// fields holding the copied nickname and avatar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmbeddedIdentity {
    pub collection: Collection,
    pub user_field: &'static str,
    pub nickname_field: &'static str,
    pub avatar_field: &'static str,
}

const fn embedded(
    collection: Collection,
    user_field: &'static str,
    nickname_field: &'static str,
    avatar_field: &'static str,
) -> EmbeddedIdentity {
    EmbeddedIdentity {
        collection,
        user_field,
        nickname_field,
        avatar_field,
    }
}

/// Copies rewritten on a profile change.
pub const PROFILE_COPIES: [EmbeddedIdentity; 6] = [
    embedded(Collection::Posts, "userId", "userNickname", "userAvatar"),
    embedded(Collection::Comments, "userId", "userNickname", "userAvatar"),
    embedded(Collection::UserFollows, "userId", "userNickname", "userAvatar"),
    embedded(
        Collection::UserFollows,
        "targetUserId",
        "targetUserNickname",
        "targetUserAvatar",
    ),
    embedded(
        Collection::Comments,
        "replyToUserId",
        "replyToUserNickname",
        "replyToUserAvatar",
    ),
    embedded(
        Collection::Notifications,
        "senderId",
        "senderNickname",
        "senderAvatar",
    ),
];

/// Copies anonymised in place when an account is deleted. Content stays, since other
/// users' engagement references it.
pub const ANONYMISED_COPIES: [EmbeddedIdentity; 3] = [
    embedded(Collection::Posts, "userId", "userNickname", "userAvatar"),
    embedded(Collection::Comments, "userId", "userNickname", "userAvatar"),
    embedded(
        Collection::Comments,
        "replyToUserId",
        "replyToUserNickname",
        "replyToUserAvatar",
    ),
];

/// Relationship and activity data removed outright when an account is deleted.
pub const PURGED: [(Collection, &str); 10] = [
    (Collection::UserFollows, "userId"),
    (Collection::UserFollows, "targetUserId"),
    (Collection::PostLikes, "userId"),
    (Collection::CommentLikes, "userId"),
    (Collection::PostCollects, "userId"),
    (Collection::PostRatings, "userId"),
    (Collection::Notifications, "receiverId"),
    (Collection::Notifications, "senderId"),
    (Collection::SearchHistories, "userId"),
    (Collection::PostViewHistories, "userId"),
];

pub struct UserPropagationHandler {
    ctx: HandlerContext,
}

impl UserPropagationHandler {
    pub fn new(ctx: HandlerContext) -> Self {
        Self { ctx }
    }

    /// Returns the number of failed writes.
    async fn rewrite(
        &self,
        targets: &[EmbeddedIdentity],
        user_id: i64,
        nickname: Option<&str>,
        avatar: Option<&str>,
    ) -> usize {
        let mut failures = 0;
        for target in targets {
            let mut updates = Vec::with_capacity(2);
            if let Some(nickname) = nickname {
                updates.push((target.nickname_field, nickname));
            }
            if let Some(avatar) = avatar {
                updates.push((target.avatar_field, avatar));
            }
            if updates.is_empty() {
                continue;
            }

            if let Err(err) = self
                .ctx
                .documents
                .update_by_user(target.collection, target.user_field, user_id, &updates)
                .await
            {
                failures += 1;
                error!(
                    user_id,
                    collection = %target.collection,
                    field = target.user_field,
                    error = %err,
                    "Failed to rewrite embedded identity"
                );
            }
        }
        failures
    }

    async fn on_updated(&self, update: &IdentityUpdated) {
        let nickname = update.display_name();
        let avatar = update.avatar_ref();
        if nickname.is_none() && avatar.is_none() {
            info!(user_id = update.user_id, "Identity update carries no profile fields");
            return;
        }

        let failures = self
            .rewrite(&PROFILE_COPIES, update.user_id, nickname, avatar)
            .await;
        info!(
            user_id = update.user_id,
            targets = PROFILE_COPIES.len(),
            failures,
            "Identity change propagated"
        );
    }

    async fn on_deleted(&self, deleted: &IdentityDeleted) {
        let user_id = deleted.user_id;
        let placeholder = &self.ctx.deleted_user;

        // Anonymise before purging so content never points at a vanished identity.
        let mut failures = self
            .rewrite(
                &ANONYMISED_COPIES,
                user_id,
                Some(placeholder.nickname.as_str()),
                Some(placeholder.avatar.as_str()),
            )
            .await;

        for (collection, field) in PURGED {
            if let Err(err) = self
                .ctx
                .documents
                .delete_by_user(collection, field, user_id)
                .await
            {
                failures += 1;
                error!(
                    user_id,
                    collection = %collection,
                    field,
                    error = %err,
                    "Failed to purge user data"
                );
            }
        }

        info!(user_id, failures, "Identity deletion cascaded");
    }
}

#[async_trait]
impl EventHandler for UserPropagationHandler {
    fn name(&self) -> &'static str {
        "user-propagation"
    }

    fn accepts(&self, kind: EventKind) -> bool {
        matches!(kind, EventKind::IdentityUpdated | EventKind::IdentityDeleted)
    }

    async fn handle(&self, event: &DomainEvent) -> Result<(), SyncError> {
        match event {
            DomainEvent::IdentityUpdated(update) => self.on_updated(update).await,
            DomainEvent::IdentityDeleted(deleted) => self.on_deleted(deleted).await,
            DomainEvent::ContentCreated(_)
            | DomainEvent::ContentAuditPassed(_)
            | DomainEvent::ContentUpdated(_)
            | DomainEvent::ContentDeleted(_)
            | DomainEvent::AuditLogEntry(_)
            | DomainEvent::SearchQueryIssued(_) => {}
        }
        Ok(())
    }
}

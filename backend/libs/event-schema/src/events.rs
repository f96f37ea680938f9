use serde::{Deserialize, Serialize};

use crate::RawTimestamp;

// ============================================================================
// EVENT KINDS
// ============================================================================

/// Closed set of event kinds understood by the consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    ContentCreated,
    ContentAuditPassed,
    ContentUpdated,
    ContentDeleted,
    IdentityUpdated,
    IdentityDeleted,
    AuditLogEntry,
    SearchQueryIssued,
}

impl EventKind {
    pub const ALL: [EventKind; 8] = [
        EventKind::ContentCreated,
        EventKind::ContentAuditPassed,
        EventKind::ContentUpdated,
        EventKind::ContentDeleted,
        EventKind::IdentityUpdated,
        EventKind::IdentityDeleted,
        EventKind::AuditLogEntry,
        EventKind::SearchQueryIssued,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::ContentCreated => "ContentCreated",
            EventKind::ContentAuditPassed => "ContentAuditPassed",
            EventKind::ContentUpdated => "ContentUpdated",
            EventKind::ContentDeleted => "ContentDeleted",
            EventKind::IdentityUpdated => "IdentityUpdated",
            EventKind::IdentityDeleted => "IdentityDeleted",
            EventKind::AuditLogEntry => "AuditLogEntry",
            EventKind::SearchQueryIssued => "SearchQueryIssued",
        }
    }

    /// Producer class names that map onto this kind, besides the canonical name.
    pub fn aliases(&self) -> &'static [&'static str] {
        match self {
            EventKind::ContentCreated => &["PostCreateEvent"],
            EventKind::ContentAuditPassed => &["PostAuditPassEvent"],
            EventKind::ContentUpdated => &["PostUpdateEvent"],
            EventKind::ContentDeleted => &["PostDeleteEvent"],
            EventKind::IdentityUpdated => &["UserUpdateEvent"],
            EventKind::IdentityDeleted => &["UserDeleteEvent"],
            EventKind::AuditLogEntry => &["ApiLogDoc", "LogEvent"],
            EventKind::SearchQueryIssued => &["UserSearchEvent"],
        }
    }

    /// Resolve a type descriptor such as `com.acme.platform.event.PostCreateEvent`.
    ///
    /// Only the final dotted segment is significant.
    pub fn from_type_id(descriptor: &str) -> Option<EventKind> {
        let name = descriptor.trim().rsplit('.').next()?;
        if name.is_empty() {
            return None;
        }
        EventKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == name || kind.aliases().contains(&name))
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// CONTENT EVENTS
// ============================================================================

/// Full snapshot of a newly created (or newly approved) piece of content.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentCreated {
    #[serde(alias = "postId", deserialize_with = "crate::id_string")]
    pub id: String,
    #[serde(alias = "userId", default, deserialize_with = "crate::nullable")]
    pub author_id: i64,
    #[serde(alias = "userNickname", default)]
    pub author_name: Option<String>,
    #[serde(alias = "userAvatar", default)]
    pub author_avatar: Option<String>,
    #[serde(default, deserialize_with = "crate::nullable")]
    pub title: String,
    #[serde(alias = "content", default, deserialize_with = "crate::nullable")]
    pub body: String,
    #[serde(default, deserialize_with = "crate::nullable")]
    pub tags: Vec<String>,
    /// 0 = text, 1 = images, 2 = video
    #[serde(alias = "type", default, deserialize_with = "crate::nullable")]
    pub content_type: i32,
    #[serde(alias = "images", default, deserialize_with = "crate::nullable")]
    pub media: Vec<String>,
    #[serde(default)]
    pub video: Option<String>,
    #[serde(alias = "cover", default)]
    pub cover_ref: Option<String>,
    #[serde(default, deserialize_with = "crate::nullable")]
    pub cover_width: i32,
    #[serde(default, deserialize_with = "crate::nullable")]
    pub cover_height: i32,
    #[serde(default)]
    pub created_at: Option<RawTimestamp>,
}

impl ContentCreated {
    /// Media references to index: the images, or the video when there are none.
    pub fn resources(&self) -> Vec<String> {
        if !self.media.is_empty() {
            return self.media.clone();
        }
        self.video
            .iter()
            .filter(|v| !v.trim().is_empty())
            .cloned()
            .collect()
    }
}

/// Pointer event: only the identity is carried, state must be re-read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentUpdated {
    #[serde(alias = "postId", deserialize_with = "crate::id_string")]
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentDeleted {
    #[serde(alias = "postId", deserialize_with = "crate::id_string")]
    pub id: String,
    #[serde(default)]
    pub operator_id: Option<i64>,
}

// ============================================================================
// IDENTITY EVENTS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityUpdated {
    pub user_id: i64,
    #[serde(alias = "newNickname", default)]
    pub new_display_name: Option<String>,
    #[serde(alias = "newAvatar", default)]
    pub new_avatar_ref: Option<String>,
}

impl IdentityUpdated {
    /// Display name to propagate, ignoring blank values.
    pub fn display_name(&self) -> Option<&str> {
        self.new_display_name
            .as_deref()
            .filter(|v| !v.trim().is_empty())
    }

    /// Avatar reference to propagate, ignoring blank values.
    pub fn avatar_ref(&self) -> Option<&str> {
        self.new_avatar_ref.as_deref().filter(|v| !v.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityDeleted {
    pub user_id: i64,
}

// ============================================================================
// AUXILIARY SINK EVENTS
// ============================================================================

/// One API access record emitted by the gateway.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogEntry {
    #[serde(default, deserialize_with = "crate::nullable")]
    pub trace_id: String,
    #[serde(alias = "logType", default, deserialize_with = "crate::nullable")]
    pub category: String,
    #[serde(default)]
    pub module: Option<String>,
    #[serde(default)]
    pub biz_id: Option<String>,
    #[serde(alias = "userId", default)]
    pub actor_id: Option<i64>,
    #[serde(alias = "username", default)]
    pub actor_name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(alias = "method", default, deserialize_with = "crate::nullable")]
    pub action: String,
    #[serde(alias = "uri", default, deserialize_with = "crate::nullable")]
    pub resource: String,
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub params: Option<String>,
    #[serde(alias = "status", default, deserialize_with = "crate::nullable")]
    pub outcome: i32,
    #[serde(alias = "timeCost", default, deserialize_with = "crate::nullable")]
    pub latency_ms: i64,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub error_msg: Option<String>,
    #[serde(alias = "createdAt", default)]
    pub timestamp: Option<RawTimestamp>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQueryIssued {
    #[serde(default, deserialize_with = "crate::nullable")]
    pub user_id: i64,
    #[serde(default, deserialize_with = "crate::nullable")]
    pub keyword: String,
}

// ============================================================================
// DOMAIN EVENT
// ============================================================================

/// Every decodable event. Consumers match this exhaustively.
#[derive(Debug, Clone, PartialEq)]
pub enum DomainEvent {
    ContentCreated(ContentCreated),
    ContentAuditPassed(ContentCreated),
    ContentUpdated(ContentUpdated),
    ContentDeleted(ContentDeleted),
    IdentityUpdated(IdentityUpdated),
    IdentityDeleted(IdentityDeleted),
    AuditLogEntry(AuditLogEntry),
    SearchQueryIssued(SearchQueryIssued),
}

impl DomainEvent {
    /// Decode a JSON body into the payload shape selected by `kind`.
    pub fn decode(kind: EventKind, body: &[u8]) -> Result<DomainEvent, serde_json::Error> {
        Ok(match kind {
            EventKind::ContentCreated => DomainEvent::ContentCreated(serde_json::from_slice(body)?),
            EventKind::ContentAuditPassed => {
                DomainEvent::ContentAuditPassed(serde_json::from_slice(body)?)
            }
            EventKind::ContentUpdated => DomainEvent::ContentUpdated(serde_json::from_slice(body)?),
            EventKind::ContentDeleted => DomainEvent::ContentDeleted(serde_json::from_slice(body)?),
            EventKind::IdentityUpdated => {
                DomainEvent::IdentityUpdated(serde_json::from_slice(body)?)
            }
            EventKind::IdentityDeleted => {
                DomainEvent::IdentityDeleted(serde_json::from_slice(body)?)
            }
            EventKind::AuditLogEntry => DomainEvent::AuditLogEntry(serde_json::from_slice(body)?),
            EventKind::SearchQueryIssued => {
                DomainEvent::SearchQueryIssued(serde_json::from_slice(body)?)
            }
        })
    }

    pub fn kind(&self) -> EventKind {
        match self {
            DomainEvent::ContentCreated(_) => EventKind::ContentCreated,
            DomainEvent::ContentAuditPassed(_) => EventKind::ContentAuditPassed,
            DomainEvent::ContentUpdated(_) => EventKind::ContentUpdated,
            DomainEvent::ContentDeleted(_) => EventKind::ContentDeleted,
            DomainEvent::IdentityUpdated(_) => EventKind::IdentityUpdated,
            DomainEvent::IdentityDeleted(_) => EventKind::IdentityDeleted,
            DomainEvent::AuditLogEntry(_) => EventKind::AuditLogEntry,
            DomainEvent::SearchQueryIssued(_) => EventKind::SearchQueryIssued,
        }
    }
}

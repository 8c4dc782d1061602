//! Domain model: alert cases, identities, session state.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::chat::{ConversationDirectory, ConversationId};
use crate::geocode::GeocodeCache;
use crate::notify::{NotificationPrefs, NotifySession};
use crate::pending::InFlightOps;
use crate::{AppError, ErrorKind, ValidatedCoordinate};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AlertId(pub String);

impl AlertId {
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short human-readable case code shown on certificates and in chat
    /// headers, the last seven characters of the id prefixed with `#`.
    #[must_use]
    pub fn case_code(&self) -> String {
        // Char boundary, not byte offset; ids come from the server and are
        // not guaranteed to be ASCII.
        let tail_start = self.0.char_indices().rev().nth(6).map_or(0, |(i, _)| i);
        format!("#{}", &self.0[tail_start..])
    }
}

impl fmt::Display for AlertId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Explicit timestamp unit.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnixTimeMs(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Species {
    Dog,
    Cat,
    Bird,
    Other,
}

impl Species {
    #[must_use]
    pub fn parse(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "dog" | "perro" => Some(Self::Dog),
            "cat" | "gato" => Some(Self::Cat),
            "bird" | "ave" => Some(Self::Bird),
            "other" | "otro" => Some(Self::Other),
            _ => None,
        }
    }

    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Dog => "dog",
            Self::Cat => "cat",
            Self::Bird => "bird",
            Self::Other => "other",
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Dog => "Dog",
            Self::Cat => "Cat",
            Self::Bird => "Bird",
            Self::Other => "Other",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    Injured,
    Lost,
    Abandoned,
    InDanger,
    NeedsAdoption,
    Sick,
}

impl Condition {
    #[must_use]
    pub fn parse(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "injured" | "herido" => Some(Self::Injured),
            "lost" | "perdido" => Some(Self::Lost),
            "abandoned" | "abandonado" => Some(Self::Abandoned),
            "in_danger" | "danger" | "en_peligro" => Some(Self::InDanger),
            "needs_adoption" | "adoption" | "en_adopcion" => Some(Self::NeedsAdoption),
            "sick" | "enfermo" => Some(Self::Sick),
            _ => None,
        }
    }

    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Injured => "injured",
            Self::Lost => "lost",
            Self::Abandoned => "abandoned",
            Self::InDanger => "in_danger",
            Self::NeedsAdoption => "needs_adoption",
            Self::Sick => "sick",
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Injured => "Injured",
            Self::Lost => "Lost",
            Self::Abandoned => "Abandoned",
            Self::InDanger => "In danger",
            Self::NeedsAdoption => "Needs adoption",
            Self::Sick => "Sick",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Open,
    Resolved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("Case is already resolved; resolution is irreversible")]
    AlreadyResolved,
}

impl From<TransitionError> for AppError {
    fn from(e: TransitionError) -> Self {
        AppError::new(ErrorKind::InvalidState, e.to_string())
    }
}

impl CaseStatus {
    /// The only legal transition is open to resolved; everything else is
    /// rejected, including resolved to resolved.
    pub const fn validate_transition(self, to: Self) -> Result<(), TransitionError> {
        match (self, to) {
            (Self::Open, Self::Resolved) => Ok(()),
            (Self::Resolved, _) | (Self::Open, Self::Open) => {
                Err(TransitionError::AlreadyResolved)
            }
        }
    }
}

/// Reference to an uploaded blob. The core never holds raw bytes.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct BlobRef {
    pub uri: String,
    pub size_bytes: Option<u64>,
}

impl BlobRef {
    #[must_use]
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            size_bytes: None,
        }
    }
}

/// Hierarchical storage path for an uploaded blob, `category/owner/filename`.
#[must_use]
pub fn blob_path(category: &str, owner: &str, filename: &str) -> String {
    format!("{category}/{owner}/{filename}")
}

/// Set exactly once, by the open to resolved transition.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Resolution {
    pub resolver: UserId,
    pub resolved_at: UnixTimeMs,
    pub certificate: BlobRef,
}

#[derive(Serialize, Deserialize, Clone, PartialEq)]
pub struct AlertCase {
    pub id: AlertId,
    pub position: ValidatedCoordinate,
    pub species_tag: String,
    pub condition_tag: String,
    pub description: String,
    pub address: Option<String>,
    pub photo: Option<BlobRef>,
    pub status: CaseStatus,
    pub reporter: UserId,
    pub created_at: UnixTimeMs,
    pub resolution: Option<Resolution>,
}

impl AlertCase {
    #[must_use]
    pub fn species(&self) -> Option<Species> {
        Species::parse(&self.species_tag)
    }

    #[must_use]
    pub fn condition(&self) -> Option<Condition> {
        Condition::parse(&self.condition_tag)
    }

    #[must_use]
    pub fn species_label(&self) -> String {
        self.species()
            .map_or_else(|| self.species_tag.clone(), |s| s.label().to_string())
    }

    #[must_use]
    pub fn condition_label(&self) -> String {
        self.condition()
            .map_or_else(|| self.condition_tag.clone(), |c| c.label().to_string())
    }

    /// Applies the single open to resolved transition. Resolver, timestamp
    /// and certificate are set together or not at all.
    pub fn resolve(&mut self, resolution: Resolution) -> Result<(), TransitionError> {
        self.status.validate_transition(CaseStatus::Resolved)?;
        self.status = CaseStatus::Resolved;
        self.resolution = Some(resolution);
        Ok(())
    }
}

// Redact free text and photo refs from debug output.
impl fmt::Debug for AlertCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlertCase")
            .field("id", &self.id)
            .field("species_tag", &self.species_tag)
            .field("condition_tag", &self.condition_tag)
            .field("status", &self.status)
            .field("description_present", &!self.description.is_empty())
            .field("photo_present", &self.photo.is_some())
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

/// A report being composed, before submission.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct ReportDraft {
    pub position: Option<ValidatedCoordinate>,
    pub species: Option<Species>,
    pub condition: Option<Condition>,
    pub description: String,
    pub address: Option<String>,
    pub photo: Option<BlobRef>,
}

impl ReportDraft {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.position.is_none() {
            return Err(AppError::new(
                ErrorKind::Validation,
                "Select the location of the animal on the map",
            ));
        }
        if self.species.is_none() {
            return Err(AppError::new(ErrorKind::Validation, "Select a species"));
        }
        if self.condition.is_none() {
            return Err(AppError::new(ErrorKind::Validation, "Select a condition"));
        }
        if self.description.trim().is_empty() {
            return Err(AppError::new(
                ErrorKind::Validation,
                "Describe the animal and its situation",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ToastKind {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToastMessage {
    pub kind: ToastKind,
    pub text: String,
}

impl ToastMessage {
    #[must_use]
    pub fn info(text: impl Into<String>) -> Self {
        Self {
            kind: ToastKind::Info,
            text: text.into(),
        }
    }

    #[must_use]
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            kind: ToastKind::Success,
            text: text.into(),
        }
    }

    #[must_use]
    pub fn error(text: impl Into<String>) -> Self {
        Self {
            kind: ToastKind::Error,
            text: text.into(),
        }
    }
}

/// Identity handed over by the shell after sign-in completes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: UserId,
    pub email: String,
    pub display_name: Option<String>,
}

/// Runtime-only secrets, never serialized.
#[derive(Default)]
pub struct RuntimeSecrets {
    pub session_token: Option<secrecy::SecretString>,
}

impl fmt::Debug for RuntimeSecrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeSecrets")
            .field("session_token_present", &self.session_token.is_some())
            .finish()
    }
}

/// The slice of the model that survives restarts, snapshotted to key-value
/// storage as CBOR.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct SessionSnapshot {
    pub prefs: NotificationPrefs,
    pub last_position: Option<ValidatedCoordinate>,
}

pub const SESSION_SNAPSHOT_KEY: &str = "session_snapshot_v1";

#[derive(Default)]
pub struct Model {
    pub api_base: String,

    // Identity
    pub user: Option<SessionUser>,
    pub secrets: RuntimeSecrets,

    // Geography
    pub current_position: Option<ValidatedCoordinate>,

    // Cases
    pub alerts: Vec<AlertCase>,
    pub selected_alert_id: Option<AlertId>,
    pub draft: Option<ReportDraft>,

    // Notifications
    pub prefs: NotificationPrefs,
    pub notify_session: NotifySession,
    pub channel_ready: bool,

    // Chat
    pub conversations: ConversationDirectory,
    pub open_conversation_id: Option<ConversationId>,

    // Orchestration
    pub in_flight: InFlightOps,
    pub geocode_cache: GeocodeCache,
    pub pending_deep_link: Option<AlertId>,

    // Generic UI state
    pub is_loading: bool,
    pub active_error: Option<AppError>,
    pub active_toast: Option<ToastMessage>,
}

impl Model {
    pub const DEFAULT_API_BASE: &'static str = "https://api.alertamascota.app";

    #[must_use]
    pub fn api_base(&self) -> &str {
        if self.api_base.is_empty() {
            Self::DEFAULT_API_BASE
        } else {
            &self.api_base
        }
    }

    #[must_use]
    pub fn current_user_id(&self) -> Option<&UserId> {
        self.user.as_ref().map(|u| &u.id)
    }

    #[must_use]
    pub fn alert(&self, id: &AlertId) -> Option<&AlertCase> {
        self.alerts.iter().find(|a| &a.id == id)
    }

    pub fn alert_mut(&mut self, id: &AlertId) -> Option<&mut AlertCase> {
        self.alerts.iter_mut().find(|a| &a.id == id)
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            prefs: self.prefs.clone(),
            last_position: self.current_position,
        }
    }

    pub fn restore_snapshot(&mut self, snapshot: SessionSnapshot) {
        self.prefs = snapshot.prefs;
        if self.current_position.is_none() {
            self.current_position = snapshot.last_position;
        }
    }
}

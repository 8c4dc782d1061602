//! Events driving the update loop. User intents and shell callbacks share
//! one enum; capability responses carry the operation id they answer so the
//! in-flight registry can claim or drop them.

use crux_kv::error::KeyValueError;
use serde::{Deserialize, Serialize};

use crate::app::{ApiAlert, ApiConversation};
use crate::capabilities::{LocationOutput, NotifyOutput};
use crate::certificate::RescueForm;
use crate::chat::MessageKind;
use crate::model::{AlertId, ReportDraft, SessionUser, UnixTimeMs, UserId};
use crate::notify::NotificationPrefs;
use crate::pending::OpId;

/// Shorthand for a typed crux_http response.
pub type HttpResult<T> = crux_http::Result<crux_http::Response<T>>;

#[derive(Serialize, Deserialize)]
pub enum Event {
    // Boot & session
    Started,
    SessionRestored(Result<Option<Vec<u8>>, KeyValueError>),
    SessionPersisted(Result<Option<Vec<u8>>, KeyValueError>),
    SignedIn { user: SessionUser, token: String },
    SignedOut,

    // Location
    PositionRequested,
    PositionUpdated(LocationOutput),
    AddressResolved { lat: f64, lon: f64, output: LocationOutput },

    // Feed
    RefreshRequested,
    #[serde(skip)]
    AlertsFetched(Box<HttpResult<Vec<ApiAlert>>>),
    AlertSelected(AlertId),
    SelectionCleared,
    DeepLinkOpened(String),

    // Reporting
    DraftOpened,
    DraftChanged(Box<ReportDraft>),
    DraftDiscarded,
    ReportSubmitted,
    #[serde(skip)]
    ReportResponded {
        op_id: OpId,
        response: Box<HttpResult<ApiAlert>>,
    },

    // Notifications
    PrefsChanged(Box<NotificationPrefs>),
    ChannelEnsured(NotifyOutput),

    // Chat
    ChatOpened { alert_id: AlertId, with: UserId },
    ChatClosed,
    MessageComposed { kind: MessageKind, payload: String },
    #[serde(skip)]
    ConversationSynced {
        op_id: OpId,
        response: Box<HttpResult<ApiConversation>>,
    },
    #[serde(skip)]
    MessageAcked {
        op_id: OpId,
        response: Box<HttpResult<ApiConversation>>,
    },

    // Resolution
    ResolveSubmitted {
        alert_id: AlertId,
        form: Box<RescueForm>,
    },
    #[serde(skip)]
    ResolveResponded {
        op_id: OpId,
        response: Box<HttpResult<ApiAlert>>,
    },

    // Timeouts: the shell ticks this roughly once per second.
    TimerTicked { now: UnixTimeMs },

    // UI state
    ToastDismissed,
    ErrorDismissed,
}

impl Event {
    /// Stable name for structured logging.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::SessionRestored(_) => "session_restored",
            Self::SessionPersisted(_) => "session_persisted",
            Self::SignedIn { .. } => "signed_in",
            Self::SignedOut => "signed_out",
            Self::PositionRequested => "position_requested",
            Self::PositionUpdated(_) => "position_updated",
            Self::AddressResolved { .. } => "address_resolved",
            Self::RefreshRequested => "refresh_requested",
            Self::AlertsFetched(_) => "alerts_fetched",
            Self::AlertSelected(_) => "alert_selected",
            Self::SelectionCleared => "selection_cleared",
            Self::DeepLinkOpened(_) => "deep_link_opened",
            Self::DraftOpened => "draft_opened",
            Self::DraftChanged(_) => "draft_changed",
            Self::DraftDiscarded => "draft_discarded",
            Self::ReportSubmitted => "report_submitted",
            Self::ReportResponded { .. } => "report_responded",
            Self::PrefsChanged(_) => "prefs_changed",
            Self::ChannelEnsured(_) => "channel_ensured",
            Self::ChatOpened { .. } => "chat_opened",
            Self::ChatClosed => "chat_closed",
            Self::MessageComposed { .. } => "message_composed",
            Self::ConversationSynced { .. } => "conversation_synced",
            Self::MessageAcked { .. } => "message_acked",
            Self::ResolveSubmitted { .. } => "resolve_submitted",
            Self::ResolveResponded { .. } => "resolve_responded",
            Self::TimerTicked { .. } => "timer_ticked",
            Self::ToastDismissed => "toast_dismissed",
            Self::ErrorDismissed => "error_dismissed",
        }
    }

    #[must_use]
    pub const fn is_user_initiated(&self) -> bool {
        matches!(
            self,
            Self::RefreshRequested
                | Self::AlertSelected(_)
                | Self::SelectionCleared
                | Self::DeepLinkOpened(_)
                | Self::DraftOpened
                | Self::DraftChanged(_)
                | Self::DraftDiscarded
                | Self::ReportSubmitted
                | Self::PrefsChanged(_)
                | Self::ChatOpened { .. }
                | Self::ChatClosed
                | Self::MessageComposed { .. }
                | Self::ResolveSubmitted { .. }
                | Self::ToastDismissed
                | Self::ErrorDismissed
        )
    }
}

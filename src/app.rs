//! The update loop: every event lands here, mutates the model and requests
//! effects through the capabilities.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::capabilities::{Capabilities, LocationOutput, NotifyOutput};
use crate::certificate::{self, RescueForm};
use crate::chat::{Conversation, ConversationId, Message, MessageKind};
use crate::event::{Event, HttpResult};
use crate::model::{
    AlertCase, AlertId, BlobRef, CaseStatus, Model, Resolution, ReportDraft, ToastMessage,
    UnixTimeMs, UserId, SESSION_SNAPSHOT_KEY,
};
use crate::notify::{self, NotificationPrefs, NotifyDecision};
use crate::pending::OpKind;
use crate::{
    deeplink, format_distance, format_time_ago, get_current_time_ms, proximity, AppError,
    ErrorKind, ValidatedCoordinate, DESCRIPTION_PREVIEW_LENGTH, MAX_CACHED_ALERTS,
    NOTIFICATION_CHANNEL_ID,
};

// --- Wire contracts -------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiAlert {
    pub id: String,
    pub lat: f64,
    pub lon: f64,
    pub species: String,
    pub condition: String,
    pub description: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub photo_url: Option<String>,
    pub status: String,
    pub reporter: String,
    pub created_at_ms: u64,
    #[serde(default)]
    pub resolved_by: Option<String>,
    #[serde(default)]
    pub resolved_at_ms: Option<u64>,
    #[serde(default)]
    pub certificate_path: Option<String>,
}

impl ApiAlert {
    pub fn into_domain(self) -> Result<AlertCase, AppError> {
        let position = ValidatedCoordinate::new(self.lat, self.lon)?;
        let status = match self.status.as_str() {
            "open" => CaseStatus::Open,
            "resolved" => CaseStatus::Resolved,
            other => {
                return Err(AppError::new(
                    ErrorKind::Serialization,
                    format!("Unknown case status: {other}"),
                ))
            }
        };
        let resolution = match (self.resolved_by, self.resolved_at_ms) {
            (Some(by), Some(at)) => Some(Resolution {
                resolver: UserId(by),
                resolved_at: UnixTimeMs(at),
                certificate: BlobRef::new(self.certificate_path.unwrap_or_default()),
            }),
            _ => None,
        };

        Ok(AlertCase {
            id: AlertId(self.id),
            position,
            species_tag: self.species,
            condition_tag: self.condition,
            description: self.description,
            address: self.address,
            photo: self.photo_url.map(BlobRef::new),
            status,
            reporter: UserId(self.reporter),
            created_at: UnixTimeMs(self.created_at_ms),
            resolution,
        })
    }

    #[must_use]
    pub fn from_domain(case: &AlertCase) -> Self {
        Self {
            id: case.id.as_str().to_string(),
            lat: case.position.lat(),
            lon: case.position.lon(),
            species: case.species_tag.clone(),
            condition: case.condition_tag.clone(),
            description: case.description.clone(),
            address: case.address.clone(),
            photo_url: case.photo.as_ref().map(|p| p.uri.clone()),
            status: match case.status {
                CaseStatus::Open => "open".into(),
                CaseStatus::Resolved => "resolved".into(),
            },
            reporter: case.reporter.as_str().to_string(),
            created_at_ms: case.created_at.0,
            resolved_by: case
                .resolution
                .as_ref()
                .map(|r| r.resolver.as_str().to_string()),
            resolved_at_ms: case.resolution.as_ref().map(|r| r.resolved_at.0),
            certificate_path: case.resolution.as_ref().map(|r| r.certificate.uri.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiNewAlert {
    pub lat: f64,
    pub lon: f64,
    pub species: String,
    pub condition: String,
    pub description: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub photo_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiMessage {
    pub sender: String,
    pub kind: MessageKind,
    pub payload: String,
    pub sent_at_ms: u64,
}

impl ApiMessage {
    fn into_domain(self) -> Message {
        Message {
            sender: UserId(self.sender),
            kind: self.kind,
            payload: self.payload,
            sent_at: UnixTimeMs(self.sent_at_ms),
        }
    }

    fn from_domain(message: &Message) -> Self {
        Self {
            sender: message.sender.as_str().to_string(),
            kind: message.kind,
            payload: message.payload.clone(),
            sent_at_ms: message.sent_at.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiConversation {
    pub id: String,
    pub alert_id: String,
    pub participants: Vec<String>,
    #[serde(default)]
    pub messages: Vec<ApiMessage>,
}

impl ApiConversation {
    pub fn into_domain(self) -> Result<Conversation, AppError> {
        let [a, b]: [String; 2] = self.participants.try_into().map_err(|_| {
            AppError::new(
                ErrorKind::Serialization,
                "Conversation must have exactly two participants",
            )
        })?;

        let mut conversation = Conversation::new(AlertId(self.alert_id), UserId(a), UserId(b));
        if conversation.id.as_str() != self.id {
            warn!(wire_id = %self.id, derived_id = %conversation.id, "conversation id mismatch");
        }
        for message in self.messages {
            conversation.append(message.into_domain());
        }
        Ok(conversation)
    }

    #[must_use]
    pub fn from_domain(conversation: &Conversation) -> Self {
        Self {
            id: conversation.id.as_str().to_string(),
            alert_id: conversation.alert_id.as_str().to_string(),
            participants: vec![
                conversation.participants.0.as_str().to_string(),
                conversation.participants.1.as_str().to_string(),
            ],
            messages: conversation.messages.iter().map(ApiMessage::from_domain).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResolveRequest {
    pub resolver: String,
    pub resolved_at_ms: u64,
    pub certificate_path: String,
    pub certificate_lines: Vec<String>,
    pub rescuer_name: String,
    pub national_id: String,
    pub phone: String,
    pub address: String,
    #[serde(default)]
    pub notes: Option<String>,
    pub signature_uri: String,
}

// --- View model -----------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertListItem {
    pub id: AlertId,
    pub title: String,
    pub description_preview: String,
    pub distance_label: Option<String>,
    pub time_ago: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionView {
    pub resolver: String,
    pub resolved_at: UnixTimeMs,
    pub certificate_path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertDetail {
    pub id: AlertId,
    pub case_code: String,
    pub species: String,
    pub condition: String,
    pub description: String,
    pub address: Option<String>,
    pub photo_url: Option<String>,
    pub status: CaseStatus,
    pub reporter: String,
    pub is_own_report: bool,
    pub distance_label: Option<String>,
    pub resolution: Option<ResolutionView>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageView {
    pub mine: bool,
    pub kind: MessageKind,
    pub payload: String,
    pub sent_at: UnixTimeMs,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatView {
    pub conversation_id: ConversationId,
    pub alert_id: AlertId,
    pub with: String,
    pub messages: Vec<MessageView>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorView {
    pub code: String,
    pub message: String,
    pub is_retryable: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewModel {
    pub signed_in: bool,
    pub is_loading: bool,
    /// True when the proximity filter was bypassed for lack of a position.
    pub unfiltered: bool,
    pub pins_geojson: String,
    pub alerts: Vec<AlertListItem>,
    pub selected: Option<AlertDetail>,
    pub draft: Option<ReportDraft>,
    pub prefs: NotificationPrefs,
    pub chat: Option<ChatView>,
    pub total_unread: usize,
    pub toast: Option<ToastMessage>,
    pub error: Option<ErrorView>,
}

// --- App ------------------------------------------------------------------

#[derive(Default)]
pub struct App;

impl crux_core::App for App {
    type Event = Event;
    type Model = Model;
    type ViewModel = ViewModel;
    type Capabilities = Capabilities;

    fn update(&self, event: Event, model: &mut Model, caps: &Capabilities) {
        debug!(event = event.name(), "update");

        match event {
            Event::Started => {
                caps.key_value
                    .get(SESSION_SNAPSHOT_KEY.to_string(), Event::SessionRestored);
                caps.notify
                    .ensure_channel(NOTIFICATION_CHANNEL_ID, Event::ChannelEnsured);
                caps.location.get_position(Event::PositionUpdated);
                caps.render.render();
            }

            Event::SessionRestored(result) => {
                match result {
                    Ok(Some(bytes)) => match ciborium::de::from_reader(bytes.as_slice()) {
                        Ok(snapshot) => model.restore_snapshot(snapshot),
                        Err(e) => warn!(error = %e, "discarding unreadable session snapshot"),
                    },
                    Ok(None) => {}
                    Err(e) => warn!(error = %e, "failed to read session snapshot"),
                }
                caps.render.render();
            }

            Event::SessionPersisted(result) => {
                if let Err(e) = result {
                    warn!(error = %e, "session snapshot write failed");
                }
            }

            Event::SignedIn { user, token } => {
                model.user = Some(user);
                model.secrets.session_token = Some(SecretString::new(token));
                fetch_alerts(model, caps);
                caps.render.render();
            }

            Event::SignedOut => {
                model.user = None;
                model.secrets.session_token = None;
                model.conversations = Default::default();
                model.open_conversation_id = None;
                model.draft = None;
                caps.render.render();
            }

            Event::PositionRequested => {
                caps.location.get_position(Event::PositionUpdated);
            }

            Event::PositionUpdated(output) => {
                handle_position(model, caps, &output);
                caps.render.render();
            }

            Event::AddressResolved { lat, lon, output } => {
                if let (Ok(coord), LocationOutput::Address(Some(address))) =
                    (ValidatedCoordinate::new(lat, lon), output)
                {
                    model.geocode_cache.insert(coord, address.clone());
                    if let Some(draft) = model.draft.as_mut() {
                        if draft.position == Some(coord) && draft.address.is_none() {
                            draft.address = Some(address);
                        }
                    }
                    caps.render.render();
                }
            }

            Event::RefreshRequested => {
                fetch_alerts(model, caps);
                caps.render.render();
            }

            Event::AlertsFetched(response) => {
                model.is_loading = false;
                handle_alerts_response(model, caps, *response);
                caps.render.render();
            }

            Event::AlertSelected(id) => {
                if model.alert(&id).is_some() {
                    model.selected_alert_id = Some(id);
                } else {
                    model.active_toast = Some(ToastMessage::error("Case not found"));
                }
                caps.render.render();
            }

            Event::SelectionCleared => {
                model.selected_alert_id = None;
                caps.render.render();
            }

            Event::DeepLinkOpened(link) => {
                match deeplink::parse(&link) {
                    Ok(id) => {
                        if model.alert(&id).is_some() {
                            model.selected_alert_id = Some(id);
                        } else {
                            // Not fetched yet; select once the next refresh lands.
                            model.pending_deep_link = Some(id);
                            fetch_alerts(model, caps);
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "rejected deep link");
                        model.active_toast = Some(ToastMessage::error("Invalid link"));
                    }
                }
                caps.render.render();
            }

            Event::DraftOpened => {
                let mut draft = ReportDraft {
                    position: model.current_position,
                    ..ReportDraft::default()
                };
                if let Some(coord) = draft.position {
                    if let Some(address) = model.geocode_cache.get(coord) {
                        draft.address = Some(address);
                    } else {
                        caps.location.reverse_geocode(coord, move |output| {
                            Event::AddressResolved {
                                lat: coord.lat(),
                                lon: coord.lon(),
                                output,
                            }
                        });
                    }
                }
                model.draft = Some(draft);
                caps.render.render();
            }

            Event::DraftChanged(draft) => {
                model.draft = Some(*draft);
                caps.render.render();
            }

            Event::DraftDiscarded => {
                model.draft = None;
                caps.render.render();
            }

            Event::ReportSubmitted => {
                submit_report(model, caps);
                caps.render.render();
            }

            Event::ReportResponded { op_id, response } => {
                if model.in_flight.resolve(&op_id).is_none() {
                    debug!(op_id = %op_id, "dropping late report response");
                    return;
                }
                model.is_loading = false;
                handle_report_response(model, *response);
                persist_session(model, caps);
                caps.render.render();
            }

            Event::PrefsChanged(prefs) => {
                model.prefs = *prefs;
                persist_session(model, caps);
                caps.render.render();
            }

            Event::ChannelEnsured(output) => match output {
                NotifyOutput::ChannelReady => model.channel_ready = true,
                NotifyOutput::PermissionDenied => {
                    model.active_toast =
                        Some(ToastMessage::info("Notifications are disabled for this app"));
                    caps.render.render();
                }
                NotifyOutput::Shown => {}
                NotifyOutput::Failed { reason } => {
                    warn!(reason = %reason, "notification channel setup failed");
                }
            },

            Event::ChatOpened { alert_id, with } => {
                open_chat(model, caps, &alert_id, &with);
                caps.render.render();
            }

            Event::ChatClosed => {
                let now = UnixTimeMs(get_current_time_ms());
                if let Some((id, me)) = model
                    .open_conversation_id
                    .clone()
                    .zip(model.current_user_id().cloned())
                {
                    if let Some(conversation) = model.conversations.get_mut(&id) {
                        conversation.mark_read(&me, now);
                    }
                }
                model.open_conversation_id = None;
                caps.render.render();
            }

            Event::MessageComposed { kind, payload } => {
                send_message(model, caps, kind, payload);
                caps.render.render();
            }

            Event::ConversationSynced { op_id, response } => {
                if model.in_flight.resolve(&op_id).is_none() {
                    debug!(op_id = %op_id, "dropping late conversation response");
                    return;
                }
                handle_conversation_response(model, *response);
                caps.render.render();
            }

            Event::MessageAcked { op_id, response } => {
                if model.in_flight.resolve(&op_id).is_none() {
                    debug!(op_id = %op_id, "dropping late message ack");
                    return;
                }
                handle_conversation_response(model, *response);
                caps.render.render();
            }

            Event::ResolveSubmitted { alert_id, form } => {
                submit_resolution(model, caps, &alert_id, &form);
                caps.render.render();
            }

            Event::ResolveResponded { op_id, response } => {
                let Some(op) = model.in_flight.resolve(&op_id) else {
                    debug!(op_id = %op_id, "dropping late resolve response");
                    return;
                };
                model.is_loading = false;
                handle_resolve_response(model, op.kind, *response);
                caps.render.render();
            }

            Event::TimerTicked { now } => {
                let expired = model.in_flight.expire(now);
                if expired.is_empty() {
                    return;
                }
                model.is_loading = false;
                for op in &expired {
                    warn!(op_id = %op.id, kind = op.kind.describe(), "operation timed out");
                }
                let kind = expired[0].kind.describe();
                model.active_error = Some(
                    AppError::new(ErrorKind::Timeout, format!("Timed out: {kind}"))
                        .with_context("operation", kind),
                );
                caps.render.render();
            }

            Event::ToastDismissed => {
                model.active_toast = None;
                caps.render.render();
            }

            Event::ErrorDismissed => {
                model.active_error = None;
                caps.render.render();
            }
        }
    }

    fn view(&self, model: &Model) -> ViewModel {
        let now = get_current_time_ms();
        let outcome = proximity::nearby_open_alerts(model.current_position, &model.alerts);

        let pins = proximity::pins_as_geojson(&outcome.nearby);
        let pins_geojson = serde_json::to_string(&pins).unwrap_or_else(|e| {
            warn!(error = %e, "failed to serialize map pins");
            String::new()
        });

        let alerts = outcome
            .nearby
            .iter()
            .map(|n| AlertListItem {
                id: n.alert.id.clone(),
                title: format!("{} - {}", n.alert.species_label(), n.alert.condition_label()),
                description_preview: preview(&n.alert.description),
                distance_label: n.distance_m.map(format_distance),
                time_ago: format_time_ago(n.alert.created_at.0, now),
            })
            .collect();

        let selected = model
            .selected_alert_id
            .as_ref()
            .and_then(|id| model.alert(id))
            .map(|case| build_detail(model, case));

        let chat = build_chat_view(model);
        let total_unread = model
            .current_user_id()
            .map_or(0, |me| model.conversations.total_unread(me));

        ViewModel {
            signed_in: model.user.is_some(),
            is_loading: model.is_loading,
            unfiltered: outcome.unfiltered,
            pins_geojson,
            alerts,
            selected,
            draft: model.draft.clone(),
            prefs: model.prefs.clone(),
            chat,
            total_unread,
            toast: model.active_toast.clone(),
            error: model.active_error.as_ref().map(|e| ErrorView {
                code: e.code().to_string(),
                message: e.user_facing_message(),
                is_retryable: e.is_retryable(),
            }),
        }
    }
}

// --- Handlers -------------------------------------------------------------

fn handle_position(model: &mut Model, caps: &Capabilities, output: &LocationOutput) {
    match output {
        LocationOutput::Position { lat, lon } => match ValidatedCoordinate::new(*lat, *lon) {
            Ok(coord) => {
                model.current_position = Some(coord);
                persist_session(model, caps);
            }
            Err(e) => warn!(error = %e, "shell reported invalid position"),
        },
        LocationOutput::PositionUnavailable | LocationOutput::PermissionDenied => {
            if model.current_position.is_none() {
                model.active_toast =
                    Some(ToastMessage::info("Location unavailable, showing all cases"));
            }
        }
        LocationOutput::Address(_) => warn!("unexpected address output for position request"),
    }
}

fn fetch_alerts(model: &mut Model, caps: &Capabilities) {
    model.is_loading = true;
    let url = format!("{}/api/v1/alerts", model.api_base());

    let mut request = caps.http.get(url);
    if let Some(token) = model.secrets.session_token.as_ref() {
        let auth = format!("Bearer {}", token.expose_secret());
        request = request.header("Authorization", auth.as_str());
    }
    request
        .expect_json::<Vec<ApiAlert>>()
        .send(|response| Event::AlertsFetched(Box::new(response)));
}

fn handle_alerts_response(
    model: &mut Model,
    caps: &Capabilities,
    response: HttpResult<Vec<ApiAlert>>,
) {
    let mut response = match response {
        Ok(response) => response,
        Err(e) => {
            model.active_error =
                Some(AppError::new(ErrorKind::Network, "Failed to load cases")
                    .with_internal(e.to_string()));
            return;
        }
    };

    let status: u16 = response.status().into();
    if !(200..300).contains(&status) {
        model.active_error = Some(AppError::from_http_status(status, None));
        return;
    }

    let incoming = response.take_body().unwrap_or_default();
    let mut alerts = Vec::with_capacity(incoming.len());
    for api_alert in incoming {
        match api_alert.into_domain() {
            Ok(case) => alerts.push(case),
            Err(e) => warn!(error = %e, "skipping malformed case"),
        }
    }

    alerts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    alerts.truncate(MAX_CACHED_ALERTS);

    evaluate_notifications(model, caps, &alerts);
    model.alerts = alerts;

    if let Some(pending) = model.pending_deep_link.take() {
        if model.alert(&pending).is_some() {
            model.selected_alert_id = Some(pending);
        } else {
            model.active_toast = Some(ToastMessage::error("Case not found"));
        }
    }
}

fn evaluate_notifications(model: &mut Model, caps: &Capabilities, alerts: &[AlertCase]) {
    if !model.channel_ready {
        return;
    }
    let me = model.current_user_id().cloned();
    for case in alerts {
        let decision = notify::evaluate(
            case,
            me.as_ref(),
            model.current_position,
            &model.prefs,
            &mut model.notify_session,
        );
        if let NotifyDecision::Fire(payload) = decision {
            debug!(case = %case.id, "showing proximity alert");
            caps.notify.show(payload);
        }
    }
}

fn submit_report(model: &mut Model, caps: &Capabilities) {
    let Some(draft) = model.draft.clone() else {
        model.active_toast = Some(ToastMessage::error("Nothing to submit"));
        return;
    };
    let Some(reporter) = model.current_user_id() else {
        model.active_error = Some(AppError::new(
            ErrorKind::Authentication,
            "Sign in to report a case",
        ));
        return;
    };
    if let Err(e) = draft.validate() {
        model.active_error = Some(e);
        return;
    }

    // Validated above, so position, species and condition are present.
    let Some(position) = draft.position else { return };
    let (Some(species), Some(condition)) = (draft.species, draft.condition) else {
        return;
    };

    let payload = ApiNewAlert {
        lat: position.lat(),
        lon: position.lon(),
        species: species.tag().into(),
        condition: condition.tag().into(),
        description: draft.description.trim().to_string(),
        address: draft.address.clone(),
        photo_url: draft.photo.as_ref().map(|p| p.uri.clone()),
    };
    debug!(reporter = reporter.as_str(), "submitting report");

    let now = UnixTimeMs(get_current_time_ms());
    let op_id = model.in_flight.register(OpKind::SubmitReport, now);
    model.is_loading = true;

    let url = format!("{}/api/v1/alerts", model.api_base());
    post_json(model, caps, &url, &payload, move |response| {
        Event::ReportResponded {
            op_id: op_id.clone(),
            response: Box::new(response),
        }
    });
}

fn handle_report_response(model: &mut Model, response: HttpResult<ApiAlert>) {
    match read_body(response) {
        Ok(api_alert) => match api_alert.into_domain() {
            Ok(case) => {
                // Own reports never notify.
                model.notify_session.record(case.id.clone());
                model.alerts.insert(0, case);
                model.draft = None;
                model.active_toast = Some(ToastMessage::success("Report published"));
            }
            Err(e) => model.active_error = Some(e),
        },
        Err(e) => model.active_error = Some(e),
    }
}

fn open_chat(model: &mut Model, caps: &Capabilities, alert_id: &AlertId, with: &UserId) {
    let Some(me) = model.current_user_id().cloned() else {
        model.active_error = Some(AppError::new(
            ErrorKind::Authentication,
            "Sign in to contact the reporter",
        ));
        return;
    };
    if &me == with {
        model.active_toast = Some(ToastMessage::info("This is your own report"));
        return;
    }

    let now = UnixTimeMs(get_current_time_ms());
    let conversation = model.conversations.lookup_or_create(alert_id, &me, with);
    conversation.mark_read(&me, now);
    let conversation_id = conversation.id.clone();
    let body = ApiConversation::from_domain(conversation);
    model.open_conversation_id = Some(conversation_id.clone());

    let op_id = model.in_flight.register(
        OpKind::UpsertConversation {
            conversation_id: conversation_id.clone(),
        },
        now,
    );
    let url = format!(
        "{}/api/v1/conversations/{}",
        model.api_base(),
        conversation_id.as_str()
    );
    put_json(model, caps, &url, &body, move |response| {
        Event::ConversationSynced {
            op_id: op_id.clone(),
            response: Box::new(response),
        }
    });
}

fn send_message(model: &mut Model, caps: &Capabilities, kind: MessageKind, payload: String) {
    let Some(me) = model.current_user_id().cloned() else {
        return;
    };
    let Some(conversation_id) = model.open_conversation_id.clone() else {
        model.active_toast = Some(ToastMessage::error("No open conversation"));
        return;
    };
    if matches!(kind, MessageKind::Text) && payload.trim().is_empty() {
        return;
    }

    let now = UnixTimeMs(get_current_time_ms());
    let message = Message {
        sender: me,
        kind,
        payload,
        sent_at: now,
    };
    let Some(conversation) = model.conversations.get_mut(&conversation_id) else {
        return;
    };
    conversation.append(message.clone());

    let op_id = model.in_flight.register(
        OpKind::SendMessage {
            conversation_id: conversation_id.clone(),
        },
        now,
    );
    let url = format!(
        "{}/api/v1/conversations/{}/messages",
        model.api_base(),
        conversation_id.as_str()
    );
    let body = ApiMessage::from_domain(&message);
    post_json(model, caps, &url, &body, move |response| Event::MessageAcked {
        op_id: op_id.clone(),
        response: Box::new(response),
    });
}

fn handle_conversation_response(model: &mut Model, response: HttpResult<ApiConversation>) {
    match read_body(response).and_then(ApiConversation::into_domain) {
        Ok(conversation) => {
            let id = conversation.id.clone();
            model.conversations.merge(conversation);
            // Opening counts as reading whatever the server brought along.
            if model.open_conversation_id.as_ref() == Some(&id) {
                if let Some(me) = model.current_user_id().cloned() {
                    if let Some(conversation) = model.conversations.get_mut(&id) {
                        conversation.mark_read(&me, UnixTimeMs(get_current_time_ms()));
                    }
                }
            }
        }
        Err(e) => {
            model.active_toast = Some(ToastMessage::error(e.user_facing_message()));
        }
    }
}

fn submit_resolution(
    model: &mut Model,
    caps: &Capabilities,
    alert_id: &AlertId,
    form: &RescueForm,
) {
    let Some(me) = model.current_user_id().cloned() else {
        model.active_error = Some(AppError::new(
            ErrorKind::Authentication,
            "Sign in to mark a case as rescued",
        ));
        return;
    };
    let Some(case) = model.alert(alert_id) else {
        model.active_error = Some(AppError::new(ErrorKind::NotFound, "Case not found"));
        return;
    };
    if case.status != CaseStatus::Open {
        model.active_toast = Some(ToastMessage::info("This case is already resolved"));
        return;
    }

    let now = UnixTimeMs(get_current_time_ms());
    let cert = match certificate::build(case, form, &me, now) {
        Ok(cert) => cert,
        Err(e) => {
            model.active_error = Some(e);
            return;
        }
    };

    // Signature presence is guaranteed by form validation inside build().
    let signature_uri = form
        .signature
        .as_ref()
        .map(|s| s.uri.clone())
        .unwrap_or_default();
    let payload = ApiResolveRequest {
        resolver: me.as_str().to_string(),
        resolved_at_ms: now.0,
        certificate_path: cert.storage_path.clone(),
        certificate_lines: cert.lines.clone(),
        rescuer_name: form.rescuer_name.trim().to_string(),
        national_id: form.national_id.trim().to_string(),
        phone: form.phone.trim().to_string(),
        address: form.address.trim().to_string(),
        notes: form.notes.clone(),
        signature_uri,
    };

    let op_id = model.in_flight.register(
        OpKind::ResolveCase {
            alert_id: alert_id.clone(),
        },
        now,
    );
    model.is_loading = true;

    let url = format!("{}/api/v1/alerts/{}/resolve", model.api_base(), alert_id);
    post_json(model, caps, &url, &payload, move |response| {
        Event::ResolveResponded {
            op_id: op_id.clone(),
            response: Box::new(response),
        }
    });
}

fn handle_resolve_response(model: &mut Model, kind: OpKind, response: HttpResult<ApiAlert>) {
    let OpKind::ResolveCase { alert_id } = kind else {
        warn!("resolve response claimed a non-resolve operation");
        return;
    };

    match read_body(response).and_then(ApiAlert::into_domain) {
        Ok(updated) => {
            // The transition only lands on success; on any failure the case
            // stays open and the user may retry.
            if let Some(case) = model.alert_mut(&alert_id) {
                *case = updated;
            } else {
                model.alerts.insert(0, updated);
            }
            model.active_toast = Some(ToastMessage::success("Rescue certificate generated"));
        }
        Err(e) => model.active_error = Some(e),
    }
}

// --- Helpers --------------------------------------------------------------

fn preview(description: &str) -> String {
    let trimmed = description.trim();
    if trimmed.len() <= DESCRIPTION_PREVIEW_LENGTH {
        return trimmed.to_string();
    }
    let cut = trimmed
        .char_indices()
        .take_while(|(i, _)| *i < DESCRIPTION_PREVIEW_LENGTH)
        .last()
        .map_or(0, |(i, c)| i + c.len_utf8());
    format!("{}…", &trimmed[..cut])
}

fn build_detail(model: &Model, case: &AlertCase) -> AlertDetail {
    let distance_label = model
        .current_position
        .map(|me| format_distance(me.distance_to(case.position)));

    AlertDetail {
        id: case.id.clone(),
        case_code: case.id.case_code(),
        species: case.species_label(),
        condition: case.condition_label(),
        description: case.description.clone(),
        address: case.address.clone(),
        photo_url: case.photo.as_ref().map(|p| p.uri.clone()),
        status: case.status,
        reporter: case.reporter.as_str().to_string(),
        is_own_report: model.current_user_id() == Some(&case.reporter),
        distance_label,
        resolution: case.resolution.as_ref().map(|r| ResolutionView {
            resolver: r.resolver.as_str().to_string(),
            resolved_at: r.resolved_at,
            certificate_path: r.certificate.uri.clone(),
        }),
    }
}

fn build_chat_view(model: &Model) -> Option<ChatView> {
    let id = model.open_conversation_id.as_ref()?;
    let me = model.current_user_id()?;
    let conversation = model.conversations.get(id)?;
    let with = conversation
        .other_participant(me)
        .map_or_else(String::new, |u| u.as_str().to_string());

    Some(ChatView {
        conversation_id: conversation.id.clone(),
        alert_id: conversation.alert_id.clone(),
        with,
        messages: conversation
            .messages
            .iter()
            .map(|m| MessageView {
                mine: &m.sender == me,
                kind: m.kind,
                payload: m.payload.clone(),
                sent_at: m.sent_at,
            })
            .collect(),
    })
}

fn persist_session(model: &Model, caps: &Capabilities) {
    let mut bytes = Vec::new();
    match ciborium::ser::into_writer(&model.snapshot(), &mut bytes) {
        Ok(()) => {
            caps.key_value
                .set(SESSION_SNAPSHOT_KEY.to_string(), bytes, Event::SessionPersisted);
        }
        Err(e) => warn!(error = %e, "failed to encode session snapshot"),
    }
}

/// Unwraps a typed response: transport errors and non-2xx statuses become
/// `AppError`, a missing body is a serialization error.
fn read_body<T>(response: HttpResult<T>) -> Result<T, AppError> {
    let mut response = response.map_err(|e| {
        AppError::new(ErrorKind::Network, "Request failed").with_internal(e.to_string())
    })?;
    let status: u16 = response.status().into();
    if !(200..300).contains(&status) {
        return Err(AppError::from_http_status(status, None));
    }
    response.take_body().ok_or_else(|| {
        AppError::new(ErrorKind::Serialization, "Empty response from server")
    })
}

fn post_json<T, F, B>(model: &mut Model, caps: &Capabilities, url: &str, body: &B, make_event: F)
where
    T: serde::de::DeserializeOwned + 'static,
    B: Serialize,
    F: Fn(HttpResult<T>) -> Event + Send + Sync + 'static,
{
    let mut request = caps.http.post(url);
    if let Some(token) = model.secrets.session_token.as_ref() {
        let auth = format!("Bearer {}", token.expose_secret());
        request = request.header("Authorization", auth.as_str());
    }
    match request.body_json(body) {
        Ok(request) => request.expect_json::<T>().send(make_event),
        Err(e) => {
            model.active_error = Some(
                AppError::new(ErrorKind::Serialization, "Failed to encode request")
                    .with_internal(e.to_string()),
            );
        }
    }
}

fn put_json<T, F, B>(model: &mut Model, caps: &Capabilities, url: &str, body: &B, make_event: F)
where
    T: serde::de::DeserializeOwned + 'static,
    B: Serialize,
    F: Fn(HttpResult<T>) -> Event + Send + Sync + 'static,
{
    let mut request = caps.http.put(url);
    if let Some(token) = model.secrets.session_token.as_ref() {
        let auth = format!("Bearer {}", token.expose_secret());
        request = request.header("Authorization", auth.as_str());
    }
    match request.body_json(body) {
        Ok(request) => request.expect_json::<T>().send(make_event),
        Err(e) => {
            model.active_error = Some(
                AppError::new(ErrorKind::Serialization, "Failed to encode request")
                    .with_internal(e.to_string()),
            );
        }
    }
}

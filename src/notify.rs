//! Notification matcher: decides, per incoming case and session, whether a
//! local proximity alert fires.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::deeplink;
use crate::model::{AlertCase, AlertId, CaseStatus, Condition, Species, UserId};
use crate::proximity;
use crate::{ValidatedCoordinate, DESCRIPTION_PREVIEW_LENGTH, NOTIFICATION_CHANNEL_ID};

/// Per-category opt-outs. Everything defaults to on; an unrecognized tag on
/// a case counts as allowed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPrefs {
    pub dog: bool,
    pub cat: bool,
    pub bird: bool,
    pub other_species: bool,
    pub injured: bool,
    pub lost: bool,
    pub abandoned: bool,
    pub in_danger: bool,
    pub needs_adoption: bool,
    pub sick: bool,
}

impl Default for NotificationPrefs {
    fn default() -> Self {
        Self {
            dog: true,
            cat: true,
            bird: true,
            other_species: true,
            injured: true,
            lost: true,
            abandoned: true,
            in_danger: true,
            needs_adoption: true,
            sick: true,
        }
    }
}

impl NotificationPrefs {
    #[must_use]
    pub const fn allows_species(&self, species: Option<Species>) -> bool {
        match species {
            None => true,
            Some(Species::Dog) => self.dog,
            Some(Species::Cat) => self.cat,
            Some(Species::Bird) => self.bird,
            Some(Species::Other) => self.other_species,
        }
    }

    #[must_use]
    pub const fn allows_condition(&self, condition: Option<Condition>) -> bool {
        match condition {
            None => true,
            Some(Condition::Injured) => self.injured,
            Some(Condition::Lost) => self.lost,
            Some(Condition::Abandoned) => self.abandoned,
            Some(Condition::InDanger) => self.in_danger,
            Some(Condition::NeedsAdoption) => self.needs_adoption,
            Some(Condition::Sick) => self.sick,
        }
    }

    #[must_use]
    pub const fn allows(&self, species: Option<Species>, condition: Option<Condition>) -> bool {
        self.allows_species(species) && self.allows_condition(condition)
    }
}

/// Session-scoped set of case ids that have already been considered.
/// Deliberately not persisted: a fresh session may notify again.
#[derive(Debug, Clone, Default)]
pub struct NotifySession {
    seen: HashSet<AlertId>,
}

impl NotifySession {
    #[must_use]
    pub fn has_seen(&self, id: &AlertId) -> bool {
        self.seen.contains(id)
    }

    pub fn record(&mut self, id: AlertId) {
        self.seen.insert(id);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub channel_id: String,
    pub title: String,
    pub body: String,
    pub deep_link: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuppressReason {
    AlreadySeen,
    OwnReport,
    NotOpen,
    OutOfRange,
    PrefsFiltered,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NotifyDecision {
    Fire(NotificationPayload),
    Suppress(SuppressReason),
}

/// Evaluates one case against the session. Any outcome other than
/// `AlreadySeen` records the case id, so a case is considered at most once
/// per session whether it fired or was suppressed.
pub fn evaluate(
    case: &AlertCase,
    current_user: Option<&UserId>,
    user_position: Option<ValidatedCoordinate>,
    prefs: &NotificationPrefs,
    session: &mut NotifySession,
) -> NotifyDecision {
    if session.has_seen(&case.id) {
        return NotifyDecision::Suppress(SuppressReason::AlreadySeen);
    }
    session.record(case.id.clone());

    if current_user == Some(&case.reporter) {
        return NotifyDecision::Suppress(SuppressReason::OwnReport);
    }
    if case.status != CaseStatus::Open {
        return NotifyDecision::Suppress(SuppressReason::NotOpen);
    }
    if let Some(position) = user_position {
        if !proximity::verdict(position, case.position).included {
            return NotifyDecision::Suppress(SuppressReason::OutOfRange);
        }
    }
    if !prefs.allows(case.species(), case.condition()) {
        return NotifyDecision::Suppress(SuppressReason::PrefsFiltered);
    }

    NotifyDecision::Fire(build_payload(case))
}

fn build_payload(case: &AlertCase) -> NotificationPayload {
    let mut preview = case.description.trim().to_string();
    if preview.len() > DESCRIPTION_PREVIEW_LENGTH {
        let cut = preview
            .char_indices()
            .take_while(|(i, _)| *i < DESCRIPTION_PREVIEW_LENGTH)
            .last()
            .map_or(0, |(i, c)| i + c.len_utf8());
        preview.truncate(cut);
        preview.push('…');
    }

    NotificationPayload {
        channel_id: NOTIFICATION_CHANNEL_ID.into(),
        title: format!("{} nearby: {}", case.species_label(), case.condition_label()),
        body: preview,
        deep_link: deeplink::format(&case.id),
    }
}

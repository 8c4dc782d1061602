//! Local notification capability.
//!
//! The shell owns the notification system; the core asks it to ensure the
//! alert channel exists and to show proximity alerts.

use crux_core::capability::{Capability, CapabilityContext, Operation};
use serde::{Deserialize, Serialize};

use crate::notify::NotificationPayload;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "op", content = "data")]
pub enum NotifyOperation {
    /// Idempotent: create the high-importance channel if it does not exist.
    EnsureChannel { channel_id: String },
    Show(NotificationPayload),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "data")]
pub enum NotifyOutput {
    ChannelReady,
    Shown,
    PermissionDenied,
    Failed { reason: String },
}

impl Operation for NotifyOperation {
    type Output = NotifyOutput;
}

pub struct Notify<Ev> {
    context: CapabilityContext<NotifyOperation, Ev>,
}

impl<Ev> Capability<Ev> for Notify<Ev> {
    type Operation = NotifyOperation;
    type MappedSelf<MappedEv> = Notify<MappedEv>;

    fn map_event<F, NewEv>(&self, f: F) -> Self::MappedSelf<NewEv>
    where
        F: Fn(NewEv) -> Ev + Send + Sync + 'static,
        Ev: 'static,
        NewEv: 'static + Send,
    {
        Notify::new(self.context.map_event(f))
    }
}

impl<Ev> Notify<Ev>
where
    Ev: 'static,
{
    pub fn new(context: CapabilityContext<NotifyOperation, Ev>) -> Self {
        Self { context }
    }

    pub fn ensure_channel<F>(&self, channel_id: impl Into<String>, make_event: F)
    where
        F: FnOnce(NotifyOutput) -> Ev + Send + 'static,
    {
        let ctx = self.context.clone();
        let op = NotifyOperation::EnsureChannel {
            channel_id: channel_id.into(),
        };
        self.context.spawn(async move {
            let output = ctx.request_from_shell(op).await;
            ctx.update_app(make_event(output));
        });
    }

    /// Fire-and-forget: show the notification, ignore the outcome.
    pub fn show(&self, payload: NotificationPayload) {
        let ctx = self.context.clone();
        self.context.spawn(async move {
            let _ = ctx.request_from_shell(NotifyOperation::Show(payload)).await;
        });
    }

    pub fn show_then<F>(&self, payload: NotificationPayload, make_event: F)
    where
        F: FnOnce(NotifyOutput) -> Ev + Send + 'static,
    {
        let ctx = self.context.clone();
        self.context.spawn(async move {
            let output = ctx
                .request_from_shell(NotifyOperation::Show(payload))
                .await;
            ctx.update_app(make_event(output));
        });
    }
}

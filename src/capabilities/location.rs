//! Location capability: position fixes and reverse geocoding.

use crux_core::capability::{Capability, CapabilityContext, Operation};
use serde::{Deserialize, Serialize};

use crate::ValidatedCoordinate;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "op", content = "data")]
pub enum LocationOperation {
    GetPosition,
    ReverseGeocode { lat: f64, lon: f64 },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data")]
pub enum LocationOutput {
    Position { lat: f64, lon: f64 },
    PositionUnavailable,
    PermissionDenied,
    Address(Option<String>),
}

impl Operation for LocationOperation {
    type Output = LocationOutput;
}

pub struct Location<Ev> {
    context: CapabilityContext<LocationOperation, Ev>,
}

impl<Ev> Capability<Ev> for Location<Ev> {
    type Operation = LocationOperation;
    type MappedSelf<MappedEv> = Location<MappedEv>;

    fn map_event<F, NewEv>(&self, f: F) -> Self::MappedSelf<NewEv>
    where
        F: Fn(NewEv) -> Ev + Send + Sync + 'static,
        Ev: 'static,
        NewEv: 'static + Send,
    {
        Location::new(self.context.map_event(f))
    }
}

impl<Ev> Location<Ev>
where
    Ev: 'static,
{
    pub fn new(context: CapabilityContext<LocationOperation, Ev>) -> Self {
        Self { context }
    }

    pub fn get_position<F>(&self, make_event: F)
    where
        F: FnOnce(LocationOutput) -> Ev + Send + 'static,
    {
        let ctx = self.context.clone();
        self.context.spawn(async move {
            let output = ctx.request_from_shell(LocationOperation::GetPosition).await;
            ctx.update_app(make_event(output));
        });
    }

    pub fn reverse_geocode<F>(&self, coord: ValidatedCoordinate, make_event: F)
    where
        F: FnOnce(LocationOutput) -> Ev + Send + 'static,
    {
        let ctx = self.context.clone();
        let op = LocationOperation::ReverseGeocode {
            lat: coord.lat(),
            lon: coord.lon(),
        };
        self.context.spawn(async move {
            let output = ctx.request_from_shell(op).await;
            ctx.update_app(make_event(output));
        });
    }
}

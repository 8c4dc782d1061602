mod location;
mod notify;

pub use self::location::{Location, LocationOperation, LocationOutput};
pub use self::notify::{Notify, NotifyOperation, NotifyOutput};

// Built-in capabilities are used directly; they already cover rendering,
// HTTP and key-value storage.
pub use crux_core::render::Render;
pub use crux_http::Http;
pub use crux_kv::KeyValue;

use crate::app::App;
use crate::event::Event;

#[derive(crux_core::macros::Effect)]
#[effect(app = "App")]
pub struct Capabilities {
    pub render: Render<Event>,
    pub http: Http<Event>,
    pub key_value: KeyValue<Event>,
    pub notify: Notify<Event>,
    pub location: Location<Event>,
}

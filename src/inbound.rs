//! Transport-neutral view of an inbound call event
//!
//! Both adapters reduce whatever they received to [`InboundFields`] and go
//! through the same id resolution and event classification.

use crate::state_machine::Event;

/// Fields common to every transport, each possibly absent
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InboundFields {
    pub call_sid: Option<String>,
    pub caller: Option<String>,
    pub utterance: Option<String>,
}

impl InboundFields {
    /// Session key for this event.
    ///
    /// Explicit call id first, then the caller number, then a fresh id.
    /// Blank values count as absent.
    pub fn resolve_call_id(&self) -> String {
        non_blank(self.call_sid.as_deref())
            .or_else(|| non_blank(self.caller.as_deref()))
            .map_or_else(synthesize_call_id, str::to_string)
    }

    /// The event this request carries
    pub fn event(&self) -> Event {
        Event::inbound(self.utterance.clone())
    }

    pub fn into_parts(self) -> (String, Event) {
        let call_id = self.resolve_call_id();
        (call_id, Event::inbound(self.utterance))
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn synthesize_call_id() -> String {
    let id = format!("anon-{}", uuid::Uuid::new_v4());
    tracing::debug!(call_id = %id, "No call id or caller on request; synthesized one");
    id
}

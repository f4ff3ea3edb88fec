//! Notifications and presentation hand-off.
//!
//! The orchestrator reports what it inserted to zero or more listeners and
//! hands highlight-enabled nodes to a presenter. Neither collaborator is
//! required; an empty [`EventBus`] and [`NoPresenter`] are valid.

use crate::dom::{Document, NodeId};
use crate::model::CtaId;
use serde::Serialize;

/// Attribute that marks inserted content as highlight-enabled.
pub const HIGHLIGHT_ATTR: &str = "data-cta-highlight";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Notification {
    Shown { cta_id: CtaId, chain_index: usize, chain_length: usize },
    FallbackUsed { cta_id: CtaId, chain_index: usize, chain_length: usize },
}

impl Notification {
    pub fn name(&self) -> &'static str {
        match self {
            Notification::Shown { .. } => "shown",
            Notification::FallbackUsed { .. } => "fallback_used",
        }
    }

    pub fn cta_id(&self) -> CtaId {
        match *self {
            Notification::Shown { cta_id, .. } | Notification::FallbackUsed { cta_id, .. } => cta_id,
        }
    }
}

/// Analytics-style observer.
pub trait Listener {
    fn notify(&mut self, notification: &Notification);
}

impl<F: FnMut(&Notification)> Listener for F {
    fn notify(&mut self, notification: &Notification) {
        self(notification)
    }
}

/// Fan-out to every attached listener, in attach order.
#[derive(Default)]
pub struct EventBus<'a> {
    listeners: Vec<Box<dyn Listener + 'a>>,
}

impl<'a> EventBus<'a> {
    pub fn new() -> Self {
        Self { listeners: Vec::new() }
    }

    pub fn attach(&mut self, listener: impl Listener + 'a) {
        self.listeners.push(Box::new(listener));
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn emit(&mut self, notification: Notification) {
        tracing::debug!(event = notification.name(), cta_id = %notification.cta_id(), "notify");
        for listener in &mut self.listeners {
            listener.notify(&notification);
        }
    }
}

impl std::fmt::Debug for EventBus<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus").field("listeners", &self.listeners.len()).finish()
    }
}

/// Receives freshly inserted highlight-enabled nodes.
pub trait Presenter {
    fn present(&mut self, doc: &Document, node: NodeId);
}

impl<P: Presenter + ?Sized> Presenter for &mut P {
    fn present(&mut self, doc: &Document, node: NodeId) {
        (**self).present(doc, node)
    }
}

/// Presenter that ignores every hand-off.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPresenter;

impl Presenter for NoPresenter {
    fn present(&mut self, _doc: &Document, _node: NodeId) {}
}

/// Collects handed-off nodes; handy for inspection.
#[derive(Debug, Clone, Default)]
pub struct RecordingPresenter {
    pub presented: Vec<NodeId>,
}

impl Presenter for RecordingPresenter {
    fn present(&mut self, _doc: &Document, node: NodeId) {
        self.presented.push(node);
    }
}

/// Whether `node` or anything below it carries [`HIGHLIGHT_ATTR`].
pub fn wants_highlight(doc: &Document, node: NodeId) -> bool {
    doc.descendants(node).into_iter().any(|id| doc.attr(id, HIGHLIGHT_ATTR).is_some())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bus_fans_out_in_order() {
        let mut seen = Vec::new();
        {
            let mut bus = EventBus::new();
            bus.attach(|n: &Notification| seen.push(n.name()));
            bus.emit(Notification::Shown { cta_id: CtaId(1), chain_index: 0, chain_length: 1 });
            bus.emit(Notification::FallbackUsed { cta_id: CtaId(2), chain_index: 1, chain_length: 2 });
            assert_eq!(bus.len(), 1);
        }
        assert_eq!(seen, vec!["shown", "fallback_used"]);
    }

    #[test]
    fn empty_bus_is_fine() {
        let mut bus = EventBus::new();
        assert!(bus.is_empty());
        bus.emit(Notification::Shown { cta_id: CtaId(1), chain_index: 0, chain_length: 1 });
    }

    #[test]
    fn notification_wire_shape() {
        let json = serde_json::to_string(&Notification::FallbackUsed { cta_id: CtaId(9), chain_index: 2, chain_length: 3 })
            .unwrap();
        assert_eq!(json, r#"{"event":"fallback_used","cta_id":9,"chain_index":2,"chain_length":3}"#);
    }

    #[test]
    fn highlight_marker_detection() {
        let doc = Document::parse("<div><p>a</p></div><div><span data-cta-highlight>b</span></div>");
        let divs = doc.element_children(doc.root());
        assert!(!wants_highlight(&doc, divs[0]));
        assert!(wants_highlight(&doc, divs[1]));
    }
}

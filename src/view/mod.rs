//! The flow store: an ordered, filterable view over captured flows.
//!
//! The view keeps every flow it has been handed (the backing universe) and
//! a visible sequence restricted by a filter predicate fixed at
//! construction. Order is insertion order among flows passing the filter.
//! A flow failing the filter stays in the universe, so a later update can
//! implicitly insert it; it just never appears in the visible sequence.
//!
//! Mutations report the [`ViewEvent`] the mutation bus must broadcast;
//! the view itself never talks to subscribers.

use crate::flow::{Flow, FlowId, FlowSummary};
use std::collections::HashMap;

/// Filter predicate deciding visibility. Fixed at configuration time.
pub type FilterFn = Box<dyn Fn(&Flow) -> bool + Send>;

/// The store-level outcome of a mutation, to be translated into exactly
/// one broadcast signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewEvent {
    /// Flow became visible.
    Add(FlowId),
    /// Visible flow changed in place.
    Update(FlowId),
    /// Flow left the visible sequence.
    Remove(FlowId),
    /// The whole visible sequence was invalidated.
    Reset,
}

/// Ordered, filter-predicated flow store.
pub struct View {
    universe: HashMap<FlowId, Flow>,
    visible: Vec<FlowId>,
    filter: Option<FilterFn>,
}

impl Default for View {
    fn default() -> Self {
        Self::new()
    }
}

impl View {
    /// Create a view with no filter: every flow is visible.
    pub fn new() -> Self {
        Self {
            universe: HashMap::new(),
            visible: Vec::new(),
            filter: None,
        }
    }

    /// Create a view restricted by `filter`.
    pub fn with_filter(filter: FilterFn) -> Self {
        Self {
            universe: HashMap::new(),
            visible: Vec::new(),
            filter: Some(filter),
        }
    }

    fn passes(&self, flow: &Flow) -> bool {
        self.filter.as_ref().map(|f| f(flow)).unwrap_or(true)
    }

    fn is_visible(&self, id: &FlowId) -> bool {
        self.visible.contains(id)
    }

    /// Whether `id` is in the backing universe (visible or not).
    pub fn contains(&self, id: &FlowId) -> bool {
        self.universe.contains_key(id)
    }

    /// Look up a flow by id, visible or not.
    pub fn get(&self, id: &FlowId) -> Option<&Flow> {
        self.universe.get(id)
    }

    /// Mutable access to a stored flow. Callers must follow up with a
    /// re-evaluation so observers see the change.
    pub fn get_mut(&mut self, id: &FlowId) -> Option<&mut Flow> {
        self.universe.get_mut(id)
    }

    /// Number of visible flows.
    pub fn len(&self) -> usize {
        self.visible.len()
    }

    /// Whether the visible sequence is empty.
    pub fn is_empty(&self) -> bool {
        self.visible.is_empty()
    }

    /// The visible flows in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Flow> {
        self.visible.iter().filter_map(|id| self.universe.get(id))
    }

    /// Visible flow ids in insertion order.
    pub fn visible_ids(&self) -> Vec<FlowId> {
        self.visible.clone()
    }

    /// Summaries of the visible flows, in order.
    pub fn summaries(&self) -> Vec<FlowSummary> {
        self.iter().map(FlowSummary::of).collect()
    }

    /// Ids of every flow in the universe, visible or not.
    pub fn universe_ids(&self) -> Vec<FlowId> {
        self.universe.keys().copied().collect()
    }

    /// Insert a flow.
    ///
    /// A flow failing the filter is stored but not made visible, and no
    /// event is reported. Inserting an id that already exists degrades to
    /// an update.
    pub fn add(&mut self, flow: Flow) -> Option<ViewEvent> {
        if self.universe.contains_key(&flow.id) {
            return self.update(flow);
        }
        let id = flow.id;
        let visible = self.passes(&flow);
        self.universe.insert(id, flow);
        if visible {
            self.visible.push(id);
            Some(ViewEvent::Add(id))
        } else {
            None
        }
    }

    /// Replace a stored flow with an updated copy.
    ///
    /// Unknown ids are a silent no-op. The filter is re-evaluated: a flow
    /// that stops matching is implicitly removed (reports `Remove`, not
    /// `Update`); one that starts matching is implicitly inserted
    /// (reports `Add`). The control plane's undo snapshot survives the
    /// replacement.
    pub fn update(&mut self, flow: Flow) -> Option<ViewEvent> {
        let id = flow.id;
        let existing = self.universe.get_mut(&id)?;
        let prev = std::mem::replace(existing, flow);
        existing.inherit_backup(prev);
        self.reevaluate(&id)
    }

    /// Re-evaluate the filter for `id` after an in-place mutation and
    /// report the resulting event.
    pub fn reevaluate(&mut self, id: &FlowId) -> Option<ViewEvent> {
        let flow = self.universe.get(id)?;
        let passes = self.passes(flow);
        match (self.is_visible(id), passes) {
            (true, true) => Some(ViewEvent::Update(*id)),
            (true, false) => {
                self.visible.retain(|v| v != id);
                Some(ViewEvent::Remove(*id))
            }
            (false, true) => {
                self.visible.push(*id);
                Some(ViewEvent::Add(*id))
            }
            (false, false) => None,
        }
    }

    /// Drop a flow from the store.
    ///
    /// Reports `Remove` only when the flow was visible; observers never
    /// saw a filtered-out flow, so there is nothing to retract.
    pub fn remove(&mut self, id: &FlowId) -> Option<ViewEvent> {
        self.universe.remove(id)?;
        if self.is_visible(id) {
            self.visible.retain(|v| v != id);
            Some(ViewEvent::Remove(*id))
        } else {
            None
        }
    }

    /// Empty the store. Reports a single `Reset` rather than N removes.
    pub fn clear(&mut self) -> ViewEvent {
        self.universe.clear();
        self.visible.clear();
        ViewEvent::Reset
    }

    /// Insert a copy of `id` under a fresh identifier.
    ///
    /// Returns the new id and the event to broadcast (none when the copy
    /// fails the filter).
    pub fn duplicate(&mut self, id: &FlowId) -> Option<(FlowId, Option<ViewEvent>)> {
        let copy = self.universe.get(id)?.duplicate();
        let new_id = copy.id;
        let event = self.add(copy);
        Some((new_id, event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::FlowType;

    fn flow() -> Flow {
        Flow::new(FlowType::Http)
    }

    fn intercepted_only() -> FilterFn {
        Box::new(|f: &Flow| f.intercepted)
    }

    #[test]
    fn test_add_preserves_insertion_order() {
        let mut view = View::new();
        let (a, b, c) = (flow(), flow(), flow());
        let ids = [a.id, b.id, c.id];
        for f in [a, b, c] {
            assert!(matches!(view.add(f), Some(ViewEvent::Add(_))));
        }
        assert_eq!(view.visible_ids(), ids);
    }

    #[test]
    fn test_filtered_add_is_invisible_but_stored() {
        let mut view = View::with_filter(intercepted_only());
        let f = flow();
        let id = f.id;
        assert_eq!(view.add(f), None);
        assert!(view.is_empty());
        assert!(view.contains(&id));
    }

    #[test]
    fn test_update_into_filter_reports_add() {
        let mut view = View::with_filter(intercepted_only());
        let f = flow();
        let id = f.id;
        view.add(f.clone());

        let mut updated = f;
        updated.intercepted = true;
        assert_eq!(view.update(updated), Some(ViewEvent::Add(id)));
        assert_eq!(view.len(), 1);
    }

    #[test]
    fn test_update_out_of_filter_reports_remove() {
        let mut view = View::with_filter(intercepted_only());
        let mut f = flow();
        f.intercepted = true;
        let id = f.id;
        view.add(f.clone());

        f.intercepted = false;
        assert_eq!(view.update(f), Some(ViewEvent::Remove(id)));
        assert!(view.is_empty());
        assert!(view.contains(&id));
    }

    #[test]
    fn test_update_unknown_is_noop() {
        let mut view = View::new();
        assert_eq!(view.update(flow()), None);
    }

    #[test]
    fn test_remove_invisible_reports_nothing() {
        let mut view = View::with_filter(intercepted_only());
        let f = flow();
        let id = f.id;
        view.add(f);
        assert_eq!(view.remove(&id), None);
        assert!(!view.contains(&id));
    }

    #[test]
    fn test_remove_middle_keeps_order() {
        let mut view = View::new();
        let (a, b, c) = (flow(), flow(), flow());
        let (ida, idb, idc) = (a.id, b.id, c.id);
        for f in [a, b, c] {
            view.add(f);
        }
        assert_eq!(view.remove(&idb), Some(ViewEvent::Remove(idb)));
        assert_eq!(view.visible_ids(), vec![ida, idc]);
    }

    #[test]
    fn test_clear_reports_single_reset() {
        let mut view = View::new();
        for _ in 0..3 {
            view.add(flow());
        }
        assert_eq!(view.clear(), ViewEvent::Reset);
        assert!(view.is_empty());
        assert!(view.universe_ids().is_empty());
    }

    #[test]
    fn test_duplicate_inserts_copy_with_fresh_id() {
        let mut view = View::new();
        let f = flow();
        let id = f.id;
        view.add(f);

        let (new_id, event) = view.duplicate(&id).unwrap();
        assert_ne!(new_id, id);
        assert_eq!(event, Some(ViewEvent::Add(new_id)));
        assert_eq!(view.len(), 2);
    }

    #[test]
    fn test_update_preserves_undo_snapshot() {
        let mut view = View::new();
        let f = flow();
        let id = f.id;
        view.add(f.clone());
        view.get_mut(&id).unwrap().backup();

        // engine-side replacement carries no snapshot of its own
        view.update(f);
        assert!(view.get(&id).unwrap().has_backup());
    }
}

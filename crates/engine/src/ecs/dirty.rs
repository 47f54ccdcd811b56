use crate::types::EntityId;

/// Per-entity marker. Dirty iff `dirty_version` equals the global version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CompDirty {
    pub dirty_version: u64,
}

impl CompDirty {
    pub fn is_dirty(&self, global_version: u64) -> bool {
        self.dirty_version == global_version
    }
}

/// Entities whose render-visible state changed during the current tick.
#[derive(Debug, Clone)]
pub struct DirtySet {
    global_version: u64,
    dirty_entities: Vec<EntityId>,
}

impl Default for DirtySet {
    fn default() -> Self {
        Self::new()
    }
}

impl DirtySet {
    pub fn new() -> Self {
        // Starts above CompDirty's default so fresh components are clean.
        Self {
            global_version: 1,
            dirty_entities: Vec::new(),
        }
    }

    pub fn global_version(&self) -> u64 {
        self.global_version
    }

    pub fn entities(&self) -> &[EntityId] {
        &self.dirty_entities
    }

    pub fn len(&self) -> usize {
        self.dirty_entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dirty_entities.is_empty()
    }

    /// Sorts the list by id so snapshots are reproducible.
    pub fn sort(&mut self) {
        self.dirty_entities.sort_unstable();
    }

    pub fn increment_version(&mut self) {
        self.global_version = self.global_version.wrapping_add(1).max(1);
    }

    pub fn clear(&mut self) {
        self.dirty_entities.clear();
    }

    pub(super) fn push(&mut self, id: EntityId) {
        self.dirty_entities.push(id);
    }
}

#[cfg(test)]
mod tests {
    use super::super::GameState;
    use super::*;

    #[test]
    fn mark_dirty_dedupes_within_a_tick() {
        let mut state = GameState::new();
        let id = state.create_entity();
        state.add_component(id, CompDirty::default());

        state.mark_dirty(id);
        state.mark_dirty(id);

        assert_eq!(state.dirty().entities(), &[id]);
        assert!(state.is_dirty(id));
    }

    #[test]
    fn untouched_entity_is_clean_next_tick() {
        let mut state = GameState::new();
        let id = state.create_entity();
        state.add_component(id, CompDirty::default());
        assert!(!state.is_dirty(id));

        state.mark_dirty(id);
        state.dirty_mut().increment_version();
        state.dirty_mut().clear();

        assert!(!state.is_dirty(id));
        assert!(state.dirty().is_empty());

        state.mark_dirty(id);
        assert_eq!(state.dirty().entities(), &[id]);
    }

    #[test]
    fn entities_without_marker_are_never_listed() {
        let mut state = GameState::new();
        let id = state.create_entity();
        state.mark_dirty(id);
        assert!(state.dirty().is_empty());
    }

    #[test]
    fn sort_orders_by_entity_id() {
        let mut state = GameState::new();
        let ids: Vec<_> = (0..4).map(|_| state.create_entity()).collect();
        for id in &ids {
            state.add_component(*id, CompDirty::default());
        }
        for id in ids.iter().rev() {
            state.mark_dirty(*id);
        }
        state.dirty_mut().sort();
        assert_eq!(state.dirty().entities(), ids.as_slice());
    }
}

mod dirty;

use std::any::{Any, TypeId};
use std::collections::HashMap;

use tracing::error;

use crate::types::EntityId;

pub use dirty::{CompDirty, DirtySet};

trait ComponentStore: Send {
    fn remove_entity(&mut self, id: EntityId);
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

const EMPTY: u32 = u32::MAX;

/// Packed per-component storage indexed by entity id.
struct SparseSet<T> {
    sparse: Vec<u32>,
    dense: Vec<EntityId>,
    data: Vec<T>,
}

impl<T: Send + 'static> SparseSet<T> {
    fn new() -> Self {
        Self {
            sparse: Vec::new(),
            dense: Vec::new(),
            data: Vec::new(),
        }
    }

    fn slot(&self, id: EntityId) -> Option<usize> {
        match self.sparse.get(id.index()) {
            Some(&slot) if slot != EMPTY => Some(slot as usize),
            _ => None,
        }
    }

    fn insert(&mut self, id: EntityId, value: T) {
        let idx = id.index();
        if idx >= self.sparse.len() {
            self.sparse.resize(idx + 1, EMPTY);
        }
        match self.slot(id) {
            Some(slot) => self.data[slot] = value,
            None => {
                self.sparse[idx] = self.dense.len() as u32;
                self.dense.push(id);
                self.data.push(value);
            }
        }
    }

    fn remove(&mut self, id: EntityId) -> Option<T> {
        let slot = self.slot(id)?;
        self.sparse[id.index()] = EMPTY;
        let last = self.dense.len() - 1;
        if slot != last {
            let moved = self.dense[last];
            self.sparse[moved.index()] = slot as u32;
        }
        self.dense.swap_remove(slot);
        Some(self.data.swap_remove(slot))
    }

    fn get(&self, id: EntityId) -> Option<&T> {
        self.slot(id).map(|slot| &self.data[slot])
    }

    fn get_mut(&mut self, id: EntityId) -> Option<&mut T> {
        self.slot(id).map(move |slot| &mut self.data[slot])
    }
}

impl<T: Send + 'static> ComponentStore for SparseSet<T> {
    fn remove_entity(&mut self, id: EntityId) {
        self.remove(id);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Authoritative entity/component state. Mutated by the simulator thread only.
///
/// Entity ids are never reused, so a stale id simply misses every lookup.
/// Destruction is deferred: `destroy_entity` queues the id and
/// `apply_pending_destroys` removes it at the frame rendezvous.
pub struct GameState {
    next_id: u32,
    alive: Vec<bool>,
    alive_count: usize,
    stores: HashMap<TypeId, Box<dyn ComponentStore>>,
    pending_destroys: Vec<EntityId>,
    dirty: DirtySet,
}

impl Default for GameState {
    fn default() -> Self {
        Self::new()
    }
}

impl GameState {
    pub fn new() -> Self {
        Self {
            next_id: 0,
            alive: Vec::new(),
            alive_count: 0,
            stores: HashMap::new(),
            pending_destroys: Vec::new(),
            dirty: DirtySet::new(),
        }
    }

    pub fn create_entity(&mut self) -> EntityId {
        let id = EntityId(self.next_id);
        self.next_id = self.next_id.saturating_add(1);
        self.alive.push(true);
        self.alive_count += 1;
        id
    }

    pub fn is_alive(&self, id: EntityId) -> bool {
        self.alive.get(id.index()).copied().unwrap_or(false)
    }

    pub fn entity_count(&self) -> usize {
        self.alive_count
    }

    /// Every live entity id in ascending order.
    pub fn entities(&self) -> Vec<EntityId> {
        self.alive
            .iter()
            .enumerate()
            .filter(|(_, alive)| **alive)
            .map(|(index, _)| EntityId(index as u32))
            .collect()
    }

    /// Adds or replaces a component in place.
    pub fn add_component<T: Send + 'static>(&mut self, id: EntityId, component: T) {
        if !self.is_alive(id) {
            error!(entity = id.0, component = std::any::type_name::<T>(), "add_component_on_dead_entity");
            return;
        }
        self.store_mut::<T>().insert(id, component);
    }

    pub fn remove_component<T: Send + 'static>(&mut self, id: EntityId) -> Option<T> {
        self.existing_store_mut::<T>()?.remove(id)
    }

    pub fn get_component<T: Send + 'static>(&self, id: EntityId) -> Option<&T> {
        self.store::<T>()?.get(id)
    }

    pub fn get_component_mut<T: Send + 'static>(&mut self, id: EntityId) -> Option<&mut T> {
        self.existing_store_mut::<T>()?.get_mut(id)
    }

    pub fn get_components<A: Send + 'static, B: Send + 'static>(
        &self,
        id: EntityId,
    ) -> Option<(&A, &B)> {
        Some((self.get_component::<A>(id)?, self.get_component::<B>(id)?))
    }

    pub fn has_component<T: Send + 'static>(&self, id: EntityId) -> bool {
        self.get_component::<T>(id).is_some()
    }

    /// Ids of entities carrying `T`, ascending.
    pub fn entities_with<T: Send + 'static>(&self) -> Vec<EntityId> {
        let mut ids = self
            .store::<T>()
            .map(|store| store.dense.clone())
            .unwrap_or_default();
        ids.sort_unstable();
        ids
    }

    /// Ids of entities carrying both `A` and `B`, ascending.
    pub fn entities_with2<A: Send + 'static, B: Send + 'static>(&self) -> Vec<EntityId> {
        let mut ids = self.entities_with::<A>();
        ids.retain(|id| self.has_component::<B>(*id));
        ids
    }

    /// Visits every `T` in ascending entity order.
    pub fn each<T: Send + 'static>(&self, mut visit: impl FnMut(EntityId, &T)) {
        let Some(store) = self.store::<T>() else {
            return;
        };
        for id in self.entities_with::<T>() {
            if let Some(component) = store.get(id) {
                visit(id, component);
            }
        }
    }

    pub fn each_mut<T: Send + 'static>(&mut self, mut visit: impl FnMut(EntityId, &mut T)) {
        let ids = self.entities_with::<T>();
        let Some(store) = self.existing_store_mut::<T>() else {
            return;
        };
        for id in ids {
            if let Some(component) = store.get_mut(id) {
                visit(id, component);
            }
        }
    }

    pub fn destroy_entity(&mut self, id: EntityId) {
        if !self.is_alive(id) {
            return;
        }
        if !self.pending_destroys.contains(&id) {
            self.pending_destroys.push(id);
        }
    }

    pub fn pending_destroys(&self) -> &[EntityId] {
        &self.pending_destroys
    }

    pub fn is_pending_destroy(&self, id: EntityId) -> bool {
        self.pending_destroys.contains(&id)
    }

    /// Removes every queued entity and its components. Returns the removed ids.
    pub fn apply_pending_destroys(&mut self) -> Vec<EntityId> {
        let pending = std::mem::take(&mut self.pending_destroys);
        for id in &pending {
            for store in self.stores.values_mut() {
                store.remove_entity(*id);
            }
            if let Some(alive) = self.alive.get_mut(id.index()) {
                if *alive {
                    *alive = false;
                    self.alive_count -= 1;
                }
            }
        }
        pending
    }

    pub fn dirty(&self) -> &DirtySet {
        &self.dirty
    }

    pub fn dirty_mut(&mut self) -> &mut DirtySet {
        &mut self.dirty
    }

    /// Flags `id` for this tick's render snapshot. Needs a `CompDirty`.
    pub fn mark_dirty(&mut self, id: EntityId) {
        let version = self.dirty.global_version();
        let Some(dirty) = self.get_component_mut::<CompDirty>(id) else {
            return;
        };
        if dirty.dirty_version == version {
            return;
        }
        dirty.dirty_version = version;
        self.dirty.push(id);
    }

    pub fn is_dirty(&self, id: EntityId) -> bool {
        self.get_component::<CompDirty>(id)
            .is_some_and(|dirty| dirty.is_dirty(self.dirty.global_version()))
    }

    /// Marks every entity carrying `CompDirty`.
    pub fn mark_all_dirty(&mut self) {
        for id in self.entities_with::<CompDirty>() {
            self.mark_dirty(id);
        }
    }

    fn store<T: Send + 'static>(&self) -> Option<&SparseSet<T>> {
        self.stores
            .get(&TypeId::of::<T>())
            .and_then(|store| store.as_any().downcast_ref::<SparseSet<T>>())
    }

    fn existing_store_mut<T: Send + 'static>(&mut self) -> Option<&mut SparseSet<T>> {
        self.stores
            .get_mut(&TypeId::of::<T>())
            .and_then(|store| store.as_any_mut().downcast_mut::<SparseSet<T>>())
    }

    fn store_mut<T: Send + 'static>(&mut self) -> &mut SparseSet<T> {
        let store = self
            .stores
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(SparseSet::<T>::new()));
        match store.as_any_mut().downcast_mut::<SparseSet<T>>() {
            Some(store) => store,
            None => unreachable!("component store registered under a foreign TypeId"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Position(i32);

    #[derive(Debug, PartialEq)]
    struct Speed(u32);

    #[test]
    fn ids_are_sequential_and_never_reused() {
        let mut state = GameState::new();
        let a = state.create_entity();
        let b = state.create_entity();
        state.destroy_entity(a);
        state.apply_pending_destroys();
        let c = state.create_entity();

        assert_eq!((a, b, c), (EntityId(0), EntityId(1), EntityId(2)));
        assert!(!state.is_alive(a));
        assert_eq!(state.entity_count(), 2);
    }

    #[test]
    fn components_are_added_replaced_and_removed() {
        let mut state = GameState::new();
        let id = state.create_entity();
        state.add_component(id, Position(1));
        state.add_component(id, Position(2));

        assert_eq!(state.get_component::<Position>(id), Some(&Position(2)));
        assert!(!state.has_component::<Speed>(id));

        state
            .get_component_mut::<Position>(id)
            .expect("position")
            .0 += 5;
        assert_eq!(state.remove_component::<Position>(id), Some(Position(7)));
        assert!(!state.has_component::<Position>(id));
    }

    #[test]
    fn views_iterate_in_ascending_id_order() {
        let mut state = GameState::new();
        let ids: Vec<_> = (0..5).map(|_| state.create_entity()).collect();
        for id in ids.iter().rev() {
            state.add_component(*id, Position(id.0 as i32));
        }
        state.add_component(ids[1], Speed(3));
        state.add_component(ids[4], Speed(1));
        state.remove_component::<Position>(ids[2]);

        assert_eq!(
            state.entities_with::<Position>(),
            vec![ids[0], ids[1], ids[3], ids[4]]
        );
        assert_eq!(state.entities_with2::<Position, Speed>(), vec![ids[1], ids[4]]);

        let mut visited = Vec::new();
        state.each::<Position>(|id, pos| visited.push((id, pos.0)));
        assert_eq!(visited, vec![(ids[0], 0), (ids[1], 1), (ids[3], 3), (ids[4], 4)]);

        state.each_mut::<Speed>(|_, speed| speed.0 *= 10);
        assert_eq!(
            state.get_components::<Position, Speed>(ids[4]),
            Some((&Position(4), &Speed(10)))
        );
    }

    #[test]
    fn destruction_is_deferred_until_applied() {
        let mut state = GameState::new();
        let id = state.create_entity();
        state.add_component(id, Position(9));
        state.destroy_entity(id);
        state.destroy_entity(id);

        assert!(state.is_alive(id));
        assert_eq!(state.get_component::<Position>(id), Some(&Position(9)));
        assert_eq!(state.pending_destroys(), &[id]);

        assert_eq!(state.apply_pending_destroys(), vec![id]);
        assert!(state.get_component::<Position>(id).is_none());
        assert!(state.entities_with::<Position>().is_empty());
    }

    #[test]
    fn components_on_dead_entities_are_ignored() {
        let mut state = GameState::new();
        state.add_component(EntityId(42), Position(1));
        assert!(state.get_component::<Position>(EntityId(42)).is_none());
    }
}

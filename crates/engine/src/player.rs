use std::collections::BTreeSet;

use tracing::error;

use crate::fog::{FogOfWar, RevealStatus};
use crate::types::{EntityId, PlayerId, ResourceType, MAX_PLAYERS, RESOURCE_MAX};

/// A participant. Owned entities are referenced by id only.
#[derive(Debug, Clone)]
pub struct Player {
    id: PlayerId,
    resources: [u32; RESOURCE_MAX],
    owned: BTreeSet<EntityId>,
    pub fog: FogOfWar,
}

impl Player {
    pub fn new(id: PlayerId, map_width: i32, map_height: i32, initial_fog: RevealStatus) -> Self {
        Self {
            id,
            resources: [0; RESOURCE_MAX],
            owned: BTreeSet::new(),
            fog: FogOfWar::new(map_width, map_height, initial_fog),
        }
    }

    pub fn id(&self) -> PlayerId {
        self.id
    }

    pub fn resource(&self, resource_type: ResourceType) -> u32 {
        self.resources[resource_type.index()]
    }

    pub fn add_resource(&mut self, resource_type: ResourceType, amount: u32) {
        let slot = &mut self.resources[resource_type.index()];
        *slot = slot.saturating_add(amount);
    }

    /// Deducts `amount` if available. Returns false and leaves the stock untouched otherwise.
    pub fn spend_resource(&mut self, resource_type: ResourceType, amount: u32) -> bool {
        let slot = &mut self.resources[resource_type.index()];
        if *slot < amount {
            return false;
        }
        *slot -= amount;
        true
    }

    pub fn add_entity(&mut self, entity: EntityId) {
        self.owned.insert(entity);
    }

    pub fn remove_entity(&mut self, entity: EntityId) -> bool {
        self.owned.remove(&entity)
    }

    pub fn owns(&self, entity: EntityId) -> bool {
        self.owned.contains(&entity)
    }

    pub fn owned_entities(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.owned.iter().copied()
    }
}

#[derive(Debug, Clone, Default)]
pub struct PlayerManager {
    players: Vec<Player>,
}

impl PlayerManager {
    pub fn new(
        player_count: usize,
        map_width: i32,
        map_height: i32,
        initial_fog: RevealStatus,
    ) -> Self {
        let player_count = player_count.min(MAX_PLAYERS);
        let players = (0..player_count)
            .map(|id| Player::new(id as PlayerId, map_width, map_height, initial_fog))
            .collect();
        Self { players }
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.get(id as usize)
    }

    pub fn player_mut(&mut self, id: PlayerId) -> Option<&mut Player> {
        let player = self.players.get_mut(id as usize);
        if player.is_none() {
            error!(player = id, "unknown_player");
        }
        player
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn players_mut(&mut self) -> &mut [Player] {
        &mut self.players
    }

    pub fn owner_of(&self, entity: EntityId) -> Option<PlayerId> {
        self.players
            .iter()
            .find(|player| player.owns(entity))
            .map(Player::id)
    }

    /// Drops `entity` from whichever player owns it.
    pub fn forget_entity(&mut self, entity: EntityId) {
        for player in &mut self.players {
            player.remove_entity(entity);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resources_accumulate_and_spend() {
        let mut player = Player::new(0, 4, 4, RevealStatus::Unexplored);
        player.add_resource(ResourceType::Wood, 30);
        assert!(player.spend_resource(ResourceType::Wood, 20));
        assert!(!player.spend_resource(ResourceType::Wood, 20));
        assert_eq!(player.resource(ResourceType::Wood), 10);
        assert_eq!(player.resource(ResourceType::Gold), 0);
    }

    #[test]
    fn ownership_is_tracked_by_id() {
        let mut players = PlayerManager::new(2, 4, 4, RevealStatus::Unexplored);
        players
            .player_mut(1)
            .expect("player 1")
            .add_entity(EntityId(7));

        assert_eq!(players.owner_of(EntityId(7)), Some(1));
        players.forget_entity(EntityId(7));
        assert_eq!(players.owner_of(EntityId(7)), None);
    }

    #[test]
    fn player_count_is_capped() {
        let players = PlayerManager::new(MAX_PLAYERS + 3, 2, 2, RevealStatus::Explored);
        assert_eq!(players.len(), MAX_PLAYERS);
        assert!(players.player(MAX_PLAYERS as PlayerId).is_none());
    }
}

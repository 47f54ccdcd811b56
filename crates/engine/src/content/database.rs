use std::collections::BTreeMap;

use crate::components::Animation;
use crate::types::{EntityType, ResourceType, Size, UnitAction};

#[derive(Debug, Clone, PartialEq)]
pub struct UnitArchetype {
    pub entity_type: EntityType,
    pub label: String,
    /// Feet per second.
    pub speed: f32,
    pub line_of_sight: f32,
    pub collision_radius: f32,
    pub hit_points: u32,
    /// Resource units per second; zero for units that cannot gather.
    pub gather_speed: f32,
    pub carry_capacity: u32,
    pub attack_damage_per_second: f32,
    pub repair_per_second: f32,
    pub animations: BTreeMap<UnitAction, Animation>,
}

impl UnitArchetype {
    pub fn can_gather(&self) -> bool {
        self.gather_speed > 0.0 && self.carry_capacity > 0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BuildingArchetype {
    pub entity_type: EntityType,
    pub label: String,
    pub size: Size,
    pub line_of_sight: f32,
    pub hit_points: u32,
    pub build_time_ms: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResourceArchetype {
    pub entity_type: EntityType,
    pub label: String,
    pub resource_type: ResourceType,
    pub amount: u32,
    pub collision_radius: f32,
}

#[derive(Debug, Default, Clone)]
pub struct DefDatabase {
    units: BTreeMap<EntityType, UnitArchetype>,
    buildings: BTreeMap<EntityType, BuildingArchetype>,
    resources: BTreeMap<EntityType, ResourceArchetype>,
}

impl DefDatabase {
    pub(crate) fn from_defs(
        units: Vec<UnitArchetype>,
        buildings: Vec<BuildingArchetype>,
        resources: Vec<ResourceArchetype>,
    ) -> Self {
        Self {
            units: units.into_iter().map(|def| (def.entity_type, def)).collect(),
            buildings: buildings
                .into_iter()
                .map(|def| (def.entity_type, def))
                .collect(),
            resources: resources
                .into_iter()
                .map(|def| (def.entity_type, def))
                .collect(),
        }
    }

    pub fn unit(&self, entity_type: EntityType) -> Option<&UnitArchetype> {
        self.units.get(&entity_type)
    }

    pub fn building(&self, entity_type: EntityType) -> Option<&BuildingArchetype> {
        self.buildings.get(&entity_type)
    }

    pub fn resource(&self, entity_type: EntityType) -> Option<&ResourceArchetype> {
        self.resources.get(&entity_type)
    }

    pub fn def_count(&self) -> usize {
        self.units.len() + self.buildings.len() + self.resources.len()
    }
}

use std::collections::HashMap;

use crate::limits::*;
use crate::model::*;

use super::EngineError;

/// Arena owner for every zone, area and slot. All other components hold keys.
#[derive(Debug, Default)]
pub struct SlotPool {
    zones: Vec<Zone>,
    areas: Vec<ParkingArea>,
    slots: Vec<ParkingSlot>,
    zone_index: HashMap<ZoneId, ZoneKey>,
    slot_index: HashMap<SlotId, SlotKey>,
}

impl SlotPool {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Topology setup ───────────────────────────────────────

    pub fn add_zone(&mut self, id: ZoneId) -> Result<ZoneKey, EngineError> {
        if self.zone_index.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id.to_string()));
        }
        if self.zones.len() >= MAX_ZONES {
            return Err(EngineError::LimitExceeded("too many zones"));
        }
        let key = ZoneKey(self.zones.len());
        self.zones.push(Zone {
            id,
            areas: Vec::new(),
            adjacent: Vec::new(),
            total_capacity: 0,
        });
        self.zone_index.insert(id, key);
        Ok(key)
    }

    pub fn add_area(&mut self, zone_id: ZoneId, area_id: AreaId) -> Result<AreaKey, EngineError> {
        let zone_key = self.zone_key(zone_id).ok_or(EngineError::ZoneNotFound(zone_id))?;
        if self.find_area(zone_id, area_id).is_some() {
            return Err(EngineError::AlreadyExists(format!("{area_id} in {zone_id}")));
        }
        if self.zones[zone_key.0].areas.len() >= MAX_AREAS_PER_ZONE {
            return Err(EngineError::LimitExceeded("too many areas in zone"));
        }
        let key = AreaKey(self.areas.len());
        self.areas.push(ParkingArea {
            id: area_id,
            zone: zone_key,
            slots: Vec::new(),
            total_slots: 0,
            available_slots: 0,
        });
        self.zones[zone_key.0].areas.push(key);
        Ok(key)
    }

    pub fn add_slot(
        &mut self,
        zone_id: ZoneId,
        area_id: AreaId,
        slot_id: SlotId,
    ) -> Result<SlotKey, EngineError> {
        let area_key = self
            .find_area(zone_id, area_id)
            .ok_or(EngineError::AreaNotFound {
                zone: zone_id,
                area: area_id,
            })?;
        if self.slot_index.contains_key(&slot_id) {
            return Err(EngineError::AlreadyExists(slot_id.to_string()));
        }
        if self.areas[area_key.0].slots.len() >= MAX_SLOTS_PER_AREA {
            return Err(EngineError::LimitExceeded("too many slots in area"));
        }
        let key = SlotKey(self.slots.len());
        self.slots.push(ParkingSlot {
            id: slot_id,
            zone_id,
            area: area_key,
            available: true,
        });
        self.slot_index.insert(slot_id, key);
        self.areas[area_key.0].slots.push(key);
        let zone_key = self.areas[area_key.0].zone;
        self.refresh_zone(zone_key);
        Ok(key)
    }

    /// One direction only; self links and repeats are ignored.
    pub fn add_adjacency(&mut self, from: ZoneId, to: ZoneId) -> Result<(), EngineError> {
        let from_key = self.zone_key(from).ok_or(EngineError::ZoneNotFound(from))?;
        if self.zone_key(to).is_none() {
            return Err(EngineError::ZoneNotFound(to));
        }
        let zone = &mut self.zones[from_key.0];
        if from == to || zone.adjacent.contains(&to) {
            return Ok(());
        }
        if zone.adjacent.len() >= MAX_ADJACENT_ZONES {
            return Err(EngineError::LimitExceeded("too many adjacent zones"));
        }
        zone.adjacent.push(to);
        Ok(())
    }

    /// Returns whether a link was removed.
    pub fn remove_adjacency(&mut self, from: ZoneId, to: ZoneId) -> Result<bool, EngineError> {
        let from_key = self.zone_key(from).ok_or(EngineError::ZoneNotFound(from))?;
        let adjacent = &mut self.zones[from_key.0].adjacent;
        let before = adjacent.len();
        adjacent.retain(|z| *z != to);
        Ok(adjacent.len() != before)
    }

    /// Smallest slot id greater than every id in the pool, or `None` once the
    /// pool holds `u32::MAX`.
    pub fn next_slot_id(&self) -> Option<SlotId> {
        match self.slots.iter().map(|s| s.id.0).max() {
            None => Some(SlotId(1)),
            Some(max) => max.checked_add(1).map(SlotId),
        }
    }

    // ── Lookup ───────────────────────────────────────────────

    pub fn zone_key(&self, id: ZoneId) -> Option<ZoneKey> {
        self.zone_index.get(&id).copied()
    }

    pub fn zone(&self, key: ZoneKey) -> Option<&Zone> {
        self.zones.get(key.0)
    }

    pub fn zone_by_id(&self, id: ZoneId) -> Option<&Zone> {
        self.zone_key(id).and_then(|k| self.zone(k))
    }

    /// Zones in insertion order.
    pub fn zones(&self) -> impl Iterator<Item = &Zone> {
        self.zones.iter()
    }

    pub fn area(&self, key: AreaKey) -> Option<&ParkingArea> {
        self.areas.get(key.0)
    }

    pub fn find_area(&self, zone_id: ZoneId, area_id: AreaId) -> Option<AreaKey> {
        let zone = self.zone_by_id(zone_id)?;
        zone.areas
            .iter()
            .copied()
            .find(|k| self.areas[k.0].id == area_id)
    }

    pub fn slot(&self, key: SlotKey) -> Option<&ParkingSlot> {
        self.slots.get(key.0)
    }

    pub fn find_by_id(&self, id: SlotId) -> Option<SlotKey> {
        self.slot_index.get(&id).copied()
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    // ── First-fit search ─────────────────────────────────────

    /// Earliest inserted available slot of the area.
    pub fn find_available_in_area(&self, key: AreaKey) -> Option<SlotKey> {
        self.area(key)?
            .slots
            .iter()
            .copied()
            .find(|s| self.slots[s.0].available)
    }

    /// Area order, then slot order.
    pub fn find_available_in_zone(&self, key: ZoneKey) -> Option<SlotKey> {
        self.zone(key)?
            .areas
            .iter()
            .find_map(|a| self.find_available_in_area(*a))
    }

    /// Summed over areas on every call; zones never cache availability.
    pub fn zone_available_slots(&self, key: ZoneKey) -> u32 {
        self.zone(key)
            .map(|z| z.areas.iter().map(|a| self.areas[a.0].available_slots).sum())
            .unwrap_or(0)
    }

    // ── Availability bookkeeping ─────────────────────────────

    /// Flip a slot's flag and refresh its area counters. Returns the owning
    /// zone key, or `None` if the key does not name a slot.
    pub(crate) fn set_available(&mut self, key: SlotKey, available: bool) -> Option<ZoneKey> {
        let slot = self.slots.get_mut(key.0)?;
        slot.available = available;
        let area = slot.area;
        let zone_key = self.areas[area.0].zone;
        self.refresh_area(area);
        metrics::gauge!(
            crate::observability::ZONE_AVAILABLE_SLOTS,
            "zone" => self.zones[zone_key.0].id.0.to_string()
        )
        .set(self.zone_available_slots(zone_key) as f64);
        Some(zone_key)
    }

    /// Recompute an area's cached counters by full scan.
    pub fn refresh_area(&mut self, key: AreaKey) {
        let Some(area) = self.areas.get(key.0) else {
            return;
        };
        let total = area.slots.len() as u32;
        let available = area
            .slots
            .iter()
            .filter(|s| self.slots[s.0].available)
            .count() as u32;
        let area = &mut self.areas[key.0];
        area.total_slots = total;
        area.available_slots = available;
    }

    /// Refresh every area of the zone, then the zone's cached capacity.
    pub fn refresh_zone(&mut self, key: ZoneKey) {
        let Some(zone) = self.zones.get(key.0) else {
            return;
        };
        let areas = zone.areas.clone();
        for area in &areas {
            self.refresh_area(*area);
        }
        let capacity = areas.iter().map(|a| self.areas[a.0].total_slots).sum();
        self.zones[key.0].total_capacity = capacity;
    }

    pub fn zone_info(&self, key: ZoneKey) -> Option<ZoneInfo> {
        let zone = self.zone(key)?;
        let available = self.zone_available_slots(key);
        let occupied = zone.total_capacity.saturating_sub(available);
        let utilization = if zone.total_capacity == 0 {
            0.0
        } else {
            occupied as f64 / zone.total_capacity as f64 * 100.0
        };
        Some(ZoneInfo {
            id: zone.id,
            total_capacity: zone.total_capacity,
            available_slots: available,
            occupied_slots: occupied,
            utilization,
            adjacent: zone.adjacent.clone(),
        })
    }
}

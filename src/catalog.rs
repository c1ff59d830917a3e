use async_trait::async_trait;
use dashmap::DashMap;
use ulid::Ulid;

use crate::model::Room;

/// Read-only room attribute provider. The booking core never writes rooms;
/// catalog management (naming, capacity edits) is an external concern.
#[async_trait]
pub trait RoomCatalog: Send + Sync {
    async fn get_room(&self, id: Ulid) -> Option<Room>;
}

/// In-process catalog backed by a DashMap. Embedders seed it at startup.
pub struct StaticCatalog {
    rooms: DashMap<Ulid, Room>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
        }
    }

    pub fn insert(&self, room: Room) {
        self.rooms.insert(room.id, room);
    }
}

impl Default for StaticCatalog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RoomCatalog for StaticCatalog {
    async fn get_room(&self, id: Ulid) -> Option<Room> {
        self.rooms.get(&id).map(|e| e.value().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn room(id: Ulid, capacity: u32) -> Room {
        Room {
            id,
            name: "Fishbowl".into(),
            capacity,
            facilities: BTreeSet::from(["projector".to_string()]),
            location: Some("3F".into()),
        }
    }

    #[tokio::test]
    async fn lookup_hit_and_miss() {
        let catalog = StaticCatalog::new();
        let id = Ulid::new();
        catalog.insert(room(id, 10));

        let found = catalog.get_room(id).await.unwrap();
        assert_eq!(found.capacity, 10);
        assert!(catalog.get_room(Ulid::new()).await.is_none());
    }
}

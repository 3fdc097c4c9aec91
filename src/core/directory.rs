//! Room directory
//!
//! Owns the set of active rooms keyed by id. Rooms are individually locked
//! so membership operations on one room serialize without stalling the
//! directory; the directory lock is never held while a room lock is taken.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use log::debug;
use uuid::Uuid;

use crate::core::events::{BusEvent, EventBus, ListenerId, EVENT_ROOM_REMOVE, EVENT_SEND};
use crate::core::message::{MemberInfo, RoomConfig, RoomInfo};
use crate::core::room::Room;
use crate::error::{Result, SignalHubError};

pub type SharedRoom = Arc<Mutex<Room>>;

struct DirectoryInner {
    rooms: RwLock<HashMap<String, SharedRoom>>,
}

pub struct RoomDirectory {
    inner: Arc<DirectoryInner>,
    bus: Arc<EventBus>,
    remove_listener: Option<ListenerId>,
}

impl RoomDirectory {
    /// Build a directory subscribed to the room-removal signal: a room is
    /// deleted the instant its membership reaches zero.
    pub fn new(bus: Arc<EventBus>) -> Self {
        if !bus.has(EVENT_SEND) {
            bus.register(EVENT_SEND);
        }
        if !bus.has(EVENT_ROOM_REMOVE) {
            bus.register(EVENT_ROOM_REMOVE);
        }

        let inner = Arc::new(DirectoryInner {
            rooms: RwLock::new(HashMap::new()),
        });

        let remove_listener = {
            let inner = inner.clone();
            bus.add_listener(EVENT_ROOM_REMOVE, move |event| {
                if let BusEvent::RoomRemoved(id) = event {
                    let mut rooms = inner.rooms.write().unwrap_or_else(|e| e.into_inner());
                    if rooms.remove(id).is_some() {
                        debug!("room {} removed from directory", id);
                    }
                }
            })
        };

        Self {
            inner,
            bus,
            remove_listener,
        }
    }

    /// Create a room with the creator as host and first member. The id
    /// comes from the config when supplied, otherwise a fresh uuid.
    pub fn create(&self, creator: MemberInfo, config: RoomConfig) -> Result<SharedRoom> {
        let id = config
            .id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let mut rooms = self
            .inner
            .rooms
            .write()
            .unwrap_or_else(|e| e.into_inner());
        if rooms.contains_key(&id) {
            return Err(SignalHubError::RoomExists(id));
        }

        let room = Arc::new(Mutex::new(Room::new(
            creator,
            config,
            id.clone(),
            self.bus.clone(),
        )));
        rooms.insert(id, room.clone());
        Ok(room)
    }

    pub fn get(&self, id: &str) -> Option<SharedRoom> {
        self.inner
            .rooms
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner
            .rooms
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.inner
            .rooms
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every room's summary, for the connect-time welcome.
    pub fn summaries(&self) -> Vec<RoomInfo> {
        let rooms: Vec<SharedRoom> = {
            let map = self.inner.rooms.read().unwrap_or_else(|e| e.into_inner());
            map.values().cloned().collect()
        };
        rooms
            .iter()
            .map(|room| room.lock().unwrap_or_else(|e| e.into_inner()).info())
            .collect()
    }

    /// Detach the bus listener. Safe to call once.
    pub fn close(&self) {
        if let Some(id) = self.remove_listener {
            self.bus.remove_listener(EVENT_ROOM_REMOVE, id);
        }
    }
}

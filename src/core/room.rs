//! Room membership state machine
//!
//! A room tracks its members, enforces capacity/password/ban rules and
//! host privileges, and reports every outcome through the event bus as
//! addressed messages. Authorization failures are protocol-level negative
//! responses, never errors.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::debug;

use crate::core::events::{BusEvent, EventBus, EVENT_ROOM_REMOVE, EVENT_SEND};
use crate::core::message::{
    DeniedReason, MemberInfo, Outbound, RoomConfig, RoomEvent, RoomInfo, SocketId,
};

/// What happened to the member on a leave call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveOutcome {
    /// The id was not a member; nothing was emitted or mutated.
    NotMember,
    /// Removed; remaining members were notified.
    Left,
    /// Removed as the last member; the room signalled its own removal.
    Emptied,
}

pub struct Room {
    pub id: String,
    pub name: String,
    pub host: SocketId,
    /// None means unlimited.
    limit: Option<usize>,
    password: Option<String>,
    /// Insertion order is meaningful: host succession picks the earliest
    /// remaining member.
    members: Vec<MemberInfo>,
    banned: HashSet<SocketId>,
    created_at: DateTime<Utc>,
    bus: Arc<EventBus>,
}

impl Room {
    /// Create a room and join the creator as host and first member.
    ///
    /// Creation always succeeds: the first-member fast path in [`join`]
    /// bypasses the room's own capacity/ban/password rules.
    pub fn new(creator: MemberInfo, config: RoomConfig, id: String, bus: Arc<EventBus>) -> Self {
        if !bus.has(EVENT_SEND) {
            bus.register(EVENT_SEND);
        }
        if !bus.has(EVENT_ROOM_REMOVE) {
            bus.register(EVENT_ROOM_REMOVE);
        }

        let mut room = Self {
            id,
            name: config.name,
            host: creator.id.clone(),
            limit: config.limit,
            password: config.password,
            members: Vec::new(),
            banned: HashSet::new(),
            created_at: Utc::now(),
            bus,
        };

        let password = room.password.clone();
        // cannot fail: the creator takes the first-member fast path
        let _ = room.join(creator, password.as_deref());
        room
    }

    /// Attempt to add a member. On denial the requester is sent an
    /// unauthorized message with the specific reason and nothing mutates.
    pub fn join(
        &mut self,
        member: MemberInfo,
        password: Option<&str>,
    ) -> Result<(), DeniedReason> {
        if self.members.is_empty() && member.id == self.host {
            // freshly created room: acknowledge creation to the host
            self.send_to(
                vec![member.id.clone()],
                RoomEvent::Created {
                    room: self.id.clone(),
                },
            );
            self.members.push(member);
            return Ok(());
        }

        if let Some(reason) = self.deny_reason(&member.id, password) {
            self.send_to(vec![member.id.clone()], RoomEvent::Unauthorized { reason });
            return Err(reason);
        }

        // existing members learn about the newcomer...
        self.send_to(self.member_ids(), RoomEvent::Join {
            socket: member.clone(),
        });
        // ...and the newcomer gets the member list as it was before the join
        self.send_to(
            vec![member.id.clone()],
            RoomEvent::Welcome {
                sockets: self.members.clone(),
                room: self.id.clone(),
                host: self.host.clone(),
            },
        );

        self.members.push(member);
        Ok(())
    }

    /// Remove a member. Emptying the room dispatches the removal signal and
    /// nothing else; otherwise remaining members are notified, with host
    /// succession when the host departed.
    pub fn leave(&mut self, socket: &str) -> LeaveOutcome {
        let Some(index) = self.members.iter().position(|m| m.id == socket) else {
            return LeaveOutcome::NotMember;
        };
        self.members.remove(index);

        if self.members.is_empty() {
            debug!("room {} emptied, signalling removal", self.id);
            self.bus
                .dispatch(EVENT_ROOM_REMOVE, BusEvent::RoomRemoved(self.id.clone()));
            return LeaveOutcome::Emptied;
        }

        self.send_to(self.member_ids(), RoomEvent::Leave {
            socket: socket.to_string(),
            room: self.id.clone(),
        });

        if self.host == socket {
            // deterministic succession: earliest remaining by insertion order
            self.host = self.members[0].id.clone();
            self.send_to(self.member_ids(), RoomEvent::Host {
                host: self.host.clone(),
            });
        }

        LeaveOutcome::Left
    }

    /// Host-only: remove the target from the room.
    pub fn kick(&mut self, requester: &str, target: &str) -> Option<LeaveOutcome> {
        if !self.authorize(requester) {
            return None;
        }
        Some(self.leave(target))
    }

    /// Host-only: remove the target and bar it from rejoining. Works for
    /// ids that are not currently members.
    pub fn ban(&mut self, requester: &str, target: &str) -> Option<LeaveOutcome> {
        if !self.authorize(requester) {
            return None;
        }
        let outcome = self.leave(target);
        self.banned.insert(target.to_string());
        Some(outcome)
    }

    /// Host-only: lift a ban. Idempotent; membership is untouched and no
    /// message is emitted for a never-banned id.
    pub fn unban(&mut self, requester: &str, target: &str) -> bool {
        if !self.authorize(requester) {
            return false;
        }
        self.banned.remove(target);
        true
    }

    pub fn info(&self) -> RoomInfo {
        RoomInfo {
            id: self.id.clone(),
            name: self.name.clone(),
            limit: self.limit,
            locked: self.password.is_some(),
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn member_ids(&self) -> Vec<SocketId> {
        self.members.iter().map(|m| m.id.clone()).collect()
    }

    pub fn members(&self) -> &[MemberInfo] {
        &self.members
    }

    pub fn is_banned(&self, socket: &str) -> bool {
        self.banned.contains(socket)
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// First matching reason wins; the order is part of the protocol.
    fn deny_reason(&self, socket: &str, password: Option<&str>) -> Option<DeniedReason> {
        if let Some(limit) = self.limit {
            if self.members.len() >= limit {
                return Some(DeniedReason::Full);
            }
        }
        if self.banned.contains(socket) {
            return Some(DeniedReason::Banned);
        }
        if self.members.iter().any(|m| m.id == socket) {
            return Some(DeniedReason::Duplicate);
        }
        if let Some(expected) = &self.password {
            if password != Some(expected.as_str()) {
                return Some(DeniedReason::Password);
            }
        }
        None
    }

    fn authorize(&self, requester: &str) -> bool {
        if requester != self.host {
            self.send_to(
                vec![requester.to_string()],
                RoomEvent::Unauthorized {
                    reason: DeniedReason::NotHost,
                },
            );
            return false;
        }
        true
    }

    fn send_to(&self, sockets: Vec<SocketId>, event: RoomEvent) {
        self.bus.send(sockets, Outbound::room(event));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::events::SendIntent;
    use crate::core::message::RoomEnvelope;
    use serde_json::json;
    use std::sync::Mutex;

    fn member(id: u32) -> MemberInfo {
        MemberInfo {
            id: id.to_string(),
            info: json!({}),
        }
    }

    fn config() -> RoomConfig {
        RoomConfig {
            name: "testroom".to_string(),
            id: Some("0".to_string()),
            password: Some("123".to_string()),
            limit: Some(5),
        }
    }

    fn open_config() -> RoomConfig {
        RoomConfig {
            name: "test-room".to_string(),
            id: Some("0".to_string()),
            password: None,
            limit: None,
        }
    }

    fn room_with(config: RoomConfig) -> Room {
        Room::new(member(0), config, "0".to_string(), Arc::new(EventBus::new()))
    }

    /// Bus wired to record every send intent for assertions.
    fn recording_bus() -> (Arc<EventBus>, Arc<Mutex<Vec<BusEvent>>>) {
        let bus = Arc::new(EventBus::new());
        bus.register(EVENT_SEND);
        bus.register(EVENT_ROOM_REMOVE);
        let log = Arc::new(Mutex::new(Vec::new()));
        {
            let log = log.clone();
            bus.add_listener(EVENT_SEND, move |ev| log.lock().unwrap().push(ev.clone()));
        }
        {
            let log = log.clone();
            bus.add_listener(EVENT_ROOM_REMOVE, move |ev| {
                log.lock().unwrap().push(ev.clone())
            });
        }
        (bus, log)
    }

    fn sent_room_events(log: &Arc<Mutex<Vec<BusEvent>>>) -> Vec<(Vec<String>, RoomEvent)> {
        log.lock()
            .unwrap()
            .iter()
            .filter_map(|ev| match ev {
                BusEvent::Send(SendIntent {
                    sockets,
                    message: Outbound::Room(RoomEnvelope { event, .. }),
                }) => Some((sockets.clone(), event.clone())),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_create_room() {
        let room = room_with(open_config());
        assert_eq!(room.len(), 1);
        assert_eq!(room.host, "0");
    }

    #[test]
    fn test_join_room() {
        let mut room = room_with(open_config());
        assert!(room.join(member(1), None).is_ok());
        assert_eq!(room.len(), 2);
    }

    #[test]
    fn test_room_limit() {
        let mut room = room_with(RoomConfig {
            limit: Some(1),
            ..open_config()
        });
        assert_eq!(room.join(member(1), None), Err(DeniedReason::Full));
        assert_eq!(room.len(), 1);
    }

    #[test]
    fn test_zero_limit_never_rejects_creator() {
        let room = room_with(RoomConfig {
            limit: Some(0),
            ..open_config()
        });
        assert_eq!(room.len(), 1);
    }

    #[test]
    fn test_join_locked_room() {
        let mut room = room_with(config());
        assert!(room.join(member(1), Some("123")).is_ok());
        assert_eq!(room.len(), 2);
    }

    #[test]
    fn test_join_without_password() {
        let mut room = room_with(config());
        assert_eq!(room.join(member(1), None), Err(DeniedReason::Password));
        assert_eq!(room.len(), 1);
    }

    #[test]
    fn test_join_wrong_password() {
        let mut room = room_with(config());
        assert_eq!(
            room.join(member(1), Some("1234")),
            Err(DeniedReason::Password)
        );
        assert_eq!(room.len(), 1);
    }

    #[test]
    fn test_duplicate_join() {
        let mut room = room_with(config());
        assert_eq!(
            room.join(member(0), Some("123")),
            Err(DeniedReason::Duplicate)
        );
        assert_eq!(room.len(), 1);
    }

    #[test]
    fn test_kick() {
        let mut room = room_with(config());
        room.join(member(1), Some("123")).unwrap();
        assert_eq!(room.kick("0", "1"), Some(LeaveOutcome::Left));
        assert_eq!(room.len(), 1);
    }

    #[test]
    fn test_unauthorized_kick() {
        let mut room = room_with(config());
        room.join(member(1), Some("123")).unwrap();
        assert_eq!(room.kick("1", "0"), None);
        assert_eq!(room.len(), 2);
    }

    #[test]
    fn test_ban_blocks_rejoin() {
        let mut room = room_with(config());
        room.ban("0", "1");
        assert_eq!(
            room.join(member(1), Some("123")),
            Err(DeniedReason::Banned)
        );
        assert_eq!(room.len(), 1);
    }

    #[test]
    fn test_unban_allows_rejoin() {
        let mut room = room_with(config());
        room.ban("0", "1");
        assert!(room.unban("0", "1"));
        assert!(room.join(member(1), Some("123")).is_ok());
        assert_eq!(room.len(), 2);
    }

    #[test]
    fn test_unban_never_banned_is_silent() {
        let (bus, log) = recording_bus();
        let mut room = Room::new(member(0), open_config(), "0".to_string(), bus);
        log.lock().unwrap().clear();

        assert!(room.unban("0", "42"));
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_create_emits_created_to_creator() {
        let (bus, log) = recording_bus();
        let _room = Room::new(member(0), config(), "0".to_string(), bus);

        let events = sent_room_events(&log);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].0, vec!["0".to_string()]);
        assert_eq!(
            events[0].1,
            RoomEvent::Created {
                room: "0".to_string()
            }
        );
    }

    #[test]
    fn test_join_notifies_others_then_welcomes_joiner() {
        let (bus, log) = recording_bus();
        let mut room = Room::new(member(12), config(), "0".to_string(), bus);
        room.join(member(1), Some("123")).unwrap();
        room.join(member(73), Some("123")).unwrap();
        room.join(member(3), Some("123")).unwrap();
        log.lock().unwrap().clear();

        room.join(member(4), Some("123")).unwrap();
        let events = sent_room_events(&log);
        assert_eq!(events.len(), 2);

        // first wave goes to the four existing members
        let (targets, event) = &events[0];
        assert_eq!(targets.len(), 4);
        match event {
            RoomEvent::Join { socket } => assert_eq!(socket.id, "4"),
            other => panic!("expected join, got {:?}", other),
        }

        // second wave welcomes the joiner with the pre-join member list
        let (targets, event) = &events[1];
        assert_eq!(targets, &vec!["4".to_string()]);
        match event {
            RoomEvent::Welcome {
                sockets,
                room,
                host,
            } => {
                assert_eq!(sockets.len(), 4);
                assert_eq!(sockets[2].id, "73");
                assert_eq!(room, "0");
                assert_eq!(host, "12");
            }
            other => panic!("expected welcome, got {:?}", other),
        }
    }

    #[test]
    fn test_leave_notifies_remaining() {
        let (bus, log) = recording_bus();
        let mut room = Room::new(member(0), config(), "0".to_string(), bus);
        room.join(member(1), Some("123")).unwrap();
        room.join(member(2), Some("123")).unwrap();
        log.lock().unwrap().clear();

        assert_eq!(room.leave("2"), LeaveOutcome::Left);
        let events = sent_room_events(&log);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].0.len(), 2);
        assert_eq!(
            events[0].1,
            RoomEvent::Leave {
                socket: "2".to_string(),
                room: "0".to_string()
            }
        );
    }

    #[test]
    fn test_host_leave_promotes_next_in_insertion_order() {
        let (bus, log) = recording_bus();
        let mut room = Room::new(member(0), config(), "0".to_string(), bus);
        room.join(member(1), Some("123")).unwrap();
        room.join(member(2), Some("123")).unwrap();
        log.lock().unwrap().clear();

        assert_eq!(room.leave("0"), LeaveOutcome::Left);
        assert_eq!(room.host, "1");

        let events = sent_room_events(&log);
        assert_eq!(events.len(), 2);
        match &events[0].1 {
            RoomEvent::Leave { socket, .. } => assert_eq!(socket, "0"),
            other => panic!("expected leave, got {:?}", other),
        }
        assert_eq!(
            events[1].1,
            RoomEvent::Host {
                host: "1".to_string()
            }
        );
    }

    #[test]
    fn test_last_leave_signals_removal_and_nothing_else() {
        let (bus, log) = recording_bus();
        let mut room = Room::new(member(0), config(), "0".to_string(), bus);
        log.lock().unwrap().clear();

        assert_eq!(room.leave("0"), LeaveOutcome::Emptied);
        let log = log.lock().unwrap();
        assert_eq!(log.len(), 1);
        match &log[0] {
            BusEvent::RoomRemoved(id) => assert_eq!(id, "0"),
            other => panic!("expected removal signal, got {:?}", other),
        }
    }

    #[test]
    fn test_leave_of_non_member_is_silent() {
        let (bus, log) = recording_bus();
        let mut room = Room::new(member(0), config(), "0".to_string(), bus);
        log.lock().unwrap().clear();

        assert_eq!(room.leave("9"), LeaveOutcome::NotMember);
        assert!(log.lock().unwrap().is_empty());
        assert_eq!(room.len(), 1);
    }

    #[test]
    fn test_unauthorized_kick_emits_not_host_reason() {
        let (bus, log) = recording_bus();
        let mut room = Room::new(member(0), config(), "0".to_string(), bus);
        room.join(member(1), Some("123")).unwrap();
        log.lock().unwrap().clear();

        room.kick("1", "0");
        let events = sent_room_events(&log);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].0, vec!["1".to_string()]);
        assert_eq!(
            events[0].1,
            RoomEvent::Unauthorized {
                reason: DeniedReason::NotHost
            }
        );
    }

    #[test]
    fn test_full_denial_precedes_ban_check() {
        let mut room = room_with(RoomConfig {
            limit: Some(1),
            ..open_config()
        });
        room.ban("0", "1");
        // "1" is banned, but the room is also full; Full wins
        assert_eq!(room.join(member(1), None), Err(DeniedReason::Full));
    }

    #[test]
    fn test_info_summary() {
        let room = room_with(config());
        let info = room.info();
        assert_eq!(info.id, "0");
        assert_eq!(info.name, "testroom");
        assert_eq!(info.limit, Some(5));
        assert!(info.locked);
    }
}

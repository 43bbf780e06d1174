use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::auth;
use crate::graph::GraphBroker;
use crate::models::{JoinInfo, RoomSummary, WsServerMessage};
use crate::transport::{PortAllocator, PortError, TransportHandle, TransportSupervisor};

const DEFAULT_CHANNELS: u32 = 2;
const DEFAULT_MAX_PARTICIPANTS: u32 = 8;

#[derive(Debug, Error)]
pub enum CreateError {
    #[error("room creation is disabled in single-room mode")]
    Disallowed,
    #[error("no transport ports available")]
    CapacityExceeded,
    #[error("failed to start transport process: {0}")]
    SpawnFailed(String),
    #[error(transparent)]
    Hashing(#[from] anyhow::Error),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum JoinError {
    #[error("no such room")]
    Unknown,
    #[error("bad passphrase")]
    BadPassphrase,
    #[error("room is full")]
    Full,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LeaveError {
    #[error("no such room")]
    Unknown,
    #[error("user is not a participant of this room")]
    NotIn,
}

struct Room {
    id: String,
    name: String,
    creator: Uuid,
    passphrase_digest: Option<String>,
    max_participants: u32,
    participants: HashSet<Uuid>,
    port: u16,
    transport: Option<TransportHandle>,
    /// When this room last became empty (including at creation, since a
    /// fresh room has no participants yet). `None` while occupied.
    empty_since: Option<Instant>,
}

impl Room {
    fn summary(&self) -> RoomSummary {
        RoomSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            creator: self.creator,
            participants: self.participants.iter().copied().collect(),
            max_participants: self.max_participants,
            is_private: self.passphrase_digest.is_some(),
        }
    }
}

/// Owns every room's lifecycle: creation (port allocation + transport
/// spawn), membership, and teardown. The registry-wide lock protects
/// the room map itself; each room has its own lock protecting its
/// participant set and transport handle. Lock order is always
/// registry then room, never the reverse, to rule out deadlock between
/// concurrent `leave` calls on different rooms.
pub struct RoomRegistry {
    rooms: RwLock<HashMap<String, Arc<Mutex<Room>>>>,
    ports: Arc<PortAllocator>,
    supervisor: Arc<TransportSupervisor>,
    broker: GraphBroker,
    hub_host: String,
    single_room_mode: bool,
}

impl RoomRegistry {
    pub fn new(
        ports: Arc<PortAllocator>,
        supervisor: Arc<TransportSupervisor>,
        broker: GraphBroker,
        hub_host: String,
        single_room_mode: bool,
    ) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            ports,
            supervisor,
            broker,
            hub_host,
            single_room_mode,
        }
    }

    pub fn single_room_mode(&self) -> bool {
        self.single_room_mode
    }

    /// Allocate a port, spawn the transport, and record the room. Each
    /// step's resource is released on any later failure so a failed
    /// create never leaks a port or a running process.
    pub async fn create(
        &self,
        creator: Uuid,
        name: String,
        passphrase: Option<String>,
        max_participants: Option<u32>,
    ) -> Result<String, CreateError> {
        if self.single_room_mode {
            return Err(CreateError::Disallowed);
        }

        let room_id = Uuid::now_v7().to_string();

        let port = self.ports.acquire().map_err(|e| match e {
            PortError::Exhausted => CreateError::CapacityExceeded,
        })?;

        let transport = match self.supervisor.spawn(&room_id, port, DEFAULT_CHANNELS).await {
            Ok(handle) => handle,
            Err(e) => {
                self.ports.release(port);
                return Err(CreateError::SpawnFailed(e.to_string()));
            }
        };

        let passphrase_digest = match passphrase {
            Some(p) => Some(auth::hash_password(&p).map_err(anyhow::Error::from)?),
            None => None,
        };

        let room = Room {
            id: room_id.clone(),
            name,
            creator,
            passphrase_digest,
            max_participants: max_participants.unwrap_or(DEFAULT_MAX_PARTICIPANTS),
            participants: HashSet::new(),
            port,
            transport: Some(transport),
            empty_since: Some(Instant::now()),
        };
        let summary = room.summary();

        self.rooms.write().await.insert(room_id.clone(), Arc::new(Mutex::new(room)));
        self.broker.broadcast(WsServerMessage::RoomCreated { room: summary });

        Ok(room_id)
    }

    pub async fn list(&self) -> Vec<RoomSummary> {
        let handles: Vec<Arc<Mutex<Room>>> = self.rooms.read().await.values().cloned().collect();
        let mut out = Vec::with_capacity(handles.len());
        for handle in handles {
            out.push(handle.lock().await.summary());
        }
        out
    }

    pub async fn get(&self, room_id: &str) -> Option<RoomSummary> {
        let handle = self.rooms.read().await.get(room_id).cloned()?;
        Some(handle.lock().await.summary())
    }

    /// Verify the passphrase (if the room is private) with a
    /// constant-time digest compare, then add the caller to the
    /// participant set. Rejoining while already present is idempotent.
    pub async fn join(
        &self,
        room_id: &str,
        user_id: Uuid,
        passphrase: Option<&str>,
    ) -> Result<JoinInfo, JoinError> {
        let handle = self
            .rooms
            .read()
            .await
            .get(room_id)
            .cloned()
            .ok_or(JoinError::Unknown)?;

        let mut room = handle.lock().await;

        if room.participants.contains(&user_id) {
            return Ok(JoinInfo {
                hub_host: self.hub_host.clone(),
                jacktrip_port: room.port,
                client_name_hint: room_id.to_string(),
            });
        }

        if let Some(digest) = &room.passphrase_digest {
            let supplied = passphrase.unwrap_or("");
            if !auth::verify_passphrase(supplied, digest) {
                return Err(JoinError::BadPassphrase);
            }
        }

        if room.participants.len() as u32 >= room.max_participants {
            return Err(JoinError::Full);
        }

        room.participants.insert(user_id);
        room.empty_since = None;

        Ok(JoinInfo {
            hub_host: self.hub_host.clone(),
            jacktrip_port: room.port,
            client_name_hint: room_id.to_string(),
        })
    }

    /// Remove the caller from the room. In multi-room mode, the room is
    /// torn down (transport stopped, port released, record removed)
    /// once the last participant leaves; in single-room mode the room
    /// persists empty.
    pub async fn leave(&self, room_id: &str, user_id: Uuid) -> Result<(), LeaveError> {
        let handle = self
            .rooms
            .read()
            .await
            .get(room_id)
            .cloned()
            .ok_or(LeaveError::Unknown)?;

        let now_empty = {
            let mut room = handle.lock().await;
            if !room.participants.remove(&user_id) {
                return Err(LeaveError::NotIn);
            }
            let empty = room.participants.is_empty();
            if empty {
                room.empty_since = Some(Instant::now());
            }
            empty
        };

        if now_empty && !self.single_room_mode {
            self.destroy_if_still_empty(room_id).await;
        }

        Ok(())
    }

    /// Re-acquire the locks in registry-then-room order and destroy the
    /// room only if it is still both present and empty — a participant
    /// may have rejoined between `leave`'s release of the room lock and
    /// this call.
    async fn destroy_if_still_empty(&self, room_id: &str) {
        let mut rooms = self.rooms.write().await;
        let Some(handle) = rooms.get(room_id).cloned() else {
            return;
        };

        let transport = {
            let mut room = handle.lock().await;
            if !room.participants.is_empty() {
                return;
            }
            self.ports.release(room.port);
            room.transport.take()
        };

        rooms.remove(room_id);
        drop(rooms);

        if let Some(transport) = transport {
            self.supervisor.stop(transport).await;
        }
        self.broker.broadcast(WsServerMessage::RoomDestroyed {
            room_id: room_id.to_string(),
        });
    }

    /// Torn down from outside a `leave` call: the transport supervisor
    /// reported this room's process died on its own. Every participant
    /// is implicitly evicted.
    pub async fn destroy_on_transport_death(&self, room_id: &str) {
        let mut rooms = self.rooms.write().await;
        let Some(handle) = rooms.remove(room_id) else {
            return;
        };
        drop(rooms);

        let mut room = handle.lock().await;
        self.ports.release(room.port);
        room.transport = None;
        drop(room);

        self.broker.broadcast(WsServerMessage::RoomDestroyed {
            room_id: room_id.to_string(),
        });
    }

    /// Used by single-room-mode startup to seed the one persistent room
    /// without going through the `Disallowed` gate.
    pub async fn seed_default_room(
        &self,
        creator: Uuid,
        name: String,
    ) -> Result<String, CreateError> {
        let room_id = Uuid::now_v7().to_string();

        let port = self.ports.acquire().map_err(|e| match e {
            PortError::Exhausted => CreateError::CapacityExceeded,
        })?;

        let transport = match self.supervisor.spawn(&room_id, port, DEFAULT_CHANNELS).await {
            Ok(handle) => handle,
            Err(e) => {
                self.ports.release(port);
                return Err(CreateError::SpawnFailed(e.to_string()));
            }
        };

        let room = Room {
            id: room_id.clone(),
            name,
            creator,
            passphrase_digest: None,
            max_participants: DEFAULT_MAX_PARTICIPANTS,
            participants: HashSet::new(),
            port,
            transport: Some(transport),
            empty_since: Some(Instant::now()),
        };

        self.rooms.write().await.insert(room_id.clone(), Arc::new(Mutex::new(room)));
        Ok(room_id)
    }

    /// Destroy any room that has been empty for at least `grace`. A
    /// backstop for rooms that, for whatever reason, were never torn
    /// down by `leave`'s own immediate-destroy path; freshly created,
    /// never-joined rooms are also fair game once `grace` has elapsed.
    pub async fn reap_idle(&self, grace: Duration) {
        let candidates: Vec<String> = {
            let rooms = self.rooms.read().await;
            let mut ids = Vec::new();
            for (id, handle) in rooms.iter() {
                let room = handle.lock().await;
                if room.empty_since.is_some_and(|since| since.elapsed() >= grace) {
                    ids.push(id.clone());
                }
            }
            ids
        };

        for room_id in candidates {
            self.destroy_if_still_empty(&room_id).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(single_room_mode: bool) -> RoomRegistry {
        let ports = Arc::new(PortAllocator::new(61000, 16));
        let (supervisor, _death_rx) = TransportSupervisor::new("true".to_string());
        RoomRegistry::new(
            ports,
            Arc::new(supervisor),
            GraphBroker::new(),
            "localhost".to_string(),
            single_room_mode,
        )
    }

    #[tokio::test]
    async fn create_disallowed_in_single_room_mode() {
        let reg = registry(true);
        let err = reg
            .create(Uuid::now_v7(), "jam".to_string(), None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CreateError::Disallowed));
    }

    #[tokio::test]
    async fn create_then_join_then_leave_destroys_empty_room() {
        let reg = registry(false);
        let creator = Uuid::now_v7();
        let room_id = reg.create(creator, "jam".to_string(), None, None).await.unwrap();

        let user = Uuid::now_v7();
        let info = reg.join(&room_id, user, None).await.unwrap();
        assert_eq!(info.hub_host, "localhost");

        assert!(reg.get(&room_id).await.is_some());

        reg.leave(&room_id, user).await.unwrap();

        assert!(reg.get(&room_id).await.is_none());
    }

    #[tokio::test]
    async fn rejoin_is_idempotent() {
        let reg = registry(false);
        let room_id = reg.create(Uuid::now_v7(), "jam".to_string(), None, None).await.unwrap();
        let user = Uuid::now_v7();

        reg.join(&room_id, user, None).await.unwrap();
        reg.join(&room_id, user, None).await.unwrap();

        let summary = reg.get(&room_id).await.unwrap();
        assert_eq!(summary.participants.len(), 1);
    }

    #[tokio::test]
    async fn join_rejects_wrong_passphrase() {
        let reg = registry(false);
        let room_id = reg
            .create(Uuid::now_v7(), "jam".to_string(), Some("letmein".to_string()), None)
            .await
            .unwrap();

        let err = reg.join(&room_id, Uuid::now_v7(), Some("wrong")).await.unwrap_err();
        assert_eq!(err, JoinError::BadPassphrase);

        assert!(reg.join(&room_id, Uuid::now_v7(), Some("letmein")).await.is_ok());
    }

    #[tokio::test]
    async fn join_rejects_when_full() {
        let reg = registry(false);
        let room_id = reg
            .create(Uuid::now_v7(), "jam".to_string(), None, Some(1))
            .await
            .unwrap();

        reg.join(&room_id, Uuid::now_v7(), None).await.unwrap();
        let err = reg.join(&room_id, Uuid::now_v7(), None).await.unwrap_err();
        assert_eq!(err, JoinError::Full);
    }

    #[tokio::test]
    async fn leave_unknown_room_is_an_error() {
        let reg = registry(false);
        let err = reg.leave("no-such-room", Uuid::now_v7()).await.unwrap_err();
        assert_eq!(err, LeaveError::Unknown);
    }

    #[tokio::test]
    async fn reap_idle_destroys_rooms_empty_past_grace() {
        let reg = registry(false);
        let room_id = reg.create(Uuid::now_v7(), "jam".to_string(), None, None).await.unwrap();

        tokio::time::sleep(Duration::from_millis(10)).await;
        reg.reap_idle(Duration::from_millis(1)).await;

        assert!(reg.get(&room_id).await.is_none());
    }

    #[tokio::test]
    async fn reap_idle_spares_rooms_within_grace() {
        let reg = registry(false);
        let room_id = reg.create(Uuid::now_v7(), "jam".to_string(), None, None).await.unwrap();

        reg.reap_idle(Duration::from_secs(300)).await;

        assert!(reg.get(&room_id).await.is_some());
    }

    #[tokio::test]
    async fn single_room_mode_persists_empty_room() {
        let reg = registry(true);
        let room_id = reg.seed_default_room(Uuid::now_v7(), "The Band".to_string()).await.unwrap();
        let user = Uuid::now_v7();

        reg.join(&room_id, user, None).await.unwrap();
        reg.leave(&room_id, user).await.unwrap();

        assert!(reg.get(&room_id).await.is_some());
    }
}

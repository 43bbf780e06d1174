use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Users & Sessions ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub digest: String,
    pub created_at: DateTime<Utc>,
    pub is_owner: bool,
    pub has_patchbay_access: bool,
}

/// What a caller is allowed to learn about another user.
#[derive(Debug, Clone, Serialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub name: String,
    pub is_owner: bool,
    pub has_patchbay_access: bool,
}

impl From<&User> for UserSummary {
    fn from(u: &User) -> Self {
        Self {
            id: u.id,
            name: u.name.clone(),
            is_owner: u.is_owner,
            has_patchbay_access: u.has_patchbay_access,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
}

// ─── Requests ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateRoomRequest {
    pub name: String,
    #[serde(default)]
    pub passphrase: Option<String>,
    #[serde(default)]
    pub max_participants: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JoinRoomRequest {
    #[serde(default)]
    pub passphrase: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectPortsRequest {
    pub source: String,
    pub dest: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetPermissionsRequest {
    pub has_patchbay_access: bool,
}

// ─── Responses ──────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user_id: Uuid,
    pub is_owner: bool,
    pub has_patchbay_access: bool,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub is_owner: bool,
    pub has_patchbay_access: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoomSummary {
    pub id: String,
    pub name: String,
    pub creator: Uuid,
    pub participants: Vec<Uuid>,
    pub max_participants: u32,
    pub is_private: bool,
}

#[derive(Debug, Serialize)]
pub struct JoinInfo {
    pub hub_host: String,
    pub jacktrip_port: u16,
    pub client_name_hint: String,
}

#[derive(Debug, Serialize)]
pub struct StatusOk {
    pub status: &'static str,
}

impl Default for StatusOk {
    fn default() -> Self {
        Self { status: "ok" }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

// ─── Audio graph ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortDirection {
    Input,
    Output,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortType {
    Audio,
    Midi,
}

#[derive(Debug, Clone, Serialize)]
pub struct GraphPort {
    pub name: String,
    pub direction: PortDirection,
    pub port_type: PortType,
    pub connections: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GraphClient {
    pub name: String,
    pub ports: Vec<GraphPort>,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct GraphSnapshot {
    pub clients: Vec<GraphClient>,
}

// ─── WebSocket protocol ─────────────────────────────────────────────────────

/// Messages a patchbay subscriber may send to the hub.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WsClientMessage {
    Connect { source: String, dest: String },
    Disconnect { source: String, dest: String },
    Refresh,
}

/// Messages the hub sends to patchbay subscribers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WsServerMessage {
    Snapshot { graph: GraphSnapshot },
    EdgeAdded { source: String, dest: String },
    EdgeRemoved { source: String, dest: String },
    RoomCreated { room: RoomSummary },
    RoomDestroyed { room_id: String },
    Error { error: String },
}

use axum::extract::{Path, State};
use axum::Json;
use uuid::Uuid;

use crate::api::extract::AuthUser;
use crate::api::AppState;
use crate::error::{HubError, HubResult};
use crate::models::{
    AuthResponse, ConnectPortsRequest, CreateRoomRequest, HealthResponse, JoinInfo, JoinRoomRequest,
    LoginRequest, LoginResponse, RegisterRequest, RoomSummary, SetPermissionsRequest, StatusOk,
    UserSummary,
};
use crate::graph::{ConnectOutcome, GraphError};
use crate::perms::{self, Action};
use crate::rooms::{CreateError, JoinError, LeaveError};
use crate::store::{LoginError, RegisterError};

fn map_graph_error(e: GraphError) -> HubError {
    match e {
        GraphError::ServerUnavailable(_) => HubError::Internal(anyhow::anyhow!(e)),
        GraphError::NoSuchPort(_) | GraphError::Rejected(_) => HubError::BadRequest(e.to_string()),
    }
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> HubResult<Json<AuthResponse>> {
    let (user_id, token) = state.credentials.register(&body.username, &body.password).await.map_err(|e| match e {
        RegisterError::NameTaken => HubError::Conflict("username already taken".to_string()),
        RegisterError::Internal(e) => HubError::Database(e),
        RegisterError::Hashing(e) => HubError::Internal(e),
    })?;

    let user = state
        .credentials
        .find_by_id(user_id)
        .await?
        .ok_or_else(|| HubError::Internal(anyhow::anyhow!("registered user vanished")))?;

    Ok(Json(AuthResponse {
        token,
        user_id,
        is_owner: user.is_owner,
        has_patchbay_access: user.has_patchbay_access,
    }))
}

pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> HubResult<Json<LoginResponse>> {
    let (token, user) = state.credentials.login(&body.username, &body.password).await.map_err(|e| match e {
        LoginError::BadCredentials => HubError::Unauthorized,
        LoginError::Internal(e) => HubError::Database(e),
        LoginError::Hashing(e) => HubError::Internal(e),
    })?;

    Ok(Json(LoginResponse {
        token,
        is_owner: user.is_owner,
        has_patchbay_access: user.has_patchbay_access,
    }))
}

pub async fn list_rooms(
    AuthUser(_user): AuthUser,
    State(state): State<AppState>,
) -> HubResult<Json<Vec<RoomSummary>>> {
    Ok(Json(state.rooms.list().await))
}

pub async fn create_room(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(body): Json<CreateRoomRequest>,
) -> HubResult<Json<RoomSummary>> {
    if !perms::authorize(&user, Action::CreateRoom, state.rooms.single_room_mode()) {
        return Err(HubError::Forbidden("room creation disabled".to_string()));
    }

    let room_id = state
        .rooms
        .create(user.id, body.name, body.passphrase, body.max_participants)
        .await
        .map_err(|e| match e {
            CreateError::Disallowed => HubError::Forbidden("room creation disabled".to_string()),
            CreateError::CapacityExceeded => HubError::CapacityExceeded,
            CreateError::SpawnFailed(msg) => HubError::Internal(anyhow::anyhow!(msg)),
            CreateError::Hashing(e) => HubError::Internal(e),
        })?;

    let summary = state
        .rooms
        .get(&room_id)
        .await
        .ok_or_else(|| HubError::Internal(anyhow::anyhow!("created room vanished")))?;

    Ok(Json(summary))
}

pub async fn get_room(
    AuthUser(_user): AuthUser,
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> HubResult<Json<RoomSummary>> {
    state
        .rooms
        .get(&room_id)
        .await
        .map(Json)
        .ok_or_else(|| HubError::NotFound(format!("no such room: {room_id}")))
}

pub async fn join_room(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Json(body): Json<JoinRoomRequest>,
) -> HubResult<Json<JoinInfo>> {
    let info = state
        .rooms
        .join(&room_id, user.id, body.passphrase.as_deref())
        .await
        .map_err(|e| match e {
            JoinError::Unknown => HubError::NotFound(format!("no such room: {room_id}")),
            JoinError::BadPassphrase => HubError::BadRequest("bad passphrase".to_string()),
            JoinError::Full => HubError::RoomFull,
        })?;

    Ok(Json(info))
}

pub async fn leave_room(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> HubResult<Json<StatusOk>> {
    let is_participant = state
        .rooms
        .get(&room_id)
        .await
        .map(|r| r.participants.contains(&user.id))
        .unwrap_or(false);

    if !perms::authorize(&user, Action::LeaveRoom { is_participant }, state.rooms.single_room_mode()) {
        return Err(HubError::Forbidden("not a participant of this room".to_string()));
    }

    state.rooms.leave(&room_id, user.id).await.map_err(|e| match e {
        LeaveError::Unknown => HubError::NotFound(format!("no such room: {room_id}")),
        LeaveError::NotIn => HubError::Forbidden("not a participant of this room".to_string()),
    })?;

    Ok(Json(StatusOk::default()))
}

pub async fn get_graph(
    AuthUser(_user): AuthUser,
    State(state): State<AppState>,
) -> HubResult<Json<crate::models::GraphSnapshot>> {
    let snapshot = state.graph.snapshot().await.map_err(map_graph_error)?;
    Ok(Json(snapshot))
}

pub async fn connect_ports(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(body): Json<ConnectPortsRequest>,
) -> HubResult<Json<StatusOk>> {
    if !perms::authorize(&user, Action::MutateGraph, state.rooms.single_room_mode()) {
        return Err(HubError::Forbidden("patchbay access required".to_string()));
    }

    let outcome = state
        .graph
        .connect_ports(&body.source, &body.dest)
        .await
        .map_err(map_graph_error)?;

    if outcome == ConnectOutcome::Connected {
        state.broker.broadcast(crate::models::WsServerMessage::EdgeAdded {
            source: body.source,
            dest: body.dest,
        });
    }

    Ok(Json(StatusOk::default()))
}

pub async fn disconnect_ports(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(body): Json<ConnectPortsRequest>,
) -> HubResult<Json<StatusOk>> {
    if !perms::authorize(&user, Action::MutateGraph, state.rooms.single_room_mode()) {
        return Err(HubError::Forbidden("patchbay access required".to_string()));
    }

    state
        .graph
        .disconnect_ports(&body.source, &body.dest)
        .await
        .map_err(map_graph_error)?;

    state.broker.broadcast(crate::models::WsServerMessage::EdgeRemoved {
        source: body.source,
        dest: body.dest,
    });

    Ok(Json(StatusOk::default()))
}

pub async fn list_users(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
) -> HubResult<Json<Vec<UserSummary>>> {
    if !perms::authorize(&user, Action::ListUsers, state.rooms.single_room_mode()) {
        return Err(HubError::Forbidden("owner access required".to_string()));
    }

    Ok(Json(state.credentials.list_users().await?))
}

pub async fn set_permissions(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(target_id): Path<Uuid>,
    Json(body): Json<SetPermissionsRequest>,
) -> HubResult<Json<StatusOk>> {
    if !perms::authorize(&user, Action::GrantPatchbayAccess, state.rooms.single_room_mode()) {
        return Err(HubError::Forbidden("owner access required".to_string()));
    }

    state
        .credentials
        .grant_patchbay_access(target_id, body.has_patchbay_access)
        .await
        .map_err(|e| match e {
            crate::store::GrantError::Unknown => HubError::NotFound(format!("no such user: {target_id}")),
            crate::store::GrantError::Internal(e) => HubError::Database(e),
        })?;

    Ok(Json(StatusOk::default()))
}

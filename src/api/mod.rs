pub mod extract;
pub mod handlers;
pub mod ws;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::graph::{AudioGraphAdapter, GraphBroker};
use crate::rooms::RoomRegistry;
use crate::store::CredentialStore;

#[derive(Clone)]
pub struct AppState {
    pub credentials: Arc<CredentialStore>,
    pub rooms: Arc<RoomRegistry>,
    pub graph: Arc<AudioGraphAdapter>,
    pub broker: GraphBroker,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/auth/register", post(handlers::register))
        .route("/auth/login", post(handlers::login))
        .route("/rooms", get(handlers::list_rooms).post(handlers::create_room))
        .route("/rooms/:id", get(handlers::get_room))
        .route("/rooms/:id/join", post(handlers::join_room))
        .route("/rooms/:id/leave", post(handlers::leave_room))
        .route("/jack/graph", get(handlers::get_graph))
        .route("/jack/connect", post(handlers::connect_ports))
        .route("/jack/disconnect", post(handlers::disconnect_ports))
        .route("/users", get(handlers::list_users))
        .route("/users/:id/permissions", post(handlers::set_permissions))
        .route("/ws/patchbay", get(ws::ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

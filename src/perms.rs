use crate::models::User;

/// Mutating and informational actions gated by the permission kernel.
/// Unauthenticated actions (register/login) never reach this predicate;
/// they're routed before the bearer-token extractor runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    ListRooms,
    CreateRoom,
    JoinRoom,
    LeaveRoom { is_participant: bool },
    ViewGraph,
    MutateGraph,
    ListUsers,
    GrantPatchbayAccess,
}

/// Pure authorization predicate: no I/O, no locks, just the policy table
/// from the permission design. `single_room_mode` gates `CreateRoom`
/// independently of the user.
pub fn authorize(user: &User, action: Action, single_room_mode: bool) -> bool {
    match action {
        Action::ListRooms => true,
        Action::CreateRoom => !single_room_mode,
        Action::JoinRoom => true,
        Action::LeaveRoom { is_participant } => is_participant,
        Action::ViewGraph => true,
        Action::MutateGraph => user.has_patchbay_access,
        Action::ListUsers => user.is_owner,
        Action::GrantPatchbayAccess => user.is_owner,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn user(is_owner: bool, has_patchbay_access: bool) -> User {
        User {
            id: Uuid::now_v7(),
            name: "alice".to_string(),
            digest: "x".to_string(),
            created_at: Utc::now(),
            is_owner,
            has_patchbay_access,
        }
    }

    #[test]
    fn only_owner_can_list_users() {
        let owner = user(true, true);
        let member = user(false, false);
        assert!(authorize(&owner, Action::ListUsers, false));
        assert!(!authorize(&member, Action::ListUsers, false));
    }

    #[test]
    fn graph_mutation_requires_patchbay_access() {
        let granted = user(false, true);
        let ungranted = user(false, false);
        assert!(authorize(&granted, Action::MutateGraph, false));
        assert!(!authorize(&ungranted, Action::MutateGraph, false));
    }

    #[test]
    fn create_room_disallowed_in_single_room_mode() {
        let owner = user(true, true);
        assert!(!authorize(&owner, Action::CreateRoom, true));
        assert!(authorize(&owner, Action::CreateRoom, false));
    }

    #[test]
    fn leave_requires_current_participation() {
        let member = user(false, false);
        assert!(authorize(&member, Action::LeaveRoom { is_participant: true }, false));
        assert!(!authorize(&member, Action::LeaveRoom { is_participant: false }, false));
    }
}

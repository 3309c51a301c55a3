//! # Board access
//!
//! Visibility decisions per principal and board. [`can_access`] is a pure
//! function; group memberships are fetched once per request by
//! [`PrincipalResolver`] so evaluating many boards never re-queries the store.

use std::sync::Arc;

use tracing::{debug, warn};

use domains::{
    AccessPolicy, AuthenticatedUser, Board, BoardId, DomainError, ForumStore, Principal,
    RequestIdentity, Result, Role, UserId,
};

/// Decides whether `principal` may see the content of `board`.
///
/// Administrators pass every policy. A principal whose group memberships
/// could not be resolved is treated as belonging to no group.
pub fn can_access(principal: &Principal, board: &Board) -> bool {
    if principal.is_admin() {
        return true;
    }

    match board.access_policy {
        AccessPolicy::Public => true,
        AccessPolicy::Registered => principal.is_authenticated(),
        AccessPolicy::Groups => match principal {
            Principal::User(AuthenticatedUser {
                groups: Some(groups),
                ..
            }) => !groups.is_disjoint(&board.allowed_groups),
            _ => false,
        },
        AccessPolicy::Users => match principal {
            Principal::User(user) => board.allowed_users.contains(&user.id),
            Principal::Anonymous => false,
        },
        AccessPolicy::Unknown => false,
    }
}

/// Authors may remove their own content; moderators and administrators may
/// remove anyone's.
pub fn can_moderate(principal: &Principal, author: UserId) -> bool {
    match principal {
        Principal::Anonymous => false,
        Principal::User(user) => {
            principal.is_admin() || user.role == Role::Moderator || user.id == author
        }
    }
}

/// Turns the caller identity handed over by the auth layer into a
/// [`Principal`] carrying its group memberships.
pub struct PrincipalResolver {
    store: Arc<dyn ForumStore>,
}

impl PrincipalResolver {
    pub fn new(store: Arc<dyn ForumStore>) -> Self {
        Self { store }
    }

    /// Never fails: a broken membership lookup yields a principal without
    /// group capability, which `groups` boards then deny.
    pub async fn current_principal(&self, identity: RequestIdentity) -> Principal {
        let RequestIdentity::User {
            id,
            role,
            is_superuser,
        } = identity
        else {
            return Principal::Anonymous;
        };

        let groups = match self.store.list_principal_groups(id).await {
            Ok(groups) => Some(groups),
            Err(err) => {
                warn!(user_id = %id, error = %err, "group membership lookup failed, denying group boards");
                None
            }
        };

        Principal::User(AuthenticatedUser {
            id,
            role,
            is_superuser,
            groups,
        })
    }
}

/// Board listings filtered through [`can_access`].
pub struct BoardAccess {
    store: Arc<dyn ForumStore>,
}

impl BoardAccess {
    pub fn new(store: Arc<dyn ForumStore>) -> Self {
        Self { store }
    }

    /// Boards the principal may see, ordered by `(order, id)`.
    pub async fn visible_boards(&self, principal: &Principal) -> Result<Vec<Board>> {
        let boards = self.store.list_boards().await?;
        let total = boards.len();
        let visible: Vec<Board> = boards
            .into_iter()
            .filter(|board| can_access(principal, board))
            .collect();
        debug!(total, visible = visible.len(), "filtered boards by access policy");
        Ok(visible)
    }

    /// Every board paired with the principal's access flag.
    pub async fn board_access_matrix(&self, principal: &Principal) -> Result<Vec<(Board, bool)>> {
        let boards = self.store.list_boards().await?;
        Ok(boards
            .into_iter()
            .map(|board| {
                let allowed = can_access(principal, &board);
                (board, allowed)
            })
            .collect())
    }

    /// Loads the board and fails with `PolicyDenied` when it is hidden from
    /// the principal.
    pub async fn ensure_board_access(&self, principal: &Principal, id: BoardId) -> Result<Board> {
        let board = self
            .store
            .fetch_board(id)
            .await?
            .ok_or_else(|| DomainError::NotFound("Board", id.to_string()))?;

        if can_access(principal, &board) {
            Ok(board)
        } else {
            debug!(board_id = %id, policy = board.access_policy.as_str(), "board access denied");
            Err(DomainError::PolicyDenied(id))
        }
    }
}

//! crates/job_board_core/src/access.rs
//!
//! Route-level access decisions based on the session snapshot.

use serde::Serialize;

use crate::domain::Role;
use crate::session::SessionSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Access {
    /// The session has not resolved yet; show a spinner and decide later.
    Pending,
    SignInRequired,
    /// Signed in, but without one of the allowed roles.
    Forbidden,
    Granted,
}

/// Decides whether the session may enter a view restricted to `allowed` roles.
/// `None` admits any signed-in principal.
pub fn authorize(session: &SessionSnapshot, allowed: Option<&[Role]>) -> Access {
    if session.loading {
        return Access::Pending;
    }
    let Some(principal) = &session.principal else {
        return Access::SignInRequired;
    };
    match allowed {
        None => Access::Granted,
        Some(roles) => match principal.role {
            Some(role) if roles.contains(&role) => Access::Granted,
            _ => Access::Forbidden,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Principal;

    fn signed_in(role: Option<Role>) -> SessionSnapshot {
        SessionSnapshot {
            principal: Some(Principal {
                uid: "u1".to_string(),
                display_name: None,
                email: None,
                photo_url: None,
                role,
                pending_role_selection: false,
            }),
            loading: false,
        }
    }

    #[test]
    fn decisions() {
        let loading = SessionSnapshot {
            principal: None,
            loading: true,
        };
        assert_eq!(authorize(&loading, None), Access::Pending);

        let anonymous = SessionSnapshot {
            principal: None,
            loading: false,
        };
        assert_eq!(authorize(&anonymous, None), Access::SignInRequired);

        let employers = [Role::Employer];
        assert_eq!(authorize(&signed_in(Some(Role::Employee)), None), Access::Granted);
        assert_eq!(
            authorize(&signed_in(Some(Role::Employee)), Some(&employers[..])),
            Access::Forbidden
        );
        assert_eq!(authorize(&signed_in(None), Some(&employers[..])), Access::Forbidden);
        assert_eq!(
            authorize(&signed_in(Some(Role::Employer)), Some(&employers[..])),
            Access::Granted
        );
    }
}

//! Role resolution and permission decisions.
//!
//! `evaluate` is pure: it neither logs nor writes. Fixing up inconsistent
//! role flags happens only when a user row is written, via
//! [`reconcile_role`].

use crate::error::{AppError, AppResult};
use crate::models::Rol;

use super::Principal;

/// Effective authority of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Role {
    ReadOnly,
    Admin,
    Superadmin,
}

impl Role {
    /// Combines the profile role with the account's staff/superuser flags.
    pub fn resolve(rol: Rol, is_staff: bool, is_superuser: bool) -> Role {
        if rol == Rol::Superadmin || is_superuser {
            Role::Superadmin
        } else if rol == Rol::Admin || is_staff {
            Role::Admin
        } else {
            Role::ReadOnly
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Read,
    /// Create/update/delete of catalogue and ledger records
    Write,
    ManageUsers,
    ViewLogs,
    ManageBackups,
    UpdateProfile { target_user_id: i64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(String),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    pub fn into_result(self) -> AppResult<()> {
        match self {
            Decision::Allow => Ok(()),
            Decision::Deny(reason) => Err(AppError::Forbidden(reason)),
        }
    }
}

pub fn evaluate(principal: &Principal, action: Action) -> Decision {
    let role = principal.role;
    match action {
        Action::Read => Decision::Allow,
        Action::Write if role >= Role::Admin => Decision::Allow,
        Action::Write => Decision::Deny("read-only users cannot modify records".into()),
        Action::ManageUsers | Action::ViewLogs | Action::ManageBackups
            if role == Role::Superadmin =>
        {
            Decision::Allow
        }
        Action::ManageUsers => Decision::Deny("only superadmins can manage users".into()),
        Action::ViewLogs => Decision::Deny("only superadmins can view activity logs".into()),
        Action::ManageBackups => Decision::Deny("only superadmins can manage backups".into()),
        Action::UpdateProfile { .. } if role == Role::Superadmin => Decision::Allow,
        Action::UpdateProfile { target_user_id }
            if role == Role::Admin && target_user_id == principal.id =>
        {
            Decision::Allow
        }
        Action::UpdateProfile { .. } => {
            Decision::Deny("not allowed to update this profile".into())
        }
    }
}

/// Shorthand for `evaluate(..).into_result()`.
pub fn require(principal: &Principal, action: Action) -> AppResult<()> {
    evaluate(principal, action).into_result()
}

/// Consistent combination of role flags to persist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleFlags {
    pub rol: Rol,
    pub is_superuser: bool,
    pub is_staff: bool,
}

/// Superuser implies the superadmin role; superadmin implies staff and
/// superuser; admin implies staff.
pub fn reconcile_role(rol: Rol, is_superuser: bool, is_staff: bool) -> RoleFlags {
    let rol = if is_superuser { Rol::Superadmin } else { rol };
    match rol {
        Rol::Superadmin => RoleFlags {
            rol,
            is_superuser: true,
            is_staff: true,
        },
        Rol::Admin => RoleFlags {
            rol,
            is_superuser: false,
            is_staff: true,
        },
        Rol::Lectura => RoleFlags {
            rol,
            is_superuser: false,
            is_staff,
        },
    }
}

/// Flags for an explicit role assignment. The requested role replaces the
/// stored flags instead of being overridden by them.
pub fn assign_role(rol: Rol) -> RoleFlags {
    reconcile_role(rol, rol == Rol::Superadmin, rol != Rol::Lectura)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal(id: i64, role: Role) -> Principal {
        Principal {
            id,
            username: format!("user{}", id),
            role,
        }
    }

    #[test]
    fn test_resolve_from_profile_and_flags() {
        assert_eq!(Role::resolve(Rol::Lectura, false, false), Role::ReadOnly);
        assert_eq!(Role::resolve(Rol::Admin, false, false), Role::Admin);
        assert_eq!(Role::resolve(Rol::Lectura, true, false), Role::Admin);
        assert_eq!(Role::resolve(Rol::Superadmin, false, false), Role::Superadmin);
        assert_eq!(Role::resolve(Rol::Lectura, false, true), Role::Superadmin);
    }

    #[test]
    fn test_read_only_can_read_but_not_write() {
        let p = principal(1, Role::ReadOnly);
        assert_eq!(evaluate(&p, Action::Read), Decision::Allow);
        assert!(!evaluate(&p, Action::Write).is_allowed());
    }

    #[test]
    fn test_admin_writes_but_cannot_administer() {
        let p = principal(1, Role::Admin);
        assert!(evaluate(&p, Action::Write).is_allowed());
        assert!(!evaluate(&p, Action::ManageUsers).is_allowed());
        assert!(!evaluate(&p, Action::ViewLogs).is_allowed());
        assert!(!evaluate(&p, Action::ManageBackups).is_allowed());
    }

    #[test]
    fn test_superadmin_allowed_everything() {
        let p = principal(1, Role::Superadmin);
        for action in [
            Action::Read,
            Action::Write,
            Action::ManageUsers,
            Action::ViewLogs,
            Action::ManageBackups,
            Action::UpdateProfile { target_user_id: 99 },
        ] {
            assert_eq!(evaluate(&p, action), Decision::Allow);
        }
    }

    #[test]
    fn test_admin_updates_only_own_profile() {
        let p = principal(5, Role::Admin);
        assert!(evaluate(&p, Action::UpdateProfile { target_user_id: 5 }).is_allowed());
        assert!(!evaluate(&p, Action::UpdateProfile { target_user_id: 6 }).is_allowed());
        assert!(!evaluate(&principal(5, Role::ReadOnly), Action::UpdateProfile { target_user_id: 5 })
            .is_allowed());
    }

    #[test]
    fn test_deny_maps_to_forbidden() {
        let err = require(&principal(1, Role::ReadOnly), Action::Write).unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[test]
    fn test_reconcile_superuser_forces_superadmin() {
        let flags = reconcile_role(Rol::Lectura, true, false);
        assert_eq!(flags.rol, Rol::Superadmin);
        assert!(flags.is_staff);
        assert!(flags.is_superuser);
    }

    #[test]
    fn test_reconcile_admin_is_staff() {
        let flags = reconcile_role(Rol::Admin, false, false);
        assert_eq!(flags.rol, Rol::Admin);
        assert!(flags.is_staff);
        assert!(!flags.is_superuser);
    }

    #[test]
    fn test_assign_role_downgrades() {
        let flags = assign_role(Rol::Lectura);
        assert_eq!(
            flags,
            RoleFlags {
                rol: Rol::Lectura,
                is_superuser: false,
                is_staff: false
            }
        );
        assert_eq!(Role::resolve(flags.rol, flags.is_staff, flags.is_superuser), Role::ReadOnly);
    }
}

// Role and ownership checks consumed by handlers

use tracing::warn;

use crate::auth::{error::AuthError, middleware::RequestClaims, models::Role};

/// Allow only callers whose role is exactly `role`
pub fn require_role(ctx: &RequestClaims, role: Role) -> Result<(), AuthError> {
    if ctx.user_type != role {
        warn!(
            "Role check failed: uid={}, required={}, actual={}",
            ctx.uid, role, ctx.user_type
        );
        return Err(AuthError::InsufficientPermissions {
            required: role,
            actual: ctx.user_type,
        });
    }
    Ok(())
}

/// Allow `privileged` callers, or plain users acting on their own record
///
/// Only the plain-user branch compares subject ids; a privileged caller is
/// allowed whatever its uid.
pub fn require_self_or_role(
    ctx: &RequestClaims,
    target_uid: &str,
    privileged: Role,
) -> Result<(), AuthError> {
    if ctx.user_type == privileged {
        return Ok(());
    }

    if ctx.user_type == Role::User && ctx.uid == target_uid {
        return Ok(());
    }

    warn!(
        "Ownership check failed: uid={}, role={}, target={}",
        ctx.uid, ctx.user_type, target_uid
    );
    Err(AuthError::InsufficientPermissions {
        required: privileged,
        actual: ctx.user_type,
    })
}

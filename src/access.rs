use crate::{
    auth::Principal,
    error::{ApiError, ApiResult},
    models::Role,
};

/// Roles allowed to administer accounts and application workflow.
pub const ADMINISTRATORS: &[Role] = &[Role::Admin, Role::SubAdmin];

/// Roles allowed to read any applicant's data. `LimitedHelper` is admitted but
/// receives redacted applications.
pub const REVIEWERS: &[Role] = &[
    Role::Admin,
    Role::SubAdmin,
    Role::TrustedHelper,
    Role::LimitedHelper,
];

/// What an operation demands of its caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    AnyAuthenticated,
    RoleIn(&'static [Role]),
    /// Allowed for the target user themself, otherwise as `RoleIn`.
    SelfOrRoleIn(&'static [Role]),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

/// Listing users and applications, creating users with an explicit role and
/// moving applications through their workflow.
pub const ADMINISTER: Requirement = Requirement::RoleIn(ADMINISTRATORS);

/// Reading a user, their application and its comments, or writing into them.
pub const ACCESS_APPLICANT: Requirement = Requirement::SelfOrRoleIn(REVIEWERS);

/// AccessController
///
/// Stateless policy evaluation over a resolved [`Principal`]. Pure: no I/O,
/// deterministic for equal inputs.
pub struct AccessController;

impl AccessController {
    pub fn evaluate(principal: &Principal, requirement: Requirement, target: Option<i64>) -> Decision {
        let allowed = match requirement {
            Requirement::AnyAuthenticated => true,
            Requirement::RoleIn(roles) => roles.contains(&principal.role),
            Requirement::SelfOrRoleIn(roles) => {
                target == Some(principal.user_id) || roles.contains(&principal.role)
            }
        };

        if allowed { Decision::Allow } else { Decision::Deny }
    }

    /// Like [`evaluate`](Self::evaluate), but a denial becomes
    /// [`ApiError::AccessDenied`], indistinguishable from failed authentication.
    pub fn authorize(principal: &Principal, requirement: Requirement, target: Option<i64>) -> ApiResult<()> {
        match Self::evaluate(principal, requirement, target) {
            Decision::Allow => Ok(()),
            Decision::Deny => {
                tracing::warn!(
                    user_id = principal.user_id,
                    role = %principal.role,
                    ?requirement,
                    ?target,
                    "access denied"
                );
                Err(ApiError::AccessDenied)
            }
        }
    }
}

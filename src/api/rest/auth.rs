use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use crate::error::{AppError, KnownError};
use crate::models::profile::Role;

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

/// Identity handed over by the upstream authentication gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub id: Uuid,
    pub role: Role,
}

impl Actor {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn require_admin(&self) -> Result<(), AppError> {
        self.require(&[])
    }

    /// Admins pass every role check.
    pub fn require(&self, roles: &[Role]) -> Result<(), AppError> {
        if self.is_admin() || roles.contains(&self.role) {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!(
                "{:?} may not perform this action",
                self.role
            )))
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = KnownError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
                .ok_or_else(|| {
                    AppError::Unauthorized(format!("missing {name} header")).keyed("err.auth")
                })
        };

        let id = header(ACTOR_ID_HEADER)?
            .parse::<Uuid>()
            .map_err(|err| AppError::Unauthorized(format!("invalid actor id: {err}")).keyed("err.auth"))?;
        let role = header(ACTOR_ROLE_HEADER)?
            .parse::<Role>()
            .map_err(|err| AppError::Unauthorized(err).keyed("err.auth"))?;

        Ok(Self { id, role })
    }
}

pub mod password;
pub mod token;

use std::sync::Arc;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header;
use axum::http::request::Parts;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::account::Role;
use crate::models::notification::Recipient;
use crate::state::AppState;

/// Authenticated caller, resolved from the bearer token on every request.
#[derive(Debug, Clone)]
pub struct Session {
    pub subject: Uuid,
    pub role: Role,
    pub email: String,
}

impl Session {
    pub fn require(&self, role: Role) -> Result<(), AppError> {
        if self.role == role {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!("{} only", role.as_str())))
        }
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for Session {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or_else(|| AppError::Unauthorized("missing bearer token".to_string()))?;

        Session::resolve(state, token.trim())
    }
}

impl Session {
    /// Verifies a bearer token and checks the account behind it still exists.
    pub fn resolve(state: &AppState, token: &str) -> Result<Self, AppError> {
        let claims = state.tokens.verify(token)?;

        match claims.role {
            Role::Admin => {
                if !state.admins.contains_key(&claims.sub) {
                    return Err(AppError::Unauthorized("account not found".to_string()));
                }
            }
            Role::Client => {
                if !state.clients.contains_key(&claims.sub) {
                    return Err(AppError::Unauthorized("account not found".to_string()));
                }
            }
            Role::Driver => {
                let driver = state
                    .drivers
                    .get(&claims.sub)
                    .ok_or_else(|| AppError::Unauthorized("account not found".to_string()))?;
                if !driver.is_active {
                    return Err(AppError::Forbidden("account disabled".to_string()));
                }
            }
        }

        Ok(Session {
            subject: claims.sub,
            role: claims.role,
            email: claims.email,
        })
    }

    /// Notification topic owned by this session.
    pub fn topic(&self) -> Recipient {
        match self.role {
            Role::Admin => Recipient::Admin,
            Role::Driver => Recipient::Driver(self.subject),
            Role::Client => Recipient::Client(self.email.clone()),
        }
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

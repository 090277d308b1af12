use crate::error::ApiError;
use crate::models::UserRole;
use crate::AppState;
use actix_session::{Session, SessionExt};
use actix_web::{
    body::EitherBody,
    dev::{self, forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    web, Error, FromRequest, HttpRequest, HttpResponse,
};
use futures_util::future::{ok, LocalBoxFuture, Ready};
use serde::Serialize;
use serde_json::json;
use std::future::{ready, Ready as StdReady};
use subtle::ConstantTimeEq;

pub const SCHEDULER_TOKEN_HEADER: &str = "X-Scheduler-Token";

const SESSION_USER_ID: &str = "user_id";
const SESSION_USERNAME: &str = "username";
const SESSION_ROLE: &str = "role";

/// The logged-in user, read from the session cookie.
#[derive(Debug, Clone, Serialize)]
pub struct AuthenticatedUser {
    pub user_id: i64,
    pub username: String,
    pub role: UserRole,
}

impl AuthenticatedUser {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    pub fn store(&self, session: &Session) -> Result<(), ApiError> {
        session.renew();
        session
            .insert(SESSION_USER_ID, self.user_id)
            .and_then(|_| session.insert(SESSION_USERNAME, &self.username))
            .and_then(|_| session.insert(SESSION_ROLE, self.role))
            .map_err(|e| ApiError::Internal(format!("Failed to write session: {}", e)))
    }
}

fn user_from_session(session: &Session) -> Option<AuthenticatedUser> {
    match (
        session.get::<i64>(SESSION_USER_ID),
        session.get::<String>(SESSION_USERNAME),
        session.get::<UserRole>(SESSION_ROLE),
    ) {
        (Ok(Some(user_id)), Ok(Some(username)), Ok(Some(role))) => Some(AuthenticatedUser { user_id, username, role }),
        _ => None,
    }
}

impl FromRequest for AuthenticatedUser {
    type Error = ApiError;
    type Future = StdReady<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut dev::Payload) -> Self::Future {
        ready(user_from_session(&req.get_session()).ok_or_else(|| ApiError::Unauthorized("Not logged in.".to_string())))
    }
}

/// A logged-in admin. Editors get 403.
#[derive(Debug, Clone)]
pub struct AdminUser(pub AuthenticatedUser);

impl FromRequest for AdminUser {
    type Error = ApiError;
    type Future = StdReady<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut dev::Payload) -> Self::Future {
        let result = match user_from_session(&req.get_session()) {
            Some(user) if user.is_admin() => Ok(AdminUser(user)),
            Some(_) => Err(ApiError::Forbidden("Admin access required.".to_string())),
            None => Err(ApiError::Unauthorized("Not logged in.".to_string())),
        };
        ready(result)
    }
}

fn tokens_match(provided: &str, expected: &str) -> bool {
    provided.as_bytes().ct_eq(expected.as_bytes()).into()
}

pub fn has_valid_scheduler_token(req: &HttpRequest) -> bool {
    let expected = match req.app_data::<web::Data<AppState>>() {
        Some(state) => state.scheduler_token.clone(),
        None => return false,
    };
    req.headers()
        .get(SCHEDULER_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|token| tokens_match(token.trim(), &expected))
        .unwrap_or(false)
}

/// Either a logged-in admin or a caller presenting the scheduler token.
#[derive(Debug, Clone)]
pub enum AdminOrScheduler {
    Admin(AuthenticatedUser),
    Scheduler,
}

impl FromRequest for AdminOrScheduler {
    type Error = ApiError;
    type Future = StdReady<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut dev::Payload) -> Self::Future {
        if has_valid_scheduler_token(req) {
            return ready(Ok(AdminOrScheduler::Scheduler));
        }
        let result = match user_from_session(&req.get_session()) {
            Some(user) if user.is_admin() => Ok(AdminOrScheduler::Admin(user)),
            Some(_) => Err(ApiError::Forbidden("Admin access required.".to_string())),
            None => Err(ApiError::Unauthorized("Not logged in.".to_string())),
        };
        ready(result)
    }
}

/// Rejects every request in its scope that lacks a valid scheduler token.
pub struct SchedulerTokenValidation;

impl<S, B> Transform<S, ServiceRequest> for SchedulerTokenValidation
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = SchedulerTokenValidationMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(SchedulerTokenValidationMiddleware { service })
    }
}

pub struct SchedulerTokenValidationMiddleware<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for SchedulerTokenValidationMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        if has_valid_scheduler_token(req.request()) {
            let fut = self.service.call(req);
            Box::pin(async move {
                let res = fut.await?;
                Ok(res.map_into_left_body())
            })
        } else {
            log::warn!("Rejected scheduler call to {} without a valid token", req.path());
            Box::pin(async move {
                let (http_req, _payload) = req.into_parts();
                let res = HttpResponse::Unauthorized()
                    .json(json!({ "success": false, "error": "Invalid scheduler token" }))
                    .map_into_right_body();
                Ok(ServiceResponse::new(http_req, res))
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_comparison() {
        assert!(tokens_match("abc", "abc"));
        assert!(!tokens_match("abc", "abd"));
        assert!(!tokens_match("abc", "abcd"));
        assert!(!tokens_match("", "abc"));
    }
}

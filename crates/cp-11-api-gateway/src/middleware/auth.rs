//! Bearer-token authentication and effective-scope computation.
//!
//! Runs once per request: token → claims → [`EffectiveScope`], which then
//! rides the request extensions into every handler. Missing or bad tokens
//! are 401; scope shortfalls are each handler's 403 to decide.

use crate::error::{ApiError, IntoApiError};
use crate::state::AppState;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use cp_05_authz::{AuthError, Claims, CourierScope, EffectiveScope};
use shared_types::{RequestId, Role};

/// Authenticate the request and attach its effective scope.
pub async fn authenticate(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let request_id = req
        .extensions()
        .get::<RequestId>()
        .cloned()
        .unwrap_or_else(RequestId::generate);

    let header = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AuthError::TokenMissing.into_api(&request_id))?;
    let token = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| AuthError::TokenInvalid.into_api(&request_id))?;

    let claims = state
        .tokens
        .verify(token)
        .map_err(|e| e.into_api(&request_id))?;
    let scope = resolve_scope(&state, &claims)
        .await
        .map_err(|e| e.into_api(&request_id))?
        .with_school(claims.school.clone());

    req.extensions_mut().insert(scope);
    Ok(next.run(req).await)
}

/// Widen verified claims into the request's effective scope.
///
/// A `courier` role token whose courier record is missing or not approved
/// degrades to a plain user scope rather than failing the request; the
/// caller keeps read access to their own letters.
pub async fn resolve_scope(
    state: &AppState,
    claims: &Claims,
) -> Result<EffectiveScope, AuthError> {
    let user_id = claims.user_id();
    match claims.role {
        Role::Admin => Ok(EffectiveScope::admin(user_id)),
        Role::User => Ok(EffectiveScope::user(user_id)),
        Role::Courier => {
            let courier = state
                .couriers
                .get_by_user(&user_id)
                .await
                .map_err(|_| AuthError::TokenInvalid)?;
            match courier {
                Some(courier) if courier.is_active() => Ok(EffectiveScope::courier(
                    user_id,
                    CourierScope {
                        courier_id: courier.id,
                        level: courier.level,
                        managed_prefix: courier.managed_prefix,
                    },
                )),
                _ => Ok(EffectiveScope::user(user_id)),
            }
        }
    }
}

use crate::{
    AppState,
    api::models::users::{CurrentUser, Role},
    auth::session,
    config::Config,
    errors::{Error, Result},
};
use axum::{extract::FromRequestParts, http::request::Parts};
use tracing::{debug, instrument, trace};

/// Extract user from a JWT in the `Authorization: Bearer` header
/// Returns:
/// - None: No Authorization header or not a Bearer token
/// - Some(Ok(user)): Valid JWT found and verified
/// - Some(Err(error)): Bearer token present but invalid or expired
#[instrument(skip(parts, config))]
fn try_bearer_session_auth(parts: &Parts, config: &Config) -> Option<Result<CurrentUser>> {
    let auth_header = parts.headers.get(axum::http::header::AUTHORIZATION)?;

    let auth_str = match auth_header.to_str() {
        Ok(s) => s,
        Err(e) => {
            return Some(Err(Error::BadRequest {
                message: format!("Invalid authorization header: {e}"),
            }));
        }
    };

    let token = auth_str.strip_prefix("Bearer ")?;
    Some(session::verify_session_token(token.trim(), config))
}

/// Extract user from JWT session cookie if present and valid
/// Returns:
/// - None: No session cookie present
/// - Some(Ok(user)): Valid JWT found and verified
/// - Some(Err(error)): Cookie header unreadable, or every session cookie failed verification
#[instrument(skip(parts, config))]
fn try_cookie_session_auth(parts: &Parts, config: &Config) -> Option<Result<CurrentUser>> {
    let cookie_header = parts.headers.get(axum::http::header::COOKIE)?;

    let cookie_str = match cookie_header.to_str() {
        Ok(s) => s,
        Err(e) => {
            return Some(Err(Error::BadRequest {
                message: format!("Invalid cookie header: {e}"),
            }));
        }
    };
    let cookie_name = &config.auth.native.session.cookie_name;

    let mut last_error = None;
    for cookie in cookie_str.split(';') {
        let Some((name, value)) = cookie.trim().split_once('=') else {
            continue;
        };
        if name != cookie_name {
            continue;
        }
        match session::verify_session_token(value, config) {
            Ok(user) => return Some(Ok(user)),
            // A stale cookie may sit next to a fresh one with the same name
            Err(e) => last_error = Some(e),
        }
    }
    last_error.map(Err)
}

/// Extract user from trusted proxy headers
/// Returns:
/// - None: No user header present
/// - Some(Ok(user)): User header present; roles come from the roles header
/// - Some(Err(error)): User header present but empty or not valid UTF-8
#[instrument(skip(parts, config))]
fn try_proxy_header_auth(parts: &Parts, config: &Config) -> Option<Result<CurrentUser>> {
    let proxy = &config.auth.proxy_header;
    let raw_user = parts.headers.get(&proxy.header_name)?;

    let user_id = match raw_user.to_str().map(str::trim) {
        Ok(id) if !id.is_empty() => id.to_string(),
        _ => {
            return Some(Err(Error::Unauthenticated {
                message: Some(format!("Invalid {} header", proxy.header_name)),
            }));
        }
    };

    let email = parts
        .headers
        .get(&proxy.email_header_name)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .map_or_else(|| user_id.clone(), str::to_string);

    let mut roles: Vec<Role> = parts
        .headers
        .get(&proxy.roles_header_name)
        .and_then(|h| h.to_str().ok())
        .map(|roles| {
            roles
                .split(',')
                .filter(|r| !r.trim().is_empty())
                .filter_map(|r| match r.parse::<Role>() {
                    Ok(role) => Some(role),
                    Err(e) => {
                        debug!("Ignoring proxy role: {e}");
                        None
                    }
                })
                .collect()
        })
        .unwrap_or_default();
    if roles.is_empty() {
        roles.push(Role::User);
    }

    Some(Ok(CurrentUser { id: user_id, email, roles }))
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Error;

    #[instrument(skip(parts, state))]
    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        // Each method returns Option<Result<CurrentUser>>:
        // - None means the method found no credentials
        // - Some(Err(_)) means credentials were present but invalid
        // The first success wins, so a stale cookie does not block a valid bearer token.
        let config = &state.config;
        let mut auth_errors = Vec::new();

        let mut attempts: Vec<(&str, fn(&Parts, &Config) -> Option<Result<CurrentUser>>)> = Vec::new();
        if config.auth.native.enabled {
            attempts.push(("JWT bearer", try_bearer_session_auth));
            attempts.push(("JWT session cookie", try_cookie_session_auth));
        }
        if config.auth.proxy_header.enabled {
            attempts.push(("Proxy header", try_proxy_header_auth));
        }

        for (method, attempt) in attempts {
            match attempt(parts, config) {
                Some(Ok(user)) => {
                    debug!("Found {method} authenticated user: {}", user.id);
                    return Ok(user);
                }
                Some(Err(e)) => {
                    trace!("{method} authentication failed: {:?}", e);
                    auth_errors.push((method, e));
                }
                None => trace!("No {method} authentication attempted"),
            }
        }

        // Internal failures (e.g. a missing signing key) must not be reported as bad credentials
        if let Some(pos) = auth_errors.iter().position(|(_, e)| matches!(e, Error::Internal { .. })) {
            return Err(auth_errors.swap_remove(pos).1);
        }

        if auth_errors.is_empty() {
            trace!("No authentication credentials found in request");
        } else {
            trace!("All authentication attempts failed ({}): {:?}", auth_errors.len(), auth_errors);
        }
        Err(Error::Unauthenticated { message: None })
    }
}

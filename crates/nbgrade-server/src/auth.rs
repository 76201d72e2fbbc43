//! Cookie-session authentication and the OpenID Connect login dance.
//!
//! The session cookie carries a salted hash of the user's email, never the
//! email itself; the hash is the user's pseudonymous identity throughout the
//! system.

use crate::{error::ServerError, AppState};
use anyhow::Context;
use axum::{
    extract::{Query, State},
    response::{Html, IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, PrivateCookieJar};
use serde::Deserialize;
use sha2::{Digest, Sha224};

pub(crate) const SESSION_COOKIE: &str = "user_session";
const SESSION_MAX_AGE_SECS: i64 = 3600;

/// Salted SHA-224 of the user id (email), hex encoded.
pub(crate) fn hash_id(salt: &str, id: &str) -> String {
    let mut hasher = Sha224::new();
    hasher.update(salt.as_bytes());
    hasher.update(id.as_bytes());
    hex::encode(hasher.finalize())
}

/// Reads the session and returns the user hash, rejecting requests without
/// a valid non-empty hash.
pub(crate) fn authenticate(jar: &PrivateCookieJar) -> Result<String, ServerError> {
    match jar.get(SESSION_COOKIE) {
        Some(cookie) if !cookie.value().is_empty() => Ok(cookie.value().to_string()),
        _ => Err(ServerError::Unauthorized),
    }
}

fn session_cookie(hash: String, secure: bool) -> Cookie<'static> {
    let mut cookie = Cookie::new(SESSION_COOKIE, hash);
    cookie.set_path("/");
    cookie.set_max_age(time::Duration::seconds(SESSION_MAX_AGE_SECS));
    cookie.set_http_only(true);
    cookie.set_secure(secure);
    cookie
}

fn removal_cookie() -> Cookie<'static> {
    let mut cookie = Cookie::new(SESSION_COOKIE, "");
    cookie.set_path("/");
    cookie
}

pub(crate) async fn handle_login(State(state): State<AppState>) -> Result<Response, ServerError> {
    let opts = &state.inner.opts;
    let oidc = opts
        .oidc
        .as_ref()
        .context("authentication is not configured")?;
    let url = reqwest::Url::parse_with_params(
        &oidc.auth,
        &[
            ("client_id", opts.client_id.as_str()),
            ("redirect_uri", &format!("{}/callback", opts.server_url)),
            ("response_type", "code"),
            ("scope", "openid email profile"),
            ("state", &state.inner.oauth_state),
        ],
    )
    .context("error building authorization URL")?;
    Ok(Redirect::temporary(url.as_str()).into_response())
}

#[derive(Deserialize)]
pub(crate) struct CallbackQuery {
    state: String,
    code: String,
}

// The user-info fields the identity provider may return.
#[derive(Deserialize)]
struct UserInfo {
    #[serde(default)]
    email: String,
}

pub(crate) async fn handle_callback(
    State(state): State<AppState>,
    jar: PrivateCookieJar,
    Query(query): Query<CallbackQuery>,
) -> Result<Response, ServerError> {
    let opts = &state.inner.opts;
    let oidc = opts
        .oidc
        .as_ref()
        .context("authentication is not configured")?;
    if query.state != state.inner.oauth_state {
        return Err(anyhow::anyhow!("invalid oauth state").into());
    }

    let token: serde_json::Value = state
        .inner
        .http
        .post(&oidc.token)
        .form(&[
            ("grant_type", "authorization_code"),
            ("code", &query.code),
            ("client_id", &opts.client_id),
            ("client_secret", &opts.client_secret),
            ("redirect_uri", &format!("{}/callback", opts.server_url)),
        ])
        .send()
        .await
        .context("code exchange failed")?
        .json()
        .await
        .context("error parsing token response")?;
    let access_token = token
        .get("access_token")
        .and_then(|v| v.as_str())
        .context("token response has no access_token")?;

    let profile: UserInfo = state
        .inner
        .http
        .get(&oidc.userinfo)
        .bearer_auth(access_token)
        .send()
        .await
        .context("error getting user info")?
        .json()
        .await
        .context("error parsing user info")?;

    if !opts.allowed_users.is_empty() && !opts.allowed_users.contains(&profile.email) {
        // clear the session so a retry starts clean
        let jar = jar.remove(removal_cookie());
        return Ok((jar, ServerError::Forbidden(profile.email)).into_response());
    }

    let hash = hash_id(&opts.hash_salt, &profile.email);
    log::info!("authenticated user hash {hash}");
    let jar = jar.add(session_cookie(hash, opts.secure_cookie));
    Ok((jar, Redirect::temporary("/profile")).into_response())
}

pub(crate) async fn handle_logout(jar: PrivateCookieJar) -> Response {
    let jar = jar.remove(removal_cookie());
    (jar, Redirect::temporary("/profile")).into_response()
}

pub(crate) async fn handle_profile(jar: PrivateCookieJar) -> Response {
    match jar.get(SESSION_COOKIE) {
        Some(cookie) if !cookie.value().is_empty() => Html(format!(
            "Logged in as {}. <a href='/logout'>Log out link</a>.\
             <p>Click here to <a href='/'>upload</a> a notebook manually, or \
             <strong>you can close this window and retry the upload from the notebook.</strong>",
            cookie.value()
        ))
        .into_response(),
        _ => Html("Logged out. <a href='/login'>Log in</a>.".to_string()).into_response(),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn hash_is_salted_sha224() {
        let hash = hash_id("salt", "student@example.com");
        // 224 bits, hex encoded
        assert_eq!(hash.len(), 56);
        assert_ne!(hash, hash_id("other-salt", "student@example.com"));
        assert_eq!(hash, hash_id("salt", "student@example.com"));
    }
}

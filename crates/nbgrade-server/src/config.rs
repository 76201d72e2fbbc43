//! Server configuration: environment variables, the allow-list file, and
//! OpenID Connect endpoint discovery.

use anyhow::Context;
use nbgrade_util::file_util;
use std::{collections::HashSet, env, path::PathBuf};

/// The environment variables recognized by the server.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub port: u16,
    /// Public base URL, used in redirect URIs and login links.
    pub server_url: String,
    pub client_id: String,
    pub client_secret: String,
    /// 32 or 64 random bytes for cookie signing.
    pub cookie_auth_key: String,
    /// 16, 24 or 32 random bytes for cookie encryption.
    pub cookie_encrypt_key: String,
    /// Secret salt for hashing student emails into pseudonymous ids.
    pub hash_salt: String,
    /// Mounted bucket directory for submission/report mirroring.
    pub log_bucket: Option<PathBuf>,
    /// Recognized for deployment parity; consumed by offline key tooling.
    pub jwt_key: Option<String>,
}

impl Config {
    /// Collects the configuration from the environment. A zero `port_flag`
    /// falls back to the PORT variable, then to 8000.
    pub fn load(port_flag: u16) -> Self {
        let port = if port_flag != 0 {
            port_flag
        } else {
            env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8000)
        };
        let server_url =
            env::var("SERVER_URL").unwrap_or_else(|_| format!("http://localhost:{port}"));
        Self {
            port,
            server_url,
            client_id: env::var("CLIENT_ID").unwrap_or_default(),
            client_secret: env::var("CLIENT_SECRET").unwrap_or_default(),
            cookie_auth_key: env::var("COOKIE_AUTH_KEY").unwrap_or_default(),
            cookie_encrypt_key: env::var("COOKIE_ENCRYPT_KEY").unwrap_or_default(),
            hash_salt: env::var("HASH_SALT").unwrap_or_default(),
            log_bucket: env::var("LOG_BUCKET").ok().map(PathBuf::from),
            jwt_key: env::var("JWT_KEY").ok(),
        }
    }
}

/// The OpenID Connect endpoints the login dance talks to.
#[derive(Debug, Clone)]
pub struct OidcEndpoints {
    pub auth: String,
    pub token: String,
    pub userinfo: String,
}

/// Fetches `<issuer>/.well-known/openid-configuration` and reads the
/// endpoint URLs out of it.
pub async fn discover_oidc(
    http: &reqwest::Client,
    issuer: &str,
) -> anyhow::Result<OidcEndpoints> {
    let well_known = format!("{issuer}/.well-known/openid-configuration");
    let doc: serde_json::Value = http
        .get(&well_known)
        .send()
        .await
        .with_context(|| format!("error on GET {well_known}"))?
        .json()
        .await
        .with_context(|| format!("error parsing response from {well_known}"))?;
    let endpoint = |key: &str| -> anyhow::Result<String> {
        doc.get(key)
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .with_context(|| format!("response from {well_known} does not have {key:?}"))
    };
    Ok(OidcEndpoints {
        auth: endpoint("authorization_endpoint")?,
        token: endpoint("token_endpoint")?,
        userinfo: endpoint("userinfo_endpoint")?,
    })
}

/// Reads the allow-list file: one user email per line, blank lines skipped.
pub fn load_allowed_users(path: &PathBuf) -> anyhow::Result<HashSet<String>> {
    let contents = file_util::read_file_to_string(path)?;
    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use super::*;
    use std::io::Write;

    #[test]
    fn port_flag_wins_over_env() {
        let config = Config::load(9001);
        assert_eq!(config.port, 9001);
    }

    #[test]
    fn reads_allow_list() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "alice@example.com").unwrap();
        writeln!(f).unwrap();
        writeln!(f, "  bob@example.com  ").unwrap();
        let users = load_allowed_users(&f.path().to_path_buf()).unwrap();
        assert!(users.contains("alice@example.com"));
        assert!(users.contains("bob@example.com"));
        assert_eq!(users.len(), 2);
    }
}

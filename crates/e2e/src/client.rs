//! REST adapter for the server under test.
//!
//! Provisioning calls (user creation) use admin basic auth. File and share
//! calls ride on the browser session: they carry the page's request token and
//! its cookies, exactly like the web UI's own requests.

use reqwest::header::{ACCEPT, CONTENT_TYPE, COOKIE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::TargetConfig;
use crate::encoding::dav_path;
use crate::error::{E2eError, E2eResult};
use crate::fixtures::TestUser;

const OCS_HEADER: &str = "OCS-APIRequest";
const REQUEST_TOKEN_HEADER: &str = "requesttoken";

/// `OC.Share.SHARE_TYPE_LINK`
pub const SHARE_TYPE_LINK: u8 = 3;

/// Length of a public link token.
pub const SHARE_TOKEN_LEN: usize = 15;

/// Credentials of a logged-in browser session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCredentials {
    /// Anti-forgery token from `window.OC.requestToken`
    pub request_token: String,
    /// `name=value; name=value` header built from the browser's cookies
    pub cookie_header: String,
}

#[derive(Debug, Deserialize)]
struct OcsEnvelope<T> {
    ocs: T,
}

#[derive(Debug, Deserialize)]
struct OcsMetaOnly {
    meta: OcsMeta,
}

#[derive(Debug, Deserialize)]
struct OcsMeta {
    status: String,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateShareRequest<'a> {
    path: &'a str,
    share_type: u8,
}

#[derive(Debug, Deserialize)]
struct ServerStatus {
    installed: bool,
    #[serde(default)]
    maintenance: bool,
    #[serde(default)]
    versionstring: Option<String>,
}

/// HTTP client bound to one server.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    admin_user: String,
    admin_password: String,
}

impl ApiClient {
    pub fn new(target: &TargetConfig) -> E2eResult<Self> {
        let http = Client::builder().timeout(target.request_timeout).build()?;
        Ok(Self {
            http,
            base_url: target.normalized_base_url(),
            admin_user: target.admin_user.clone(),
            admin_password: target.admin_password.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Polls `/status.php` until the instance reports itself installed and
    /// out of maintenance mode.
    pub async fn wait_until_ready(&self, timeout: Duration) -> E2eResult<()> {
        let url = format!("{}/status.php", self.base_url);
        let start = Instant::now();
        let mut attempts = 0;

        while start.elapsed() < timeout {
            attempts += 1;

            match self.http.get(&url).send().await {
                Ok(resp) if resp.status().is_success() => match resp.json::<ServerStatus>().await {
                    Ok(status) if status.installed && !status.maintenance => {
                        info!(
                            "Server ready at {} ({})",
                            self.base_url,
                            status.versionstring.as_deref().unwrap_or("unknown version")
                        );
                        return Ok(());
                    }
                    Ok(status) => {
                        debug!(
                            "Server not ready: installed={} maintenance={}",
                            status.installed, status.maintenance
                        );
                    }
                    Err(e) => warn!("Unexpected status.php body: {}", e),
                },
                Ok(resp) => warn!("status.php returned {}", resp.status()),
                Err(e) => {
                    if attempts == 1 {
                        info!("Waiting for server at {}...", self.base_url);
                    }
                    if !e.is_connect() {
                        warn!("Status probe error: {}", e);
                    }
                }
            }

            sleep(Duration::from_millis(500)).await;
        }

        Err(E2eError::ServerUnavailable { url, attempts })
    }

    /// Provisions a user through the OCS provisioning API.
    #[tracing::instrument(name = "Creating user", skip(self, user), fields(username = %user.username))]
    pub async fn create_user(&self, user: &TestUser) -> E2eResult<()> {
        let url = format!("{}/ocs/v1.php/cloud/users?format=json", self.base_url);
        let response = self
            .http
            .post(&url)
            .basic_auth(&self.admin_user, Some(&self.admin_password))
            .header(OCS_HEADER, "true")
            .form(&[("userid", user.username.as_str()), ("password", user.password.as_str())])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        let envelope: OcsEnvelope<OcsMetaOnly> = serde_json::from_str(&body).map_err(|_| {
            warn!("User creation returned HTTP {} with non-OCS body", status);
            E2eError::UserCreation(user.username.clone())
        })?;

        if envelope.ocs.meta.status.eq_ignore_ascii_case("ok") {
            info!("Created user {} ({})", user.username, status);
            Ok(())
        } else {
            warn!(
                "User creation rejected: {}",
                envelope.ocs.meta.message.as_deref().unwrap_or("no message")
            );
            Err(E2eError::UserCreation(user.username.clone()))
        }
    }

    /// Uploads `bytes` to `folder/name` through WebDAV.
    #[tracing::instrument(name = "Uploading file", skip(self, session, bytes), fields(size = bytes.len()))]
    pub async fn upload(
        &self,
        session: &SessionCredentials,
        folder: &str,
        name: &str,
        mime_type: &str,
        bytes: Vec<u8>,
    ) -> E2eResult<()> {
        let url = format!("{}/remote.php/webdav{}", self.base_url, dav_path(folder, name));
        self.http
            .put(&url)
            .header(REQUEST_TOKEN_HEADER, &session.request_token)
            .header(COOKIE, &session.cookie_header)
            .header(CONTENT_TYPE, mime_type)
            .body(bytes)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// Creates a public link share and returns its token.
    ///
    /// Any response without a non-empty `ocs.data.token` is returned as a
    /// `MalformedShareResponse` carrying the raw body.
    #[tracing::instrument(name = "Creating link share", skip(self, session))]
    pub async fn create_link_share(
        &self,
        session: &SessionCredentials,
        path: &str,
    ) -> E2eResult<String> {
        let url = format!("{}/ocs/v2.php/apps/files_sharing/api/v1/shares", self.base_url);
        let body = self
            .http
            .post(&url)
            .header(REQUEST_TOKEN_HEADER, &session.request_token)
            .header(COOKIE, &session.cookie_header)
            .header(OCS_HEADER, "true")
            .header(ACCEPT, "application/json")
            .json(&CreateShareRequest {
                path,
                share_type: SHARE_TYPE_LINK,
            })
            .send()
            .await?
            .text()
            .await?;

        let token = extract_share_token(&body)?;
        info!("Share link created {}", token);
        Ok(token)
    }
}

/// Pulls `ocs.data.token` out of a share response.
pub fn extract_share_token(body: &str) -> E2eResult<String> {
    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|_| E2eError::MalformedShareResponse(body.to_string()))?;

    value
        .pointer("/ocs/data/token")
        .and_then(serde_json::Value::as_str)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .ok_or_else(|| E2eError::MalformedShareResponse(body.to_string()))
}

/// Checks the share token has the expected length.
pub fn validate_share_token(token: &str) -> E2eResult<()> {
    let len = token.chars().count();
    if len == SHARE_TOKEN_LEN {
        Ok(())
    } else {
        Err(E2eError::InvalidShareToken {
            token: token.to_string(),
            len,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, body_string_contains, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> ApiClient {
        ApiClient::new(&TargetConfig {
            base_url: format!("{}/index.php", server.uri()),
            request_timeout: Duration::from_secs(2),
            ..Default::default()
        })
        .unwrap()
    }

    fn session() -> SessionCredentials {
        SessionCredentials {
            request_token: "tok123".to_string(),
            cookie_header: "oc_sessionPassphrase=abc; nc_session_id=def".to_string(),
        }
    }

    fn ocs_status(status: &str) -> serde_json::Value {
        serde_json::json!({ "ocs": { "meta": { "status": status, "statuscode": 100 }, "data": {} } })
    }

    #[tokio::test]
    async fn base_url_is_normalized() {
        let server = MockServer::start().await;
        assert_eq!(client_for(&server).base_url(), server.uri());
    }

    #[tokio::test]
    async fn create_user_posts_form_with_admin_auth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ocs/v1.php/cloud/users"))
            .and(query_param("format", "json"))
            .and(header("OCS-APIRequest", "true"))
            .and(header("Authorization", "Basic YWRtaW46YWRtaW4="))
            .and(header("Content-Type", "application/x-www-form-urlencoded"))
            .and(body_string_contains("userid=abcdefghij"))
            .and(body_string_contains("password=password"))
            .respond_with(ResponseTemplate::new(200).set_body_json(ocs_status("ok")))
            .expect(1)
            .mount(&server)
            .await;

        client_for(&server)
            .create_user(&TestUser::new("abcdefghij", "password"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn create_user_status_is_case_insensitive() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(ocs_status("OK")))
            .mount(&server)
            .await;

        assert!(client_for(&server)
            .create_user(&TestUser::new("u", "p"))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn create_user_fails_on_non_ok_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(ocs_status("failure")))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .create_user(&TestUser::new("taken", "p"))
            .await
            .unwrap_err();
        assert!(matches!(err, E2eError::UserCreation(name) if name == "taken"));
    }

    #[tokio::test]
    async fn create_user_fails_on_garbage_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .create_user(&TestUser::new("u", "p"))
            .await
            .unwrap_err();
        assert!(matches!(err, E2eError::UserCreation(_)));
    }

    #[tokio::test]
    async fn upload_puts_encoded_path_with_session_headers() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/remote.php/webdav/My%20Music/audio.mp3"))
            .and(header("requesttoken", "tok123"))
            .and(header("Content-Type", "audio/mpeg"))
            .and(header("Cookie", "oc_sessionPassphrase=abc; nc_session_id=def"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        client_for(&server)
            .upload(&session(), "/My Music", "audio.mp3", "audio/mpeg", vec![1, 2, 3])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn upload_propagates_http_errors() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .upload(&session(), "", "audio.ogg", "audio/ogg", vec![0])
            .await
            .unwrap_err();
        assert!(matches!(err, E2eError::Http(_)));
    }

    #[tokio::test]
    async fn create_link_share_returns_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ocs/v2.php/apps/files_sharing/api/v1/shares"))
            .and(header("requesttoken", "tok123"))
            .and(body_json(serde_json::json!({ "path": "/audio.mp3", "shareType": 3 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ocs": { "meta": { "status": "ok" }, "data": { "id": "7", "token": "aBcDeFgHiJkLmNo" } }
            })))
            .mount(&server)
            .await;

        let token = client_for(&server)
            .create_link_share(&session(), "/audio.mp3")
            .await
            .unwrap();
        assert_eq!(token, "aBcDeFgHiJkLmNo");
        validate_share_token(&token).unwrap();
    }

    #[tokio::test]
    async fn create_link_share_surfaces_malformed_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "ocs": { "meta": { "status": "failure", "message": "Wrong path" }, "data": [] }
            })))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .create_link_share(&session(), "/missing")
            .await
            .unwrap_err();
        match err {
            E2eError::MalformedShareResponse(body) => assert!(body.contains("Wrong path")),
            other => panic!("expected malformed response, got {other:?}"),
        }
    }

    #[test]
    fn empty_token_is_malformed() {
        let body = r#"{"ocs":{"data":{"token":""}}}"#;
        assert!(matches!(
            extract_share_token(body),
            Err(E2eError::MalformedShareResponse(_))
        ));
    }

    #[test]
    fn share_token_length_is_checked() {
        assert!(validate_share_token("123456789012345").is_ok());
        assert!(matches!(
            validate_share_token("short"),
            Err(E2eError::InvalidShareToken { len: 5, .. })
        ));
    }

    #[tokio::test]
    async fn wait_until_ready_accepts_installed_instance() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/status.php"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "installed": true, "maintenance": false, "versionstring": "25.0.0"
            })))
            .mount(&server)
            .await;

        client_for(&server)
            .wait_until_ready(Duration::from_secs(2))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn wait_until_ready_times_out_during_maintenance() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/status.php"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "installed": true, "maintenance": true
            })))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .wait_until_ready(Duration::from_millis(300))
            .await
            .unwrap_err();
        assert!(matches!(err, E2eError::ServerUnavailable { .. }));
    }
}

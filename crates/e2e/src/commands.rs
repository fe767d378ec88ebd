//! Named operations scenarios are built from.
//!
//! A [`Session`] binds one browser page to the HTTP client and the
//! per-scenario [`FixtureContext`]. Commands run strictly in order; each one
//! completes (or fails) before the next starts.

use std::path::PathBuf;
use tracing::{debug, info};

use crate::client::{validate_share_token, ApiClient};
use crate::error::{E2eError, E2eResult};
use crate::fixtures::{FixtureContext, FixtureStore, TestUser, UploadedFile};
use crate::page::{CookiePolicy, Page};
use crate::pages::{FileList, LoginForm, UserMenu, Viewer};
use crate::visual::{validate_name, VisualDiff, VisualTester};
use crate::wait::WaitConfig;

/// Element hidden before snapshots since its content differs per user.
const AVATAR: &str = ".avatardiv";
const LOGIN_FORM: &str = "form[name=login]";

pub const DEFAULT_ROUTE: &str = "/apps/files";

pub struct Session {
    page: Page,
    client: ApiClient,
    fixtures: FixtureStore,
    visual: VisualTester,
    context: FixtureContext,
    cookie_policy: Option<CookiePolicy>,
}

impl Session {
    pub fn new(
        page: Page,
        client: ApiClient,
        fixtures: FixtureStore,
        visual: VisualTester,
        context: FixtureContext,
    ) -> Self {
        Self {
            page,
            client,
            fixtures,
            visual,
            context,
            cookie_policy: None,
        }
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    pub fn visual(&self) -> &VisualTester {
        &self.visual
    }

    pub fn context(&self) -> &FixtureContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut FixtureContext {
        &mut self.context
    }

    /// The scenario's own user.
    pub fn user(&self) -> &TestUser {
        &self.context.user
    }

    pub fn files(&self) -> FileList<'_> {
        FileList::new(&self.page)
    }

    pub fn viewer(&self) -> Viewer<'_> {
        Viewer::new(&self.page)
    }

    /// Provisions `user` through the provisioning API.
    pub async fn create_user(&self, user: &TestUser) -> E2eResult<()> {
        self.page.clear_cookies().await?;
        self.client.create_user(user).await
    }

    /// Logs in through the form and waits to land on `route`.
    pub async fn login(&mut self, username: &str, password: &str, route: &str) -> E2eResult<()> {
        self.page.clear_cookies().await?;
        self.cookie_policy = Some(CookiePolicy::session_cookies());

        self.page.visit(route).await?;
        LoginForm::new(&self.page).submit(username, password).await?;

        let wait = self.page.wait();
        self.page.expect_absent(LOGIN_FORM, wait).await?;
        self.page.expect_url_contains(route, wait).await?;
        info!("Logged in as {} on {}", username, route);
        Ok(())
    }

    pub async fn logout(&self) -> E2eResult<()> {
        match UserMenu::new(&self.page).logout_href().await? {
            Some(href) => {
                debug!("Following logout link {}", href);
                self.page.visit(&href).await
            }
            None => {
                debug!("No logout link on page, nothing to do");
                Ok(())
            }
        }
    }

    /// Uploads a fixture into `path` as `uploaded_name` (default: the
    /// fixture's own name) and records it in the context.
    pub async fn upload_file(
        &mut self,
        fixture_name: &str,
        mime_type: &str,
        path: &str,
        uploaded_name: Option<&str>,
    ) -> E2eResult<UploadedFile> {
        let uploaded_name = uploaded_name.unwrap_or(fixture_name);
        let fixture = self.fixtures.load(fixture_name).await?;
        let session = self
            .page
            .session_credentials()
            .await
            .map_err(|e| E2eError::FixtureProcessing(format!("no session to upload with: {e}")))?;

        self.client
            .upload(&session, path, uploaded_name, mime_type, fixture.bytes)
            .await?;

        let upload = UploadedFile {
            fixture_name: fixture_name.to_string(),
            mime_type: mime_type.to_string(),
            destination_path: path.to_string(),
            uploaded_name: uploaded_name.to_string(),
        };
        info!("Uploaded {} to {}", fixture_name, upload.remote_path());
        self.context.record_upload(upload.clone());
        Ok(upload)
    }

    pub async fn create_folder(&self, name: &str) -> E2eResult<()> {
        self.files().create_folder(name).await
    }

    /// Opens a file from the list and waits for the viewer overlay.
    pub async fn open_file(&self, name: &str) -> E2eResult<()> {
        self.files().open(name).await?;
        self.viewer().wait_until_mounted(self.page.wait()).await
    }

    pub async fn get_file_id(&self, name: &str) -> E2eResult<String> {
        self.files().file_id(name).await
    }

    pub async fn delete_file(&self, name: &str) -> E2eResult<()> {
        self.files().delete(name).await
    }

    /// Creates a public link share for `path` and returns its token.
    pub async fn create_link_share(&self, path: &str) -> E2eResult<String> {
        let session = self.page.session_credentials().await?;
        let token = self.client.create_link_share(&session, path).await?;
        validate_share_token(&token)?;
        Ok(token)
    }

    /// Captures a full-page screenshot into the actual directory.
    pub async fn screenshot(&self, name: &str) -> E2eResult<PathBuf> {
        validate_name(name)?;
        let path = self.visual.actual_path(name);
        self.page.screenshot_to(&path).await?;
        debug!("Screenshot saved to {}", path.display());
        Ok(path)
    }

    /// Screenshots the page without the avatar and checks it against the
    /// baseline.
    pub async fn compare_snapshot(&self, name: &str, threshold: Option<f64>) -> E2eResult<VisualDiff> {
        self.page.remove_element(AVATAR).await?;
        self.screenshot(name).await?;
        self.visual.check(name, threshold)
    }

    /// Clears cookies outside the preservation policy installed by login.
    pub async fn reset_between_cases(&self) -> E2eResult<()> {
        if let Some(policy) = &self.cookie_policy {
            let removed = self.page.apply_cookie_policy(policy).await?;
            debug!("Cleared {} cookie(s) between cases", removed);
        }
        Ok(())
    }

    pub async fn close(self) -> E2eResult<()> {
        self.page.close().await
    }

    /// Step-level timeout, falling back to the configured assertion timeout.
    pub fn wait_or_default(&self, timeout_ms: Option<u64>) -> WaitConfig {
        match timeout_ms {
            Some(_) => WaitConfig::from_millis(timeout_ms),
            None => self.page.wait(),
        }
    }
}

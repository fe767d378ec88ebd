//! Executes scenario steps against a [`Session`].

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info};

use crate::commands::Session;
use crate::error::{E2eError, E2eResult};
use crate::fixtures::{FixtureContext, TestUser};
use crate::scenario::{AttributeAssertion, Step, WaitState};

/// Step execution result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub success: bool,
    pub step_name: String,
    pub duration_ms: u64,
    pub error: Option<String>,
    /// Name the screenshot was saved under, as used for comparison
    pub screenshot: Option<String>,
    pub screenshot_path: Option<PathBuf>,
}

impl Session {
    /// Executes a single step. Failures are captured in the result.
    pub async fn execute_step(&mut self, step: &Step) -> StepResult {
        let start = Instant::now();
        let step_name = step.label();

        debug!("Executing step: {}", step_name);

        let result = self.dispatch(step).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(screenshot) => StepResult {
                success: true,
                step_name,
                duration_ms,
                error: None,
                screenshot_path: screenshot.as_deref().map(|n| self.visual().actual_path(n)),
                screenshot,
            },
            Err(e) => StepResult {
                success: false,
                step_name,
                duration_ms,
                error: Some(e.to_string()),
                screenshot: None,
                screenshot_path: None,
            },
        }
    }

    /// Runs the step; returns the screenshot name when one was taken.
    async fn dispatch(&mut self, step: &Step) -> E2eResult<Option<String>> {
        match step {
            Step::CreateUser { username, password } => {
                let (username, password) =
                    credentials(self.context(), username.as_deref(), password.as_deref())?;
                self.create_user(&TestUser::new(username, password)).await?;
            }
            Step::Login {
                username,
                password,
                route,
            } => {
                let (username, password) =
                    credentials(self.context(), username.as_deref(), password.as_deref())?;
                let route = self.context().interpolate(route)?;
                self.login(&username, &password, &route).await?;
            }
            Step::Logout => self.logout().await?,
            Step::UploadFile {
                fixture,
                mime_type,
                path,
                uploaded_name,
            } => {
                let path = self.context().interpolate(path)?;
                let uploaded_name = interpolate_opt(self.context(), uploaded_name.as_deref())?;
                self.upload_file(fixture, mime_type, &path, uploaded_name.as_deref())
                    .await?;
            }
            Step::CreateFolder { name } => {
                let name = self.context().interpolate(name)?;
                self.create_folder(&name).await?;
            }
            Step::OpenFile { name } => {
                let name = self.context().interpolate(name)?;
                self.open_file(&name).await?;
            }
            Step::GetFileId { name, save_as } => {
                let name = self.context().interpolate(name)?;
                let id = self.get_file_id(&name).await?;
                debug!("{} has file id {}", name, id);
                self.context_mut().set_var(save_as.clone(), id);
            }
            Step::DeleteFile { name } => {
                let name = self.context().interpolate(name)?;
                self.delete_file(&name).await?;
            }
            Step::CreateLinkShare { path, save_as } => {
                let path = self.context().interpolate(path)?;
                let token = self.create_link_share(&path).await?;
                self.context_mut().set_var(save_as.clone(), token);
            }
            Step::Navigate {
                url,
                wait_for_selector,
            } => {
                let url = self.context().interpolate(url)?;
                self.page().visit(&url).await?;
                if let Some(selector) = wait_for_selector {
                    let selector = self.context().interpolate(selector)?;
                    self.page().expect_visible(&selector, self.page().wait()).await?;
                }
            }
            Step::Click {
                selector,
                timeout_ms,
            } => {
                let selector = self.context().interpolate(selector)?;
                self.page()
                    .click(&selector, self.wait_or_default(*timeout_ms))
                    .await?;
            }
            Step::Type {
                selector,
                text,
                timeout_ms,
            } => {
                let selector = self.context().interpolate(selector)?;
                let text = self.context().interpolate(text)?;
                self.page()
                    .type_text(&selector, &text, self.wait_or_default(*timeout_ms))
                    .await?;
            }
            Step::Wait {
                selector,
                timeout_ms,
                state,
            } => {
                let selector = self.context().interpolate(selector)?;
                let wait = self.wait_or_default(*timeout_ms);
                let page = self.page();
                match state {
                    WaitState::Visible => page.expect_visible(&selector, wait).await.map(|_| ())?,
                    WaitState::Hidden => page.expect_hidden(&selector, wait).await?,
                    WaitState::Attached => page.expect_exists(&selector, wait).await.map(|_| ())?,
                    WaitState::Detached => page.expect_absent(&selector, wait).await?,
                }
            }
            Step::Assert {
                selector,
                visible,
                text_contains,
                attribute,
                count,
                has_class,
                lacks_class,
                timeout_ms,
            } => {
                let selector = self.context().interpolate(selector)?;
                let text_contains = interpolate_opt(self.context(), text_contains.as_deref())?;
                let attribute = attribute
                    .as_ref()
                    .map(|a| interpolate_attribute(self.context(), a))
                    .transpose()?;
                let check = Assertion {
                    visible: *visible,
                    text_contains,
                    attribute,
                    count: *count,
                    has_class,
                    lacks_class,
                };
                self.assert(&selector, &check, *timeout_ms).await?;
            }
            Step::AssertUrl {
                contains,
                timeout_ms,
            } => {
                let contains = self.context().interpolate(contains)?;
                self.page()
                    .expect_url_contains(&contains, self.wait_or_default(*timeout_ms))
                    .await?;
            }
            Step::Screenshot { name } => {
                let name = self.context().interpolate(name)?;
                self.screenshot(&name).await?;
                return Ok(Some(name));
            }
            Step::CompareSnapshot { name, threshold } => {
                let name = self.context().interpolate(name)?;
                let diff = self.compare_snapshot(&name, *threshold).await?;
                debug!("{} differs by {:.3}%", diff.name, diff.diff_percent);
                return Ok(Some(name));
            }
            Step::Log { message } => {
                info!("[scenario] {}", self.context().interpolate(message)?);
            }
        }

        Ok(None)
    }

    async fn assert(&self, selector: &str, check: &Assertion<'_>, timeout_ms: Option<u64>) -> E2eResult<()> {
        let page = self.page();
        let wait = self.wait_or_default(timeout_ms);

        if check.is_presence_only() {
            page.expect_exists(selector, wait).await?;
            return Ok(());
        }
        if let Some(count) = check.count {
            page.expect_count(selector, count, wait).await?;
        }
        match check.visible {
            Some(true) => {
                page.expect_visible(selector, wait).await?;
            }
            Some(false) => page.expect_hidden(selector, wait).await?,
            None => {}
        }
        if let Some(needle) = &check.text_contains {
            page.expect_text_contains(selector, needle, wait).await?;
        }
        if let Some(attr) = &check.attribute {
            match (&attr.equals, &attr.contains) {
                (Some(expected), _) => {
                    page.expect_attribute_equals(selector, &attr.name, expected, wait)
                        .await?;
                }
                (None, Some(needle)) => {
                    page.expect_attribute_contains(selector, &attr.name, needle, wait)
                        .await?;
                }
                (None, None) => {
                    page.expect_attribute(selector, &attr.name, wait).await?;
                }
            }
        }
        for class in check.has_class {
            page.expect_class(selector, class, true, wait).await?;
        }
        for class in check.lacks_class {
            page.expect_class(selector, class, false, wait).await?;
        }
        Ok(())
    }
}

/// An `assert` step with its placeholders resolved.
struct Assertion<'a> {
    visible: Option<bool>,
    text_contains: Option<String>,
    attribute: Option<AttributeAssertion>,
    count: Option<usize>,
    has_class: &'a [String],
    lacks_class: &'a [String],
}

impl Assertion<'_> {
    fn is_presence_only(&self) -> bool {
        self.visible.is_none()
            && self.text_contains.is_none()
            && self.attribute.is_none()
            && self.count.is_none()
            && self.has_class.is_empty()
            && self.lacks_class.is_empty()
    }
}

/// Username and password for a step, defaulting to the scenario's user.
fn credentials(
    ctx: &FixtureContext,
    username: Option<&str>,
    password: Option<&str>,
) -> E2eResult<(String, String)> {
    let username = match username {
        Some(u) => ctx.interpolate(u)?,
        None => ctx.user.username.clone(),
    };
    let password = match password {
        Some(p) => ctx.interpolate(p)?,
        None => ctx.user.password.clone(),
    };
    if username.is_empty() {
        return Err(E2eError::StepFailed {
            step: "credentials".to_string(),
            reason: "username resolved to an empty string".to_string(),
        });
    }
    Ok((username, password))
}

fn interpolate_opt(ctx: &FixtureContext, value: Option<&str>) -> E2eResult<Option<String>> {
    value.map(|v| ctx.interpolate(v)).transpose()
}

fn interpolate_attribute(ctx: &FixtureContext, attr: &AttributeAssertion) -> E2eResult<AttributeAssertion> {
    Ok(AttributeAssertion {
        name: ctx.interpolate(&attr.name)?,
        equals: interpolate_opt(ctx, attr.equals.as_deref())?,
        contains: interpolate_opt(ctx, attr.contains.as_deref())?,
    })
}

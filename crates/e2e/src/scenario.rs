//! Declarative YAML scenarios
//!
//! A scenario mirrors a `describe` block: `before` steps run once, each case
//! runs its own steps, `after` steps always run at the end.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::error::{E2eError, E2eResult};

/// A complete scenario parsed from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Unique name for this scenario
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Tags for filtering
    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default = "default_viewport")]
    pub viewport: Viewport,

    /// Compare `screenshot` steps against baselines after the run
    #[serde(default)]
    pub visual_regression: bool,

    /// Allowed share of differing pixels (0.0 - 100.0 percent)
    #[serde(default = "default_threshold")]
    pub visual_threshold: f64,

    #[serde(default)]
    pub before: Vec<Step>,

    pub cases: Vec<Case>,

    #[serde(default)]
    pub after: Vec<Step>,
}

fn default_viewport() -> Viewport {
    Viewport {
        width: 1280,
        height: 720,
    }
}

fn default_threshold() -> f64 {
    0.5
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// One named block of steps
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Case {
    pub name: String,
    pub steps: Vec<Step>,
}

/// A single step. String fields accept `{{var}}` placeholders.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    /// Provision a user (defaults to the scenario's generated user)
    CreateUser {
        #[serde(default)]
        username: Option<String>,
        #[serde(default)]
        password: Option<String>,
    },

    /// Log in through the login form
    Login {
        #[serde(default)]
        username: Option<String>,
        #[serde(default)]
        password: Option<String>,
        #[serde(default = "default_route")]
        route: String,
    },

    /// Follow the logout link if the page shows one
    Logout,

    /// Upload a fixture over WebDAV
    UploadFile {
        fixture: String,
        mime_type: String,
        #[serde(default)]
        path: String,
        #[serde(default)]
        uploaded_name: Option<String>,
    },

    CreateFolder {
        name: String,
    },

    /// Open a file from the list and wait for the viewer
    OpenFile {
        name: String,
    },

    /// Read a row's `data-id` into a variable
    GetFileId {
        name: String,
        save_as: String,
    },

    DeleteFile {
        name: String,
    },

    /// Create a public link; the token is saved into `save_as`
    CreateLinkShare {
        path: String,
        #[serde(default = "default_share_var")]
        save_as: String,
    },

    /// Navigate to a URL (relative to base)
    Navigate {
        url: String,
        #[serde(default)]
        wait_for_selector: Option<String>,
    },

    Click {
        selector: String,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    /// Type text into an input
    Type {
        selector: String,
        text: String,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    /// Wait for an element to reach a state
    Wait {
        selector: String,
        #[serde(default)]
        timeout_ms: Option<u64>,
        #[serde(default)]
        state: WaitState,
    },

    /// Assert something about the first matching element
    Assert {
        selector: String,
        #[serde(default)]
        visible: Option<bool>,
        #[serde(default)]
        text_contains: Option<String>,
        #[serde(default)]
        attribute: Option<AttributeAssertion>,
        #[serde(default)]
        count: Option<usize>,
        #[serde(default)]
        has_class: Vec<String>,
        #[serde(default)]
        lacks_class: Vec<String>,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    AssertUrl {
        contains: String,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    /// Capture a full-page screenshot
    Screenshot {
        name: String,
    },

    /// Screenshot and compare against the baseline now
    CompareSnapshot {
        name: String,
        #[serde(default)]
        threshold: Option<f64>,
    },

    /// Log a message (for debugging)
    Log {
        message: String,
    },
}

fn default_route() -> String {
    "/apps/files".to_string()
}

fn default_share_var() -> String {
    "share_token".to_string()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitState {
    #[default]
    Visible,
    Hidden,
    Attached,
    Detached,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeAssertion {
    pub name: String,
    #[serde(default)]
    pub equals: Option<String>,
    #[serde(default)]
    pub contains: Option<String>,
}

impl Step {
    /// Short label used in results and logs
    pub fn label(&self) -> String {
        match self {
            Step::CreateUser { username, .. } => {
                format!("create_user:{}", username.as_deref().unwrap_or("{{user}}"))
            }
            Step::Login { route, .. } => format!("login:{}", route),
            Step::Logout => "logout".to_string(),
            Step::UploadFile { fixture, uploaded_name, .. } => match uploaded_name {
                Some(name) => format!("upload_file:{}->{}", fixture, name),
                None => format!("upload_file:{}", fixture),
            },
            Step::CreateFolder { name } => format!("create_folder:{}", name),
            Step::OpenFile { name } => format!("open_file:{}", name),
            Step::GetFileId { name, .. } => format!("get_file_id:{}", name),
            Step::DeleteFile { name } => format!("delete_file:{}", name),
            Step::CreateLinkShare { path, .. } => format!("create_link_share:{}", path),
            Step::Navigate { url, .. } => format!("navigate:{}", url),
            Step::Click { selector, .. } => format!("click:{}", selector),
            Step::Type { selector, .. } => format!("type:{}", selector),
            Step::Wait { selector, .. } => format!("wait:{}", selector),
            Step::Assert { selector, .. } => format!("assert:{}", selector),
            Step::AssertUrl { contains, .. } => format!("assert_url:{}", contains),
            Step::Screenshot { name } => format!("screenshot:{}", name),
            Step::CompareSnapshot { name, .. } => format!("compare_snapshot:{}", name),
            Step::Log { message } => {
                format!("log:{}", message.chars().take(30).collect::<String>())
            }
        }
    }
}

impl Scenario {
    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        let scenario: Self = serde_yaml::from_str(yaml)?;
        scenario.validate()?;
        Ok(scenario)
    }

    pub fn from_file(path: &Path) -> E2eResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content).map_err(|e| {
            E2eError::ScenarioParse(format!("{}: {}", path.display(), e))
        })
    }

    /// Load all scenarios below a directory, ordered by path
    pub fn load_all(dir: &Path) -> E2eResult<Vec<Self>> {
        let mut paths: Vec<_> = walkdir::WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .map(|e| e.into_path())
            .filter(|p| {
                p.extension()
                    .is_some_and(|ext| ext == "yaml" || ext == "yml")
            })
            .collect();
        paths.sort();

        let scenarios = paths
            .iter()
            .map(|p| Self::from_file(p))
            .collect::<E2eResult<Vec<_>>>()?;

        let mut seen = HashSet::new();
        for s in &scenarios {
            if !seen.insert(s.name.as_str()) {
                return Err(E2eError::ScenarioParse(format!(
                    "duplicate scenario name '{}' in {}",
                    s.name,
                    dir.display()
                )));
            }
        }

        Ok(scenarios)
    }

    pub fn filter_by_tag<'a>(scenarios: &'a [Self], tag: &str) -> Vec<&'a Self> {
        scenarios
            .iter()
            .filter(|s| s.tags.iter().any(|t| t == tag))
            .collect()
    }

    pub fn step_count(&self) -> usize {
        self.before.len() + self.cases.iter().map(|c| c.steps.len()).sum::<usize>() + self.after.len()
    }

    fn validate(&self) -> E2eResult<()> {
        if self.name.trim().is_empty() {
            return Err(E2eError::ScenarioParse("scenario name is empty".into()));
        }
        if self.cases.is_empty() {
            return Err(E2eError::ScenarioParse(format!(
                "scenario '{}' has no cases",
                self.name
            )));
        }
        if !(0.0..=100.0).contains(&self.visual_threshold) {
            return Err(E2eError::ScenarioParse(format!(
                "scenario '{}': visual_threshold {} outside 0-100",
                self.name, self.visual_threshold
            )));
        }
        let mut names = HashSet::new();
        for case in &self.cases {
            if !names.insert(case.name.as_str()) {
                return Err(E2eError::ScenarioParse(format!(
                    "scenario '{}' has duplicate case '{}'",
                    self.name, case.name
                )));
            }
        }
        Ok(())
    }
}

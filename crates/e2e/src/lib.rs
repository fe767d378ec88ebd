//! Browser E2E tests for the files app and its viewer
//!
//! This crate drives a real Chromium over the DevTools protocol against a
//! running server:
//! - Provisions throwaway users and uploads fixtures over the HTTP APIs
//! - Exposes the files app and viewer as typed page objects
//! - Runs declarative YAML scenarios (`before`, `cases`, `after`)
//! - Performs visual regression testing with baseline screenshots
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    E2E Test Runner (Rust)                   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  TestRunner                                                 │
//! │    ├── ApiClient::wait_until_ready()                        │
//! │    ├── TestBrowser::launch() -> new_page() per scenario     │
//! │    ├── Session { Page, ApiClient, FixtureContext }          │
//! │    │     └── execute_step(step) -> StepResult               │
//! │    └── VisualTester::compare(actual, baseline) -> Diff      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Scenario (YAML)                                            │
//! │    ├── name, description, tags, viewport                    │
//! │    ├── before: [Step]                                       │
//! │    ├── cases: [{ name, steps: [Step] }]                     │
//! │    │     ├── create_user / login / logout                   │
//! │    │     ├── upload_file / open_file / delete_file          │
//! │    │     ├── create_link_share { path, save_as }            │
//! │    │     ├── assert { selector, visible?, attribute? }      │
//! │    │     └── screenshot / compare_snapshot { name }         │
//! │    └── after: [Step]                                        │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod browser;
pub mod client;
pub mod commands;
pub mod config;
pub mod encoding;
pub mod error;
pub mod executor;
pub mod fixtures;
pub mod page;
pub mod pages;
pub mod runner;
pub mod scenario;
pub mod visual;
pub mod wait;

pub use browser::TestBrowser;
pub use client::ApiClient;
pub use commands::Session;
pub use config::{BrowserConfig, RunnerConfig, TargetConfig};
pub use error::{E2eError, E2eResult};
pub use fixtures::{FixtureContext, FixtureStore, TestUser};
pub use page::Page;
pub use runner::{TestResult, TestRunner, TestSuiteResult};
pub use scenario::{Scenario, Step};

//! Devon Farm Sales E2E Test Framework
//!
//! This crate provides a Rust-controlled E2E testing framework that:
//! - Declares the application's browser suites as typed test specs
//! - Spawns the application or targets a running deployment
//! - Drives Playwright through generated Node scripts, one browser context per test
//! - Keeps session-dependent scenarios as skipped placeholders
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    E2E Test Runner (Rust)                   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  TestRunner                                                 │
//! │    ├── prepare() -> ServerHandle | external base URL        │
//! │    ├── PlaywrightHandle::run_test(spec) -> BrowserRun       │
//! │    └── run_suites(suites, selection) -> TestRunResult       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  SuiteSpec                                                  │
//! │    └── tests: [TestSpec]                                    │
//! │          ├── name, tags, viewport, skip?                    │
//! │          └── steps: [TestStep]                              │
//! │                ├── navigate / click / fill / select         │
//! │                ├── assert / assert_url / assert_title       │
//! │                └── expect_response / request                │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod fixtures;
pub mod playwright;
pub mod runner;
pub mod server;
pub mod spec;
pub mod suites;

pub use config::E2eConfig;
pub use error::{E2eError, E2eResult};
pub use fixtures::{Fixtures, TestUser};
pub use runner::{Selection, TestRunner};
pub use spec::{SuiteSpec, TestSpec, TestStep};

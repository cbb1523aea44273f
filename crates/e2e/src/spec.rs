//! Declarative test model: suites of tests made of browser steps

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{E2eError, E2eResult};

/// A group of tests that share a file, mirroring one `describe` block
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteSpec {
    /// Suite title, e.g. "Authentication Flow"
    pub name: String,

    /// File the suite was declared in (informational)
    #[serde(default)]
    pub file: String,

    pub tests: Vec<TestSpec>,
}

/// A complete test specification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSpec {
    /// Unique name for this test within its suite
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Tags for filtering tests
    #[serde(default)]
    pub tags: Vec<String>,

    /// Viewport size the browser context starts with
    #[serde(default)]
    pub viewport: Viewport,

    /// When set, the test is a placeholder that is never executed.
    /// Its steps document the intended behavior.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip: Option<String>,

    /// Steps to execute in order
    pub steps: Vec<TestStep>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Viewport { width: 1280, height: 720 }
    }
}

/// Expected text: a literal substring or a regular expression
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TextMatch {
    Literal(String),
    Pattern {
        regex: String,
        #[serde(default)]
        ignore_case: bool,
    },
}

impl TextMatch {
    pub fn literal(text: impl Into<String>) -> Self {
        TextMatch::Literal(text.into())
    }

    pub fn regex(pattern: impl Into<String>) -> Self {
        TextMatch::Pattern { regex: pattern.into(), ignore_case: false }
    }

    /// Case-insensitive regex, the `/.../i` form
    pub fn regex_ci(pattern: impl Into<String>) -> Self {
        TextMatch::Pattern { regex: pattern.into(), ignore_case: true }
    }

    fn validate(&self) -> E2eResult<()> {
        if let TextMatch::Pattern { regex, ignore_case } = self {
            regex::RegexBuilder::new(regex)
                .case_insensitive(*ignore_case)
                .build()?;
        }
        Ok(())
    }
}

/// Expected page URL: an exact path below the base URL, or a regex on the full URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UrlMatch {
    Path(String),
    Pattern { regex: String },
}

impl UrlMatch {
    pub fn path(path: impl Into<String>) -> Self {
        UrlMatch::Path(path.into())
    }

    pub fn regex(pattern: impl Into<String>) -> Self {
        UrlMatch::Pattern { regex: pattern.into() }
    }
}

/// A single step in a test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TestStep {
    /// Navigate to a URL (relative to base)
    Navigate {
        url: String,
        #[serde(default)]
        wait_for_selector: Option<String>,
    },

    /// Click an element
    Click {
        selector: String,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    /// Fill an input field
    Fill {
        selector: String,
        value: String,
    },

    /// Select an option from a dropdown by value
    Select {
        selector: String,
        value: String,
    },

    /// Resize the page viewport
    SetViewport {
        width: u32,
        height: u32,
    },

    /// Wait for an element to reach a state
    Wait {
        selector: String,
        #[serde(default = "default_wait_timeout")]
        timeout_ms: u64,
        #[serde(default)]
        state: WaitState,
    },

    /// Assert something about an element
    Assert {
        selector: String,
        #[serde(default)]
        visible: Option<bool>,
        #[serde(default)]
        contains: Option<TextMatch>,
        #[serde(default)]
        count: Option<usize>,
    },

    /// Assert the current page URL
    AssertUrl {
        url: UrlMatch,
    },

    /// Assert the document title
    AssertTitle {
        title: TextMatch,
    },

    /// Assert the status of a response the page has already received
    ExpectResponse {
        url_contains: String,
        status_in: Vec<u16>,
    },

    /// Issue a request with redirects disabled and check the raw response
    Request {
        path: String,
        status_in: Vec<u16>,
        #[serde(default)]
        location: Option<String>,
    },

    /// Take a screenshot
    Screenshot {
        name: String,
        #[serde(default)]
        full_page: bool,
    },

    /// Log a message (for debugging)
    Log {
        message: String,
    },
}

fn default_wait_timeout() -> u64 {
    5000
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

impl WaitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WaitState::Visible => "visible",
            WaitState::Hidden => "hidden",
            WaitState::Attached => "attached",
            WaitState::Detached => "detached",
        }
    }
}

impl TestStep {
    pub fn navigate(url: impl Into<String>) -> Self {
        TestStep::Navigate { url: url.into(), wait_for_selector: None }
    }

    pub fn click(selector: impl Into<String>) -> Self {
        TestStep::Click { selector: selector.into(), timeout_ms: None }
    }

    pub fn fill(selector: impl Into<String>, value: impl Into<String>) -> Self {
        TestStep::Fill { selector: selector.into(), value: value.into() }
    }

    pub fn select(selector: impl Into<String>, value: impl Into<String>) -> Self {
        TestStep::Select { selector: selector.into(), value: value.into() }
    }

    pub fn visible(selector: impl Into<String>) -> Self {
        TestStep::Assert { selector: selector.into(), visible: Some(true), contains: None, count: None }
    }

    pub fn contains(selector: impl Into<String>, text: TextMatch) -> Self {
        TestStep::Assert { selector: selector.into(), visible: None, contains: Some(text), count: None }
    }

    pub fn count(selector: impl Into<String>, count: usize) -> Self {
        TestStep::Assert { selector: selector.into(), visible: None, contains: None, count: Some(count) }
    }

    pub fn url(url: UrlMatch) -> Self {
        TestStep::AssertUrl { url }
    }

    /// Short label used in logs and results
    pub fn label(&self) -> String {
        match self {
            TestStep::Navigate { url, .. } => format!("navigate:{}", url),
            TestStep::Click { selector, .. } => format!("click:{}", selector),
            TestStep::Fill { selector, .. } => format!("fill:{}", selector),
            TestStep::Select { selector, .. } => format!("select:{}", selector),
            TestStep::SetViewport { width, height } => format!("viewport:{}x{}", width, height),
            TestStep::Wait { selector, .. } => format!("wait:{}", selector),
            TestStep::Assert { selector, .. } => format!("assert:{}", selector),
            TestStep::AssertUrl { url } => match url {
                UrlMatch::Path(path) => format!("assert_url:{}", path),
                UrlMatch::Pattern { regex } => format!("assert_url:/{}/", regex),
            },
            TestStep::AssertTitle { .. } => "assert_title".to_string(),
            TestStep::ExpectResponse { url_contains, .. } => format!("expect_response:{}", url_contains),
            TestStep::Request { path, .. } => format!("request:{}", path),
            TestStep::Screenshot { name, .. } => format!("screenshot:{}", name),
            TestStep::Log { message } => {
                format!("log:{}", message.chars().take(30).collect::<String>())
            }
        }
    }

    fn validate(&self) -> E2eResult<()> {
        match self {
            TestStep::Assert { selector, visible, contains, count } => {
                if visible.is_none() && contains.is_none() && count.is_none() {
                    return Err(E2eError::SpecParse(format!(
                        "assert on '{}' has nothing to check",
                        selector
                    )));
                }
                if let Some(text) = contains {
                    text.validate()?;
                }
            }
            TestStep::AssertTitle { title } => title.validate()?,
            TestStep::AssertUrl { url: UrlMatch::Pattern { regex } } => {
                regex::Regex::new(regex)?;
            }
            TestStep::ExpectResponse { status_in, .. } | TestStep::Request { status_in, .. } => {
                if status_in.is_empty() {
                    return Err(E2eError::SpecParse(format!(
                        "{} accepts no status",
                        self.label()
                    )));
                }
            }
            _ => {}
        }
        Ok(())
    }
}

impl TestSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            tags: Vec::new(),
            viewport: Viewport::default(),
            skip: None,
            steps: Vec::new(),
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Mark as a placeholder that stays out of execution
    pub fn skip(mut self, reason: impl Into<String>) -> Self {
        self.skip = Some(reason.into());
        self
    }

    pub fn step(mut self, step: TestStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn steps(mut self, steps: impl IntoIterator<Item = TestStep>) -> Self {
        self.steps.extend(steps);
        self
    }

    pub fn is_skipped(&self) -> bool {
        self.skip.is_some()
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    pub fn validate(&self) -> E2eResult<()> {
        if self.steps.is_empty() {
            return Err(E2eError::SpecParse(format!("test '{}' has no steps", self.name)));
        }
        for step in &self.steps {
            step.validate().map_err(|e| {
                E2eError::SpecParse(format!("test '{}': {}", self.name, e))
            })?;
        }
        Ok(())
    }
}

impl SuiteSpec {
    pub fn new(name: impl Into<String>, file: impl Into<String>) -> Self {
        Self { name: name.into(), file: file.into(), tests: Vec::new() }
    }

    pub fn test(mut self, test: TestSpec) -> Self {
        self.tests.push(test);
        self
    }

    /// Parse a suite from YAML string
    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        let suite: Self = serde_yaml::from_str(yaml)?;
        suite.validate()?;
        Ok(suite)
    }

    /// Parse a suite from a YAML file
    pub fn from_file(path: &Path) -> E2eResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut suite = Self::from_yaml(&content)?;
        if suite.file.is_empty() {
            suite.file = path.display().to_string();
        }
        Ok(suite)
    }

    /// Load all suites from a directory, sorted by path
    pub fn load_all(dir: &Path) -> E2eResult<Vec<Self>> {
        let mut paths: Vec<_> = walkdir::WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
            .map(|e| e.into_path())
            .collect();
        paths.sort();

        paths.iter().map(|p| Self::from_file(p)).collect()
    }

    pub fn to_yaml(&self) -> E2eResult<String> {
        serde_yaml::to_string(self).map_err(E2eError::from)
    }

    pub fn validate(&self) -> E2eResult<()> {
        let mut seen = std::collections::HashSet::new();
        for test in &self.tests {
            if !seen.insert(test.name.as_str()) {
                return Err(E2eError::SpecParse(format!(
                    "suite '{}' declares '{}' twice",
                    self.name, test.name
                )));
            }
            test.validate()?;
        }
        Ok(())
    }
}

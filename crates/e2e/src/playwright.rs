//! Playwright browser automation
//!
//! Each test is compiled into a standalone Node script that owns a fresh
//! browser context, runs every step in order, and prints a single JSON
//! outcome line on stdout.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::str::FromStr;
use std::time::Duration;
use serde::{Deserialize, Serialize};
use tokio::process::Command as TokioCommand;
use tracing::{debug, info, warn};

use crate::error::{E2eError, E2eResult};
use crate::spec::{TestSpec, TestStep, TextMatch, UrlMatch};

/// Playwright browser handle
#[derive(Debug, Clone)]
pub struct PlaywrightHandle {
    /// Base URL of the application
    base_url: String,

    /// Directory for screenshots
    screenshot_dir: PathBuf,

    /// Directory whose node_modules provides @playwright/test
    node_project_dir: PathBuf,

    browser: Browser,
    headless: bool,

    /// Default timeout for actions and navigations
    action_timeout_ms: u64,

    /// Default timeout for web-first assertions
    expect_timeout_ms: u64,

    /// Hard limit for the whole Node process
    test_timeout: Duration,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Browser {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl Browser {
    pub fn as_str(&self) -> &'static str {
        match self {
            Browser::Chromium => "chromium",
            Browser::Firefox => "firefox",
            Browser::Webkit => "webkit",
        }
    }
}

impl FromStr for Browser {
    type Err = E2eError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "chromium" | "chrome" => Ok(Browser::Chromium),
            "firefox" => Ok(Browser::Firefox),
            "webkit" | "safari" => Ok(Browser::Webkit),
            other => Err(E2eError::Config(format!("unknown browser '{}'", other))),
        }
    }
}

/// Result of executing a test step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub success: bool,
    pub step_name: String,
    pub duration_ms: u64,
    pub error: Option<String>,
}

/// Everything one browser run produced
#[derive(Debug, Clone)]
pub struct BrowserRun {
    pub steps: Vec<StepResult>,
    pub error: Option<String>,
    pub screenshot_path: Option<PathBuf>,
}

impl BrowserRun {
    pub fn success(&self) -> bool {
        self.error.is_none()
    }
}

/// JSON line printed by the generated script
#[derive(Debug, Clone, Deserialize)]
struct ScriptOutcome {
    success: bool,
    #[serde(default)]
    failed_step: Option<usize>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    durations: Vec<u64>,
    #[serde(default)]
    screenshot: Option<PathBuf>,
}

impl PlaywrightHandle {
    /// Create a new Playwright handle
    pub fn new(config: PlaywrightConfig) -> E2eResult<Self> {
        Self::check_playwright_installed(&config.node_project_dir)?;

        std::fs::create_dir_all(&config.screenshot_dir)?;

        Ok(Self::from_config(config))
    }

    fn from_config(config: PlaywrightConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            screenshot_dir: config.screenshot_dir,
            node_project_dir: config.node_project_dir,
            browser: config.browser,
            headless: config.headless,
            action_timeout_ms: config.action_timeout_ms,
            expect_timeout_ms: config.expect_timeout_ms,
            test_timeout: config.test_timeout,
        }
    }

    /// Check if Playwright is installed
    fn check_playwright_installed(project_dir: &Path) -> E2eResult<()> {
        let output = Command::new("npx")
            .args(["--no-install", "playwright", "--version"])
            .current_dir(project_dir)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        match output {
            Ok(status) if status.success() => Ok(()),
            _ => Err(E2eError::PlaywrightNotFound),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Run every step of a test in one fresh browser context.
    ///
    /// `stem` prefixes every screenshot the test writes and must be unique
    /// among tests running concurrently (see [`artifact_stem`]).
    pub async fn run_test(&self, spec: &TestSpec, stem: &str) -> E2eResult<BrowserRun> {
        let script = self.build_script(spec, stem);
        let outcome = self.run_script(&script).await?;

        Ok(self.collect(spec, outcome))
    }

    fn collect(&self, spec: &TestSpec, outcome: ScriptOutcome) -> BrowserRun {
        let executed = if outcome.success {
            spec.steps.len()
        } else {
            outcome
                .failed_step
                .map(|i| (i + 1).min(spec.steps.len()))
                .unwrap_or(0)
        };

        let steps = spec
            .steps
            .iter()
            .take(executed)
            .enumerate()
            .map(|(i, step)| {
                let failed = !outcome.success && outcome.failed_step == Some(i);
                StepResult {
                    success: !failed,
                    step_name: step.label(),
                    duration_ms: outcome.durations.get(i).copied().unwrap_or(0),
                    error: if failed { outcome.error.clone() } else { None },
                }
            })
            .collect();

        let error = if outcome.success {
            None
        } else {
            let reason = outcome.error.unwrap_or_else(|| "unknown error".to_string());
            Some(match outcome.failed_step.and_then(|i| spec.steps.get(i)) {
                Some(step) => E2eError::StepFailed { step: step.label(), reason }.to_string(),
                None => reason,
            })
        };

        BrowserRun {
            steps,
            error,
            screenshot_path: outcome.screenshot,
        }
    }

    /// Build the Playwright script for a test
    pub fn build_script(&self, spec: &TestSpec, stem: &str) -> String {
        let failure_shot = self.screenshot_dir.join(format!("{}-failure.png", stem));
        let mut script = String::new();

        // Header
        script.push_str(&format!(r#"
const {{ chromium, firefox, webkit, expect: baseExpect }} = require('@playwright/test');

(async () => {{
  const expect = baseExpect.configure({{ timeout: {expect_timeout} }});
  const browser = await {browser}.launch({{ headless: {headless} }});
  const context = await browser.newContext({{
    viewport: {{ width: {width}, height: {height} }}
  }});
  context.setDefaultTimeout({action_timeout});
  const page = await context.newPage();
  const baseUrl = {base_url};
  const responses = [];
  page.on('response', (r) => responses.push({{ url: r.url(), status: r.status() }}));
  const durations = [];
  let currentStep = null;
  let stepStart = Date.now();
  const done = () => {{ durations.push(Date.now() - stepStart); stepStart = Date.now(); }};

  try {{
"#,
            expect_timeout = self.expect_timeout_ms,
            browser = self.browser.as_str(),
            headless = self.headless,
            width = spec.viewport.width,
            height = spec.viewport.height,
            action_timeout = self.action_timeout_ms,
            base_url = js_str(&self.base_url),
        ));

        for (i, step) in spec.steps.iter().enumerate() {
            script.push_str(&format!("\n    // Step {}: {}\n", i + 1, step.label().replace('\n', " ")));
            script.push_str(&format!("    currentStep = {};\n", i));
            script.push_str(&self.step_to_js(stem, step));
            script.push_str("\n    done();\n");
        }

        // Footer
        script.push_str(&format!(r#"
    console.log(JSON.stringify({{ success: true, durations }}));
  }} catch (error) {{
    done();
    let screenshot = null;
    try {{
      await page.screenshot({{ path: {failure_shot}, fullPage: true }});
      screenshot = {failure_shot};
    }} catch (_) {{}}
    const message = error && error.message ? error.message : String(error);
    console.log(JSON.stringify({{ success: false, failed_step: currentStep, error: message, durations, screenshot }}));
    process.exitCode = 1;
  }} finally {{
    await browser.close();
  }}
}})();
"#,
            failure_shot = js_str(&failure_shot.to_string_lossy()),
        ));

        script
    }

    /// Convert a step to JavaScript code
    fn step_to_js(&self, stem: &str, step: &TestStep) -> String {
        match step {
            TestStep::Navigate { url, wait_for_selector } => {
                let wait = wait_for_selector
                    .as_ref()
                    .map(|s| format!("\n    await page.waitForSelector({});", js_str(s)))
                    .unwrap_or_default();
                format!("    await page.goto(baseUrl + {});{}", js_str(url), wait)
            }
            TestStep::Click { selector, timeout_ms } => match timeout_ms {
                Some(t) => format!("    await page.click({}, {{ timeout: {} }});", js_str(selector), t),
                None => format!("    await page.click({});", js_str(selector)),
            },
            TestStep::Fill { selector, value } => {
                format!("    await page.fill({}, {});", js_str(selector), js_str(value))
            }
            TestStep::Select { selector, value } => {
                format!(
                    "    await page.selectOption({}, {{ value: {} }});",
                    js_str(selector),
                    js_str(value)
                )
            }
            TestStep::SetViewport { width, height } => {
                format!("    await page.setViewportSize({{ width: {}, height: {} }});", width, height)
            }
            TestStep::Wait { selector, timeout_ms, state } => {
                format!(
                    "    await page.waitForSelector({}, {{ state: '{}', timeout: {} }});",
                    js_str(selector),
                    state.as_str(),
                    timeout_ms
                )
            }
            TestStep::Assert { selector, visible, contains, count } => {
                let locator = format!("page.locator({})", js_str(selector));
                let mut assertions = Vec::new();

                if let Some(vis) = visible {
                    let matcher = if *vis { "toBeVisible" } else { "toBeHidden" };
                    assertions.push(format!("    await expect({}).{}();", locator, matcher));
                }

                if let Some(text) = contains {
                    assertions.push(format!(
                        "    await expect({}).toContainText({});",
                        locator,
                        text_match_js(text)
                    ));
                }

                if let Some(c) = count {
                    assertions.push(format!("    await expect({}).toHaveCount({});", locator, c));
                }

                assertions.join("\n")
            }
            TestStep::AssertUrl { url } => match url {
                UrlMatch::Path(path) => {
                    format!("    await expect(page).toHaveURL(baseUrl + {});", js_str(path))
                }
                UrlMatch::Pattern { regex } => {
                    format!("    await expect(page).toHaveURL(new RegExp({}));", js_str(regex))
                }
            },
            TestStep::AssertTitle { title } => {
                format!("    await expect(page).toHaveTitle({});", text_match_js(title))
            }
            TestStep::ExpectResponse { url_contains, status_in } => {
                let needle = js_str(url_contains);
                format!(
                    r#"    {{
      const find = () => responses.find((r) => r.url.includes({needle}));
      await expect.poll(() => (find() ? find().status : null)).not.toBeNull();
      const status = find().status;
      if (!{allowed}.includes(status)) {{
        throw new Error(`response for ${{{needle}}} had status ${{status}}, expected one of {allowed}`);
      }}
    }}"#,
                    needle = needle,
                    allowed = status_list_js(status_in),
                )
            }
            TestStep::Request { path, status_in, location } => {
                let location_check = location
                    .as_ref()
                    .map(|loc| {
                        format!(
                            r#"
      const location = res.headers()['location'] || '';
      if (location !== {loc} && location !== baseUrl + {loc}) {{
        throw new Error(`GET ${{{path}}} redirected to '${{location}}', expected ${{{loc}}}`);
      }}"#,
                            loc = js_str(loc),
                            path = js_str(path),
                        )
                    })
                    .unwrap_or_default();
                format!(
                    r#"    {{
      const res = await page.request.get(baseUrl + {path}, {{ maxRedirects: 0 }});
      const status = res.status();
      if (!{allowed}.includes(status)) {{
        throw new Error(`GET ${{{path}}} returned ${{status}}, expected one of {allowed}`);
      }}{location_check}
    }}"#,
                    path = js_str(path),
                    allowed = status_list_js(status_in),
                    location_check = location_check,
                )
            }
            TestStep::Screenshot { name, full_page } => {
                let path = self
                    .screenshot_dir
                    .join(format!("{}-{}.png", stem, slug(name)));
                format!(
                    "    await page.screenshot({{ path: {}, fullPage: {} }});",
                    js_str(&path.to_string_lossy()),
                    full_page
                )
            }
            TestStep::Log { message } => {
                format!("    console.error('[TEST] ' + {});", js_str(message))
            }
        }
    }

    /// Execute a script via Node and parse its outcome line
    async fn run_script(&self, script: &str) -> E2eResult<ScriptOutcome> {
        let temp_dir = tempfile::tempdir()?;
        let script_path = temp_dir.path().join("test.js");
        std::fs::write(&script_path, script)?;

        debug!("Running Playwright script: {}", script_path.display());

        let child = TokioCommand::new("node")
            .arg(&script_path)
            .current_dir(&self.node_project_dir)
            .env("NODE_PATH", self.node_project_dir.join("node_modules"))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let output = match tokio::time::timeout(self.test_timeout, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                warn!("Playwright script exceeded {:?}", self.test_timeout);
                return Ok(ScriptOutcome {
                    success: false,
                    failed_step: None,
                    error: Some(format!("test timed out after {:?}", self.test_timeout)),
                    durations: Vec::new(),
                    screenshot: None,
                });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        for line in stderr.lines().filter(|l| l.starts_with("[TEST]")) {
            info!("{}", line);
        }

        parse_outcome(&stdout).ok_or_else(|| {
            E2eError::Playwright(format!(
                "Script produced no outcome (exit: {}):\nstdout: {}\nstderr: {}",
                output.status, stdout, stderr
            ))
        })
    }
}

/// Last stdout line that decodes as an outcome
fn parse_outcome(stdout: &str) -> Option<ScriptOutcome> {
    stdout
        .lines()
        .rev()
        .find_map(|line| serde_json::from_str::<ScriptOutcome>(line.trim()).ok())
}

/// JSON string literals are valid JS string literals
fn js_str(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

fn text_match_js(text: &TextMatch) -> String {
    match text {
        TextMatch::Literal(s) => js_str(s),
        TextMatch::Pattern { regex, ignore_case: true } => format!("new RegExp({}, 'i')", js_str(regex)),
        TextMatch::Pattern { regex, ignore_case: false } => format!("new RegExp({})", js_str(regex)),
    }
}

fn status_list_js(statuses: &[u16]) -> String {
    let items: Vec<String> = statuses.iter().map(|s| s.to_string()).collect();
    format!("[{}]", items.join(", "))
}

/// Screenshot prefix for one test of a run.
///
/// Names alone collide across suites and after slugging, so the suite and
/// test positions lead.
pub fn artifact_stem(suite_index: usize, test_index: usize, suite: &str, test: &str) -> String {
    format!("{:02}-{:02}-{}-{}", suite_index, test_index, slug(suite), slug(test))
}

/// File-name safe form of a test or screenshot name
fn slug(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    out.trim_matches('-').to_string()
}

/// Configuration for Playwright
#[derive(Debug, Clone)]
pub struct PlaywrightConfig {
    pub base_url: String,
    pub screenshot_dir: PathBuf,
    pub node_project_dir: PathBuf,
    pub browser: Browser,
    pub headless: bool,
    pub action_timeout_ms: u64,
    pub expect_timeout_ms: u64,
    pub test_timeout: Duration,
}

impl Default for PlaywrightConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:4242".to_string(),
            screenshot_dir: PathBuf::from("test-results/screenshots"),
            node_project_dir: PathBuf::from("."),
            browser: Browser::Chromium,
            headless: true,
            action_timeout_ms: 10_000,
            expect_timeout_ms: 5_000,
            test_timeout: Duration::from_secs(30),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::{Viewport, WaitState};

    fn handle() -> PlaywrightHandle {
        PlaywrightHandle::from_config(PlaywrightConfig {
            base_url: "http://127.0.0.1:4242/".to_string(),
            screenshot_dir: PathBuf::from("/tmp/shots"),
            ..Default::default()
        })
    }

    fn script_for(steps: Vec<TestStep>) -> String {
        let spec = TestSpec::new("sample").steps(steps);
        handle().build_script(&spec, "00-00-suite-sample")
    }

    #[test]
    fn test_header_uses_fresh_context() {
        let spec = TestSpec {
            viewport: Viewport { width: 375, height: 667 },
            ..TestSpec::new("mobile").step(TestStep::navigate("/"))
        };
        let script = handle().build_script(&spec, "00-00-suite-mobile");
        assert!(script.contains("chromium.launch({ headless: true })"));
        assert!(script.contains("viewport: { width: 375, height: 667 }"));
        assert!(script.contains(r#"const baseUrl = "http://127.0.0.1:4242";"#));
        assert!(script.contains("baseExpect.configure({ timeout: 5000 })"));
    }

    #[test]
    fn test_values_are_escaped() {
        let script = script_for(vec![TestStep::fill("input[name=\"name\"]", "O'Brien \"Jr\"")]);
        assert!(script.contains(r#"await page.fill("input[name=\"name\"]", "O'Brien \"Jr\"");"#));
    }

    #[test]
    fn test_case_insensitive_regex() {
        let script = script_for(vec![TestStep::contains("body", TextMatch::regex_ci("check your email"))]);
        assert!(script.contains(
            r#"await expect(page.locator("body")).toContainText(new RegExp("check your email", 'i'));"#
        ));
    }

    #[test]
    fn test_url_and_title_assertions() {
        let script = script_for(vec![
            TestStep::url(UrlMatch::path("/login")),
            TestStep::url(UrlMatch::regex("/farm/.*/horse$")),
            TestStep::AssertTitle { title: TextMatch::regex("Devon Farm Sales") },
        ]);
        assert!(script.contains(r#"await expect(page).toHaveURL(baseUrl + "/login");"#));
        assert!(script.contains(r#"toHaveURL(new RegExp("/farm/.*/horse$"))"#));
        assert!(script.contains(r#"toHaveTitle(new RegExp("Devon Farm Sales"))"#));
    }

    #[test]
    fn test_status_steps() {
        let script = script_for(vec![
            TestStep::ExpectResponse {
                url_contains: "/non-existent-page".to_string(),
                status_in: vec![404, 302],
            },
            TestStep::Request {
                path: "/farm/abc".to_string(),
                status_in: vec![302],
                location: Some("/login".to_string()),
            },
        ]);
        assert!(script.contains("[404, 302].includes(status)"));
        assert!(script.contains(r#"page.request.get(baseUrl + "/farm/abc", { maxRedirects: 0 })"#));
        assert!(script.contains(r#"location !== "/login""#));
    }

    #[test]
    fn test_steps_are_tracked() {
        let script = script_for(vec![
            TestStep::navigate("/"),
            TestStep::SetViewport { width: 375, height: 667 },
            TestStep::Wait { selector: "h1".to_string(), timeout_ms: 100, state: WaitState::Hidden },
        ]);
        assert!(script.contains("currentStep = 0;"));
        assert!(script.contains("currentStep = 2;"));
        assert!(script.contains("page.setViewportSize({ width: 375, height: 667 })"));
        assert!(script.contains(r#"page.waitForSelector("h1", { state: 'hidden', timeout: 100 })"#));
        assert_eq!(script.matches("done();").count(), 4);
    }

    #[test]
    fn test_parse_outcome_takes_last_json_line() {
        let stdout = "noise\n{\"success\":false,\"failed_step\":1,\"error\":\"boom\",\"durations\":[3,4]}\n";
        let outcome = parse_outcome(stdout).unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.failed_step, Some(1));
        assert_eq!(outcome.durations, vec![3, 4]);
        assert!(parse_outcome("nothing here").is_none());
    }

    #[test]
    fn test_collect_stops_at_failed_step() {
        let spec = TestSpec::new("login").steps(vec![
            TestStep::navigate("/login"),
            TestStep::click("button[type=\"submit\"]"),
            TestStep::url(UrlMatch::path("/login")),
        ]);
        let run = handle().collect(
            &spec,
            ScriptOutcome {
                success: false,
                failed_step: Some(1),
                error: Some("Timeout 10000ms exceeded".to_string()),
                durations: vec![12, 10000],
                screenshot: None,
            },
        );
        assert!(!run.success());
        assert_eq!(run.steps.len(), 2);
        assert!(run.steps[0].success);
        assert!(!run.steps[1].success);
        assert_eq!(run.steps[1].duration_ms, 10000);
        assert!(run.error.unwrap().starts_with("Step failed: click:"));
    }

    #[test]
    fn test_screenshots_use_stem() {
        let script = script_for(vec![TestStep::Screenshot { name: "Login Form".to_string(), full_page: true }]);
        assert!(script.contains(r#""/tmp/shots/00-00-suite-sample-login-form.png""#));
        assert!(script.contains(r#""/tmp/shots/00-00-suite-sample-failure.png""#));
    }

    #[test]
    fn test_artifact_stems_do_not_collide() {
        // Same slug, same test name in two suites, same suite twice
        let stems = [
            artifact_stem(0, 0, "Homepage", "should load"),
            artifact_stem(0, 1, "Homepage", "Should Load!"),
            artifact_stem(1, 0, "Homepage", "should load"),
            artifact_stem(2, 0, "Extra", "should load"),
        ];
        let unique: std::collections::HashSet<_> = stems.iter().collect();
        assert_eq!(unique.len(), stems.len());
        assert_eq!(stems[1], "00-01-homepage-should-load");
    }

    /// Every built-in script must at least parse as JavaScript
    #[test]
    fn test_builtin_scripts_parse() {
        let node_available = Command::new("node")
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false);
        if !node_available {
            eprintln!("Skipping: node not available in PATH");
            return;
        }

        let dir = tempfile::tempdir().unwrap();
        let handle = handle();
        let suites = crate::suites::builtin(&crate::fixtures::Fixtures::default());
        let mut checked = 0;
        for (si, suite) in suites.iter().enumerate() {
            for (ti, test) in suite.tests.iter().enumerate() {
                let stem = artifact_stem(si, ti, &suite.name, &test.name);
                let path = dir.path().join(format!("{}.js", stem));
                std::fs::write(&path, handle.build_script(test, &stem)).unwrap();

                let output = Command::new("node").arg("--check").arg(&path).output().unwrap();
                assert!(
                    output.status.success(),
                    "{} does not parse: {}",
                    test.name,
                    String::from_utf8_lossy(&output.stderr)
                );
                checked += 1;
            }
        }
        assert_eq!(checked, suites.iter().map(|s| s.tests.len()).sum::<usize>());
        assert!(checked > 0);
    }

    #[test]
    fn test_slug() {
        assert_eq!(slug("should handle 404 pages"), "should-handle-404-pages");
        assert_eq!(slug("  Log in! "), "log-in");
    }

    #[test]
    fn test_browser_from_str() {
        assert_eq!("Firefox".parse::<Browser>().unwrap(), Browser::Firefox);
        assert!("lynx".parse::<Browser>().is_err());
    }
}

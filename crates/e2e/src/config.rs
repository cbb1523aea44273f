//! Runner configuration file

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{E2eError, E2eResult};
use crate::fixtures::Fixtures;
use crate::playwright::{Browser, PlaywrightConfig};
use crate::runner::{RunnerConfig, Target};
use crate::server::ServerConfig;

/// Variables forwarded to a spawned application when set
pub const DEFAULT_PASS_ENV: [&str; 3] = ["COCKROACH_DSN", "STYTCH_PROJECT_ID", "STYTCH_SECRET"];

/// E2E configuration, usually read from `e2e.yaml`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct E2eConfig {
    /// URL of an already running application
    pub base_url: Option<String>,

    /// Spawned application settings, used when no base URL is given
    pub server: Option<AppServerConfig>,

    /// Path polled until the application answers
    pub ready_path: String,

    pub startup_timeout_secs: u64,

    pub browser: Browser,
    pub headless: bool,

    /// Maximum number of tests in flight
    pub workers: usize,

    pub action_timeout_ms: u64,
    pub expect_timeout_ms: u64,
    pub test_timeout_secs: u64,

    /// Directory whose node_modules provides @playwright/test
    pub node_project_dir: PathBuf,

    /// Extra YAML suites to load
    pub specs_dir: Option<PathBuf>,

    /// Whether the built-in suites run alongside loaded ones
    pub include_builtin: bool,

    /// Output directory for results and screenshots
    pub output_dir: PathBuf,

    pub fixtures: Fixtures,
}

impl Default for E2eConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            server: None,
            ready_path: "/".to_string(),
            startup_timeout_secs: 30,
            browser: Browser::Chromium,
            headless: true,
            workers: 2,
            action_timeout_ms: 10_000,
            expect_timeout_ms: 5_000,
            test_timeout_secs: 30,
            node_project_dir: PathBuf::from("."),
            specs_dir: None,
            include_builtin: true,
            output_dir: PathBuf::from("test-results"),
            fixtures: Fixtures::default(),
        }
    }
}

/// How to launch the application binary
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppServerConfig {
    pub binary: PathBuf,
    pub working_dir: Option<PathBuf>,
    /// Port the application listens on. `None` picks a free port and hands
    /// it over through `port_env`, which the application must honour.
    pub port: Option<u16>,
    pub port_env: String,
    /// Fixed environment for the process
    pub env: BTreeMap<String, String>,
    /// Names copied from the runner's own environment when present
    pub pass_env: Vec<String>,
}

impl Default for AppServerConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("./sales"),
            working_dir: None,
            port: Some(4242),
            port_env: "PORT".to_string(),
            env: BTreeMap::new(),
            pass_env: DEFAULT_PASS_ENV.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl E2eConfig {
    /// Parse a config from YAML string
    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> E2eResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Load from a file when given, defaults otherwise
    pub fn load(path: Option<&Path>) -> E2eResult<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> E2eResult<()> {
        if let Some(url) = &self.base_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(E2eError::Config(format!("base_url '{}' is not an http(s) URL", url)));
            }
        }
        if self.fixtures.unknown_route_statuses.is_empty() {
            return Err(E2eError::Config("fixtures.unknown_route_statuses is empty".to_string()));
        }
        if self.fixtures.login_redirect_statuses.is_empty() {
            return Err(E2eError::Config("fixtures.login_redirect_statuses is empty".to_string()));
        }
        if self.fixtures.protected_farm_ids.is_empty() {
            return Err(E2eError::Config("fixtures.protected_farm_ids is empty".to_string()));
        }
        Ok(())
    }

    /// The application to test; `None` when neither a URL nor a server is configured
    pub fn target(&self) -> Option<Target> {
        if let Some(base_url) = &self.base_url {
            return Some(Target::External { base_url: base_url.clone() });
        }

        self.server.as_ref().map(|server| {
            let mut env: Vec<(String, String)> = server
                .pass_env
                .iter()
                .filter_map(|name| std::env::var(name).ok().map(|v| (name.clone(), v)))
                .collect();
            env.extend(server.env.iter().map(|(k, v)| (k.clone(), v.clone())));

            Target::Spawn(ServerConfig {
                binary_path: server.binary.clone(),
                working_dir: server.working_dir.clone(),
                port: server.port,
                port_env: server.port_env.clone(),
                ready_path: self.ready_path.clone(),
                env,
                log_path: Some(self.output_dir.join("server.log")),
                startup_timeout: Duration::from_secs(self.startup_timeout_secs),
            })
        })
    }

    pub fn runner_config(&self, target: Target) -> RunnerConfig {
        RunnerConfig {
            target,
            playwright: PlaywrightConfig {
                base_url: self.base_url.clone().unwrap_or_default(),
                screenshot_dir: self.output_dir.join("screenshots"),
                node_project_dir: self.node_project_dir.clone(),
                browser: self.browser,
                headless: self.headless,
                action_timeout_ms: self.action_timeout_ms,
                expect_timeout_ms: self.expect_timeout_ms,
                test_timeout: Duration::from_secs(self.test_timeout_secs),
            },
            ready_path: self.ready_path.clone(),
            startup_timeout: Duration::from_secs(self.startup_timeout_secs),
            workers: self.workers,
            output_dir: self.output_dir.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_have_no_target() {
        let config = E2eConfig::default();
        assert!(config.target().is_none());
        assert!(config.include_builtin);
    }

    #[test]
    fn test_base_url_wins_over_server() {
        let config = E2eConfig::from_yaml(
            r#"
base_url: https://staging.devonfarm.example
server:
  binary: ./sales
"#,
        )
        .unwrap();
        match config.target() {
            Some(Target::External { base_url }) => {
                assert_eq!(base_url, "https://staging.devonfarm.example")
            }
            other => panic!("unexpected target {:?}", other),
        }
    }

    #[test]
    fn test_spawned_server_defaults_to_app_port() {
        let config = E2eConfig::from_yaml("server:\n  binary: bin/sales\n").unwrap();
        let Some(Target::Spawn(server)) = config.target() else {
            panic!("expected a spawned server");
        };
        assert_eq!(server.port, Some(4242));

        let random = E2eConfig::from_yaml("server:\n  binary: bin/sales\n  port: ~\n").unwrap();
        let Some(Target::Spawn(server)) = random.target() else {
            panic!("expected a spawned server");
        };
        assert_eq!(server.port, None);
        assert_eq!(server.port_env, "PORT");
    }

    #[test]
    fn test_empty_login_redirect_statuses_rejected() {
        assert!(E2eConfig::from_yaml("fixtures:\n  login_redirect_statuses: []\n").is_err());
    }

    #[test]
    fn test_spawned_server_settings() {
        let config = E2eConfig::from_yaml(
            r#"
server:
  binary: bin/sales
  port: 4242
  env:
    COCKROACH_DSN: postgresql://root@localhost:26257/defaultdb
  pass_env: []
output_dir: out
browser: firefox
workers: 4
fixtures:
  unknown_route_statuses: [404]
"#,
        )
        .unwrap();
        assert_eq!(config.browser, Browser::Firefox);
        assert_eq!(config.fixtures.unknown_route_statuses, vec![404]);

        let Some(Target::Spawn(server)) = config.target() else {
            panic!("expected a spawned server");
        };
        assert_eq!(server.binary_path, PathBuf::from("bin/sales"));
        assert_eq!(server.port, Some(4242));
        assert_eq!(server.port_env, "PORT");
        assert_eq!(server.log_path, Some(PathBuf::from("out/server.log")));
        assert_eq!(
            server.env,
            vec![(
                "COCKROACH_DSN".to_string(),
                "postgresql://root@localhost:26257/defaultdb".to_string()
            )]
        );

        let runner = config.runner_config(Target::Spawn(server));
        assert_eq!(runner.workers, 4);
        assert_eq!(runner.playwright.screenshot_dir, PathBuf::from("out/screenshots"));
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(E2eConfig::from_yaml("base_url: localhost:4242\n").is_err());
        assert!(E2eConfig::from_yaml("fixtures:\n  unknown_route_statuses: []\n").is_err());
    }
}

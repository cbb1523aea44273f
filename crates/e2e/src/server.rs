//! Application server management - spawning and readiness checking

use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::error::{E2eError, E2eResult};

/// Handle to a running application process
pub struct ServerHandle {
    child: Child,
    pub base_url: String,
    pub port: u16,
}

impl ServerHandle {
    /// Spawn the application binary and wait until it answers
    pub async fn spawn(config: ServerConfig) -> E2eResult<Self> {
        let port = match config.port {
            Some(port) => port,
            None => find_free_port()?,
        };
        let base_url = format!("http://127.0.0.1:{}", port);

        info!("Spawning {} on port {}", config.binary_path.display(), port);

        let mut cmd = Command::new(&config.binary_path);
        cmd.env(&config.port_env, port.to_string());

        for (key, value) in &config.env {
            cmd.env(key, value);
        }

        if let Some(dir) = &config.working_dir {
            cmd.current_dir(dir);
        }

        // Unread pipes would eventually block the server
        match &config.log_path {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                let log = std::fs::File::create(path)?;
                cmd.stdout(Stdio::from(log.try_clone()?)).stderr(Stdio::from(log));
            }
            None => {
                cmd.stdout(Stdio::null()).stderr(Stdio::null());
            }
        }

        let child = cmd.spawn().map_err(|e| {
            E2eError::ServerStartup(format!(
                "Failed to spawn {}: {}",
                config.binary_path.display(),
                e
            ))
        })?;

        let mut handle = ServerHandle { child, base_url, port };

        handle
            .wait_for_healthy(&config.ready_path, config.startup_timeout)
            .await?;

        info!("Server is ready at {}", handle.base_url);
        Ok(handle)
    }

    /// Poll until the server answers, failing early if the process exits
    async fn wait_for_healthy(&mut self, ready_path: &str, timeout: Duration) -> E2eResult<()> {
        let url = join_url(&self.base_url, ready_path);
        let client = probe_client()?;

        let start = Instant::now();
        let mut attempts = 0;

        while start.elapsed() < timeout {
            attempts += 1;

            if let Some(status) = self.child.try_wait()? {
                return Err(E2eError::ServerStartup(format!(
                    "process exited with {} before becoming ready",
                    status
                )));
            }

            if probe_once(&client, &url, attempts).await {
                return Ok(());
            }

            sleep(Duration::from_millis(100)).await;
        }

        Err(E2eError::ServerHealthCheck { url, attempts })
    }

    /// Get the base URL for this server
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Stop the server
    pub fn stop(&mut self) -> E2eResult<()> {
        if self.child.try_wait()?.is_some() {
            return Ok(());
        }

        info!("Stopping server (pid: {})", self.child.id());

        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            let pid = Pid::from_raw(self.child.id() as i32);
            if kill(pid, Signal::SIGTERM).is_ok() {
                std::thread::sleep(Duration::from_millis(500));
            }
        }

        // Force kill if still running
        let _ = self.child.kill();
        let _ = self.child.wait();

        Ok(())
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// Wait for an already running application (external target)
pub async fn wait_for_ready(base_url: &str, ready_path: &str, timeout: Duration) -> E2eResult<()> {
    let url = join_url(base_url, ready_path);
    let client = probe_client()?;

    let start = Instant::now();
    let mut attempts = 0;

    loop {
        attempts += 1;
        if probe_once(&client, &url, attempts).await {
            return Ok(());
        }
        if start.elapsed() >= timeout {
            return Err(E2eError::ServerHealthCheck { url, attempts });
        }
        sleep(Duration::from_millis(100)).await;
    }
}

fn probe_client() -> E2eResult<reqwest::Client> {
    // A redirect still proves the server is routing requests
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(2))
        .redirect(reqwest::redirect::Policy::none())
        .build()?;
    Ok(client)
}

/// Any answer below 500 counts as ready
async fn probe_once(client: &reqwest::Client, url: &str, attempt: usize) -> bool {
    match client.get(url).send().await {
        Ok(resp) if !resp.status().is_server_error() => {
            debug!("{} answered {}", url, resp.status());
            true
        }
        Ok(resp) => {
            warn!("Readiness check returned {}", resp.status());
            false
        }
        Err(e) => {
            if attempt == 1 {
                info!("Waiting for server at {}...", url);
            }
            // Connection refused is expected while server is starting
            if !e.is_connect() && !e.is_timeout() {
                warn!("Readiness check error: {}", e);
            }
            false
        }
    }
}

fn join_url(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Configuration for spawning the application
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Path to the application binary
    pub binary_path: PathBuf,

    /// Working directory (templates and assets are resolved from here)
    pub working_dir: Option<PathBuf>,

    /// Port to listen on (None = find free port)
    pub port: Option<u16>,

    /// Environment variable the application reads its port from
    pub port_env: String,

    /// Path polled until the server answers
    pub ready_path: String,

    /// Extra environment, e.g. database DSN and Stytch credentials
    pub env: Vec<(String, String)>,

    /// File receiving the server's stdout and stderr
    pub log_path: Option<PathBuf>,

    /// Timeout for server startup
    pub startup_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            binary_path: PathBuf::from("./sales"),
            working_dir: None,
            port: None,
            port_env: "PORT".to_string(),
            ready_path: "/".to_string(),
            env: Vec::new(),
            log_path: None,
            startup_timeout: Duration::from_secs(30),
        }
    }
}

/// Find a free port to use
fn find_free_port() -> E2eResult<u16> {
    use std::net::TcpListener;

    let listener = TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_free_port() {
        let port = find_free_port().unwrap();
        assert!(port > 1024);
    }

    #[test]
    fn test_join_url() {
        assert_eq!(join_url("http://localhost:4242/", "/"), "http://localhost:4242/");
        assert_eq!(join_url("http://localhost:4242", "login"), "http://localhost:4242/login");
    }

    #[tokio::test]
    async fn test_spawn_missing_binary() {
        let config = ServerConfig {
            binary_path: PathBuf::from("/nonexistent/devon-farm-sales"),
            startup_timeout: Duration::from_millis(200),
            ..Default::default()
        };
        let err = ServerHandle::spawn(config).await.err().unwrap();
        assert!(matches!(err, E2eError::ServerStartup(_)));
    }
}

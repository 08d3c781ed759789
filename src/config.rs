//! Configuration module for Squid.
//!
//! Loads configuration from environment variables with sensible defaults.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Placeholder substituted with the bundle path in deployment tool arguments.
pub const BUNDLE_PLACEHOLDER: &str = "{bundle}";

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP port for the web server (default: 4242)
    pub http_port: u16,
    /// Identifier this node reports under (default: hostname)
    pub node: String,
    /// Collector base URL; the status reporter only runs when set
    pub collector: Option<String>,
    /// Interval between two status reports
    pub report_period: Duration,
    /// Basic auth user for the `/api` routes and for status pushes
    pub username: String,
    /// Basic auth password for the `/api` routes and for status pushes
    pub password: String,
    /// Root directory scanned for compose bundles (default: "./compose")
    pub compose_dir: PathBuf,
    /// Age after which a node report is considered expired
    pub ttl: Duration,
    /// Interval between two staleness sweeps
    pub sweep_period: Duration,
    /// Program invoked to bring a bundle up (default: "doo")
    pub deploy_tool: String,
    /// Arguments passed to the deployment tool, `{bundle}` is substituted
    pub deploy_args: Vec<String>,
    /// Docker daemon socket path
    pub docker_socket: String,
    /// Public URL of this server, baked into the provisioning scripts
    pub public_url: String,
    /// Image used by the provisioning scripts
    pub image: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let (username, password) = split_token("ba.zinga");
        Self {
            http_port: 4242,
            node: local_hostname(),
            collector: None,
            report_period: Duration::from_secs(10),
            username,
            password,
            compose_dir: PathBuf::from("./compose"),
            ttl: Duration::from_secs(30),
            sweep_period: Duration::from_secs(30),
            deploy_tool: "doo".to_string(),
            deploy_args: split_args(&format!("-q dc {} up -d", BUNDLE_PLACEHOLDER)),
            docker_socket: "/var/run/docker.sock".to_string(),
            public_url: "http://localhost:4242".to_string(),
            image: "krkr/squid".to_string(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `SQUID_HTTP_PORT`: HTTP port (default: 4242)
    /// - `SQUID_NODE`: node identifier (default: hostname)
    /// - `SQUID_COLLECTOR`: collector URL, enables the agent role
    /// - `SQUID_REPORT_PERIOD`: seconds between reports (default: 10)
    /// - `SQUID_TOKEN`: `user.password` credentials (default: "ba.zinga")
    /// - `SQUID_COMPOSE_DIR`: bundle directory (default: "./compose")
    /// - `SQUID_TTL`: seconds before a report expires (default: 30)
    /// - `SQUID_SWEEP_PERIOD`: seconds between sweeps (default: 30)
    /// - `SQUID_DEPLOY_TOOL`: deployment program (default: "doo")
    /// - `SQUID_DEPLOY_ARGS`: deployment arguments (default: "-q dc {bundle} up -d")
    /// - `SQUID_DOCKER_SOCKET`: Docker socket (default: "/var/run/docker.sock")
    /// - `SQUID_PUBLIC_URL`: URL used in provisioning scripts
    /// - `SQUID_IMAGE`: image used in provisioning scripts (default: "krkr/squid")
    pub fn load() -> Self {
        let mut cfg = Self::default();

        if let Ok(port_str) = env::var("SQUID_HTTP_PORT") {
            if let Ok(port) = port_str.parse() {
                cfg.http_port = port;
            }
        }

        if let Ok(node) = env::var("SQUID_NODE") {
            if !node.is_empty() {
                cfg.node = node;
            }
        }

        if let Ok(collector) = env::var("SQUID_COLLECTOR") {
            if !collector.is_empty() {
                cfg.collector = Some(collector.trim_end_matches('/').to_string());
            }
        }

        if let Some(period) = env_secs("SQUID_REPORT_PERIOD") {
            cfg.report_period = period;
        }

        if let Ok(token) = env::var("SQUID_TOKEN") {
            let (username, password) = split_token(&token);
            cfg.username = username;
            cfg.password = password;
        }

        if let Ok(dir) = env::var("SQUID_COMPOSE_DIR") {
            cfg.compose_dir = PathBuf::from(dir);
        }

        if let Some(ttl) = env_secs("SQUID_TTL") {
            cfg.ttl = ttl;
        }

        if let Some(period) = env_secs("SQUID_SWEEP_PERIOD") {
            cfg.sweep_period = period;
        }

        if let Ok(tool) = env::var("SQUID_DEPLOY_TOOL") {
            cfg.deploy_tool = tool;
        }

        if let Ok(args) = env::var("SQUID_DEPLOY_ARGS") {
            cfg.deploy_args = split_args(&args);
        }

        if let Ok(socket) = env::var("SQUID_DOCKER_SOCKET") {
            cfg.docker_socket = socket;
        }

        if let Ok(url) = env::var("SQUID_PUBLIC_URL") {
            cfg.public_url = url;
        }

        if let Ok(image) = env::var("SQUID_IMAGE") {
            cfg.image = image;
        }

        cfg
    }
}

/// Read a positive number of seconds from the environment.
fn env_secs(key: &str) -> Option<Duration> {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
}

/// Split a `user.password` token at its first dot.
fn split_token(token: &str) -> (String, String) {
    match token.split_once('.') {
        Some((user, pass)) => (user.to_string(), pass.to_string()),
        None => (token.to_string(), String::new()),
    }
}

fn split_args(args: &str) -> Vec<String> {
    args.split_whitespace().map(str::to_string).collect()
}

fn local_hostname() -> String {
    let name = gethostname::gethostname().to_string_lossy().into_owned();
    if name.is_empty() {
        "default".to_string()
    } else {
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.http_port, 4242);
        assert_eq!(cfg.username, "ba");
        assert_eq!(cfg.password, "zinga");
        assert_eq!(cfg.compose_dir, PathBuf::from("./compose"));
        assert_eq!(cfg.ttl, Duration::from_secs(30));
        assert_eq!(cfg.deploy_args, vec!["-q", "dc", "{bundle}", "up", "-d"]);
        assert!(cfg.collector.is_none());
        assert!(!cfg.node.is_empty());
    }

    #[test]
    fn test_split_token() {
        assert_eq!(split_token("admin.s3cr.et"), ("admin".to_string(), "s3cr.et".to_string()));
        assert_eq!(split_token("admin"), ("admin".to_string(), String::new()));
    }
}

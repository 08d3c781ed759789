//! Deployment through an external command.

use super::{DeployError, Deployer};
use crate::config::BUNDLE_PLACEHOLDER;

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

/// Runs the configured deployment tool once per bundle.
#[derive(Debug, Clone)]
pub struct CommandDeployer {
    program: String,
    args: Vec<String>,
}

impl CommandDeployer {
    /// `args` may contain `{bundle}`, replaced by the bundle path.
    pub fn new(program: &str, args: &[String]) -> Self {
        Self {
            program: program.to_string(),
            args: args.to_vec(),
        }
    }

    fn args_for(&self, bundle: &Path) -> Vec<String> {
        let bundle = bundle.to_string_lossy();
        self.args
            .iter()
            .map(|arg| arg.replace(BUNDLE_PLACEHOLDER, &bundle))
            .collect()
    }
}

#[async_trait]
impl Deployer for CommandDeployer {
    async fn up(&self, bundle: &Path) -> Result<String, DeployError> {
        let args = self.args_for(bundle);
        tracing::info!("Running {} {}", self.program, args.join(" "));

        let output = Command::new(&self.program)
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| DeployError::Spawn(format!("failed to execute {}: {}", self.program, e)))?;

        // Progress goes to stderr, the metadata line ends stdout.
        let mut combined = String::from_utf8_lossy(&output.stderr).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stdout));

        if !output.status.success() {
            return Err(DeployError::Exit {
                status: output.status.to_string(),
                output: combined,
            });
        }

        Ok(combined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_bundle_substitution() {
        let deployer = CommandDeployer::new("doo", &args(&["-q", "dc", "{bundle}", "up", "-d"]));
        assert_eq!(
            deployer.args_for(Path::new("compose/web.yml")),
            args(&["-q", "dc", "compose/web.yml", "up", "-d"])
        );
    }

    #[tokio::test]
    async fn test_runs_command() {
        let deployer = CommandDeployer::new(
            "sh",
            &args(&["-c", r#"echo "up $1"; echo '{"cmd":"up"}'"#, "sh", "{bundle}"]),
        );

        let output = deployer.up(Path::new("web.yml")).await.unwrap();
        assert_eq!(output, "up web.yml\n{\"cmd\":\"up\"}\n");
    }

    #[tokio::test]
    async fn test_non_zero_exit() {
        let deployer = CommandDeployer::new("sh", &args(&["-c", "echo boom >&2; exit 3"]));

        let err = deployer.up(Path::new("web.yml")).await.unwrap_err();
        match err {
            DeployError::Exit { output, .. } => assert_eq!(output, "boom\n"),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_program() {
        let deployer = CommandDeployer::new("/nonexistent/deploy-tool", &[]);
        let err = deployer.up(Path::new("web.yml")).await.unwrap_err();
        assert!(matches!(err, DeployError::Spawn(_)));
    }
}

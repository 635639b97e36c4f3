//! Ruby agent: the `appmap` gem driven through Bundler.

use std::path::Path;
use std::sync::Arc;

use appmap_core::StatusSnapshot;
use async_trait::async_trait;

use crate::agent::{
    AppMapAgent, FilesResponse, InitResponse, InstallResult, run_json, run_status,
    run_test_commands, test_commands_for,
};
use crate::error::AgentError;
use crate::executor::{CommandRunner, CommandSpec};

const GEM_DEPENDENCY: &str = "gem 'appmap', :groups => [:development, :test]";

pub struct RubyAgent {
    runner: Arc<dyn CommandRunner>,
}

impl RubyAgent {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    fn bundle(root: &Path, args: &[&str]) -> CommandSpec {
        CommandSpec::new("bundle", root).args(args.iter().copied())
    }

    /// Installed gem version from `bundle info appmap`, if any.
    async fn installed_version(&self, root: &Path) -> Result<Option<String>, AgentError> {
        let output = self.runner.run(&Self::bundle(root, &["info", "appmap"])).await?;
        if !output.success() {
            return Ok(None);
        }
        Ok(parse_gem_version(&output.stdout))
    }
}

/// Extract `x.y.z` from a line such as `  * appmap (0.80.1)`.
fn parse_gem_version(stdout: &str) -> Option<String> {
    let start = stdout.find("appmap (")? + "appmap (".len();
    let rest = &stdout[start..];
    let version = &rest[..rest.find(')')?];
    let parts: Vec<&str> = version.split('.').collect();
    let numeric = parts.len() >= 3 && parts[..3].iter().all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()));
    numeric.then(|| parts[..3].join("."))
}

fn is_gem_declaration(line: &str) -> bool {
    let trimmed = line.trim_start();
    ["gem ", "group ", "require "]
        .iter()
        .any(|keyword| trimmed.starts_with(keyword))
}

fn is_appmap_dependency(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("gem 'appmap'") || trimmed.starts_with("gem \"appmap\"")
}

/// Add (or replace) the appmap gem declaration in a Gemfile.
fn add_gem_dependency(gemfile: &str) -> String {
    if gemfile.lines().any(is_appmap_dependency) {
        let mut out: Vec<&str> = gemfile
            .lines()
            .map(|line| if is_appmap_dependency(line) { GEM_DEPENDENCY } else { line })
            .collect();
        if gemfile.ends_with('\n') {
            out.push("");
        }
        return out.join("\n");
    }

    let mut offset = 0;
    for line in gemfile.split_inclusive('\n') {
        if is_gem_declaration(line) {
            let indent = line.len() - line.trim_start().len();
            let at = offset + indent;
            return format!("{}{GEM_DEPENDENCY}\n\n{}", &gemfile[..at], &gemfile[at..]);
        }
        offset += line.len();
    }

    format!("{gemfile}\n{GEM_DEPENDENCY}\n")
}

#[async_trait]
impl AppMapAgent for RubyAgent {
    fn language(&self) -> &str {
        "ruby"
    }

    async fn is_installed(&self, root: &Path) -> Result<bool, AgentError> {
        match self.installed_version(root).await {
            Ok(version) => Ok(version.is_some()),
            Err(e) => {
                tracing::debug!(root = %root.display(), "bundle unavailable: {e}");
                Ok(false)
            }
        }
    }

    async fn install(&self, root: &Path) -> Result<InstallResult, AgentError> {
        let gemfile_path = root.join("Gemfile");
        let gemfile = tokio::fs::read_to_string(&gemfile_path).await?;
        tokio::fs::write(&gemfile_path, add_gem_dependency(&gemfile)).await?;

        let upgrading = self.installed_version(root).await?.is_some();
        let spec = if upgrading {
            Self::bundle(root, &["update", "appmap"])
        } else {
            Self::bundle(root, &["install"])
        };
        self.runner.run(&spec).await?.into_stdout(&spec)?;

        Ok(if upgrading {
            InstallResult::Upgraded
        } else {
            InstallResult::Installed
        })
    }

    async fn init(&self, root: &Path) -> Result<InitResponse, AgentError> {
        run_json(self.runner.as_ref(), &Self::bundle(root, &["exec", "appmap-agent-init"])).await
    }

    async fn files(&self, root: &Path) -> Result<FilesResponse, AgentError> {
        run_json(self.runner.as_ref(), &Self::bundle(root, &["exec", "appmap-agent-files"])).await
    }

    async fn status(&self, root: &Path) -> Result<Option<StatusSnapshot>, AgentError> {
        run_status(self.runner.as_ref(), &Self::bundle(root, &["exec", "appmap-agent-status"])).await
    }

    async fn test(&self, root: &Path, command: Option<&str>) -> Result<(), AgentError> {
        let commands = test_commands_for(self, root, command).await?;
        run_test_commands(self.runner.as_ref(), root, &commands).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::testing::ScriptedRunner;
    use std::path::PathBuf;

    fn ruby_agent() -> (RubyAgent, Arc<ScriptedRunner>) {
        let runner = Arc::new(ScriptedRunner::default());
        (RubyAgent::new(runner.clone()), runner)
    }

    #[test]
    fn parses_gem_version() {
        assert_eq!(parse_gem_version("  * appmap (0.80.1)\n\tSummary"), Some("0.80.1".into()));
        assert_eq!(parse_gem_version("  * appmap (0.80.1.beta)"), Some("0.80.1".into()));
        assert_eq!(parse_gem_version("  * appmap (dev)"), None);
        assert_eq!(parse_gem_version("Could not find gem"), None);
    }

    #[test]
    fn inserts_dependency_before_first_declaration() {
        let gemfile = "source 'https://rubygems.org'\n\ngem 'rails'\n";
        let updated = add_gem_dependency(gemfile);
        assert_eq!(
            updated,
            format!("source 'https://rubygems.org'\n\n{GEM_DEPENDENCY}\n\ngem 'rails'\n")
        );
    }

    #[test]
    fn replaces_existing_dependency() {
        let gemfile = "gem 'rails'\ngem \"appmap\", '0.1'\n";
        let updated = add_gem_dependency(gemfile);
        assert_eq!(updated, format!("gem 'rails'\n{GEM_DEPENDENCY}\n"));
    }

    #[test]
    fn appends_when_no_declarations() {
        let updated = add_gem_dependency("source 'https://rubygems.org'\n");
        assert!(updated.ends_with(&format!("\n{GEM_DEPENDENCY}\n")));
    }

    #[tokio::test]
    async fn installed_requires_version() {
        let (agent, runner) = ruby_agent();
        runner.respond("bundle info appmap", 0, "  * appmap (0.80.1)\n");
        assert!(agent.is_installed(Path::new("/p")).await.unwrap());

        let (agent, runner) = ruby_agent();
        runner.respond("bundle info appmap", 7, "");
        assert!(!agent.is_installed(Path::new("/p")).await.unwrap());
    }

    #[tokio::test]
    async fn missing_bundler_means_not_installed() {
        let (agent, _runner) = ruby_agent();
        assert!(!agent.is_installed(Path::new("/p")).await.unwrap());
    }

    #[tokio::test]
    async fn status_parses_json_and_null() {
        let (agent, runner) = ruby_agent();
        runner.respond(
            "bundle exec appmap-agent-status",
            0,
            r#"{"properties":{"config":{"present":true,"valid":false}}}"#,
        );
        let status = agent.status(Path::new("/p")).await.unwrap().unwrap();
        assert!(status.config_present());
        assert!(!status.config_valid());

        let (agent, runner) = ruby_agent();
        runner.respond("bundle exec appmap-agent-status", 0, "null\n");
        assert!(agent.status(Path::new("/p")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn status_failure_carries_stderr() {
        let (agent, runner) = ruby_agent();
        runner.respond("bundle exec appmap-agent-status", 1, "");
        let err = agent.status(Path::new("/p")).await.unwrap_err();
        assert!(matches!(err, AgentError::CommandFailed { code: 1, .. }), "{err}");
    }

    #[tokio::test]
    async fn garbage_status_is_parse_error() {
        let (agent, runner) = ruby_agent();
        runner.respond("bundle exec appmap-agent-status", 0, "Resolving dependencies...");
        let err = agent.status(Path::new("/p")).await.unwrap_err();
        assert!(matches!(err, AgentError::Parse { .. }), "{err}");
    }

    #[tokio::test]
    async fn install_edits_gemfile_then_bundles() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Gemfile"), "gem 'rails'\n").unwrap();
        let (agent, runner) = ruby_agent();
        runner
            .respond("bundle info appmap", 7, "")
            .respond("bundle install", 0, "Bundle complete!");

        let result = agent.install(dir.path()).await.unwrap();

        assert_eq!(result, InstallResult::Installed);
        let gemfile = std::fs::read_to_string(dir.path().join("Gemfile")).unwrap();
        assert!(gemfile.contains(GEM_DEPENDENCY));
        assert_eq!(runner.calls(), vec!["bundle info appmap", "bundle install"]);
    }

    #[tokio::test]
    async fn install_upgrades_existing_gem() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Gemfile"), "gem 'appmap'\n").unwrap();
        let (agent, runner) = ruby_agent();
        runner
            .respond("bundle info appmap", 0, "  * appmap (0.70.0)")
            .respond("bundle update appmap", 0, "");

        assert_eq!(agent.install(dir.path()).await.unwrap(), InstallResult::Upgraded);
    }

    #[tokio::test]
    async fn install_without_gemfile_fails() {
        let dir = tempfile::tempdir().unwrap();
        let (agent, _runner) = ruby_agent();
        let err = agent.install(dir.path()).await.unwrap_err();
        assert!(matches!(err, AgentError::Io(_)), "{err}");
    }

    #[tokio::test]
    async fn test_runs_advertised_commands() {
        let (agent, runner) = ruby_agent();
        runner
            .respond(
                "bundle exec appmap-agent-status",
                0,
                r#"{"test_commands":[{"command":"bundle exec rspec"},{"command":"bundle exec rake test"}]}"#,
            )
            .respond(if cfg!(windows) { "cmd" } else { "sh" }, 0, "");

        agent.test(Path::new("/p"), None).await.unwrap();

        let shell_calls: Vec<_> = runner
            .specs()
            .into_iter()
            .filter(|s| s.program != "bundle")
            .map(|s| s.args.last().cloned().unwrap_or_default())
            .collect();
        assert_eq!(shell_calls, vec!["bundle exec rspec", "bundle exec rake test"]);
    }

    #[tokio::test]
    async fn files_lists_project_layout() {
        let (agent, runner) = ruby_agent();
        runner.respond(
            "bundle exec appmap-agent-files",
            0,
            r#"{"configuration":["appmap.yml"],"testDirectories":["spec","test"],"appmapDirectory":["tmp/appmap"]}"#,
        );

        let files = agent.files(Path::new("/shop")).await.unwrap();

        assert_eq!(runner.calls(), vec!["bundle exec appmap-agent-files"]);
        assert_eq!(runner.specs()[0].cwd, Path::new("/shop"));
        assert_eq!(files.test_directories, vec![PathBuf::from("spec"), PathBuf::from("test")]);
        assert_eq!(files.appmap_directory, vec![PathBuf::from("tmp/appmap")]);
        assert!(files.integration_test_paths.is_empty());
    }
}

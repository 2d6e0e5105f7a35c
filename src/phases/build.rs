//! Phase 4c: Running the documentation builder
//!
//! The [`DocBuilder`] trait is the seam to the external single-version
//! builder. [`CommandBuilder`] runs it as a subprocess; tests substitute
//! their own implementations.
//!
//! [`BuildDriver::run`] never fails. Whatever the builder does, including
//! panicking, ends up as a [`BuildResult`], so one broken ref cannot stop the
//! others from being built.

use std::collections::BTreeMap;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;

use crate::config::BuilderConfig;
use crate::defaults;
use crate::error::{Error, Result};
use crate::phases::overlay::PlannedRef;
use crate::phases::{BuildContext, BuildResult};

/// Lines of builder stderr kept in a failure diagnostic.
const STDERR_TAIL_LINES: usize = 20;

/// Builds the documentation of a single ref
pub trait DocBuilder: Send + Sync {
    fn build(&self, context: &BuildContext) -> Result<()>;
}

/// Runs an external command, `sphinx-build` by default
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    config: BuilderConfig,
}

impl CommandBuilder {
    pub fn new(config: BuilderConfig) -> Self {
        Self { config }
    }

    /// Arguments for `context`, with placeholders substituted and overlay
    /// options appended.
    pub fn args(&self, context: &BuildContext) -> Vec<String> {
        let mut args: Vec<String> = self
            .config
            .args
            .iter()
            .map(|arg| substitute(arg, context))
            .collect();

        if let Some(flag) = &self.config.define_flag {
            for (key, value) in context.overlay() {
                args.push(flag.clone());
                args.push(format!("{}={}", key, value));
            }
        }
        args
    }

    /// Environment variables describing `context` to the builder.
    pub fn env(&self, context: &BuildContext) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        let mut set = |key: &str, value: String| {
            env.insert(format!("{}{}", defaults::ENV_PREFIX, key), value);
        };
        set("NAME", context.reference.name.clone());
        set("KIND", context.reference.kind.to_string());
        set("COMMIT", context.reference.commit.clone());
        set("VERSION", context.version.clone());
        set("RELEASE", context.release.clone());
        set("IS_RELEASED", context.is_released.to_string());
        set("IS_LATEST", context.is_latest.to_string());
        set("SOURCE_DIR", context.source_dir.display().to_string());
        set("OUTPUT_DIR", context.output_dir.display().to_string());
        set("CATALOG", context.catalog_path.display().to_string());
        if let Some(project) = &context.project {
            set("PROJECT", project.clone());
        }

        for (key, value) in &self.config.env {
            env.insert(key.clone(), substitute(value, context));
        }
        env
    }
}

fn substitute(template: &str, context: &BuildContext) -> String {
    template
        .replace("{source}", &context.source_dir.display().to_string())
        .replace("{output}", &context.output_dir.display().to_string())
        .replace("{name}", &context.reference.name)
        .replace("{version}", &context.version)
        .replace("{release}", &context.release)
}

fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}

impl DocBuilder for CommandBuilder {
    fn build(&self, context: &BuildContext) -> Result<()> {
        let failed = |message: String| Error::Build {
            ref_name: context.reference.name.clone(),
            message,
        };

        fs::create_dir_all(&context.output_dir).map_err(|e| {
            failed(format!(
                "cannot create {}: {}",
                context.output_dir.display(),
                e
            ))
        })?;

        let args = self.args(context);
        log::debug!(
            "Running {} {} in {}",
            self.config.command,
            args.join(" "),
            context.worktree_root.display()
        );

        let output = Command::new(&self.config.command)
            .args(&args)
            .envs(self.env(context))
            .current_dir(&context.worktree_root)
            .output()
            .map_err(|e| failed(format!("cannot run '{}': {}", self.config.command, e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            log::debug!("[{}] {}", context.reference.name, tail(&stdout, STDERR_TAIL_LINES));
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let status = match output.status.code() {
                Some(code) => format!("exit status {}", code),
                None => "terminated by signal".to_string(),
            };
            let detail = tail(&stderr, STDERR_TAIL_LINES);
            return Err(failed(if detail.is_empty() {
                format!("'{}' failed with {}", self.config.command, status)
            } else {
                format!(
                    "'{}' failed with {}:\n{}",
                    self.config.command, status, detail
                )
            }));
        }

        Ok(())
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

impl BuildResult {
    /// Result for a ref that failed before its builder ran.
    pub fn failed(planned: &PlannedRef, output_dir: PathBuf, message: impl Into<String>, started: Instant) -> Self {
        Self {
            reference: planned.reference.clone(),
            success: false,
            error: Some(message.into()),
            output_dir,
            output_subdir: planned.output_subdir.clone(),
            version: planned.version.clone(),
            release: planned.release.clone(),
            is_released: planned.is_released,
            build_date: Utc::now(),
            duration_ms: elapsed_ms(started),
        }
    }
}

/// Runs a [`DocBuilder`] and records the outcome
#[derive(Clone)]
pub struct BuildDriver {
    builder: Arc<dyn DocBuilder>,
}

impl BuildDriver {
    pub fn new(builder: Arc<dyn DocBuilder>) -> Self {
        Self { builder }
    }

    /// Build `context`, converting errors and panics into a failed result.
    pub fn run(&self, context: &BuildContext) -> BuildResult {
        let started = Instant::now();
        let name = &context.reference.name;
        log::info!("Building '{}' into {}", name, context.output_dir.display());

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.builder.build(context)));
        let error = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(match e {
                Error::Build { message, .. } => message,
                other => other.to_string(),
            }),
            Err(payload) => Some(format!("builder panicked: {}", panic_message(&*payload))),
        };

        let duration_ms = elapsed_ms(started);
        match &error {
            None => log::info!("Built '{}' in {} ms", name, duration_ms),
            Some(message) => log::warn!("Build of '{}' failed: {}", name, message),
        }

        BuildResult {
            reference: context.reference.clone(),
            success: error.is_none(),
            error,
            output_dir: context.output_dir.clone(),
            output_subdir: context.output_subdir.clone(),
            version: context.version.clone(),
            release: context.release.clone(),
            is_released: context.is_released,
            build_date: Utc::now(),
            duration_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refs::{Ref, RefKind};
    use std::path::Path;

    fn context(root: &Path) -> BuildContext {
        let mut options = BTreeMap::new();
        options.insert("html_theme".to_string(), "furo".to_string());
        BuildContext {
            reference: Ref::new("v1.0", RefKind::Tag, "0123456789"),
            worktree_root: root.to_path_buf(),
            source_dir: root.join("docs"),
            output_dir: root.join("out/v1.0"),
            output_subdir: "v1.0".to_string(),
            version: "1.0".to_string(),
            release: "1.0.0".to_string(),
            is_released: true,
            is_latest: true,
            project: None,
            options,
            catalog_path: root.join("out/versions.json"),
        }
    }

    struct Failing;

    impl DocBuilder for Failing {
        fn build(&self, context: &BuildContext) -> Result<()> {
            Err(Error::Build {
                ref_name: context.reference.name.clone(),
                message: "warning treated as error".to_string(),
            })
        }
    }

    struct Panicking;

    impl DocBuilder for Panicking {
        fn build(&self, _context: &BuildContext) -> Result<()> {
            panic!("extension crashed");
        }
    }

    #[test]
    fn test_args_substitution_and_defines() {
        let temp = tempfile::TempDir::new().unwrap();
        let ctx = context(temp.path());
        let builder = CommandBuilder::new(BuilderConfig::default());

        let args = builder.args(&ctx);
        assert_eq!(args[0], "-b");
        assert_eq!(args[1], "html");
        assert_eq!(args[2], ctx.source_dir.display().to_string());
        assert_eq!(args[3], ctx.output_dir.display().to_string());
        assert!(args
            .windows(2)
            .any(|w| w[0] == "-D" && w[1] == "html_theme=furo"));
        assert!(args.windows(2).any(|w| w[0] == "-D" && w[1] == "version=1.0"));
        assert!(args
            .windows(2)
            .any(|w| w[0] == "-D" && w[1] == "release=1.0.0"));
    }

    #[test]
    fn test_args_without_define_flag() {
        let temp = tempfile::TempDir::new().unwrap();
        let builder = CommandBuilder::new(BuilderConfig {
            command: "mkdocs".to_string(),
            args: vec!["build".to_string(), "--site-dir={output}".to_string()],
            define_flag: None,
            env: BTreeMap::new(),
        });
        let ctx = context(temp.path());
        assert_eq!(
            builder.args(&ctx),
            vec![
                "build".to_string(),
                format!("--site-dir={}", ctx.output_dir.display())
            ]
        );
    }

    #[test]
    fn test_env_describes_context() {
        let temp = tempfile::TempDir::new().unwrap();
        let mut config = BuilderConfig::default();
        config
            .env
            .insert("SITE_VERSION".to_string(), "{version}".to_string());
        let env = CommandBuilder::new(config).env(&context(temp.path()));
        assert_eq!(env["DOCS_MULTIVERSION_NAME"], "v1.0");
        assert_eq!(env["DOCS_MULTIVERSION_VERSION"], "1.0");
        assert_eq!(env["DOCS_MULTIVERSION_IS_LATEST"], "true");
        assert_eq!(env["SITE_VERSION"], "1.0");
        assert!(!env.contains_key("DOCS_MULTIVERSION_PROJECT"));
    }

    #[test]
    fn test_tail_keeps_last_lines() {
        assert_eq!(tail("a\nb\n\nc\n", 2), "b\nc");
        assert_eq!(tail("", 3), "");
    }

    #[cfg(unix)]
    #[test]
    fn test_command_builder_success() {
        let temp = tempfile::TempDir::new().unwrap();
        let ctx = context(temp.path());
        let builder = CommandBuilder::new(BuilderConfig {
            command: "sh".to_string(),
            args: vec![
                "-c".to_string(),
                "echo \"$DOCS_MULTIVERSION_VERSION\" > \"$DOCS_MULTIVERSION_OUTPUT_DIR/index.html\""
                    .to_string(),
            ],
            define_flag: None,
            env: BTreeMap::new(),
        });

        builder.build(&ctx).unwrap();
        let written = fs::read_to_string(ctx.output_dir.join("index.html")).unwrap();
        assert_eq!(written.trim(), "1.0");
    }

    #[cfg(unix)]
    #[test]
    fn test_command_builder_failure_reports_stderr() {
        let temp = tempfile::TempDir::new().unwrap();
        let builder = CommandBuilder::new(BuilderConfig {
            command: "sh".to_string(),
            args: vec!["-c".to_string(), "echo 'conf.py not found' >&2; exit 3".to_string()],
            define_flag: None,
            env: BTreeMap::new(),
        });

        let err = builder.build(&context(temp.path())).unwrap_err();
        assert!(matches!(err, Error::Build { ref ref_name, .. } if ref_name == "v1.0"));
        let message = err.to_string();
        assert!(message.contains("exit status 3"));
        assert!(message.contains("conf.py not found"));
    }

    #[test]
    fn test_command_builder_missing_program() {
        let temp = tempfile::TempDir::new().unwrap();
        let builder = CommandBuilder::new(BuilderConfig {
            command: "docs-multiversion-no-such-builder".to_string(),
            ..BuilderConfig::default()
        });
        let err = builder.build(&context(temp.path())).unwrap_err();
        assert!(err.to_string().contains("cannot run"));
    }

    #[test]
    fn test_driver_downgrades_errors() {
        let temp = tempfile::TempDir::new().unwrap();
        let result = BuildDriver::new(Arc::new(Failing)).run(&context(temp.path()));
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("warning treated as error"));
        assert_eq!(result.version, "1.0");
    }

    #[test]
    fn test_driver_downgrades_panics() {
        let temp = tempfile::TempDir::new().unwrap();
        let result = BuildDriver::new(Arc::new(Panicking)).run(&context(temp.path()));
        assert!(!result.success);
        assert!(result.error.unwrap().contains("extension crashed"));
    }
}

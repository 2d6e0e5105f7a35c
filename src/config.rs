//! # Configuration Schema and Parsing
//!
//! This module defines the data structures that represent the
//! `multiversion.yaml` configuration file, as well as the logic for parsing
//! and validating it.
//!
//! ## Key Components
//!
//! - **`Config`**: The global configuration, read from the documentation
//!   source directory of the current checkout. It controls which refs are
//!   built, how their labels and output directories are derived, how the
//!   catalog is sorted, and which external builder is invoked.
//!
//! - **`RefConfig`**: The subset of the same file read from inside each ref's
//!   tree. Historical refs may carry older or partial files, so unknown keys
//!   are ignored there, while the global file rejects them.
//!
//! ## Defaults
//!
//! Every section is optional. An empty file is a valid configuration that
//! builds every local branch and tag with `sphinx-build`.

use std::collections::BTreeMap;
use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::defaults;
use crate::error::{Error, Result};

/// Ref selection options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RefsConfig {
    /// Glob patterns a ref name must match to be built.
    pub include: Vec<String>,
    /// Glob patterns excluding ref names. Exclusion wins over inclusion.
    pub exclude: Vec<String>,
    /// Whether local branches are candidates.
    pub branches: bool,
    /// Whether tags are candidates.
    pub tags: bool,
    /// Glob patterns on remote names; remote-tracking branches are only
    /// candidates when their remote matches one of them.
    pub remotes: Vec<String>,
    /// When a local and a remote-tracking branch share a name, keep the
    /// remote one.
    pub prefer_remote: bool,
    /// Drop refs that do not contain the configuration file.
    pub require_config: bool,
    /// Glob patterns on the short refname (`heads/x`, `tags/x`,
    /// `remotes/origin/x`) that mark a version as released.
    pub released: Vec<String>,
}

impl Default for RefsConfig {
    fn default() -> Self {
        Self {
            include: defaults::include_patterns(),
            exclude: Vec::new(),
            branches: true,
            tags: true,
            remotes: Vec::new(),
            prefer_remote: false,
            require_config: true,
            released: defaults::released_patterns(),
        }
    }
}

/// How strictly submodule pointers must agree with the current checkout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AffinityMode {
    /// Submodule pointers are ignored.
    #[default]
    Off,
    /// Every submodule path shared with the current checkout must pin the
    /// same commit, and at least one path must be shared.
    All,
    /// Only the designated primary submodule path is compared.
    Primary,
}

/// Submodule affinity options
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SubmoduleConfig {
    pub affinity: AffinityMode,
    /// Primary submodule path, required by `primary` affinity.
    pub path: Option<String>,
}

/// Rule deriving a label (version or release) from a ref name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LabelRule {
    /// Prefix removed from the ref name when present (e.g. `v`).
    pub strip_prefix: Option<String>,
    /// Regular expression applied after prefix stripping.
    pub pattern: Option<String>,
    /// Replacement for a `pattern` match; may reference capture groups
    /// with `$1`, `$2`, ...
    pub replacement: String,
}

impl Default for LabelRule {
    fn default() -> Self {
        Self {
            strip_prefix: None,
            pattern: None,
            replacement: defaults::replacement(),
        }
    }
}

impl LabelRule {
    /// Derive a label from `name`.
    ///
    /// A name that does not match `pattern` keeps its (prefix-stripped) value.
    ///
    /// # Examples
    ///
    /// ```
    /// use docs_multiversion::config::LabelRule;
    ///
    /// let rule = LabelRule {
    ///     strip_prefix: Some("v".to_string()),
    ///     ..LabelRule::default()
    /// };
    /// assert_eq!(rule.apply("v1.2.0").unwrap(), "1.2.0");
    /// assert_eq!(rule.apply("main").unwrap(), "main");
    /// ```
    pub fn apply(&self, name: &str) -> Result<String> {
        let stripped = match &self.strip_prefix {
            Some(prefix) => name.strip_prefix(prefix.as_str()).unwrap_or(name),
            None => name,
        };

        let Some(pattern) = &self.pattern else {
            return Ok(stripped.to_string());
        };

        let regex = Regex::new(pattern)?;
        match regex.captures(stripped) {
            Some(captures) => {
                let mut label = String::new();
                captures.expand(&self.replacement, &mut label);
                Ok(label)
            }
            None => Ok(stripped.to_string()),
        }
    }

    fn validate(&self, section: &str) -> Result<()> {
        if let Some(pattern) = &self.pattern {
            Regex::new(pattern).map_err(|e| {
                Error::config_with_hint(
                    format!("Invalid regex in {}.pattern: {}", section, e),
                    "Patterns use Rust regex syntax, see https://docs.rs/regex",
                )
            })?;
        }
        Ok(())
    }
}

/// Output directory layout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputLayout {
    /// Format of each ref's output subdirectory. Supports `{name}`,
    /// `{kind}`, `{remote}`, `{commit}` and `{short_commit}`.
    pub dir_format: String,
}

impl Default for OutputLayout {
    fn default() -> Self {
        Self {
            dir_format: defaults::DIR_FORMAT.to_string(),
        }
    }
}

/// Reject placeholders in an output directory format that no ref can fill.
pub fn check_dir_format(format: &str) -> Result<()> {
    let placeholder = Regex::new(r"\{([A-Za-z_]+)\}")?;
    for captures in placeholder.captures_iter(format) {
        let key = &captures[1];
        if !defaults::DIR_PLACEHOLDERS.contains(&key) {
            return Err(Error::config_with_hint(
                format!("Unknown placeholder '{{{}}}' in output.dir_format", key),
                format!(
                    "Supported placeholders: {}",
                    defaults::DIR_PLACEHOLDERS
                        .iter()
                        .map(|p| format!("{{{}}}", p))
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            ));
        }
    }
    Ok(())
}

/// Order of the entries in the version catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortPolicy {
    /// Newest ref first, by creator date.
    #[default]
    Date,
    /// Lexical by ref name.
    Name,
    /// Highest semantic version first; non-semver names last.
    Semver,
}

/// External documentation builder invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuilderConfig {
    /// Program to execute.
    pub command: String,
    /// Arguments; `{source}`, `{output}`, `{name}`, `{version}` and
    /// `{release}` are substituted per ref.
    pub args: Vec<String>,
    /// Flag preceding each `key=value` overlay option. `None` disables
    /// passing options on the command line.
    pub define_flag: Option<String>,
    /// Extra environment variables.
    pub env: BTreeMap<String, String>,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            command: defaults::BUILDER_COMMAND.to_string(),
            args: defaults::builder_args(),
            define_flag: Some(defaults::DEFINE_FLAG.to_string()),
            env: BTreeMap::new(),
        }
    }
}

/// Global configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub refs: RefsConfig,
    pub submodules: SubmoduleConfig,
    /// Version label rule.
    pub version: LabelRule,
    /// Release label rule; the version label is used when absent.
    pub release: Option<LabelRule>,
    pub output: OutputLayout,
    pub sort: SortPolicy,
    /// Name of the ref flagged as the latest version. Defaults to the first
    /// catalog entry.
    pub latest: Option<String>,
    /// Exit non-zero when some, but not all, refs fail.
    pub strict: bool,
    /// Number of builds run concurrently.
    pub jobs: usize,
    /// Enable debug logging.
    pub debug: bool,
    /// Project name passed to the builder and the catalog.
    pub project: Option<String>,
    /// Builder options; refs may override individual keys.
    pub options: BTreeMap<String, serde_yaml::Value>,
    pub builder: BuilderConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            refs: RefsConfig::default(),
            submodules: SubmoduleConfig::default(),
            version: LabelRule::default(),
            release: None,
            output: OutputLayout::default(),
            sort: SortPolicy::default(),
            latest: None,
            strict: false,
            jobs: defaults::jobs(),
            debug: false,
            project: None,
            options: BTreeMap::new(),
            builder: BuilderConfig::default(),
        }
    }
}

impl Config {
    /// Check every pattern and cross-field constraint.
    ///
    /// Runs once at load time so that nothing fails half-way through a run.
    pub fn validate(&self) -> Result<()> {
        for (section, patterns) in [
            ("refs.include", &self.refs.include),
            ("refs.exclude", &self.refs.exclude),
            ("refs.remotes", &self.refs.remotes),
            ("refs.released", &self.refs.released),
        ] {
            for pattern in patterns {
                glob::Pattern::new(pattern).map_err(|e| {
                    Error::config(format!(
                        "Invalid glob '{}' in {}: {}",
                        pattern, section, e
                    ))
                })?;
            }
        }

        self.version.validate("version")?;
        if let Some(release) = &self.release {
            release.validate("release")?;
        }

        if self.jobs == 0 {
            return Err(Error::config_with_hint(
                "jobs must be at least 1",
                "Use `jobs: 1` to build refs sequentially",
            ));
        }

        if self.submodules.affinity == AffinityMode::Primary && self.submodules.path.is_none() {
            return Err(Error::config_with_hint(
                "submodules.affinity is 'primary' but no submodules.path is set",
                "Set submodules.path to the submodule that must match",
            ));
        }

        if self.output.dir_format.trim().is_empty() {
            return Err(Error::config("output.dir_format must not be empty"));
        }
        check_dir_format(&self.output.dir_format)?;

        if self.builder.command.trim().is_empty() {
            return Err(Error::config("builder.command must not be empty"));
        }

        Ok(())
    }
}

/// Options read from a ref's own copy of the configuration file
///
/// The file may be a complete global configuration. There `version` and
/// `release` are label rules, so only scalar values count as explicit
/// labels.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefConfig {
    pub project: Option<String>,
    /// Explicit version label, overriding the derived one.
    #[serde(deserialize_with = "explicit_label")]
    pub version: Option<String>,
    /// Explicit release label.
    #[serde(deserialize_with = "explicit_label")]
    pub release: Option<String>,
    pub options: BTreeMap<String, serde_yaml::Value>,
}

fn explicit_label<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde_yaml::Value;

    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

impl RefConfig {
    /// Parse a ref's configuration file contents.
    pub fn parse(content: &[u8]) -> Result<Self> {
        if content.iter().all(|b| b.is_ascii_whitespace()) {
            return Ok(Self::default());
        }
        serde_yaml::from_slice(content).map_err(|e| Error::config(e.to_string()))
    }
}

/// Render an option value the way it is passed to the builder.
pub fn option_string(value: &serde_yaml::Value) -> String {
    use serde_yaml::Value;

    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Null => String::new(),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

/// Parse and validate a YAML configuration string.
///
/// # Examples
///
/// ```
/// use docs_multiversion::config::{self, SortPolicy};
///
/// let config = config::parse("sort: semver\nrefs:\n  exclude: [main]\n").unwrap();
/// assert_eq!(config.sort, SortPolicy::Semver);
/// assert_eq!(config.refs.exclude, vec!["main".to_string()]);
/// ```
pub fn parse(yaml_content: &str) -> Result<Config> {
    let config = if yaml_content.trim().is_empty() {
        Config::default()
    } else {
        serde_yaml::from_str::<Config>(yaml_content).map_err(|e| {
            Error::config_with_hint(
                e.to_string(),
                format!(
                    "See the {} reference for the supported keys",
                    defaults::CONFIG_FILE_NAME
                ),
            )
        })?
    };
    config.validate()?;
    Ok(config)
}

/// Load configuration from a file.
pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::config(format!(
            "Cannot read configuration file '{}': {}",
            path.display(),
            e
        ))
    })?;
    parse(&content)
}

/// Load configuration from `path` if it exists, otherwise use the defaults.
pub fn from_file_or_default<P: AsRef<Path>>(path: P) -> Result<Config> {
    if path.as_ref().exists() {
        from_file(path)
    } else {
        log::debug!(
            "No configuration at {}, using defaults",
            path.as_ref().display()
        );
        Ok(Config::default())
    }
}

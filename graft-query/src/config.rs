//! Eager loading configuration.
//!
//! Configuration is an explicit value passed to each load. When a call does not
//! provide one, the root model's default is used, falling back to
//! [`EagerConfig::default`].
//!
//! ```toml
//! [eager]
//! algorithm = "join"
//!
//! [eager.options]
//! minimize = true
//! max_identifier_length = 63
//!
//! [eager.options.aliases]
//! model1Relation2 = "mr2"
//! ```

use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{QueryError, QueryResult};

/// Strategy used to fetch an eager expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EagerAlgorithm {
    /// One query per parent and relation.
    Naive,
    /// One `IN` query per relation and level.
    #[default]
    WhereIn,
    /// A single query joining the whole tree.
    Join,
}

impl EagerAlgorithm {
    /// Name used in logs and configuration files.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Naive => "naive",
            Self::WhereIn => "where_in",
            Self::Join => "join",
        }
    }
}

impl std::fmt::Display for EagerAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tuning options shared by the algorithms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EagerOptions {
    /// Join: replace generated aliases with short opaque tokens.
    pub minimize: bool,

    /// Join: relation key to short alias, substituted for path segments in
    /// generated table and column aliases.
    pub aliases: IndexMap<String, String>,

    /// Join: longest identifier the database accepts.
    #[serde(default = "default_max_identifier_length")]
    pub max_identifier_length: usize,

    /// Naive/WhereIn: depth at which unbounded recursion stops even if data
    /// continues.
    pub max_recursion_depth: Option<u32>,

    /// Remove key columns the loader added to narrowed selections.
    #[serde(default = "default_true")]
    pub strip_injected_columns: bool,

    /// Maximum number of queries in flight at once.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

fn default_max_identifier_length() -> usize {
    63
}

fn default_true() -> bool {
    true
}

fn default_concurrency() -> usize {
    8
}

impl Default for EagerOptions {
    fn default() -> Self {
        Self {
            minimize: false,
            aliases: IndexMap::new(),
            max_identifier_length: default_max_identifier_length(),
            max_recursion_depth: None,
            strip_injected_columns: true,
            concurrency: default_concurrency(),
        }
    }
}

impl EagerOptions {
    /// Enable or disable alias minimization.
    pub fn minimize(mut self, minimize: bool) -> Self {
        self.minimize = minimize;
        self
    }

    /// Add a relation alias.
    pub fn alias(mut self, relation: impl Into<String>, alias: impl Into<String>) -> Self {
        self.aliases.insert(relation.into(), alias.into());
        self
    }

    /// Set the identifier length limit.
    pub fn max_identifier_length(mut self, length: usize) -> Self {
        self.max_identifier_length = length;
        self
    }

    /// Bound unbounded recursion.
    pub fn max_recursion_depth(mut self, depth: u32) -> Self {
        self.max_recursion_depth = Some(depth);
        self
    }

    /// Keep or strip injected key columns.
    pub fn strip_injected_columns(mut self, strip: bool) -> Self {
        self.strip_injected_columns = strip;
        self
    }

    /// Set the number of concurrent queries.
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Check option values.
    pub fn validate(&self) -> QueryResult<()> {
        if self.concurrency == 0 {
            return Err(QueryError::invalid_config("concurrency must be at least 1"));
        }
        if self.max_identifier_length < 8 {
            return Err(QueryError::invalid_config(format!(
                "max_identifier_length of {} leaves no room for generated aliases",
                self.max_identifier_length
            )));
        }
        if self.max_recursion_depth == Some(0) {
            return Err(QueryError::invalid_config(
                "max_recursion_depth must be at least 1",
            ));
        }
        if let Some((relation, _)) = self.aliases.iter().find(|(_, alias)| alias.is_empty()) {
            return Err(QueryError::invalid_config(format!(
                "alias for relation {} is empty",
                relation
            )));
        }
        Ok(())
    }
}

/// Algorithm and options for one eager load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EagerConfig {
    /// Fetch strategy.
    pub algorithm: EagerAlgorithm,
    /// Algorithm options.
    pub options: EagerOptions,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    eager: EagerConfig,
}

impl EagerConfig {
    /// Config for `algorithm` with default options.
    pub fn new(algorithm: EagerAlgorithm) -> Self {
        Self {
            algorithm,
            options: EagerOptions::default(),
        }
    }

    /// Replace the options.
    pub fn with_options(mut self, options: EagerOptions) -> Self {
        self.options = options;
        self
    }

    /// Load the `[eager]` section of a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> QueryResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            QueryError::missing_config(path.display().to_string()).with_source(e)
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse the `[eager]` section of a TOML document.
    pub fn from_toml_str(content: &str) -> QueryResult<Self> {
        let file: ConfigFile = toml::from_str(content).map_err(|e| {
            QueryError::invalid_config(format!("invalid eager configuration: {}", e.message()))
                .with_source(e)
        })?;
        file.eager.options.validate()?;
        Ok(file.eager)
    }

    /// Resolve the config for a call. The algorithm and the options are
    /// resolved separately: the call's own, then the model default, then the
    /// built-in default.
    pub fn resolve(
        algorithm: Option<EagerAlgorithm>,
        options: Option<&EagerOptions>,
        model_default: Option<&EagerConfig>,
    ) -> EagerConfig {
        EagerConfig {
            algorithm: algorithm
                .or_else(|| model_default.map(|c| c.algorithm))
                .unwrap_or_default(),
            options: options
                .or_else(|| model_default.map(|c| &c.options))
                .cloned()
                .unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = EagerConfig::default();
        assert_eq!(config.algorithm, EagerAlgorithm::WhereIn);
        assert_eq!(config.options.max_identifier_length, 63);
        assert!(config.options.strip_injected_columns);
        assert_eq!(config.options.concurrency, 8);
        assert!(!config.options.minimize);
    }

    #[test]
    fn test_from_toml() {
        let config = EagerConfig::from_toml_str(
            r#"
            [eager]
            algorithm = "join"

            [eager.options]
            minimize = true

            [eager.options.aliases]
            model1Relation2 = "mr2"
            "#,
        )
        .unwrap();
        assert_eq!(config.algorithm, EagerAlgorithm::Join);
        assert!(config.options.minimize);
        assert_eq!(config.options.aliases.get("model1Relation2").map(String::as_str), Some("mr2"));
        assert_eq!(config.options.max_identifier_length, 63);
    }

    #[test]
    fn test_empty_document_is_default() {
        assert_eq!(EagerConfig::from_toml_str("").unwrap(), EagerConfig::default());
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let err = EagerConfig::from_toml_str("[eager]\nalgorithm = \"join\"\nfast = true\n").unwrap_err();
        assert!(err.is_config_error());

        let err = EagerConfig::from_toml_str("[eager]\nalgorithm = \"magic\"\n").unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_validation() {
        let err = EagerConfig::from_toml_str("[eager.options]\nconcurrency = 0\n").unwrap_err();
        assert!(err.message.contains("concurrency"));
        assert!(EagerOptions::default().max_recursion_depth(0).validate().is_err());
    }

    #[test]
    fn test_resolve_fallback() {
        let call = EagerConfig::new(EagerAlgorithm::Naive);
        let model = EagerConfig::new(EagerAlgorithm::Join);
        assert_eq!(
            EagerConfig::resolve(Some(call.algorithm), Some(&call.options), Some(&model)).algorithm,
            EagerAlgorithm::Naive
        );
        assert_eq!(EagerConfig::resolve(None, None, Some(&model)).algorithm, EagerAlgorithm::Join);
        assert_eq!(EagerConfig::resolve(None, None, None).algorithm, EagerAlgorithm::WhereIn);
    }

    #[test]
    fn test_resolve_halves_independently() {
        let model = EagerConfig::new(EagerAlgorithm::Join).with_options(EagerOptions::default().minimize(true));

        let options = EagerOptions::default().concurrency(2);
        let resolved = EagerConfig::resolve(None, Some(&options), Some(&model));
        assert_eq!(resolved.algorithm, EagerAlgorithm::Join);
        assert_eq!(resolved.options.concurrency, 2);
        assert!(!resolved.options.minimize);

        let resolved = EagerConfig::resolve(Some(EagerAlgorithm::Naive), None, Some(&model));
        assert_eq!(resolved.algorithm, EagerAlgorithm::Naive);
        assert!(resolved.options.minimize);
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graft.toml");
        std::fs::write(&path, "[eager]\nalgorithm = \"naive\"\n").unwrap();
        assert_eq!(EagerConfig::from_file(&path).unwrap().algorithm, EagerAlgorithm::Naive);

        let err = EagerConfig::from_file(dir.path().join("missing.toml")).unwrap_err();
        assert!(err.is_config_error());
    }
}

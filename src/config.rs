use std::collections::BTreeSet;
use std::path::Path;

use crate::error::Error;

/// Analyzer, linter, and formatter configuration.
///
/// Loaded from `.caplint.toml` by the CLI; every field has the default the
/// tool ships with, so an absent file means default behavior. Validation is
/// strict for the reserved enum-like keys: an unsupported `brace_style` or
/// `quote_style` is rejected at load rather than silently normalized.
#[derive(Debug, Clone)]
pub struct Config {
    /// Formatter spaces per indentation level.
    pub indent_size: usize,
    /// Threshold for comment reflow.
    pub line_length: usize,
    /// Brace placement; only `"k&r"` is honored.
    pub brace_style: String,
    /// String literal quoting; only `"double"` is honored.
    pub quote_style: String,
    /// Enables the top-level reordering formatter rule.
    pub reorder_top_level: bool,
    /// Master switch for the comment phase (attachment, alignment, reflow).
    pub enable_comment_features: bool,
    /// Per-file fix/format iteration cap.
    pub max_passes: usize,
    /// Rule ids that never run.
    pub disabled_rules: BTreeSet<String>,
    /// When non-empty, only these rule ids may produce fixes.
    pub fix_only: BTreeSet<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            indent_size: 2,
            line_length: 100,
            brace_style: "k&r".to_string(),
            quote_style: "double".to_string(),
            reorder_top_level: false,
            enable_comment_features: true,
            max_passes: 10,
            disabled_rules: BTreeSet::new(),
            fix_only: BTreeSet::new(),
        }
    }
}

/// Raw TOML structure for `.caplint.toml`. Every key optional.
#[derive(serde::Deserialize)]
struct RawConfig {
    #[serde(default)]
    indent_size: Option<usize>,
    #[serde(default)]
    line_length: Option<usize>,
    #[serde(default)]
    brace_style: Option<String>,
    #[serde(default)]
    quote_style: Option<String>,
    #[serde(default)]
    reorder_top_level: Option<bool>,
    #[serde(default)]
    enable_comment_features: Option<bool>,
    #[serde(default)]
    max_passes: Option<usize>,
    #[serde(default)]
    disabled_rules: Option<Vec<String>>,
    #[serde(default)]
    fix_only: Option<Vec<String>>,
}

impl Config {
    /// Load config from `.caplint.toml` in the given root directory.
    /// A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` on read failure (other than not-found),
    /// `Error::TomlDe` on malformed TOML, or `Error::ConfigInvalid` for
    /// out-of-range or unsupported values.
    pub fn load(root: &Path) -> Result<Self, Error> {
        let path = root.join(".caplint.toml");
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(Error::Io(e)),
        };
        Self::parse(&content)
    }

    /// Parse and validate a TOML config document.
    ///
    /// # Errors
    ///
    /// Returns `Error::TomlDe` or `Error::ConfigInvalid` as for `load`.
    pub fn parse(content: &str) -> Result<Self, Error> {
        let raw: RawConfig = toml::from_str(content)?;
        let defaults = Self::default();

        let config = Self {
            indent_size: raw.indent_size.unwrap_or(defaults.indent_size),
            line_length: raw.line_length.unwrap_or(defaults.line_length),
            brace_style: raw.brace_style.unwrap_or(defaults.brace_style),
            quote_style: raw.quote_style.unwrap_or(defaults.quote_style),
            reorder_top_level: raw.reorder_top_level.unwrap_or(defaults.reorder_top_level),
            enable_comment_features: raw
                .enable_comment_features
                .unwrap_or(defaults.enable_comment_features),
            max_passes: raw.max_passes.unwrap_or(defaults.max_passes),
            disabled_rules: raw.disabled_rules.unwrap_or_default().into_iter().collect(),
            fix_only: raw.fix_only.unwrap_or_default().into_iter().collect(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject values the tool cannot honor.
    ///
    /// # Errors
    ///
    /// Returns `Error::ConfigInvalid` naming the offending key.
    pub fn validate(&self) -> Result<(), Error> {
        if self.indent_size == 0 {
            return Err(Error::ConfigInvalid {
                key: "indent_size".to_string(),
                value: "0".to_string(),
                reason: "must be a positive integer".to_string(),
            });
        }
        if self.line_length == 0 {
            return Err(Error::ConfigInvalid {
                key: "line_length".to_string(),
                value: "0".to_string(),
                reason: "must be a positive integer".to_string(),
            });
        }
        if self.max_passes == 0 {
            return Err(Error::ConfigInvalid {
                key: "max_passes".to_string(),
                value: "0".to_string(),
                reason: "must be a positive integer".to_string(),
            });
        }
        if self.brace_style != "k&r" {
            return Err(Error::ConfigInvalid {
                key: "brace_style".to_string(),
                value: self.brace_style.clone(),
                reason: "only \"k&r\" is supported".to_string(),
            });
        }
        if self.quote_style != "double" {
            return Err(Error::ConfigInvalid {
                key: "quote_style".to_string(),
                value: self.quote_style.clone(),
                reason: "only \"double\" is supported".to_string(),
            });
        }
        Ok(())
    }

    /// Whether a rule id is allowed to report at all.
    pub fn rule_enabled(&self, rule_id: &str) -> bool {
        !self.disabled_rules.contains(rule_id)
    }

    /// Whether a rule id is allowed to produce fixes.
    pub fn rule_fixable(&self, rule_id: &str) -> bool {
        self.rule_enabled(rule_id) && (self.fix_only.is_empty() || self.fix_only.contains(rule_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_file_missing() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = Config::load(tmp.path()).unwrap();
        assert_eq!(config.indent_size, 2);
        assert_eq!(config.line_length, 100);
        assert_eq!(config.max_passes, 10);
        assert!(config.enable_comment_features);
        assert!(!config.reorder_top_level);
    }

    #[test]
    fn loads_values_from_toml() {
        let config = Config::parse(
            r#"
indent_size = 4
line_length = 80
reorder_top_level = true
disabled_rules = ["E009"]
"#,
        )
        .unwrap();
        assert_eq!(config.indent_size, 4);
        assert_eq!(config.line_length, 80);
        assert!(config.reorder_top_level);
        assert!(!config.rule_enabled("E009"));
        assert!(config.rule_enabled("E001"));
    }

    #[test]
    fn rejects_unsupported_brace_style() {
        let result = Config::parse("brace_style = \"allman\"\n");
        assert!(matches!(result, Err(Error::ConfigInvalid { .. })));
    }

    #[test]
    fn rejects_unsupported_quote_style() {
        let result = Config::parse("quote_style = \"single\"\n");
        assert!(matches!(result, Err(Error::ConfigInvalid { .. })));
    }

    #[test]
    fn rejects_zero_indent() {
        let result = Config::parse("indent_size = 0\n");
        assert!(matches!(result, Err(Error::ConfigInvalid { .. })));
    }

    #[test]
    fn fix_only_restricts_fixable_set() {
        let config = Config::parse("fix_only = [\"E001\", \"E008\"]\n").unwrap();
        assert!(config.rule_fixable("E001"));
        assert!(!config.rule_fixable("E006"));
        assert!(config.rule_enabled("E006"));
    }
}

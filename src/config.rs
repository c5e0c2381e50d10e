//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.aira.toml` files.

use crate::llm::LlmConfig;
use crate::resolver::DEFAULT_CONFIDENCE_THRESHOLD;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default configuration file name.
pub const CONFIG_FILE: &str = ".aira.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Model settings.
    #[serde(default)]
    pub model: ModelConfig,

    /// Column resolution settings.
    #[serde(default)]
    pub resolver: ResolverConfig,

    /// Literature stage settings.
    #[serde(default)]
    pub literature: LiteratureConfig,

    /// Dataset loading settings.
    #[serde(default)]
    pub dataset: DatasetConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Default report file path.
    #[serde(default = "default_output")]
    pub output: String,

    /// Root directory for plots and exports.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output: default_output(),
            output_dir: default_output_dir(),
            verbose: false,
        }
    }
}

fn default_output() -> String {
    "aira_report.md".to_string()
}

fn default_output_dir() -> String {
    "outputs".to_string()
}

/// LLM model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Default model name.
    #[serde(default = "default_model")]
    pub name: String,

    /// Ollama API URL.
    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,

    /// Temperature for generation.
    #[serde(default)]
    pub temperature: f32,

    /// Timeout for each collaborator call, in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Number of retries on connection failure.
    #[serde(default = "default_retries")]
    pub retries: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model(),
            ollama_url: default_ollama_url(),
            temperature: 0.0,
            timeout_seconds: default_timeout(),
            retries: default_retries(),
        }
    }
}

impl ModelConfig {
    pub fn to_llm_config(&self) -> LlmConfig {
        LlmConfig {
            ollama_url: self.ollama_url.clone(),
            model_name: self.name.clone(),
            temperature: self.temperature,
            timeout_seconds: self.timeout_seconds,
            retries: self.retries,
        }
    }
}

fn default_model() -> String {
    "llama3.2:latest".to_string()
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_timeout() -> u64 {
    120
}

fn default_retries() -> usize {
    2
}

/// Column resolution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Minimum score for lexical and semantic matches.
    #[serde(default = "default_threshold")]
    pub confidence_threshold: f64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_threshold(),
        }
    }
}

fn default_threshold() -> f64 {
    DEFAULT_CONFIDENCE_THRESHOLD
}

/// Literature stage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiteratureConfig {
    /// NCBI E-utilities base URL.
    #[serde(default = "default_pubmed_url")]
    pub pubmed_url: String,

    /// arXiv export API query URL.
    #[serde(default = "default_arxiv_url")]
    pub arxiv_url: String,

    /// Articles requested per source.
    #[serde(default = "default_max_results")]
    pub max_results: usize,

    /// Tone used when the plan does not name one.
    #[serde(default = "default_tone")]
    pub default_tone: String,

    /// Target length used when the plan does not name one.
    #[serde(default = "default_word_count")]
    pub default_word_count: u32,
}

impl Default for LiteratureConfig {
    fn default() -> Self {
        Self {
            pubmed_url: default_pubmed_url(),
            arxiv_url: default_arxiv_url(),
            max_results: default_max_results(),
            default_tone: default_tone(),
            default_word_count: default_word_count(),
        }
    }
}

fn default_pubmed_url() -> String {
    "https://eutils.ncbi.nlm.nih.gov/entrez/eutils".to_string()
}

fn default_arxiv_url() -> String {
    "https://export.arxiv.org/api/query".to_string()
}

fn default_max_results() -> usize {
    5
}

fn default_tone() -> String {
    "formal".to_string()
}

fn default_word_count() -> u32 {
    500
}

/// Dataset loading settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// Largest accepted upload, in megabytes.
    #[serde(default = "default_max_file_size_mb")]
    pub max_file_size_mb: u64,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            max_file_size_mb: default_max_file_size_mb(),
        }
    }
}

fn default_max_file_size_mb() -> u64 {
    50
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings, but only
    /// when they were given explicitly.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref model) = args.model {
            self.model.name = model.clone();
        }
        if let Some(ref url) = args.ollama_url {
            self.model.ollama_url = url.clone();
        }
        if let Some(temperature) = args.temperature {
            self.model.temperature = temperature;
        }
        if let Some(timeout) = args.timeout {
            self.model.timeout_seconds = timeout;
        }
        if let Some(threshold) = args.threshold {
            self.resolver.confidence_threshold = threshold;
        }
        if let Some(ref output) = args.output {
            self.general.output = output.display().to_string();
        }
        if let Some(ref dir) = args.output_dir {
            self.general.output_dir = dir.display().to_string();
        }

        // Flags always override
        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Check ranges after the file and CLI values are merged.
    pub fn validate(&self) -> Result<()> {
        let threshold = self.resolver.confidence_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            bail!(
                "resolver.confidence_threshold must be between 0.0 and 1.0, got {}",
                threshold
            );
        }
        if !(0.0..=1.0).contains(&self.model.temperature) {
            bail!(
                "model.temperature must be between 0.0 and 1.0, got {}",
                self.model.temperature
            );
        }
        if self.model.timeout_seconds == 0 {
            bail!("model.timeout_seconds must be at least 1");
        }
        Ok(())
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Args;
    use clap::Parser;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.model.name, "llama3.2:latest");
        assert_eq!(config.resolver.confidence_threshold, 0.65);
        assert_eq!(config.literature.max_results, 5);
        assert_eq!(config.dataset.max_file_size_mb, 50);
        assert_eq!(config.general.output_dir, "outputs");
    }

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
[general]
output = "custom_report.md"
verbose = true

[model]
name = "qwen2.5:14b"
temperature = 0.2

[resolver]
confidence_threshold = 0.8

[literature]
default_tone = "casual"
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert_eq!(config.general.output, "custom_report.md");
        assert!(config.general.verbose);
        assert_eq!(config.model.name, "qwen2.5:14b");
        assert_eq!(config.model.temperature, 0.2);
        assert_eq!(config.model.timeout_seconds, 120);
        assert_eq!(config.resolver.confidence_threshold, 0.8);
        assert_eq!(config.literature.default_tone, "casual");
        assert_eq!(config.literature.default_word_count, 500);
    }

    #[test]
    fn test_merge_only_explicit_args() {
        let mut config: Config = toml::from_str("[model]\nname = \"from-file\"\n").unwrap();
        let args = Args::try_parse_from(["aira", "hi", "--threshold", "0.5"]).unwrap();
        config.merge_with_args(&args);
        assert_eq!(config.resolver.confidence_threshold, 0.5);
        if args.model.is_none() {
            assert_eq!(config.model.name, "from-file");
        }
    }

    #[test]
    fn test_validate_rejects_out_of_range_file_values() {
        assert!(Config::default().validate().is_ok());

        let config: Config = toml::from_str("[resolver]\nconfidence_threshold = 1.5\n").unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("confidence_threshold"));

        let config: Config = toml::from_str("[resolver]\nconfidence_threshold = -0.1\n").unwrap();
        assert!(config.validate().is_err());

        let config: Config = toml::from_str("[model]\ntimeout_seconds = 0\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_cli_threshold_repairs_bad_file_value() {
        let mut config: Config =
            toml::from_str("[resolver]\nconfidence_threshold = 1.5\n").unwrap();
        let args = Args::try_parse_from(["aira", "hi", "--threshold", "0.7"]).unwrap();
        config.merge_with_args(&args);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_toml_round_trips() {
        let toml_str = Config::default_toml();
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[resolver]"));

        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(CONFIG_FILE);
        std::fs::write(&path, &toml_str).unwrap();
        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.literature.pubmed_url, Config::default().literature.pubmed_url);
        assert_eq!(loaded.literature.arxiv_url, "https://export.arxiv.org/api/query");
    }
}

//! Configuration for the graph builder, the model client and chat
//!
//! Loads configuration from config.yml file; `${VAR}` values and a handful of
//! well-known environment variables are resolved at load time.

use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::chat::ChatConfig;
use crate::graph::{EdgeCutoff, EdgeMethod, ExtractorConfig, NodeScope, WeightingMethod};
use crate::integrations::openai::{DEFAULT_MODEL, DEFAULT_TIMEOUT_SECS};
use crate::integrations::OpenAIClient;
use crate::{Error, Result};

pub const CONFIG_FILE: &str = "config.yml";
/// Edge cap applied by `build`; 0 keeps every edge.
pub const DEFAULT_MAX_EDGES: usize = 0;

/// YAML config structures
#[derive(Debug, Default, Deserialize)]
struct YamlConfig {
    llm: Option<YamlLlm>,
    graph: Option<YamlGraph>,
    semantic: Option<ExtractorConfig>,
    chat: Option<ChatConfig>,
}

#[derive(Debug, Default, Deserialize)]
struct YamlLlm {
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct YamlGraph {
    edge_method: Option<EdgeMethod>,
    node_scope: Option<NodeScope>,
    weighting: Option<WeightingMethod>,
    edge_weight_cutoff: Option<EdgeCutoff>,
    max_edges: Option<usize>,
    communities: Option<bool>,
    use_standardized_vocabulary: Option<bool>,
}

/// Chat-completion endpoint settings.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmSettings {
    pub api_key: String,
    /// Empty means the public OpenAI endpoint
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
}

/// Graph construction defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphSettings {
    pub edge_method: EdgeMethod,
    pub node_scope: NodeScope,
    pub weighting: WeightingMethod,
    pub edge_weight_cutoff: EdgeCutoff,
    pub max_edges: usize,
    pub communities: bool,
    pub use_standardized_vocabulary: bool,
}

impl Default for GraphSettings {
    fn default() -> Self {
        Self {
            edge_method: EdgeMethod::CoOccurrence,
            node_scope: NodeScope::All,
            weighting: WeightingMethod::Frequency,
            edge_weight_cutoff: EdgeCutoff::default(),
            max_edges: DEFAULT_MAX_EDGES,
            communities: false,
            use_standardized_vocabulary: false,
        }
    }
}

/// Main configuration struct
#[derive(Debug, Clone)]
pub struct Config {
    pub llm: LlmSettings,
    pub graph: GraphSettings,
    pub semantic: ExtractorConfig,
    pub chat: ChatConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    /// Load configuration from config.yml or use defaults
    /// Environment variables take precedence over config.yml values
    pub fn new() -> Self {
        Self::load_from_file(CONFIG_FILE)
            .or_else(|_| Self::load_from_file(format!("../{}", CONFIG_FILE)))
            .unwrap_or_else(|_| Self::from_defaults())
    }

    /// Built-in defaults plus environment overrides.
    pub fn from_defaults() -> Self {
        Self::load_dotenv();
        Self::from_yaml(YamlConfig::default())
    }

    /// Resolve a value: prefer env var if config value looks like ${VAR}
    fn resolve_env_string(value: Option<String>, env_key: &str) -> String {
        if let Some(ref v) = value {
            if v.starts_with("${") && v.ends_with('}') {
                let var_name = &v[2..v.len() - 1];
                if let Ok(env_val) = std::env::var(var_name) {
                    return env_val;
                }
            }
        }
        // explicit env_key as fallback
        if let Ok(env_val) = std::env::var(env_key) {
            if !env_val.trim().is_empty() {
                return env_val;
            }
        }
        match value {
            Some(v) if v.starts_with("${") => String::new(),
            Some(v) => v,
            None => String::new(),
        }
    }

    /// Load .env file into environment variables using dotenvy
    fn load_dotenv() {
        if dotenvy::dotenv().is_err() {
            let _ = dotenvy::from_filename("../.env");
        }
    }

    /// Load configuration from a specific file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::load_dotenv();

        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::Configuration(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        let yaml: YamlConfig = serde_yaml::from_str(&content)
            .map_err(|e| Error::Configuration(format!("Failed to parse config file: {}", e)))?;

        Ok(Self::from_yaml(yaml))
    }

    fn from_yaml(yaml: YamlConfig) -> Self {
        let llm = yaml.llm.unwrap_or_default();
        let graph = yaml.graph.unwrap_or_default();
        let defaults = GraphSettings::default();

        let model = Self::resolve_env_string(llm.model, "OPENAI_MODEL");

        Self {
            llm: LlmSettings {
                api_key: Self::resolve_env_string(llm.api_key, "OPENAI_API_KEY"),
                base_url: Self::resolve_env_string(llm.base_url, "OPENAI_BASE_URL"),
                model: if model.is_empty() {
                    DEFAULT_MODEL.to_string()
                } else {
                    model
                },
                timeout_secs: llm.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
            },
            graph: GraphSettings {
                edge_method: graph.edge_method.unwrap_or(defaults.edge_method),
                node_scope: graph.node_scope.unwrap_or(defaults.node_scope),
                weighting: graph.weighting.unwrap_or(defaults.weighting),
                edge_weight_cutoff: graph
                    .edge_weight_cutoff
                    .unwrap_or(defaults.edge_weight_cutoff),
                max_edges: graph.max_edges.unwrap_or(defaults.max_edges),
                communities: graph.communities.unwrap_or(defaults.communities),
                use_standardized_vocabulary: graph
                    .use_standardized_vocabulary
                    .unwrap_or(defaults.use_standardized_vocabulary),
            },
            semantic: yaml.semantic.unwrap_or_default(),
            chat: yaml.chat.unwrap_or_default(),
        }
    }

    /// Client for the configured chat-completion endpoint.
    pub fn openai_client(&self) -> Result<OpenAIClient> {
        let mut client = OpenAIClient::new(self.llm.api_key.clone())?
            .with_model(self.llm.model.clone())
            .with_timeout(self.llm.timeout_secs)?;
        if !self.llm.base_url.is_empty() {
            client = client.with_base_url(self.llm.base_url.clone());
        }
        Ok(client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{LazyLock, Mutex};

    static ENV_LOCK: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

    struct EnvGuard {
        key: String,
        original: Option<String>,
    }

    impl EnvGuard {
        fn set(key: &str, value: &str) -> Self {
            let original = std::env::var(key).ok();
            std::env::set_var(key, value);
            Self {
                key: key.to_string(),
                original,
            }
        }

        fn unset(key: &str) -> Self {
            let original = std::env::var(key).ok();
            std::env::remove_var(key);
            Self {
                key: key.to_string(),
                original,
            }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            match &self.original {
                Some(value) => std::env::set_var(&self.key, value),
                None => std::env::remove_var(&self.key),
            }
        }
    }

    fn set_envs(vars: &[(&str, &str)]) -> Vec<EnvGuard> {
        vars.iter().map(|(k, v)| EnvGuard::set(k, v)).collect()
    }

    fn clear_llm_env() -> Vec<EnvGuard> {
        ["OPENAI_API_KEY", "OPENAI_BASE_URL", "OPENAI_MODEL"]
            .iter()
            .map(|k| EnvGuard::unset(k))
            .collect()
    }

    fn write_config(name: &str, yaml: &str) -> tempfile::TempPath {
        let file = tempfile::Builder::new()
            .prefix(name)
            .suffix(".yml")
            .tempfile()
            .unwrap();
        std::fs::write(file.path(), yaml).unwrap();
        file.into_temp_path()
    }

    #[test]
    fn test_defaults_without_file() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guards = clear_llm_env();

        let config = Config::from_yaml(YamlConfig::default());
        assert_eq!(config.llm.model, DEFAULT_MODEL);
        assert_eq!(config.llm.timeout_secs, 180);
        assert_eq!(config.graph, GraphSettings::default());
        assert_eq!(config.semantic, ExtractorConfig::default());
        assert_eq!(config.chat.max_history, 10);
    }

    #[test]
    fn test_load_from_yaml() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guards = clear_llm_env();

        let path = write_config(
            "full",
            r#"
llm:
  api_key: "sk-test"
  base_url: "http://localhost:8000/v1"
  model: "llama3"
  timeout_secs: 60
graph:
  edge_method: semantic
  node_scope: standardized
  weighting: npmi
  edge_weight_cutoff: [1.5, 10]
  max_edges: 250
  communities: true
semantic:
  confidence_threshold: 0.7
  max_workers: 3
chat:
  max_history: 6
"#,
        );

        let config = Config::load_from_file(&path).unwrap();

        assert_eq!(config.llm.api_key, "sk-test");
        assert_eq!(config.llm.base_url, "http://localhost:8000/v1");
        assert_eq!(config.llm.model, "llama3");
        assert_eq!(config.llm.timeout_secs, 60);
        assert_eq!(config.graph.edge_method, EdgeMethod::Semantic);
        assert_eq!(config.graph.node_scope, NodeScope::Standardized);
        assert_eq!(config.graph.weighting, WeightingMethod::Npmi);
        assert_eq!(config.graph.edge_weight_cutoff, EdgeCutoff::Range(1.5, 10.0));
        assert_eq!(config.graph.max_edges, 250);
        assert!(config.graph.communities);
        assert_eq!(config.semantic.confidence_threshold, 0.7);
        assert_eq!(config.semantic.max_workers, 3);
        // unspecified fields keep their defaults
        assert_eq!(config.semantic.max_tokens, 1500);
        assert_eq!(config.chat.max_history, 6);
        assert_eq!(config.chat.top_k, 5);
    }

    #[test]
    fn test_scalar_cutoff_is_a_floor() {
        let path = write_config("floor", "graph:\n  edge_weight_cutoff: 2\n");
        let config = Config::load_from_file(&path).unwrap();
        assert_eq!(config.graph.edge_weight_cutoff, EdgeCutoff::Floor(2.0));
    }

    #[test]
    fn env_placeholders_are_resolved_from_environment() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _cleared = clear_llm_env();
        let _guards = set_envs(&[("MY_LLM_KEY", "key_from_env")]);

        let path = write_config("placeholder", "llm:\n  api_key: \"${MY_LLM_KEY}\"\n");
        let config = Config::load_from_file(&path).unwrap();

        assert_eq!(config.llm.api_key, "key_from_env");
    }

    #[test]
    fn unresolved_placeholder_becomes_empty() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _cleared = clear_llm_env();

        let path = write_config("unresolved", "llm:\n  api_key: \"${SURELY_NOT_SET_12345}\"\n");
        let config = Config::load_from_file(&path).unwrap();

        assert!(config.llm.api_key.is_empty());
        assert!(config.openai_client().is_err());
    }

    #[test]
    fn explicit_env_vars_override_yaml_strings() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guards = set_envs(&[
            ("OPENAI_API_KEY", "env-key"),
            ("OPENAI_MODEL", "env-model"),
            ("OPENAI_BASE_URL", "http://env:1234/v1"),
        ]);

        let path = write_config(
            "override",
            "llm:\n  api_key: yaml-key\n  model: yaml-model\n  base_url: http://yaml/v1\n",
        );
        let config = Config::load_from_file(&path).unwrap();

        assert_eq!(config.llm.api_key, "env-key");
        assert_eq!(config.llm.model, "env-model");

        let client = config.openai_client().unwrap();
        assert_eq!(client.model(), "env-model");
        assert_eq!(client.base_url(), "http://env:1234/v1");
    }

    #[test]
    fn load_from_file_fails_on_missing_file() {
        let result = Config::load_from_file("/nonexistent/path/config.yml");
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn load_from_file_fails_on_invalid_yaml() {
        let path = write_config("invalid", "{ invalid yaml [");
        assert!(Config::load_from_file(&path).is_err());
    }

    #[test]
    fn load_from_file_fails_on_unknown_edge_method() {
        let path = write_config("bad_method", "graph:\n  edge_method: telepathy\n");
        assert!(Config::load_from_file(&path).is_err());
    }
}

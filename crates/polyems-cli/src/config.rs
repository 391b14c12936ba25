use anyhow::{Context, Result};
use polyems_core::SamplingParams;
use polyems_core::providers::router::DEFAULT_CODER_MODEL;
use polyems_core::providers::{google, huggingface, openai, openai_compat};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, warn};

/// Embedded fallback used when no config file exists
pub const DEFAULT_CONFIG: &str = include_str!("../../../config/default.toml");

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolyemsConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub sampling: SamplingConfig,
    #[serde(default)]
    pub client: ClientConfig,
}

// ── Server ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// The single browser origin allowed by CORS
    #[serde(default = "default_allowed_origin")]
    pub allowed_origin: String,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    3000
}
fn default_allowed_origin() -> String {
    polyems_gateway::DEFAULT_ALLOWED_ORIGIN.to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            allowed_origin: default_allowed_origin(),
        }
    }
}

// ── Providers ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default = "default_groq")]
    pub groq: ProviderEndpoint,
    #[serde(default = "default_openai")]
    pub openai: ProviderEndpoint,
    #[serde(default = "default_google")]
    pub google: ProviderEndpoint,
    #[serde(default = "default_huggingface")]
    pub huggingface: ProviderEndpoint,
    /// Upper bound on any single upstream call; unset means wait indefinitely
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            groq: default_groq(),
            openai: default_openai(),
            google: default_google(),
            huggingface: default_huggingface(),
            request_timeout_secs: None,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderEndpoint {
    #[serde(default)]
    pub api_key: String,
    pub base_url: String,
}

impl std::fmt::Debug for ProviderEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderEndpoint")
            .field("api_key", &mask_secret(&self.api_key))
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl ProviderEndpoint {
    fn with_base(base_url: &str) -> Self {
        Self {
            api_key: String::new(),
            base_url: base_url.to_string(),
        }
    }

    /// Same endpoint with the key replaced by its masked form
    pub fn masked(&self) -> Self {
        Self {
            api_key: mask_secret(&self.api_key),
            base_url: self.base_url.clone(),
        }
    }
}

fn default_groq() -> ProviderEndpoint {
    ProviderEndpoint::with_base(openai_compat::GROQ_BASE_URL)
}
fn default_openai() -> ProviderEndpoint {
    ProviderEndpoint::with_base(openai::DEFAULT_BASE_URL)
}
fn default_google() -> ProviderEndpoint {
    ProviderEndpoint::with_base(google::DEFAULT_BASE_URL)
}
fn default_huggingface() -> ProviderEndpoint {
    ProviderEndpoint::with_base(huggingface::DEFAULT_BASE_URL)
}

// ── Routing ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Model name the client sends to reach the streaming coder route
    #[serde(default = "default_coder_model")]
    pub coder_model: String,
    /// Repository id actually requested from HuggingFace
    #[serde(default = "default_coder_upstream_model")]
    pub coder_upstream_model: String,
    /// Model the backup route always uses
    #[serde(default = "default_backup_model")]
    pub backup_model: String,
    #[serde(default = "default_vision_model")]
    pub vision_model: String,
}

fn default_coder_model() -> String {
    DEFAULT_CODER_MODEL.to_string()
}
fn default_coder_upstream_model() -> String {
    format!("Qwen/{}", DEFAULT_CODER_MODEL)
}
fn default_backup_model() -> String {
    "llama-3.1-8b-instant".to_string()
}
fn default_vision_model() -> String {
    "llama-3.2-11b-vision-preview".to_string()
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            coder_model: default_coder_model(),
            coder_upstream_model: default_coder_upstream_model(),
            backup_model: default_backup_model(),
            vision_model: default_vision_model(),
        }
    }
}

// ── Sampling ────────────────────────────────────────────────────

/// Operator-set sampling per route. Callers cannot override these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingConfig {
    #[serde(default = "SamplingParams::chat")]
    pub chat: SamplingParams,
    #[serde(default = "SamplingParams::chat")]
    pub openai: SamplingParams,
    #[serde(default = "SamplingParams::coder")]
    pub coder: SamplingParams,
    /// Empty by default, so Gemini applies its own defaults
    #[serde(default)]
    pub gemini: SamplingParams,
    #[serde(default = "SamplingParams::vision")]
    pub vision: SamplingParams,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            chat: SamplingParams::chat(),
            openai: SamplingParams::chat(),
            coder: SamplingParams::coder(),
            gemini: SamplingParams::default(),
            vision: SamplingParams::vision(),
        }
    }
}

// ── Client ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_gateway_url")]
    pub gateway_url: String,
    #[serde(default = "default_primary_path")]
    pub primary_path: String,
    #[serde(default = "default_backup_path")]
    pub backup_path: String,
    #[serde(default = "default_model")]
    pub default_model: String,
    #[serde(default)]
    pub system_prompt: String,
    /// Supports a leading `~/`
    #[serde(default = "default_history_file")]
    pub history_file: String,
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

fn default_gateway_url() -> String {
    "http://localhost:3000".to_string()
}
fn default_primary_path() -> String {
    polyems_core::protocol::routes::CHAT.to_string()
}
fn default_backup_path() -> String {
    polyems_core::protocol::routes::CHAT_BACKUP.to_string()
}
fn default_model() -> String {
    polyems_client::DEFAULT_MODEL.to_string()
}
fn default_history_file() -> String {
    "~/.polyems/chat_history.json".to_string()
}
fn default_history_limit() -> usize {
    polyems_client::DEFAULT_HISTORY_LIMIT
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            gateway_url: default_gateway_url(),
            primary_path: default_primary_path(),
            backup_path: default_backup_path(),
            default_model: default_model(),
            system_prompt: String::new(),
            history_file: default_history_file(),
            history_limit: default_history_limit(),
        }
    }
}

/// Mask a secret for display. Shows the first 3 and last 4 chars of keys
/// longer than 7 chars, otherwise "***".
pub fn mask_secret(s: &str) -> String {
    if s.is_empty() {
        return "(empty)".to_string();
    }
    let chars: Vec<char> = s.chars().collect();
    if chars.len() > 7 {
        let prefix: String = chars[..3].iter().collect();
        let suffix: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", prefix, suffix)
    } else {
        "***".to_string()
    }
}

pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".polyems")
}

/// Expand a leading `~/` against the home directory
pub fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(rest),
        None => PathBuf::from(path),
    }
}

impl PolyemsConfig {
    /// Read `--config`, else `~/.polyems/config.toml`, else the embedded
    /// default. An explicit path that does not exist is an error.
    pub fn load(custom_path: &Option<PathBuf>) -> Result<Self> {
        let path = custom_path
            .clone()
            .unwrap_or_else(|| config_dir().join("config.toml"));

        let content = if path.exists() {
            check_permissions(&path)?;
            std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config at {}", path.display()))?
        } else if custom_path.is_some() {
            anyhow::bail!("Config file {} does not exist", path.display());
        } else {
            debug!("No config at {}, using built-in defaults", path.display());
            DEFAULT_CONFIG.to_string()
        };

        for line in hardcoded_key_lines(&content) {
            warn!(
                "API key is hardcoded in config file (line {}). For security, reference an environment variable such as ${{GROQ_API_KEY}}",
                line
            );
        }

        let mut config = Self::parse(&content)
            .with_context(|| format!("Failed to parse config at {}", path.display()))?;
        config.apply_port_override(std::env::var("PORT").ok().as_deref());
        Ok(config)
    }

    /// Expand allowlisted `${VAR}` references, then parse
    pub fn parse(content: &str) -> Result<Self> {
        let expanded = expand_env_vars(content);
        Ok(toml::from_str(&expanded)?)
    }

    fn apply_port_override(&mut self, port: Option<&str>) {
        let Some(raw) = port.filter(|p| !p.trim().is_empty()) else {
            return;
        };
        match raw.trim().parse::<u16>() {
            Ok(port) => self.server.port = port,
            Err(_) => warn!("Ignoring invalid PORT value '{}'", raw),
        }
    }

    /// Copy safe to print: every API key masked
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        copy.providers.groq = self.providers.groq.masked();
        copy.providers.openai = self.providers.openai.masked();
        copy.providers.google = self.providers.google.masked();
        copy.providers.huggingface = self.providers.huggingface.masked();
        copy
    }
}

/// 1-based line numbers of `api_key` entries holding a literal value
fn hardcoded_key_lines(content: &str) -> Vec<usize> {
    content
        .lines()
        .enumerate()
        .filter_map(|(i, line)| {
            let (key, value) = line.split_once('=')?;
            let value = value.trim().trim_matches('"');
            (key.trim() == "api_key" && !value.is_empty() && !value.contains("${")).then_some(i + 1)
        })
        .collect()
}

/// Refuse config files readable by group or other (Unix only)
fn check_permissions(path: &std::path::Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Ok(metadata) = std::fs::metadata(path) {
            let mode = metadata.permissions().mode();
            if mode & 0o077 != 0 {
                return Err(anyhow::anyhow!(
                    "Config file {:?} has overly permissive permissions ({:o}). \
                     It may contain secrets. Fix with: chmod 600 {:?}",
                    path,
                    mode & 0o777,
                    path
                ));
            }
        }
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

/// Environment variables that may be expanded in config files
const ALLOWED_ENV_VARS: &[&str] = &[
    "GROQ_API_KEY",
    "GEMINI_API_KEY",
    "OPENAI_API_KEY",
    "HF_API_KEY",
    "PORT",
    "HOME",
    "USER",
];

fn expand_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    let mut pos = 0;
    while let Some(start) = result[pos..].find("${") {
        let abs_start = pos + start;
        let Some(end) = result[abs_start..].find('}') else {
            break;
        };
        let var_name = &result[abs_start + 2..abs_start + end];

        if !ALLOWED_ENV_VARS.contains(&var_name) {
            warn!(
                "Skipping expansion of unrecognized env var '{}' in config (not in allowlist)",
                var_name
            );
            pos = abs_start + end + 1;
            continue;
        }

        let value = std::env::var(var_name).unwrap_or_default();
        result.replace_range(abs_start..abs_start + end + 1, &value);
        pos = abs_start + value.len();
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_default_parses() {
        let cfg = PolyemsConfig::parse(DEFAULT_CONFIG).unwrap();
        assert_eq!(cfg.server.port, 3000);
        assert_eq!(cfg.server.allowed_origin, "http://localhost:5173");
        assert_eq!(cfg.routing.coder_model, "Qwen2.5-Coder-32B-Instruct");
        assert_eq!(cfg.client.backup_path, "/api/chat/v2");
        assert_eq!(cfg.client.history_limit, 10);
        assert_eq!(cfg.sampling.coder.top_p, Some(0.7));
        assert!(cfg.providers.request_timeout_secs.is_none());
    }

    #[test]
    fn test_empty_file_gets_all_defaults() {
        let cfg = PolyemsConfig::parse("").unwrap();
        assert_eq!(cfg.providers.groq.base_url, "https://api.groq.com/openai/v1");
        assert_eq!(cfg.client.default_model, "Llama-3.1-8b-instant");
        assert_eq!(cfg.sampling.vision.max_tokens, Some(2048));
        assert!(cfg.sampling.gemini.is_empty());
    }

    #[test]
    fn test_sampling_override() {
        let cfg = PolyemsConfig::parse(
            r#"
            [sampling.chat]
            temperature = 0.2
            "#,
        )
        .unwrap();
        assert_eq!(cfg.sampling.chat.temperature, Some(0.2));
        assert_eq!(cfg.sampling.chat.max_tokens, None);
        assert_eq!(cfg.sampling.coder, SamplingParams::coder());
    }

    #[test]
    fn test_unlisted_env_var_left_unexpanded() {
        let out = expand_env_vars("key = \"${POLYEMS_NOT_ALLOWED}\"");
        assert_eq!(out, "key = \"${POLYEMS_NOT_ALLOWED}\"");
    }

    #[test]
    fn test_allowed_env_var_expanded() {
        let home = std::env::var("HOME").unwrap_or_default();
        let out = expand_env_vars("dir = \"${HOME}/x\" and ${UNKNOWN}");
        assert_eq!(out, format!("dir = \"{}/x\" and ${{UNKNOWN}}", home));
    }

    #[test]
    fn test_port_override() {
        let mut cfg = PolyemsConfig::default();
        cfg.apply_port_override(Some("8088"));
        assert_eq!(cfg.server.port, 8088);
        cfg.apply_port_override(Some("not-a-port"));
        assert_eq!(cfg.server.port, 8088);
        cfg.apply_port_override(None);
        assert_eq!(cfg.server.port, 8088);
    }

    #[test]
    fn test_hardcoded_key_detection() {
        let content = "[providers.groq]\napi_key = \"${GROQ_API_KEY}\"\n\n[providers.openai]\napi_key = \"sk-abc\"\n[providers.google]\napi_key = \"\"\n";
        assert_eq!(hardcoded_key_lines(content), vec![5]);
    }

    #[test]
    fn test_mask_secret() {
        assert_eq!(mask_secret(""), "(empty)");
        assert_eq!(mask_secret("short"), "***");
        assert_eq!(mask_secret("gsk_abcdefghijkl"), "gsk...ijkl");
    }

    #[test]
    fn test_redacted_hides_keys() {
        let mut cfg = PolyemsConfig::default();
        cfg.providers.openai.api_key = "sk-live-1234567890".to_string();
        let shown = toml::to_string(&cfg.redacted()).unwrap();
        assert!(!shown.contains("sk-live-1234567890"));
        assert!(format!("{:?}", cfg.providers.openai).contains("sk-...7890"));
    }

    #[test]
    fn test_missing_explicit_path_errors() {
        let tmp = tempfile::TempDir::new().unwrap();
        let missing = Some(tmp.path().join("nope.toml"));
        assert!(PolyemsConfig::load(&missing).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_world_readable_config_refused() {
        use std::os::unix::fs::PermissionsExt;
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();
        assert!(PolyemsConfig::load(&Some(path.clone())).is_err());

        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600)).unwrap();
        assert!(PolyemsConfig::load(&Some(path)).is_ok());
    }
}

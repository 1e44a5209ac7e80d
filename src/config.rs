//! Configuration types for the Homework Helper backend.

use serde::Deserialize;

/// Root configuration for the application.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// LLM vendor configuration.
    pub llm: LlmConfig,
    /// Security-related configuration.
    pub security: SecurityConfig,
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
}

/// LLM vendor API configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    /// Gemini API key.
    pub gemini_api_key: String,
    /// Groq API key.
    pub groq_api_key: String,
    /// Gemini API base URL.
    #[serde(default = "default_gemini_base_url")]
    pub gemini_base_url: String,
    /// Gemini model name.
    #[serde(default = "default_gemini_model")]
    pub gemini_model: String,
    /// Groq API base URL (OpenAI-compatible).
    #[serde(default = "default_groq_base_url")]
    pub groq_base_url: String,
    /// Groq model name.
    #[serde(default = "default_groq_model")]
    pub groq_model: String,
    /// Wall-clock limit for a whole streamed answer, in seconds.
    #[serde(default = "default_answer_timeout_secs")]
    pub answer_timeout_secs: u64,
}

/// Security configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    /// Secret key for JWT token verification.
    pub jwt_secret: String,
    /// Static token guarding the admin surface.
    pub admin_token: String,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_gemini_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_gemini_model() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_groq_base_url() -> String {
    "https://api.groq.com/openai/v1".to_string()
}

fn default_groq_model() -> String {
    "llama-3.3-70b-versatile".to_string()
}

fn default_answer_timeout_secs() -> u64 {
    45
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Expected environment variables:
    /// - `GEMINI_API_KEY`
    /// - `GROQ_API_KEY`
    /// - `GEMINI_BASE_URL` (optional)
    /// - `GEMINI_MODEL` (optional)
    /// - `GROQ_BASE_URL` (optional)
    /// - `GROQ_MODEL` (optional)
    /// - `ANSWER_TIMEOUT_SECS` (optional, defaults to 45)
    /// - `JWT_SECRET`
    /// - `ADMIN_TOKEN`
    /// - `HOST` (optional, defaults to "0.0.0.0")
    /// - `PORT` (optional, defaults to 3000)
    pub fn from_env() -> Result<Self, ConfigError> {
        let llm = LlmConfig {
            gemini_api_key: std::env::var("GEMINI_API_KEY")
                .map_err(|_| ConfigError::MissingEnv("GEMINI_API_KEY"))?,
            groq_api_key: std::env::var("GROQ_API_KEY")
                .map_err(|_| ConfigError::MissingEnv("GROQ_API_KEY"))?,
            gemini_base_url: std::env::var("GEMINI_BASE_URL")
                .unwrap_or_else(|_| default_gemini_base_url()),
            gemini_model: std::env::var("GEMINI_MODEL").unwrap_or_else(|_| default_gemini_model()),
            groq_base_url: std::env::var("GROQ_BASE_URL")
                .unwrap_or_else(|_| default_groq_base_url()),
            groq_model: std::env::var("GROQ_MODEL").unwrap_or_else(|_| default_groq_model()),
            answer_timeout_secs: std::env::var("ANSWER_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_else(default_answer_timeout_secs),
        };

        let security = SecurityConfig {
            jwt_secret: std::env::var("JWT_SECRET")
                .map_err(|_| ConfigError::MissingEnv("JWT_SECRET"))?,
            admin_token: std::env::var("ADMIN_TOKEN")
                .map_err(|_| ConfigError::MissingEnv("ADMIN_TOKEN"))?,
        };

        let server = ServerConfig {
            host: std::env::var("HOST").unwrap_or_else(|_| default_host()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_else(default_port),
        };

        Ok(Self {
            llm,
            security,
            server,
        })
    }
}

/// Configuration loading errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnv(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
    }

    #[test]
    fn test_llm_defaults() {
        assert!(default_gemini_base_url().starts_with("https://"));
        assert!(default_groq_base_url().ends_with("/openai/v1"));
        assert_eq!(default_answer_timeout_secs(), 45);
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::MissingEnv("TEST_VAR");
        assert_eq!(
            err.to_string(),
            "missing required environment variable: TEST_VAR"
        );
    }
}

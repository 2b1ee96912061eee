//! Default values for configuration

/// Default maximum pooled SQLite connections
pub fn default_max_connections() -> u32 {
    5
}

/// Default time to wait on a locked database before giving up
pub fn default_busy_timeout_secs() -> u64 {
    5
}

/// Schema suggestion is opt-in
pub fn default_suggest_enabled() -> bool {
    false
}

/// Default Ollama-compatible endpoint for schema suggestion
pub fn default_suggest_url() -> String {
    std::env::var("FORMGRAPH_SUGGEST_URL").unwrap_or_else(|_| "http://127.0.0.1:11434".to_string())
}

/// Default generation model
pub fn default_suggest_model() -> String {
    "llama2".to_string()
}

/// Low temperature keeps the generated JSON stable
pub fn default_suggest_temperature() -> f32 {
    0.1
}

/// Default request timeout for the suggestion service
pub fn default_suggest_timeout() -> u64 {
    60
}

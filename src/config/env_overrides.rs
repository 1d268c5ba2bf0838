use super::Config;

impl Config {
    pub fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var("COGITO_DATA_DIR")
            && !dir.is_empty()
        {
            self.data_dir = dir;
        }

        if let Ok(raw) = std::env::var("COGITO_MAX_ATTEMPTS")
            && let Ok(attempts) = raw.parse::<u32>()
            && attempts > 0
        {
            self.retry.max_attempts = attempts;
        }

        if let Ok(reply) = std::env::var("COGITO_FALLBACK_REPLY") {
            self.retry.fallback_reply = if reply.is_empty() { None } else { Some(reply) };
        }

        if let Ok(url) = std::env::var("COGITO_PROVIDER_URL")
            && !url.is_empty()
        {
            self.provider.base_url = url;
        }

        if let Ok(key) = std::env::var("COGITO_API_KEY").or_else(|_| std::env::var("API_KEY"))
            && !key.is_empty()
        {
            self.provider.api_key = Some(key);
        }

        if let Ok(model) = std::env::var("COGITO_MODEL")
            && !model.is_empty()
        {
            self.provider.model = Some(model);
        }
    }
}

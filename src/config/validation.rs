use crate::config::types::{Config, CrawlConfig, EngineConfig, HttpConfig, SeedEntry};
use crate::{ConfigError, ConfigResult};
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_crawl_config(&config.crawl)?;
    validate_http_config(&config.http)?;
    validate_engine_config(&config.engine)?;
    validate_seeds(&config.seeds)?;
    Ok(())
}

fn validate_crawl_config(config: &CrawlConfig) -> ConfigResult<()> {
    // politeness_delay_ms >= 0 is always true for u64, so no check needed

    if let Some(depth) = config.max_depth {
        if depth < 0 {
            return Err(ConfigError::Validation(format!(
                "max-depth must not be negative, got {depth}"
            )));
        }
    }

    Ok(())
}

fn validate_http_config(config: &HttpConfig) -> ConfigResult<()> {
    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user-agent cannot be empty".to_string(),
        ));
    }

    if config.socket_timeout_ms < 1000 || config.connect_timeout_ms < 1000 {
        return Err(ConfigError::Validation(format!(
            "timeouts must be at least 1000ms, got socket {}ms / connect {}ms",
            config.socket_timeout_ms, config.connect_timeout_ms
        )));
    }

    if config.max_download_size < 1024 {
        return Err(ConfigError::Validation(format!(
            "max-download-size must be at least 1024 bytes, got {}",
            config.max_download_size
        )));
    }

    Ok(())
}

fn validate_engine_config(config: &EngineConfig) -> ConfigResult<()> {
    if config.workers < 1 {
        return Err(ConfigError::Validation(format!(
            "workers must be at least 1, got {}",
            config.workers
        )));
    }

    Ok(())
}

fn validate_seeds(seeds: &[SeedEntry]) -> ConfigResult<()> {
    for seed in seeds {
        let url = Url::parse(&seed.url).map_err(|e| {
            ConfigError::Validation(format!("invalid seed URL '{}': {e}", seed.url))
        })?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::Validation(format!(
                "seed URL '{}' must use the http or https scheme",
                seed.url
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_zero_workers_rejected() {
        let mut config = Config::default();
        config.engine.workers = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_empty_user_agent_rejected() {
        let mut config = Config::default();
        config.http.user_agent = "  ".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_tiny_download_limit_rejected() {
        let mut config = Config::default();
        config.http.max_download_size = 512;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_short_timeout_rejected() {
        let mut config = Config::default();
        config.http.socket_timeout_ms = 500;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_negative_max_depth_rejected() {
        let mut config = Config::default();
        config.crawl.max_depth = Some(-1);
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_bad_seed_url_rejected() {
        let mut config = Config::default();
        config.seeds.push(SeedEntry {
            url: "ftp://example.com/".to_string(),
            doc_id: None,
        });
        assert!(validate(&config).is_err());
    }
}

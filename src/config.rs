use std::env;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://stockfellow.db?mode=rwc";

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub max_connections: u32,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
            max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .unwrap_or(5),
        })
    }

    /// In-memory SQLite lives and dies with its connection, so it gets exactly one.
    pub fn is_in_memory(&self) -> bool {
        self.database_url.contains(":memory:") || self.database_url.contains("mode=memory")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_in_memory_urls() {
        let config = Config {
            database_url: "sqlite::memory:".to_string(),
            max_connections: 5,
        };
        assert!(config.is_in_memory());

        let config = Config {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: 5,
        };
        assert!(!config.is_in_memory());
    }
}

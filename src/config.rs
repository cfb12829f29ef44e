use std::env;
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub tick: Duration,
    pub rust_log: String,
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            tick: crate::timer::DEFAULT_TICK,
            rust_log: "info".to_string(),
            log_format: LogFormat::Json,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        let defaults = Self::default();

        let host = env::var("BACKEND_HOST").unwrap_or(defaults.host);
        let port = env::var("BACKEND_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.port);
        let tick = env::var("TIMER_TICK_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
            .unwrap_or(defaults.tick);
        let rust_log = env::var("RUST_LOG").unwrap_or(defaults.rust_log);
        let log_format = match env::var("LOG_FORMAT").as_deref() {
            Ok("pretty") | Ok("text") => LogFormat::Pretty,
            _ => LogFormat::Json,
        };

        Self {
            host,
            port,
            tick,
            rust_log,
            log_format,
        }
    }

    pub fn addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_addr_parses() {
        let config = Config::default();
        assert_eq!(config.addr().unwrap().port(), 8080);
        assert_eq!(config.tick, Duration::from_secs(1));
    }
}

use std::time::Duration;

use serde::Deserialize;

use oekaki_core::room::{MAX_ROOM_MEMBERS, ScoringRule};

/// Top-level server configuration, loaded from `oekaki.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub limits: LimitsConfig,
    pub rooms: RoomsConfig,
    pub rounds: RoundsConfig,
    pub scoring: ScoringConfig,
    pub prompts: PromptsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            limits: LimitsConfig::default(),
            rooms: RoomsConfig::default(),
            rounds: RoundsConfig::default(),
            scoring: ScoringConfig::default(),
            prompts: PromptsConfig::default(),
        }
    }
}

/// Infrastructure limits (subscriber caps, buffer sizes, input lengths).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_sse_subscribers: usize,
    pub broadcast_capacity: usize,
    pub max_guess_chars: usize,
    pub request_timeout_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_sse_subscribers: 500,
            broadcast_capacity: 1024,
            max_guess_chars: oekaki_core::guess::MAX_GUESS_CHARS,
            request_timeout_secs: 10,
        }
    }
}

/// Room lifecycle configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RoomsConfig {
    pub default_max_players: u8,
    /// Whether guests may join once the game has started.
    pub allow_join_in_progress: bool,
    /// Countdown before a room left with only its host is force-ended.
    pub disband_delay_secs: u64,
    pub idle_timeout_secs: u64,
    pub idle_check_interval_secs: u64,
}

impl Default for RoomsConfig {
    fn default() -> Self {
        Self {
            default_max_players: MAX_ROOM_MEMBERS,
            allow_join_in_progress: false,
            disband_delay_secs: 5,
            idle_timeout_secs: 3600,
            idle_check_interval_secs: 60,
        }
    }
}

/// Round timing configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RoundsConfig {
    /// Pause between a round concluding and the next one starting.
    pub result_delay_ms: u64,
    /// Run a background driver per room that advances rounds on deadline.
    pub auto_advance: bool,
    pub max_rounds: u8,
    pub min_round_time_sec: u16,
    pub max_round_time_sec: u16,
}

impl Default for RoundsConfig {
    fn default() -> Self {
        Self {
            result_delay_ms: 5000,
            auto_advance: true,
            max_rounds: 20,
            min_round_time_sec: 10,
            max_round_time_sec: 300,
        }
    }
}

impl RoundsConfig {
    pub fn result_delay(&self) -> Duration {
        Duration::from_millis(self.result_delay_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub guesser_points: u32,
    pub drawer_points: u32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        let rule = ScoringRule::default();
        Self {
            guesser_points: rule.guesser_points,
            drawer_points: rule.drawer_points,
        }
    }
}

impl ScoringConfig {
    pub fn rule(&self) -> ScoringRule {
        ScoringRule {
            guesser_points: self.guesser_points,
            drawer_points: self.drawer_points,
        }
    }
}

/// Prompt catalog configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PromptsConfig {
    /// Optional TOML file with extra prompts, merged into the built-in catalog.
    pub extra_file: Option<String>,
    /// Drop the built-in catalog and use only `extra_file`.
    pub replace_builtin: bool,
}

impl ServerConfig {
    /// Check invariants the rest of the server relies on.
    pub fn validate(&self) -> Result<(), String> {
        if self.listen_addr.parse::<std::net::SocketAddr>().is_err() {
            return Err(format!(
                "listen_addr is not a valid socket address: {}",
                self.listen_addr
            ));
        }
        if self.limits.max_sse_subscribers == 0 {
            return Err("limits.max_sse_subscribers must be > 0".into());
        }
        if self.limits.broadcast_capacity == 0 {
            return Err("limits.broadcast_capacity must be > 0".into());
        }
        if self.limits.max_guess_chars == 0 {
            return Err("limits.max_guess_chars must be > 0".into());
        }
        if self.rooms.default_max_players < 2 || self.rooms.default_max_players > MAX_ROOM_MEMBERS {
            return Err(format!(
                "rooms.default_max_players must be within 2..={MAX_ROOM_MEMBERS}"
            ));
        }
        if self.rooms.idle_timeout_secs == 0 {
            return Err("rooms.idle_timeout_secs must be > 0".into());
        }
        if self.rooms.idle_check_interval_secs == 0 {
            return Err("rooms.idle_check_interval_secs must be > 0".into());
        }
        if self.rounds.max_rounds == 0 {
            return Err("rounds.max_rounds must be > 0".into());
        }
        if self.rounds.min_round_time_sec == 0
            || self.rounds.min_round_time_sec > self.rounds.max_round_time_sec
        {
            return Err("rounds.min_round_time_sec must be > 0 and <= max_round_time_sec".into());
        }
        if self.prompts.replace_builtin && self.prompts.extra_file.is_none() {
            return Err("prompts.replace_builtin requires prompts.extra_file".into());
        }
        if self.scoring.guesser_points == 0 {
            tracing::warn!("scoring.guesser_points is 0, correct guesses award nothing");
        }
        Ok(())
    }

    /// Load config from `oekaki.toml` if it exists, then apply env var overrides.
    pub fn load() -> Self {
        let path = std::env::var("OEKAKI_CONFIG").unwrap_or_else(|_| "oekaki.toml".to_string());
        let mut config = match std::fs::read_to_string(&path) {
            Ok(content) => match toml::from_str::<ServerConfig>(&content) {
                Ok(cfg) => {
                    tracing::info!(path = %path, "Loaded configuration");
                    cfg
                },
                Err(e) => {
                    tracing::warn!(path = %path, "Failed to parse config: {e}, using defaults");
                    ServerConfig::default()
                },
            },
            Err(_) => {
                tracing::info!(path = %path, "No config file found, using defaults");
                ServerConfig::default()
            },
        };

        if let Ok(addr) = std::env::var("OEKAKI_LISTEN_ADDR")
            && !addr.is_empty()
        {
            config.listen_addr = addr;
        }
        if let Ok(val) = std::env::var("OEKAKI_ALLOW_JOIN_IN_PROGRESS")
            && let Ok(b) = val.parse::<bool>()
        {
            config.rooms.allow_join_in_progress = b;
        }
        if let Ok(val) = std::env::var("OEKAKI_IDLE_TIMEOUT_SECS")
            && let Ok(n) = val.parse::<u64>()
        {
            config.rooms.idle_timeout_secs = n;
        }
        if let Ok(val) = std::env::var("OEKAKI_RESULT_DELAY_MS")
            && let Ok(n) = val.parse::<u64>()
        {
            config.rounds.result_delay_ms = n;
        }
        if let Ok(val) = std::env::var("OEKAKI_AUTO_ADVANCE")
            && let Ok(b) = val.parse::<bool>()
        {
            config.rounds.auto_advance = b;
        }
        if let Ok(val) = std::env::var("OEKAKI_MAX_SSE_SUBSCRIBERS")
            && let Ok(n) = val.parse::<usize>()
        {
            config.limits.max_sse_subscribers = n;
        }
        if let Ok(path) = std::env::var("OEKAKI_PROMPTS_FILE")
            && !path.is_empty()
        {
            config.prompts.extra_file = Some(path);
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.listen_addr, "0.0.0.0:8080");
        assert_eq!(cfg.rooms.default_max_players, 20);
        assert!(!cfg.rooms.allow_join_in_progress);
        assert_eq!(cfg.rooms.disband_delay_secs, 5);
        assert_eq!(cfg.rounds.result_delay(), Duration::from_secs(5));
        assert_eq!(cfg.scoring.rule(), ScoringRule::default());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn parse_full_toml() {
        let toml_str = r#"
listen_addr = "127.0.0.1:9090"

[limits]
max_sse_subscribers = 50
max_guess_chars = 32

[rooms]
allow_join_in_progress = true
disband_delay_secs = 10

[rounds]
result_delay_ms = 3000
auto_advance = false
max_rounds = 10

[scoring]
guesser_points = 1
drawer_points = 1

[prompts]
extra_file = "prompts.toml"
"#;
        let cfg: ServerConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.listen_addr, "127.0.0.1:9090");
        assert_eq!(cfg.limits.max_sse_subscribers, 50);
        assert_eq!(cfg.limits.max_guess_chars, 32);
        assert!(cfg.rooms.allow_join_in_progress);
        assert_eq!(cfg.rooms.disband_delay_secs, 10);
        assert_eq!(cfg.rounds.result_delay_ms, 3000);
        assert!(!cfg.rounds.auto_advance);
        assert_eq!(cfg.rounds.max_rounds, 10);
        assert_eq!(cfg.scoring.guesser_points, 1);
        assert_eq!(cfg.prompts.extra_file.as_deref(), Some("prompts.toml"));
        // Untouched fields keep their defaults.
        assert_eq!(cfg.rooms.idle_timeout_secs, 3600);
        assert_eq!(cfg.rounds.max_round_time_sec, 300);
    }

    #[test]
    fn validate_rejects_invalid_addr() {
        let cfg = ServerConfig {
            listen_addr: "not-an-address".to_string(),
            ..ServerConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_oversized_rooms() {
        let mut cfg = ServerConfig::default();
        cfg.rooms.default_max_players = 21;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_inverted_round_time_bounds() {
        let mut cfg = ServerConfig::default();
        cfg.rounds.min_round_time_sec = 400;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_requires_file_when_replacing_builtin_prompts() {
        let mut cfg = ServerConfig::default();
        cfg.prompts.replace_builtin = true;
        assert!(cfg.validate().is_err());
        cfg.prompts.extra_file = Some("p.toml".into());
        assert!(cfg.validate().is_ok());
    }
}

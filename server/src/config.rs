use eightball_shared::config::PhysicsParams;
use eightball_shared::state::Table;
use std::env;
use std::time::Duration;

/// Per-match tuning handed to every room.
#[derive(Debug, Clone)]
pub struct MatchConfig {
    pub table: Table,
    pub physics: PhysicsParams,
    /// Simulated seconds advanced per tick
    pub physics_dt: f64,
    /// Wall-clock spacing between ticks
    pub tick_interval: Duration,
    /// How long a dropped seat is held before the match is forfeited
    pub reconnect_grace: Duration,
    /// Cue ball speed at full power (m/s)
    pub max_shot_speed: f64,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            table: Table::default(),
            physics: PhysicsParams::default(),
            physics_dt: 1.0 / 120.0,
            tick_interval: Duration::from_millis(8),
            reconnect_grace: Duration::from_secs(20),
            max_shot_speed: 7.0,
        }
    }
}

impl MatchConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.table.validate()?;
        self.physics.validate()?;
        if !self.physics_dt.is_finite() || self.physics_dt <= 0.0 {
            return Err("physics_dt must be finite and > 0".to_string());
        }
        if self.tick_interval.is_zero() {
            return Err("tick_interval must be > 0".to_string());
        }
        if !self.max_shot_speed.is_finite() || self.max_shot_speed <= 0.0 {
            return Err("max_shot_speed must be finite and > 0".to_string());
        }
        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: String,
    /// Lobby command queue depth
    pub lobby_channel_capacity: usize,
    /// Per-room command queue depth
    pub room_channel_capacity: usize,
    /// Outbound messages buffered per connection before dropping
    pub outbound_capacity: usize,
    pub match_config: MatchConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:3001".to_string(),
            lobby_channel_capacity: 256,
            room_channel_capacity: 64,
            outbound_capacity: 256,
            match_config: MatchConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Defaults overlaid with `LISTEN_ADDR`, `TICK_INTERVAL_MS` and
    /// `RECONNECT_GRACE_SECS`. Unparseable values keep the default.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(addr) = env::var("LISTEN_ADDR") {
            config.listen_addr = addr;
        }
        if let Some(ms) = env::var("TICK_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
        {
            config.match_config.tick_interval = Duration::from_millis(ms);
        }
        if let Some(secs) = env::var("RECONNECT_GRACE_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
        {
            config.match_config.reconnect_grace = Duration::from_secs(secs);
        }
        config
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.listen_addr.is_empty() {
            return Err("listen_addr must not be empty".to_string());
        }
        if self.lobby_channel_capacity == 0
            || self.room_channel_capacity == 0
            || self.outbound_capacity == 0
        {
            return Err("channel capacities must be > 0".to_string());
        }
        self.match_config.validate()
    }
}

//! Runtime configuration read from the environment.

use crate::logic::TieBreakPolicy;
use crate::models::{ArenaId, PointsRule};
use uuid::Uuid;

/// Settings handed to the tournament service.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EngineConfig {
    pub tie_break: TieBreakPolicy,
    /// Randomized pairing passes tried before keeping the one with the fewest repeats.
    pub pairing_attempts: usize,
    pub points: PointsRule,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tie_break: TieBreakPolicy::Random,
            pairing_attempts: 200,
            points: PointsRule::default(),
        }
    }
}

/// Full application configuration (web binary).
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// Tenant used when a request does not name one.
    pub default_arena: ArenaId,
    pub engine: EngineConfig,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl AppConfig {
    /// Read `HOST`, `PORT`, `DEFAULT_ARENA`, `TIE_BREAK` and `PAIRING_ATTEMPTS`.
    /// Missing or unparsable values fall back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let engine_default = EngineConfig::default();
        let tie_break = match get("TIE_BREAK").map(|v| v.parse::<TieBreakPolicy>()) {
            Some(Ok(p)) => p,
            Some(Err(e)) => {
                log::warn!("{e}; using {:?}", engine_default.tie_break);
                engine_default.tie_break
            }
            None => engine_default.tie_break,
        };
        Self {
            host: get("HOST").unwrap_or_else(default_host),
            port: get("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or_else(default_port),
            default_arena: get("DEFAULT_ARENA")
                .and_then(|a| Uuid::parse_str(&a).ok())
                .unwrap_or(Uuid::nil()),
            engine: EngineConfig {
                tie_break,
                pairing_attempts: get("PAIRING_ATTEMPTS")
                    .and_then(|a| a.parse().ok())
                    .unwrap_or(engine_default.pairing_attempts),
                points: engine_default.points,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn reads_values_and_falls_back() {
        let env: HashMap<&str, &str> = [("PORT", "9090"), ("TIE_BREAK", "deterministic"), ("PAIRING_ATTEMPTS", "x")]
            .into_iter()
            .collect();
        let c = AppConfig::from_lookup(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(c.host, "0.0.0.0");
        assert_eq!(c.port, 9090);
        assert_eq!(c.engine.tie_break, TieBreakPolicy::Deterministic);
        assert_eq!(c.engine.pairing_attempts, 200);
        assert!(c.default_arena.is_nil());
    }
}

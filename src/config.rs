//! Node configuration: TOML file with command-line overrides.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::warn;

const DEFAULT_CONFIG_PATH: &str = "config/warpgrid.toml";

/// Simulation settings for one node.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Global grid width in cells.
    pub global_width: i32,
    /// Global grid height in cells.
    pub global_height: i32,
    /// Turn horizon: the node halts after this many turns.
    pub turns: i32,
    /// Milliseconds between turn ticks; zero runs unpaced.
    pub turn_interval_ms: u64,
    /// Agents placed along the left column before the first turn
    /// (server role only).
    pub agents: i32,
    /// Percent chance an agent hops to a neighbor each turn; zero keeps
    /// every agent stationary.
    pub restlessness: u8,
    /// Seed for the node's deterministic per-cell RNG streams.
    pub seed: u64,
    /// Address the first node listens on for a joiner.
    pub listen: String,
    /// Address of a running node to join; set by `--join`, never by file.
    #[serde(skip)]
    pub join: Option<String>,
    /// Checkpoint retention window in turns; zero keeps every checkpoint.
    pub retention: i32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            global_width: 10,
            global_height: 10,
            turns: 20,
            turn_interval_ms: 1000,
            agents: 10,
            restlessness: 0,
            seed: 0x5eed,
            listen: "127.0.0.1:1234".to_string(),
            join: None,
            retention: 0,
        }
    }
}

impl SimConfig {
    /// Load the config file (or defaults) and apply CLI overrides.
    pub fn load(cli: CliOptions) -> Self {
        let path = cli
            .config
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
        let mut config = Self::load_from_path(&path);
        cli.apply(&mut config);
        config
    }

    /// Load configuration from an explicit path, falling back to defaults
    /// on errors.
    fn load_from_path(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<SimConfig>(&contents) {
                Ok(config) => config,
                Err(err) => {
                    warn!("Failed to parse {}: {err}. Using defaults", path.display());
                    SimConfig::default()
                }
            },
            Err(_) => SimConfig::default(),
        }
    }
}

/// Command-line flags; each one overrides the corresponding file setting.
#[derive(Debug, Default)]
pub struct CliOptions {
    /// Alternate config file path.
    pub config: Option<PathBuf>,
    /// Join a running node instead of listening.
    pub join: Option<String>,
    /// Listen address override.
    pub listen: Option<String>,
    /// Turn horizon override.
    pub turns: Option<i32>,
    /// Initial agent count override.
    pub agents: Option<i32>,
    /// RNG seed override.
    pub seed: Option<u64>,
    /// Turn interval override.
    pub turn_interval_ms: Option<u64>,
}

impl CliOptions {
    /// Parse flags from an argument iterator (program name excluded).
    pub fn parse<I>(mut args: I) -> Result<Self>
    where
        I: Iterator<Item = String>,
    {
        let mut options = Self::default();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" => {
                    options.config = Some(PathBuf::from(required(&mut args, "--config")?));
                }
                "--join" => options.join = Some(required(&mut args, "--join")?),
                "--listen" => options.listen = Some(required(&mut args, "--listen")?),
                "--turns" => {
                    options.turns = Some(
                        required(&mut args, "--turns")?
                            .parse()
                            .context("--turns expects a number")?,
                    );
                }
                "--agents" => {
                    options.agents = Some(
                        required(&mut args, "--agents")?
                            .parse()
                            .context("--agents expects a number")?,
                    );
                }
                "--seed" => {
                    options.seed = Some(
                        required(&mut args, "--seed")?
                            .parse()
                            .context("--seed expects a number")?,
                    );
                }
                "--turn-interval-ms" => {
                    options.turn_interval_ms = Some(
                        required(&mut args, "--turn-interval-ms")?
                            .parse()
                            .context("--turn-interval-ms expects a number")?,
                    );
                }
                other => bail!("unknown option {other}"),
            }
        }
        Ok(options)
    }

    fn apply(self, config: &mut SimConfig) {
        if let Some(join) = self.join {
            config.join = Some(join);
        }
        if let Some(listen) = self.listen {
            config.listen = listen;
        }
        if let Some(turns) = self.turns {
            config.turns = turns;
        }
        if let Some(agents) = self.agents {
            config.agents = agents;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(interval) = self.turn_interval_ms {
            config.turn_interval_ms = interval;
        }
    }
}

fn required<I>(args: &mut I, flag: &str) -> Result<String>
where
    I: Iterator<Item = String>,
{
    args.next()
        .with_context(|| format!("{flag} expects a value"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<CliOptions> {
        CliOptions::parse(args.iter().map(|s| s.to_string()))
    }

    #[test]
    fn flags_override_file_settings() {
        let cli = parse(&["--join", "10.0.0.2:1234", "--turns", "8", "--seed", "42"])
            .expect("parse");
        let mut config = SimConfig::default();
        cli.apply(&mut config);
        assert_eq!(config.join.as_deref(), Some("10.0.0.2:1234"));
        assert_eq!(config.turns, 8);
        assert_eq!(config.seed, 42);
        assert_eq!(config.global_width, 10);
    }

    #[test]
    fn unknown_flags_are_rejected() {
        assert!(parse(&["--bogus"]).is_err());
        assert!(parse(&["--turns"]).is_err());
        assert!(parse(&["--turns", "many"]).is_err());
    }

    #[test]
    fn toml_settings_deserialize_with_defaults() {
        let config: SimConfig =
            toml::from_str("turns = 5\nlisten = \"0.0.0.0:9000\"").expect("toml");
        assert_eq!(config.turns, 5);
        assert_eq!(config.listen, "0.0.0.0:9000");
        assert_eq!(config.global_height, 10);
        assert!(config.join.is_none());
    }
}

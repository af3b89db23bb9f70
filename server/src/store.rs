//! The persisted settings and win-list file.
//!
//! One directive per line, the first token naming it. The file is read at
//! startup and on reload, and rewritten whenever a game resolves.

use log::{debug, info, warn};
use shared::{GameConfig, WinList};
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

const FILE_NAME: &str = ".tetrinet";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {0}: {1}")]
    Read(PathBuf, io::Error),

    #[error("Failed to write {0}: {1}")]
    Write(PathBuf, io::Error),

    #[error("Invalid game settings: {0}")]
    Frequencies(&'static str),
}

/// Everything the store holds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerSettings {
    pub config: GameConfig,
    pub winlist: WinList,
    /// Advertise games played alongside points.
    pub linux_mode: bool,
    pub ipv6_only: bool,
}

fn number<T: FromStr>(token: Option<&str>) -> Option<T> {
    token?.trim().parse().ok()
}

fn fill_weights<'a>(weights: &mut [u32], tokens: impl Iterator<Item = &'a str>) {
    for (weight, token) in weights.iter_mut().zip(tokens) {
        if let Ok(value) = token.trim().parse() {
            *weight = value;
        }
    }
}

impl ServerSettings {
    /// Parses store text over the defaults. Unknown directives and values
    /// that do not parse leave the default in place.
    pub fn parse(text: &str) -> Self {
        let mut settings = Self::default();
        for line in text.lines() {
            let mut tokens = line.split(' ').filter(|t| !t.is_empty());
            let Some(directive) = tokens.next() else {
                continue;
            };
            let config = &mut settings.config;
            match directive {
                "winlist" => settings.winlist = WinList::from_saved(tokens),
                "classic" => apply(&mut config.old_mode, number::<i64>(tokens.next()).map(|v| v != 0)),
                "initiallevel" => apply(&mut config.initial_level, number(tokens.next())),
                "linesperlevel" => apply(&mut config.lines_per_level, number(tokens.next())),
                "levelinc" => apply(&mut config.level_inc, number(tokens.next())),
                "averagelevels" => apply(
                    &mut config.level_average,
                    number::<i64>(tokens.next()).map(|v| v != 0),
                ),
                "speciallines" => apply(&mut config.special_lines, number(tokens.next())),
                "specialcount" => apply(&mut config.special_count, number(tokens.next())),
                "specialcapacity" => apply(&mut config.special_capacity, number(tokens.next())),
                "pieces" => fill_weights(&mut config.piece_freq, tokens),
                "specials" => fill_weights(&mut config.special_freq, tokens),
                "linuxmode" => apply(
                    &mut settings.linux_mode,
                    number::<i64>(tokens.next()).map(|v| v != 0),
                ),
                "ipv6_only" => apply(
                    &mut settings.ipv6_only,
                    number::<i64>(tokens.next()).map(|v| v != 0),
                ),
                other => debug!("Ignoring unknown directive {}", other),
            }
        }
        settings
    }

    /// Store text in the order it is always written.
    pub fn render(&self) -> String {
        let c = &self.config;
        let mut out = String::from("winlist");
        for token in self.winlist.saved_tokens() {
            out.push(' ');
            out.push_str(&token);
        }
        out.push('\n');
        out.push_str(&format!("classic {}\n", c.old_mode as u8));
        out.push_str(&format!("initiallevel {}\n", c.initial_level));
        out.push_str(&format!("linesperlevel {}\n", c.lines_per_level));
        out.push_str(&format!("levelinc {}\n", c.level_inc));
        out.push_str(&format!("averagelevels {}\n", c.level_average as u8));
        out.push_str(&format!("speciallines {}\n", c.special_lines));
        out.push_str(&format!("specialcount {}\n", c.special_count));
        out.push_str(&format!("specialcapacity {}\n", c.special_capacity));
        out.push_str(&format!("pieces {}\n", join(&c.piece_freq)));
        out.push_str(&format!("specials {}\n", join(&c.special_freq)));
        out.push_str(&format!("linuxmode {}\n", self.linux_mode as u8));
        out.push_str(&format!("ipv6_only {}\n", self.ipv6_only as u8));
        out
    }

    /// Reports frequency tables that would stop a game from starting.
    pub fn check(&self) -> Result<(), ConfigError> {
        self.config
            .validate()
            .map_err(|table| ConfigError::Frequencies(table.complaint()))
    }
}

fn apply<T>(target: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *target = value;
    }
}

fn join(weights: &[u32]) -> String {
    weights
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Location of the store on disk.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `$HOME/.tetrinet`, or `/etc/.tetrinet` when `HOME` is unset.
    pub fn default_path() -> PathBuf {
        let dir = std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("/etc"));
        dir.join(FILE_NAME)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the store. A missing file yields the defaults.
    pub fn load(&self) -> Result<ServerSettings, ConfigError> {
        match std::fs::read(&self.path) {
            Ok(bytes) => {
                let text: String = bytes.iter().map(|b| *b as char).collect();
                info!("Loaded settings from {}", self.path.display());
                Ok(ServerSettings::parse(&text))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!("No settings at {}, using defaults", self.path.display());
                Ok(ServerSettings::default())
            }
            Err(e) => Err(ConfigError::Read(self.path.clone(), e)),
        }
    }

    pub fn save(&self, settings: &ServerSettings) -> Result<(), ConfigError> {
        let bytes: Vec<u8> = settings
            .render()
            .chars()
            .map(|c| u8::try_from(c).unwrap_or(b'?'))
            .collect();
        std::fs::write(&self.path, bytes).map_err(|e| {
            warn!("Could not save settings to {}: {}", self.path.display(), e);
            ConfigError::Write(self.path.clone(), e)
        })?;
        debug!("Saved settings to {}", self.path.display());
        Ok(())
    }
}

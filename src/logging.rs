use std::collections::HashMap;
use std::io::Write;
use std::str::FromStr;
use log::{info, LevelFilter};
use serde::{Deserialize, Serialize};
use env_logger::{Builder, Target, WriteStyle};
use strum_macros::EnumString;

/// Logging subsystems of playbridge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum LoggingSubsystem {
    /// Daemon bootstrap and console
    Main,
    /// WebSocket connection manager
    Bridge,
    /// Queue, transport state machine and session actor
    Playback,
    /// Publish scheduler, presenter and message record
    Publish,
    Config,
    /// Third-party crates
    #[strum(serialize = "deps", serialize = "dependencies")]
    Deps,
}

impl LoggingSubsystem {
    /// Module prefixes covered by this subsystem, comma separated
    pub fn module_prefix(&self) -> &'static str {
        match self {
            LoggingSubsystem::Main => "playbridge,playbridge_fake_client",
            LoggingSubsystem::Bridge => "playbridge::bridge,playbridge::helpers::remote_process",
            LoggingSubsystem::Playback => "playbridge::players,playbridge::commands,playbridge::helpers::playlist_loader",
            LoggingSubsystem::Publish => "playbridge::helpers::publish_scheduler,playbridge::helpers::presentation,playbridge::helpers::message_store",
            LoggingSubsystem::Config => "playbridge::config",
            LoggingSubsystem::Deps => "tokio_tungstenite,tungstenite,mio",
        }
    }

    pub fn all() -> [LoggingSubsystem; 6] {
        [
            LoggingSubsystem::Main,
            LoggingSubsystem::Bridge,
            LoggingSubsystem::Playback,
            LoggingSubsystem::Publish,
            LoggingSubsystem::Config,
            LoggingSubsystem::Deps,
        ]
    }
}

/// `logging` section of the configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Global log level (off, error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// stdout or stderr
    #[serde(default = "default_target")]
    pub target: String,

    #[serde(default = "default_true")]
    pub timestamps: bool,

    #[serde(default = "default_true")]
    pub colors: bool,

    /// Per-subsystem levels; unknown keys are used as module paths
    #[serde(default)]
    pub subsystems: HashMap<String, String>,

    #[serde(default)]
    pub include_module_path: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_target() -> String {
    "stdout".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
            target: default_target(),
            timestamps: true,
            colors: true,
            subsystems: HashMap::new(),
            include_module_path: false,
        }
    }
}

impl LoggingConfig {
    fn parse_log_level(level: &str) -> LevelFilter {
        LevelFilter::from_str(level).unwrap_or_else(|_| {
            eprintln!("Warning: Unknown log level '{}', defaulting to 'info'", level);
            LevelFilter::Info
        })
    }

    /// Module filters as `(prefix, level)` pairs
    fn module_filters(&self) -> Vec<(String, String)> {
        let mut filters = Vec::new();
        for (name, level) in &self.subsystems {
            match LoggingSubsystem::from_str(name) {
                Ok(subsystem) => {
                    for prefix in subsystem.module_prefix().split(',') {
                        filters.push((prefix.trim().to_string(), level.clone()));
                    }
                }
                Err(_) => filters.push((name.clone(), level.clone())),
            }
        }
        filters.sort();
        filters
    }

    /// Filter in `RUST_LOG` syntax, for display
    pub fn build_filter_string(&self) -> String {
        let mut parts = vec![self.level.clone()];
        parts.extend(self.module_filters().into_iter().map(|(prefix, level)| format!("{}={}", prefix, level)));
        parts.join(",")
    }

    /// Install the global logger
    ///
    /// `RUST_LOG` is parsed first and then refined by this configuration.
    pub fn initialize_logger(&self) -> Result<(), String> {
        let mut builder = Builder::new();
        builder.parse_env("RUST_LOG");
        builder.filter(None, Self::parse_log_level(&self.level));
        for (prefix, level) in self.module_filters() {
            builder.filter(Some(&prefix), Self::parse_log_level(&level));
        }

        builder.write_style(if self.colors { WriteStyle::Auto } else { WriteStyle::Never });
        match self.target.to_lowercase().as_str() {
            "stdout" => builder.target(Target::Stdout),
            "stderr" => builder.target(Target::Stderr),
            other => return Err(format!("Unknown logging target: {}", other)),
        };

        let timestamps = self.timestamps;
        let include_module_path = self.include_module_path;
        builder.format(move |buf, record| {
            if timestamps {
                write!(buf, "[{}] ", chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"))?;
            }
            write!(buf, "[{}] ", record.level())?;
            if include_module_path {
                if let Some(module) = record.module_path() {
                    write!(buf, "[{}] ", module)?;
                }
            }
            writeln!(buf, "{}", record.args())
        });

        builder.try_init().map_err(|e| format!("Failed to initialize logger: {}", e))?;
        info!("Logging initialized with filter: {}", self.build_filter_string());
        Ok(())
    }
}

/// Initialize logging, raising the level to debug for `--debug`/`--verbose`
pub fn initialize_logging(config: Option<&LoggingConfig>, debug: bool) -> Result<(), String> {
    let mut config = config.cloned().unwrap_or_default();
    if debug {
        config.level = "debug".to_string();
    }
    config.initialize_logger()
}

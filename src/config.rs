use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{CommandFactory, Parser, ValueEnum};
use serde::Deserialize;
use tracing::debug;

use crate::error::ConfigError;

pub const DEFAULT_SERVER_NAME: &str = "irc.example.org";
pub const DEFAULT_REDIRECT_PORT: u16 = 6667;
pub const DEFAULT_BOUNCE_PORT: u16 = 6697;
pub const DEFAULT_LINGER_MS: u64 = 1000;

/// Session deadline as a multiple of the linger delay when none is configured.
const SESSION_TIMEOUT_FACTOR: u32 = 5;

/// Command line interface.
#[derive(Parser, Debug, Default)]
#[command(
    name = "irc-redirect",
    about = "Greets IRC clients, points them at another server and disconnects them",
    disable_version_flag = true,
    after_help = "For instance:\n\n  \
        $ irc-redirect --introduction-file=intro.txt --server-name=irc.example.org \
        --target=irc.libera.chat:6669 0.0.0.0:6667\n\n\
        Which will redirect all clients which connect via port 6667 (on all interfaces) \
        to irc.libera.chat on port 6669."
)]
pub struct Cli {
    /// Addresses to listen on (host:port)
    #[arg(value_name = "LISTENER")]
    pub listeners: Vec<String>,

    /// Reads settings from a TOML file; flags take precedence
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Specifies a file to read an introduction (or explanation) message from
    #[arg(long, value_name = "FILE")]
    pub introduction_file: Option<PathBuf>,

    /// Specifies the server's display host name [default: irc.example.org]
    #[arg(long, value_name = "NAME")]
    pub server_name: Option<String>,

    /// Specifies the target server as host[:port] (port defaults to 6667)
    #[arg(long, value_name = "HOST[:PORT]", conflicts_with_all = ["target_host", "target_port"])]
    pub target: Option<String>,

    /// Bounce target host [default: the locally bound address]
    #[arg(long, value_name = "HOST")]
    pub target_host: Option<String>,

    /// Bounce target port [default: 6697]
    #[arg(long, value_name = "PORT")]
    pub target_port: Option<u16>,

    /// Behaviour profile; bounce is implied by --target-host or --target-port
    #[arg(long, value_enum)]
    pub profile: Option<Profile>,

    /// Overrides the profile's line ending
    #[arg(long, value_enum)]
    pub line_ending: Option<LineEnding>,

    /// Delay before closing each connection [default: 1000]
    #[arg(long, value_name = "MS")]
    pub linger_ms: Option<u64>,

    /// Upper bound on a session's lifetime, 0 disables [default: 5 x linger]
    #[arg(long, value_name = "MS")]
    pub session_timeout_ms: Option<u64>,

    /// Maximum number of connections served at once across all listeners [default: unbounded]
    #[arg(long, value_name = "N")]
    pub max_connections: Option<usize>,

    /// Displays the application version number
    #[arg(short = 'V', long)]
    pub version: bool,
}

impl Cli {
    /// Parse arguments, also accepting single-dash long flags such as
    /// `-help`, `-version` or `-target=host:port`.
    pub fn try_parse_args<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        let command = Self::command();
        let longs: Vec<&str> = command
            .get_arguments()
            .filter_map(|arg| arg.get_long())
            .chain(["help"])
            .collect();

        let mut positional_only = false;
        let args: Vec<OsString> = args
            .into_iter()
            .map(Into::into)
            .enumerate()
            .map(|(i, arg): (usize, OsString)| {
                if i == 0 || positional_only {
                    return arg;
                }
                if arg.as_os_str() == "--" {
                    positional_only = true;
                    return arg;
                }
                match arg.to_str().and_then(|s| single_dash_long(s, &longs)) {
                    Some(fixed) => fixed.into(),
                    None => arg,
                }
            })
            .collect();

        Self::try_parse_from(args)
    }
}

/// `-name[=value]` becomes `--name[=value]` when `name` is a known long flag.
fn single_dash_long(arg: &str, longs: &[&str]) -> Option<String> {
    let rest = arg.strip_prefix('-')?;
    if rest.starts_with('-') {
        return None;
    }
    let name = rest.split_once('=').map_or(rest, |(name, _)| name);
    (name.len() > 1 && longs.contains(&name)).then(|| format!("-{}", arg))
}

/// Which of the two redirect behaviours the service follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    /// Explicit `--target`, CRLF line endings, terminal ERROR line.
    Classic,
    /// "Try server" bounce to `--target-host`/`--target-port`, LF line endings.
    Bounce,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LineEnding {
    Crlf,
    Lf,
}

impl LineEnding {
    pub fn as_str(self) -> &'static str {
        match self {
            LineEnding::Crlf => "\r\n",
            LineEnding::Lf => "\n",
        }
    }
}

/// Where clients are sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// `RPL_REDIR` to a configured host.
    Explicit { host: String, port: u16 },
    /// `RPL_BOUNCE`; without a host the session's local address is used.
    Implicit { host: Option<String>, port: u16 },
}

/// Process-wide settings, fixed once the service starts.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub server_name: String,
    pub listeners: Vec<String>,
    pub introduction: Vec<String>,
    pub target: Option<Target>,
    pub line_ending: LineEnding,
    pub linger: Duration,
    pub session_timeout: Option<Duration>,
    pub max_connections: Option<usize>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        let linger = Duration::from_millis(DEFAULT_LINGER_MS);
        Self {
            server_name: DEFAULT_SERVER_NAME.into(),
            listeners: Vec::new(),
            introduction: Vec::new(),
            target: None,
            line_ending: LineEnding::Crlf,
            linger,
            session_timeout: Some(linger * SESSION_TIMEOUT_FACTOR),
            max_connections: None,
        }
    }
}

/// Settings as read from the optional TOML file. Every field may be
/// omitted.
#[derive(Deserialize, Default, Debug)]
#[serde(default)]
pub struct FileConfig {
    pub server_name: Option<String>,
    pub listeners: Vec<String>,
    pub introduction_file: Option<PathBuf>,
    pub target: Option<String>,
    pub target_host: Option<String>,
    pub target_port: Option<u16>,
    pub profile: Option<Profile>,
    pub line_ending: Option<LineEnding>,
    pub linger_ms: Option<u64>,
    pub session_timeout_ms: Option<u64>,
    pub max_connections: Option<usize>,
}

impl FileConfig {
    /// Load settings from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| {
            ConfigError::ReadConfigFile {
                path: path.to_path_buf(),
                source,
            }
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::ParseConfigFile {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Environment variables override file values.
    fn apply_env_overrides<F>(&mut self, env: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = env("REDIRECT_SERVER_NAME") {
            self.server_name = Some(v);
        }
        if let Some(v) = env("REDIRECT_LISTENERS") {
            self.listeners = v
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(v) = env("REDIRECT_TARGET") {
            self.target = Some(v);
        }
        if let Some(v) = env("REDIRECT_INTRODUCTION_FILE") {
            self.introduction_file = Some(v.into());
        }
        if let Some(v) = env("REDIRECT_MAX_CONNECTIONS") {
            let n = v.parse().map_err(|_| ConfigError::InvalidEnv {
                key: "REDIRECT_MAX_CONNECTIONS",
                value: v.clone(),
            })?;
            self.max_connections = Some(n);
        }
        Ok(())
    }

    /// Command line flags take precedence over everything else.
    fn apply_cli(&mut self, cli: Cli) {
        if !cli.listeners.is_empty() {
            self.listeners = cli.listeners;
        }
        if cli.server_name.is_some() {
            self.server_name = cli.server_name;
        }
        if cli.introduction_file.is_some() {
            self.introduction_file = cli.introduction_file;
        }
        if cli.target.is_some() {
            self.target = cli.target;
        }
        if cli.target_host.is_some() {
            self.target_host = cli.target_host;
        }
        if cli.target_port.is_some() {
            self.target_port = cli.target_port;
        }
        if cli.profile.is_some() {
            self.profile = cli.profile;
        }
        if cli.line_ending.is_some() {
            self.line_ending = cli.line_ending;
        }
        if cli.linger_ms.is_some() {
            self.linger_ms = cli.linger_ms;
        }
        if cli.session_timeout_ms.is_some() {
            self.session_timeout_ms = cli.session_timeout_ms;
        }
        if cli.max_connections.is_some() {
            self.max_connections = cli.max_connections;
        }
    }
}

impl ServiceConfig {
    /// Build the configuration from the command line, the optional config
    /// file it names and the process environment.
    pub fn from_cli(cli: Cli) -> Result<Self, ConfigError> {
        Self::resolve(cli, |key| std::env::var(key).ok())
    }

    fn resolve<F>(cli: Cli, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = match cli.config {
            Some(ref path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        settings.apply_env_overrides(env)?;
        settings.apply_cli(cli);
        Self::try_from(settings)
    }
}

impl TryFrom<FileConfig> for ServiceConfig {
    type Error = ConfigError;

    fn try_from(settings: FileConfig) -> Result<Self, Self::Error> {
        if settings.listeners.is_empty() {
            return Err(ConfigError::MissingListener);
        }

        let profile = settings.profile.unwrap_or(
            if settings.target_host.is_some() || settings.target_port.is_some() {
                Profile::Bounce
            } else {
                Profile::Classic
            },
        );

        let target = match profile {
            Profile::Classic => match settings.target {
                Some(ref t) => {
                    let (host, port) = parse_target(t)?;
                    Some(Target::Explicit { host, port })
                }
                None => None,
            },
            Profile::Bounce => {
                if settings.target.is_some() {
                    return Err(ConfigError::ConflictingTarget);
                }
                Some(Target::Implicit {
                    host: settings.target_host.filter(|h| !h.is_empty()),
                    port: settings.target_port.unwrap_or(DEFAULT_BOUNCE_PORT),
                })
            }
        };

        let line_ending = settings.line_ending.unwrap_or(match profile {
            Profile::Classic => LineEnding::Crlf,
            Profile::Bounce => LineEnding::Lf,
        });

        let introduction = match settings.introduction_file {
            Some(ref path) => read_introduction(path)?,
            None => Vec::new(),
        };

        let linger = Duration::from_millis(settings.linger_ms.unwrap_or(DEFAULT_LINGER_MS));
        let session_timeout = match settings.session_timeout_ms {
            Some(0) => None,
            Some(ms) => {
                let timeout = Duration::from_millis(ms);
                if timeout <= linger {
                    return Err(ConfigError::SessionTimeoutTooShort { timeout, linger });
                }
                Some(timeout)
            }
            None => Some(linger * SESSION_TIMEOUT_FACTOR),
        };

        Ok(Self {
            server_name: settings
                .server_name
                .unwrap_or_else(|| DEFAULT_SERVER_NAME.into()),
            listeners: settings.listeners,
            introduction,
            target,
            line_ending,
            linger,
            session_timeout,
            max_connections: settings.max_connections.filter(|&n| n > 0),
        })
    }
}

/// Parse `host[:port]`. Bracketed IPv6 literals (`[::1]:6667`) are
/// accepted; otherwise the first colon separates host and port.
pub fn parse_target(target: &str) -> Result<(String, u16), ConfigError> {
    let (host, port) = if let Some(rest) = target.strip_prefix('[') {
        let (host, after) = rest
            .split_once(']')
            .ok_or_else(|| ConfigError::InvalidTarget(target.into()))?;
        match after {
            "" => (host, None),
            _ => match after.strip_prefix(':') {
                Some(port) => (host, Some(port)),
                None => return Err(ConfigError::InvalidTarget(target.into())),
            },
        }
    } else {
        match target.split_once(':') {
            Some((host, port)) => (host, Some(port)),
            None => (target, None),
        }
    };

    if host.is_empty() {
        return Err(ConfigError::InvalidTarget(target.into()));
    }

    let port = match port {
        Some(p) => p.parse().map_err(|source| ConfigError::InvalidTargetPort {
            value: p.into(),
            source,
        })?,
        None => DEFAULT_REDIRECT_PORT,
    };

    Ok((host.to_string(), port))
}

/// Read the introduction text: carriage returns removed, split on line feed.
pub fn read_introduction(path: &Path) -> Result<Vec<String>, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadIntroduction {
        path: path.to_path_buf(),
        source,
    })?;
    let lines = split_introduction(&text);
    debug!(path = %path.display(), lines = lines.len(), "introduction loaded");
    Ok(lines)
}

/// A trailing newline yields a trailing empty line.
pub fn split_introduction(text: &str) -> Vec<String> {
    text.replace('\r', "").split('\n').map(String::from).collect()
}

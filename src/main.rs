mod cache;
mod catalog;
mod config;
mod error;
mod lastfm;
mod loved;
mod player;
mod protocol;
mod resolver;
mod session;
mod youtube;

use std::io::BufRead;
use std::path::PathBuf;
use std::thread;

use config::{missing_credentials, sanitize_config, Config};
use catalog::{CatalogOrder, Period};
use lastfm::{LastfmClient, LastfmCredentials};
use log::{error, info};
use player::BrowserPlayer;
use protocol::{Message, PlayerMessage, SessionMessage, SessionParams};
use session::SessionManager;
use tokio::sync::broadcast;
use youtube::YoutubeClient;

const AUTH_URL: &str = "https://www.last.fm/api/auth/";

/// One console command, mapped to exactly one bus message (or handled
/// locally for auth/help/quit).
#[derive(Debug, Clone, PartialEq)]
enum Command {
    Start {
        user: Option<String>,
        min_plays: Option<u32>,
        max_plays: Option<u32>,
        period: Option<Period>,
        order: Option<CatalogOrder>,
    },
    Skip,
    Previous,
    ScrobbleAndAdvance,
    ToggleLoop,
    Media(String),
    Done,
    Import(PathBuf),
    Export(PathBuf),
    Auth,
    Help,
    Quit,
}

fn parse_command(line: &str) -> Result<Command, String> {
    let mut words = line.split_whitespace();
    let Some(keyword) = words.next() else {
        return Err("empty command".to_string());
    };
    match keyword {
        "start" => parse_start_overrides(words),
        "skip" | "next" => Ok(Command::Skip),
        "prev" | "previous" => Ok(Command::Previous),
        "scrobble" => Ok(Command::ScrobbleAndAdvance),
        "loop" => Ok(Command::ToggleLoop),
        "media" => {
            let input = words.collect::<Vec<_>>().join(" ");
            player::parse_media_input(&input)
                .map(Command::Media)
                .ok_or_else(|| format!("could not extract a media ID from '{}'", input))
        }
        "done" => Ok(Command::Done),
        "import" => match words.next() {
            Some(path) => Ok(Command::Import(PathBuf::from(path))),
            None => Err("usage: import <path>".to_string()),
        },
        "export" => match words.next() {
            Some(path) => Ok(Command::Export(PathBuf::from(path))),
            None => Err("usage: export <path>".to_string()),
        },
        "auth" => Ok(Command::Auth),
        "help" => Ok(Command::Help),
        "quit" | "exit" => Ok(Command::Quit),
        other => Err(format!("unknown command '{}', try 'help'", other)),
    }
}

fn parse_start_overrides<'a>(words: impl Iterator<Item = &'a str>) -> Result<Command, String> {
    let mut user = None;
    let mut min_plays = None;
    let mut max_plays = None;
    let mut period = None;
    let mut order = None;
    for word in words {
        let (key, value) = word
            .split_once('=')
            .ok_or_else(|| format!("expected key=value, got '{}'", word))?;
        match key {
            "user" => user = Some(value.to_string()),
            "min" => {
                min_plays =
                    Some(value.parse().map_err(|_| format!("bad min '{}'", value))?);
            }
            "max" => {
                max_plays =
                    Some(value.parse().map_err(|_| format!("bad max '{}'", value))?);
            }
            "period" => {
                period = Some(
                    Period::parse(value)
                        .ok_or_else(|| format!("bad period '{}' (7day|1month|3month|6month|12month|overall)", value))?,
                );
            }
            "order" => {
                order = Some(
                    CatalogOrder::parse(value)
                        .ok_or_else(|| format!("bad order '{}' (rank|random)", value))?,
                );
            }
            other => return Err(format!("unknown start option '{}'", other)),
        }
    }
    Ok(Command::Start {
        user,
        min_plays,
        max_plays,
        period,
        order,
    })
}

fn print_help() {
    println!("Commands:");
    println!("  start [user=..] [min=..] [max=..] [period=..] [order=..]");
    println!("        build the catalog and start playback");
    println!("  done             the current track finished playing (scrobbles it)");
    println!("  scrobble         count the current track as played and advance");
    println!("  skip             advance without counting the current track");
    println!("  prev             return to the previous track");
    println!("  loop             toggle repeating the current track");
    println!("  media <id|url>   replace the current track's video");
    println!("  import <path>    merge a cache snapshot file");
    println!("  export <path>    write the merged cache to a file");
    println!("  auth             open the Last.fm authorization page");
    println!("  quit             exit");
}

fn session_params(config: &Config, command: &Command) -> Result<SessionParams, String> {
    let Command::Start {
        user,
        min_plays,
        max_plays,
        period,
        order,
    } = command
    else {
        return Err("not a start command".to_string());
    };
    let user = user
        .clone()
        .unwrap_or_else(|| config.lastfm.username.clone());
    if user.trim().is_empty() {
        return Err("no username: set lastfm.username in the config or pass user=..".to_string());
    }
    let min = min_plays.unwrap_or(config.session.min_plays);
    let max = max_plays.unwrap_or(config.session.max_plays);
    if min > max {
        return Err(format!("min plays ({min}) exceeds max plays ({max})"));
    }
    Ok(SessionParams {
        user,
        min_plays: min,
        max_plays: max,
        period: period.unwrap_or(config.session.period),
        order: order.unwrap_or(config.session.order),
    })
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut clog = colog::default_builder();
    clog.filter(None, log::LevelFilter::Info);
    clog.init();

    std::panic::set_hook(Box::new(|panic_info| {
        let current_thread = std::thread::current();
        let thread_name = current_thread.name().unwrap_or("unnamed");
        log::error!("panic in thread '{}': {}", thread_name, panic_info);
    }));

    let config_dir = dirs::config_dir().ok_or("could not locate a config directory")?;
    let config_file = config_dir.join("shufflefm.toml");

    if !config_file.exists() {
        let default_config = Config::default();
        info!(
            "Config file not found. Creating default config. path={}",
            config_file.display()
        );
        std::fs::write(&config_file, toml::to_string(&default_config)?)?;
    }

    let config_content = std::fs::read_to_string(&config_file)?;
    let config = sanitize_config(toml::from_str::<Config>(&config_content).unwrap_or_default());

    let data_dir = dirs::data_dir()
        .ok_or("could not locate a data directory")?
        .join("shufflefm");
    let local_cache_path = data_dir.join("song_cache.json");

    // Bus for communication between the control loop, the player boundary,
    // and the session actor
    let (bus_sender, _) = broadcast::channel(1024);

    let session_bus_receiver = bus_sender.subscribe();
    let session_config = config.clone();
    let session_thread = thread::spawn(move || {
        let mut session_manager = SessionManager::new(
            session_bus_receiver,
            Box::new(LastfmClient::new(LastfmCredentials {
                api_key: session_config.lastfm.api_key.clone(),
                shared_secret: session_config.lastfm.shared_secret.clone(),
                session_key: session_config.lastfm.session_key.clone(),
            })),
            Box::new(YoutubeClient::new(session_config.youtube.api_key.clone())),
            Box::new(BrowserPlayer),
            session_config.cache.bundled_snapshot.clone(),
            local_cache_path,
        );
        session_manager.run();
    });

    print_help();

    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }
        let command = match parse_command(&line) {
            Ok(command) => command,
            Err(message) => {
                error!("{}", message);
                continue;
            }
        };
        match command {
            Command::Start { .. } => {
                let missing = missing_credentials(&config);
                if !missing.is_empty() {
                    error!(
                        "Missing credentials in {}: {}",
                        config_file.display(),
                        missing.join(", ")
                    );
                    continue;
                }
                match session_params(&config, &command) {
                    Ok(params) => {
                        let _ = bus_sender.send(Message::Session(SessionMessage::Start(params)));
                    }
                    Err(message) => error!("{}", message),
                }
            }
            Command::Skip => {
                let _ = bus_sender.send(Message::Session(SessionMessage::Skip));
            }
            Command::Previous => {
                let _ = bus_sender.send(Message::Session(SessionMessage::Previous));
            }
            Command::ScrobbleAndAdvance => {
                let _ = bus_sender.send(Message::Session(SessionMessage::ScrobbleAndAdvance));
            }
            Command::ToggleLoop => {
                let _ = bus_sender.send(Message::Session(SessionMessage::ToggleLoop));
            }
            Command::Media(media_id) => {
                let _ = bus_sender.send(Message::Session(SessionMessage::OverrideMedia(media_id)));
            }
            Command::Done => {
                let _ = bus_sender.send(Message::Player(PlayerMessage::MediaEnded));
            }
            Command::Import(path) => {
                let _ = bus_sender.send(Message::Session(SessionMessage::ImportCache(path)));
            }
            Command::Export(path) => {
                let _ = bus_sender.send(Message::Session(SessionMessage::ExportCache(path)));
            }
            Command::Auth => {
                if config.lastfm.api_key.trim().is_empty() {
                    error!("Set lastfm.api_key in the config before authorizing");
                    continue;
                }
                let url = format!("{}?api_key={}", AUTH_URL, config.lastfm.api_key);
                if let Err(err) = webbrowser::open(&url) {
                    error!("Could not open {}: {}", url, err);
                }
            }
            Command::Help => print_help(),
            Command::Quit => {
                let _ = bus_sender.send(Message::Session(SessionMessage::Shutdown));
                break;
            }
        }
    }

    let _ = bus_sender.send(Message::Session(SessionMessage::Shutdown));
    drop(bus_sender);
    let _ = session_thread.join();

    info!("Application exiting");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{parse_command, session_params, Command};
    use crate::catalog::{CatalogOrder, Period};
    use crate::config::Config;
    use std::path::PathBuf;

    #[test]
    fn test_parse_simple_commands() {
        assert_eq!(parse_command("skip"), Ok(Command::Skip));
        assert_eq!(parse_command("prev"), Ok(Command::Previous));
        assert_eq!(parse_command("scrobble"), Ok(Command::ScrobbleAndAdvance));
        assert_eq!(parse_command("loop"), Ok(Command::ToggleLoop));
        assert_eq!(parse_command("done"), Ok(Command::Done));
        assert_eq!(parse_command("quit"), Ok(Command::Quit));
        assert_eq!(
            parse_command("import cache.json"),
            Ok(Command::Import(PathBuf::from("cache.json")))
        );
        assert!(parse_command("frobnicate").is_err());
    }

    #[test]
    fn test_parse_start_overrides() {
        let command =
            parse_command("start user=listener min=5 max=100 period=12month order=rank").unwrap();

        assert_eq!(
            command,
            Command::Start {
                user: Some("listener".to_string()),
                min_plays: Some(5),
                max_plays: Some(100),
                period: Some(Period::TwelveMonths),
                order: Some(CatalogOrder::ByRank),
            }
        );
    }

    #[test]
    fn test_parse_start_rejects_bad_values() {
        assert!(parse_command("start min=lots").is_err());
        assert!(parse_command("start period=fortnight").is_err());
        assert!(parse_command("start listener").is_err());
    }

    #[test]
    fn test_media_command_accepts_urls() {
        assert_eq!(
            parse_command("media https://youtu.be/vid123"),
            Ok(Command::Media("vid123".to_string()))
        );
        assert!(parse_command("media").is_err());
    }

    #[test]
    fn test_session_params_fall_back_to_config_defaults() {
        let mut config = Config::default();
        config.lastfm.username = "listener".to_string();
        config.session.min_plays = 3;

        let params = session_params(&config, &parse_command("start").unwrap()).unwrap();

        assert_eq!(params.user, "listener");
        assert_eq!(params.min_plays, 3);
        assert_eq!(params.period, Period::Overall);
        assert_eq!(params.order, CatalogOrder::Random);
    }

    #[test]
    fn test_session_params_require_a_username() {
        let config = Config::default();

        let result = session_params(&config, &parse_command("start").unwrap());

        assert!(result.is_err());
    }

    #[test]
    fn test_session_params_reject_inverted_band() {
        let mut config = Config::default();
        config.lastfm.username = "listener".to_string();

        let result = session_params(&config, &parse_command("start min=10 max=2").unwrap());

        assert!(result.is_err());
    }
}

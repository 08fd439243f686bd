//! Command line argument parsing

use crate::core::state::LoadingFlags;
use crate::utils::config::Settings;
use crate::utils::url::{classify_link, LinkTarget};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

/// Ingest video service listings into playlists and resolve playable streams
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Data API key appended to listing requests
    #[arg(long, value_name = "KEY", default_value = "", global = true)]
    pub api_key: String,

    /// Interface language for titles (hl=)
    #[arg(long, value_name = "LANG", default_value = "en", global = true)]
    pub language: String,

    /// OAuth access token for account operations
    #[arg(long, value_name = "TOKEN", global = true)]
    pub access_token: Option<String>,

    /// Extended configuration file (exclusions, monitored URLs)
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Stop following further pages after this many added items
    #[arg(long, value_name = "N", global = true)]
    pub limit: Option<usize>,

    /// HTTP timeout (e.g., 30s, 1m)
    #[arg(long, value_name = "DURATION", default_value = "30s", global = true)]
    pub timeout: humantime::Duration,

    /// HTTP retries for transient errors
    #[arg(long, default_value = "3", global = true)]
    pub retries: u32,

    /// Override User-Agent header
    #[arg(long, value_name = "USER_AGENT", global = true)]
    pub user_agent: Option<String>,

    /// Proxy URL (http/https/socks)
    #[arg(long, value_name = "URL", global = true)]
    pub proxy: Option<String>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Quiet output (only errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Ingest a channel, playlist or video link and print the tracks
    Resolve {
        /// Service link (/user/, /channel/, list=, watch?v=, youtu.be)
        link: String,

        /// Print the tracks as JSON
        #[arg(long)]
        json: bool,

        /// Use channel titles as the artist
        #[arg(long)]
        channel_titles: bool,

        /// Only read the first page of each listing
        #[arg(long)]
        first_page: bool,
    },

    /// Print the best stream URL of a video
    Stream {
        /// Video id or link
        video: String,
    },

    /// Extract the signature program from a saved player script
    Cipher {
        /// Player script file
        #[arg(long, value_name = "FILE")]
        script: PathBuf,

        /// Scrambled signature to decode with the extracted program
        #[arg(long, value_name = "SIG")]
        signature: Option<String>,
    },
}

impl Args {
    pub fn timeout_duration(&self) -> Duration {
        self.timeout.into()
    }

    pub fn verbosity_level(&self) -> VerbosityLevel {
        if self.quiet {
            VerbosityLevel::Quiet
        } else if self.verbose {
            VerbosityLevel::Verbose
        } else {
            VerbosityLevel::Normal
        }
    }

    /// Runtime settings from the global options
    pub fn settings(&self) -> Settings {
        let mut settings = Settings::default()
            .with_api_key(&self.api_key)
            .with_language(&self.language)
            .with_timeout(self.timeout_duration())
            .with_retries(self.retries);

        if let Some(token) = &self.access_token {
            settings = settings.with_access_token(token);
        }
        if self.limit.is_some() {
            settings = settings.with_stream_limit(self.limit);
        }
        if let Some(proxy) = &self.proxy {
            settings = settings.with_proxy(proxy);
        }
        settings.user_agent = self.user_agent.clone();
        settings
    }

    /// Session flags requested for `resolve`
    pub fn resolve_flags(&self) -> LoadingFlags {
        let mut flags = LoadingFlags::empty();
        if let Command::Resolve {
            channel_titles,
            first_page,
            ..
        } = &self.command
        {
            flags.set(LoadingFlags::ADD_CHANNEL_TITLE, *channel_titles);
            flags.set(LoadingFlags::IGNORE_NEXT_PAGE, *first_page);
        }
        flags
    }
}

/// Output verbosity level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerbosityLevel {
    /// Quiet (only errors)
    Quiet,
    Normal,
    /// Verbose (debug info)
    Verbose,
}

/// Video id from either a bare id or a video link
pub fn video_id_from_input(input: &str) -> String {
    match classify_link(input) {
        Ok(LinkTarget::Video(id)) => id,
        _ => input.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_resolve_command() {
        let args = parse(&[
            "tubelist",
            "resolve",
            "https://www.youtube.com/user/x",
            "--json",
            "--channel-titles",
        ]);
        assert_eq!(
            args.command,
            Command::Resolve {
                link: "https://www.youtube.com/user/x".to_string(),
                json: true,
                channel_titles: true,
                first_page: false,
            }
        );
        assert_eq!(args.resolve_flags(), LoadingFlags::ADD_CHANNEL_TITLE);
    }

    #[test]
    fn test_global_options_after_subcommand() {
        let args = parse(&[
            "tubelist",
            "stream",
            "abc",
            "--api-key",
            "K",
            "--timeout",
            "1m",
            "--limit",
            "20",
            "-v",
        ]);

        let settings = args.settings();
        assert_eq!(settings.api_key, "K");
        assert_eq!(settings.timeout, Duration::from_secs(60));
        assert_eq!(settings.limit_user_stream, Some(20));
        assert!(!settings.is_connected());
        assert_eq!(args.verbosity_level(), VerbosityLevel::Verbose);
        assert!(args.resolve_flags().is_empty());
    }

    #[test]
    fn test_default_values() {
        let args = parse(&["tubelist", "cipher", "--script", "base.js"]);
        assert_eq!(args.timeout_duration(), Duration::from_secs(30));
        assert_eq!(args.retries, 3);
        assert_eq!(args.language, "en");
        assert_eq!(args.verbosity_level(), VerbosityLevel::Normal);
        assert_eq!(args.settings().limit_user_stream, None);
    }

    #[test]
    fn test_missing_subcommand_is_an_error() {
        assert!(Args::try_parse_from(["tubelist"]).is_err());
    }

    #[test]
    fn test_video_id_from_input() {
        assert_eq!(video_id_from_input("https://youtu.be/abc"), "abc");
        assert_eq!(video_id_from_input("https://www.youtube.com/watch?v=xyz"), "xyz");
        assert_eq!(video_id_from_input(" raw_id "), "raw_id");
    }
}

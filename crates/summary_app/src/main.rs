//! summary_app - command-line host for the summary relay.
//!
//! Runs the background multiplexer in-process and drives it through the
//! same port and subscription machinery a UI surface would use.

mod platform;

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use log::LevelFilter;
use summary_core::PageChapter;

use platform::logging::LogDestination;

fn main() -> ExitCode {
    let cli = Cli::parse();
    platform::logging::initialize(cli.log_to, cli.log_level);

    if let Err(err) = platform::run(cli) {
        let _ = writeln!(io::stderr(), "Error: {err:?}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

#[derive(Debug, Parser)]
#[command(
    name = "summary_app",
    author,
    version,
    about = "Summarize, translate and rate video transcripts through the summary relay."
)]
pub(crate) struct Cli {
    /// Relay config file overlaying the defaults
    #[arg(long, global = true, default_value = "relay.ron")]
    pub config: PathBuf,

    /// Directory holding .summary_settings.ron
    #[arg(long, global = true, default_value = ".")]
    pub settings_dir: PathBuf,

    /// Summarization API origin, overriding the config file
    #[arg(long, global = true, env = "SUMMARY_BASE_URL")]
    pub base_url: Option<String>,

    /// Log level (off, error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    pub log_level: LevelFilter,

    /// Where log lines go
    #[arg(long, global = true, value_enum, default_value = "file")]
    pub log_to: LogDestination,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Command {
    /// Stream a summary and print it in the copy format
    Summarize {
        /// Watch page URL or bare video id
        video: String,
        /// Chapter marker from the page, as `<timestamp>=<title>`
        #[arg(long = "chapter", value_parser = parse_page_chapter)]
        chapters: Vec<PageChapter>,
        /// The page reported no transcript
        #[arg(long)]
        no_transcript: bool,
        /// Include chapter timestamps in the output, overriding the stored preference
        #[arg(long)]
        timestamps: Option<bool>,
    },

    /// Translate one summarized chapter
    Translate {
        vid: String,
        cid: String,
        /// Target language code; defaults to the stored preference
        #[arg(long)]
        lang: Option<String>,
    },

    /// Rate summarized chapters
    Feedback {
        vid: String,
        /// Chapter id rated good
        #[arg(long)]
        good: Vec<String>,
        /// Chapter id rated bad
        #[arg(long)]
        bad: Vec<String>,
    },

    /// Show or change stored settings
    Options {
        #[command(subcommand)]
        command: OptionsCommand,
    },
}

#[derive(Debug, Subcommand)]
pub(crate) enum OptionsCommand {
    /// Print every setting
    Show,
    /// Store the OpenAI API key sent with each request
    SetApiKey { key: String },
    /// Forget the stored API key
    ClearApiKey,
    /// Set the translation target language
    SetLang { code: String },
    /// Choose whether copied summaries carry timestamps
    SetCopyTimestamps {
        #[arg(action = clap::ArgAction::Set)]
        enabled: bool,
    },
}

fn parse_page_chapter(raw: &str) -> Result<PageChapter, String> {
    let (timestamp, title) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected <timestamp>=<title>, got {raw:?}"))?;
    let (timestamp, title) = (timestamp.trim(), title.trim());
    if timestamp.is_empty() || title.is_empty() {
        return Err(format!("empty timestamp or title in {raw:?}"));
    }
    Ok(PageChapter {
        title: title.to_string(),
        timestamp: timestamp.to_string(),
    })
}

use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use relay_logging::{relay_debug, relay_info, relay_warn};
use serde_json::Value;
use summary_core::{
    copy_chapters, feedback, parse_video_id, summarize, translate, Envelope, JobKey, Operation,
    PageChapter, SettingKey, TargetLang,
};
use summary_relay::{
    Multiplexer, RelayConfig, SenderInfo, SettingsStore, Subscriber, TabOpener,
};

use super::persistence::{load_relay_config, RonSettingsStore};
use crate::{Cli, Command, OptionsCommand};

/// A terminal has no browser tabs; internal pages are only reported.
struct LogTabOpener;

impl TabOpener for LogTabOpener {
    fn open_tab(&self, url: &str) {
        relay_info!("Internal page requested: {}", url);
        println!("Open {url} in the extension to continue.");
    }
}

struct App {
    config: RelayConfig,
    settings: Arc<RonSettingsStore>,
    mux: Multiplexer,
}

pub(crate) async fn run(cli: Cli) -> Result<()> {
    let mut config = load_relay_config(&cli.config)?;
    if let Some(base_url) = cli.base_url {
        config.base_url = base_url;
    }
    let settings = Arc::new(
        RonSettingsStore::open(cli.settings_dir.clone())
            .with_context(|| format!("opening settings in {}", cli.settings_dir.display()))?,
    );
    let mux = Multiplexer::new(config.clone(), settings.clone(), Arc::new(LogTabOpener))?;
    let app = App {
        config,
        settings,
        mux,
    };

    match cli.command {
        Command::Summarize {
            video,
            chapters,
            no_transcript,
            timestamps,
        } => {
            app.summarize(&video, &chapters, no_transcript, timestamps)
                .await
        }
        Command::Translate { vid, cid, lang } => app.translate(&vid, &cid, lang).await,
        Command::Feedback { vid, good, bad } => app.feedback(&vid, &good, &bad).await,
        Command::Options { command } => app.options(command).await,
    }
}

impl App {
    fn sender(&self) -> SenderInfo {
        SenderInfo::new(self.config.extension_id.clone())
    }

    async fn summarize(
        &self,
        video: &str,
        chapters: &[PageChapter],
        no_transcript: bool,
        timestamps: Option<bool>,
    ) -> Result<()> {
        let vid = resolve_video_id(video)?;
        let with_timestamps = match timestamps {
            Some(value) => value,
            None => self.flag(SettingKey::CopyWithTimestamps).await?,
        };

        let subscriber = Subscriber::new(Arc::new(self.mux.clone()), self.sender());
        let handle = subscriber.subscribe(
            JobKey::new(Operation::Summarize, vid.clone(), 1),
            summarize(&self.config.base_url, &vid, chapters, no_transcript),
        );

        let interrupt = handle.dispose_token();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                relay_warn!("Interrupted; disposing subscription");
                interrupt.cancel();
            }
        });

        let mut updates = handle.updates();
        let progress = tokio::spawn(async move {
            while updates.changed().await.is_ok() {
                let count = updates.borrow().chapters().len();
                relay_debug!("Summary progress: {} chapters", count);
            }
        });

        let view = handle.join().await;
        progress.abort();

        if let Some(error) = view.error {
            bail!("summary failed: {error}");
        }
        if view.no_transcript() {
            println!("No transcript is available for {vid}.");
            return Ok(());
        }
        match copy_chapters(view.chapters(), with_timestamps) {
            Some(text) => {
                println!("<!-- {vid} summarized at {} -->", Utc::now().to_rfc3339());
                println!("{text}");
            }
            None => println!("No summary yet for {vid}."),
        }
        Ok(())
    }

    async fn translate(&self, vid: &str, cid: &str, lang: Option<String>) -> Result<()> {
        let lang = match lang {
            Some(code) => TargetLang::from_code(&code)
                .ok_or_else(|| anyhow!("unknown language code {code:?}"))?,
            None => self.target_lang().await?,
        };
        let request = translate(&self.config.base_url, vid, cid, lang.code());
        let json = self.one_shot(request).await?;
        println!("{}", serde_json::to_string_pretty(&json)?);
        Ok(())
    }

    async fn feedback(&self, vid: &str, good: &[String], bad: &[String]) -> Result<()> {
        if good.is_empty() && bad.is_empty() {
            bail!("nothing to rate; pass --good or --bad");
        }
        self.one_shot(feedback(&self.config.base_url, vid, good, bad))
            .await?;
        println!("Feedback sent for {vid}.");
        Ok(())
    }

    async fn one_shot(&self, request: Envelope) -> Result<Value> {
        match self.mux.send_message(&self.sender(), request).await {
            Envelope::Response {
                response_ok: true,
                response_json,
            } => Ok(response_json.unwrap_or(Value::Null)),
            Envelope::Response {
                response_ok: false,
                response_json,
            } => bail!("request rejected: {}", response_detail(response_json.as_ref())),
            Envelope::Error { error } => bail!("request failed: {error}"),
            other => bail!("unexpected {} envelope", other.kind()),
        }
    }

    async fn options(&self, command: OptionsCommand) -> Result<()> {
        let settings = self.settings.as_ref();
        match command {
            OptionsCommand::Show => {
                for key in SettingKey::ALL {
                    let value = settings.get(key).await?;
                    let shown = match (key, value) {
                        (_, None) => "(unset)".to_string(),
                        (SettingKey::OpenAiApiKey, Some(secret)) => mask(&secret),
                        (_, Some(value)) => value,
                    };
                    println!("{key} = {shown}");
                }
                let lang = self.target_lang().await?;
                println!("# translation target: {}", lang.display_name());
            }
            OptionsCommand::SetApiKey { key } => {
                let key = key.trim();
                if key.is_empty() {
                    bail!("API key is empty; use clear-api-key to remove it");
                }
                settings.set(SettingKey::OpenAiApiKey, key).await?;
                println!("API key stored.");
            }
            OptionsCommand::ClearApiKey => {
                settings.remove(SettingKey::OpenAiApiKey).await?;
                println!("API key cleared.");
            }
            OptionsCommand::SetLang { code } => {
                let lang = TargetLang::from_code(&code)
                    .ok_or_else(|| anyhow!("unknown language code {code:?}"))?;
                settings
                    .set(SettingKey::TranslationTargetLang, lang.code())
                    .await?;
                println!("Translation target set to {}.", lang.display_name());
            }
            OptionsCommand::SetCopyTimestamps { enabled } => {
                settings
                    .set(SettingKey::CopyWithTimestamps, &enabled.to_string())
                    .await?;
                println!("Copy with timestamps: {enabled}.");
            }
        }
        Ok(())
    }

    async fn flag(&self, key: SettingKey) -> Result<bool> {
        Ok(self
            .settings
            .get(key)
            .await?
            .is_some_and(|value| value.trim().eq_ignore_ascii_case("true")))
    }

    async fn target_lang(&self) -> Result<TargetLang> {
        let stored = self.settings.get(SettingKey::TranslationTargetLang).await?;
        Ok(stored
            .as_deref()
            .and_then(TargetLang::from_code)
            .unwrap_or_default())
    }
}

/// Accepts a watch page URL or a bare video id.
fn resolve_video_id(video: &str) -> Result<String> {
    let video = video.trim();
    if video.contains("://") {
        return parse_video_id(video).ok_or_else(|| anyhow!("not a video watch page: {video}"));
    }
    if video.is_empty() {
        bail!("video id is empty");
    }
    Ok(video.to_string())
}

fn response_detail(json: Option<&Value>) -> String {
    json.and_then(|json| {
        json.get("detail")
            .or_else(|| json.get("message"))
            .and_then(Value::as_str)
            .map(str::to_string)
    })
    .unwrap_or_else(|| "no detail".to_string())
}

fn mask(secret: &str) -> String {
    let skip = secret.chars().count().saturating_sub(4);
    let visible: String = secret.chars().skip(skip).collect();
    format!("****{visible}")
}

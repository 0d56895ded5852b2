use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tale_speech::voices::find_voice;
use tale_speech::{
    Emotion, EspeakSynthesizer, PlaybackOutcome, RodioOutput, SpeakOptions, SpeechConfig,
    SpeechManager, SpeechResult,
};

#[derive(Parser)]
#[command(name = "tale")]
#[command(about = "Tale - Danish text-to-speech with caching and local fallback", long_about = None)]
struct Cli {
    /// Path to a TOML config file (default: <config dir>/tale/config.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Bypass the audio cache
    #[arg(long, global = true)]
    no_cache: bool,

    /// Use espeak-ng when the speech service is unavailable
    #[arg(long, global = true)]
    local_fallback: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Speak a single text
    Speak {
        text: String,

        /// Voice catalog index or voice id (see `tale voices`)
        #[arg(short, long)]
        voice: Option<String>,

        /// Speaking rate (0.25 - 4.0)
        #[arg(short, long, conflicts_with = "emotion")]
        rate: Option<f32>,

        /// Emotion tag: calm, happy, serious or encouraging
        #[arg(short, long)]
        emotion: Option<String>,
    },
    /// Speak several texts in order
    Sequence {
        #[arg(required = true)]
        texts: Vec<String>,

        /// Pause between texts in milliseconds
        #[arg(short, long, default_value = "800")]
        delay_ms: u64,
    },
    /// List the voice catalog
    Voices,
    /// Check the API key against the speech service
    TestConnection,
    /// Remove every cached audio entry
    ClearCache,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_deref())?.with_env_overrides();
    if cli.no_cache {
        config = config.with_cache_enabled(false);
    }
    if cli.local_fallback {
        config = config.with_local_fallback(true);
    }
    let manager = build_manager(config)?;

    match cli.command {
        Commands::Speak {
            text,
            voice,
            rate,
            emotion,
        } => {
            let mut options = SpeakOptions::new();
            if let Some(voice) = voice {
                match voice.parse::<usize>() {
                    Ok(index) => {
                        if !manager.set_voice(index).await {
                            anyhow::bail!(
                                "Voice index {} is out of range, run `tale voices` to list voices",
                                index
                            );
                        }
                    }
                    Err(_) => {
                        let profile = find_voice(manager.voices(), &voice).with_context(|| {
                            format!("Unknown voice {}, run `tale voices` to list voices", voice)
                        })?;
                        options = options.with_voice(profile.clone());
                    }
                }
            }
            let outcome = match emotion {
                Some(tag) if options.voice.is_none() => {
                    run_interruptible(&manager, manager.speak_with_emotion(&text, &tag)).await?
                }
                Some(tag) => {
                    let rate = Emotion::from_tag(&tag).speaking_rate();
                    let options = options.with_speaking_rate(rate);
                    run_interruptible(&manager, manager.speak(&text, options)).await?
                }
                None => {
                    if let Some(rate) = rate {
                        options = options.with_speaking_rate(rate);
                    }
                    run_interruptible(&manager, manager.speak(&text, options)).await?
                }
            };
            report(outcome);
        }
        Commands::Sequence { texts, delay_ms } => {
            let delay = Duration::from_millis(delay_ms);
            let outcome =
                run_interruptible(&manager, manager.speak_sequence(&texts, delay)).await?;
            report(outcome);
        }
        Commands::Voices => {
            let current = manager.current_voice().await;
            for (index, voice) in manager.voices().iter().enumerate() {
                let marker = if *voice == current { "*" } else { " " };
                println!("{} {:>2}  {}", marker, index, voice);
            }
        }
        Commands::TestConnection => {
            if manager.test_connection().await {
                println!("Connection OK");
            } else {
                anyhow::bail!("Connection to the speech service failed, see the log for details");
            }
        }
        Commands::ClearCache => {
            let removed = manager.clear_cache().await;
            println!("Removed {} cached entries", removed);
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<SpeechConfig> {
    if let Some(path) = path {
        log::info!("Loading config from {:?}", path);
        return SpeechConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()));
    }

    let default_path = dirs::config_dir().map(|dir| dir.join("tale").join("config.toml"));
    match default_path {
        Some(path) if path.exists() => {
            log::info!("Loading config from {:?}", path);
            SpeechConfig::from_file(&path)
                .with_context(|| format!("Failed to load config from {}", path.display()))
        }
        _ => Ok(SpeechConfig::default()),
    }
}

fn build_manager(mut config: SpeechConfig) -> Result<SpeechManager> {
    if config.cache_dir.is_none() {
        config.cache_dir = Some(
            dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("tale")
                .join("audio"),
        );
    }

    let mut builder = SpeechManager::builder(config).audio_output(Arc::new(RodioOutput::new()));
    match EspeakSynthesizer::detect() {
        Some(espeak) => builder = builder.local_synthesizer(Arc::new(espeak)),
        None => log::debug!("espeak-ng not found, local fallback unavailable"),
    }
    builder.build().context("Failed to build speech manager")
}

/// Drive a playback future, stopping playback on Ctrl-C
async fn run_interruptible<F>(manager: &SpeechManager, playback: F) -> Result<PlaybackOutcome>
where
    F: Future<Output = SpeechResult<PlaybackOutcome>>,
{
    tokio::select! {
        result = playback => Ok(result?),
        _ = tokio::signal::ctrl_c() => {
            log::info!("Interrupted, stopping playback");
            manager.stop().await;
            Ok(PlaybackOutcome::Interrupted)
        }
    }
}

fn report(outcome: PlaybackOutcome) {
    match outcome {
        PlaybackOutcome::Completed => log::debug!("Playback completed"),
        PlaybackOutcome::Interrupted => println!("Playback interrupted"),
        PlaybackOutcome::LocalFallback => println!("Spoken with the local synthesizer"),
    }
}

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, anyhow};
use clap::{Parser, Subcommand};
use tokio::sync::Notify;
use tracing::{error, info, warn};

use waav_usp::{
    ClientConfig, Connection, SessionConfig, UspCallbacks,
    core::usp::{
        SpeechHypothesisMsg, SpeechPhraseMsg, TranslationHypothesisMsg, TranslationPhraseMsg,
        TranslationSynthesisMsg, TurnEndMsg, TurnStartMsg, UserMsg, build_connection_url,
    },
};

/// WaaV USP - streaming speech recognition and translation client
#[derive(Parser, Debug)]
#[command(name = "waav-usp")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Subcommand to run
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Stream a WAV file to the service and print the results
    Recognize {
        /// WAV file to stream
        #[arg(short = 'f', long = "file", value_name = "WAV")]
        file: PathBuf,

        /// Audio sent per segment, in milliseconds
        #[arg(long = "chunk-ms", default_value_t = 100)]
        chunk_ms: u64,
    },

    /// Print the connection URL built from the configuration
    Url,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if it exists (must be done before config loading)
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    // Load configuration from file or environment
    let config = if let Some(config_path) = cli.config {
        info!("Loading configuration from {}", config_path.display());
        ClientConfig::from_file(&config_path).map_err(|e| anyhow!(e.to_string()))?
    } else {
        ClientConfig::from_env().map_err(|e| anyhow!(e.to_string()))?
    };
    let session = config.into_session_config()?;

    match cli.command {
        Commands::Url => {
            println!("{}", build_connection_url(&session));
            Ok(())
        }
        Commands::Recognize { file, chunk_ms } => recognize(session, &file, chunk_ms).await,
    }
}

/// Prints results as they arrive and signals the end of each turn.
#[derive(Default)]
struct ConsoleCallbacks {
    turn_ended: Notify,
}

impl UspCallbacks for ConsoleCallbacks {
    fn on_speech_hypothesis(&self, msg: SpeechHypothesisMsg) {
        info!("hypothesis @{}: {}", msg.offset, msg.text);
    }

    fn on_speech_phrase(&self, msg: SpeechPhraseMsg) {
        println!("[{:?}] {}", msg.recognition_status, msg.display_text);
    }

    fn on_translation_hypothesis(&self, msg: TranslationHypothesisMsg) {
        info!("translation hypothesis: {}", msg.text);
    }

    fn on_translation_phrase(&self, msg: TranslationPhraseMsg) {
        println!("[{:?}] {}", msg.recognition_status, msg.text);
        for (language, text) in &msg.translation.translations {
            println!("  {language}: {text}");
        }
    }

    fn on_translation_synthesis(&self, msg: TranslationSynthesisMsg) {
        info!("received {} bytes of synthesized audio", msg.audio.len());
    }

    fn on_turn_start(&self, msg: TurnStartMsg) {
        info!("turn started, tag={}", msg.context_tag);
    }

    fn on_turn_end(&self, _msg: TurnEndMsg) {
        info!("turn ended");
        self.turn_ended.notify_one();
    }

    fn on_user_message(&self, msg: UserMsg) {
        info!("message on path {} ({} bytes)", msg.path, msg.body.len());
    }

    fn on_error(&self, message: &str) {
        error!("{}", message);
    }
}

async fn recognize(session: SessionConfig, file: &Path, chunk_ms: u64) -> anyhow::Result<()> {
    let chunk_bytes = chunk_size(file, chunk_ms)?;
    let audio = std::fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;

    let callbacks = Arc::new(ConsoleCallbacks::default());
    let connection = Connection::new(session, callbacks.clone())?;
    connection.connect().await?;

    let pace = Duration::from_millis(chunk_ms);
    for chunk in audio.chunks(chunk_bytes) {
        connection.queue_audio_segment(chunk)?;
        tokio::time::sleep(pace).await;
    }
    connection.queue_audio_end()?;
    info!("Sent {} bytes of audio", audio.len());

    tokio::select! {
        _ = callbacks.turn_ended.notified() => {}
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!("Failed to listen for Ctrl-C: {}", e);
            }
            info!("Interrupted");
        }
    }

    connection.shutdown();
    Ok(())
}

/// Bytes of `file` covering `chunk_ms` milliseconds of audio.
fn chunk_size(file: &Path, chunk_ms: u64) -> anyhow::Result<usize> {
    let reader = hound::WavReader::open(file)
        .with_context(|| format!("Failed to open WAV file {}", file.display()))?;
    let spec = reader.spec();
    info!(
        "{}: {} Hz, {} channel(s), {} bit, {} ms",
        file.display(),
        spec.sample_rate,
        spec.channels,
        spec.bits_per_sample,
        u64::from(reader.duration()) * 1000 / u64::from(spec.sample_rate.max(1))
    );

    let bytes_per_second = u64::from(spec.sample_rate)
        * u64::from(spec.channels)
        * u64::from(spec.bits_per_sample / 8);
    let chunk = (bytes_per_second * chunk_ms / 1000).max(1);
    usize::try_from(chunk).map_err(|_| anyhow!("Chunk size {} is too large", chunk))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_wav(path: &Path, sample_rate: u32, samples: usize) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for i in 0..samples {
            writer.write_sample((i % 128) as i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_chunk_size_for_16khz_mono() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("speech.wav");
        write_wav(&path, 16000, 16000);

        // 16000 samples/s * 2 bytes * 0.1 s
        assert_eq!(chunk_size(&path, 100).unwrap(), 3200);
        assert_eq!(chunk_size(&path, 20).unwrap(), 640);
    }

    #[test]
    fn test_chunk_size_rejects_non_wav() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("noise.wav");
        std::fs::write(&path, b"not a wav file").unwrap();

        assert!(chunk_size(&path, 100).is_err());
    }

    #[test]
    fn test_cli_parses_recognize() {
        let cli = Cli::try_parse_from([
            "waav-usp",
            "-c",
            "usp.yaml",
            "recognize",
            "--file",
            "speech.wav",
            "--chunk-ms",
            "40",
        ])
        .unwrap();

        assert_eq!(cli.config, Some(PathBuf::from("usp.yaml")));
        match cli.command {
            Commands::Recognize { file, chunk_ms } => {
                assert_eq!(file, PathBuf::from("speech.wav"));
                assert_eq!(chunk_ms, 40);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}

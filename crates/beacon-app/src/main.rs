//! Beacon application binary - composition root.
//!
//! 1. Parse CLI arguments and load configuration from TOML
//! 2. Open the conversation store (SQLite, or memory with --in-memory)
//! 3. Wire the dialogue backend, speech bridges and location bridge
//! 4. Initialize the session engine and run the interactive loop

mod cli;
mod repl;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use beacon_chat::{EngineParts, HttpDialogueBackend, SessionEngine, VoiceToggle};
use beacon_core::config::SpeechConfig;
use beacon_core::types::Locale;
use beacon_core::BeaconConfig;
use beacon_location::LocationBridge;
use beacon_storage::{Database, MemoryMessageStore, MessageStore, SqliteMessageStore};
use beacon_voice::{
    CommandRecognizer, CommandSynthesizer, SilentSynthesizer, SpeechRecognizer,
    SpeechSynthesizer, UnsupportedRecognizer, VoiceInputBridge, VoiceOutputBridge,
};

use cli::CliArgs;
use repl::Command;

fn open_store(
    config: &BeaconConfig,
    in_memory: bool,
) -> Result<Arc<dyn MessageStore>, Box<dyn std::error::Error>> {
    if in_memory {
        tracing::info!("Conversation kept in memory only");
        return Ok(Arc::new(MemoryMessageStore::new()));
    }

    let data_dir = cli::resolve_data_dir(&config.general.data_dir);
    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        tracing::error!(path = %data_dir.display(), error = %e, "Failed to create data directory");
        return Err(e.into());
    }

    let db_path = data_dir.join("beacon.db");
    let db = Arc::new(Database::new(&db_path)?);
    tracing::info!(path = %db_path.display(), profile = %config.general.profile, "SQLite database opened");
    Ok(Arc::new(SqliteMessageStore::new(db, config.general.profile.clone())))
}

fn speech_bridges(speech: &SpeechConfig) -> (Arc<dyn SpeechRecognizer>, Arc<dyn SpeechSynthesizer>) {
    let recognizer: Arc<dyn SpeechRecognizer> = if speech.stt_command.is_empty() {
        Arc::new(UnsupportedRecognizer)
    } else {
        Arc::new(CommandRecognizer::new(
            speech.stt_command.clone(),
            Duration::from_secs(speech.recognition_timeout_secs.max(1)),
        ))
    };
    let synthesizer: Arc<dyn SpeechSynthesizer> = if speech.tts_command.is_empty() {
        Arc::new(SilentSynthesizer)
    } else {
        Arc::new(CommandSynthesizer::new(speech.tts_command.clone()))
    };
    tracing::info!(
        voice_input = recognizer.is_supported(),
        voice_output = synthesizer.is_supported(),
        "Speech bridges configured"
    );
    (recognizer, synthesizer)
}

fn print_history(engine: &SessionEngine) {
    for message in engine.messages() {
        println!("{}", repl::render_message(&message));
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config.
    let config_file = args.resolve_config_path();
    let mut config = BeaconConfig::load_or_default(&config_file);
    args.apply_overrides(&mut config)?;

    // Tracing goes to stderr so it never interleaves with the conversation.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.general.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Starting Beacon v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(path = %config_file.display(), "Configuration resolved");

    let locale = args.resolve_locale(&config)?;
    let store = open_store(&config, args.in_memory)?;

    let backend = HttpDialogueBackend::from_config(&config.backend)?;
    tracing::info!(endpoint = %backend.endpoint(), model = %backend.model(), "Dialogue backend configured");

    let (recognizer, synthesizer) = speech_bridges(&config.speech);
    let (voice_input, recognition_events) = VoiceInputBridge::new(recognizer);

    let engine = Arc::new(SessionEngine::new(
        EngineParts {
            store,
            backend: Arc::new(backend),
            voice_input,
            voice_output: VoiceOutputBridge::new(synthesizer),
            location: LocationBridge::from_config(&config.location),
        },
        config.assistant.clone(),
    ));

    engine.initialize(locale);
    print_history(&engine);
    println!("(type /help for commands)");

    // === Background tasks ===

    let mut events = BroadcastStream::new(engine.subscribe());
    tokio::spawn(async move {
        while let Some(event) = events.next().await {
            match event {
                Ok(event) => {
                    if let Some(line) = repl::render_event(&event) {
                        println!("{}", line);
                    }
                }
                Err(e) => tracing::debug!(error = %e, "Event printer lagged"),
            }
        }
    });

    let pump = SessionEngine::spawn_recognition_pump(&engine, recognition_events);

    // Lines are accepted in the order typed; replies arrive as events.
    let (submissions, queue) = mpsc::unbounded_channel::<String>();
    let submitter = SessionEngine::spawn_submission_queue(&engine, queue);

    // === Interactive loop ===

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match Command::parse(&line) {
            Command::Empty => {}
            Command::Say(text) => {
                if submissions.send(text).is_err() {
                    break;
                }
            }
            Command::Send => {
                if submissions.send(engine.input()).is_err() {
                    break;
                }
            }
            Command::Voice => {
                if engine.toggle_voice_input() == VoiceToggle::Inactive {
                    break;
                }
            }
            Command::Location => {
                let engine = Arc::clone(&engine);
                tokio::spawn(async move {
                    if let Err(e) = engine.submit_location().await {
                        tracing::debug!(error = %e, "Location was not shared");
                    }
                });
            }
            Command::Locale(code) => {
                match Locale::new(code.as_str()).map_err(|e| e.to_string()).and_then(|locale| {
                    engine.set_locale(locale).map_err(|e| e.to_string())
                }) {
                    Ok(()) => {}
                    Err(e) => println!("  [!] {}", e),
                }
            }
            Command::History => print_history(&engine),
            Command::Help => println!("{}", repl::HELP),
            Command::Quit => break,
            Command::Unknown(input) => println!("  unknown command: {} (try /help)", input),
        }
    }

    drop(submissions);
    engine.close();
    submitter.abort();
    pump.abort();
    tracing::info!("Beacon stopped");
    Ok(())
}

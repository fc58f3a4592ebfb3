//! CLI surface for the moves presentation navigator.
//!
//! Thin adapter over the library: subcommands validate input, resolve
//! speakers, and translate library errors into stderr messages and exit code
//! 1. All real behaviour lives in the library modules.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use moves::asr::{self, download};
use moves::chunks::DEFAULT_WINDOW_SIZE;
use moves::keys::EnigoEmitter;
use moves::models::{Speaker, SpeakerMatch};
use moves::settings::SettingsEditor;
use moves::speakers::SpeakerManager;
use moves::storage::DataDir;
use moves::{PresentationController, SimilarityEngine};

#[derive(Parser)]
#[command(
    name = "moves",
    version,
    about = "Presentation control, reimagined.",
    propagate_version = true
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Manage speaker profiles and files
    #[command(subcommand)]
    Speaker(SpeakerCommand),
    /// Control speaker presentations
    #[command(subcommand)]
    Presentation(PresentationCommand),
    /// View and modify application settings
    #[command(subcommand)]
    Settings(SettingsCommand),
}

#[derive(Subcommand)]
enum SpeakerCommand {
    /// Create a new speaker profile
    Add {
        /// Speaker's name
        name: String,
        /// Path to the presentation PDF
        source_presentation: PathBuf,
        /// Path to the transcript PDF
        source_transcript: PathBuf,
    },
    /// Update a speaker's presentation or transcript file
    Edit {
        /// Speaker name or ID
        speaker: String,
        /// New presentation file path
        #[arg(short, long)]
        presentation: Option<PathBuf>,
        /// New transcript file path
        #[arg(short, long)]
        transcript: Option<PathBuf>,
    },
    /// List all speaker profiles
    List,
    /// Show one speaker profile in detail
    Show {
        /// Speaker name or ID
        speaker: String,
    },
    /// Produce sections.json for one or more speakers
    Process {
        /// Speaker names or IDs
        #[arg(required = true)]
        speakers: Vec<String>,
    },
    /// Delete a speaker profile
    Delete {
        /// Speaker name or ID
        speaker: String,
    },
}

#[derive(Subcommand)]
enum PresentationCommand {
    /// Follow a live talk and keep the deck on the right slide
    Control {
        /// Speaker name or ID
        speaker: String,
        /// Slide to start from (1-based)
        #[arg(long, default_value_t = 1)]
        start_section: usize,
    },
}

#[derive(Subcommand)]
enum SettingsCommand {
    /// Show the current settings
    List,
    /// Set a settings key
    Set { key: String, value: String },
    /// Restore a settings key to its default
    Unset { key: String },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let data = DataDir::default_root()?;
    match cli.command {
        Command::Speaker(cmd) => run_speaker(cmd, data),
        Command::Presentation(cmd) => run_presentation(cmd, data),
        Command::Settings(cmd) => run_settings(cmd, data),
    }
}

/// Resolve a pattern to exactly one speaker or explain why it can't be.
fn resolve_unique(manager: &SpeakerManager, pattern: &str) -> Result<Speaker> {
    match manager.resolve(pattern)? {
        SpeakerMatch::Unique(speaker) => Ok(speaker),
        SpeakerMatch::NotFound => bail!("No speaker found matching '{pattern}'"),
        SpeakerMatch::Ambiguous(matches) => {
            let ids: Vec<&str> = matches.iter().map(|s| s.speaker_id.as_str()).collect();
            bail!(
                "Multiple speakers named '{pattern}'; use one of the IDs: {}",
                ids.join(", ")
            )
        }
    }
}

fn print_speaker(speaker: &Speaker) {
    println!("  Name: {}", speaker.name);
    println!("  Speaker ID: {}", speaker.speaker_id);
    println!("  Presentation: {}", speaker.source_presentation.display());
    println!("  Transcript: {}", speaker.source_transcript.display());
}

fn run_speaker(cmd: SpeakerCommand, data: DataDir) -> Result<()> {
    let manager = SpeakerManager::new(data.clone());
    match cmd {
        SpeakerCommand::Add {
            name,
            source_presentation,
            source_transcript,
        } => {
            if !source_presentation.exists() {
                bail!(
                    "Presentation file not found: {}",
                    source_presentation.display()
                );
            }
            if !source_transcript.exists() {
                bail!("Transcript file not found: {}", source_transcript.display());
            }
            let speaker = manager.add(&name, &source_presentation, &source_transcript)?;
            println!("\n✓ Speaker profile created:");
            print_speaker(&speaker);
            println!();
        }
        SpeakerCommand::Edit {
            speaker,
            presentation,
            transcript,
        } => {
            if presentation.is_none() && transcript.is_none() {
                bail!("Provide at least one of --presentation or --transcript");
            }
            if let Some(path) = &presentation {
                if !path.exists() {
                    bail!("Presentation file not found: {}", path.display());
                }
            }
            if let Some(path) = &transcript {
                if !path.exists() {
                    bail!("Transcript file not found: {}", path.display());
                }
            }
            let mut resolved = resolve_unique(&manager, &speaker)?;
            manager.edit(&mut resolved, presentation.as_deref(), transcript.as_deref())?;
            println!("\n✓ Speaker profile updated:");
            print_speaker(&resolved);
            println!();
        }
        SpeakerCommand::List => {
            let speakers = manager.list()?;
            if speakers.is_empty() {
                println!("No speakers yet — add one with `moves speaker add`.");
            } else {
                for speaker in speakers {
                    println!("{}  ({})", speaker.speaker_id, speaker.name);
                }
            }
        }
        SpeakerCommand::Show { speaker } => {
            let resolved = resolve_unique(&manager, &speaker)?;
            println!();
            print_speaker(&resolved);
            println!();
        }
        SpeakerCommand::Process { speakers } => {
            let settings = SettingsEditor::open(data)?.list()?;
            if settings.model.is_empty() || settings.key.is_empty() {
                bail!(
                    "LLM settings are incomplete — set them with \
                     `moves settings set model <model>` and `moves settings set key <key>`"
                );
            }

            let resolved: Vec<Speaker> = speakers
                .iter()
                .map(|pattern| resolve_unique(&manager, pattern))
                .collect::<Result<_>>()?;

            let results = manager.process(&resolved, &settings)?;
            for (speaker, result) in resolved.iter().zip(results) {
                println!(
                    "✓ {} ({}): {} sections (presentation: {:?}, transcript: {:?})",
                    speaker.name,
                    speaker.speaker_id,
                    result.section_count,
                    result.presentation_from,
                    result.transcript_from,
                );
            }
        }
        SpeakerCommand::Delete { speaker } => {
            let resolved = resolve_unique(&manager, &speaker)?;
            manager.delete(&resolved)?;
            println!("✓ Deleted {} ({})", resolved.name, resolved.speaker_id);
        }
    }
    Ok(())
}

fn run_presentation(cmd: PresentationCommand, data: DataDir) -> Result<()> {
    let PresentationCommand::Control {
        speaker,
        start_section,
    } = cmd;

    let manager = SpeakerManager::new(data.clone());
    let resolved = resolve_unique(&manager, &speaker)?;
    let sections = manager.load_sections(&resolved)?;

    if start_section == 0 || start_section > sections.len() {
        bail!(
            "Start section {} out of range (1..={})",
            start_section,
            sections.len()
        );
    }

    let model_dir = data.asr_model_dir();
    download::ensure_model(&model_dir, download::DEFAULT_MODEL_REPO)?;

    println!("Loading models…");
    let recognizer = asr::StreamingRecognizer::load(&model_dir)?;
    let engine = SimilarityEngine::new()?;
    let emitter = EnigoEmitter::new().context("Keystroke synthesis unavailable")?;

    println!(
        "Controlling '{}' — {} sections, starting at {}.",
        resolved.name,
        sections.len(),
        start_section
    );
    println!("Right/Left adjust manually, Insert pauses, Ctrl-C stops.");

    let controller = PresentationController::new(
        sections,
        start_section - 1,
        DEFAULT_WINDOW_SIZE,
        engine,
        recognizer,
        Box::new(emitter),
    )?;
    controller.run()
}

fn run_settings(cmd: SettingsCommand, data: DataDir) -> Result<()> {
    let mut editor = SettingsEditor::open(data)?;
    match cmd {
        SettingsCommand::List => {
            let settings = editor.list()?;
            let masked = if settings.key.is_empty() {
                "(unset)".to_string()
            } else {
                format!("{}…", settings.key.chars().take(6).collect::<String>())
            };
            println!("model    = {}", settings.model);
            println!("key      = {}", masked);
            println!("base_url = {}", settings.base_url);
        }
        SettingsCommand::Set { key, value } => {
            if !editor.set(&key, &value)? {
                bail!("Unknown settings key: '{key}' (known: model, key, base_url)");
            }
            println!("✓ {key} updated");
        }
        SettingsCommand::Unset { key } => {
            if !editor.unset(&key)? {
                bail!("Unknown settings key: '{key}' (known: model, key, base_url)");
            }
            println!("✓ {key} restored to default");
        }
    }
    Ok(())
}

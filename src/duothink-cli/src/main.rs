//! DuoThink CLI - Debate Practice Coach
//!
//! An interactive terminal chat where you argue a topic against an AI coach
//! that pushes back, flags logical fallacies and scores your resilience.

use clap::Parser;
use colored::Colorize;
use duothink_core::session::score_verdict;
use duothink_core::{
    CoachOrchestrator, CoachPersonality, CompletedHint, CompletedReply, CompletedSpeech, Config,
    DebateArchive, DebateSession, FileStore, GeminiCoach, KeyValueStore, Message, MessageId,
    MessageSender, SessionEvent, WavFileOutput, default_config,
};
use std::env;
use std::io::Write;
use std::path::PathBuf;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::{JoinError, JoinHandle};

#[derive(Parser)]
#[command(
    name = "duothink",
    version,
    about = "DuoThink - Sharpen your arguments against an AI debate coach",
    long_about = "An interactive debate-practice chat. Argue a topic, get counter-arguments grounded in web sources, see your logical blind spots and track your resilience score."
)]
struct Cli {
    /// Topic to open with (starts a fresh debate on it)
    #[arg(short, long, value_name = "TOPIC")]
    topic: Option<String>,

    /// Coach personality: Socratic, Aggressive, Academic or Stoic
    #[arg(short, long, default_value = "Socratic", value_name = "PERSONALITY")]
    personality: CoachPersonality,

    /// Path to a TOML config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory holding the debate archive
    #[arg(long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Directory spoken replies are rendered to
    #[arg(long, value_name = "DIR")]
    audio_dir: Option<PathBuf>,

    /// Show debug logs
    #[arg(short, long)]
    verbose: bool,

    /// Only show errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

/// A line of user input.
#[derive(Debug, PartialEq, Eq)]
enum Command {
    Argue(String),
    Hint,
    New(String),
    Logs,
    Load(usize),
    Stats,
    Personality(Option<String>),
    Speak(Option<u64>),
    Help,
    Quit,
    Unknown(String),
}

fn parse_command(line: &str) -> Command {
    let line = line.trim();
    let Some(rest) = line.strip_prefix('/') else {
        return Command::Argue(line.to_string());
    };

    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };
    let arg_opt = (!arg.is_empty()).then(|| arg.to_string());

    match name.to_lowercase().as_str() {
        "hint" => Command::Hint,
        "new" => Command::New(arg.to_string()),
        "logs" => Command::Logs,
        "load" => match arg.parse::<usize>() {
            Ok(n) if n > 0 => Command::Load(n),
            _ => Command::Unknown(line.to_string()),
        },
        "stats" => Command::Stats,
        "personality" => Command::Personality(arg_opt),
        "speak" => match arg_opt {
            None => Command::Speak(None),
            Some(id) => match id.parse::<u64>() {
                Ok(id) => Command::Speak(Some(id)),
                Err(_) => Command::Unknown(line.to_string()),
            },
        },
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        _ => Command::Unknown(line.to_string()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.quiet, cli.verbose)?;

    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => match Config::default_path().filter(|p| p.exists()) {
            Some(path) => Config::load(path)?,
            None => default_config(),
        },
    };
    if let Ok(api_base) = env::var("GEMINI_API_BASE") {
        config.backend.api_base = api_base;
    }
    if let Some(dir) = &cli.data_dir {
        config.storage.data_dir = Some(dir.clone());
    }

    let api_key = env::var("GEMINI_API_KEY")
        .or_else(|_| env::var("API_KEY"))
        .unwrap_or_else(|_| {
            eprintln!(
                "{}",
                "Warning: GEMINI_API_KEY not set. API calls will fail.".yellow()
            );
            String::new()
        });

    let data_dir = config.storage.resolve_data_dir()?;
    let audio_dir = cli.audio_dir.clone().unwrap_or_else(|| data_dir.join("audio"));
    let archive = DebateArchive::load(FileStore::new(&data_dir))?;
    let backend = GeminiCoach::new(api_key, config)?;

    let session = match &cli.topic {
        Some(topic) if !topic.trim().is_empty() => DebateSession::new(topic.trim(), cli.personality),
        _ => {
            let mut session = DebateSession::default();
            session.set_personality(cli.personality);
            session
        }
    };

    print_header(&session);

    let mut orchestrator =
        CoachOrchestrator::new(session, backend, archive).with_callback(create_console_callback());
    let mut audio = WavFileOutput::new(audio_dir);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut reply_task: Option<JoinHandle<CompletedReply>> = None;
    let mut hint_task: Option<JoinHandle<CompletedHint>> = None;
    let mut speech_task: Option<JoinHandle<CompletedSpeech>> = None;

    print_prompt(orchestrator.session());
    // After stdin closes, keep going until outstanding calls settle
    while stdin_open || reply_task.is_some() || hint_task.is_some() || speech_task.is_some() {
        tokio::select! {
            line = lines.next_line(), if stdin_open => {
                let Some(line) = line? else {
                    stdin_open = false;
                    continue;
                };

                match parse_command(&line) {
                    Command::Argue(text) => {
                        if text.is_empty() {
                            continue;
                        }
                        match orchestrator.begin_send(&text) {
                            Ok(pending) => {
                                println!("{}", "  … coach is thinking".dimmed());
                                reply_task = Some(tokio::spawn(pending.run()));
                            }
                            Err(rejection) => println!("{}", rejection.to_string().dimmed()),
                        }
                    }
                    Command::Hint => match orchestrator.begin_hint() {
                        Ok(pending) => hint_task = Some(tokio::spawn(pending.run())),
                        Err(rejection) => println!("{}", rejection.to_string().dimmed()),
                    },
                    Command::New(topic) => {
                        if topic.trim().is_empty() {
                            println!("{}", "Usage: /new <topic>".yellow());
                            continue;
                        }
                        match orchestrator.start_new_debate(&topic) {
                            Ok(_) => {
                                let session = orchestrator.session();
                                print_message(&session.messages()[0], Some(session.personality()));
                            }
                            Err(e) => eprintln!("{} {}", "Failed to archive debate:".red().bold(), e),
                        }
                    }
                    Command::Logs => print_logs(orchestrator.archive()),
                    Command::Load(n) => {
                        if orchestrator.load_debate(n - 1).is_some() {
                            print_transcript(orchestrator.session());
                        } else {
                            println!("{}", format!("No archived debate #{}.", n).yellow());
                        }
                    }
                    Command::Stats => print_stats(orchestrator.session()),
                    Command::Personality(None) => {
                        println!(
                            "{} {} (available: {})",
                            "Personality:".bold(),
                            orchestrator.session().personality().to_string().yellow(),
                            CoachPersonality::ALL
                                .iter()
                                .map(|p| p.display_name())
                                .collect::<Vec<_>>()
                                .join(", ")
                        );
                    }
                    Command::Personality(Some(name)) => match name.parse::<CoachPersonality>() {
                        Ok(personality) => {
                            orchestrator.set_personality(personality);
                            println!("{} {}", "Coach is now".dimmed(), personality.to_string().yellow());
                        }
                        Err(e) => println!("{}", e.to_string().yellow()),
                    },
                    Command::Speak(id) => {
                        let target = match id {
                            Some(id) => Some(MessageId(id)),
                            None => orchestrator.session().last_coach_message().map(|m| m.id),
                        };
                        if let Some(pending) = target.and_then(|id| orchestrator.begin_speech(id)) {
                            speech_task = Some(tokio::spawn(pending.run()));
                        }
                    }
                    Command::Help => print_help(),
                    Command::Quit => break,
                    Command::Unknown(line) => {
                        println!("{} {}", "Unknown command:".yellow(), line);
                        print_help();
                    }
                }
            }
            finished = settle(&mut reply_task) => match finished {
                Ok(completed) => {
                    orchestrator.finish_send(completed);
                }
                Err(e) => tracing::error!(error = %e, "reply task aborted"),
            },
            finished = settle(&mut hint_task) => match finished {
                Ok(completed) => {
                    orchestrator.finish_hint(completed);
                }
                Err(e) => tracing::error!(error = %e, "hint task aborted"),
            },
            finished = settle(&mut speech_task) => match finished {
                Ok(completed) => {
                    if orchestrator.finish_speech(completed, &mut audio).await {
                        if let Some(path) = audio.last_written() {
                            println!("{} {}", "  🔊 Saved speech to".dimmed(), path.display());
                        }
                    }
                }
                Err(e) => tracing::error!(error = %e, "speech task aborted"),
            },
        }

        print_prompt(orchestrator.session());
    }

    println!();
    println!("{}", "  Keep arguing. 👋".bright_green().bold());
    Ok(())
}

/// Wait for a background call if one is running; never resolves otherwise.
async fn settle<T>(task: &mut Option<JoinHandle<T>>) -> Result<T, JoinError> {
    match task.as_mut() {
        Some(handle) => {
            let result = handle.await;
            *task = None;
            result
        }
        None => std::future::pending().await,
    }
}

fn init_tracing(quiet: bool, verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    let level = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "warn"
    };

    let filter = tracing_subscriber::EnvFilter::try_from_env("DUOTHINK_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| format!("failed to initialize tracing subscriber: {e}"))?;

    Ok(())
}

/// Create a callback that prints session events to the console.
fn create_console_callback() -> Box<dyn Fn(SessionEvent) + Send + Sync> {
    Box::new(move |event| match event {
        SessionEvent::BlindSpotAlert(spot) => {
            println!();
            println!(
                "{}",
                format!("  ⚠ BLIND SPOT: {}", spot.kind).bright_red().bold()
            );
            for line in textwrap(&spot.explanation, 64).lines() {
                println!("    {}", line.red());
            }
        }
        SessionEvent::CoachReply { message, score } => {
            print_message(&message, None);
            println!("  {} {}", "Resilience:".dimmed(), score_label(score));
        }
        SessionEvent::HintReady(hint) => {
            println!();
            println!("{}", "  💡 COACH HINT".bright_yellow().bold());
            for line in textwrap(&hint, 64).lines() {
                println!("    {}", line.yellow());
            }
        }
        SessionEvent::DebateArchived { topic, score } => {
            println!(
                "{} {} ({})",
                "  📁 Archived:".dimmed(),
                topic,
                score_label(score)
            );
        }
        SessionEvent::DebateStarted { topic } => {
            println!();
            println!("{} {}", "Topic:".bold(), topic.bright_white());
        }
        SessionEvent::DebateLoaded { topic, score } => {
            println!(
                "{} {} ({})",
                "  📂 Loaded:".dimmed(),
                topic.bright_white(),
                score_label(score)
            );
        }
        SessionEvent::AudioStarted(id) => {
            println!("{}", format!("  🔈 speaking #{}", id).dimmed());
        }
        SessionEvent::UserMessage(_)
        | SessionEvent::TurnFailed { .. }
        | SessionEvent::AudioFinished(_) => {
            // Failures are logged by the core; user lines are already on screen
        }
    })
}

fn print_header(session: &DebateSession) {
    println!();
    println!("{}", "═".repeat(70).bright_blue());
    println!(
        "{}",
        format!("  {} - Debate Practice Coach", "DuoThink".bold())
            .bright_blue()
            .bold()
    );
    println!("{}", "═".repeat(70).bright_blue());
    println!();
    println!("{} {}", "Topic:".bold(), session.topic().bright_white());
    println!(
        "{} {}",
        "Coach:".bold(),
        session.personality().to_string().yellow()
    );
    println!("{}", "Type your argument, or /help for commands.".dimmed());
    println!("{}", "─".repeat(70).dimmed());
    print_transcript(session);
}

fn print_prompt(session: &DebateSession) {
    if let Some(hint) = session.active_hint(Instant::now()) {
        println!("{} {}", "  💡".yellow(), hint.yellow().dimmed());
    }
    print!("{} ", format!("[{}] >", session.score()).bright_cyan().bold());
    std::io::stdout().flush().ok();
}

fn print_transcript(session: &DebateSession) {
    for message in session.messages() {
        match message.sender {
            MessageSender::User => {
                println!();
                println!("{} {}", "You".bright_cyan().bold(), message.timestamp.dimmed());
                for line in textwrap(&message.text, 66).lines() {
                    println!("  {}", line);
                }
            }
            MessageSender::SystemAlert => {
                if let Some(spot) = &message.blind_spot {
                    println!();
                    println!("{}", format!("  ⚠ BLIND SPOT: {}", spot.kind).bright_red());
                }
            }
            MessageSender::Coach => print_message(message, Some(session.personality())),
        }
    }
}

fn print_message(message: &Message, personality: Option<CoachPersonality>) {
    println!();
    let label = match personality {
        Some(p) => format!("▶ DuoThink Coach ({})", p),
        None => "▶ DuoThink Coach".to_string(),
    };
    println!(
        "{} {} {}",
        label.bright_magenta().bold(),
        format!("#{}", message.id).dimmed(),
        message.timestamp.dimmed()
    );
    for line in textwrap(&message.text, 66).lines() {
        println!("  {}", line);
    }
    for source in message.displayed_sources() {
        println!("  {} {} {}", "🔗".dimmed(), source.title.cyan(), source.uri.dimmed());
    }
}

fn print_stats(session: &DebateSession) {
    println!();
    println!("{}", "─".repeat(70).dimmed());
    println!("{} {}", "Resilience:".bold(), score_label(session.score()));
    println!("  {}", score_verdict(session.score()).italic());
    println!();
    if session.fallacy_total() == 0 {
        println!(
            "  {}",
            "No blind spots detected yet. Keep up the clean logic!".green()
        );
    } else {
        println!("{} {}", "Blind spots:".bold(), session.fallacy_total());
        for (kind, count) in session.fallacies() {
            println!("  {:<40} {}", kind, count.to_string().bright_red());
        }
    }
    println!("{}", "─".repeat(70).dimmed());
}

fn print_logs<S: KeyValueStore>(archive: &DebateArchive<S>) {
    println!();
    if archive.is_empty() {
        println!("  {}", "No archived debates yet.".dimmed());
        return;
    }
    for (i, debate) in archive.debates().iter().enumerate() {
        println!(
            "  {}. {} {} - {} turns, {} blind spots, {}",
            i + 1,
            debate.date.to_string().dimmed(),
            debate.topic.bright_white(),
            debate.user_turns(),
            debate.blind_spots(),
            score_label(debate.score)
        );
    }
    println!("  {}", "Use /load <n> to reopen one.".dimmed());
}

fn print_help() {
    println!();
    println!("{}", "Commands:".bold());
    for (cmd, desc) in [
        ("/hint", "Ask the coach for a tactical hint"),
        ("/new <topic>", "Archive this debate and start a new one"),
        ("/logs", "List archived debates"),
        ("/load <n>", "Reopen an archived debate"),
        ("/stats", "Show resilience score and blind spots"),
        ("/personality [name]", "Show or change the coach personality"),
        ("/speak [id]", "Speak a coach reply (defaults to the latest)"),
        ("/quit", "Leave"),
    ] {
        println!("  {:<22} {}", cmd.cyan(), desc);
    }
}

fn score_label(score: i32) -> colored::ColoredString {
    let text = format!("{}/100", score);
    if score > 80 {
        text.bright_green().bold()
    } else if score > 50 {
        text.yellow().bold()
    } else {
        text.red().bold()
    }
}

/// Simple text wrapping function.
fn textwrap(text: &str, width: usize) -> String {
    let mut result = String::new();
    let mut current_line_len = 0;

    for word in text.split_whitespace() {
        if current_line_len + word.len() + 1 > width && current_line_len > 0 {
            result.push('\n');
            current_line_len = 0;
        }
        if current_line_len > 0 {
            result.push(' ');
            current_line_len += 1;
        }
        result.push_str(word);
        current_line_len += word.len();
    }

    result
}

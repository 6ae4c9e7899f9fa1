use std::{
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use clap::{Parser, Subcommand};
use stepscore_core::{
    pattern::{self, format_steps},
    AppConfig, ContinuationPolicy, NotationEvent, NotationSurface, PlaybackEngine, Resolution,
    Score, Session, StepscoreError,
};
use tracing_subscriber::EnvFilter;

fn main() -> stepscore_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Transcribe {
            grids,
            json,
            steps_per_beat,
            show_continuations,
        } => {
            let policy = if show_continuations {
                ContinuationPolicy::Show
            } else {
                config.render.continuations
            };
            let steps_per_beat = steps_per_beat.unwrap_or(config.session.resolution.steps_per_beat);
            run_transcribe(&grids, json.as_deref(), steps_per_beat, policy)
        }
        Commands::Demo => run_demo(&config),
    }
}

fn load_config(path: Option<&Path>) -> stepscore_core::Result<AppConfig> {
    let Some(path) = path else {
        return Ok(AppConfig::default());
    };
    tracing::info!(?path, "loading configuration");
    let text = std::fs::read_to_string(path)?;
    AppConfig::from_json_str(&text)
}

fn run_transcribe(
    grids: &[String],
    json: Option<&str>,
    steps_per_beat: u32,
    policy: ContinuationPolicy,
) -> stepscore_core::Result<()> {
    let mut rows = Vec::new();
    for (index, arg) in grids.iter().enumerate() {
        let (id, grid) = match arg.split_once('=') {
            Some((id, grid)) => (id.to_string(), grid),
            None => (format!("t{}", index + 1), arg.as_str()),
        };
        rows.push((id, pattern::parse_steps(grid)?));
    }
    if let Some(json) = json {
        rows.extend(pattern::parse_pattern_json(json)?);
    }
    if rows.is_empty() {
        return Err(StepscoreError::msg("nothing to transcribe, pass a grid or --json"));
    }

    let resolution = Resolution::new(1, 1, steps_per_beat);
    tracing::debug!(steps_per_beat = resolution.steps_per_beat, "transcribing");
    for (id, steps) in rows {
        let events = stepscore_core::transcribe_track(&id, &steps, &resolution);
        println!(
            "{id:>6}  {}  {}",
            format_steps(&steps),
            join_events(events.iter().filter(|event| visible(event, policy)))
        );
    }
    Ok(())
}

fn run_demo(config: &AppConfig) -> stepscore_core::Result<()> {
    tracing::info!(
        bpm = config.session.bpm,
        steps = config.session.resolution.steps(),
        detection = ?config.render.detection,
        "starting demo session"
    );

    let mut session = Session::new(config);
    session.attach_engine(Box::new(LoggingEngine { playing: true }));
    let mut surface = TextSurface {
        policy: session.continuations(),
    };

    session.frame(&mut surface);

    session.store_mut().toggle_step("bd", 0, Some(true));
    session.store_mut().toggle_step("sn", 4, Some(true));
    if session.store_mut().toggle_step("nope", 0, Some(true)).is_none() {
        tracing::warn!(track = "nope", "edit ignored, no such track");
    }
    session.frame(&mut surface);

    let steps = session.store().steps();
    for tick in 0..steps * 2 {
        session.on_playback_tick(Some(tick % steps));
    }
    let outcome = session.frame(&mut surface);
    tracing::info!(?outcome, "frame after playhead ticks");

    let start = Instant::now();
    for (offset, bpm) in [(0, 128.0), (40, 136.0), (80, 140.0)] {
        session.set_bpm(bpm, start + Duration::from_millis(offset));
    }
    session.poll(start + Duration::from_secs(1));

    tracing::info!(
        transcriptions = session.transcriptions(),
        revision = session.store().revision(),
        "demo finished"
    );
    Ok(())
}

fn visible(event: &NotationEvent, policy: ContinuationPolicy) -> bool {
    policy == ContinuationPolicy::Show || !event.is_continuation
}

fn join_events<'a>(events: impl Iterator<Item = &'a NotationEvent>) -> String {
    events
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Prints each redraw to stdout.
struct TextSurface {
    policy: ContinuationPolicy,
}

impl NotationSurface for TextSurface {
    fn draw(&mut self, score: &Score) {
        println!("-- {} steps --", score.resolution.steps());
        for notation in &score.tracks {
            println!(
                "{:>4}  {}",
                notation.track.display_short(),
                join_events(notation.visible_events(self.policy))
            );
        }
    }
}

/// Stand-in for an audio engine; only reports what it is told.
struct LoggingEngine {
    playing: bool,
}

impl PlaybackEngine for LoggingEngine {
    fn is_playing(&self) -> bool {
        self.playing
    }

    fn apply_tempo(&mut self, bpm: f32) {
        tracing::info!(bpm, "engine tempo updated");
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Step sequencer pattern tools", long_about = None)]
struct Cli {
    /// JSON configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Transcribe step grids such as `bd=x...x...` into note and rest values.
    Transcribe {
        /// Grids in compact notation, optionally prefixed with `id=`.
        grids: Vec<String>,
        /// JSON object mapping track ids to step arrays.
        #[arg(long)]
        json: Option<String>,
        /// Steps per beat; defaults to the configured resolution.
        #[arg(short, long)]
        steps_per_beat: Option<u32>,
        /// Print continuation events instead of hiding them.
        #[arg(long)]
        show_continuations: bool,
    },
    /// Run a short scripted editing session and print every redraw.
    Demo,
}

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use heist_world_core::{
    ColorIndex,
    agent::RandomWalker,
    config::{Difficulty, LevelOptions},
    environment::{Environment, StepOutcome},
    layout::Terrain,
    level::EntityKind,
    movement::MoveAction,
    stage::{Objective, StageTracker},
    trajectory::{self, LogMethod, TrajectoryRecorder},
};
use ratatui::{
    crossterm::{
        self,
        event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
        execute,
        terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
    },
    prelude::*,
    widgets::*,
};
use std::{
    fs::File,
    io::{self, Stdout},
    path::{Path, PathBuf},
    sync::Mutex,
    time::{Duration, Instant},
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Cells shown on each side of the agent when the camera follows it.
const VIEW_RADIUS: i64 = 8;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DifficultyArg {
    Easy,
    Hard,
    Memory,
}

impl From<DifficultyArg> for Difficulty {
    fn from(arg: DifficultyArg) -> Self {
        match arg {
            DifficultyArg::Easy => Difficulty::Easy,
            DifficultyArg::Hard => Difficulty::Hard,
            DifficultyArg::Memory => Difficulty::Memory,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogMethodArg {
    /// A new timestamped subdirectory per session
    Append,
    /// Straight into the trajectory directory, which must not exist
    Direct,
}

impl From<LogMethodArg> for LogMethod {
    fn from(arg: LogMethodArg) -> Self {
        match arg {
            LogMethodArg::Append => LogMethod::Append,
            LogMethodArg::Direct => LogMethod::Direct,
        }
    }
}

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Distribution tier
    #[arg(short, long, value_enum, default_value_t = DifficultyArg::Easy)]
    difficulty: DifficultyArg,

    /// Base seed for level generation
    #[arg(short, long, default_value_t = 0)]
    seed: u64,

    /// Fixed maze side; negative rolls it per episode
    #[arg(long, default_value_t = -1, allow_negative_numbers = true)]
    level_size: i32,

    /// Fixed number of keys; negative rolls it per episode
    #[arg(long, default_value_t = -1, allow_negative_numbers = true)]
    key_count: i32,

    /// Steps before an unfinished episode ends
    #[arg(long, default_value_t = heist_world_core::config::DEFAULT_EPISODE_TIMEOUT)]
    steps: u32,

    /// Run this many random-walker episodes without a terminal UI
    #[arg(long, value_name = "EPISODES")]
    headless: Option<u32>,

    /// Start with the random walker driving the agent
    #[arg(short, long)]
    random: bool,

    /// Record each episode's trajectory under this directory
    #[arg(long, value_name = "TRAJ_DIR")]
    traj_dir: Option<PathBuf>,

    /// Prefix for recorded trajectory files
    #[arg(long, default_value = "")]
    traj_prefix: String,

    /// How recorded trajectories are laid out in the trajectory directory
    #[arg(long, value_enum, default_value_t = LogMethodArg::Append)]
    traj_log_method: LogMethodArg,

    /// Print a per-episode summary of the trajectories under this directory
    /// and exit
    #[arg(long, value_name = "TRAJ_DIR")]
    analyze: Option<PathBuf>,

    /// Log file for the interactive UI
    #[arg(long, value_name = "LOG_FILE", default_value = "heist_world.log")]
    log_file: PathBuf,

    /// Log stage transitions and other per-step events
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn level_options(&self) -> LevelOptions {
        LevelOptions {
            episode_timeout: self.steps,
            ..LevelOptions::from_raw(self.difficulty.into(), self.seed, self.level_size, self.key_count)
        }
    }

    fn recorder(&self) -> Result<Option<TrajectoryRecorder>> {
        let Some(dir) = &self.traj_dir else {
            return Ok(None);
        };
        let recorder = TrajectoryRecorder::create(dir, &self.traj_prefix, self.traj_log_method.into())?;
        info!(dir = %recorder.directory().display(), "recording trajectories");
        Ok(Some(recorder))
    }
}

struct App {
    /// The core simulation environment.
    environment: Environment,
    /// Bytes of the state saved with Shift+F1.
    saved: Option<Vec<u8>>,
    walker: RandomWalker,
    recorder: Option<TrajectoryRecorder>,
    /// Whether the random walker drives the agent on each tick.
    autoplay: bool,
    last_outcome: Option<StepOutcome>,
    status: String,
    /// Flag to control the main loop.
    should_quit: bool,
}

impl App {
    fn new(options: LevelOptions, autoplay: bool, recorder: Option<TrajectoryRecorder>) -> Result<Self> {
        let seed = options.seed;
        let environment = Environment::new(options).context("Failed to build the first level")?;
        Ok(App {
            environment,
            saved: None,
            walker: RandomWalker::new(seed),
            recorder,
            autoplay,
            last_outcome: None,
            status: String::from("New episode"),
            should_quit: false,
        })
    }

    /// Applies one move, or starts the next episode if this one is over.
    fn act(&mut self, action: MoveAction) -> Result<()> {
        if self.environment.is_done() {
            return self.reset();
        }
        let outcome = self.environment.step(action);
        self.record(outcome);
        Ok(())
    }

    /// Handles one step of the simulation.
    fn tick(&mut self) -> Result<()> {
        if !self.autoplay {
            return Ok(());
        }
        if self.environment.is_done() {
            return self.reset();
        }
        let outcome = self.environment.process_turn(&mut self.walker);
        self.record(outcome);
        Ok(())
    }

    fn record(&mut self, outcome: StepOutcome) {
        if let Some(recorder) = &mut self.recorder {
            recorder.record(&self.environment, &outcome);
        }
        if outcome.done {
            self.status = if outcome.level_complete {
                format!("Level complete! Reward {}", outcome.reward)
            } else {
                String::from("Out of time")
            };
            info!(
                episode = self.environment.episode(),
                steps = self.environment.steps(),
                complete = outcome.level_complete,
                progress = outcome.level_progress,
                "episode finished"
            );
        }
        self.last_outcome = Some(outcome);
    }

    /// Writes out the episode being recorded, if any.
    fn finish_recording(&mut self) -> Result<()> {
        if let Some(recorder) = &mut self.recorder {
            recorder.finish_episode()?;
        }
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        self.finish_recording()?;
        self.environment.reset().context("Failed to build the next level")?;
        self.last_outcome = None;
        self.status = format!("Episode {}", self.environment.episode());
        Ok(())
    }

    fn save(&mut self) -> Result<()> {
        self.saved = Some(self.environment.save_state()?);
        self.status = String::from("State saved");
        info!(episode = self.environment.episode(), steps = self.environment.steps(), "state saved");
        Ok(())
    }

    fn load(&mut self) -> Result<()> {
        match &self.saved {
            Some(bytes) => {
                self.environment.load_state(bytes)?;
                self.last_outcome = None;
                self.status = String::from("State loaded");
                info!(episode = self.environment.episode(), steps = self.environment.steps(), "state loaded");
            }
            None => self.status = String::from("Nothing saved yet"),
        }
        Ok(())
    }

    fn handle_key(&mut self, key: KeyEvent) -> Result<()> {
        let direction = match key.code {
            KeyCode::Left | KeyCode::Char('a') => Some((-1, 0)),
            KeyCode::Right | KeyCode::Char('d') => Some((1, 0)),
            KeyCode::Up | KeyCode::Char('w') => Some((0, -1)),
            KeyCode::Down | KeyCode::Char('s') => Some((0, 1)),
            KeyCode::Char('.') => Some((0, 0)),
            _ => None,
        };
        if let Some((dx, dy)) = direction {
            return self.act(MoveAction::from_direction(dx, dy));
        }

        match key.code {
            // Some terminals report Shift+F1 as F13.
            KeyCode::F(1) if key.modifiers.contains(KeyModifiers::SHIFT) => self.save()?,
            KeyCode::F(13) => self.save()?,
            KeyCode::F(1) => self.load()?,
            KeyCode::Char('r') => self.reset()?,
            KeyCode::Char(' ') => {
                self.autoplay = !self.autoplay;
                self.status = String::from(if self.autoplay { "Random walker" } else { "Manual" });
            }
            KeyCode::Char('q') | KeyCode::Esc => self.quit(),
            _ => {}
        }
        Ok(())
    }

    /// Sets the quit flag.
    fn quit(&mut self) {
        self.should_quit = true;
    }
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();
    let options = args.level_options();

    if let Some(dir) = &args.analyze {
        init_tracing(None, args.verbose)?;
        return run_analysis(dir);
    }

    if let Some(episodes) = args.headless {
        init_tracing(None, args.verbose)?;
        return run_headless(options, episodes, args.recorder()?);
    }

    init_tracing(Some(&args.log_file), args.verbose)?;
    info!(difficulty = options.difficulty.name(), seed = options.seed, "starting");

    // Create the application state before touching the terminal, so a bad
    // configuration is reported normally.
    let mut app = App::new(options, args.random, args.recorder()?)?;

    // Set up the terminal
    let mut terminal = setup_terminal()?;

    // Run the main application loop
    let result = run_app(&mut terminal, &mut app);

    // Restore the terminal state
    restore_terminal(&mut terminal)?;

    result?;
    app.finish_recording()
}

/// Logs to `log_file`, or to stderr when there is no terminal UI to corrupt.
fn init_tracing(log_file: Option<&Path>, verbose: bool) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);

    match log_file {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create log file {}", path.display()))?;
            builder.with_writer(Mutex::new(file)).with_ansi(false).init();
        }
        None => builder.with_writer(io::stderr).init(),
    }
    Ok(())
}

/// Plays `episodes` random-walker episodes and reports how far they got.
fn run_headless(
    options: LevelOptions,
    episodes: u32,
    mut recorder: Option<TrajectoryRecorder>,
) -> Result<()> {
    let mut walker = RandomWalker::new(options.seed);
    let mut environment = Environment::new(options).context("Failed to build the first level")?;
    let mut completed = 0;
    let mut total_progress = 0i64;

    for episode in 0..episodes {
        if episode > 0 {
            environment.reset().context("Failed to build the next level")?;
        }
        let mut outcome = None;
        while !environment.is_done() {
            let step = environment.process_turn(&mut walker);
            if let Some(recorder) = &mut recorder {
                recorder.record(&environment, &step);
            }
            outcome = Some(step);
        }
        if let Some(recorder) = &mut recorder {
            recorder.finish_episode()?;
        }
        let Some(outcome) = outcome else {
            warn!(episode, "episode ended before its first step");
            continue;
        };

        if outcome.level_complete {
            completed += 1;
        }
        total_progress += i64::from(outcome.level_progress_max);
        info!(
            episode,
            keys = environment.params().key_count,
            maze_dim = environment.params().maze_dim,
            steps = environment.steps(),
            complete = outcome.level_complete,
            progress = outcome.level_progress_max,
            "episode finished"
        );
    }

    let mean = if episodes == 0 {
        0.0
    } else {
        total_progress as f64 / f64::from(episodes)
    };
    info!(episodes, completed, mean_progress = mean, "headless run finished");
    println!("{completed}/{episodes} levels complete, mean progress {mean:.1}");
    Ok(())
}

/// Prints one summary per recorded episode under `dir`, session by session.
fn run_analysis(dir: &Path) -> Result<()> {
    if !dir.exists() {
        return Err(anyhow::anyhow!("Trajectory directory does not exist: {}", dir.display()));
    }

    for paths in trajectory::trajectory_sequences(dir)? {
        for path in paths {
            let recorded = trajectory::read_trajectory(&path)?;
            let Some(summary) = recorded.summary() else {
                warn!(path = %path.display(), "empty trajectory");
                continue;
            };
            let options = &summary.options;
            let requested = |value: Option<usize>| value.map_or(String::from("rolled"), |v| v.to_string());

            println!("{}", path.display());
            println!(" - Level seed: {}", summary.level_seed);
            println!(
                " - Level options: {} world {}, maze {} ({}), keys {} ({}), timeout {}",
                options.difficulty.name(),
                summary.params.world_dim,
                summary.params.maze_dim,
                requested(options.maze_dim),
                summary.params.key_count,
                requested(options.key_count),
                options.episode_timeout,
            );
            println!(" - Episode length: {}", summary.length);
            println!(" - Episode reward: {}", summary.reward);
            println!(" - Level complete: {}", summary.level_complete);
            println!(" - Level progress at episode end: {}", summary.final_progress);
            println!(" - Max achieved level progress: {}", summary.max_progress);
            println!();
        }
    }
    Ok(())
}

/// Configures the terminal for TUI interaction.
fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    let mut stdout = io::stdout();
    enable_raw_mode()?; // Put terminal in raw mode
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend).map_err(Into::into) // Map io::Error to anyhow::Error
}

/// Restores the terminal to its original state.
fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

/// Runs the main loop of the TUI application.
fn run_app(terminal: &mut Terminal<CrosstermBackend<Stdout>>, app: &mut App) -> Result<()> {
    let tick_rate = Duration::from_millis(100); // Random walker speed
    let mut last_tick = Instant::now();

    loop {
        // Draw the UI
        terminal.draw(|f| ui(f, app))?;

        // Calculate timeout for event polling
        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or_else(|| Duration::from_secs(0));

        if crossterm::event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    app.handle_key(key)?;
                }
            }
        }

        if last_tick.elapsed() >= tick_rate {
            app.tick()?;
            last_tick = Instant::now();
        }

        // Exit loop if requested
        if app.should_quit {
            break;
        }
    }
    Ok(())
}

fn color_of(color: ColorIndex) -> Color {
    match color.index() {
        0 => Color::Blue,
        1 => Color::Green,
        2 => Color::Red,
        _ => Color::Magenta,
    }
}

/// Renders the user interface.
fn ui(frame: &mut Frame, app: &App) {
    let main_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(10),   // Area for the map
            Constraint::Length(4), // Area for the HUD
            Constraint::Length(2), // Area for status/help
        ])
        .split(frame.area());

    render_map(frame, main_layout[0], &app.environment);
    render_hud(frame, main_layout[1], app);

    let help_text = Paragraph::new(
        "arrows/WASD move  . wait  space random walker  r reset  Shift+F1 save  F1 load  q quit",
    )
    .alignment(Alignment::Center)
    .block(Block::default().borders(Borders::TOP));
    frame.render_widget(help_text, main_layout[2]);
}

fn describe(objective: Objective) -> (String, Color) {
    match objective {
        Objective::Key(color) => (format!("key ({color})"), color_of(color)),
        Objective::Door(color) => (format!("door ({color})"), color_of(color)),
        Objective::Exit => (String::from("exit"), Color::Green),
    }
}

/// Cell holding the anchor the progress metric is measured towards.
fn objective_cell(tracker: &StageTracker, scale: f32) -> (i64, i64) {
    let target = tracker.position_of(tracker.next_objective());
    ((target.x / scale).floor() as i64, (target.y / scale).floor() as i64)
}

/// Renders the key ring, stage and progress readouts.
fn render_hud(frame: &mut Frame, area: Rect, app: &App) {
    let environment = &app.environment;
    let tracker = environment.tracker();
    let progress = environment.progress();

    let mut ring = vec![Span::raw("Keys: ")];
    ring.extend(
        environment
            .entities()
            .iter()
            .filter(|e| e.screen_space && environment.is_visible(e))
            .filter_map(|e| match e.kind {
                EntityKind::KeyRing(color) => {
                    Some(Span::styled("k ", Style::default().fg(color_of(color)).bold()))
                }
                _ => None,
            }),
    );

    let mode = if app.autoplay { "random" } else { "manual" };
    let (objective, color) = describe(tracker.next_objective());
    ring.push(Span::raw("  Next: "));
    ring.push(Span::styled(objective, Style::default().fg(color)));
    let lines = vec![
        Line::from(ring),
        Line::from(format!(
            "Stage {}/{}  Progress {} (max {})  Reward {}",
            tracker.current_stage() + 1,
            tracker.total_stages(),
            progress.level_progress(),
            progress.level_progress_max(),
            app.last_outcome.map_or(0.0, |o| o.reward),
        )),
        Line::from(format!(
            "{} | episode {} step {} | {} | {}",
            environment.options().difficulty.name(),
            environment.episode(),
            environment.steps(),
            mode,
            app.status
        )),
    ];

    let hud = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Heist"));
    frame.render_widget(hud, area);
}

/// Renders the level onto the frame, following the agent on tiers whose
/// camera is centred on it.
fn render_map(frame: &mut Frame, area: Rect, environment: &Environment) {
    let terrain = environment.terrain();
    let scale = environment.scale();
    let agent = environment.agent();
    let cell_of = |v: f32| (v / scale).floor() as i64;
    let agent_cell = (cell_of(agent.position.x), cell_of(agent.position.y));
    let target_cell = objective_cell(environment.tracker(), scale);

    let (x_range, y_range) = if environment.options().difficulty.centers_agent() {
        (
            agent_cell.0 - VIEW_RADIUS..=agent_cell.0 + VIEW_RADIUS,
            agent_cell.1 - VIEW_RADIUS..=agent_cell.1 + VIEW_RADIUS,
        )
    } else {
        (0..=terrain.width() as i64 - 1, 0..=terrain.height() as i64 - 1)
    };

    let mut lines: Vec<Line> = Vec::with_capacity(y_range.clone().count());
    for y in y_range {
        let mut spans: Vec<Span> = Vec::with_capacity(x_range.clone().count());
        for x in x_range.clone() {
            if (x, y) == agent_cell {
                let glyph = if agent.facing_left { "<" } else { ">" };
                spans.push(Span::styled(glyph, Style::default().fg(Color::Yellow).bold()));
                continue;
            }

            let entity = environment.entities().iter().find(|e| {
                !e.screen_space
                    && environment.is_visible(e)
                    && (cell_of(e.pos.x), cell_of(e.pos.y)) == (x, y)
            });
            let span = match (entity.map(|e| e.kind), terrain.get_signed(x, y)) {
                (Some(EntityKind::Key(color)), _) => {
                    Span::styled("k", Style::default().fg(color_of(color)))
                }
                (Some(EntityKind::Door(color)), _) => {
                    Span::styled("|", Style::default().fg(color_of(color)).bold())
                }
                (Some(EntityKind::Exit), _) => Span::styled("E", Style::default().fg(Color::Green).bold()),
                (_, Some(Terrain::Wall)) => Span::styled("#", Style::default().fg(Color::DarkGray)),
                (_, Some(Terrain::Space)) => Span::raw("."),
                (_, None) => Span::raw(" "),
            };
            let span = if (x, y) == target_cell && !environment.is_done() {
                span.underlined()
            } else {
                span
            };
            spans.push(span);
        }
        lines.push(Line::from(spans));
    }

    let map_paragraph = Paragraph::new(lines)
        .block(Block::default().title("Heist World").borders(Borders::ALL))
        .alignment(Alignment::Center);

    frame.render_widget(map_paragraph, area);
}

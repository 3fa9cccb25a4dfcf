use anyhow::{Context, Result};
use clap::Parser;
use extraction_world_core::{
    Point,
    config::LearningParameters,
    learning::{LearningEngine, TrainingReport, Transition},
    map::GridMap,
    scene::CellKind,
};
use ratatui::{
    crossterm::{
        self,
        event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode},
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
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Number of recent episodes averaged in summaries.
const RECENT_WINDOW: usize = 50;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Map file to load
    #[arg(short, long, value_name = "MAP_FILE", default_value = "maps/warehouse.txt")]
    map: PathBuf,

    /// Number of training episodes to run before the replay
    #[arg(short, long, default_value_t = 500)]
    episodes: usize,

    /// Seed for reproducible runs
    #[arg(short, long)]
    seed: Option<u64>,

    /// JSON file with learning parameters; missing fields use defaults
    #[arg(short, long, value_name = "PARAMS_FILE")]
    params: Option<PathBuf>,

    #[arg(long)]
    decay_rate: Option<f64>,
    #[arg(long)]
    exploration_rate: Option<f64>,
    #[arg(long)]
    learning_rate: Option<f64>,
    #[arg(long, allow_hyphen_values = true)]
    punishment_for_movement: Option<f64>,
    #[arg(long, allow_hyphen_values = true)]
    punishment_for_invalid_movement: Option<f64>,
    #[arg(long, allow_hyphen_values = true)]
    reward_for_package_capture: Option<f64>,
    #[arg(long, allow_hyphen_values = true)]
    reward_for_package_extraction: Option<f64>,

    /// Exploration rate used while replaying the learned policy
    #[arg(long, default_value_t = 0.0)]
    replay_exploration_rate: f64,

    /// Train, log a summary and exit without opening the terminal UI
    #[arg(long)]
    headless: bool,

    /// Write logs to this file (interactive mode logs nowhere otherwise)
    #[arg(long, value_name = "LOG_FILE")]
    log_file: Option<PathBuf>,
}

impl Args {
    /// Defaults, then the parameters file, then individual flags.
    fn learning_parameters(&self) -> Result<LearningParameters> {
        let mut params = match &self.params {
            Some(path) => load_parameters(path)?,
            None => LearningParameters::default(),
        };
        let overrides = [
            (&mut params.decay_rate, self.decay_rate),
            (&mut params.exploration_rate, self.exploration_rate),
            (&mut params.learning_rate, self.learning_rate),
            (
                &mut params.punishment_for_movement,
                self.punishment_for_movement,
            ),
            (
                &mut params.punishment_for_invalid_movement,
                self.punishment_for_invalid_movement,
            ),
            (
                &mut params.reward_for_package_capture,
                self.reward_for_package_capture,
            ),
            (
                &mut params.reward_for_package_extraction,
                self.reward_for_package_extraction,
            ),
        ];
        for (field, value) in overrides {
            if let Some(value) = value {
                *field = value;
            }
        }
        params.validate().context("Invalid learning parameters")?;
        Ok(params)
    }
}

fn load_parameters(path: &Path) -> Result<LearningParameters> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read parameters file {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse parameters file {}", path.display()))
}

fn init_logging(args: &Args) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("extraction_world_core=debug,info"));

    match &args.log_file {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create log file {}", path.display()))?;
            let subscriber = FmtSubscriber::builder()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .finish();
            tracing::subscriber::set_global_default(subscriber)
                .context("Setting default subscriber failed")?;
        }
        // Logging to the terminal would corrupt the UI.
        None if !args.headless => {}
        None => {
            let subscriber = FmtSubscriber::builder()
                .with_env_filter(filter)
                .with_target(false)
                .with_writer(io::stderr)
                .finish();
            tracing::subscriber::set_global_default(subscriber)
                .context("Setting default subscriber failed")?;
        }
    }
    Ok(())
}

struct App {
    /// The learner, which also owns the live scene.
    engine: LearningEngine,
    /// Results of the training run that preceded the replay.
    training: TrainingReport,
    /// Cycles taken by the replay episode in progress.
    replay_cycles: usize,
    /// Replay episodes completed so far.
    replays_completed: usize,
    last_transition: Option<Transition>,
    /// Draw the greedy action on floor cells.
    show_policy: bool,
    /// Flag to control the main loop.
    should_quit: bool,
    /// Ticks to wait on a delivered scene before starting the next replay.
    pause_ticks: usize,
}

impl App {
    fn new(engine: LearningEngine, training: TrainingReport) -> Self {
        App {
            engine,
            training,
            replay_cycles: 0,
            replays_completed: 0,
            last_transition: None,
            show_policy: false,
            should_quit: false,
            pause_ticks: 0,
        }
    }

    /// Handles one step of the replay.
    fn tick(&mut self) {
        if self.engine.scene().is_goal_achieved() {
            if self.pause_ticks > 0 {
                self.pause_ticks -= 1;
            } else {
                self.restart();
            }
            return;
        }
        let transition = self.engine.act();
        self.replay_cycles += 1;
        self.last_transition = Some(transition);
        if transition.goal_achieved {
            self.replays_completed += 1;
            self.pause_ticks = 4;
            info!(cycles = self.replay_cycles, "replay delivered the package");
        }
    }

    fn restart(&mut self) {
        self.engine.reset();
        self.replay_cycles = 0;
        self.last_transition = None;
        self.pause_ticks = 0;
    }

    fn toggle_policy(&mut self) {
        self.show_policy = !self.show_policy;
    }

    /// Sets the quit flag.
    fn quit(&mut self) {
        self.should_quit = true;
    }
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();
    init_logging(&args)?;

    let map = GridMap::from_file(&args.map)
        .with_context(|| format!("Failed to load map {}", args.map.display()))?;
    let parameters = args.learning_parameters()?;
    info!(
        map = %args.map.display(),
        width = map.width(),
        height = map.height(),
        ?parameters,
        "map loaded"
    );

    let map = Arc::new(map);
    let mut engine = match args.seed {
        Some(seed) => LearningEngine::with_seed(map, parameters, seed),
        None => LearningEngine::new(map, parameters),
    }
    .context("Failed to set up the learning engine")?;

    let training = engine.train(args.episodes);
    print_summary(&training, args.headless);
    if args.headless {
        return Ok(());
    }

    engine
        .set_parameters(LearningParameters {
            exploration_rate: args.replay_exploration_rate,
            ..parameters
        })
        .context("Invalid replay exploration rate")?;
    engine.reset();

    // Set up the terminal
    let mut terminal = setup_terminal()?;

    let mut app = App::new(engine, training);

    // Run the main application loop
    let result = run_app(&mut terminal, &mut app);

    // Restore the terminal state
    restore_terminal(&mut terminal)?;

    result
}

fn print_summary(training: &TrainingReport, headless: bool) {
    info!(
        episodes = training.episodes.len(),
        total_cycles = training.total_cycles(),
        best_cycles = ?training.best_cycles(),
        recent_mean_cycles = ?training.mean_cycles_of_last(RECENT_WINDOW),
        "training summary"
    );
    if headless {
        println!(
            "episodes: {}  total cycles: {}  best: {}  mean of last {}: {}",
            training.episodes.len(),
            training.total_cycles(),
            training
                .best_cycles()
                .map_or_else(|| "-".to_string(), |c| c.to_string()),
            RECENT_WINDOW,
            training
                .mean_cycles_of_last(RECENT_WINDOW)
                .map_or_else(|| "-".to_string(), |m| format!("{m:.1}")),
        );
    }
}

/// Configures the terminal for TUI interaction.
fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    let mut stdout = io::stdout();
    enable_raw_mode()?; // Put terminal in raw mode
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend).map_err(Into::into)
}

/// Restores the terminal to its original state.
fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    Ok(())
}

/// Runs the main loop of the TUI application.
fn run_app(terminal: &mut Terminal<CrosstermBackend<Stdout>>, app: &mut App) -> Result<()> {
    let tick_rate = Duration::from_millis(200);
    let mut last_tick = Instant::now();

    loop {
        terminal.draw(|f| ui(f, app))?;

        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or_else(|| Duration::from_secs(0));

        if crossterm::event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                match key.code {
                    KeyCode::Char('q') | KeyCode::Esc => app.quit(),
                    KeyCode::Char('r') => app.restart(),
                    KeyCode::Char('p') => app.toggle_policy(),
                    _ => {}
                }
            }
        }

        if last_tick.elapsed() >= tick_rate {
            app.tick();
            last_tick = Instant::now();
        }

        if app.should_quit {
            break;
        }
    }
    Ok(())
}

/// Renders the user interface.
fn ui(frame: &mut Frame, app: &App) {
    let main_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage(65), // Area for the map
            Constraint::Percentage(25), // Area for statistics
            Constraint::Percentage(10), // Area for status/help
        ])
        .split(frame.area());

    render_map(frame, main_layout[0], app);
    render_stats(frame, main_layout[1], app);

    let help_text = Paragraph::new("'q'/'Esc' quit   'r' restart replay   'p' toggle policy")
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::TOP));
    frame.render_widget(help_text, main_layout[2]);
}

/// Renders training and replay statistics.
fn render_stats(frame: &mut Frame, area: Rect, app: &App) {
    let training = &app.training;
    let scene = app.engine.scene();
    let or_dash = |value: Option<String>| value.unwrap_or_else(|| "-".to_string());

    let mut items = vec![
        ListItem::new(format!(
            "Training: {} episodes, {} cycles, best {}, mean of last {}: {}",
            training.episodes.len(),
            training.total_cycles(),
            or_dash(training.best_cycles().map(|c| c.to_string())),
            RECENT_WINDOW,
            or_dash(
                training
                    .mean_cycles_of_last(RECENT_WINDOW)
                    .map(|m| format!("{m:.1}"))
            ),
        )),
        ListItem::new(format!(
            "Replay #{}: {} cycles  Agent: ({}, {})  Package: ({}, {}) {}",
            app.replays_completed + 1,
            app.replay_cycles,
            scene.agent_position().x,
            scene.agent_position().y,
            scene.package_position().x,
            scene.package_position().y,
            if scene.is_package_captured() {
                "captured"
            } else {
                "loose"
            },
        )),
    ];
    if let Some(transition) = &app.last_transition {
        items.push(ListItem::new(format!(
            "Last: {:?} -> {:?} reward {:+.2}, Q = {:.4}",
            transition.action, transition.event, transition.reward, transition.value
        )));
    }
    if scene.is_goal_achieved() {
        items.push(ListItem::new(Span::styled(
            "Package delivered!",
            Style::default().fg(Color::Green).bold(),
        )));
    }

    let stats_widget =
        List::new(items).block(Block::default().borders(Borders::ALL).title("Statistics"));
    frame.render_widget(stats_widget, area);
}

/// Renders the scene onto the frame.
fn render_map(frame: &mut Frame, area: Rect, app: &App) {
    let scene = app.engine.scene();
    let map = scene.map();

    let mut lines: Vec<Line> = Vec::with_capacity(map.height());
    for y in 0..map.height() {
        let mut spans: Vec<Span> = Vec::with_capacity(map.width());
        for x in 0..map.width() {
            let point = Point::new(x as i32, y as i32);
            spans.push(cell_span(app, point, scene.classify(point)));
        }
        lines.push(Line::from(spans));
    }

    let map_paragraph = Paragraph::new(lines)
        .block(Block::default().title("Extraction World").borders(Borders::ALL))
        .alignment(Alignment::Center);

    frame.render_widget(map_paragraph, area);
}

fn cell_span(app: &App, point: Point, kind: CellKind) -> Span<'static> {
    let policy = || {
        app.show_policy
            .then(|| app.engine.greedy_action(point))
            .flatten()
    };
    match kind {
        CellKind::Agent => Span::styled("@", Style::default().fg(Color::Red).bold()),
        CellKind::Package => Span::styled("P", Style::default().fg(Color::Yellow).bold()),
        CellKind::Extraction => match policy() {
            Some(action) => Span::styled(
                action.arrow().to_string(),
                Style::default().fg(Color::Green),
            ),
            None => Span::styled("E", Style::default().fg(Color::Green)),
        },
        CellKind::Wall => Span::styled("#", Style::default().fg(Color::DarkGray)),
        CellKind::Floor => match policy() {
            Some(action) => Span::styled(
                action.arrow().to_string(),
                Style::default().fg(Color::Cyan),
            ),
            None => Span::raw("."),
        },
    }
}

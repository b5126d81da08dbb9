use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use log::info;
use ratatui::{prelude::*, widgets::*};
use simplelog::{Config, LevelFilter, WriteLogger};
use std::collections::HashSet;
use std::fs::File;
use std::io;
use std::time::{Duration, Instant};

const MAX_BODY: usize = 50;
const LOG_FILE: &str = "snekbird.log";

// '#' solid, 'F' morsel, 'E' exit, space empty. All rows are the same width.
const MAP: [&str; 14] = [
    "#########################",
    "#                       #",
    "#                       #",
    "#                       #",
    "#                       #",
    "#     #####     F       #",
    "#     #   # F #####     #",
    "#           F # # #     #",
    "#       #       F       #",
    "#    #######    #       #",
    "#       #     #####     #",
    "#       #    E  #       #",
    "#    #              #   #",
    "#########################",
];

fn main() -> Result<(), io::Error> {
    // Set up logging before anything else
    WriteLogger::init(
        LevelFilter::Info,
        Config::default(),
        File::create(LOG_FILE)?,
    )
    .expect("Failed to initialize logger");

    info!("Starting Snekbird");

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Create app state
    let mut game = Game::new();

    // Run game loop
    let tick_rate = Duration::from_millis(100);
    let mut last_tick = Instant::now();

    let mut ignore_input = false;
    loop {
        terminal.draw(|f| game.render(f))?;

        // At most one key event is consumed per tick window
        if !ignore_input && event::poll(tick_rate)? {
            if let Event::Key(key) = event::read()? {
                game.handle_input(key);
                ignore_input = true;
            }
        }

        if last_tick.elapsed() >= tick_rate {
            game.update();
            last_tick = Instant::now();
            ignore_input = false;
        }

        match game.state {
            GameState::Exit => break,
            _ => {}
        }
    }

    // Cleanup terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    Ok(())
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Dir {
    North,
    East,
    South,
    West,
}

impl Dir {
    fn from_key(code: event::KeyCode) -> Option<Dir> {
        use event::KeyCode;
        match code {
            KeyCode::Right | KeyCode::Char('d') => Some(Dir::East),
            KeyCode::Left | KeyCode::Char('a') => Some(Dir::West),
            KeyCode::Up | KeyCode::Char('w') => Some(Dir::North),
            KeyCode::Down | KeyCode::Char('s') => Some(Dir::South),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
struct Pos {
    x: i32,
    y: i32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct PosDelta {
    x: i32,
    y: i32,
}

impl From<Dir> for PosDelta {
    fn from(dir: Dir) -> Self {
        match dir {
            Dir::North => PosDelta { x: 0, y: -1 },
            Dir::South => PosDelta { x: 0, y: 1 },
            Dir::East => PosDelta { x: 1, y: 0 },
            Dir::West => PosDelta { x: -1, y: 0 },
        }
    }
}

impl Pos {
    // The arena does not wrap; out-of-range positions are legal values
    // and count as solid (see TileMap::is_solid).
    fn step(self, delta: PosDelta) -> Pos {
        Pos {
            x: self.x + delta.x,
            y: self.y + delta.y,
        }
    }
}

#[derive(Debug, Default)]
struct TileMap {
    width: i32,
    height: i32,
    solids: HashSet<Pos>,
    exit: Pos,
}

impl TileMap {
    /// Parse a fixed layout into the immutable map plus the authored
    /// morsel positions. The first 'E' wins; a map without one gets the
    /// origin as exit.
    fn parse(rows: &[&str]) -> (TileMap, Vec<Pos>) {
        let mut solids = HashSet::new();
        let mut morsels = Vec::new();
        let mut exit = None;

        for (y, row) in rows.iter().enumerate() {
            for (x, cell) in row.chars().enumerate() {
                let pos = Pos {
                    x: x as i32,
                    y: y as i32,
                };
                match cell {
                    '#' => {
                        solids.insert(pos);
                    }
                    'F' => morsels.push(pos),
                    'E' => {
                        exit.get_or_insert(pos);
                    }
                    _ => {}
                }
            }
        }

        let map = TileMap {
            width: rows.first().map_or(0, |r| r.chars().count() as i32),
            height: rows.len() as i32,
            solids,
            exit: exit.unwrap_or_default(),
        };
        (map, morsels)
    }

    fn in_bounds(&self, pos: Pos) -> bool {
        pos.x >= 0 && pos.x < self.width && pos.y >= 0 && pos.y < self.height
    }

    // Anything outside the map blocks entry just like a platform tile.
    fn is_solid(&self, pos: Pos) -> bool {
        !self.in_bounds(pos) || self.solids.contains(&pos)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Morsel {
    pos: Pos,
    active: bool,
}

#[derive(Debug)]
struct Snekbird {
    body: Vec<Pos>,
}

impl Default for Snekbird {
    fn default() -> Self {
        Snekbird::new(Pos::default())
    }
}

impl Snekbird {
    fn new(start: Pos) -> Self {
        Snekbird { body: vec![start] }
    }

    fn head(&self) -> Pos {
        self.body[0]
    }

    fn tail(&self) -> Pos {
        self.body[self.body.len() - 1]
    }

    fn len(&self) -> usize {
        self.body.len()
    }

    // Self-collision is checked against every segment behind the head,
    // including the tail: the chain never vacates a tile in the same
    // tick the head enters it.
    fn would_bite_itself(&self, pos: Pos) -> bool {
        self.body[1..].contains(&pos)
    }

    /// Follow-the-leader commit: each segment takes the position its
    /// predecessor held before this move. Walking tail-to-head keeps
    /// every copy reading a pre-move value. Returns the tile the old
    /// tail vacated, which a growth step may reoccupy.
    fn advance(&mut self, next_head: Pos) -> Pos {
        let vacated = self.tail();
        for i in (1..self.body.len()).rev() {
            self.body[i] = self.body[i - 1];
        }
        self.body[0] = next_head;
        vacated
    }

    // Growth past MAX_BODY is silently capped.
    fn grow(&mut self, vacated: Pos) {
        if self.body.len() < MAX_BODY {
            self.body.push(vacated);
        }
    }
}

#[derive(Debug, PartialEq)]
enum TickResult {
    Idle,    // no movement vector this tick, nothing ran
    Blocked, // move rejected, state untouched
    Ongoing, // normal committed move
    Nommed,  // committed move onto a morsel
    Escaped, // all morsels eaten and the exit reached
}

#[derive(Debug, Default)]
struct BirdHaus {
    map: TileMap,
    bird: Snekbird,
    morsels: Vec<Morsel>,
}

impl BirdHaus {
    fn new(rows: &[&str], start: Pos) -> Self {
        let (map, food) = TileMap::parse(rows);
        BirdHaus {
            map,
            bird: Snekbird::new(start),
            morsels: food
                .into_iter()
                .map(|pos| Morsel { pos, active: true })
                .collect(),
        }
    }

    fn level_one() -> Self {
        let start = Pos {
            x: MAP[0].len() as i32 / 2,
            y: MAP.len() as i32 / 2,
        };
        BirdHaus::new(&MAP, start)
    }

    fn active_count(&self) -> usize {
        self.morsels.iter().filter(|m| m.active).count()
    }

    fn is_morsel_at(&self, pos: Pos) -> bool {
        self.morsels.iter().any(|m| m.active && m.pos == pos)
    }

    // Deactivation is permanent; an already-eaten morsel never matches
    // again. First active match wins.
    fn consume_at(&mut self, pos: Pos) -> bool {
        if !self.is_morsel_at(pos) {
            return false;
        }
        if let Some(morsel) = self.morsels.iter_mut().find(|m| m.active && m.pos == pos) {
            morsel.active = false;
        }
        true
    }

    // The chain hangs from its tail: it falls whenever the tile directly
    // below the tail is open. Morsels do not block falling.
    fn is_falling(&self) -> bool {
        let below_tail = self.bird.tail().step(Dir::South.into());
        !self.map.is_solid(below_tail)
    }

    /// One simulation step. Gravity overrides the wished direction for
    /// the whole tick; an invalid destination leaves every segment
    /// exactly where it was.
    fn tick(&mut self, wish: Option<Dir>) -> TickResult {
        let dir = if self.is_falling() {
            Some(Dir::South)
        } else {
            wish
        };
        let Some(dir) = dir else {
            return TickResult::Idle;
        };

        let next_head = self.bird.head().step(dir.into());
        if self.map.is_solid(next_head) || self.bird.would_bite_itself(next_head) {
            return TickResult::Blocked;
        }

        let vacated = self.bird.advance(next_head);

        // At most one morsel per tick
        let nommed = self.consume_at(next_head);
        if nommed {
            self.bird.grow(vacated);
        }

        // Both conditions must hold in the same tick
        if self.active_count() == 0 && next_head == self.map.exit {
            return TickResult::Escaped;
        }

        if nommed {
            TickResult::Nommed
        } else {
            TickResult::Ongoing
        }
    }
}

#[derive(Debug)]
enum GameState {
    Playing(BirdHaus),
    Paused(BirdHaus),
    GameOver { haus: BirdHaus, exit_reached: bool },
    Exit,
}

struct Game {
    state: GameState,
    pending_move: Option<Dir>,
}

impl Game {
    fn new() -> Self {
        info!("Starting level");
        Game {
            state: GameState::Playing(BirdHaus::level_one()),
            pending_move: None,
        }
    }

    fn render(&self, frame: &mut Frame) {
        let title_text = match &self.state {
            GameState::Playing(haus) | GameState::Paused(haus) => {
                format!("SNEKBIRD    Morsels left: {}", haus.active_count())
            }
            GameState::GameOver {
                exit_reached: true, ..
            } => "SNEKBIRD    Level complete".to_string(),
            _ => "SNEKBIRD".to_string(),
        };

        let size = frame.area();
        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3), // Title bar
                Constraint::Min(0),    // Game area
            ])
            .split(size);

        frame.render_widget(
            Paragraph::new(title_text)
                .alignment(Alignment::Left)
                .block(Block::default().borders(Borders::ALL)),
            layout[0],
        );

        // Game area - different for each state
        match &self.state {
            GameState::Playing(haus) => {
                let block = Block::default().title("Playing").borders(Borders::ALL);
                let inner_area = block.inner(layout[1]);

                frame.render_widget(block, layout[1]);
                frame.render_widget(haus, inner_area);
            }
            GameState::Paused(haus) => {
                let block = Block::default()
                    .title("Paused. Press SPACE to continue")
                    .borders(Borders::ALL);
                let inner_area = block.inner(layout[1]);

                frame.render_widget(block, layout[1]);
                frame.render_widget(haus, inner_area);
                frame.render_widget(
                    Paragraph::new("GAME PAUSED").alignment(Alignment::Center),
                    inner_area,
                );
            }
            GameState::GameOver { haus, exit_reached } => {
                let block = Block::default().borders(Borders::ALL);
                let inner_area = block.inner(layout[1]);

                frame.render_widget(block, layout[1]);
                frame.render_widget(haus, inner_area);

                let headline = if *exit_reached {
                    "LEVEL COMPLETE!"
                } else {
                    "GAME OVER"
                };
                frame.render_widget(
                    Paragraph::new(format!("{}\nPress ENTER to play again", headline))
                        .alignment(Alignment::Center),
                    inner_area,
                );
            }
            GameState::Exit => {}
        }
    }

    fn handle_input(&mut self, key: event::KeyEvent) {
        use event::KeyCode;

        // Movement only registers while playing; the first movement event
        // in a tick window wins, later ones are dropped.
        if let GameState::Playing(_) = self.state {
            if let Some(dir) = Dir::from_key(key.code) {
                self.pending_move.get_or_insert(dir);
                return;
            }
        }

        let new_state = match &mut self.state {
            GameState::Playing(haus) => match key.code {
                KeyCode::Esc => Some(GameState::Exit),
                KeyCode::Char('q') => {
                    info!("Resigned with {} morsels left", haus.active_count());
                    Some(GameState::GameOver {
                        haus: std::mem::take(haus),
                        exit_reached: false,
                    })
                }
                KeyCode::Char(' ') | KeyCode::Char('p') => {
                    Some(GameState::Paused(std::mem::take(haus)))
                }
                _ => None,
            },
            GameState::Paused(haus) => match key.code {
                KeyCode::Esc => Some(GameState::Exit),
                KeyCode::Char(' ') | KeyCode::Char('p') => {
                    Some(GameState::Playing(std::mem::take(haus)))
                }
                _ => None,
            },
            GameState::GameOver { .. } => match key.code {
                KeyCode::Esc | KeyCode::Char('q') => Some(GameState::Exit),
                KeyCode::Enter | KeyCode::Char(' ') => {
                    info!("Restarting level");
                    Some(GameState::Playing(BirdHaus::level_one()))
                }
                _ => None,
            },
            GameState::Exit => None,
        };

        if let Some(new_state) = new_state {
            // A state change never carries a queued move across
            self.pending_move = None;
            self.state = new_state;
        }
    }

    fn update(&mut self) {
        let wish = self.pending_move.take();
        match &mut self.state {
            GameState::Playing(haus) => match haus.tick(wish) {
                TickResult::Escaped => {
                    info!("Level complete");
                    let haus = std::mem::take(haus);
                    self.state = GameState::GameOver {
                        haus,
                        exit_reached: true,
                    };
                }
                TickResult::Nommed => {
                    info!(
                        "Nommed a morsel, {} to go, length {}",
                        haus.active_count(),
                        haus.bird.len()
                    );
                }
                _ => {}
            },
            _ => {}
        }
    }
}

impl Widget for &BirdHaus {
    fn render(self, area: Rect, buf: &mut Buffer) {
        // One grid tile maps to one terminal cell; tiles that do not fit
        // in the area are skipped.
        let cell = |pos: Pos| -> Option<(u16, u16)> {
            if pos.x < 0 || pos.y < 0 {
                return None;
            }
            let (x, y) = (pos.x as u16, pos.y as u16);
            if x >= area.width || y >= area.height {
                return None;
            }
            Some((x + area.x, y + area.y))
        };

        for pos in &self.map.solids {
            if let Some(c) = cell(*pos) {
                buf[c].set_symbol(" ").set_bg(Color::DarkGray);
            }
        }

        // The exit opens once the last morsel is gone
        let exit_symbol = if self.active_count() == 0 { "◉" } else { "◎" };
        if let Some(c) = cell(self.map.exit) {
            buf[c].set_symbol(exit_symbol).set_fg(Color::White);
        }

        for morsel in &self.morsels {
            if morsel.active {
                if let Some(c) = cell(morsel.pos) {
                    buf[c].set_symbol("●").set_fg(Color::Yellow);
                }
            }
        }

        for (i, pos) in self.bird.body.iter().enumerate() {
            if let Some(c) = cell(*pos) {
                let color = if i == 0 {
                    Color::LightGreen
                } else {
                    Color::Green
                };
                buf[c].set_symbol(" ").set_bg(color);
            }
        }
    }
}

// src/tui.rs
//
// Terminal operator view: e-paper pane on the left, log pane on the right.
// The reader runs on its own thread; this loop only waits on the event
// channel and the keyboard.

use std::collections::VecDeque;
use std::future::Future;
use std::io::{self, Stdout};

use crossterm::event::{Event, EventStream, KeyCode, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use futures::StreamExt;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Layout, Rect};
use ratatui::style::{Color, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Paragraph};
use ratatui::{Frame, Terminal};

use crate::framebuffer::PixelGrid;
use crate::io::{EventReceiver, FrameGeometry, IODevice};
use crate::sink::{route_sim_event, DisplaySink};

const INK: Color = Color::Black;
const PAPER: Color = Color::White;

// ============================================================================
// View State
// ============================================================================

/// Everything the screen shows. Only the latest image is kept.
pub struct TuiSink {
    geometry: FrameGeometry,
    lines: VecDeque<String>,
    history: usize,
    image: Option<PixelGrid>,
    frames: usize,
    /// Rendered image for a given pane size (cols, rows)
    rendered: Option<((u16, u16), Vec<Line<'static>>)>,
}

impl TuiSink {
    pub fn new(geometry: FrameGeometry, history: usize) -> Self {
        TuiSink {
            geometry,
            lines: VecDeque::new(),
            history: history.max(1),
            image: None,
            frames: 0,
            rendered: None,
        }
    }

    pub fn clear_log(&mut self) {
        self.lines.clear();
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(|s| s.as_str())
    }

    fn image_lines(&mut self, cols: u16, rows: u16) -> Vec<Line<'static>> {
        let grid = match &self.image {
            Some(g) => g,
            None => return Vec::new(),
        };
        match &self.rendered {
            Some((size, lines)) if *size == (cols, rows) => lines.clone(),
            _ => {
                let lines = render_grid(grid, cols, rows);
                self.rendered = Some(((cols, rows), lines.clone()));
                lines
            }
        }
    }
}

impl DisplaySink for TuiSink {
    fn log_line(&mut self, line: &str) {
        if self.lines.len() == self.history {
            self.lines.pop_front();
        }
        self.lines.push_back(line.to_string());
    }

    fn show_image(&mut self, grid: &PixelGrid) {
        self.frames += 1;
        self.image = Some(grid.clone());
        self.rendered = None;
    }
}

// ============================================================================
// Rendering
// ============================================================================

/// Downscale `grid` to fit `cols` x `rows` terminal cells using upper half
/// blocks (two vertical samples per cell). A sample is ink when any source
/// pixel it covers is dark, so thin strokes survive the scaling.
pub fn render_grid(grid: &PixelGrid, cols: u16, rows: u16) -> Vec<Line<'static>> {
    let (cols, rows) = (cols as usize, rows as usize);
    if cols == 0 || rows == 0 || grid.width() == 0 || grid.height() == 0 {
        return Vec::new();
    }

    let scale = grid
        .width()
        .div_ceil(cols)
        .max(grid.height().div_ceil(rows * 2))
        .max(1);
    let sample_cols = grid.width().div_ceil(scale);
    let sample_rows = grid.height().div_ceil(scale);

    let sample = |sx: usize, sy: usize| -> bool {
        let x_end = ((sx + 1) * scale).min(grid.width());
        let y_end = ((sy + 1) * scale).min(grid.height());
        (sy * scale..y_end).any(|y| (sx * scale..x_end).any(|x| grid.is_dark(x, y)))
    };

    (0..sample_rows.div_ceil(2))
        .map(|row| {
            let spans: Vec<Span<'static>> = (0..sample_cols)
                .map(|sx| {
                    let top = if sample(sx, row * 2) { INK } else { PAPER };
                    // Past the last sample row the lower half is blank terminal
                    let bottom = if row * 2 + 1 >= sample_rows {
                        Color::Reset
                    } else if sample(sx, row * 2 + 1) {
                        INK
                    } else {
                        PAPER
                    };
                    Span::styled("\u{2580}", Style::default().fg(top).bg(bottom))
                })
                .collect();
            Line::from(spans)
        })
        .collect()
}

fn draw(frame: &mut Frame, sink: &mut TuiSink, source: &str) {
    let [main, status] = Layout::vertical([Constraint::Min(3), Constraint::Length(1)]).areas(frame.area());
    let [display_area, log_area] =
        Layout::horizontal([Constraint::Percentage(60), Constraint::Percentage(40)]).areas(main);

    let display_block = Block::bordered().title(format!(
        " E-Paper Display ({}x{}) ",
        sink.geometry.width(),
        sink.geometry.height()
    ));
    let inner = display_block.inner(display_area);
    frame.render_widget(display_block, display_area);

    if sink.image.is_some() {
        let lines = sink.image_lines(inner.width, inner.height);
        frame.render_widget(Paragraph::new(lines).alignment(Alignment::Center), inner);
    } else {
        let waiting = Rect { y: inner.y + inner.height / 2, height: inner.height.min(1), ..inner };
        frame.render_widget(Paragraph::new("Waiting for image...").alignment(Alignment::Center), waiting);
    }

    let log_block = Block::bordered().title(" Log Output ");
    let visible = log_block.inner(log_area).height as usize;
    let skip = sink.lines.len().saturating_sub(visible);
    let log_lines: Vec<Line> = sink.lines.iter().skip(skip).map(|l| Line::raw(l.as_str())).collect();
    frame.render_widget(Paragraph::new(log_lines).block(log_block), log_area);

    let status_text = format!(" {} | frames: {} | q: quit  c: clear log", source, sink.frames);
    frame.render_widget(Paragraph::new(status_text), status);
}

// ============================================================================
// Event Loop
// ============================================================================

type Term = Terminal<CrosstermBackend<Stdout>>;

/// Raw mode plus alternate screen. Undoes raw mode if the rest fails.
fn setup_terminal() -> Result<Term, String> {
    enable_raw_mode().map_err(|e| format!("Failed to enable raw mode: {}", e))?;

    let mut stdout = io::stdout();
    let entered = execute!(stdout, EnterAlternateScreen);
    let terminal = match entered {
        Ok(()) => Terminal::new(CrosstermBackend::new(stdout)).map_err(|e| format!("Failed to create terminal: {}", e)),
        Err(e) => Err(format!("Failed to enter alternate screen: {}", e)),
    };

    if terminal.is_err() {
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
        let _ = disable_raw_mode();
    }
    terminal
}

fn restore_terminal(terminal: &mut Term) {
    let _ = disable_raw_mode();
    let _ = execute!(terminal.backend_mut(), LeaveAlternateScreen);
    let _ = terminal.show_cursor();
}

/// Start `device`, run `session` with its source name, then stop the device
/// however the session ended.
async fn run_started<F, Fut>(device: &mut dyn IODevice, session: F) -> Result<(), String>
where
    F: FnOnce(String) -> Fut,
    Fut: Future<Output = Result<(), String>>,
{
    device.start().await?;
    let result = session(device.source_name().to_string()).await;
    let stopped = device.stop().await;
    result.and(stopped)
}

/// Run the interactive view until the operator quits, then stop the device.
pub async fn run_tui(device: &mut dyn IODevice, mut events: EventReceiver, mut sink: TuiSink) -> Result<(), String> {
    let mut terminal = setup_terminal()?;
    crate::logging::set_console_logging(false);

    let (term, rx, view) = (&mut terminal, &mut events, &mut sink);
    let result = run_started(device, move |source| event_loop(term, rx, view, source)).await;

    restore_terminal(&mut terminal);
    crate::logging::set_console_logging(true);
    result
}

async fn event_loop(
    terminal: &mut Term,
    events: &mut EventReceiver,
    sink: &mut TuiSink,
    source: String,
) -> Result<(), String> {
    let mut keys = EventStream::new();
    let mut channel_open = true;

    loop {
        terminal
            .draw(|f| draw(f, sink, &source))
            .map_err(|e| format!("Failed to draw: {}", e))?;

        tokio::select! {
            event = events.recv(), if channel_open => match event {
                Some(event) => {
                    if !route_sim_event(event, sink) {
                        tlog!("[tui] Stream from {} ended", source);
                    }
                }
                None => channel_open = false,
            },
            key = keys.next() => match key {
                Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => match key.code {
                    KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                    KeyCode::Char('c') => sink.clear_log(),
                    _ => {}
                },
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(format!("Failed to read terminal input: {}", e)),
                None => return Ok(()),
            },
        }
    }
}

//! Crossterm backend: stimuli are rasterised onto character cells, keys and
//! mouse events are pumped without blocking.

use std::io::{self, BufWriter, Stdout, Write};
use std::thread;
use std::time::{Duration, Instant};

use crossterm::cursor::{Hide, MoveTo, Show};
use crossterm::event::{
    poll, read, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
    MouseButton, MouseEvent, MouseEventKind,
};
use crossterm::style::{Color, Print, ResetColor, SetBackgroundColor, SetForegroundColor};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, Clear, ClearType, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::{execute, queue};
use tracing::{debug, warn};

use schizoid::draw::{HAlign, Screen, Stimulus, TextStim, Units, VAlign};
use schizoid::input::{Input, Pointer};

/// Virtual pixel size of one cell, for pixel-unit stimuli.
pub const CELL_W: f32 = 8.0;
pub const CELL_H: f32 = 16.0;

/// Cell geometry of the terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grid {
    pub cols: u16,
    pub rows: u16,
}

impl Grid {
    pub fn to_cell(&self, pos: (f32, f32), units: Units) -> (i32, i32) {
        let (cols, rows) = (self.cols as f32, self.rows as f32);
        let (col, row) = match units {
            Units::Norm => ((pos.0 + 1.0) / 2.0 * cols, (1.0 - pos.1) / 2.0 * rows),
            Units::Pix => (cols / 2.0 + pos.0 / CELL_W, rows / 2.0 - pos.1 / CELL_H),
        };
        (col.floor() as i32, row.floor() as i32)
    }

    /// Centre of a cell in norm units.
    pub fn to_norm(&self, col: u16, row: u16) -> (f32, f32) {
        let x = (col as f32 + 0.5) / self.cols as f32 * 2.0 - 1.0;
        let y = 1.0 - (row as f32 + 0.5) / self.rows as f32 * 2.0;
        (x, y)
    }

    pub fn norm_cols(&self, width: f32) -> i32 {
        (width / 2.0 * self.cols as f32).round() as i32
    }

    pub fn norm_rows(&self, height: f32) -> i32 {
        (height / 2.0 * self.rows as f32).round() as i32
    }

    pub fn contains(&self, col: i32, row: i32) -> bool {
        col >= 0 && row >= 0 && col < self.cols as i32 && row < self.rows as i32
    }
}

pub fn color(name: &str) -> Color {
    match name.to_ascii_lowercase().as_str() {
        "red" => Color::Red,
        "darkred" => Color::DarkRed,
        "green" => Color::Green,
        "darkgreen" => Color::DarkGreen,
        "blue" => Color::Blue,
        "darkblue" => Color::DarkBlue,
        "yellow" => Color::Yellow,
        "gray" | "grey" | "lightgray" | "lightgrey" => Color::Grey,
        "darkgray" | "darkgrey" => Color::DarkGrey,
        "white" => Color::White,
        "black" => Color::Black,
        _ => Color::Reset,
    }
}

/// Lowercase key name as the runtime expects it.
pub fn key_name(code: KeyCode) -> Option<String> {
    let name = match code {
        KeyCode::Char(' ') => "space".to_string(),
        KeyCode::Char(c) => c.to_lowercase().to_string(),
        KeyCode::Esc => "escape".to_string(),
        KeyCode::Enter => "return".to_string(),
        KeyCode::Tab => "tab".to_string(),
        KeyCode::Backspace => "backspace".to_string(),
        KeyCode::Left => "left".to_string(),
        KeyCode::Right => "right".to_string(),
        KeyCode::Up => "up".to_string(),
        KeyCode::Down => "down".to_string(),
        KeyCode::F(n) => format!("f{}", n),
        _ => return None,
    };
    Some(name)
}

/// Splits `text` into lines no wider than `width` cells, breaking at spaces.
pub fn wrap_lines(text: &str, width: Option<usize>) -> Vec<String> {
    let mut lines = Vec::new();
    for paragraph in text.split('\n') {
        let Some(width) = width.filter(|w| *w > 0) else {
            lines.push(paragraph.to_string());
            continue;
        };
        let mut line = String::new();
        for word in paragraph.split_whitespace() {
            if !line.is_empty() && line.chars().count() + 1 + word.chars().count() > width {
                lines.push(std::mem::take(&mut line));
            }
            if !line.is_empty() {
                line.push(' ');
            }
            line.push_str(word);
        }
        lines.push(line);
    }
    lines
}

fn button_index(button: MouseButton) -> usize {
    match button {
        MouseButton::Left => 0,
        MouseButton::Middle => 1,
        MouseButton::Right => 2,
    }
}

pub struct Terminal {
    out: BufWriter<Stdout>,
    grid: Grid,
    keys: Vec<String>,
    held: [bool; 3],
    /// Presses seen since the pointer was last read, so a quick click is
    /// not lost between polls.
    latched: [bool; 3],
    pos: (f32, f32),
    background: Color,
    frame_open: bool,
    frame_interval: Duration,
    last_flip: Instant,
    active: bool,
}

impl Terminal {
    pub fn open(frame_interval: Duration) -> io::Result<Self> {
        let (cols, rows) = crossterm::terminal::size()?;
        enable_raw_mode()?;
        let mut out = BufWriter::new(io::stdout());
        execute!(out, EnterAlternateScreen, EnableMouseCapture, Hide, Clear(ClearType::All))?;
        debug!("Terminal opened at {}x{} cells", cols, rows);
        Ok(Self {
            out,
            grid: Grid { cols, rows },
            keys: Vec::new(),
            held: [false; 3],
            latched: [false; 3],
            pos: (0.0, 0.0),
            background: Color::Reset,
            frame_open: false,
            frame_interval,
            last_flip: Instant::now(),
            active: true,
        })
    }

    pub fn grid(&self) -> Grid {
        self.grid
    }

    pub(crate) fn out(&mut self) -> &mut BufWriter<Stdout> {
        &mut self.out
    }

    /// Blocks for the next key press, for modal dialogs.
    pub(crate) fn read_key(&mut self) -> io::Result<KeyEvent> {
        loop {
            match read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => return Ok(key),
                Event::Resize(cols, rows) => self.grid = Grid { cols, rows },
                _ => {}
            }
        }
    }

    fn pump(&mut self) {
        loop {
            match poll(Duration::ZERO) {
                Ok(true) => {}
                Ok(false) => return,
                Err(e) => {
                    warn!("Event poll failed: {}", e);
                    return;
                }
            }
            match read() {
                Ok(Event::Key(key)) if key.kind == KeyEventKind::Press => {
                    if let Some(name) = key_name(key.code) {
                        self.keys.push(name);
                    }
                }
                Ok(Event::Mouse(mouse)) => self.on_mouse(mouse),
                Ok(Event::Resize(cols, rows)) => self.grid = Grid { cols, rows },
                Ok(_) => {}
                Err(e) => {
                    warn!("Event read failed: {}", e);
                    return;
                }
            }
        }
    }

    fn on_mouse(&mut self, mouse: MouseEvent) {
        self.pos = self.grid.to_norm(mouse.column, mouse.row);
        match mouse.kind {
            MouseEventKind::Down(b) => {
                self.held[button_index(b)] = true;
                self.latched[button_index(b)] = true;
            }
            MouseEventKind::Up(b) => self.held[button_index(b)] = false,
            _ => {}
        }
    }

    fn begin_frame(&mut self) -> io::Result<()> {
        if !self.frame_open {
            queue!(self.out, SetBackgroundColor(self.background), Clear(ClearType::All))?;
            self.frame_open = true;
        }
        Ok(())
    }

    fn put(&mut self, col: i32, row: i32, text: &str, fg: Color) -> io::Result<()> {
        if row < 0 || row >= self.grid.rows as i32 {
            return Ok(());
        }
        let skip = (-col).max(0) as usize;
        let room = (self.grid.cols as i32 - col.max(0)).max(0) as usize;
        let visible: String = text.chars().skip(skip).take(room).collect();
        if visible.is_empty() {
            return Ok(());
        }
        queue!(
            self.out,
            MoveTo(col.max(0) as u16, row as u16),
            SetForegroundColor(fg),
            Print(visible)
        )
    }

    fn draw_text(&mut self, t: &TextStim) -> io::Result<()> {
        let (col, row) = self.grid.to_cell(t.pos, Units::Norm);
        let width = t.wrap.map(|w| self.grid.norm_cols(w).max(1) as usize);
        let lines = wrap_lines(&t.text, width);
        let n = lines.len() as i32;
        let top = match t.v_align {
            VAlign::Top => row,
            VAlign::Center => row - n / 2,
            VAlign::Bottom => row - n + 1,
        };
        let fg = color(&t.style.color);
        for (i, line) in lines.iter().enumerate() {
            let len = line.chars().count() as i32;
            let start = match t.h_align {
                HAlign::Left => col,
                HAlign::Center => col - len / 2,
                HAlign::Right => col - len + 1,
            };
            self.put(start, top + i as i32, line, fg)?;
        }
        Ok(())
    }

    fn fill(&mut self, cells: impl IntoIterator<Item = (i32, i32)>, glyph: char, fg: Color) -> io::Result<()> {
        let glyph = glyph.to_string();
        for (col, row) in cells {
            if self.grid.contains(col, row) {
                self.put(col, row, &glyph, fg)?;
            }
        }
        Ok(())
    }
}

impl Screen for Terminal {
    fn size(&self) -> (u32, u32) {
        (
            (self.grid.cols as f32 * CELL_W) as u32,
            (self.grid.rows as f32 * CELL_H) as u32,
        )
    }

    fn set_background(&mut self, name: &str) {
        self.background = color(name);
    }

    fn draw(&mut self, stimulus: &Stimulus) -> io::Result<()> {
        self.begin_frame()?;
        match stimulus {
            Stimulus::Text(t) => self.draw_text(t),
            Stimulus::Rect(r) => {
                let (c0, r0) = self.grid.to_cell(r.pos, r.units);
                let (w, h) = match r.units {
                    Units::Norm => (self.grid.norm_cols(r.width), self.grid.norm_rows(r.height)),
                    Units::Pix => ((r.width / CELL_W).round() as i32, (r.height / CELL_H).round() as i32),
                };
                let (w, h) = (w.max(1), h.max(1));
                let cells = (0..h).flat_map(|dy| (0..w).map(move |dx| (c0 - w / 2 + dx, r0 - h / 2 + dy)));
                self.fill(cells.collect::<Vec<_>>(), '█', color(&r.fill))
            }
            Stimulus::Circle(c) => {
                let (cx, cy) = self.grid.to_cell(c.pos, Units::Norm);
                let rc = self.grid.norm_cols(c.radius).max(1);
                let rr = self.grid.norm_rows(c.radius).max(1);
                let mut cells = Vec::new();
                for dy in -rr..=rr {
                    for dx in -rc..=rc {
                        let (nx, ny) = (dx as f32 / rc as f32, dy as f32 / rr as f32);
                        if nx * nx + ny * ny <= 1.0 {
                            cells.push((cx + dx, cy + dy));
                        }
                    }
                }
                self.fill(cells, '░', color(&c.fill))
            }
            Stimulus::Line(l) => {
                let (c0, r0) = self.grid.to_cell(l.from, Units::Norm);
                let (c1, r1) = self.grid.to_cell(l.to, Units::Norm);
                let glyph = if r0 == r1 {
                    '─'
                } else if c0 == c1 {
                    '│'
                } else {
                    '·'
                };
                let steps = (c1 - c0).abs().max((r1 - r0).abs()).max(1);
                let cells: Vec<(i32, i32)> = (0..=steps)
                    .map(|i| {
                        let t = i as f32 / steps as f32;
                        (
                            (c0 as f32 + t * (c1 - c0) as f32).round() as i32,
                            (r0 as f32 + t * (r1 - r0) as f32).round() as i32,
                        )
                    })
                    .collect();
                self.fill(cells, glyph, color(&l.color))
            }
            Stimulus::Group(parts) => parts.iter().try_for_each(|p| self.draw(p)),
        }
    }

    fn flip(&mut self) -> io::Result<()> {
        self.begin_frame()?;
        self.out.flush()?;
        self.frame_open = false;

        let next = self.last_flip + self.frame_interval;
        let now = Instant::now();
        if next > now {
            thread::sleep(next - now);
        }
        self.last_flip = Instant::now();
        Ok(())
    }

    fn close(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        if let Err(e) = execute!(self.out, ResetColor, Show, DisableMouseCapture, LeaveAlternateScreen) {
            warn!("Failed to restore terminal: {}", e);
        }
        if let Err(e) = disable_raw_mode() {
            warn!("Failed to leave raw mode: {}", e);
        }
    }
}

impl Input for Terminal {
    fn keys(&mut self) -> Vec<String> {
        self.pump();
        std::mem::take(&mut self.keys)
    }

    fn clear_events(&mut self) {
        self.pump();
        self.keys.clear();
    }

    fn pointer(&mut self) -> Pointer {
        self.pump();
        let mut buttons = self.held;
        for (b, latched) in buttons.iter_mut().zip(self.latched) {
            *b |= latched;
        }
        self.latched = [false; 3];
        Pointer { buttons, pos: self.pos }
    }
}

impl Drop for Terminal {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn norm_and_pixel_mapping() {
        let grid = Grid { cols: 80, rows: 24 };
        assert_eq!(grid.to_cell((-1.0, 1.0), Units::Norm), (0, 0));
        assert_eq!(grid.to_cell((0.0, 0.0), Units::Norm), (40, 12));
        assert_eq!(grid.to_cell((16.0, 32.0), Units::Pix), (42, 10));

        let (x, y) = grid.to_norm(40, 12);
        assert!(x > 0.0 && x < 0.05);
        assert!(y < 0.0 && y > -0.1);
        assert_eq!(grid.to_cell(grid.to_norm(17, 5), Units::Norm), (17, 5));
    }

    #[test]
    fn key_names_match_runtime_convention() {
        assert_eq!(key_name(KeyCode::Esc).as_deref(), Some("escape"));
        assert_eq!(key_name(KeyCode::Char('Y')).as_deref(), Some("y"));
        assert_eq!(key_name(KeyCode::Char(' ')).as_deref(), Some("space"));
        assert_eq!(key_name(KeyCode::Home), None);
    }

    #[test]
    fn wrapping_breaks_at_spaces() {
        assert_eq!(wrap_lines("one two three", Some(7)), vec!["one two", "three"]);
        assert_eq!(wrap_lines("a\nb", None), vec!["a", "b"]);
        assert_eq!(wrap_lines("unbreakable", Some(4)), vec!["unbreakable"]);
    }

    #[test]
    fn unknown_colors_use_terminal_default() {
        assert_eq!(color("Black"), Color::Black);
        assert_eq!(color("chartreuse"), Color::Reset);
        assert_eq!(color("darkgreen"), Color::DarkGreen);
    }
}

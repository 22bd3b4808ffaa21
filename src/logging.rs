//! Process-wide logger setup and a level-colored record formatter.
//!
//! The crate itself only logs through the `log` facade. Applications that
//! want the colored stderr output call [`init`] (or [`try_init_file`] for a
//! plain log file) once at startup. `RUST_LOG` overrides the default `debug`
//! filter.

use crate::error::Result;
use chrono::{Local, NaiveDateTime};
use console::{Color, Style};
use env_logger::{Builder, Env, Target};
use log::{Level, Record};
use std::collections::HashMap;
use std::env;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

pub const DEFAULT_DATEFMT: &str = "%m-%d-%Y %H:%M:%S";

/// Default color of each level.
pub fn default_colors() -> HashMap<Level, Color> {
    HashMap::from([
        (Level::Warn, Color::Yellow),
        (Level::Info, Color::White),
        (Level::Debug, Color::Blue),
        (Level::Trace, Color::Cyan),
        (Level::Error, Color::Red),
    ])
}

/// Renders `<timestamp> - <module>.<target>:<line> - <LEVEL>: <message>`.
#[derive(Debug, Clone)]
pub struct ColoredFormatter {
    colors: HashMap<Level, Color>,
    use_color: bool,
    datefmt: String,
}

impl Default for ColoredFormatter {
    fn default() -> Self {
        ColoredFormatter {
            colors: default_colors(),
            use_color: detect_color_support(),
            datefmt: DEFAULT_DATEFMT.to_string(),
        }
    }
}

impl ColoredFormatter {
    pub fn new() -> ColoredFormatter {
        ColoredFormatter::default()
    }

    /// Formatter without any styling, for log files.
    pub fn plain() -> ColoredFormatter {
        ColoredFormatter::default().use_color(false)
    }

    pub fn colors(mut self, colors: HashMap<Level, Color>) -> ColoredFormatter {
        self.colors = colors;
        self
    }

    pub fn use_color(mut self, use_color: bool) -> ColoredFormatter {
        self.use_color = use_color;
        self
    }

    pub fn datefmt(mut self, datefmt: &str) -> ColoredFormatter {
        self.datefmt = datefmt.to_string();
        self
    }

    pub fn format_record(&self, record: &Record) -> String {
        self.render(Local::now().naive_local(), record)
    }

    fn paint(&self, style: Style, text: &str) -> String {
        if self.use_color {
            style.force_styling(true).apply_to(text).to_string()
        } else {
            text.to_string()
        }
    }

    pub(crate) fn render(&self, timestamp: NaiveDateTime, record: &Record) -> String {
        let target = record.target();
        let module = record.module_path().unwrap_or(target);
        let location = if module == target {
            format!("{}:{}", module, record.line().unwrap_or(0))
        } else {
            format!("{}.{}:{}", module, target, record.line().unwrap_or(0))
        };

        let level = record.level();
        let level_style = match self.colors.get(&level) {
            Some(color) => Style::new().fg(*color),
            None => Style::new(),
        };

        format!(
            "{} - {} - {}: {}",
            self.paint(
                Style::new().black().bright(),
                &timestamp.format(&self.datefmt).to_string()
            ),
            self.paint(Style::new().blue().bright(), &location),
            self.paint(level_style, level.as_str()),
            record.args()
        )
    }
}

fn detect_color_support() -> bool {
    if env::var_os("NO_COLOR").is_some() {
        return false;
    }
    if env::var("TERM").is_ok_and(|v| v == "dumb") {
        return false;
    }
    console::Term::stderr().features().colors_supported()
}

fn builder() -> Builder {
    Builder::from_env(Env::default().default_filter_or("debug"))
}

/// Installs the colored stderr logger, ignoring an already installed one.
pub fn init() {
    let _ = try_init();
}

pub fn try_init() -> Result<()> {
    let formatter = ColoredFormatter::new();
    builder()
        .target(Target::Stderr)
        .format(move |buf, record| writeln!(buf, "{}", formatter.format_record(record)))
        .try_init()?;
    Ok(())
}

/// Installs a logger appending plain records to `path`.
pub fn try_init_file(path: impl AsRef<Path>) -> Result<()> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let formatter = ColoredFormatter::plain();
    builder()
        .target(Target::Pipe(Box::new(file)))
        .format(move |buf, record| writeln!(buf, "{}", formatter.format_record(record)))
        .try_init()?;
    Ok(())
}

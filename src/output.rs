//! # Terminal Output
//!
//! Presentation settings for the `hopper` binary. Layer paths and pin
//! documents go to stdout untouched so they can be piped; everything here
//! decorates the human-facing lines around them:
//!
//! - a [`Marker`] in front of summary lines, an emoji on colour terminals
//!   and a bracketed tag otherwise,
//! - the spinner shown while clones are reconciled,
//! - `--quiet`, which drops status lines and the spinner.
//!
//! `--color=always|never` decides colour outright. In `auto` mode `NO_COLOR`,
//! `CLICOLOR=0`, `CLICOLOR_FORCE` and `TERM=dumb` are consulted before asking
//! the terminal.

use std::borrow::Cow;
use std::env;
use std::fmt::Display;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

const SPINNER_TEMPLATE: &str = "{spinner} {msg} [{elapsed}]";
const SPINNER_TICK: Duration = Duration::from_millis(120);

/// Prefix of a status or summary line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    Ok,
    Fail,
    Layers,
    Clones,
    Watch,
}

impl Marker {
    fn glyph(self) -> &'static str {
        match self {
            Marker::Ok => "✅",
            Marker::Fail => "❌",
            Marker::Layers => "📚",
            Marker::Clones => "📦",
            Marker::Watch => "👀",
        }
    }

    fn tag(self) -> &'static str {
        match self {
            Marker::Ok => "[OK]",
            Marker::Fail => "[FAIL]",
            Marker::Layers => "[LAYERS]",
            Marker::Clones => "[CLONES]",
            Marker::Watch => "[WATCH]",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputConfig {
    use_color: bool,
    quiet: bool,
}

impl OutputConfig {
    /// Settings for a `--color` value of `always`, `never` or `auto`.
    pub fn from_env_and_flag(color_flag: &str) -> Self {
        let use_color = match color_flag.to_lowercase().as_str() {
            "always" => true,
            "never" => false,
            _ => color_from_env().unwrap_or_else(|| {
                console::Term::stdout().features().colors_supported()
            }),
        };
        Self {
            use_color,
            quiet: false,
        }
    }

    /// No colour, no spinner, status lines still printed.
    pub fn plain() -> Self {
        Self {
            use_color: false,
            quiet: false,
        }
    }

    pub fn quiet(self, quiet: bool) -> Self {
        Self { quiet, ..self }
    }

    pub fn use_color(&self) -> bool {
        self.use_color
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    pub fn marker(&self, marker: Marker) -> &'static str {
        if self.use_color {
            marker.glyph()
        } else {
            marker.tag()
        }
    }

    /// Print a marked status line to stderr unless quiet.
    pub fn status(&self, marker: Marker, message: impl Display) {
        if !self.quiet {
            eprintln!("{} {}", self.marker(marker), message);
        }
    }

    /// A steady-ticking spinner on stderr, or a hidden bar when quiet, when
    /// colour is off, or when nobody is watching stderr.
    pub fn spinner(&self, message: impl Into<Cow<'static, str>>) -> ProgressBar {
        let bar = if self.shows_progress() {
            let bar = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::with_template(SPINNER_TEMPLATE) {
                bar.set_style(style);
            }
            bar.enable_steady_tick(SPINNER_TICK);
            bar
        } else {
            ProgressBar::hidden()
        };
        bar.set_message(message);
        bar
    }

    fn shows_progress(&self) -> bool {
        !self.quiet && self.use_color && console::Term::stderr().features().is_attended()
    }
}

fn color_from_env() -> Option<bool> {
    color_from_vars(
        env::var_os("NO_COLOR").is_some(),
        env::var("CLICOLOR").ok().as_deref(),
        env::var("CLICOLOR_FORCE").ok().as_deref(),
        env::var("TERM").ok().as_deref(),
    )
}

/// Colour decided by the environment alone; `None` leaves it to the
/// terminal. `NO_COLOR` wins even when empty.
fn color_from_vars(
    no_color: bool,
    clicolor: Option<&str>,
    clicolor_force: Option<&str>,
    term: Option<&str>,
) -> Option<bool> {
    if no_color || clicolor == Some("0") {
        return Some(false);
    }
    if clicolor_force.is_some_and(|v| !v.is_empty() && v != "0") {
        return Some(true);
    }
    if term == Some("dumb") {
        return Some(false);
    }
    None
}

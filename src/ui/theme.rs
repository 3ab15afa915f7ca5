use owo_colors::Style;
use std::sync::OnceLock;

static THEME: OnceLock<Theme> = OnceLock::new();

/// Terminal styles for CLI output roles
#[derive(Debug, Clone)]
pub struct Theme {
    pub heading: Style,
    pub ok: Style,
    pub failure: Style,
    pub caution: Style,
    pub label: Style,
    pub key: Style,
}

impl Theme {
    /// Colors only when stdout is a terminal and `NO_COLOR` is unset
    pub fn detect() -> Self {
        let no_color = std::env::var_os("NO_COLOR").is_some_and(|v| !v.is_empty());
        if no_color || !console::Term::stdout().is_term() {
            Self::plain()
        } else {
            Self::colored()
        }
    }

    pub fn colored() -> Self {
        Self {
            heading: Style::new().blue().bold(),
            ok: Style::new().green(),
            failure: Style::new().red().bold(),
            caution: Style::new().yellow(),
            label: Style::new().dimmed(),
            key: Style::new().cyan(),
        }
    }

    pub fn plain() -> Self {
        let s = Style::new();
        Self { heading: s, ok: s, failure: s, caution: s, label: s, key: s }
    }
}

pub fn theme() -> &'static Theme {
    THEME.get_or_init(Theme::detect)
}


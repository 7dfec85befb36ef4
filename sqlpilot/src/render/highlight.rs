use crate::config::DEFAULT_SYNTAX_THEME;
use lazy_static::lazy_static;
use log::warn;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use syntect::easy::HighlightLines;
use syntect::highlighting::{FontStyle, Theme, ThemeSet};
use syntect::parsing::SyntaxSet;
use syntect::util::LinesWithEndings;

lazy_static! {
    static ref SYNTAX_SET: SyntaxSet = SyntaxSet::load_defaults_newlines();
    static ref THEME_SET: ThemeSet = ThemeSet::load_defaults();
}

/// Fenced-code highlighter bound to one theme.
#[derive(Debug, Clone, Copy)]
pub struct Highlighter {
    theme: Option<&'static Theme>,
}

impl Highlighter {
    /// Unknown theme names fall back to the default theme.
    pub fn new(theme_name: &str) -> Self {
        let theme = THEME_SET.themes.get(theme_name).or_else(|| {
            warn!(
                "[PHASE: render] [STEP: theme] Unknown syntax theme '{}', using '{}'",
                theme_name, DEFAULT_SYNTAX_THEME
            );
            THEME_SET.themes.get(DEFAULT_SYNTAX_THEME)
        });
        Self { theme }
    }

    /// Highlighter that leaves code unstyled.
    pub fn plain() -> Self {
        Self { theme: None }
    }

    /// Highlight `code` as `language`. Unknown languages use the plain text syntax.
    pub fn highlight(&self, language: &str, code: &str) -> Vec<Line<'static>> {
        let Some(theme) = self.theme else {
            return plain_lines(code);
        };

        let syntax = SYNTAX_SET
            .find_syntax_by_token(language)
            .unwrap_or_else(|| SYNTAX_SET.find_syntax_plain_text());
        let mut h = HighlightLines::new(syntax, theme);

        let mut out = Vec::new();
        for line in LinesWithEndings::from(code) {
            match h.highlight_line(line, &SYNTAX_SET) {
                Ok(regions) => {
                    let spans: Vec<Span<'static>> = regions
                        .into_iter()
                        .map(|(style, text)| {
                            Span::styled(
                                text.trim_end_matches(['\n', '\r']).to_string(),
                                convert_style(style),
                            )
                        })
                        .filter(|s| !s.content.is_empty())
                        .collect();
                    out.push(Line::from(spans));
                }
                Err(e) => {
                    warn!(
                        "[PHASE: render] [STEP: highlight] {} highlighting failed: {}",
                        language, e
                    );
                    return plain_lines(code);
                }
            }
        }
        out
    }
}

fn plain_lines(code: &str) -> Vec<Line<'static>> {
    code.lines().map(|l| Line::from(l.to_string())).collect()
}

fn convert_style(style: syntect::highlighting::Style) -> Style {
    let fg = style.foreground;
    let mut out = Style::default().fg(Color::Rgb(fg.r, fg.g, fg.b));
    if style.font_style.contains(FontStyle::BOLD) {
        out = out.add_modifier(Modifier::BOLD);
    }
    if style.font_style.contains(FontStyle::ITALIC) {
        out = out.add_modifier(Modifier::ITALIC);
    }
    if style.font_style.contains(FontStyle::UNDERLINE) {
        out = out.add_modifier(Modifier::UNDERLINED);
    }
    out
}

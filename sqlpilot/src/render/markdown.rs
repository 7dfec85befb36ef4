// Markdown → terminal lines
//
// Prose becomes styled ratatui lines; fenced code is split out into CodeBlocks so the
// UI can select, copy and run each one.

use crate::render::highlight::Highlighter;
use lazy_static::lazy_static;
use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use regex::Regex;

pub const DEFAULT_LANGUAGE: &str = "plaintext";

const RULE_WIDTH: usize = 40;

lazy_static! {
    static ref LANGUAGE_TOKEN: Option<Regex> = Regex::new(r"^[A-Za-z0-9_]+").ok();
}

/// A fenced code block. `id` is its position among the message's code blocks and does
/// not change as the message grows.
#[derive(Debug, Clone, PartialEq)]
pub struct CodeBlock {
    pub id: usize,
    pub language: String,
    /// 1-based line of the opening fence in the message source.
    pub source_line: usize,
    pub code: String,
    pub lines: Vec<Line<'static>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RenderedBlock {
    Text(Vec<Line<'static>>),
    Code(CodeBlock),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderedMessage {
    pub blocks: Vec<RenderedBlock>,
}

impl RenderedMessage {
    pub fn code_blocks(&self) -> impl Iterator<Item = &CodeBlock> {
        self.blocks.iter().filter_map(|b| match b {
            RenderedBlock::Code(c) => Some(c),
            RenderedBlock::Text(_) => None,
        })
    }

    pub fn code_block(&self, id: usize) -> Option<&CodeBlock> {
        self.code_blocks().find(|c| c.id == id)
    }
}

/// Language label from a fence info string: its leading word characters, or
/// `plaintext`.
pub fn language_from_info(info: &str) -> String {
    let first = info.split_whitespace().next().unwrap_or("");
    LANGUAGE_TOKEN
        .as_ref()
        .and_then(|re| re.find(first))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string())
}

pub fn render_markdown(source: &str, highlighter: &Highlighter) -> RenderedMessage {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TABLES);

    let lines = LineIndex::new(source);
    let mut w = Writer::new(highlighter);
    for (event, range) in Parser::new_ext(source, options).into_offset_iter() {
        w.event(event, lines.line_of(range.start));
    }
    w.finish()
}

/// Byte offset → 1-based line. Event offsets are not monotonic (an end event spans
/// its whole element), so lookups search the precomputed line starts.
struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    fn new(source: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(source.match_indices('\n').map(|(i, _)| i + 1));
        Self { starts }
    }

    fn line_of(&self, offset: usize) -> usize {
        self.starts.partition_point(|&s| s <= offset)
    }
}

struct PendingCode {
    language: String,
    source_line: usize,
    buf: String,
}

struct Writer<'h> {
    highlighter: &'h Highlighter,
    blocks: Vec<RenderedBlock>,
    lines: Vec<Line<'static>>,
    current: Vec<Span<'static>>,
    styles: Vec<Style>,
    lists: Vec<Option<u64>>,
    quote_depth: usize,
    links: Vec<String>,
    table_cell: usize,
    code: Option<PendingCode>,
    next_code_id: usize,
}

impl<'h> Writer<'h> {
    fn new(highlighter: &'h Highlighter) -> Self {
        Self {
            highlighter,
            blocks: Vec::new(),
            lines: Vec::new(),
            current: Vec::new(),
            styles: Vec::new(),
            lists: Vec::new(),
            quote_depth: 0,
            links: Vec::new(),
            table_cell: 0,
            code: None,
            next_code_id: 0,
        }
    }

    fn style(&self) -> Style {
        self.styles
            .iter()
            .fold(Style::default(), |acc, s| acc.patch(*s))
    }

    fn push_style(&mut self, style: Style) {
        self.styles.push(style);
    }

    fn pop_style(&mut self) {
        self.styles.pop();
    }

    fn text(&mut self, text: &str) {
        let style = self.style();
        self.current.push(Span::styled(text.to_string(), style));
    }

    fn prefix(&self) -> Vec<Span<'static>> {
        let mut prefix = Vec::new();
        for _ in 0..self.quote_depth {
            prefix.push(Span::styled("│ ", Style::default().fg(Color::DarkGray)));
        }
        prefix
    }

    fn flush_line(&mut self) {
        if self.current.is_empty() {
            return;
        }
        let mut spans = self.prefix();
        spans.append(&mut self.current);
        self.lines.push(Line::from(spans));
    }

    fn blank_line(&mut self) {
        self.flush_line();
        let last_blank = self
            .lines
            .last()
            .map(|l| l.spans.iter().all(|s| s.content.trim().is_empty()))
            .unwrap_or(true);
        if !last_blank {
            self.lines.push(Line::from(""));
        }
    }

    fn flush_text_block(&mut self) {
        self.flush_line();
        while self
            .lines
            .last()
            .map(|l| l.spans.iter().all(|s| s.content.trim().is_empty()))
            .unwrap_or(false)
        {
            self.lines.pop();
        }
        if !self.lines.is_empty() {
            let lines = std::mem::take(&mut self.lines);
            self.blocks.push(RenderedBlock::Text(lines));
        }
    }

    fn event(&mut self, event: Event<'_>, line: usize) {
        if let Some(code) = self.code.as_mut() {
            match event {
                Event::Text(t) => code.buf.push_str(&t),
                Event::End(TagEnd::CodeBlock) => self.end_code_block(),
                _ => {}
            }
            return;
        }

        match event {
            Event::Start(tag) => self.start(tag, line),
            Event::End(tag) => self.end(tag),
            Event::Text(t) => self.text(&t),
            Event::Code(t) => {
                let style = self.style().fg(Color::Yellow);
                self.current.push(Span::styled(t.to_string(), style));
            }
            Event::Html(t) | Event::InlineHtml(t) => self.text(t.trim_end_matches('\n')),
            Event::SoftBreak => self.text(" "),
            Event::HardBreak => self.flush_line(),
            Event::Rule => {
                self.blank_line();
                self.lines.push(Line::styled(
                    "─".repeat(RULE_WIDTH),
                    Style::default().fg(Color::DarkGray),
                ));
                self.lines.push(Line::from(""));
            }
            Event::TaskListMarker(done) => self.text(if done { "[x] " } else { "[ ] " }),
            _ => {}
        }
    }

    fn start(&mut self, tag: Tag<'_>, line: usize) {
        match tag {
            Tag::Paragraph => {}
            Tag::Heading { level, .. } => {
                self.blank_line();
                let style = Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD);
                self.push_style(style);
                let hashes = "#".repeat(heading_depth(level));
                self.text(&format!("{} ", hashes));
            }
            Tag::BlockQuote => {
                self.flush_line();
                self.quote_depth += 1;
                self.push_style(Style::default().add_modifier(Modifier::ITALIC));
            }
            Tag::CodeBlock(kind) => {
                self.flush_text_block();
                let language = match kind {
                    CodeBlockKind::Fenced(info) => language_from_info(&info),
                    CodeBlockKind::Indented => DEFAULT_LANGUAGE.to_string(),
                };
                self.code = Some(PendingCode {
                    language,
                    source_line: line,
                    buf: String::new(),
                });
            }
            Tag::List(start) => {
                self.flush_line();
                self.lists.push(start);
            }
            Tag::Item => {
                self.flush_line();
                let indent = "  ".repeat(self.lists.len().saturating_sub(1));
                let marker = match self.lists.last_mut() {
                    Some(Some(n)) => {
                        let m = format!("{}{}. ", indent, n);
                        *n += 1;
                        m
                    }
                    _ => format!("{}• ", indent),
                };
                self.current
                    .push(Span::styled(marker, Style::default().fg(Color::Blue)));
            }
            Tag::Emphasis => self.push_style(Style::default().add_modifier(Modifier::ITALIC)),
            Tag::Strong => self.push_style(Style::default().add_modifier(Modifier::BOLD)),
            Tag::Strikethrough => {
                self.push_style(Style::default().add_modifier(Modifier::CROSSED_OUT))
            }
            Tag::Link { dest_url, .. } | Tag::Image { dest_url, .. } => {
                self.links.push(dest_url.to_string());
                self.push_style(
                    Style::default()
                        .fg(Color::Blue)
                        .add_modifier(Modifier::UNDERLINED),
                );
            }
            Tag::Table(_) => self.blank_line(),
            Tag::TableHead | Tag::TableRow => {
                self.flush_line();
                self.table_cell = 0;
            }
            Tag::TableCell => {
                if self.table_cell > 0 {
                    self.current
                        .push(Span::styled(" │ ", Style::default().fg(Color::DarkGray)));
                }
                self.table_cell += 1;
            }
            _ => {}
        }
    }

    fn end(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Paragraph => {
                if self.lists.is_empty() {
                    self.blank_line();
                } else {
                    self.flush_line();
                }
            }
            TagEnd::Heading(_) => {
                self.pop_style();
                self.blank_line();
            }
            TagEnd::BlockQuote => {
                self.flush_line();
                self.pop_style();
                self.quote_depth = self.quote_depth.saturating_sub(1);
                if self.quote_depth == 0 {
                    self.blank_line();
                }
            }
            TagEnd::List(_) => {
                self.flush_line();
                self.lists.pop();
                if self.lists.is_empty() {
                    self.blank_line();
                }
            }
            TagEnd::Item => self.flush_line(),
            TagEnd::Emphasis | TagEnd::Strong | TagEnd::Strikethrough => self.pop_style(),
            TagEnd::Link | TagEnd::Image => {
                self.pop_style();
                if let Some(url) = self.links.pop() {
                    if !url.is_empty() {
                        self.current.push(Span::styled(
                            format!(" ({})", url),
                            Style::default().fg(Color::DarkGray),
                        ));
                    }
                }
            }
            TagEnd::TableHead => {
                let width: usize = self.current.iter().map(|s| s.content.chars().count()).sum();
                self.flush_line();
                self.lines.push(Line::styled(
                    "─".repeat(width.max(3)),
                    Style::default().fg(Color::DarkGray),
                ));
            }
            TagEnd::TableRow => self.flush_line(),
            TagEnd::Table => self.blank_line(),
            _ => {}
        }
    }

    fn end_code_block(&mut self) {
        let Some(pending) = self.code.take() else {
            return;
        };
        let code = pending.buf.trim().to_string();
        let lines = self.highlighter.highlight(&pending.language, &code);
        self.blocks.push(RenderedBlock::Code(CodeBlock {
            id: self.next_code_id,
            language: pending.language,
            source_line: pending.source_line,
            code,
            lines,
        }));
        self.next_code_id += 1;
    }

    fn finish(mut self) -> RenderedMessage {
        // A fence still open at the end of a partial message renders as code so far.
        if self.code.is_some() {
            self.end_code_block();
        }
        self.flush_text_block();
        RenderedMessage {
            blocks: self.blocks,
        }
    }
}

fn heading_depth(level: HeadingLevel) -> usize {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain(lines: &[Line<'_>]) -> Vec<String> {
        lines
            .iter()
            .map(|l| l.spans.iter().map(|s| s.content.as_ref()).collect())
            .collect()
    }

    fn render(md: &str) -> RenderedMessage {
        render_markdown(md, &Highlighter::plain())
    }

    #[test]
    fn language_label_rules() {
        assert_eq!(language_from_info("sql"), "sql");
        assert_eq!(language_from_info("python title=x.py"), "python");
        assert_eq!(language_from_info("c++"), "c");
        assert_eq!(language_from_info(""), "plaintext");
        assert_eq!(language_from_info("{sql}"), "plaintext");
    }

    #[test]
    fn code_blocks_get_sequential_ids_and_trimmed_code() {
        let md = "Here:\n\n```sql\n\nSELECT 1;\n\n```\n\nand\n\n```\nplain\n```\n";
        let msg = render(md);
        let blocks: Vec<&CodeBlock> = msg.code_blocks().collect();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].id, 0);
        assert_eq!(blocks[0].language, "sql");
        assert_eq!(blocks[0].code, "SELECT 1;");
        assert_eq!(blocks[0].source_line, 3);
        assert_eq!(blocks[1].id, 1);
        assert_eq!(blocks[1].language, "plaintext");
        assert_eq!(msg.code_block(1).map(|c| c.code.as_str()), Some("plain"));
    }

    #[test]
    fn line_index_maps_offsets_in_any_order() {
        let idx = LineIndex::new("ab\n\ncd\n");
        assert_eq!(idx.line_of(4), 3);
        assert_eq!(idx.line_of(0), 1);
        assert_eq!(idx.line_of(2), 1);
        assert_eq!(idx.line_of(3), 2);
        assert_eq!(idx.line_of(7), 4);
    }

    #[test]
    fn later_fences_report_their_own_lines() {
        let md = "a\n\n```sql\nx\n```\n\n- item\n\n```\ny\n```";
        let msg = render(md);
        let lines: Vec<usize> = msg.code_blocks().map(|c| c.source_line).collect();
        assert_eq!(lines, vec![3, 9]);
    }

    #[test]
    fn ids_are_stable_as_the_message_grows() {
        let partial = render("```sql\nSELECT");
        let full = render("```sql\nSELECT 1\n```\n\n```sql\nSELECT 2\n```");
        assert_eq!(partial.code_blocks().next().map(|c| c.id), Some(0));
        assert_eq!(full.code_block(0).map(|c| c.code.as_str()), Some("SELECT 1"));
        assert_eq!(full.code_block(1).map(|c| c.code.as_str()), Some("SELECT 2"));
    }

    #[test]
    fn prose_elements_render_to_lines() {
        let md = "# Title\n\nSome **bold** and `code`.\n\n- one\n- two\n\n1. first\n2. second\n\n> quoted\n\n[docs](https://example.com)";
        let msg = render(md);
        let RenderedBlock::Text(lines) = &msg.blocks[0] else {
            panic!("expected text block");
        };
        let text = plain(lines);
        assert_eq!(text[0], "# Title");
        assert!(text.contains(&"Some bold and code.".to_string()), "{:?}", text);
        assert!(text.contains(&"• one".to_string()));
        assert!(text.contains(&"2. second".to_string()));
        assert!(text.contains(&"│ quoted".to_string()), "{:?}", text);
        assert!(text.contains(&"docs (https://example.com)".to_string()));

        let bold = lines
            .iter()
            .flat_map(|l| l.spans.iter())
            .find(|s| s.content == "bold")
            .unwrap();
        assert!(bold.style.add_modifier.contains(Modifier::BOLD));
    }

    #[test]
    fn tables_and_strikethrough() {
        let md = "| a | b |\n|---|---|\n| 1 | 2 |\n\n~~old~~";
        let msg = render(md);
        let RenderedBlock::Text(lines) = &msg.blocks[0] else {
            panic!("expected text block");
        };
        let text = plain(lines);
        assert_eq!(text[0], "a │ b");
        assert_eq!(text[2], "1 │ 2");
        let struck = lines
            .iter()
            .flat_map(|l| l.spans.iter())
            .find(|s| s.content == "old")
            .unwrap();
        assert!(struck.style.add_modifier.contains(Modifier::CROSSED_OUT));
    }

    #[test]
    fn text_around_code_is_split_into_blocks() {
        let msg = render("before\n\n```sql\nSELECT 1\n```\n\nafter");
        assert_eq!(msg.blocks.len(), 3);
        assert!(matches!(msg.blocks[0], RenderedBlock::Text(_)));
        assert!(matches!(msg.blocks[1], RenderedBlock::Code(_)));
        assert!(matches!(msg.blocks[2], RenderedBlock::Text(_)));
    }
}

//! Message rendering: Markdown to styled terminal lines, syntax-highlighted code
//! blocks, and clipboard copy with a timed confirmation.

pub mod clipboard;
pub mod highlight;
pub mod markdown;

pub use clipboard::{BlockKey, CopyTracker, SystemClipboard};
pub use highlight::Highlighter;
pub use markdown::{render_markdown, CodeBlock, RenderedBlock, RenderedMessage};

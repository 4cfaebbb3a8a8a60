//! Whitelist-driven tag stream parser.
//!
//! Turns markup into a flat [`TagStream`]: one [`Node`] per whitelisted open
//! tag, with any text that follows attached to the most recently emitted node.
//! Nesting is tracked on an explicit stack. A close tag pops back to its most
//! recent matching open tag, discarding anything left unclosed in between;
//! a close tag with no matching open leaves the stack as is. Parsing never
//! fails.

use std::collections::{HashMap, HashSet};

use crate::error::AppError;
use crate::lexer::{Token, tokenize};
use crate::models::{Node, TagStream};

/// How text following a whitelisted tag is attached to its node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextHandler {
    /// Concatenate the raw text.
    #[default]
    Append,
    /// Trim surrounding whitespace, then concatenate; blank runs are dropped.
    AppendTrimmed,
    /// Drop the text.
    Ignore,
}

impl TextHandler {
    fn apply(self, node: &mut Node, text: &str) {
        let text = match self {
            TextHandler::Append => text,
            TextHandler::AppendTrimmed => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    return;
                }
                trimmed
            }
            TextHandler::Ignore => return,
        };
        match &mut node.text {
            Some(existing) => existing.push_str(text),
            None => node.text = Some(text.to_string()),
        }
    }
}

/// Parser configuration: which tags produce nodes, which are transparent,
/// and how text is attached per tag.
///
/// An empty whitelist accepts every tag.
#[derive(Debug, Clone, Default)]
pub struct ParserConfig {
    whitelist: HashSet<String>,
    ignored: HashSet<String>,
    text_handlers: HashMap<String, TextHandler>,
}

impl ParserConfig {
    pub fn new<I, S>(whitelist: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            whitelist: whitelist
                .into_iter()
                .map(|t| t.as_ref().to_ascii_lowercase())
                .collect(),
            ..Self::default()
        }
    }

    /// Tags that are never pushed or popped and never interrupt text.
    pub fn with_ignored<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.ignored
            .extend(tags.into_iter().map(|t| t.as_ref().to_ascii_lowercase()));
        self
    }

    pub fn with_text_handler(mut self, tag: &str, handler: TextHandler) -> Self {
        self.text_handlers
            .insert(tag.to_ascii_lowercase(), handler);
        self
    }

    /// Configuration used for listing pages: rows, cells, anchors and bold
    /// text are kept; line breaks are transparent.
    pub fn listings() -> Self {
        Self::new(["tr", "td", "a", "b"]).with_ignored(["br"])
    }

    pub fn validate(&self) -> Result<(), AppError> {
        for tag in self
            .whitelist
            .iter()
            .chain(&self.ignored)
            .chain(self.text_handlers.keys())
        {
            if tag.is_empty() || tag.contains(|c: char| c.is_whitespace() || c == '<' || c == '>')
            {
                return Err(AppError::ConfigError(format!("Invalid tag name '{tag}'")));
            }
        }

        if let Some(tag) = self.ignored.iter().find(|t| self.whitelist.contains(*t)) {
            return Err(AppError::ConfigError(format!(
                "Tag '{tag}' cannot be both whitelisted and ignored"
            )));
        }

        if let Some(tag) = self.text_handlers.keys().find(|t| !self.accepts(t)) {
            return Err(AppError::ConfigError(format!(
                "Text handler configured for tag '{tag}' which is not whitelisted"
            )));
        }

        Ok(())
    }

    fn accepts(&self, tag: &str) -> bool {
        !self.ignored.contains(tag) && (self.whitelist.is_empty() || self.whitelist.contains(tag))
    }

    fn is_ignored(&self, tag: &str) -> bool {
        self.ignored.contains(tag)
    }

    fn handler(&self, tag: &str) -> TextHandler {
        self.text_handlers.get(tag).copied().unwrap_or_default()
    }
}

/// Stateless parser; each [`parse`](Self::parse) call starts from an empty stack.
#[derive(Debug, Clone)]
pub struct TagStreamParser {
    config: ParserConfig,
}

impl TagStreamParser {
    pub fn new(config: ParserConfig) -> Result<Self, AppError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn parse(&self, markup: &str) -> TagStream {
        let mut state = ParseState::default();

        for token in tokenize(markup) {
            match token {
                Token::Open {
                    name,
                    attributes,
                    self_closing,
                } => {
                    if self.config.is_ignored(&name) {
                        continue;
                    }
                    state.stack.push(name.clone());
                    if self.config.accepts(&name) {
                        state.active = Some(self.config.handler(&name));
                        state.nodes.push(Node::new(name.clone(), attributes));
                    } else {
                        state.active = None;
                    }
                    if self_closing {
                        state.close(&name);
                    }
                }
                Token::Close { name } => {
                    if !self.config.is_ignored(&name) {
                        state.close(&name);
                    }
                }
                Token::Text(text) => {
                    if let (Some(handler), Some(node)) = (state.active, state.nodes.last_mut()) {
                        handler.apply(node, &text);
                    }
                }
            }
        }

        if state.discarded > 0 || state.unmatched > 0 {
            tracing::debug!(
                discarded = state.discarded,
                unmatched = state.unmatched,
                unclosed = state.stack.len(),
                "Recovered from malformed markup"
            );
        }

        state.nodes
    }
}

#[derive(Default)]
struct ParseState {
    stack: Vec<String>,
    nodes: TagStream,
    active: Option<TextHandler>,
    /// Open tags force-closed by a later close tag.
    discarded: usize,
    /// Close tags with no matching open tag.
    unmatched: usize,
}

impl ParseState {
    fn close(&mut self, name: &str) {
        match self.stack.iter().rposition(|t| t == name) {
            Some(pos) => {
                self.discarded += self.stack.len() - pos - 1;
                self.stack.truncate(pos);
            }
            None => self.unmatched += 1,
        }
        self.active = None;
    }
}

//! Markup tokenizer feeding the [`TagStreamParser`](crate::parser::TagStreamParser).
//!
//! Runs the html5ever tokenizer without a tree builder and flattens its
//! output into open tags, close tags and text runs. Nesting is left to the
//! parser. Comments, doctypes and parse errors are dropped. Character
//! references are decoded against the full HTML5 table, names arrive
//! lowercased, and `script`/`style` bodies come through as raw text.

use std::cell::RefCell;

use html5ever::tendril::StrTendril;
use html5ever::tokenizer::states::RawKind;
use html5ever::tokenizer::{
    BufferQueue, Tag, TagKind, Token as HtmlToken, TokenSink, TokenSinkResult, Tokenizer,
    TokenizerOpts,
};

use crate::models::Attribute;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Open {
        name: String,
        attributes: Vec<Attribute>,
        self_closing: bool,
    },
    Close {
        name: String,
    },
    Text(String),
}

/// Collects tokens; adjacent character runs are merged into one `Text`.
#[derive(Default)]
struct TokenCollector {
    tokens: RefCell<Vec<Token>>,
    text: RefCell<String>,
}

impl TokenCollector {
    fn flush_text(&self) {
        let text = self.text.take();
        if !text.is_empty() {
            self.tokens.borrow_mut().push(Token::Text(text));
        }
    }

    fn tag(&self, tag: Tag) -> TokenSinkResult<()> {
        self.flush_text();
        let name = tag.name.to_string();
        match tag.kind {
            TagKind::StartTag => {
                let raw = match name.as_str() {
                    "script" if !tag.self_closing => Some(RawKind::ScriptData),
                    "style" if !tag.self_closing => Some(RawKind::Rawtext),
                    _ => None,
                };
                let attributes = tag
                    .attrs
                    .iter()
                    .map(|attr| {
                        Attribute::new(attr.name.local.to_string(), attr.value.to_string())
                    })
                    .collect();
                self.tokens.borrow_mut().push(Token::Open {
                    name,
                    attributes,
                    self_closing: tag.self_closing,
                });
                raw.map_or(TokenSinkResult::Continue, TokenSinkResult::RawData)
            }
            TagKind::EndTag => {
                self.tokens.borrow_mut().push(Token::Close { name });
                TokenSinkResult::Continue
            }
        }
    }
}

impl TokenSink for TokenCollector {
    type Handle = ();

    fn process_token(&self, token: HtmlToken, _line_number: u64) -> TokenSinkResult<()> {
        match token {
            HtmlToken::TagToken(tag) => return self.tag(tag),
            HtmlToken::CharacterTokens(chars) => self.text.borrow_mut().push_str(&chars),
            HtmlToken::CommentToken(_) | HtmlToken::DoctypeToken(_) | HtmlToken::EOFToken => {
                self.flush_text()
            }
            _ => {}
        }
        TokenSinkResult::Continue
    }
}

/// Tokenize a whole document. Never fails; an unterminated tag at the end
/// of input is dropped.
pub fn tokenize(markup: &str) -> Vec<Token> {
    let tokenizer = Tokenizer::new(TokenCollector::default(), TokenizerOpts::default());
    let input = BufferQueue::default();
    input.push_back(StrTendril::from_slice(markup));
    let _ = tokenizer.feed(&input);
    tokenizer.end();

    tokenizer.sink.flush_text();
    tokenizer.sink.tokens.take()
}

//! CSS URL extraction
//!
//! A small tokenizer feeds a two-flag walker: `url(...)` contents go to
//! `links`, `@import` targets go to `at_import_links` as long as the
//! admissibility machine still allows `@import` (nothing but `@charset` and
//! `@layer` statements may precede it).

use super::{body_text, ExtractError, Extracted, Extractor, Mode};
use crate::config::Config;
use crate::urls::mime::ContentKind;
use crate::urls::CrawlUrl;

/// Tokens the walker cares about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    AtKeyword(String),
    Function(String),
    Ident(String),
    String(String),
    Url(String),
    Semicolon,
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    Whitespace,
    Comment,
    Delim(char),
    Eof,
}

/// Hand-written CSS tokenizer
pub struct Tokenizer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    done: bool,
}

impl<'a> Tokenizer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            chars: input.chars().peekable(),
            done: false,
        }
    }

    pub fn next_token(&mut self) -> Token {
        let Some(c) = self.chars.next() else {
            return Token::Eof;
        };
        match c {
            c if c.is_whitespace() => {
                while self.chars.next_if(|c| c.is_whitespace()).is_some() {}
                Token::Whitespace
            }
            '/' if self.chars.peek() == Some(&'*') => {
                self.chars.next();
                let mut prev = '\0';
                for c in self.chars.by_ref() {
                    if prev == '*' && c == '/' {
                        break;
                    }
                    prev = c;
                }
                Token::Comment
            }
            '"' | '\'' => Token::String(self.consume_string(c)),
            '@' if self.starts_ident() => Token::AtKeyword(self.consume_name()),
            ';' => Token::Semicolon,
            '(' => Token::LeftParen,
            ')' => Token::RightParen,
            '{' => Token::LeftBrace,
            '}' => Token::RightBrace,
            '\\' => {
                let mut name = self.consume_escape().to_string();
                name.push_str(&self.consume_name());
                self.ident_like(name)
            }
            c if is_name_start(c) || (c == '-' && self.starts_ident()) => {
                let mut name = c.to_string();
                name.push_str(&self.consume_name());
                self.ident_like(name)
            }
            c => Token::Delim(c),
        }
    }

    fn ident_like(&mut self, name: String) -> Token {
        if self.chars.next_if_eq(&'(').is_none() {
            return Token::Ident(name);
        }
        if !name.eq_ignore_ascii_case("url") {
            return Token::Function(name);
        }
        while self.chars.next_if(|c| c.is_whitespace()).is_some() {}
        match self.chars.peek() {
            Some('"') | Some('\'') => Token::Function(name),
            _ => Token::Url(self.consume_unquoted_url()),
        }
    }

    fn starts_ident(&mut self) -> bool {
        matches!(self.chars.peek(), Some(&c) if is_name_start(c) || c == '-' || c == '\\')
    }

    fn consume_name(&mut self) -> String {
        let mut name = String::new();
        loop {
            match self.chars.peek() {
                Some(&c) if is_name_char(c) => {
                    name.push(c);
                    self.chars.next();
                }
                Some('\\') => {
                    self.chars.next();
                    name.push(self.consume_escape());
                }
                _ => return name,
            }
        }
    }

    /// Escape after the backslash: up to six hex digits or one literal char
    fn consume_escape(&mut self) -> char {
        let mut hex = String::new();
        while hex.len() < 6 {
            match self.chars.next_if(|c| c.is_ascii_hexdigit()) {
                Some(c) => hex.push(c),
                None => break,
            }
        }
        if hex.is_empty() {
            return self.chars.next().unwrap_or(char::REPLACEMENT_CHARACTER);
        }
        self.chars.next_if(|c| c.is_whitespace());
        u32::from_str_radix(&hex, 16)
            .ok()
            .and_then(char::from_u32)
            .filter(|c| *c != '\0')
            .unwrap_or(char::REPLACEMENT_CHARACTER)
    }

    fn consume_string(&mut self, quote: char) -> String {
        let mut value = String::new();
        while let Some(c) = self.chars.next() {
            match c {
                c if c == quote => break,
                // Unterminated string ends at the newline
                '\n' => break,
                '\\' => match self.chars.peek() {
                    Some('\n') => {
                        self.chars.next();
                    }
                    Some(_) => value.push(self.consume_escape()),
                    None => {}
                },
                c => value.push(c),
            }
        }
        value
    }

    fn consume_unquoted_url(&mut self) -> String {
        let mut value = String::new();
        while let Some(c) = self.chars.next() {
            match c {
                ')' => break,
                '\\' => value.push(self.consume_escape()),
                c => value.push(c),
            }
        }
        value.trim().to_string()
    }
}

impl Iterator for Tokenizer<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        if self.done {
            return None;
        }
        let token = self.next_token();
        if token == Token::Eof {
            self.done = true;
        }
        Some(token)
    }
}

fn is_name_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || !c.is_ascii()
}

fn is_name_char(c: char) -> bool {
    is_name_start(c) || c.is_ascii_digit() || c == '-'
}

/// `@import` admissibility
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ImportState {
    Open,
    Blocked,
}

/// URLs found in a stylesheet
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CssLinks {
    /// `url(...)` references outside `@import`
    pub links: Vec<String>,
    /// Admissible `@import` targets
    pub at_import_links: Vec<String>,
}

/// Extract `url()` and `@import` references. Inline CSS (style attributes)
/// never yields imports.
pub fn extract_css(text: &str, inline: bool) -> CssLinks {
    let mut out = CssLinks::default();
    let mut state = if inline {
        ImportState::Blocked
    } else {
        ImportState::Open
    };
    let mut in_url_function = false;
    let mut in_at_import = false;
    let mut seen_import = false;

    for token in Tokenizer::new(text) {
        match token {
            Token::AtKeyword(name) => {
                let name = name.to_ascii_lowercase();
                match name.as_str() {
                    "import" => {
                        in_at_import = true;
                        if state == ImportState::Open {
                            seen_import = true;
                        }
                    }
                    "layer" if seen_import => state = ImportState::Blocked,
                    _ => {}
                }
            }
            Token::Function(name) => {
                if name.eq_ignore_ascii_case("url") {
                    in_url_function = true;
                }
            }
            Token::RightParen => in_url_function = false,
            Token::Semicolon => in_at_import = false,
            Token::LeftBrace => {
                state = ImportState::Blocked;
                in_at_import = false;
            }
            Token::String(value) => {
                if in_at_import {
                    if state == ImportState::Open {
                        push_non_empty(&mut out.at_import_links, value);
                    }
                } else if in_url_function {
                    push_non_empty(&mut out.links, value);
                }
            }
            Token::Url(value) => {
                if in_at_import {
                    if state == ImportState::Open {
                        push_non_empty(&mut out.at_import_links, value);
                    }
                } else {
                    push_non_empty(&mut out.links, value);
                }
            }
            Token::Eof => break,
            _ => {}
        }
    }

    out
}

fn push_non_empty(list: &mut Vec<String>, value: String) {
    let value = value.trim();
    if !value.is_empty() {
        list.push(value.to_string());
    }
}

/// Stylesheet bodies; every reference is an asset
pub struct CssExtractor;

impl Extractor for CssExtractor {
    fn name(&self) -> &'static str {
        "css"
    }

    fn supports(&self, _mode: Mode) -> bool {
        true
    }

    fn matches(&self, url: &CrawlUrl) -> bool {
        ContentKind::from_mime(&url.mime_type()) == ContentKind::Css
    }

    fn extract(&self, url: &CrawlUrl, _config: &Config) -> Result<Extracted, ExtractError> {
        let text = body_text(url)?;
        let css = extract_css(&text, false);
        let mut assets = css.links;
        assets.extend(css.at_import_links);
        Ok(Extracted::new(assets, Vec::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::testing::archived;

    #[test]
    fn import_admissibility() {
        let css = r#"@charset "UTF-8"; @layer any; @import "1.css"; @layer IBreakAfterImports; @import url("invalid.css"); div{background-image:url("image.png");}"#;
        let out = extract_css(css, false);
        assert_eq!(out.links, vec!["image.png".to_string()]);
        assert_eq!(out.at_import_links, vec!["1.css".to_string()]);
    }

    #[test]
    fn import_after_rule_is_rejected() {
        let out = extract_css("a { color: red } @import 'late.css';", false);
        assert!(out.at_import_links.is_empty());
        assert!(out.links.is_empty());
    }

    #[test]
    fn import_forms_and_unquoted_urls() {
        let css = "@import url(a.css) screen; @import 'b.css';\n.x { background: url( img/bg.png ) }";
        let out = extract_css(css, false);
        assert_eq!(out.at_import_links, vec!["a.css".to_string(), "b.css".to_string()]);
        assert_eq!(out.links, vec!["img/bg.png".to_string()]);
    }

    #[test]
    fn media_block_blocks_later_imports() {
        let out = extract_css("@media print { .a { b: c } } @import 'x.css';", false);
        assert!(out.at_import_links.is_empty());
    }

    #[test]
    fn inline_css_never_imports() {
        let out = extract_css("@import 'x.css'; background: url('y.png')", true);
        assert!(out.at_import_links.is_empty());
        assert_eq!(out.links, vec!["y.png".to_string()]);
    }

    #[test]
    fn comments_and_escapes() {
        let out = extract_css("/* url(no.png) */ .a { background: url(\"sp\\61 ce.png\") }", false);
        assert_eq!(out.links, vec!["space.png".to_string()]);
    }

    #[test]
    fn unterminated_input_does_not_panic() {
        let out = extract_css("@import 'broken", false);
        assert_eq!(out.at_import_links, vec!["broken".to_string()]);
        let out = extract_css(".a { background: url(", false);
        assert!(out.links.is_empty());
    }

    #[test]
    fn css_extractor_returns_everything_as_assets() {
        let url = archived(
            "https://example.com/style.css",
            &[("Content-Type", "text/css")],
            b"@import 'base.css'; body { background: url(bg.png) }",
        );
        let extracted = CssExtractor.extract(&url, &Config::default()).unwrap();
        assert_eq!(extracted.assets, vec!["bg.png".to_string(), "base.css".to_string()]);
        assert!(extracted.outlinks.is_empty());
        assert_eq!(url.body_position(), Some(0));
    }
}

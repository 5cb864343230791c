//! Built-in SQL highlighter.
//!
//! Tokenizes with the `sqlparser` tokenizer and emits Pygments-compatible
//! markup (`div.highlight > pre > span.<class>`), so existing Pygments
//! stylesheets apply unchanged.

use sqlparser::{
    dialect::GenericDialect,
    keywords::Keyword,
    tokenizer::{Token, Tokenizer, Whitespace},
};

use super::formatter::{escape_html, Highlighter, SQL_LANGUAGE};

/// Highlighter for SQL statements.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqlHighlighter;

impl SqlHighlighter {
    pub fn new() -> Self {
        Self
    }
}

/// Pygments short class name for a token, `None` for plain text.
fn token_class(token: &Token) -> Option<&'static str> {
    match token {
        Token::Word(word) if word.quote_style.is_none() && word.keyword != Keyword::NoKeyword => {
            Some("k")
        }
        Token::Word(_) => Some("n"),
        Token::Number(_, _) => Some("mi"),
        Token::SingleQuotedString(_) | Token::NationalStringLiteral(_) => Some("s1"),
        Token::Whitespace(Whitespace::SingleLineComment { .. }) => Some("c1"),
        Token::Whitespace(Whitespace::MultiLineComment(_)) => Some("cm"),
        Token::Whitespace(_) => None,
        Token::LParen | Token::RParen | Token::Comma | Token::SemiColon | Token::Period => {
            Some("p")
        }
        _ => Some("o"),
    }
}

impl Highlighter for SqlHighlighter {
    fn highlight(&self, text: &str, language: &str) -> Option<String> {
        if !language.eq_ignore_ascii_case(SQL_LANGUAGE) {
            return None;
        }

        let dialect = GenericDialect {};
        let tokens = Tokenizer::new(&dialect, text)
            .with_unescape(false)
            .tokenize()
            .ok()?;

        let mut html = String::with_capacity(text.len() * 2 + 48);
        html.push_str("<div class=\"highlight\"><pre><span></span>");
        for token in tokens.iter().filter(|t| !matches!(t, Token::EOF)) {
            let rendered = token.to_string();
            match token_class(token) {
                Some(class) => {
                    html.push_str("<span class=\"");
                    html.push_str(class);
                    html.push_str("\">");
                    html.push_str(&escape_html(&rendered));
                    html.push_str("</span>");
                }
                None => html.push_str(&escape_html(&rendered)),
            }
        }
        html.push_str("</pre></div>");
        Some(html)
    }

    fn name(&self) -> &str {
        "sqlparser"
    }
}

//! Lexer for Bash++ sources
//!
//! The lexer tokenizes input into a stream the parser consumes. Because
//! Bash++ is a pass-through superset of Bash, the lexer is deliberately
//! permissive: anything it does not recognize becomes a `Text` run that is
//! reproduced verbatim in the output. It handles:
//! - `@`-keywords and reference chains
//! - Quoting (single quotes opaque, double quotes recursive)
//! - Comments and here-documents
//! - Opaque consumption of `$(...)`, `${...}`, `$'...'` and backticks
//! - Structural operators that the parser may or may not care about
//!   (unused ones fall back to raw text)

use crate::ast::types::Position;
use crate::parser::types::{ParseException, MAX_INPUT_SIZE, MAX_TOKENS};

/// Token types for the Bash++ lexer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum TokenType {
    Eof,

    // Separators
    Newline,
    Semicolon,
    DSemi, // ;;
    Amp,   // &

    // Connectives
    AndAnd, // &&
    OrOr,   // ||
    Pipe,   // |

    // Grouping
    LBrace,
    RBrace,
    LParen,
    RParen,
    LBracket,
    RBracket,

    // Assignment operators (only meaningful after a reference chain)
    Equals,
    PlusEquals,

    // Quoting
    DoubleQuote,
    SinglequoteString,

    Comment,

    /// An identifier-shaped run of plain text
    Word,
    /// Any other raw text run, including whitespace
    Text,

    // Reference chains
    Dot,
    Star,      // `*` directly after a reference (pointer declarations)
    Deref,     // `*` immediately before `@`
    AddressOf, // `&` immediately before `@`
    AtLength,  // `@#` length query prefix

    /// `@identifier` starting a reference or declaration; value is the name
    AtIdentifier,
    /// `@(` opening a supershell
    SupershellStart,

    // `@`-keywords
    KeywordClass,
    KeywordPublic,
    KeywordProtected,
    KeywordPrivate,
    KeywordVirtual,
    KeywordMethod,
    KeywordConstructor,
    KeywordDestructor,
    KeywordNew,
    KeywordDelete,
    /// value holds the text between `<` and `>`
    KeywordDynamicCast,
    KeywordTypeof,
    KeywordInclude,
    KeywordIncludeOnce,
    KeywordThis,
    KeywordSuper,
    KeywordNullptr,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Token {
    pub token_type: TokenType,
    pub value: String,
    pub position: Position,
}

impl Token {
    fn new(token_type: TokenType, value: impl Into<String>, position: Position) -> Self {
        Self { token_type, value: value.into(), position }
    }

    /// The raw source text this token stands for, used when the parser
    /// folds an unused structural token back into raw output
    pub fn text(&self) -> String {
        match self.token_type {
            TokenType::Eof => String::new(),
            TokenType::Newline => "\n".to_string(),
            TokenType::Semicolon => ";".to_string(),
            TokenType::DSemi => ";;".to_string(),
            TokenType::Amp => "&".to_string(),
            TokenType::AndAnd => "&&".to_string(),
            TokenType::OrOr => "||".to_string(),
            TokenType::Pipe => "|".to_string(),
            TokenType::LBrace => "{".to_string(),
            TokenType::RBrace => "}".to_string(),
            TokenType::LParen => "(".to_string(),
            TokenType::RParen => ")".to_string(),
            TokenType::LBracket => "[".to_string(),
            TokenType::RBracket => "]".to_string(),
            TokenType::Equals => "=".to_string(),
            TokenType::PlusEquals => "+=".to_string(),
            TokenType::DoubleQuote => "\"".to_string(),
            TokenType::Dot => ".".to_string(),
            TokenType::Star | TokenType::Deref => "*".to_string(),
            TokenType::AddressOf => "&".to_string(),
            TokenType::AtLength => "@#".to_string(),
            TokenType::AtIdentifier => format!("@{}", self.value),
            TokenType::SupershellStart => "@(".to_string(),
            TokenType::KeywordClass => "@class".to_string(),
            TokenType::KeywordPublic => "@public".to_string(),
            TokenType::KeywordProtected => "@protected".to_string(),
            TokenType::KeywordPrivate => "@private".to_string(),
            TokenType::KeywordVirtual => "@virtual".to_string(),
            TokenType::KeywordMethod => "@method".to_string(),
            TokenType::KeywordConstructor => "@constructor".to_string(),
            TokenType::KeywordDestructor => "@destructor".to_string(),
            TokenType::KeywordNew => "@new".to_string(),
            TokenType::KeywordDelete => "@delete".to_string(),
            TokenType::KeywordDynamicCast => format!("@dynamic_cast<{}>", self.value),
            TokenType::KeywordTypeof => "@typeof".to_string(),
            TokenType::KeywordInclude => "@include".to_string(),
            TokenType::KeywordIncludeOnce => "@include_once".to_string(),
            TokenType::KeywordThis => "@this".to_string(),
            TokenType::KeywordSuper => "@super".to_string(),
            TokenType::KeywordNullptr => "@nullptr".to_string(),
            _ => self.value.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LexFrame {
    /// Normal scanning; the counter tracks unclosed parens so a supershell
    /// inside a string can find its closing paren
    Default { paren_depth: u32, from_supershell: bool },
    /// Inside a double-quoted string
    InString,
}

pub struct Lexer<'a> {
    chars: Vec<char>,
    source_len: usize,
    pos: usize,
    line: usize,
    column: usize,
    tokens: Vec<Token>,
    frames: Vec<LexFrame>,
    /// Pending raw-text run
    text_start: Option<Position>,
    text_buffer: String,
    /// Heredoc delimiters seen on the current line, consumed after the
    /// next newline
    pending_heredocs: Vec<(String, bool)>,
    _source: std::marker::PhantomData<&'a str>,
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            chars: source.chars().collect(),
            source_len: source.len(),
            pos: 0,
            line: 0,
            column: 0,
            tokens: Vec::new(),
            frames: vec![LexFrame::Default { paren_depth: 0, from_supershell: false }],
            text_start: None,
            text_buffer: String::new(),
            pending_heredocs: Vec::new(),
            _source: std::marker::PhantomData,
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, ParseException> {
        if self.source_len > MAX_INPUT_SIZE {
            return Err(ParseException::new("Input too large", Position::default()));
        }
        while self.pos < self.chars.len() {
            if self.tokens.len() > MAX_TOKENS {
                return Err(ParseException::new("Too many tokens", self.position()));
            }
            match self.current_frame() {
                LexFrame::Default { .. } => self.lex_default(),
                LexFrame::InString => self.lex_in_string(),
            }
        }
        self.flush_text();
        let eof_pos = self.position();
        self.tokens.push(Token::new(TokenType::Eof, "", eof_pos));
        Ok(self.tokens)
    }

    fn current_frame(&self) -> LexFrame {
        *self.frames.last().expect("lexer frame stack is never empty")
    }

    fn position(&self) -> Position {
        Position::new(self.line, self.column)
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.chars.get(self.pos).copied()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 0;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn take_text_char(&mut self) {
        if self.text_start.is_none() {
            self.text_start = Some(self.position());
        }
        let c = self.advance().expect("caller checked a char is available");
        self.text_buffer.push(c);
    }

    fn flush_text(&mut self) {
        if let Some(start) = self.text_start.take() {
            let value = std::mem::take(&mut self.text_buffer);
            if !value.is_empty() {
                self.tokens.push(Token::new(TokenType::Text, value, start));
            }
        }
    }

    fn emit(&mut self, token_type: TokenType, value: impl Into<String>, pos: Position) {
        self.flush_text();
        self.tokens.push(Token::new(token_type, value, pos));
    }

    /// Consume a balanced run starting at an opening delimiter already
    /// positioned under the cursor, respecting nested quotes, and append it
    /// to the text buffer.
    fn consume_balanced(&mut self, open: char, close: char) {
        let mut depth = 0u32;
        while let Some(c) = self.peek() {
            if c == '\\' {
                self.take_text_char();
                if self.peek().is_some() {
                    self.take_text_char();
                }
                continue;
            }
            if c == '\'' {
                self.consume_single_quote_into_text();
                continue;
            }
            if c == '"' {
                self.consume_double_quote_into_text();
                continue;
            }
            if c == open {
                depth += 1;
            } else if c == close {
                depth -= 1;
                self.take_text_char();
                if depth == 0 {
                    return;
                }
                continue;
            }
            self.take_text_char();
        }
    }

    fn consume_single_quote_into_text(&mut self) {
        self.take_text_char(); // opening '
        while let Some(c) = self.peek() {
            self.take_text_char();
            if c == '\'' {
                return;
            }
        }
    }

    fn consume_double_quote_into_text(&mut self) {
        self.take_text_char(); // opening "
        while let Some(c) = self.peek() {
            if c == '\\' {
                self.take_text_char();
                if self.peek().is_some() {
                    self.take_text_char();
                }
                continue;
            }
            self.take_text_char();
            if c == '"' {
                return;
            }
        }
    }

    /// `$`-forms are opaque: `$(...)`, `$((...))`, `${...}`, `$'...'`
    fn consume_dollar_form(&mut self) {
        self.take_text_char(); // $
        match self.peek() {
            Some('(') => self.consume_balanced('(', ')'),
            Some('{') => self.consume_balanced('{', '}'),
            Some('\'') => self.consume_single_quote_into_text(),
            _ => {}
        }
    }

    fn consume_backticks(&mut self) {
        self.take_text_char(); // opening `
        while let Some(c) = self.peek() {
            if c == '\\' {
                self.take_text_char();
                if self.peek().is_some() {
                    self.take_text_char();
                }
                continue;
            }
            self.take_text_char();
            if c == '`' {
                return;
            }
        }
    }

    fn read_identifier(&mut self) -> String {
        let mut word = String::new();
        while let Some(c) = self.peek() {
            if is_ident_char(c) {
                word.push(c);
                self.advance();
            } else {
                break;
            }
        }
        word
    }

    /// True when a `#` at the cursor starts a comment (word-start position)
    fn at_comment_start(&self) -> bool {
        if self.pos == 0 {
            return true;
        }
        matches!(
            self.chars.get(self.pos - 1),
            Some(' ') | Some('\t') | Some('\n') | Some(';') | Some('(') | Some('&') | Some('|')
        )
    }

    /// Detect `<<`/`<<-` heredoc starts so their bodies stay opaque
    fn try_start_heredoc(&mut self) -> bool {
        // Cursor is on the first '<'; reject `<<<` herestrings from either side
        if self.peek_at(1) != Some('<') || self.peek_at(2) == Some('<') {
            return false;
        }
        if self.pos > 0 && self.chars.get(self.pos - 1) == Some(&'<') {
            return false;
        }
        let mut offset = 2;
        let mut strip_tabs = false;
        if self.peek_at(offset) == Some('-') {
            strip_tabs = true;
            offset += 1;
        }
        while matches!(self.peek_at(offset), Some(' ') | Some('\t')) {
            offset += 1;
        }
        let mut quote = None;
        if matches!(self.peek_at(offset), Some('\'') | Some('"')) {
            quote = self.peek_at(offset);
            offset += 1;
        }
        let mut delimiter = String::new();
        while let Some(c) = self.peek_at(offset) {
            if is_ident_char(c) {
                delimiter.push(c);
                offset += 1;
            } else {
                break;
            }
        }
        if delimiter.is_empty() {
            return false;
        }
        if let Some(q) = quote {
            if self.peek_at(offset) != Some(q) {
                return false;
            }
            offset += 1;
        }
        // Take the whole operator as raw text
        for _ in 0..offset {
            self.take_text_char();
        }
        self.pending_heredocs.push((delimiter, strip_tabs));
        true
    }

    /// Consume pending heredoc bodies (after their starting line's newline)
    /// as one opaque text token
    fn consume_heredoc_bodies(&mut self) {
        let heredocs = std::mem::take(&mut self.pending_heredocs);
        for (delimiter, strip_tabs) in heredocs {
            loop {
                let line_start = self.pos;
                let mut line = String::new();
                while let Some(c) = self.peek() {
                    if c == '\n' {
                        break;
                    }
                    line.push(c);
                    self.advance();
                }
                // Copy the consumed line into the text buffer
                if self.text_start.is_none() {
                    self.text_start = Some(self.position());
                }
                for i in line_start..self.pos {
                    let c = self.chars[i];
                    self.text_buffer.push(c);
                }
                let trimmed = if strip_tabs { line.trim_start_matches('\t') } else { line.as_str() };
                let done = trimmed == delimiter;
                if self.peek() == Some('\n') {
                    self.take_text_char();
                }
                if done || self.peek().is_none() {
                    break;
                }
            }
        }
    }

    fn lex_default(&mut self) {
        let c = match self.peek() {
            Some(c) => c,
            None => return,
        };
        let pos = self.position();

        match c {
            '\n' => {
                self.advance();
                self.emit(TokenType::Newline, "\n", pos);
                if !self.pending_heredocs.is_empty() {
                    self.consume_heredoc_bodies();
                }
            }
            ';' => {
                self.advance();
                if self.peek() == Some(';') {
                    self.advance();
                    self.emit(TokenType::DSemi, ";;", pos);
                } else {
                    self.emit(TokenType::Semicolon, ";", pos);
                }
            }
            '&' => {
                self.advance();
                match self.peek() {
                    Some('&') => {
                        self.advance();
                        self.emit(TokenType::AndAnd, "&&", pos);
                    }
                    Some('@') => self.emit(TokenType::AddressOf, "&", pos),
                    _ => self.emit(TokenType::Amp, "&", pos),
                }
            }
            '|' => {
                self.advance();
                if self.peek() == Some('|') {
                    self.advance();
                    self.emit(TokenType::OrOr, "||", pos);
                } else {
                    self.emit(TokenType::Pipe, "|", pos);
                }
            }
            '*' => {
                self.advance();
                if self.peek() == Some('@') {
                    self.emit(TokenType::Deref, "*", pos);
                } else {
                    self.push_text_char_raw('*', pos);
                }
            }
            '{' => {
                self.advance();
                self.emit(TokenType::LBrace, "{", pos);
            }
            '}' => {
                self.advance();
                self.emit(TokenType::RBrace, "}", pos);
            }
            '(' => {
                self.advance();
                if let LexFrame::Default { paren_depth, .. } = self.frames.last_mut().expect("frame") {
                    *paren_depth += 1;
                }
                self.emit(TokenType::LParen, "(", pos);
            }
            ')' => {
                self.advance();
                let mut pop_frame = false;
                if let Some(LexFrame::Default { paren_depth, from_supershell }) =
                    self.frames.last_mut()
                {
                    if *paren_depth > 0 {
                        *paren_depth -= 1;
                    } else if *from_supershell {
                        pop_frame = true;
                    }
                }
                if pop_frame {
                    self.frames.pop();
                }
                self.emit(TokenType::RParen, ")", pos);
            }
            '[' => {
                self.advance();
                self.emit(TokenType::LBracket, "[", pos);
            }
            ']' => {
                self.advance();
                self.emit(TokenType::RBracket, "]", pos);
            }
            '=' => {
                self.advance();
                self.emit(TokenType::Equals, "=", pos);
            }
            '+' => {
                if self.peek_at(1) == Some('=') {
                    self.advance();
                    self.advance();
                    self.emit(TokenType::PlusEquals, "+=", pos);
                } else {
                    self.take_text_char();
                }
            }
            '\'' => {
                self.flush_text();
                let start = self.position();
                let mut value = String::new();
                value.push(self.advance().expect("quote"));
                while let Some(inner) = self.peek() {
                    value.push(inner);
                    self.advance();
                    if inner == '\'' {
                        break;
                    }
                }
                self.emit(TokenType::SinglequoteString, value, start);
            }
            '"' => {
                self.advance();
                self.emit(TokenType::DoubleQuote, "\"", pos);
                self.frames.push(LexFrame::InString);
            }
            '#' if self.at_comment_start() => {
                self.flush_text();
                let start = self.position();
                let mut value = String::new();
                while let Some(inner) = self.peek() {
                    if inner == '\n' {
                        break;
                    }
                    value.push(inner);
                    self.advance();
                }
                self.emit(TokenType::Comment, value, start);
            }
            '\\' => {
                self.take_text_char();
                if self.peek().is_some() {
                    self.take_text_char();
                }
            }
            '$' => self.consume_dollar_form(),
            '`' => self.consume_backticks(),
            '<' if self.try_start_heredoc() => {}
            '@' => self.lex_at_construct(),
            _ if is_ident_start(c) => {
                self.flush_text();
                let start = self.position();
                let word = self.read_identifier();
                self.emit(TokenType::Word, word, start);
            }
            _ => {
                self.take_text_char();
            }
        }
    }

    fn push_text_char_raw(&mut self, c: char, pos: Position) {
        if self.text_start.is_none() {
            self.text_start = Some(pos);
        }
        self.text_buffer.push(c);
    }

    fn lex_in_string(&mut self) {
        let c = match self.peek() {
            Some(c) => c,
            None => return,
        };
        let pos = self.position();

        match c {
            '"' => {
                self.advance();
                self.emit(TokenType::DoubleQuote, "\"", pos);
                self.frames.pop();
            }
            '\\' => {
                self.take_text_char();
                if self.peek().is_some() {
                    self.take_text_char();
                }
            }
            '$' => self.consume_dollar_form(),
            '`' => self.consume_backticks(),
            '@' => self.lex_at_construct(),
            '*' => {
                self.advance();
                if self.peek() == Some('@') {
                    self.emit(TokenType::Deref, "*", pos);
                } else {
                    self.push_text_char_raw('*', pos);
                }
            }
            '&' => {
                self.advance();
                if self.peek() == Some('@') {
                    self.emit(TokenType::AddressOf, "&", pos);
                } else {
                    self.push_text_char_raw('&', pos);
                }
            }
            _ => {
                self.take_text_char();
            }
        }
    }

    /// Lex an `@` construct: a keyword, a supershell opener, a length
    /// query, or a reference chain. Anything else falls back to raw text.
    fn lex_at_construct(&mut self) {
        let pos = self.position();
        self.advance(); // @

        match self.peek() {
            Some('(') => {
                self.advance();
                self.emit(TokenType::SupershellStart, "@(", pos);
                self.frames.push(LexFrame::Default { paren_depth: 0, from_supershell: true });
                return;
            }
            Some('#') => {
                if self
                    .peek_at(1)
                    .map(|c| is_ident_start(c))
                    .unwrap_or(false)
                {
                    self.advance();
                    self.emit(TokenType::AtLength, "@#", pos);
                    // Fall through to lex the identifier chain below
                    let ident_pos = self.position();
                    let word = self.read_identifier();
                    self.emit_at_word(word, ident_pos);
                    return;
                }
                self.push_text_char_raw('@', pos);
                return;
            }
            Some(c) if is_ident_start(c) => {
                let word = self.read_identifier();
                self.emit_at_word(word, pos);
            }
            _ => {
                self.push_text_char_raw('@', pos);
            }
        }
    }

    fn emit_at_word(&mut self, word: String, pos: Position) {
        let token_type = match word.as_str() {
            "class" => TokenType::KeywordClass,
            "public" => TokenType::KeywordPublic,
            "protected" => TokenType::KeywordProtected,
            "private" => TokenType::KeywordPrivate,
            "virtual" => TokenType::KeywordVirtual,
            "method" => TokenType::KeywordMethod,
            "constructor" => TokenType::KeywordConstructor,
            "destructor" => TokenType::KeywordDestructor,
            "new" => TokenType::KeywordNew,
            "delete" => TokenType::KeywordDelete,
            "typeof" => TokenType::KeywordTypeof,
            "include" => TokenType::KeywordInclude,
            "include_once" => TokenType::KeywordIncludeOnce,
            "this" => TokenType::KeywordThis,
            "super" => TokenType::KeywordSuper,
            "nullptr" => TokenType::KeywordNullptr,
            "dynamic_cast" => {
                // The cast target lives between < and >
                let mut target = String::new();
                if self.peek() == Some('<') {
                    self.advance();
                    while let Some(c) = self.peek() {
                        if c == '>' {
                            self.advance();
                            break;
                        }
                        target.push(c);
                        self.advance();
                    }
                }
                self.emit(TokenType::KeywordDynamicCast, target, pos);
                return;
            }
            _ => TokenType::AtIdentifier,
        };

        if token_type == TokenType::AtIdentifier {
            self.emit(token_type, word, pos);
        } else {
            self.emit(token_type, "", pos);
        }

        // Reference chains continue through dots for identifiers and the
        // self keywords
        if matches!(
            token_type,
            TokenType::AtIdentifier | TokenType::KeywordThis | TokenType::KeywordSuper
        ) {
            self.lex_chain_members();
        }
    }

    fn lex_chain_members(&mut self) {
        loop {
            if self.peek() == Some('.')
                && self.peek_at(1).map(is_ident_start).unwrap_or(false)
            {
                let dot_pos = self.position();
                self.advance();
                self.emit(TokenType::Dot, ".", dot_pos);
                let word_pos = self.position();
                let word = self.read_identifier();
                self.emit(TokenType::Word, word, word_pos);
            } else if self.peek() == Some('*') {
                let star_pos = self.position();
                self.advance();
                self.emit(TokenType::Star, "*", star_pos);
                return;
            } else {
                return;
            }
        }
    }
}

/// Convenience wrapper
pub fn tokenize(source: &str) -> Result<Vec<Token>, ParseException> {
    Lexer::new(source).tokenize()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn types(source: &str) -> Vec<TokenType> {
        tokenize(source).unwrap().iter().map(|t| t.token_type).collect()
    }

    #[test]
    fn test_plain_bash_is_mostly_text() {
        let tokens = tokenize("echo hello world\n").unwrap();
        assert_eq!(tokens[0].token_type, TokenType::Word);
        assert_eq!(tokens[0].value, "echo");
        assert_eq!(tokens[1].token_type, TokenType::Text);
        assert_eq!(tokens[2].token_type, TokenType::Word);
    }

    #[test]
    fn test_at_keywords() {
        assert_eq!(
            types("@class Foo {}")[0..2],
            [TokenType::KeywordClass, TokenType::Text]
        );
        assert_eq!(types("@nullptr")[0], TokenType::KeywordNullptr);
        assert_eq!(types("@include_once <x>")[0], TokenType::KeywordIncludeOnce);
    }

    #[test]
    fn test_reference_chain() {
        let tokens = tokenize("@this.inner.x").unwrap();
        assert_eq!(tokens[0].token_type, TokenType::KeywordThis);
        assert_eq!(tokens[1].token_type, TokenType::Dot);
        assert_eq!(tokens[2].token_type, TokenType::Word);
        assert_eq!(tokens[2].value, "inner");
        assert_eq!(tokens[3].token_type, TokenType::Dot);
        assert_eq!(tokens[4].value, "x");
    }

    #[test]
    fn test_pointer_declaration_star() {
        let tokens = tokenize("@Window* ptr").unwrap();
        assert_eq!(tokens[0].token_type, TokenType::AtIdentifier);
        assert_eq!(tokens[0].value, "Window");
        assert_eq!(tokens[1].token_type, TokenType::Star);
    }

    #[test]
    fn test_deref_and_address_of() {
        let tokens = tokenize("*@p &@q").unwrap();
        assert_eq!(tokens[0].token_type, TokenType::Deref);
        assert_eq!(tokens[1].token_type, TokenType::AtIdentifier);
        let addr = tokens.iter().find(|t| t.token_type == TokenType::AddressOf);
        assert!(addr.is_some());
    }

    #[test]
    fn test_dollar_at_is_raw() {
        let tokens = tokenize("echo \"$@\"\n").unwrap();
        assert!(!tokens.iter().any(|t| t.token_type == TokenType::AtIdentifier));
    }

    #[test]
    fn test_dynamic_cast_target() {
        let tokens = tokenize("@dynamic_cast<Widget> p").unwrap();
        assert_eq!(tokens[0].token_type, TokenType::KeywordDynamicCast);
        assert_eq!(tokens[0].value, "Widget");
    }

    #[test]
    fn test_supershell_in_string() {
        let tokens = tokenize("echo \"result: @(date)\"\n").unwrap();
        let idx = tokens
            .iter()
            .position(|t| t.token_type == TokenType::SupershellStart)
            .unwrap();
        // The closing paren is still tokenized, then the string resumes
        assert!(tokens[idx..].iter().any(|t| t.token_type == TokenType::RParen));
        let quotes = tokens.iter().filter(|t| t.token_type == TokenType::DoubleQuote).count();
        assert_eq!(quotes, 2);
    }

    #[test]
    fn test_command_substitution_is_opaque() {
        let tokens = tokenize("x=$(echo @this)\n").unwrap();
        assert!(!tokens.iter().any(|t| t.token_type == TokenType::KeywordThis));
        assert!(tokens.iter().any(|t| t.value.contains("$(echo @this)")));
    }

    #[test]
    fn test_single_quotes_opaque() {
        let tokens = tokenize("echo '@this is literal'\n").unwrap();
        assert!(!tokens.iter().any(|t| t.token_type == TokenType::KeywordThis));
        assert_eq!(
            tokens.iter().find(|t| t.token_type == TokenType::SinglequoteString).unwrap().value,
            "'@this is literal'"
        );
    }

    #[test]
    fn test_connectives_and_separators() {
        assert!(types("a && b || c; d\n").contains(&TokenType::AndAnd));
        assert!(types("a && b || c; d\n").contains(&TokenType::OrOr));
        assert!(types("case x in a) ;; esac\n").contains(&TokenType::DSemi));
    }

    #[test]
    fn test_comment_positions() {
        let tokens = tokenize("echo hi # comment\n").unwrap();
        let comment = tokens.iter().find(|t| t.token_type == TokenType::Comment).unwrap();
        assert_eq!(comment.value, "# comment");
        // A # mid-word is not a comment
        let tokens = tokenize("echo hi#nope\n").unwrap();
        assert!(!tokens.iter().any(|t| t.token_type == TokenType::Comment));
    }

    #[test]
    fn test_heredoc_body_is_opaque() {
        let source = "cat <<EOF\n@this is not a reference\nEOF\necho @done\n";
        let tokens = tokenize(source).unwrap();
        assert!(!tokens.iter().any(|t| t.token_type == TokenType::KeywordThis));
        // Lexing resumes after the heredoc
        assert!(tokens
            .iter()
            .any(|t| t.token_type == TokenType::AtIdentifier && t.value == "done"));
    }

    #[test]
    fn test_length_query() {
        let tokens = tokenize("echo @#arr[@]\n").unwrap();
        let idx = tokens.iter().position(|t| t.token_type == TokenType::AtLength).unwrap();
        assert_eq!(tokens[idx + 1].token_type, TokenType::AtIdentifier);
        assert_eq!(tokens[idx + 1].value, "arr");
    }
}

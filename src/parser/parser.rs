//! Recursive Descent Parser for Bash++ sources
//!
//! Builds the tagged-union AST. Anything the parser does not recognize in a
//! code position is preserved as raw text: Bash++ is a superset of Bash and
//! plain Bash must survive the round trip untouched. Parse errors are
//! recorded and the parser resynchronizes at the next statement.

use crate::ast::types::*;
use crate::parser::lexer::{tokenize, Token, TokenType};
use crate::parser::types::{ParseException, MAX_PARSER_DEPTH};

use regex_lite::Regex;

/// Where a block of statements ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockStop {
    Eof,
    /// `}` closing a class, function, group or method body
    RBrace,
    /// `)` closing a supershell
    RParen,
    /// `fi` / `elif` / `else` closing an if branch
    IfBranch,
    /// `done` closing a loop body
    Done,
    /// `;;` or `esac` closing a case pattern
    CasePattern,
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
    errors: Vec<ParseException>,
}

/// Parse a complete source file. Always returns a Script; parse errors are
/// collected alongside so the driver can keep reporting.
pub fn parse(source: &str) -> (Script, Vec<ParseException>) {
    let tokens = match tokenize(source) {
        Ok(tokens) => tokens,
        Err(e) => {
            return (Script { statements: Vec::new() }, vec![e]);
        }
    };
    let mut parser = Parser { tokens, pos: 0, depth: 0, errors: Vec::new() };
    let statements = parser.parse_block(BlockStop::Eof);
    (Script { statements }, parser.errors)
}

impl Parser {
    // -------------------------------------------------------------------------
    // Token helpers
    // -------------------------------------------------------------------------

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_type(&self) -> TokenType {
        self.peek().token_type
    }

    fn peek_at(&self, offset: usize) -> &Token {
        &self.tokens[(self.pos + offset).min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn at_eof(&self) -> bool {
        self.peek_type() == TokenType::Eof
    }

    fn error(&mut self, message: impl Into<String>, pos: Position) {
        self.errors.push(ParseException::new(message, pos));
    }

    /// Skip to the next statement boundary after an error
    fn synchronize(&mut self) {
        while !self.at_eof() {
            match self.peek_type() {
                TokenType::Newline | TokenType::Semicolon => {
                    self.advance();
                    return;
                }
                _ => {
                    self.advance();
                }
            }
        }
    }

    /// True when the token is whitespace-only raw text
    fn is_blank_text(token: &Token) -> bool {
        token.token_type == TokenType::Text
            && token.value.chars().all(|c| c == ' ' || c == '\t')
    }

    fn skip_blank_text(&mut self) {
        while Self::is_blank_text(self.peek()) {
            self.advance();
        }
    }

    fn skip_blank_and_newlines(&mut self) {
        loop {
            if Self::is_blank_text(self.peek()) {
                self.advance();
            } else if matches!(self.peek_type(), TokenType::Newline | TokenType::Semicolon) {
                self.advance();
            } else {
                return;
            }
        }
    }

    /// Offset of the next token that is not blank text
    fn next_meaningful(&self, mut offset: usize) -> usize {
        while Self::is_blank_text(self.peek_at(offset)) {
            offset += 1;
        }
        offset
    }

    // -------------------------------------------------------------------------
    // Blocks and statements
    // -------------------------------------------------------------------------

    fn stop_here(&self, stop: BlockStop) -> bool {
        let token = self.peek();
        match stop {
            BlockStop::Eof => token.token_type == TokenType::Eof,
            BlockStop::RBrace => token.token_type == TokenType::RBrace,
            BlockStop::RParen => token.token_type == TokenType::RParen,
            BlockStop::IfBranch => {
                token.token_type == TokenType::Word
                    && matches!(token.value.as_str(), "fi" | "elif" | "else")
            }
            BlockStop::Done => token.token_type == TokenType::Word && token.value == "done",
            BlockStop::CasePattern => {
                token.token_type == TokenType::DSemi
                    || (token.token_type == TokenType::Word && token.value == "esac")
            }
        }
    }

    fn parse_block(&mut self, stop: BlockStop) -> Block {
        let mut statements = Vec::new();
        if self.depth >= MAX_PARSER_DEPTH {
            self.error("Nesting too deep", self.peek().position);
            return statements;
        }
        self.depth += 1;
        loop {
            self.skip_blank_and_newlines();
            if self.at_eof() || self.stop_here(stop) {
                break;
            }
            if let Some(statement) = self.parse_statement(stop) {
                statements.push(statement);
            }
        }
        self.depth -= 1;
        statements
    }

    fn parse_statement(&mut self, stop: BlockStop) -> Option<Node> {
        let token = self.peek().clone();
        match token.token_type {
            TokenType::Comment => {
                self.advance();
                Some(Node::Comment(RawTextNode { text: token.value, pos: token.position }))
            }
            TokenType::KeywordClass => self.parse_class_definition(),
            TokenType::KeywordInclude | TokenType::KeywordIncludeOnce => self.parse_include(),
            TokenType::KeywordDelete => self.parse_delete(),
            TokenType::KeywordPublic
            | TokenType::KeywordProtected
            | TokenType::KeywordPrivate
            | TokenType::KeywordVirtual
            | TokenType::KeywordMethod
            | TokenType::KeywordConstructor
            | TokenType::KeywordDestructor => {
                self.error(
                    "Member declaration outside of a class body",
                    token.position,
                );
                self.synchronize();
                None
            }
            TokenType::AtIdentifier => self.parse_at_statement(),
            TokenType::KeywordThis | TokenType::KeywordSuper => {
                self.parse_reference_or_assignment_statement()
            }
            TokenType::Deref => self.parse_deref_statement(),
            TokenType::LBrace => self.parse_group(),
            TokenType::Word => match token.value.as_str() {
                "if" => self.parse_if(),
                "while" | "until" => self.parse_while(token.value == "until"),
                "for" | "select" => self.parse_for(),
                "case" => self.parse_case(),
                "function" => self.parse_function_keyword(),
                _ if self.looks_like_function_def() => self.parse_function_parens(),
                _ => self.parse_command_chain(stop),
            },
            _ => self.parse_command_chain(stop),
        }
    }

    // -------------------------------------------------------------------------
    // Raw parts
    // -------------------------------------------------------------------------

    /// Collect expression-level parts until one of the stop tokens.
    /// `paren_depth` tracks raw parens so a closing `)` only stops the
    /// collection at depth zero (supershell bodies, case patterns).
    fn parse_parts(&mut self, stops: &[TokenType], stop_words: &[&str]) -> Vec<Node> {
        let mut parts: Vec<Node> = Vec::new();
        let mut raw = String::new();
        let mut raw_pos: Option<Position> = None;
        let mut paren_depth = 0usize;

        macro_rules! flush_raw {
            () => {
                if let Some(pos) = raw_pos.take() {
                    if !raw.is_empty() {
                        parts.push(Node::RawText(RawTextNode {
                            text: std::mem::take(&mut raw),
                            pos,
                        }));
                    }
                }
            };
        }

        loop {
            let token = self.peek().clone();
            if token.token_type == TokenType::Eof {
                break;
            }
            if paren_depth == 0 && stops.contains(&token.token_type) {
                break;
            }
            if token.token_type == TokenType::Word
                && stop_words.contains(&token.value.as_str())
            {
                break;
            }

            match token.token_type {
                TokenType::DoubleQuote => {
                    flush_raw!();
                    parts.push(self.parse_string());
                }
                TokenType::SinglequoteString => {
                    self.advance();
                    flush_raw!();
                    parts.push(Node::SinglequoteString(RawTextNode {
                        text: token.value,
                        pos: token.position,
                    }));
                }
                TokenType::Comment => {
                    self.advance();
                    flush_raw!();
                    parts.push(Node::Comment(RawTextNode {
                        text: token.value,
                        pos: token.position,
                    }));
                }
                TokenType::SupershellStart => {
                    flush_raw!();
                    parts.push(self.parse_supershell());
                }
                TokenType::AtIdentifier | TokenType::KeywordThis | TokenType::KeywordSuper => {
                    flush_raw!();
                    let reference = self.parse_reference(false);
                    parts.push(Node::ObjectReference(reference));
                }
                TokenType::AtLength => {
                    self.advance();
                    flush_raw!();
                    let reference = self.parse_reference(true);
                    parts.push(Node::ObjectReference(reference));
                }
                TokenType::Deref => {
                    self.advance();
                    flush_raw!();
                    let reference = self.parse_reference(false);
                    parts.push(Node::PointerDereference(Box::new(reference)));
                }
                TokenType::AddressOf => {
                    self.advance();
                    flush_raw!();
                    let reference = self.parse_reference(false);
                    parts.push(Node::ObjectAddress(Box::new(reference)));
                }
                TokenType::KeywordNullptr => {
                    self.advance();
                    flush_raw!();
                    parts.push(Node::NullptrRef(NullptrNode { pos: token.position }));
                }
                TokenType::KeywordNew => {
                    self.advance();
                    flush_raw!();
                    self.skip_blank_text();
                    if self.peek_type() == TokenType::Word {
                        let name = self.advance();
                        parts.push(Node::New(NewNode {
                            class_name: Ident::new(name.value, name.position),
                            pos: token.position,
                        }));
                    } else {
                        self.error("Expected a class name after @new", token.position);
                    }
                }
                TokenType::KeywordDynamicCast => {
                    self.advance();
                    flush_raw!();
                    self.skip_blank_text();
                    let operand = self.parse_parts(stops, stop_words);
                    parts.push(Node::DynamicCast(DynamicCastNode {
                        target: Self::cast_target(&token),
                        operand,
                        pos: token.position,
                    }));
                }
                TokenType::KeywordTypeof => {
                    self.advance();
                    flush_raw!();
                    self.skip_blank_text();
                    let operand = self.parse_parts(stops, stop_words);
                    parts.push(Node::Typeof(TypeofNode { operand, pos: token.position }));
                }
                TokenType::LParen => {
                    self.advance();
                    paren_depth += 1;
                    if raw_pos.is_none() {
                        raw_pos = Some(token.position);
                    }
                    raw.push('(');
                }
                TokenType::RParen => {
                    if paren_depth == 0 {
                        // A stray closer belongs to an enclosing construct
                        break;
                    }
                    self.advance();
                    paren_depth -= 1;
                    if raw_pos.is_none() {
                        raw_pos = Some(token.position);
                    }
                    raw.push(')');
                }
                _ => {
                    self.advance();
                    if raw_pos.is_none() {
                        raw_pos = Some(token.position);
                    }
                    raw.push_str(&token.text());
                }
            }
        }
        flush_raw!();
        parts
    }

    /// Render upcoming tokens to plain text until a stop token. Used for
    /// headers (class parents, includes) that are easier to inspect as text.
    fn collect_text_until(&mut self, stops: &[TokenType]) -> String {
        let mut text = String::new();
        while !self.at_eof() && !stops.contains(&self.peek_type()) {
            let token = self.advance();
            text.push_str(&token.text());
        }
        text
    }

    fn cast_target(token: &Token) -> CastTarget {
        let target = token.value.trim();
        let ident_like = !target.is_empty()
            && target
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_');
        if ident_like {
            CastTarget::ClassName(Ident::new(target, token.position))
        } else {
            CastTarget::Runtime(target.to_string())
        }
    }

    /// Trim trailing whitespace and separators from a collected condition
    fn trim_condition(parts: &mut Vec<Node>) {
        while let Some(Node::RawText(raw)) = parts.last_mut() {
            let trimmed = raw
                .text
                .trim_end_matches(|c: char| matches!(c, '\n' | ' ' | '\t' | ';'))
                .to_string();
            if trimmed.is_empty() {
                parts.pop();
            } else {
                raw.text = trimmed;
                break;
            }
        }
    }

    fn trim_trailing_blank(parts: &mut Vec<Node>) {
        while let Some(Node::RawText(raw)) = parts.last_mut() {
            let trimmed = raw
                .text
                .trim_end_matches(|c: char| matches!(c, ' ' | '\t'))
                .to_string();
            if trimmed.is_empty() {
                parts.pop();
            } else {
                raw.text = trimmed;
                break;
            }
        }
    }

    fn trim_leading(parts: &mut Vec<Node>) {
        while let Some(Node::RawText(raw)) = parts.first_mut() {
            let trimmed = raw
                .text
                .trim_start_matches(|c: char| matches!(c, '\n' | ' ' | '\t'))
                .to_string();
            if trimmed.is_empty() {
                parts.remove(0);
            } else {
                raw.text = trimmed;
                break;
            }
        }
    }

    // -------------------------------------------------------------------------
    // Strings and supershells
    // -------------------------------------------------------------------------

    fn parse_string(&mut self) -> Node {
        let open = self.advance(); // opening quote
        let parts = self.parse_parts(&[TokenType::DoubleQuote], &[]);
        if self.peek_type() == TokenType::DoubleQuote {
            self.advance();
        } else {
            self.error("Unterminated string", open.position);
        }
        Node::StringLiteral(StringNode { parts, pos: open.position })
    }

    fn parse_supershell(&mut self) -> Node {
        let open = self.advance(); // @(
        let body = self.parse_block(BlockStop::RParen);
        if self.peek_type() == TokenType::RParen {
            self.advance();
        } else {
            self.error("Unterminated supershell", open.position);
        }
        Node::Supershell(SupershellNode { body, pos: open.position })
    }

    // -------------------------------------------------------------------------
    // References
    // -------------------------------------------------------------------------

    /// Parse a reference chain starting at the current `@identifier`,
    /// `@this` or `@super` token, including an optional `[index]`.
    fn parse_reference(&mut self, length_query: bool) -> ObjectReferenceNode {
        let first = self.advance();
        let first_name = match first.token_type {
            TokenType::KeywordThis => "this".to_string(),
            TokenType::KeywordSuper => "super".to_string(),
            _ => first.value.clone(),
        };
        let mut ids = vec![Ident::new(first_name, first.position)];

        while self.peek_type() == TokenType::Dot {
            self.advance();
            if self.peek_type() == TokenType::Word {
                let word = self.advance();
                ids.push(Ident::new(word.value, word.position));
            } else {
                self.error("Expected an identifier after '.'", self.peek().position);
                break;
            }
        }

        let mut array_index = None;
        if self.peek_type() == TokenType::LBracket {
            self.advance();
            let parts = self.parse_parts(&[TokenType::RBracket, TokenType::Newline], &[]);
            if self.peek_type() == TokenType::RBracket {
                self.advance();
            } else {
                self.error("Unterminated array index", first.position);
            }
            array_index = Some(parts);
        }

        ObjectReferenceNode { ids, array_index, length_query, pos: first.position }
    }

    // -------------------------------------------------------------------------
    // Statements
    // -------------------------------------------------------------------------

    fn statement_value_stops() -> &'static [TokenType] {
        &[TokenType::Newline, TokenType::Semicolon, TokenType::Eof]
    }

    /// Parse an rvalue after `=` / `+=` up to the end of the statement
    fn parse_value(&mut self) -> ValueNode {
        let pos = self.peek().position;
        self.skip_blank_text();
        let mut is_array = false;
        let mut parts;
        if self.peek_type() == TokenType::LParen {
            // Array literal: capture the whole parenthesized group raw
            parts = self.parse_parts(Self::statement_value_stops(), &[]);
            is_array = matches!(
                parts.first(),
                Some(Node::RawText(raw)) if raw.text.starts_with('(')
            );
        } else {
            parts = self.parse_parts(Self::statement_value_stops(), &[]);
        }
        Self::trim_condition(&mut parts);
        ValueNode { parts, is_array, pos }
    }

    /// Statement starting with `@identifier`: instantiation, pointer
    /// declaration, assignment, or a plain reference statement.
    fn parse_at_statement(&mut self) -> Option<Node> {
        // Peek past the chain to decide what this is
        let mut offset = 1; // the @identifier itself
        while self.peek_at(offset).token_type == TokenType::Dot {
            offset += 2;
        }
        match self.peek_at(offset).token_type {
            TokenType::Star => self.parse_pointer_declaration(),
            TokenType::Equals | TokenType::PlusEquals | TokenType::LBracket => {
                self.parse_reference_or_assignment_statement()
            }
            _ => {
                let after = self.next_meaningful(offset);
                let chain_len = offset;
                if chain_len == 1 && self.peek_at(after).token_type == TokenType::Word {
                    self.parse_object_instantiation()
                } else {
                    self.parse_reference_or_assignment_statement()
                }
            }
        }
    }

    fn parse_object_instantiation(&mut self) -> Option<Node> {
        let type_token = self.advance();
        let class_name = Ident::new(type_token.value.clone(), type_token.position);
        self.skip_blank_text();
        let name_token = self.advance();
        let name = Ident::new(name_token.value.clone(), name_token.position);

        let mut copy_from = None;
        self.skip_blank_text();
        if self.peek_type() == TokenType::Equals {
            self.advance();
            self.skip_blank_text();
            match self.peek_type() {
                TokenType::AtIdentifier | TokenType::KeywordThis | TokenType::KeywordSuper => {
                    copy_from = Some(self.parse_reference(false));
                }
                _ => {
                    self.error(
                        "An object instantiation can only be initialized from another object",
                        name_token.position,
                    );
                    self.synchronize();
                    return None;
                }
            }
        }

        Some(Node::ObjectInstantiation(ObjectInstantiationNode {
            class_name,
            name,
            copy_from,
            pos: type_token.position,
        }))
    }

    fn parse_pointer_declaration(&mut self) -> Option<Node> {
        let type_token = self.advance();
        let class_name = Ident::new(type_token.value.clone(), type_token.position);
        self.advance(); // *
        self.skip_blank_text();
        if self.peek_type() != TokenType::Word {
            self.error("Expected a pointer name", type_token.position);
            self.synchronize();
            return None;
        }
        let name_token = self.advance();
        let name = Ident::new(name_token.value.clone(), name_token.position);

        let mut value = None;
        self.skip_blank_text();
        if self.peek_type() == TokenType::Equals {
            self.advance();
            value = Some(self.parse_value());
        }

        Some(Node::PointerDeclaration(PointerDeclarationNode {
            class_name,
            name,
            value,
            pos: type_token.position,
        }))
    }

    /// `@chain ...`: an assignment when `=`/`+=` follows the chain, else a
    /// command statement whose first part is the reference.
    fn parse_reference_or_assignment_statement(&mut self) -> Option<Node> {
        let pos = self.peek().position;
        let reference = self.parse_reference(false);
        self.skip_blank_text();
        match self.peek_type() {
            TokenType::Equals | TokenType::PlusEquals => {
                let adding = self.peek_type() == TokenType::PlusEquals;
                self.advance();
                let value = self.parse_value();
                Some(Node::ObjectAssignment(ObjectAssignmentNode {
                    lvalue: reference,
                    deref: false,
                    adding,
                    value,
                    pos,
                }))
            }
            _ => {
                let mut parts = vec![Node::ObjectReference(reference)];
                parts.extend(self.parse_parts(Self::statement_value_stops(), &[]));
                Some(Node::Statement(StatementNode {
                    pipelines: vec![parts],
                    connectives: Vec::new(),
                    pos,
                }))
            }
        }
    }

    fn parse_deref_statement(&mut self) -> Option<Node> {
        let pos = self.peek().position;
        self.advance(); // *
        let reference = self.parse_reference(false);
        self.skip_blank_text();
        match self.peek_type() {
            TokenType::Equals | TokenType::PlusEquals => {
                let adding = self.peek_type() == TokenType::PlusEquals;
                self.advance();
                let value = self.parse_value();
                Some(Node::ObjectAssignment(ObjectAssignmentNode {
                    lvalue: reference,
                    deref: true,
                    adding,
                    value,
                    pos,
                }))
            }
            _ => {
                let mut parts = vec![Node::PointerDereference(Box::new(reference))];
                parts.extend(self.parse_parts(Self::statement_value_stops(), &[]));
                Some(Node::Statement(StatementNode {
                    pipelines: vec![parts],
                    connectives: Vec::new(),
                    pos,
                }))
            }
        }
    }

    fn parse_delete(&mut self) -> Option<Node> {
        let keyword = self.advance();
        self.skip_blank_text();
        match self.peek_type() {
            TokenType::AtIdentifier | TokenType::KeywordThis | TokenType::KeywordSuper => {
                let target = self.parse_reference(false);
                Some(Node::Delete(DeleteNode { target, pos: keyword.position }))
            }
            _ => {
                self.error("Expected an object reference after @delete", keyword.position);
                self.synchronize();
                None
            }
        }
    }

    /// A plain command statement: pipelines split on `&&` / `||`
    fn parse_command_chain(&mut self, stop: BlockStop) -> Option<Node> {
        let pos = self.peek().position;
        let mut pipelines = Vec::new();
        let mut connectives = Vec::new();

        loop {
            let mut parts =
                self.parse_parts(&[TokenType::Newline, TokenType::Semicolon, TokenType::Eof,
                                   TokenType::DSemi, TokenType::AndAnd, TokenType::OrOr], &[]);
            Self::trim_leading(&mut parts);
            Self::trim_trailing_blank(&mut parts);
            pipelines.push(parts);
            match self.peek_type() {
                TokenType::AndAnd => {
                    self.advance();
                    self.skip_blank_and_newlines();
                    connectives.push(Connective::And);
                }
                TokenType::OrOr => {
                    self.advance();
                    self.skip_blank_and_newlines();
                    connectives.push(Connective::Or);
                }
                _ => break,
            }
        }

        // Nothing but whitespace: not a statement
        if pipelines.len() == 1 && pipelines[0].is_empty() {
            if matches!(self.peek_type(), TokenType::Newline | TokenType::Semicolon) {
                self.advance();
            } else if !self.stop_here(stop) && !self.at_eof() {
                // Avoid livelock on an unexpected token
                let token = self.advance();
                self.error(format!("Unexpected token: {}", token.text()), token.position);
            }
            return None;
        }

        Some(Node::Statement(StatementNode { pipelines, connectives, pos }))
    }

    // -------------------------------------------------------------------------
    // Compound commands
    // -------------------------------------------------------------------------

    fn parse_if(&mut self) -> Option<Node> {
        let keyword = self.advance(); // if
        let mut branches = Vec::new();
        let mut else_body = None;

        loop {
            // Condition up to `then`
            let mut condition = self.parse_parts(
                &[TokenType::Eof],
                &["then"],
            );
            Self::trim_condition(&mut condition);
            Self::trim_leading(&mut condition);
            if self.peek_type() == TokenType::Word && self.peek().value == "then" {
                self.advance();
            } else {
                self.error("Expected 'then'", keyword.position);
                return None;
            }
            let body = self.parse_block(BlockStop::IfBranch);
            branches.push(IfBranch { condition, body });

            let next = self.peek().clone();
            if next.token_type == TokenType::Word && next.value == "elif" {
                self.advance();
            } else if next.token_type == TokenType::Word && next.value == "else" {
                self.advance();
                else_body = Some(self.parse_block(BlockStop::IfBranch));
                if self.peek_type() == TokenType::Word && self.peek().value == "fi" {
                    self.advance();
                } else {
                    self.error("Expected 'fi'", keyword.position);
                }
                break;
            } else if next.token_type == TokenType::Word && next.value == "fi" {
                self.advance();
                break;
            } else {
                self.error("Expected 'elif', 'else' or 'fi'", keyword.position);
                break;
            }
        }

        Some(Node::If(IfNode { branches, else_body, pos: keyword.position }))
    }

    fn parse_while(&mut self, until: bool) -> Option<Node> {
        let keyword = self.advance();
        let mut condition = self.parse_parts(&[TokenType::Eof], &["do"]);
        Self::trim_condition(&mut condition);
        Self::trim_leading(&mut condition);
        if self.peek_type() == TokenType::Word && self.peek().value == "do" {
            self.advance();
        } else {
            self.error("Expected 'do'", keyword.position);
            return None;
        }
        let body = self.parse_block(BlockStop::Done);
        if self.peek_type() == TokenType::Word && self.peek().value == "done" {
            self.advance();
        } else {
            self.error("Expected 'done'", keyword.position);
        }
        Some(Node::WhileOrUntil(WhileNode { until, condition, body, pos: keyword.position }))
    }

    fn parse_for(&mut self) -> Option<Node> {
        let keyword = self.advance(); // for | select
        let mut header = self.parse_parts(&[TokenType::Eof], &["do"]);
        Self::trim_condition(&mut header);
        Self::trim_leading(&mut header);
        if self.peek_type() == TokenType::Word && self.peek().value == "do" {
            self.advance();
        } else {
            self.error("Expected 'do'", keyword.position);
            return None;
        }
        let body = self.parse_block(BlockStop::Done);
        if self.peek_type() == TokenType::Word && self.peek().value == "done" {
            self.advance();
        } else {
            self.error("Expected 'done'", keyword.position);
        }
        Some(Node::For(ForNode {
            keyword: keyword.value,
            header,
            body,
            pos: keyword.position,
        }))
    }

    fn parse_case(&mut self) -> Option<Node> {
        let keyword = self.advance(); // case
        let mut subject = self.parse_parts(&[TokenType::Eof], &["in"]);
        Self::trim_condition(&mut subject);
        Self::trim_leading(&mut subject);
        if self.peek_type() == TokenType::Word && self.peek().value == "in" {
            self.advance();
        } else {
            self.error("Expected 'in'", keyword.position);
            return None;
        }

        let mut patterns = Vec::new();
        loop {
            self.skip_blank_and_newlines();
            if self.peek_type() == TokenType::Word && self.peek().value == "esac" {
                self.advance();
                break;
            }
            if self.at_eof() {
                self.error("Expected 'esac'", keyword.position);
                break;
            }
            // Optional open paren before the pattern
            if self.peek_type() == TokenType::LParen {
                self.advance();
            }
            let mut pattern = self.parse_parts(&[TokenType::RParen, TokenType::Newline], &[]);
            Self::trim_condition(&mut pattern);
            Self::trim_leading(&mut pattern);
            if self.peek_type() == TokenType::RParen {
                self.advance();
            } else {
                self.error("Expected ')' after case pattern", keyword.position);
                self.synchronize();
                continue;
            }
            let body = self.parse_block(BlockStop::CasePattern);
            if self.peek_type() == TokenType::DSemi {
                self.advance();
            }
            patterns.push(CasePattern { pattern, body });
        }

        Some(Node::Case(CaseNode { subject, patterns, pos: keyword.position }))
    }

    /// `name() { ... }` on the current token
    fn looks_like_function_def(&self) -> bool {
        if self.peek_type() != TokenType::Word {
            return false;
        }
        if self.peek_at(1).token_type != TokenType::LParen
            || self.peek_at(2).token_type != TokenType::RParen
        {
            return false;
        }
        let after = self.next_meaningful(3);
        self.peek_at(after).token_type == TokenType::LBrace
            || (self.peek_at(after).token_type == TokenType::Newline
                && self.peek_at(self.next_meaningful(after + 1)).token_type == TokenType::LBrace)
    }

    fn parse_function_parens(&mut self) -> Option<Node> {
        let name_token = self.advance();
        self.advance(); // (
        self.advance(); // )
        self.skip_blank_and_newlines();
        self.parse_function_body(name_token.value.clone(), format!("{}()", name_token.value), name_token.position)
    }

    fn parse_function_keyword(&mut self) -> Option<Node> {
        let keyword = self.advance(); // function
        self.skip_blank_text();
        if self.peek_type() != TokenType::Word {
            self.error("Expected a function name", keyword.position);
            self.synchronize();
            return None;
        }
        let name_token = self.advance();
        let mut header = format!("function {}", name_token.value);
        self.skip_blank_text();
        if self.peek_type() == TokenType::LParen && self.peek_at(1).token_type == TokenType::RParen {
            self.advance();
            self.advance();
            header.push_str("()");
        }
        self.skip_blank_and_newlines();
        self.parse_function_body(name_token.value.clone(), header, keyword.position)
    }

    fn parse_function_body(&mut self, name: String, header: String, pos: Position) -> Option<Node> {
        if self.peek_type() != TokenType::LBrace {
            self.error("Expected '{' to open the function body", pos);
            self.synchronize();
            return None;
        }
        self.advance(); // {
        let body = self.parse_block(BlockStop::RBrace);
        if self.peek_type() == TokenType::RBrace {
            self.advance();
        } else {
            self.error("Expected '}' to close the function body", pos);
        }
        Some(Node::FunctionDefinition(FunctionNode { name, header, body, pos }))
    }

    fn parse_group(&mut self) -> Option<Node> {
        let open = self.advance(); // {
        let body = self.parse_block(BlockStop::RBrace);
        if self.peek_type() == TokenType::RBrace {
            self.advance();
        } else {
            self.error("Expected '}'", open.position);
        }
        Some(Node::Group(GroupNode { body, pos: open.position }))
    }

    // -------------------------------------------------------------------------
    // Includes
    // -------------------------------------------------------------------------

    fn parse_include(&mut self) -> Option<Node> {
        let keyword = self.advance();
        let once = keyword.token_type == TokenType::KeywordIncludeOnce;
        let text = self.collect_text_until(&[TokenType::Newline, TokenType::Eof]);

        let re = Regex::new(
            r#"^\s*(?:(static|dynamic)\s+)?(?:<([^>]+)>|"([^"]+)")\s*(?:as\s+"([^"]+)")?\s*$"#,
        )
        .unwrap();
        let caps = match re.captures(&text) {
            Some(caps) => caps,
            None => {
                self.error("Include statement not understood", keyword.position);
                return None;
            }
        };

        let dynamic = caps.get(1).map(|m| m.as_str() == "dynamic").unwrap_or(false);
        let (system, path) = match caps.get(2) {
            Some(m) => (true, m.as_str().to_string()),
            None => (false, caps.get(3).map(|m| m.as_str().to_string()).unwrap_or_default()),
        };
        let as_path = caps.get(4).map(|m| m.as_str().to_string());

        Some(Node::Include(IncludeNode {
            once,
            dynamic,
            system,
            path,
            as_path,
            pos: keyword.position,
        }))
    }

    // -------------------------------------------------------------------------
    // Class definitions
    // -------------------------------------------------------------------------

    fn parse_class_definition(&mut self) -> Option<Node> {
        let keyword = self.advance(); // @class
        self.skip_blank_text();
        if self.peek_type() != TokenType::Word {
            self.error("Expected a class name after @class", keyword.position);
            self.synchronize();
            return None;
        }
        let name_token = self.advance();
        let name = Ident::new(name_token.value.clone(), name_token.position);

        // Header between the name and `{` holds an optional `: Parent`
        let header = self.collect_text_until(&[TokenType::LBrace, TokenType::Newline, TokenType::Eof]);
        let mut parent = None;
        let header_trimmed = header.trim();
        if !header_trimmed.is_empty() {
            let re = Regex::new(r"^:\s*([A-Za-z_][A-Za-z0-9_]*)$").unwrap();
            match re.captures(header_trimmed) {
                Some(caps) => {
                    parent = Some(Ident::new(caps[1].to_string(), name_token.position));
                }
                None => {
                    self.error(
                        format!("Class header not understood: {header_trimmed}"),
                        keyword.position,
                    );
                }
            }
        }

        if self.peek_type() != TokenType::LBrace {
            self.error("Expected '{' to open the class body", keyword.position);
            self.synchronize();
            return None;
        }
        self.advance(); // {

        let mut items = Vec::new();
        loop {
            self.skip_blank_and_newlines();
            match self.peek_type() {
                TokenType::RBrace => {
                    self.advance();
                    break;
                }
                TokenType::Eof => {
                    self.error("Unterminated class body", keyword.position);
                    break;
                }
                TokenType::Comment => {
                    self.advance();
                }
                TokenType::KeywordPublic | TokenType::KeywordProtected | TokenType::KeywordPrivate => {
                    let vis_token = self.advance();
                    let visibility = match vis_token.token_type {
                        TokenType::KeywordPublic => VisibilityKeyword::Public,
                        TokenType::KeywordProtected => VisibilityKeyword::Protected,
                        _ => VisibilityKeyword::Private,
                    };
                    if let Some(item) = self.parse_class_item(visibility, vis_token.position) {
                        items.push(item);
                    }
                }
                TokenType::KeywordConstructor => {
                    let token = self.advance();
                    if let Some(method) = self.parse_special_method("__constructor", token.position) {
                        items.push(ClassItem::Constructor(method));
                    }
                }
                TokenType::KeywordDestructor => {
                    let token = self.advance();
                    if let Some(method) = self.parse_special_method("__destructor", token.position) {
                        items.push(ClassItem::Destructor(method));
                    }
                }
                TokenType::KeywordMethod | TokenType::KeywordVirtual => {
                    let token = self.peek().clone();
                    self.error(
                        "Methods must be declared with a visibility (@public, @protected, @private)",
                        token.position,
                    );
                    self.synchronize();
                }
                _ => {
                    let token = self.peek().clone();
                    self.error(
                        format!("Unexpected token in class body: {}", token.text()),
                        token.position,
                    );
                    self.synchronize();
                }
            }
        }

        Some(Node::ClassDefinition(ClassDefinitionNode {
            name,
            parent,
            items,
            pos: keyword.position,
        }))
    }

    fn parse_class_item(
        &mut self,
        visibility: VisibilityKeyword,
        pos: Position,
    ) -> Option<ClassItem> {
        self.skip_blank_text();
        match self.peek_type() {
            TokenType::KeywordVirtual => {
                self.advance();
                self.skip_blank_text();
                if self.peek_type() != TokenType::KeywordMethod {
                    self.error("Expected @method after @virtual", pos);
                    self.synchronize();
                    return None;
                }
                self.advance();
                self.parse_method(visibility, true, pos).map(ClassItem::Method)
            }
            TokenType::KeywordMethod => {
                self.advance();
                self.parse_method(visibility, false, pos).map(ClassItem::Method)
            }
            TokenType::AtIdentifier => {
                // Object or pointer member
                let type_token = self.advance();
                let class_name = Ident::new(type_token.value.clone(), type_token.position);
                let is_pointer = if self.peek_type() == TokenType::Star {
                    self.advance();
                    true
                } else {
                    false
                };
                self.skip_blank_text();
                if self.peek_type() != TokenType::Word {
                    self.error("Expected a member name", type_token.position);
                    self.synchronize();
                    return None;
                }
                let name_token = self.advance();
                let name = Ident::new(name_token.value.clone(), name_token.position);

                let kind = if is_pointer {
                    let mut default = None;
                    self.skip_blank_text();
                    if self.peek_type() == TokenType::Equals {
                        self.advance();
                        default = Some(self.parse_value());
                    }
                    MemberKind::Pointer { class_name, default }
                } else {
                    MemberKind::Object { class_name }
                };
                Some(ClassItem::Member(MemberDeclNode { visibility, name, kind, pos }))
            }
            TokenType::Word => {
                // Primitive member
                let name_token = self.advance();
                let name = Ident::new(name_token.value.clone(), name_token.position);
                let mut default = None;
                if self.peek_type() == TokenType::Equals {
                    self.advance();
                    default = Some(self.parse_value());
                } else {
                    self.skip_blank_text();
                    if self.peek_type() == TokenType::Equals {
                        self.advance();
                        default = Some(self.parse_value());
                    }
                }
                Some(ClassItem::Member(MemberDeclNode {
                    visibility,
                    name,
                    kind: MemberKind::Primitive { default },
                    pos,
                }))
            }
            _ => {
                let token = self.peek().clone();
                self.error(
                    format!("Expected a member or method declaration, found: {}", token.text()),
                    token.position,
                );
                self.synchronize();
                None
            }
        }
    }

    fn parse_method(
        &mut self,
        visibility: VisibilityKeyword,
        is_virtual: bool,
        pos: Position,
    ) -> Option<MethodDefNode> {
        self.skip_blank_text();
        if self.peek_type() != TokenType::Word {
            self.error("Expected a method name after @method", pos);
            self.synchronize();
            return None;
        }
        let name_token = self.advance();
        let name = Ident::new(name_token.value.clone(), name_token.position);

        let mut params = Vec::new();
        loop {
            self.skip_blank_text();
            match self.peek_type() {
                TokenType::LBrace => break,
                TokenType::Word => {
                    let param = self.advance();
                    params.push(MethodParamNode {
                        type_name: None,
                        is_pointer: false,
                        name: Ident::new(param.value, param.position),
                    });
                }
                TokenType::AtIdentifier => {
                    let type_token = self.advance();
                    let is_pointer = if self.peek_type() == TokenType::Star {
                        self.advance();
                        true
                    } else {
                        false
                    };
                    self.skip_blank_text();
                    if self.peek_type() != TokenType::Word {
                        self.error("Expected a parameter name", type_token.position);
                        break;
                    }
                    let param = self.advance();
                    params.push(MethodParamNode {
                        type_name: Some(Ident::new(type_token.value.clone(), type_token.position)),
                        is_pointer,
                        name: Ident::new(param.value, param.position),
                    });
                }
                TokenType::Newline => {
                    self.advance();
                }
                _ => {
                    let token = self.peek().clone();
                    self.error(
                        format!("Unexpected token in method signature: {}", token.text()),
                        token.position,
                    );
                    self.synchronize();
                    return None;
                }
            }
        }

        self.advance(); // {
        let body = self.parse_block(BlockStop::RBrace);
        if self.peek_type() == TokenType::RBrace {
            self.advance();
        } else {
            self.error("Expected '}' to close the method body", pos);
        }

        Some(MethodDefNode { visibility, is_virtual, name, params, body, pos })
    }

    fn parse_special_method(&mut self, name: &str, pos: Position) -> Option<MethodDefNode> {
        self.skip_blank_and_newlines();
        if self.peek_type() != TokenType::LBrace {
            self.error(format!("Expected '{{' after @{}", name.trim_start_matches('_')), pos);
            self.synchronize();
            return None;
        }
        self.advance(); // {
        let body = self.parse_block(BlockStop::RBrace);
        if self.peek_type() == TokenType::RBrace {
            self.advance();
        } else {
            self.error("Expected '}'", pos);
        }
        Some(MethodDefNode {
            visibility: VisibilityKeyword::Public,
            is_virtual: false,
            name: Ident::new(name, pos),
            params: Vec::new(),
            body,
            pos,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(source: &str) -> Script {
        let (script, errors) = parse(source);
        assert!(errors.is_empty(), "unexpected parse errors: {errors:?}");
        script
    }

    #[test]
    fn test_plain_bash_passes_through() {
        let script = parse_ok("echo hello world\nls -la\n");
        assert_eq!(script.statements.len(), 2);
        assert!(matches!(script.statements[0], Node::Statement(_)));
    }

    #[test]
    fn test_empty_class() {
        let script = parse_ok("@class Foo {}\n");
        match &script.statements[0] {
            Node::ClassDefinition(class) => {
                assert_eq!(class.name.name, "Foo");
                assert!(class.parent.is_none());
                assert!(class.items.is_empty());
            }
            other => panic!("expected class definition, got {other:?}"),
        }
    }

    #[test]
    fn test_class_with_parent_and_members() {
        let source = "@class B : A {\n\t@public name=\"hi\"\n\t@private @Inner inner\n\t@protected @Other* link\n}\n";
        let script = parse_ok(source);
        match &script.statements[0] {
            Node::ClassDefinition(class) => {
                assert_eq!(class.parent.as_ref().unwrap().name, "A");
                assert_eq!(class.items.len(), 3);
                match &class.items[0] {
                    ClassItem::Member(m) => {
                        assert_eq!(m.name.name, "name");
                        assert!(matches!(m.kind, MemberKind::Primitive { default: Some(_) }));
                    }
                    other => panic!("expected member, got {other:?}"),
                }
                match &class.items[2] {
                    ClassItem::Member(m) => {
                        assert!(matches!(m.kind, MemberKind::Pointer { .. }));
                        assert_eq!(m.visibility, VisibilityKeyword::Protected);
                    }
                    other => panic!("expected pointer member, got {other:?}"),
                }
            }
            other => panic!("expected class definition, got {other:?}"),
        }
    }

    #[test]
    fn test_virtual_method() {
        let source = "@class A {\n\t@public @virtual @method greet {\n\t\techo A\n\t}\n}\n";
        let script = parse_ok(source);
        match &script.statements[0] {
            Node::ClassDefinition(class) => match &class.items[0] {
                ClassItem::Method(m) => {
                    assert!(m.is_virtual);
                    assert_eq!(m.name.name, "greet");
                    assert_eq!(m.body.len(), 1);
                }
                other => panic!("expected method, got {other:?}"),
            },
            other => panic!("expected class, got {other:?}"),
        }
    }

    #[test]
    fn test_method_parameters() {
        let source = "@class A {\n\t@public @method move x y @Point* to {\n\t\t:\n\t}\n}\n";
        let script = parse_ok(source);
        match &script.statements[0] {
            Node::ClassDefinition(class) => match &class.items[0] {
                ClassItem::Method(m) => {
                    assert_eq!(m.params.len(), 3);
                    assert!(m.params[0].type_name.is_none());
                    assert_eq!(m.params[2].type_name.as_ref().unwrap().name, "Point");
                    assert!(m.params[2].is_pointer);
                }
                other => panic!("expected method, got {other:?}"),
            },
            other => panic!("expected class, got {other:?}"),
        }
    }

    #[test]
    fn test_constructor_and_destructor() {
        let source = "@class A {\n\t@constructor {\n\t\techo ctor\n\t}\n\t@destructor {\n\t\techo dtor\n\t}\n}\n";
        let script = parse_ok(source);
        match &script.statements[0] {
            Node::ClassDefinition(class) => {
                assert!(matches!(class.items[0], ClassItem::Constructor(_)));
                assert!(matches!(class.items[1], ClassItem::Destructor(_)));
            }
            other => panic!("expected class, got {other:?}"),
        }
    }

    #[test]
    fn test_instantiation_and_pointer() {
        let script = parse_ok("@Window main\n@Window* ptr = &@main\n");
        assert!(matches!(script.statements[0], Node::ObjectInstantiation(_)));
        match &script.statements[1] {
            Node::PointerDeclaration(p) => {
                assert_eq!(p.class_name.name, "Window");
                assert_eq!(p.name.name, "ptr");
                assert!(p.value.is_some());
            }
            other => panic!("expected pointer declaration, got {other:?}"),
        }
    }

    #[test]
    fn test_assignment_statement() {
        let script = parse_ok("@this.width = 80\n");
        match &script.statements[0] {
            Node::ObjectAssignment(a) => {
                assert_eq!(a.lvalue.ids.len(), 2);
                assert!(!a.adding);
                assert!(!a.deref);
            }
            other => panic!("expected assignment, got {other:?}"),
        }
    }

    #[test]
    fn test_append_assignment() {
        let script = parse_ok("@log.lines += \"another\"\n");
        match &script.statements[0] {
            Node::ObjectAssignment(a) => assert!(a.adding),
            other => panic!("expected assignment, got {other:?}"),
        }
    }

    #[test]
    fn test_command_chain_connectives() {
        let script = parse_ok("false && echo @(side_effect)\n");
        match &script.statements[0] {
            Node::Statement(s) => {
                assert_eq!(s.pipelines.len(), 2);
                assert_eq!(s.connectives, vec![Connective::And]);
                assert!(s.pipelines[1]
                    .iter()
                    .any(|p| matches!(p, Node::Supershell(_))));
            }
            other => panic!("expected statement, got {other:?}"),
        }
    }

    #[test]
    fn test_if_with_reference_conditions() {
        let source = "if [[ -f \"@this.path\" ]]; then\n\techo yes\nelif [[ -f \"@this.other\" ]]; then\n\techo other\nelse\n\techo no\nfi\n";
        let script = parse_ok(source);
        match &script.statements[0] {
            Node::If(node) => {
                assert_eq!(node.branches.len(), 2);
                assert!(node.else_body.is_some());
            }
            other => panic!("expected if, got {other:?}"),
        }
    }

    #[test]
    fn test_while_and_case() {
        let source = "while @flag.isSet; do\n\tcase $x in\n\t\ta) echo a ;;\n\t\t*) echo other ;;\n\tesac\ndone\n";
        let script = parse_ok(source);
        match &script.statements[0] {
            Node::WhileOrUntil(node) => {
                assert!(!node.until);
                assert_eq!(node.body.len(), 1);
                assert!(matches!(node.body[0], Node::Case(_)));
            }
            other => panic!("expected while, got {other:?}"),
        }
    }

    #[test]
    fn test_delete_and_new() {
        let script = parse_ok("@delete @obj\n@Window* w = @new Window\n");
        assert!(matches!(script.statements[0], Node::Delete(_)));
        match &script.statements[1] {
            Node::PointerDeclaration(p) => {
                let value = p.value.as_ref().unwrap();
                assert!(value.parts.iter().any(|n| matches!(n, Node::New(_))));
            }
            other => panic!("expected pointer declaration, got {other:?}"),
        }
    }

    #[test]
    fn test_dynamic_cast() {
        let script = parse_ok("@B* q = @dynamic_cast<B> @p\n");
        match &script.statements[0] {
            Node::PointerDeclaration(p) => {
                let value = p.value.as_ref().unwrap();
                match &value.parts[0] {
                    Node::DynamicCast(cast) => {
                        assert!(matches!(&cast.target, CastTarget::ClassName(c) if c.name == "B"));
                        assert!(cast
                            .operand
                            .iter()
                            .any(|n| matches!(n, Node::ObjectReference(_))));
                    }
                    other => panic!("expected dynamic cast, got {other:?}"),
                }
            }
            other => panic!("expected pointer declaration, got {other:?}"),
        }
    }

    #[test]
    fn test_include_forms() {
        let script = parse_ok("@include <Stack>\n@include_once dynamic \"lib.bpp\" as \"/usr/lib/lib.sh\"\n");
        match &script.statements[0] {
            Node::Include(inc) => {
                assert!(inc.system);
                assert!(!inc.once);
                assert_eq!(inc.path, "Stack");
            }
            other => panic!("expected include, got {other:?}"),
        }
        match &script.statements[1] {
            Node::Include(inc) => {
                assert!(inc.once);
                assert!(inc.dynamic);
                assert!(!inc.system);
                assert_eq!(inc.as_path.as_deref(), Some("/usr/lib/lib.sh"));
            }
            other => panic!("expected include, got {other:?}"),
        }
    }

    #[test]
    fn test_string_with_reference() {
        let script = parse_ok("echo \"value: @this.x\"\n");
        match &script.statements[0] {
            Node::Statement(s) => {
                let string = s.pipelines[0]
                    .iter()
                    .find_map(|n| match n {
                        Node::StringLiteral(s) => Some(s),
                        _ => None,
                    })
                    .expect("expected a string literal part");
                assert!(string.parts.iter().any(|n| matches!(n, Node::ObjectReference(_))));
            }
            other => panic!("expected statement, got {other:?}"),
        }
    }

    #[test]
    fn test_method_call_statement() {
        let script = parse_ok("@obj.method arg1 arg2\n");
        match &script.statements[0] {
            Node::Statement(s) => {
                assert!(matches!(s.pipelines[0][0], Node::ObjectReference(_)));
            }
            other => panic!("expected statement, got {other:?}"),
        }
    }

    #[test]
    fn test_stray_member_declaration_errors() {
        let (_, errors) = parse("@public x=1\n");
        assert!(!errors.is_empty());
        assert!(errors[0].message.contains("outside of a class"));
    }

    #[test]
    fn test_reparse_is_equivalent() {
        let source = "@class Foo {\n\t@public x=1\n}\n@Foo f\necho @f.x\n";
        let (first, e1) = parse(source);
        let (second, e2) = parse(source);
        assert_eq!(first, second);
        assert_eq!(e1.len(), e2.len());
    }

    #[test]
    fn test_array_index_reference() {
        let script = parse_ok("echo @obj.items[2]\n");
        match &script.statements[0] {
            Node::Statement(s) => {
                let reference = s.pipelines[0]
                    .iter()
                    .find_map(|n| match n {
                        Node::ObjectReference(r) => Some(r),
                        _ => None,
                    })
                    .unwrap();
                assert!(reference.array_index.is_some());
                assert!(!reference.length_query);
            }
            other => panic!("expected statement, got {other:?}"),
        }
    }
}

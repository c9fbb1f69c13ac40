//! Recursive descent parser.
//!
//! The parser pulls tokens from the lexer one at a time and relies on the
//! lexer's token pushback for all of its lookahead.

use std::io::BufRead;
use std::mem::replace;
use std::rc::Rc;

use tracing::debug;

use crate::ast::{BlockArg, BlockDef, Body, Call, MethodDef, Node, Params, Program};
use crate::error::{Position, Span, Syntax, SyntaxError, Tagged};
use crate::lexing::{Lexer, Token, TokenType};
use crate::stack::ensure_sufficient_stack;
use crate::stream::{CharStream, ReaderStream, TextStream};
use crate::traits::{Boxable, Taggable};
use crate::types::Key;


type ParseResult<T> = Result<T, SyntaxError>;


/// Binary operators from lowest to highest precedence. Each level is
/// left-associative.
const BINARY_LEVELS: [&[&str]; 7] = [
    &["..", "...", "==", "===", "<=>", "!=", "<", ">", "<=", ">="],
    &["|", "^"],
    &["&"],
    &["<<", ">>"],
    &["+", "-"],
    &["*", "/", "%"],
    &["**"],
];

/// Keywords that can follow an expression without being its argument.
const NON_ARG_KEYWORDS: [&str; 15] = [
    "then", "do", "end", "else", "elsif", "in", "and", "or", "if", "unless",
    "while", "until", "rescue", "ensure", "when",
];

/// Tokens that end a statement without being consumed by it.
const STATEMENT_CLOSERS: [&str; 6] = ["end", "}", "else", "elsif", ")", "when"];

/// Method names that may follow `def`.
const OPERATOR_METHODS: [&str; 22] = [
    "+", "-", "*", "/", "%", "**", "==", "!=", "<", "<=", ">", ">=", "<=>",
    "<<", ">>", "===", "!", "&", "^", "~", "-@", "+@",
];

fn is_closer(token: &Token, closers: &[&str]) -> bool {
    matches!(token.kind, TokenType::Identifier | TokenType::Separator)
        && closers.contains(&token.text.as_str())
}

fn describe(closer: &str) -> &'static str {
    match closer {
        "end" => "'end'",
        "}" => "'}'",
        ")" => "')'",
        "]" => "']'",
        "|" => "'|'",
        _ => "end of block",
    }
}

fn compound_operator(token: &Token) -> Option<&'static str> {
    if token.kind != TokenType::Operator {
        return None;
    }
    match token.text.as_str() {
        "+=" => Some("+"),
        "-=" => Some("-"),
        "*=" => Some("*"),
        "/=" => Some("/"),
        "**=" => Some("**"),
        _ => None,
    }
}

fn call(receiver: Tagged<Node>, name: &str, args: Vec<Tagged<Node>>) -> Node {
    Node::Call(Call {
        receiver: Some(receiver.to_box()),
        name: Key::new(name),
        args,
        block: None,
    })
}


/// Parser over a token stream.
pub struct Parser<S: CharStream> {
    lexer: Lexer<S>,
    file: Rc<str>,

    /// Span of the last consumed token, and of the one before it, so that
    /// pushing back a token can restore `last`.
    last: Span,
    before_last: Span,

    /// Set while parsing loop headers, where `do` opens the loop body rather
    /// than a block.
    no_do: bool,
}

impl<S: CharStream> Parser<S> {
    pub fn new(lexer: Lexer<S>, file: &str) -> Parser<S> {
        let zero = Span::from(Position::zero());
        Parser {
            lexer,
            file: Rc::from(file),
            last: zero,
            before_last: zero,
            no_do: false,
        }
    }

    /// Source text read by the lexer so far.
    pub fn text(&self) -> String {
        self.lexer.text()
    }

    // Token handling
    // --------------------------------------------------------------------------------------------

    fn error(&self, position: Position, reason: Syntax) -> SyntaxError {
        let err = SyntaxError::new(position, reason);
        match self.lexer.line_text(position.line()) {
            Some(text) => err.with_line_text(text),
            None => err,
        }
    }

    fn unexpected(&self, token: Option<Token>) -> SyntaxError {
        match token {
            None => self.error(self.lexer.position(), Syntax::UnexpectedEof),
            Some(token) if token.kind == TokenType::EndOfLine => {
                self.error(token.span.start(), Syntax::UnexpectedToken("end-of-line".to_owned()))
            }
            Some(token) => {
                let text = token.to_string();
                self.error(token.span.start(), Syntax::UnexpectedToken(text))
            }
        }
    }

    fn expected(&self, token: Option<Token>, what: &'static str) -> SyntaxError {
        match token {
            None => self.error(self.lexer.position(), Syntax::Expected(what)),
            Some(token) => self.error(token.span.start(), Syntax::Expected(what)),
        }
    }

    fn next(&mut self) -> ParseResult<Option<Token>> {
        let token = self.lexer.next_token()?;
        if let Some(token) = &token {
            self.before_last = self.last;
            self.last = token.span;
        }
        Ok(token)
    }

    fn next_required(&mut self) -> ParseResult<Token> {
        match self.next()? {
            Some(token) => Ok(token),
            None => Err(self.unexpected(None)),
        }
    }

    fn push(&mut self, token: Token) {
        self.last = self.before_last;
        self.lexer.push_token(token);
    }

    fn peek(&mut self) -> ParseResult<Option<Token>> {
        let token = self.next()?;
        if let Some(token) = &token {
            self.push(token.clone());
        }
        Ok(token)
    }

    /// Consume the next token if it satisfies the predicate.
    fn accept(&mut self, predicate: impl Fn(&Token) -> bool) -> ParseResult<bool> {
        match self.next()? {
            Some(token) if predicate(&token) => Ok(true),
            Some(token) => {
                self.push(token);
                Ok(false)
            }
            None => Ok(false),
        }
    }

    fn accept_separator(&mut self, text: &str) -> ParseResult<bool> {
        self.accept(|t| t.is_separator(text))
    }

    fn accept_operator(&mut self, text: &str) -> ParseResult<bool> {
        self.accept(|t| t.is_operator(text))
    }

    fn accept_keyword(&mut self, text: &str) -> ParseResult<bool> {
        self.accept(|t| t.is_keyword(text))
    }

    fn expect(&mut self, predicate: impl Fn(&Token) -> bool, what: &'static str) -> ParseResult<Token> {
        match self.next()? {
            Some(token) if predicate(&token) => Ok(token),
            other => Err(self.expected(other, what)),
        }
    }

    /// Skip newlines and semicolons.
    fn skip_terminators(&mut self) -> ParseResult<()> {
        while self.accept(Token::is_terminator)? {}
        Ok(())
    }

    /// Skip newlines only, e.g. inside brackets.
    fn skip_newlines(&mut self) -> ParseResult<()> {
        while self.accept(|t| t.kind == TokenType::EndOfLine)? {}
        Ok(())
    }

    /// Whether a token following a method name begins its argument list.
    fn starts_args(&self, token: &Token) -> bool {
        match token.kind {
            TokenType::EndOfLine => false,
            TokenType::Operator => matches!(token.text.as_str(), "->" | "!"),
            TokenType::Separator => token.text == "[" && token.spaced,
            TokenType::Identifier => !NON_ARG_KEYWORDS.contains(&token.text.as_str()),
            _ => true,
        }
    }

    fn span_from(&self, start: Span) -> Span {
        Span::from(start..self.last)
    }

    // Commands and bodies
    // --------------------------------------------------------------------------------------------

    /// Parse a whole program.
    pub fn parse(&mut self) -> ParseResult<Program> {
        let mut body = vec![];
        while let Some(node) = self.parse_command()? {
            body.push(node);
        }
        Ok(Program {
            body,
            file: self.file.clone(),
        })
    }

    /// Parse one statement and its terminator, or return `None` at the end of
    /// the input.
    pub fn parse_command(&mut self) -> ParseResult<Option<Tagged<Node>>> {
        self.skip_terminators()?;
        if self.peek()?.is_none() {
            return Ok(None);
        }
        let node = self.parse_statement()?;
        self.parse_end_of_command()?;
        Ok(Some(node))
    }

    fn parse_end_of_command(&mut self) -> ParseResult<()> {
        match self.next()? {
            None => Ok(()),
            Some(token) if token.is_terminator() => Ok(()),
            Some(token) if is_closer(&token, &STATEMENT_CLOSERS) => {
                self.push(token);
                Ok(())
            }
            Some(token) => Err(self.unexpected(Some(token))),
        }
    }

    /// Parse statements until one of the closing keywords, which is consumed
    /// and returned.
    fn parse_body(&mut self, closers: &[&str]) -> ParseResult<(Body, Token)> {
        let mut body = vec![];
        loop {
            self.skip_terminators()?;
            let token = match self.next()? {
                Some(token) => token,
                None => return Err(self.expected(None, describe(closers[0]))),
            };
            if is_closer(&token, closers) {
                return Ok((body, token));
            }
            self.push(token);
            body.push(self.parse_statement()?);
            self.parse_end_of_command()?;
        }
    }

    /// An expression with optional trailing `if`/`unless`/`while`/`until`
    /// modifiers.
    fn parse_statement(&mut self) -> ParseResult<Tagged<Node>> {
        let mut node = self.parse_expression_statement()?;
        loop {
            let token = match self.next()? {
                Some(token) => token,
                None => break,
            };
            let is_modifier = token.kind == TokenType::Identifier
                && matches!(token.text.as_str(), "if" | "unless" | "while" | "until");
            if !is_modifier {
                self.push(token);
                break;
            }
            let keyword = token.text;
            let condition = self.parse_expression_statement()?;
            let span = Span::from(node.span()..condition.span());
            let condition = condition.to_box();
            node = match keyword.as_str() {
                "if" => Node::If { condition, then_branch: vec![node], else_branch: vec![] },
                "unless" => Node::If { condition, then_branch: vec![], else_branch: vec![node] },
                "while" => Node::While { condition, body: vec![node] },
                _ => Node::Until { condition, body: vec![node] },
            }
            .tag(span);
        }
        Ok(node)
    }

    /// The `and`/`or` level, below assignment.
    fn parse_expression_statement(&mut self) -> ParseResult<Tagged<Node>> {
        let mut left = self.parse_not()?;
        loop {
            let token = match self.next()? {
                Some(token) => token,
                None => break,
            };
            let is_and = token.is_keyword("and");
            if !is_and && !token.is_keyword("or") {
                self.push(token);
                break;
            }
            self.skip_newlines()?;
            let right = self.parse_not()?;
            let span = Span::from(left.span()..right.span());
            left = if is_and {
                Node::And(left.to_box(), right.to_box())
            } else {
                Node::Or(left.to_box(), right.to_box())
            }
            .tag(span);
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> ParseResult<Tagged<Node>> {
        let token = self.next_required()?;
        if token.is_keyword("not") {
            let operand = self.parse_not()?;
            let span = Span::from(token.span..operand.span());
            return Ok(call(operand, "!", vec![]).tag(span));
        }
        self.push(token);
        self.parse_expression()
    }

    // Expressions
    // --------------------------------------------------------------------------------------------

    /// Parse an expression, including assignments.
    pub fn parse_expression(&mut self) -> ParseResult<Tagged<Node>> {
        ensure_sufficient_stack(|| self.parse_assignment())
    }

    fn parse_assignment(&mut self) -> ParseResult<Tagged<Node>> {
        let left = self.parse_no_assign()?;
        let token = match self.next()? {
            Some(token) => token,
            None => return Ok(left),
        };

        let operator = compound_operator(&token);
        if !token.is_operator("=") && operator.is_none() {
            self.push(token);
            return Ok(left);
        }

        if !left.is_assignable() {
            return Err(self.error(token.span.start(), Syntax::InvalidAssignment));
        }

        self.skip_newlines()?;
        let value = self.parse_expression()?;
        let span = Span::from(left.span()..value.span());

        let value = match operator {
            None => value,
            Some(op) => call(left.clone(), op, vec![value]).tag(span),
        };

        Ok(Node::Assign {
            target: left.to_box(),
            value: value.to_box(),
        }
        .tag(span))
    }

    fn parse_no_assign(&mut self) -> ParseResult<Tagged<Node>> {
        let mut left = self.parse_and()?;
        while self.accept_operator("||")? {
            self.skip_newlines()?;
            let right = self.parse_and()?;
            let span = Span::from(left.span()..right.span());
            left = Node::Or(left.to_box(), right.to_box()).tag(span);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> ParseResult<Tagged<Node>> {
        let mut left = self.parse_binary(0)?;
        while self.accept_operator("&&")? {
            self.skip_newlines()?;
            let right = self.parse_binary(0)?;
            let span = Span::from(left.span()..right.span());
            left = Node::And(left.to_box(), right.to_box()).tag(span);
        }
        Ok(left)
    }

    fn parse_binary(&mut self, level: usize) -> ParseResult<Tagged<Node>> {
        if level >= BINARY_LEVELS.len() {
            return self.parse_unary();
        }

        let mut left = self.parse_binary(level + 1)?;
        loop {
            let token = match self.next()? {
                Some(token) => token,
                None => break,
            };
            let is_operator = matches!(token.kind, TokenType::Operator | TokenType::Separator)
                && BINARY_LEVELS[level].contains(&token.text.as_str());
            if !is_operator {
                self.push(token);
                break;
            }

            self.skip_newlines()?;
            let right = self.parse_binary(level + 1)?;
            let span = Span::from(left.span()..right.span());
            left = match token.text.as_str() {
                ".." | "..." => Node::Range {
                    low: left.to_box(),
                    high: right.to_box(),
                    exclusive: token.text == "...",
                },
                op => call(left, op, vec![right]),
            }
            .tag(span);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> ParseResult<Tagged<Node>> {
        let token = self.next_required()?;
        if token.kind != TokenType::Operator {
            self.push(token);
            return self.parse_postfix();
        }

        let op = token.text.clone();
        match op.as_str() {
            "-" => {
                let next = self.next_required()?;
                if !next.spaced && matches!(next.kind, TokenType::Integer | TokenType::Float) {
                    let literal = self.parse_number(&next, true)?.tag(Span::from(token.span..next.span));
                    return self.parse_postfix_chain(literal);
                }
                self.push(next);
                let operand = self.parse_unary()?;
                let span = Span::from(token.span..operand.span());
                Ok(call(operand, "-@", vec![]).tag(span))
            }
            "+" => self.parse_unary(),
            "!" | "~" => {
                let operand = self.parse_unary()?;
                let span = Span::from(token.span..operand.span());
                Ok(call(operand, &op, vec![]).tag(span))
            }
            _ => {
                self.push(token);
                self.parse_postfix()
            }
        }
    }

    fn parse_postfix(&mut self) -> ParseResult<Tagged<Node>> {
        let term = self.parse_primary()?;
        self.parse_postfix_chain(term)
    }

    /// Attach `.name`, `::Name` and `[index]` suffixes to a term.
    fn parse_postfix_chain(&mut self, mut term: Tagged<Node>) -> ParseResult<Tagged<Node>> {
        loop {
            let token = match self.next()? {
                Some(token) => token,
                None => break,
            };

            if token.is_separator(".") || token.is_separator("::") {
                self.skip_newlines()?;
                let name = self.next_required()?;
                if !matches!(name.kind, TokenType::Identifier | TokenType::Constant | TokenType::Operator) {
                    return Err(self.expected(Some(name), "method name"));
                }

                if token.is_separator("::") && name.kind == TokenType::Constant {
                    let is_call = matches!(self.peek()?, Some(t) if t.is_separator("(") && !t.spaced);
                    if !is_call {
                        let span = Span::from(term.span()..name.span);
                        term = Node::ScopedConstant {
                            scope: term.to_box(),
                            name: Key::new(&name.text),
                        }
                        .tag(span);
                        continue;
                    }
                }

                term = self.parse_call_rest(Some(term), &name.text, name.span)?;
                continue;
            }

            if token.is_separator("[") && !token.spaced {
                let args = self.parse_list_until("]")?;
                let span = self.span_from(term.span());
                term = Node::Index {
                    receiver: term.to_box(),
                    args,
                }
                .tag(span);
                continue;
            }

            self.push(token);
            break;
        }
        Ok(term)
    }

    /// Parse the arguments and block following a method name.
    fn parse_call_rest(&mut self, receiver: Option<Tagged<Node>>, name: &str, name_span: Span) -> ParseResult<Tagged<Node>> {
        let start = receiver.as_ref().map_or(name_span, |r| r.span());
        let mut args = vec![];
        let mut block = None;

        match self.next()? {
            Some(token) if token.is_separator("(") => {
                (args, block) = self.parse_paren_args()?;
            }
            Some(token) => {
                let starts = self.starts_args(&token);
                self.push(token);
                if starts {
                    (args, block) = self.parse_command_args()?;
                }
            }
            None => {}
        }

        if block.is_none() {
            block = self.parse_block()?.map(BlockArg::Literal);
        }

        let span = self.span_from(start);
        Ok(Node::Call(Call {
            receiver: receiver.map(|r| r.to_box()),
            name: Key::new(name),
            args,
            block,
        })
        .tag(span))
    }

    /// Arguments after an opening parenthesis, up to and including the
    /// closing one.
    fn parse_paren_args(&mut self) -> ParseResult<(Vec<Tagged<Node>>, Option<BlockArg>)> {
        let saved = replace(&mut self.no_do, false);
        self.skip_newlines()?;
        let result = if self.accept_separator(")")? {
            (vec![], None)
        } else {
            let result = self.parse_command_args()?;
            self.skip_newlines()?;
            self.expect(|t| t.is_separator(")"), "')'")?;
            result
        };
        self.no_do = saved;
        Ok(result)
    }

    /// Comma-separated arguments without parentheses. Trailing `key => value`
    /// pairs are collected into a single hash argument, and a final `&expr`
    /// becomes the block.
    fn parse_command_args(&mut self) -> ParseResult<(Vec<Tagged<Node>>, Option<BlockArg>)> {
        let mut args = vec![];
        let mut pairs: Vec<(Tagged<Node>, Tagged<Node>)> = vec![];
        let mut block = None;

        loop {
            if let Some(amp) = self.next()? {
                if amp.is_operator("&") {
                    let expr = self.parse_unary()?;
                    block = Some(BlockArg::Expr(expr.to_box()));
                    break;
                }
                self.push(amp);
            }

            let arg = self.parse_not()?;
            if self.accept_operator("=>")? {
                self.skip_newlines()?;
                let value = self.parse_not()?;
                pairs.push((arg, value));
            } else {
                args.push(arg);
            }

            if !self.accept_separator(",")? {
                break;
            }
            self.skip_newlines()?;
        }

        if let (Some(first), Some(last)) = (pairs.first(), pairs.last()) {
            let span = Span::from(first.0.span()..last.1.span());
            args.push(Node::Hash(pairs).tag(span));
        }

        Ok((args, block))
    }

    /// Comma-separated expressions up to and including a closing separator,
    /// allowing newlines and a trailing comma.
    fn parse_list_until(&mut self, closer: &'static str) -> ParseResult<Vec<Tagged<Node>>> {
        let saved = replace(&mut self.no_do, false);
        let mut items = vec![];
        self.skip_newlines()?;
        if !self.accept_separator(closer)? {
            loop {
                items.push(self.parse_not()?);
                self.skip_newlines()?;
                let token = self.next()?;
                match token {
                    Some(token) if token.is_separator(",") => {
                        self.skip_newlines()?;
                        if self.accept_separator(closer)? {
                            break;
                        }
                    }
                    Some(token) if token.is_separator(closer) => break,
                    other => return Err(self.expected(other, describe(closer))),
                }
            }
        }
        self.no_do = saved;
        Ok(items)
    }

    // Blocks and parameters
    // --------------------------------------------------------------------------------------------

    /// Consume a block opener, returning the matching closer.
    fn block_opener(&mut self) -> ParseResult<Option<&'static str>> {
        let token = match self.next()? {
            Some(token) => token,
            None => return Ok(None),
        };
        if token.is_separator("{") {
            Ok(Some("}"))
        } else if token.is_keyword("do") && !self.no_do {
            Ok(Some("end"))
        } else {
            self.push(token);
            Ok(None)
        }
    }

    fn parse_block(&mut self) -> ParseResult<Option<Rc<BlockDef>>> {
        let closer = match self.block_opener()? {
            Some(closer) => closer,
            None => return Ok(None),
        };

        let saved = replace(&mut self.no_do, false);
        let params = self.parse_block_params()?;
        let (body, _) = self.parse_body(&[closer])?;
        self.no_do = saved;

        Ok(Some(Rc::new(BlockDef {
            params,
            body,
            file: self.file.clone(),
        })))
    }

    fn parse_block_params(&mut self) -> ParseResult<Params> {
        let token = match self.next()? {
            Some(token) => token,
            None => return Ok(Params::default()),
        };
        if token.is_operator("||") {
            Ok(Params::default())
        } else if token.is_separator("|") {
            self.parse_param_list("|")
        } else {
            self.push(token);
            Ok(Params::default())
        }
    }

    /// Parse a single parameter into `params`.
    fn parse_param(&mut self, params: &mut Params) -> ParseResult<()> {
        let token = self.next_required()?;
        if token.is_operator("&") {
            let name = self.expect(|t| t.kind == TokenType::Identifier, "block parameter name")?;
            params.block = Some(Key::new(&name.text));
        } else if token.kind == TokenType::Identifier {
            params.names.push(Key::new(&token.text));
        } else {
            return Err(self.expected(Some(token), "parameter name"));
        }
        Ok(())
    }

    /// Parameters up to and including a closing separator.
    fn parse_param_list(&mut self, closer: &'static str) -> ParseResult<Params> {
        let mut params = Params::default();
        self.skip_newlines()?;
        if self.accept_separator(closer)? {
            return Ok(params);
        }
        loop {
            self.parse_param(&mut params)?;
            self.skip_newlines()?;
            match self.next()? {
                Some(token) if token.is_separator(",") => self.skip_newlines()?,
                Some(token) if token.is_separator(closer) => break,
                other => return Err(self.expected(other, describe(closer))),
            }
        }
        Ok(params)
    }

    fn parse_def_params(&mut self) -> ParseResult<Params> {
        let token = match self.next()? {
            Some(token) => token,
            None => return Ok(Params::default()),
        };
        if token.is_separator("(") {
            return self.parse_param_list(")");
        }
        let bare = token.kind == TokenType::Identifier || token.is_operator("&");
        self.push(token);

        let mut params = Params::default();
        if bare {
            loop {
                self.parse_param(&mut params)?;
                if !self.accept_separator(",")? {
                    break;
                }
            }
        }
        Ok(params)
    }

    // Primary expressions
    // --------------------------------------------------------------------------------------------

    fn parse_number(&self, token: &Token, negate: bool) -> ParseResult<Node> {
        let text = if negate { format!("-{}", token.text) } else { token.text.clone() };
        let invalid = || self.error(token.span.start(), Syntax::InvalidNumber(text.clone()));
        if token.kind == TokenType::Float {
            text.parse::<f64>().map(Node::Float).map_err(|_| invalid())
        } else {
            text.parse::<i64>().map(Node::Integer).map_err(|_| invalid())
        }
    }

    fn parse_primary(&mut self) -> ParseResult<Tagged<Node>> {
        let token = self.next_required()?;
        let span = token.span;

        match token.kind {
            TokenType::Integer | TokenType::Float => Ok(self.parse_number(&token, false)?.tag(span)),
            TokenType::String => Ok(Node::Str(token.text).tag(span)),
            TokenType::Symbol => Ok(Node::Symbol(Key::new(&token.text)).tag(span)),
            TokenType::InstanceVar => Ok(Node::InstanceVar(Key::new(&token.text)).tag(span)),
            TokenType::ClassVar => Ok(Node::ClassVar(Key::new(&token.text)).tag(span)),
            TokenType::GlobalVar => Ok(Node::GlobalVar(Key::new(&token.text)).tag(span)),

            TokenType::Constant => {
                let is_call = matches!(self.peek()?, Some(t) if t.is_separator("(") && !t.spaced);
                if is_call {
                    self.parse_call_rest(None, &token.text, span)
                } else {
                    Ok(Node::Constant(Key::new(&token.text)).tag(span))
                }
            }

            TokenType::Identifier => self.parse_identifier(token),

            TokenType::Separator => match token.text.as_str() {
                "(" => self.parse_parenthesized(span),
                "[" => {
                    let items = self.parse_list_until("]")?;
                    Ok(Node::Array(items).tag(self.span_from(span)))
                }
                "{" => self.parse_hash(span),
                "::" => {
                    let name = self.expect(|t| t.kind == TokenType::Constant, "constant name")?;
                    Ok(Node::Constant(Key::new(&name.text)).tag(Span::from(span..name.span)))
                }
                _ => Err(self.unexpected(Some(token.clone()))),
            },

            TokenType::Operator if token.text == "->" => self.parse_lambda(span),

            _ => Err(self.unexpected(Some(token))),
        }
    }

    fn parse_identifier(&mut self, token: Token) -> ParseResult<Tagged<Node>> {
        let span = token.span;
        match token.text.as_str() {
            "nil" => Ok(Node::Nil.tag(span)),
            "true" => Ok(Node::True.tag(span)),
            "false" => Ok(Node::False.tag(span)),
            "self" => Ok(Node::SelfRef.tag(span)),

            "if" => self.parse_if(span, false),
            "unless" => self.parse_if(span, true),
            "while" => self.parse_loop(span, false),
            "until" => self.parse_loop(span, true),
            "for" => self.parse_for(span),
            "def" => self.parse_def(span),
            "class" => self.parse_class(span),
            "module" => self.parse_module(span),

            "begin" => {
                let (body, _) = self.parse_body(&["end"])?;
                Ok(Node::Sequence(body).tag(self.span_from(span)))
            }

            "not" => {
                let operand = self.parse_expression()?;
                let span = Span::from(span..operand.span());
                Ok(call(operand, "!", vec![]).tag(span))
            }

            "yield" => {
                let args = self.parse_optional_args()?;
                Ok(Node::Yield(args).tag(self.span_from(span)))
            }
            "super" => {
                let args = self.parse_optional_args()?;
                Ok(Node::Super(args).tag(self.span_from(span)))
            }
            "return" => {
                let value = self.parse_optional_value()?;
                Ok(Node::Return(value).tag(self.span_from(span)))
            }
            "next" => {
                let value = self.parse_optional_value()?;
                Ok(Node::Next(value).tag(self.span_from(span)))
            }
            "break" => Ok(Node::Break.tag(span)),
            "redo" => Ok(Node::Redo.tag(span)),
            "retry" => Ok(Node::Retry.tag(span)),

            "then" | "do" | "end" | "else" | "elsif" | "in" | "and" | "or" | "when" | "rescue" | "ensure" => {
                Err(self.unexpected(Some(token.clone())))
            }

            name => {
                let is_call = match self.peek()? {
                    Some(next) if next.is_separator("(") || next.is_separator("{") => true,
                    Some(next) if next.is_keyword("do") => !self.no_do,
                    Some(next) => self.starts_args(&next),
                    None => false,
                };
                if is_call {
                    self.parse_call_rest(None, name, span)
                } else {
                    Ok(Node::LocalVar(Key::new(name)).tag(span))
                }
            }
        }
    }

    /// Arguments of `yield` and `super`, with or without parentheses.
    fn parse_optional_args(&mut self) -> ParseResult<Vec<Tagged<Node>>> {
        let token = match self.next()? {
            Some(token) => token,
            None => return Ok(vec![]),
        };
        if token.is_separator("(") {
            return Ok(self.parse_paren_args()?.0);
        }
        let starts = self.starts_args(&token);
        self.push(token);
        if starts {
            Ok(self.parse_command_args()?.0)
        } else {
            Ok(vec![])
        }
    }

    fn parse_optional_value(&mut self) -> ParseResult<Option<Box<Tagged<Node>>>> {
        let starts = match self.peek()? {
            Some(token) => self.starts_args(&token) || token.is_separator("(") || token.is_separator("["),
            None => false,
        };
        if starts {
            Ok(Some(self.parse_expression()?.to_box()))
        } else {
            Ok(None)
        }
    }

    fn parse_parenthesized(&mut self, start: Span) -> ParseResult<Tagged<Node>> {
        let saved = replace(&mut self.no_do, false);
        self.skip_terminators()?;
        if self.accept_separator(")")? {
            self.no_do = saved;
            return Ok(Node::Nil.tag(self.span_from(start)));
        }

        let mut body = vec![];
        loop {
            body.push(self.parse_statement()?);
            let token = self.next()?;
            match token {
                Some(token) if token.is_separator(")") => break,
                Some(token) if token.is_terminator() => {
                    self.skip_terminators()?;
                    if self.accept_separator(")")? {
                        break;
                    }
                }
                other => return Err(self.expected(other, "')'")),
            }
        }
        self.no_do = saved;

        if body.len() == 1 {
            Ok(body.remove(0))
        } else {
            Ok(Node::Sequence(body).tag(self.span_from(start)))
        }
    }

    fn parse_hash(&mut self, start: Span) -> ParseResult<Tagged<Node>> {
        let saved = replace(&mut self.no_do, false);
        let mut pairs = vec![];
        self.skip_newlines()?;
        if !self.accept_separator("}")? {
            loop {
                let key = self.parse_not()?;
                self.skip_newlines()?;
                self.expect(|t| t.is_operator("=>"), "'=>'")?;
                self.skip_newlines()?;
                let value = self.parse_not()?;
                pairs.push((key, value));
                self.skip_newlines()?;
                match self.next()? {
                    Some(token) if token.is_separator(",") => {
                        self.skip_newlines()?;
                        if self.accept_separator("}")? {
                            break;
                        }
                    }
                    Some(token) if token.is_separator("}") => break,
                    other => return Err(self.expected(other, "'}'")),
                }
            }
        }
        self.no_do = saved;
        Ok(Node::Hash(pairs).tag(self.span_from(start)))
    }

    fn parse_lambda(&mut self, start: Span) -> ParseResult<Tagged<Node>> {
        let params = match self.next()? {
            Some(token) if token.is_separator("(") => self.parse_param_list(")")?,
            Some(token) => {
                let bare = token.kind == TokenType::Identifier;
                self.push(token);
                let mut params = Params::default();
                if bare {
                    loop {
                        self.parse_param(&mut params)?;
                        if !self.accept_separator(",")? {
                            break;
                        }
                    }
                }
                params
            }
            None => Params::default(),
        };

        let closer = match self.block_opener()? {
            Some(closer) => closer,
            None => {
                let token = self.next()?;
                return Err(self.expected(token, "'{' or 'do'"));
            }
        };
        let saved = replace(&mut self.no_do, false);
        let (body, _) = self.parse_body(&[closer])?;
        self.no_do = saved;

        let block = BlockDef {
            params,
            body,
            file: self.file.clone(),
        };
        Ok(Node::Lambda(Rc::new(block)).tag(self.span_from(start)))
    }

    // Control structures
    // --------------------------------------------------------------------------------------------

    /// Optional `then` after a condition.
    fn parse_then(&mut self) -> ParseResult<()> {
        self.skip_terminators()?;
        self.accept_keyword("then")?;
        Ok(())
    }

    fn parse_if(&mut self, start: Span, negate: bool) -> ParseResult<Tagged<Node>> {
        let condition = self.parse_expression_statement()?;
        self.parse_then()?;

        let closers: &[&str] = if negate { &["else", "end"] } else { &["elsif", "else", "end"] };
        let (then_branch, closer) = self.parse_body(closers)?;

        let else_branch = match closer.text.as_str() {
            "elsif" => vec![self.parse_if(closer.span, false)?],
            "else" => self.parse_body(&["end"])?.0,
            _ => vec![],
        };

        let (then_branch, else_branch) = if negate {
            (else_branch, then_branch)
        } else {
            (then_branch, else_branch)
        };

        Ok(Node::If {
            condition: condition.to_box(),
            then_branch,
            else_branch,
        }
        .tag(self.span_from(start)))
    }

    /// Parse a loop header with `do` reserved for the loop itself.
    fn parse_loop_header(&mut self) -> ParseResult<Tagged<Node>> {
        let saved = replace(&mut self.no_do, true);
        let condition = self.parse_expression_statement()?;
        self.no_do = saved;
        self.skip_terminators()?;
        self.accept_keyword("do")?;
        Ok(condition)
    }

    fn parse_loop(&mut self, start: Span, until: bool) -> ParseResult<Tagged<Node>> {
        let condition = self.parse_loop_header()?.to_box();
        let (body, _) = self.parse_body(&["end"])?;
        let node = if until {
            Node::Until { condition, body }
        } else {
            Node::While { condition, body }
        };
        Ok(node.tag(self.span_from(start)))
    }

    fn parse_for(&mut self, start: Span) -> ParseResult<Tagged<Node>> {
        let var = self.expect(|t| t.kind == TokenType::Identifier, "loop variable")?;
        self.expect(|t| t.is_keyword("in"), "'in'")?;
        let iterable = self.parse_loop_header()?;
        let (body, _) = self.parse_body(&["end"])?;

        let block = BlockDef {
            params: Params {
                names: vec![Key::new(&var.text)],
                block: None,
            },
            body,
            file: self.file.clone(),
        };
        Ok(Node::For {
            iterable: iterable.to_box(),
            body: Rc::new(block),
        }
        .tag(self.span_from(start)))
    }

    fn parse_method_name(&mut self, token: Token) -> ParseResult<Key> {
        match token.kind {
            TokenType::Identifier | TokenType::Constant => {
                let mut name = token.text.clone();
                if let Some(next) = self.next()? {
                    if next.is_operator("=") && !next.spaced {
                        name.push('=');
                    } else {
                        self.push(next);
                    }
                }
                Ok(Key::new(name))
            }
            TokenType::Operator if OPERATOR_METHODS.contains(&token.text.as_str()) => Ok(Key::new(&token.text)),
            TokenType::Separator if token.text == "|" => Ok(Key::new("|")),
            TokenType::Separator if token.text == "[" => {
                self.expect(|t| t.is_separator("]"), "']'")?;
                if self.accept(|t| t.is_operator("=") && !t.spaced)? {
                    Ok(Key::new("[]="))
                } else {
                    Ok(Key::new("[]"))
                }
            }
            _ => Err(self.expected(Some(token), "method name")),
        }
    }

    fn parse_def(&mut self, start: Span) -> ParseResult<Tagged<Node>> {
        let first = self.next_required()?;

        let mut target = None;
        let mut name_token = first.clone();
        if matches!(first.kind, TokenType::Identifier | TokenType::Constant) {
            match self.next()? {
                Some(dot) if dot.is_separator(".") && !dot.spaced => {
                    let node = match first.kind {
                        TokenType::Constant => Node::Constant(Key::new(&first.text)),
                        _ if first.text == "self" => Node::SelfRef,
                        _ => Node::LocalVar(Key::new(&first.text)),
                    };
                    target = Some(node.tag(first.span).to_box());
                    name_token = self.next_required()?;
                }
                Some(other) => self.push(other),
                None => {}
            }
        }

        let name = self.parse_method_name(name_token)?;
        let params = self.parse_def_params()?;
        let (body, _) = self.parse_body(&["end"])?;

        let def = MethodDef {
            name,
            params,
            body,
            file: self.file.clone(),
        };
        Ok(Node::Def {
            target,
            def: Rc::new(def),
        }
        .tag(self.span_from(start)))
    }

    /// `Name` or `Outer::Inner::Name`.
    fn parse_class_path(&mut self) -> ParseResult<Tagged<Node>> {
        let first = self.expect(|t| t.kind == TokenType::Constant, "class or module name")?;
        let mut path = Node::Constant(Key::new(&first.text)).tag(first.span);
        while self.accept(|t| t.is_separator("::") && !t.spaced)? {
            let name = self.expect(|t| t.kind == TokenType::Constant, "class or module name")?;
            let span = Span::from(path.span()..name.span);
            path = Node::ScopedConstant {
                scope: path.to_box(),
                name: Key::new(&name.text),
            }
            .tag(span);
        }
        Ok(path)
    }

    fn parse_class(&mut self, start: Span) -> ParseResult<Tagged<Node>> {
        let path = self.parse_class_path()?;
        let superclass = if self.accept_operator("<")? {
            Some(self.parse_no_assign()?.to_box())
        } else {
            None
        };
        let (body, _) = self.parse_body(&["end"])?;
        Ok(Node::Class {
            path: path.to_box(),
            superclass,
            body,
        }
        .tag(self.span_from(start)))
    }

    fn parse_module(&mut self, start: Span) -> ParseResult<Tagged<Node>> {
        let path = self.parse_class_path()?;
        let (body, _) = self.parse_body(&["end"])?;
        Ok(Node::Module {
            path: path.to_box(),
            body,
        }
        .tag(self.span_from(start)))
    }
}


/// Parse a complete program from a string. The file label is used in
/// diagnostics only.
pub fn parse(code: &str, file: &str) -> Result<Program, SyntaxError> {
    let mut parser = Parser::new(Lexer::new(TextStream::new(code)), file);
    let program = parser.parse()?;
    debug!(file, statements = program.body.len(), "parsed program");
    Ok(program)
}


/// Parse a complete program, reading lines from `reader` as the lexer needs
/// them.
pub fn parse_reader<R: BufRead>(reader: R, file: &str) -> Result<Program, SyntaxError> {
    let mut parser = Parser::new(Lexer::new(ReaderStream::new(reader)), file);
    let program = parser.parse()?;
    debug!(file, statements = program.body.len(), "parsed program from reader");
    Ok(program)
}

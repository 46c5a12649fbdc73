use std::rc::Rc;

use crate::ast::{ClassDecl, Expr, ExprId, FunctionDecl, LiteralValue, Stmt};
use crate::builtins::LOOP_LEN;
use crate::error::StaticError;
use crate::token::{Literal, Token, TokenKind};

const MAX_ARGUMENTS: usize = 255;

type ParseResult<T> = Result<T, StaticError>;

/// Parser output. A `None` statement failed to parse; its error is already
/// in `errors` and later phases must skip it.
#[derive(Debug, Default)]
pub struct Parsed {
    pub statements: Vec<Option<Stmt>>,
    pub errors: Vec<StaticError>,
    /// First expression id not handed out by this parse.
    pub next_id: u32,
}

impl Parsed {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Statements that parsed, for when the caller already checked errors.
    pub fn into_statements(self) -> Vec<Stmt> {
        self.statements.into_iter().flatten().collect()
    }
}

pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
    errors: Vec<StaticError>,
    next_id: u32,
    hidden_count: usize,
    /// Blocks currently open.
    block_depth: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self::starting_at(tokens, 0)
    }

    /// Starts expression ids at `first_id` so several parses in one session
    /// never share an id.
    pub fn starting_at(mut tokens: Vec<Token>, first_id: u32) -> Self {
        if tokens.last().map(Token::kind) != Some(TokenKind::EOF) {
            let line = tokens.last().map_or(1, |token| token.line);
            tokens.push(Token::new(TokenKind::EOF, "", line));
        }
        Self {
            tokens,
            current: 0,
            errors: Vec::new(),
            next_id: first_id,
            hidden_count: 0,
            block_depth: 0,
        }
    }

    pub fn parse(mut self) -> Parsed {
        let mut statements = Vec::new();
        while !self.is_at_end() {
            if self.matches(TokenKind::Newline) {
                continue;
            }
            statements.push(self.declaration());
        }
        tracing::debug!(
            statements = statements.len(),
            errors = self.errors.len(),
            "parsed program"
        );
        Parsed {
            statements,
            errors: self.errors,
            next_id: self.next_id,
        }
    }

    fn declaration(&mut self) -> Option<Stmt> {
        let result = if self.matches(TokenKind::Class) {
            self.class_declaration()
        } else if self.matches(TokenKind::Def) {
            self.function(false).map(Stmt::Function)
        } else if self.matches(TokenKind::Async) {
            self.consume(TokenKind::Def, "Expect 'def' after 'async'.")
                .and_then(|_| self.function(true))
                .map(Stmt::Function)
        } else {
            self.statement()
        };

        match result {
            Ok(statement) => Some(statement),
            Err(error) => {
                self.errors.push(error);
                self.synchronize();
                None
            }
        }
    }

    fn class_declaration(&mut self) -> ParseResult<Stmt> {
        let name = self.consume(TokenKind::Identifier, "Expect class name.")?;

        let superclass = if self.matches(TokenKind::LeftParen) {
            let superclass = self.consume(TokenKind::Identifier, "Expect superclass name.")?;
            self.consume(TokenKind::RightParen, "Expect ')' after superclass name.")?;
            self.consume(TokenKind::Colon, "Expect ':' after superclass name.")?;
            Some(Expr::Variable {
                id: self.next_id(),
                name: superclass,
            })
        } else {
            self.consume(TokenKind::Colon, "Expect ':' after class name.")?;
            None
        };

        // Only method declarations survive in a class body.
        let methods = self
            .block()?
            .into_iter()
            .filter_map(|statement| match statement {
                Stmt::Function(method) => Some(method),
                _ => None,
            })
            .collect();

        Ok(Stmt::Class(ClassDecl {
            name,
            superclass,
            methods,
        }))
    }

    fn function(&mut self, is_async: bool) -> ParseResult<Rc<FunctionDecl>> {
        let name = self.consume(TokenKind::Identifier, "Expect function name.")?;
        self.consume(TokenKind::LeftParen, "Expect '(' after function name.")?;
        let mut params = Vec::new();
        if !self.check(TokenKind::RightParen) {
            loop {
                if params.len() >= MAX_ARGUMENTS {
                    let token = self.peek().clone();
                    self.report(&token, "Can't have more than 255 parameters.");
                }
                params.push(self.consume(TokenKind::Identifier, "Expect parameter name.")?);
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightParen, "Expect ')' after parameters.")?;
        self.consume(TokenKind::Colon, "Expect ':' before function body.")?;
        let body = self.block()?;

        Ok(Rc::new(FunctionDecl {
            name,
            params,
            body,
            is_async,
        }))
    }

    fn statement(&mut self) -> ParseResult<Stmt> {
        if self.matches(TokenKind::If) {
            return self.if_statement();
        }
        if self.matches(TokenKind::While) {
            return self.while_statement();
        }
        if self.matches(TokenKind::For) {
            return self.for_statement();
        }
        if self.matches(TokenKind::Return) {
            return self.return_statement();
        }
        if self.matches(TokenKind::Pass) {
            self.newline();
            return Ok(Stmt::Block(Vec::new()));
        }
        if self.check(TokenKind::Indent) {
            return Ok(Stmt::Block(self.block()?));
        }
        self.expression_statement()
    }

    fn if_statement(&mut self) -> ParseResult<Stmt> {
        let mut branches = Vec::new();
        loop {
            let condition = self.expression()?;
            self.consume(TokenKind::Colon, "Expect ':' after condition.")?;
            branches.push((condition, Stmt::Block(self.block()?)));
            if !self.matches(TokenKind::Elif) {
                break;
            }
        }

        let else_branch = if self.matches(TokenKind::Else) {
            self.consume(TokenKind::Colon, "Expect ':' after 'else'.")?;
            Some(Box::new(Stmt::Block(self.block()?)))
        } else {
            None
        };

        Ok(Stmt::If {
            branches,
            else_branch,
        })
    }

    fn while_statement(&mut self) -> ParseResult<Stmt> {
        let condition = self.expression()?;
        self.consume(TokenKind::Colon, "Expect ':' after while condition.")?;
        let body = Box::new(Stmt::Block(self.block()?));
        Ok(Stmt::While { condition, body })
    }

    /// Lowers `for item in iterable: body` into
    ///
    /// ```text
    /// $iterN = iterable
    /// $lengthN = $len($iterN)
    /// $indexN = 0
    /// while $indexN < $lengthN:
    ///     item = $iterN[$indexN]
    ///     body
    ///     $indexN = $indexN + 1
    /// ```
    fn for_statement(&mut self) -> ParseResult<Stmt> {
        let item = self.consume(TokenKind::Identifier, "Expect loop variable after 'for'.")?;
        self.consume(TokenKind::In, "Expect 'in' after loop variable.")?;
        let iterable = self.expression()?;
        let line = self
            .consume(TokenKind::Colon, "Expect ':' after iterable.")?
            .line;
        let body = self.block()?;

        self.hidden_count += 1;
        let iter = Token::synthetic(format!("$iter{}", self.hidden_count), line);
        let length = Token::synthetic(format!("$length{}", self.hidden_count), line);
        let index = Token::synthetic(format!("$index{}", self.hidden_count), line);

        let cache_iterable = self.assign(iter.clone(), iterable);
        let len_call = Expr::Call {
            callee: Box::new(self.variable(Token::synthetic(LOOP_LEN, line))),
            paren: Token::new(TokenKind::RightParen, ")", line),
            arguments: vec![self.variable(iter.clone())],
        };
        let cache_length = self.assign(length.clone(), len_call);
        let start = self.assign(index.clone(), Expr::Literal(LiteralValue::Number(0.0)));

        let condition = Expr::Binary {
            left: Box::new(self.variable(index.clone())),
            operator: Token::new(TokenKind::Less, "<", line),
            right: Box::new(self.variable(length)),
        };
        let element = Expr::Index {
            object: Box::new(self.variable(iter)),
            bracket: Token::new(TokenKind::RightBracket, "]", line),
            index: Box::new(self.variable(index.clone())),
            value: None,
        };
        let bind_item = self.assign(item, element);
        let step = Expr::Binary {
            left: Box::new(self.variable(index.clone())),
            operator: Token::new(TokenKind::Plus, "+", line),
            right: Box::new(Expr::Literal(LiteralValue::Number(1.0))),
        };
        let increment = self.assign(index, step);

        let mut loop_body = Vec::with_capacity(body.len() + 2);
        loop_body.push(Stmt::Expression(bind_item));
        loop_body.extend(body);
        loop_body.push(Stmt::Expression(increment));

        Ok(Stmt::Block(vec![
            Stmt::Expression(cache_iterable),
            Stmt::Expression(cache_length),
            Stmt::Expression(start),
            Stmt::While {
                condition,
                body: Box::new(Stmt::Block(loop_body)),
            },
        ]))
    }

    fn return_statement(&mut self) -> ParseResult<Stmt> {
        let keyword = self.previous().clone();
        let value = if self.at_line_break() {
            None
        } else {
            Some(self.expression()?)
        };
        self.newline();
        Ok(Stmt::Return { keyword, value })
    }

    fn expression_statement(&mut self) -> ParseResult<Stmt> {
        let expr = self.expression()?;
        self.newline();
        Ok(Stmt::Expression(expr))
    }

    fn block(&mut self) -> ParseResult<Vec<Stmt>> {
        self.consume(TokenKind::Indent, "Missing indent at block start.")?;

        self.block_depth += 1;
        let mut statements = Vec::new();
        while !self.check(TokenKind::Dedent) && !self.is_at_end() {
            if self.matches(TokenKind::Newline) {
                continue;
            }
            if let Some(statement) = self.declaration() {
                statements.push(statement);
            }
        }
        self.block_depth -= 1;

        self.consume(TokenKind::Dedent, "Expect unindent after block.")?;
        Ok(statements)
    }

    /// Statement terminator. A pending `Indent`/`Dedent` also ends the
    /// statement without being consumed.
    fn newline(&mut self) {
        if self.matches(TokenKind::Newline) || self.check(TokenKind::Indent) || self.check(TokenKind::Dedent) {
            return;
        }
        let token = self.peek().clone();
        self.report(&token, "Expect newline.");
    }

    fn expression(&mut self) -> ParseResult<Expr> {
        self.assignment()
    }

    fn assignment(&mut self) -> ParseResult<Expr> {
        let expr = self.await_expression()?;

        if !self.matches(TokenKind::Equal) {
            return Ok(expr);
        }
        let equals = self.previous().clone();
        let value = Box::new(self.assignment()?);

        match expr {
            Expr::Variable { id, name } => Ok(Expr::Assign { id, name, value }),
            Expr::Get { object, name } => Ok(Expr::Set {
                object,
                name,
                value,
            }),
            Expr::Index {
                object,
                bracket,
                index,
                value: None,
            } => Ok(Expr::Index {
                object,
                bracket,
                index,
                value: Some(value),
            }),
            other => {
                self.report(&equals, "Invalid assignment target.");
                Ok(other)
            }
        }
    }

    fn await_expression(&mut self) -> ParseResult<Expr> {
        if !self.matches(TokenKind::Await) {
            return self.ternary();
        }
        let keyword = self.previous().clone();
        let value = Box::new(self.ternary()?);
        Ok(Expr::Await { keyword, value })
    }

    fn ternary(&mut self) -> ParseResult<Expr> {
        let mut expr = self.or()?;
        while self.matches(TokenKind::Question) {
            let then_branch = self.or()?;
            self.consume(TokenKind::Colon, "Expect ':' in ternary expression.")?;
            let else_branch = self.or()?;
            expr = Expr::Ternary {
                condition: Box::new(expr),
                then_branch: Box::new(then_branch),
                else_branch: Box::new(else_branch),
            };
        }
        Ok(expr)
    }

    fn or(&mut self) -> ParseResult<Expr> {
        self.logical(TokenKind::Or, Self::and)
    }

    fn and(&mut self) -> ParseResult<Expr> {
        self.logical(TokenKind::And, Self::equality)
    }

    fn equality(&mut self) -> ParseResult<Expr> {
        self.binary(&[TokenKind::BangEqual, TokenKind::EqualEqual], Self::comparison)
    }

    fn comparison(&mut self) -> ParseResult<Expr> {
        self.binary(
            &[
                TokenKind::Greater,
                TokenKind::GreaterEqual,
                TokenKind::Less,
                TokenKind::LessEqual,
            ],
            Self::term,
        )
    }

    fn term(&mut self) -> ParseResult<Expr> {
        self.binary(&[TokenKind::Minus, TokenKind::Plus], Self::factor)
    }

    fn factor(&mut self) -> ParseResult<Expr> {
        self.binary(&[TokenKind::Slash, TokenKind::Star], Self::unary)
    }

    fn logical(
        &mut self,
        operator: TokenKind,
        operand: fn(&mut Self) -> ParseResult<Expr>,
    ) -> ParseResult<Expr> {
        let mut expr = operand(self)?;
        while self.matches(operator) {
            let operator = self.previous().clone();
            let right = operand(self)?;
            expr = Expr::Logical {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn binary(
        &mut self,
        operators: &[TokenKind],
        operand: fn(&mut Self) -> ParseResult<Expr>,
    ) -> ParseResult<Expr> {
        let mut expr = operand(self)?;
        while operators.iter().any(|kind| self.check(*kind)) {
            let operator = self.advance().clone();
            let right = operand(self)?;
            expr = Expr::Binary {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn unary(&mut self) -> ParseResult<Expr> {
        if self.check(TokenKind::Not) || self.check(TokenKind::Minus) {
            let operator = self.advance().clone();
            let right = Box::new(self.unary()?);
            return Ok(Expr::Unary { operator, right });
        }
        self.index()
    }

    /// Index, attribute and call suffixes share one loop so that chains like
    /// `a.items[0].update()` parse left to right.
    fn index(&mut self) -> ParseResult<Expr> {
        let mut expr = self.primary()?;
        loop {
            if self.matches(TokenKind::LeftParen) {
                let (arguments, paren) = self.arguments(TokenKind::RightParen)?;
                expr = Expr::Call {
                    callee: Box::new(expr),
                    paren,
                    arguments,
                };
            } else if self.matches(TokenKind::LeftBracket) {
                let index = self.expression()?;
                let bracket =
                    self.consume(TokenKind::RightBracket, "Expect ']' after index.")?;
                expr = Expr::Index {
                    object: Box::new(expr),
                    bracket,
                    index: Box::new(index),
                    value: None,
                };
            } else if self.matches(TokenKind::Dot) {
                let name =
                    self.consume(TokenKind::Identifier, "Expect property name after '.'.")?;
                expr = Expr::Get {
                    object: Box::new(expr),
                    name,
                };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn arguments(&mut self, delimiter: TokenKind) -> ParseResult<(Vec<Expr>, Token)> {
        self.discard_line_breaks();
        let mut arguments = Vec::new();
        while !self.check(delimiter) && !self.is_at_end() {
            if arguments.len() >= MAX_ARGUMENTS {
                let token = self.peek().clone();
                self.report(&token, "Can't have more than 255 arguments.");
            }
            arguments.push(self.expression()?);
            let is_comma = self.matches(TokenKind::Comma);
            self.discard_line_breaks();
            if !is_comma {
                break;
            }
        }
        let message = if delimiter == TokenKind::RightBracket {
            "Expect ']' after list elements."
        } else {
            "Expect ')' after arguments."
        };
        let closing = self.consume(delimiter, message)?;
        Ok((arguments, closing))
    }

    fn primary(&mut self) -> ParseResult<Expr> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::False => {
                self.advance();
                Ok(Expr::Literal(LiteralValue::Bool(false)))
            }
            TokenKind::True => {
                self.advance();
                Ok(Expr::Literal(LiteralValue::Bool(true)))
            }
            TokenKind::None => {
                self.advance();
                Ok(Expr::Literal(LiteralValue::None))
            }
            TokenKind::Number | TokenKind::String => {
                self.advance();
                let value = match token.literal {
                    Some(Literal::Number(value)) => LiteralValue::Number(value),
                    Some(Literal::Str(value)) => LiteralValue::Str(value.into()),
                    None => return Err(StaticError::parse(&token, "Expect literal value.")),
                };
                Ok(Expr::Literal(value))
            }
            TokenKind::Super => {
                self.advance();
                // `super().name` reads the same as `super.name`.
                if self.matches(TokenKind::LeftParen) {
                    self.consume(TokenKind::RightParen, "Expect ')' after 'super('.")?;
                }
                self.consume(TokenKind::Dot, "Expect '.' after 'super'.")?;
                let method =
                    self.consume(TokenKind::Identifier, "Expect superclass method name.")?;
                Ok(Expr::Super {
                    id: self.next_id(),
                    keyword: token,
                    method,
                })
            }
            TokenKind::Identifier => {
                self.advance();
                Ok(self.variable(token))
            }
            TokenKind::LeftParen => {
                self.advance();
                let expr = self.expression()?;
                self.consume(TokenKind::RightParen, "Expect ')' after expression.")?;
                Ok(Expr::Grouping(Box::new(expr)))
            }
            TokenKind::LeftBracket => {
                self.advance();
                let (elements, bracket) = self.arguments(TokenKind::RightBracket)?;
                Ok(Expr::List { elements, bracket })
            }
            TokenKind::LeftBrace => {
                self.advance();
                self.dict(token)
            }
            _ => Err(StaticError::parse(&token, "Expect expression.")),
        }
    }

    fn dict(&mut self, brace: Token) -> ParseResult<Expr> {
        self.discard_line_breaks();
        let mut entries = Vec::new();
        while !self.matches(TokenKind::RightBrace) {
            if entries.len() >= MAX_ARGUMENTS {
                let token = self.peek().clone();
                self.report(&token, "Can't have more than 255 entries.");
            }
            let key = self.expression()?;
            self.consume(TokenKind::Colon, "Expect ':' after key.")?;
            let value = self.expression()?;
            entries.push((key, value));
            let is_comma = self.matches(TokenKind::Comma);
            self.discard_line_breaks();
            if !is_comma {
                self.consume(TokenKind::RightBrace, "Expect '}' after dict entries.")?;
                break;
            }
        }
        Ok(Expr::Dict { entries, brace })
    }

    fn variable(&mut self, name: Token) -> Expr {
        Expr::Variable {
            id: self.next_id(),
            name,
        }
    }

    fn assign(&mut self, name: Token, value: Expr) -> Expr {
        Expr::Assign {
            id: self.next_id(),
            name,
            value: Box::new(value),
        }
    }

    fn next_id(&mut self) -> ExprId {
        let id = ExprId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Skips tokens until a likely statement boundary. Indented regions that
    /// start while skipping are skipped whole; the dedent closing the block
    /// being parsed is left for `block` to consume.
    fn synchronize(&mut self) {
        let mut skipped_indents = 0usize;
        while !self.is_at_end() {
            match self.peek().kind {
                TokenKind::Dedent if skipped_indents == 0 && self.block_depth > 0 => return,
                TokenKind::Dedent => skipped_indents = skipped_indents.saturating_sub(1),
                TokenKind::Indent => skipped_indents += 1,
                _ => {}
            }
            self.advance();
            if skipped_indents > 0 {
                continue;
            }
            if matches!(self.previous().kind, TokenKind::Newline | TokenKind::Dedent) {
                return;
            }
            match self.peek().kind {
                TokenKind::Class
                | TokenKind::Def
                | TokenKind::Async
                | TokenKind::For
                | TokenKind::If
                | TokenKind::While
                | TokenKind::Return => return,
                _ => {}
            }
        }
    }

    fn discard_line_breaks(&mut self) {
        while self.at_line_break() {
            self.advance();
        }
    }

    fn at_line_break(&self) -> bool {
        matches!(
            self.peek().kind,
            TokenKind::Newline | TokenKind::Indent | TokenKind::Dedent
        )
    }

    fn report(&mut self, token: &Token, message: &str) {
        self.errors.push(StaticError::parse(token, message));
    }

    fn consume(&mut self, kind: TokenKind, message: &str) -> ParseResult<Token> {
        if self.check(kind) {
            return Ok(self.advance().clone());
        }
        Err(StaticError::parse(self.peek(), message))
    }

    fn matches(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            return true;
        }
        false
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        self.previous()
    }

    fn is_at_end(&self) -> bool {
        self.peek().kind == TokenKind::EOF
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.current]
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.current.saturating_sub(1)]
    }
}

pub fn parse_tokens(tokens: Vec<Token>) -> Parsed {
    Parser::new(tokens).parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use indoc::indoc;

    fn parse(source: &str) -> Parsed {
        let scanned = tokenize(source);
        assert!(scanned.errors.is_empty(), "lex errors: {:?}", scanned.errors);
        parse_tokens(scanned.tokens)
    }

    fn parse_ok(source: &str) -> Vec<Stmt> {
        let parsed = parse(source);
        assert!(parsed.errors.is_empty(), "parse errors: {:?}", parsed.errors);
        parsed.into_statements()
    }

    fn messages(parsed: &Parsed) -> Vec<String> {
        parsed.errors.iter().map(|error| error.message.clone()).collect()
    }

    #[test]
    fn parses_class_keeping_only_methods() {
        let statements = parse_ok(indoc! {"
            class B(A):
                x = 1
                def f(self):
                    return self
                async def g(self):
                    return 2
        "});
        let [Stmt::Class(class)] = statements.as_slice() else {
            panic!("expected class, got {statements:?}");
        };
        assert_eq!(class.name.lexeme, "B");
        assert!(matches!(&class.superclass, Some(Expr::Variable { name, .. }) if name.lexeme == "A"));
        let names: Vec<_> = class.methods.iter().map(|m| m.name.lexeme.as_str()).collect();
        assert_eq!(names, ["f", "g"]);
        assert!(class.methods[1].is_async);
    }

    #[test]
    fn desugars_for_loop_into_while() {
        let statements = parse_ok(indoc! {"
            for x in [1, 2]:
                print(x)
        "});
        let [Stmt::Block(block)] = statements.as_slice() else {
            panic!("expected desugared block, got {statements:?}");
        };
        assert_eq!(block.len(), 4);
        assert!(matches!(&block[0], Stmt::Expression(Expr::Assign { name, value, .. })
            if name.lexeme == "$iter1" && matches!(**value, Expr::List { .. })));
        assert!(matches!(&block[1], Stmt::Expression(Expr::Assign { name, value, .. })
            if name.lexeme == "$length1" && matches!(**value, Expr::Call { .. })));
        let Stmt::While { body, .. } = &block[3] else {
            panic!("expected while loop");
        };
        let Stmt::Block(body) = body.as_ref() else {
            panic!("expected loop body block");
        };
        assert_eq!(body.len(), 3);
        assert!(matches!(&body[0], Stmt::Expression(Expr::Assign { name, .. }) if name.lexeme == "x"));
    }

    #[test]
    fn nested_for_loops_use_distinct_hidden_names() {
        let statements = parse_ok(indoc! {"
            for a in x:
                for b in y:
                    pass
        "});
        let [Stmt::Block(outer)] = statements.as_slice() else {
            panic!("expected block");
        };
        let Stmt::Expression(Expr::Assign { name, .. }) = &outer[0] else {
            panic!("expected hidden assignment");
        };
        assert_eq!(name.lexeme, "$iter2");
    }

    #[test]
    fn rewrites_assignment_targets() {
        let statements = parse_ok("a = 1\na.b = 2\na[0] = 3\n");
        assert!(matches!(statements[0], Stmt::Expression(Expr::Assign { .. })));
        assert!(matches!(statements[1], Stmt::Expression(Expr::Set { .. })));
        assert!(matches!(
            statements[2],
            Stmt::Expression(Expr::Index { value: Some(_), .. })
        ));
    }

    #[test]
    fn invalid_assignment_target_is_not_fatal() {
        let parsed = parse("1 = 2\nx = 3\n");
        assert_eq!(messages(&parsed), ["Invalid assignment target."]);
        assert_eq!(parsed.statements.len(), 2);
        assert!(parsed.statements.iter().all(Option::is_some));
    }

    #[test]
    fn recovers_and_reports_every_statement_error() {
        let parsed = parse("x = +\ny = *\nz = 1\n");
        assert_eq!(messages(&parsed), ["Expect expression.", "Expect expression."]);
        assert_eq!(parsed.statements.len(), 3);
        assert!(parsed.statements[0].is_none());
        assert!(parsed.statements[1].is_none());
        assert!(parsed.statements[2].is_some());
        assert_eq!(
            parsed.errors[0].to_string(),
            "[line 1] Error at '+': Expect expression."
        );
    }

    #[test]
    fn caps_parameter_lists() {
        let params = (0..256).map(|i| format!("p{i}")).collect::<Vec<_>>().join(", ");
        let parsed = parse(&format!("def f({params}):\n    pass\n"));
        assert_eq!(messages(&parsed), ["Can't have more than 255 parameters."]);
        let Some(Stmt::Function(function)) = &parsed.statements[0] else {
            panic!("expected function");
        };
        assert_eq!(function.params.len(), 256);
    }

    #[test]
    fn caps_dict_entries() {
        let entries = (0..256).map(|i| format!("{i}: {i}")).collect::<Vec<_>>().join(", ");
        let parsed = parse(&format!("d = {{{entries}}}\n"));
        assert_eq!(messages(&parsed), ["Can't have more than 255 entries."]);
        let Some(Stmt::Expression(Expr::Assign { value, .. })) = &parsed.statements[0] else {
            panic!("expected assignment");
        };
        assert!(matches!(value.as_ref(), Expr::Dict { entries, .. } if entries.len() == 256));
    }

    #[test]
    fn error_on_last_line_of_block_keeps_the_dedent() {
        let parsed = parse(indoc! {"
            def f():
                x = 1 +
            y = 2
        "});
        assert_eq!(messages(&parsed), ["Expect expression."]);
        assert_eq!(parsed.statements.len(), 2);
        let Some(Stmt::Function(function)) = &parsed.statements[0] else {
            panic!("expected function");
        };
        assert!(function.body.is_empty());
        assert!(matches!(&parsed.statements[1],
            Some(Stmt::Expression(Expr::Assign { name, .. })) if name.lexeme == "y"));
    }

    #[test]
    fn recovery_stops_before_async_def() {
        let parsed = parse("x = ) async def f():\n    return 1\n");
        assert_eq!(messages(&parsed), ["Expect expression."]);
        assert!(parsed.statements[0].is_none());
        assert!(matches!(&parsed.statements[1], Some(Stmt::Function(f)) if f.is_async));
    }

    #[test]
    fn recovery_skips_a_broken_header_with_its_body() {
        let parsed = parse(indoc! {"
            class 1:
                x = 1
            y = 2
        "});
        assert_eq!(messages(&parsed), ["Expect class name."]);
        assert!(parsed.statements[0].is_none());
        assert!(matches!(&parsed.statements[1],
            Some(Stmt::Expression(Expr::Assign { name, .. })) if name.lexeme == "y"));
    }

    #[test]
    fn for_loops_measure_through_the_hidden_len() {
        let statements = parse_ok("for x in xs:\n    pass\n");
        let [Stmt::Block(block)] = statements.as_slice() else {
            panic!("expected block");
        };
        let Stmt::Expression(Expr::Assign { value, .. }) = &block[1] else {
            panic!("expected length assignment");
        };
        let Expr::Call { callee, .. } = value.as_ref() else {
            panic!("expected call");
        };
        assert!(matches!(callee.as_ref(), Expr::Variable { name, .. } if name.lexeme == LOOP_LEN));
    }

    #[test]
    fn caps_argument_lists() {
        let args = vec!["1"; 256].join(", ");
        let parsed = parse(&format!("f({args})\n"));
        assert_eq!(messages(&parsed), ["Can't have more than 255 arguments."]);
        assert!(parsed.statements[0].is_some());
    }

    #[test]
    fn parses_if_elif_else() {
        let statements = parse_ok(indoc! {"
            if a:
                b = 1
            elif c:
                b = 2
            else:
                b = 3
        "});
        let [Stmt::If { branches, else_branch }] = statements.as_slice() else {
            panic!("expected if");
        };
        assert_eq!(branches.len(), 2);
        assert!(else_branch.is_some());
    }

    #[test]
    fn return_without_value_before_dedent() {
        let statements = parse_ok("def f():\n    return\n");
        let [Stmt::Function(function)] = statements.as_slice() else {
            panic!("expected function");
        };
        assert!(matches!(function.body[0], Stmt::Return { value: None, .. }));
    }

    #[test]
    fn parses_super_call_forms() {
        for source in ["super.f()\n", "super().f()\n"] {
            let statements = parse_ok(source);
            let [Stmt::Expression(Expr::Call { callee, .. })] = statements.as_slice() else {
                panic!("expected call for {source}");
            };
            assert!(matches!(callee.as_ref(), Expr::Super { method, .. } if method.lexeme == "f"));
        }
    }

    #[test]
    fn parses_ternary_and_await() {
        let statements = parse_ok("x = await a ? b : c\n");
        let [Stmt::Expression(Expr::Assign { value, .. })] = statements.as_slice() else {
            panic!("expected assignment");
        };
        let Expr::Await { value, .. } = value.as_ref() else {
            panic!("expected await");
        };
        assert!(matches!(value.as_ref(), Expr::Ternary { .. }));
    }

    #[test]
    fn chains_index_attribute_and_call() {
        let statements = parse_ok("a.items[0].update(1)\n");
        let [Stmt::Expression(Expr::Call { callee, .. })] = statements.as_slice() else {
            panic!("expected call");
        };
        assert!(matches!(callee.as_ref(), Expr::Get { object, .. }
            if matches!(object.as_ref(), Expr::Index { .. })));
    }

    #[test]
    fn parses_dict_literal() {
        let statements = parse_ok("d = {'a': 1, 'b': 2}\n");
        let [Stmt::Expression(Expr::Assign { value, .. })] = statements.as_slice() else {
            panic!("expected assignment");
        };
        assert!(matches!(value.as_ref(), Expr::Dict { entries, .. } if entries.len() == 2));
    }

    #[test]
    fn missing_block_reports_indent_error() {
        let parsed = parse("while x:\ny = 1\n");
        assert_eq!(messages(&parsed), ["Missing indent at block start."]);
    }

    #[test]
    fn ids_continue_from_starting_point() {
        let scanned = tokenize("a = b\n");
        let parsed = Parser::starting_at(scanned.tokens, 100).parse();
        assert_eq!(parsed.next_id, 102);
    }
}

use std::{iter::Peekable, str::CharIndices};

use crate::error::StaticError;
use crate::token::{Literal, Token, TokenKind};

/// Spaces that make up one indent level. A tab always counts as one level.
const SPACES_PER_INDENT: usize = 4;

/// Result of a full scan. Errors do not stop scanning, so `tokens` is always
/// a complete stream terminated by `Newline` and `EOF`.
#[derive(Debug, Default)]
pub struct Scanned {
    pub tokens: Vec<Token>,
    pub errors: Vec<StaticError>,
}

impl Scanned {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

pub struct Lexer<'a> {
    input: &'a str,
    chars: Peekable<CharIndices<'a>>,
    tokens: Vec<Token>,
    errors: Vec<StaticError>,
    indent_level: usize,
    bracket_depth: usize,
    start: usize,
    line: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.char_indices().peekable(),
            tokens: Vec::new(),
            errors: Vec::new(),
            indent_level: 0,
            bracket_depth: 0,
            start: 0,
            line: 1,
        }
    }

    pub fn scan(mut self) -> Scanned {
        while let Some(&(index, _)) = self.chars.peek() {
            self.start = index;
            self.scan_token();
        }

        self.start = self.input.len();
        // Close blocks left open by a missing trailing newline.
        while self.indent_level > 0 {
            self.indent_level -= 1;
            self.push(TokenKind::Dedent);
        }
        self.push(TokenKind::Newline);
        self.tokens.push(Token::new(TokenKind::EOF, "", self.line));

        tracing::trace!(
            tokens = self.tokens.len(),
            errors = self.errors.len(),
            "scanned source"
        );
        Scanned {
            tokens: self.tokens,
            errors: self.errors,
        }
    }

    fn scan_token(&mut self) {
        let Some((_, c)) = self.chars.next() else {
            return;
        };
        match c {
            '(' => self.open(TokenKind::LeftParen),
            ')' => self.close(TokenKind::RightParen),
            '[' => self.open(TokenKind::LeftBracket),
            ']' => self.close(TokenKind::RightBracket),
            '{' => self.open(TokenKind::LeftBrace),
            '}' => self.close(TokenKind::RightBrace),
            ',' => self.push(TokenKind::Comma),
            '.' => self.push(TokenKind::Dot),
            '-' => self.push(TokenKind::Minus),
            '+' => self.push(TokenKind::Plus),
            ';' => self.push(TokenKind::Semicolon),
            '/' => self.push(TokenKind::Slash),
            '*' => self.push(TokenKind::Star),
            '?' => self.push(TokenKind::Question),
            ':' => self.push(TokenKind::Colon),
            '!' => self.push_either('=', TokenKind::BangEqual, TokenKind::Bang),
            '=' => self.push_either('=', TokenKind::EqualEqual, TokenKind::Equal),
            '<' => self.push_either('=', TokenKind::LessEqual, TokenKind::Less),
            '>' => self.push_either('=', TokenKind::GreaterEqual, TokenKind::Greater),
            '#' => self.skip_comment(),
            ' ' | '\r' | '\t' => {}
            '\n' => {
                self.line += 1;
                // Line breaks inside brackets join lines.
                if self.bracket_depth == 0 {
                    self.newline();
                }
            }
            '"' | '\'' => self.read_string(c),
            c if c.is_ascii_digit() => self.read_number(),
            c if c.is_ascii_alphabetic() || c == '_' => self.read_identifier(),
            _ => self
                .errors
                .push(StaticError::lex(self.line, "Unexpected character.")),
        }
    }

    /// Measures the indentation of the next non-blank line and emits
    /// `Indent`/`Dedent` tokens for each level of change, or one `Newline`.
    fn newline(&mut self) {
        let mut indents = 0;
        let mut spaces = 0;
        loop {
            match self.chars.peek().map(|&(_, c)| c) {
                Some(' ') => spaces += 1,
                Some('\t') => indents += 1,
                Some('\r') => {}
                Some('#') => {
                    self.skip_comment();
                    continue;
                }
                Some('\n') => {
                    self.line += 1;
                    indents = 0;
                    spaces = 0;
                }
                _ => break,
            }
            self.chars.next();
        }
        self.start = self.current_index();

        let indents = indents + spaces / SPACES_PER_INDENT;
        if indents > self.indent_level {
            for _ in self.indent_level..indents {
                self.push(TokenKind::Indent);
            }
        } else if indents < self.indent_level {
            for _ in indents..self.indent_level {
                self.push(TokenKind::Dedent);
            }
        } else {
            self.push(TokenKind::Newline);
        }
        self.indent_level = indents;
    }

    fn skip_comment(&mut self) {
        while let Some(&(_, c)) = self.chars.peek() {
            if c == '\n' {
                break;
            }
            self.chars.next();
        }
    }

    fn read_string(&mut self, delimiter: char) {
        let start_line = self.line;
        let content_start = self.start + delimiter.len_utf8();
        while let Some(&(index, c)) = self.chars.peek() {
            self.chars.next();
            if c == delimiter {
                let value = self.input[content_start..index].to_string();
                let lexeme = self.lexeme();
                self.tokens.push(
                    Token::new(TokenKind::String, lexeme, start_line)
                        .with_literal(Literal::Str(value)),
                );
                return;
            }
            if c == '\n' {
                self.line += 1;
            }
        }
        self.errors
            .push(StaticError::lex(self.line, "Unterminated string."));
    }

    fn read_number(&mut self) {
        self.consume_digits();
        let mut lookahead = self.chars.clone();
        if let Some((_, '.')) = lookahead.next()
            && let Some((_, next)) = lookahead.next()
            && next.is_ascii_digit()
        {
            self.chars.next(); // Consume '.'
            self.consume_digits();
        }

        let lexeme = self.lexeme();
        match lexeme.parse::<f64>() {
            Ok(value) => self.tokens.push(
                Token::new(TokenKind::Number, lexeme, self.line).with_literal(Literal::Number(value)),
            ),
            Err(_) => self
                .errors
                .push(StaticError::lex(self.line, format!("Invalid number '{lexeme}'."))),
        }
    }

    fn consume_digits(&mut self) {
        while let Some(&(_, c)) = self.chars.peek() {
            if !c.is_ascii_digit() {
                break;
            }
            self.chars.next();
        }
    }

    fn read_identifier(&mut self) {
        while let Some(&(_, c)) = self.chars.peek() {
            if !(c.is_ascii_alphanumeric() || c == '_') {
                break;
            }
            self.chars.next();
        }
        let lexeme = self.lexeme();
        let kind = TokenKind::keyword(&lexeme).unwrap_or(TokenKind::Identifier);
        self.tokens.push(Token::new(kind, lexeme, self.line));
    }

    fn open(&mut self, kind: TokenKind) {
        self.bracket_depth += 1;
        self.push(kind);
    }

    fn close(&mut self, kind: TokenKind) {
        self.bracket_depth = self.bracket_depth.saturating_sub(1);
        self.push(kind);
    }

    fn push_either(&mut self, expected: char, matched: TokenKind, single: TokenKind) {
        if self.chars.next_if(|&(_, c)| c == expected).is_some() {
            self.push(matched);
        } else {
            self.push(single);
        }
    }

    fn push(&mut self, kind: TokenKind) {
        let lexeme = self.lexeme();
        self.tokens.push(Token::new(kind, lexeme, self.line));
    }

    fn lexeme(&mut self) -> String {
        let end = self.current_index();
        self.input[self.start..end].to_string()
    }

    fn current_index(&mut self) -> usize {
        self.chars
            .peek()
            .map(|(idx, _)| *idx)
            .unwrap_or(self.input.len())
    }
}

pub fn tokenize(input: &str) -> Scanned {
    Lexer::new(input).scan()
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    fn kinds(input: &str) -> Vec<TokenKind> {
        let scanned = tokenize(input);
        assert!(scanned.errors.is_empty(), "unexpected errors: {:?}", scanned.errors);
        scanned.tokens.into_iter().map(|token| token.kind).collect()
    }

    #[test]
    fn test_simple_program() {
        let input = indoc! {"
            def fn():
                n = 4 + 4
                print(n)
            fn()
        "};
        let expected = vec![
            TokenKind::Def,
            TokenKind::Identifier,
            TokenKind::LeftParen,
            TokenKind::RightParen,
            TokenKind::Colon,
            TokenKind::Indent,
            TokenKind::Identifier,
            TokenKind::Equal,
            TokenKind::Number,
            TokenKind::Plus,
            TokenKind::Number,
            TokenKind::Newline,
            TokenKind::Identifier,
            TokenKind::LeftParen,
            TokenKind::Identifier,
            TokenKind::RightParen,
            TokenKind::Dedent,
            TokenKind::Identifier,
            TokenKind::LeftParen,
            TokenKind::RightParen,
            TokenKind::Newline,
            TokenKind::Newline,
            TokenKind::EOF,
        ];
        assert_eq!(kinds(input), expected);
    }

    #[test]
    fn function_body_closes_before_trailing_newline() {
        assert_eq!(
            kinds("def a():\n    return 0\n"),
            vec![
                TokenKind::Def,
                TokenKind::Identifier,
                TokenKind::LeftParen,
                TokenKind::RightParen,
                TokenKind::Colon,
                TokenKind::Indent,
                TokenKind::Return,
                TokenKind::Number,
                TokenKind::Dedent,
                TokenKind::Newline,
                TokenKind::EOF,
            ]
        );
    }

    #[test]
    fn blank_and_comment_lines_do_not_change_indentation() {
        let input = indoc! {"
            while True:
                a = 1

                # note
                b = 2
        "};
        let kinds = kinds(input);
        let indents = kinds.iter().filter(|k| **k == TokenKind::Indent).count();
        let dedents = kinds.iter().filter(|k| **k == TokenKind::Dedent).count();
        assert_eq!(indents, 1);
        assert_eq!(dedents, 1);
    }

    #[test]
    fn indents_and_dedents_balance_without_trailing_newline() {
        let input = "class A:\n    def f(self):\n        if True:\n            return 1";
        let kinds = kinds(input);
        let indents = kinds.iter().filter(|k| **k == TokenKind::Indent).count();
        let dedents = kinds.iter().filter(|k| **k == TokenKind::Dedent).count();
        assert_eq!(indents, 3);
        assert_eq!(indents, dedents);
        assert_eq!(&kinds[kinds.len() - 2..], &[TokenKind::Newline, TokenKind::EOF]);
    }

    #[test]
    fn tabs_count_as_one_level() {
        let kinds = kinds("if x:\n\ty = 1\n");
        assert_eq!(kinds.iter().filter(|k| **k == TokenKind::Indent).count(), 1);
    }

    #[test]
    fn multi_level_dedent_emits_one_token_per_level() {
        let input = indoc! {"
            if a:
                if b:
                    c = 1
            d = 2
        "};
        let kinds = kinds(input);
        let position = kinds
            .iter()
            .position(|k| *k == TokenKind::Dedent)
            .expect("dedent");
        assert_eq!(kinds[position + 1], TokenKind::Dedent);
        assert_eq!(kinds[position + 2], TokenKind::Identifier);
    }

    #[test]
    fn scans_operators_and_literals() {
        let scanned = tokenize("a != b == c <= 1.5 >= 'hi' ? x : y\n");
        let kinds: Vec<_> = scanned.tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            &kinds[..12],
            &[
                TokenKind::Identifier,
                TokenKind::BangEqual,
                TokenKind::Identifier,
                TokenKind::EqualEqual,
                TokenKind::Identifier,
                TokenKind::LessEqual,
                TokenKind::Number,
                TokenKind::GreaterEqual,
                TokenKind::String,
                TokenKind::Question,
                TokenKind::Identifier,
                TokenKind::Colon,
            ]
        );
        assert_eq!(scanned.tokens[6].literal, Some(Literal::Number(1.5)));
        assert_eq!(scanned.tokens[8].literal, Some(Literal::Str("hi".to_string())));
    }

    #[test]
    fn trailing_dot_is_not_part_of_number() {
        let kinds = kinds("1.foo\n");
        assert_eq!(
            &kinds[..3],
            &[TokenKind::Number, TokenKind::Dot, TokenKind::Identifier]
        );
    }

    #[test]
    fn recognizes_keywords() {
        let kinds = kinds("async def await elif None not pass super\n");
        assert_eq!(
            &kinds[..8],
            &[
                TokenKind::Async,
                TokenKind::Def,
                TokenKind::Await,
                TokenKind::Elif,
                TokenKind::None,
                TokenKind::Not,
                TokenKind::Pass,
                TokenKind::Super,
            ]
        );
    }

    #[test]
    fn strings_may_span_lines() {
        let scanned = tokenize("s = 'a\nb'\nt = 1\n");
        assert!(scanned.errors.is_empty());
        assert_eq!(scanned.tokens[2].literal, Some(Literal::Str("a\nb".to_string())));
        assert_eq!(scanned.tokens[4].line, 3);
    }

    #[test]
    fn newlines_inside_brackets_are_joined() {
        let kinds = kinds("x = [\n    1,\n        2,\n]\n");
        assert!(!kinds.contains(&TokenKind::Indent));
        assert!(!kinds.contains(&TokenKind::Dedent));
    }

    #[test]
    fn errors_on_invalid_character_and_keeps_scanning() {
        let scanned = tokenize("x = 1 @ 2\ny = $\n");
        assert_eq!(scanned.errors.len(), 2);
        assert_eq!(
            scanned.errors[1].to_string(),
            "[line 2] Error: Unexpected character."
        );
        assert!(scanned.tokens.iter().any(|t| t.lexeme == "y"));
    }

    #[test]
    fn errors_on_unterminated_string() {
        let scanned = tokenize("x = 'abc\n");
        assert_eq!(scanned.errors.len(), 1);
        assert!(scanned.errors[0].message.contains("Unterminated string."));
        assert_eq!(scanned.tokens.last().map(|t| t.kind), Some(TokenKind::EOF));
    }
}

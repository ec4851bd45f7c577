//! Tokenizer for the JSONata subset

use std::iter::Peekable;
use std::str::Chars;

/// Lexical token
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Str(String),
    Num(f64),
    /// Bare or backtick-quoted field name
    Ident(String),
    /// `$name`; the bare context reference `$` is `Var("")`, the root
    /// reference `$$` is `Var("$")`
    Var(String),
    True,
    False,
    Null,
    Function,
    And,
    Or,
    In,
    Dot,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Question,
    Amp,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Eof,
}

struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            chars: source.chars().peekable(),
            pos: 0,
        }
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn next_token(&mut self) -> Result<Token, String> {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.bump();
        }

        let c = match self.bump() {
            None => return Ok(Token::Eof),
            Some(c) => c,
        };

        let token = match c {
            '.' => Token::Dot,
            '(' => Token::LParen,
            ')' => Token::RParen,
            '[' => Token::LBracket,
            ']' => Token::RBracket,
            '{' => Token::LBrace,
            '}' => Token::RBrace,
            ',' => Token::Comma,
            ':' => Token::Colon,
            '?' => Token::Question,
            '&' => Token::Amp,
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' => Token::Star,
            '/' => Token::Slash,
            '%' => Token::Percent,
            '=' => Token::Eq,
            '!' => {
                if self.eat('=') {
                    Token::Ne
                } else {
                    return Err(format!("unexpected '!' at position {}", self.pos));
                }
            }
            '<' => {
                if self.eat('=') {
                    Token::Le
                } else {
                    Token::Lt
                }
            }
            '>' => {
                if self.eat('=') {
                    Token::Ge
                } else {
                    Token::Gt
                }
            }
            '$' => {
                if self.eat('$') {
                    Token::Var("$".to_string())
                } else {
                    let mut name = String::new();
                    while matches!(self.peek(), Some(c) if c.is_alphanumeric() || c == '_') {
                        name.push(self.bump().unwrap());
                    }
                    Token::Var(name)
                }
            }
            '"' | '\'' => self.string(c)?,
            '`' => {
                let mut name = String::new();
                loop {
                    match self.bump() {
                        Some('`') => break,
                        Some(ch) => name.push(ch),
                        None => return Err("unterminated backtick name".to_string()),
                    }
                }
                Token::Ident(name)
            }
            c if c.is_ascii_digit() => self.number(c)?,
            c if c.is_alphabetic() || c == '_' => {
                let mut name = String::from(c);
                while matches!(self.peek(), Some(c) if c.is_alphanumeric() || c == '_') {
                    name.push(self.bump().unwrap());
                }
                match name.as_str() {
                    "true" => Token::True,
                    "false" => Token::False,
                    "null" => Token::Null,
                    "function" => Token::Function,
                    "and" => Token::And,
                    "or" => Token::Or,
                    "in" => Token::In,
                    _ => Token::Ident(name),
                }
            }
            other => return Err(format!("unexpected character '{}' at position {}", other, self.pos)),
        };
        Ok(token)
    }

    fn string(&mut self, quote: char) -> Result<Token, String> {
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err("unterminated string literal".to_string()),
                Some(c) if c == quote => break,
                Some('\\') => match self.bump() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('r') => out.push('\r'),
                    Some('\\') => out.push('\\'),
                    Some('/') => out.push('/'),
                    Some('u') => {
                        let mut hex = String::new();
                        for _ in 0..4 {
                            hex.push(self.bump().ok_or("truncated \\u escape")?);
                        }
                        let code = u32::from_str_radix(&hex, 16)
                            .map_err(|_| format!("invalid \\u escape '{}'", hex))?;
                        out.push(char::from_u32(code).unwrap_or('\u{fffd}'));
                    }
                    Some(c) if c == quote => out.push(quote),
                    Some(c) => out.push(c),
                    None => return Err("unterminated string literal".to_string()),
                },
                Some(c) => out.push(c),
            }
        }
        Ok(Token::Str(out))
    }

    fn number(&mut self, first: char) -> Result<Token, String> {
        let mut text = String::from(first);
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            text.push(self.bump().unwrap());
        }
        if self.peek() == Some('.') {
            // Lookahead: `1.name` is a path step, `1.5` is a decimal
            let mut ahead = self.chars.clone();
            ahead.next();
            if matches!(ahead.peek(), Some(c) if c.is_ascii_digit()) {
                text.push(self.bump().unwrap());
                while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                    text.push(self.bump().unwrap());
                }
            }
        }
        if matches!(self.peek(), Some('e') | Some('E')) {
            text.push(self.bump().unwrap());
            if matches!(self.peek(), Some('+') | Some('-')) {
                text.push(self.bump().unwrap());
            }
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                text.push(self.bump().unwrap());
            }
        }
        text.parse::<f64>()
            .map(Token::Num)
            .map_err(|_| format!("invalid number literal '{}'", text))
    }
}

/// Tokenize a JSONata expression.
pub fn tokenize(source: &str) -> Result<Vec<Token>, String> {
    let mut lexer = Lexer::new(source);
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token()?;
        let done = token == Token::Eof;
        tokens.push(token);
        if done {
            break;
        }
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_paths_and_operators() {
        let tokens = tokenize("a.b[0] & $v").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Ident("a".into()),
                Token::Dot,
                Token::Ident("b".into()),
                Token::LBracket,
                Token::Num(0.0),
                Token::RBracket,
                Token::Amp,
                Token::Var("v".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn distinguishes_decimal_from_path_step() {
        assert!(tokenize("1.5").unwrap().contains(&Token::Num(1.5)));
        let tokens = tokenize("items[1].name").unwrap();
        assert!(tokens.contains(&Token::Num(1.0)));
        assert!(tokens.contains(&Token::Ident("name".into())));
    }

    #[test]
    fn context_and_root_vars() {
        assert_eq!(
            tokenize("$").unwrap(),
            vec![Token::Var("".into()), Token::Eof]
        );
        assert_eq!(
            tokenize("$$").unwrap(),
            vec![Token::Var("$".into()), Token::Eof]
        );
    }

    #[test]
    fn string_escapes() {
        assert_eq!(
            tokenize(r#""a\"b""#).unwrap(),
            vec![Token::Str("a\"b".into()), Token::Eof]
        );
        assert_eq!(
            tokenize("'it\\'s'").unwrap(),
            vec![Token::Str("it's".into()), Token::Eof]
        );
    }
}

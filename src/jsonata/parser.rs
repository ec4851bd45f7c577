//! Pratt parser for the JSONata subset

use super::lexer::Token;

/// Expression tree
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Null,
    Bool(bool),
    Num(f64),
    Str(String),
    /// Bare field access on the current context
    Field(String),
    /// All values of the current context object
    Wildcard,
    /// `$name`; `""` is the context, `"$"` the root
    Var(String),
    /// `lhs.rhs`, evaluating rhs once per item of lhs
    Map(Box<Expr>, Box<Expr>),
    /// `lhs[pred]`, an index or a filter
    Predicate(Box<Expr>, Box<Expr>),
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Neg(Box<Expr>),
    /// `cond ? then : else` (else optional)
    Conditional {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Option<Box<Expr>>,
    },
    Object(Vec<(Expr, Expr)>),
    Array(Vec<Expr>),
    /// `$name(args...)`
    Call { name: String, args: Vec<Expr> },
    /// `function($a, $b) { body }`
    Lambda { params: Vec<String>, body: Box<Expr> },
}

/// Binary operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Concat,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    In,
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn current(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.pos].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: &Token) -> Result<(), String> {
        if self.current() == expected {
            self.advance();
            Ok(())
        } else {
            Err(format!(
                "expected {:?}, found {:?}",
                expected,
                self.current()
            ))
        }
    }

    /// Left binding power; 0 stops the Pratt loop.
    fn lbp(token: &Token) -> u8 {
        match token {
            Token::Question => 20,
            Token::Or => 25,
            Token::And => 30,
            Token::Eq | Token::Ne | Token::Lt | Token::Le | Token::Gt | Token::Ge | Token::In => 40,
            Token::Plus | Token::Minus | Token::Amp => 50,
            Token::Star | Token::Slash | Token::Percent => 60,
            Token::Dot => 75,
            Token::LBracket | Token::LParen => 80,
            _ => 0,
        }
    }

    fn parse_expr(&mut self, rbp: u8) -> Result<Expr, String> {
        let mut left = self.nud()?;
        while rbp < Self::lbp(self.current()) {
            left = self.led(left)?;
        }
        Ok(left)
    }

    fn nud(&mut self) -> Result<Expr, String> {
        match self.advance() {
            Token::Null => Ok(Expr::Null),
            Token::True => Ok(Expr::Bool(true)),
            Token::False => Ok(Expr::Bool(false)),
            Token::Num(n) => Ok(Expr::Num(n)),
            Token::Str(s) => Ok(Expr::Str(s)),
            Token::Ident(name) => Ok(Expr::Field(name)),
            Token::Var(name) => Ok(Expr::Var(name)),
            Token::Star => Ok(Expr::Wildcard),
            Token::Minus => {
                let operand = self.parse_expr(70)?;
                Ok(Expr::Neg(Box::new(operand)))
            }
            Token::LParen => {
                let inner = self.parse_expr(0)?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Token::LBracket => {
                let mut items = Vec::new();
                if self.current() != &Token::RBracket {
                    loop {
                        items.push(self.parse_expr(0)?);
                        if self.current() == &Token::Comma {
                            self.advance();
                        } else {
                            break;
                        }
                    }
                }
                self.expect(&Token::RBracket)?;
                Ok(Expr::Array(items))
            }
            Token::LBrace => self.object_constructor(),
            Token::Function => self.lambda(),
            other => Err(format!("unexpected token {:?}", other)),
        }
    }

    fn led(&mut self, left: Expr) -> Result<Expr, String> {
        match self.advance() {
            Token::Dot => {
                let step = self.parse_expr(75)?;
                Ok(Expr::Map(Box::new(left), Box::new(step)))
            }
            Token::LBracket => {
                let pred = self.parse_expr(0)?;
                self.expect(&Token::RBracket)?;
                Ok(Expr::Predicate(Box::new(left), Box::new(pred)))
            }
            Token::LParen => {
                let name = match left {
                    Expr::Var(name) if !name.is_empty() && name != "$" => name,
                    other => return Err(format!("{:?} is not callable", other)),
                };
                let mut args = Vec::new();
                if self.current() != &Token::RParen {
                    loop {
                        args.push(self.parse_expr(0)?);
                        if self.current() == &Token::Comma {
                            self.advance();
                        } else {
                            break;
                        }
                    }
                }
                self.expect(&Token::RParen)?;
                Ok(Expr::Call { name, args })
            }
            Token::Question => {
                let then = self.parse_expr(0)?;
                let otherwise = if self.current() == &Token::Colon {
                    self.advance();
                    Some(Box::new(self.parse_expr(0)?))
                } else {
                    None
                };
                Ok(Expr::Conditional {
                    cond: Box::new(left),
                    then: Box::new(then),
                    otherwise,
                })
            }
            token => {
                let (op, bp) = match token {
                    Token::Or => (BinOp::Or, 25),
                    Token::And => (BinOp::And, 30),
                    Token::Eq => (BinOp::Eq, 40),
                    Token::Ne => (BinOp::Ne, 40),
                    Token::Lt => (BinOp::Lt, 40),
                    Token::Le => (BinOp::Le, 40),
                    Token::Gt => (BinOp::Gt, 40),
                    Token::Ge => (BinOp::Ge, 40),
                    Token::In => (BinOp::In, 40),
                    Token::Plus => (BinOp::Add, 50),
                    Token::Minus => (BinOp::Sub, 50),
                    Token::Amp => (BinOp::Concat, 50),
                    Token::Star => (BinOp::Mul, 60),
                    Token::Slash => (BinOp::Div, 60),
                    Token::Percent => (BinOp::Mod, 60),
                    other => return Err(format!("unexpected operator {:?}", other)),
                };
                let rhs = self.parse_expr(bp)?;
                Ok(Expr::Binary {
                    op,
                    lhs: Box::new(left),
                    rhs: Box::new(rhs),
                })
            }
        }
    }

    fn object_constructor(&mut self) -> Result<Expr, String> {
        let mut pairs = Vec::new();
        if self.current() != &Token::RBrace {
            loop {
                let key = self.parse_expr(0)?;
                self.expect(&Token::Colon)?;
                let value = self.parse_expr(0)?;
                pairs.push((key, value));
                if self.current() == &Token::Comma {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.expect(&Token::RBrace)?;
        Ok(Expr::Object(pairs))
    }

    fn lambda(&mut self) -> Result<Expr, String> {
        self.expect(&Token::LParen)?;
        let mut params = Vec::new();
        if self.current() != &Token::RParen {
            loop {
                match self.advance() {
                    Token::Var(name) if !name.is_empty() => params.push(name),
                    other => return Err(format!("expected lambda parameter, found {:?}", other)),
                }
                if self.current() == &Token::Comma {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.expect(&Token::RParen)?;
        self.expect(&Token::LBrace)?;
        let body = self.parse_expr(0)?;
        self.expect(&Token::RBrace)?;
        Ok(Expr::Lambda {
            params,
            body: Box::new(body),
        })
    }
}

/// Parse a token stream into an expression tree.
pub fn parse(tokens: Vec<Token>) -> Result<Expr, String> {
    if tokens.is_empty() || tokens == [Token::Eof] {
        return Err("empty expression".to_string());
    }
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_expr(0)?;
    if parser.current() != &Token::Eof {
        return Err(format!(
            "unexpected trailing token {:?}",
            parser.current()
        ));
    }
    Ok(expr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jsonata::lexer::tokenize;

    fn parse_src(src: &str) -> Expr {
        parse(tokenize(src).unwrap()).unwrap()
    }

    #[test]
    fn path_binds_tighter_than_concat() {
        let expr = parse_src("a.b & c");
        match expr {
            Expr::Binary { op: BinOp::Concat, lhs, .. } => {
                assert!(matches!(*lhs, Expr::Map(_, _)));
            }
            other => panic!("unexpected tree: {:?}", other),
        }
    }

    #[test]
    fn predicate_attaches_to_path_head() {
        let expr = parse_src("items[price > 10].name");
        match expr {
            Expr::Map(head, _) => assert!(matches!(*head, Expr::Predicate(_, _))),
            other => panic!("unexpected tree: {:?}", other),
        }
    }

    #[test]
    fn conditional_with_optional_else() {
        assert!(matches!(
            parse_src("a ? b"),
            Expr::Conditional { otherwise: None, .. }
        ));
        assert!(matches!(
            parse_src("a ? b : c"),
            Expr::Conditional { otherwise: Some(_), .. }
        ));
    }

    #[test]
    fn lambda_params() {
        let expr = parse_src("$map(xs, function($v, $i) { $v })");
        match expr {
            Expr::Call { name, args } => {
                assert_eq!(name, "map");
                assert!(matches!(&args[1], Expr::Lambda { params, .. } if params.len() == 2));
            }
            other => panic!("unexpected tree: {:?}", other),
        }
    }

    #[test]
    fn trailing_tokens_rejected() {
        assert!(parse(tokenize("a b").unwrap()).is_err());
    }
}

//! The s-expression AST: `EXPR := ATOM | (ATOM EXPR*)` (spec §4.2).

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Atom(String),
    List(Vec<Expr>),
}

impl Expr {
    pub fn head(&self) -> Option<&str> {
        match self {
            Expr::List(items) => items.first().and_then(|e| e.atom()),
            Expr::Atom(_) => None,
        }
    }

    pub fn atom(&self) -> Option<&str> {
        match self {
            Expr::Atom(s) => Some(s),
            Expr::List(_) => None,
        }
    }

    pub fn args(&self) -> &[Expr] {
        match self {
            Expr::List(items) => &items[1..],
            Expr::Atom(_) => &[],
        }
    }
}

pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut chars = text.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c == '(' || c == ')' {
            tokens.push(c.to_string());
            chars.next();
        } else {
            let mut s = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() || c == '(' || c == ')' {
                    break;
                }
                s.push(c);
                chars.next();
            }
            tokens.push(s);
        }
    }
    tokens
}

pub fn parse(text: &str) -> Expr {
    let tokens = tokenize(text);
    let mut pos = 0;
    let expr = parse_expr(&tokens, &mut pos);
    assert_eq!(pos, tokens.len(), "trailing tokens after parsing pattern `{text}`");
    expr
}

fn parse_expr(tokens: &[String], pos: &mut usize) -> Expr {
    let tok = tokens.get(*pos).unwrap_or_else(|| panic!("unexpected end of pattern"));
    if tok == "(" {
        *pos += 1;
        let mut items = Vec::new();
        while tokens.get(*pos).map(|t| t.as_str()) != Some(")") {
            items.push(parse_expr(tokens, pos));
        }
        *pos += 1; // consume ')'
        Expr::List(items)
    } else {
        *pos += 1;
        Expr::Atom(tok.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_lists() {
        let e = parse("(add x 'a)");
        assert_eq!(e.head(), Some("add"));
        assert_eq!(e.args().len(), 2);
    }
}

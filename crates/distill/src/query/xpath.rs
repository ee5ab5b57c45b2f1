// ABOUTME: Compiles the XPath subset used by site profiles into CSS selector lists.
// ABOUTME: Supports descendant/child steps, attribute predicates, positional indexes, unions and trailing /@attr.

//! XPath-to-CSS compilation.
//!
//! Site profiles written in the FiveFilters style locate content with XPath 1.0
//! expressions. Almost all of them fall inside a small subset that has a direct
//! CSS equivalent:
//!
//! - `//tag`, `/tag`, `.//tag` and `*` node tests
//! - `[@attr]`, `[@attr='v']`, `[@attr!='v']`
//! - `contains(@attr, 'v')`, `starts-with(@attr, 'v')`
//! - the class-word idiom `contains(concat(' ', normalize-space(@class), ' '), ' v ')`
//! - `and`, `or`, `not(...)`, and `[N]` or `[last()]` as the first predicate of a step
//! - a trailing `/@attr` step (attribute value result) or `/text()`
//! - top-level `|` unions
//!
//! Anything else (text predicates, axes, arithmetic) is rejected with a
//! [`RuleError`] so the caller can log and skip the rule.

use super::RuleError;

/// One compiled union branch: a CSS selector and an optional attribute to read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CssBranch {
    pub css: String,
    pub attr: Option<String>,
}

/// Returns true when a rule string should be read as XPath rather than CSS.
pub fn looks_like_xpath(rule: &str) -> bool {
    let r = rule.trim_start();
    r.starts_with('/') || r.starts_with("./") || r.starts_with('(')
}

/// Compiles an XPath expression into one CSS branch per union member.
pub fn compile(rule: &str) -> Result<Vec<CssBranch>, RuleError> {
    let trimmed = rule.trim();
    if trimmed.is_empty() {
        return Err(RuleError::Empty);
    }
    let mut branches = Vec::new();
    for part in split_top_level(trimmed, '|') {
        let part = strip_outer_parens(part.trim());
        if part.is_empty() {
            return Err(unsupported(rule, "empty union member"));
        }
        branches.push(compile_path(rule, part)?);
    }
    Ok(branches)
}

fn unsupported(rule: &str, reason: impl Into<String>) -> RuleError {
    RuleError::Unsupported {
        rule: rule.to_string(),
        reason: reason.into(),
    }
}

fn strip_outer_parens(s: &str) -> &str {
    let mut s = s;
    while s.starts_with('(') && s.ends_with(')') && closing_paren(s, 0) == Some(s.len() - 1) {
        s = s[1..s.len() - 1].trim();
    }
    s
}

fn closing_paren(s: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    for (i, c) in s.char_indices().skip_while(|(i, _)| *i < open) {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '\'' | '"' => quote = Some(c),
                '(' => depth += 1,
                ')' => {
                    depth = depth.checked_sub(1)?;
                    if depth == 0 {
                        return Some(i);
                    }
                }
                _ => {}
            },
        }
    }
    None
}

/// Splits on `sep` where it is outside quotes, brackets and parentheses.
fn split_top_level(s: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '\'' | '"' => quote = Some(c),
                '[' | '(' => depth += 1,
                ']' | ')' => depth -= 1,
                c if c == sep && depth == 0 => {
                    parts.push(&s[start..i]);
                    start = i + c.len_utf8();
                }
                _ => {}
            },
        }
    }
    parts.push(&s[start..]);
    parts
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    Descendant,
    Child,
}

fn compile_path(rule: &str, path: &str) -> Result<CssBranch, RuleError> {
    let (mut rest, first) = if let Some(r) = path.strip_prefix(".//") {
        (r, Combinator::Descendant)
    } else if let Some(r) = path.strip_prefix("//") {
        (r, Combinator::Descendant)
    } else if path.starts_with("./") {
        return Err(unsupported(rule, "relative child steps need a context node"));
    } else if let Some(r) = path.strip_prefix('/') {
        (r, Combinator::Child)
    } else {
        return Err(unsupported(rule, "path must start with / or //"));
    };

    let mut steps: Vec<(Combinator, &str)> = Vec::new();
    let mut combinator = first;
    loop {
        let end = step_end(rest);
        steps.push((combinator, &rest[..end]));
        rest = &rest[end..];
        if rest.is_empty() {
            break;
        }
        if let Some(r) = rest.strip_prefix("//") {
            combinator = Combinator::Descendant;
            rest = r;
        } else if let Some(r) = rest.strip_prefix('/') {
            combinator = Combinator::Child;
            rest = r;
        }
    }

    let mut attr = None;
    let mut alternatives: Vec<String> = vec![String::new()];
    let last = steps.len() - 1;
    for (idx, (comb, step)) in steps.iter().enumerate() {
        let step = step.trim();
        if let Some(name) = step.strip_prefix('@') {
            if idx != last || !is_name(name) {
                return Err(unsupported(rule, format!("attribute step `{}`", step)));
            }
            attr = Some(name.to_ascii_lowercase());
            continue;
        }
        if step == "text()" {
            if idx != last {
                return Err(unsupported(rule, "text() must be the final step"));
            }
            continue;
        }
        let compiled = compile_step(rule, step)?;
        let mut next = Vec::with_capacity(alternatives.len() * compiled.len());
        for prefix in &alternatives {
            for c in &compiled {
                let joined = if prefix.is_empty() {
                    c.clone()
                } else {
                    match comb {
                        Combinator::Descendant => format!("{} {}", prefix, c),
                        Combinator::Child => format!("{} > {}", prefix, c),
                    }
                };
                next.push(joined);
            }
        }
        alternatives = next;
    }

    if alternatives.iter().all(|a| a.is_empty()) {
        // `//@href` style: attribute on any element.
        alternatives = vec!["*".to_string()];
    }
    let css = alternatives
        .into_iter()
        .map(|a| {
            if let Some(ref name) = attr {
                format!("{}[{}]", a, name)
            } else {
                a
            }
        })
        .collect::<Vec<_>>()
        .join(", ");
    Ok(CssBranch { css, attr })
}

fn step_end(s: &str) -> usize {
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    for (i, c) in s.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '\'' | '"' => quote = Some(c),
                '[' | '(' => depth += 1,
                ']' | ')' => depth -= 1,
                '/' if depth == 0 => return i,
                _ => {}
            },
        }
    }
    s.len()
}

fn is_name(s: &str) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Compiles one location step (node test plus predicates) into CSS alternatives.
fn compile_step(rule: &str, step: &str) -> Result<Vec<String>, RuleError> {
    if step.contains("::") {
        return Err(unsupported(rule, format!("axis in step `{}`", step)));
    }
    let name_end = step.find('[').unwrap_or(step.len());
    let name = step[..name_end].trim();
    let star = name == "*" || name == "node()";
    let tag = if star {
        String::new()
    } else if is_name(name) {
        name.to_ascii_lowercase()
    } else {
        return Err(unsupported(rule, format!("node test `{}`", name)));
    };

    let mut alternatives = vec![tag.clone()];
    let mut rest = &step[name_end..];
    let mut first = true;
    while !rest.is_empty() {
        if !rest.starts_with('[') {
            return Err(unsupported(rule, format!("trailing text `{}`", rest)));
        }
        let close = matching_bracket(rest)
            .ok_or_else(|| unsupported(rule, "unbalanced predicate brackets"))?;
        let expr = &rest[1..close];
        let pred = Parser::new(rule, expr).parse()?;
        // CSS can only count siblings of the node test, which matches XPath
        // position only when nothing has filtered the step before it.
        if pred.mentions_position() && !(first && pred.is_position()) {
            return Err(unsupported(
                rule,
                format!("position filter after another predicate in `{}`", step),
            ));
        }
        let compiled = pred.to_css(star);
        let mut next = Vec::with_capacity(alternatives.len() * compiled.len());
        for prefix in &alternatives {
            for c in &compiled {
                next.push(format!("{}{}", prefix, c));
            }
        }
        alternatives = next;
        rest = &rest[close + 1..];
        first = false;
    }

    Ok(alternatives
        .into_iter()
        .map(|a| if a.is_empty() { "*".to_string() } else { a })
        .collect())
}

fn matching_bracket(s: &str) -> Option<usize> {
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    for (i, c) in s.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '\'' | '"' => quote = Some(c),
                '[' => depth += 1,
                ']' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(i);
                    }
                }
                _ => {}
            },
        }
    }
    None
}

/// A parsed predicate expression.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Pred {
    Or(Vec<Pred>),
    And(Vec<Pred>),
    Not(Box<Pred>),
    Position(usize),
    Last,
    HasAttr(String),
    AttrEq(String, String),
    AttrNe(String, String),
    AttrContains(String, String),
    AttrWord(String, String),
    AttrPrefix(String, String),
}

fn css_quote(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{}\"", escaped)
}

impl Pred {
    fn is_position(&self) -> bool {
        matches!(self, Pred::Position(_) | Pred::Last)
    }

    fn mentions_position(&self) -> bool {
        match self {
            Pred::Position(_) | Pred::Last => true,
            Pred::Or(items) | Pred::And(items) => items.iter().any(Pred::mentions_position),
            Pred::Not(inner) => inner.mentions_position(),
            _ => false,
        }
    }

    /// CSS alternatives whose union is equivalent to the predicate.
    fn to_css(&self, star: bool) -> Vec<String> {
        match self {
            Pred::Or(items) => items.iter().flat_map(|p| p.to_css(star)).collect(),
            Pred::And(items) => {
                let mut acc = vec![String::new()];
                for item in items {
                    let alts = item.to_css(star);
                    acc = acc
                        .iter()
                        .flat_map(|a| alts.iter().map(move |b| format!("{}{}", a, b)))
                        .collect();
                }
                acc
            }
            Pred::Not(inner) => vec![inner
                .to_css(star)
                .iter()
                .map(|a| format!(":not({})", a))
                .collect()],
            Pred::Position(n) if star => vec![format!(":nth-child({})", n)],
            Pred::Position(n) => vec![format!(":nth-of-type({})", n)],
            Pred::Last if star => vec![":last-child".to_string()],
            Pred::Last => vec![":last-of-type".to_string()],
            Pred::HasAttr(a) => vec![format!("[{}]", a)],
            Pred::AttrEq(a, v) => vec![format!("[{}={}]", a, css_quote(v))],
            Pred::AttrNe(a, v) => vec![format!(":not([{}={}])", a, css_quote(v))],
            Pred::AttrContains(a, v) => vec![format!("[{}*={}]", a, css_quote(v))],
            Pred::AttrWord(a, v) => vec![format!("[{}~={}]", a, css_quote(v))],
            Pred::AttrPrefix(a, v) => vec![format!("[{}^={}]", a, css_quote(v))],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Name(String),
    Attr(String),
    Str(String),
    Num(usize),
    LParen,
    RParen,
    Comma,
    Eq,
    NotEq,
}

fn tokenize(rule: &str, expr: &str) -> Result<Vec<Token>, RuleError> {
    let chars: Vec<char> = expr.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '=' => {
                tokens.push(Token::Eq);
                i += 1;
            }
            '!' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::NotEq);
                i += 2;
            }
            '\'' | '"' => {
                let end = chars[i + 1..]
                    .iter()
                    .position(|&x| x == c)
                    .ok_or_else(|| unsupported(rule, "unterminated string literal"))?;
                tokens.push(Token::Str(chars[i + 1..i + 1 + end].iter().collect()));
                i += end + 2;
            }
            '@' => {
                let start = i + 1;
                let mut j = start;
                while j < chars.len() && is_name_char(chars[j]) {
                    j += 1;
                }
                let name: String = chars[start..j].iter().collect();
                if name.is_empty() {
                    return Err(unsupported(rule, "empty attribute name"));
                }
                tokens.push(Token::Attr(name.to_ascii_lowercase()));
                i = j;
            }
            c if c.is_ascii_digit() => {
                let start = i;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                let digits: String = chars[start..i].iter().collect();
                let n = digits
                    .parse::<usize>()
                    .map_err(|_| unsupported(rule, "bad position index"))?;
                tokens.push(Token::Num(n));
            }
            c if c.is_ascii_alphabetic() => {
                let start = i;
                while i < chars.len() && is_name_char(chars[i]) {
                    i += 1;
                }
                tokens.push(Token::Name(chars[start..i].iter().collect()));
            }
            other => {
                return Err(unsupported(rule, format!("unexpected `{}` in predicate", other)));
            }
        }
    }
    Ok(tokens)
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

/// A value operand inside a predicate.
#[derive(Debug, Clone)]
enum Operand {
    Attr(String),
    /// `normalize-space(@a)` or `concat(' ', normalize-space(@a), ' ')`.
    Normalized { attr: String, padded: bool },
    Literal(String),
}

struct Parser<'r> {
    rule: &'r str,
    expr: &'r str,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'r> Parser<'r> {
    fn new(rule: &'r str, expr: &'r str) -> Self {
        Self {
            rule,
            expr,
            tokens: Vec::new(),
            pos: 0,
        }
    }

    fn parse(mut self) -> Result<Pred, RuleError> {
        self.tokens = tokenize(self.rule, self.expr)?;
        let pred = self.parse_or()?;
        if self.pos != self.tokens.len() {
            return Err(self.err("trailing tokens in predicate"));
        }
        Ok(pred)
    }

    fn err(&self, reason: &str) -> RuleError {
        unsupported(self.rule, format!("{} in `[{}]`", reason, self.expr))
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    fn expect(&mut self, want: Token) -> Result<(), RuleError> {
        match self.next() {
            Some(t) if t == want => Ok(()),
            _ => Err(self.err("malformed expression")),
        }
    }

    fn is_keyword(&self, kw: &str) -> bool {
        matches!(self.peek(), Some(Token::Name(n)) if n == kw)
    }

    fn parse_or(&mut self) -> Result<Pred, RuleError> {
        let mut items = vec![self.parse_and()?];
        while self.is_keyword("or") {
            self.pos += 1;
            items.push(self.parse_and()?);
        }
        Ok(if items.len() == 1 {
            items.remove(0)
        } else {
            Pred::Or(items)
        })
    }

    fn parse_and(&mut self) -> Result<Pred, RuleError> {
        let mut items = vec![self.parse_unary()?];
        while self.is_keyword("and") {
            self.pos += 1;
            items.push(self.parse_unary()?);
        }
        Ok(if items.len() == 1 {
            items.remove(0)
        } else {
            Pred::And(items)
        })
    }

    fn parse_unary(&mut self) -> Result<Pred, RuleError> {
        match self.peek().cloned() {
            Some(Token::LParen) => {
                self.pos += 1;
                let inner = self.parse_or()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Num(n)) => {
                self.pos += 1;
                if n == 0 {
                    return Err(self.err("position 0"));
                }
                Ok(Pred::Position(n))
            }
            Some(Token::Name(name)) if name == "not" => {
                self.pos += 1;
                self.expect(Token::LParen)?;
                let inner = self.parse_or()?;
                self.expect(Token::RParen)?;
                Ok(Pred::Not(Box::new(inner)))
            }
            Some(Token::Name(name)) if name == "last" => {
                self.pos += 1;
                self.expect(Token::LParen)?;
                self.expect(Token::RParen)?;
                Ok(Pred::Last)
            }
            Some(Token::Name(name)) if name == "contains" || name == "starts-with" => {
                self.pos += 1;
                self.expect(Token::LParen)?;
                let haystack = self.parse_operand()?;
                self.expect(Token::Comma)?;
                let needle = match self.parse_operand()? {
                    Operand::Literal(s) => s,
                    _ => return Err(self.err("second argument must be a string")),
                };
                self.expect(Token::RParen)?;
                self.string_function(&name, haystack, needle)
            }
            _ => self.parse_comparison(),
        }
    }

    fn string_function(
        &self,
        name: &str,
        haystack: Operand,
        needle: String,
    ) -> Result<Pred, RuleError> {
        match (name, haystack) {
            ("contains", Operand::Normalized { attr, padded: true }) => {
                let word = needle.trim();
                if word.is_empty() || word.contains(char::is_whitespace) {
                    return Err(self.err("class-word needle must be a single word"));
                }
                Ok(Pred::AttrWord(attr, word.to_string()))
            }
            ("contains", Operand::Attr(attr))
            | ("contains", Operand::Normalized { attr, padded: false }) => {
                Ok(Pred::AttrContains(attr, needle))
            }
            ("starts-with", Operand::Attr(attr))
            | ("starts-with", Operand::Normalized { attr, padded: false }) => {
                Ok(Pred::AttrPrefix(attr, needle))
            }
            _ => Err(self.err("string function over text content")),
        }
    }

    fn parse_comparison(&mut self) -> Result<Pred, RuleError> {
        let lhs = self.parse_operand()?;
        let attr = match lhs {
            Operand::Attr(a) | Operand::Normalized { attr: a, padded: false } => a,
            _ => return Err(self.err("comparison must start with an attribute")),
        };
        match self.peek() {
            Some(Token::Eq) | Some(Token::NotEq) => {
                let negated = self.next() == Some(Token::NotEq);
                let value = match self.parse_operand()? {
                    Operand::Literal(s) => s,
                    _ => return Err(self.err("comparison needs a string literal")),
                };
                Ok(if negated {
                    Pred::AttrNe(attr, value)
                } else {
                    Pred::AttrEq(attr, value)
                })
            }
            _ => Ok(Pred::HasAttr(attr)),
        }
    }

    fn parse_operand(&mut self) -> Result<Operand, RuleError> {
        match self.next() {
            Some(Token::Attr(a)) => Ok(Operand::Attr(a)),
            Some(Token::Str(s)) => Ok(Operand::Literal(s)),
            Some(Token::Name(name)) if name == "normalize-space" => {
                self.expect(Token::LParen)?;
                let inner = self.parse_operand()?;
                self.expect(Token::RParen)?;
                match inner {
                    Operand::Attr(attr) => Ok(Operand::Normalized {
                        attr,
                        padded: false,
                    }),
                    _ => Err(self.err("normalize-space over text content")),
                }
            }
            Some(Token::Name(name)) if name == "concat" => {
                self.expect(Token::LParen)?;
                let mut parts = vec![self.parse_operand()?];
                while self.peek() == Some(&Token::Comma) {
                    self.pos += 1;
                    parts.push(self.parse_operand()?);
                }
                self.expect(Token::RParen)?;
                let attrs: Vec<String> = parts
                    .iter()
                    .filter_map(|p| match p {
                        Operand::Attr(a) | Operand::Normalized { attr: a, .. } => Some(a.clone()),
                        Operand::Literal(_) => None,
                    })
                    .collect();
                let padding_only = parts.iter().all(|p| match p {
                    Operand::Literal(s) => s.trim().is_empty(),
                    _ => true,
                });
                if attrs.len() == 1 && padding_only {
                    Ok(Operand::Normalized {
                        attr: attrs[0].clone(),
                        padded: true,
                    })
                } else {
                    Err(self.err("unsupported concat()"))
                }
            }
            _ => Err(self.err("unsupported operand")),
        }
    }
}

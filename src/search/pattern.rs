// logcore - search/pattern.rs
//
// C8: RegularExpression / Matcher.
//
// Boolean-mode grammar is grounded on the original's `regularexpression.cpp`
// (quoted atoms substituted with generated ids, compiled via an expression
// evaluator), reimplemented here as a small hand-written recursive-descent
// parser rather than pulling in an external expression-evaluation crate —
// the grammar is four productions and doesn't warrant the dependency.

use std::sync::Arc;

use regex::{Regex, RegexBuilder};

use crate::util::error::RegexError;

#[derive(Debug, Clone, PartialEq, Eq)]
enum BoolExpr {
    Atom(usize),
    Not(Box<BoolExpr>),
    And(Box<BoolExpr>, Box<BoolExpr>),
    Or(Box<BoolExpr>, Box<BoolExpr>),
}

fn eval(expr: &BoolExpr, atom_results: &[bool]) -> bool {
    match expr {
        BoolExpr::Atom(id) => atom_results[*id],
        BoolExpr::Not(e) => !eval(e, atom_results),
        BoolExpr::And(a, b) => eval(a, atom_results) && eval(b, atom_results),
        BoolExpr::Or(a, b) => eval(a, atom_results) || eval(b, atom_results),
    }
}

#[derive(Debug)]
enum PatternKind {
    Scalar(Regex),
    Boolean { atoms: Vec<Regex>, ast: BoolExpr },
}

#[derive(Debug)]
struct CompiledPattern {
    kind: PatternKind,
    inverse: bool,
}

/// A compiled user pattern: possibly a single scalar regex, possibly a
/// boolean expression over quoted scalar atoms. Cheap to clone (an `Arc`
/// bump); `create_matcher` is what worker threads actually call.
#[derive(Debug, Clone)]
pub struct RegularExpression {
    compiled: Arc<CompiledPattern>,
}

/// Per-thread view over a compiled pattern. Stateless today (the underlying
/// `regex::Regex` is already safe to share across threads), but kept as its
/// own type so a future multi-pattern engine has somewhere to hang scratch
/// buffers without changing the call sites in `SearchEngine`.
#[derive(Debug, Clone)]
pub struct Matcher {
    compiled: Arc<CompiledPattern>,
}

impl RegularExpression {
    /// Compile `pattern` under the given flags.
    ///
    /// - `plain_text`: pattern is escaped so metacharacters are literal;
    ///   `boolean` is ignored in this case (a literal string is never a
    ///   boolean expression, see DESIGN.md).
    /// - `boolean`: pattern is parsed as a boolean expression whose atoms
    ///   are `"..."`-quoted scalar regexes (`\"` escapes a literal quote).
    /// - otherwise: pattern is a single scalar regex.
    pub fn compile(
        pattern: &str,
        case_sensitive: bool,
        inverse: bool,
        boolean: bool,
        plain_text: bool,
    ) -> Result<Self, RegexError> {
        let kind = if plain_text {
            let escaped = regex::escape(pattern);
            PatternKind::Scalar(build_regex(&escaped, case_sensitive)?)
        } else if boolean {
            compile_boolean(pattern, case_sensitive)?
        } else {
            PatternKind::Scalar(build_regex(pattern, case_sensitive)?)
        };

        Ok(Self {
            compiled: Arc::new(CompiledPattern { kind, inverse }),
        })
    }

    pub fn create_matcher(&self) -> Matcher {
        Matcher {
            compiled: Arc::clone(&self.compiled),
        }
    }
}

impl Matcher {
    pub fn has_match(&self, line: &str) -> bool {
        let raw = match &self.compiled.kind {
            PatternKind::Scalar(re) => re.is_match(line),
            PatternKind::Boolean { atoms, ast } => {
                let results: Vec<bool> = atoms.iter().map(|re| re.is_match(line)).collect();
                eval(ast, &results)
            }
        };
        raw ^ self.compiled.inverse
    }
}

fn build_regex(pattern: &str, case_sensitive: bool) -> Result<Regex, RegexError> {
    RegexBuilder::new(pattern)
        .case_insensitive(!case_sensitive)
        .build()
        .map_err(|source| RegexError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })
}

fn compile_boolean(pattern: &str, case_sensitive: bool) -> Result<PatternKind, RegexError> {
    let (rewritten, atom_sources) = extract_atoms(pattern)?;
    let tokens = tokenize(&rewritten)?;

    let mut parser = Parser { tokens: &tokens, pos: 0 };
    let ast = parser.parse_expr()?;
    if parser.pos != tokens.len() {
        return Err(RegexError::MalformedExpression {
            reason: "trailing tokens after a complete expression".to_string(),
        });
    }

    let mut atoms = Vec::with_capacity(atom_sources.len());
    for src in &atom_sources {
        atoms.push(build_regex(src, case_sensitive)?);
    }

    Ok(PatternKind::Boolean { atoms, ast })
}

/// Scan `pattern` for `"..."`-quoted atoms (escape `\"`), replacing each
/// with an `@N@` placeholder token and returning the rewritten expression
/// text alongside the extracted atom source strings, indexed by `N`.
fn extract_atoms(pattern: &str) -> Result<(String, Vec<String>), RegexError> {
    let mut rewritten = String::new();
    let mut atoms = Vec::new();
    let mut chars = pattern.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '"' {
            rewritten.push(c);
            continue;
        }
        let mut atom = String::new();
        let mut closed = false;
        while let Some(nc) = chars.next() {
            if nc == '\\' {
                match chars.peek() {
                    Some('"') => {
                        atom.push('"');
                        chars.next();
                    }
                    _ => atom.push('\\'),
                }
            } else if nc == '"' {
                closed = true;
                break;
            } else {
                atom.push(nc);
            }
        }
        if !closed {
            return Err(RegexError::UnbalancedQuotes);
        }
        let id = atoms.len();
        atoms.push(atom);
        rewritten.push('@');
        rewritten.push_str(&id.to_string());
        rewritten.push('@');
    }

    Ok((rewritten, atoms))
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Atom(usize),
    Not,
    And,
    Or,
    LParen,
    RParen,
}

fn tokenize(rewritten: &str) -> Result<Vec<Token>, RegexError> {
    let mut tokens = Vec::new();
    let mut chars = rewritten.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '!' => {
                tokens.push(Token::Not);
                chars.next();
            }
            '&' => {
                tokens.push(Token::And);
                chars.next();
            }
            '|' => {
                tokens.push(Token::Or);
                chars.next();
            }
            '(' => {
                tokens.push(Token::LParen);
                chars.next();
            }
            ')' => {
                tokens.push(Token::RParen);
                chars.next();
            }
            '@' => {
                chars.next();
                let mut digits = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() {
                        digits.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if chars.next() != Some('@') {
                    return Err(RegexError::MalformedExpression {
                        reason: "unterminated atom reference".to_string(),
                    });
                }
                let id: usize = digits.parse().map_err(|_| RegexError::MalformedExpression {
                    reason: "malformed atom reference".to_string(),
                })?;
                tokens.push(Token::Atom(id));
            }
            other => {
                return Err(RegexError::UnknownToken { token: other.to_string() });
            }
        }
    }

    Ok(tokens)
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<&Token> {
        let t = self.tokens.get(self.pos);
        self.pos += 1;
        t
    }

    // Precedence, high to low: `!`, `&`, `|`.
    fn parse_expr(&mut self) -> Result<BoolExpr, RegexError> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<BoolExpr, RegexError> {
        let mut left = self.parse_and()?;
        while matches!(self.peek(), Some(Token::Or)) {
            self.pos += 1;
            let right = self.parse_and()?;
            left = BoolExpr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<BoolExpr, RegexError> {
        let mut left = self.parse_unary()?;
        while matches!(self.peek(), Some(Token::And)) {
            self.pos += 1;
            let right = self.parse_unary()?;
            left = BoolExpr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<BoolExpr, RegexError> {
        if matches!(self.peek(), Some(Token::Not)) {
            self.pos += 1;
            let inner = self.parse_unary()?;
            return Ok(BoolExpr::Not(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<BoolExpr, RegexError> {
        match self.bump() {
            Some(Token::Atom(id)) => Ok(BoolExpr::Atom(*id)),
            Some(Token::LParen) => {
                let inner = self.parse_expr()?;
                match self.bump() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(RegexError::MalformedExpression {
                        reason: "missing closing parenthesis".to_string(),
                    }),
                }
            }
            _ => Err(RegexError::MalformedExpression {
                reason: "expected an atom or '('".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches(pattern: &str, boolean: bool, case_sensitive: bool, inverse: bool, line: &str) -> bool {
        let re = RegularExpression::compile(pattern, case_sensitive, inverse, boolean, false).unwrap();
        re.create_matcher().has_match(line)
    }

    #[test]
    fn scalar_pattern_matches() {
        assert!(matches("this is line", false, true, false, "this is line 000042"));
    }

    #[test]
    fn plain_text_escapes_metacharacters() {
        let re = RegularExpression::compile("a.b", true, false, false, true).unwrap();
        assert!(re.create_matcher().has_match("xa.bx"));
        assert!(!re.create_matcher().has_match("xaxbx"));
    }

    #[test]
    fn boolean_and_not_combination() {
        let line = "\"This\" is matching pattern";
        let pattern = r#"("not_match" | "match") & !("pattern")"#;
        assert!(!matches(pattern, true, false, false, line));
    }

    #[test]
    fn boolean_or_matches() {
        let line = "\"This\" is matching pattern";
        assert!(matches(r#""not_match" | "match""#, true, false, false, line));
    }

    #[test]
    fn boolean_atom_with_escaped_quote() {
        let line = "\"This\" is matching pattern";
        assert!(matches(r#""\"This\"""#, true, false, false, line));
    }

    #[test]
    fn unbalanced_quote_is_invalid_regex() {
        let err = RegularExpression::compile(r#""not_match" | "match"#, true, false, true, false)
            .unwrap_err();
        assert!(matches!(err, RegexError::UnbalancedQuotes));
    }

    #[test]
    fn inverse_flips_result() {
        assert!(!matches("foo", false, true, true, "foo bar"));
        assert!(matches("foo", false, true, true, "nothing here"));
    }

    #[test]
    fn unknown_operator_token_is_rejected() {
        let err = RegularExpression::compile(r#""a" ^ "b""#, true, false, true, false).unwrap_err();
        assert!(matches!(err, RegexError::UnknownToken { .. }));
    }

    #[test]
    fn unbalanced_parentheses_are_malformed() {
        let err = RegularExpression::compile(r#"("a""#, true, false, true, false).unwrap_err();
        assert!(matches!(err, RegexError::MalformedExpression { .. }));
    }
}

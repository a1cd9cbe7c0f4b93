//! Recursive-descent parser for review queries.
//!
//! ```text
//! query       := disjunction?
//! disjunction := conjunction ("OR" conjunction)*
//! conjunction := negation ("AND"? negation)*
//! negation    := ("NOT" | "-")* atom
//! atom        := value | OPERATOR operand | "(" disjunction ")"
//! operand     := value | "(" disjunction ")"
//! value       := WORD | "phrase" | {exact value}
//! ```
//!
//! An operator in front of a group applies to every unscoped value in the
//! group, so `owner:(alice OR bob)` reads as `owner:alice OR owner:bob`.

use std::{iter::Peekable, vec};

use crate::{
    ast::QueryExpr,
    error::{QueryError, QueryErrorKind},
    lexer::{Token, TokenKind, tokenize},
};

/// Parser state over the tokens of one query.
struct Parser<'q> {
    /// Query text, for error context.
    query: &'q str,
    /// Remaining tokens.
    tokens: Peekable<vec::IntoIter<Token>>,
}

impl Parser<'_> {
    /// Creates an error at `offset`.
    fn error(&self, kind: QueryErrorKind, offset: usize) -> QueryError {
        QueryError::new(kind, offset, self.query)
    }

    /// Consumes the next token if it is `kind`.
    fn eat(&mut self, kind: &TokenKind) -> bool {
        self.tokens.next_if(|token| token.kind == *kind).is_some()
    }

    /// Returns true if the next token can begin another conjunct.
    fn at_term(&mut self) -> bool {
        self.tokens.peek().is_some_and(|token| {
            !matches!(
                token.kind,
                TokenKind::And | TokenKind::Or | TokenKind::Close
            )
        })
    }

    /// Parses branches joined by `OR`.
    fn disjunction(&mut self) -> Result<QueryExpr, QueryError> {
        let mut branches = vec![self.conjunction()?];
        while self.eat(&TokenKind::Or) {
            branches.push(self.conjunction()?);
        }
        Ok(QueryExpr::or(branches))
    }

    /// Parses adjacent or `AND`-joined terms.
    fn conjunction(&mut self) -> Result<QueryExpr, QueryError> {
        let mut terms = vec![self.negation()?];
        loop {
            let explicit = self.eat(&TokenKind::And);
            if !explicit && !self.at_term() {
                break;
            }
            terms.push(self.negation()?);
        }
        Ok(QueryExpr::and(terms))
    }

    /// Parses any number of negations in front of an atom.
    fn negation(&mut self) -> Result<QueryExpr, QueryError> {
        let mut depth = 0;
        while self.eat(&TokenKind::Not) {
            depth += 1;
        }
        let mut expr = self.atom()?;
        for _ in 0..depth {
            expr = QueryExpr::Not(Box::new(expr));
        }
        Ok(expr)
    }

    /// Parses the next atom.
    fn atom(&mut self) -> Result<QueryExpr, QueryError> {
        match self.tokens.next() {
            Some(token) => self.primary(token),
            None => Err(self.error(QueryErrorKind::UnexpectedEnd, self.query.trim_end().len())),
        }
    }

    /// Parses the atom starting with `token`.
    fn primary(&mut self, token: Token) -> Result<QueryExpr, QueryError> {
        let Token { kind, offset } = token;
        match kind {
            TokenKind::Word(word) => Ok(QueryExpr::Term(word)),
            TokenKind::Braced(value) if value.is_empty() => {
                Err(self.error(QueryErrorKind::EmptyValue, offset))
            }
            TokenKind::Braced(value) => Ok(QueryExpr::Term(value)),
            TokenKind::Quoted(text) => {
                let words: Vec<String> = text.split_whitespace().map(str::to_owned).collect();
                if words.is_empty() {
                    return Err(self.error(QueryErrorKind::EmptyValue, offset));
                }
                Ok(QueryExpr::Phrase(words))
            }
            TokenKind::Operator(name) => self.operand(name, offset),
            TokenKind::Open => self.group(offset),
            TokenKind::Not => Ok(QueryExpr::Not(Box::new(self.atom()?))),
            TokenKind::Close => Err(self.error(QueryErrorKind::StrayClose, offset)),
            TokenKind::And => Err(self.error(
                QueryErrorKind::DanglingKeyword { keyword: "AND" },
                offset,
            )),
            TokenKind::Or => Err(self.error(
                QueryErrorKind::DanglingKeyword { keyword: "OR" },
                offset,
            )),
        }
    }

    /// Parses the value or group after operator `name`.
    fn operand(&mut self, name: String, offset: usize) -> Result<QueryExpr, QueryError> {
        let next = self.tokens.next_if(|token| {
            matches!(
                token.kind,
                TokenKind::Word(_) | TokenKind::Quoted(_) | TokenKind::Braced(_) | TokenKind::Open
            )
        });
        let Some(token) = next else {
            return Err(self.error(QueryErrorKind::MissingValue { operator: name }, offset));
        };
        if token.kind == TokenKind::Open {
            return Ok(self.group(token.offset)?.scoped(&name));
        }
        Ok(QueryExpr::Field {
            name,
            expr: Box::new(self.primary(token)?),
        })
    }

    /// Parses a group whose `(` is at `open` and has been consumed.
    fn group(&mut self, open: usize) -> Result<QueryExpr, QueryError> {
        if self.tokens.peek().is_some_and(|token| token.kind == TokenKind::Close) {
            return Err(self.error(QueryErrorKind::EmptyGroup, open));
        }
        let inner = self.disjunction()?;
        if !self.eat(&TokenKind::Close) {
            return Err(self.error(QueryErrorKind::UnclosedGroup, open));
        }
        Ok(inner)
    }
}

/// Parses a query string.
///
/// Returns `Ok(None)` if the query holds no tokens.
pub fn parse(query: &str) -> Result<Option<QueryExpr>, QueryError> {
    let tokens = tokenize(query)?;
    if tokens.is_empty() {
        return Ok(None);
    }
    let mut parser = Parser {
        query,
        tokens: tokens.into_iter().peekable(),
    };
    let expr = parser.disjunction()?;
    // Only `)` stops a top-level conjunction before the end.
    if let Some(token) = parser.tokens.next() {
        return Err(parser.error(QueryErrorKind::StrayClose, token.offset));
    }
    Ok(Some(expr))
}

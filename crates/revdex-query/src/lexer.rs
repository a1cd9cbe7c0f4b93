//! Splits query text into positioned tokens.

use crate::error::{QueryError, QueryErrorKind};

/// What a token is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    /// An unquoted word, or the raw value written after an operator.
    Word(String),
    /// The inside of a `"..."` phrase.
    Quoted(String),
    /// The inside of a `{...}` exact value.
    Braced(String),
    /// An operator name from `name:`, lowercased.
    Operator(String),
    /// `AND`
    And,
    /// `OR`
    Or,
    /// `NOT`, or `-` in front of a term.
    Not,
    /// `(`
    Open,
    /// `)`
    Close,
}

/// A token and the byte offset where it starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// Token kind and text.
    pub kind: TokenKind,
    /// Byte offset into the query.
    pub offset: usize,
}

/// Returns true for characters that end an unquoted word.
pub fn is_boundary(ch: char) -> bool {
    ch.is_whitespace() || matches!(ch, '(' | ')' | '"' | '{')
}

/// Maps a word to its boolean keyword. Keywords are upper case only.
pub fn keyword(word: &str) -> Option<TokenKind> {
    match word {
        "AND" => Some(TokenKind::And),
        "OR" => Some(TokenKind::Or),
        "NOT" => Some(TokenKind::Not),
        _ => None,
    }
}

/// Cursor over the query text.
struct Scanner<'q> {
    /// Full query text.
    query: &'q str,
    /// Byte offset of the next unread character.
    pos: usize,
    /// True directly after an operator token.
    after_operator: bool,
}

impl<'q> Scanner<'q> {
    /// Starts scanning at the beginning of `query`.
    fn new(query: &'q str) -> Self {
        Self {
            query,
            pos: 0,
            after_operator: false,
        }
    }

    /// Returns the next unread character.
    fn peek(&self) -> Option<char> {
        self.query[self.pos..].chars().next()
    }

    /// Returns the offset where the word starting at the cursor ends.
    fn word_end(&self) -> usize {
        self.query[self.pos..]
            .find(is_boundary)
            .map_or(self.query.len(), |len| self.pos + len)
    }

    /// Reads a whole word, including any `:` and `-`, as a value.
    fn value(&mut self) -> TokenKind {
        let start = self.pos;
        self.pos = self.word_end();
        TokenKind::Word(self.query[start..self.pos].to_owned())
    }

    /// Reads an operator prefix, a keyword or a plain word.
    fn word(&mut self) -> TokenKind {
        let start = self.pos;
        let end = self.word_end();
        let text = &self.query[start..end];
        if let Some(colon) = text.find(':').filter(|&colon| colon > 0) {
            self.pos = start + colon + 1;
            return TokenKind::Operator(text[..colon].to_ascii_lowercase());
        }
        self.pos = end;
        keyword(text).unwrap_or_else(|| TokenKind::Word(text.to_owned()))
    }

    /// Reads a value delimited by the one-byte `open` at the cursor and `close`.
    fn delimited(&mut self, close: char) -> Result<String, QueryError> {
        let open = self.pos;
        let body = open + 1;
        let Some(len) = self.query[body..].find(close) else {
            let kind = if close == '"' {
                QueryErrorKind::UnterminatedQuote
            } else {
                QueryErrorKind::UnterminatedBrace
            };
            return Err(QueryError::new(kind, open, self.query));
        };
        self.pos = body + len + close.len_utf8();
        Ok(self.query[body..body + len].to_owned())
    }

    /// Reads the token at the cursor, which is not whitespace.
    fn token(&mut self, ch: char, attached: bool) -> Result<TokenKind, QueryError> {
        Ok(match ch {
            '(' => {
                self.pos += 1;
                TokenKind::Open
            }
            ')' => {
                self.pos += 1;
                TokenKind::Close
            }
            '"' => TokenKind::Quoted(self.delimited('"')?),
            '{' => TokenKind::Braced(self.delimited('}')?),
            _ if attached => self.value(),
            '-' => {
                self.pos += 1;
                TokenKind::Not
            }
            _ => self.word(),
        })
    }
}

impl Iterator for Scanner<'_> {
    type Item = Result<Token, QueryError>;

    fn next(&mut self) -> Option<Self::Item> {
        let attached = self.after_operator && self.peek().is_some_and(|ch| !ch.is_whitespace());
        self.after_operator = false;

        let skipped = self.query[self.pos..]
            .find(|ch: char| !ch.is_whitespace())
            .unwrap_or(self.query.len() - self.pos);
        self.pos += skipped;

        let offset = self.pos;
        let ch = self.peek()?;
        let token = self.token(ch, attached).map(|kind| {
            self.after_operator = matches!(kind, TokenKind::Operator(_));
            Token { kind, offset }
        });
        if token.is_err() {
            self.pos = self.query.len();
        }
        Some(token)
    }
}

/// Tokenizes a query string.
pub fn tokenize(query: &str) -> Result<Vec<Token>, QueryError> {
    Scanner::new(query).collect()
}

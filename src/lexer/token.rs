use serde::{Deserialize, Serialize};

/// A single token from LR source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    /// The type of token
    pub kind: TokenKind,
    /// Original text of the token
    pub lexeme: String,
    /// Line number where token appears (1-indexed)
    pub line: usize,
    /// Column number where token starts (1-indexed)
    pub column: usize,
}

impl Token {
    /// Creates a new token with the given properties
    pub fn new(kind: TokenKind, lexeme: String, line: usize, column: usize) -> Self {
        Token {
            kind,
            lexeme,
            line,
            column,
        }
    }
}

/// All possible token types in LR
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenKind {
    // Literals
    /// String literal (quotes removed, escapes resolved)
    String(String),

    // Identifiers
    /// Identifier, possibly dotted (`os`, `k8s.pod`, `$x`)
    Identifier(String),

    /// Line comment, kept verbatim including the `//` marker
    Comment(String),

    // Delimiters
    /// Left brace {
    LeftBrace,
    /// Right brace }
    RightBrace,
    /// Left parenthesis (
    LeftParen,
    /// Right parenthesis )
    RightParen,
    /// Left bracket [
    LeftBracket,
    /// Right bracket ]
    RightBracket,
    /// Comma delimiter
    Comma,
    /// Optional marker (?)
    Question,
    /// Assignment in `option key = "value"`
    Assign,
    /// Annotation marker (@)
    At,

    // Special
    /// End of file marker
    Eof,
}

impl TokenKind {
    /// Words with a grammatical role in some position. They remain valid
    /// identifiers everywhere else, so the scanner never reserves them.
    pub const CONTEXTUAL_KEYWORDS: &'static [&'static str] = &[
        "import", "option", "private", "extend", "init", "embed", "as", "map",
    ];

    /// Check if the token is an identifier equal to `word`
    pub fn is_word(&self, word: &str) -> bool {
        matches!(self, TokenKind::Identifier(id) if id == word)
    }

    /// Check if an identifier is one of the contextual keywords
    pub fn is_keyword(&self) -> bool {
        match self {
            TokenKind::Identifier(id) => Self::CONTEXTUAL_KEYWORDS.contains(&id.as_str()),
            _ => false,
        }
    }
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            TokenKind::String(s) => write!(f, "\"{}\"", s),
            TokenKind::Identifier(id) => write!(f, "{}", id),
            TokenKind::Comment(c) => write!(f, "{}", c),
            _ => write!(f, "{:?}", self),
        }
    }
}

use super::token::{Token, TokenKind};
use crate::error::{Error, Result};

/// Scanner for LR resource definitions
pub struct LrScanner {
    /// Source code as character vector
    source: Vec<char>,
    /// File name used in error positions
    file: String,
    /// Accumulated tokens
    tokens: Vec<Token>,
    /// Start position of current token
    start: usize,
    /// Current position in source
    current: usize,
    /// Current line number (1-indexed)
    line: usize,
    /// Current column number (1-indexed)
    column: usize,
    /// Line where the current token starts
    start_line: usize,
    /// Column where the current token starts
    start_column: usize,
}

impl LrScanner {
    /// Creates a new scanner from source code
    pub fn new(source: &str) -> Self {
        Self::with_file(source, "<input>")
    }

    /// Creates a new scanner whose errors name `file`
    pub fn with_file(source: &str, file: impl Into<String>) -> Self {
        LrScanner {
            source: source.chars().collect(),
            file: file.into(),
            tokens: Vec::new(),
            start: 0,
            current: 0,
            line: 1,
            column: 1,
            start_line: 1,
            start_column: 1,
        }
    }

    /// Scans all tokens from source code and returns them as a vector
    pub fn scan_tokens(&mut self) -> Result<Vec<Token>> {
        while !self.is_at_end() {
            self.start = self.current;
            self.start_line = self.line;
            self.start_column = self.column;
            self.scan_token()?;
        }

        self.tokens.push(Token::new(
            TokenKind::Eof,
            String::new(),
            self.line,
            self.column,
        ));

        Ok(std::mem::take(&mut self.tokens))
    }

    fn scan_token(&mut self) -> Result<()> {
        let c = self.advance();

        match c {
            ' ' | '\r' | '\t' => {}
            '\n' => {
                self.line += 1;
                self.column = 1;
            }

            '/' => {
                if self.match_char('/') {
                    self.scan_comment();
                } else {
                    return Err(self.error("Unexpected character '/', comments start with `//`"));
                }
            }

            '{' => self.add_token(TokenKind::LeftBrace),
            '}' => self.add_token(TokenKind::RightBrace),
            '(' => self.add_token(TokenKind::LeftParen),
            ')' => self.add_token(TokenKind::RightParen),
            '[' => self.add_token(TokenKind::LeftBracket),
            ']' => self.add_token(TokenKind::RightBracket),
            ',' => self.add_token(TokenKind::Comma),
            '?' => self.add_token(TokenKind::Question),
            '=' => self.add_token(TokenKind::Assign),
            '@' => self.add_token(TokenKind::At),

            '"' => self.scan_string()?,

            c if is_ident_start(c) => self.scan_identifier(),

            _ => {
                return Err(self.error(format!("Unexpected character '{}'", c)));
            }
        }

        Ok(())
    }

    fn scan_comment(&mut self) {
        while !self.is_at_end() && self.peek() != '\n' {
            self.advance();
        }
        let text: String = self.source[self.start..self.current].iter().collect();
        self.add_token(TokenKind::Comment(text.trim_end().to_string()));
    }

    fn scan_string(&mut self) -> Result<()> {
        let mut value = String::new();

        while !self.is_at_end() && self.peek() != '"' {
            match self.peek() {
                '\\' => {
                    self.advance();
                    if self.is_at_end() {
                        break;
                    }
                    let escaped = self.advance();
                    match escaped {
                        'n' => value.push('\n'),
                        't' => value.push('\t'),
                        '\\' => value.push('\\'),
                        '"' => value.push('"'),
                        _ => {
                            return Err(
                                self.error(format!("Invalid escape sequence \\{}", escaped))
                            );
                        }
                    }
                }
                '\n' => return Err(self.error("Unterminated string")),
                _ => value.push(self.advance()),
            }
        }

        if self.is_at_end() {
            return Err(self.error("Unterminated string"));
        }

        self.advance(); // Closing "

        self.add_token(TokenKind::String(value));
        Ok(())
    }

    /// Identifiers may be dotted (`k8s.pod.container`); every segment must
    /// start with a letter, `_` or `$`.
    fn scan_identifier(&mut self) {
        loop {
            while is_ident_char(self.peek()) {
                self.advance();
            }
            if self.peek() == '.' && is_ident_start(self.peek_next()) {
                self.advance();
                continue;
            }
            break;
        }

        let text: String = self.source[self.start..self.current].iter().collect();
        self.add_token(TokenKind::Identifier(text));
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.source.len()
    }

    fn advance(&mut self) -> char {
        let c = self.source[self.current];
        self.current += 1;
        self.column += 1;
        c
    }

    fn peek(&self) -> char {
        if self.is_at_end() {
            '\0'
        } else {
            self.source[self.current]
        }
    }

    fn peek_next(&self) -> char {
        if self.current + 1 >= self.source.len() {
            '\0'
        } else {
            self.source[self.current + 1]
        }
    }

    fn match_char(&mut self, expected: char) -> bool {
        if self.is_at_end() || self.source[self.current] != expected {
            false
        } else {
            self.current += 1;
            self.column += 1;
            true
        }
    }

    fn add_token(&mut self, kind: TokenKind) {
        let lexeme: String = self.source[self.start..self.current].iter().collect();
        self.tokens.push(Token::new(
            kind,
            lexeme,
            self.start_line,
            self.start_column,
        ));
    }

    fn error(&self, message: impl Into<String>) -> Error {
        Error::SyntaxError {
            file: self.file.clone(),
            line: self.start_line,
            col: self.start_column,
            message: message.into(),
        }
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '$'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        LrScanner::new(source)
            .scan_tokens()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_resource_header() {
        let tokens = kinds("file { init(path string) }");
        assert_eq!(tokens.len(), 9);
        assert_eq!(tokens[0], TokenKind::Identifier("file".to_string()));
        assert_eq!(tokens[1], TokenKind::LeftBrace);
        assert_eq!(tokens[2], TokenKind::Identifier("init".to_string()));
        assert_eq!(tokens[3], TokenKind::LeftParen);
        assert_eq!(tokens[7], TokenKind::RightBrace);
        assert_eq!(tokens[8], TokenKind::Eof);
    }

    #[test]
    fn test_dotted_identifier_is_one_token() {
        let tokens = kinds("k8s.pod.container");
        assert_eq!(tokens[0], TokenKind::Identifier("k8s.pod.container".to_string()));
        assert_eq!(tokens[1], TokenKind::Eof);
    }

    #[test]
    fn test_comments_are_kept() {
        let tokens = kinds("// File on disk\nfile");
        assert_eq!(tokens[0], TokenKind::Comment("// File on disk".to_string()));
        assert_eq!(tokens[1], TokenKind::Identifier("file".to_string()));
    }

    #[test]
    fn test_optional_marker() {
        let tokens = kinds("two? string");
        assert_eq!(tokens[0], TokenKind::Identifier("two".to_string()));
        assert_eq!(tokens[1], TokenKind::Question);
    }

    #[test]
    fn test_string_and_option() {
        let tokens = kinds("option go_package = \"x/y\"");
        assert_eq!(tokens[2], TokenKind::Assign);
        assert_eq!(tokens[3], TokenKind::String("x/y".to_string()));
    }

    #[test]
    fn test_positions() {
        let tokens = LrScanner::new("a {\n  b int\n}").scan_tokens().unwrap();
        assert_eq!((tokens[2].line, tokens[2].column), (2, 3));
        assert_eq!((tokens[3].line, tokens[3].column), (2, 5));
    }

    #[test]
    fn test_unterminated_string_reports_position() {
        let err = LrScanner::with_file("import \"core.lr", "os.lr")
            .scan_tokens()
            .unwrap_err();
        match err {
            Error::SyntaxError { file, line, col, .. } => {
                assert_eq!(file, "os.lr");
                assert_eq!((line, col), (1, 8));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_unexpected_character() {
        assert!(LrScanner::new("file { size int; }").scan_tokens().is_err());
    }
}

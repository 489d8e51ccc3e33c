use super::ast::{
    BasicField, Embed, Field, FieldArgs, FieldKind, Init, ListTypeDecl, Lr, Resource,
    SimpleType, TypeExpr, TypedArg,
};
use crate::error::{Error, Result};
use crate::lexer::{Token, TokenKind};

/// Recursive descent parser for LR files
pub struct LrParser {
    tokens: Vec<Token>,
    current: usize,
    file: String,
}

impl LrParser {
    /// Creates a new parser
    pub fn new(tokens: Vec<Token>) -> Self {
        Self::with_file(tokens, "<input>")
    }

    /// Creates a new parser whose errors name `file`
    pub fn with_file(tokens: Vec<Token>, file: impl Into<String>) -> Self {
        LrParser {
            tokens,
            current: 0,
            file: file.into(),
        }
    }

    /// Parses the tokens into an AST
    pub fn parse(&mut self) -> Result<Lr> {
        let mut lr = Lr::default();

        loop {
            let comments = self.collect_comments();
            if self.is_at_end() {
                break;
            }

            if self.peek().kind.is_word("import") && matches!(self.peek_at(1), TokenKind::String(_)) {
                self.advance();
                let path = self.expect_string()?;
                lr.imports.push(path);
            } else if self.peek().kind.is_word("option")
                && matches!(self.peek_at(1), TokenKind::Identifier(_))
                && matches!(self.peek_at(2), TokenKind::Assign)
            {
                self.advance();
                let key = self.expect_identifier("option name")?;
                self.consume(TokenKind::Assign)?;
                let value = self.expect_string()?;
                lr.options.insert(key, value);
            } else {
                let resource = self.parse_resource(comments)?;
                lr.resources.push(resource);
            }
        }

        Ok(lr)
    }

    /// Parse `[private] [extend] id [@defaults("...")] [{ body }]`
    fn parse_resource(&mut self, comments: Vec<String>) -> Result<Resource> {
        let is_private = self.match_modifier("private");
        let is_extension = self.match_modifier("extend");

        let (line, column) = (self.peek().line, self.peek().column);
        let id = self.expect_identifier("resource name")?;

        let mut defaults = None;
        if self.check(&TokenKind::At) {
            self.advance();
            if !self.peek().kind.is_word("defaults") {
                return Err(self.expected_error("`defaults` after `@`", None));
            }
            self.advance();
            self.consume(TokenKind::LeftParen)?;
            defaults = Some(self.expect_string()?);
            self.consume(TokenKind::RightParen)?;
        }

        let mut resource = Resource {
            comments,
            is_private,
            is_extension,
            id,
            defaults,
            list_type: None,
            body: Vec::new(),
            line,
            column,
        };

        if self.check(&TokenKind::LeftBrace) {
            self.advance();
            self.parse_body(&mut resource)?;
        }

        Ok(resource)
    }

    fn parse_body(&mut self, resource: &mut Resource) -> Result<()> {
        let _ = self.collect_comments();
        if self.check(&TokenKind::LeftBracket) {
            resource.list_type = Some(self.parse_list_type()?);
        }

        loop {
            let comments = self.collect_comments();
            if self.check(&TokenKind::RightBrace) {
                self.advance();
                return Ok(());
            }
            if self.is_at_end() {
                return Err(self.expected_error(
                    "`}`",
                    Some(&format!("resource `{}` is never closed", resource.id)),
                ));
            }
            let field = self.parse_field(comments)?;
            resource.body.push(field);
        }
    }

    /// Parse `[]Element[(deps)]`
    fn parse_list_type(&mut self) -> Result<ListTypeDecl> {
        self.consume(TokenKind::LeftBracket)?;
        self.consume(TokenKind::RightBracket)?;
        let element = SimpleType::new(self.expect_identifier("list element type")?);
        let args = if self.check(&TokenKind::LeftParen) {
            Some(self.parse_field_args()?)
        } else {
            None
        };
        Ok(ListTypeDecl { element, args })
    }

    fn parse_field(&mut self, comments: Vec<String>) -> Result<Field> {
        let (line, column) = (self.peek().line, self.peek().column);

        let kind = if self.peek().kind.is_word("init") && self.peek_at(1) == &TokenKind::LeftParen {
            FieldKind::Init(self.parse_init()?)
        } else if self.peek().kind.is_word("embed")
            && matches!(self.peek_at(1), TokenKind::Identifier(_))
        {
            self.advance();
            let ty = self.expect_identifier("embedded resource")?;
            let alias = if self.peek().kind.is_word("as")
                && matches!(self.peek_at(1), TokenKind::Identifier(_))
            {
                self.advance();
                Some(self.expect_identifier("alias")?)
            } else {
                None
            };
            FieldKind::Embed(Embed { ty, alias })
        } else {
            FieldKind::Basic(self.parse_basic_field()?)
        };

        Ok(Field {
            comments,
            kind,
            line,
            column,
        })
    }

    /// Parse `init(name type, other? type)`
    fn parse_init(&mut self) -> Result<Init> {
        self.advance(); // consume 'init'
        self.consume(TokenKind::LeftParen)?;

        let mut args = Vec::new();
        while !self.check(&TokenKind::RightParen) {
            let id = self.expect_identifier("init argument name")?;
            let optional = if self.check(&TokenKind::Question) {
                self.advance();
                true
            } else {
                false
            };
            let ty = self.parse_type()?;
            args.push(TypedArg { id, optional, ty });

            if !self.check(&TokenKind::Comma) {
                break;
            }
            self.advance();
        }
        self.consume(TokenKind::RightParen)?;

        Ok(Init { args })
    }

    /// Parse `name [(deps)] [type]`. The type must start on the line the
    /// declaration ends on; otherwise the next line is a new field.
    fn parse_basic_field(&mut self) -> Result<BasicField> {
        let id = self.expect_identifier("field name")?;

        let args = if self.check(&TokenKind::LeftParen) {
            Some(self.parse_field_args()?)
        } else {
            None
        };

        let last_line = self.previous().line;
        let starts_type = matches!(
            self.peek().kind,
            TokenKind::Identifier(_) | TokenKind::LeftBracket
        );
        let ty = if starts_type && self.peek().line == last_line {
            Some(self.parse_type()?)
        } else {
            None
        };

        Ok(BasicField { id, args, ty })
    }

    /// Parse `([dep {, dep}])`
    fn parse_field_args(&mut self) -> Result<FieldArgs> {
        self.consume(TokenKind::LeftParen)?;
        let mut list = Vec::new();
        while !self.check(&TokenKind::RightParen) {
            list.push(SimpleType::new(self.expect_identifier("dependency")?));
            if !self.check(&TokenKind::Comma) {
                break;
            }
            self.advance();
        }
        self.consume(TokenKind::RightParen)?;
        Ok(FieldArgs { list })
    }

    /// Parse `[]T`, `map[K]V` or a simple type name
    fn parse_type(&mut self) -> Result<TypeExpr> {
        if self.check(&TokenKind::LeftBracket) {
            self.advance();
            self.consume(TokenKind::RightBracket)?;
            let inner = self.parse_type()?;
            return Ok(TypeExpr::List(Box::new(inner)));
        }

        if self.peek().kind.is_word("map") && self.peek_at(1) == &TokenKind::LeftBracket {
            self.advance();
            self.consume(TokenKind::LeftBracket)?;
            let key = match &self.peek().kind {
                TokenKind::Identifier(name) => {
                    let key = SimpleType::new(name.clone());
                    self.advance();
                    key
                }
                _ => {
                    return Err(self.expected_error(
                        "simple key type",
                        Some("map keys must be simple types, e.g. map[string]int"),
                    ))
                }
            };
            self.consume(TokenKind::RightBracket)?;
            let value = self.parse_type()?;
            return Ok(TypeExpr::Map {
                key,
                value: Box::new(value),
            });
        }

        let name = self.expect_identifier("type")?;
        Ok(TypeExpr::Simple(SimpleType::new(name)))
    }

    fn match_modifier(&mut self, word: &str) -> bool {
        // a modifier is only a modifier when a resource name follows it
        if self.peek().kind.is_word(word) && matches!(self.peek_at(1), TokenKind::Identifier(_)) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn collect_comments(&mut self) -> Vec<String> {
        let mut comments = Vec::new();
        while let TokenKind::Comment(text) = &self.peek().kind {
            comments.push(text.clone());
            self.advance();
        }
        comments
    }

    fn is_at_end(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Eof)
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.current]
    }

    /// Kind of the token `offset` positions ahead, skipping nothing
    fn peek_at(&self, offset: usize) -> &TokenKind {
        let idx = (self.current + offset).min(self.tokens.len() - 1);
        &self.tokens[idx].kind
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.current.saturating_sub(1)]
    }

    fn advance(&mut self) -> Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        self.tokens[self.current - 1].clone()
    }

    fn check(&self, kind: &TokenKind) -> bool {
        if self.is_at_end() {
            return false;
        }
        std::mem::discriminant(&self.peek().kind) == std::mem::discriminant(kind)
    }

    fn consume(&mut self, kind: TokenKind) -> Result<Token> {
        if self.check(&kind) {
            Ok(self.advance())
        } else {
            let expected = Self::token_kind_name(&kind);
            Err(self.expected_error(&expected, None))
        }
    }

    fn expect_identifier(&mut self, what: &str) -> Result<String> {
        match &self.peek().kind {
            TokenKind::Identifier(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.expected_error(what, None)),
        }
    }

    fn expect_string(&mut self) -> Result<String> {
        match &self.peek().kind {
            TokenKind::String(value) => {
                let value = value.clone();
                self.advance();
                Ok(value)
            }
            _ => Err(self.expected_error("string", None)),
        }
    }

    fn token_kind_name(kind: &TokenKind) -> String {
        match kind {
            TokenKind::LeftParen => "`(`".to_string(),
            TokenKind::RightParen => "`)`".to_string(),
            TokenKind::LeftBracket => "`[`".to_string(),
            TokenKind::RightBracket => "`]`".to_string(),
            TokenKind::LeftBrace => "`{`".to_string(),
            TokenKind::RightBrace => "`}`".to_string(),
            TokenKind::Comma => "`,`".to_string(),
            TokenKind::Question => "`?`".to_string(),
            TokenKind::Assign => "`=`".to_string(),
            TokenKind::At => "`@`".to_string(),
            TokenKind::String(_) => "string".to_string(),
            TokenKind::Identifier(name) => format!("identifier `{}`", name),
            TokenKind::Comment(_) => "comment".to_string(),
            TokenKind::Eof => "end of file".to_string(),
        }
    }

    /// Helper to create a syntax error with expected/got pattern
    fn expected_error(&self, expected: &str, hint: Option<&str>) -> Error {
        let token = self.peek();
        let got_str = Self::token_kind_name(&token.kind);

        let mut message = format!("Expected {}, found {}", expected, got_str);

        if let Some(hint) = hint {
            message.push_str("\n\nHelp: ");
            message.push_str(hint);
        }

        Error::SyntaxError {
            file: self.file.clone(),
            line: token.line,
            col: token.column,
            message,
        }
    }
}

//! Declaration extraction from preprocessed shader source.
//!
//! Only `struct` blocks, `uniform` declarations and `uniform` blocks are
//! understood. Everything else in the shader is skipped token by token.
//! Structs are extracted first, in source order, each registered in the
//! symbol table as soon as its members resolve; uniforms are extracted in
//! a second, independent pass and keep their type names unresolved.

use crate::error::{CompilerError, Result, Span};
use crate::lexer::{SpannedToken, Token, tokenize};
use crate::types::{MAX_ARRAY_LENGTH, Member, StructType, SymbolTable, Type, resolve_type};
use crate::{bail_construct_at, bail_parse_at, bail_struct_at};
use log::{debug, trace};
use std::sync::Arc;

const PRECISION_QUALIFIERS: &[&str] = &["lowp", "mediump", "highp"];

/// A top-level `uniform` variable.
#[derive(Debug, Clone, PartialEq)]
pub struct UniformDecl {
    pub type_name: String,
    pub name: String,
    /// `None` for a non-array uniform.
    pub array_length: Option<usize>,
    pub span: Span,
}

/// A `uniform Name { ... } instance;` buffer block.
#[derive(Debug, Clone, PartialEq)]
pub struct UniformBlock {
    pub layout: Arc<StructType>,
    pub instance: Option<String>,
    /// The layout was already registered by an earlier, identical declaration.
    pub redeclared: bool,
    pub span: Span,
}

impl UniformBlock {
    pub fn name(&self) -> &str {
        self.layout.name()
    }
}

/// Everything extracted from one shader source.
#[derive(Debug, Clone)]
pub struct ShaderInterface {
    /// Structs first declared in this source, in declaration order.
    /// Identical re-declarations of a known struct are not repeated here.
    pub structs: Vec<Arc<StructType>>,
    pub blocks: Vec<UniformBlock>,
    pub uniforms: Vec<UniformDecl>,
    /// The incoming symbol table extended with this source's structs and blocks.
    pub symbols: SymbolTable,
}

pub struct Parser {
    tokens: Vec<SpannedToken>,
    current: usize,
}

impl Parser {
    pub fn new(tokens: Vec<SpannedToken>) -> Self {
        Parser { tokens, current: 0 }
    }

    pub fn from_source(source: &str) -> Result<Self> {
        Ok(Parser::new(tokenize(source)?))
    }

    /// Run both extraction passes. `symbols` holds structs from earlier
    /// sources and is returned extended; on error nothing is returned.
    pub fn parse(mut self, mut symbols: SymbolTable) -> Result<ShaderInterface> {
        let (structs, blocks) = self.extract_structs(&mut symbols)?;
        self.current = 0;
        let uniforms = self.extract_uniforms()?;

        Ok(ShaderInterface {
            structs,
            blocks,
            uniforms,
            symbols,
        })
    }

    /// First pass: struct declarations and uniform blocks.
    pub fn extract_structs(
        &mut self,
        symbols: &mut SymbolTable,
    ) -> Result<(Vec<Arc<StructType>>, Vec<UniformBlock>)> {
        let mut structs = Vec::new();
        let mut blocks = Vec::new();

        while !self.is_at_end() {
            match self.peek() {
                Some(Token::Struct) => {
                    if let Some(declared) = self.parse_struct_decl(symbols)? {
                        structs.push(declared);
                    }
                }
                Some(Token::Uniform) if self.uniform_is_block() => {
                    let block = self.parse_uniform_block(symbols)?;
                    blocks.push(block);
                }
                _ => {
                    self.advance();
                }
            }
        }

        Ok((structs, blocks))
    }

    /// Second pass: plain `uniform` declarations. Blocks are skipped.
    pub fn extract_uniforms(&mut self) -> Result<Vec<UniformDecl>> {
        let mut uniforms = Vec::new();

        while !self.is_at_end() {
            match self.peek() {
                Some(Token::Uniform) if self.uniform_is_block() => self.skip_uniform_block(),
                Some(Token::Uniform) => uniforms.extend(self.parse_uniform_decl()?),
                _ => {
                    self.advance();
                }
            }
        }

        Ok(uniforms)
    }

    /// `None` when the struct repeats an identical earlier declaration.
    fn parse_struct_decl(&mut self, symbols: &mut SymbolTable) -> Result<Option<Arc<StructType>>> {
        trace!("parse_struct_decl: next token = {:?}", self.peek());
        let start = self.span();
        self.expect(Token::Struct)?;

        let name = self
            .expect_identifier()
            .map_err(|e| in_struct(e, "<unnamed>"))?;
        let members = self.parse_member_block(&name, symbols)?;

        // Anything but `;` after the closing brace is a trailing token.
        if !self.check(&Token::Semicolon) {
            bail_struct_at!(self.span(), "struct {}: expected ';' after '}}', found {}", name, self.describe_next());
        }
        self.advance();

        let redeclared = symbols.contains(&name);
        let declared = StructType::new(name, members).map_err(|e| e.at(start))?;
        let declared = symbols.insert(declared).map_err(|e| e.at(start))?;
        if redeclared {
            debug!("struct {} redeclared identically", declared.name());
            return Ok(None);
        }
        debug!("registered struct {} ({} bytes)", declared.name(), declared.size());
        Ok(Some(declared))
    }

    fn parse_uniform_block(&mut self, symbols: &mut SymbolTable) -> Result<UniformBlock> {
        trace!("parse_uniform_block: next token = {:?}", self.peek());
        let start = self.span();
        self.expect(Token::Uniform)?;
        self.skip_qualifiers();

        let name = self.expect_identifier()?;
        let members = self.parse_member_block(&name, symbols)?;

        let instance = match self.peek() {
            Some(Token::Identifier(_)) => Some(self.expect_identifier()?),
            _ => None,
        };
        if self.check(&Token::LeftBracket) {
            bail_parse_at!(self.span(), "uniform block {}: arrays of blocks are not supported", name);
        }
        self.expect(Token::Semicolon)?;

        let redeclared = symbols.contains(&name);
        let layout = StructType::new(name, members).map_err(|e| e.at(start))?;
        let layout = symbols.insert(layout).map_err(|e| e.at(start))?;
        debug!("registered uniform block {} ({} bytes)", layout.name(), layout.size());
        Ok(UniformBlock {
            layout,
            instance,
            redeclared,
            span: start,
        })
    }

    /// `{ member* }` of a struct or uniform block.
    fn parse_member_block(&mut self, owner: &str, symbols: &SymbolTable) -> Result<Vec<Member>> {
        trace!("parse_member_block({}): next token = {:?}", owner, self.peek());
        self.expect(Token::LeftBrace).map_err(|e| in_struct(e, owner))?;

        let mut members = Vec::new();
        while !self.check(&Token::RightBrace) {
            if self.is_at_end() {
                return Err(CompilerError::StructParseError(
                    format!("struct {}: missing '}}'", owner),
                    self.last_span(),
                ));
            }
            members.extend(self.parse_member(owner, symbols)?);
        }
        self.advance();

        Ok(members)
    }

    /// `type name [N]? (, name [N]?)* ;`
    fn parse_member(&mut self, owner: &str, symbols: &SymbolTable) -> Result<Vec<Member>> {
        trace!("parse_member({}): next token = {:?}", owner, self.peek());
        self.skip_qualifiers();

        let type_span = self.span();
        let type_name = self.expect_identifier().map_err(|e| in_struct(e, owner))?;
        if type_name == owner {
            bail_construct_at!(type_span, "struct {} cannot contain itself", owner);
        }
        let base = resolve_type(&type_name, symbols).map_err(|_| {
            CompilerError::StructParseError(
                format!("struct {}: unknown member type '{}'", owner, type_name),
                Some(type_span),
            )
        })?;

        let mut members = Vec::new();
        loop {
            let name = self.expect_identifier().map_err(|e| in_struct(e, owner))?;
            let ty = self.parse_array_suffix(base.clone(), &name).map_err(|e| in_struct(e, owner))?;
            members.push(Member::new(ty, name));

            if !self.check(&Token::Comma) {
                break;
            }
            self.advance();
        }
        self.expect(Token::Semicolon).map_err(|e| in_struct(e, owner))?;

        Ok(members)
    }

    /// `uniform type name [N]? (, name [N]?)* ;`
    fn parse_uniform_decl(&mut self) -> Result<Vec<UniformDecl>> {
        trace!("parse_uniform_decl: next token = {:?}", self.peek());
        self.expect(Token::Uniform)?;
        self.skip_qualifiers();

        let type_name = self.expect_identifier()?;
        let mut uniforms = Vec::new();
        loop {
            let span = self.span();
            let name = self.expect_identifier()?;
            let array_length = self.parse_array_length(&name)?;
            uniforms.push(UniformDecl {
                type_name: type_name.clone(),
                name,
                array_length,
                span,
            });

            if !self.check(&Token::Comma) {
                break;
            }
            self.advance();
        }
        self.expect(Token::Semicolon)?;

        Ok(uniforms)
    }

    fn parse_array_suffix(&mut self, base: Type, name: &str) -> Result<Type> {
        let span = self.span();
        match self.parse_array_length(name)? {
            Some(length) => base.array(length).map_err(|e| e.at(span)),
            None => Ok(base),
        }
    }

    /// Optional `[N]` after the declarator `name`. A zero or oversized
    /// length is a construction error.
    fn parse_array_length(&mut self, name: &str) -> Result<Option<usize>> {
        if !self.check(&Token::LeftBracket) {
            return Ok(None);
        }
        let span = self.span();
        self.advance();

        let length = match self.peek() {
            Some(Token::IntLiteral(n)) => *n,
            _ => bail_parse_at!(self.span(), "expected array length, found {}", self.describe_next()),
        };
        self.advance();
        self.expect(Token::RightBracket)?;

        if length == 0 {
            bail_construct_at!(span, "{}: cannot have a zero-length array", name);
        }
        if length > MAX_ARRAY_LENGTH as u64 {
            bail_construct_at!(span, "{}: array length {} exceeds the maximum of {}", name, length, MAX_ARRAY_LENGTH);
        }
        if self.check(&Token::LeftBracket) {
            bail_parse_at!(self.span(), "multi-dimensional arrays are not supported");
        }
        Ok(Some(length as usize))
    }

    /// Skip `layout(...)` and precision qualifiers.
    fn skip_qualifiers(&mut self) {
        loop {
            match self.peek() {
                Some(Token::Layout) => {
                    self.advance();
                    self.skip_parenthesized();
                }
                Some(Token::Identifier(word)) if PRECISION_QUALIFIERS.contains(&word.as_str()) => {
                    self.advance();
                }
                _ => break,
            }
        }
    }

    fn skip_parenthesized(&mut self) {
        if !self.check(&Token::LeftParen) {
            return;
        }
        let mut depth = 0usize;
        while let Some(token) = self.advance() {
            match token {
                Token::LeftParen => depth += 1,
                Token::RightParen => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                _ => {}
            }
        }
    }

    /// Whether the `uniform` at the cursor opens a block.
    fn uniform_is_block(&self) -> bool {
        let mut i = self.current + 1;
        let mut depth = 0usize;
        while let Some(spanned) = self.tokens.get(i) {
            match &spanned.token {
                Token::LeftParen => depth += 1,
                Token::RightParen => depth = depth.saturating_sub(1),
                _ if depth > 0 => {}
                Token::Layout => {}
                Token::Identifier(word) if PRECISION_QUALIFIERS.contains(&word.as_str()) => {}
                Token::Identifier(_) => {
                    return matches!(self.tokens.get(i + 1).map(|t| &t.token), Some(Token::LeftBrace));
                }
                _ => return false,
            }
            i += 1;
        }
        false
    }

    fn skip_uniform_block(&mut self) {
        while let Some(token) = self.advance() {
            if *token == Token::LeftBrace {
                break;
            }
        }
        while let Some(token) = self.advance() {
            if *token == Token::RightBrace {
                break;
            }
        }
    }

    // Helper methods
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.current).map(|t| &t.token)
    }

    fn advance(&mut self) -> Option<&Token> {
        if !self.is_at_end() {
            self.current += 1;
            self.tokens.get(self.current - 1).map(|t| &t.token)
        } else {
            None
        }
    }

    fn check(&self, token: &Token) -> bool {
        if let Some(t) = self.peek() {
            std::mem::discriminant(t) == std::mem::discriminant(token)
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token) -> Result<()> {
        if self.check(&token) {
            self.advance();
            Ok(())
        } else {
            Err(CompilerError::ParseError(
                format!("expected {:?}, found {}", token, self.describe_next()),
                self.span_or_last(),
            ))
        }
    }

    fn expect_identifier(&mut self) -> Result<String> {
        match self.peek() {
            Some(Token::Identifier(name)) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(CompilerError::ParseError(
                format!("expected identifier, found {}", self.describe_next()),
                self.span_or_last(),
            )),
        }
    }

    fn describe_next(&self) -> String {
        match self.peek() {
            Some(token) => format!("{:?}", token),
            None => "end of input".to_string(),
        }
    }

    fn span(&self) -> Span {
        self.span_or_last().unwrap_or(Span::new(1, 1))
    }

    fn span_or_last(&self) -> Option<Span> {
        self.tokens.get(self.current).map(|t| t.span).or_else(|| self.last_span())
    }

    fn last_span(&self) -> Option<Span> {
        self.tokens.last().map(|t| t.span)
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.tokens.len()
    }
}

/// Re-tag a grammar error raised inside a struct body.
fn in_struct(error: CompilerError, owner: &str) -> CompilerError {
    match error {
        CompilerError::ParseError(msg, span) => {
            CompilerError::StructParseError(format!("struct {}: {}", owner, msg), span)
        }
        other => other,
    }
}

/// Parse the uniform declarations of `source` without touching struct layout.
pub fn extract_uniforms(source: &str) -> Result<Vec<UniformDecl>> {
    Parser::from_source(source)?.extract_uniforms()
}

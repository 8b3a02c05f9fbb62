//! The Shastina collaborator interface (§6b) and a minimal reference
//! tokenizer. A hardened Shastina implementation — incremental reparse,
//! span-accurate diagnostics, the radix-dictionary lookup — is out of scope;
//! `SourceTokenizer` exists to drive the CLI and the integration tests
//! end to end.

use crate::error::{InfraredError, Result};

const MODULE: &str = "script";

/// A quoted or curly-brace string literal, distinguished by surface form
/// (§4.8): quoted is text, curly-braced is a hex blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StringLit {
    Text(String),
    HexBlob(String),
}

/// The single-letter numeric suffix (§4.8, §9): pops a pointer, applies the
/// matching mutator, pushes it back. `s`=jump, `q`=seek, `r`=advance,
/// `g`=grace, `t`=tilt, `m`=moment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericSuffix {
    None,
    Section,
    Seek,
    Advance,
    Grace,
    Tilt,
    Moment,
}

impl NumericSuffix {
    fn from_char(c: char) -> Option<Self> {
        match c {
            's' => Some(Self::Section),
            'q' => Some(Self::Seek),
            'r' => Some(Self::Advance),
            'g' => Some(Self::Grace),
            't' => Some(Self::Tilt),
            'm' => Some(Self::Moment),
            _ => None,
        }
    }
}

/// One recognized entity kind (§6b).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entity {
    Str(StringLit),
    Numeric(i32, NumericSuffix),
    VarDecl(String),
    ConstDecl(String),
    Assign(String),
    Get(String),
    BeginGroup,
    EndGroup,
    Array(u32),
    Op(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedEntity {
    pub entity: Entity,
    pub script_line: i32,
}

/// The Shastina-tokenizer collaborator (§6b): yields entities one at a
/// time, or `None` at end of input.
pub trait EntitySource {
    fn next_entity(&mut self) -> Result<Option<TaggedEntity>>;
}

/// A name matching `[A-Za-z][A-Za-z0-9_]{0,30}` (§3).
fn is_valid_name(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    s.len() <= 31 && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Minimal reference tokenizer for the textual surface syntax (§4.8/§4.9):
/// `var NAME`, `const NAME` declare; `NAME=` assigns; `@NAME` gets; `[`/`]`
/// group; `#N` pushes an array count; `{..}` is a hex blob; `"..."` (with
/// `\\`/`\"` escapes) is text; a signed integer with an optional trailing
/// suffix letter is numeric; any other bare word is an operation name.
pub struct SourceTokenizer<'a> {
    rest: std::str::CharIndices<'a>,
    source: &'a str,
    line: i32,
    peeked: Option<(usize, char)>,
}

impl<'a> SourceTokenizer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            rest: source.char_indices(),
            source,
            line: 1,
            peeked: None,
        }
    }

    fn bump(&mut self) -> Option<(usize, char)> {
        let next = self.peeked.take().or_else(|| self.rest.next());
        if let Some((_, '\n')) = next {
            self.line += 1;
        }
        next
    }

    fn peek(&mut self) -> Option<(usize, char)> {
        if self.peeked.is_none() {
            self.peeked = self.rest.next();
        }
        self.peeked
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some((_, c)) if c.is_whitespace() => {
                    self.bump();
                }
                Some((_, '/')) => {
                    // A comment runs from '//' to end of line; anything
                    // short of a second '/' is just an operation token,
                    // left alone here.
                    let mut probe = self.rest.clone();
                    if probe.next().map(|(_, c)| c) == Some('/') {
                        while !matches!(self.peek(), Some((_, '\n')) | None) {
                            self.bump();
                        }
                    } else {
                        break;
                    }
                }
                _ => break,
            }
        }
    }

    fn read_quoted_text(&mut self) -> Result<String> {
        let line = self.line;
        let mut s = String::new();
        loop {
            match self.bump() {
                None => return Err(InfraredError::input(MODULE, line, "unterminated text literal")),
                Some((_, '"')) => return Ok(s),
                Some((_, '\\')) => match self.bump() {
                    Some((_, '\\')) => s.push('\\'),
                    Some((_, '"')) => s.push('"'),
                    _ => return Err(InfraredError::input(MODULE, line, "invalid escape in text literal")),
                },
                Some((_, c)) => s.push(c),
            }
        }
    }

    fn read_hex_blob(&mut self) -> Result<String> {
        let line = self.line;
        let mut s = String::new();
        loop {
            match self.bump() {
                None => return Err(InfraredError::input(MODULE, line, "unterminated hex blob")),
                Some((_, '}')) => return Ok(s),
                Some((_, c)) => s.push(c),
            }
        }
    }

    fn read_word(&mut self, first: char) -> String {
        let mut s = String::new();
        s.push(first);
        while let Some((_, c)) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                s.push(c);
                self.bump();
            } else {
                break;
            }
        }
        s
    }

    fn read_number(&mut self, first: char) -> Result<(i32, NumericSuffix)> {
        let line = self.line;
        let mut s = String::new();
        s.push(first);
        while let Some((_, c)) = self.peek() {
            if c.is_ascii_digit() {
                s.push(c);
                self.bump();
            } else {
                break;
            }
        }
        let value: i32 = s
            .parse()
            .map_err(|_| InfraredError::input(MODULE, line, format!("malformed numeric literal '{s}'")))?;
        if value == i32::MIN {
            return Err(InfraredError::input(MODULE, line, "integer literal out of representable range"));
        }
        let suffix = match self.peek() {
            Some((_, c)) if c.is_ascii_lowercase() => match NumericSuffix::from_char(c) {
                Some(suffix) => {
                    self.bump();
                    suffix
                }
                None => NumericSuffix::None,
            },
            _ => NumericSuffix::None,
        };
        Ok((value, suffix))
    }
}

impl<'a> EntitySource for SourceTokenizer<'a> {
    fn next_entity(&mut self) -> Result<Option<TaggedEntity>> {
        self.skip_trivia();
        let Some((_, c)) = self.bump() else {
            return Ok(None);
        };
        let line = self.line;

        let entity = match c {
            '"' => Entity::Str(StringLit::Text(self.read_quoted_text()?)),
            '{' => Entity::Str(StringLit::HexBlob(self.read_hex_blob()?)),
            '[' => Entity::BeginGroup,
            ']' => Entity::EndGroup,
            '@' => {
                let word = self.read_identifier_word(line)?;
                Entity::Get(word)
            }
            '#' => {
                let (n, _) = self.read_number('0')?;
                let count = u32::try_from(n).map_err(|_| InfraredError::input(MODULE, line, "array count must be >= 0"))?;
                Entity::Array(count)
            }
            c if c == '-' || c.is_ascii_digit() => {
                let (value, suffix) = self.read_number(c)?;
                Entity::Numeric(value, suffix)
            }
            c if c.is_ascii_alphabetic() => {
                let word = self.read_word(c);
                if word == "var" {
                    let name = self.read_identifier_word(line)?;
                    Entity::VarDecl(name)
                } else if word == "const" {
                    let name = self.read_identifier_word(line)?;
                    Entity::ConstDecl(name)
                } else if self.peek().map(|(_, c)| c) == Some('=') {
                    self.bump();
                    if !is_valid_name(&word) {
                        return Err(InfraredError::input(MODULE, line, format!("invalid name '{word}'")));
                    }
                    Entity::Assign(word)
                } else {
                    if !is_valid_name(&word) {
                        return Err(InfraredError::input(MODULE, line, format!("invalid operation name '{word}'")));
                    }
                    Entity::Op(word)
                }
            }
            other => return Err(InfraredError::input(MODULE, line, format!("unexpected character '{other}'"))),
        };
        Ok(Some(TaggedEntity { entity, script_line: line }))
    }
}

impl<'a> SourceTokenizer<'a> {
    fn read_identifier_word(&mut self, line: i32) -> Result<String> {
        self.skip_trivia();
        let Some((_, c)) = self.bump() else {
            return Err(InfraredError::input(MODULE, line, "expected a name"));
        };
        if !c.is_ascii_alphabetic() {
            return Err(InfraredError::input(MODULE, line, "name must start with a letter"));
        }
        let word = self.read_word(c);
        if !is_valid_name(&word) {
            return Err(InfraredError::input(MODULE, line, format!("invalid name '{word}'")));
        }
        Ok(word)
    }
}

impl std::fmt::Debug for SourceTokenizer<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SourceTokenizer(line {}, remaining: {:?})", self.line, &self.source[self.source.len().min(self.rest.as_str().len())..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokenize_all(src: &str) -> Vec<Entity> {
        let mut tok = SourceTokenizer::new(src);
        let mut out = Vec::new();
        while let Some(tagged) = tok.next_entity().unwrap() {
            out.push(tagged.entity);
        }
        out
    }

    #[test]
    fn numeric_with_suffix() {
        let entities = tokenize_all("10q");
        assert_eq!(entities, vec![Entity::Numeric(10, NumericSuffix::Seek)]);
    }

    #[test]
    fn negative_numeric_without_suffix() {
        let entities = tokenize_all("-5");
        assert_eq!(entities, vec![Entity::Numeric(-5, NumericSuffix::None)]);
    }

    #[test]
    fn quoted_text_with_escapes() {
        let entities = tokenize_all(r#""a\"b\\c""#);
        assert_eq!(entities, vec![Entity::Str(StringLit::Text("a\"b\\c".to_string()))]);
    }

    #[test]
    fn hex_blob_literal() {
        let entities = tokenize_all("{deadbeef}");
        assert_eq!(entities, vec![Entity::Str(StringLit::HexBlob("deadbeef".to_string()))]);
    }

    #[test]
    fn var_and_const_decl() {
        let entities = tokenize_all("var foo const bar");
        assert_eq!(
            entities,
            vec![Entity::VarDecl("foo".to_string()), Entity::ConstDecl("bar".to_string())]
        );
    }

    #[test]
    fn assignment_and_get() {
        let entities = tokenize_all("foo= @foo");
        assert_eq!(entities, vec![Entity::Assign("foo".to_string()), Entity::Get("foo".to_string())]);
    }

    #[test]
    fn groups_and_array_and_op() {
        let entities = tokenize_all("[ 1 2 #2 ] render");
        assert_eq!(
            entities,
            vec![
                Entity::BeginGroup,
                Entity::Numeric(1, NumericSuffix::None),
                Entity::Numeric(2, NumericSuffix::None),
                Entity::Array(2),
                Entity::EndGroup,
                Entity::Op("render".to_string()),
            ]
        );
    }

    #[test]
    fn comments_are_skipped() {
        let entities = tokenize_all("1 // a comment\n2");
        assert_eq!(entities, vec![Entity::Numeric(1, NumericSuffix::None), Entity::Numeric(2, NumericSuffix::None)]);
    }

    #[test]
    fn rejects_overlong_name() {
        let long_name = "a".repeat(40);
        let mut tok = SourceTokenizer::new(&long_name);
        assert!(tok.next_entity().is_err());
    }
}

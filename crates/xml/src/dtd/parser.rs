//! Declaration-level DTD parser.
//!
//! Understands entity and attribute-list declarations, parameter-entity
//! references between declarations, and conditional sections. Element and
//! notation declarations, comments and PIs are skipped.

use tools::chars::{is_name_char, is_name_start_char, is_nmtoken, is_pubid_char, is_whitespace, is_xml_char};
use tools::utf8::char_at;

use super::{AttributeDecl, AttributeType, DefaultDecl, DtdContext, DtdParser, EntityKind};
use crate::error::{EntityError, ErrorKind, XmlError};

/// Bound on parameter-entity nesting between declarations.
const MAX_PARAM_DEPTH: usize = 64;

#[derive(Debug, Default)]
pub struct BasicDtdParser {
    open_params: Vec<String>,
}

impl BasicDtdParser {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DtdParser for BasicDtdParser {
    fn parse_internal_subset(
        &mut self,
        ctx: &mut DtdContext<'_>,
        subset: &str,
    ) -> Result<(), XmlError> {
        self.open_params.clear();
        self.parse_block(ctx, &mut Scan::new(subset), false)
    }

    fn parse_external_subset(
        &mut self,
        ctx: &mut DtdContext<'_>,
        subset: &str,
    ) -> Result<(), XmlError> {
        self.open_params.clear();
        self.parse_block(ctx, &mut Scan::new(subset), false)
    }
}

#[derive(Clone, Copy)]
struct Loc<'t> {
    text: &'t str,
    offset: usize,
}

impl Loc<'_> {
    fn error(&self, ctx: &DtdContext<'_>, message: impl Into<String>) -> XmlError {
        ctx.error_at(self.text, self.offset, message)
    }
}

struct Scan<'s> {
    text: &'s str,
    pos: usize,
}

impl<'s> Scan<'s> {
    fn new(text: &'s str) -> Self {
        Self { text, pos: 0 }
    }

    fn bytes(&self) -> &'s [u8] {
        self.text.as_bytes()
    }

    fn at_end(&self) -> bool {
        self.pos >= self.text.len()
    }

    fn peek(&self) -> u8 {
        self.bytes().get(self.pos).copied().unwrap_or(0)
    }

    fn eat(&mut self, lit: &[u8]) -> bool {
        if self.bytes()[self.pos..].starts_with(lit) {
            self.pos += lit.len();
            true
        } else {
            false
        }
    }

    fn skip_ws(&mut self) -> bool {
        let start = self.pos;
        while self.pos < self.text.len() && is_whitespace(self.bytes()[self.pos]) {
            self.pos += 1;
        }
        self.pos > start
    }

    fn name(&mut self) -> Option<&'s str> {
        let start = self.pos;
        let (first, len) = char_at(self.bytes(), self.pos)?;
        if !is_name_start_char(first) {
            return None;
        }
        self.pos += len;
        while let Some((ch, len)) = char_at(self.bytes(), self.pos) {
            if !is_name_char(ch) {
                break;
            }
            self.pos += len;
        }
        Some(&self.text[start..self.pos])
    }

    fn nmtoken(&mut self) -> Option<&'s str> {
        let start = self.pos;
        while let Some((ch, len)) = char_at(self.bytes(), self.pos) {
            if !is_name_char(ch) {
                break;
            }
            self.pos += len;
        }
        (self.pos > start).then(|| &self.text[start..self.pos])
    }

    fn quoted(&mut self) -> Option<&'s str> {
        let quote = self.peek();
        if quote != b'"' && quote != b'\'' {
            return None;
        }
        let start = self.pos + 1;
        let len = memchr::memchr(quote, &self.bytes()[start..])?;
        self.pos = start + len + 1;
        Some(&self.text[start..start + len])
    }

    fn find(&mut self, delim: &str) -> bool {
        match memchr::memmem::find(&self.bytes()[self.pos..], delim.as_bytes()) {
            Some(at) => {
                self.pos += at + delim.len();
                true
            }
            None => false,
        }
    }
}

/// Offset of the `>` closing a markup declaration, skipping quoted literals.
fn find_decl_end(bytes: &[u8], from: usize) -> Option<usize> {
    let mut quote = 0u8;
    for (i, &b) in bytes.iter().enumerate().skip(from) {
        match b {
            b'"' | b'\'' if quote == 0 => quote = b,
            b if b == quote => quote = 0,
            b'>' if quote == 0 => return Some(i),
            _ => {}
        }
    }
    None
}

/// `%Name;` starting at `pos`, returning the name and the offset after `;`.
fn param_ref_at(text: &str, pos: usize) -> Option<(&str, usize)> {
    let bytes = text.as_bytes();
    if bytes.get(pos) != Some(&b'%') {
        return None;
    }
    let mut scan = Scan { text, pos: pos + 1 };
    let name = scan.name()?;
    scan.eat(b";").then_some((name, scan.pos))
}

impl BasicDtdParser {
    fn parse_block(
        &mut self,
        ctx: &mut DtdContext<'_>,
        scan: &mut Scan<'_>,
        in_conditional: bool,
    ) -> Result<(), XmlError> {
        loop {
            scan.skip_ws();
            let loc = Loc {
                text: scan.text,
                offset: scan.pos,
            };
            if scan.at_end() {
                if in_conditional {
                    return Err(loc.error(ctx, "unterminated conditional section"));
                }
                return Ok(());
            }
            if scan.eat(b"]]>") {
                if in_conditional {
                    return Ok(());
                }
                return Err(loc.error(ctx, "unexpected ']]>'"));
            }
            if scan.peek() == b'%' {
                let Some((name, end)) = param_ref_at(scan.text, scan.pos) else {
                    return Err(loc.error(ctx, "malformed parameter-entity reference"));
                };
                scan.pos = end;
                self.include_param_entity(ctx, name, loc)?;
                continue;
            }
            if scan.eat(b"<!--") {
                if !scan.find("-->") {
                    return Err(loc.error(ctx, "unterminated comment"));
                }
                continue;
            }
            if scan.eat(b"<?") {
                if !scan.find("?>") {
                    return Err(loc.error(ctx, "unterminated processing instruction"));
                }
                continue;
            }
            if scan.eat(b"<![") {
                if !ctx.is_external() {
                    return Err(loc.error(
                        ctx,
                        "conditional sections are not allowed in the internal subset",
                    ));
                }
                self.conditional_section(ctx, scan, loc)?;
                continue;
            }
            if scan.eat(b"<!") {
                let Some(keyword) = scan.name() else {
                    return Err(loc.error(ctx, "expected a declaration keyword"));
                };
                let Some(end) = find_decl_end(scan.bytes(), scan.pos) else {
                    return Err(loc.error(ctx, format!("unterminated {keyword} declaration")));
                };
                let raw = &scan.text[scan.pos..end];
                scan.pos = end + 1;
                let body = self.expand_decl_refs(ctx, raw, loc)?;
                match keyword {
                    "ENTITY" => self.entity_decl(ctx, &body, loc)?,
                    "ATTLIST" => self.attlist_decl(ctx, &body, loc)?,
                    "ELEMENT" | "NOTATION" => {}
                    other => {
                        return Err(loc.error(ctx, format!("unknown declaration '<!{other}'")));
                    }
                }
                continue;
            }
            return Err(loc.error(ctx, "unexpected character in DTD"));
        }
    }

    fn include_param_entity(
        &mut self,
        ctx: &mut DtdContext<'_>,
        name: &str,
        loc: Loc<'_>,
    ) -> Result<(), XmlError> {
        let Some(decl) = ctx.param_entity(name) else {
            return Err(loc.error(ctx, format!("reference to undeclared parameter entity '%{name};'")));
        };
        if self.open_params.iter().any(|open| open == name) {
            return Err(XmlError::new(ErrorKind::Entity(EntityError::Recursive {
                name: format!("%{name}"),
            })));
        }
        if self.open_params.len() >= MAX_PARAM_DEPTH {
            return Err(loc.error(ctx, "parameter entities nested too deeply"));
        }
        self.open_params.push(name.to_string());
        let result = match &decl.kind {
            EntityKind::Internal { text } => self.parse_block(ctx, &mut Scan::new(text), false),
            EntityKind::External {
                public_id,
                system_id,
            } => match ctx.open_external(public_id.as_deref(), system_id)? {
                Some(external) => ctx.with_external(external.uri, |ctx| {
                    self.parse_block(ctx, &mut Scan::new(&external.text), false)
                }),
                None => Err(XmlError::new(ErrorKind::Unresolved {
                    uri: ctx.display_uri(system_id),
                    cause: None,
                })),
            },
            EntityKind::Unparsed { .. } => Err(loc.error(ctx, "parameter entities cannot be unparsed")),
        };
        self.open_params.pop();
        result
    }

    fn conditional_section(
        &mut self,
        ctx: &mut DtdContext<'_>,
        scan: &mut Scan<'_>,
        loc: Loc<'_>,
    ) -> Result<(), XmlError> {
        let Some(open) = memchr::memchr(b'[', &scan.bytes()[scan.pos..]) else {
            return Err(loc.error(ctx, "malformed conditional section"));
        };
        let raw = &scan.text[scan.pos..scan.pos + open];
        scan.pos += open + 1;
        let keyword = self.expand_decl_refs(ctx, raw, loc)?;
        match keyword.trim_matches(|c: char| c.is_ascii() && is_whitespace(c as u8)) {
            "INCLUDE" => self.parse_block(ctx, scan, true),
            "IGNORE" => {
                let mut depth = 1usize;
                while depth > 0 {
                    let rest = &scan.bytes()[scan.pos..];
                    let next_open = memchr::memmem::find(rest, b"<![");
                    let next_close = memchr::memmem::find(rest, b"]]>");
                    match (next_open, next_close) {
                        (Some(o), Some(c)) if o < c => {
                            depth += 1;
                            scan.pos += o + 3;
                        }
                        (_, Some(c)) => {
                            depth -= 1;
                            scan.pos += c + 3;
                        }
                        (_, None) => {
                            return Err(loc.error(ctx, "unterminated IGNORE section"));
                        }
                    }
                }
                Ok(())
            }
            other => Err(loc.error(
                ctx,
                format!("expected INCLUDE or IGNORE, found '{other}'"),
            )),
        }
    }

    /// Replace parameter-entity references outside literals. They are only
    /// legal inside declarations of the external subset.
    fn expand_decl_refs(
        &mut self,
        ctx: &mut DtdContext<'_>,
        raw: &str,
        loc: Loc<'_>,
    ) -> Result<String, XmlError> {
        let bytes = raw.as_bytes();
        let mut out = String::with_capacity(raw.len());
        let mut quote = 0u8;
        let mut copied = 0;
        let mut i = 0;
        while i < bytes.len() {
            let b = bytes[i];
            match b {
                b'"' | b'\'' if quote == 0 => quote = b,
                b if b == quote => quote = 0,
                b'%' if quote == 0 => {
                    if let Some((name, end)) = param_ref_at(raw, i) {
                        if !ctx.is_external() {
                            return Err(loc.error(
                                ctx,
                                "parameter-entity references are not allowed inside markup declarations in the internal subset",
                            ));
                        }
                        out.push_str(&raw[copied..i]);
                        out.push(' ');
                        out.push_str(&self.param_replacement(ctx, name, loc)?);
                        out.push(' ');
                        copied = end;
                        i = end;
                        continue;
                    }
                }
                _ => {}
            }
            i += 1;
        }
        out.push_str(&raw[copied..]);
        Ok(out)
    }

    fn param_replacement(
        &mut self,
        ctx: &mut DtdContext<'_>,
        name: &str,
        loc: Loc<'_>,
    ) -> Result<String, XmlError> {
        let Some(decl) = ctx.param_entity(name) else {
            return Err(loc.error(ctx, format!("reference to undeclared parameter entity '%{name};'")));
        };
        match &decl.kind {
            EntityKind::Internal { text } => Ok(text.clone()),
            EntityKind::External {
                public_id,
                system_id,
            } => match ctx.open_external(public_id.as_deref(), system_id)? {
                Some(external) => Ok(external.text),
                None => Err(XmlError::new(ErrorKind::Unresolved {
                    uri: ctx.display_uri(system_id),
                    cause: None,
                })),
            },
            EntityKind::Unparsed { .. } => Err(loc.error(ctx, "parameter entities cannot be unparsed")),
        }
    }

    fn entity_decl(
        &mut self,
        ctx: &mut DtdContext<'_>,
        body: &str,
        loc: Loc<'_>,
    ) -> Result<(), XmlError> {
        let mut s = Scan::new(body);
        if !s.skip_ws() {
            return Err(loc.error(ctx, "expected whitespace after '<!ENTITY'"));
        }
        let parameter = if s.peek() == b'%' {
            s.pos += 1;
            if !s.skip_ws() {
                return Err(loc.error(ctx, "expected whitespace after '%'"));
            }
            true
        } else {
            false
        };
        let Some(name) = s.name() else {
            return Err(loc.error(ctx, "expected an entity name"));
        };
        if name.contains(':') {
            return Err(loc.error(ctx, format!("entity name '{name}' cannot contain a colon")));
        }
        if !s.skip_ws() {
            return Err(loc.error(ctx, "expected whitespace after the entity name"));
        }
        let kind = if let Some(literal) = s.quoted() {
            EntityKind::Internal {
                text: self.entity_value(ctx, literal, loc)?,
            }
        } else {
            let (public_id, system_id) = external_id(&mut s)
                .map_err(|message| loc.error(ctx, message))?;
            let had_ws = s.skip_ws();
            if !parameter && s.eat(b"NDATA") {
                if !had_ws || !s.skip_ws() {
                    return Err(loc.error(ctx, "expected whitespace around NDATA"));
                }
                let Some(notation) = s.name() else {
                    return Err(loc.error(ctx, "expected a notation name"));
                };
                EntityKind::Unparsed {
                    public_id,
                    system_id,
                    notation: notation.to_string(),
                }
            } else {
                EntityKind::External {
                    public_id,
                    system_id,
                }
            }
        };
        s.skip_ws();
        if !s.at_end() {
            return Err(loc.error(ctx, format!("unexpected content in declaration of '{name}'")));
        }
        ctx.declare_entity(name, kind, parameter);
        Ok(())
    }

    /// Replacement text of an entity literal: character references and
    /// parameter-entity references are expanded, general references kept.
    fn entity_value(
        &mut self,
        ctx: &mut DtdContext<'_>,
        literal: &str,
        loc: Loc<'_>,
    ) -> Result<String, XmlError> {
        let bytes = literal.as_bytes();
        let mut out = String::with_capacity(literal.len());
        let mut i = 0;
        while i < bytes.len() {
            match bytes[i] {
                b'%' => {
                    let Some((name, end)) = param_ref_at(literal, i) else {
                        return Err(loc.error(ctx, "malformed parameter-entity reference"));
                    };
                    if !ctx.is_external() {
                        return Err(loc.error(
                            ctx,
                            "parameter-entity references are not allowed inside markup declarations in the internal subset",
                        ));
                    }
                    out.push_str(&self.param_replacement(ctx, name, loc)?);
                    i = end;
                }
                b'&' => {
                    let Some(semi) = memchr::memchr(b';', &bytes[i..]) else {
                        return Err(loc.error(ctx, "unterminated reference in entity value"));
                    };
                    let reference = &literal[i + 1..i + semi];
                    if let Some(digits) = reference.strip_prefix('#') {
                        let Some(ch) = parse_char_ref(digits) else {
                            return Err(loc.error(ctx, format!("invalid character reference '&{reference};'")));
                        };
                        out.push(ch);
                    } else if tools::chars::is_name(reference) {
                        out.push_str(&literal[i..=i + semi]);
                    } else {
                        return Err(loc.error(ctx, format!("invalid entity reference '&{reference};'")));
                    }
                    i += semi + 1;
                }
                b'\r' => {
                    out.push('\n');
                    i += 1;
                    if bytes.get(i) == Some(&b'\n') {
                        i += 1;
                    }
                }
                _ => {
                    let Some((ch, len)) = char_at(bytes, i) else {
                        break;
                    };
                    out.push(ch);
                    i += len;
                }
            }
        }
        Ok(out)
    }

    fn attlist_decl(
        &mut self,
        ctx: &mut DtdContext<'_>,
        body: &str,
        loc: Loc<'_>,
    ) -> Result<(), XmlError> {
        let mut s = Scan::new(body);
        if !s.skip_ws() {
            return Err(loc.error(ctx, "expected whitespace after '<!ATTLIST'"));
        }
        let Some(element) = s.name() else {
            return Err(loc.error(ctx, "expected an element name"));
        };
        loop {
            let had_ws = s.skip_ws();
            if s.at_end() {
                return Ok(());
            }
            if !had_ws {
                return Err(loc.error(ctx, "expected whitespace between attribute definitions"));
            }
            let Some(name) = s.name() else {
                return Err(loc.error(ctx, "expected an attribute name"));
            };
            if !s.skip_ws() {
                return Err(loc.error(ctx, "expected whitespace after the attribute name"));
            }
            let ty = attribute_type(&mut s).map_err(|message| loc.error(ctx, message))?;
            if !s.skip_ws() {
                return Err(loc.error(ctx, "expected whitespace after the attribute type"));
            }
            let default = if s.eat(b"#REQUIRED") {
                DefaultDecl::Required
            } else if s.eat(b"#IMPLIED") {
                DefaultDecl::Implied
            } else {
                let fixed = s.eat(b"#FIXED");
                if fixed && !s.skip_ws() {
                    return Err(loc.error(ctx, "expected whitespace after #FIXED"));
                }
                let Some(literal) = s.quoted() else {
                    return Err(loc.error(ctx, "expected a default value"));
                };
                let mut open = Vec::new();
                let mut value = normalize_default(ctx, literal, &mut open)
                    .map_err(|message| loc.error(ctx, message))?;
                if ty != AttributeType::CData {
                    value = collapse_whitespace(&value);
                }
                if fixed {
                    DefaultDecl::Fixed(value)
                } else {
                    DefaultDecl::Value(value)
                }
            };
            ctx.declare_attribute(
                element,
                AttributeDecl {
                    name: name.to_string(),
                    ty,
                    default,
                    declared_externally: false,
                },
            );
        }
    }
}

fn external_id(s: &mut Scan<'_>) -> Result<(Option<String>, String), String> {
    if s.eat(b"SYSTEM") {
        if !s.skip_ws() {
            return Err("expected whitespace after SYSTEM".to_string());
        }
        let system = s.quoted().ok_or("expected a system literal")?;
        return Ok((None, system.to_string()));
    }
    if s.eat(b"PUBLIC") {
        if !s.skip_ws() {
            return Err("expected whitespace after PUBLIC".to_string());
        }
        let public = s.quoted().ok_or("expected a public id literal")?;
        if let Some(bad) = public.chars().find(|&c| !is_pubid_char(c)) {
            return Err(format!("invalid character {bad:?} in public id"));
        }
        if !s.skip_ws() {
            return Err("expected whitespace after the public id".to_string());
        }
        let system = s.quoted().ok_or("expected a system literal")?;
        return Ok((Some(public.to_string()), system.to_string()));
    }
    Err("expected a quoted value, SYSTEM or PUBLIC".to_string())
}

fn attribute_type(s: &mut Scan<'_>) -> Result<AttributeType, String> {
    if s.peek() == b'(' {
        return Ok(AttributeType::Enumeration(token_group(s, false)?));
    }
    let keyword = s.name().ok_or("expected an attribute type")?;
    Ok(match keyword {
        "CDATA" => AttributeType::CData,
        "ID" => AttributeType::Id,
        "IDREF" => AttributeType::IdRef,
        "IDREFS" => AttributeType::IdRefs,
        "ENTITY" => AttributeType::Entity,
        "ENTITIES" => AttributeType::Entities,
        "NMTOKEN" => AttributeType::NmToken,
        "NMTOKENS" => AttributeType::NmTokens,
        "NOTATION" => {
            if !s.skip_ws() {
                return Err("expected whitespace after NOTATION".to_string());
            }
            AttributeType::Notation(token_group(s, true)?)
        }
        other => return Err(format!("unknown attribute type '{other}'")),
    })
}

/// `( tok | tok ... )`
fn token_group(s: &mut Scan<'_>, names: bool) -> Result<Vec<String>, String> {
    if !s.eat(b"(") {
        return Err("expected '('".to_string());
    }
    let mut tokens = Vec::new();
    loop {
        s.skip_ws();
        let token = if names { s.name() } else { s.nmtoken() };
        let token = token.ok_or("expected a name token")?;
        debug_assert!(is_nmtoken(token));
        tokens.push(token.to_string());
        s.skip_ws();
        if s.eat(b")") {
            return Ok(tokens);
        }
        if !s.eat(b"|") {
            return Err("expected '|' or ')'".to_string());
        }
    }
}

pub(crate) fn parse_char_ref(digits: &str) -> Option<char> {
    let code = match digits.strip_prefix('x') {
        Some(hex) if !hex.is_empty() && hex.bytes().all(|b| b.is_ascii_hexdigit()) => {
            u32::from_str_radix(hex, 16).ok()?
        }
        Some(_) => return None,
        None if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) => {
            digits.parse().ok()?
        }
        None => return None,
    };
    char::from_u32(code).filter(|&ch| is_xml_char(ch))
}

/// Normalize an attribute default the way an attribute value in content is
/// normalized: references expanded, whitespace characters become spaces.
fn normalize_default(
    ctx: &DtdContext<'_>,
    literal: &str,
    open: &mut Vec<String>,
) -> Result<String, String> {
    let bytes = literal.as_bytes();
    let mut out = String::with_capacity(literal.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'<' => return Err("'<' is not allowed in attribute values".to_string()),
            b'&' => {
                let semi = memchr::memchr(b';', &bytes[i..]).ok_or("unterminated reference")?;
                let reference = &literal[i + 1..i + semi];
                i += semi + 1;
                if let Some(digits) = reference.strip_prefix('#') {
                    let ch = parse_char_ref(digits)
                        .ok_or_else(|| format!("invalid character reference '&{reference};'"))?;
                    out.push(ch);
                    continue;
                }
                if let Some(ch) = predefined_entity(reference) {
                    out.push(ch);
                    continue;
                }
                let decl = ctx
                    .entity(reference)
                    .ok_or_else(|| format!("reference to undeclared entity '{reference}'"))?;
                let Some(text) = decl.text() else {
                    return Err(format!(
                        "external entity '{reference}' cannot be referenced in an attribute value"
                    ));
                };
                if open.iter().any(|name| name == reference) {
                    return Err(format!("entity '{reference}' references itself"));
                }
                open.push(reference.to_string());
                let expanded = normalize_default(ctx, text, open)?;
                open.pop();
                out.push_str(&expanded);
            }
            b'\r' => {
                out.push(' ');
                i += 1;
                if bytes.get(i) == Some(&b'\n') {
                    i += 1;
                }
            }
            b'\n' | b'\t' => {
                out.push(' ');
                i += 1;
            }
            _ => {
                let Some((ch, len)) = char_at(bytes, i) else {
                    break;
                };
                out.push(ch);
                i += len;
            }
        }
    }
    Ok(out)
}

pub(crate) fn predefined_entity(name: &str) -> Option<char> {
    Some(match name {
        "lt" => '<',
        "gt" => '>',
        "amp" => '&',
        "apos" => '\'',
        "quot" => '"',
        _ => return None,
    })
}

/// Trim and fold runs of spaces, as for non-CDATA attribute values.
pub(crate) fn collapse_whitespace(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for token in value.split(' ').filter(|token| !token.is_empty()) {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(token);
    }
    out
}

//! XML 1.0 (fifth edition) character classes.

/// `S ::= (#x20 | #x9 | #xD | #xA)+`
#[inline]
pub fn is_whitespace(byte: u8) -> bool {
    matches!(byte, b' ' | b'\t' | b'\r' | b'\n')
}

/// Legal document character (`Char` production).
pub fn is_xml_char(ch: char) -> bool {
    matches!(ch,
        '\u{9}' | '\u{A}' | '\u{D}'
        | '\u{20}'..='\u{D7FF}'
        | '\u{E000}'..='\u{FFFD}'
        | '\u{10000}'..='\u{10FFFF}')
}

/// `NameStartChar` without the colon, i.e. the first character of an NCName.
pub fn is_ncname_start_char(ch: char) -> bool {
    matches!(ch,
        'A'..='Z' | '_' | 'a'..='z'
        | '\u{C0}'..='\u{D6}'
        | '\u{D8}'..='\u{F6}'
        | '\u{F8}'..='\u{2FF}'
        | '\u{370}'..='\u{37D}'
        | '\u{37F}'..='\u{1FFF}'
        | '\u{200C}'..='\u{200D}'
        | '\u{2070}'..='\u{218F}'
        | '\u{2C00}'..='\u{2FEF}'
        | '\u{3001}'..='\u{D7FF}'
        | '\u{F900}'..='\u{FDCF}'
        | '\u{FDF0}'..='\u{FFFD}'
        | '\u{10000}'..='\u{EFFFF}')
}

/// `NameChar` without the colon.
pub fn is_ncname_char(ch: char) -> bool {
    is_ncname_start_char(ch)
        || matches!(ch,
            '-' | '.' | '0'..='9' | '\u{B7}'
            | '\u{300}'..='\u{36F}'
            | '\u{203F}'..='\u{2040}')
}

pub fn is_name_start_char(ch: char) -> bool {
    ch == ':' || is_ncname_start_char(ch)
}

pub fn is_name_char(ch: char) -> bool {
    ch == ':' || is_ncname_char(ch)
}

/// `PubidChar` production.
pub fn is_pubid_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric()
        || matches!(ch,
            ' ' | '\r' | '\n' | '-' | '\'' | '(' | ')' | '+' | ',' | '.' | '/' | ':'
            | '=' | '?' | ';' | '!' | '*' | '#' | '@' | '$' | '_' | '%')
}

/// Valid `Name` (colons allowed anywhere after the first character).
pub fn is_name(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) if is_name_start_char(first) => chars.all(is_name_char),
        _ => false,
    }
}

/// Valid `NCName`.
pub fn is_ncname(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) if is_ncname_start_char(first) => chars.all(is_ncname_char),
        _ => false,
    }
}

/// Valid `Nmtoken`.
pub fn is_nmtoken(text: &str) -> bool {
    !text.is_empty() && text.chars().all(is_name_char)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_classes() {
        assert!(is_name("a:b"));
        assert!(is_name("_x-1.2"));
        assert!(!is_name("1abc"));
        assert!(!is_name(""));
        assert!(is_ncname("élan"));
        assert!(!is_ncname("a:b"));
        assert!(is_nmtoken("123"));
        assert!(!is_nmtoken("a b"));
    }

    #[test]
    fn legal_characters() {
        assert!(is_xml_char('\t'));
        assert!(!is_xml_char('\u{0}'));
        assert!(!is_xml_char('\u{B}'));
        assert!(!is_xml_char('\u{FFFE}'));
        assert!(is_xml_char('\u{1F600}'));
    }

    #[test]
    fn pubid_characters() {
        assert!(is_pubid_char('-'));
        assert!(is_pubid_char('%'));
        assert!(!is_pubid_char('"'));
        assert!(!is_pubid_char('\t'));
    }
}

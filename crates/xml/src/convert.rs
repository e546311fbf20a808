//! Typed conversion of content read as text.
//!
//! Values follow the XML Schema lexical rules: surrounding whitespace is
//! dropped, booleans accept `1`/`0`, and floats spell their specials `INF`,
//! `-INF` and `NaN`.

use std::fmt;

use tools::chars::{is_ncname, is_whitespace};

use crate::error::ErrorKind;
use crate::namespace::NamespaceResolver;

pub trait FromXmlValue: Sized {
    fn from_xml_value(value: &str, resolver: &dyn NamespaceResolver) -> Result<Self, ErrorKind>;
}

/// A `QName` resolved against the bindings in scope where it was read.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct QualifiedName {
    pub local_name: String,
    pub namespace: String,
}

impl QualifiedName {
    pub fn new(local_name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            local_name: local_name.into(),
            namespace: namespace.into(),
        }
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            f.write_str(&self.local_name)
        } else {
            write!(f, "{{{}}}{}", self.namespace, self.local_name)
        }
    }
}

fn trim_xml(value: &str) -> &str {
    value.trim_matches(|ch: char| ch.is_ascii() && is_whitespace(ch as u8))
}

fn conversion(value: &str, target: &'static str) -> ErrorKind {
    ErrorKind::Conversion {
        value: value.to_string(),
        target,
    }
}

impl FromXmlValue for String {
    fn from_xml_value(value: &str, _: &dyn NamespaceResolver) -> Result<Self, ErrorKind> {
        Ok(value.to_string())
    }
}

impl FromXmlValue for bool {
    fn from_xml_value(value: &str, _: &dyn NamespaceResolver) -> Result<Self, ErrorKind> {
        match trim_xml(value) {
            "true" | "1" => Ok(true),
            "false" | "0" => Ok(false),
            _ => Err(conversion(value, "bool")),
        }
    }
}

macro_rules! integer_from_xml {
    ($($ty:ty),*) => {$(
        impl FromXmlValue for $ty {
            fn from_xml_value(value: &str, _: &dyn NamespaceResolver) -> Result<Self, ErrorKind> {
                trim_xml(value)
                    .parse()
                    .map_err(|_| conversion(value, stringify!($ty)))
            }
        }
    )*};
}

integer_from_xml!(i32, i64, u32, u64);

/// `str::parse` also takes `inf`, `infinity` and `nan` in any case; only
/// the schema spellings are accepted here.
fn parse_float(value: &str, target: &'static str) -> Result<f64, ErrorKind> {
    let text = trim_xml(value);
    match text {
        "INF" | "+INF" => return Ok(f64::INFINITY),
        "-INF" => return Ok(f64::NEG_INFINITY),
        "NaN" => return Ok(f64::NAN),
        _ => {}
    }
    let numeric = !text.is_empty()
        && text
            .bytes()
            .all(|b| b.is_ascii_digit() || matches!(b, b'+' | b'-' | b'.' | b'e' | b'E'));
    if !numeric {
        return Err(conversion(value, target));
    }
    text.parse().map_err(|_| conversion(value, target))
}

impl FromXmlValue for f64 {
    fn from_xml_value(value: &str, _: &dyn NamespaceResolver) -> Result<Self, ErrorKind> {
        parse_float(value, "f64")
    }
}

impl FromXmlValue for f32 {
    fn from_xml_value(value: &str, _: &dyn NamespaceResolver) -> Result<Self, ErrorKind> {
        parse_float(value, "f32").map(|v| v as f32)
    }
}

impl FromXmlValue for QualifiedName {
    fn from_xml_value(value: &str, resolver: &dyn NamespaceResolver) -> Result<Self, ErrorKind> {
        let text = trim_xml(value);
        let (prefix, local_name) = text.split_once(':').unwrap_or(("", text));
        if !is_ncname(local_name) || (!prefix.is_empty() && !is_ncname(prefix)) {
            return Err(conversion(value, "QualifiedName"));
        }
        let namespace = match resolver.lookup_namespace(prefix) {
            Some(namespace) => namespace,
            None if prefix.is_empty() => "",
            None => return Err(conversion(value, "QualifiedName")),
        };
        Ok(QualifiedName::new(local_name, namespace))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::namespace::NamespaceScope;

    struct Bindings(&'static [(&'static str, &'static str)]);

    impl NamespaceResolver for Bindings {
        fn lookup_namespace(&self, prefix: &str) -> Option<&str> {
            self.0.iter().find(|(p, _)| *p == prefix).map(|(_, ns)| *ns)
        }

        fn lookup_prefix(&self, namespace: &str) -> Option<&str> {
            self.0.iter().find(|(_, ns)| *ns == namespace).map(|(p, _)| *p)
        }

        fn namespaces_in_scope(&self, _: NamespaceScope) -> BTreeMap<String, String> {
            self.0
                .iter()
                .map(|(p, ns)| (p.to_string(), ns.to_string()))
                .collect()
        }
    }

    const NONE: Bindings = Bindings(&[]);

    fn convert<T: FromXmlValue>(value: &str) -> Result<T, ErrorKind> {
        T::from_xml_value(value, &NONE)
    }

    #[test]
    fn booleans_take_digits_and_surrounding_whitespace() {
        assert_eq!(convert::<bool>(" true\n"), Ok(true));
        assert_eq!(convert::<bool>("0"), Ok(false));
        assert!(convert::<bool>("True").is_err());
        assert!(convert::<bool>("yes").is_err());
    }

    #[test]
    fn integers() {
        assert_eq!(convert::<i32>("\t-42 "), Ok(-42));
        assert_eq!(convert::<i64>("+7"), Ok(7));
        assert_eq!(convert::<u64>("18446744073709551615"), Ok(u64::MAX));
        assert!(convert::<u32>("-1").is_err());
        assert!(convert::<i32>("").is_err());
        assert!(convert::<i32>("1 2").is_err());
    }

    #[test]
    fn float_specials_use_schema_spelling() {
        assert_eq!(convert::<f64>("INF"), Ok(f64::INFINITY));
        assert_eq!(convert::<f64>("-INF"), Ok(f64::NEG_INFINITY));
        assert!(convert::<f64>("NaN").is_ok_and(f64::is_nan));
        assert!(convert::<f64>("inf").is_err());
        assert!(convert::<f64>("infinity").is_err());
        assert!(convert::<f64>("nan").is_err());
        assert_eq!(convert::<f64>(" 1.5e3 "), Ok(1500.0));
        assert_eq!(convert::<f32>("-0.25"), Ok(-0.25));
    }

    #[test]
    fn conversion_error_names_value_and_target() {
        assert_eq!(
            convert::<i32>("abc"),
            Err(ErrorKind::Conversion {
                value: "abc".to_string(),
                target: "i32",
            })
        );
    }

    #[test]
    fn qualified_names_resolve_against_bindings() {
        let bindings = Bindings(&[("p", "urn:p"), ("", "urn:default")]);
        assert_eq!(
            QualifiedName::from_xml_value(" p:item ", &bindings),
            Ok(QualifiedName::new("item", "urn:p"))
        );
        assert_eq!(
            QualifiedName::from_xml_value("item", &bindings),
            Ok(QualifiedName::new("item", "urn:default"))
        );
        assert_eq!(
            QualifiedName::from_xml_value("item", &NONE),
            Ok(QualifiedName::new("item", ""))
        );
        assert!(QualifiedName::from_xml_value("q:item", &bindings).is_err());
        assert!(QualifiedName::from_xml_value("p:", &bindings).is_err());
    }

    #[test]
    fn qualified_name_display() {
        assert_eq!(QualifiedName::new("a", "").to_string(), "a");
        assert_eq!(QualifiedName::new("a", "urn:x").to_string(), "{urn:x}a");
    }
}

//! Type signatures and name forms
//!
//! Types are referred to in four spellings:
//! - source: `a.b.Outer.Inner`
//! - binary: `a.b.Outer$Inner`
//! - internal: `a/b/Outer$Inner`
//! - signature: `La/b/Outer$Inner;`
//!
//! Descriptors use the primitive letters `Z B C S I J F D V`, `[` for arrays
//! and `L<internal>;` for references.

use thiserror::Error;

/// A malformed type signature or descriptor
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid type signature '{signature}' at offset {offset}")]
pub struct SignatureError {
    /// The text being parsed
    pub signature: String,
    /// Offset of the first bad character
    pub offset: usize,
}

/// Binary name to internal name
pub fn binary_to_internal(name: &str) -> String {
    name.replace('.', "/")
}

/// Internal name to binary name
pub fn internal_to_binary(name: &str) -> String {
    name.replace('/', ".")
}

/// Binary or internal name to source name
pub fn to_source_name(name: &str) -> String {
    name.replace(['/', '$'], ".")
}

/// Signature (`La/b/C;`) of an internal or binary name
pub fn signature_of(name: &str) -> String {
    format!("L{};", binary_to_internal(name))
}

/// Internal name of a reference signature, if `sig` is one
pub fn internal_of_signature(sig: &str) -> Option<&str> {
    sig.strip_prefix('L').and_then(|s| s.strip_suffix(';'))
}

/// Parse one type starting at `start`, returning the end offset.
///
/// `allow_void` permits `V` (return types only).
fn parse_one(text: &str, start: usize, allow_void: bool) -> Result<usize, SignatureError> {
    let bytes = text.as_bytes();
    let err = |offset| SignatureError {
        signature: text.to_string(),
        offset,
    };
    let mut pos = start;
    while pos < bytes.len() && bytes[pos] == b'[' {
        pos += 1;
    }
    let is_array = pos > start;
    match bytes.get(pos) {
        Some(b'Z' | b'B' | b'C' | b'S' | b'I' | b'J' | b'F' | b'D') => Ok(pos + 1),
        Some(b'V') if allow_void && !is_array => Ok(pos + 1),
        Some(b'L') => {
            let rest = &text[pos + 1..];
            match rest.find(';') {
                Some(0) | None => Err(err(pos)),
                Some(end) => {
                    let name = &rest[..end];
                    if name.contains(['(', ')', '[', '.']) {
                        Err(err(pos))
                    } else {
                        Ok(pos + 1 + end + 1)
                    }
                }
            }
        }
        _ => Err(err(pos)),
    }
}

/// Split a concatenated parameter list (`ILjava/lang/String;[Z`) into
/// individual type signatures.
pub fn split_params(params: &str) -> Result<Vec<String>, SignatureError> {
    let mut out = Vec::new();
    let mut pos = 0;
    while pos < params.len() {
        let end = parse_one(params, pos, false)?;
        out.push(params[pos..end].to_string());
        pos = end;
    }
    Ok(out)
}

/// A parsed method descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    /// Parameter signatures, in order
    pub params: Vec<String>,
    /// Return signature
    pub ret: String,
}

impl MethodDescriptor {
    /// Parse `(params)ret`
    pub fn parse(desc: &str) -> Result<Self, SignatureError> {
        let err = |offset| SignatureError {
            signature: desc.to_string(),
            offset,
        };
        let inner = desc.strip_prefix('(').ok_or_else(|| err(0))?;
        let close = inner.find(')').ok_or_else(|| err(desc.len()))?;
        let params = split_params(&inner[..close]).map_err(|e| err(e.offset + 1))?;
        let ret_start = close + 2;
        let end = parse_one(desc, ret_start, true)?;
        if end != desc.len() {
            return Err(err(end));
        }
        Ok(Self {
            params,
            ret: desc[ret_start..].to_string(),
        })
    }

    /// Render back to `(params)ret`
    pub fn render(&self) -> String {
        format!("({}){}", self.params.concat(), self.ret)
    }

    /// Parameter list without parentheses, as used in symbolic references
    pub fn param_list(&self) -> String {
        self.params.concat()
    }
}

/// Parameter part of a method descriptor (between the parentheses), or the
/// whole text if it is not a method descriptor.
pub fn params_of(desc: &str) -> &str {
    match (desc.find('('), desc.find(')')) {
        (Some(open), Some(close)) if open < close => &desc[open + 1..close],
        _ => desc,
    }
}

/// Prepend a receiver parameter to a method descriptor
pub fn prepend_param(desc: &str, param_sig: &str) -> String {
    match desc.strip_prefix('(') {
        Some(rest) => format!("({}{}", param_sig, rest),
        None => desc.to_string(),
    }
}

/// Rewrite every reference type inside a descriptor.
///
/// `map` receives internal names and returns a replacement, or `None` to keep
/// the name. Text that does not parse is returned unchanged.
pub fn map_descriptor_types(desc: &str, map: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(desc.len());
    let mut rest = desc;
    while let Some(start) = rest.find('L') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find(';') {
            Some(end) => {
                let name = &after[..end];
                out.push('L');
                match map(name) {
                    Some(replacement) => out.push_str(&replacement),
                    None => out.push_str(name),
                }
                out.push(';');
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_forms() {
        assert_eq!(binary_to_internal("a.b.Outer$Inner"), "a/b/Outer$Inner");
        assert_eq!(internal_to_binary("a/b/Outer$Inner"), "a.b.Outer$Inner");
        assert_eq!(to_source_name("a/b/Outer$Inner"), "a.b.Outer.Inner");
        assert_eq!(signature_of("a.b.C"), "La/b/C;");
        assert_eq!(internal_of_signature("La/b/C;"), Some("a/b/C"));
        assert_eq!(internal_of_signature("I"), None);
    }

    #[test]
    fn test_split_params() {
        assert_eq!(
            split_params("IJ[[ZLjava/lang/String;[La/B;").unwrap(),
            vec!["I", "J", "[[Z", "Ljava/lang/String;", "[La/B;"]
        );
        assert!(split_params("").unwrap().is_empty());
    }

    #[test]
    fn test_split_params_rejects_bad_input() {
        assert!(split_params("V").is_err());
        assert!(split_params("Ljava/lang/String").is_err());
        assert!(split_params("Q").is_err());
        assert!(split_params("L;").is_err());
        assert!(split_params("[").is_err());
    }

    #[test]
    fn test_method_descriptor() {
        let desc = MethodDescriptor::parse("(ILa/B;)V").unwrap();
        assert_eq!(desc.params, vec!["I", "La/B;"]);
        assert_eq!(desc.ret, "V");
        assert_eq!(desc.render(), "(ILa/B;)V");
        assert_eq!(desc.param_list(), "ILa/B;");

        assert!(MethodDescriptor::parse("(I").is_err());
        assert!(MethodDescriptor::parse("I)V").is_err());
        assert!(MethodDescriptor::parse("()VV").is_err());
    }

    #[test]
    fn test_params_of() {
        assert_eq!(params_of("(IZ)V"), "IZ");
        assert_eq!(params_of("I"), "I");
    }

    #[test]
    fn test_prepend_and_map() {
        assert_eq!(prepend_param("(I)V", "La/B;"), "(La/B;I)V");
        let mapped = map_descriptor_types("(La/B;I[La/B;)La/C;", |name| {
            (name == "a/B").then(|| "a/B$".to_string())
        });
        assert_eq!(mapped, "(La/B$;I[La/B$;)La/C;");
    }
}

//! Descriptor and method-signature utilities.
//!
//! Descriptors are the on-wire type names (`I`, `[I`, `Ljava/lang/Object;`);
//! a method signature is `(P1P2…)R`. The shorty is the compact per-argument
//! kind string with the return kind at index 0 and arrays collapsed to `L`.

use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq)]
pub enum DescriptorError {
    #[error("malformed descriptor at \"{0}\"")]
    Malformed(String),
    #[error("malformed method signature \"{0}\"")]
    MalformedSignature(String),
}

/// Length in bytes of the single descriptor at the start of `s`, or an error
/// if `s` does not begin with one.
pub fn descriptor_len(s: &str) -> Result<usize, DescriptorError> {
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() && bytes[i] == b'[' {
        i += 1;
    }
    match bytes.get(i) {
        Some(b'L') => {
            let end = s[i..]
                .find(';')
                .ok_or_else(|| DescriptorError::Malformed(s.to_string()))?;
            Ok(i + end + 1)
        }
        Some(&c) if is_primitive_char(c) => Ok(i + 1),
        _ => Err(DescriptorError::Malformed(s.to_string())),
    }
}

fn is_primitive_char(c: u8) -> bool {
    matches!(c, b'Z' | b'B' | b'C' | b'S' | b'I' | b'J' | b'F' | b'D' | b'V')
}

/// Split a method signature into its parameter descriptors and the return
/// descriptor.
pub fn split_signature(signature: &str) -> Result<(Vec<&str>, &str), DescriptorError> {
    let malformed = || DescriptorError::MalformedSignature(signature.to_string());

    let rest = signature.strip_prefix('(').ok_or_else(malformed)?;
    let close = rest.find(')').ok_or_else(malformed)?;
    let (params_str, ret) = (&rest[..close], &rest[close + 1..]);

    let mut params = Vec::new();
    let mut idx = 0;
    while idx < params_str.len() {
        let len = descriptor_len(&params_str[idx..])?;
        let param = &params_str[idx..idx + len];
        // `V` is only valid as a return descriptor.
        if param.trim_start_matches('[') == "V" {
            return Err(malformed());
        }
        params.push(param);
        idx += len;
    }

    if descriptor_len(ret)? != ret.len() {
        return Err(malformed());
    }
    Ok((params, ret))
}

/// The shorty character for one descriptor: primitives keep their char,
/// objects and arrays collapse to `L`.
pub fn shorty_char(descriptor: &str) -> char {
    match descriptor.as_bytes().first() {
        Some(b'L') | Some(b'[') => 'L',
        Some(&c) => c as char,
        None => 'V',
    }
}

/// Derive the shorty for a full method signature, return kind first.
pub fn shorty_for_signature(signature: &str) -> Result<String, DescriptorError> {
    let (params, ret) = split_signature(signature)?;
    let mut shorty = String::with_capacity(params.len() + 1);
    shorty.push(shorty_char(ret));
    for param in params {
        shorty.push(shorty_char(param));
    }
    Ok(shorty)
}

/// Human-readable form of a descriptor: `Ljava/lang/Object;` becomes
/// `java.lang.Object`, `[I` becomes `int[]`.
pub fn pretty_descriptor(descriptor: &str) -> String {
    let dims = descriptor.bytes().take_while(|&b| b == b'[').count();
    let elem = &descriptor[dims..];
    let base = match elem.as_bytes().first() {
        Some(b'L') => elem
            .strip_prefix('L')
            .and_then(|e| e.strip_suffix(';'))
            .unwrap_or(elem)
            .replace('/', "."),
        Some(b'Z') => "boolean".to_string(),
        Some(b'B') => "byte".to_string(),
        Some(b'C') => "char".to_string(),
        Some(b'S') => "short".to_string(),
        Some(b'I') => "int".to_string(),
        Some(b'J') => "long".to_string(),
        Some(b'F') => "float".to_string(),
        Some(b'D') => "double".to_string(),
        Some(b'V') => "void".to_string(),
        _ => elem.to_string(),
    };
    let mut out = base;
    for _ in 0..dims {
        out.push_str("[]");
    }
    out
}

//! # Canonical Type Names
//!
//! Method signatures name their parameter types as strings, and both isolates
//! must agree on those strings. Native spellings differ (`i32` here, `int`
//! elsewhere, `Vec<u8>` vs `byte[]`), so every parameter name is folded into
//! one portable tag set before it is hashed or compared.
//!
//! | canonical | accepted spellings |
//! |-----------|--------------------|
//! | `boolean` | `bool` |
//! | `byte`    | `i8`, `u8` |
//! | `short`   | `i16`, `u16` |
//! | `int`     | `i32`, `u32` |
//! | `long`    | `i64`, `u64`, `isize`, `usize` |
//! | `float`   | `f32` |
//! | `double`  | `f64` |
//! | `string`  | `String`, `str`, `&str` |
//! | `T[]`     | `Vec<T>`, `[T]`, `&[T]`, `[T; N]` |
//!
//! Anything else is taken verbatim (interface names, user types).

/// Folds a type name into its canonical wire spelling.
pub fn canonical(name: &str) -> String {
    let name = name.trim();

    if let Some(inner) = array_element(name) {
        return format!("{}[]", canonical(inner));
    }

    let folded = match name {
        "bool" | "boolean" => "boolean",
        "i8" | "u8" | "byte" => "byte",
        "i16" | "u16" | "short" => "short",
        "i32" | "u32" | "int" => "int",
        "i64" | "u64" | "isize" | "usize" | "long" => "long",
        "f32" | "float" => "float",
        "f64" | "double" => "double",
        "char" => "char",
        "String" | "str" | "&str" | "string" => "string",
        "bytes" => "byte[]",
        other => other,
    };
    folded.to_string()
}

/// Canonicalizes a list of parameter type names.
pub fn canonical_params<I, S>(params: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    params.into_iter().map(|p| canonical(p.as_ref())).collect()
}

fn array_element(name: &str) -> Option<&str> {
    if let Some(inner) = name.strip_suffix("[]") {
        return Some(inner);
    }
    if let Some(inner) = name.strip_prefix("Vec<").and_then(|s| s.strip_suffix('>')) {
        return Some(inner);
    }
    let slice = name.strip_prefix('&').unwrap_or(name);
    let inner = slice.strip_prefix('[').and_then(|s| s.strip_suffix(']'))?;
    // `[T; N]` keeps only the element type
    match inner.rsplit_once(';') {
        Some((element, len)) if len.trim().parse::<usize>().is_ok() => Some(element),
        _ => Some(inner),
    }
}

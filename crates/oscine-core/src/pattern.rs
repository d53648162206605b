//! OSC 1.0 address pattern matching
//!
//! Patterns and addresses are compared part by part between `/` separators.
//! Within a part:
//!
//! - `?` matches exactly one character
//! - `*` matches zero or more characters
//! - `[...]` is a character class, `[!...]` its negation; `x-y` is an
//!   inclusive range unless the dash sits at either end of the class
//! - `{a,b}` matches any of its comma-separated literal alternatives
//!
//! Wildcard characters inside `[...]` and `{...}` are literal. A malformed
//! class (unclosed `[`) matches nothing; a malformed brace falls back to a
//! literal `{`.

/// Whether `pattern` contains any routing meta characters.
///
/// Patterns without meta characters only ever match themselves, which lets
/// the address space index them exactly.
pub fn is_pattern(s: &str) -> bool {
    s.bytes()
        .any(|b| matches!(b, b'*' | b'?' | b'[' | b']' | b'{' | b'}'))
}

/// Match an address against an address pattern.
///
/// Both are split on `/`; the number of non-empty parts must agree and each
/// pattern part must match its address part in full.
pub fn matches(pattern: &str, address: &str) -> bool {
    let mut pat_parts = pattern.split('/').filter(|p| !p.is_empty());
    let mut addr_parts = address.split('/').filter(|p| !p.is_empty());

    loop {
        match (pat_parts.next(), addr_parts.next()) {
            (Some(pat), Some(addr)) => {
                if !match_part(pat.as_bytes(), addr.as_bytes()) {
                    return false;
                }
            }
            (None, None) => return true,
            _ => return false,
        }
    }
}

fn match_part(pat: &[u8], addr: &[u8]) -> bool {
    let Some(&first) = pat.first() else {
        return addr.is_empty();
    };

    match first {
        b'?' => !addr.is_empty() && match_part(&pat[1..], &addr[1..]),
        b'*' => (0..=addr.len()).any(|skip| match_part(&pat[1..], &addr[skip..])),
        b'[' => match_class(pat, addr),
        b'{' => match_alternatives(pat, addr),
        literal => {
            !addr.is_empty() && addr[0] == literal && match_part(&pat[1..], &addr[1..])
        }
    }
}

/// Match a `[...]` class at the head of `pat`.
fn match_class(pat: &[u8], addr: &[u8]) -> bool {
    let negated = pat.get(1) == Some(&b'!');
    let content_start = if negated { 2 } else { 1 };

    let close = match pat[content_start..].iter().position(|&b| b == b']') {
        Some(offset) => content_start + offset,
        // Unclosed class: the pattern is malformed and matches nothing
        None => return false,
    };
    let content = &pat[content_start..close];
    let rest = &pat[close + 1..];

    // A class always consumes one address character
    let Some(&c) = addr.first() else {
        return false;
    };

    let mut member = false;
    let mut i = 0;
    while i < content.len() {
        // `x-y` is a range only when the dash has an endpoint on each side
        // within the class; a dash at either end stays literal
        if i + 2 < content.len() && content[i + 1] == b'-' {
            if content[i] <= c && c <= content[i + 2] {
                member = true;
            }
            i += 3;
        } else {
            if content[i] == c {
                member = true;
            }
            i += 1;
        }
    }

    member != negated && match_part(rest, &addr[1..])
}

/// Match a `{a,b,...}` alternative list at the head of `pat`.
fn match_alternatives(pat: &[u8], addr: &[u8]) -> bool {
    let mut depth = 1usize;
    let mut close = None;
    for (i, &b) in pat.iter().enumerate().skip(1) {
        match b {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    close = Some(i);
                    break;
                }
            }
            _ => {}
        }
    }

    let Some(close) = close else {
        // Unclosed brace: degrade to a literal '{'
        return !addr.is_empty() && addr[0] == b'{' && match_part(&pat[1..], &addr[1..]);
    };

    let body = &pat[1..close];
    let rest = &pat[close + 1..];

    // Alternatives split on top-level commas; nested braces stay literal
    let mut depth = 0usize;
    let mut start = 0;
    let mut alternatives = Vec::new();
    for (i, &b) in body.iter().enumerate() {
        match b {
            b'{' => depth += 1,
            b'}' => depth -= 1,
            b',' if depth == 0 => {
                alternatives.push(&body[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    alternatives.push(&body[start..]);

    alternatives
        .iter()
        .any(|alt| addr.starts_with(alt) && match_part(rest, &addr[alt.len()..]))
}

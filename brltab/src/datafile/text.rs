use super::DiagnosticKind;

/// Decode an operand into characters, resolving backslash escapes.
///
/// `\s` is a space, so that operands never need to contain a literal blank.
pub fn parse_text(operand: &str) -> Result<Vec<char>, DiagnosticKind> {
    let mut out = Vec::with_capacity(operand.len());
    let mut chars = operand.chars();

    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }

        let escape = chars
            .next()
            .ok_or_else(|| DiagnosticKind::syntax("incomplete escape"))?;

        let decoded = match escape {
            '\\' => '\\',
            's' => ' ',
            't' => '\t',
            'n' => '\n',
            'r' => '\r',
            'b' => '\u{8}',
            'f' => '\u{c}',
            'v' => '\u{b}',
            'e' => '\u{1b}',
            'x' => hex(&mut chars, 2)?,
            'u' => hex(&mut chars, 4)?,
            'U' => hex(&mut chars, 8)?,
            other => {
                return Err(DiagnosticKind::syntax(format!(
                    "unknown escape `\\{}`",
                    other
                )))
            }
        };
        out.push(decoded);
    }

    if out.is_empty() {
        return Err(DiagnosticKind::syntax("empty text"));
    }

    Ok(out)
}

fn hex(chars: &mut std::str::Chars<'_>, digits: usize) -> Result<char, DiagnosticKind> {
    let mut value: u32 = 0;
    for _ in 0..digits {
        let digit = chars
            .next()
            .and_then(|c| c.to_digit(16))
            .ok_or_else(|| DiagnosticKind::syntax("invalid hexadecimal escape"))?;
        value = (value << 4) | digit;
    }

    char::from_u32(value)
        .ok_or_else(|| DiagnosticKind::syntax(format!("invalid character U+{:X}", value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes() {
        assert_eq!(parse_text("ab").unwrap(), vec!['a', 'b']);
        assert_eq!(parse_text("a\\sb").unwrap(), vec!['a', ' ', 'b']);
        assert_eq!(parse_text("\\\\").unwrap(), vec!['\\']);
        assert_eq!(parse_text("\\x41\\u00e9").unwrap(), vec!['A', 'é']);
        assert_eq!(parse_text("\\U0001F600").unwrap(), vec!['😀']);
        assert_eq!(parse_text("\\e\\t").unwrap(), vec!['\u{1b}', '\t']);
    }

    #[test]
    fn bad_escapes() {
        assert!(parse_text("abc\\").is_err());
        assert!(parse_text("\\q").is_err());
        assert!(parse_text("\\x4").is_err());
        assert!(parse_text("\\uD800").is_err());
        assert!(parse_text("").is_err());
    }
}

//! Literal cooking: numeric parsing and string escapes.

/// A cooked integer literal.
pub enum CookedInt {
    Int32(i32),
    Int64(i64),
    /// Out of range even for int64.
    TooLarge,
}

/// Parse an integer lexeme: optional minus, decimal or `0x` hex, optional
/// `L` suffix. Unsuffixed values outside int32 range promote to int64.
pub fn parse_int(lexeme: &str) -> CookedInt {
    let mut s = lexeme;
    let negative = s.starts_with('-');
    if negative {
        s = &s[1..];
    }
    let forced_64 = s.ends_with('L') || s.ends_with('l');
    if forced_64 {
        s = &s[..s.len() - 1];
    }

    let parsed = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16)
    } else {
        s.parse::<u64>()
    };

    let magnitude = match parsed {
        Ok(v) => v,
        Err(_) => return CookedInt::TooLarge,
    };

    let value = if negative {
        if magnitude > (i64::MAX as u64) + 1 {
            return CookedInt::TooLarge;
        }
        (magnitude as i64).wrapping_neg()
    } else {
        if magnitude > i64::MAX as u64 {
            return CookedInt::TooLarge;
        }
        magnitude as i64
    };

    if forced_64 {
        return CookedInt::Int64(value);
    }
    match i32::try_from(value) {
        Ok(v) => CookedInt::Int32(v),
        Err(_) => CookedInt::Int64(value),
    }
}

/// A cooked float literal.
pub enum CookedFloat {
    Float32(f32),
    Float64(f64),
}

/// Parse a float lexeme; an `f` suffix selects float32.
pub fn parse_float(lexeme: &str) -> CookedFloat {
    let is_32 = lexeme.ends_with('f') || lexeme.ends_with('F');
    let digits = if is_32 {
        &lexeme[..lexeme.len() - 1]
    } else {
        lexeme
    };
    // The lexer's regex guarantees this parses.
    let value: f64 = digits.parse().unwrap_or(0.0);
    if is_32 {
        CookedFloat::Float32(value as f32)
    } else {
        CookedFloat::Float64(value)
    }
}

/// Apply escapes to the contents of a string literal (quotes excluded).
/// Unknown escapes are preserved literally.
pub fn cook_string(contents: &str) -> String {
    let mut out = String::with_capacity(contents.len());
    let mut chars = contents.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('0') => out.push('\0'),
            Some('\\') => out.push('\\'),
            Some('"') => out.push('"'),
            Some('\'') => out.push('\''),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decimal_and_hex() {
        assert!(matches!(parse_int("42"), CookedInt::Int32(42)));
        assert!(matches!(parse_int("-7"), CookedInt::Int32(-7)));
        assert!(matches!(parse_int("0xff"), CookedInt::Int32(255)));
        assert!(matches!(parse_int("1L"), CookedInt::Int64(1)));
    }

    #[test]
    fn int32_overflow_promotes() {
        assert!(matches!(
            parse_int("2147483648"),
            CookedInt::Int64(2_147_483_648)
        ));
        assert!(matches!(
            parse_int("-2147483648"),
            CookedInt::Int32(i32::MIN)
        ));
    }

    #[test]
    fn int64_overflow_is_reported() {
        assert!(matches!(parse_int("99999999999999999999"), CookedInt::TooLarge));
    }

    #[test]
    fn float_suffix_selects_width() {
        assert!(matches!(parse_float("1.5"), CookedFloat::Float64(v) if v == 1.5));
        assert!(matches!(parse_float("1.5f"), CookedFloat::Float32(v) if v == 1.5));
        assert!(matches!(parse_float("-2.5e2"), CookedFloat::Float64(v) if v == -250.0));
    }

    #[test]
    fn string_escapes() {
        assert_eq!(cook_string(r"a\nb"), "a\nb");
        assert_eq!(cook_string(r#"say \"hi\""#), "say \"hi\"");
        assert_eq!(cook_string(r"weird\q"), "weird\\q");
    }
}

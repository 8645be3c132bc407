use std::borrow::Cow;

/// Currency suffix appended to formatted prices.
const CURRENCY_SUFFIX: &str = "원";

/// Formats a price with thousands separators and the currency suffix.
///
/// ```
/// use homefeed::util::format_price;
///
/// assert_eq!(format_price(0), "0원");
/// assert_eq!(format_price(6200), "6,200원");
/// assert_eq!(format_price(1234567), "1,234,567원");
/// ```
pub fn format_price(price: u32) -> String {
    let digits = price.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + CURRENCY_SUFFIX.len());
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out.push_str(CURRENCY_SUFFIX);
    out
}

/// Removes terminal control characters from backend-provided text.
///
/// Section titles and product names come straight from the API and are printed
/// to a terminal by the CLI. ESC-introduced sequences are dropped entirely
/// (CSI sequences up to their final byte), as are other C0 controls and DEL.
/// Tab, newline and carriage return are kept.
///
/// Returns `Cow::Borrowed` when nothing needs stripping.
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    let is_stripped = |c: char| c == '\x1b' || c == '\x7f' || (c < ' ' && !matches!(c, '\t' | '\n' | '\r'));

    if !s.chars().any(is_stripped) {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\x1b' {
            if chars.peek() == Some(&'[') {
                chars.next();
                // parameter/intermediate bytes run until a final byte in 0x40..=0x7e
                for next in chars.by_ref() {
                    if ('\x40'..='\x7e').contains(&next) {
                        break;
                    }
                }
            } else {
                chars.next();
            }
            continue;
        }
        if !is_stripped(c) {
            out.push(c);
        }
    }
    Cow::Owned(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_price_boundaries() {
        assert_eq!(format_price(999), "999원");
        assert_eq!(format_price(1000), "1,000원");
        assert_eq!(format_price(100000), "100,000원");
        assert_eq!(format_price(u32::MAX), "4,294,967,295원");
    }

    #[test]
    fn test_strip_plain_text_borrowed() {
        let result = strip_control_chars("[특가] 제철 과일");
        assert!(matches!(result, Cow::Borrowed(_)));
    }

    #[test]
    fn test_strip_csi_sequence() {
        assert_eq!(strip_control_chars("\x1b[31mRed\x1b[0m Deals"), "Red Deals");
    }

    #[test]
    fn test_strip_keeps_whitespace_controls() {
        assert_eq!(strip_control_chars("a\tb\nc\x07d\x7f"), "a\tb\ncd");
    }
}

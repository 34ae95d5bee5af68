//! Numeric literal parser shared by the lexer, AST builder, and CLI.

use std::fmt;

/// A parsed integer literal, possibly carrying a declared bit width
/// (`4'b1010`, `8'hFF`) from the Verilog-style sized form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Literal {
    value: u64,
    kind: LiteralKind,
    declared_width: Option<u16>,
}

impl Literal {
    pub fn value(&self) -> u64 {
        self.value
    }

    pub fn kind(&self) -> LiteralKind {
        self.kind
    }

    /// The width named by a sized literal, if the source used the sized form.
    pub fn declared_width(&self) -> Option<u16> {
        self.declared_width
    }

    /// The narrowest width able to hold the value (at least one bit).
    pub fn minimal_width(&self) -> u16 {
        minimal_width(self.value)
    }

    pub fn parse(input: &str) -> Result<Self, LiteralError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(LiteralError::Empty);
        }
        if let Some((width, rest)) = split_sized(trimmed) {
            return Self::parse_sized(width, rest, trimmed);
        }
        if let Some(rest) = strip_prefix_ignore_case(trimmed, "0x") {
            return Self::parse_radix(rest, 16, LiteralKind::Hex);
        }
        if let Some(rest) = strip_prefix_ignore_case(trimmed, "0b") {
            return Self::parse_radix(rest, 2, LiteralKind::Binary);
        }
        if let Some(rest) = strip_prefix_ignore_case(trimmed, "0o") {
            return Self::parse_radix(rest, 8, LiteralKind::Octal);
        }
        Self::parse_radix(trimmed, 10, LiteralKind::Decimal)
    }

    fn parse_sized(width: u16, rest: &str, original: &str) -> Result<Self, LiteralError> {
        if width == 0 || width > 64 {
            return Err(LiteralError::InvalidWidth { bits: width });
        }
        let mut chars = rest.chars();
        let radix_char = chars
            .next()
            .ok_or_else(|| LiteralError::InvalidFormat(original.into()))?;
        let (radix, kind) = match radix_char.to_ascii_lowercase() {
            'd' => (10, LiteralKind::Decimal),
            'h' => (16, LiteralKind::Hex),
            'b' => (2, LiteralKind::Binary),
            'o' => (8, LiteralKind::Octal),
            _ => return Err(LiteralError::InvalidFormat(original.into())),
        };
        let digits: String = chars.as_str().replace('_', "");
        if digits.is_empty() {
            return Err(LiteralError::InvalidFormat(original.into()));
        }
        let value = u64::from_str_radix(&digits, radix)
            .map_err(|_| LiteralError::InvalidFormat(original.into()))?;
        if width < 64 && value >= (1u64 << width) {
            return Err(LiteralError::DoesNotFit { value, bits: width });
        }
        Ok(Literal {
            value,
            kind,
            declared_width: Some(width),
        })
    }

    fn parse_radix(src: &str, radix: u32, kind: LiteralKind) -> Result<Self, LiteralError> {
        let digits = src.replace('_', "");
        if digits.is_empty() {
            return Err(LiteralError::InvalidFormat(src.into()));
        }
        let value = u64::from_str_radix(&digits, radix)
            .map_err(|_| LiteralError::InvalidFormat(src.into()))?;
        Ok(Literal {
            value,
            kind,
            declared_width: None,
        })
    }
}

/// Splits `12'hFF` into `(12, "hFF")`; `None` when the input is not sized.
fn split_sized(input: &str) -> Option<(u16, &str)> {
    let tick = input.find('\'')?;
    let (width_digits, rest) = input.split_at(tick);
    if width_digits.is_empty() || !width_digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let width: u16 = width_digits.parse().ok()?;
    Some((width, &rest[1..]))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiteralKind {
    Decimal,
    Hex,
    Octal,
    Binary,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiteralError {
    Empty,
    InvalidFormat(String),
    InvalidWidth { bits: u16 },
    DoesNotFit { value: u64, bits: u16 },
    NegativeNotSupported,
}

impl fmt::Display for LiteralError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LiteralError::Empty => write!(f, "literal is empty"),
            LiteralError::InvalidFormat(token) => write!(f, "invalid literal format: {token}"),
            LiteralError::InvalidWidth { bits } => {
                write!(f, "sized literal width {bits} is outside 1..=64")
            }
            LiteralError::DoesNotFit { value, bits } => {
                write!(f, "value {value} does not fit in {bits} bit(s)")
            }
            LiteralError::NegativeNotSupported => {
                write!(f, "negative literals are not supported")
            }
        }
    }
}

impl std::error::Error for LiteralError {}

fn strip_prefix_ignore_case<'a>(input: &'a str, prefix: &str) -> Option<&'a str> {
    input
        .strip_prefix(prefix)
        .or_else(|| input.strip_prefix(prefix.to_ascii_uppercase().as_str()))
}

/// The narrowest width able to hold `value` (at least one bit).
pub fn minimal_width(value: u64) -> u16 {
    let bits = 64 - value.leading_zeros();
    bits.max(1) as u16
}

/// Parses an unsigned 64-bit literal with the ODL grammar.
pub fn parse_u64_literal(input: &str) -> Result<u64, LiteralError> {
    let trimmed = input.trim();
    if trimmed.starts_with('-') {
        return Err(LiteralError::NegativeNotSupported);
    }
    Literal::parse(trimmed).map(|literal| literal.value())
}

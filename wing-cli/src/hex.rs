use anyhow::{bail, Context, Result};
use wing_panel::exchange::{Frame, FRAME_LEN};

/// Parse a byte given as decimal, `0x` hex or `0b` binary.
pub fn parse_u8(input: &str) -> Result<u8> {
    let value = parse_number(input)?;
    u8::try_from(value).with_context(|| format!("{} does not fit in a byte", input))
}

/// Parse an unsigned number given as decimal, `0x` hex or `0b` binary.
pub fn parse_number(input: &str) -> Result<u32> {
    let input = input.trim();
    let (digits, radix) = if let Some(hex) = input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
    {
        (hex, 16)
    } else if let Some(bin) = input.strip_prefix("0b") {
        (bin, 2)
    } else {
        (input, 10)
    };

    let digits = digits.replace('_', "");
    if digits.is_empty() {
        bail!("empty number");
    }

    u32::from_str_radix(&digits, radix).with_context(|| format!("invalid number {:?}", input))
}

/// Parse a frame payload written as hex bytes. Spaces, `:` and `-` between
/// bytes are ignored; a short payload is zero-padded to a full frame.
pub fn parse_frame(input: &str) -> Result<Frame> {
    let hex: String = input
        .chars()
        .filter(|c| !matches!(c, ' ' | ':' | '-'))
        .collect();
    let hex = hex.strip_prefix("0x").unwrap_or(&hex);

    let bytes = decode_hex_bytes(hex).context("invalid frame payload")?;
    if bytes.len() > FRAME_LEN {
        bail!(
            "frame payload is {} bytes, at most {} allowed",
            bytes.len(),
            FRAME_LEN
        );
    }

    let mut frame = [0u8; FRAME_LEN];
    frame[..bytes.len()].copy_from_slice(&bytes);
    Ok(frame)
}

/// Format a frame as space-separated hex bytes.
pub fn format_frame(frame: &Frame) -> String {
    frame
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

fn decode_hex_bytes(hex: &str) -> Result<Vec<u8>> {
    if !hex.len().is_multiple_of(2) {
        bail!("odd number of hex characters");
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| {
            hex.get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .with_context(|| format!("invalid hex at position {}", i))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_number_radixes() {
        assert_eq!(parse_number("42").unwrap(), 42);
        assert_eq!(parse_number("0x1A").unwrap(), 0x1A);
        assert_eq!(parse_number("0X701").unwrap(), 0x701);
        assert_eq!(parse_number("0b0110_1111").unwrap(), 0x6F);
        assert_eq!(parse_number(" 7 ").unwrap(), 7);
    }

    #[test]
    fn test_parse_number_errors() {
        assert!(parse_number("").is_err());
        assert!(parse_number("0x").is_err());
        assert!(parse_number("0b102").is_err());
        assert!(parse_number("ten").is_err());
    }

    #[test]
    fn test_parse_u8_range() {
        assert_eq!(parse_u8("0xFF").unwrap(), 0xFF);
        assert!(parse_u8("256").is_err());
    }

    #[test]
    fn test_parse_frame() {
        let frame = parse_frame("15 ED 0F 01").unwrap();
        assert_eq!(frame, [0x15, 0xED, 0x0F, 0x01, 0, 0, 0, 0]);

        let frame = parse_frame("0x1f0309").unwrap();
        assert_eq!(frame, [0x1F, 0x03, 0x09, 0, 0, 0, 0, 0]);

        let frame = parse_frame("01:02:03:04:05:06:07:08").unwrap();
        assert_eq!(frame, [1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_parse_frame_errors() {
        assert!(parse_frame("123").is_err());
        assert!(parse_frame("zz").is_err());
        assert!(parse_frame("01 02 03 04 05 06 07 08 09").is_err());
        // Even-length input with multi-byte chars: a pair can split a char.
        assert_eq!("é".len(), 2);
        assert!(parse_frame("é").is_err());
        assert!(parse_frame("0é0").is_err());
    }

    #[test]
    fn test_format_frame() {
        assert_eq!(
            format_frame(&[0x15, 0xED, 0x0F, 0x01, 0, 0, 0, 0]),
            "15 ED 0F 01 00 00 00 00"
        );
    }
}

//! Color and alpha normalization.
//!
//! Styles arrive in several spellings (`#rrggbb`, `#rrggbbaa`,
//! `rgba(r, g, b, a)`) and are normalized here so style application and
//! drawing always agree: an opaque color is a lowercase 6-digit hex, anything
//! translucent is an `rgba(...)` string.

/// A color split into its opaque hex part and its alpha, in both encodings.
#[derive(Clone, Debug, PartialEq)]
pub struct ParsedColor {
    /// Lowercase `#rrggbb`.
    pub hex: String,
    /// Two uppercase hex digits.
    pub alpha_hex: String,
    /// 0.0..=1.0.
    pub alpha_float: f64,
}

/// Alpha in either encoding, for [`combine_hex_alpha`].
#[derive(Clone, Copy, Debug)]
pub enum Alpha<'a> {
    Float(f64),
    Hex(&'a str),
}

/// Parse any supported color spelling; `None` or unparseable input falls back
/// to `fallback` (which must itself be parseable, or white is used).
pub fn parse_color(input: Option<&str>, fallback: &str) -> ParsedColor {
    input
        .and_then(try_parse)
        .or_else(|| try_parse(fallback))
        .unwrap_or(ParsedColor {
            hex: "#ffffff".to_string(),
            alpha_hex: "FF".to_string(),
            alpha_float: 1.0,
        })
}

fn try_parse(s: &str) -> Option<ParsedColor> {
    match_hex(s).or_else(|| match_rgba(s))
}

/// Combine an opaque hex color with an alpha into a draw-ready string: plain
/// lowercase hex when fully opaque, `rgba(r, g, b, a)` otherwise (alpha
/// rounded to three decimals).
pub fn combine_hex_alpha(hex: &str, alpha: Alpha<'_>) -> String {
    let alpha_float = match alpha {
        Alpha::Float(a) => clamp_alpha(a),
        Alpha::Hex(h) => alpha_hex_to_float(h),
    };
    let hex = normalize_hex(hex);
    if alpha_float >= 1.0 {
        return hex;
    }
    let (r, g, b) = hex_to_rgb(&hex);
    let rounded = (alpha_float * 1000.0).round() / 1000.0;
    format!("rgba({r}, {g}, {b}, {rounded})")
}

/// Canonical draw string for an arbitrary color spelling.
pub fn normalize_for_draw(color: &str, fallback: &str) -> String {
    let parsed = parse_color(Some(color), fallback);
    combine_hex_alpha(&parsed.hex, Alpha::Float(parsed.alpha_float))
}

fn match_hex(s: &str) -> Option<ParsedColor> {
    let digits = s.trim().strip_prefix('#')?;
    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    match digits.len() {
        6 => Some(ParsedColor {
            hex: format!("#{}", digits.to_ascii_lowercase()),
            alpha_hex: "FF".to_string(),
            alpha_float: 1.0,
        }),
        8 => {
            // Hex stays lowercase, alpha pairs uppercase.
            let alpha_hex = digits[6..].to_ascii_uppercase();
            Some(ParsedColor {
                hex: format!("#{}", digits[..6].to_ascii_lowercase()),
                alpha_float: alpha_hex_to_float(&alpha_hex),
                alpha_hex,
            })
        }
        _ => None,
    }
}

fn match_rgba(s: &str) -> Option<ParsedColor> {
    let s = s.trim();
    let inner = s
        .strip_prefix("rgba(")
        .or_else(|| s.strip_prefix("rgb("))?
        .strip_suffix(')')?;
    let parts: Vec<&str> = inner.split(',').map(str::trim).collect();
    if parts.len() != 3 && parts.len() != 4 {
        return None;
    }
    let r = clamp_channel(parts[0].parse::<f64>().ok()?);
    let g = clamp_channel(parts[1].parse::<f64>().ok()?);
    let b = clamp_channel(parts[2].parse::<f64>().ok()?);
    let alpha_float = match parts.get(3) {
        Some(a) => clamp_alpha(a.parse::<f64>().ok()?),
        None => 1.0,
    };
    Some(ParsedColor {
        hex: rgb_to_hex(r, g, b),
        alpha_hex: float_to_alpha_hex(alpha_float),
        alpha_float,
    })
}

fn normalize_hex(hex: &str) -> String {
    match match_hex(hex) {
        Some(parsed) => parsed.hex,
        None => "#ffffff".to_string(),
    }
}

fn hex_to_rgb(hex: &str) -> (u8, u8, u8) {
    let digits = hex.trim_start_matches('#');
    let parse = |range: std::ops::Range<usize>| {
        digits
            .get(range)
            .and_then(|d| u8::from_str_radix(d, 16).ok())
            .unwrap_or(255)
    };
    (parse(0..2), parse(2..4), parse(4..6))
}

fn rgb_to_hex(r: u8, g: u8, b: u8) -> String {
    format!("#{r:02x}{g:02x}{b:02x}")
}

fn clamp_channel(v: f64) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

fn clamp_alpha(a: f64) -> f64 {
    a.clamp(0.0, 1.0)
}

fn alpha_hex_to_float(hex: &str) -> f64 {
    match u8::from_str_radix(hex, 16) {
        Ok(v) => f64::from(v) / 255.0,
        Err(_) => 1.0,
    }
}

fn float_to_alpha_hex(a: f64) -> String {
    format!("{:02X}", (clamp_alpha(a) * 255.0).round() as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_six_digit_hex_is_opaque() {
        let c = parse_color(Some("#112233"), "#000000");
        assert_eq!(c.hex, "#112233");
        assert_eq!(c.alpha_hex, "FF");
        assert_eq!(c.alpha_float, 1.0);
    }

    #[test]
    fn parse_eight_digit_hex_splits_alpha() {
        let c = parse_color(Some("#00000080"), "#ffffff");
        assert_eq!(c.hex, "#000000");
        assert_eq!(c.alpha_hex, "80");
        assert!((c.alpha_float - 128.0 / 255.0).abs() < 1e-9);
    }

    #[test]
    fn alpha_hex_is_uppercased_on_output() {
        let c = parse_color(Some("#000000ab"), "#ffffff");
        assert_eq!(c.alpha_hex, "AB");
        // Hex body stays lowercase.
        assert_eq!(parse_color(Some("#AABBCCDD"), "#ffffff").hex, "#aabbcc");
        assert_eq!(parse_color(Some("#AABBCCDD"), "#ffffff").alpha_hex, "DD");
        assert_eq!(
            parse_color(Some("rgba(0, 0, 0, 0.67)"), "#ffffff").alpha_hex,
            "AB"
        );
    }

    #[test]
    fn parse_rgba_string() {
        let c = parse_color(Some("rgba(255, 0, 0, 0.25)"), "#ffffff");
        assert_eq!(c.hex, "#ff0000");
        assert_eq!(c.alpha_float, 0.25);
    }

    #[test]
    fn unparseable_input_falls_back() {
        let c = parse_color(Some("chartreuse"), "#112233");
        assert_eq!(c.hex, "#112233");
        let c = parse_color(None, "also-bad");
        assert_eq!(c.hex, "#ffffff");
    }

    #[test]
    fn combine_opaque_stays_hex() {
        assert_eq!(combine_hex_alpha("#112233", Alpha::Float(1.0)), "#112233");
        assert_eq!(combine_hex_alpha("#AABBCC", Alpha::Hex("ff")), "#aabbcc");
    }

    #[test]
    fn combine_translucent_becomes_rgba() {
        assert_eq!(
            combine_hex_alpha("#112233", Alpha::Float(0.5)),
            "rgba(17, 34, 51, 0.5)"
        );
        assert_eq!(
            combine_hex_alpha("#000000", Alpha::Hex("80")),
            "rgba(0, 0, 0, 0.502)"
        );
    }

    #[test]
    fn normalize_for_draw_round_trips_spellings() {
        assert_eq!(normalize_for_draw("#FFFFFF", "#000000"), "#ffffff");
        assert_eq!(
            normalize_for_draw("#00000080", "#000000"),
            "rgba(0, 0, 0, 0.502)"
        );
        assert_eq!(
            normalize_for_draw("rgba(17, 34, 51, 0.5)", "#000000"),
            "rgba(17, 34, 51, 0.5)"
        );
    }
}

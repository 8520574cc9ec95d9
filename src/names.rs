//! XML name validation and utilities
//!
//! Character classes follow the XML 1.0 (fifth edition) `NameStartChar` and
//! `NameChar` productions. ASCII is served from a lookup table; the rest falls
//! through to the explicit range lists.

const START: u8 = 1;
const NAME: u8 = 2;

static ASCII_CLASS: [u8; 128] = {
    let mut table = [0u8; 128];
    let mut i = 0;
    while i < 128 {
        let c = i as u8;
        if c.is_ascii_alphabetic() || c == b'_' || c == b':' {
            table[i] = START | NAME;
        } else if c.is_ascii_digit() || c == b'-' || c == b'.' {
            table[i] = NAME;
        }
        i += 1;
    }
    table
};

const START_RANGES: &[(u32, u32)] = &[
    (0xC0, 0xD6),
    (0xD8, 0xF6),
    (0xF8, 0x2FF),
    (0x370, 0x37D),
    (0x37F, 0x1FFF),
    (0x200C, 0x200D),
    (0x2070, 0x218F),
    (0x2C00, 0x2FEF),
    (0x3001, 0xD7FF),
    (0xF900, 0xFDCF),
    (0xFDF0, 0xFFFD),
    (0x10000, 0xEFFFF),
];

/// Whether `c` matches `NameStartChar`
pub fn is_name_start_char(c: char) -> bool {
    let cp = c as u32;
    if cp < 128 {
        return ASCII_CLASS[cp as usize] & START != 0;
    }
    START_RANGES.iter().any(|&(lo, hi)| cp >= lo && cp <= hi)
}

/// Whether `c` matches `NameChar`
pub fn is_name_char(c: char) -> bool {
    let cp = c as u32;
    if cp < 128 {
        return ASCII_CLASS[cp as usize] & NAME != 0;
    }
    cp == 0xB7
        || (0x300..=0x36F).contains(&cp)
        || (0x203F..=0x2040).contains(&cp)
        || START_RANGES.iter().any(|&(lo, hi)| cp >= lo && cp <= hi)
}

/// Whether `c` matches the XML 1.0 `Char` production
pub fn is_xml_char(c: char) -> bool {
    matches!(c as u32,
        0x9 | 0xA | 0xD | 0x20..=0xD7FF | 0xE000..=0xFFFD | 0x10000..=0x10FFFF)
}

/// Whether `c` is XML white space
pub fn is_xml_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\r')
}

/// Whether a byte is XML white space
pub fn is_space_byte(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\r')
}

/// Check if a string is a valid XML Name
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if is_name_start_char(c) => chars.all(is_name_char),
        _ => false,
    }
}

/// Check if a string is a valid NCName (non-colonized name)
pub fn is_valid_ncname(name: &str) -> bool {
    !name.contains(':') && is_valid_name(name)
}

/// Check if a string is a valid QName (`prefix:local` or `local`)
pub fn is_valid_qname(name: &str) -> bool {
    match name.split_once(':') {
        Some((prefix, local)) => is_valid_ncname(prefix) && is_valid_ncname(local),
        None => is_valid_ncname(name),
    }
}

/// Check if a string is a valid NMTOKEN
pub fn is_valid_nmtoken(token: &str) -> bool {
    !token.is_empty() && token.chars().all(is_name_char)
}

/// Split a QName into prefix and local name; the prefix is empty when absent
pub fn split_qname(qname: &str) -> (&str, &str) {
    qname.split_once(':').unwrap_or(("", qname))
}

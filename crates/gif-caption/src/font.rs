//! Built-in bitmap faces and the family-name registry.

use std::collections::HashMap;

use tracing::debug;

/// Glyph cell height in font units; glyphs are 5 units wide.
pub const GLYPH_HEIGHT: u32 = 7;
const GLYPH_WIDTH: u32 = 5;
/// Units between consecutive glyph cells.
const LETTER_SPACING: u32 = 1;
/// Units between consecutive lines.
const LINE_GAP: u32 = 2;
/// Requested font size maps to this many units (cell plus descender row).
const UNITS_PER_EM: f32 = 8.0;

const FIRST_CHAR: u8 = b' ';
const FALLBACK_CHAR: u8 = b'?';

/// Printable ASCII, 5 columns per glyph, bit 0 is the top row.
#[rustfmt::skip]
const GLYPHS: [[u8; 5]; 95] = [
    [0x00, 0x00, 0x00, 0x00, 0x00], // ' '
    [0x00, 0x00, 0x5F, 0x00, 0x00], // '!'
    [0x00, 0x07, 0x00, 0x07, 0x00], // '"'
    [0x14, 0x7F, 0x14, 0x7F, 0x14], // '#'
    [0x24, 0x2A, 0x7F, 0x2A, 0x12], // '$'
    [0x23, 0x13, 0x08, 0x64, 0x62], // '%'
    [0x36, 0x49, 0x55, 0x22, 0x50], // '&'
    [0x00, 0x05, 0x03, 0x00, 0x00], // '\''
    [0x00, 0x1C, 0x22, 0x41, 0x00], // '('
    [0x00, 0x41, 0x22, 0x1C, 0x00], // ')'
    [0x14, 0x08, 0x3E, 0x08, 0x14], // '*'
    [0x08, 0x08, 0x3E, 0x08, 0x08], // '+'
    [0x00, 0x50, 0x30, 0x00, 0x00], // ','
    [0x08, 0x08, 0x08, 0x08, 0x08], // '-'
    [0x00, 0x60, 0x60, 0x00, 0x00], // '.'
    [0x20, 0x10, 0x08, 0x04, 0x02], // '/'
    [0x3E, 0x51, 0x49, 0x45, 0x3E], // '0'
    [0x00, 0x42, 0x7F, 0x40, 0x00], // '1'
    [0x42, 0x61, 0x51, 0x49, 0x46], // '2'
    [0x21, 0x41, 0x45, 0x4B, 0x31], // '3'
    [0x18, 0x14, 0x12, 0x7F, 0x10], // '4'
    [0x27, 0x45, 0x45, 0x45, 0x39], // '5'
    [0x3C, 0x4A, 0x49, 0x49, 0x30], // '6'
    [0x01, 0x71, 0x09, 0x05, 0x03], // '7'
    [0x36, 0x49, 0x49, 0x49, 0x36], // '8'
    [0x06, 0x49, 0x49, 0x29, 0x1E], // '9'
    [0x00, 0x36, 0x36, 0x00, 0x00], // ':'
    [0x00, 0x56, 0x36, 0x00, 0x00], // ';'
    [0x08, 0x14, 0x22, 0x41, 0x00], // '<'
    [0x14, 0x14, 0x14, 0x14, 0x14], // '='
    [0x00, 0x41, 0x22, 0x14, 0x08], // '>'
    [0x02, 0x01, 0x51, 0x09, 0x06], // '?'
    [0x32, 0x49, 0x79, 0x41, 0x3E], // '@'
    [0x7E, 0x11, 0x11, 0x11, 0x7E], // 'A'
    [0x7F, 0x49, 0x49, 0x49, 0x36], // 'B'
    [0x3E, 0x41, 0x41, 0x41, 0x22], // 'C'
    [0x7F, 0x41, 0x41, 0x22, 0x1C], // 'D'
    [0x7F, 0x49, 0x49, 0x49, 0x41], // 'E'
    [0x7F, 0x09, 0x09, 0x09, 0x01], // 'F'
    [0x3E, 0x41, 0x49, 0x49, 0x7A], // 'G'
    [0x7F, 0x08, 0x08, 0x08, 0x7F], // 'H'
    [0x00, 0x41, 0x7F, 0x41, 0x00], // 'I'
    [0x20, 0x40, 0x41, 0x3F, 0x01], // 'J'
    [0x7F, 0x08, 0x14, 0x22, 0x41], // 'K'
    [0x7F, 0x40, 0x40, 0x40, 0x40], // 'L'
    [0x7F, 0x02, 0x0C, 0x02, 0x7F], // 'M'
    [0x7F, 0x04, 0x08, 0x10, 0x7F], // 'N'
    [0x3E, 0x41, 0x41, 0x41, 0x3E], // 'O'
    [0x7F, 0x09, 0x09, 0x09, 0x06], // 'P'
    [0x3E, 0x41, 0x51, 0x21, 0x5E], // 'Q'
    [0x7F, 0x09, 0x19, 0x29, 0x46], // 'R'
    [0x46, 0x49, 0x49, 0x49, 0x31], // 'S'
    [0x01, 0x01, 0x7F, 0x01, 0x01], // 'T'
    [0x3F, 0x40, 0x40, 0x40, 0x3F], // 'U'
    [0x1F, 0x20, 0x40, 0x20, 0x1F], // 'V'
    [0x3F, 0x40, 0x38, 0x40, 0x3F], // 'W'
    [0x63, 0x14, 0x08, 0x14, 0x63], // 'X'
    [0x07, 0x08, 0x70, 0x08, 0x07], // 'Y'
    [0x61, 0x51, 0x49, 0x45, 0x43], // 'Z'
    [0x00, 0x7F, 0x41, 0x41, 0x00], // '['
    [0x02, 0x04, 0x08, 0x10, 0x20], // '\\'
    [0x00, 0x41, 0x41, 0x7F, 0x00], // ']'
    [0x04, 0x02, 0x01, 0x02, 0x04], // '^'
    [0x40, 0x40, 0x40, 0x40, 0x40], // '_'
    [0x00, 0x01, 0x02, 0x04, 0x00], // '`'
    [0x20, 0x54, 0x54, 0x54, 0x78], // 'a'
    [0x7F, 0x48, 0x44, 0x44, 0x38], // 'b'
    [0x38, 0x44, 0x44, 0x44, 0x20], // 'c'
    [0x38, 0x44, 0x44, 0x48, 0x7F], // 'd'
    [0x38, 0x54, 0x54, 0x54, 0x18], // 'e'
    [0x08, 0x7E, 0x09, 0x01, 0x02], // 'f'
    [0x0C, 0x52, 0x52, 0x52, 0x3E], // 'g'
    [0x7F, 0x08, 0x04, 0x04, 0x78], // 'h'
    [0x00, 0x44, 0x7D, 0x40, 0x00], // 'i'
    [0x20, 0x40, 0x44, 0x3D, 0x00], // 'j'
    [0x7F, 0x10, 0x28, 0x44, 0x00], // 'k'
    [0x00, 0x41, 0x7F, 0x40, 0x00], // 'l'
    [0x7C, 0x04, 0x18, 0x04, 0x78], // 'm'
    [0x7C, 0x08, 0x04, 0x04, 0x78], // 'n'
    [0x38, 0x44, 0x44, 0x44, 0x38], // 'o'
    [0x7C, 0x14, 0x14, 0x14, 0x08], // 'p'
    [0x08, 0x14, 0x14, 0x18, 0x7C], // 'q'
    [0x7C, 0x08, 0x04, 0x04, 0x08], // 'r'
    [0x48, 0x54, 0x54, 0x54, 0x20], // 's'
    [0x04, 0x3F, 0x44, 0x40, 0x20], // 't'
    [0x3C, 0x40, 0x40, 0x20, 0x7C], // 'u'
    [0x1C, 0x20, 0x40, 0x20, 0x1C], // 'v'
    [0x3C, 0x40, 0x30, 0x40, 0x3C], // 'w'
    [0x44, 0x28, 0x10, 0x28, 0x44], // 'x'
    [0x0C, 0x50, 0x50, 0x50, 0x3C], // 'y'
    [0x44, 0x64, 0x54, 0x4C, 0x44], // 'z'
    [0x00, 0x08, 0x36, 0x41, 0x00], // '{'
    [0x00, 0x00, 0x7F, 0x00, 0x00], // '|'
    [0x00, 0x41, 0x36, 0x08, 0x00], // '}'
    [0x10, 0x08, 0x08, 0x10, 0x08], // '~'
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontWeight {
    Regular,
    /// Every column is smeared one unit to the right.
    Bold,
}

/// A bitmap face: the built-in glyph set at a given weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitmapFont {
    pub name: &'static str,
    pub weight: FontWeight,
}

pub const SANS_BOLD: BitmapFont = BitmapFont {
    name: "builtin-sans-bold",
    weight: FontWeight::Bold,
};

pub const MONO_REGULAR: BitmapFont = BitmapFont {
    name: "builtin-mono",
    weight: FontWeight::Regular,
};

impl BitmapFont {
    /// Glyph width in units, including bold smear.
    pub fn glyph_width(&self) -> u32 {
        match self.weight {
            FontWeight::Regular => GLYPH_WIDTH,
            FontWeight::Bold => GLYPH_WIDTH + 1,
        }
    }

    pub fn advance(&self) -> u32 {
        self.glyph_width() + LETTER_SPACING
    }

    pub fn line_pitch(&self) -> u32 {
        GLYPH_HEIGHT + LINE_GAP
    }

    /// Pixels per font unit at `font_size`.
    pub fn scale(&self, font_size: f32) -> f32 {
        font_size / UNITS_PER_EM
    }

    /// Width of a line of `chars` glyphs, without trailing spacing.
    pub fn line_width(&self, chars: usize) -> u32 {
        if chars == 0 {
            return 0;
        }
        chars as u32 * self.advance() - LETTER_SPACING
    }

    /// Whether unit cell (`col`, `row`) of `ch` is inked.
    pub fn is_set(&self, ch: char, col: u32, row: u32) -> bool {
        if row >= GLYPH_HEIGHT || col >= self.glyph_width() {
            return false;
        }
        let columns = glyph_columns(ch);
        let inked = |c: u32| c < GLYPH_WIDTH && columns[c as usize] & (1 << row) != 0;
        match self.weight {
            FontWeight::Regular => inked(col),
            FontWeight::Bold => inked(col) || (col > 0 && inked(col - 1)),
        }
    }
}

fn glyph_columns(ch: char) -> &'static [u8; 5] {
    let code = match ch {
        '\t' => FIRST_CHAR,
        ' '..='~' => ch as u8,
        _ => FALLBACK_CHAR,
    };
    &GLYPHS[(code - FIRST_CHAR) as usize]
}

/// Maps family names (CSS-style, case-insensitive) to built-in faces.
#[derive(Debug, Clone)]
pub struct FontRegistry {
    families: HashMap<String, BitmapFont>,
    fallback: BitmapFont,
}

impl Default for FontRegistry {
    fn default() -> Self {
        let mut registry = Self {
            families: HashMap::new(),
            fallback: SANS_BOLD,
        };
        for family in [
            "sans-serif", "serif", "arial", "helvetica", "impact", "verdana", "tahoma",
            "georgia", "times new roman", "system-ui",
        ] {
            registry.register(family, SANS_BOLD);
        }
        for family in ["monospace", "courier", "courier new", "consolas", "menlo"] {
            registry.register(family, MONO_REGULAR);
        }
        registry
    }
}

impl FontRegistry {
    pub fn register(&mut self, family: &str, font: BitmapFont) {
        self.families.insert(normalize(family), font);
    }

    /// Resolve the first known family in a comma-separated list.
    pub fn resolve(&self, family_list: &str) -> BitmapFont {
        for family in family_list.split(',') {
            if let Some(font) = self.families.get(&normalize(family)) {
                return *font;
            }
        }
        debug!(
            stage = "overlay",
            family = family_list,
            fallback = self.fallback.name,
            "Unknown font family, using fallback face"
        );
        self.fallback
    }
}

fn normalize(family: &str) -> String {
    family
        .trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .to_ascii_lowercase()
}

//! GIF-flavored LZW.
//!
//! Codes are packed least-significant-bit first. The code width starts at
//! `min_code_size + 1` bits and grows with the dictionary up to 12 bits. Code
//! `1 << min_code_size` is Clear and the one after it is End-of-Information.
//! Sub-block framing is left to the caller.

use std::collections::HashMap;

use thiserror::Error;

/// Widest code GIF allows.
pub const MAX_CODE_BITS: u8 = 12;
/// Dictionary capacity implied by [`MAX_CODE_BITS`].
pub const MAX_CODES: usize = 1 << MAX_CODE_BITS;
/// Literals are palette indices, so they must fit in a byte.
pub const MAX_MIN_CODE_SIZE: u8 = 8;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LzwError {
    #[error("minimum code size {0} is outside 1..=8")]
    InvalidMinCodeSize(u8),

    #[error("symbol {symbol} does not fit in a {min_code_size}-bit alphabet")]
    SymbolOutOfRange { symbol: u8, min_code_size: u8 },

    #[error("code {code} exceeds the dictionary size {next}")]
    CodeOutOfRange { code: u16, next: u16 },

    #[error("stream ended after {produced} of {expected} pixels")]
    UnexpectedEnd { produced: usize, expected: usize },
}

/// Smallest legal GIF minimum code size able to carry `palette_len` symbols.
pub fn min_code_size_for(palette_len: usize) -> u8 {
    let mut bits = 2u8;
    while (1usize << bits) < palette_len && bits < 8 {
        bits += 1;
    }
    bits
}

fn check_min_code_size(min_code_size: u8) -> Result<(), LzwError> {
    if (1..=MAX_MIN_CODE_SIZE).contains(&min_code_size) {
        Ok(())
    } else {
        Err(LzwError::InvalidMinCodeSize(min_code_size))
    }
}

/// Compress a sequence of palette indices.
///
/// Every symbol must be below `1 << min_code_size`.
pub fn encode(indices: &[u8], min_code_size: u8) -> Result<Vec<u8>, LzwError> {
    check_min_code_size(min_code_size)?;
    let clear_code = 1u16 << min_code_size;
    let eoi_code = clear_code + 1;
    let check = |symbol: u8| {
        if (symbol as u16) < clear_code {
            Ok(symbol)
        } else {
            Err(LzwError::SymbolOutOfRange { symbol, min_code_size })
        }
    };

    let mut output = BitWriter::with_capacity(indices.len() / 2 + 16);
    let mut code_size = min_code_size + 1;
    let mut next_code = eoi_code + 1;
    let mut table: HashMap<(u16, u8), u16> = HashMap::with_capacity(MAX_CODES);

    output.write_bits(clear_code, code_size);

    let mut symbols = indices.iter();
    let Some(&first) = symbols.next() else {
        output.write_bits(eoi_code, code_size);
        return Ok(output.finish());
    };
    let mut prefix = check(first)? as u16;

    for &symbol in symbols {
        let symbol = check(symbol)?;
        if let Some(&code) = table.get(&(prefix, symbol)) {
            prefix = code;
            continue;
        }

        output.write_bits(prefix, code_size);

        if next_code as usize == MAX_CODES {
            // Dictionary full: start over.
            output.write_bits(clear_code, code_size);
            table.clear();
            code_size = min_code_size + 1;
            next_code = eoi_code + 1;
        } else {
            table.insert((prefix, symbol), next_code);
            next_code += 1;
            // The decoder learns each entry one code late, hence `>` rather than `>=`.
            if next_code > (1 << code_size) && code_size < MAX_CODE_BITS {
                code_size += 1;
            }
        }

        prefix = symbol as u16;
    }

    output.write_bits(prefix, code_size);
    output.write_bits(eoi_code, code_size);

    Ok(output.finish())
}

/// Decompress an LZW stream into exactly `expected_len` palette indices.
///
/// Codes past `expected_len` pixels are ignored; a stream that stops short is an error.
/// The dictionary starts out cleared, so a leading Clear code is optional.
pub fn decode(data: &[u8], min_code_size: u8, expected_len: usize) -> Result<Vec<u8>, LzwError> {
    check_min_code_size(min_code_size)?;
    if expected_len == 0 {
        return Ok(Vec::new());
    }

    let clear_code = 1u16 << min_code_size;
    let eoi_code = clear_code + 1;

    let mut table = DecodeTable::new(clear_code);
    let mut reader = BitReader::new(data);
    let mut output = Vec::with_capacity(expected_len);
    let mut code_size = min_code_size + 1;
    let mut prev: Option<u16> = None;

    while output.len() < expected_len {
        let Some(code) = reader.read_bits(code_size) else {
            break;
        };

        if code == clear_code {
            table.reset();
            code_size = min_code_size + 1;
            prev = None;
            continue;
        }
        if code == eoi_code {
            break;
        }

        let next = table.next_code();
        let Some(prev_code) = prev else {
            // First code after a clear must be a literal.
            if code >= clear_code {
                return Err(LzwError::CodeOutOfRange { code, next });
            }
            output.push(code as u8);
            prev = Some(code);
            continue;
        };

        let first = if code < next {
            table.append_string(code, &mut output);
            table.first_symbol(code)
        } else if code == next {
            // The KwKwK case: the code being defined by this very step.
            let first = table.first_symbol(prev_code);
            table.append_string(prev_code, &mut output);
            output.push(first);
            first
        } else {
            return Err(LzwError::CodeOutOfRange { code, next });
        };

        if (next as usize) < MAX_CODES {
            table.push(prev_code, first);
            if table.next_code() == (1 << code_size) && code_size < MAX_CODE_BITS {
                code_size += 1;
            }
        }
        prev = Some(code);
    }

    if output.len() < expected_len {
        return Err(LzwError::UnexpectedEnd {
            produced: output.len(),
            expected: expected_len,
        });
    }
    output.truncate(expected_len);
    Ok(output)
}

/// Prefix/suffix dictionary; strings are rebuilt by walking prefixes backwards.
struct DecodeTable {
    prefix: Vec<u16>,
    suffix: Vec<u8>,
    first: Vec<u8>,
    length: Vec<u16>,
    reserved: usize,
}

impl DecodeTable {
    fn new(clear_code: u16) -> Self {
        let mut table = Self {
            prefix: Vec::with_capacity(MAX_CODES),
            suffix: Vec::with_capacity(MAX_CODES),
            first: Vec::with_capacity(MAX_CODES),
            length: Vec::with_capacity(MAX_CODES),
            reserved: clear_code as usize + 2,
        };
        table.reset();
        table
    }

    fn reset(&mut self) {
        self.prefix.clear();
        self.suffix.clear();
        self.first.clear();
        self.length.clear();
        for code in 0..self.reserved {
            // Clear and EOI occupy slots but never expand.
            self.prefix.push(0);
            self.suffix.push(code as u8);
            self.first.push(code as u8);
            self.length.push(1);
        }
    }

    fn next_code(&self) -> u16 {
        self.prefix.len() as u16
    }

    fn first_symbol(&self, code: u16) -> u8 {
        self.first[code as usize]
    }

    fn push(&mut self, prefix: u16, symbol: u8) {
        let p = prefix as usize;
        self.prefix.push(prefix);
        self.suffix.push(symbol);
        self.first.push(self.first[p]);
        self.length.push(self.length[p] + 1);
    }

    fn append_string(&self, code: u16, output: &mut Vec<u8>) {
        let len = self.length[code as usize] as usize;
        let start = output.len();
        output.resize(start + len, 0);
        let mut code = code as usize;
        for slot in output[start..].iter_mut().rev() {
            *slot = self.suffix[code];
            code = self.prefix[code] as usize;
        }
    }
}

struct BitWriter {
    data: Vec<u8>,
    current: u32,
    bits: u32,
}

impl BitWriter {
    fn with_capacity(capacity: usize) -> Self {
        BitWriter {
            data: Vec::with_capacity(capacity),
            current: 0,
            bits: 0,
        }
    }

    fn write_bits(&mut self, value: u16, num_bits: u8) {
        self.current |= (value as u32) << self.bits;
        self.bits += num_bits as u32;
        while self.bits >= 8 {
            self.data.push(self.current as u8);
            self.current >>= 8;
            self.bits -= 8;
        }
    }

    fn finish(mut self) -> Vec<u8> {
        if self.bits > 0 {
            self.data.push(self.current as u8);
        }
        self.data
    }
}

struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
    acc: u32,
    bits: u8,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            acc: 0,
            bits: 0,
        }
    }

    fn read_bits(&mut self, width: u8) -> Option<u16> {
        while self.bits < width {
            let byte = *self.data.get(self.pos)?;
            self.pos += 1;
            self.acc |= (byte as u32) << self.bits;
            self.bits += 8;
        }
        let code = (self.acc & ((1u32 << width) - 1)) as u16;
        self.acc >>= width;
        self.bits -= width;
        Some(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_min_code_size_for() {
        assert_eq!(min_code_size_for(1), 2);
        assert_eq!(min_code_size_for(2), 2);
        assert_eq!(min_code_size_for(4), 2);
        assert_eq!(min_code_size_for(5), 3);
        assert_eq!(min_code_size_for(8), 3);
        assert_eq!(min_code_size_for(16), 4);
        assert_eq!(min_code_size_for(256), 8);
    }

    #[test]
    fn test_empty_input_is_clear_then_eoi() {
        // Clear (4) then EOI (5), both 3 bits wide: 0b101_100.
        assert_eq!(encode(&[], 2).unwrap(), vec![0b0010_1100]);
    }

    #[test]
    fn test_known_stream() {
        // Classic 10x10 sample from the GIF89a walkthrough, first row only.
        let indices = [1, 1, 1, 1, 1, 2, 2, 2, 2, 2];
        let encoded = encode(&indices, 2).unwrap();
        assert_eq!(decode(&encoded, 2, indices.len()).unwrap(), indices);
        // Clear, 1, 6(1,1), 6, 2, 9(2,2), 9, 5 would be 8 codes of 3 bits; ensure it compressed.
        assert!(encoded.len() <= 4, "got {} bytes", encoded.len());
    }

    #[test]
    fn test_kwkwk_sequence() {
        let indices = vec![0u8; 64];
        let encoded = encode(&indices, 2).unwrap();
        assert_eq!(decode(&encoded, 2, 64).unwrap(), indices);
    }

    #[test]
    fn test_dictionary_reset_round_trip() {
        // Pseudo-random bytes force the table past 4096 entries several times.
        let mut state = 0x1234_5678u32;
        let indices: Vec<u8> = (0..50_000)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                state as u8
            })
            .collect();
        let encoded = encode(&indices, 8).unwrap();
        assert_eq!(decode(&encoded, 8, indices.len()).unwrap(), indices);
    }

    #[test]
    fn test_symbol_out_of_range() {
        assert_eq!(
            encode(&[0, 4], 2),
            Err(LzwError::SymbolOutOfRange { symbol: 4, min_code_size: 2 })
        );
    }

    #[test]
    fn test_leading_clear_is_optional() {
        // Codes 1, 1, 6 (= 1,1) with no Clear in front. Defining code 7 fills
        // the 3-bit range, so 2 and EOI follow at 4 bits.
        let mut writer = BitWriter::with_capacity(4);
        for code in [1, 1, 6] {
            writer.write_bits(code, 3);
        }
        writer.write_bits(2, 4);
        writer.write_bits(5, 4);
        assert_eq!(decode(&writer.finish(), 2, 5).unwrap(), vec![1, 1, 1, 1, 2]);
    }

    #[test]
    fn test_first_code_must_be_literal() {
        // Without a Clear, a dictionary code up front has nothing to expand.
        let mut writer = BitWriter::with_capacity(2);
        writer.write_bits(6, 3);
        writer.write_bits(5, 3);
        assert!(matches!(
            decode(&writer.finish(), 2, 1),
            Err(LzwError::CodeOutOfRange { code: 6, .. })
        ));
    }

    #[test]
    fn test_wide_min_code_size_is_rejected() {
        // Clear (512), literal 300, EOI (513) at 10 bits: 300 is not a palette index.
        let mut writer = BitWriter::with_capacity(4);
        for code in [512, 300, 513] {
            writer.write_bits(code, 10);
        }
        let data = writer.finish();
        assert_eq!(decode(&data, 9, 1), Err(LzwError::InvalidMinCodeSize(9)));
        assert_eq!(decode(&data, 0, 1), Err(LzwError::InvalidMinCodeSize(0)));
        assert_eq!(encode(&[1], 9), Err(LzwError::InvalidMinCodeSize(9)));
    }

    #[test]
    fn test_code_out_of_range() {
        // Clear (4), literal 0, then code 7 while the next free code is 6.
        let mut writer = BitWriter::with_capacity(4);
        writer.write_bits(4, 3);
        writer.write_bits(0, 3);
        writer.write_bits(7, 3);
        let data = writer.finish();
        assert!(matches!(decode(&data, 2, 8), Err(LzwError::CodeOutOfRange { code: 7, .. })));
    }

    #[test]
    fn test_short_stream() {
        let encoded = encode(&[1, 2, 3], 2).unwrap();
        assert_eq!(
            decode(&encoded, 2, 10),
            Err(LzwError::UnexpectedEnd { produced: 3, expected: 10 })
        );
    }

    #[test]
    fn test_extra_pixels_are_ignored() {
        let encoded = encode(&[1, 2, 3, 0], 2).unwrap();
        assert_eq!(decode(&encoded, 2, 2).unwrap(), vec![1, 2]);
    }
}

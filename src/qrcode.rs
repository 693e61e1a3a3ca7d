//! QR code symbol encoding.
//!
//! This module turns input text into a QR Code Model 2 symbol: a square grid
//! of dark and light modules. It supports versions 1 to 40 and all four error
//! correction levels. Data is always encoded as a single byte-mode segment
//! (UTF-8); requests for any other mode fail with
//! [`EncodeError::UnsupportedMode`].

use std::str::FromStr;

use log::debug;
use once_cell::sync::Lazy;
use thiserror::Error;

/// A QR Code symbol, representing a square grid of dark and light modules.
///
/// Instances are immutable after creation and carry no reference to the input
/// text. Encoding is a pure function of its inputs: the same text and error
/// correction level always produce a bit-identical symbol.
///
/// # Example
///
/// ```rust
/// use qrsym::qrcode::{QrCode, EccLevel};
///
/// let qr = QrCode::encode_text("Hello, World!", EccLevel::Medium).unwrap();
/// println!("Version: {}", qr.version().value());
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct QrCode {
    /// The version number, between 1 and 40 (inclusive).
    version: Version,

    /// The width and height of this QR Code, measured in modules, between
    /// 21 and 177 (inclusive). This is equal to version * 4 + 17.
    size: i32,

    /// The error correction level used in this QR Code.
    ecl: EccLevel,

    /// The mask pattern applied to this QR Code.
    mask: Mask,

    /// The modules of this QR Code (false = light, true = dark), in row-major
    /// order. Immutable after the constructor finishes.
    modules: Vec<bool>,

    /// Co-indexed with `modules`: true for function modules (finder, timing,
    /// alignment, format/version info, dark module), which masking never
    /// touches. Write-once during layout.
    isfunction: Vec<bool>,
}

impl QrCode {
    /// Encodes a text string into a QR code at the default error correction
    /// level, [`EccLevel::High`].
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError::DataTooLong`] if the UTF-8 payload does not fit
    /// at version 40.
    pub fn encode(text: &str) -> Result<Self, EncodeError> {
        Self::encode_text(text, EccLevel::default())
    }

    /// Encodes a text string into a QR code at the given error correction
    /// level.
    ///
    /// The text is encoded as one byte-mode segment containing its UTF-8
    /// bytes, so the full Unicode range is accepted. The smallest version
    /// that can hold the payload at the requested level is selected. An empty
    /// string is valid and encodes at version 1.
    ///
    /// # Example
    ///
    /// ```rust
    /// use qrsym::qrcode::{QrCode, EccLevel};
    ///
    /// let qr = QrCode::encode_text("https://example.com", EccLevel::High).unwrap();
    /// assert_eq!(qr.size(), i32::from(qr.version().value()) * 4 + 17);
    /// ```
    pub fn encode_text(text: &str, ecl: EccLevel) -> Result<Self, EncodeError> {
        let seg = QrSegment::make_bytes(text.as_bytes());
        Self::encode_segments(&[seg], ecl, Version::MIN)
    }

    /// Encodes segments into a QR code at the given error correction level,
    /// starting the version search at `min_version`.
    ///
    /// This is the full pipeline: version search, bit packing with terminator
    /// and pad bytes, Reed-Solomon error correction per block, block
    /// interleaving, module placement, and penalty-based mask selection. The
    /// requested level is used as given and never adjusted.
    pub fn encode_segments(
        segs: &[QrSegment],
        ecl: EccLevel,
        min_version: Version
    ) -> Result<Self, EncodeError> {
        // Find the minimal version number to use
        let mut version: Version = min_version;
        let datausedbits: usize = loop {
            let datacapacitybits: usize = QrCode::num_data_codewords(version, ecl) * 8;
            let dataused: Option<usize> = QrSegment::total_bits(segs, version);
            if dataused.map_or(false, |n| n <= datacapacitybits) {
                break dataused.unwrap();
            } else if version >= Version::MAX {
                return Err(match dataused {
                    None => EncodeError::SegmentTooLong,
                    Some(n) =>
                        EncodeError::DataTooLong {
                            needed: n,
                            capacity: datacapacitybits,
                        },
                });
            } else {
                version = Version::new(version.value() + 1);
            }
        };
        debug!(
            "version {} selected at {:?}, {} data bits used",
            version.value(),
            ecl,
            datausedbits
        );

        // Concatenate all segments to create the data bit string
        let datacapacitybits: usize = QrCode::num_data_codewords(version, ecl) * 8;
        let mut bb = BitBuffer::new();
        for seg in segs {
            bb.append_bits(seg.mode.mode_bits(), 4);
            // total_bits() already proved num_chars fits the count indicator
            bb.append_bits(seg.num_chars as u32, seg.mode.char_count_bits(version));
            for &b in &seg.data {
                bb.append_bits(b.into(), 8);
            }
        }
        debug_assert_eq!(bb.len(), datausedbits);

        // Add terminator and pad up to a byte if applicable
        let numzerobits: usize = 4.min(datacapacitybits - bb.len());
        bb.append_bits(0, numzerobits as u8);
        let numzerobits: usize = bb.len().wrapping_neg() & 7;
        bb.append_bits(0, numzerobits as u8);
        debug_assert_eq!(bb.len() % 8, 0);

        // Pad with alternating bytes until data capacity is reached
        for &padbyte in [0xec, 0x11].iter().cycle() {
            if bb.len() >= datacapacitybits {
                break;
            }
            bb.append_bits(padbyte, 8);
        }
        debug_assert_eq!(bb.len(), datacapacitybits);

        Ok(Self::with_codewords(version, ecl, &bb.to_bytes()))
    }

    /// Creates a new QR Code with the given version number, error correction
    /// level, and data codeword bytes.
    ///
    /// Draws the function patterns, fills the remaining modules with the
    /// interleaved data and error correction codewords, and applies the
    /// lowest-penalty mask.
    fn with_codewords(version: Version, ecl: EccLevel, datacodewords: &[u8]) -> Self {
        let size = i32::from(version.num_modules());
        let numcells = (size * size) as usize;
        let mut result = Self {
            version,
            size,
            ecl,
            mask: Mask::new(0),
            modules: vec![false; numcells],
            isfunction: vec![false; numcells],
        };
        result.draw_function_patterns();
        let allcodewords: Vec<u8> = result.add_ecc_and_interleave(datacodewords);
        result.draw_codewords(&allcodewords);
        result.select_mask();
        result
    }

    /// Returns this QR Code's version, in the range [1, 40].
    pub fn version(&self) -> Version {
        self.version
    }

    /// Returns this QR Code's size, in the range [21, 177].
    pub fn size(&self) -> i32 {
        self.size
    }

    /// Returns this QR Code's error correction level.
    pub fn error_correction_level(&self) -> EccLevel {
        self.ecl
    }

    /// Returns this QR Code's mask, in the range [0, 7].
    pub fn mask(&self) -> Mask {
        self.mask
    }

    /// Returns the color of the module at the given coordinates.
    ///
    /// Returns `true` for dark modules and `false` for light modules.
    /// Coordinates outside the QR code's bounds return `false`, so the quiet
    /// zone can be read through the same accessor.
    ///
    /// # Arguments
    ///
    /// * `x` - X-coordinate (0 is left).
    /// * `y` - Y-coordinate (0 is top).
    pub fn get_module(&self, x: i32, y: i32) -> bool {
        let range = 0..self.size;
        range.contains(&x) && range.contains(&y) && self.modules[self.index(x, y)]
    }

    fn index(&self, x: i32, y: i32) -> usize {
        debug_assert!((0..self.size).contains(&x) && (0..self.size).contains(&y));
        (y * self.size + x) as usize
    }

    /// Sets the module at the given coordinates and marks it as a function
    /// module, shielding it from masking.
    fn set_function_module(&mut self, x: i32, y: i32, isdark: bool) {
        let index = self.index(x, y);
        self.modules[index] = isdark;
        self.isfunction[index] = true;
    }

    /*---- Function pattern layout ----*/

    fn draw_function_patterns(&mut self) {
        // Timing patterns
        for i in 0..self.size {
            self.set_function_module(6, i, i % 2 == 0);
            self.set_function_module(i, 6, i % 2 == 0);
        }

        // Finder patterns with separators (overwrites some timing modules)
        self.draw_finder_pattern(3, 3);
        self.draw_finder_pattern(self.size - 4, 3);
        self.draw_finder_pattern(3, self.size - 4);

        // Alignment patterns, skipping the three finder corners
        let alignpatpos: Vec<i32> = self.alignment_pattern_positions();
        let numalign: usize = alignpatpos.len();
        for i in 0..numalign {
            for j in 0..numalign {
                if
                    !(
                        (i == 0 && j == 0) ||
                        (i == 0 && j == numalign - 1) ||
                        (i == numalign - 1 && j == 0)
                    )
                {
                    self.draw_alignment_pattern(alignpatpos[i], alignpatpos[j]);
                }
            }
        }

        // Reserves the format info cells as function modules; the real bits
        // are drawn during mask selection
        self.draw_format_bits(Mask::new(0));
        self.draw_version();
    }

    /// Draws a finder pattern with its separator ring, centered at (x, y).
    /// Modules outside the grid are clipped.
    fn draw_finder_pattern(&mut self, x: i32, y: i32) {
        for dy in -4i32..=4 {
            for dx in -4i32..=4 {
                let dist: i32 = dx.abs().max(dy.abs());
                let (xx, yy) = (x + dx, y + dy);
                if (0..self.size).contains(&xx) && (0..self.size).contains(&yy) {
                    self.set_function_module(xx, yy, dist != 2 && dist != 4);
                }
            }
        }
    }

    /// Draws a 5x5 alignment pattern centered at (x, y). Always in bounds.
    fn draw_alignment_pattern(&mut self, x: i32, y: i32) {
        for dy in -2..=2 {
            for dx in -2..=2 {
                self.set_function_module(x + dx, y + dy, dx.abs().max(dy.abs()) != 1);
            }
        }
    }

    /// Draws the two copies of the format bits (error correction level and
    /// mask) plus the dark module.
    fn draw_format_bits(&mut self, mask: Mask) {
        // 5 data bits, 10 BCH error correction bits, XOR mask pattern
        let bits: u32 = {
            let data = u32::from((self.ecl.format_bits() << 3) | mask.value());
            let mut rem: u32 = data;
            for _ in 0..10 {
                rem = (rem << 1) ^ ((rem >> 9) * 0x537);
            }
            ((data << 10) | rem) ^ 0x5412
        };
        debug_assert_eq!(bits >> 15, 0);

        // First copy, around the top-left finder pattern
        for i in 0..6 {
            self.set_function_module(8, i, get_bit(bits, i));
        }
        self.set_function_module(8, 7, get_bit(bits, 6));
        self.set_function_module(8, 8, get_bit(bits, 7));
        self.set_function_module(7, 8, get_bit(bits, 8));
        for i in 9..15 {
            self.set_function_module(14 - i, 8, get_bit(bits, i));
        }

        // Second copy, split between the other two finder patterns
        let size = self.size;
        for i in 0..8 {
            self.set_function_module(size - 1 - i, 8, get_bit(bits, i));
        }
        for i in 8..15 {
            self.set_function_module(8, size - 15 + i, get_bit(bits, i));
        }
        self.set_function_module(8, size - 8, true); // Dark module
    }

    /// Draws the two copies of the version bits, for versions 7 and up.
    fn draw_version(&mut self) {
        let ver = u32::from(self.version.value());
        if ver < 7 {
            return;
        }

        // 6 data bits, 12 BCH error correction bits
        let bits: u32 = {
            let mut rem: u32 = ver;
            for _ in 0..12 {
                rem = (rem << 1) ^ ((rem >> 11) * 0x1f25);
            }
            (ver << 12) | rem
        };
        debug_assert_eq!(bits >> 18, 0);

        for i in 0..18 {
            let bit: bool = get_bit(bits, i);
            let a: i32 = self.size - 11 + i % 3;
            let b: i32 = i / 3;
            self.set_function_module(a, b, bit);
            self.set_function_module(b, a, bit);
        }
    }

    /// Returns the center coordinates of the alignment patterns for this
    /// version, in ascending order. Empty for version 1.
    fn alignment_pattern_positions(&self) -> Vec<i32> {
        let ver: u8 = self.version.value();
        if ver == 1 {
            vec![]
        } else {
            let numalign = i32::from(ver) / 7 + 2;
            let step: i32 = if ver == 32 {
                26
            } else {
                ((i32::from(ver) * 4 + numalign * 2 + 1) / (numalign * 2 - 2)) * 2
            };
            let mut result: Vec<i32> = (0..numalign - 1)
                .map(|i| self.size - 7 - i * step)
                .collect();
            result.push(6);
            result.reverse();
            result
        }
    }

    /*---- Error correction and codeword placement ----*/

    /// Splits the data codewords into blocks, appends the Reed-Solomon
    /// remainder to each block, and interleaves the blocks byte by byte into
    /// the final codeword sequence.
    fn add_ecc_and_interleave(&self, data: &[u8]) -> Vec<u8> {
        let (ver, ecl) = (self.version, self.ecl);
        assert_eq!(data.len(), QrCode::num_data_codewords(ver, ecl), "Illegal argument");

        let numblocks: usize = table_get(&NUM_ERROR_CORRECTION_BLOCKS, ver, ecl);
        let blockecclen: usize = table_get(&ECC_CODEWORDS_PER_BLOCK, ver, ecl);
        let rawcodewords: usize = QrCode::num_raw_data_modules(ver) / 8;
        let numshortblocks: usize = numblocks - (rawcodewords % numblocks);
        let shortblockdatalen: usize = rawcodewords / numblocks - blockecclen;

        // Split data into blocks and append ECC to each block. Short blocks
        // get a placeholder byte so every block has equal length; the
        // interleave loop skips it.
        let rs = ReedSolomonGenerator::new(blockecclen);
        let mut blocks: Vec<Vec<u8>> = Vec::with_capacity(numblocks);
        let mut k: usize = 0;
        for i in 0..numblocks {
            let datlen: usize = shortblockdatalen + usize::from(i >= numshortblocks);
            let dat = &data[k..k + datlen];
            k += datlen;
            let mut block: Vec<u8> = dat.to_vec();
            let ecc: Vec<u8> = rs.compute_remainder(dat);
            if i < numshortblocks {
                block.push(0);
            }
            block.extend_from_slice(&ecc);
            blocks.push(block);
        }
        debug_assert_eq!(k, data.len());

        // Interleave one byte from each block in round-robin order
        let mut result: Vec<u8> = Vec::with_capacity(rawcodewords);
        for i in 0..blocks[0].len() {
            for (j, block) in blocks.iter().enumerate() {
                if i != shortblockdatalen || j >= numshortblocks {
                    result.push(block[i]);
                }
            }
        }
        debug_assert_eq!(result.len(), rawcodewords);
        result
    }

    /// Fills all non-function modules with the codeword bitstream, MSB first
    /// per byte, in the zigzag column-pair traversal: right-to-left pairs of
    /// columns, alternating upward and downward, skipping the vertical timing
    /// column.
    fn draw_codewords(&mut self, data: &[u8]) {
        assert_eq!(
            data.len(),
            QrCode::num_raw_data_modules(self.version) / 8,
            "Illegal argument"
        );
        let size: i32 = self.size;
        let mut i: usize = 0; // Bit index into the data
        let mut right: i32 = size - 1;
        while right >= 1 {
            if right == 6 {
                right = 5;
            }
            for vert in 0..size {
                for j in 0..2 {
                    let x: i32 = right - j;
                    let upward: bool = ((right + 1) & 2) == 0;
                    let y: i32 = if upward { size - 1 - vert } else { vert };
                    let index = self.index(x, y);
                    if !self.isfunction[index] && i < data.len() * 8 {
                        self.modules[index] = get_bit(data[i >> 3].into(), 7 - ((i as i32) & 7));
                        i += 1;
                    }
                }
            }
            right -= 2;
        }
        debug_assert_eq!(i, data.len() * 8);
    }

    /*---- Masking ----*/

    /// Tries all 8 mask patterns and keeps the one with the lowest penalty
    /// score. Ties go to the lowest mask index.
    fn select_mask(&mut self) {
        let mut minpenalty = i32::MAX;
        let mut best = Mask::new(0);
        for i in 0u8..8 {
            let mask = Mask::new(i);
            self.apply_mask(mask);
            self.draw_format_bits(mask);
            let penalty: i32 = self.penalty_score();
            if penalty < minpenalty {
                best = mask;
                minpenalty = penalty;
            }
            self.apply_mask(mask); // Undoes the mask due to XOR
        }
        debug!("mask {} selected with penalty {}", best.value(), minpenalty);
        self.apply_mask(best);
        self.draw_format_bits(best);
        self.mask = best;
    }

    /// XORs the mask predicate onto every data module. Function modules are
    /// untouched. Applying the same mask twice restores the matrix.
    fn apply_mask(&mut self, mask: Mask) {
        for y in 0..self.size {
            for x in 0..self.size {
                let invert: bool = match mask.value() {
                    0 => (x + y) % 2 == 0,
                    1 => y % 2 == 0,
                    2 => x % 3 == 0,
                    3 => (x + y) % 3 == 0,
                    4 => (x / 3 + y / 2) % 2 == 0,
                    5 => ((x * y) % 2) + ((x * y) % 3) == 0,
                    6 => (((x * y) % 2) + ((x * y) % 3)) % 2 == 0,
                    7 => (((x + y) % 2) + ((x * y) % 3)) % 2 == 0,
                    _ => unreachable!(),
                };
                let index = self.index(x, y);
                self.modules[index] ^= invert && !self.isfunction[index];
            }
        }
    }

    /// Computes the four-component penalty score of the current matrix:
    /// same-color runs of 5 or more, 2x2 blocks, finder-like 1:1:3:1:1
    /// patterns, and dark/light imbalance.
    fn penalty_score(&self) -> i32 {
        let mut result: i32 = 0;
        let size: i32 = self.size;

        // Adjacent modules in row having same color, and finder-like patterns
        for y in 0..size {
            let mut runcolor = false;
            let mut runx: i32 = 0;
            let mut runhistory = FinderPenalty::new(size);
            for x in 0..size {
                if self.get_module(x, y) == runcolor {
                    runx += 1;
                    if runx == 5 {
                        result += PENALTY_N1;
                    } else if runx > 5 {
                        result += 1;
                    }
                } else {
                    runhistory.add_history(runx);
                    if !runcolor {
                        result += runhistory.count_patterns() * PENALTY_N3;
                    }
                    runcolor = self.get_module(x, y);
                    runx = 1;
                }
            }
            result += runhistory.terminate_and_count(runcolor, runx) * PENALTY_N3;
        }

        // Adjacent modules in column having same color, and finder-like patterns
        for x in 0..size {
            let mut runcolor = false;
            let mut runy: i32 = 0;
            let mut runhistory = FinderPenalty::new(size);
            for y in 0..size {
                if self.get_module(x, y) == runcolor {
                    runy += 1;
                    if runy == 5 {
                        result += PENALTY_N1;
                    } else if runy > 5 {
                        result += 1;
                    }
                } else {
                    runhistory.add_history(runy);
                    if !runcolor {
                        result += runhistory.count_patterns() * PENALTY_N3;
                    }
                    runcolor = self.get_module(x, y);
                    runy = 1;
                }
            }
            result += runhistory.terminate_and_count(runcolor, runy) * PENALTY_N3;
        }

        // 2x2 blocks of modules having same color
        for y in 0..size - 1 {
            for x in 0..size - 1 {
                let color: bool = self.get_module(x, y);
                if
                    color == self.get_module(x + 1, y) &&
                    color == self.get_module(x, y + 1) &&
                    color == self.get_module(x + 1, y + 1)
                {
                    result += PENALTY_N2;
                }
            }
        }

        // Balance of dark and light modules
        let dark = self.modules
            .iter()
            .filter(|&&m| m)
            .count() as i32;
        let total: i32 = size * size;
        // Percentage deviation from 50%, in steps of 5%
        let k: i32 = ((dark * 20 - total * 10).abs() + total - 1) / total - 1;
        result += k * PENALTY_N4;
        result
    }

    /*---- Capacity tables ----*/

    /// Returns the number of modules available for codeword bits at the given
    /// version, after all function patterns are excluded.
    fn num_raw_data_modules(ver: Version) -> usize {
        let ver = usize::from(ver.value());
        let mut result: usize = (16 * ver + 128) * ver + 64;
        if ver >= 2 {
            let numalign: usize = ver / 7 + 2;
            result -= (25 * numalign - 10) * numalign - 55;
            if ver >= 7 {
                result -= 36;
            }
        }
        result
    }

    /// Returns the number of 8-bit data codewords that can be stored at the
    /// given version and error correction level, once ECC codewords are
    /// subtracted.
    fn num_data_codewords(ver: Version, ecl: EccLevel) -> usize {
        QrCode::num_raw_data_modules(ver) / 8 -
            table_get(&ECC_CODEWORDS_PER_BLOCK, ver, ecl) *
                table_get(&NUM_ERROR_CORRECTION_BLOCKS, ver, ecl)
    }
}

fn table_get(table: &'static [[i8; 41]; 4], ver: Version, ecl: EccLevel) -> usize {
    table[ecl.ordinal()][usize::from(ver.value())] as usize
}

fn get_bit(x: u32, i: i32) -> bool {
    ((x >> i) & 1) != 0
}

/*---- Reed-Solomon over GF(256) ----*/

/// Log/antilog tables for GF(256) with primitive polynomial 0x11D.
///
/// The antilog table spans the exponent range 0 to 510 so that a sum of two
/// logs can be looked up without a modular reduction. Built once at first use
/// by a pure constructor and never mutated.
struct Gf256 {
    exp: [u8; 512],
    log: [u8; 256],
}

static GF256: Lazy<Gf256> = Lazy::new(Gf256::new);

impl Gf256 {
    fn new() -> Self {
        let mut exp = [0u8; 512];
        let mut log = [0u8; 256];
        let mut x: u16 = 1;
        for i in 0..255 {
            exp[i] = x as u8;
            log[x as usize] = i as u8;
            x <<= 1;
            if x & 0x100 != 0 {
                x ^= 0x11d;
            }
        }
        for i in 255..512 {
            exp[i] = exp[i - 255];
        }
        Self { exp, log }
    }

    fn multiply(&self, x: u8, y: u8) -> u8 {
        if x == 0 || y == 0 {
            0
        } else {
            self.exp[usize::from(self.log[usize::from(x)]) + usize::from(self.log[usize::from(y)])]
        }
    }
}

/// A Reed-Solomon generator polynomial of a given degree, used to compute the
/// error correction codewords of one block.
struct ReedSolomonGenerator {
    /// Coefficients from highest to lowest power, with the leading term
    /// (always 1) omitted.
    divisor: Vec<u8>,
}

impl ReedSolomonGenerator {
    fn new(degree: usize) -> Self {
        assert!((1..=30).contains(&degree), "Degree out of range");
        let gf = &*GF256;

        // Build the product (x - r^0) * (x - r^1) * ... * (x - r^{degree-1})
        let mut divisor = vec![0u8; degree];
        divisor[degree - 1] = 1;
        let mut root: u8 = 1;
        for _ in 0..degree {
            for j in 0..degree {
                divisor[j] = gf.multiply(divisor[j], root);
                if j + 1 < degree {
                    divisor[j] ^= divisor[j + 1];
                }
            }
            root = gf.multiply(root, 0x02);
        }
        Self { divisor }
    }

    /// Returns the polynomial-division remainder of `data` by the divisor.
    fn compute_remainder(&self, data: &[u8]) -> Vec<u8> {
        let gf = &*GF256;
        let mut result = vec![0u8; self.divisor.len()];
        for &b in data {
            let factor: u8 = b ^ result[0];
            result.copy_within(1.., 0);
            result[self.divisor.len() - 1] = 0;
            for (x, &y) in result.iter_mut().zip(self.divisor.iter()) {
                *x ^= gf.multiply(y, factor);
            }
        }
        result
    }
}

/*---- Mask penalty helpers ----*/

/// Sliding run-length history for detecting finder-like 1:1:3:1:1 patterns
/// during penalty scoring.
struct FinderPenalty {
    qr_size: i32,
    run_history: [i32; 7],
}

impl FinderPenalty {
    fn new(size: i32) -> Self {
        Self {
            qr_size: size,
            run_history: [0; 7],
        }
    }

    fn add_history(&mut self, mut currentrunlength: i32) {
        if self.run_history[0] == 0 {
            currentrunlength += self.qr_size; // Add light border to initial run
        }
        let len: usize = self.run_history.len();
        self.run_history.copy_within(0..len - 1, 1);
        self.run_history[0] = currentrunlength;
    }

    fn count_patterns(&self) -> i32 {
        let rh = &self.run_history;
        let n = rh[1];
        i32::from(
            n > 0 &&
                rh[2] == n &&
                rh[3] == n * 3 &&
                rh[4] == n &&
                rh[5] == n &&
                (rh[0] >= n * 4 || rh[6] >= n * 4)
        )
    }

    fn terminate_and_count(mut self, currentruncolor: bool, mut currentrunlength: i32) -> i32 {
        if currentruncolor {
            self.add_history(currentrunlength);
            currentrunlength = 0;
        }
        currentrunlength += self.qr_size; // Add light border to final run
        self.add_history(currentrunlength);
        self.count_patterns()
    }
}

const PENALTY_N1: i32 = 3;
const PENALTY_N2: i32 = 3;
const PENALTY_N3: i32 = 40;
const PENALTY_N4: i32 = 10;

static ECC_CODEWORDS_PER_BLOCK: [[i8; 41]; 4] = [
    [
        -1, 7, 10, 15, 20, 26, 18, 20, 24, 30, 18, 20, 24, 26, 30, 22, 24, 28, 30, 28, 28, 28, 28, 30,
        30, 26, 28, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30,
    ], // Low
    [
        -1, 10, 16, 26, 18, 24, 16, 18, 22, 22, 26, 30, 22, 22, 24, 24, 28, 28, 26, 26, 26, 26, 28, 28,
        28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28,
    ], // Medium
    [
        -1, 13, 22, 18, 26, 18, 24, 18, 22, 20, 24, 28, 26, 24, 20, 30, 24, 28, 28, 26, 30, 28, 30, 30,
        30, 30, 28, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30,
    ], // Quartile
    [
        -1, 17, 28, 22, 16, 22, 28, 26, 26, 24, 28, 24, 28, 22, 24, 24, 30, 28, 28, 26, 28, 30, 24, 30,
        30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30,
    ], // High
];

static NUM_ERROR_CORRECTION_BLOCKS: [[i8; 41]; 4] = [
    [
        -1, 1, 1, 1, 1, 1, 2, 2, 2, 2, 4, 4, 4, 4, 4, 6, 6, 6, 6, 7, 8, 8, 9, 9, 10, 12, 12, 12,
        13, 14, 15, 16, 17, 18, 19, 19, 20, 21, 22, 24, 25,
    ], // Low
    [
        -1, 1, 1, 1, 2, 2, 4, 4, 4, 5, 5, 5, 8, 9, 9, 10, 10, 11, 13, 14, 16, 17, 17, 18, 20, 21,
        23, 25, 26, 28, 29, 31, 33, 35, 37, 38, 40, 43, 45, 47, 49,
    ], // Medium
    [
        -1, 1, 1, 2, 2, 4, 4, 6, 6, 8, 8, 8, 10, 12, 16, 12, 17, 16, 18, 21, 20, 23, 23, 25, 27, 29,
        34, 34, 35, 38, 40, 43, 45, 48, 51, 53, 56, 59, 62, 65, 68,
    ], // Quartile
    [
        -1, 1, 1, 2, 4, 4, 4, 5, 6, 8, 8, 11, 11, 16, 16, 18, 16, 19, 21, 25, 25, 25, 34, 30, 32, 35,
        37, 40, 42, 45, 48, 51, 54, 57, 60, 63, 66, 70, 74, 77, 81,
    ], // High
];

/// Error correction level for a QR code.
///
/// Higher levels dedicate more codewords to Reed-Solomon redundancy, so the
/// symbol survives more damage but holds less data. The default is [`High`].
///
/// [`High`]: EccLevel::High
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum EccLevel {
    /// Tolerates ~7% erroneous codewords.
    Low,
    /// Tolerates ~15% erroneous codewords.
    Medium,
    /// Tolerates ~25% erroneous codewords.
    Quartile,
    /// Tolerates ~30% erroneous codewords.
    #[default]
    High,
}

impl EccLevel {
    /// Returns an unsigned 2-bit integer (in the range 0 to 3).
    fn ordinal(self) -> usize {
        use EccLevel::*;
        match self {
            Low => 0,
            Medium => 1,
            Quartile => 2,
            High => 3,
        }
    }

    /// Returns the 2-bit value encoded into the format information.
    fn format_bits(self) -> u8 {
        use EccLevel::*;
        match self {
            Low => 1,
            Medium => 0,
            Quartile => 3,
            High => 2,
        }
    }
}

/// Error type for an unrecognized error correction level string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognized error correction level: {0:?}")]
pub struct ParseEccLevelError(String);

impl FromStr for EccLevel {
    type Err = ParseEccLevelError;

    /// Parses `"L"`, `"M"`, `"Q"`, `"H"` or the full level names,
    /// case-insensitively. Unknown strings are a hard error, never a silent
    /// fallback to another level.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "l" | "low" => Ok(EccLevel::Low),
            "m" | "medium" => Ok(EccLevel::Medium),
            "q" | "quartile" => Ok(EccLevel::Quartile),
            "h" | "high" => Ok(EccLevel::High),
            _ => Err(ParseEccLevelError(s.to_owned())),
        }
    }
}

/// A segment of data in a QR code.
///
/// Only byte mode is encodable; the other modes exist so that requests for
/// them fail with a typed error instead of being mis-encoded.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct QrSegment {
    mode: Mode,
    num_chars: usize,
    data: Vec<u8>,
}

impl QrSegment {
    /// Creates a segment for binary data in byte mode.
    pub fn make_bytes(data: &[u8]) -> Self {
        Self {
            mode: Mode::Byte,
            num_chars: data.len(),
            data: data.to_vec(),
        }
    }

    /// Creates a segment for the given text in the given mode.
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError::UnsupportedMode`] for every mode except
    /// [`Mode::Byte`].
    pub fn make(mode: Mode, text: &str) -> Result<Self, EncodeError> {
        match mode {
            Mode::Byte => Ok(Self::make_bytes(text.as_bytes())),
            other => Err(EncodeError::UnsupportedMode(other)),
        }
    }

    /// Returns the mode of this segment.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Returns the character count of this segment.
    pub fn num_chars(&self) -> usize {
        self.num_chars
    }

    /// Returns the total number of bits needed to encode the segments at the
    /// given version, or `None` if a character count overflows its indicator
    /// field.
    fn total_bits(segs: &[Self], version: Version) -> Option<usize> {
        let mut result: usize = 0;
        for seg in segs {
            let ccbits: u8 = seg.mode.char_count_bits(version);
            if let Some(limit) = (1usize).checked_shl(ccbits.into()) {
                if seg.num_chars >= limit {
                    return None;
                }
            }
            result = result.checked_add(4 + usize::from(ccbits))?;
            result = result.checked_add(seg.data.len().checked_mul(8)?)?;
        }
        Some(result)
    }
}

/// A QR segment mode. Only [`Byte`] is encodable by this crate.
///
/// [`Byte`]: Mode::Byte
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Mode {
    Numeric,
    Alphanumeric,
    Byte,
    Kanji,
    Eci,
}

impl Mode {
    /// Returns the 4-bit mode indicator.
    fn mode_bits(self) -> u32 {
        use Mode::*;
        match self {
            Numeric => 0x1,
            Alphanumeric => 0x2,
            Byte => 0x4,
            Kanji => 0x8,
            Eci => 0x7,
        }
    }

    /// Returns the width of the character count indicator at the given
    /// version: versions 1-9, 10-26 and 27-40 form the three groups.
    fn char_count_bits(self, ver: Version) -> u8 {
        use Mode::*;
        (
            match self {
                Numeric => [10, 12, 14],
                Alphanumeric => [9, 11, 13],
                Byte => [8, 16, 16],
                Kanji => [8, 10, 12],
                Eci => [0, 0, 0],
            }
        )[usize::from((ver.value() + 7) / 17)]
    }
}

/// An ordered, growable sequence of bits.
pub struct BitBuffer {
    bits: Vec<bool>,
}

impl BitBuffer {
    pub fn new() -> Self {
        Self { bits: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Appends the `len` low-order bits of `val`, most significant first.
    pub fn append_bits(&mut self, val: u32, len: u8) {
        assert!(len <= 31 && (val >> len) == 0, "Value out of range");
        self.bits.extend((0..len).rev().map(|i| ((val >> i) & 1) != 0));
    }

    /// Packs the bits into bytes, MSB first. The length must be a multiple
    /// of 8.
    pub fn to_bytes(&self) -> Vec<u8> {
        debug_assert_eq!(self.bits.len() % 8, 0);
        let mut result = vec![0u8; self.bits.len() / 8];
        for (i, &bit) in self.bits.iter().enumerate() {
            result[i >> 3] |= u8::from(bit) << (7 - (i & 7));
        }
        result
    }
}

impl Default for BitBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Error type for when encoding cannot produce a valid symbol.
///
/// All failures are deterministic functions of the input; nothing here is
/// retryable without changing the input or the error correction level.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    /// The payload exceeds the data capacity of version 40 at the requested
    /// error correction level.
    #[error("data length = {needed} bits, max capacity = {capacity} bits")]
    DataTooLong {
        needed: usize,
        capacity: usize,
    },
    /// A segment's character count does not fit its count indicator field.
    #[error("segment character count overflows its count indicator")]
    SegmentTooLong,
    /// Only byte mode is implemented.
    #[error("{0:?} mode is not supported; encode in byte mode")]
    UnsupportedMode(Mode),
}

/// A QR code version (1-40).
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct Version(u8);

impl Version {
    /// The minimum version number supported in the QR Code Model 2 standard.
    pub const MIN: Version = Version(1);

    /// The maximum version number supported in the QR Code Model 2 standard.
    pub const MAX: Version = Version(40);

    /// Creates a version object from the given number.
    ///
    /// # Panics
    ///
    /// Panics if the number is outside the range [1, 40].
    pub const fn new(ver: u8) -> Self {
        assert!(
            Version::MIN.value() <= ver && ver <= Version::MAX.value(),
            "Version number out of range"
        );
        Self(ver)
    }

    /// Returns the value, which is in the range [1, 40].
    pub const fn value(self) -> u8 {
        self.0
    }

    /// Returns the symbol side length in modules: version * 4 + 17.
    pub const fn num_modules(self) -> u8 {
        self.0 * 4 + 17
    }
}

/// A mask pattern (0-7).
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct Mask(u8);

impl Mask {
    /// Creates a mask object from the given number.
    ///
    /// # Panics
    ///
    /// Panics if the number is outside the range [0, 7].
    pub const fn new(mask: u8) -> Self {
        assert!(mask <= 7, "Mask value out of range");
        Self(mask)
    }

    /// Returns the value, which is in the range [0, 7].
    pub const fn value(self) -> u8 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hello_at_medium_selects_version_1() {
        let qr = QrCode::encode_text("HELLO", EccLevel::Medium).unwrap();
        assert_eq!(qr.version().value(), 1);
        assert_eq!(qr.size(), 21);
        assert_eq!(qr.error_correction_level(), EccLevel::Medium);
    }

    #[test]
    fn encode_is_deterministic() {
        let a = QrCode::encode("https://example.com/i/3f9c").unwrap();
        let b = QrCode::encode("https://example.com/i/3f9c").unwrap();
        assert_eq!(a.version(), b.version());
        assert_eq!(a.mask(), b.mask());
        assert!(a == b);
    }

    #[test]
    fn default_level_is_high() {
        let qr = QrCode::encode("inventory item 42").unwrap();
        assert_eq!(qr.error_correction_level(), EccLevel::High);
    }

    #[test]
    fn capacity_boundary_at_version_40_low() {
        // 2953 bytes is the byte-mode capacity at version 40, level Low
        let max = "a".repeat(2953);
        let qr = QrCode::encode_text(&max, EccLevel::Low).unwrap();
        assert_eq!(qr.version(), Version::MAX);

        let over = "a".repeat(2954);
        assert!(
            matches!(
                QrCode::encode_text(&over, EccLevel::Low),
                Err(EncodeError::DataTooLong { .. })
            )
        );
    }

    #[test]
    fn long_ascii_at_high_selects_a_large_version() {
        let text = "x".repeat(500);
        let qr = QrCode::encode_text(&text, EccLevel::High).unwrap();
        assert!(qr.version().value() >= 20);
    }

    #[test]
    fn empty_string_encodes_at_version_1() {
        let qr = QrCode::encode_text("", EccLevel::High).unwrap();
        assert_eq!(qr.version().value(), 1);
        assert_eq!(qr.size(), 21);
    }

    #[test]
    fn unicode_text_is_encoded_as_utf8_bytes() {
        let seg = QrSegment::make_bytes("こんにちは".as_bytes());
        assert_eq!(seg.num_chars(), 15); // 5 characters, 3 bytes each
        let qr = QrCode::encode_text("こんにちは", EccLevel::Low).unwrap();
        assert_eq!(qr.size(), i32::from(qr.version().value()) * 4 + 17);
    }

    #[test]
    fn non_byte_modes_are_rejected() {
        let err = QrSegment::make(Mode::Numeric, "12345").unwrap_err();
        assert_eq!(err, EncodeError::UnsupportedMode(Mode::Numeric));
        let err = QrSegment::make(Mode::Kanji, "漢字").unwrap_err();
        assert_eq!(err, EncodeError::UnsupportedMode(Mode::Kanji));
        assert!(QrSegment::make(Mode::Byte, "ok").is_ok());
    }

    #[test]
    fn ecc_level_parses_strictly() {
        assert_eq!("H".parse::<EccLevel>().unwrap(), EccLevel::High);
        assert_eq!("m".parse::<EccLevel>().unwrap(), EccLevel::Medium);
        assert_eq!("quartile".parse::<EccLevel>().unwrap(), EccLevel::Quartile);
        assert!("X".parse::<EccLevel>().is_err());
        assert!("".parse::<EccLevel>().is_err());
    }

    #[test]
    fn chosen_mask_minimizes_penalty() {
        let mut qr = QrCode::encode_text("HELLO WORLD 123", EccLevel::Medium).unwrap();
        let chosen = qr.mask();

        // Undo the chosen mask, then rescore all 8 candidates the same way
        // select_mask() does
        qr.apply_mask(chosen);
        let mut scores = [0i32; 8];
        for i in 0u8..8 {
            let mask = Mask::new(i);
            qr.apply_mask(mask);
            qr.draw_format_bits(mask);
            scores[usize::from(i)] = qr.penalty_score();
            qr.apply_mask(mask);
        }
        let best = scores[usize::from(chosen.value())];
        assert!(scores.iter().all(|&s| best <= s));
    }

    #[test]
    fn masking_leaves_function_modules_unchanged() {
        let mut qr = QrCode::encode_text("function modules", EccLevel::Low).unwrap();
        let before = qr.modules.clone();
        qr.apply_mask(Mask::new(5));
        for index in 0..qr.modules.len() {
            if qr.isfunction[index] {
                assert_eq!(qr.modules[index], before[index]);
            }
        }
    }

    #[test]
    fn timing_patterns_alternate() {
        let qr = QrCode::encode("timing").unwrap();
        for i in 8..qr.size() - 8 {
            assert_eq!(qr.get_module(6, i), i % 2 == 0);
            assert_eq!(qr.get_module(i, 6), i % 2 == 0);
        }
    }

    #[test]
    fn finder_and_dark_modules_are_placed() {
        let qr = QrCode::encode("finders").unwrap();
        let size = qr.size();
        // Outer ring of each finder pattern is dark
        assert!(qr.get_module(0, 0));
        assert!(qr.get_module(size - 1, 0));
        assert!(qr.get_module(0, size - 1));
        // Dark module next to the bottom-left finder
        assert!(qr.get_module(8, size - 8));
    }

    #[test]
    fn out_of_bounds_modules_read_light() {
        let qr = QrCode::encode("bounds").unwrap();
        assert!(!qr.get_module(-1, 0));
        assert!(!qr.get_module(0, -1));
        assert!(!qr.get_module(qr.size(), 0));
        assert!(!qr.get_module(0, qr.size()));
    }

    #[test]
    fn version_7_carries_version_info() {
        // 150 bytes at Quartile needs version >= 7
        let text = "v".repeat(150);
        let qr = QrCode::encode_text(&text, EccLevel::Quartile).unwrap();
        assert!(qr.version().value() >= 7);
        // Both copies of the version info mirror each other across the
        // diagonal
        let size = qr.size();
        for i in 0..18 {
            let a = (size - 11 + i % 3, i / 3);
            let b = (i / 3, size - 11 + i % 3);
            assert_eq!(qr.get_module(a.0, a.1), qr.get_module(b.0, b.1));
        }
    }

    #[test]
    fn gf256_tables_match_the_field() {
        assert_eq!(GF256.exp[0], 1);
        assert_eq!(GF256.exp[1], 2);
        assert_eq!(GF256.exp[255], GF256.exp[0]);
        // 0x80 * 2 overflows into the reduction polynomial
        assert_eq!(GF256.multiply(0x80, 0x02), 0x1d);
        assert_eq!(GF256.multiply(0x00, 0xff), 0x00);
        for x in 1..=255u8 {
            assert_eq!(GF256.multiply(x, 1), x);
        }
    }

    #[test]
    fn reed_solomon_degree_2_divisor() {
        // (x + 1)(x + 2) = x^2 + 3x + 2 over GF(256)
        let rs = ReedSolomonGenerator::new(2);
        assert_eq!(rs.divisor, vec![3, 2]);
    }

    #[test]
    fn bit_buffer_packs_msb_first() {
        let mut bb = BitBuffer::new();
        bb.append_bits(0b0100, 4);
        bb.append_bits(0b0101, 4);
        bb.append_bits(0xab, 8);
        assert_eq!(bb.len(), 16);
        assert_eq!(bb.to_bytes(), vec![0x45, 0xab]);
    }

    #[test]
    fn min_version_floor_is_respected() {
        let floored = QrCode::encode_segments(
            &[QrSegment::make_bytes(b"HELLO")],
            EccLevel::Medium,
            Version::new(4)
        ).unwrap();
        assert_eq!(floored.version().value(), 4);
    }
}

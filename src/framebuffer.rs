// src/framebuffer.rs
//
// Packed 1-bit framebuffer <-> pixel grid conversion.
//
// Packing: row-major, 8 pixels per byte, most significant bit first.
// Polarity: a 0 bit is a dark (ink) pixel, a 1 bit is light (paper).

use std::fmt;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pixel {
    Dark,
    Light,
}

/// Payload and declared dimensions do not agree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeError {
    /// Payload length differs from width * height / 8
    LengthMismatch { expected: usize, actual: usize },
    /// width * height is zero or not a whole number of bytes
    UnalignedDimensions { width: usize, height: usize },
}

impl fmt::Display for ShapeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShapeError::LengthMismatch { expected, actual } => write!(
                f,
                "framebuffer length mismatch: expected {} bytes, got {}",
                expected, actual
            ),
            ShapeError::UnalignedDimensions { width, height } => write!(
                f,
                "framebuffer dimensions {}x{} do not pack into whole bytes",
                width, height
            ),
        }
    }
}

impl std::error::Error for ShapeError {}

/// Decoded monochrome image, `width * height` pixels in row-major order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelGrid {
    width: usize,
    height: usize,
    dark: Vec<bool>,
}

impl PixelGrid {
    /// Build a grid from row-major "is dark" flags.
    pub fn from_dark_flags(width: usize, height: usize, dark: Vec<bool>) -> Result<Self, ShapeError> {
        let expected = width
            .checked_mul(height)
            .ok_or(ShapeError::UnalignedDimensions { width, height })?;
        if dark.len() != expected {
            return Err(ShapeError::LengthMismatch {
                expected,
                actual: dark.len(),
            });
        }
        Ok(PixelGrid { width, height, dark })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn is_dark(&self, x: usize, y: usize) -> bool {
        x < self.width && y < self.height && self.dark[y * self.width + x]
    }

    pub fn get(&self, x: usize, y: usize) -> Option<Pixel> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(if self.dark[y * self.width + x] {
            Pixel::Dark
        } else {
            Pixel::Light
        })
    }

    /// Rows of dark flags, top to bottom
    pub fn rows(&self) -> impl Iterator<Item = &[bool]> {
        self.dark.chunks(self.width.max(1))
    }

    pub fn dark_count(&self) -> usize {
        self.dark.iter().filter(|&&d| d).count()
    }
}

// ============================================================================
// Conversion
// ============================================================================

fn check_dimensions(width: usize, height: usize) -> Result<usize, ShapeError> {
    match width.checked_mul(height) {
        Some(pixels) if pixels > 0 && pixels % 8 == 0 => Ok(pixels / 8),
        _ => Err(ShapeError::UnalignedDimensions { width, height }),
    }
}

/// Unpack a framebuffer payload into a pixel grid.
///
/// Pixel `(x, y)` lives in byte `(y * width + x) / 8` at bit `7 - (x % 8)`.
/// The bit index follows `x` only, matching the controller's packing; for
/// widths that are a multiple of 8 this is plain MSB-first row-major order.
pub fn unpack(payload: &[u8], width: usize, height: usize) -> Result<PixelGrid, ShapeError> {
    let expected = check_dimensions(width, height)?;
    if payload.len() != expected {
        return Err(ShapeError::LengthMismatch {
            expected,
            actual: payload.len(),
        });
    }

    let mut dark = Vec::with_capacity(width * height);
    for y in 0..height {
        for x in 0..width {
            let byte_index = (y * width + x) / 8;
            let bit_index = 7 - (x % 8);
            dark.push(payload[byte_index] & (1 << bit_index) == 0);
        }
    }

    Ok(PixelGrid { width, height, dark })
}

/// Pack a grid back into controller byte order.
/// Inverse of [`unpack`] whenever the width is a multiple of 8.
pub fn pack(grid: &PixelGrid) -> Result<Vec<u8>, ShapeError> {
    let len = check_dimensions(grid.width, grid.height)?;

    // Start from all-light and clear bits for ink
    let mut payload = vec![0xFFu8; len];
    for y in 0..grid.height {
        for x in 0..grid.width {
            if grid.dark[y * grid.width + x] {
                let byte_index = (y * grid.width + x) / 8;
                let bit_index = 7 - (x % 8);
                payload[byte_index] &= !(1 << bit_index);
            }
        }
    }

    Ok(payload)
}

/// Encode as binary PBM (P4). PBM marks black with 1 and pads each row.
pub fn to_pbm(grid: &PixelGrid) -> Vec<u8> {
    let row_bytes = (grid.width + 7) / 8;
    let header = format!("P4\n{} {}\n", grid.width, grid.height);

    let mut out = Vec::with_capacity(header.len() + row_bytes * grid.height);
    out.extend_from_slice(header.as_bytes());

    for row in grid.rows() {
        let mut packed = vec![0u8; row_bytes];
        for (x, &is_dark) in row.iter().enumerate() {
            if is_dark {
                packed[x / 8] |= 0x80 >> (x % 8);
            }
        }
        out.extend_from_slice(&packed);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_unpack_polarity() {
        let grid = unpack(&[0b0111_1111], 8, 1).unwrap();
        let pixels: Vec<Pixel> = (0..8).map(|x| grid.get(x, 0).unwrap()).collect();

        assert_eq!(pixels[0], Pixel::Dark);
        assert!(pixels[1..].iter().all(|&p| p == Pixel::Light));
        assert_eq!(grid.dark_count(), 1);
    }

    #[test]
    fn test_unpack_all_ones_is_blank_paper() {
        let grid = unpack(&[0xFF; 4], 16, 2).unwrap();
        assert_eq!(grid.dark_count(), 0);

        let grid = unpack(&[0x00; 4], 16, 2).unwrap();
        assert_eq!(grid.dark_count(), 32);
    }

    #[test]
    fn test_unpack_row_major_msb_first() {
        // Row 0: 0xFE -> pixel 7 dark; 0xFF -> nothing
        // Row 1: 0xFF -> nothing;       0x7F -> pixel 8 dark
        let grid = unpack(&[0xFE, 0xFF, 0xFF, 0x7F], 16, 2).unwrap();

        assert!(grid.is_dark(7, 0));
        assert!(grid.is_dark(8, 1));
        assert_eq!(grid.dark_count(), 2);
        assert!(!grid.is_dark(99, 99));
        assert_eq!(grid.get(16, 0), None);
    }

    #[test]
    fn test_unpack_shape_errors() {
        assert_eq!(
            unpack(&[0xFF; 3], 16, 2),
            Err(ShapeError::LengthMismatch { expected: 4, actual: 3 })
        );
        assert_eq!(
            unpack(&[], 3, 1),
            Err(ShapeError::UnalignedDimensions { width: 3, height: 1 })
        );
        assert_eq!(
            unpack(&[], 0, 8),
            Err(ShapeError::UnalignedDimensions { width: 0, height: 8 })
        );
    }

    #[test]
    fn test_full_panel_size() {
        let payload = vec![0xFF; 48_000];
        let grid = unpack(&payload, 800, 480).unwrap();
        assert_eq!(grid.width(), 800);
        assert_eq!(grid.height(), 480);
        assert_eq!(grid.rows().count(), 480);
    }

    #[test]
    fn test_from_dark_flags_validates_length() {
        assert!(PixelGrid::from_dark_flags(8, 1, vec![false; 7]).is_err());
        assert!(PixelGrid::from_dark_flags(8, 1, vec![false; 8]).is_ok());
    }

    #[test]
    fn test_pbm_export() {
        let grid = unpack(&[0b0111_1111], 8, 1).unwrap();
        let pbm = to_pbm(&grid);
        assert_eq!(&pbm[..7], b"P4\n8 1\n");
        assert_eq!(pbm[7..], [0b1000_0000]);
    }

    #[test]
    fn test_pbm_pads_rows() {
        let dark = vec![true, false, false, true, false, false, false, false];
        let grid = PixelGrid::from_dark_flags(4, 2, dark).unwrap();
        let pbm = to_pbm(&grid);
        let header_len = b"P4\n4 2\n".len();
        assert_eq!(pbm.len(), header_len + 2);
        assert_eq!(pbm[header_len], 0b1001_0000);
    }

    proptest! {
        #[test]
        fn pack_then_unpack_restores_grid(
            cols in 1usize..5,
            height in 1usize..6,
            seed in proptest::collection::vec(any::<bool>(), 4 * 8 * 5),
        ) {
            let width = cols * 8;
            let dark: Vec<bool> = seed.into_iter().cycle().take(width * height).collect();
            let grid = PixelGrid::from_dark_flags(width, height, dark).unwrap();

            let payload = pack(&grid).unwrap();
            prop_assert_eq!(payload.len(), width * height / 8);
            prop_assert_eq!(unpack(&payload, width, height).unwrap(), grid);
        }
    }
}

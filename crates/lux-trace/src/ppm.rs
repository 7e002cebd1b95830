//! Plain-text PPM (P3) output with gamma 2.2.

use std::io::{self, Write};

use lux_core::types::Rgb;

fn to_byte(v: f64) -> u8 {
    (v.clamp(0.0, 1.0).powf(1.0 / 2.2) * 255.0 + 0.5) as u8
}

/// Writes `image` (row-major, `width * height` pixels) as a P3 PPM.
pub fn write_ppm<W: Write>(out: &mut W, width: u32, height: u32, image: &[Rgb]) -> io::Result<()> {
    debug_assert_eq!(image.len() as u64, u64::from(width) * u64::from(height));
    writeln!(out, "P3")?;
    writeln!(out, "{width} {height}")?;
    writeln!(out, "255")?;
    for c in image {
        write!(out, "{} {} {} ", to_byte(c.r), to_byte(c.g), to_byte(c.b))?;
    }
    writeln!(out)?;
    Ok(())
}

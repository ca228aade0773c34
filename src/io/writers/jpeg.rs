use jpeg_encoder::{ColorType, Encoder};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use crate::error::{Error, Result};

/// Encode interleaved RGB bytes as a JPEG at full quality.
pub fn write_rgb_jpeg(output: &Path, cols: usize, rows: usize, rgb_data: &[u8]) -> Result<()> {
    let (w, h) = match (u16::try_from(cols), u16::try_from(rows)) {
        (Ok(w), Ok(h)) => (w, h),
        _ => {
            return Err(Error::InvalidArgument {
                arg: "jpeg size",
                value: format!("{}x{}", cols, rows),
            });
        }
    };
    let file = File::create(output)?;
    let mut writer = BufWriter::new(file);
    let encoder = Encoder::new(&mut writer, 100);
    encoder
        .encode(rgb_data, w, h, ColorType::Rgb)
        .map_err(Error::external)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_a_jpeg_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quicklook.jpg");
        let rgb = vec![255u8, 0, 0, 0, 128, 0, 0, 0, 255, 0, 0, 0];
        write_rgb_jpeg(&path, 2, 2, &rgb).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn oversized_image_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = write_rgb_jpeg(&dir.path().join("x.jpg"), 70_000, 1, &[]).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { .. }));
    }
}

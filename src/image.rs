use crate::error::VmError;
use byteorder::{BigEndian, ByteOrder};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

/// One loaded object image: an origin address and the words to place there.
pub struct Image {
    pub origin: u16,
    pub words: Vec<u16>,
}

/// Reads a big-endian LC-3 object file: first word is the load origin,
/// every word after that is program/data content placed consecutively.
pub fn load_image(path: impl AsRef<Path>) -> Result<Image, VmError> {
    let path: PathBuf = path.as_ref().to_path_buf();

    let mut data = Vec::new();
    File::open(&path)
        .and_then(|mut f| f.read_to_end(&mut data))
        .map_err(|source| VmError::ImageLoad {
            path: path.clone(),
            source,
        })?;

    if data.len() % 2 != 0 {
        return Err(VmError::ImageTooShort { path });
    }

    let mut buffer = vec![0u16; data.len() / 2];
    BigEndian::read_u16_into(&data, &mut buffer);

    if buffer.is_empty() {
        return Err(VmError::ImageTooShort { path });
    }

    let origin = buffer[0];
    let words = buffer[1..].to_vec();

    Ok(Image { origin, words })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn round_trips_a_simple_image() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        // origin 0x3000, then two words: 0x1042, 0xF025
        file.write_all(&[0x30, 0x00, 0x10, 0x42, 0xF0, 0x25])
            .unwrap();

        let image = load_image(file.path()).unwrap();

        assert_eq!(image.origin, 0x3000);
        assert_eq!(image.words, vec![0x1042, 0xF025]);
    }

    #[test]
    fn rejects_a_truncated_image() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0x30, 0x00, 0x10]).unwrap();

        let err = load_image(file.path()).unwrap_err();
        assert!(matches!(err, VmError::ImageTooShort { .. }));
    }

    #[test]
    fn missing_file_is_an_image_load_error() {
        let err = load_image("/no/such/path/should/exist.obj").unwrap_err();
        assert!(matches!(err, VmError::ImageLoad { .. }));
    }
}

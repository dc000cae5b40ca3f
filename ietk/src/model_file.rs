//! Tagged model file header.
//!
//! Every model file starts with the magic bytes `IETK`, the kind of the stored model, and a
//! format version. The payload that follows is bincode-encoded.

use std::io::{Read, Write};

use bincode::{Decode, Encode};

use crate::errors::{IetkError, Result};

const MAGIC: &[u8; 4] = b"IETK";

/// Kind of a stored model.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Decode, Encode)]
pub enum ModelKind {
    WordFeatureExtractor,
    NamedEntityExtractor,
    BinaryRelationDetector,
    TextCategorizer,
}

/// Writes a header and the payload.
pub(crate) fn write_model<W, T>(mut wtr: W, kind: ModelKind, version: u32, payload: &T) -> Result<()>
where
    W: Write,
    T: Encode,
{
    let config = bincode::config::standard();
    wtr.write_all(MAGIC)?;
    bincode::encode_into_std_write(kind, &mut wtr, config)?;
    bincode::encode_into_std_write(version, &mut wtr, config)?;
    bincode::encode_into_std_write(payload, &mut wtr, config)?;
    Ok(())
}

/// Reads the kind and the version of a model.
///
/// # Errors
///
/// If the data does not start with a model header, [`IetkError::InvalidModel`] will be
/// returned.
pub fn read_header<R>(mut rdr: R) -> Result<(ModelKind, u32)>
where
    R: Read,
{
    let mut magic = [0; 4];
    rdr.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(IetkError::invalid_model("not a model file"));
    }
    let config = bincode::config::standard();
    let kind = bincode::decode_from_std_read(&mut rdr, config)
        .map_err(|_| IetkError::invalid_model("unknown model kind"))?;
    let version = bincode::decode_from_std_read(&mut rdr, config)?;
    Ok((kind, version))
}

/// Checks the header and returns the format version.
pub(crate) fn expect_header<R>(rdr: R, kind: ModelKind, versions: &[u32]) -> Result<u32>
where
    R: Read,
{
    let (found, version) = read_header(rdr)?;
    if found != kind {
        return Err(IetkError::invalid_model(format!(
            "expected a {:?} model, found a {:?} model",
            kind, found
        )));
    }
    if !versions.contains(&version) {
        return Err(IetkError::invalid_model(format!(
            "unsupported {:?} format version {}",
            kind, version
        )));
    }
    Ok(version)
}

pub(crate) fn read_payload<R, T>(mut rdr: R) -> Result<T>
where
    R: Read,
    T: Decode,
{
    Ok(bincode::decode_from_std_read(
        &mut rdr,
        bincode::config::standard(),
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_round_trip() {
        let mut buf = vec![];
        write_model(&mut buf, ModelKind::TextCategorizer, 2, &(7u32, "x".to_string())).unwrap();
        let mut rdr = buf.as_slice();
        assert_eq!(
            2,
            expect_header(&mut rdr, ModelKind::TextCategorizer, &[1, 2]).unwrap()
        );
        let payload: (u32, String) = read_payload(&mut rdr).unwrap();
        assert_eq!((7, "x".to_string()), payload);
    }

    #[test]
    fn test_wrong_kind_or_version() {
        let mut buf = vec![];
        write_model(&mut buf, ModelKind::NamedEntityExtractor, 1, &0u8).unwrap();
        assert!(matches!(
            expect_header(buf.as_slice(), ModelKind::TextCategorizer, &[1]),
            Err(IetkError::InvalidModel(_))
        ));
        assert!(matches!(
            expect_header(buf.as_slice(), ModelKind::NamedEntityExtractor, &[2]),
            Err(IetkError::InvalidModel(_))
        ));
    }

    #[test]
    fn test_bad_magic() {
        assert!(matches!(
            read_header(&b"ABCD\x00\x01"[..]),
            Err(IetkError::InvalidModel(_))
        ));
    }
}

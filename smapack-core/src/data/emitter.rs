use serde::{Deserialize, Serialize};

use crate::error::SchemaError;
use crate::schema::{self, local};
use crate::view::{BufView, BufWriter};

pub const EMITTER_STRIDE: usize = 66;

/// One particle emitter definition: 33 words whose individual meanings are
/// undocumented; preserved verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticleEmitter {
    pub words: Vec<u16>,
}

pub fn decode(view: &BufView<'_>) -> Result<Vec<ParticleEmitter>, SchemaError> {
    let count = schema::check_stride(view.len(), EMITTER_STRIDE)?;
    let mut emitters = Vec::with_capacity(count);
    for i in 0..count {
        let record = view.slice(i * EMITTER_STRIDE, EMITTER_STRIDE).map_err(local)?;
        emitters.push(ParticleEmitter { words: record.words().map_err(local)? });
    }
    Ok(emitters)
}

pub fn encode(emitters: &[ParticleEmitter], out: &mut BufWriter) {
    for emitter in emitters {
        out.put_words(&emitter.words);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stride_remainder_rejected() {
        let bytes = vec![0u8; EMITTER_STRIDE + 2];
        assert!(matches!(
            decode(&BufView::new(&bytes)),
            Err(SchemaError::StrideMismatch { .. })
        ));
    }

    #[test]
    fn round_trip() {
        let mut bytes = Vec::new();
        for w in 0..33u16 {
            bytes.extend_from_slice(&w.to_le_bytes());
        }
        let emitters = decode(&BufView::new(&bytes)).unwrap();
        assert_eq!(emitters.len(), 1);
        assert_eq!(emitters[0].words[32], 32);

        let mut out = BufWriter::new();
        encode(&emitters, &mut out);
        assert_eq!(out.into_bytes(), bytes);
    }
}

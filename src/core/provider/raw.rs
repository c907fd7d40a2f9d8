//! Pass-through modality: bytes in, same bytes out, zero padded

use super::{BufferLoader, Extractor, ParamFactory, TransformResult, Transformer};
use crate::error::TransformError;
use rand::RngCore;
use serde::Deserialize;

/// `data_config` / `target_config` for the `raw` modality
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfig {
    /// Fixed output size per record
    pub output_len: usize,
}

pub struct RawExtractor;

impl Extractor for RawExtractor {
    type Decoded = Vec<u8>;

    fn extract(&self, raw: &[u8]) -> TransformResult<Vec<u8>> {
        Ok(raw.to_vec())
    }
}

/// Factory for modalities without random settings
pub struct NoParams;

impl ParamFactory for NoParams {
    type Decoded = Vec<u8>;
    type Params = ();

    fn make_params(&self, _decoded: &Vec<u8>, _rng: &mut dyn RngCore) {}
}

pub struct IdentityTransformer;

impl Transformer for IdentityTransformer {
    type Decoded = Vec<u8>;
    type Params = ();

    fn transform(&self, _params: &(), decoded: Vec<u8>) -> TransformResult<Vec<u8>> {
        Ok(decoded)
    }
}

/// Copies a record into a fixed-size region, zero filling the tail
pub struct RawLoader {
    output_len: usize,
}

impl RawLoader {
    pub fn new(output_len: usize) -> Self {
        RawLoader { output_len }
    }
}

impl BufferLoader for RawLoader {
    type Decoded = Vec<u8>;

    fn output_len(&self) -> usize {
        self.output_len
    }

    fn load(&self, out: &mut [u8], decoded: &Vec<u8>) -> TransformResult<()> {
        if decoded.len() > out.len() {
            return Err(TransformError::new(format!(
                "record of {} bytes does not fit output of {} bytes",
                decoded.len(),
                out.len()
            )));
        }
        out[..decoded.len()].copy_from_slice(decoded);
        out[decoded.len()..].fill(0);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_fit() {
        let mut out = [0u8; 3];
        RawLoader::new(3).load(&mut out, &vec![1, 2, 3]).unwrap();
        assert_eq!(out, [1, 2, 3]);
    }

    #[test]
    fn test_overflow_rejected() {
        let mut out = [7u8; 2];
        let err = RawLoader::new(2).load(&mut out, &vec![1, 2, 3]).unwrap_err();
        assert!(err.message.contains("does not fit"));
        assert_eq!(out, [7, 7]);
    }
}

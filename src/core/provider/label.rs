//! Integer class label modality
//!
//! A label record is exactly four bytes holding a little-endian `i32`. The
//! transform maps `index` to `index * scale + shift`, with `scale` and
//! `shift` drawn per record from inclusive integer ranges. The loader writes
//! the result as `i32`, or as `f32` plus a constant offset.

use super::{BufferLoader, Extractor, ParamFactory, TransformResult, Transformer};
use crate::error::TransformError;
use rand::{Rng, RngCore};
use serde::Deserialize;

/// `data_config` / `target_config` for the `label` modality
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LabelConfig {
    /// Added to the raw value at extraction
    pub extract_offset: i32,
    /// Inclusive range for the per-record scale
    pub scale: [i32; 2],
    /// Inclusive range for the per-record shift
    pub shift: [i32; 2],
    /// Write `f32` instead of `i32`
    pub load_float: bool,
    /// Added when writing as `f32`
    pub load_offset: f32,
}

impl Default for LabelConfig {
    fn default() -> Self {
        LabelConfig {
            extract_offset: 0,
            scale: [1, 1],
            shift: [0, 0],
            load_float: false,
            load_offset: 0.0,
        }
    }
}

pub struct LabelExtractor {
    offset: i32,
}

impl LabelExtractor {
    pub fn new(offset: i32) -> Self {
        LabelExtractor { offset }
    }
}

impl Extractor for LabelExtractor {
    type Decoded = i32;

    fn extract(&self, raw: &[u8]) -> TransformResult<i32> {
        let bytes: [u8; 4] = raw.try_into().map_err(|_| {
            TransformError::new(format!(
                "label must be 4 bytes to load as int32, got {}",
                raw.len()
            ))
        })?;
        Ok(i32::from_le_bytes(bytes).wrapping_add(self.offset))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelParams {
    pub scale: i32,
    pub shift: i32,
}

pub struct LabelParamFactory {
    scale: (i32, i32),
    shift: (i32, i32),
}

impl LabelParamFactory {
    /// Ranges are inclusive; reversed bounds are swapped
    pub fn new(scale: [i32; 2], shift: [i32; 2]) -> Self {
        let order = |[a, b]: [i32; 2]| (a.min(b), a.max(b));
        LabelParamFactory {
            scale: order(scale),
            shift: order(shift),
        }
    }

    /// Identity settings: scale 1, shift 0
    pub fn fixed() -> Self {
        Self::new([1, 1], [0, 0])
    }
}

impl ParamFactory for LabelParamFactory {
    type Decoded = i32;
    type Params = LabelParams;

    fn make_params(&self, _decoded: &i32, rng: &mut dyn RngCore) -> LabelParams {
        LabelParams {
            scale: rng.gen_range(self.scale.0..=self.scale.1),
            shift: rng.gen_range(self.shift.0..=self.shift.1),
        }
    }
}

pub struct LabelTransformer;

impl Transformer for LabelTransformer {
    type Decoded = i32;
    type Params = LabelParams;

    fn transform(&self, params: &LabelParams, decoded: i32) -> TransformResult<i32> {
        decoded
            .checked_mul(params.scale)
            .and_then(|v| v.checked_add(params.shift))
            .ok_or_else(|| TransformError::new(format!("label {} overflows transform", decoded)))
    }
}

pub struct LabelLoader {
    float: Option<f32>,
}

impl LabelLoader {
    pub fn int32() -> Self {
        LabelLoader { float: None }
    }

    pub fn float(offset: f32) -> Self {
        LabelLoader {
            float: Some(offset),
        }
    }
}

impl BufferLoader for LabelLoader {
    type Decoded = i32;

    fn output_len(&self) -> usize {
        4
    }

    fn load(&self, out: &mut [u8], decoded: &i32) -> TransformResult<()> {
        let bytes = match self.float {
            Some(offset) => (*decoded as f32 + offset).to_le_bytes(),
            None => decoded.to_le_bytes(),
        };
        out.copy_from_slice(&bytes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_extract_with_offset() {
        let extractor = LabelExtractor::new(-1);
        assert_eq!(extractor.extract(&42i32.to_le_bytes()).unwrap(), 41);
        assert!(extractor.extract(b"42").is_err());
    }

    #[test]
    fn test_params_within_ranges() {
        let factory = LabelParamFactory::new([3, 1], [-2, 2]);
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..100 {
            let params = factory.make_params(&0, &mut rng);
            assert!((1..=3).contains(&params.scale));
            assert!((-2..=2).contains(&params.shift));
        }
    }

    #[test]
    fn test_transform_and_float_load() {
        let out = LabelTransformer
            .transform(&LabelParams { scale: 2, shift: 3 }, 5)
            .unwrap();
        assert_eq!(out, 13);

        let mut buf = [0u8; 4];
        LabelLoader::float(0.5).load(&mut buf, &out).unwrap();
        assert_eq!(f32::from_le_bytes(buf), 13.5);
    }

    #[test]
    fn test_overflow_is_transform_error() {
        let params = LabelParams {
            scale: 2,
            shift: 0,
        };
        assert!(LabelTransformer.transform(&params, i32::MAX).is_err());
    }
}

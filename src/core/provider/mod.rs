//! Modality providers
//!
//! Each data modality is described by four small roles:
//!
//! - [`Extractor`]: raw bytes to a decoded value
//! - [`ParamFactory`]: per-record random settings drawn from the worker's RNG
//! - [`Transformer`]: decoded value plus settings to a new decoded value
//! - [`BufferLoader`]: decoded value into a fixed-size output region
//!
//! [`Etl`] chains one implementation of each role. A [`PairProvider`] holds
//! one chain for the object and one for the target and is what a decode
//! worker drives. Providers are built by tag through a [`ProviderRegistry`].
//! Every decode worker owns its own provider, so implementations need not be
//! `Sync`.

mod label;
mod raw;
mod registry;

pub use label::{
    LabelConfig, LabelExtractor, LabelLoader, LabelParamFactory, LabelParams, LabelTransformer,
};
pub use raw::{IdentityTransformer, NoParams, RawConfig, RawExtractor, RawLoader};
pub use registry::{ModalityFactory, ProviderFactory, ProviderRegistry};

use crate::error::TransformError;
use rand::RngCore;

pub type TransformResult<T> = std::result::Result<T, TransformError>;

pub trait Extractor: Send {
    type Decoded;

    fn extract(&self, raw: &[u8]) -> TransformResult<Self::Decoded>;
}

pub trait ParamFactory: Send {
    type Decoded;
    type Params;

    fn make_params(&self, decoded: &Self::Decoded, rng: &mut dyn RngCore) -> Self::Params;
}

pub trait Transformer: Send {
    type Decoded;
    type Params;

    fn transform(
        &self,
        params: &Self::Params,
        decoded: Self::Decoded,
    ) -> TransformResult<Self::Decoded>;
}

pub trait BufferLoader: Send {
    type Decoded;

    /// Bytes written per record
    fn output_len(&self) -> usize;

    /// Fill `out` (exactly `output_len()` bytes)
    fn load(&self, out: &mut [u8], decoded: &Self::Decoded) -> TransformResult<()>;
}

/// Object-safe view of one complete extract/transform/load chain
pub trait RecordEtl: Send {
    fn output_len(&self) -> usize;

    fn process(&self, raw: &[u8], out: &mut [u8], rng: &mut dyn RngCore) -> TransformResult<()>;
}

/// One implementation of each role, chained
pub struct Etl<E, F, T, L> {
    pub extractor: E,
    pub factory: F,
    pub transformer: T,
    pub loader: L,
}

impl<E, F, T, L> Etl<E, F, T, L> {
    pub fn new(extractor: E, factory: F, transformer: T, loader: L) -> Self {
        Etl {
            extractor,
            factory,
            transformer,
            loader,
        }
    }
}

impl<E, F, T, L> RecordEtl for Etl<E, F, T, L>
where
    E: Extractor,
    F: ParamFactory<Decoded = E::Decoded>,
    T: Transformer<Decoded = E::Decoded, Params = F::Params>,
    L: BufferLoader<Decoded = E::Decoded>,
{
    fn output_len(&self) -> usize {
        self.loader.output_len()
    }

    fn process(&self, raw: &[u8], out: &mut [u8], rng: &mut dyn RngCore) -> TransformResult<()> {
        let decoded = self.extractor.extract(raw)?;
        let params = self.factory.make_params(&decoded, rng);
        let decoded = self.transformer.transform(&params, decoded)?;
        self.loader.load(out, &decoded)
    }
}

/// What a decode worker calls for every record
pub trait Provider: Send {
    /// Output bytes per record for the object side
    fn data_len(&self) -> usize;

    /// Output bytes per record for the target side
    fn target_len(&self) -> usize;

    /// Transform one record pair into its two output regions
    fn provide(
        &mut self,
        object: &[u8],
        target: &[u8],
        data_out: &mut [u8],
        target_out: &mut [u8],
        rng: &mut dyn RngCore,
    ) -> TransformResult<()>;
}

/// Provider built from an object chain and a target chain
pub struct PairProvider {
    data: Box<dyn RecordEtl>,
    target: Box<dyn RecordEtl>,
}

impl PairProvider {
    pub fn new(data: Box<dyn RecordEtl>, target: Box<dyn RecordEtl>) -> Self {
        PairProvider { data, target }
    }
}

impl Provider for PairProvider {
    fn data_len(&self) -> usize {
        self.data.output_len()
    }

    fn target_len(&self) -> usize {
        self.target.output_len()
    }

    fn provide(
        &mut self,
        object: &[u8],
        target: &[u8],
        data_out: &mut [u8],
        target_out: &mut [u8],
        rng: &mut dyn RngCore,
    ) -> TransformResult<()> {
        self.data.process(object, data_out, rng)?;
        self.target.process(target, target_out, rng)
    }
}

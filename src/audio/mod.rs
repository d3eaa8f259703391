//! Asset acquisition: fetch, decode, and normalize the single ambient asset.

pub mod asset;
pub mod decode;
pub mod loader;
pub mod resample;

pub use asset::AudioAsset;
pub use loader::{AssetFetcher, AssetLoader, HttpFetcher};
pub use resample::TARGET_SAMPLE_RATE;

//! Asset loader
//!
//! Fetches the remote asset with a bounded timeout, decodes and normalizes
//! it, and caches the result for the engine lifetime. Failures are retried
//! lazily (the next `play()` call triggers another attempt, never an
//! internal timer) and the total attempt budget is bounded.
//!
//! Fetching goes through [`AssetFetcher`] so tests can inject payloads and
//! failures without a network.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tracing::{debug, info, warn};

use crate::audio::asset::AudioAsset;
use crate::audio::{decode, resample};
use crate::config::EngineConfig;
use crate::error::{Error, Result};

/// Source of raw asset bytes.
pub trait AssetFetcher: Send + Sync {
    /// Fetch the complete payload. Implementations do not need to enforce
    /// the timeout; the loader wraps the call.
    fn fetch(&self) -> BoxFuture<'_, Result<Vec<u8>>>;
}

/// HTTP fetcher backed by reqwest.
pub struct HttpFetcher {
    client: reqwest::Client,
    url: String,
}

impl HttpFetcher {
    pub fn new(url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
        }
    }
}

impl AssetFetcher for HttpFetcher {
    fn fetch(&self) -> BoxFuture<'_, Result<Vec<u8>>> {
        Box::pin(async move {
            let response = self
                .client
                .get(&self.url)
                .send()
                .await
                .map_err(|e| Error::Http(e.to_string()))?;

            if !response.status().is_success() {
                return Err(Error::Http(format!("HTTP {}", response.status())));
            }

            let bytes = response
                .bytes()
                .await
                .map_err(|e| Error::Http(e.to_string()))?;
            Ok(bytes.to_vec())
        })
    }
}

/// Fetch-decode-cache pipeline for the single ambient asset.
pub struct AssetLoader {
    fetcher: Arc<dyn AssetFetcher>,
    fetch_timeout: Duration,
    max_retries: u32,
    hint_ext: Option<String>,
    attempts: u32,
    cached: Option<Arc<AudioAsset>>,
}

impl AssetLoader {
    pub fn new(fetcher: Arc<dyn AssetFetcher>, config: &EngineConfig) -> Self {
        Self {
            fetcher,
            fetch_timeout: config.fetch_timeout,
            max_retries: config.max_load_retries,
            hint_ext: config.asset_hint_ext(),
            attempts: 0,
            cached: None,
        }
    }

    /// Whether the attempt budget is spent.
    pub fn exhausted(&self) -> bool {
        self.cached.is_none() && self.attempts >= self.max_retries
    }

    /// The cached asset, if a load ever succeeded.
    pub fn cached(&self) -> Option<Arc<AudioAsset>> {
        self.cached.clone()
    }

    /// Load the asset, consuming one attempt on failure.
    ///
    /// A successful load is cached for the process lifetime; later calls are
    /// free. Once the budget is exhausted every call fails immediately.
    pub async fn load(&mut self) -> Result<Arc<AudioAsset>> {
        if let Some(asset) = &self.cached {
            return Ok(Arc::clone(asset));
        }

        if self.attempts >= self.max_retries {
            return Err(Error::Decode(format!(
                "asset load abandoned after {} attempts",
                self.attempts
            )));
        }

        self.attempts += 1;
        debug!(
            attempt = self.attempts,
            max = self.max_retries,
            "loading ambient asset"
        );

        let bytes = match tokio::time::timeout(self.fetch_timeout, self.fetcher.fetch()).await {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => {
                warn!(attempt = self.attempts, error = %e, "asset fetch failed");
                return Err(e);
            }
            Err(_) => {
                warn!(attempt = self.attempts, "asset fetch timed out");
                return Err(Error::LoadTimeout(self.fetch_timeout));
            }
        };

        let hint = self.hint_ext.clone();
        let asset = tokio::task::spawn_blocking(move || -> Result<AudioAsset> {
            let (samples, rate) = decode::decode_to_stereo(bytes, hint.as_deref())?;
            let samples = resample::to_target_rate(&samples, rate)?;
            Ok(AudioAsset::new(samples, resample::TARGET_SAMPLE_RATE))
        })
        .await
        .map_err(|e| Error::Internal(format!("decode task failed: {e}")))??;

        info!(
            duration_s = format!("{:.1}", asset.duration()),
            "ambient asset loaded"
        );

        let asset = Arc::new(asset);
        self.cached = Some(Arc::clone(&asset));
        Ok(asset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct StaticFetcher {
        bytes: Vec<u8>,
        calls: AtomicU32,
    }

    impl AssetFetcher for StaticFetcher {
        fn fetch(&self) -> BoxFuture<'_, Result<Vec<u8>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let bytes = self.bytes.clone();
            Box::pin(async move { Ok(bytes) })
        }
    }

    struct FailingFetcher;

    impl AssetFetcher for FailingFetcher {
        fn fetch(&self) -> BoxFuture<'_, Result<Vec<u8>>> {
            Box::pin(async { Err(Error::Http("connection refused".to_string())) })
        }
    }

    struct HangingFetcher;

    impl AssetFetcher for HangingFetcher {
        fn fetch(&self) -> BoxFuture<'_, Result<Vec<u8>>> {
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(Vec::new())
            })
        }
    }

    fn wav_bytes() -> Vec<u8> {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 44_100,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for _ in 0..4410 {
                writer.write_sample(1000i16).unwrap();
                writer.write_sample(-1000i16).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    fn test_config() -> EngineConfig {
        EngineConfig {
            asset_url: "https://example.com/loop.wav".to_string(),
            ..EngineConfig::default()
        }
    }

    #[tokio::test]
    async fn test_successful_load_is_cached() {
        let fetcher = Arc::new(StaticFetcher {
            bytes: wav_bytes(),
            calls: AtomicU32::new(0),
        });
        let mut loader = AssetLoader::new(Arc::clone(&fetcher) as _, &test_config());

        let first = loader.load().await.unwrap();
        let second = loader.load().await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.sample_rate(), 44_100);
    }

    #[tokio::test]
    async fn test_retry_budget_exhausts() {
        let mut loader = AssetLoader::new(Arc::new(FailingFetcher), &test_config());

        for _ in 0..3 {
            assert!(!loader.exhausted());
            assert!(loader.load().await.is_err());
        }
        assert!(loader.exhausted());

        // Further calls fail without consuming network attempts
        assert!(loader.load().await.is_err());
        assert!(loader.cached().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_timeout() {
        let mut loader = AssetLoader::new(Arc::new(HangingFetcher), &test_config());
        let result = loader.load().await;
        assert!(matches!(result, Err(Error::LoadTimeout(_))));
    }

    #[tokio::test]
    async fn test_decode_failure_counts_attempt() {
        let fetcher = Arc::new(StaticFetcher {
            bytes: vec![0xba, 0xad, 0xf0, 0x0d],
            calls: AtomicU32::new(0),
        });
        let mut loader = AssetLoader::new(fetcher as _, &test_config());

        assert!(matches!(loader.load().await, Err(Error::Decode(_))));
        assert!(!loader.exhausted());
    }
}

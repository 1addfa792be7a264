//! The long-lived asset service owning the cache and its reaper.
//!
//! One [`AssetService`] is constructed at application start and passed by
//! reference to everything that needs assets; there is no ambient global
//! state. Tearing it down via [`AssetService::shutdown`] stops the reaper and
//! disposes every cached asset.

use std::sync::Arc;

use reqwest::Client;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::caching::{
    spawn_reaper, AssetCache, AssetKey, CacheContents, CacheError, DecodeFn, DecodeOptions,
    Disposer,
};
use crate::config::Config;
use crate::decoders;
use crate::download;
use crate::lod::{self, LodHandle};
use crate::types::{AssetHandle, AssetKind, AssetPayload};

/// A fully described asset request: where to get it, what it is, and how to
/// decode it.
#[derive(Debug, Clone)]
pub struct AssetRequest {
    pub source: String,
    pub kind: AssetKind,
    pub options: DecodeOptions,
}

impl AssetRequest {
    pub fn texture(source: impl Into<String>, options: DecodeOptions) -> Self {
        Self {
            source: source.into(),
            kind: AssetKind::Texture,
            options,
        }
    }

    pub fn model(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            kind: AssetKind::Model,
            options: DecodeOptions::default(),
        }
    }

    pub fn key(&self) -> AssetKey {
        AssetKey::new(&self.source, self.options)
    }
}

/// The asset cache service.
///
/// Construct inside a tokio runtime; the reaper task is spawned immediately.
pub struct AssetService {
    cache: AssetCache,
    client: Client,
    reaper_token: CancellationToken,
    reaper: JoinHandle<()>,
}

impl AssetService {
    pub fn new(config: &Config) -> Self {
        let cache = AssetCache::new(config.caches);
        Self::from_cache(cache)
    }

    /// Creates a service whose evicted handles are released through the
    /// given disposer (typically the renderer's GPU resource destructor).
    pub fn with_disposer(config: &Config, disposer: Box<dyn Disposer>) -> Self {
        let cache = AssetCache::with_disposer(config.caches, disposer);
        Self::from_cache(cache)
    }

    fn from_cache(cache: AssetCache) -> Self {
        let reaper_token = CancellationToken::new();
        let reaper = spawn_reaper(cache.clone(), reaper_token.clone());
        Self {
            cache,
            client: Client::new(),
            reaper_token,
            reaper,
        }
    }

    pub fn cache(&self) -> &AssetCache {
        &self.cache
    }

    /// Acquires the asset described by `request`, fetching and decoding it on
    /// first use.
    pub async fn load(&self, request: &AssetRequest) -> CacheContents<Arc<AssetHandle>> {
        self.cache
            .acquire(request.key(), request.kind, self.decode_fn(request))
            .await
    }

    pub async fn load_texture(
        &self,
        source: &str,
        options: DecodeOptions,
    ) -> CacheContents<Arc<AssetHandle>> {
        self.load(&AssetRequest::texture(source, options)).await
    }

    pub async fn load_model(&self, source: &str) -> CacheContents<Arc<AssetHandle>> {
        self.load(&AssetRequest::model(source)).await
    }

    /// Releases one acquisition previously obtained through this service.
    pub fn release(&self, key: &AssetKey) {
        self.cache.release(key);
    }

    /// Warms the cache up with a batch of assets, each item succeeding or
    /// failing independently.
    pub async fn preload(
        &self,
        requests: &[AssetRequest],
    ) -> Vec<CacheContents<Arc<AssetHandle>>> {
        let batch = requests
            .iter()
            .map(|request| (request.key(), request.kind, self.decode_fn(request)))
            .collect();
        self.cache.preload(batch).await
    }

    /// Builds distance-based detail variants for a model source.
    pub async fn build_lod(&self, source: &str, distances: &[f64]) -> CacheContents<LodHandle> {
        let request = AssetRequest::model(source);
        lod::build_lod(
            &self.cache,
            request.key(),
            self.decode_fn(&request),
            distances,
        )
        .await
    }

    /// Stops the reaper and disposes every cached asset.
    pub async fn shutdown(self) {
        self.reaper_token.cancel();
        if let Err(err) = self.reaper.await {
            tracing::error!(error = %err, "reaper task panicked");
        }
        self.cache.clear_all();
    }

    /// The fetch-then-decode routine for one request. Fetching runs on the
    /// async runtime, the CPU-heavy decode on the blocking pool.
    fn decode_fn(&self, request: &AssetRequest) -> DecodeFn {
        let client = self.client.clone();
        let source = request.source.clone();
        let kind = request.kind;
        let options = request.options;
        Box::new(move || {
            Box::pin(async move {
                let bytes = download::fetch(&client, &source).await?;
                let decoded = tokio::task::spawn_blocking(move || match kind {
                    AssetKind::Texture => {
                        decoders::texture::decode(&bytes, options).map(AssetPayload::Texture)
                    }
                    AssetKind::Model => decoders::model::decode(&bytes).map(AssetPayload::Model),
                })
                .await;
                decoded.unwrap_or_else(|_| Err(CacheError::InternalError))
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test;

    fn write_png(dir: &std::path::Path, name: &str) -> String {
        let img = image::RgbaImage::from_pixel(2, 2, image::Rgba([0, 255, 0, 255]));
        let path = dir.join(name);
        img.save_with_format(&path, image::ImageFormat::Png).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_load_texture_roundtrip() {
        test::setup();
        let dir = tempfile::tempdir().unwrap();
        let source = write_png(dir.path(), "fabric.png");

        let service = AssetService::new(&Config::default());

        let first = service
            .load_texture(&source, DecodeOptions::default())
            .await
            .unwrap();
        let second = service
            .load_texture(&source, DecodeOptions::default())
            .await
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let key = AssetRequest::texture(&source, DecodeOptions::default()).key();
        assert_eq!(service.cache().ref_count(&key), Some(2));

        service.shutdown().await;
        assert!(first.is_disposed());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_preload_isolates_failures() {
        test::setup();
        let dir = tempfile::tempdir().unwrap();
        let good_a = write_png(dir.path(), "a.png");
        let good_c = write_png(dir.path(), "c.png");
        let missing = dir.path().join("missing.png").to_string_lossy().into_owned();

        let service = AssetService::new(&Config::default());
        let requests = vec![
            AssetRequest::texture(&good_a, DecodeOptions::default()),
            AssetRequest::texture(&missing, DecodeOptions::default()),
            AssetRequest::texture(&good_c, DecodeOptions::default()),
        ];

        let results = service.preload(&requests).await;
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(CacheError::DecodeFailed(_))));
        assert!(results[2].is_ok());

        // the failing sibling left the successes cached and usable
        assert_eq!(service.cache().stats().entries, 2);

        service.shutdown().await;
    }
}

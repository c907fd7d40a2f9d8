use super::{BlockLoader, CacheKey};
use crate::archive::ArchiveReader;
use crate::buffer::BufferPair;
use crate::config::RemoteConfig;
use crate::error::{LoaderError, Result};
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::io::Cursor;
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};
use url::Url;

/// Shard description served by the metadata endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RemoteMetadata {
    pub record_count: usize,
    pub macro_batch_per_shard: usize,
}

struct Prefetch {
    block_num: usize,
    handle: JoinHandle<Result<Vec<u8>>>,
}

/// Fetches blocks as archive streams from an HTTP block service
///
/// Blocks come from `GET {base}/macrobatch/` and shard metadata from
/// `GET {base}/object_count/`. Any status other than 200 is an error. One
/// block can be fetched ahead on a background thread via
/// [`BlockLoader::prefetch_block`].
pub struct RemoteBlockLoader {
    client: Client,
    config: RemoteConfig,
    block_size: usize,
    metadata: RemoteMetadata,
    pending: Option<Prefetch>,
}

impl RemoteBlockLoader {
    /// Connect and load shard metadata
    pub fn new(config: RemoteConfig, block_size: usize) -> Result<Self> {
        if config.shard_index >= config.shard_count {
            return Err(LoaderError::Config(format!(
                "shard index {} must be less than shard count {}",
                config.shard_index, config.shard_count
            )));
        }

        let client = Client::builder().build()?;
        let block_size = block_size.max(1);
        let url = metadata_url(&config, block_size)?;
        let body = http_get(&client, &url)?;
        let metadata: RemoteMetadata = serde_json::from_slice(&body).map_err(|e| {
            LoaderError::Remote(format!(
                "cannot parse metadata from {}: {} ({})",
                url,
                e,
                String::from_utf8_lossy(&body)
            ))
        })?;

        info!(
            "Remote shard {}/{} of collection {}: {} records in {} blocks",
            config.shard_index,
            config.shard_count,
            config.collection_id,
            metadata.record_count,
            metadata.macro_batch_per_shard
        );

        Ok(RemoteBlockLoader {
            client,
            config,
            block_size,
            metadata,
            pending: None,
        })
    }

    pub fn metadata(&self) -> &RemoteMetadata {
        &self.metadata
    }

    fn take_prefetched(&mut self, block_num: usize) -> Option<Result<Vec<u8>>> {
        let prefetch = self.pending.take()?;
        let result = join_prefetch(prefetch.handle);
        if prefetch.block_num == block_num {
            Some(result)
        } else {
            debug!(
                "Discarding prefetched block {} (wanted {})",
                prefetch.block_num, block_num
            );
            None
        }
    }
}

fn join_prefetch(handle: JoinHandle<Result<Vec<u8>>>) -> Result<Vec<u8>> {
    handle
        .join()
        .unwrap_or_else(|_| Err(LoaderError::Remote("prefetch thread panicked".into())))
}

fn endpoint(config: &RemoteConfig, path: &str, params: &[(&str, String)]) -> Result<Url> {
    let base = format!("{}/{}/", config.base_url.trim_end_matches('/'), path);
    Url::parse_with_params(&base, params)
        .map_err(|e| LoaderError::Config(format!("invalid remote url '{}': {}", base, e)))
}

fn block_url(config: &RemoteConfig, block_num: usize, block_size: usize) -> Result<Url> {
    endpoint(
        config,
        "macrobatch",
        &[
            ("macro_batch_index", block_num.to_string()),
            ("macro_batch_max_size", block_size.to_string()),
            ("collection_id", config.collection_id.to_string()),
            ("shard_count", config.shard_count.to_string()),
            ("shard_index", config.shard_index.to_string()),
            ("token", config.token.clone()),
        ],
    )
}

fn metadata_url(config: &RemoteConfig, block_size: usize) -> Result<Url> {
    endpoint(
        config,
        "object_count",
        &[
            ("macro_batch_max_size", block_size.to_string()),
            ("collection_id", config.collection_id.to_string()),
            ("shard_count", config.shard_count.to_string()),
            ("shard_index", config.shard_index.to_string()),
            ("token", config.token.clone()),
        ],
    )
}

fn http_get(client: &Client, url: &Url) -> Result<Vec<u8>> {
    let response = client
        .get(url.clone())
        .send()
        .map_err(|e| LoaderError::Remote(format!("HTTP GET on '{}' failed: {}", url, e)))?;

    let status = response.status();
    if status != StatusCode::OK {
        return Err(LoaderError::Remote(format!(
            "HTTP GET on '{}' failed. status code: {}",
            url,
            status.as_u16()
        )));
    }

    Ok(response.bytes()?.to_vec())
}

impl BlockLoader for RemoteBlockLoader {
    fn load_block(&mut self, dest: &mut BufferPair, block_num: usize) -> Result<()> {
        let body = match self.take_prefetched(block_num) {
            Some(result) => result?,
            None => http_get(&self.client, &block_url(&self.config, block_num, self.block_size)?)?,
        };

        let mut block = BufferPair::new();
        ArchiveReader::new(Cursor::new(body))?.read_into(&mut block)?;
        debug!("Fetched remote block {} ({} records)", block_num, block.len());

        for pair in block.drain_pairs() {
            dest.push(pair);
        }
        Ok(())
    }

    fn object_count(&self) -> usize {
        self.metadata.record_count
    }

    fn block_count(&self) -> usize {
        self.metadata.macro_batch_per_shard
    }

    fn block_size(&self) -> usize {
        self.block_size
    }

    fn cache_key(&self) -> Result<CacheKey> {
        let mut hasher = Sha256::new();
        hasher.update(self.config.base_url.as_bytes());
        hasher.update(
            format!(
                "|{}|{}|{}|{}",
                self.config.collection_id,
                self.config.shard_count,
                self.config.shard_index,
                self.block_size
            )
            .as_bytes(),
        );
        Ok(CacheKey {
            hash: format!("{:x}", hasher.finalize()),
            version: self.metadata.record_count.to_string(),
        })
    }

    fn prefetch_block(&mut self, block_num: usize) {
        if matches!(&self.pending, Some(p) if p.block_num == block_num) {
            return;
        }
        if let Some(stale) = self.pending.take() {
            if let Err(e) = join_prefetch(stale.handle) {
                warn!("Dropped failed prefetch of block {}: {}", stale.block_num, e);
            }
        }

        let url = match block_url(&self.config, block_num, self.block_size) {
            Ok(url) => url,
            Err(e) => {
                warn!("Cannot prefetch block {}: {}", block_num, e);
                return;
            }
        };
        let client = self.client.clone();
        let handle = thread::spawn(move || http_get(&client, &url));
        self.pending = Some(Prefetch { block_num, handle });
    }
}

impl Drop for RemoteBlockLoader {
    fn drop(&mut self) {
        if let Some(prefetch) = self.pending.take() {
            let _ = prefetch.handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RemoteConfig {
        RemoteConfig {
            base_url: "http://127.0.0.1:5000/".into(),
            token: "a b&c".into(),
            collection_id: 7,
            shard_count: 2,
            shard_index: 1,
        }
    }

    #[test]
    fn test_block_url() {
        let url = block_url(&config(), 3, 128).unwrap();
        assert_eq!(url.path(), "/macrobatch/");
        let query: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(query[0], ("macro_batch_index".into(), "3".into()));
        assert_eq!(query[1], ("macro_batch_max_size".into(), "128".into()));
        assert_eq!(query[2], ("collection_id".into(), "7".into()));
        assert_eq!(query[3], ("shard_count".into(), "2".into()));
        assert_eq!(query[4], ("shard_index".into(), "1".into()));
        assert_eq!(query[5], ("token".into(), "a b&c".into()));
    }

    #[test]
    fn test_metadata_url() {
        let url = metadata_url(&config(), 64).unwrap();
        assert_eq!(url.path(), "/object_count/");
        assert!(url.query().unwrap().starts_with("macro_batch_max_size=64"));
    }

    #[test]
    fn test_bad_shard_index() {
        let mut cfg = config();
        cfg.shard_index = 2;
        assert!(matches!(
            RemoteBlockLoader::new(cfg, 8),
            Err(LoaderError::Config(_))
        ));
    }
}

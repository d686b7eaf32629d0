use std::collections::{HashMap, HashSet};

use skein_types::{
    ChunkKey, ContentType, DecodedImage, DecodedImages, Event, ImageBundle, ImageManifest,
    RangesForProcess, RangesForSystem, System, WireMessage,
};
use tracing::{debug, warn};

use crate::engine::{sort_newest_first, SyncEngine};
use crate::error::SyncResult;
use crate::verifier::SyncVerifier;

/// Upper bound on a reassembled blob, whatever a manifest declares.
pub const MAX_BLOB_LEN: usize = 64 * 1024 * 1024;

/// Cache key for a resolved avatar: `hex(system)#w,h`, or `hex(system)#*`
/// for every resolution.
pub fn avatar_cache_key(system: &System, resolution: Option<(u64, u64)>) -> String {
    match resolution {
        Some((width, height)) => format!("{}#{width},{height}", system.to_hex()),
        None => format!("{}#*", system.to_hex()),
    }
}

fn username_cache_key(system: &System) -> String {
    format!("username:{}", system.to_hex())
}

/// Missing clocks tolerated per manifest before reassembly gives up.
pub const MAX_MISSING_CHUNKS: u64 = 4096;

/// Concatenate a manifest's chunks in section order, then cut or zero-pad
/// to the declared byte count. Missing chunks are skipped.
///
/// The walk ends once the declared size is reached, every fetched chunk of
/// the manifest's process has been used, or [`MAX_MISSING_CHUNKS`] clocks
/// turned up empty.
pub fn reassemble(manifest: &ImageManifest, chunks: &HashMap<ChunkKey, Vec<u8>>) -> Vec<u8> {
    let declared = usize::try_from(manifest.byte_count).unwrap_or(MAX_BLOB_LEN);
    let target = declared.min(MAX_BLOB_LEN);
    let prefix = format!("{}#", manifest.process.to_hex());
    let available = chunks.keys().filter(|k| k.as_str().starts_with(&prefix)).count();

    let mut blob = Vec::new();
    let mut used = HashSet::new();
    let mut missing = 0u64;
    'sections: for section in &manifest.sections {
        for clock in section.clocks() {
            if blob.len() >= target || used.len() >= available || missing >= MAX_MISSING_CHUNKS {
                break 'sections;
            }
            match chunks.get(&ChunkKey::new(&manifest.process, clock)) {
                Some(chunk) => {
                    blob.extend_from_slice(chunk);
                    used.insert(clock);
                }
                None => missing += 1,
            }
        }
    }
    if missing > 0 {
        warn!(process = %manifest.process, missing, "blob chunks missing");
    }
    blob.resize(target, 0);
    blob
}

fn latest_lww_value(events: &[Event], content_type: ContentType) -> Option<Vec<u8>> {
    events
        .iter()
        .filter(|e| e.is(content_type))
        .find_map(|e| e.lww_element.as_ref())
        .map(|element| element.value.clone())
}

impl SyncEngine {
    /// Latest verified events of the given content types for `system`,
    /// newest first.
    pub async fn query_latest(&self, system: &System, content_types: &[u64]) -> SyncResult<Vec<Event>> {
        self.bounded(async {
            let gateway = self.gateway();
            let (responses, mut report) = self
                .gather(|replica| async move {
                    gateway.get_query_latest(&replica, system, content_types).await
                })
                .await
                .require_any()?;
            let mut events = Vec::new();
            for (replica, batch) in &responses {
                events.extend(
                    batch
                        .iter()
                        .filter_map(|signed| SyncVerifier::for_system(replica, system, signed, &mut report)),
                );
            }
            sort_newest_first(&mut events);
            Ok(events)
        })
        .await
    }

    /// Chunk contents for `ranges`, keyed by (process, clock). Later
    /// replicas overwrite earlier ones.
    async fn fetch_chunks(
        &self,
        system: &System,
        ranges: &RangesForSystem,
    ) -> SyncResult<HashMap<ChunkKey, Vec<u8>>> {
        self.bounded(async {
            let gateway = self.gateway();
            let (responses, mut report) = self
                .gather(|replica| async move { gateway.get_events(&replica, system, ranges).await })
                .await
                .require_any()?;
            let mut chunks = HashMap::new();
            for (replica, batch) in &responses {
                for signed in batch {
                    if let Some(event) = SyncVerifier::for_system(replica, system, signed, &mut report) {
                        chunks.insert(ChunkKey::new(&event.process, event.logical_clock), event.content);
                    }
                }
            }
            Ok(chunks)
        })
        .await
    }

    /// Reassemble the images of the latest `content_type` bundle for
    /// `system`, keeping manifests that match `resolution` (all when `None`).
    pub async fn resolve_images(
        &self,
        system: &System,
        content_type: ContentType,
        resolution: Option<(u64, u64)>,
    ) -> SyncResult<Vec<DecodedImage>> {
        let latest = self.query_latest(system, &[content_type.as_u64()]).await?;
        let Some(value) = latest_lww_value(&latest, content_type) else {
            return Ok(Vec::new());
        };
        let bundle = match ImageBundle::decode(&value) {
            Ok(bundle) => bundle,
            Err(err) => {
                warn!(system = %system, error = %err, "undecodable image bundle");
                return Ok(Vec::new());
            }
        };
        let manifests: Vec<ImageManifest> = bundle
            .image_manifests
            .into_iter()
            .filter(|m| resolution.map_or(true, |(w, h)| m.width == w && m.height == h))
            .collect();
        if manifests.is_empty() {
            return Ok(Vec::new());
        }

        let ranges = RangesForSystem {
            ranges_for_processes: manifests
                .iter()
                .map(|m| RangesForProcess {
                    process: m.process.clone(),
                    ranges: m.sections.clone(),
                })
                .collect(),
        };
        let chunks = self.fetch_chunks(system, &ranges).await?;
        debug!(system = %system, manifests = manifests.len(), chunks = chunks.len(), "reassembling images");
        Ok(manifests
            .iter()
            .map(|m| DecodedImage {
                mime_type: m.mime.clone(),
                blob: reassemble(m, &chunks),
            })
            .collect())
    }

    /// The system's avatar images, through the cache when one is attached.
    pub async fn resolve_avatar(
        &self,
        system: &System,
        resolution: Option<(u64, u64)>,
    ) -> SyncResult<Vec<DecodedImage>> {
        let key = avatar_cache_key(system, resolution);
        if let Some(bytes) = self.cache().and_then(|cache| cache.get(&key)) {
            match DecodedImages::decode(&bytes) {
                Ok(cached) => return Ok(cached.images),
                Err(err) => warn!(key = %key, error = %err, "discarding undecodable cache entry"),
            }
        }
        let images = self.resolve_images(system, ContentType::Avatar, resolution).await?;
        if images.is_empty() {
            return Ok(images);
        }
        if let Some(cache) = self.cache() {
            let encoded = DecodedImages {
                images: images.clone(),
            }
            .encode()?;
            cache.put(&key, encoded, self.config().cache_ttl());
        }
        Ok(images)
    }

    /// The system's most recent username, if any replica knows one.
    pub async fn resolve_username(&self, system: &System) -> SyncResult<Option<String>> {
        let key = username_cache_key(system);
        if let Some(bytes) = self.cache().and_then(|cache| cache.get(&key)) {
            return Ok(Some(String::from_utf8_lossy(&bytes).into_owned()));
        }
        let latest = self
            .query_latest(system, &[ContentType::Username.as_u64()])
            .await?;
        let name = latest_lww_value(&latest, ContentType::Username)
            .map(|value| String::from_utf8_lossy(&value).into_owned())
            .filter(|name| !name.is_empty());
        if let (Some(cache), Some(name)) = (self.cache(), &name) {
            cache.put(&key, name.as_bytes().to_vec(), self.config().cache_ttl());
        }
        Ok(name)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::cache::{InMemoryCache, ResultCache};
    use crate::fixtures::{network, process, Identity, Network};
    use skein_types::{Process, Range, SignedEvent};

    fn manifest(byte_count: u64, sections: Vec<Range>) -> ImageManifest {
        ImageManifest {
            mime: "image/jpeg".into(),
            width: 32,
            height: 32,
            byte_count,
            process: Process::new(vec![1; 16]),
            sections,
        }
    }

    fn chunks(process: &Process, parts: &[(u64, &[u8])]) -> HashMap<ChunkKey, Vec<u8>> {
        parts
            .iter()
            .map(|(clock, bytes)| (ChunkKey::new(process, *clock), bytes.to_vec()))
            .collect()
    }

    #[test]
    fn reassembly_truncates_to_byte_count() {
        let m = manifest(10, vec![Range::new(1, 3)]);
        let c = chunks(&m.process, &[(1, b"abcd"), (2, b"efgh"), (3, b"ijkl")]);
        assert_eq!(reassemble(&m, &c), b"abcdefghij".to_vec());
    }

    #[test]
    fn reassembly_pads_and_skips_missing() {
        let m = manifest(6, vec![Range::single(5), Range::single(2)]);
        let c = chunks(&m.process, &[(5, b"xy"), (9, b"zz")]);
        assert_eq!(reassemble(&m, &c), b"xy\0\0\0\0".to_vec());
    }

    #[test]
    fn reassembly_follows_section_order() {
        let m = manifest(4, vec![Range::single(2), Range::single(1)]);
        let c = chunks(&m.process, &[(1, b"cd"), (2, b"ab")]);
        assert_eq!(reassemble(&m, &c), b"abcd".to_vec());
    }

    #[test]
    fn unbounded_section_stops_at_declared_size() {
        let m = manifest(4, vec![Range::new(1, u64::MAX)]);
        let c = chunks(&m.process, &[(1, b"abcd")]);
        assert_eq!(reassemble(&m, &c), b"abcd".to_vec());
    }

    #[test]
    fn unbounded_section_stops_once_chunks_run_out() {
        let m = manifest(100, vec![Range::new(1, u64::MAX), Range::new(0, u64::MAX)]);
        let c = chunks(&m.process, &[(2, b"ab")]);
        let blob = reassemble(&m, &c);
        assert_eq!(blob.len(), 100);
        assert_eq!(&blob[..2], b"ab");
    }

    #[test]
    fn long_gaps_give_up_after_missing_budget() {
        let m = manifest(4, vec![Range::new(1, u64::MAX)]);
        let far = MAX_MISSING_CHUNKS + 10;
        let c = chunks(&m.process, &[(1, b"ab"), (far, b"zz")]);
        assert_eq!(reassemble(&m, &c), b"ab\0\0".to_vec());
    }

    fn chunk(me: &Identity, process: &Process, clock: u64, bytes: &[u8]) -> SignedEvent {
        let mut event = me.event(process, clock, ContentType::BlobSection);
        event.content = bytes.to_vec();
        me.sign(&event)
    }

    fn avatar_bundle(process: &Process) -> Vec<u8> {
        ImageBundle {
            image_manifests: vec![
                ImageManifest {
                    mime: "image/png".into(),
                    width: 64,
                    height: 64,
                    byte_count: 6,
                    process: process.clone(),
                    sections: vec![Range::new(1, 2)],
                },
                ImageManifest {
                    mime: "image/png".into(),
                    width: 16,
                    height: 16,
                    byte_count: 3,
                    process: process.clone(),
                    sections: vec![Range::single(3)],
                },
            ],
        }
        .encode()
        .unwrap()
    }

    fn seeded_avatar(net: &Network, me: &Identity) {
        let blobs = process();
        net.seed_all(&chunk(me, &blobs, 1, b"abc"));
        net.seed_all(&chunk(me, &blobs, 2, b"def"));
        net.seed_all(&chunk(me, &blobs, 3, b"xyz"));
        net.seed_all(&me.lww(&process(), 4, ContentType::Avatar, avatar_bundle(&blobs)));
    }

    #[tokio::test]
    async fn avatar_is_reassembled_from_chunks() {
        let net = network(2);
        let me = Identity::new();
        seeded_avatar(&net, &me);

        let all = net.engine.resolve_avatar(&me.system, None).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].blob, b"abcdef".to_vec());
        assert_eq!(all[1].blob, b"xyz".to_vec());

        let small = net.engine.resolve_avatar(&me.system, Some((16, 16))).await.unwrap();
        assert_eq!(small.len(), 1);
        assert_eq!(small[0].mime_type, "image/png");
        assert!(net
            .engine
            .resolve_avatar(&me.system, Some((1, 1)))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn newest_avatar_wins() {
        let net = network(1);
        let me = Identity::new();
        seeded_avatar(&net, &me);
        let later = process();
        net.seed_all(&chunk(&me, &later, 1, b"new"));
        let bundle = ImageBundle {
            image_manifests: vec![ImageManifest {
                mime: "image/webp".into(),
                width: 8,
                height: 8,
                byte_count: 3,
                process: later.clone(),
                sections: vec![Range::single(1)],
            }],
        };
        net.seed_all(&me.lww(&later, 9, ContentType::Avatar, bundle.encode().unwrap()));

        let images = net.engine.resolve_avatar(&me.system, None).await.unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].blob, b"new".to_vec());
    }

    #[tokio::test]
    async fn avatar_comes_from_cache_once_resolved() {
        let net = network(1);
        let me = Identity::new();
        seeded_avatar(&net, &me);
        let cache = Arc::new(InMemoryCache::new());
        let engine = net.engine.with_cache(cache.clone());

        let first = engine.resolve_avatar(&me.system, Some((64, 64))).await.unwrap();
        assert!(cache.get(&avatar_cache_key(&me.system, Some((64, 64)))).is_some());
        net.replicas.set_failing(&net.urls[0], true);
        let second = engine.resolve_avatar(&me.system, Some((64, 64))).await.unwrap();
        assert_eq!(first, second);
        assert!(engine.resolve_avatar(&me.system, None).await.is_err());
    }

    #[tokio::test]
    async fn missing_or_garbled_avatar_is_empty() {
        let net = network(1);
        let me = Identity::new();
        assert!(net.engine.resolve_avatar(&me.system, None).await.unwrap().is_empty());
        net.seed_all(&me.lww(&process(), 2, ContentType::Avatar, vec![0xff, 0xff]));
        assert!(net.engine.resolve_avatar(&me.system, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn absent_avatar_is_not_cached() {
        let net = network(1);
        let me = Identity::new();
        let cache = Arc::new(InMemoryCache::new());
        let engine = SyncEngine::new(
            net.replicas.clone(),
            crate::gateway::ReplicaSet::new(net.urls.clone()),
            crate::config::SyncConfig::default(),
        )
        .with_cache(cache.clone());

        assert!(engine.resolve_avatar(&me.system, None).await.unwrap().is_empty());
        assert!(cache.get(&avatar_cache_key(&me.system, None)).is_none());

        seeded_avatar(&net, &me);
        assert_eq!(engine.resolve_avatar(&me.system, None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn username_resolves_latest_and_caches() {
        let net = network(2);
        let me = Identity::new();
        let (a, b) = (process(), process());
        net.seed_all(&me.lww(&a, 3, ContentType::Username, b"old".to_vec()));
        net.replicas.seed(&net.urls[1], me.lww(&b, 8, ContentType::Username, b"alice".to_vec()));
        let cache = Arc::new(InMemoryCache::new());
        let engine = net.engine.with_cache(cache.clone());

        assert_eq!(engine.resolve_username(&me.system).await.unwrap().as_deref(), Some("alice"));
        for url in &net.urls {
            net.replicas.set_failing(url, true);
        }
        assert_eq!(engine.resolve_username(&me.system).await.unwrap().as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn unknown_username_is_none_and_not_cached() {
        let net = network(1);
        let me = Identity::new();
        let cache = Arc::new(InMemoryCache::new());
        let engine = net.engine.with_cache(cache.clone());
        assert_eq!(engine.resolve_username(&me.system).await.unwrap(), None);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn latest_events_skip_forged_copies() {
        let net = network(2);
        let me = Identity::new();
        net.seed_all(&me.lww(&process(), 5, ContentType::Username, b"bob".to_vec()));
        net.replicas.set_tampering(&net.urls[0], true);
        let latest = net
            .engine
            .query_latest(&me.system, &[ContentType::Username.as_u64()])
            .await
            .unwrap();
        assert_eq!(latest.len(), 1);
    }

    #[test]
    fn cache_keys() {
        let system = System::new(1, vec![0xab; 2]);
        assert_eq!(avatar_cache_key(&system, Some((64, 32))), "abab#64,32");
        assert_eq!(avatar_cache_key(&system, None), "abab#*");
    }
}

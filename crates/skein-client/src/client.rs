use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use skein_crypto::{derive_public_key, random_process_id};
use skein_http::HttpGateway;
use skein_sync::{
    create_signed_post_event, InMemoryCache, PostOutcome, Replica, ReplicaGateway, ReplicaSet,
    ResultCache, SyncEngine,
};
use skein_types::{
    DecodedImage, Event, ImageManifest, PrivateKey, Process, Reference, SignedEvent, System,
};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::state::{Account, ClientState, JsonFileStore, StateStore};

/// A signed post and how each replica took it.
#[derive(Debug)]
pub struct PostReceipt {
    pub signed: SignedEvent,
    pub event: Event,
    pub outcomes: Vec<PostOutcome>,
}

impl PostReceipt {
    pub fn accepted(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }
}

/// Session front end over a [`SyncEngine`] and a [`StateStore`].
///
/// Anything that creates or advances a write head runs under `post_lock`, so
/// one client never hands out the same logical clock twice. Server list edits
/// run under `server_lock`. Reads take neither.
pub struct Client {
    config: ClientConfig,
    store: Arc<dyn StateStore>,
    engine: SyncEngine,
    cache: Arc<InMemoryCache>,
    post_lock: Mutex<()>,
    server_lock: Mutex<()>,
    state_lock: StdMutex<()>,
}

impl Client {
    /// HTTP replicas and a JSON state file, both taken from `config`.
    pub fn open(config: ClientConfig) -> ClientResult<Self> {
        let gateway = HttpGateway::new(config.user_agent.clone(), config.sync.replica_timeout())?;
        let store = JsonFileStore::new(config.state_path.clone());
        Self::with_parts(config, Arc::new(gateway), Arc::new(store))
    }

    pub fn with_parts(
        config: ClientConfig,
        gateway: Arc<dyn ReplicaGateway>,
        store: Arc<dyn StateStore>,
    ) -> ClientResult<Self> {
        let state = store.load()?;
        let servers = state.servers.unwrap_or_else(|| config.servers.clone());
        let cache = Arc::new(InMemoryCache::from_entries(state.cache));
        let replicas = ReplicaSet::new(servers.iter().map(Replica::new));
        let engine = SyncEngine::new(gateway, replicas, config.sync.clone()).with_cache(cache.clone());
        Ok(Self {
            config,
            store,
            engine,
            cache,
            post_lock: Mutex::new(()),
            server_lock: Mutex::new(()),
            state_lock: StdMutex::new(()),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The engine, for read operations that need no session.
    pub fn engine(&self) -> &SyncEngine {
        &self.engine
    }

    fn read<R>(&self, f: impl FnOnce(&ClientState) -> ClientResult<R>) -> ClientResult<R> {
        let _guard = self.state_lock.lock().expect("lock poisoned");
        f(&self.store.load()?)
    }

    /// Load, modify and save the state. Nothing is saved if `f` fails.
    fn update<R>(&self, f: impl FnOnce(&mut ClientState) -> ClientResult<R>) -> ClientResult<R> {
        let _guard = self.state_lock.lock().expect("lock poisoned");
        let mut state = self.store.load()?;
        let out = f(&mut state)?;
        self.store.save(&state)?;
        Ok(out)
    }

    // ---- Session ----

    pub fn derive_public(&self, private_key: &PrivateKey) -> ClientResult<System> {
        Ok(derive_public_key(private_key)?)
    }

    pub fn current_system(&self) -> ClientResult<Option<System>> {
        self.read(|state| Ok(state.current_system().cloned()))
    }

    /// Sign in as the owner of `private_key`.
    ///
    /// A previously signed-out account is restored as it was left. Otherwise
    /// a write head is bootstrapped from the replicas for `process`, or for a
    /// fresh random process when none is given.
    pub async fn sign_in(&self, private_key: PrivateKey, process: Option<Process>) -> ClientResult<System> {
        let _post = self.post_lock.lock().await;
        let system = derive_public_key(&private_key)?;
        let archived = self.read(|state| {
            if state.current_system() == Some(&system) {
                return Err(ClientError::AlreadySignedIn(system.to_hex()));
            }
            Ok(state.archived.contains_key(&system.to_hex()))
        })?;

        if archived {
            self.update(|state| Ok(state.restore(&system)))?;
            info!(system = %system, "restored archived account");
            return Ok(system);
        }

        let process = process.unwrap_or_else(random_process_id);
        let boot = self
            .engine
            .find_or_create_post_head(&system, &private_key, &process)
            .await?;
        info!(
            system = %system,
            process = %process,
            logical_clock = boot.head.logical_clock,
            created = boot.created.len(),
            "signed in"
        );
        let account = Account::new(boot.head, &boot.created)?;
        self.update(|state| {
            state.activate(account);
            Ok(())
        })?;
        Ok(system)
    }

    /// Archive the current account. Returns who was signed out, if anyone.
    pub async fn sign_out(&self) -> ClientResult<Option<System>> {
        let _post = self.post_lock.lock().await;
        self.update(|state| Ok(state.archive_current()))
    }

    /// Sign and persist a post, then broadcast it.
    ///
    /// The post is committed once persisted; replicas that reject it are
    /// only logged.
    pub async fn post(
        &self,
        text: &str,
        references: Vec<Reference>,
        image: Option<ImageManifest>,
    ) -> ClientResult<PostReceipt> {
        let _post = self.post_lock.lock().await;
        let signed = self.update(|state| {
            let account = state.current.as_mut().ok_or(ClientError::NotSignedIn)?;
            let signed = create_signed_post_event(&mut account.head, text, references, image)?;
            account.record(&signed)?;
            Ok(signed)
        })?;
        let event = signed.decode_event()?;

        let outcomes = self.engine.send(&signed).await;
        for failed in outcomes.iter().filter(|o| !o.is_success()) {
            warn!(replica = %failed.replica, error = ?failed.error, "replica rejected post");
        }
        Ok(PostReceipt {
            signed,
            event,
            outcomes,
        })
    }

    /// The current account's last `count` authored events, oldest first.
    pub fn history(&self, count: usize) -> ClientResult<Vec<SignedEvent>> {
        self.read(|state| {
            state
                .current
                .as_ref()
                .ok_or(ClientError::NotSignedIn)?
                .history(count)
        })
    }

    // ---- Servers ----

    pub fn servers(&self) -> Vec<Replica> {
        self.engine.replicas().snapshot()
    }

    /// Register a replica. Returns `false` if it was already known.
    pub async fn add_server(&self, url: &str) -> ClientResult<bool> {
        let _servers = self.server_lock.lock().await;
        let replica = Replica::new(url);
        if replica.as_str().is_empty() {
            return Err(ClientError::Config("empty server url".into()));
        }
        let mut servers = self.servers();
        if servers.contains(&replica) {
            return Ok(false);
        }
        servers.push(replica);
        self.save_servers(servers)?;
        Ok(true)
    }

    pub async fn remove_server(&self, url: &str) -> ClientResult<()> {
        let _servers = self.server_lock.lock().await;
        let replica = Replica::new(url);
        let mut servers = self.servers();
        if !servers.contains(&replica) {
            return Err(ClientError::UnknownServer(replica.to_string()));
        }
        if servers.len() < 2 {
            return Err(ClientError::CannotRemoveLastServer);
        }
        servers.retain(|s| *s != replica);
        self.save_servers(servers)
    }

    fn save_servers(&self, servers: Vec<Replica>) -> ClientResult<()> {
        let urls: Vec<String> = servers.iter().map(Replica::to_string).collect();
        self.update(|state| {
            state.servers = Some(urls);
            Ok(())
        })?;
        self.engine.replicas().replace(servers);
        Ok(())
    }

    // ---- Cache ----

    pub fn cache_get(&self, key: &str) -> Option<Vec<u8>> {
        self.cache.get(key)
    }

    /// Store a value for `ttl`, or for the configured cache TTL.
    pub fn cache_put(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> ClientResult<()> {
        self.cache
            .put(key, value, ttl.unwrap_or_else(|| self.config.sync.cache_ttl()));
        self.persist_cache()
    }

    /// Drop expired entries. Returns how many were removed.
    pub fn cache_clean(&self) -> ClientResult<usize> {
        let removed = self.cache.clean();
        self.persist_cache()?;
        Ok(removed)
    }

    pub fn cache_clear(&self) -> ClientResult<()> {
        self.cache.clear();
        self.persist_cache()
    }

    fn persist_cache(&self) -> ClientResult<()> {
        self.update(|state| {
            state.cache = self.cache.entries();
            Ok(())
        })
    }

    // ---- Cached reads ----

    pub async fn resolve_username(&self, system: &System) -> ClientResult<Option<String>> {
        let name = self.engine.resolve_username(system).await?;
        self.persist_cache()?;
        Ok(name)
    }

    pub async fn resolve_avatar(
        &self,
        system: &System,
        resolution: Option<(u64, u64)>,
    ) -> ClientResult<Vec<DecodedImage>> {
        let images = self.engine.resolve_avatar(system, resolution).await?;
        self.persist_cache()?;
        Ok(images)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::InMemoryStateStore;
    use skein_crypto::{generate_private_key, open_for_system};
    use skein_sync::{InMemoryReplicas, SyncError};
    use skein_types::{ContentType, Post, WireMessage};

    struct Harness {
        replicas: Arc<InMemoryReplicas>,
        urls: Vec<Replica>,
        store: Arc<InMemoryStateStore>,
    }

    impl Harness {
        fn new(count: usize) -> Self {
            let replicas = Arc::new(InMemoryReplicas::new());
            let urls = (0..count)
                .map(|i| replicas.add_replica(&format!("https://replica-{i}.test")))
                .collect();
            Self {
                replicas,
                urls,
                store: Arc::new(InMemoryStateStore::new()),
            }
        }

        fn client(&self) -> Client {
            let config = ClientConfig {
                servers: self.urls.iter().map(Replica::to_string).collect(),
                ..ClientConfig::default()
            };
            Client::with_parts(config, self.replicas.clone(), self.store.clone()).unwrap()
        }
    }

    #[tokio::test]
    async fn sign_in_bootstraps_and_broadcasts() {
        let h = Harness::new(2);
        let client = h.client();
        let key = generate_private_key();
        let system = client.sign_in(key.clone(), None).await.unwrap();

        assert_eq!(client.current_system().unwrap(), Some(system.clone()));
        let log = client.history(10).unwrap();
        assert_eq!(log.len(), 1);
        let roster = open_for_system(&system, &log[0]).unwrap();
        assert!(roster.is(ContentType::SystemProcesses));
        for url in &h.urls {
            assert_eq!(h.replicas.events_on(url), log);
        }
    }

    #[tokio::test]
    async fn signing_in_twice_is_an_error() {
        let h = Harness::new(1);
        let client = h.client();
        let key = generate_private_key();
        client.sign_in(key.clone(), None).await.unwrap();
        assert!(matches!(
            client.sign_in(key, None).await.unwrap_err(),
            ClientError::AlreadySignedIn(_)
        ));
    }

    #[tokio::test]
    async fn posting_requires_a_session() {
        let h = Harness::new(1);
        let client = h.client();
        assert!(matches!(
            client.post("hi", vec![], None).await.unwrap_err(),
            ClientError::NotSignedIn
        ));
        assert!(matches!(client.history(1).unwrap_err(), ClientError::NotSignedIn));
    }

    #[tokio::test]
    async fn posts_advance_the_persisted_head() {
        let h = Harness::new(2);
        let client = h.client();
        let system = client.sign_in(generate_private_key(), None).await.unwrap();

        let first = client.post("one", vec![], None).await.unwrap();
        let second = client
            .post("two", vec![Reference::from_blob(b"https://example.com".to_vec())], None)
            .await
            .unwrap();
        assert_eq!(second.event.logical_clock, first.event.logical_clock + 1);
        assert_eq!(first.accepted(), 2);
        assert_eq!(Post::decode(&second.event.content).unwrap().content, "two");
        assert!(open_for_system(&system, &second.signed).is_ok());

        let reopened = h.client();
        let log = reopened.history(2).unwrap();
        assert_eq!(log, vec![first.signed, second.signed]);
        let third = reopened.post("three", vec![], None).await.unwrap();
        assert_eq!(third.event.logical_clock, second.event.logical_clock + 1);
    }

    #[tokio::test]
    async fn rejected_broadcast_still_commits() {
        let h = Harness::new(2);
        let client = h.client();
        client.sign_in(generate_private_key(), None).await.unwrap();
        h.replicas.set_failing(&h.urls[1], true);

        let receipt = client.post("partial", vec![], None).await.unwrap();
        assert_eq!(receipt.accepted(), 1);
        assert_eq!(client.history(1).unwrap(), vec![receipt.signed]);
    }

    #[tokio::test]
    async fn sign_in_fails_when_no_replica_answers() {
        let h = Harness::new(1);
        h.replicas.set_failing(&h.urls[0], true);
        let client = h.client();
        let err = client.sign_in(generate_private_key(), None).await.unwrap_err();
        assert!(matches!(err, ClientError::Sync(SyncError::NoReplicaResponded { .. })));
        assert_eq!(client.current_system().unwrap(), None);
    }

    #[tokio::test]
    async fn archived_account_is_restored_offline() {
        let h = Harness::new(1);
        let client = h.client();
        let key = generate_private_key();
        let system = client.sign_in(key.clone(), None).await.unwrap();
        let posted = client.post("before", vec![], None).await.unwrap();

        assert_eq!(client.sign_out().await.unwrap(), Some(system.clone()));
        assert_eq!(client.current_system().unwrap(), None);
        assert_eq!(client.sign_out().await.unwrap(), None);

        h.replicas.set_failing(&h.urls[0], true);
        assert_eq!(client.sign_in(key, None).await.unwrap(), system);
        h.replicas.set_failing(&h.urls[0], false);
        let after = client.post("after", vec![], None).await.unwrap();
        assert_eq!(after.event.logical_clock, posted.event.logical_clock + 1);
    }

    #[tokio::test]
    async fn switching_accounts_archives_the_previous_one() {
        let h = Harness::new(1);
        let client = h.client();
        let (alice, bob) = (generate_private_key(), generate_private_key());
        let alice_system = client.sign_in(alice.clone(), None).await.unwrap();
        let bob_system = client.sign_in(bob, None).await.unwrap();
        assert_eq!(client.current_system().unwrap(), Some(bob_system));

        h.replicas.set_failing(&h.urls[0], true);
        client.sign_in(alice, None).await.unwrap();
        assert_eq!(client.current_system().unwrap(), Some(alice_system));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_posts_get_distinct_clocks() {
        let h = Harness::new(1);
        let client = Arc::new(h.client());
        client.sign_in(generate_private_key(), None).await.unwrap();

        let tasks: Vec<_> = (0..8)
            .map(|i| {
                let client = client.clone();
                tokio::spawn(async move { client.post(&format!("n{i}"), vec![], None).await })
            })
            .collect();
        let mut clocks = Vec::new();
        for task in tasks {
            clocks.push(task.await.unwrap().unwrap().event.logical_clock);
        }
        clocks.sort_unstable();
        clocks.dedup();
        assert_eq!(clocks.len(), 8);
    }

    #[tokio::test]
    async fn server_list_is_normalized_and_persisted() {
        let h = Harness::new(1);
        let client = h.client();
        assert!(client.add_server("https://extra.test/").await.unwrap());
        assert!(!client.add_server("https://extra.test").await.unwrap());
        assert_eq!(client.servers().len(), 2);
        assert!(matches!(
            client.add_server("  ").await.unwrap_err(),
            ClientError::Config(_)
        ));

        let reopened = h.client();
        assert!(reopened.servers().contains(&Replica::new("https://extra.test")));

        assert!(matches!(
            reopened.remove_server("https://nowhere.test").await.unwrap_err(),
            ClientError::UnknownServer(_)
        ));
        reopened.remove_server("https://extra.test/").await.unwrap();
        assert!(matches!(
            reopened.remove_server(h.urls[0].as_str()).await.unwrap_err(),
            ClientError::CannotRemoveLastServer
        ));
        assert!(matches!(
            reopened.remove_server("https://nowhere.test").await.unwrap_err(),
            ClientError::UnknownServer(_)
        ));
        assert_eq!(h.client().servers(), h.urls);
    }

    #[tokio::test]
    async fn cache_survives_reopen() {
        let h = Harness::new(1);
        let client = h.client();
        client.cache_put("a", vec![1], None).unwrap();
        client
            .cache_put("gone", vec![2], Some(Duration::from_millis(0)))
            .unwrap();
        assert_eq!(client.cache_get("a"), Some(vec![1]));
        assert_eq!(client.cache_get("gone"), None);
        assert_eq!(client.cache_clean().unwrap(), 1);

        let reopened = h.client();
        assert_eq!(reopened.cache_get("a"), Some(vec![1]));
        reopened.cache_clear().unwrap();
        assert_eq!(h.client().cache_get("a"), None);
    }

    #[tokio::test]
    async fn resolved_username_is_persisted_in_cache() {
        let h = Harness::new(1);
        let client = h.client();
        let key = generate_private_key();
        let system = client.derive_public(&key).unwrap();
        assert_eq!(client.resolve_username(&system).await.unwrap(), None);

        let mut head = {
            client.sign_in(key, None).await.unwrap();
            let state = h.store.load().unwrap();
            state.current.unwrap().head
        };
        let mut event = head.next_event(ContentType::Username, Vec::new(), vec![], 5);
        event.lww_element = Some(skein_types::LwwElement {
            value: b"carol".to_vec(),
            unix_milliseconds: 5,
        });
        head.advance(&event).unwrap();
        let signed = skein_crypto::sign_event(&head.private_key, &event).unwrap();
        client.engine().send(&signed).await;

        assert_eq!(client.resolve_username(&system).await.unwrap().as_deref(), Some("carol"));
        h.replicas.set_failing(&h.urls[0], true);
        assert_eq!(
            h.client().resolve_username(&system).await.unwrap().as_deref(),
            Some("carol")
        );
    }

    #[test]
    fn derive_public_matches_sign_in_identity() {
        let h = Harness::new(1);
        let key = generate_private_key();
        assert_eq!(
            h.client().derive_public(&key).unwrap(),
            derive_public_key(&key).unwrap()
        );
    }
}

//! Resolves, fetches and executes scripts, once per id.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use stepchain_sequencer::{Context, LoadFut, ResourceLoad};
use stepchain_types::{LoadError, ResourceId};
use tokio::sync::OnceCell;
use url::Url;

use crate::fetch::{FetchError, Fetcher, SchemeFetcher};
use crate::host::{LoadedScript, PublishingHost, ScriptHost};

type LoadSlot = Arc<OnceCell<Result<(), LoadError>>>;

/// One-shot load results of a single chain run, stored in its [`Context`].
#[derive(Default)]
struct LoadSlots(Mutex<HashMap<ResourceId, LoadSlot>>);

impl LoadSlots {
    fn lock(&self) -> MutexGuard<'_, HashMap<ResourceId, LoadSlot>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Loads resources relative to a base URL.
///
/// Every identifier is loaded at most once per [`Context`]: concurrent and
/// later requests for the same id within one chain run share the first
/// attempt's result, failure included. A run with a fresh context loads
/// again and publishes into its own context.
pub struct ResourceLoader {
    base: Url,
    fetcher: Arc<dyn Fetcher>,
    host: Arc<dyn ScriptHost>,
}

impl ResourceLoader {
    pub fn new(base: Url, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            base,
            fetcher,
            host: Arc::new(PublishingHost),
        }
    }

    /// Loader over HTTP(S) and `file` URLs with the given request timeout.
    pub fn with_timeout(base: Url, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self::new(base, Arc::new(SchemeFetcher::new(timeout)?)))
    }

    pub fn with_host(mut self, host: Arc<dyn ScriptHost>) -> Self {
        self.host = host;
        self
    }

    #[must_use]
    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Resolve `id` against the base URL.
    ///
    /// Full URLs are kept, `//host/path` inherits the base scheme, and
    /// `/path` inherits the base origin.
    pub fn resolve(&self, id: &ResourceId) -> Result<Url, LoadError> {
        self.base
            .join(id.as_str())
            .map_err(|e| LoadError::Resolve {
                id: id.clone(),
                reason: e.to_string(),
            })
    }

    /// Whether `id` has been loaded successfully into `context`.
    #[must_use]
    pub fn is_loaded(&self, id: &ResourceId, context: &Context) -> bool {
        let Some(slots) = context.get::<LoadSlots>(&self.slots_key()) else {
            return false;
        };
        let slot = slots.lock().get(id).cloned();
        slot.is_some_and(|slot| slot.get().is_some_and(Result::is_ok))
    }

    /// Context key of this loader's load slots.
    fn slots_key(&self) -> String {
        format!("loader:{}", self.base)
    }

    fn slot(&self, id: &ResourceId, context: &Context) -> LoadSlot {
        let key = self.slots_key();
        let slots = context
            .get_or_publish_with(&key, LoadSlots::default)
            .unwrap_or_else(|| {
                tracing::warn!("Context key {key} is taken by another artifact; loads are not shared");
                Arc::new(LoadSlots::default())
            });
        slots.lock().entry(id.clone()).or_default().clone()
    }

    async fn load_once(&self, id: &ResourceId, context: &Context) -> Result<(), LoadError> {
        let url = self.resolve(id)?;
        tracing::debug!(resource = %id, url = %url, "Fetching resource");

        let bytes = self.fetcher.fetch(&url).await.map_err(|e| match e {
            FetchError::Status { status } => LoadError::Status {
                id: id.clone(),
                status,
            },
            FetchError::UnsupportedScheme { scheme } => LoadError::UnsupportedScheme {
                id: id.clone(),
                scheme,
            },
            FetchError::Transport { reason } => LoadError::Fetch {
                id: id.clone(),
                reason,
            },
        })?;

        let source = String::from_utf8(bytes).map_err(|_| LoadError::Decode { id: id.clone() })?;
        let script = LoadedScript {
            id: id.clone(),
            url,
            source,
        };
        self.host
            .execute(script, context)
            .map_err(|e| LoadError::Execute {
                id: id.clone(),
                reason: e.reason,
            })?;

        tracing::info!(resource = %id, "Loaded resource");
        Ok(())
    }
}

impl ResourceLoad for ResourceLoader {
    fn load<'a>(&'a self, id: &'a ResourceId, context: &'a Context) -> LoadFut<'a> {
        Box::pin(async move {
            let slot = self.slot(id, context);
            slot.get_or_init(|| self.load_once(id, context))
                .await
                .clone()
        })
    }
}

impl fmt::Debug for ResourceLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceLoader")
            .field("base", &self.base.as_str())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use stepchain_sequencer::{ChainEnv, ChainOutcome, Task};
    use stepchain_types::{ErrorLog, ReportSink};
    use tokio::time::{Instant, sleep};

    use super::*;
    use crate::fetch::FetchFut;
    use crate::load;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Event {
        Begin(String),
        End(String),
    }

    /// In-memory fetcher: path → (delay, body or status).
    #[derive(Default)]
    struct FakeFetcher {
        routes: HashMap<String, (u64, Result<&'static str, u16>)>,
        events: Mutex<Vec<Event>>,
        calls: Mutex<HashMap<String, usize>>,
    }

    impl FakeFetcher {
        fn route(mut self, path: &str, delay_ms: u64, body: Result<&'static str, u16>) -> Self {
            self.routes.insert(path.to_string(), (delay_ms, body));
            self
        }

        fn events(&self) -> Vec<Event> {
            self.events.lock().unwrap().clone()
        }

        fn calls(&self, path: &str) -> usize {
            self.calls.lock().unwrap().get(path).copied().unwrap_or(0)
        }

        fn position(&self, event: &Event) -> usize {
            self.events().iter().position(|e| e == event).unwrap()
        }
    }

    impl Fetcher for FakeFetcher {
        fn fetch<'a>(&'a self, url: &'a Url) -> FetchFut<'a> {
            Box::pin(async move {
                let path = url.path().to_string();
                *self.calls.lock().unwrap().entry(path.clone()).or_default() += 1;
                self.events.lock().unwrap().push(Event::Begin(path.clone()));
                let (delay, body) = self.routes.get(&path).cloned().unwrap_or((0, Err(404)));
                sleep(Duration::from_millis(delay)).await;
                self.events.lock().unwrap().push(Event::End(path));
                body.map(|b| b.as_bytes().to_vec())
                    .map_err(|status| FetchError::Status { status })
            })
        }
    }

    fn id(s: &str) -> ResourceId {
        ResourceId::new(s).unwrap()
    }

    fn setup(fetcher: FakeFetcher) -> (Arc<FakeFetcher>, Arc<ResourceLoader>, ChainEnv, Arc<ErrorLog>) {
        let fetcher = Arc::new(fetcher);
        let base = Url::parse("http://pool.example:8010/ui/").unwrap();
        let loader = Arc::new(ResourceLoader::new(base, fetcher.clone()));
        let log = Arc::new(ErrorLog::new());
        let sink: Arc<dyn ReportSink> = log.clone();
        let env = ChainEnv::new(sink).with_loader(loader.clone());
        (fetcher, loader, env, log)
    }

    #[test]
    fn resolve_handles_relative_forms() {
        let (_, loader, _, _) = setup(FakeFetcher::default());

        let cdn = loader.resolve(&id("//cdn.example/jquery.min.js")).unwrap();
        assert_eq!(cdn.as_str(), "http://cdn.example/jquery.min.js");

        let rooted = loader.resolve(&id("/ui/js/models.js")).unwrap();
        assert_eq!(rooted.as_str(), "http://pool.example:8010/ui/js/models.js");

        let relative = loader.resolve(&id("js/views-header.js")).unwrap();
        assert_eq!(relative.as_str(), "http://pool.example:8010/ui/js/views-header.js");

        let full = loader.resolve(&id("https://other.example/x.js")).unwrap();
        assert_eq!(full.as_str(), "https://other.example/x.js");
    }

    #[tokio::test(start_paused = true)]
    async fn next_batch_starts_after_previous_batch_loaded() {
        let fetcher = FakeFetcher::default()
            .route("/a.js", 10, Ok("var a;"))
            .route("/b.js", 3, Ok("var b;"))
            .route("/c.js", 1, Ok("var c;"));
        let (fetcher, _, env, _) = setup(fetcher);

        let outcome = load([id("/a.js"), id("/b.js")])
            .then_load([id("/c.js")])
            .execute(&env)
            .await;
        assert!(outcome.is_completed());

        let begin_c = fetcher.position(&Event::Begin("/c.js".into()));
        assert!(fetcher.position(&Event::End("/a.js".into())) < begin_c);
        assert!(fetcher.position(&Event::End("/b.js".into())) < begin_c);
        // A and B were in flight together.
        let end_a = fetcher.position(&Event::End("/a.js".into()));
        assert!(fetcher.position(&Event::Begin("/b.js".into())) < end_a);
    }

    #[tokio::test]
    async fn loaded_scripts_are_published() {
        let fetcher = FakeFetcher::default().route("/ui/js/models.js", 0, Ok("var Devices;"));
        let (_, loader, env, _) = setup(fetcher);
        let models = id("/ui/js/models.js");

        let outcome = load([models.clone()]).execute(&env).await;
        assert!(outcome.is_completed());
        assert!(loader.is_loaded(&models, env.context()));

        let script = env
            .context()
            .get::<LoadedScript>(&LoadedScript::key(&models))
            .unwrap();
        assert_eq!(script.source, "var Devices;");
        assert_eq!(script.url.as_str(), "http://pool.example:8010/ui/js/models.js");
    }

    #[tokio::test(start_paused = true)]
    async fn same_id_is_fetched_once() {
        let fetcher = FakeFetcher::default().route("/shared.js", 5, Ok("var shared;"));
        let (fetcher, _, env, _) = setup(fetcher);

        let outcome = load([id("/shared.js"), id("/shared.js")])
            .then_load([id("/shared.js")])
            .execute(&env)
            .await;

        assert_eq!(outcome, ChainOutcome::Completed { steps: 2 });
        assert_eq!(fetcher.calls("/shared.js"), 1);
    }

    #[tokio::test]
    async fn each_run_publishes_into_its_own_context() {
        let fetcher = FakeFetcher::default().route("/x.js", 0, Ok("var x;"));
        let (fetcher, loader, first, _) = setup(fetcher);
        let x = id("/x.js");

        let second = ChainEnv::new(Arc::new(ErrorLog::new())).with_loader(loader.clone());
        for env in [&first, &second] {
            let outcome = load([x.clone()]).execute(env).await;
            assert_eq!(outcome, ChainOutcome::Completed { steps: 1 });
            assert!(
                env.context()
                    .get::<LoadedScript>(&LoadedScript::key(&x))
                    .is_some()
            );
            assert!(loader.is_loaded(&x, env.context()));
        }
        assert_eq!(fetcher.calls("/x.js"), 2);
    }

    #[tokio::test]
    async fn failure_is_not_cached_across_runs() {
        /// Fails the first request, serves every later one.
        #[derive(Default)]
        struct Flaky {
            calls: Mutex<usize>,
        }
        impl Fetcher for Flaky {
            fn fetch<'a>(&'a self, _url: &'a Url) -> FetchFut<'a> {
                let mut calls = self.calls.lock().unwrap();
                *calls += 1;
                let result = if *calls == 1 {
                    Err(FetchError::Status { status: 503 })
                } else {
                    Ok(b"var retried;".to_vec())
                };
                Box::pin(async move { result })
            }
        }

        let base = Url::parse("http://pool.example/").unwrap();
        let loader = Arc::new(ResourceLoader::new(base, Arc::new(Flaky::default())));
        let env = || ChainEnv::new(Arc::new(ErrorLog::new())).with_loader(loader.clone());

        let failed = load([id("/r.js")]).execute(&env()).await;
        assert!(!failed.is_completed());

        let retry = env();
        let outcome = load([id("/r.js")]).execute(&retry).await;
        assert!(outcome.is_completed());
        assert!(loader.is_loaded(&id("/r.js"), retry.context()));
    }

    #[tokio::test]
    async fn failed_load_stalls_before_next_batch() {
        let fetcher = FakeFetcher::default()
            .route("/ok.js", 0, Ok("var ok;"))
            .route("/next.js", 0, Ok("var next;"));
        let (fetcher, loader, env, log) = setup(fetcher);
        let ran = Arc::new(Mutex::new(false));
        let flag = ran.clone();

        let outcome = load([id("/ok.js"), id("/missing.js")])
            .then_load([id("/next.js")])
            .then_run([Task::new("after", move |_env, done| {
                *flag.lock().unwrap() = true;
                done.complete();
            })])
            .execute(&env)
            .await;

        assert_eq!(
            outcome,
            ChainOutcome::Stalled {
                step: 0,
                abandoned: vec!["/missing.js".to_string()],
            }
        );
        assert_eq!(fetcher.calls("/next.js"), 0);
        assert!(!*ran.lock().unwrap());
        assert!(loader.is_loaded(&id("/ok.js"), env.context()));
        assert!(!loader.is_loaded(&id("/missing.js"), env.context()));
        assert_eq!(
            log.messages(),
            vec!["Failed to load /missing.js: fetching /missing.js returned HTTP 404"]
        );
    }

    #[tokio::test]
    async fn invalid_utf8_is_decode_error() {
        struct Binary;
        impl Fetcher for Binary {
            fn fetch<'a>(&'a self, _url: &'a Url) -> FetchFut<'a> {
                Box::pin(async { Ok(vec![0xff, 0xfe, 0x00]) })
            }
        }

        let base = Url::parse("http://pool.example/").unwrap();
        let loader = ResourceLoader::new(base, Arc::new(Binary));
        let err = loader
            .load(&id("/blob.js"), &Context::new())
            .await
            .unwrap_err();
        assert_eq!(err, LoadError::Decode { id: id("/blob.js") });
    }

    #[tokio::test(start_paused = true)]
    async fn batches_do_not_overlap_in_time() {
        let fetcher = FakeFetcher::default()
            .route("/one.js", 7, Ok("1"))
            .route("/two.js", 2, Ok("2"));
        let (_, _, env, _) = setup(fetcher);
        let started = Instant::now();
        let at = Arc::new(Mutex::new(None));
        let stamp = at.clone();

        load([id("/one.js")])
            .then_load([id("/two.js")])
            .then_run([Task::new("finish", move |_env, done| {
                *stamp.lock().unwrap() = Some(Instant::now());
                done.complete();
            })])
            .execute(&env)
            .await;

        let elapsed = at.lock().unwrap().unwrap() - started;
        assert!(elapsed >= Duration::from_millis(9));
    }
}

use crate::mixer::Mixer;
use moka::future::Cache;
use std::future::Future;
use std::sync::Arc;
use veil_core::ProxyError;

/// Default capacity of the mixer cache. Mixers embed two full Swagger
/// documents plus bootstrap metadata, so the cache stays small and evicts
/// least-recently-used entries beyond this bound.
pub const DEFAULT_CAPACITY: u64 = 32;

/// Bounded cache of built mixers, keyed by user id.
///
/// Concurrent misses for the same key coalesce into a single construction:
/// `moka`'s `try_get_with` runs one init future and hands its output to every
/// waiter, so a cold user triggers exactly one upstream `/users` paging walk.
#[derive(Clone)]
pub struct MixerCache {
    inner: Cache<i64, Arc<Mixer>>,
}

impl MixerCache {
    pub fn new(capacity: u64) -> Self {
        Self {
            inner: Cache::new(capacity),
        }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }

    /// Fetch the mixer for `user_id`, invoking `build` on a miss.
    pub async fn get_or_build<F>(&self, user_id: i64, build: F) -> Result<Arc<Mixer>, ProxyError>
    where
        F: Future<Output = Result<Arc<Mixer>, ProxyError>>,
    {
        self.inner
            .try_get_with(user_id, build)
            .await
            .map_err(unshare)
    }

    /// Number of cached mixers (approximate, for diagnostics).
    pub fn len(&self) -> u64 {
        self.inner.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop a cached mixer, forcing a rebuild on next use.
    pub async fn invalidate(&self, user_id: i64) {
        self.inner.invalidate(&user_id).await;
    }
}

/// A failed single-flight build hands every waiter the same `Arc`'d error.
/// Recover the owned error when we are the only holder; otherwise rebuild the
/// variants whose status code matters downstream.
fn unshare(err: Arc<ProxyError>) -> ProxyError {
    match Arc::try_unwrap(err) {
        Ok(owned) => owned,
        Err(shared) => match &*shared {
            ProxyError::UserNotInUpstream(email) => {
                ProxyError::UserNotInUpstream(email.clone())
            }
            ProxyError::UserNotFound(id) => ProxyError::UserNotFound(*id),
            ProxyError::OutOfSynonyms(token) => ProxyError::OutOfSynonyms(token.clone()),
            ProxyError::Upstream(msg) => ProxyError::Upstream(msg.clone()),
            other => ProxyError::Internal(other.to_string()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mixer::{MixerMeta, MixerOptions};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use veil_core::SwaggerDoc;
    use veil_core::user::{UpstreamUser, UserRecord};

    fn build_mixer(seed: i64) -> Arc<Mixer> {
        let swagger = SwaggerDoc::from_value(json!({
            "swagger": "2.0",
            "host": "api.hubstaff.com",
            "paths": {"/v1/users": {"get": {"parameters": []}}},
        }))
        .unwrap();
        let meta = MixerMeta {
            user: UserRecord {
                id: seed,
                email: "a@b".into(),
                password_hash: String::new(),
                app_token: "app".into(),
                auth_token: "auth".into(),
                created_at: None,
            },
            user_data: UpstreamUser {
                id: seed,
                email: "a@b".into(),
                organizations: vec![],
                projects: vec![],
            },
        };
        Arc::new(
            Mixer::build(swagger, seed, meta, &MixerOptions::default(), vec![], vec![]).unwrap(),
        )
    }

    #[tokio::test]
    async fn second_get_hits_the_cache() {
        let cache = MixerCache::with_default_capacity();
        let builds = AtomicUsize::new(0);

        for _ in 0..2 {
            let mixer = cache
                .get_or_build(1, async {
                    builds.fetch_add(1, Ordering::SeqCst);
                    Ok(build_mixer(1))
                })
                .await
                .unwrap();
            assert_eq!(mixer.seed(), 1);
        }
        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_misses_coalesce_into_one_build() {
        let cache = MixerCache::with_default_capacity();
        let builds = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                let builds = Arc::clone(&builds);
                tokio::spawn(async move {
                    cache
                        .get_or_build(1, async move {
                            builds.fetch_add(1, Ordering::SeqCst);
                            // Give the other tasks time to pile onto the same key.
                            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                            Ok(build_mixer(1))
                        })
                        .await
                })
            })
            .collect();

        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap().seed(), 1);
        }
        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_build_is_not_cached() {
        let cache = MixerCache::with_default_capacity();

        let err = cache
            .get_or_build(2, async { Err(ProxyError::UserNotInUpstream("a@b".into())) })
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::UserNotInUpstream(_)));

        // The failure must not poison the key.
        let mixer = cache
            .get_or_build(2, async { Ok(build_mixer(2)) })
            .await
            .unwrap();
        assert_eq!(mixer.seed(), 2);
    }

    #[tokio::test]
    async fn distinct_users_get_distinct_mixers() {
        let cache = MixerCache::with_default_capacity();
        let a = cache.get_or_build(1, async { Ok(build_mixer(1)) }).await.unwrap();
        let b = cache.get_or_build(2, async { Ok(build_mixer(2)) }).await.unwrap();
        assert_ne!(a.seed(), b.seed());
    }
}

//! Configuration cache and request translation benchmarks

use std::collections::HashMap;
use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use criterion::{BenchmarkId, Criterion, criterion_group};
use tokio::runtime::Runtime;

use crate::cache::{
    CacheKey, CachedConfig, ConfigCacheConfig, ConfigurationCache, InMemoryConfigCache, Refresh,
};
use crate::error::AuthorizerError;
use crate::manager::{BackendAuth, BackendParams, BackendRequest, BackendTransaction};
use crate::services::system::ProxyConfig;

struct StaticRefresh(ProxyConfig);

#[async_trait]
impl Refresh for StaticRefresh {
    async fn refresh(&self) -> Result<ProxyConfig, AuthorizerError> {
        Ok(self.0.clone())
    }
}

fn entry(version: i64) -> CachedConfig {
    let config = ProxyConfig {
        version,
        ..Default::default()
    };
    CachedConfig::new(config.clone(), Arc::new(StaticRefresh(config)))
}

fn cache_with(max_size: usize, prefill: usize, rt: &Runtime) -> Arc<InMemoryConfigCache> {
    let cache = Arc::new(InMemoryConfigCache::new(ConfigCacheConfig {
        max_size,
        num_retry_failed_refresh: 0,
        refresh_interval: Duration::from_secs(60),
        ttl: Duration::from_secs(300),
    }));
    rt.block_on(async {
        for i in 0..prefill {
            cache
                .set(CacheKey::new("https://cp.example.com", i.to_string()), entry(1))
                .await;
        }
    });
    cache
}

fn bench_cache_operations(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let cache = cache_with(1000, 100, &rt);

    c.bench_function("config_cache_hit", |b| {
        let mut counter = 0usize;
        b.to_async(&rt).iter(|| {
            counter += 1;
            let key = CacheKey::new("https://cp.example.com", (counter % 100).to_string());
            let cache = cache.clone();
            async move { black_box(cache.get(&key).await) }
        })
    });

    c.bench_function("config_cache_miss", |b| {
        b.to_async(&rt).iter(|| {
            let key = CacheKey::new("https://other.example.com", "404");
            let cache = cache.clone();
            async move { black_box(cache.get(&key).await) }
        })
    });

    c.bench_function("config_cache_set", |b| {
        let mut counter = 0usize;
        b.to_async(&rt).iter(|| {
            counter += 1;
            let key = CacheKey::new("https://cp.example.com", (counter % 100).to_string());
            let cache = cache.clone();
            async move { cache.set(key, entry(2)).await }
        })
    });
}

fn bench_concurrent_reads(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let cache = cache_with(1000, 100, &rt);

    for concurrency in [1, 10, 50] {
        c.bench_with_input(
            BenchmarkId::new("config_cache_concurrent_get", concurrency),
            &concurrency,
            |b, &concurrency| {
                b.to_async(&rt).iter(|| async {
                    let handles: Vec<_> = (0..concurrency)
                        .map(|i| {
                            let cache = cache.clone();
                            tokio::spawn(async move {
                                let key =
                                    CacheKey::new("https://cp.example.com", (i % 100).to_string());
                                cache.get(&key).await
                            })
                        })
                        .collect();
                    for handle in handles {
                        black_box(handle.await.unwrap());
                    }
                })
            },
        );
    }
}

fn bench_eviction(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    for max_size in [100, 1000] {
        let cache = cache_with(max_size, max_size, &rt);
        c.bench_with_input(
            BenchmarkId::new("config_cache_set_at_capacity", max_size),
            &max_size,
            |b, _| {
                let mut counter = 0usize;
                b.to_async(&rt).iter(|| {
                    counter += 1;
                    let key = CacheKey::new("https://evict.example.com", counter.to_string());
                    let cache = cache.clone();
                    async move { cache.set(key, entry(1)).await }
                })
            },
        );
    }
}

fn bench_request_translation(c: &mut Criterion) {
    let request = BackendRequest {
        auth: BackendAuth {
            auth_type: "service_token".to_string(),
            value: "token".to_string(),
        },
        service: "42".to_string(),
        transactions: vec![BackendTransaction {
            metrics: HashMap::from([("hits".to_string(), 1), ("bytes".to_string(), 2048)]),
            params: BackendParams {
                app_id: "app".to_string(),
                app_key: "key".to_string(),
                ..Default::default()
            },
        }],
    };

    c.bench_function("backend_request_translation", |b| {
        b.iter(|| black_box(request.to_api_request()))
    });
}

criterion_group!(
    benches,
    bench_cache_operations,
    bench_concurrent_reads,
    bench_eviction,
    bench_request_translation
);

//! Picks the in-memory or Redis-backed implementation of each pipeline
//! component based on `Settings::redis_url`. In-memory backends only
//! make sense within one long-lived process (e.g. one `discover`/
//! `analyze` run); a real cluster deployment needs `redis_url` set.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use reposcan_core::cache::{MemoryCache, ProcessedCache};
use reposcan_core::config::Settings;
use reposcan_core::model::{AnalysisJob, DiscoveryJob};
use reposcan_core::queue::{MemoryQueue, WorkQueue};
use reposcan_core::semaphore::{MemorySemaphore, PipelineSemaphore};

#[cfg(feature = "redis-backend")]
use reposcan_core::{cache::RedisCache, queue::RedisQueue, semaphore::RedisSemaphore};

pub fn build_discovery_queue(settings: &Settings) -> Result<Arc<dyn WorkQueue<DiscoveryJob>>> {
    match &settings.redis_url {
        Some(url) => build_redis_queue(url, "reposcan:discovery"),
        None => Ok(Arc::new(MemoryQueue::<DiscoveryJob>::new())),
    }
}

pub fn build_analysis_queue(settings: &Settings) -> Result<Arc<dyn WorkQueue<AnalysisJob>>> {
    match &settings.redis_url {
        Some(url) => build_redis_queue(url, "reposcan:analysis"),
        None => Ok(Arc::new(MemoryQueue::<AnalysisJob>::new())),
    }
}

#[cfg(feature = "redis-backend")]
fn build_redis_queue<T>(url: &str, name: &str) -> Result<Arc<dyn WorkQueue<T>>>
where
    T: serde::Serialize + serde::de::DeserializeOwned + Send + Sync + 'static,
{
    let client = redis::Client::open(url).context("opening redis connection for queue")?;
    Ok(Arc::new(RedisQueue::<T>::new(client, name)))
}

#[cfg(not(feature = "redis-backend"))]
fn build_redis_queue<T>(_url: &str, _name: &str) -> Result<Arc<dyn WorkQueue<T>>>
where
    T: serde::Serialize + serde::de::DeserializeOwned + Send + Sync + 'static,
{
    bail!("redis_url is set but this binary was built without the `redis-backend` feature")
}

pub fn build_semaphore(settings: &Settings) -> Result<Arc<dyn PipelineSemaphore>> {
    match &settings.redis_url {
        Some(url) => build_redis_semaphore(url),
        None => Ok(Arc::new(MemorySemaphore::new())),
    }
}

#[cfg(feature = "redis-backend")]
fn build_redis_semaphore(url: &str) -> Result<Arc<dyn PipelineSemaphore>> {
    let client = redis::Client::open(url).context("opening redis connection for semaphore")?;
    Ok(Arc::new(RedisSemaphore::new(client)))
}

#[cfg(not(feature = "redis-backend"))]
fn build_redis_semaphore(_url: &str) -> Result<Arc<dyn PipelineSemaphore>> {
    bail!("redis_url is set but this binary was built without the `redis-backend` feature")
}

pub fn build_cache(settings: &Settings) -> Result<Arc<dyn ProcessedCache>> {
    match &settings.redis_url {
        Some(url) => build_redis_cache(url),
        None => Ok(Arc::new(MemoryCache::new())),
    }
}

#[cfg(feature = "redis-backend")]
fn build_redis_cache(url: &str) -> Result<Arc<dyn ProcessedCache>> {
    let client = redis::Client::open(url).context("opening redis connection for cache")?;
    Ok(Arc::new(RedisCache::new(client)))
}

#[cfg(not(feature = "redis-backend"))]
fn build_redis_cache(_url: &str) -> Result<Arc<dyn ProcessedCache>> {
    bail!("redis_url is set but this binary was built without the `redis-backend` feature")
}

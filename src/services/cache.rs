//! # 점수 캐시(Score Cache)
//!
//! 사용자 통계, 리더보드 페이지, 완료된 작업 상태처럼 읽기가 많은 집계 데이터를
//! 메모리에 잠시 보관합니다. 캐시는 최적화일 뿐 진실의 원천(source of truth)이 아닙니다.
//!
//! ## 규칙
//! - `get`: 만료 시각이 지난 항목은 미스(miss)로 처리하고 그 자리에서 제거합니다.
//!   조회에 성공하면 최근 사용 순서가 갱신되지만 만료 시각은 늘어나지 않습니다.
//! - `put`: 용량이 꽉 차면 가장 오래 사용되지 않은(LRU) 항목 하나를 내보냅니다.
//!   "가장 먼저 넣은" 항목이 아니라 `get`/`put`으로 가장 오래 건드리지 않은 항목입니다.
//! - `invalidate_prefix`: 접두사로 시작하는 모든 키를 지웁니다.
//! - `sweep_expired`: 만료 후 유예 시간까지 지난 항목을 백그라운드에서 정리합니다.
//! - 잠금(lock)이 오염(poison)되는 등 내부 문제가 생기면 에러 대신 미스를 돌려줍니다.
//!   호출자는 언제나 DB에서 다시 계산할 수 있어야 합니다.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::clock::Clock;
use crate::config::CacheConfig;
use crate::models::{
    JobView, LeaderboardEntryView, LeaderboardPeriod, LeaderboardSlice, UserProgress,
};

/// 청소 주기의 하한. `tokio::time::interval`은 0을 받지 않습니다.
pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

struct Slot<V> {
    value: V,
    expires_at: DateTime<Utc>,
    /// 마지막으로 건드린 순번. `recency`의 키와 같습니다.
    touched: u64,
}

struct Inner<V> {
    entries: HashMap<String, Slot<V>>,
    /// 무효화가 일어날 때마다 1씩 증가합니다.
    generation: u64,
    /// 순번 → 키. 첫 항목이 가장 오래 사용되지 않은 항목입니다.
    recency: BTreeMap<u64, String>,
    next_tick: u64,
}

impl<V> Inner<V> {
    fn tick(&mut self) -> u64 {
        self.next_tick += 1;
        self.next_tick
    }

    fn remove(&mut self, key: &str) -> bool {
        match self.entries.remove(key) {
            Some(slot) => {
                self.recency.remove(&slot.touched);
                true
            }
            None => false,
        }
    }

    fn evict_lru(&mut self) -> Option<String> {
        let (_, key) = self.recency.pop_first()?;
        self.entries.remove(&key);
        Some(key)
    }
}

/// 용량 제한 + TTL + LRU 키/값 저장소
pub struct TtlCache<V> {
    inner: Mutex<Inner<V>>,
    capacity: usize,
    clock: Arc<dyn Clock>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(capacity: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                recency: BTreeMap::new(),
                generation: 0,
                next_tick: 0,
            }),
            capacity,
            clock,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now();
        let Ok(mut guard) = self.inner.lock() else {
            tracing::warn!(key, "cache lock poisoned, treating lookup as a miss");
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        };
        let inner = &mut *guard;

        let expired = match inner.entries.get(key) {
            Some(slot) => now >= slot.expires_at,
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };
        if expired {
            inner.remove(key);
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        let tick = inner.tick();
        let slot = inner.entries.get_mut(key)?;
        let previous = std::mem::replace(&mut slot.touched, tick);
        let value = slot.value.clone();
        inner.recency.remove(&previous);
        inner.recency.insert(tick, key.to_string());

        self.hits.fetch_add(1, Ordering::Relaxed);
        Some(value)
    }

    pub fn put(&self, key: &str, value: V, ttl: Duration) {
        self.put_inner(key, value, ttl, None);
    }

    /// `generation()`으로 받아 둔 세대 이후 무효화가 없었을 때만 저장합니다.
    ///
    /// DB를 읽는 동안 원장이 값을 바꾸고 캐시를 비웠다면,
    /// 방금 읽은 오래된 값을 다시 넣지 않기 위해 사용합니다.
    pub fn put_if_generation(&self, key: &str, value: V, ttl: Duration, generation: u64) -> bool {
        self.put_inner(key, value, ttl, Some(generation))
    }

    pub fn generation(&self) -> u64 {
        self.inner.lock().map(|inner| inner.generation).unwrap_or(u64::MAX)
    }

    fn put_inner(&self, key: &str, value: V, ttl: Duration, generation: Option<u64>) -> bool {
        if self.capacity == 0 {
            return false;
        }
        let now = self.clock.now();
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        let Ok(mut guard) = self.inner.lock() else {
            tracing::warn!(key, "cache lock poisoned, dropping write");
            return false;
        };
        let inner = &mut *guard;
        if generation.is_some_and(|seen| seen != inner.generation) {
            tracing::trace!(key, "cache write skipped, invalidated while loading");
            return false;
        }
        let tick = inner.tick();

        if let Some(slot) = inner.entries.get_mut(key) {
            let previous = std::mem::replace(&mut slot.touched, tick);
            slot.value = value;
            slot.expires_at = expires_at;
            inner.recency.remove(&previous);
            inner.recency.insert(tick, key.to_string());
            return true;
        }

        while inner.entries.len() >= self.capacity {
            match inner.evict_lru() {
                Some(evicted) => tracing::trace!(key = %evicted, "cache evicted LRU entry"),
                None => break,
            }
        }

        inner.entries.insert(
            key.to_string(),
            Slot {
                value,
                expires_at,
                touched: tick,
            },
        );
        inner.recency.insert(tick, key.to_string());
        true
    }

    pub fn remove(&self, key: &str) -> bool {
        match self.inner.lock() {
            Ok(mut inner) => inner.remove(key),
            Err(_) => false,
        }
    }

    /// 접두사로 시작하는 모든 키를 지우고 지운 개수를 반환합니다.
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        let Ok(mut inner) = self.inner.lock() else {
            return 0;
        };
        inner.generation += 1;
        let doomed: Vec<String> = inner
            .entries
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect();
        for key in &doomed {
            inner.remove(key);
        }
        doomed.len()
    }

    /// 만료 시각 + `grace`가 지난 항목을 정리합니다.
    pub fn sweep_expired(&self, grace: Duration) -> usize {
        let now = self.clock.now();
        let grace = chrono::Duration::from_std(grace).unwrap_or(chrono::Duration::zero());
        let Ok(mut inner) = self.inner.lock() else {
            return 0;
        };
        let doomed: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, slot)| {
                slot.expires_at
                    .checked_add_signed(grace)
                    .is_some_and(|deadline| deadline <= now)
            })
            .map(|(key, _)| key.clone())
            .collect();
        for key in &doomed {
            inner.remove(key);
        }
        doomed.len()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|inner| inner.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

/// 캐시에 들어가는 값의 종류
#[derive(Debug, Clone)]
pub enum CachedValue {
    Progress(UserProgress),
    LeaderboardSlice(LeaderboardSlice),
    /// 리더보드에 없는 사용자도 "없음"을 캐시합니다.
    LeaderboardEntry(Option<LeaderboardEntryView>),
    Job(JobView),
}

const LEADERBOARD_PREFIX: &str = "leaderboard:";

fn user_prefix(user_id: &str) -> String {
    format!("user:{user_id}:")
}

fn progress_key(user_id: &str) -> String {
    format!("user:{user_id}:stats")
}

fn leaderboard_page_key(period: LeaderboardPeriod, page: u32, page_size: u32) -> String {
    format!("{LEADERBOARD_PREFIX}{period}:page:{page}:{page_size}")
}

fn leaderboard_entry_key(period: LeaderboardPeriod, user_id: &str) -> String {
    format!("{LEADERBOARD_PREFIX}{period}:user:{user_id}")
}

fn job_key(job_id: &str) -> String {
    format!("job:{job_id}")
}

/// 도메인 값별 키와 수명을 아는 캐시 파사드
///
/// 내부 저장소는 `Arc`로 공유되므로 clone해도 같은 캐시를 가리킵니다.
#[derive(Clone)]
pub struct ScoreCache {
    store: Arc<TtlCache<CachedValue>>,
    default_ttl: Duration,
    leaderboard_ttl: Duration,
}

impl ScoreCache {
    pub fn new(config: &CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            store: Arc::new(TtlCache::new(config.capacity, clock)),
            default_ttl: config.default_ttl,
            leaderboard_ttl: config.leaderboard_ttl,
        }
    }

    /// 적재 시작 전에 받아 두는 세대 토큰. `put_*` 호출에 그대로 넘깁니다.
    pub fn generation(&self) -> u64 {
        self.store.generation()
    }

    pub fn progress(&self, user_id: &str) -> Option<UserProgress> {
        match self.store.get(&progress_key(user_id))? {
            CachedValue::Progress(progress) => Some(progress),
            _ => self.evict_mismatch(&progress_key(user_id)),
        }
    }

    pub fn put_progress(&self, generation: u64, user_id: &str, progress: UserProgress) {
        self.store.put_if_generation(
            &progress_key(user_id),
            CachedValue::Progress(progress),
            self.default_ttl,
            generation,
        );
    }

    pub fn leaderboard_slice(
        &self,
        period: LeaderboardPeriod,
        page: u32,
        page_size: u32,
    ) -> Option<LeaderboardSlice> {
        let key = leaderboard_page_key(period, page, page_size);
        match self.store.get(&key)? {
            CachedValue::LeaderboardSlice(slice) => Some(slice),
            _ => self.evict_mismatch(&key),
        }
    }

    pub fn put_leaderboard_slice(
        &self,
        generation: u64,
        period: LeaderboardPeriod,
        page: u32,
        page_size: u32,
        slice: LeaderboardSlice,
    ) {
        self.store.put_if_generation(
            &leaderboard_page_key(period, page, page_size),
            CachedValue::LeaderboardSlice(slice),
            self.leaderboard_ttl,
            generation,
        );
    }

    /// 바깥 Option은 캐시 적중 여부, 안쪽 Option은 항목 존재 여부입니다.
    pub fn leaderboard_entry(
        &self,
        period: LeaderboardPeriod,
        user_id: &str,
    ) -> Option<Option<LeaderboardEntryView>> {
        let key = leaderboard_entry_key(period, user_id);
        match self.store.get(&key)? {
            CachedValue::LeaderboardEntry(entry) => Some(entry),
            _ => self.evict_mismatch(&key),
        }
    }

    pub fn put_leaderboard_entry(
        &self,
        generation: u64,
        period: LeaderboardPeriod,
        user_id: &str,
        entry: Option<LeaderboardEntryView>,
    ) {
        self.store.put_if_generation(
            &leaderboard_entry_key(period, user_id),
            CachedValue::LeaderboardEntry(entry),
            self.leaderboard_ttl,
            generation,
        );
    }

    pub fn job(&self, job_id: &str) -> Option<JobView> {
        match self.store.get(&job_key(job_id))? {
            CachedValue::Job(job) => Some(job),
            _ => self.evict_mismatch(&job_key(job_id)),
        }
    }

    /// 끝난(completed/failed) 작업만 캐시합니다.
    /// 진행 중인 상태를 캐시하면 폴링이 완료를 늦게 보게 됩니다.
    pub fn put_job(&self, job: &JobView) {
        if job.status.is_terminal() {
            self.store
                .put(&job_key(&job.id), CachedValue::Job(job.clone()), self.default_ttl);
        }
    }

    /// 사용자 통계가 바뀌었을 때 호출합니다.
    pub fn invalidate_user(&self, user_id: &str) -> usize {
        self.store.invalidate_prefix(&user_prefix(user_id))
    }

    /// 순위가 다시 계산되었을 때 모든 기간·페이지의 리더보드 항목을 지웁니다.
    pub fn invalidate_leaderboards(&self) -> usize {
        self.store.invalidate_prefix(LEADERBOARD_PREFIX)
    }

    pub fn sweep(&self, grace: Duration) -> usize {
        self.store.sweep_expired(grace)
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.store.hits()
    }

    pub fn misses(&self) -> u64 {
        self.store.misses()
    }

    /// 주기적으로 만료 항목을 정리하는 백그라운드 작업을 시작합니다.
    /// 유예 시간은 청소 주기와 같습니다.
    pub fn spawn_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let interval = interval.max(MIN_SWEEP_INTERVAL);
        let cache = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // 첫 tick은 즉시 완료되므로 건너뜁니다.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = cache.sweep(interval);
                if removed > 0 {
                    tracing::debug!(removed, remaining = cache.len(), "cache sweep");
                }
            }
        })
    }

    // 키 형식상 일어나면 안 되는 일이지만, 일어나면 미스로 처리합니다.
    fn evict_mismatch<T>(&self, key: &str) -> Option<T> {
        tracing::warn!(key, "cache entry had unexpected type, evicting");
        self.store.remove(key);
        None
    }
}

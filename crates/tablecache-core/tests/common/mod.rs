//! Common test utilities: an in-memory stand-in for the reviews service and
//! a store wrapper that can fail outbox writes on demand.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tablecache_core::cache::CachedData;
use tablecache_core::{
    Collection, DurableStore, MemoryStore, NewReview, RemoteEndpoint, RemoteError, Resource,
    Session, StoreError,
};
use tokio::sync::Notify;

pub const TIMEOUT: Duration = Duration::from_secs(2);

/// A call received by the fake service.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    ReadCollection(Resource),
    ReadById(Resource, u64),
    ReadByParent(Resource, u64),
    Write(Resource, Value),
    Update(Resource, u64, Vec<(String, String)>),
}

/// Blocks callers until released.
#[derive(Default)]
pub struct Gate {
    closed: AtomicBool,
    notify: Notify,
}

impl Gate {
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn open(&self) {
        self.closed.store(false, Ordering::SeqCst);
        self.notify.notify_waiters();
        self.notify.notify_one();
    }

    async fn pass(&self) {
        while self.closed.load(Ordering::SeqCst) {
            self.notify.notified().await;
        }
    }
}

/// Fake reviews service holding restaurants and reviews in memory.
#[derive(Default)]
pub struct FakeService {
    restaurants: Mutex<Vec<Value>>,
    reviews: Mutex<Vec<Value>>,
    offline: AtomicBool,
    failing_reads: AtomicBool,
    write_attempts: AtomicUsize,
    reject_writes: Mutex<Vec<usize>>,
    calls: Mutex<Vec<Call>>,
    pub read_gate: Gate,
    pub write_gate: Gate,
    hold_write: Mutex<Option<usize>>,
}

impl FakeService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_restaurants(restaurants: Vec<Value>) -> Arc<Self> {
        let service = Self::default();
        *service.restaurants.lock().unwrap() = restaurants;
        Arc::new(service)
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn set_restaurant(&self, restaurant: Value) {
        let mut restaurants = self.restaurants.lock().unwrap();
        let id = restaurant["id"].as_u64().unwrap();
        restaurants.retain(|r| r["id"].as_u64() != Some(id));
        restaurants.push(restaurant);
        restaurants.sort_by_key(|r| r["id"].as_u64());
    }

    /// Answer every read with a 500 while writes keep working.
    pub fn fail_reads(&self, failing: bool) {
        self.failing_reads.store(failing, Ordering::SeqCst);
    }

    fn check_read(&self) -> Result<(), RemoteError> {
        if self.failing_reads.load(Ordering::SeqCst) {
            return Err(RemoteError::from_status(500, "Internal Server Error"));
        }
        Ok(())
    }

    /// Reject the n-th write attempt (1-based) with a 500.
    pub fn reject_write(&self, attempt: usize) {
        self.reject_writes.lock().unwrap().push(attempt);
    }

    /// Make the n-th write attempt (1-based) wait on `write_gate`.
    pub fn hold_write(&self, attempt: usize) {
        self.write_gate.close();
        *self.hold_write.lock().unwrap() = Some(attempt);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn writes(&self) -> Vec<Value> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Write(_, payload) => Some(payload),
                _ => None,
            })
            .collect()
    }

    pub fn stored_reviews(&self) -> Vec<Value> {
        self.reviews.lock().unwrap().clone()
    }

    fn record(&self, call: Call) -> Result<(), RemoteError> {
        self.calls.lock().unwrap().push(call);
        if self.offline.load(Ordering::SeqCst) {
            return Err(RemoteError::Unreachable("connection refused".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteEndpoint for FakeService {
    async fn read_collection(&self, resource: Resource) -> Result<Value, RemoteError> {
        self.record(Call::ReadCollection(resource))?;
        self.check_read()?;
        match resource {
            Resource::Restaurants => Ok(Value::Array(self.restaurants.lock().unwrap().clone())),
            Resource::Reviews => Ok(Value::Array(self.stored_reviews())),
        }
    }

    async fn read_by_id(&self, resource: Resource, id: u64) -> Result<Value, RemoteError> {
        self.record(Call::ReadById(resource, id))?;
        self.check_read()?;
        self.read_gate.pass().await;
        let items = match resource {
            Resource::Restaurants => self.restaurants.lock().unwrap().clone(),
            Resource::Reviews => self.stored_reviews(),
        };
        items
            .into_iter()
            .find(|item| item["id"].as_u64() == Some(id))
            .ok_or_else(|| RemoteError::from_status(404, "Not Found"))
    }

    async fn read_by_parent(&self, resource: Resource, parent_id: u64) -> Result<Value, RemoteError> {
        self.record(Call::ReadByParent(resource, parent_id))?;
        self.check_read()?;
        let reviews: Vec<Value> = self
            .stored_reviews()
            .into_iter()
            .filter(|r| r["restaurant_id"].as_u64() == Some(parent_id))
            .collect();
        Ok(Value::Array(reviews))
    }

    async fn write(&self, resource: Resource, payload: &Value) -> Result<Value, RemoteError> {
        self.record(Call::Write(resource, payload.clone()))?;
        let attempt = self.write_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let held = *self.hold_write.lock().unwrap() == Some(attempt);
        if held {
            self.write_gate.pass().await;
        }
        let rejected = self.reject_writes.lock().unwrap().contains(&attempt);
        if rejected {
            return Err(RemoteError::from_status(500, "Internal Server Error"));
        }

        let mut reviews = self.reviews.lock().unwrap();
        let mut review = payload.clone();
        review["id"] = json!(reviews.len() as u64 + 1);
        reviews.push(review.clone());
        Ok(review)
    }

    async fn update(
        &self,
        resource: Resource,
        id: u64,
        params: &[(&str, String)],
    ) -> Result<Value, RemoteError> {
        let params: Vec<(String, String)> = params
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        self.record(Call::Update(resource, id, params.clone()))?;

        let mut restaurants = self.restaurants.lock().unwrap();
        let restaurant = restaurants
            .iter_mut()
            .find(|r| r["id"].as_u64() == Some(id))
            .ok_or_else(|| RemoteError::from_status(404, "Not Found"))?;
        for (key, value) in params {
            restaurant[key] = Value::String(value);
        }
        Ok(restaurant.clone())
    }
}

/// Store wrapper that fails outbox writes after a number of successes.
pub struct FlakyStore {
    inner: Arc<MemoryStore>,
    outbox_puts_left: Mutex<Option<usize>>,
}

impl FlakyStore {
    pub fn new(inner: Arc<MemoryStore>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            outbox_puts_left: Mutex::new(None),
        })
    }

    /// Allow `n` more outbox writes, then fail every later one.
    pub fn fail_outbox_after(&self, n: usize) {
        *self.outbox_puts_left.lock().unwrap() = Some(n);
    }
}

impl DurableStore for FlakyStore {
    fn get(&self, collection: Collection, key: &str) -> Result<Option<CachedData<Value>>, StoreError> {
        self.inner.get(collection, key)
    }

    fn put(&self, collection: Collection, key: &str, value: &Value) -> Result<(), StoreError> {
        if collection == Collection::PendingWrites {
            let mut left = self.outbox_puts_left.lock().unwrap();
            match left.as_mut() {
                Some(0) => {
                    return Err(StoreError::Io(std::io::Error::new(
                        std::io::ErrorKind::Other,
                        "disk full",
                    )))
                }
                Some(n) => *n -= 1,
                None => {}
            }
        }
        self.inner.put(collection, key, value)
    }
}

pub fn restaurant(id: u64, name: &str, cuisine: &str, neighborhood: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "cuisine_type": cuisine,
        "neighborhood": neighborhood,
        "is_favorite": false,
    })
}

pub fn new_review(restaurant_id: u64, name: &str) -> NewReview {
    NewReview {
        restaurant_id,
        name: name.to_string(),
        rating: 4,
        comments: format!("{} liked it", name),
    }
}

pub fn session(store: Arc<dyn DurableStore>, remote: Arc<FakeService>) -> Session {
    Session::new(store, remote, TIMEOUT)
}

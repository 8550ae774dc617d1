#![allow(dead_code)]

pub mod strategies;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use strata_core::repository::{
    Entity, RemoteClient, RemoteResponse, RequestDescriptor, RequestMethod, ResilientRemote,
};
use strata_core::resilience::{RetryConfig, RetryPolicy};
use strata_core::{Failure, Outcome};

pub const USERS_PATH: &str = "/users";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub status: String,
    #[serde(default)]
    pub revision: Option<u64>,
}

impl User {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            status: "active".to_string(),
            revision: None,
        }
    }

    pub fn with_status(mut self, status: &str) -> Self {
        self.status = status.to_string();
        self
    }

    pub fn at_revision(mut self, revision: u64) -> Self {
        self.revision = Some(revision);
        self
    }
}

impl Entity for User {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn entity_type() -> &'static str {
        "user"
    }

    fn revision(&self) -> Option<u64> {
        self.revision
    }
}

/// In-memory REST-ish server for `/users`.
///
/// Stored users get their revision bumped on every write. The server can be
/// taken offline or scripted to fail the next N calls with a given failure.
#[derive(Default)]
pub struct MockRemote {
    users: Mutex<BTreeMap<String, User>>,
    offline: AtomicBool,
    scripted: Mutex<VecDeque<Failure>>,
    rejected: Mutex<HashMap<String, Failure>>,
    rejected_methods: Mutex<Vec<(RequestMethod, Failure)>>,
    calls: AtomicUsize,
    requests: Mutex<Vec<RequestDescriptor>>,
    id_prefix: Mutex<Option<String>>,
    next_id: AtomicUsize,
}

impl MockRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_users(users: impl IntoIterator<Item = User>) -> Arc<Self> {
        let remote = Self::default();
        for user in users {
            remote.seed(user);
        }
        Arc::new(remote)
    }

    /// Store a user directly, as another client would have
    pub fn seed(&self, user: User) {
        self.users.lock().unwrap().insert(user.id.clone(), user);
    }

    /// Delete a user directly, as another client would have
    pub fn remove(&self, id: &str) {
        self.users.lock().unwrap().remove(id);
    }

    pub fn stored(&self, id: &str) -> Option<User> {
        self.users.lock().unwrap().get(id).cloned()
    }

    pub fn stored_count(&self) -> usize {
        self.users.lock().unwrap().len()
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn fail_next(&self, times: usize, failure: Failure) {
        let mut scripted = self.scripted.lock().unwrap();
        for _ in 0..times {
            scripted.push_back(failure.clone());
        }
    }

    /// Fail every request touching `id` until [`accept`](Self::accept) is called
    pub fn reject(&self, id: &str, failure: Failure) {
        self.rejected.lock().unwrap().insert(id.to_string(), failure);
    }

    pub fn accept(&self, id: &str) {
        self.rejected.lock().unwrap().remove(id);
    }

    /// Fail every request with `method` until [`accept_method`](Self::accept_method)
    pub fn reject_method(&self, method: RequestMethod, failure: Failure) {
        self.rejected_methods.lock().unwrap().push((method, failure));
    }

    pub fn accept_method(&self, method: RequestMethod) {
        self.rejected_methods
            .lock()
            .unwrap()
            .retain(|(rejected, _)| *rejected != method);
    }

    /// Ignore client ids on create and assign `{prefix}{n}` instead
    pub fn assign_ids(&self, prefix: &str) {
        *self.id_prefix.lock().unwrap() = Some(prefix.to_string());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn calls_with(&self, method: RequestMethod) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|request| request.method == method)
            .count()
    }

    pub fn requests(&self) -> Vec<RequestDescriptor> {
        self.requests.lock().unwrap().clone()
    }

    fn store(&self, mut user: User) -> User {
        let mut users = self.users.lock().unwrap();
        let previous = users.get(&user.id).and_then(|u| u.revision).unwrap_or(0);
        user.revision = Some(previous + 1);
        users.insert(user.id.clone(), user.clone());
        user
    }

    fn handle(&self, request: &RequestDescriptor) -> Outcome<RemoteResponse> {
        let id = request
            .path
            .strip_prefix(USERS_PATH)
            .and_then(|rest| rest.strip_prefix('/'))
            .filter(|rest| !rest.is_empty());

        match (request.method, id) {
            (RequestMethod::Get, Some(id)) => self
                .stored(id)
                .map(|user| RemoteResponse::ok(json!(user)))
                .ok_or_else(|| Failure::from_http_status(404, format!("user {id} not found"))),
            (RequestMethod::Get, None) => Ok(self.list(request)),
            (RequestMethod::Post, None) => {
                let mut user = decode(request)?;
                if let Some(prefix) = self.id_prefix.lock().unwrap().clone() {
                    let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
                    user.id = format!("{prefix}{n}");
                }
                if self.stored(&user.id).is_some() {
                    return Err(Failure::from_http_status(409, "user already exists"));
                }
                Ok(RemoteResponse::ok(json!(self.store(user))))
            }
            (RequestMethod::Put, Some(id)) => {
                if self.stored(id).is_none() {
                    return Err(Failure::from_http_status(404, format!("user {id} not found")));
                }
                Ok(RemoteResponse::ok(json!(self.store(decode(request)?))))
            }
            (RequestMethod::Delete, Some(id)) => match self.users.lock().unwrap().remove(id) {
                Some(_) => Ok(RemoteResponse::no_content()),
                None => Err(Failure::from_http_status(404, format!("user {id} not found"))),
            },
            _ => Err(Failure::from_http_status(400, "unsupported request")),
        }
    }

    fn list(&self, request: &RequestDescriptor) -> RemoteResponse {
        let page: usize = param(request, "page").unwrap_or(1);
        let page_size: usize = param(request, "page_size").unwrap_or(20);
        let status = request.query.get("status");

        let matching: Vec<User> = self
            .users
            .lock()
            .unwrap()
            .values()
            .filter(|user| status.map_or(true, |s| &user.status == s))
            .cloned()
            .collect();
        let items: Vec<User> = matching
            .iter()
            .skip((page - 1) * page_size)
            .take(page_size)
            .cloned()
            .collect();

        RemoteResponse::ok(json!({ "items": items, "total": matching.len() }))
    }
}

/// Entity id addressed by the path, or carried in the body
fn target_id(request: &RequestDescriptor) -> Option<String> {
    request
        .path
        .strip_prefix(USERS_PATH)
        .and_then(|rest| rest.strip_prefix('/'))
        .filter(|rest| !rest.is_empty())
        .map(str::to_string)
        .or_else(|| {
            request
                .body
                .as_ref()
                .and_then(|body| body.get("id"))
                .and_then(|id| id.as_str())
                .map(str::to_string)
        })
}

fn param(request: &RequestDescriptor, name: &str) -> Option<usize> {
    request.query.get(name).and_then(|v| v.parse().ok())
}

fn decode(request: &RequestDescriptor) -> Outcome<User> {
    let body = request
        .body
        .clone()
        .ok_or_else(|| Failure::from_http_status(400, "missing body"))?;
    serde_json::from_value(body).map_err(|e| Failure::from_http_status(422, e.to_string()))
}

#[async_trait]
impl RemoteClient for MockRemote {
    async fn invoke(&self, request: RequestDescriptor) -> Outcome<RemoteResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        if self.offline.load(Ordering::SeqCst) {
            return Err(Failure::network("connection refused"));
        }
        if let Some(failure) = self.scripted.lock().unwrap().pop_front() {
            return Err(failure);
        }
        let rejection = target_id(&request)
            .and_then(|id| self.rejected.lock().unwrap().get(&id).cloned())
            .or_else(|| {
                self.rejected_methods
                    .lock()
                    .unwrap()
                    .iter()
                    .find(|(method, _)| *method == request.method)
                    .map(|(_, failure)| failure.clone())
            });
        if let Some(failure) = rejection {
            return Err(failure);
        }
        self.handle(&request)
    }
}

/// Retry policy with short fixed delays for tests
pub fn test_retry(max_retries: u32) -> RetryPolicy {
    RetryPolicy::transient(RetryConfig {
        max_retries,
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(40),
        jitter_factor: 0.0,
    })
}

/// Remote without a breaker and without retries
pub fn plain_remote(client: Arc<MockRemote>) -> ResilientRemote {
    ResilientRemote::without_breaker(client, "users_api", test_retry(0))
}

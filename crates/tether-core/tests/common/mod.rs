use async_trait::async_trait;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use tether_config::ProviderSettings;
use tether_core::{ApiError, Attributes, Metadata, RemoteApi, RemoteObject, ResourceController};
use tether_retry::CallContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(dead_code)]
pub enum Op {
    Create,
    Read,
    Search,
    Update,
    Delete,
}

#[derive(Default)]
struct Inner {
    objects: BTreeMap<String, RemoteObject>,
    next_id: u32,
    inherited: Metadata,
    failures: VecDeque<(Op, ApiError)>,
    commit_then_fail: Option<ApiError>,
    calls: Vec<String>,
}

/// Remote API backed by a map, with knobs to simulate server behavior
#[derive(Default)]
pub struct InMemoryApi {
    inner: Mutex<Inner>,
}

#[allow(dead_code)]
impl InMemoryApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Metadata the server adds to every object it stores
    pub fn with_inherited(self, key: &str, value: &str) -> Self {
        self.inner
            .lock()
            .unwrap()
            .inherited
            .insert(key.to_string(), value.to_string());
        self
    }

    /// Make the next call of `op` fail with `err`
    pub fn fail_next(&self, op: Op, err: ApiError) {
        self.inner.lock().unwrap().failures.push_back((op, err));
    }

    /// Make the next create store the object but answer with `err`
    pub fn commit_then_fail(&self, err: ApiError) {
        self.inner.lock().unwrap().commit_then_fail = Some(err);
    }

    /// Move an object to a new primary reference, keeping its metadata
    pub fn rotate_ref(&self, from: &str, to: &str) {
        let mut inner = self.inner.lock().unwrap();
        let mut object = inner.objects.remove(from).expect("object to rotate");
        object.primary_ref = to.to_string();
        inner.objects.insert(to.to_string(), object);
    }

    /// Store an object as-is (out-of-band changes)
    pub fn insert(&self, object: RemoteObject) {
        self.inner
            .lock()
            .unwrap()
            .objects
            .insert(object.primary_ref.clone(), object);
    }

    pub fn remove(&self, primary_ref: &str) {
        self.inner.lock().unwrap().objects.remove(primary_ref);
    }

    pub fn get(&self, primary_ref: &str) -> Option<RemoteObject> {
        self.inner.lock().unwrap().objects.get(primary_ref).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().objects.len()
    }

    pub fn calls(&self) -> Vec<String> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn count_calls(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    fn begin(&self, op: Op, call: String) -> Result<(), ApiError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(call);
        match inner.failures.front() {
            Some((failing, _)) if *failing == op => {
                let (_, err) = inner.failures.pop_front().unwrap();
                Err(err)
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl RemoteApi for InMemoryApi {
    fn resource_type(&self) -> &str {
        "zone"
    }

    async fn create(
        &self,
        _ctx: &CallContext,
        metadata: &Metadata,
        fields: &Attributes,
    ) -> Result<RemoteObject, ApiError> {
        self.begin(Op::Create, "create".to_string())?;
        let mut inner = self.inner.lock().unwrap();
        inner.next_id += 1;
        let primary_ref = format!("ref/{}", inner.next_id);

        let mut stored = inner.inherited.clone();
        stored.extend(metadata.clone());
        let object = RemoteObject {
            primary_ref: primary_ref.clone(),
            metadata: stored,
            fields: fields.clone(),
        };
        inner.objects.insert(primary_ref, object.clone());

        match inner.commit_then_fail.take() {
            Some(err) => Err(err),
            None => Ok(object),
        }
    }

    async fn read(&self, _ctx: &CallContext, primary_ref: &str) -> Result<RemoteObject, ApiError> {
        self.begin(Op::Read, format!("read {}", primary_ref))?;
        self.get(primary_ref)
            .ok_or_else(|| ApiError::not_found(format!("zone {}", primary_ref)))
    }

    async fn search_by_tag(
        &self,
        _ctx: &CallContext,
        key: &str,
        value: &str,
    ) -> Result<Vec<RemoteObject>, ApiError> {
        self.begin(Op::Search, format!("search {}={}", key, value))?;
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .objects
            .values()
            .filter(|o| o.metadata.get(key).map(String::as_str) == Some(value))
            .cloned()
            .collect())
    }

    async fn update(
        &self,
        _ctx: &CallContext,
        primary_ref: &str,
        metadata: &Metadata,
        fields: &Attributes,
    ) -> Result<RemoteObject, ApiError> {
        self.begin(Op::Update, format!("update {}", primary_ref))?;
        let mut inner = self.inner.lock().unwrap();
        let object = inner
            .objects
            .get_mut(primary_ref)
            .ok_or_else(|| ApiError::not_found(format!("zone {}", primary_ref)))?;
        // full replacement: entries missing from the request are deleted
        object.metadata = metadata.clone();
        object.fields.extend(fields.clone());
        Ok(object.clone())
    }

    async fn delete(&self, _ctx: &CallContext, primary_ref: &str) -> Result<(), ApiError> {
        self.begin(Op::Delete, format!("delete {}", primary_ref))?;
        let mut inner = self.inner.lock().unwrap();
        inner
            .objects
            .remove(primary_ref)
            .map(|_| ())
            .ok_or_else(|| ApiError::not_found(format!("zone {}", primary_ref)))
    }
}

pub fn controller(api: Arc<InMemoryApi>) -> ResourceController<InMemoryApi> {
    ResourceController::new(api, Arc::new(ProviderSettings::default()))
}

pub fn md(entries: &[(&str, &str)]) -> Metadata {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

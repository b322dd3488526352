//! Request representation and the thread-local request state holder.
//!
//! A [WebRequest] carries the immutable parts of an incoming request (method, URI, headers,
//! parameters, locale) plus a shared attribute map living for the duration of the request. While
//! a request is dispatched, its [RequestAttributes] are bound to the current thread through
//! [RequestContextHolder]; the bind guard restores the previous binding on drop, so the holder
//! never leaks state past the dispatch, panics included.
//!
//! Hand-off to other threads is explicit: [RequestContextHolder::snapshot] the attributes, move
//! them, and bind them on the target thread. Implicit propagation to spawned threads is opt-in
//! through [RequestContextHolder::set_inheritable] and off by default.

use fxhash::FxHashMap;
use http::{HeaderMap, Method, Uri};
use std::any::Any;
use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

pub type AttributeValue = Arc<dyn Any + Send + Sync>;

type AttributeMap = FxHashMap<String, AttributeValue>;

/// An incoming request as seen by handler mappings, interceptors and handlers.
pub struct WebRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    /// Query and path parameters; path variables captured by the matched pattern are merged in
    /// during dispatch.
    pub params: FxHashMap<String, String>,
    pub locale: Option<String>,
    attributes: RequestAttributes,
}

impl WebRequest {
    /// Creates a request for the given method and URI, with query parameters parsed from the URI.
    pub fn new(method: Method, uri: Uri) -> Self {
        let params = uri
            .query()
            .map(|query| {
                query
                    .split('&')
                    .filter(|pair| !pair.is_empty())
                    .map(|pair| match pair.split_once('=') {
                        Some((key, value)) => (key.to_string(), value.to_string()),
                        None => (pair.to_string(), String::new()),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            method,
            uri,
            headers: HeaderMap::new(),
            params,
            locale: None,
            attributes: RequestAttributes::default(),
        }
    }

    pub fn with_locale<S: Into<String>>(mut self, locale: S) -> Self {
        self.locale = Some(locale.into());
        self
    }

    pub fn with_param<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// The shared attribute map for this request; the same map is visible through
    /// [RequestContextHolder] while the request is bound.
    pub fn attributes(&self) -> &RequestAttributes {
        &self.attributes
    }
}

/// Request-scoped attributes plus the request coordinates worth keeping after the request object
/// itself is gone. Cloning shares the underlying map.
#[derive(Clone, Default)]
pub struct RequestAttributes {
    attributes: Arc<RwLock<AttributeMap>>,
}

impl RequestAttributes {
    pub fn attribute<T: Send + Sync + 'static>(&self, name: &str) -> Option<Arc<T>> {
        self.read()
            .get(name)
            .cloned()
            .and_then(|value| value.downcast::<T>().ok())
    }

    /// The type-erased attribute value, for callers doing their own downcasting.
    pub fn raw_attribute(&self, name: &str) -> Option<AttributeValue> {
        self.read().get(name).cloned()
    }

    pub fn set_attribute<S: Into<String>>(&self, name: S, value: AttributeValue) {
        self.write().insert(name.into(), value);
    }

    pub fn remove_attribute(&self, name: &str) -> Option<AttributeValue> {
        self.write().remove(name)
    }

    pub fn attribute_names(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    fn read(&self) -> RwLockReadGuard<'_, AttributeMap> {
        match self.attributes.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, AttributeMap> {
        match self.attributes.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// State bound to the current thread for one request.
#[derive(Clone)]
pub struct BoundRequestState {
    pub method: Method,
    pub path: String,
    pub locale: Option<String>,
    pub attributes: RequestAttributes,
}

impl BoundRequestState {
    pub fn from_request(request: &WebRequest) -> Self {
        Self {
            method: request.method.clone(),
            path: request.path().to_string(),
            locale: request.locale.clone(),
            attributes: request.attributes().clone(),
        }
    }
}

thread_local! {
    static CURRENT_REQUEST: RefCell<Option<BoundRequestState>> = const { RefCell::new(None) };
}

static INHERITABLE: AtomicBool = AtomicBool::new(false);

/// Thread-local access to the state of the request currently being dispatched.
pub struct RequestContextHolder;

impl RequestContextHolder {
    /// Binds request state to the current thread, returning a guard which restores the previous
    /// binding when dropped.
    #[must_use = "dropping the guard immediately unbinds the request state"]
    pub fn bind(state: BoundRequestState) -> RequestBindGuard {
        let previous =
            CURRENT_REQUEST.with(|current| current.borrow_mut().replace(state));
        RequestBindGuard { previous }
    }

    /// The state bound to the current thread, if any.
    pub fn current() -> Option<BoundRequestState> {
        CURRENT_REQUEST.with(|current| current.borrow().clone())
    }

    /// Clone of the current binding for explicit hand-off to another thread; bind it there with
    /// [RequestContextHolder::bind].
    pub fn snapshot() -> Option<BoundRequestState> {
        Self::current()
    }

    /// Like [RequestContextHolder::snapshot], but only yielding a value when inheritable
    /// propagation has been enabled. Intended for generic spawn helpers.
    pub fn inheritable_snapshot() -> Option<BoundRequestState> {
        INHERITABLE
            .load(Ordering::Relaxed)
            .then(Self::current)
            .flatten()
    }

    /// Opts in to implicit propagation through [RequestContextHolder::inheritable_snapshot].
    /// Off by default.
    pub fn set_inheritable(enabled: bool) {
        INHERITABLE.store(enabled, Ordering::Relaxed);
    }
}

pub struct RequestBindGuard {
    previous: Option<BoundRequestState>,
}

impl Drop for RequestBindGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT_REQUEST.with(|current| *current.borrow_mut() = previous);
    }
}

use std::fmt;
use std::sync::{Arc, Mutex};

use crate::backend::Geocoder;
use crate::event::Event;
use crate::placemark::{
    AddressComponents, GeocodeRequest, Location, Placemark, PlacemarkField, RequestKind,
};
use crate::Error;

/// Buffered events per listener before the oldest are dropped.
const EVENT_CAPACITY: usize = 64;

/// Listener handle returned by [`Controller::events`].
pub type EventReceiver = async_broadcast::Receiver<Event>;

/// Receives the outcome of a single request.
pub type Completion = Box<dyn FnOnce(Result<Vec<Placemark>, Error>) + Send>;

/// How the outcome of a request reaches the caller.
///
/// Exactly one delivery happens per request: the completion is called, or
/// an [`Event`] is broadcast to [`Controller::events`] listeners.
pub enum Delivery {
    Callback(Completion),
    Broadcast,
}

impl Delivery {
    #[must_use]
    pub fn callback(f: impl FnOnce(Result<Vec<Placemark>, Error>) + Send + 'static) -> Self {
        Self::Callback(Box::new(f))
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Callback(_) => f.write_str("Callback"),
            Self::Broadcast => f.write_str("Broadcast"),
        }
    }
}

/// Cached results of past successful requests.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    /// Most recent successful reverse geocode.
    pub current_placemark: Option<Placemark>,
    /// The reverse geocode result before `current_placemark`.
    pub previous_placemark: Option<Placemark>,
    /// Most recent successful forward geocode.
    pub current_location: Option<Location>,
}

impl Snapshot {
    fn record(&mut self, kind: RequestKind, placemarks: &[Placemark]) {
        let Some(first) = placemarks.first() else {
            return;
        };
        if kind.is_reverse() {
            self.previous_placemark = self.current_placemark.replace(first.clone());
        } else {
            self.current_location = Some(first.location.clone());
        }
    }

    fn event(&self, kind: RequestKind, result: &Result<Vec<Placemark>, Error>) -> Event {
        match result {
            Err(error) => Event::Failed {
                error: error.clone(),
            },
            Ok(_) if kind.is_reverse() => Event::PlacemarkUpdated {
                current: self.current_placemark.clone(),
                previous: self.previous_placemark.clone(),
            },
            Ok(_) => Event::LocationUpdated {
                current: self.current_location.clone(),
            },
        }
    }

    fn changed(&self, field: PlacemarkField) -> bool {
        let current = self.current_placemark.as_ref().and_then(|p| p.field(field));
        let previous = self.previous_placemark.as_ref().and_then(|p| p.field(field));
        current != previous
    }
}

/// The request in flight. Closing `cancel` wakes the awaiting request.
struct Pending {
    id: u64,
    kind: RequestKind,
    cancel: async_channel::Sender<()>,
}

struct Inner {
    cache: Snapshot,
    pending: Option<Pending>,
    next_id: u64,
    sender: async_broadcast::Sender<Event>,
    /// Keeps the channel open while no listener is subscribed.
    _keep_alive: async_broadcast::InactiveReceiver<Event>,
}

/// Tracks geocode requests against a [`Geocoder`] backend and caches their
/// results.
///
/// Holds at most one pending request: starting another supersedes it, and
/// the superseded caller gets [`Error::Cancelled`]. Cloneable; all clones
/// share the same cache and pending request.
///
/// Requests resolve on the task that awaits them. Completions run there
/// too, after the internal lock is released, so they may call back into the
/// controller.
#[derive(Clone)]
pub struct Controller {
    backend: Arc<dyn Geocoder>,
    inner: Arc<Mutex<Inner>>,
}

impl Controller {
    #[must_use]
    pub fn new(backend: impl Geocoder) -> Self {
        Self::with_backend(Arc::new(backend))
    }

    /// Create a controller over a shared backend.
    #[must_use]
    pub fn with_backend(backend: Arc<dyn Geocoder>) -> Self {
        let (mut sender, receiver) = async_broadcast::broadcast(EVENT_CAPACITY);
        sender.set_overflow(true);
        let keep_alive = receiver.deactivate();
        Self {
            backend,
            inner: Arc::new(Mutex::new(Inner {
                cache: Snapshot::default(),
                pending: None,
                next_id: 0,
                sender,
                _keep_alive: keep_alive,
            })),
        }
    }

    /// Forward geocode a structured address.
    ///
    /// Success updates [`current_location`](Self::current_location).
    pub async fn geocode_address_components(
        &self,
        address: AddressComponents,
        delivery: Delivery,
    ) {
        self.request(GeocodeRequest::AddressComponents(address), delivery)
            .await;
    }

    /// Forward geocode a free-text address.
    ///
    /// Success updates [`current_location`](Self::current_location).
    pub async fn geocode_address_string(&self, address: impl Into<String>, delivery: Delivery) {
        self.request(GeocodeRequest::AddressString(address.into()), delivery)
            .await;
    }

    /// Reverse geocode a location.
    ///
    /// Success moves the current placemark to previous and stores the first
    /// result as current.
    pub async fn reverse_geocode_location(&self, location: Location, delivery: Delivery) {
        self.request(GeocodeRequest::Location(location), delivery)
            .await;
    }

    /// Run `request` against the backend and deliver its outcome.
    ///
    /// Resolves once the outcome has been delivered. A failed request never
    /// touches the cache.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub async fn request(&self, request: GeocodeRequest, delivery: Delivery) {
        let kind = request.kind();
        let (id, cancelled) = self.begin(kind);
        tracing::debug!(id, %kind, %request, "geocode started");

        let lookup = match request {
            GeocodeRequest::AddressComponents(address) => {
                self.backend.geocode_address_components(address)
            }
            GeocodeRequest::AddressString(address) => self.backend.geocode_address_string(address),
            GeocodeRequest::Location(location) => self.backend.reverse_geocode_location(location),
        };
        let outcome = futures_lite::future::or(lookup, async move {
            let _ = cancelled.recv().await;
            Err(Error::Cancelled)
        })
        .await;

        self.finish(id, kind, outcome, delivery);
    }

    /// Cancel the pending request, if any.
    ///
    /// The cancelled caller receives [`Error::Cancelled`] through its
    /// delivery. Cached results are kept.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn cancel(&self) {
        let pending = self.inner.lock().expect("poisoned").pending.take();
        let Some(pending) = pending else {
            return;
        };
        pending.cancel.close();
        self.backend.cancel();
        tracing::debug!(id = pending.id, kind = %pending.kind, "geocode cancelled");
    }

    /// Whether a request is in flight.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.inner.lock().expect("poisoned").pending.is_some()
    }

    /// Kind of the request in flight.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn pending_kind(&self) -> Option<RequestKind> {
        self.inner
            .lock()
            .expect("poisoned")
            .pending
            .as_ref()
            .map(|p| p.kind)
    }

    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn current_placemark(&self) -> Option<Placemark> {
        self.inner
            .lock()
            .expect("poisoned")
            .cache
            .current_placemark
            .clone()
    }

    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn previous_placemark(&self) -> Option<Placemark> {
        self.inner
            .lock()
            .expect("poisoned")
            .cache
            .previous_placemark
            .clone()
    }

    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn current_location(&self) -> Option<Location> {
        self.inner
            .lock()
            .expect("poisoned")
            .cache
            .current_location
            .clone()
    }

    /// Copy of all cached results, taken atomically.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        self.inner.lock().expect("poisoned").cache.clone()
    }

    /// Subscribe to outcomes of requests issued with [`Delivery::Broadcast`].
    ///
    /// Only events published after this call are received. A slow listener
    /// loses the oldest events once its buffer is full.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn events(&self) -> EventReceiver {
        self.inner.lock().expect("poisoned").sender.new_receiver()
    }

    /// Whether `field` differs between the current and previous placemark.
    ///
    /// A missing placemark counts as a missing field: missing on both sides
    /// is unchanged, missing on one side is changed.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn did_change(&self, field: PlacemarkField) -> bool {
        self.inner.lock().expect("poisoned").cache.changed(field)
    }

    #[must_use]
    pub fn did_administrative_area_change(&self) -> bool {
        self.did_change(PlacemarkField::AdministrativeArea)
    }

    #[must_use]
    pub fn did_sub_administrative_area_change(&self) -> bool {
        self.did_change(PlacemarkField::SubAdministrativeArea)
    }

    #[must_use]
    pub fn did_locality_change(&self) -> bool {
        self.did_change(PlacemarkField::Locality)
    }

    #[must_use]
    pub fn did_postal_code_change(&self) -> bool {
        self.did_change(PlacemarkField::PostalCode)
    }

    /// Whether `field` of the current placemark equals `value`.
    ///
    /// False when there is no current placemark or it lacks the field.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn is_equal_to(&self, field: PlacemarkField, value: &str) -> bool {
        self.inner
            .lock()
            .expect("poisoned")
            .cache
            .current_placemark
            .as_ref()
            .and_then(|p| p.field(field))
            == Some(value)
    }

    #[must_use]
    pub fn is_administrative_area_equal_to(&self, value: &str) -> bool {
        self.is_equal_to(PlacemarkField::AdministrativeArea, value)
    }

    #[must_use]
    pub fn is_sub_administrative_area_equal_to(&self, value: &str) -> bool {
        self.is_equal_to(PlacemarkField::SubAdministrativeArea, value)
    }

    #[must_use]
    pub fn is_locality_equal_to(&self, value: &str) -> bool {
        self.is_equal_to(PlacemarkField::Locality, value)
    }

    /// Register a new pending request, superseding the current one.
    fn begin(&self, kind: RequestKind) -> (u64, async_channel::Receiver<()>) {
        let (cancel, cancelled) = async_channel::bounded(1);
        let mut inner = self.inner.lock().expect("poisoned");
        let id = inner.next_id;
        inner.next_id += 1;
        let superseded = inner.pending.replace(Pending { id, kind, cancel });
        drop(inner);

        if let Some(old) = superseded {
            old.cancel.close();
            tracing::debug!(id = old.id, kind = %old.kind, by = id, "geocode superseded");
        }
        (id, cancelled)
    }

    fn finish(
        &self,
        id: u64,
        kind: RequestKind,
        outcome: Result<Vec<Placemark>, Error>,
        delivery: Delivery,
    ) {
        let mut inner = self.inner.lock().expect("poisoned");
        // A request cancelled or superseded after its answer arrived must
        // not reach the cache.
        let result = if inner.pending.as_ref().is_some_and(|p| p.id == id) {
            inner.pending = None;
            match outcome {
                Ok(placemarks) if placemarks.is_empty() => Err(Error::NoResult),
                other => other,
            }
        } else {
            Err(Error::Cancelled)
        };
        match &result {
            Ok(placemarks) => {
                tracing::debug!(id, %kind, results = placemarks.len(), "geocode finished");
            }
            Err(error) => {
                tracing::debug!(id, %kind, %error, "geocode failed");
            }
        }

        if let Ok(placemarks) = &result {
            inner.cache.record(kind, placemarks);
        }

        match delivery {
            Delivery::Broadcast => {
                let event = inner.cache.event(kind, &result);
                if inner.sender.try_broadcast(event).is_err() {
                    tracing::trace!(id, "no event listeners");
                }
                drop(inner);
            }
            Delivery::Callback(completion) => {
                drop(inner);
                completion(result);
            }
        }
    }
}

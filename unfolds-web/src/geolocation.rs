//! Browser geolocation feed.

use std::cell::RefCell;
use std::rc::Rc;
use unfolds_engine::Coordinate;
use unfolds_engine::constants::{GEOLOCATION_MAX_AGE_MS, GEOLOCATION_TIMEOUT_MS};
use wasm_bindgen::JsCast;
use wasm_bindgen::closure::Closure;
use web_sys::{
    Geolocation, Position as GeolocationPosition, PositionError as GeolocationPositionError,
    PositionOptions,
};

use crate::dom;

/// Where the map centers when the browser cannot locate the user.
pub const FALLBACK_LOCATION: (f64, f64) = (40.7128, -74.0060);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GeoError {
    #[error("Location access denied. Please enable location services.")]
    PermissionDenied,
    #[error("Location information unavailable.")]
    PositionUnavailable,
    #[error("Location request timed out.")]
    Timeout,
    #[error("Geolocation is not supported by this browser.")]
    Unsupported,
    #[error("Unable to retrieve location: {0}")]
    Other(String),
}

impl GeoError {
    fn from_js(err: &GeolocationPositionError) -> Self {
        match err.code() {
            GeolocationPositionError::PERMISSION_DENIED => Self::PermissionDenied,
            GeolocationPositionError::POSITION_UNAVAILABLE => Self::PositionUnavailable,
            GeolocationPositionError::TIMEOUT => Self::Timeout,
            _ => Self::Other(err.message()),
        }
    }
}

#[must_use]
pub fn position_options() -> PositionOptions {
    let options = PositionOptions::new();
    options.set_enable_high_accuracy(true);
    options.set_timeout(GEOLOCATION_TIMEOUT_MS);
    options.set_maximum_age(GEOLOCATION_MAX_AGE_MS);
    options
}

#[must_use]
pub fn fallback_location() -> Coordinate {
    let (lat, lng) = FALLBACK_LOCATION;
    Coordinate { lat, lng }
}

fn geolocation() -> Result<Geolocation, GeoError> {
    dom::window()
        .ok_or(GeoError::Unsupported)?
        .navigator()
        .geolocation()
        .map_err(|_| GeoError::Unsupported)
}

fn to_coordinate(position: &GeolocationPosition) -> Result<Coordinate, GeoError> {
    let coords = position.coords();
    Coordinate::new(coords.latitude(), coords.longitude())
        .map_err(|err| GeoError::Other(err.to_string()))
}

/// An active position watch; dropping it stops the watch.
pub struct LocationWatch {
    geolocation: Geolocation,
    id: i32,
    _on_position: Closure<dyn FnMut(GeolocationPosition)>,
    _on_error: Closure<dyn FnMut(GeolocationPositionError)>,
}

impl LocationWatch {
    /// Start watching the user's position. `callback` sees every fix and
    /// every failure.
    ///
    /// # Errors
    /// Returns [`GeoError::Unsupported`] when the browser has no geolocation.
    pub fn start<F>(callback: F) -> Result<Self, GeoError>
    where
        F: FnMut(Result<Coordinate, GeoError>) + 'static,
    {
        let geolocation = geolocation()?;
        let callback = Rc::new(RefCell::new(callback));

        let on_fix = callback.clone();
        let on_position = Closure::<dyn FnMut(GeolocationPosition)>::new(
            move |position: GeolocationPosition| {
                (on_fix.borrow_mut())(to_coordinate(&position));
            },
        );
        let on_failure = callback;
        let on_error = Closure::<dyn FnMut(GeolocationPositionError)>::new(
            move |err: GeolocationPositionError| {
                (on_failure.borrow_mut())(Err(GeoError::from_js(&err)));
            },
        );

        let id = geolocation
            .watch_position_with_error_callback_and_options(
                on_position.as_ref().unchecked_ref(),
                Some(on_error.as_ref().unchecked_ref()),
                &position_options(),
            )
            .map_err(|err| GeoError::Other(dom::js_error_message(&err)))?;
        log::debug!("geolocation watch {id} started");
        Ok(Self {
            geolocation,
            id,
            _on_position: on_position,
            _on_error: on_error,
        })
    }
}

impl Drop for LocationWatch {
    fn drop(&mut self) {
        self.geolocation.clear_watch(self.id);
    }
}

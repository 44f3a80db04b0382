//! JavaScript surface of the discovery page.

use serde::Serialize;
use unfolds_engine::{Coordinate, StepFilter, StepSort};
use wasm_bindgen::prelude::*;

use crate::app::Discovery;
use crate::dom;
use crate::geolocation::{LocationWatch, fallback_location};
use crate::loader::FetchedStories;
use crate::storage::LocalStorageStore;

fn to_js<T: Serialize>(value: &T) -> Result<JsValue, JsValue> {
    serde_wasm_bindgen::to_value(value).map_err(JsValue::from)
}

fn js_err(err: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&err.to_string())
}

fn view_args(filter: &str, sort: &str) -> Result<(StepFilter, StepSort), JsValue> {
    Ok((filter.parse().map_err(js_err)?, sort.parse().map_err(js_err)?))
}

fn entropy() -> u64 {
    // Math.random() yields 52 random mantissa bits
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let random = (js_sys::Math::random() * 4_503_599_627_370_496.0) as u64;
    random ^ dom::now().timestamp_millis().unsigned_abs()
}

#[wasm_bindgen]
pub struct DiscoveryApp {
    inner: Discovery<LocalStorageStore>,
}

/// Restore saved state and, on a first visit, import the bundled stories.
///
/// # Errors
/// Rejects when a bundled story is invalid or cannot be saved.
#[wasm_bindgen(js_name = openDiscovery)]
#[allow(clippy::future_not_send)]
pub async fn open_discovery() -> Result<DiscoveryApp, JsValue> {
    let now = dom::now();
    let mut inner = Discovery::open(LocalStorageStore, entropy(), now);
    if inner.engine().stories().is_empty() {
        let bundled = FetchedStories::fetch_bundled().await;
        inner.seed_if_empty(&bundled, now).map_err(js_err)?;
    }
    Ok(DiscoveryApp { inner })
}

#[wasm_bindgen]
impl DiscoveryApp {
    #[wasm_bindgen(js_name = updateLocation)]
    pub fn update_location(&mut self, lat: f64, lng: f64) -> Result<(), JsValue> {
        let user = Coordinate::new(lat, lng).map_err(js_err)?;
        self.inner.update_location(user);
        Ok(())
    }

    #[wasm_bindgen(js_name = useFallbackLocation)]
    pub fn use_fallback_location(&mut self) {
        self.inner.update_location(fallback_location());
    }

    pub fn steps(&self, filter: &str, sort: &str) -> Result<JsValue, JsValue> {
        let (filter, sort) = view_args(filter, sort)?;
        to_js(&self.inner.step_cards(filter, sort, dom::now()))
    }

    pub fn stories(&self, filter: &str, sort: &str) -> Result<JsValue, JsValue> {
        let (filter, sort) = view_args(filter, sort)?;
        to_js(&self.inner.story_cards(filter, sort, dom::now()))
    }

    pub fn nearest(&self) -> Result<JsValue, JsValue> {
        to_js(&self.inner.nearest_cards(dom::now()))
    }

    pub fn search(&self, query: &str) -> Result<JsValue, JsValue> {
        to_js(&self.inner.search(query, dom::now()))
    }

    pub fn claim(&mut self, step_id: &str) -> Result<JsValue, JsValue> {
        to_js(&self.inner.claim(step_id, dom::now()))
    }

    #[wasm_bindgen(js_name = clearClaims)]
    pub fn clear_claims(&mut self) -> Result<usize, JsValue> {
        self.inner.clear_claims().map_err(js_err)
    }

    #[wasm_bindgen(js_name = clearDatabase)]
    pub fn clear_database(&mut self) -> Result<usize, JsValue> {
        self.inner.clear_database().map_err(js_err)
    }

    #[wasm_bindgen(js_name = importJson)]
    pub fn import_json(&mut self, json: &str) -> Result<JsValue, JsValue> {
        let summary = self.inner.import_json(json, dom::now()).map_err(js_err)?;
        to_js(&summary)
    }

    #[wasm_bindgen(js_name = saveStory)]
    pub fn save_story(&mut self, json: &str) -> Result<JsValue, JsValue> {
        let summary = self.inner.save_authored(json, dom::now()).map_err(js_err)?;
        to_js(&summary)
    }

    #[wasm_bindgen(js_name = exportLegacy)]
    pub fn export_legacy(&self) -> Result<String, JsValue> {
        self.inner.export_legacy_json(dom::now()).map_err(js_err)
    }

    pub fn stats(&self) -> Result<JsValue, JsValue> {
        to_js(self.inner.stats())
    }

    pub fn achievements(&self) -> Result<JsValue, JsValue> {
        to_js(&self.inner.achievements())
    }
}

/// Keeps a geolocation watch alive until `stop` is called or it is dropped.
#[wasm_bindgen]
pub struct LocationHandle {
    watch: Option<LocationWatch>,
}

#[wasm_bindgen]
impl LocationHandle {
    pub fn stop(&mut self) {
        self.watch = None;
    }
}

/// Call `callback` with `{lat, lng}` on every fix or `{error}` on failure.
///
/// # Errors
/// Fails when the browser has no geolocation support.
#[wasm_bindgen(js_name = watchLocation)]
pub fn watch_location(callback: js_sys::Function) -> Result<LocationHandle, JsValue> {
    #[derive(Serialize)]
    #[serde(untagged)]
    enum Fix {
        Position { lat: f64, lng: f64 },
        Failure { error: String },
    }

    let watch = LocationWatch::start(move |fix| {
        let payload = match fix {
            Ok(at) => Fix::Position {
                lat: at.lat,
                lng: at.lng,
            },
            Err(err) => Fix::Failure {
                error: err.to_string(),
            },
        };
        let delivered = to_js(&payload).and_then(|value| callback.call1(&JsValue::NULL, &value));
        if let Err(err) = delivered {
            dom::console_error(&dom::js_error_message(&err));
        }
    })
    .map_err(js_err)?;
    Ok(LocationHandle { watch: Some(watch) })
}

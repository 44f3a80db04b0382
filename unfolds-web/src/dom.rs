use chrono::{DateTime, Utc};
use unfolds_engine::Timestamp;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::JsFuture;
use web_sys::{Response, Storage, Window};

/// Retrieve the global `window` object, if running in a browser.
#[must_use]
pub fn window() -> Option<Window> {
    web_sys::window()
}

/// Convert a JavaScript value into a readable string for error reporting.
#[must_use]
pub fn js_error_message(value: &JsValue) -> String {
    value
        .as_string()
        .or_else(|| {
            value
                .dyn_ref::<js_sys::Error>()
                .map(|err| err.message().into())
        })
        .unwrap_or_else(|| format!("{value:?}"))
}

/// Log an error message to the browser console.
pub fn console_error(message: &str) {
    web_sys::console::error_1(&JsValue::from(message));
}

/// Wall-clock time from the browser clock.
#[must_use]
pub fn now() -> Timestamp {
    // f64 milliseconds since the epoch fit i64 for any realistic date
    #[allow(clippy::cast_possible_truncation)]
    let millis = js_sys::Date::now() as i64;
    DateTime::<Utc>::from_timestamp_millis(millis).unwrap_or_default()
}

/// Perform a GET request and return the browser `Response`.
///
/// # Errors
/// Returns an error if there is no window, the fetch fails, or the result is
/// not a `Response`.
#[allow(clippy::future_not_send)] // Wasm futures rely on `JsFuture`, which is not `Send`.
pub async fn fetch_response(url: &str) -> Result<Response, JsValue> {
    let window = window().ok_or_else(|| JsValue::from_str("window unavailable"))?;
    let resp_value = JsFuture::from(window.fetch_with_str(url)).await?;
    resp_value.dyn_into::<Response>()
}

/// Fetch `url` and return its body as text, failing on non-2xx statuses.
///
/// # Errors
/// Returns an error if the request fails, the status is not OK, or the body
/// cannot be read.
#[allow(clippy::future_not_send)]
pub async fn fetch_text(url: &str) -> Result<String, JsValue> {
    let response = fetch_response(url).await?;
    if !response.ok() {
        return Err(JsValue::from_str(&format!(
            "{url} returned HTTP {}",
            response.status()
        )));
    }
    let body = JsFuture::from(response.text()?).await?;
    body.as_string()
        .ok_or_else(|| JsValue::from_str("response body was not text"))
}

/// Access the browser `localStorage` handle.
///
/// # Errors
/// Returns an error if the browser window cannot be accessed or `localStorage` is unavailable.
pub fn local_storage() -> Result<Storage, JsValue> {
    window()
        .ok_or_else(|| JsValue::from_str("window unavailable"))?
        .local_storage()?
        .ok_or_else(|| JsValue::from_str("localStorage unavailable"))
}

#![forbid(unsafe_code)]
#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

pub mod app;
#[cfg(target_arch = "wasm32")]
pub mod bindings;
pub mod dom;
pub mod geolocation;
pub mod loader;
pub mod logger;
pub mod storage;

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(start)]
pub fn start() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
    logger::init(log::LevelFilter::Info);
}

//! Console logging and panic reporting for the background context.

use std::str::FromStr;

use log::LevelFilter;
use wasm_bindgen::prelude::*;

/// Runs once when the module is instantiated.
#[wasm_bindgen(start)]
pub fn start() {
    console_error_panic_hook::set_once();
    // The console logger accepts every level; `setLogLevel` narrows the facade
    wasm_logger::init(wasm_logger::Config::new(log::Level::Trace));
    log::set_max_level(LevelFilter::Info);
}

/// Set the maximum level (`off`, `error`, `warn`, `info`, `debug`, `trace`).
#[wasm_bindgen(js_name = setLogLevel)]
pub fn set_log_level(level: &str) -> Result<(), JsValue> {
    let filter = LevelFilter::from_str(level)
        .map_err(|_| JsValue::from_str(&format!("Unknown log level '{}'", level)))?;
    log::set_max_level(filter);
    Ok(())
}

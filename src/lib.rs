use anyhow::bail;
use wasm_bindgen::prelude::*;

mod bucket;
mod index;
mod rle;
mod serialize;

pub use index::{BitmapIndex, DEFAULT_BUCKET_SIZE, EnabledKeys};
pub use rle::Run;

#[wasm_bindgen(start)]
pub fn init_panic_hook() {
    console_error_panic_hook::set_once();
}

/// `Number.MAX_SAFE_INTEGER`
const MAX_SAFE_KEY: f64 = 9_007_199_254_740_991.0;

/// JS numbers are the only key type on the JS side, so keys are checked here.
fn key_from_f64(key: f64) -> anyhow::Result<u64> {
    if !key.is_finite() || key.fract() != 0.0 || key < 0.0 || key > MAX_SAFE_KEY {
        bail!("Invalid argument: key {key} is not a non-negative integer");
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    Ok(key as u64)
}

/// `value` is `JsValue::as_bool` of the JS argument.
fn flag_from_js(value: Option<bool>) -> anyhow::Result<bool> {
    match value {
        Some(flag) => Ok(flag),
        None => bail!("Invalid argument: value is not a boolean"),
    }
}

fn invalid_argument(e: &anyhow::Error) -> JsValue {
    JsValue::from_str(&e.to_string())
}

#[wasm_bindgen(js_name = BitmapIndex)]
pub struct JsBitmapIndex(BitmapIndex);

#[wasm_bindgen(js_class = BitmapIndex)]
impl JsBitmapIndex {
    #[wasm_bindgen(constructor)]
    #[must_use]
    pub fn new(data: Option<String>) -> Self {
        Self(data.map_or_else(BitmapIndex::new, |data| BitmapIndex::from_rle(&data)))
    }

    #[wasm_bindgen(js_name = fromList)]
    #[allow(clippy::missing_errors_doc, clippy::needless_pass_by_value)]
    pub fn from_list(keys: JsValue) -> Result<JsBitmapIndex, JsValue> {
        let keys: Vec<f64> = serde_wasm_bindgen::from_value(keys)
            .map_err(|e| JsValue::from_str(&format!("Failed to deserialize keys: {e}")))?;
        keys.into_iter()
            .map(key_from_f64)
            .collect::<anyhow::Result<BitmapIndex>>()
            .map(Self)
            .map_err(|e| invalid_argument(&e))
    }

    #[allow(clippy::missing_errors_doc)]
    pub fn get(&self, key: f64) -> Result<bool, JsValue> {
        let key = key_from_f64(key).map_err(|e| invalid_argument(&e))?;
        Ok(self.0.get(key))
    }

    #[allow(clippy::missing_errors_doc)]
    pub fn contains(&self, key: f64) -> Result<bool, JsValue> {
        self.get(key)
    }

    #[allow(clippy::missing_errors_doc)]
    pub fn set(&mut self, key: f64, value: &JsValue) -> Result<(), JsValue> {
        let key = key_from_f64(key).map_err(|e| invalid_argument(&e))?;
        let value = flag_from_js(value.as_bool()).map_err(|e| invalid_argument(&e))?;
        self.0.set(key, value);
        Ok(())
    }

    #[allow(clippy::missing_errors_doc)]
    pub fn enable(&mut self, key: f64) -> Result<(), JsValue> {
        let key = key_from_f64(key).map_err(|e| invalid_argument(&e))?;
        self.0.enable(key);
        Ok(())
    }

    #[allow(clippy::missing_errors_doc)]
    pub fn disable(&mut self, key: f64) -> Result<(), JsValue> {
        let key = key_from_f64(key).map_err(|e| invalid_argument(&e))?;
        self.0.disable(key);
        Ok(())
    }

    #[allow(clippy::missing_errors_doc)]
    pub fn delete(&mut self, key: f64) -> Result<(), JsValue> {
        self.disable(key)
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn count(&self) -> f64 {
        self.0.count() as f64
    }

    #[wasm_bindgen(js_name = toList)]
    #[allow(clippy::missing_errors_doc)]
    pub fn to_list(&self) -> Result<JsValue, JsValue> {
        serde_wasm_bindgen::to_value(&self.0.to_list())
            .map_err(|e| JsValue::from_str(&format!("Failed to serialize keys: {e}")))
    }

    #[wasm_bindgen(getter)]
    #[must_use]
    pub fn rle(&self) -> String {
        self.0.rle()
    }
}

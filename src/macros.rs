// Typed projections out of a serde_cbor_2::Value. Each yields a reference to
// the inner value, or the CBOR shape error so callers can remap it with
// map_err to something more specific.

macro_rules! cbor_variant {
    ($v:expr, $variant:ident) => {{
        match $v {
            serde_cbor_2::Value::$variant(inner) => Ok(inner),
            _ => Err(WebauthnError::COSEKeyInvalidCBORValue),
        }
    }};
}

macro_rules! cbor_try_map {
    ($v:expr) => {
        cbor_variant!($v, Map)
    };
}

macro_rules! cbor_try_array {
    ($v:expr) => {
        cbor_variant!($v, Array)
    };
}

macro_rules! cbor_try_string {
    ($v:expr) => {
        cbor_variant!($v, Text)
    };
}

macro_rules! cbor_try_bytes {
    ($v:expr) => {
        cbor_variant!($v, Bytes)
    };
}

// Integers are copied out rather than borrowed.
macro_rules! cbor_try_i128 {
    ($v:expr) => {
        cbor_variant!($v, Integer).map(|i| *i)
    };
}

// Look up a text key in a CBOR map.
macro_rules! cbor_map_get {
    ($m:expr, $k:expr) => {{
        $m.get(&serde_cbor_2::Value::Text($k.to_string()))
    }};
}

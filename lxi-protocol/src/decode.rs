//! Permissive conversion of text replies into typed values.
//!
//! Instruments sometimes answer a query with an error string, and a client
//! polling at display rate must not fail on every malformed frame. Each
//! accessor therefore comes in two flavours: a tagged one returning
//! [`Decoded`], and a sentinel one (`to_*`) that collapses every failure into
//! a fixed value.

/// Returned by [`Reply::to_int`] when the reply is empty or not an integer.
pub const INT_SENTINEL: i64 = i64::MIN;

/// Outcome of decoding a reply as a particular type.
#[derive(Clone, Debug, PartialEq)]
pub enum Decoded<T> {
    /// The reply parsed as the requested type.
    Value(T),
    /// The instrument sent nothing before the read budget ran out.
    Empty,
    /// The reply did not parse; holds the offending text.
    Malformed(String),
}

impl<T> Decoded<T> {
    pub fn value(self) -> Option<T> {
        match self {
            Decoded::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_value(&self) -> bool {
        matches!(self, Decoded::Value(_))
    }

    pub fn unwrap_or(self, sentinel: T) -> T {
        self.value().unwrap_or(sentinel)
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Decoded<U> {
        match self {
            Decoded::Value(value) => Decoded::Value(f(value)),
            Decoded::Empty => Decoded::Empty,
            Decoded::Malformed(text) => Decoded::Malformed(text),
        }
    }
}

/// Raw bytes of one text reply, owned by the caller of the read.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Reply {
    raw: Vec<u8>,
}

impl Reply {
    pub fn new(raw: Vec<u8>) -> Reply {
        Reply { raw }
    }

    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn into_raw(self) -> Vec<u8> {
        self.raw
    }

    /// True if the instrument stayed silent.
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// The reply as trimmed text, with invalid UTF-8 replaced.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.raw).trim().to_string()
    }

    fn decode_with<T>(&self, parse: impl FnOnce(&str) -> Option<T>) -> Decoded<T> {
        let text = self.text();
        if text.is_empty() {
            return Decoded::Empty;
        }
        match parse(&text) {
            Some(value) => Decoded::Value(value),
            None => Decoded::Malformed(text),
        }
    }

    /// `1`, `ON` and `YES` are true; `0`, `OFF` and `NO` are false.
    /// Case is ignored.
    pub fn boolean(&self) -> Decoded<bool> {
        self.decode_with(|text| {
            if ["1", "ON", "YES"].iter().any(|t| text.eq_ignore_ascii_case(t)) {
                Some(true)
            } else if ["0", "OFF", "NO"].iter().any(|t| text.eq_ignore_ascii_case(t)) {
                Some(false)
            } else {
                None
            }
        })
    }

    pub fn integer(&self) -> Decoded<i64> {
        self.decode_with(|text| text.parse::<i64>().ok())
    }

    /// A literal `NaN` reply decodes to `Value(NaN)`, unlike a parse failure.
    pub fn float(&self) -> Decoded<f64> {
        self.decode_with(|text| text.parse::<f64>().ok())
    }

    /// Same as [`Reply::text`]; empty when the instrument was silent.
    pub fn to_text(&self) -> String {
        self.text()
    }

    pub fn to_bool(&self) -> bool {
        self.boolean().unwrap_or(false)
    }

    pub fn to_int(&self) -> i64 {
        self.integer().unwrap_or(INT_SENTINEL)
    }

    pub fn to_float(&self) -> f64 {
        self.float().unwrap_or(f64::NAN)
    }
}

impl From<Vec<u8>> for Reply {
    fn from(raw: Vec<u8>) -> Self {
        Reply::new(raw)
    }
}

impl From<&[u8]> for Reply {
    fn from(raw: &[u8]) -> Self {
        Reply::new(raw.to_vec())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn reply(text: &str) -> Reply {
        Reply::from(text.as_bytes())
    }

    #[test]
    fn error_string_hits_every_sentinel() {
        let err = reply("ERR\n");
        assert!(err.to_float().is_nan());
        assert_eq!(err.to_int(), i64::MIN);
        assert!(!err.to_bool());
        assert_eq!(err.to_text(), "ERR");
    }

    #[test]
    fn silence_decodes_as_empty() {
        let silent = Reply::default();
        assert!(silent.is_empty());
        assert_eq!(silent.float(), Decoded::Empty);
        assert_eq!(silent.integer(), Decoded::Empty);
        assert_eq!(silent.boolean(), Decoded::Empty);
        assert_eq!(silent.to_text(), "");
        assert!(silent.to_float().is_nan());
    }

    #[test]
    fn booleans() {
        for text in ["1", "on", "ON\r\n", "Yes"] {
            assert!(reply(text).to_bool(), "{text:?}");
        }
        for text in ["0", "OFF", "no"] {
            assert_eq!(reply(text).boolean(), Decoded::Value(false), "{text:?}");
        }
        assert_eq!(reply("2").boolean(), Decoded::Malformed("2".to_string()));
    }

    #[test]
    fn numbers() {
        assert_eq!(reply("+42\n").to_int(), 42);
        assert_eq!(reply("-7").integer(), Decoded::Value(-7));
        assert_eq!(reply("1.5").integer(), Decoded::Malformed("1.5".to_string()));
        assert_eq!(reply("1.250000E+00\n").to_float(), 1.25);
        assert_eq!(reply("-3e-3").float(), Decoded::Value(-0.003));
    }

    #[test]
    fn literal_nan_is_distinguishable() {
        let literal = reply("NaN").float();
        assert!(matches!(literal, Decoded::Value(v) if v.is_nan()));
        assert!(matches!(reply("bogus").float(), Decoded::Malformed(_)));
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let raw = Reply::new(vec![b'O', 0xff, b'K']);
        assert_eq!(raw.text(), "O\u{fffd}K");
        assert!(matches!(raw.boolean(), Decoded::Malformed(_)));
    }
}

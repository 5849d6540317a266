use base64::Engine;

/// A single metadata entry: either an ASCII text value, or a binary value
/// carried on a key ending in `-bin` (transmitted base64-encoded on the
/// wire, never as raw bytes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataValue {
    Ascii(String),
    Binary(Vec<u8>),
}

impl MetadataValue {
    pub fn as_ascii(&self) -> Option<&str> {
        match self {
            MetadataValue::Ascii(s) => Some(s),
            MetadataValue::Binary(_) => None,
        }
    }

    pub fn as_binary(&self) -> Option<&[u8]> {
        match self {
            MetadataValue::Binary(b) => Some(b),
            MetadataValue::Ascii(_) => None,
        }
    }
}

/// Ordered list of `(key, value)` entries, duplicate keys allowed, insertion
/// order preserved. Values are text unless the key ends with `-bin`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    entries: Vec<(String, MetadataValue)>,
}

impl Metadata {
    pub fn new() -> Self {
        Metadata { entries: Vec::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, MetadataValue)> {
        self.entries.iter()
    }

    /// Appends a text entry. Panics (at debug build time, via assert) if
    /// `key` ends in `-bin` — use [`Metadata::append_binary`] for that.
    pub fn append_ascii(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into().to_ascii_lowercase();
        debug_assert!(!key.ends_with("-bin"), "binary key {key:?} given an ascii value");
        self.entries.push((key, MetadataValue::Ascii(value.into())));
    }

    pub fn append_binary(&mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) {
        let mut key = key.into().to_ascii_lowercase();
        if !key.ends_with("-bin") {
            key.push_str("-bin");
        }
        self.entries.push((key, MetadataValue::Binary(value.into())));
    }

    /// First value for `key`, if any.
    pub fn get(&self, key: &str) -> Option<&MetadataValue> {
        let key = key.to_ascii_lowercase();
        self.entries.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    /// All values for `key`, in insertion order.
    pub fn get_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a MetadataValue> + 'a {
        let key = key.to_ascii_lowercase();
        self.entries
            .iter()
            .filter(move |(k, _)| *k == key)
            .map(|(_, v)| v)
    }

    /// Renders entries into `http::HeaderMap`-ready `(name, value)` string
    /// pairs, base64-encoding binary values as the wire format requires.
    pub fn to_wire_pairs(&self) -> Vec<(String, String)> {
        self.entries
            .iter()
            .map(|(k, v)| {
                let rendered = match v {
                    MetadataValue::Ascii(s) => s.clone(),
                    MetadataValue::Binary(b) => base64::engine::general_purpose::STANDARD.encode(b),
                };
                (k.clone(), rendered)
            })
            .collect()
    }

    /// Parses one wire-format header pair back into a typed entry,
    /// base64-decoding `-bin` keys. Returns `None` if a binary value fails
    /// to decode (caller treats this as the "binary decode failure" case in
    /// the trailer parser).
    pub fn from_wire_pair(key: &str, value: &str) -> Option<(String, MetadataValue)> {
        let key = key.to_ascii_lowercase();
        if key.ends_with("-bin") {
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(value.trim())
                .ok()?;
            Some((key, MetadataValue::Binary(bytes)))
        } else {
            Some((key, MetadataValue::Ascii(value.to_string())))
        }
    }

    pub fn merge(&mut self, other: Metadata) {
        self.entries.extend(other.entries);
    }

    /// Removes the first entry for `key` and returns its ascii value, if
    /// present and textual. Used to pull client-only synthetic metadata
    /// (e.g. `grpc-internal-encoding-request`) out before the rest is put
    /// on the wire.
    pub fn take_ascii(&mut self, key: &str) -> Option<String> {
        let key = key.to_ascii_lowercase();
        let index = self.entries.iter().position(|(k, _)| *k == key)?;
        match self.entries.remove(index).1 {
            MetadataValue::Ascii(value) => Some(value),
            MetadataValue::Binary(_) => None,
        }
    }
}

impl FromIterator<(String, MetadataValue)> for Metadata {
    fn from_iter<T: IntoIterator<Item = (String, MetadataValue)>>(iter: T) -> Self {
        Metadata {
            entries: iter.into_iter().collect(),
        }
    }
}

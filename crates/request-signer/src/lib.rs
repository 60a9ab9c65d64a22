//! Deterministic request signing.
//!
//! The auth server recomputes every signature independently, so the
//! canonical form is fixed:
//!
//! 1. parameters without a value are dropped
//! 2. the rest are sorted by key (byte-wise)
//! 3. joined as `k1=v1&k2=v2`
//! 4. HMAC-SHA256 over the UTF-8 bytes, keyed by the shared secret
//! 5. lowercase hex

use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::BTreeMap;

type HmacSha256 = Hmac<Sha256>;

/// Build the canonical `k=v&k=v` string that gets signed.
pub fn canonical_string<K, V, I>(params: I) -> String
where
    I: IntoIterator<Item = (K, Option<V>)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let sorted: BTreeMap<String, String> = params
        .into_iter()
        .filter_map(|(key, value)| value.map(|v| (key.as_ref().to_owned(), v.as_ref().to_owned())))
        .collect();

    sorted
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// Sign a parameter set with `secret`.
pub fn sign<K, V, I>(params: I, secret: &str) -> String
where
    I: IntoIterator<Item = (K, Option<V>)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    hmac_hex(canonical_string(params).as_bytes(), secret.as_bytes())
}

fn hmac_hex(payload: &[u8], key: &[u8]) -> String {
    // HMAC is defined for keys of any length.
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Parameters of one outgoing request, built fresh per request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignedParams {
    params: BTreeMap<String, Option<String>>,
}

impl SignedParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), Some(value.into()));
        self
    }

    /// Insert a parameter that may be absent; absent values are not signed.
    pub fn insert_opt(mut self, key: impl Into<String>, value: Option<impl Into<String>>) -> Self {
        self.params.insert(key.into(), value.map(Into::into));
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(|value| value.as_deref())
    }

    pub fn canonical(&self) -> String {
        canonical_string(self.params.iter().map(|(k, v)| (k, v.as_ref())))
    }

    pub fn sign(self, secret: &str) -> SignedRequest {
        let signature = hmac_hex(self.canonical().as_bytes(), secret.as_bytes());
        SignedRequest {
            params: self.params,
            signature,
        }
    }
}

/// Parameters plus their derived signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedRequest {
    params: BTreeMap<String, Option<String>>,
    signature: String,
}

impl SignedRequest {
    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(|value| value.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    fn params(pairs: &[(&str, &str)]) -> Vec<(String, Option<String>)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), Some(v.to_string())))
            .collect()
    }

    #[test]
    fn test_canonical_string_sorts_and_joins() {
        let canonical = canonical_string(params(&[
            ("timestamp", "1700000000000"),
            ("appKey", "k"),
            ("appUUID", "dev-1"),
        ]));
        assert_eq!(canonical, "appKey=k&appUUID=dev-1&timestamp=1700000000000");
    }

    #[test]
    fn test_none_values_are_dropped() {
        let with_none = vec![
            ("a".to_string(), Some("1".to_string())),
            ("b".to_string(), None),
        ];
        assert_eq!(canonical_string(with_none.clone()), "a=1");
        assert_eq!(sign(with_none, SECRET), sign(params(&[("a", "1")]), SECRET));
    }

    #[test]
    fn test_sign_is_independent_of_insertion_order() {
        let forward = params(&[("a", "1"), ("b", "2"), ("c", "3")]);
        let mut reversed = forward.clone();
        reversed.reverse();

        assert_eq!(sign(forward, SECRET), sign(reversed, SECRET));
    }

    #[test]
    fn test_sign_changes_with_any_key_or_value() {
        let base = sign(params(&[("a", "1"), ("b", "2")]), SECRET);

        let variants = [
            sign(params(&[("a", "1"), ("b", "3")]), SECRET),
            sign(params(&[("a", "1"), ("c", "2")]), SECRET),
            sign(params(&[("a", "1")]), SECRET),
            sign(params(&[("a", "1"), ("b", "2")]), "other-secret"),
        ];

        for variant in &variants {
            assert_ne!(&base, variant);
        }
        let unique: std::collections::HashSet<_> = variants.iter().collect();
        assert_eq!(unique.len(), variants.len());
    }

    #[test]
    fn test_known_vector() {
        // RFC 4231 test case 2.
        assert_eq!(
            hmac_hex(b"what do ya want for nothing?", b"Jefe"),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_key_longer_than_block_size() {
        // RFC 4231 test case 6: the key is hashed down before use.
        assert_eq!(
            hmac_hex(
                b"Test Using Larger Than Block-Size Key - Hash Key First",
                &[0xaa; 131]
            ),
            "60e431591ee0b67f0d8a26aacbf5b77f8e0bc6213728c5140546040f0ee37f54"
        );
    }

    #[test]
    fn test_output_is_lowercase_hex() {
        let signature = sign(params(&[("x", "y")]), SECRET);
        assert_eq!(signature.len(), 64);
        assert!(signature
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    #[test]
    fn test_signed_params_builder_matches_free_function() {
        let request = SignedParams::new()
            .insert("appKey", "k")
            .insert("timestamp", "42")
            .insert_opt("optional", None::<String>)
            .sign(SECRET);

        assert_eq!(
            request.signature(),
            sign(params(&[("appKey", "k"), ("timestamp", "42")]), SECRET)
        );
        assert_eq!(request.get("appKey"), Some("k"));
        assert_eq!(request.get("optional"), None);
    }

    #[test]
    fn test_empty_secret_still_signs() {
        let signature = sign(params(&[("a", "1")]), "");
        assert_eq!(signature.len(), 64);
    }
}

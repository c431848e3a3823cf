//! HMAC-SHA1 and large-integer codecs shared by the token, association, and
//! Diffie–Hellman layers.

use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use num_bigint::BigUint;
use sha1::{Digest, Sha1};

type HmacSha1 = Hmac<Sha1>;

/// Length in bytes of an HMAC-SHA1 tag.
pub(crate) const SHA1_LEN: usize = 20;

pub(crate) fn hmac_sha1(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha1::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Constant-time HMAC-SHA1 verification.
pub(crate) fn hmac_sha1_verify(key: &[u8], data: &[u8], tag: &[u8]) -> bool {
    let mut mac = HmacSha1::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(data);
    mac.verify_slice(tag).is_ok()
}

pub(crate) fn sha1(data: &[u8]) -> Vec<u8> {
    Sha1::digest(data).to_vec()
}

/// Encode a nonnegative integer as unsigned big-endian bytes, prepending a
/// zero byte when the most significant bit would otherwise be set. This
/// matches the `btwoc` encoding the provider side uses for Diffie–Hellman
/// values.
pub fn long_to_bytes(value: &BigUint) -> Vec<u8> {
    let mut bytes = value.to_bytes_be();
    if bytes[0] & 0x80 != 0 {
        bytes.insert(0, 0);
    }
    bytes
}

/// Decode unsigned big-endian bytes into an integer. The inverse of
/// [`long_to_bytes`]; a leading zero byte is harmless.
pub fn bytes_to_long(bytes: &[u8]) -> BigUint {
    BigUint::from_bytes_be(bytes)
}

/// Standard base64 of [`long_to_bytes`].
pub fn long_to_base64(value: &BigUint) -> String {
    BASE64_STANDARD.encode(long_to_bytes(value))
}

/// Decode a standard-base64 integer, as found in `openid.dh_server_public`.
/// Returns `None` when the input is not valid base64.
pub fn base64_to_long(value: &str) -> Option<BigUint> {
    BASE64_STANDARD
        .decode(value)
        .ok()
        .map(|bytes| BigUint::from_bytes_be(&bytes))
}

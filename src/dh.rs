//! Diffie–Hellman key agreement used to protect the association MAC secret
//! in transit during the associate exchange.

use crate::crypto;

use num_bigint::{BigUint, RandBigInt};
use once_cell::sync::Lazy;
use rand::thread_rng;

// The well-known 1024-bit modulus from the OpenID 1.x specification.
static DEFAULT_MODULUS: Lazy<BigUint> = Lazy::new(|| {
    BigUint::parse_bytes(
        b"155172898181473697471232257763715539915724801966915404479707795314057629378541\
          917580651227423698188993727816152646631438561595825688188889951272158842675419\
          950341258706556549803580104870537681476726513255747040765857479291291572334510\
          643245094715007229621094194349783925984760375594985848253359305585439638443",
        10,
    )
    .expect("default modulus is a valid decimal literal")
});

static DEFAULT_GENERATOR: Lazy<BigUint> = Lazy::new(|| BigUint::from(2u32));

/// A Diffie–Hellman context holding one ephemeral private key.
///
/// The consumer creates one per associate exchange, sends
/// `base64(btwoc(g^x mod p))` as `openid.dh_consumer_public`, and combines the
/// provider's `dh_server_public` with its own private key to recover the MAC
/// secret from `enc_mac_key`.
pub struct DiffieHellman {
    modulus: BigUint,
    generator: BigUint,
    private: BigUint,
}

impl DiffieHellman {
    /// Create a context over the given group, drawing a fresh ephemeral
    /// private key uniformly from `[1, modulus - 1)`.
    pub fn new(modulus: BigUint, generator: BigUint) -> Self {
        let private =
            thread_rng().gen_biguint_range(&BigUint::from(1u32), &(&modulus - 1u32));
        Self {
            modulus,
            generator,
            private,
        }
    }

    /// Create a context over the well-known OpenID 1.x default group.
    pub fn new_default() -> Self {
        Self::new(DEFAULT_MODULUS.clone(), DEFAULT_GENERATOR.clone())
    }

    /// Whether this context uses the default group. Non-default parameters
    /// must be transmitted to the provider explicitly.
    pub fn is_default(&self) -> bool {
        self.modulus == *DEFAULT_MODULUS && self.generator == *DEFAULT_GENERATOR
    }

    /// The group modulus `p`.
    pub fn modulus(&self) -> &BigUint {
        &self.modulus
    }

    /// The group generator `g`.
    pub fn generator(&self) -> &BigUint {
        &self.generator
    }

    /// The public value `g^x mod p` for this context's private key.
    pub fn public(&self) -> BigUint {
        self.generator.modpow(&self.private, &self.modulus)
    }

    /// The shared secret `other_public^x mod p`.
    pub fn shared_secret(&self, other_public: &BigUint) -> BigUint {
        other_public.modpow(&self.private, &self.modulus)
    }

    /// Combine the peer's public value with an encrypted MAC key:
    /// SHA-1 over the btwoc form of the shared secret, XORed byte-for-byte
    /// against `encrypted`. Returns `None` when the lengths do not match
    /// (the digest is 20 bytes). The operation is an involution, so the same
    /// call both encrypts and decrypts.
    pub fn xor_secret(&self, other_public: &BigUint, encrypted: &[u8]) -> Option<Vec<u8>> {
        let digest = crypto::sha1(&crypto::long_to_bytes(
            &self.shared_secret(other_public),
        ));
        if digest.len() != encrypted.len() {
            return None;
        }
        Some(
            digest
                .iter()
                .zip(encrypted)
                .map(|(a, b)| a ^ b)
                .collect(),
        )
    }
}

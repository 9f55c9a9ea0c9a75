//! The `Signer` abstraction the AUTH handshake drives, plus an RSA+SHA-1
//! implementation grounded on the reference `adbkey` format. The core treats
//! key material as an external collaborator; only the demo CLI constructs
//! a concrete `Signer`.

/// Signs the 20-byte AUTH token and exposes the matching public key.
pub trait Signer {
    /// Signs `challenge` (the device's 20-byte token) with the signer's private key.
    fn sign(&self, challenge: &[u8]) -> Vec<u8>;

    /// Returns the ASCII-encoded public key, without a trailing NUL
    /// (the transport appends one before sending it to the device).
    fn public_key(&self) -> Vec<u8>;
}

#[cfg(feature = "rsa-signer")]
mod rsa_signer {
    use super::Signer;
    use base64::Engine;
    use rsa::pkcs1v15::SigningKey;
    use rsa::pkcs8::DecodePrivateKey;
    use rsa::signature::hazmat::PrehashSigner;
    use rsa::signature::SignatureEncoding;
    use rsa::traits::PublicKeyParts;
    use rsa::RsaPrivateKey;
    use sha1::Sha1;

    /// Loads a PKCS#8-encoded RSA private key (the `adbkey` format `adb keygen`
    /// produces) and signs AUTH tokens with PKCS#1 v1.5 over a raw SHA-1 prehash.
    pub struct RsaAdbSigner {
        key: RsaPrivateKey,
    }

    impl RsaAdbSigner {
        pub fn from_pkcs8_pem(pem: &str) -> Result<Self, rsa::pkcs8::Error> {
            let key = RsaPrivateKey::from_pkcs8_pem(pem)?;
            Ok(Self { key })
        }

        pub fn generate(bits: usize) -> rsa::Result<Self> {
            let key = RsaPrivateKey::new(&mut rand::thread_rng(), bits)?;
            Ok(Self { key })
        }

        /// Encodes the public key as the ADB "public key blob": a minimal
        /// RSAPublicKey struct (modulus size, n0inv, n, rr, exponent) base64'd,
        /// the format `adb keygen`'s `.pub` files and devices both expect.
        fn public_key_blob(&self) -> Vec<u8> {
            let n = self.key.n();
            let e = self.key.e();
            let mut blob = Vec::new();
            blob.extend_from_slice(&(n.bits() as u32 / 32).to_le_bytes());
            blob.extend_from_slice(&n.to_bytes_le());
            blob.extend_from_slice(&e.to_bytes_le());
            base64::engine::general_purpose::STANDARD
                .encode(blob)
                .into_bytes()
        }
    }

    impl Signer for RsaAdbSigner {
        fn sign(&self, challenge: &[u8]) -> Vec<u8> {
            let signing_key = SigningKey::<Sha1>::new(self.key.clone());
            signing_key
                .sign_prehash(challenge)
                .expect("prehash length matches SHA-1 output")
                .to_vec()
        }

        fn public_key(&self) -> Vec<u8> {
            self.public_key_blob()
        }
    }
}

#[cfg(feature = "rsa-signer")]
pub use rsa_signer::RsaAdbSigner;

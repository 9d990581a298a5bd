// Messaging module
//
// RSA key pairs, per-party key files, and the encrypt/sign/decrypt
// exchange that ends up sealed in the chain.

pub mod crypto;
pub mod keystore;
pub mod messenger;

pub use crypto::{CiphertextSigner, CryptoError, KeyPair, KeyPairProvider, RsaSigner};
pub use keystore::{KeyStore, KeyStoreError, StoredKeyPaths};
pub use messenger::{
    seal, Exchange, ExchangeOutcome, MessageExchangeRecord, MessageOpener, MessengerError,
    SealedMessage, SecureMessenger, MAX_MESSAGE_BYTES,
};

/// Key pairs shared by every test in the crate, generated once
#[cfg(test)]
pub(crate) mod test_keys {
    use std::sync::OnceLock;

    use super::crypto::{KeyPair, KeyPairProvider};

    fn generate() -> KeyPair {
        KeyPairProvider::default()
            .generate_key_pair()
            .expect("test key generation")
    }

    pub fn alice() -> &'static KeyPair {
        static KEYS: OnceLock<KeyPair> = OnceLock::new();
        KEYS.get_or_init(generate)
    }

    pub fn bob() -> &'static KeyPair {
        static KEYS: OnceLock<KeyPair> = OnceLock::new();
        KEYS.get_or_init(generate)
    }
}

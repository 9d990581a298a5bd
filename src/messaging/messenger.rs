use log::{debug, info};
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::crypto::{
    decrypt, encode_base64, encrypt, public_key_to_pem, verify_signature, CiphertextSigner,
    CryptoError, KeyPair,
};
use crate::blockchain::{Block, BlockData, Blockchain, BlockchainError, MessagePayload};

/// Largest plaintext a 2048-bit RSA-OAEP/SHA-256 block can carry
pub const MAX_MESSAGE_BYTES: usize = 190;

/// Errors that can occur while exchanging a message
#[derive(Debug, Error)]
pub enum MessengerError {
    #[error("Message is too long for RSA encryption: {size} bytes (maximum {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Chain(#[from] BlockchainError),
}

/// Ciphertext as it travels from sender to recipient
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedMessage {
    pub ciphertext: Vec<u8>,
    /// Signature over `ciphertext`, present when the sender signed
    pub signature: Option<Vec<u8>>,
}

/// Sender side: encrypts for the recipient and optionally signs the ciphertext
///
/// Needs nothing but the recipient's public key and, for signing, the
/// sender's own signer.
///
/// # Arguments
///
/// * `recipient_public_key` - Key the message is encrypted under
/// * `message` - Plaintext, at most `MAX_MESSAGE_BYTES` bytes of UTF-8
/// * `signer` - Sender's signer, `None` to leave the ciphertext unsigned
pub fn seal(
    recipient_public_key: &RsaPublicKey,
    message: &str,
    signer: Option<&dyn CiphertextSigner>,
) -> Result<SealedMessage, MessengerError> {
    let size = message.len();
    if size > MAX_MESSAGE_BYTES {
        return Err(MessengerError::MessageTooLarge {
            size,
            max: MAX_MESSAGE_BYTES,
        });
    }

    let ciphertext = encrypt(recipient_public_key, message.as_bytes())?;
    let signature = signer.map(|signer| signer.sign(&ciphertext)).transpose()?;

    Ok(SealedMessage {
        ciphertext,
        signature,
    })
}

/// Recipient side: decrypts sealed messages and checks sender signatures
pub struct MessageOpener {
    private_key: RsaPrivateKey,
}

impl MessageOpener {
    pub fn new(private_key: RsaPrivateKey) -> Self {
        MessageOpener { private_key }
    }

    /// Decrypts `sealed`, verifying its signature when a sender key is given
    ///
    /// # Returns
    ///
    /// The plaintext, or a verification error if the signature does not
    /// match the ciphertext
    pub fn open(
        &self,
        sealed: &SealedMessage,
        sender_public_key: Option<&RsaPublicKey>,
    ) -> Result<String, MessengerError> {
        if let (Some(signature), Some(public_key)) = (&sealed.signature, sender_public_key) {
            if !verify_signature(public_key, &sealed.ciphertext, signature)? {
                return Err(CryptoError::Verification(
                    "signature does not match ciphertext".to_string(),
                )
                .into());
            }
            debug!("Sender signature verified");
        }

        let plaintext = decrypt(&self.private_key, &sealed.ciphertext)?;
        String::from_utf8(plaintext)
            .map_err(|e| CryptoError::Decoding(e.to_string()).into())
    }
}

/// The two parties of one exchange with their key pairs
///
/// Holding both private keys only makes sense because sender and recipient
/// are played by the same process.
#[derive(Debug, Clone, Copy)]
pub struct Exchange<'a> {
    pub sender: &'a str,
    pub recipient: &'a str,
    pub sender_keys: &'a KeyPair,
    pub recipient_keys: &'a KeyPair,
    pub sign: bool,
}

/// Result of encrypting, optionally signing and decrypting one message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeOutcome {
    pub encrypted_message: String,
    pub signature: Option<String>,
    pub decrypted_message: String,
}

/// Exchange outcome plus the block that sealed it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageExchangeRecord {
    pub encrypted_message: String,
    pub signature: Option<String>,
    pub decrypted_message: String,
    pub block_index: u64,
    pub block_hash: String,
}

/// Runs both sides of an exchange and seals it into the chain
#[derive(Debug, Default, Clone, Copy)]
pub struct SecureMessenger;

impl SecureMessenger {
    pub fn new() -> Self {
        SecureMessenger
    }

    /// Seals `message` for the recipient, then opens it again as the recipient
    pub fn encrypt_and_optionally_sign(
        &self,
        exchange: &Exchange<'_>,
        message: &str,
    ) -> Result<ExchangeOutcome, MessengerError> {
        let signer = exchange.sign.then(|| exchange.sender_keys.signer());
        let sealed = seal(
            exchange.recipient_keys.public_key(),
            message,
            signer.as_ref().map(|signer| signer as &dyn CiphertextSigner),
        )?;

        let opener = MessageOpener::new(exchange.recipient_keys.private_key().clone());
        let decrypted_message = opener.open(&sealed, Some(exchange.sender_keys.public_key()))?;

        Ok(ExchangeOutcome {
            encrypted_message: encode_base64(&sealed.ciphertext),
            signature: sealed.signature.as_deref().map(encode_base64),
            decrypted_message,
        })
    }

    /// Runs the exchange and appends it to `chain` as a new block
    ///
    /// # Arguments
    ///
    /// * `chain` - Chain the exchange block is appended to
    /// * `exchange` - Parties and keys taking part
    /// * `message` - Plaintext to send
    ///
    /// # Returns
    ///
    /// The exchange outcome with the index and hash of its block
    pub fn send_and_record(
        &self,
        chain: &mut Blockchain,
        exchange: &Exchange<'_>,
        message: &str,
    ) -> Result<MessageExchangeRecord, MessengerError> {
        let outcome = self.encrypt_and_optionally_sign(exchange, message)?;

        let payload = MessagePayload {
            sender: exchange.sender.to_string(),
            recipient: exchange.recipient.to_string(),
            sender_public_key: public_key_to_pem(exchange.sender_keys.public_key())?,
            recipient_public_key: public_key_to_pem(exchange.recipient_keys.public_key())?,
            encrypted_message: outcome.encrypted_message.clone(),
            signature: outcome.signature.clone(),
            decrypted_message: outcome.decrypted_message.clone(),
        };

        let block = chain.add_block_to_chain(Block::candidate(BlockData::MessageExchange(payload)))?;
        info!(
            "Message from {} to {} sealed in block {}",
            exchange.sender, exchange.recipient, block.index
        );

        Ok(MessageExchangeRecord {
            encrypted_message: outcome.encrypted_message,
            signature: outcome.signature,
            decrypted_message: outcome.decrypted_message,
            block_index: block.index,
            block_hash: block.hash.clone(),
        })
    }
}

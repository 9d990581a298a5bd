use std::path::PathBuf;

use clap::Parser;

use crate::messaging::crypto::MIN_KEY_BITS;

/// Records encrypted, optionally signed messages in a hash-chained ledger
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// JSON file the transaction records are appended to
    #[arg(long, env = "MESSAGE_LEDGER_FILE", default_value = "messagesStorage.json")]
    pub ledger_file: PathBuf,

    /// Directory under which `<party>/publicKey.pem` and `privateKey.pem` are written
    #[arg(long, env = "MESSAGE_LEDGER_KEYS_DIR", default_value = ".")]
    pub keys_dir: PathBuf,

    /// RSA modulus size for generated key pairs
    #[arg(long, env = "MESSAGE_LEDGER_KEY_BITS", default_value_t = MIN_KEY_BITS, value_parser = parse_key_bits)]
    pub key_bits: usize,
}

fn parse_key_bits(value: &str) -> Result<usize, String> {
    let bits: usize = value
        .parse()
        .map_err(|_| format!("`{value}` is not a whole number"))?;

    if bits < MIN_KEY_BITS {
        return Err(format!("key size must be at least {MIN_KEY_BITS} bits"));
    }
    Ok(bits)
}

//! Interactive driver: collects one cycle's fields, then generates keys,
//! exchanges the message, settles the reward and records the result.

use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};
use log::{debug, info};

use crate::blockchain::{
    Blockchain, JsonFileLedger, LedgerRecorder, TransactionLog, TransactionRecord,
};
use crate::config::Config;
use crate::messaging::keystore::normalize_party_name;
use crate::messaging::{
    CryptoError, Exchange, KeyPair, KeyPairProvider, KeyStore, MessageExchangeRecord,
    SecureMessenger,
};

/// Source of the values an operator types in for each cycle
pub trait FieldSource {
    /// Asks for free text
    fn text(&mut self, prompt: &str) -> io::Result<String>;

    /// Asks a yes/no question, an empty answer picks `default`
    fn confirm(&mut self, prompt: &str, default: bool) -> io::Result<bool>;
}

/// Line-oriented prompts over any reader/writer pair
pub struct StdinPrompt<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> StdinPrompt<R, W> {
    pub fn new(input: R, output: W) -> Self {
        StdinPrompt { input, output }
    }

    fn ask(&mut self, prompt: &str) -> io::Result<String> {
        write!(self.output, "{} ", prompt)?;
        self.output.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "input closed"));
        }
        Ok(line.trim().to_string())
    }
}

impl<R: BufRead, W: Write> FieldSource for StdinPrompt<R, W> {
    fn text(&mut self, prompt: &str) -> io::Result<String> {
        self.ask(prompt)
    }

    fn confirm(&mut self, prompt: &str, default: bool) -> io::Result<bool> {
        let hint = if default { "(Y/n)" } else { "(y/N)" };
        loop {
            let answer = self.ask(&format!("{} {}", prompt, hint))?;
            match answer.to_lowercase().as_str() {
                "" => return Ok(default),
                "y" | "yes" => return Ok(true),
                "n" | "no" => return Ok(false),
                _ => continue,
            }
        }
    }
}

/// Everything the operator supplies for one cycle
#[derive(Debug, Clone, PartialEq)]
pub struct CycleAnswers {
    pub sender: String,
    pub recipient: String,
    pub sign: bool,
    pub message: String,
    pub reward_address: String,
    pub reward_amount: f64,
    pub add_another: bool,
    pub commit: bool,
}

/// Asks for every field of a cycle, re-asking until the reward is positive
pub fn collect_answers<F: FieldSource + ?Sized>(fields: &mut F) -> io::Result<CycleAnswers> {
    let sender = fields.text("Enter sender name:")?;
    let recipient = fields.text("Enter recipient name:")?;
    let sign = fields.confirm("Do you want to sign the message?", true)?;
    let message = fields.text("Enter the message to send:")?;
    let reward_address = fields.text("Enter mining reward address:")?;
    let reward_amount = loop {
        let input = fields.text("Enter mining reward amount:")?;
        if let Some(amount) = parse_reward_amount(&input) {
            break amount;
        }
    };
    let add_another = fields.confirm("Do you want to add another block?", false)?;
    let commit = fields.confirm("Do you want to add this transaction to the blockchain?", true)?;

    Ok(CycleAnswers {
        sender,
        recipient,
        sign,
        message,
        reward_address,
        reward_amount,
        add_another,
        commit,
    })
}

/// Parses a strictly positive, finite reward amount
pub fn parse_reward_amount(input: &str) -> Option<f64> {
    input
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|amount| amount.is_finite() && *amount > 0.0)
}

/// What one completed cycle produced
#[derive(Debug, Clone, PartialEq)]
pub struct CycleOutcome {
    pub exchange: MessageExchangeRecord,
    pub settlement_block: u64,
    pub ledger_record: Option<TransactionRecord>,
}

/// One run of the driver, exclusive owner of the chain
pub struct Session<L> {
    chain: Blockchain,
    provider: KeyPairProvider,
    key_store: KeyStore,
    messenger: SecureMessenger,
    recorder: LedgerRecorder<L>,
}

impl Session<JsonFileLedger> {
    pub fn from_config(config: &Config) -> Result<Self, CryptoError> {
        Ok(Session::new(
            KeyPairProvider::new(config.key_bits)?,
            KeyStore::new(&config.keys_dir),
            LedgerRecorder::new(JsonFileLedger::new(&config.ledger_file)),
        ))
    }
}

impl<L: TransactionLog> Session<L> {
    pub fn new(provider: KeyPairProvider, key_store: KeyStore, recorder: LedgerRecorder<L>) -> Self {
        Session {
            chain: Blockchain::new(),
            provider,
            key_store,
            messenger: SecureMessenger::new(),
            recorder,
        }
    }

    pub fn chain(&self) -> &Blockchain {
        &self.chain
    }

    pub fn recorder(&self) -> &LedgerRecorder<L> {
        &self.recorder
    }

    /// Runs cycles until the operator declines another one
    ///
    /// The first failing cycle ends the run; blocks appended before the
    /// failure stay in the chain.
    ///
    /// # Returns
    ///
    /// The number of completed cycles
    pub async fn run<F: FieldSource + ?Sized>(&mut self, fields: &mut F) -> Result<usize> {
        let mut cycles = 0;

        loop {
            let answers = collect_answers(fields).context("failed to read cycle input")?;
            self.run_cycle(&answers).await?;
            cycles += 1;

            if !answers.add_another {
                break;
            }
        }

        info!(
            "Finished after {} cycle(s), chain holds {} blocks",
            cycles,
            self.chain.get_chain().len()
        );
        Ok(cycles)
    }

    /// Runs one key generation, exchange, settlement and record cycle
    pub async fn run_cycle(&mut self, answers: &CycleAnswers) -> Result<CycleOutcome> {
        let sender = normalize_party_name(&answers.sender)?;
        let recipient = normalize_party_name(&answers.recipient)?;

        info!("Generating keys for sender: {} and recipient: {}...", sender, recipient);
        let (sender_keys, recipient_keys) =
            tokio::try_join!(generate_key_pair(self.provider), generate_key_pair(self.provider))?;

        self.key_store
            .save_key_pair(&sender, &sender_keys)
            .with_context(|| format!("failed to save keys for {}", sender))?;
        self.key_store
            .save_key_pair(&recipient, &recipient_keys)
            .with_context(|| format!("failed to save keys for {}", recipient))?;

        info!("Sending and saving the message...");
        let previous_block_hash = self.chain.get_last_block()?.hash.clone();
        let exchange = Exchange {
            sender: &sender,
            recipient: &recipient,
            sender_keys: &sender_keys,
            recipient_keys: &recipient_keys,
            sign: answers.sign,
        };
        let record = self
            .messenger
            .send_and_record(&mut self.chain, &exchange, &answers.message)
            .context("message exchange failed")?;
        debug!("Encrypted message: {}", record.encrypted_message);

        let settlement_block = self
            .chain
            .process_pending_transactions_with_reward(&answers.reward_address, answers.reward_amount)?
            .index;

        let ledger_record = if answers.commit {
            let entry = self
                .recorder
                .record_exchange(&sender, &recipient, &record, &previous_block_hash)
                .context("failed to append to the ledger")?;
            Some(entry)
        } else {
            info!("Transaction not committed to the ledger");
            None
        };

        self.chain
            .verify_chain()
            .context("chain failed verification")?;
        info!("Chain verified at {} block(s)", self.chain.get_chain().len());

        Ok(CycleOutcome {
            exchange: record,
            settlement_block,
            ledger_record,
        })
    }
}

/// Generates a key pair off the async executor
async fn generate_key_pair(provider: KeyPairProvider) -> Result<KeyPair> {
    let pair = tokio::task::spawn_blocking(move || provider.generate_key_pair())
        .await
        .context("key generation task failed")??;
    Ok(pair)
}

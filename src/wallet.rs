use std::future::Future;
use std::time::Duration;

use serde::Deserialize;
use ticket_sdk::{Error, Result, Utxo};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

// ============================================================================
// Wallet collaborator
// ============================================================================

/// The connected wallet, as far as a purchase needs it.
///
/// Failures are reported as [`Error::WalletUnavailable`].
#[allow(async_fn_in_trait)]
pub trait WalletApi {
    async fn list_utxos(&self) -> Result<Vec<Utxo>>;

    async fn change_address(&self) -> Result<String>;

    /// UTxOs the wallet sets aside as collateral. Wallets without the
    /// concept return an empty list.
    async fn collateral(&self) -> Result<Vec<Utxo>>;

    /// Ask for signatures over `draft_hex`. With `partial` set the wallet
    /// signs what it can and leaves script witnesses to the draft.
    async fn sign_tx(&self, draft_hex: &str, partial: bool) -> Result<String>;

    async fn submit_tx(&self, signed_hex: &str) -> Result<String>;
}

// ============================================================================
// Discovery
// ============================================================================

/// How long to look for a wallet before giving up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(from = "RawPolicy")]
pub struct DiscoveryPolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for DiscoveryPolicy {
    fn default() -> Self {
        Self {
            attempts: 10,
            interval: Duration::from_millis(500),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawPolicy {
    attempts: u32,
    interval_ms: u64,
}

impl Default for RawPolicy {
    fn default() -> Self {
        let policy = DiscoveryPolicy::default();
        Self {
            attempts: policy.attempts,
            interval_ms: policy.interval.as_millis() as u64,
        }
    }
}

impl From<RawPolicy> for DiscoveryPolicy {
    fn from(raw: RawPolicy) -> Self {
        Self {
            attempts: raw.attempts,
            interval: Duration::from_millis(raw.interval_ms),
        }
    }
}

/// Poll `probe` until it yields a wallet handle or the attempts run out.
///
/// The probe only locates the wallet; nothing about a purchase depends on
/// how many polls it took.
pub async fn discover_wallet<W, F, Fut>(mut probe: F, policy: &DiscoveryPolicy) -> Option<W>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<W>>,
{
    for attempt in 1..=policy.attempts {
        if let Some(wallet) = probe().await {
            log::debug!("wallet found on attempt {attempt}");
            return Some(wallet);
        }
        if attempt < policy.attempts {
            tokio::time::sleep(policy.interval).await;
        }
    }
    log::warn!("no wallet after {} attempts", policy.attempts);
    None
}

// ============================================================================
// Line-based wallet
// ============================================================================

/// A wallet driven over a text stream: the draft is written out and the
/// signed witness hex is read back as one line. The CLI wires it to
/// stdout/stdin so any external signer can be used.
pub struct LineWallet<R, W> {
    utxos: Vec<Utxo>,
    change_address: String,
    io: Mutex<(R, W)>,
}

impl LineWallet<BufReader<tokio::io::Stdin>, tokio::io::Stdout> {
    pub fn stdio(utxos: Vec<Utxo>, change_address: impl Into<String>) -> Self {
        Self::new(
            utxos,
            change_address,
            BufReader::new(tokio::io::stdin()),
            tokio::io::stdout(),
        )
    }
}

impl<R, W> LineWallet<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(utxos: Vec<Utxo>, change_address: impl Into<String>, reader: R, writer: W) -> Self {
        Self {
            utxos,
            change_address: change_address.into(),
            io: Mutex::new((reader, writer)),
        }
    }

    async fn prompt(&self, text: &str) -> Result<String> {
        let mut io = self.io.lock().await;
        let (reader, writer) = &mut *io;
        writer
            .write_all(text.as_bytes())
            .await
            .map_err(|e| Error::WalletUnavailable(e.to_string()))?;
        writer
            .flush()
            .await
            .map_err(|e| Error::WalletUnavailable(e.to_string()))?;

        let mut line = String::new();
        let read = reader
            .read_line(&mut line)
            .await
            .map_err(|e| Error::WalletUnavailable(e.to_string()))?;
        if read == 0 {
            return Err(Error::WalletUnavailable("input closed before a reply".into()));
        }
        Ok(line.trim().to_string())
    }
}

impl<R, W> WalletApi for LineWallet<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    async fn list_utxos(&self) -> Result<Vec<Utxo>> {
        Ok(self.utxos.clone())
    }

    async fn change_address(&self) -> Result<String> {
        Ok(self.change_address.clone())
    }

    async fn collateral(&self) -> Result<Vec<Utxo>> {
        Ok(Vec::new())
    }

    async fn sign_tx(&self, draft_hex: &str, partial: bool) -> Result<String> {
        let mode = if partial { "partial" } else { "full" };
        self.prompt(&format!(
            "unsigned transaction ({mode} signing):\n{draft_hex}\npaste the wallet's signing result:\n"
        ))
        .await
    }

    async fn submit_tx(&self, _signed_hex: &str) -> Result<String> {
        Err(Error::WalletUnavailable(
            "a line wallet cannot broadcast transactions".into(),
        ))
    }
}

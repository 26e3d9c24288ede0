use bankfeed_core::SessionSettings;
use chrono::NaiveDate;
use secrecy::{ExposeSecret, Secret};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::client::{BankAccount, BankingClient, BankingInformation, ClientFactory, ClientResult, ProductInfo};
use crate::dialog::DialogStatus;

/// Credentials and endpoint of one bank contact.
pub struct SessionIdentity {
    pub url: String,
    pub bank_id: String,
    pub user_id: String,
    pin: Secret<String>,
}

impl SessionIdentity {
    pub fn new(url: &str, bank_id: &str, user_id: &str, pin: String) -> Self {
        Self {
            url: url.to_string(),
            bank_id: bank_id.to_string(),
            user_id: user_id.to_string(),
            pin: Secret::new(pin),
        }
    }

    pub fn pin(&self) -> &Secret<String> {
        &self.pin
    }

    /// Digest over every credential field, PIN included, and the product
    /// the client registers as.
    pub fn key(&self, product: &ProductInfo) -> SessionKey {
        let mut hasher = Sha256::new();
        for part in [
            self.url.as_str(),
            self.bank_id.as_str(),
            self.user_id.as_str(),
            self.pin.expose_secret().as_str(),
            product.id.as_str(),
            product.version.as_str(),
        ] {
            hasher.update(part.as_bytes());
            hasher.update([0u8]);
        }
        SessionKey(hex::encode(hasher.finalize()))
    }

    fn login(&self) -> Login {
        Login {
            url: self.url.clone(),
            bank_id: self.bank_id.clone(),
            user_id: self.user_id.clone(),
        }
    }
}

impl fmt::Debug for SessionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionIdentity")
            .field("url", &self.url)
            .field("bank_id", &self.bank_id)
            .field("user_id", &self.user_id)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey(String);

impl SessionKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Identity without the PIN; a new PIN for the same login replaces the session.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Login {
    url: String,
    bank_id: String,
    user_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Synchronizing,
    Synchronized,
    RequiresTan,
    Failed(DialogStatus),
}

/// The operation a TAN challenge interrupted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingOperation {
    Sync,
    AccountStatements {
        account_number: String,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    },
    CreditCardStatements {
        account_number: String,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTan {
    pub reference: String,
    pub operation: PendingOperation,
}

/// Dialog state for one identity.
pub struct BankSession {
    pub(crate) client: Box<dyn BankingClient>,
    pub(crate) state: SessionState,
    pub(crate) banking_information: Option<BankingInformation>,
    pub(crate) accounts: Vec<BankAccount>,
    pub(crate) pending_tan: Option<PendingTan>,
    /// Bank text of the 9910 answer that failed this session.
    pub(crate) pin_rejection: Option<String>,
}

impl BankSession {
    pub fn new(client: Box<dyn BankingClient>) -> Self {
        Self {
            client,
            state: SessionState::Uninitialized,
            banking_information: None,
            accounts: Vec::new(),
            pending_tan: None,
            pin_rejection: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn accounts(&self) -> &[BankAccount] {
        &self.accounts
    }

    pub fn pending_tan(&self) -> Option<&PendingTan> {
        self.pending_tan.as_ref()
    }

    pub fn find_account(&self, account_number: &str) -> Option<&BankAccount> {
        self.accounts
            .iter()
            .find(|a| a.account_number == account_number)
    }
}

pub type SharedSession = Arc<tokio::sync::Mutex<BankSession>>;

struct Entry {
    login: Login,
    session: SharedSession,
    last_used: Instant,
}

/// Process-wide cache of bank sessions keyed by credential identity.
///
/// Each session sits behind its own async lock, so two requests for the same
/// identity run one after the other while different identities proceed in
/// parallel. Entries are evicted when idle longer than the TTL, when the
/// store is full (least recently used first), and when the same login shows
/// up with different credentials.
pub struct SessionStore {
    capacity: usize,
    idle_ttl: Duration,
    entries: Mutex<HashMap<SessionKey, Entry>>,
}

impl SessionStore {
    pub fn new(settings: &SessionSettings) -> Self {
        Self {
            capacity: settings.capacity.max(1),
            idle_ttl: Duration::from_secs(settings.idle_ttl_secs),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the cached session for `identity`, or opens a new one.
    pub fn checkout(
        &self,
        identity: &SessionIdentity,
        factory: &dyn ClientFactory,
        product: &ProductInfo,
    ) -> ClientResult<SharedSession> {
        let key = identity.key(product);
        let login = identity.login();
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);

        let ttl = self.idle_ttl;
        entries.retain(|_, e| now.duration_since(e.last_used) < ttl || Arc::strong_count(&e.session) > 1);

        if let Some(entry) = entries.get_mut(&key) {
            entry.last_used = now;
            return Ok(Arc::clone(&entry.session));
        }

        let before = entries.len();
        entries.retain(|_, e| e.login != login);
        if entries.len() < before {
            debug!(url = %identity.url, user_id = %identity.user_id, "Credentials changed, dropped cached session");
        }

        while entries.len() >= self.capacity {
            let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, e)| e.last_used)
                .map(|(k, _)| k.clone())
            else {
                break;
            };
            entries.remove(&oldest);
        }

        let client = factory.create(identity, product)?;
        let session = Arc::new(tokio::sync::Mutex::new(BankSession::new(client)));
        entries.insert(
            key,
            Entry {
                login,
                session: Arc::clone(&session),
                last_used: now,
            },
        );
        Ok(session)
    }

    /// Drops the session of `identity`, if cached.
    pub fn evict(&self, identity: &SessionIdentity, product: &ProductInfo) -> bool {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(&identity.key(product)).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

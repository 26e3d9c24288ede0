pub mod client;
pub mod controller;
pub mod dialog;
pub mod mock;
pub mod session;
pub mod sync;

pub use client::{BankAnswer, BankReply, BankingClient, ClientError, ClientFactory, TanChallenge};
pub use controller::{BankSessionController, TanInput};
pub use dialog::{DialogPayload, DialogResult, DialogStatus, StatementDownload};
pub use session::{BankSession, SessionIdentity, SessionKey, SessionStore};
pub use sync::{BankSync, SyncError, SyncOutcome};

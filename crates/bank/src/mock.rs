//! Scripted in-memory bank, used in tests and for wiring checks without a
//! network connection.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::client::{
    AccountStatementsResponse, BankAccount, BankAnswer, BankReply, BankingClient, BankingInformation,
    ClientError, ClientFactory, ClientResult, CreditCardStatementsResponse, ProductInfo, SyncResponse,
    TanChallenge, TanMethod,
};
use crate::session::SessionIdentity;

#[derive(Default)]
struct Script {
    sync: VecDeque<ClientResult<SyncResponse>>,
    account_statements: VecDeque<ClientResult<AccountStatementsResponse>>,
    credit_card_statements: VecDeque<ClientResult<CreditCardStatementsResponse>>,
    account_statement_accounts: Vec<String>,
    credit_card_accounts: Vec<String>,
}

/// What the bank was asked to do.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MockCalls {
    pub clients_created: usize,
    pub synchronize: usize,
    pub tans: Vec<(String, String)>,
    pub selected_tan_methods: Vec<String>,
    pub statement_requests: Vec<String>,
}

/// Shared handle: clones see the same script and call log. Also acts as the
/// client factory.
#[derive(Clone, Default)]
pub struct MockBank {
    script: Arc<Mutex<Script>>,
    calls: Arc<Mutex<MockCalls>>,
}

impl MockBank {
    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn log(&self) -> MutexGuard<'_, MockCalls> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn calls(&self) -> MockCalls {
        self.log().clone()
    }

    pub fn push_sync(&self, response: ClientResult<SyncResponse>) {
        self.script().sync.push_back(response);
    }

    pub fn push_account_statements(&self, response: ClientResult<AccountStatementsResponse>) {
        self.script().account_statements.push_back(response);
    }

    pub fn push_credit_card_statements(&self, response: ClientResult<CreditCardStatementsResponse>) {
        self.script().credit_card_statements.push_back(response);
    }

    pub fn offer_account_statements(&self, account_number: &str) {
        self.script().account_statement_accounts.push(account_number.to_string());
    }

    pub fn offer_credit_card_statements(&self, account_number: &str) {
        self.script().credit_card_accounts.push(account_number.to_string());
    }

    fn next_sync(&self) -> ClientResult<SyncResponse> {
        self.script()
            .sync
            .pop_front()
            .unwrap_or_else(|| Err(ClientError::Connection("no scripted sync response".to_string())))
    }
}

impl ClientFactory for MockBank {
    fn create(&self, _identity: &SessionIdentity, _product: &ProductInfo) -> ClientResult<Box<dyn BankingClient>> {
        self.log().clients_created += 1;
        Ok(Box::new(MockClient { bank: self.clone() }))
    }
}

pub struct MockClient {
    bank: MockBank,
}

#[async_trait]
impl BankingClient for MockClient {
    async fn synchronize(&mut self) -> ClientResult<SyncResponse> {
        self.bank.log().synchronize += 1;
        self.bank.next_sync()
    }

    async fn synchronize_with_tan(&mut self, reference: &str, tan: &str) -> ClientResult<SyncResponse> {
        self.bank.log().tans.push((reference.to_string(), tan.to_string()));
        self.bank.next_sync()
    }

    async fn select_tan_method(&mut self, method_id: &str) -> ClientResult<()> {
        self.bank.log().selected_tan_methods.push(method_id.to_string());
        Ok(())
    }

    fn can_get_account_statements(&self, account: &BankAccount) -> bool {
        self.bank
            .script()
            .account_statement_accounts
            .contains(&account.account_number)
    }

    fn can_get_credit_card_statements(&self, account: &BankAccount) -> bool {
        self.bank.script().credit_card_accounts.contains(&account.account_number)
    }

    async fn get_account_statements(
        &mut self,
        account: &BankAccount,
        _from: Option<NaiveDate>,
        _to: Option<NaiveDate>,
    ) -> ClientResult<AccountStatementsResponse> {
        self.bank.log().statement_requests.push(account.account_number.clone());
        self.bank
            .script()
            .account_statements
            .pop_front()
            .unwrap_or_else(|| Err(ClientError::Connection("no scripted statements".to_string())))
    }

    async fn get_account_statements_with_tan(
        &mut self,
        reference: &str,
        tan: &str,
    ) -> ClientResult<AccountStatementsResponse> {
        self.bank.log().tans.push((reference.to_string(), tan.to_string()));
        self.bank
            .script()
            .account_statements
            .pop_front()
            .unwrap_or_else(|| Err(ClientError::Connection("no scripted statements".to_string())))
    }

    async fn get_credit_card_statements(
        &mut self,
        account: &BankAccount,
        _from: Option<NaiveDate>,
        _to: Option<NaiveDate>,
    ) -> ClientResult<CreditCardStatementsResponse> {
        self.bank.log().statement_requests.push(account.account_number.clone());
        self.bank
            .script()
            .credit_card_statements
            .pop_front()
            .unwrap_or_else(|| Err(ClientError::Connection("no scripted statements".to_string())))
    }

    async fn get_credit_card_statements_with_tan(
        &mut self,
        reference: &str,
        tan: &str,
    ) -> ClientResult<CreditCardStatementsResponse> {
        self.bank.log().tans.push((reference.to_string(), tan.to_string()));
        self.bank
            .script()
            .credit_card_statements
            .pop_front()
            .unwrap_or_else(|| Err(ClientError::Connection("no scripted statements".to_string())))
    }
}

/// Successful envelope with the usual "message received" answer.
pub fn reply_ok() -> BankReply {
    BankReply {
        success: true,
        answers: vec![BankAnswer::new("0010", "Nachricht entgegengenommen.")],
        tan: None,
    }
}

pub fn reply_failed(code: &str, text: &str) -> BankReply {
    BankReply {
        success: false,
        answers: vec![BankAnswer::new(code, text)],
        tan: None,
    }
}

pub fn reply_tan(reference: &str) -> BankReply {
    BankReply {
        success: true,
        answers: vec![BankAnswer::new("0030", "Auftrag empfangen - TAN erforderlich.")],
        tan: Some(TanChallenge {
            challenge: "Bitte TAN eingeben".to_string(),
            photo: None,
            media_name: Some("Mein Handy".to_string()),
            reference: reference.to_string(),
        }),
    }
}

/// Complete synchronization reporting the given account numbers.
pub fn sync_ok(account_numbers: &[&str]) -> SyncResponse {
    SyncResponse {
        reply: reply_ok(),
        banking_information: Some(BankingInformation {
            version: 1,
            bank_name: Some("Testbank".to_string()),
        }),
        banking_information_updated: true,
        tan_methods: vec![
            TanMethod {
                id: "921".to_string(),
                name: "pushTAN".to_string(),
            },
            TanMethod {
                id: "912".to_string(),
                name: "chipTAN".to_string(),
            },
        ],
        accounts: account_numbers
            .iter()
            .map(|n| BankAccount {
                account_number: n.to_string(),
                iban: None,
                name: None,
            })
            .collect(),
    }
}

pub fn sync_with(reply: BankReply) -> SyncResponse {
    SyncResponse {
        reply,
        ..sync_ok(&[])
    }
}

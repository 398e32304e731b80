//! Pre-flight credit check.
//!
//! The balance is fetched fresh on every check and never cached. The guard is
//! consulted once per task, right before the first mutating remote call.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::family::JobFamily;
use crate::remote::client::read_json;
use crate::remote::{RemoteError, TokenHolder};

/// Credits charged per job, by family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceTable {
    #[serde(default = "default_convert_price")]
    pub convert: i64,
    #[serde(default = "default_benchmark_price")]
    pub benchmark: i64,
    #[serde(default = "default_quantize_price")]
    pub quantize: i64,
}

fn default_convert_price() -> i64 {
    JobFamily::Convert.descriptor().default_price
}

fn default_benchmark_price() -> i64 {
    JobFamily::Benchmark.descriptor().default_price
}

fn default_quantize_price() -> i64 {
    JobFamily::Quantize.descriptor().default_price
}

impl Default for PriceTable {
    fn default() -> Self {
        Self {
            convert: default_convert_price(),
            benchmark: default_benchmark_price(),
            quantize: default_quantize_price(),
        }
    }
}

impl PriceTable {
    pub fn price_for(&self, family: JobFamily) -> i64 {
        match family {
            JobFamily::Convert => self.convert,
            JobFamily::Benchmark => self.benchmark,
            JobFamily::Quantize => self.quantize,
        }
    }
}

#[derive(Debug, Error)]
pub enum QuotaError {
    #[error("balance of {balance} credits is insufficient: one {family} job requires {required}")]
    InsufficientBalance {
        family: JobFamily,
        balance: i64,
        required: i64,
    },

    #[error("could not fetch account balance: {0}")]
    Balance(#[from] RemoteError),
}

/// Source of the current credit balance of an account.
#[async_trait]
pub trait BalanceSource: Send + Sync {
    async fn balance(&self, account_id: &str) -> Result<i64, RemoteError>;
}

#[derive(Clone)]
pub struct QuotaGuard {
    source: Arc<dyn BalanceSource>,
    prices: PriceTable,
}

impl QuotaGuard {
    pub fn new(source: Arc<dyn BalanceSource>, prices: PriceTable) -> Self {
        Self { source, prices }
    }

    pub fn prices(&self) -> &PriceTable {
        &self.prices
    }

    /// Returns the balance that was checked when it covers the family's price.
    pub async fn check(&self, account_id: &str, family: JobFamily) -> Result<i64, QuotaError> {
        let balance = self.source.balance(account_id).await?;
        let required = self.prices.price_for(family);
        if balance < required {
            tracing::warn!(account_id, %family, balance, required, "insufficient credit");
            return Err(QuotaError::InsufficientBalance {
                family,
                balance,
                required,
            });
        }
        tracing::debug!(account_id, %family, balance, required, "credit check passed");
        Ok(balance)
    }
}

#[derive(Debug, Deserialize)]
struct CreditResponse {
    total_credit: i64,
}

/// [`BalanceSource`] backed by the account service, sharing the job clients' token.
pub struct AccountClient {
    client: Client,
    base_url: String,
    tokens: Arc<TokenHolder>,
}

impl AccountClient {
    pub fn new(client: Client, base_url: impl Into<String>, tokens: Arc<TokenHolder>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            tokens,
        }
    }
}

#[async_trait]
impl BalanceSource for AccountClient {
    async fn balance(&self, account_id: &str) -> Result<i64, RemoteError> {
        let token = self.tokens.refresh_if_expired().await?;
        let url = format!(
            "{}/accounts/{account_id}/credit",
            self.base_url.trim_end_matches('/')
        );
        let response = self.client.get(url).bearer_auth(token).send().await?;
        let credit: CreditResponse = read_json(response).await?;
        Ok(credit.total_credit)
    }
}

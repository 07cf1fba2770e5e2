//! Fee selection and construction of the unsigned settlement transaction.

use std::sync::Arc;
use std::time::Duration;

use pintswap_types::{Address, U256};
use tracing::{debug, warn};

use crate::assembler::{assemble, SwapParams};
use crate::error::{ChainError, ChainResult};
use crate::provider::{CallRequest, ChainProvider};
use crate::tx::{Fees, UnsignedTransaction};

/// Gas added on top of the node's estimate.
pub const DEFAULT_GAS_HEADROOM: u64 = 26_000;

pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct BuilderConfig {
    pub gas_headroom: u64,
    /// Delay between gas estimation attempts.
    pub retry_delay: Duration,
    /// Pay the block producer directly from the contract instead of through
    /// the gas price. Only applies to offers with a native-currency side.
    pub pay_coinbase: bool,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            gas_headroom: DEFAULT_GAS_HEADROOM,
            retry_delay: DEFAULT_RETRY_DELAY,
            pay_coinbase: false,
        }
    }
}

/// An unsigned settlement transaction ready for threshold signing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedTransaction {
    pub tx: UnsignedTransaction,
    /// Amount the contract transfers to `block.coinbase`; set in rebate mode.
    pub pay_coinbase: Option<U256>,
    /// Native currency the shared address needs for gas. Zero in rebate mode,
    /// where funding is arranged outside the trade.
    pub funding: U256,
}

impl PreparedTransaction {
    pub fn is_rebate(&self) -> bool {
        self.tx.fees.is_rebate()
    }
}

pub struct TransactionBuilder {
    provider: Arc<dyn ChainProvider>,
    config: BuilderConfig,
}

impl TransactionBuilder {
    pub fn new(provider: Arc<dyn ChainProvider>, config: BuilderConfig) -> Self {
        Self { provider, config }
    }

    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    /// Estimate gas, retrying transient RPC failures until one succeeds.
    pub async fn estimate_gas(&self, request: &CallRequest) -> ChainResult<U256> {
        let mut attempt = 0u64;
        loop {
            attempt += 1;
            match self.provider.estimate_gas(request).await {
                Ok(gas) => return Ok(gas),
                Err(e) if e.is_transient() => {
                    warn!(attempt, error = %e, "gas estimation failed, retrying");
                    tokio::time::sleep(self.config.retry_delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Build the contract-creation transaction sent from `shared`.
    ///
    /// `params.pay_coinbase` is ignored; the builder decides it from
    /// configuration and the offer.
    pub async fn prepare(
        &self,
        params: &SwapParams,
        shared: Address,
    ) -> ChainResult<PreparedTransaction> {
        let native_leg = params.offer.gives_token.is_zero() || params.offer.gets_token.is_zero();
        let pay_coinbase = self.config.pay_coinbase && native_leg;

        let chain_id = self.provider.chain_id().await?;
        let nonce = self.provider.transaction_count(shared).await?;
        let gas_price = self.provider.gas_price().await?;

        let mut params = params.clone();
        // Placeholder amount during estimation; the final push is a few bytes
        // longer, which the headroom absorbs.
        params.pay_coinbase = pay_coinbase.then(U256::zero);
        let estimate = self
            .estimate_gas(&CallRequest {
                from: Some(shared),
                to: None,
                value: U256::zero(),
                data: assemble(&params)?,
            })
            .await?;
        let gas_limit = estimate
            .checked_add(U256::from(self.config.gas_headroom))
            .ok_or(ChainError::GasOverflow("gas estimate plus headroom"))?;
        let gas_cost = gas_price
            .checked_mul(gas_limit)
            .ok_or(ChainError::GasOverflow("gas price times gas limit"))?;

        let (fees, coinbase, funding) = if pay_coinbase {
            let base_fee = self.provider.base_fee().await?;
            (Fees::rebate(base_fee), Some(gas_cost), U256::zero())
        } else {
            (Fees::Legacy { gas_price }, None, gas_cost)
        };
        params.pay_coinbase = coinbase;

        let tx = UnsignedTransaction {
            chain_id,
            nonce,
            fees,
            gas_limit,
            to: None,
            value: U256::zero(),
            data: assemble(&params)?,
        };
        debug!(
            shared = ?shared,
            nonce,
            gas_limit = %gas_limit,
            rebate = fees.is_rebate(),
            "prepared settlement transaction"
        );
        Ok(PreparedTransaction {
            tx,
            pay_coinbase: coinbase,
            funding,
        })
    }
}

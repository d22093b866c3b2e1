//! Safety margins on gas quotes

use crate::chain::GasPrice;

use ethers::types::U256;

const GWEI: u64 = 1_000_000_000;

/// Pads `eth_estimateGas` results and fee quotes before a task transaction is signed
#[derive(Debug, Clone, Copy)]
pub struct GasEstimator {
    /// Percent added to the estimated gas limit
    limit_margin: u64,
    /// Percent added to every fee component
    fee_margin: u64,
    /// Ceiling for `maxFeePerGas` and the legacy gas price, in wei
    max_fee: U256,
}

impl GasEstimator {
    pub fn new(limit_margin_percent: u64, fee_margin_percent: u64, max_gas_price_gwei: u64) -> Self {
        Self {
            limit_margin: limit_margin_percent,
            fee_margin: fee_margin_percent,
            max_fee: U256::from(max_gas_price_gwei) * U256::from(GWEI),
        }
    }

    pub fn gas_limit(&self, estimate: U256) -> U256 {
        add_percent(estimate, self.limit_margin)
    }

    /// Padded fees, clamped to the ceiling after padding. The priority fee never
    /// exceeds the max fee.
    pub fn gas_price(&self, quote: GasPrice) -> GasPrice {
        match quote {
            GasPrice::Legacy(price) => {
                GasPrice::Legacy(add_percent(price, self.fee_margin).min(self.max_fee))
            }
            GasPrice::Eip1559 {
                max_fee_per_gas,
                max_priority_fee_per_gas,
            } => {
                let max_fee = add_percent(max_fee_per_gas, self.fee_margin).min(self.max_fee);
                let priority = add_percent(max_priority_fee_per_gas, self.fee_margin);
                GasPrice::Eip1559 {
                    max_fee_per_gas: max_fee,
                    max_priority_fee_per_gas: priority.min(max_fee),
                }
            }
        }
    }
}

impl Default for GasEstimator {
    fn default() -> Self {
        Self::new(20, 10, 500)
    }
}

fn add_percent(value: U256, percent: u64) -> U256 {
    value + value * percent / 100
}

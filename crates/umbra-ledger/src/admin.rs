//! Owner and official operations.

use tracing::info;
use umbra_types::{Address, Amount, PositionId};

use crate::config::validate_bps;
use crate::tx::Tx;
use crate::{LedgerError, Result};

impl Tx<'_> {
    pub(crate) fn initialize(&mut self, caller: Address) -> Result<()> {
        self.require_owner_role(&caller)?;
        if self.state.initialized {
            return Err(LedgerError::ContractAlreadyInitialized);
        }
        self.state.initialized = true;
        info!(owner = %caller, epoch = self.current_epoch(), "pool initialized");
        Ok(())
    }

    pub(crate) fn set_mining_proxy(&mut self, caller: Address, proxy: Address) -> Result<()> {
        self.require_owner_role(&caller)?;
        if proxy.is_zero() {
            return Err(LedgerError::InvalidMiningProxy);
        }
        self.state.mining_proxy = Some(proxy);
        info!(%proxy, "mining proxy set");
        Ok(())
    }

    /// Deposit by the mining proxy on behalf of `owner`; the proxy pays.
    pub(crate) fn open_via_proxy(
        &mut self,
        caller: Address,
        owner: Address,
        principal: Amount,
    ) -> Result<PositionId> {
        if self.state.mining_proxy != Some(caller) {
            return Err(LedgerError::InvalidMiningProxy);
        }
        self.open_position(caller, owner, principal)
    }

    pub(crate) fn update_risk_parameters(
        &mut self,
        caller: Address,
        max_insurable_bps: u32,
        initial_risk_bps: u32,
        risk_slope_bps: u32,
    ) -> Result<()> {
        self.require_owner_role(&caller)?;
        validate_bps(initial_risk_bps, "initial_risk_bps")?;
        validate_bps(risk_slope_bps, "risk_slope_bps")?;

        let config = &mut self.state.config;
        config.max_insurable_bps = max_insurable_bps;
        config.initial_risk_bps = initial_risk_bps;
        config.risk_slope_bps = risk_slope_bps;
        config.validate()?;

        info!(
            max_insurable_bps,
            initial_risk_bps, risk_slope_bps, "risk parameters updated"
        );
        Ok(())
    }

    pub(crate) fn set_standard_risk(&mut self, caller: Address, standard_risk: Amount) -> Result<()> {
        self.require_official(&caller)?;
        if standard_risk == 0 {
            return Err(LedgerError::InvalidParameter("standard_risk"));
        }
        self.state.standard_risk = standard_risk;
        info!(standard_risk, "standard risk set");
        Ok(())
    }
}

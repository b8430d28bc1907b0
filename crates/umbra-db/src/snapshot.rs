//! Pool snapshot storage.
//!
//! Positions, policies and epochs each get a table; the two epoch-indexed
//! sums share `epoch_index` (zero slots are not stored, their length is kept
//! in `pool_meta`); every remaining scalar lives in `pool_meta`.

use std::collections::BTreeMap;

use rusqlite::{params, Connection, Row, Transaction};
use umbra_epoch::accumulator::{EpochRecord, LiquidityTotals};
use umbra_ledger::{Policy, PolicyStatus, PoolConfig, PoolSnapshot, PoolState, Position};
use umbra_types::Address;

use crate::{decode_u128, decode_u64, encode_u128, encode_u64, meta, DbError, Result};

const LIVE_SHADOW: &str = "live_shadow";
const LOSSES: &str = "losses";

/// Replace the stored pool with `snapshot`, atomically.
pub fn save_snapshot(conn: &mut Connection, snapshot: &PoolSnapshot) -> Result<()> {
    let tx = conn.transaction()?;
    tx.execute_batch(
        "DELETE FROM epochs;
         DELETE FROM positions;
         DELETE FROM policies;
         DELETE FROM epoch_index;
         DELETE FROM pool_meta;",
    )?;

    write_meta(&tx, snapshot)?;
    write_epochs(&tx, &snapshot.epochs)?;
    write_positions(&tx, snapshot)?;
    write_policies(&tx, &snapshot.policies)?;
    write_index(&tx, LIVE_SHADOW, &snapshot.live_shadow)?;
    write_index(&tx, LOSSES, &snapshot.losses)?;

    tx.commit()?;
    tracing::debug!(
        epochs = snapshot.epochs.len(),
        positions = snapshot.positions.len(),
        policies = snapshot.policies.len(),
        "snapshot saved"
    );
    Ok(())
}

/// Load the stored pool, if any.
pub fn load_snapshot(conn: &Connection) -> Result<Option<PoolSnapshot>> {
    let config_json = match meta::get(conn, "config") {
        Ok(json) => json,
        Err(DbError::NotFound(_)) => return Ok(None),
        Err(e) => return Err(e),
    };
    let config: PoolConfig =
        serde_json::from_str(&config_json).map_err(|e| DbError::Serialization(e.to_string()))?;

    let (positions, owners) = read_positions(conn)?;
    let mining_proxy = match meta::get(conn, "mining_proxy")?.as_str() {
        "" => None,
        text => Some(parse_address(text)?),
    };

    Ok(Some(PoolSnapshot {
        config,
        epochs: read_epochs(conn)?,
        liquidity: LiquidityTotals {
            total: meta::get_u128(conn, "liquidity_total")?,
            earning: meta::get_u128(conn, "liquidity_earning")?,
            pending_entry: meta::get_u128(conn, "liquidity_pending_entry")?,
        },
        pending_premium: meta::get_u128(conn, "pending_premium")?,
        pending_sps: meta::get_u128(conn, "pending_sps")?,
        positions,
        owners,
        policies: read_policies(conn)?,
        live_shadow: read_index(conn, LIVE_SHADOW)?,
        losses: read_index(conn, LOSSES)?,
        next_position_id: meta::get_u64(conn, "next_position_id")?,
        next_policy_id: meta::get_u64(conn, "next_policy_id")?,
        total_liquidity_last_epoch: meta::get_u128(conn, "total_liquidity_last_epoch")?,
        k_last: meta::get_u128(conn, "k_last")?,
        locked_coverage: meta::get_u128(conn, "locked_coverage")?,
        standard_risk: meta::get_u128(conn, "standard_risk")?,
        initialized: meta::get_bool(conn, "initialized")?,
        mining_proxy,
    }))
}

/// Save a live pool state.
pub fn save_state(conn: &mut Connection, state: &PoolState) -> Result<()> {
    save_snapshot(conn, &state.snapshot())
}

/// Load and validate a pool state.
pub fn load_state(conn: &Connection) -> Result<Option<PoolState>> {
    match load_snapshot(conn)? {
        Some(snapshot) => Ok(Some(PoolState::restore(snapshot)?)),
        None => Ok(None),
    }
}

fn write_meta(tx: &Transaction<'_>, snapshot: &PoolSnapshot) -> Result<()> {
    let config =
        serde_json::to_string(&snapshot.config).map_err(|e| DbError::Serialization(e.to_string()))?;
    let proxy = snapshot
        .mining_proxy
        .map(|a| a.to_string())
        .unwrap_or_default();
    let live_shadow_len = index_len_key(LIVE_SHADOW);
    let losses_len = index_len_key(LOSSES);
    let entries = [
        ("config", config),
        ("liquidity_total", encode_u128(snapshot.liquidity.total)),
        ("liquidity_earning", encode_u128(snapshot.liquidity.earning)),
        (
            "liquidity_pending_entry",
            encode_u128(snapshot.liquidity.pending_entry),
        ),
        ("pending_premium", encode_u128(snapshot.pending_premium)),
        ("pending_sps", encode_u128(snapshot.pending_sps)),
        ("next_position_id", snapshot.next_position_id.to_string()),
        ("next_policy_id", snapshot.next_policy_id.to_string()),
        (
            "total_liquidity_last_epoch",
            encode_u128(snapshot.total_liquidity_last_epoch),
        ),
        ("k_last", encode_u128(snapshot.k_last)),
        ("locked_coverage", encode_u128(snapshot.locked_coverage)),
        ("standard_risk", encode_u128(snapshot.standard_risk)),
        ("initialized", snapshot.initialized.to_string()),
        ("mining_proxy", proxy),
        (live_shadow_len.as_str(), snapshot.live_shadow.len().to_string()),
        (losses_len.as_str(), snapshot.losses.len().to_string()),
    ];
    for (key, value) in &entries {
        meta::set(tx, key, value)?;
    }
    Ok(())
}

fn write_epochs(tx: &Transaction<'_>, epochs: &[EpochRecord]) -> Result<()> {
    let mut stmt = tx.prepare(
        "INSERT INTO epochs (epoch_id, timestamp, acc_rps, acc_sps, total_liquidity, earning_liquidity)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;
    for record in epochs {
        stmt.execute(params![
            encode_u64(record.epoch_id)?,
            encode_u64(record.timestamp)?,
            encode_u128(record.acc_rps),
            encode_u128(record.acc_sps),
            encode_u128(record.total_liquidity),
            encode_u128(record.earning_liquidity),
        ])?;
    }
    Ok(())
}

fn write_positions(tx: &Transaction<'_>, snapshot: &PoolSnapshot) -> Result<()> {
    let owners: BTreeMap<_, _> = snapshot.owners.iter().copied().collect();
    let mut stmt = tx.prepare(
        "INSERT INTO positions
            (id, owner, principal, entered_epoch, exited_epoch, reward_debt_epoch, is_valid, opened_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    )?;
    for position in &snapshot.positions {
        let owner = owners
            .get(&position.id)
            .ok_or_else(|| DbError::NotFound(format!("owner of position {}", position.id)))?;
        stmt.execute(params![
            encode_u64(position.id)?,
            owner.to_string(),
            encode_u128(position.principal),
            encode_u64(position.entered_epoch)?,
            encode_u64(position.exited_epoch)?,
            encode_u64(position.reward_debt_epoch)?,
            position.is_valid,
            encode_u64(position.opened_at)?,
        ])?;
    }
    Ok(())
}

fn write_policies(tx: &Transaction<'_>, policies: &[Policy]) -> Result<()> {
    let mut stmt = tx.prepare(
        "INSERT INTO policies
            (id, beneficiary, coverage, fee, settle_deposit, entered_epoch, duration_days,
             standard_risk, risk_level, sps, minted_at, status)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
    )?;
    for policy in policies {
        stmt.execute(params![
            encode_u64(policy.id)?,
            policy.beneficiary.to_string(),
            encode_u128(policy.coverage),
            encode_u128(policy.fee),
            encode_u128(policy.settle_deposit),
            encode_u64(policy.entered_epoch)?,
            policy.duration_days,
            encode_u128(policy.standard_risk),
            encode_u128(policy.risk_level),
            encode_u128(policy.sps),
            encode_u64(policy.minted_at)?,
            status_str(policy.status),
        ])?;
    }
    Ok(())
}

fn write_index(tx: &Transaction<'_>, kind: &str, values: &[u128]) -> Result<()> {
    let mut stmt = tx.prepare("INSERT INTO epoch_index (kind, epoch, value) VALUES (?1, ?2, ?3)")?;
    for (epoch, value) in values.iter().enumerate().filter(|(_, v)| **v != 0) {
        stmt.execute(params![kind, encode_u64(epoch as u64)?, encode_u128(*value)])?;
    }
    Ok(())
}

fn read_epochs(conn: &Connection) -> Result<Vec<EpochRecord>> {
    let mut stmt = conn.prepare(
        "SELECT epoch_id, timestamp, acc_rps, acc_sps, total_liquidity, earning_liquidity
         FROM epochs ORDER BY epoch_id",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, i64>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, String>(5)?,
        ))
    })?;
    let mut epochs = Vec::new();
    for row in rows {
        let (epoch_id, timestamp, acc_rps, acc_sps, total, earning) = row?;
        epochs.push(EpochRecord {
            epoch_id: decode_u64(epoch_id)?,
            timestamp: decode_u64(timestamp)?,
            acc_rps: decode_u128(&acc_rps)?,
            acc_sps: decode_u128(&acc_sps)?,
            total_liquidity: decode_u128(&total)?,
            earning_liquidity: decode_u128(&earning)?,
        });
    }
    Ok(epochs)
}

struct PositionRow {
    id: i64,
    owner: String,
    principal: String,
    entered_epoch: i64,
    exited_epoch: i64,
    reward_debt_epoch: i64,
    is_valid: bool,
    opened_at: i64,
}

impl PositionRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            owner: row.get(1)?,
            principal: row.get(2)?,
            entered_epoch: row.get(3)?,
            exited_epoch: row.get(4)?,
            reward_debt_epoch: row.get(5)?,
            is_valid: row.get(6)?,
            opened_at: row.get(7)?,
        })
    }
}

fn read_positions(conn: &Connection) -> Result<(Vec<Position>, Vec<(u64, Address)>)> {
    let mut stmt = conn.prepare(
        "SELECT id, owner, principal, entered_epoch, exited_epoch, reward_debt_epoch, is_valid, opened_at
         FROM positions ORDER BY id",
    )?;
    let rows = stmt.query_map([], PositionRow::from_row)?;
    let mut positions = Vec::new();
    let mut owners = Vec::new();
    for row in rows {
        let row = row?;
        let id = decode_u64(row.id)?;
        owners.push((id, parse_address(&row.owner)?));
        positions.push(Position {
            id,
            principal: decode_u128(&row.principal)?,
            entered_epoch: decode_u64(row.entered_epoch)?,
            exited_epoch: decode_u64(row.exited_epoch)?,
            reward_debt_epoch: decode_u64(row.reward_debt_epoch)?,
            is_valid: row.is_valid,
            opened_at: decode_u64(row.opened_at)?,
        });
    }
    Ok((positions, owners))
}

struct PolicyRow {
    id: i64,
    beneficiary: String,
    coverage: String,
    fee: String,
    settle_deposit: String,
    entered_epoch: i64,
    duration_days: u32,
    standard_risk: String,
    risk_level: String,
    sps: String,
    minted_at: i64,
    status: String,
}

impl PolicyRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            beneficiary: row.get(1)?,
            coverage: row.get(2)?,
            fee: row.get(3)?,
            settle_deposit: row.get(4)?,
            entered_epoch: row.get(5)?,
            duration_days: row.get(6)?,
            standard_risk: row.get(7)?,
            risk_level: row.get(8)?,
            sps: row.get(9)?,
            minted_at: row.get(10)?,
            status: row.get(11)?,
        })
    }

    fn into_policy(self) -> Result<Policy> {
        Ok(Policy {
            id: decode_u64(self.id)?,
            beneficiary: parse_address(&self.beneficiary)?,
            coverage: decode_u128(&self.coverage)?,
            fee: decode_u128(&self.fee)?,
            settle_deposit: decode_u128(&self.settle_deposit)?,
            entered_epoch: decode_u64(self.entered_epoch)?,
            duration_days: self.duration_days,
            standard_risk: decode_u128(&self.standard_risk)?,
            risk_level: decode_u128(&self.risk_level)?,
            sps: decode_u128(&self.sps)?,
            minted_at: decode_u64(self.minted_at)?,
            status: parse_status(&self.status)?,
        })
    }
}

fn read_policies(conn: &Connection) -> Result<Vec<Policy>> {
    let mut stmt = conn.prepare(
        "SELECT id, beneficiary, coverage, fee, settle_deposit, entered_epoch, duration_days,
                standard_risk, risk_level, sps, minted_at, status
         FROM policies ORDER BY id",
    )?;
    let rows = stmt.query_map([], PolicyRow::from_row)?;
    let mut policies = Vec::new();
    for row in rows {
        policies.push(row?.into_policy()?);
    }
    Ok(policies)
}

fn read_index(conn: &Connection, kind: &str) -> Result<Vec<u128>> {
    let len = meta::get_u64(conn, &index_len_key(kind))?;
    let len = usize::try_from(len).map_err(|_| DbError::Serialization(format!("{kind} length")))?;
    let mut values = vec![0u128; len];

    let mut stmt = conn.prepare("SELECT epoch, value FROM epoch_index WHERE kind = ?1")?;
    let rows = stmt.query_map([kind], |row| {
        Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
    })?;
    for row in rows {
        let (epoch, value) = row?;
        let slot = usize::try_from(decode_u64(epoch)?)
            .ok()
            .filter(|slot| *slot < len)
            .ok_or_else(|| DbError::Serialization(format!("{kind} epoch {epoch} out of range")))?;
        values[slot] = decode_u128(&value)?;
    }
    Ok(values)
}

fn index_len_key(kind: &str) -> String {
    format!("{kind}_len")
}

fn parse_address(text: &str) -> Result<Address> {
    text.parse()
        .map_err(|e| DbError::Serialization(format!("address {text:?}: {e}")))
}

fn status_str(status: PolicyStatus) -> &'static str {
    match status {
        PolicyStatus::Active => "active",
        PolicyStatus::ClaimApplying => "claim_applying",
        PolicyStatus::Claimed => "claimed",
        PolicyStatus::Settled => "settled",
        PolicyStatus::Cancelled => "cancelled",
    }
}

fn parse_status(text: &str) -> Result<PolicyStatus> {
    match text {
        "active" => Ok(PolicyStatus::Active),
        "claim_applying" => Ok(PolicyStatus::ClaimApplying),
        "claimed" => Ok(PolicyStatus::Claimed),
        "settled" => Ok(PolicyStatus::Settled),
        "cancelled" => Ok(PolicyStatus::Cancelled),
        other => Err(DbError::Serialization(format!("unknown policy status {other:?}"))),
    }
}

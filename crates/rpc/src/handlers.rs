//! Name service methods
//!
//! Mutating handlers ask the wallet for a transaction built against the
//! current pending pool and name index, then broadcast it. Query handlers
//! only read.

use crate::context::ServiceContext;
use crate::dispatcher::DispatchError;
use crate::params::{parse_address, parse_asset, ParamDescriptor, Preconditions, ValueType};
use crate::registry::{MethodDescriptor, MethodRegistry, RegistryError};
use namechain_core::{Address, Asset, NameClaim, RecordPayload, Transaction};
use namechain_name_index::validate_name;
use serde_json::Value;
use tracing::info;

fn invalid(method: &str, reason: impl Into<String>) -> DispatchError {
    DispatchError::InvalidParameters {
        method: method.to_string(),
        reason: reason.into(),
    }
}

fn name_arg<'v>(method: &str, args: &'v [Value]) -> Result<&'v str, DispatchError> {
    let name = args
        .first()
        .and_then(Value::as_str)
        .ok_or_else(|| invalid(method, "domain_name must be a string"))?;
    validate_name(name).map_err(|e| invalid(method, e.to_string()))?;
    Ok(name)
}

fn asset_arg(method: &str, args: &[Value], index: usize) -> Result<Asset, DispatchError> {
    args.get(index)
        .and_then(parse_asset)
        .ok_or_else(|| invalid(method, format!("argument {} must be an asset", index)))
}

fn address_arg(method: &str, args: &[Value], index: usize) -> Result<Address, DispatchError> {
    args.get(index)
        .and_then(parse_address)
        .ok_or_else(|| invalid(method, format!("argument {} must be an address", index)))
}

fn broadcast(
    ctx: &ServiceContext<'_>,
    operation: &'static str,
    name: &str,
    trx: Transaction,
) -> Result<Value, DispatchError> {
    ctx.broadcaster
        .broadcast_transaction(&trx)
        .map_err(|source| DispatchError::Broadcast { operation, source })?;

    info!(operation, name, trx_id = %trx.id(), "Transaction broadcast");
    Ok(Value::Bool(true))
}

/// `bid_on_domain(domain_name, amount) -> bool`
pub fn bid_on_domain(ctx: &ServiceContext<'_>, args: &[Value]) -> Result<Value, DispatchError> {
    const METHOD: &str = "bid_on_domain";
    let name = name_arg(METHOD, args)?;
    let amount = asset_arg(METHOD, args, 1)?;

    let trx = ctx
        .wallet
        .bid(name, amount, ctx.pending, ctx.names)
        .map_err(|e| DispatchError::wallet(METHOD, name, e))?;
    broadcast(ctx, METHOD, name, trx)
}

/// `auction_domain(domain_name, price) -> bool`
pub fn auction_domain(ctx: &ServiceContext<'_>, args: &[Value]) -> Result<Value, DispatchError> {
    const METHOD: &str = "auction_domain";
    let name = name_arg(METHOD, args)?;
    let price = asset_arg(METHOD, args, 1)?;

    let trx = ctx
        .wallet
        .ask(name, price, ctx.pending, ctx.names)
        .map_err(|e| DispatchError::wallet(METHOD, name, e))?;
    broadcast(ctx, METHOD, name, trx)
}

/// `transfer_domain(domain_name, to_address) -> bool`
pub fn transfer_domain(ctx: &ServiceContext<'_>, args: &[Value]) -> Result<Value, DispatchError> {
    const METHOD: &str = "transfer_domain";
    let name = name_arg(METHOD, args)?;
    let to = address_arg(METHOD, args, 1)?;

    let trx = ctx
        .wallet
        .transfer(name, &to, ctx.pending, ctx.names)
        .map_err(|e| DispatchError::wallet(METHOD, name, e))?;
    broadcast(ctx, METHOD, name, trx)
}

/// `update_domain_record(domain_name, value) -> bool`
pub fn update_domain_record(
    ctx: &ServiceContext<'_>,
    args: &[Value],
) -> Result<Value, DispatchError> {
    const METHOD: &str = "update_domain_record";
    let name = name_arg(METHOD, args)?;
    let value = args
        .get(1)
        .and_then(Value::as_str)
        .map(RecordPayload::new)
        .ok_or_else(|| invalid(METHOD, "value must be a string"))?;

    let trx = ctx
        .wallet
        .set_record(name, &value, ctx.pending, ctx.names)
        .map_err(|e| DispatchError::wallet(METHOD, name, e))?;
    broadcast(ctx, METHOD, name, trx)
}

/// `list_active_auctions() -> [[asset, name_claim], ...]`
pub fn list_active_auctions(
    ctx: &ServiceContext<'_>,
    _args: &[Value],
) -> Result<Value, DispatchError> {
    const METHOD: &str = "list_active_auctions";
    let outputs = ctx
        .wallet
        .active_auctions()
        .map_err(|source| DispatchError::Wallet {
            operation: METHOD,
            source,
        })?;

    let auctions: Vec<(Asset, &NameClaim)> = outputs
        .iter()
        .filter_map(|output| output.name_claim().map(|claim| (output.amount, claim)))
        .collect();

    Ok(serde_json::to_value(auctions)?)
}

/// `lookup_domain_record(domain_name) -> string`
pub fn lookup_domain_record(
    ctx: &ServiceContext<'_>,
    args: &[Value],
) -> Result<Value, DispatchError> {
    const METHOD: &str = "lookup_domain_record";
    let name = name_arg(METHOD, args)?;

    if !ctx.names.has_ref(name) {
        return Err(DispatchError::NotFound {
            name: name.to_string(),
        });
    }

    let record = ctx
        .wallet
        .lookup(name, ctx.pending, ctx.names)
        .map_err(|e| DispatchError::wallet(METHOD, name, e))?;
    Ok(Value::String(record.0))
}

/// Registry holding every name service method
///
/// Fails only if two descriptors share a name, which is a startup bug.
pub fn name_service_registry() -> Result<MethodRegistry, RegistryError> {
    use ParamDescriptor as P;

    let mut registry = MethodRegistry::new();

    registry.register(
        MethodDescriptor::new("bid_on_domain", bid_on_domain)
            .description("Place a bid for an unclaimed name at a particular price.")
            .param(P::required("domain_name", ValueType::String))
            .param(P::required("amount", ValueType::Asset))
            .returns(ValueType::Bool)
            .requires(Preconditions::WALLET_WRITE),
    )?;

    registry.register(
        MethodDescriptor::new("auction_domain", auction_domain)
            .description("Make your name available for bidding at a minimum price.")
            .param(P::required("domain_name", ValueType::String))
            .param(P::required("price", ValueType::Asset))
            .returns(ValueType::Bool)
            .requires(Preconditions::WALLET_WRITE),
    )?;

    registry.register(
        MethodDescriptor::new("transfer_domain", transfer_domain)
            .description("Send a name to an address.")
            .param(P::required("domain_name", ValueType::String))
            .param(P::required("to_address", ValueType::Address))
            .returns(ValueType::Bool)
            .requires(Preconditions::WALLET_WRITE),
    )?;

    registry.register(
        MethodDescriptor::new("update_domain_record", update_domain_record)
            .description("Replace the record attached to a name you own.")
            .param(P::required("domain_name", ValueType::String))
            .param(P::required("value", ValueType::String))
            .returns(ValueType::Bool)
            .requires(Preconditions::WALLET_WRITE),
    )?;

    registry.register(
        MethodDescriptor::new("list_active_auctions", list_active_auctions)
            .description("List names that are available for bidding.")
            .returns(ValueType::AuctionList)
            .requires(Preconditions::AUTHENTICATED),
    )?;

    registry.register(
        MethodDescriptor::new("lookup_domain_record", lookup_domain_record)
            .description("Get the raw record for a name.")
            .param(P::required("domain_name", ValueType::String))
            .returns(ValueType::String)
            .requires(Preconditions::AUTHENTICATED),
    )?;

    Ok(registry)
}

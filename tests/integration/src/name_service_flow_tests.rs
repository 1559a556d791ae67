//! Name service flows from dispatch through block application

use crate::test_utils::{temp_data_dir, LedgerWallet, Mempool};
use namechain_core::{Address, RecordPayload, ADDRESS_LEN};
use namechain_name_index::{IndexError, NameDb};
use namechain_rpc::{
    name_service_registry, CommandDispatcher, ErrorResponse, PreconditionFailure,
    ServiceContext, Session,
};
use serde_json::{json, Value};

const ALICE: Address = Address([0xA1; ADDRESS_LEN]);
const BOB: Address = Address([0xB0; ADDRESS_LEN]);

struct Node {
    dir: std::path::PathBuf,
    db: NameDb,
    mempool: Mempool,
    dispatcher: CommandDispatcher,
}

impl Node {
    fn new(label: &str) -> Self {
        let dir = temp_data_dir(label);
        Self {
            db: NameDb::open(&dir, true).unwrap(),
            dir,
            mempool: Mempool::default(),
            dispatcher: CommandDispatcher::new(name_service_registry().unwrap()),
        }
    }

    fn call(&self, wallet: &LedgerWallet, method: &str, args: &[Value]) -> Result<Value, ErrorResponse> {
        let ctx = ServiceContext::new(&self.db, wallet, &self.mempool);
        self.dispatcher
            .dispatch(&Session::authenticated(), &ctx, method, args)
            .map_err(|e| ErrorResponse::from(&e))
    }

    fn mine(&self) {
        self.mempool.mine(&self.db);
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        self.db.close().ok();
        std::fs::remove_dir_all(&self.dir).ok();
    }
}

#[test]
fn test_bid_then_lookup() {
    let node = Node::new("bid_lookup");
    let alice = LedgerWallet::new(ALICE);

    assert!(!node.db.has_ref("example"));
    assert_eq!(
        node.call(&alice, "bid_on_domain", &[json!("example"), json!(500)]),
        Ok(json!(true))
    );

    // Nothing is indexed until the transaction is in a block
    assert!(!node.db.has_ref("example"));
    assert_eq!(node.mempool.len(), 1);
    node.mine();
    assert!(node.mempool.is_empty());
    assert!(node.db.has_ref("example"));

    assert_eq!(
        node.call(&alice, "lookup_domain_record", &[json!("example")]),
        Ok(json!(""))
    );

    let claim = node.db.resolve_record("example").unwrap();
    assert_eq!(claim.amount.amount, 500);
    assert_eq!(claim.name_claim().unwrap().owner, ALICE);
}

#[test]
fn test_update_record_then_transfer() {
    let node = Node::new("update_transfer");
    let alice = LedgerWallet::new(ALICE);
    let bob = LedgerWallet::new(BOB);

    node.call(&alice, "bid_on_domain", &[json!("site"), json!(10)])
        .unwrap();
    node.mine();

    node.call(&alice, "update_domain_record", &[json!("site"), json!("v=spf1")])
        .unwrap();
    node.mine();
    assert_eq!(
        node.call(&bob, "lookup_domain_record", &[json!("site")]),
        Ok(json!("v=spf1"))
    );

    // Only the owner may touch the record
    let err = node
        .call(&bob, "update_domain_record", &[json!("site"), json!("hijack")])
        .unwrap_err();
    assert_eq!(err.kind, "wallet_error");
    assert!(node.mempool.is_empty());

    node.call(&alice, "transfer_domain", &[json!("site"), json!(BOB.to_hex())])
        .unwrap();
    node.mine();

    let output = node.db.resolve_record("site").unwrap();
    let claim = output.name_claim().unwrap();
    assert_eq!(claim.owner, BOB);
    assert_eq!(claim.record, RecordPayload::new("v=spf1"));
    assert_eq!(output.amount.amount, 10);

    node.call(&bob, "update_domain_record", &[json!("site"), json!("moved")])
        .unwrap();
    node.mine();
    assert_eq!(
        node.call(&alice, "lookup_domain_record", &[json!("site")]),
        Ok(json!("moved"))
    );
}

#[test]
fn test_auction_listing() {
    let node = Node::new("auction");
    let alice = LedgerWallet::new(ALICE);

    node.call(&alice, "bid_on_domain", &[json!("forsale"), json!(1)])
        .unwrap();
    node.mine();

    assert_eq!(node.call(&alice, "list_active_auctions", &[]), Ok(json!([])));

    node.call(
        &alice,
        "auction_domain",
        &[json!("forsale"), json!({"amount": 900})],
    )
    .unwrap();
    node.mine();

    let listed = node.call(&alice, "list_active_auctions", &[]).unwrap();
    assert_eq!(listed[0][0]["amount"], json!(900));
    assert_eq!(listed[0][1]["name"], json!("forsale"));
    assert_eq!(node.db.resolve_record("forsale").unwrap().amount.amount, 900);
}

#[test]
fn test_locked_wallet_leaves_no_trace() {
    let node = Node::new("locked");
    let alice = LedgerWallet::new(ALICE);
    alice.lock();

    let err = node
        .call(&alice, "bid_on_domain", &[json!("example"), json!(5)])
        .unwrap_err();
    assert_eq!(err.kind, "wallet_locked");
    assert!(node.mempool.is_empty());

    alice.unlock();
    node.call(&alice, "bid_on_domain", &[json!("example"), json!(5)])
        .unwrap();
    assert_eq!(node.mempool.len(), 1);
}

#[test]
fn test_rejections_reach_caller_as_error_response() {
    let node = Node::new("rejections");
    let alice = LedgerWallet::new(ALICE);

    let err = node.call(&alice, "unknown_method", &[]).unwrap_err();
    assert_eq!(err.kind, "unknown_method");

    let err = node
        .call(&alice, "lookup_domain_record", &[json!("nobody")])
        .unwrap_err();
    assert_eq!(err.kind, "not_found");

    let err = node
        .call(&alice, "bid_on_domain", &[json!("example")])
        .unwrap_err();
    assert_eq!(err.kind, "invalid_parameters");

    let ctx = ServiceContext::new(&node.db, &alice, &node.mempool);
    let err = node
        .dispatcher
        .dispatch(&Session::anonymous(), &ctx, "list_active_auctions", &[])
        .unwrap_err();
    assert_eq!(
        err.precondition(),
        Some(PreconditionFailure::AuthenticationRequired)
    );

    assert_eq!(node.dispatcher.metrics().rejected_total, 3);
    assert_eq!(node.dispatcher.metrics().failed_total, 1);
}

#[test]
fn test_index_survives_reopen_and_reports_claim_age() {
    let dir = temp_data_dir("reopen");
    let alice = LedgerWallet::new(ALICE);
    let mempool = Mempool::default();
    let dispatcher = CommandDispatcher::new(name_service_registry().unwrap());

    {
        let db = NameDb::open(&dir, true).unwrap();
        let ctx = ServiceContext::new(&db, &alice, &mempool);
        dispatcher
            .dispatch(
                &Session::authenticated(),
                &ctx,
                "bid_on_domain",
                &[json!("durable"), json!(3)],
            )
            .unwrap();
        mempool.mine(&db);
        for _ in 0..4 {
            mempool.mine(&db);
        }
        db.close().unwrap();

        assert!(matches!(db.get_ref("durable"), Err(IndexError::Closed)));
    }

    let db = NameDb::open(&dir, false).unwrap();
    let reference = db.get_ref("durable").unwrap();
    assert_eq!(db.head_height().unwrap(), 5);
    assert_eq!(db.claim_age(&reference).unwrap(), 4);

    let entries = db.scan(|name, _, _| name.starts_with('d')).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries["durable"], reference);

    db.close().unwrap();
    std::fs::remove_dir_all(dir).ok();
}

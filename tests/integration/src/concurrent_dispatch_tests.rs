//! Read dispatch running alongside block application

use crate::test_utils::{current_timestamp_ms, temp_data_dir, LedgerWallet, Mempool};
use namechain_core::{
    Address, Asset, Block, NameClaim, Output, OutputReference, RecordPayload, Transaction, TxId,
    ADDRESS_LEN, HASH_LEN,
};
use namechain_name_index::NameDb;
use namechain_rpc::{name_service_registry, CommandDispatcher, ServiceContext, Session};
use serde_json::json;
use std::sync::Arc;

const OWNER: Address = Address([0x0C; ADDRESS_LEN]);
const BLOCKS: u32 = 25;

fn claim_block(previous: Option<&Block>, height: u32) -> Block {
    let claim = NameClaim {
        name: format!("name-{:03}", height),
        owner: OWNER,
        record: RecordPayload::new(format!("record-{}", height)),
    };
    let trx = Transaction::new(
        vec![OutputReference::new(TxId([0xCC; HASH_LEN]), height)],
        vec![Output::claim_name(claim, Asset::new(height as u64))],
    );

    match previous {
        Some(block) => block.child(current_timestamp_ms(), vec![trx]),
        None => Block::first(current_timestamp_ms(), vec![trx]),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_lookups_consistent_while_blocks_apply() {
    let dir = temp_data_dir("concurrent");
    let db = Arc::new(NameDb::open(&dir, true).unwrap());
    let dispatcher = Arc::new(CommandDispatcher::new(name_service_registry().unwrap()));
    let wallet = Arc::new(LedgerWallet::new(OWNER));
    let mempool = Arc::new(Mempool::default());

    let writer = {
        let db = db.clone();
        tokio::task::spawn_blocking(move || {
            let mut previous: Option<Block> = None;
            for height in 1..=BLOCKS {
                let block = claim_block(previous.as_ref(), height);
                db.apply_block(&block, &[]).unwrap();
                previous = Some(block);
            }
        })
    };

    let mut readers = Vec::new();
    for _ in 0..4 {
        let (db, dispatcher, wallet, mempool) =
            (db.clone(), dispatcher.clone(), wallet.clone(), mempool.clone());

        readers.push(tokio::task::spawn_blocking(move || {
            let ctx = ServiceContext::new(&*db, &*wallet, &*mempool);
            let session = Session::authenticated();

            for _ in 0..BLOCKS {
                // Whatever the index already holds must resolve through dispatch
                for name in db.scan(|_, _, _| true).unwrap().keys() {
                    let record = dispatcher
                        .dispatch(&session, &ctx, "lookup_domain_record", &[json!(name)])
                        .unwrap();
                    let height = name.trim_start_matches("name-").parse::<u32>().unwrap();
                    assert_eq!(record, json!(format!("record-{}", height)));
                }
            }
        }));
    }

    writer.await.unwrap();
    for reader in readers {
        reader.await.unwrap();
    }

    assert_eq!(db.head_height().unwrap(), BLOCKS);
    assert_eq!(db.index().len().unwrap(), BLOCKS as usize);
    assert_eq!(dispatcher.metrics().rejected_total, 0);
    assert!(mempool.is_empty());

    db.close().unwrap();
    std::fs::remove_dir_all(dir).ok();
}

#[tokio::test]
async fn test_mutations_serialize_through_wallet() {
    let dir = temp_data_dir("mutations");
    let db = Arc::new(NameDb::open(&dir, true).unwrap());
    let dispatcher = Arc::new(CommandDispatcher::new(name_service_registry().unwrap()));
    let wallet = Arc::new(LedgerWallet::new(OWNER));
    let mempool = Arc::new(Mempool::default());

    let mut tasks = Vec::new();
    for i in 0..8 {
        let (db, dispatcher, wallet, mempool) =
            (db.clone(), dispatcher.clone(), wallet.clone(), mempool.clone());
        tasks.push(tokio::task::spawn_blocking(move || {
            let ctx = ServiceContext::new(&*db, &*wallet, &*mempool);
            dispatcher
                .dispatch(
                    &Session::authenticated(),
                    &ctx,
                    "bid_on_domain",
                    &[json!(format!("bid-{}", i)), json!(i)],
                )
                .unwrap()
        }));
    }
    for task in tasks {
        assert_eq!(task.await.unwrap(), json!(true));
    }

    // Each bid drew a distinct funding input, so one block carries all eight
    assert_eq!(mempool.len(), 8);
    mempool.mine(&db);
    assert_eq!(db.index().len().unwrap(), 8);

    db.close().unwrap();
    std::fs::remove_dir_all(dir).ok();
}

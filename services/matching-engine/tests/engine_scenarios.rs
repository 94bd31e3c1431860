//! End-to-end matching scenarios over the in-memory store.

use std::sync::Arc;

use matching_engine::{
    BookStore, BroadcastPublisher, Matcher, MemoryBookStore, MemoryQueue, WorkerPool,
};
use types::events::{EngineMessage, EngineResponse};
use types::numeric::{Price, TokenAmount};
use types::order::{Order, OrderCancel, OrderStatus, Side};
use types::pair::{Token, TokenPair};
use types::primitives::Address;

fn pair() -> TokenPair {
    TokenPair::new(
        Token::new(
            Address::from_hex("0x2034842261b82651885751fc293bba7ba5398156").unwrap(),
            "WETH",
            18,
        ),
        Token::new(
            Address::from_hex("0x67b95b2e1c7e9a2c6fe3486acb01d1a454dfc8b3").unwrap(),
            "DAI",
            18,
        ),
    )
}

/// Build a signed-shape order: `base` units at integer price `price`.
fn order(side: Side, base: u64, price: u64, nonce: u64) -> Order {
    Order::limit(
        &pair(),
        Address::from_hex("0xe8e84ee367bc63ddb38d3d01bccef106c194dc47").unwrap(),
        Address::from_hex("0xae55690d4b079460e6ac28aaa58c9ec7b73a7485").unwrap(),
        side,
        TokenAmount::from_u64(base),
        TokenAmount::from_u64(base * price),
        nonce,
        4_102_444_800,
    )
    .unwrap()
}

fn matcher() -> Matcher<MemoryBookStore> {
    Matcher::new(Arc::new(MemoryBookStore::new()))
}

#[tokio::test]
async fn scenario_resting_bid() {
    let matcher = matcher();
    let bid = order(Side::Buy, 10, 100, 1);
    let hash = bid.hash;

    let response = matcher
        .process(EngineMessage::NewOrder(bid))
        .await
        .unwrap();

    match response {
        EngineResponse::OrderAdded { order } => {
            assert_eq!(order.hash, hash);
            assert_eq!(order.status, OrderStatus::Open);
        }
        other => panic!("expected ORDER_ADDED, got {:?}", other),
    }

    let store = matcher.store();
    assert_eq!(
        store.head("WETH/DAI", Side::Buy).await.unwrap(),
        Some(Price::from_u64(100))
    );
    let depth = store.depth("WETH/DAI", 10).await.unwrap();
    assert_eq!(depth.bids.len(), 1);
    assert_eq!(depth.bids[0].amount, TokenAmount::from_u64(10));
}

#[tokio::test]
async fn scenario_immediate_full_match() {
    let matcher = matcher();
    let bid = order(Side::Buy, 10, 100, 1);
    let bid_hash = bid.hash;
    matcher.process(EngineMessage::NewOrder(bid)).await.unwrap();

    let ask = order(Side::Sell, 10, 100, 2);
    let ask_hash = ask.hash;
    let response = matcher.process(EngineMessage::NewOrder(ask)).await.unwrap();

    match response {
        EngineResponse::OrderFilled { order, matches } => {
            assert_eq!(order.hash, ask_hash);
            assert_eq!(matches.len(), 1);
            let trade = &matches[0].trade;
            assert_eq!(trade.amount, TokenAmount::from_u64(10));
            assert_eq!(trade.price, Price::from_u64(100));
            assert_eq!(trade.maker_order_hash, bid_hash);
        }
        other => panic!("expected ORDER_FILLED, got {:?}", other),
    }

    let store = matcher.store();
    assert_eq!(store.head("WETH/DAI", Side::Buy).await.unwrap(), None);

    let maker = store.get_order(&bid_hash).await.unwrap().unwrap();
    let taker = store.get_order(&ask_hash).await.unwrap().unwrap();
    assert_eq!(maker.status, OrderStatus::Filled);
    assert_eq!(taker.status, OrderStatus::Filled);
}

#[tokio::test]
async fn scenario_partial_fill_remainder_rests_on_taker_side() {
    let matcher = matcher();
    matcher
        .process(EngineMessage::NewOrder(order(Side::Buy, 10, 100, 1)))
        .await
        .unwrap();

    let ask = order(Side::Sell, 15, 99, 2);
    let response = matcher.process(EngineMessage::NewOrder(ask)).await.unwrap();

    match response {
        EngineResponse::OrderPartiallyFilled { order, matches } => {
            assert_eq!(matches.len(), 1);
            assert_eq!(matches[0].trade.amount, TokenAmount::from_u64(10));
            assert_eq!(matches[0].trade.price, Price::from_u64(100));
            assert_eq!(order.unfilled(), TokenAmount::from_u64(5));
            assert_eq!(order.status, OrderStatus::PartialFilled);
        }
        other => panic!("expected ORDER_PARTIALLY_FILLED, got {:?}", other),
    }

    let store = matcher.store();
    assert_eq!(
        store.head("WETH/DAI", Side::Sell).await.unwrap(),
        Some(Price::from_u64(99))
    );
    let depth = store.depth("WETH/DAI", 10).await.unwrap();
    assert_eq!(depth.asks[0].amount, TokenAmount::from_u64(5));
    assert!(depth.bids.is_empty());
}

#[tokio::test]
async fn scenario_price_time_priority() {
    let matcher = matcher();
    let first = order(Side::Buy, 5, 100, 1);
    let second = order(Side::Buy, 5, 100, 2);
    let first_hash = first.hash;
    let second_hash = second.hash;

    matcher.process(EngineMessage::NewOrder(first)).await.unwrap();
    matcher.process(EngineMessage::NewOrder(second)).await.unwrap();

    let response = matcher
        .process(EngineMessage::NewOrder(order(Side::Sell, 5, 100, 3)))
        .await
        .unwrap();

    match response {
        EngineResponse::OrderFilled { matches, .. } => {
            assert_eq!(matches.len(), 1);
            assert_eq!(matches[0].trade.maker_order_hash, first_hash);
        }
        other => panic!("expected ORDER_FILLED, got {:?}", other),
    }

    let store = matcher.store();
    let remaining = store.get_order(&second_hash).await.unwrap().unwrap();
    assert_eq!(remaining.status, OrderStatus::Open);
    assert_eq!(
        store.head("WETH/DAI", Side::Buy).await.unwrap(),
        Some(Price::from_u64(100))
    );
}

#[tokio::test]
async fn scenario_cancel_then_cancel_again() {
    let matcher = matcher();
    let bid = order(Side::Buy, 10, 100, 1);
    let hash = bid.hash;
    let pair_name = bid.pair_name.clone();
    matcher.process(EngineMessage::NewOrder(bid)).await.unwrap();

    let cancel = OrderCancel::new(hash, &pair_name);
    let response = matcher
        .process(EngineMessage::CancelOrder(cancel.clone()))
        .await
        .unwrap();
    match response {
        EngineResponse::OrderCancelled { order } => {
            assert_eq!(order.status, OrderStatus::Cancelled);
        }
        other => panic!("expected ORDER_CANCELLED, got {:?}", other),
    }

    let store = matcher.store();
    assert_eq!(store.head("WETH/DAI", Side::Buy).await.unwrap(), None);
    assert!(store.depth("WETH/DAI", 10).await.unwrap().bids.is_empty());

    // A second cancel is an engine-logical error, state unchanged
    let response = matcher
        .process(EngineMessage::CancelOrder(cancel))
        .await
        .unwrap();
    assert!(matches!(response, EngineResponse::Error { .. }));
}

#[tokio::test]
async fn scenario_settlement_recovery() {
    let matcher = matcher();
    let bid = order(Side::Buy, 10, 100, 1);
    let bid_hash = bid.hash;
    matcher.process(EngineMessage::NewOrder(bid)).await.unwrap();

    let ask = order(Side::Sell, 10, 100, 2);
    let ask_hash = ask.hash;
    let response = matcher.process(EngineMessage::NewOrder(ask)).await.unwrap();
    let trade = match response {
        EngineResponse::OrderFilled { matches, .. } => matches[0].trade.clone(),
        other => panic!("expected ORDER_FILLED, got {:?}", other),
    };

    // Taker never signed: the service enqueues TRADE_CANCELLED
    let response = matcher
        .process(EngineMessage::TradeCancelled(trade.clone()))
        .await
        .unwrap();

    match &response {
        EngineResponse::TradesCancelled { trades, orders } => {
            assert_eq!(trades.len(), 1);
            assert_eq!(trades[0].status, types::trade::TradeStatus::Error);
            assert_eq!(orders.len(), 2);
        }
        other => panic!("expected TRADES_CANCELLED, got {:?}", other),
    }

    let store = matcher.store();
    let maker = store.get_order(&bid_hash).await.unwrap().unwrap();
    assert_eq!(maker.status, OrderStatus::Open);
    assert!(maker.filled_amount.is_zero());
    assert_eq!(
        store.head("WETH/DAI", Side::Buy).await.unwrap(),
        Some(Price::from_u64(100))
    );

    // Taker is not re-added to the book
    let taker = store.get_order(&ask_hash).await.unwrap().unwrap();
    assert_eq!(taker.status, OrderStatus::Cancelled);
    assert!(store.depth("WETH/DAI", 10).await.unwrap().asks.is_empty());

    // Replay is a no-op
    let replay = matcher
        .process(EngineMessage::TradeCancelled(trade))
        .await
        .unwrap();
    match replay {
        EngineResponse::TradesCancelled { trades, orders } => {
            assert!(trades.is_empty());
            assert!(orders.is_empty());
        }
        other => panic!("expected empty TRADES_CANCELLED, got {:?}", other),
    }
    let maker = store.get_order(&bid_hash).await.unwrap().unwrap();
    assert!(maker.filled_amount.is_zero());
}

#[tokio::test]
async fn taker_walks_levels_at_maker_prices() {
    let matcher = matcher();
    matcher
        .process(EngineMessage::NewOrder(order(Side::Sell, 5, 99, 1)))
        .await
        .unwrap();
    matcher
        .process(EngineMessage::NewOrder(order(Side::Sell, 5, 100, 2)))
        .await
        .unwrap();

    let response = matcher
        .process(EngineMessage::NewOrder(order(Side::Buy, 10, 100, 3)))
        .await
        .unwrap();

    match response {
        EngineResponse::OrderFilled { matches, .. } => {
            assert_eq!(matches.len(), 2);
            // Better price first, each trade at the maker's price
            assert_eq!(matches[0].trade.price, Price::from_u64(99));
            assert_eq!(matches[1].trade.price, Price::from_u64(100));
        }
        other => panic!("expected ORDER_FILLED, got {:?}", other),
    }
}

#[tokio::test]
async fn conservation_across_multi_maker_fill() {
    let matcher = matcher();
    for nonce in 1..=3 {
        matcher
            .process(EngineMessage::NewOrder(order(Side::Sell, 4, 100, nonce)))
            .await
            .unwrap();
    }

    let taker = order(Side::Buy, 10, 100, 9);
    let taker_hash = taker.hash;
    let response = matcher.process(EngineMessage::NewOrder(taker)).await.unwrap();

    match response {
        EngineResponse::OrderFilled { order, matches } => {
            let total: u64 = 10;
            let mut sum = TokenAmount::zero();
            for m in &matches {
                sum = sum + m.trade.amount;
            }
            assert_eq!(sum, TokenAmount::from_u64(total));
            assert_eq!(order.filled_amount, sum);
        }
        other => panic!("expected ORDER_FILLED, got {:?}", other),
    }

    // The third maker keeps the remainder: 4 + 4 + 2 = 10
    let store = matcher.store();
    let depth = store.depth("WETH/DAI", 10).await.unwrap();
    assert_eq!(depth.asks[0].amount, TokenAmount::from_u64(2));
    let taker = store.get_order(&taker_hash).await.unwrap().unwrap();
    assert_eq!(taker.status, OrderStatus::Filled);
}

#[tokio::test]
async fn cancel_of_unknown_order_is_error() {
    let matcher = matcher();
    let cancel = OrderCancel::new(types::primitives::keccak256(&[b"missing"]), "WETH/DAI");
    let response = matcher
        .process(EngineMessage::CancelOrder(cancel))
        .await
        .unwrap();
    assert!(matches!(response, EngineResponse::Error { .. }));
}

#[tokio::test]
async fn worker_pool_preserves_per_pair_input_order() {
    let store = Arc::new(MemoryBookStore::new());
    let matcher = Arc::new(Matcher::new(store));
    let publisher = Arc::new(BroadcastPublisher::new(64));
    let mut responses = publisher.subscribe();

    let (producer, consumer) = MemoryQueue::channel();
    let pool = WorkerPool::new(matcher, publisher, 4);
    let pool_handle = tokio::spawn(pool.run(consumer));

    use matching_engine::QueueProducer;
    producer
        .push(&EngineMessage::NewOrder(order(Side::Buy, 10, 100, 1)))
        .await
        .unwrap();
    producer
        .push(&EngineMessage::NewOrder(order(Side::Sell, 10, 100, 2)))
        .await
        .unwrap();
    drop(producer);
    pool_handle.await.unwrap().unwrap();

    let first = responses.recv().await.unwrap();
    let second = responses.recv().await.unwrap();
    assert!(matches!(first, EngineResponse::OrderAdded { .. }));
    assert!(matches!(second, EngineResponse::OrderFilled { .. }));
}

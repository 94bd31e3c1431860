use std::sync::Arc;
use std::time::Duration;

use matching_engine::{
    BookStore, Matcher, QueueProducer, RedisBookStore, RedisPublisher, RedisQueue, WorkerPool,
};
use tokio::net::TcpListener;

use types::numeric::TokenAmount;
use types::pair::{Token, TokenPair};
use types::primitives::Address;

use gateway::bus::EngineResponseBus;
use gateway::hub::SubscriptionHub;
use gateway::router::create_router;
use gateway::services::{OhlcvService, OrderBookService, OrderService};
use gateway::settlement::{HttpSettlementClient, MockSettlementClient, SettlementClient};
use gateway::store::{
    AccountDao, MemoryAccountDao, MemoryOrderDao, MemoryPairDao, MemoryTradeDao, OrderDao,
    PairDao, TradeDao,
};
use gateway::{AppState, Settings};

/// Trade history retained for OHLCV aggregation.
const OHLCV_HISTORY: usize = 100_000;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt::init();

    let settings = Settings::load()?;
    tracing::info!(
        listen = %settings.server.listen_addr,
        redis = %settings.redis_url,
        "starting gateway"
    );

    // Document stores
    let orders: Arc<dyn OrderDao> = Arc::new(MemoryOrderDao::new());
    let trades: Arc<dyn TradeDao> = Arc::new(MemoryTradeDao::new());
    let accounts: Arc<dyn AccountDao> = Arc::new(MemoryAccountDao::new());
    let pair_dao = Arc::new(MemoryPairDao::new());
    for market in &settings.markets {
        let base = Token::new(
            Address::from_hex(&market.base_address)
                .map_err(|e| anyhow::anyhow!("bad base token address: {}", e))?,
            &market.base_symbol,
            market.base_decimals,
        );
        let quote = Token::new(
            Address::from_hex(&market.quote_address)
                .map_err(|e| anyhow::anyhow!("bad quote token address: {}", e))?,
            &market.quote_symbol,
            market.quote_decimals,
        );
        pair_dao.register(TokenPair::new(base, quote)).await;
    }
    let pairs: Arc<dyn PairDao> = pair_dao;

    // Shared infrastructure
    let hub = Arc::new(SubscriptionHub::new(settings.orders.outbound_buffer));
    let bus = Arc::new(EngineResponseBus::new(1024));
    let book_store = Arc::new(RedisBookStore::connect(&settings.redis_url).await?);
    let book: Arc<dyn BookStore> = book_store.clone();
    let redis_queue =
        RedisQueue::connect(&settings.redis_url, settings.engine.queue_key.clone()).await?;
    let queue: Arc<dyn QueueProducer> = Arc::new(redis_queue.clone());

    let settlement: Arc<dyn SettlementClient> = if settings.settlement.endpoint.is_empty() {
        tracing::warn!("no settlement endpoint configured, using the mock client");
        Arc::new(MockSettlementClient::accepting())
    } else {
        Arc::new(HttpSettlementClient::new(&settings.settlement.endpoint))
    };

    let default_balance = TokenAmount::from_dec_str(&settings.orders.default_balance)?;
    let order_service = Arc::new(OrderService::new(
        orders.clone(),
        trades.clone(),
        accounts.clone(),
        pairs.clone(),
        book.clone(),
        queue,
        hub.clone(),
        settlement,
        Duration::from_secs(settings.orders.signature_timeout_secs),
        default_balance,
    ));
    let orderbook = Arc::new(OrderBookService::new(book.clone()));
    let ohlcv = Arc::new(OhlcvService::new(hub.clone(), OHLCV_HISTORY));

    // Engine workers in-process, if configured
    if settings.engine.embedded {
        redis_queue.recover_pending().await?;
        let matcher = Arc::new(Matcher::new(book_store));
        let publisher = Arc::new(
            RedisPublisher::connect(&settings.redis_url, settings.engine.response_channel.clone())
                .await?,
        );
        let pool = WorkerPool::new(matcher, publisher, settings.engine.workers);
        let consumer = redis_queue.clone();
        tokio::spawn(async move {
            if let Err(e) = pool.run(consumer).await {
                tracing::error!(error = %e, "embedded engine pool stopped");
            }
        });
    }

    // Response bus consumers
    tokio::spawn(bus.clone().run_redis_feed(
        settings.redis_url.clone(),
        settings.engine.response_channel.clone(),
    ));
    tokio::spawn(order_service.clone().run(bus.subscribe()));
    tokio::spawn(ohlcv.clone().run(bus.subscribe()));

    let state = AppState {
        hub,
        order_service,
        orderbook,
        ohlcv,
        book,
        orders,
        trades,
        accounts,
        pairs,
    };
    let app = create_router(state);

    let listener = TcpListener::bind(&settings.server.listen_addr).await?;
    tracing::info!(addr = %settings.server.listen_addr, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}

//! Live OHLCV aggregation
//!
//! Secondary consumer of the engine response bus: folds executed trades
//! into candles per (pair, unit, duration) and pushes UPDATE deltas to
//! subscribed OHLCV channels. Fixed units bucket by epoch-aligned
//! intervals; month and year units use calendar arithmetic.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use chrono::{Datelike, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};
use tracing::warn;

use types::events::EngineResponse;
use types::numeric::{Price, TokenAmount};
use types::primitives::Hash;
use types::trade::Trade;
use types::ws;
use types::ws::WebSocketMessage;

use crate::hub::SubscriptionHub;

/// One candle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tick {
    pub pair_name: String,
    /// Bucket start, unix seconds.
    pub timestamp: i64,
    pub open: Price,
    pub high: Price,
    pub low: Price,
    pub close: Price,
    pub volume: TokenAmount,
    pub count: u64,
}

/// Raw trade point kept for aggregation.
#[derive(Debug, Clone)]
struct TradePoint {
    timestamp: i64,
    price: Price,
    amount: TokenAmount,
}

/// Start of the bucket containing `ts` for a unit/duration pair.
///
/// `None` for unknown units or non-positive durations.
pub fn bucket_start(units: &str, duration: i64, ts: i64) -> Option<i64> {
    if duration <= 0 {
        return None;
    }

    let unit_seconds = match units {
        "sec" => 1,
        "min" => 60,
        "hour" => 3600,
        "day" => 86400,
        "week" => 604800,
        "month" | "year" => 0,
        _ => return None,
    };
    if unit_seconds > 0 {
        let interval = duration * unit_seconds;
        return Some(ts - ts.rem_euclid(interval));
    }

    let dt = Utc.timestamp_opt(ts, 0).single()?;
    match units {
        "month" => {
            let months = (dt.year() as i64 - 1970) * 12 + dt.month0() as i64;
            let bucket = months - months.rem_euclid(duration);
            let year = 1970 + bucket.div_euclid(12);
            let month = bucket.rem_euclid(12) + 1;
            Utc.with_ymd_and_hms(year as i32, month as u32, 1, 0, 0, 0)
                .single()
                .map(|d| d.timestamp())
        }
        "year" => {
            let years = dt.year() as i64 - 1970;
            let bucket = years - years.rem_euclid(duration);
            Utc.with_ymd_and_hms((1970 + bucket) as i32, 1, 1, 0, 0, 0)
                .single()
                .map(|d| d.timestamp())
        }
        _ => None,
    }
}

/// Aggregates trades into candles and feeds subscribed channels.
pub struct OhlcvService {
    hub: Arc<SubscriptionHub>,
    history: RwLock<HashMap<String, VecDeque<TradePoint>>>,
    seen: RwLock<HashSet<Hash>>,
    max_history: usize,
}

impl OhlcvService {
    pub fn new(hub: Arc<SubscriptionHub>, max_history: usize) -> Self {
        Self {
            hub,
            history: RwLock::new(HashMap::new()),
            seen: RwLock::new(HashSet::new()),
            max_history,
        }
    }

    /// Consume the response bus until it closes.
    pub async fn run(self: Arc<Self>, mut rx: broadcast::Receiver<EngineResponse>) {
        loop {
            match rx.recv().await {
                Ok(response) => {
                    for trade in response.trades() {
                        if trade.status == types::trade::TradeStatus::Error {
                            continue;
                        }
                        self.record_trade(trade).await;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "ohlcv aggregator lagged on response bus");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    /// Fold one trade into the history and push updates to every live
    /// OHLCV channel of its pair. Duplicate deliveries are dropped by
    /// trade hash.
    pub async fn record_trade(&self, trade: &Trade) {
        {
            let mut seen = self.seen.write().await;
            if !seen.insert(trade.hash) {
                return;
            }
            if seen.len() > self.max_history * 4 {
                seen.clear();
            }
        }

        {
            let mut history = self.history.write().await;
            let points = history.entry(trade.pair_name.clone()).or_default();
            if points.len() >= self.max_history {
                points.pop_front();
            }
            points.push_back(TradePoint {
                timestamp: trade.created_at,
                price: trade.price,
                amount: trade.amount,
            });
        }

        let prefix = format!("{}/{}/", ws::OHLCV_CHANNEL, trade.pair_name);
        for channel_id in self.hub.channels_with_prefix(&prefix) {
            let Some((units, duration)) = parse_channel_id(&channel_id, &trade.pair_name) else {
                continue;
            };
            if let Some(tick) = self
                .tick_at(&trade.pair_name, &units, duration, trade.created_at)
                .await
            {
                let payload = serde_json::json!({
                    "type": ws::UPDATE,
                    "data": tick,
                });
                self.hub
                    .broadcast(&channel_id, WebSocketMessage::new(ws::OHLCV_CHANNEL, payload));
            }
        }
    }

    /// Candles for a pair over `[from, to]`; zero bounds mean unbounded.
    pub async fn snapshot(
        &self,
        pair_name: &str,
        units: &str,
        duration: i64,
        from: i64,
        to: i64,
    ) -> Vec<Tick> {
        let history = self.history.read().await;
        let Some(points) = history.get(pair_name) else {
            return Vec::new();
        };

        let mut buckets: HashMap<i64, Tick> = HashMap::new();
        for point in points.iter() {
            if from > 0 && point.timestamp < from {
                continue;
            }
            if to > 0 && point.timestamp >= to {
                continue;
            }
            let Some(bucket) = bucket_start(units, duration, point.timestamp) else {
                continue;
            };
            fold_point(&mut buckets, pair_name, bucket, point);
        }

        let mut ticks: Vec<Tick> = buckets.into_values().collect();
        ticks.sort_by_key(|t| t.timestamp);
        ticks
    }

    /// The candle covering `ts` at the given resolution.
    async fn tick_at(
        &self,
        pair_name: &str,
        units: &str,
        duration: i64,
        ts: i64,
    ) -> Option<Tick> {
        let target = bucket_start(units, duration, ts)?;
        let history = self.history.read().await;
        let points = history.get(pair_name)?;

        let mut buckets: HashMap<i64, Tick> = HashMap::new();
        for point in points.iter() {
            if bucket_start(units, duration, point.timestamp) == Some(target) {
                fold_point(&mut buckets, pair_name, target, point);
            }
        }
        buckets.remove(&target)
    }
}

fn fold_point(buckets: &mut HashMap<i64, Tick>, pair_name: &str, bucket: i64, point: &TradePoint) {
    match buckets.get_mut(&bucket) {
        Some(tick) => {
            if point.price > tick.high {
                tick.high = point.price;
            }
            if point.price < tick.low {
                tick.low = point.price;
            }
            tick.close = point.price;
            tick.volume = tick.volume + point.amount;
            tick.count += 1;
        }
        None => {
            buckets.insert(
                bucket,
                Tick {
                    pair_name: pair_name.to_string(),
                    timestamp: bucket,
                    open: point.price,
                    high: point.price,
                    low: point.price,
                    close: point.price,
                    volume: point.amount,
                    count: 1,
                },
            );
        }
    }
}

/// Extract (units, duration) from `ohlcv/<pair>/<units>/<duration>`.
fn parse_channel_id(channel_id: &str, pair_name: &str) -> Option<(String, i64)> {
    let rest = channel_id.strip_prefix(&format!("{}/{}/", ws::OHLCV_CHANNEL, pair_name))?;
    let (units, duration) = rest.split_once('/')?;
    Some((units.to_string(), duration.parse().ok()?))
}

/// Candle integrity check: high/low bound open and close.
pub fn tick_is_valid(tick: &Tick) -> bool {
    tick.high >= tick.open
        && tick.high >= tick.close
        && tick.high >= tick.low
        && tick.low <= tick.open
        && tick.low <= tick.close
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_unit_buckets_align_to_epoch() {
        // 5-minute buckets
        assert_eq!(bucket_start("min", 5, 1_600_000_299), Some(1_600_000_200));
        assert_eq!(bucket_start("min", 5, 1_600_000_200), Some(1_600_000_200));
        assert_eq!(bucket_start("sec", 30, 95), Some(90));
        assert_eq!(bucket_start("hour", 1, 7200), Some(7200));
    }

    #[test]
    fn test_month_buckets_use_calendar_boundaries() {
        // 2021-03-15 12:00:00 UTC
        let ts = Utc
            .with_ymd_and_hms(2021, 3, 15, 12, 0, 0)
            .single()
            .unwrap()
            .timestamp();
        let expected = Utc
            .with_ymd_and_hms(2021, 3, 1, 0, 0, 0)
            .single()
            .unwrap()
            .timestamp();
        assert_eq!(bucket_start("month", 1, ts), Some(expected));

        // Two-month buckets from the epoch: March 2021 falls in the
        // bucket that opened in March (614 months, even)
        let expected_2m = Utc
            .with_ymd_and_hms(2021, 3, 1, 0, 0, 0)
            .single()
            .unwrap()
            .timestamp();
        assert_eq!(bucket_start("month", 2, ts), Some(expected_2m));
    }

    #[test]
    fn test_year_buckets() {
        let ts = Utc
            .with_ymd_and_hms(2021, 7, 1, 0, 0, 0)
            .single()
            .unwrap()
            .timestamp();
        let expected = Utc
            .with_ymd_and_hms(2021, 1, 1, 0, 0, 0)
            .single()
            .unwrap()
            .timestamp();
        assert_eq!(bucket_start("year", 1, ts), Some(expected));
    }

    #[test]
    fn test_invalid_units_and_durations() {
        assert_eq!(bucket_start("fortnight", 1, 1000), None);
        assert_eq!(bucket_start("min", 0, 1000), None);
        assert_eq!(bucket_start("min", -5, 1000), None);
    }

    #[test]
    fn test_parse_channel_id() {
        assert_eq!(
            parse_channel_id("ohlcv/WETH/DAI/min/5", "WETH/DAI"),
            Some(("min".to_string(), 5))
        );
        assert_eq!(parse_channel_id("ohlcv/WETH/DAI/min", "WETH/DAI"), None);
    }

    fn point(ts: i64, price: u64, amount: u64) -> TradePoint {
        TradePoint {
            timestamp: ts,
            price: Price::from_u64(price),
            amount: TokenAmount::from_u64(amount),
        }
    }

    #[test]
    fn test_fold_builds_ohlcv() {
        let mut buckets = HashMap::new();
        fold_point(&mut buckets, "WETH/DAI", 0, &point(10, 100, 5));
        fold_point(&mut buckets, "WETH/DAI", 0, &point(20, 120, 3));
        fold_point(&mut buckets, "WETH/DAI", 0, &point(30, 90, 2));

        let tick = buckets.get(&0).unwrap();
        assert_eq!(tick.open, Price::from_u64(100));
        assert_eq!(tick.high, Price::from_u64(120));
        assert_eq!(tick.low, Price::from_u64(90));
        assert_eq!(tick.close, Price::from_u64(90));
        assert_eq!(tick.volume, TokenAmount::from_u64(10));
        assert_eq!(tick.count, 3);
        assert!(tick_is_valid(tick));
    }

    #[tokio::test]
    async fn test_snapshot_groups_by_bucket() {
        let hub = Arc::new(SubscriptionHub::new(8));
        let service = OhlcvService::new(hub, 1000);

        let trade_at = |ts: i64, price: u64, nonce: u64| {
            let mut trade = sample_trade(nonce);
            trade.created_at = ts;
            trade.price = Price::from_u64(price);
            trade
        };

        service.record_trade(&trade_at(10, 100, 1)).await;
        service.record_trade(&trade_at(70, 110, 2)).await;
        service.record_trade(&trade_at(80, 105, 3)).await;

        let ticks = service.snapshot("WETH/DAI", "min", 1, 0, 0).await;
        assert_eq!(ticks.len(), 2);
        assert_eq!(ticks[0].timestamp, 0);
        assert_eq!(ticks[1].timestamp, 60);
        assert_eq!(ticks[1].count, 2);
    }

    #[tokio::test]
    async fn test_duplicate_trades_dropped_by_hash() {
        let hub = Arc::new(SubscriptionHub::new(8));
        let service = OhlcvService::new(hub, 1000);

        let trade = sample_trade(1);
        service.record_trade(&trade).await;
        service.record_trade(&trade).await;

        let ticks = service.snapshot("WETH/DAI", "min", 1, 0, 0).await;
        assert_eq!(ticks.len(), 1);
        assert_eq!(ticks[0].count, 1);
    }

    fn sample_trade(nonce: u64) -> Trade {
        use types::numeric::TokenAmount;
        use types::order::{Order, Side};
        use types::pair::{Token, TokenPair};
        use types::primitives::Address;

        let pair = TokenPair::new(
            Token::new(Address::zero(), "WETH", 18),
            Token::new(Address::zero(), "DAI", 18),
        );
        let order = Order::limit(
            &pair,
            Address::zero(),
            Address::zero(),
            Side::Buy,
            TokenAmount::from_u64(10),
            TokenAmount::from_u64(1000),
            nonce,
            4_102_444_800,
        )
        .unwrap();
        Trade::new(&order, &order, TokenAmount::from_u64(5), nonce, 0)
    }
}

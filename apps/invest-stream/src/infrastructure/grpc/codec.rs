//! Translation between wire messages and the session's frame types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use super::proto::{self, market_data_request, market_data_response};
use crate::application::ports::{
    AckEntry, AckStatus, ControlFrame, InboundFrame, SubscriptionAck, SubscriptionAction,
};
use crate::domain::streaming::{
    Candle, CandleInterval, DataKind, InstrumentRef, LastPrice, MarketPayload, OrderBook, Ping,
    PriceLevel, Quotation, SecurityTradingStatus, Trade, TradeDirection, TradingStatus,
};
use crate::domain::subscription::TopicKind;

/// A wire message that cannot be represented in the session's types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// A required field was absent.
    #[error("{message}: missing field `{field}`")]
    MissingField {
        /// Message type.
        message: &'static str,
        /// Field name.
        field: &'static str,
    },

    /// An enum field carried a value this client does not know.
    #[error("unknown {field} value {value}")]
    UnknownEnumValue {
        /// Field name.
        field: &'static str,
        /// Raw value.
        value: i32,
    },

    /// A timestamp was out of range.
    #[error("timestamp out of range: {seconds}s {nanos}ns")]
    InvalidTimestamp {
        /// Seconds since the epoch.
        seconds: i64,
        /// Nanosecond part.
        nanos: i32,
    },

    /// A depth was negative, or does not fit the wire type.
    #[error("invalid order book depth: {0}")]
    InvalidDepth(i64),
}

/// Maps control frames to requests and responses to inbound frames.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarketDataCodec {
    waiting_close: bool,
}

impl MarketDataCodec {
    /// Create a codec.
    ///
    /// With `waiting_close` set, candle subscriptions ask the server to send
    /// only closed candles.
    #[must_use]
    pub const fn new(waiting_close: bool) -> Self {
        Self { waiting_close }
    }

    // =========================================================================
    // Outbound
    // =========================================================================

    /// Build the wire request for a control frame.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidDepth`] if an order book depth does not
    /// fit the wire type.
    pub fn encode(&self, frame: &ControlFrame) -> Result<proto::MarketDataRequest, CodecError> {
        let action = encode_action(frame.action) as i32;
        let ids = || {
            frame
                .instruments
                .iter()
                .map(|id| proto::InstrumentId {
                    instrument_id: id.clone(),
                })
                .collect::<Vec<_>>()
        };

        let payload = match frame.kind {
            TopicKind::Candles { interval } => {
                let interval = encode_interval(interval) as i32;
                market_data_request::Payload::SubscribeCandlesRequest(
                    proto::SubscribeCandlesRequest {
                        subscription_action: action,
                        instruments: frame
                            .instruments
                            .iter()
                            .map(|id| proto::CandleInstrument {
                                interval,
                                instrument_id: id.clone(),
                            })
                            .collect(),
                        waiting_close: Some(self.waiting_close),
                    },
                )
            }
            TopicKind::OrderBook { depth } => {
                let depth =
                    i32::try_from(depth).map_err(|_| CodecError::InvalidDepth(depth.into()))?;
                market_data_request::Payload::SubscribeOrderBookRequest(
                    proto::SubscribeOrderBookRequest {
                        subscription_action: action,
                        instruments: frame
                            .instruments
                            .iter()
                            .map(|id| proto::OrderBookInstrument {
                                depth,
                                instrument_id: id.clone(),
                            })
                            .collect(),
                    },
                )
            }
            TopicKind::Trades => {
                market_data_request::Payload::SubscribeTradesRequest(proto::SubscribeTradesRequest {
                    subscription_action: action,
                    instruments: ids(),
                })
            }
            TopicKind::LastPrice => market_data_request::Payload::SubscribeLastPriceRequest(
                proto::SubscribeLastPriceRequest {
                    subscription_action: action,
                    instruments: ids(),
                },
            ),
            TopicKind::TradingStatus => {
                market_data_request::Payload::SubscribeInfoRequest(proto::SubscribeInfoRequest {
                    subscription_action: action,
                    instruments: ids(),
                })
            }
        };

        Ok(proto::MarketDataRequest {
            payload: Some(payload),
        })
    }

    // =========================================================================
    // Inbound
    // =========================================================================

    /// Translate a wire response.
    ///
    /// Returns `Ok(None)` for responses the session has no use for: an empty
    /// payload or the acknowledgement of an info subscription made by
    /// another client of the same stream.
    ///
    /// # Errors
    ///
    /// Returns a [`CodecError`] if a required field is absent or an enum
    /// carries an unknown value.
    pub fn decode(
        &self,
        response: proto::MarketDataResponse,
    ) -> Result<Option<InboundFrame>, CodecError> {
        use market_data_response::Payload;

        let Some(payload) = response.payload else {
            return Ok(None);
        };

        let frame = match payload {
            Payload::Candle(c) => InboundFrame::Data(MarketPayload::Candle(decode_candle(c)?)),
            Payload::Trade(t) => InboundFrame::Data(MarketPayload::Trade(decode_trade(t)?)),
            Payload::Orderbook(b) => {
                InboundFrame::Data(MarketPayload::OrderBook(decode_order_book(b)?))
            }
            Payload::LastPrice(p) => {
                InboundFrame::Data(MarketPayload::LastPrice(decode_last_price(p)?))
            }
            Payload::TradingStatus(s) => {
                InboundFrame::Data(MarketPayload::TradingStatus(decode_trading_status(s)?))
            }
            Payload::Ping(p) => InboundFrame::Ping(Ping {
                time: p.time.map(timestamp).transpose()?,
            }),
            Payload::SubscribeCandlesResponse(r) => {
                let entries = r
                    .candles_subscriptions
                    .into_iter()
                    .map(|s| {
                        Ok(AckEntry {
                            instrument: InstrumentRef::new(s.figi, s.instrument_uid),
                            kind: TopicKind::Candles {
                                interval: decode_interval(s.interval)?,
                            },
                            status: decode_status(s.subscription_status),
                        })
                    })
                    .collect::<Result<_, CodecError>>()?;
                ack(r.tracking_id, entries)
            }
            Payload::SubscribeOrderBookResponse(r) => {
                let entries = r
                    .order_book_subscriptions
                    .into_iter()
                    .map(|s| {
                        Ok(AckEntry {
                            instrument: InstrumentRef::new(s.figi, s.instrument_uid),
                            kind: TopicKind::OrderBook {
                                depth: decode_depth(s.depth)?,
                            },
                            status: decode_status(s.subscription_status),
                        })
                    })
                    .collect::<Result<_, CodecError>>()?;
                ack(r.tracking_id, entries)
            }
            Payload::SubscribeTradesResponse(r) => {
                ack(r.tracking_id, plain_entries(r.trade_subscriptions, TopicKind::Trades))
            }
            Payload::SubscribeInfoResponse(r) => ack(
                r.tracking_id,
                plain_entries(r.info_subscriptions, TopicKind::TradingStatus),
            ),
            Payload::SubscribeLastPriceResponse(r) => ack(
                r.tracking_id,
                plain_entries(r.last_price_subscriptions, TopicKind::LastPrice),
            ),
        };

        Ok(Some(frame))
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn ack(tracking_id: String, entries: Vec<AckEntry>) -> InboundFrame {
    InboundFrame::SubscriptionAck(SubscriptionAck {
        tracking_id,
        entries,
    })
}

fn plain_entries(subs: Vec<proto::InstrumentSubscription>, kind: TopicKind) -> Vec<AckEntry> {
    subs.into_iter()
        .map(|s| AckEntry {
            instrument: InstrumentRef::new(s.figi, s.instrument_uid),
            kind,
            status: decode_status(s.subscription_status),
        })
        .collect()
}

const fn encode_action(action: SubscriptionAction) -> proto::SubscriptionAction {
    match action {
        SubscriptionAction::Subscribe => proto::SubscriptionAction::Subscribe,
        SubscriptionAction::Unsubscribe => proto::SubscriptionAction::Unsubscribe,
    }
}

const fn encode_interval(interval: CandleInterval) -> proto::SubscriptionInterval {
    use proto::SubscriptionInterval as W;
    match interval {
        CandleInterval::OneMinute => W::OneMinute,
        CandleInterval::TwoMinutes => W::TwoMinutes,
        CandleInterval::ThreeMinutes => W::ThreeMinutes,
        CandleInterval::FiveMinutes => W::FiveMinutes,
        CandleInterval::TenMinutes => W::TenMinutes,
        CandleInterval::FifteenMinutes => W::FifteenMinutes,
        CandleInterval::ThirtyMinutes => W::ThirtyMinutes,
        CandleInterval::OneHour => W::OneHour,
        CandleInterval::TwoHours => W::TwoHours,
        CandleInterval::FourHours => W::FourHours,
        CandleInterval::OneDay => W::OneDay,
        CandleInterval::Week => W::Week,
        CandleInterval::Month => W::Month,
    }
}

fn decode_interval(value: i32) -> Result<CandleInterval, CodecError> {
    use proto::SubscriptionInterval as W;
    let unknown = CodecError::UnknownEnumValue {
        field: "interval",
        value,
    };
    Ok(match W::try_from(value).map_err(|_| unknown.clone())? {
        W::Unspecified => return Err(unknown),
        W::OneMinute => CandleInterval::OneMinute,
        W::TwoMinutes => CandleInterval::TwoMinutes,
        W::ThreeMinutes => CandleInterval::ThreeMinutes,
        W::FiveMinutes => CandleInterval::FiveMinutes,
        W::TenMinutes => CandleInterval::TenMinutes,
        W::FifteenMinutes => CandleInterval::FifteenMinutes,
        W::ThirtyMinutes => CandleInterval::ThirtyMinutes,
        W::OneHour => CandleInterval::OneHour,
        W::TwoHours => CandleInterval::TwoHours,
        W::FourHours => CandleInterval::FourHours,
        W::OneDay => CandleInterval::OneDay,
        W::Week => CandleInterval::Week,
        W::Month => CandleInterval::Month,
    })
}

/// Unknown statuses are reported as `Unspecified` so that a newer server
/// cannot break acknowledgement handling.
fn decode_status(value: i32) -> AckStatus {
    use proto::SubscriptionStatus as W;
    match W::try_from(value).unwrap_or(W::Unspecified) {
        W::Unspecified => AckStatus::Unspecified,
        W::Success => AckStatus::Success,
        W::InstrumentNotFound => AckStatus::InstrumentNotFound,
        W::SubscriptionActionIsInvalid => AckStatus::InvalidAction,
        W::DepthIsInvalid => AckStatus::InvalidDepth,
        W::IntervalIsInvalid => AckStatus::InvalidInterval,
        W::LimitIsExceeded => AckStatus::LimitExceeded,
        W::InternalError => AckStatus::InternalError,
        W::TooManyRequests => AckStatus::TooManyRequests,
        W::SubscriptionNotFound => AckStatus::SubscriptionNotFound,
    }
}

fn decode_depth(value: i32) -> Result<u32, CodecError> {
    u32::try_from(value).map_err(|_| CodecError::InvalidDepth(value.into()))
}

fn decode_direction(value: i32) -> TradeDirection {
    match proto::TradeDirection::try_from(value) {
        Ok(proto::TradeDirection::Buy) => TradeDirection::Buy,
        Ok(proto::TradeDirection::Sell) => TradeDirection::Sell,
        _ => TradeDirection::Unspecified,
    }
}

fn decode_trading_status(s: proto::TradingStatus) -> Result<TradingStatus, CodecError> {
    use proto::SecurityTradingStatus as W;
    let status = match W::try_from(s.trading_status).unwrap_or(W::Unspecified) {
        W::Unspecified => SecurityTradingStatus::Unspecified,
        W::NotAvailableForTrading => SecurityTradingStatus::NotAvailableForTrading,
        W::OpeningPeriod => SecurityTradingStatus::OpeningPeriod,
        W::ClosingPeriod => SecurityTradingStatus::ClosingPeriod,
        W::BreakInTrading => SecurityTradingStatus::BreakInTrading,
        W::NormalTrading => SecurityTradingStatus::NormalTrading,
        W::ClosingAuction => SecurityTradingStatus::ClosingAuction,
        W::DarkPoolAuction => SecurityTradingStatus::DarkPoolAuction,
        W::DiscreteAuction => SecurityTradingStatus::DiscreteAuction,
        W::OpeningAuctionPeriod => SecurityTradingStatus::OpeningAuctionPeriod,
        W::TradingAtClosingAuctionPrice => SecurityTradingStatus::TradingAtClosingAuctionPrice,
        W::SessionAssigned => SecurityTradingStatus::SessionAssigned,
        W::SessionClose => SecurityTradingStatus::SessionClose,
        W::SessionOpen => SecurityTradingStatus::SessionOpen,
        W::DealerNormalTrading => SecurityTradingStatus::DealerNormalTrading,
        W::DealerBreakInTrading => SecurityTradingStatus::DealerBreakInTrading,
        W::DealerNotAvailableForTrading => SecurityTradingStatus::DealerNotAvailableForTrading,
    };
    Ok(TradingStatus {
        time: required_time("TradingStatus", s.time)?,
        instrument: InstrumentRef::new(s.figi, s.instrument_uid),
        status,
        limit_order_available: s.limit_order_available_flag,
        market_order_available: s.market_order_available_flag,
    })
}

fn decode_candle(c: proto::Candle) -> Result<Candle, CodecError> {
    const MSG: &str = "Candle";
    Ok(Candle {
        interval: decode_interval(c.interval)?,
        open: price(MSG, "open", c.open)?,
        high: price(MSG, "high", c.high)?,
        low: price(MSG, "low", c.low)?,
        close: price(MSG, "close", c.close)?,
        volume: c.volume,
        time: required_time(MSG, c.time)?,
        last_trade_at: c.last_trade_ts.map(timestamp).transpose()?,
        instrument: InstrumentRef::new(c.figi, c.instrument_uid),
    })
}

fn decode_trade(t: proto::Trade) -> Result<Trade, CodecError> {
    Ok(Trade {
        direction: decode_direction(t.direction),
        price: price("Trade", "price", t.price)?,
        quantity: t.quantity,
        time: required_time("Trade", t.time)?,
        instrument: InstrumentRef::new(t.figi, t.instrument_uid),
    })
}

fn decode_order_book(b: proto::OrderBook) -> Result<OrderBook, CodecError> {
    const MSG: &str = "OrderBook";
    let levels = |orders: Vec<proto::Order>| {
        orders
            .into_iter()
            .map(|o| {
                Ok(PriceLevel {
                    price: price("Order", "price", o.price)?,
                    quantity: o.quantity,
                })
            })
            .collect::<Result<Vec<_>, CodecError>>()
    };
    Ok(OrderBook {
        depth: decode_depth(b.depth)?,
        is_consistent: b.is_consistent,
        bids: levels(b.bids)?,
        asks: levels(b.asks)?,
        time: required_time(MSG, b.time)?,
        limit_up: b.limit_up.map(quotation),
        limit_down: b.limit_down.map(quotation),
        instrument: InstrumentRef::new(b.figi, b.instrument_uid),
    })
}

fn decode_last_price(p: proto::LastPrice) -> Result<LastPrice, CodecError> {
    Ok(LastPrice {
        price: price("LastPrice", "price", p.price)?,
        time: required_time("LastPrice", p.time)?,
        instrument: InstrumentRef::new(p.figi, p.instrument_uid),
    })
}

fn quotation(q: proto::Quotation) -> Decimal {
    Quotation::new(q.units, q.nano).to_decimal()
}

fn price(
    message: &'static str,
    field: &'static str,
    q: Option<proto::Quotation>,
) -> Result<Decimal, CodecError> {
    q.map(quotation)
        .ok_or(CodecError::MissingField { message, field })
}

fn timestamp(ts: prost_types::Timestamp) -> Result<DateTime<Utc>, CodecError> {
    let invalid = CodecError::InvalidTimestamp {
        seconds: ts.seconds,
        nanos: ts.nanos,
    };
    let nanos = u32::try_from(ts.nanos).map_err(|_| invalid.clone())?;
    DateTime::from_timestamp(ts.seconds, nanos).ok_or(invalid)
}

fn required_time(
    message: &'static str,
    ts: Option<prost_types::Timestamp>,
) -> Result<DateTime<Utc>, CodecError> {
    ts.ok_or(CodecError::MissingField {
        message,
        field: "time",
    })
    .and_then(timestamp)
}

/// Payload kind of a response, for logging frames that failed to decode.
#[must_use]
pub const fn response_kind(payload: &market_data_response::Payload) -> Option<DataKind> {
    use market_data_response::Payload;
    match payload {
        Payload::Candle(_) => Some(DataKind::Candle),
        Payload::Trade(_) => Some(DataKind::Trade),
        Payload::Orderbook(_) => Some(DataKind::OrderBook),
        Payload::LastPrice(_) => Some(DataKind::LastPrice),
        Payload::TradingStatus(_) => Some(DataKind::TradingStatus),
        _ => None,
    }
}

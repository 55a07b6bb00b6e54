//! Wire messages of the market data stream contract
//! (`tinkoff.public.invest.api.contract.v1`), limited to the messages the
//! streaming client exchanges. Field tags follow the published schema;
//! unknown fields and payload variants are skipped by prost.

// =============================================================================
// Common
// =============================================================================

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct Quotation {
    #[prost(int64, tag = "1")]
    pub units: i64,
    #[prost(int32, tag = "2")]
    pub nano: i32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum SubscriptionAction {
    Unspecified = 0,
    Subscribe = 1,
    Unsubscribe = 2,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum SubscriptionInterval {
    Unspecified = 0,
    OneMinute = 1,
    FiveMinutes = 2,
    FifteenMinutes = 3,
    OneHour = 4,
    OneDay = 5,
    TwoMinutes = 6,
    ThreeMinutes = 7,
    TenMinutes = 8,
    ThirtyMinutes = 9,
    TwoHours = 10,
    FourHours = 11,
    Week = 12,
    Month = 13,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum SubscriptionStatus {
    Unspecified = 0,
    Success = 1,
    InstrumentNotFound = 2,
    SubscriptionActionIsInvalid = 3,
    DepthIsInvalid = 4,
    IntervalIsInvalid = 5,
    LimitIsExceeded = 6,
    InternalError = 7,
    TooManyRequests = 8,
    SubscriptionNotFound = 9,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum TradeDirection {
    Unspecified = 0,
    Buy = 1,
    Sell = 2,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum SecurityTradingStatus {
    Unspecified = 0,
    NotAvailableForTrading = 1,
    OpeningPeriod = 2,
    ClosingPeriod = 3,
    BreakInTrading = 4,
    NormalTrading = 5,
    ClosingAuction = 6,
    DarkPoolAuction = 7,
    DiscreteAuction = 8,
    OpeningAuctionPeriod = 9,
    TradingAtClosingAuctionPrice = 10,
    SessionAssigned = 11,
    SessionClose = 12,
    SessionOpen = 13,
    DealerNormalTrading = 14,
    DealerBreakInTrading = 15,
    DealerNotAvailableForTrading = 16,
}

// =============================================================================
// Requests
// =============================================================================

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MarketDataRequest {
    #[prost(oneof = "market_data_request::Payload", tags = "1, 2, 3, 4, 5")]
    pub payload: ::core::option::Option<market_data_request::Payload>,
}

pub mod market_data_request {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Payload {
        #[prost(message, tag = "1")]
        SubscribeCandlesRequest(super::SubscribeCandlesRequest),
        #[prost(message, tag = "2")]
        SubscribeOrderBookRequest(super::SubscribeOrderBookRequest),
        #[prost(message, tag = "3")]
        SubscribeTradesRequest(super::SubscribeTradesRequest),
        #[prost(message, tag = "4")]
        SubscribeInfoRequest(super::SubscribeInfoRequest),
        #[prost(message, tag = "5")]
        SubscribeLastPriceRequest(super::SubscribeLastPriceRequest),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SubscribeCandlesRequest {
    #[prost(enumeration = "SubscriptionAction", tag = "1")]
    pub subscription_action: i32,
    #[prost(message, repeated, tag = "2")]
    pub instruments: ::prost::alloc::vec::Vec<CandleInstrument>,
    #[prost(bool, optional, tag = "3")]
    pub waiting_close: ::core::option::Option<bool>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CandleInstrument {
    #[prost(enumeration = "SubscriptionInterval", tag = "2")]
    pub interval: i32,
    #[prost(string, tag = "3")]
    pub instrument_id: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SubscribeOrderBookRequest {
    #[prost(enumeration = "SubscriptionAction", tag = "1")]
    pub subscription_action: i32,
    #[prost(message, repeated, tag = "2")]
    pub instruments: ::prost::alloc::vec::Vec<OrderBookInstrument>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct OrderBookInstrument {
    #[prost(int32, tag = "2")]
    pub depth: i32,
    #[prost(string, tag = "3")]
    pub instrument_id: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SubscribeTradesRequest {
    #[prost(enumeration = "SubscriptionAction", tag = "1")]
    pub subscription_action: i32,
    #[prost(message, repeated, tag = "2")]
    pub instruments: ::prost::alloc::vec::Vec<InstrumentId>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SubscribeInfoRequest {
    #[prost(enumeration = "SubscriptionAction", tag = "1")]
    pub subscription_action: i32,
    #[prost(message, repeated, tag = "2")]
    pub instruments: ::prost::alloc::vec::Vec<InstrumentId>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SubscribeLastPriceRequest {
    #[prost(enumeration = "SubscriptionAction", tag = "1")]
    pub subscription_action: i32,
    #[prost(message, repeated, tag = "2")]
    pub instruments: ::prost::alloc::vec::Vec<InstrumentId>,
}

/// `TradeInstrument`, `InfoInstrument` and `LastPriceInstrument` share this
/// layout.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InstrumentId {
    #[prost(string, tag = "2")]
    pub instrument_id: ::prost::alloc::string::String,
}

// =============================================================================
// Responses
// =============================================================================

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MarketDataResponse {
    #[prost(
        oneof = "market_data_response::Payload",
        tags = "1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11"
    )]
    pub payload: ::core::option::Option<market_data_response::Payload>,
}

pub mod market_data_response {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Payload {
        #[prost(message, tag = "1")]
        SubscribeCandlesResponse(super::SubscribeCandlesResponse),
        #[prost(message, tag = "2")]
        SubscribeOrderBookResponse(super::SubscribeOrderBookResponse),
        #[prost(message, tag = "3")]
        SubscribeTradesResponse(super::SubscribeTradesResponse),
        #[prost(message, tag = "4")]
        SubscribeInfoResponse(super::SubscribeInfoResponse),
        #[prost(message, tag = "5")]
        Candle(super::Candle),
        #[prost(message, tag = "6")]
        Trade(super::Trade),
        #[prost(message, tag = "7")]
        Orderbook(super::OrderBook),
        #[prost(message, tag = "8")]
        TradingStatus(super::TradingStatus),
        #[prost(message, tag = "9")]
        Ping(super::Ping),
        #[prost(message, tag = "10")]
        SubscribeLastPriceResponse(super::SubscribeLastPriceResponse),
        #[prost(message, tag = "11")]
        LastPrice(super::LastPrice),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SubscribeCandlesResponse {
    #[prost(string, tag = "1")]
    pub tracking_id: ::prost::alloc::string::String,
    #[prost(message, repeated, tag = "2")]
    pub candles_subscriptions: ::prost::alloc::vec::Vec<CandleSubscription>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CandleSubscription {
    #[prost(string, tag = "1")]
    pub figi: ::prost::alloc::string::String,
    #[prost(enumeration = "SubscriptionInterval", tag = "2")]
    pub interval: i32,
    #[prost(enumeration = "SubscriptionStatus", tag = "3")]
    pub subscription_status: i32,
    #[prost(string, tag = "4")]
    pub instrument_uid: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SubscribeOrderBookResponse {
    #[prost(string, tag = "1")]
    pub tracking_id: ::prost::alloc::string::String,
    #[prost(message, repeated, tag = "2")]
    pub order_book_subscriptions: ::prost::alloc::vec::Vec<OrderBookSubscription>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct OrderBookSubscription {
    #[prost(string, tag = "1")]
    pub figi: ::prost::alloc::string::String,
    #[prost(int32, tag = "2")]
    pub depth: i32,
    #[prost(enumeration = "SubscriptionStatus", tag = "3")]
    pub subscription_status: i32,
    #[prost(string, tag = "4")]
    pub instrument_uid: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SubscribeTradesResponse {
    #[prost(string, tag = "1")]
    pub tracking_id: ::prost::alloc::string::String,
    #[prost(message, repeated, tag = "2")]
    pub trade_subscriptions: ::prost::alloc::vec::Vec<InstrumentSubscription>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SubscribeInfoResponse {
    #[prost(string, tag = "1")]
    pub tracking_id: ::prost::alloc::string::String,
    #[prost(message, repeated, tag = "2")]
    pub info_subscriptions: ::prost::alloc::vec::Vec<InstrumentSubscription>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SubscribeLastPriceResponse {
    #[prost(string, tag = "1")]
    pub tracking_id: ::prost::alloc::string::String,
    #[prost(message, repeated, tag = "2")]
    pub last_price_subscriptions: ::prost::alloc::vec::Vec<InstrumentSubscription>,
}

/// `TradeSubscription`, `InfoSubscription` and `LastPriceSubscription` share
/// this layout.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InstrumentSubscription {
    #[prost(string, tag = "1")]
    pub figi: ::prost::alloc::string::String,
    #[prost(enumeration = "SubscriptionStatus", tag = "2")]
    pub subscription_status: i32,
    #[prost(string, tag = "3")]
    pub instrument_uid: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Candle {
    #[prost(string, tag = "1")]
    pub figi: ::prost::alloc::string::String,
    #[prost(enumeration = "SubscriptionInterval", tag = "2")]
    pub interval: i32,
    #[prost(message, optional, tag = "3")]
    pub open: ::core::option::Option<Quotation>,
    #[prost(message, optional, tag = "4")]
    pub high: ::core::option::Option<Quotation>,
    #[prost(message, optional, tag = "5")]
    pub low: ::core::option::Option<Quotation>,
    #[prost(message, optional, tag = "6")]
    pub close: ::core::option::Option<Quotation>,
    #[prost(int64, tag = "7")]
    pub volume: i64,
    #[prost(message, optional, tag = "8")]
    pub time: ::core::option::Option<::prost_types::Timestamp>,
    #[prost(message, optional, tag = "9")]
    pub last_trade_ts: ::core::option::Option<::prost_types::Timestamp>,
    #[prost(string, tag = "10")]
    pub instrument_uid: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Trade {
    #[prost(string, tag = "1")]
    pub figi: ::prost::alloc::string::String,
    #[prost(enumeration = "TradeDirection", tag = "2")]
    pub direction: i32,
    #[prost(message, optional, tag = "3")]
    pub price: ::core::option::Option<Quotation>,
    #[prost(int64, tag = "4")]
    pub quantity: i64,
    #[prost(message, optional, tag = "5")]
    pub time: ::core::option::Option<::prost_types::Timestamp>,
    #[prost(string, tag = "6")]
    pub instrument_uid: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Order {
    #[prost(message, optional, tag = "1")]
    pub price: ::core::option::Option<Quotation>,
    #[prost(int64, tag = "2")]
    pub quantity: i64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct OrderBook {
    #[prost(string, tag = "1")]
    pub figi: ::prost::alloc::string::String,
    #[prost(int32, tag = "2")]
    pub depth: i32,
    #[prost(bool, tag = "3")]
    pub is_consistent: bool,
    #[prost(message, repeated, tag = "4")]
    pub bids: ::prost::alloc::vec::Vec<Order>,
    #[prost(message, repeated, tag = "5")]
    pub asks: ::prost::alloc::vec::Vec<Order>,
    #[prost(message, optional, tag = "6")]
    pub time: ::core::option::Option<::prost_types::Timestamp>,
    #[prost(message, optional, tag = "7")]
    pub limit_up: ::core::option::Option<Quotation>,
    #[prost(message, optional, tag = "8")]
    pub limit_down: ::core::option::Option<Quotation>,
    #[prost(string, tag = "9")]
    pub instrument_uid: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TradingStatus {
    #[prost(string, tag = "1")]
    pub figi: ::prost::alloc::string::String,
    #[prost(enumeration = "SecurityTradingStatus", tag = "2")]
    pub trading_status: i32,
    #[prost(message, optional, tag = "3")]
    pub time: ::core::option::Option<::prost_types::Timestamp>,
    #[prost(bool, tag = "4")]
    pub limit_order_available_flag: bool,
    #[prost(bool, tag = "5")]
    pub market_order_available_flag: bool,
    #[prost(string, tag = "6")]
    pub instrument_uid: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LastPrice {
    #[prost(string, tag = "1")]
    pub figi: ::prost::alloc::string::String,
    #[prost(message, optional, tag = "2")]
    pub price: ::core::option::Option<Quotation>,
    #[prost(message, optional, tag = "3")]
    pub time: ::core::option::Option<::prost_types::Timestamp>,
    #[prost(string, tag = "11")]
    pub instrument_uid: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Ping {
    #[prost(message, optional, tag = "1")]
    pub time: ::core::option::Option<::prost_types::Timestamp>,
}

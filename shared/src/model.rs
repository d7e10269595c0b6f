use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt};
use thiserror::Error;
use uuid::Uuid;
use zeroize::Zeroize;

use crate::QUARKS_PER_KIN;

/// Length of a scannable code payload: kind, 8 value bytes, 11 nonce bytes.
pub const CODE_PAYLOAD_LEN: usize = 20;
const VALUE_RANGE: std::ops::Range<usize> = 1..9;

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum DecodeError {
    #[error("payload must be {expected} bytes, got {actual}")]
    WrongLength { expected: usize, actual: usize },
    #[error("unknown payload kind byte {0:#04x}")]
    UnknownKind(u8),
    #[error("payload kind byte says {actual:?} but scan classified it as {expected:?}")]
    KindMismatch {
        expected: PayloadKind,
        actual: PayloadKind,
    },
    #[error("payload carries a zero amount")]
    ZeroAmount,
    #[error("invalid currency code {0:?}")]
    InvalidCurrency(String),
    #[error("no exchange rate known for {0}")]
    MissingRate(String),
}

// --- Identifiers ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BillId(pub Uuid);

impl BillId {
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for BillId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Correlates an outbound ledger operation with its result event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubmissionId(pub u64);

impl fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

// --- Money ---

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CurrencyCode(String);

impl CurrencyCode {
    pub fn new(code: impl Into<String>) -> Result<Self, DecodeError> {
        let code = code.into().trim().to_ascii_uppercase();
        if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(DecodeError::InvalidCurrency(code));
        }
        Ok(Self(code))
    }

    #[must_use]
    pub fn kin() -> Self {
        Self("KIN".into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_kin(&self) -> bool {
        self.0 == "KIN"
    }

    /// Minor-unit exponent.
    #[must_use]
    pub fn decimals(&self) -> u32 {
        match self.0.as_str() {
            "KIN" => 5,
            "JPY" | "KRW" | "VND" | "CLP" | "ISK" => 0,
            _ => 2,
        }
    }
}

impl TryFrom<String> for CurrencyCode {
    type Error = DecodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<CurrencyCode> for String {
    fn from(code: CurrencyCode) -> Self {
        code.0
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fiat units of `currency` per one whole KIN.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeRate {
    pub currency: CurrencyCode,
    pub fx: f64,
}

impl ExchangeRate {
    #[must_use]
    pub fn kin() -> Self {
        Self {
            currency: CurrencyCode::kin(),
            fx: 1.0,
        }
    }
}

/// Immutable monetary value in integer minor units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Amount {
    quantity: u64,
    currency: CurrencyCode,
    rate: ExchangeRate,
}

impl Amount {
    #[must_use]
    pub fn kin(quarks: u64) -> Self {
        Self {
            quantity: quarks,
            currency: CurrencyCode::kin(),
            rate: ExchangeRate::kin(),
        }
    }

    #[must_use]
    pub fn fiat(minor_units: u64, rate: ExchangeRate) -> Self {
        Self {
            quantity: minor_units,
            currency: rate.currency.clone(),
            rate,
        }
    }

    #[must_use]
    pub const fn quantity(&self) -> u64 {
        self.quantity
    }

    #[must_use]
    pub fn currency(&self) -> &CurrencyCode {
        &self.currency
    }

    #[must_use]
    pub fn rate(&self) -> &ExchangeRate {
        &self.rate
    }

    /// Value in whole units of `currency`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn major(&self) -> f64 {
        self.quantity as f64 / 10f64.powi(self.currency.decimals().try_into().unwrap_or(0))
    }

    /// Equivalent value in quarks.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    pub fn quarks(&self) -> u64 {
        if self.currency.is_kin() {
            return self.quantity;
        }
        if self.rate.fx <= 0.0 || !self.rate.fx.is_finite() {
            return 0;
        }
        (self.major() / self.rate.fx * QUARKS_PER_KIN as f64).round() as u64
    }

    /// Whole KIN, truncated.
    #[must_use]
    pub fn whole_kin(&self) -> u64 {
        self.quarks() / QUARKS_PER_KIN
    }

    #[must_use]
    pub fn formatted(&self) -> String {
        let decimals = usize::try_from(self.currency.decimals()).unwrap_or(0);
        if self.currency.is_kin() {
            return format!("{} KIN", self.whole_kin());
        }
        format!("{:.*} {}", decimals, self.major(), self.currency)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.formatted())
    }
}

/// Latest exchange-rate snapshot, keyed by fiat currency.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RateTable {
    rates: HashMap<CurrencyCode, f64>,
}

impl RateTable {
    /// Replaces the snapshot; invalid codes and non-positive rates are skipped.
    pub fn update(&mut self, rates: impl IntoIterator<Item = (String, f64)>) -> usize {
        self.rates = rates
            .into_iter()
            .filter(|(_, fx)| fx.is_finite() && *fx > 0.0)
            .filter_map(|(code, fx)| CurrencyCode::new(code).ok().map(|c| (c, fx)))
            .collect();
        self.rates.len()
    }

    #[must_use]
    pub fn rate_for(&self, currency: &CurrencyCode) -> Option<ExchangeRate> {
        if currency.is_kin() {
            return Some(ExchangeRate::kin());
        }
        self.rates.get(currency).map(|fx| ExchangeRate {
            currency: currency.clone(),
            fx: *fx,
        })
    }
}

// --- Payloads ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PayloadKind {
    Cash,
    GiftCard,
    RequestPayment,
}

impl PayloadKind {
    #[must_use]
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Cash),
            1 => Some(Self::GiftCard),
            2 => Some(Self::RequestPayment),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_byte(self) -> u8 {
        match self {
            Self::Cash => 0,
            Self::GiftCard => 1,
            Self::RequestPayment => 2,
        }
    }

    #[must_use]
    pub const fn is_cash(self) -> bool {
        matches!(self, Self::Cash | Self::GiftCard)
    }
}

/// Opaque, cryptographically bound payment instruction. Zeroized on drop and
/// never printed.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Payload {
    kind: PayloadKind,
    #[serde(with = "serde_bytes")]
    data: Vec<u8>,
}

impl Payload {
    #[must_use]
    pub fn new(kind: PayloadKind, data: Vec<u8>) -> Self {
        Self { kind, data }
    }

    #[must_use]
    pub const fn kind(&self) -> PayloadKind {
        self.kind
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Short stable identifier safe for logs.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&[self.kind.as_byte()]);
        hasher.update(&self.data);
        hasher.finalize().to_hex()[..16].to_string()
    }
}

// Redact debug output: the bytes are bearer value.
impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Payload")
            .field("kind", &self.kind)
            .field("len", &self.data.len())
            .field("fingerprint", &self.fingerprint())
            .finish()
    }
}

impl Drop for Payload {
    fn drop(&mut self) {
        self.data.zeroize();
    }
}

/// The value a scanned code carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CodeValue {
    Kin { quarks: u64 },
    Fiat { currency: CurrencyCode, minor_units: u64 },
}

/// A structurally decoded scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedCode {
    pub payload: Payload,
    pub value: CodeValue,
}

impl ScannedCode {
    /// Parses the code layout. The nonce is carried through untouched.
    pub fn decode(classified: PayloadKind, data: &[u8]) -> Result<Self, DecodeError> {
        if data.len() != CODE_PAYLOAD_LEN {
            return Err(DecodeError::WrongLength {
                expected: CODE_PAYLOAD_LEN,
                actual: data.len(),
            });
        }
        let kind = PayloadKind::from_byte(data[0]).ok_or(DecodeError::UnknownKind(data[0]))?;
        if kind != classified {
            return Err(DecodeError::KindMismatch {
                expected: classified,
                actual: kind,
            });
        }

        let value_bytes = &data[VALUE_RANGE];
        let value = if kind.is_cash() {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(value_bytes);
            let quarks = u64::from_le_bytes(buf);
            if quarks == 0 {
                return Err(DecodeError::ZeroAmount);
            }
            CodeValue::Kin { quarks }
        } else {
            let code = std::str::from_utf8(&value_bytes[..3])
                .map_err(|_| DecodeError::InvalidCurrency(hex::encode(&value_bytes[..3])))?;
            let currency = CurrencyCode::new(code)?;
            let mut buf = [0u8; 8];
            buf[..5].copy_from_slice(&value_bytes[3..]);
            let minor_units = u64::from_le_bytes(buf);
            if minor_units == 0 {
                return Err(DecodeError::ZeroAmount);
            }
            CodeValue::Fiat {
                currency,
                minor_units,
            }
        };

        Ok(Self {
            payload: Payload::new(kind, data.to_vec()),
            value,
        })
    }

    /// Inverse of [`ScannedCode::decode`], used by tests and the give flow.
    #[must_use]
    pub fn encode(value: &CodeValue, nonce: [u8; 11]) -> Vec<u8> {
        let mut data = Vec::with_capacity(CODE_PAYLOAD_LEN);
        match value {
            CodeValue::Kin { quarks } => {
                data.push(PayloadKind::Cash.as_byte());
                data.extend_from_slice(&quarks.to_le_bytes());
            }
            CodeValue::Fiat {
                currency,
                minor_units,
            } => {
                data.push(PayloadKind::RequestPayment.as_byte());
                data.extend_from_slice(currency.as_str().as_bytes());
                data.extend_from_slice(&minor_units.to_le_bytes()[..5]);
            }
        }
        data.extend_from_slice(&nonce);
        data
    }
}

// --- Bills ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PresentationStyle {
    #[default]
    Pop,
    Slide,
}

impl PresentationStyle {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pop => "Pop",
            Self::Slide => "Slide",
        }
    }
}

/// Where a cash bill came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CashOrigin {
    /// Grabbed from someone else's code.
    Scanned,
    /// Collected from a cash link.
    CashLink,
    /// Our own bill, offered to others.
    Given,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub amount: Amount,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Bill {
    Cash {
        id: BillId,
        payload: Payload,
        amount: Amount,
        received: bool,
        style: PresentationStyle,
        origin: CashOrigin,
    },
    /// The confirmation linked to this bill shares its `id`.
    Payment {
        id: BillId,
        payload: Payload,
        request: PaymentRequest,
    },
}

impl Bill {
    #[must_use]
    pub fn cash(payload: Payload, amount: Amount, origin: CashOrigin) -> Self {
        let style = match origin {
            CashOrigin::Given => PresentationStyle::Slide,
            CashOrigin::Scanned | CashOrigin::CashLink => PresentationStyle::Pop,
        };
        Self::Cash {
            id: BillId::generate(),
            payload,
            amount,
            received: false,
            style,
            origin,
        }
    }

    #[must_use]
    pub fn payment(payload: Payload, amount: Amount) -> Self {
        Self::Payment {
            id: BillId::generate(),
            payload,
            request: PaymentRequest { amount },
        }
    }

    /// Builds the bill a scanned code describes. Payment requests are priced
    /// from the current rate snapshot.
    pub fn from_scanned(
        code: ScannedCode,
        origin: CashOrigin,
        rates: &RateTable,
    ) -> Result<Self, DecodeError> {
        match code.value {
            CodeValue::Kin { quarks } => Ok(Self::cash(code.payload, Amount::kin(quarks), origin)),
            CodeValue::Fiat {
                currency,
                minor_units,
            } => {
                let rate = rates
                    .rate_for(&currency)
                    .ok_or_else(|| DecodeError::MissingRate(currency.to_string()))?;
                Ok(Self::payment(code.payload, Amount::fiat(minor_units, rate)))
            }
        }
    }

    #[must_use]
    pub const fn id(&self) -> BillId {
        match self {
            Self::Cash { id, .. } | Self::Payment { id, .. } => *id,
        }
    }

    #[must_use]
    pub fn payload(&self) -> &Payload {
        match self {
            Self::Cash { payload, .. } | Self::Payment { payload, .. } => payload,
        }
    }

    #[must_use]
    pub fn amount(&self) -> &Amount {
        match self {
            Self::Cash { amount, .. } => amount,
            Self::Payment { request, .. } => &request.amount,
        }
    }

    #[must_use]
    pub const fn style(&self) -> PresentationStyle {
        match self {
            Self::Cash { style, .. } => *style,
            Self::Payment { .. } => PresentationStyle::Slide,
        }
    }

    #[must_use]
    pub const fn is_cash(&self) -> bool {
        matches!(self, Self::Cash { .. })
    }

    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Cash { .. } => "cash",
            Self::Payment { .. } => "payment",
        }
    }
}

// --- Payment confirmation ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentState {
    AwaitingConfirmation,
    Sending,
    Sent,
}

impl fmt::Display for PaymentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::AwaitingConfirmation => "awaiting confirmation",
            Self::Sending => "sending",
            Self::Sent => "sent",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentConfirmation {
    pub bill_id: BillId,
    pub state: PaymentState,
    pub payload: Payload,
    pub requested_amount: Amount,
    /// Submissions made so far; lives and dies with the confirmation.
    pub attempts: u32,
    pub in_flight: Option<SubmissionId>,
}

impl PaymentConfirmation {
    #[must_use]
    pub fn awaiting(bill_id: BillId, payload: Payload, requested_amount: Amount) -> Self {
        Self {
            bill_id,
            state: PaymentState::AwaitingConfirmation,
            payload,
            requested_amount,
            attempts: 0,
            in_flight: None,
        }
    }
}

/// UI-facing bill state. Only [`crate::bill_store::BillStore`] mutates it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BillState {
    pub bill: Option<Bill>,
    pub payment_confirmation: Option<PaymentConfirmation>,
    pub can_swipe_to_dismiss: bool,
    pub hide_bill_buttons: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DismissReason {
    UserSwipe,
    Timeout,
    SendCompleted,
    Cancelled,
    Replaced,
}

impl DismissReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UserSwipe => "user_swipe",
            Self::Timeout => "timeout",
            Self::SendCompleted => "send_completed",
            Self::Cancelled => "cancelled",
            Self::Replaced => "replaced",
        }
    }
}

// --- Environment ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NetworkKind {
    Wifi,
    Cellular,
    Ethernet,
    #[default]
    Unknown,
    None,
}

/// Externally owned connectivity snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkState {
    pub connected: bool,
    pub kind: NetworkKind,
}

impl Default for NetworkState {
    fn default() -> Self {
        Self {
            connected: true,
            kind: NetworkKind::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sheet {
    Account,
    GiveKin,
    GetKin,
    Balance,
}

impl Sheet {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Account => "account",
            Self::GiveKin => "give_kin",
            Self::GetKin => "get_kin",
            Self::Balance => "balance",
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub const NONCE: [u8; 11] = [0xab, 0xdb, 0xe5, 0xda, 0x25, 0xff, 0xfc, 0x80, 0x66, 0x7b, 0xdd];

    pub fn cash_code(quarks: u64) -> Vec<u8> {
        ScannedCode::encode(&CodeValue::Kin { quarks }, NONCE)
    }

    pub fn request_code(currency: &str, minor_units: u64) -> Vec<u8> {
        let currency = CurrencyCode::new(currency).unwrap();
        ScannedCode::encode(
            &CodeValue::Fiat {
                currency,
                minor_units,
            },
            NONCE,
        )
    }

    pub fn usd_rate() -> ExchangeRate {
        ExchangeRate {
            currency: CurrencyCode::new("USD").unwrap(),
            fx: 0.000_015_85,
        }
    }

    pub fn cash_bill(quarks: u64) -> Bill {
        let code = ScannedCode::decode(PayloadKind::Cash, &cash_code(quarks)).unwrap();
        Bill::cash(code.payload, Amount::kin(quarks), CashOrigin::Scanned)
    }

    pub fn given_bill(quarks: u64) -> Bill {
        let code = ScannedCode::decode(PayloadKind::Cash, &cash_code(quarks)).unwrap();
        Bill::cash(code.payload, Amount::kin(quarks), CashOrigin::Given)
    }

    pub fn payment_bill(cents: u64) -> Bill {
        let code =
            ScannedCode::decode(PayloadKind::RequestPayment, &request_code("USD", cents)).unwrap();
        Bill::payment(code.payload, Amount::fiat(cents, usd_rate()))
    }
}
